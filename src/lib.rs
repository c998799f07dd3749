pub mod app;
pub mod config;
pub mod engine;
pub mod export;
pub mod generate;
pub mod kind;
pub mod render;
pub mod shell;
pub mod store;
pub mod theme;
