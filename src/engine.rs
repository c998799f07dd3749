//! Capability interface over the Mermaid layout/rendering engine.

use crate::theme::EngineOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::debug;

pub const DEFAULT_MMDC_COMMAND: &str = "mmdc";

/// A render rejected by the engine. `diagnostic` carries the engine's own
/// explanation when it produced one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .diagnostic.as_deref().unwrap_or("diagram engine failed without a diagnostic"))]
pub struct EngineError {
    pub diagnostic: Option<String>,
}

impl EngineError {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        Self {
            diagnostic: if diagnostic.trim().is_empty() { None } else { Some(diagnostic) },
        }
    }

    pub fn silent() -> Self {
        Self { diagnostic: None }
    }
}

pub trait DiagramEngine: Send {
    fn configure(&mut self, options: &EngineOptions);

    /// Render `source` into SVG markup whose root element carries `element_id`.
    fn render(&mut self, element_id: &str, source: &str) -> Result<String, EngineError>;
}

impl<E: DiagramEngine + ?Sized> DiagramEngine for Box<E> {
    fn configure(&mut self, options: &EngineOptions) {
        (**self).configure(options)
    }

    fn render(&mut self, element_id: &str, source: &str) -> Result<String, EngineError> {
        (**self).render(element_id, source)
    }
}

/// The `mmdc` executable from `@mermaid-js/mermaid-cli`.
///
/// `mmdc` only reads configuration from a file, so every render goes through
/// scratch files in a private directory that is removed afterwards.
pub struct MermaidCli {
    command: PathBuf,
    options: Option<EngineOptions>,
}

impl MermaidCli {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            options: None,
        }
    }

    fn scratch_dir() -> Result<TempDir, EngineError> {
        tempfile::Builder::new()
            .prefix("draftmaid-")
            .tempdir()
            .map_err(|e| EngineError::new(format!("Failed to create scratch directory: {}", e)))
    }

    fn run(
        &self,
        element_id: &str,
        input: &Path,
        output: &Path,
        config: &Path,
    ) -> Result<String, EngineError> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--input")
            .arg(input)
            .arg("--output")
            .arg(output)
            .arg("--svgId")
            .arg(element_id)
            .arg("--quiet")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if let Some(options) = &self.options {
            let json = serde_json::to_string(options)
                .map_err(|e| EngineError::new(format!("Failed to encode engine options: {}", e)))?;
            std::fs::write(config, json)
                .map_err(|e| EngineError::new(format!("Failed to write engine options: {}", e)))?;
            cmd.arg("--configFile")
                .arg(config)
                .arg("--backgroundColor")
                .arg(&options.theme_variables.background);
        }

        let out = cmd.output().map_err(|e| {
            EngineError::new(format!("Failed to run '{}': {}", self.command.display(), e))
        })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            debug!(status = %out.status, "mmdc exited with failure");
            return Err(match extract_diagnostic(&stderr) {
                Some(message) => EngineError::new(message),
                None => EngineError::silent(),
            });
        }

        let svg = std::fs::read_to_string(output)
            .map_err(|e| EngineError::new(format!("Failed to read engine output: {}", e)))?;
        if svg.trim().is_empty() {
            return Err(EngineError::silent());
        }
        Ok(svg)
    }
}

impl Default for MermaidCli {
    fn default() -> Self {
        Self::new(DEFAULT_MMDC_COMMAND)
    }
}

impl DiagramEngine for MermaidCli {
    fn configure(&mut self, options: &EngineOptions) {
        self.options = Some(options.clone());
    }

    fn render(&mut self, element_id: &str, source: &str) -> Result<String, EngineError> {
        let scratch = Self::scratch_dir()?;
        let input = scratch.path().join("diagram.mmd");
        let output = scratch.path().join("diagram.svg");
        let config = scratch.path().join("config.json");
        std::fs::write(&input, source)
            .map_err(|e| EngineError::new(format!("Failed to write diagram source: {}", e)))?;

        self.run(element_id, &input, &output, &config)
    }
}

/// Pull the human-readable part out of `mmdc`'s stderr: everything up to the
/// first stack frame, without the leading `Error:` label.
pub fn extract_diagnostic(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .skip_while(|line| line.trim().is_empty())
        .take_while(|line| !line.trim_start().starts_with("at "))
        .collect();

    let mut message = lines.join("\n").trim().to_string();
    if let Some(rest) = message.strip_prefix("Error:") {
        message = rest.trim_start().to_string();
    }
    if message.is_empty() { None } else { Some(message) }
}
