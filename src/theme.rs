use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const LIGHT_BACKGROUND: &str = "#FFF8F9";
const DARK_BACKGROUND: &str = "#2d2d30";
const LIGHT_LINE: &str = "#FF9EBB";
const DARK_LINE: &str = "#9ED8FF";

const PRIMARY: &str = "#FFD78E";
const PRIMARY_TEXT: &str = "#1F1F22";
const PRIMARY_BORDER: &str = "#FF9EBB";
const SECONDARY: &str = "#9ED8FF";
const TERTIARY: &str = "#FFF8F9";

const FONT_SIZE: &str = "16px";
const FONT_FAMILY: &str = "\"Noto Sans JP\", sans-serif";

const LIGHT_EXPORT_BACKGROUND: &str = "#FFFFFF";
const DARK_EXPORT_BACKGROUND: &str = "#1F1F22";
const LIGHT_TEXT: &str = "#1F1F22";
const DARK_TEXT: &str = "#FFF8F9";

/// Colour scheme of the preview and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn is_dark(self) -> bool {
        self == Theme::Dark
    }

    /// Options handed to the rendering engine before every render.
    pub fn engine_options(self) -> EngineOptions {
        let dark = self.is_dark();
        EngineOptions {
            theme: if dark { "dark" } else { "default" }.to_string(),
            theme_variables: ThemeVariables {
                background: if dark { DARK_BACKGROUND } else { LIGHT_BACKGROUND }.to_string(),
                primary_color: PRIMARY.to_string(),
                primary_text_color: PRIMARY_TEXT.to_string(),
                primary_border_color: PRIMARY_BORDER.to_string(),
                line_color: if dark { DARK_LINE } else { LIGHT_LINE }.to_string(),
                secondary_color: SECONDARY.to_string(),
                tertiary_color: TERTIARY.to_string(),
                font_size: FONT_SIZE.to_string(),
                font_family: FONT_FAMILY.to_string(),
            },
            flowchart: FlowchartOptions {
                use_max_width: true,
                html_labels: true,
            },
            sequence: SequenceOptions {
                use_max_width: true,
            },
        }
    }

    /// Opaque canvas colour behind raster exports.
    pub fn export_background(self) -> &'static str {
        match self {
            Theme::Light => LIGHT_EXPORT_BACKGROUND,
            Theme::Dark => DARK_EXPORT_BACKGROUND,
        }
    }

    /// Stylesheet embedded into exported SVG files so they render the same
    /// outside the preview.
    pub fn export_stylesheet(self) -> String {
        let text = match self {
            Theme::Light => LIGHT_TEXT,
            Theme::Dark => DARK_TEXT,
        };
        format!(
            "svg {{ font-family: {font}; font-size: {size}; }}\n\
             .label, .nodeLabel, .edgeLabel, text {{ color: {text}; }}\n\
             foreignObject div {{ font-family: {font}; line-height: 1.5; }}",
            font = FONT_FAMILY,
            size = FONT_SIZE,
            text = text,
        )
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        })
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(format!("Unknown theme '{}'. Available: light, dark", s)),
        }
    }
}

/// Engine configuration object, serialized in the engine's own camelCase
/// vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub theme: String,
    pub theme_variables: ThemeVariables,
    pub flowchart: FlowchartOptions,
    pub sequence: SequenceOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowchartOptions {
    pub use_max_width: bool,
    pub html_labels: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceOptions {
    pub use_max_width: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeVariables {
    pub background: String,
    pub primary_color: String,
    pub primary_text_color: String,
    pub primary_border_color: String,
    pub line_color: String,
    pub secondary_color: String,
    pub tertiary_color: String,
    pub font_size: String,
    pub font_family: String,
}

/// Parse a `#RRGGBB` colour into its components.
pub fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
