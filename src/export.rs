//! Writing the current diagram to `diagram.svg` / `diagram.png`.

use crate::render::RenderedImage;
use crate::theme::{Theme, parse_hex_color};
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use resvg::usvg;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use tiny_skia::{Color, Pixmap, Transform};
use tracing::{debug, info};

/// Margin added on every side of raster exports, in pixels.
pub const RASTER_PADDING: u32 = 20;

pub const SVG_FILENAME: &str = "diagram.svg";
pub const PNG_FILENAME: &str = "diagram.png";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to rewrite SVG: {0}")]
    Markup(String),
    #[error("Failed to parse SVG: {0}")]
    Parse(#[from] usvg::Error),
    #[error("Failed to create a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
    #[error("Failed to encode PNG: {0}")]
    Encode(String),
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Vector,
    Raster,
}

impl ExportFormat {
    pub fn filename(self) -> &'static str {
        match self {
            ExportFormat::Vector => SVG_FILENAME,
            ExportFormat::Raster => PNG_FILENAME,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Vector => "svg",
            ExportFormat::Raster => "png",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svg" | "vector" => Ok(ExportFormat::Vector),
            "png" | "raster" => Ok(ExportFormat::Raster),
            _ => Err(format!("Unsupported export format '{}' (use svg or png)", s)),
        }
    }
}

/// Writes exports into a fixed directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Export `image` in `format`. Without an image nothing is written and
    /// `Ok(None)` is returned.
    pub fn export(
        &self,
        image: Option<&RenderedImage>,
        theme: Theme,
        format: ExportFormat,
    ) -> Result<Option<PathBuf>, ExportError> {
        let Some(image) = image else {
            debug!(%format, "nothing rendered, skipping export");
            return Ok(None);
        };

        let bytes = encode(image, theme, format)?;
        let path = self.output_dir.join(format.filename());
        std::fs::write(&path, bytes).map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "diagram exported");
        Ok(Some(path))
    }
}

/// Encode `image` without touching the filesystem.
pub fn encode(image: &RenderedImage, theme: Theme, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    let svg = inline_styles(&image.svg, &theme.export_stylesheet())?;
    match format {
        ExportFormat::Vector => Ok(svg.into_bytes()),
        ExportFormat::Raster => rasterize(&svg, theme),
    }
}

/// Insert `css` as a `<style>` element in front of the root `<svg>` element's
/// existing children.
pub fn inline_styles(svg: &str, css: &str) -> Result<String, ExportError> {
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Vec::with_capacity(svg.len() + css.len() + 32));
    let mut inserted = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ExportError::Markup(e.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(start) if !inserted && start.local_name().as_ref() == b"svg" => {
                write(&mut writer, Event::Start(start))?;
                write_style(&mut writer, css)?;
                inserted = true;
            }
            Event::Empty(start) if !inserted && start.local_name().as_ref() == b"svg" => {
                let end = BytesEnd::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                write(&mut writer, Event::Start(start))?;
                write_style(&mut writer, css)?;
                write(&mut writer, Event::End(end))?;
                inserted = true;
            }
            other => write(&mut writer, other)?,
        }
    }

    if !inserted {
        return Err(ExportError::Markup("no <svg> root element".to_string()));
    }
    String::from_utf8(writer.into_inner()).map_err(|e| ExportError::Markup(e.to_string()))
}

fn write_style(writer: &mut Writer<Vec<u8>>, css: &str) -> Result<(), ExportError> {
    write(writer, Event::Start(BytesStart::new("style")))?;
    write(writer, Event::CData(BytesCData::new(css)))?;
    write(writer, Event::End(BytesEnd::new("style")))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), ExportError> {
    writer
        .write_event(event)
        .map_err(|e| ExportError::Markup(e.to_string()))
}

static FONTDB: LazyLock<Arc<usvg::fontdb::Database>> = LazyLock::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();

    let local_fonts = Path::new("fonts");
    if local_fonts.is_dir() {
        db.load_fonts_dir(local_fonts);
    }

    configure_font_fallbacks(&mut db);
    debug!(faces = db.len(), "loaded font database");
    Arc::new(db)
});

fn configure_font_fallbacks(fontdb: &mut usvg::fontdb::Database) {
    let mut sans_family: Option<String> = None;
    let mut mono_family: Option<String> = None;
    let mut first_family: Option<String> = None;

    for face in fontdb.faces() {
        for (family, _) in &face.families {
            if first_family.is_none() {
                first_family = Some(family.clone());
            }
            let lower = family.to_ascii_lowercase();
            if sans_family.is_none() && lower.contains("sans") {
                sans_family = Some(family.clone());
            }
            if mono_family.is_none() && (lower.contains("mono") || lower.contains("code")) {
                mono_family = Some(family.clone());
            }
        }
    }

    if let Some(family) = sans_family.as_deref().or(first_family.as_deref()) {
        fontdb.set_sans_serif_family(family);
        fontdb.set_serif_family(family);
    }
    if let Some(family) = mono_family
        .as_deref()
        .or(sans_family.as_deref())
        .or(first_family.as_deref())
    {
        fontdb.set_monospace_family(family);
    }
}

/// Rasterize `svg` onto an opaque, padded canvas in the theme's export
/// background colour.
pub fn rasterize(svg: &str, theme: Theme) -> Result<Vec<u8>, ExportError> {
    let opts = usvg::Options {
        fontdb: FONTDB.clone(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_str(svg, &opts)?;

    let (width, height) = padded_size(tree.size().width(), tree.size().height());
    let mut pixmap = Pixmap::new(width, height).ok_or(ExportError::Canvas { width, height })?;

    let [r, g, b] = parse_hex_color(theme.export_background()).unwrap_or([255, 255, 255]);
    pixmap.fill(Color::from_rgba8(r, g, b, 255));

    let offset = RASTER_PADDING as f32;
    resvg::render(&tree, Transform::from_translate(offset, offset), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| ExportError::Encode(e.to_string()))
}

/// Canvas size for an image of natural size `width` x `height`.
pub fn padded_size(width: f32, height: f32) -> (u32, u32) {
    (
        width.ceil() as u32 + RASTER_PADDING * 2,
        height.ceil() as u32 + RASTER_PADDING * 2,
    )
}
