use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageReader;
use scenecast_contracts::slots::ReferenceImage;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Reads a picture from disk into a base64 [`ReferenceImage`].
pub fn load_reference_image(path: &Path) -> Result<ReferenceImage> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    if bytes.is_empty() {
        anyhow::bail!("{} is empty", path.display());
    }
    let mime_type = sniff_mime(&bytes, path);
    let mut image = ReferenceImage::new(BASE64.encode(&bytes), mime_type);
    if let Some(file_name) = path.file_name().and_then(|value| value.to_str()) {
        image = image.with_file_name(file_name);
    }
    Ok(image)
}

/// Content sniffing first, then the file extension.
pub fn sniff_mime(bytes: &[u8], path: &Path) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .ok()
        .or_else(|| mime_for_path(path))
        .unwrap_or(FALLBACK_MIME)
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// Thumbnail stand-in shown next to a loaded slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: usize,
    pub dimensions: Option<(u32, u32)>,
}

impl fmt::Display for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.file_name, self.mime_type)?;
        if let Some((width, height)) = self.dimensions {
            write!(f, ", {width}x{height}")?;
        }
        write!(f, ", {})", format_size(self.size_bytes))
    }
}

pub fn preview(image: &ReferenceImage) -> Preview {
    let bytes = BASE64.decode(image.data.as_bytes()).unwrap_or_default();
    let dimensions = ImageReader::new(Cursor::new(bytes.as_slice()))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok());
    Preview {
        file_name: image
            .file_name
            .clone()
            .unwrap_or_else(|| "unnamed".to_string()),
        mime_type: image.mime_type.clone(),
        size_bytes: bytes.len(),
        dimensions,
    }
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
