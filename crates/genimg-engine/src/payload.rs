use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;

/// Raw image bytes produced by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl ImagePayload {
    /// Sniff the format from the bytes, assuming PNG when unknown.
    pub fn new(bytes: Vec<u8>) -> Self {
        let format = image::guess_format(&bytes).unwrap_or(ImageFormat::Png);
        Self { bytes, format }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Image handed in by the caller for a transform request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SourceImage {
    /// Accepts `data:image/<fmt>;base64,<data>` or a filesystem path.
    pub fn load(image_ref: &str) -> Result<Self> {
        let trimmed = image_ref.trim();
        if trimmed.starts_with("data:") {
            return Self::from_data_url(trimmed);
        }
        Self::from_path(Path::new(trimmed))
    }

    pub fn from_data_url(raw: &str) -> Result<Self> {
        if !raw.starts_with("data:image/") {
            bail!("invalid image format; expected data:image/[format];base64,[data]");
        }
        let Some((header, data)) = raw.split_once(";base64,") else {
            bail!("invalid image data format; image must be data:image/[format];base64,[data]");
        };
        let mime_type = header.trim_start_matches("data:").to_string();
        let bytes = BASE64
            .decode(data.trim().as_bytes())
            .context("invalid base64 encoding")?;
        validate_image(&bytes)?;
        tracing::info!(mime_type = %mime_type, "loaded source image from data URL");
        Ok(Self { bytes, mime_type })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("image file not found: {}", path.display());
        }
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let format = validate_image(&bytes)?;
        tracing::info!(path = %path.display(), "loaded source image from file");
        Ok(Self {
            bytes,
            mime_type: format.to_mime_type().to_string(),
        })
    }
}

fn validate_image(bytes: &[u8]) -> Result<ImageFormat> {
    let format = image::guess_format(bytes).context(
        "could not identify image format; supported formats include PNG, JPEG, GIF, WebP",
    )?;
    image::load_from_memory_with_format(bytes, format).context("could not decode image")?;
    Ok(format)
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    use std::io::Cursor;

    let mut image = image::RgbImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        *pixel = image::Rgb([(x * 7) as u8, (y * 13) as u8, 128]);
    }
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode sample png");
    out.into_inner()
}
