//! Image encoding: crops to PNG bytes, and crop files to base64 `ImageData`.
//!
//! Crops are written as PNG so re-running a crop over identical input
//! reproduces the same bytes. The model adapter reads those files back and
//! wraps them for the multimodal request body.

use crate::error::PipelineError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// MIME type for an image file, from its extension. Defaults to PNG.
pub fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Read an image file and wrap it as base64 `ImageData` for a vision request.
///
/// ## Why `detail: "high"`?
/// Table crops carry small print; the low-detail mode downsamples to a single
/// tile and loses cell contents.
pub async fn image_data_from_file(path: &Path) -> Result<ImageData, PipelineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::io(path, e))?;

    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());

    Ok(ImageData::new(b64, mime_for(path)).with_detail("high"))
}
