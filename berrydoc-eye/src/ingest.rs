//! Image ingestion: multipart uploads and camera data URLs
//!
//! Both entry points normalise into an [`IngestedImage`]: the decoded pixels
//! plus the storage key used for any files written on its behalf. Uploads are
//! keyed by their sanitised filename, camera captures by a monotonic
//! timestamp so rapid captures never collide.

use crate::error::{Result, VisionError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use unicode_normalization::UnicodeNormalization;
use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Decoded image plus the key its files are stored under
#[derive(Debug, Clone)]
pub struct IngestedImage {
    pub image: DynamicImage,
    pub key: String,
}

/// Decode an uploaded file.
///
/// The filename is sanitised first; a name that sanitises to nothing is
/// treated the same as a missing file.
pub fn ingest_upload(filename: &str, bytes: &[u8]) -> Result<IngestedImage> {
    if filename.is_empty() {
        return Err(VisionError::MissingInput("empty filename".to_string()));
    }
    let key = secure_filename(filename);
    if key.is_empty() {
        return Err(VisionError::MissingInput(format!(
            "filename '{}' has no usable characters",
            filename
        )));
    }
    let image = decode_bytes(bytes)?;
    debug!("Ingested upload {} ({}x{})", key, image.width(), image.height());
    Ok(IngestedImage { image, key })
}

/// Decode a camera frame sent as a data URL.
pub fn ingest_capture(data_url: &str, keys: &CaptureKeys) -> Result<IngestedImage> {
    let image = decode_data_url(data_url)?;
    let key = keys.next_key();
    debug!("Ingested capture {} ({}x{})", key, image.width(), image.height());
    Ok(IngestedImage { image, key })
}

/// Decode raw image bytes of any supported format.
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(VisionError::MissingInput("empty image payload".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| VisionError::MalformedImage(e.to_string()))
}

/// Decode a `<mime-prefix>,<base64 payload>` data URL.
pub fn decode_data_url(data_url: &str) -> Result<DynamicImage> {
    if data_url.trim().is_empty() {
        return Err(VisionError::MissingInput("empty data URL".to_string()));
    }

    let (_header, encoded) = data_url
        .split_once(',')
        .ok_or_else(|| VisionError::MalformedImage("data URL has no ',' separator".to_string()))?;

    // Browsers may line-wrap long payloads
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| VisionError::MalformedImage(format!("invalid base64 payload: {}", e)))?;

    if bytes.is_empty() {
        return Err(VisionError::MalformedImage("data URL payload is empty".to_string()));
    }
    image::load_from_memory(&bytes).map_err(|e| VisionError::MalformedImage(e.to_string()))
}

/// Encode an image as a data URL. PNG keeps pixels exact.
pub fn encode_data_url(image: &DynamicImage, format: ImageOutputFormat) -> Result<String> {
    let mime = match format {
        ImageOutputFormat::Png => "image/png",
        ImageOutputFormat::Jpeg(_) => "image/jpeg",
        ImageOutputFormat::Bmp => "image/bmp",
        _ => {
            return Err(VisionError::Processing(
                "unsupported data URL output format".to_string(),
            ))
        }
    };
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), format)?;
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&buf)))
}

/// Make a user-supplied filename safe to use as a storage key.
///
/// The name is NFKD-folded so accented letters keep their base letter, then
/// remaining non-ASCII characters are dropped. Path separators become word breaks,
/// whitespace runs are joined with `_`, anything outside `[A-Za-z0-9_.-]` is
/// removed and leading or trailing dots and underscores are stripped.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .nfkd()
        .filter(|c| c.is_ascii())
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Monotonic key source for camera captures.
///
/// Keys are derived from the wall clock in microseconds but never repeat or go
/// backwards, even when two captures land in the same tick.
#[derive(Debug, Default)]
pub struct CaptureKeys {
    last: AtomicU64,
}

impl CaptureKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next capture timestamp in microseconds since the Unix epoch
    pub fn next_stamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    pub fn next_key(&self) -> String {
        format!("capture_{}.jpg", self.next_stamp())
    }
}
