// Upload and result directories

use crate::config::StorageConfig;
use crate::error::ApiError;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// URL prefix under which annotated images are served
pub const RESULTS_ROUTE: &str = "/static/results";

/// Files written on behalf of detections.
///
/// Every write completes before its method returns, so a redirect issued
/// afterwards never points at a file that is still being written.
#[derive(Debug, Clone)]
pub struct ResultStorage {
    upload_dir: PathBuf,
    result_dir: PathBuf,
}

impl ResultStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            result_dir: config.result_dir.clone(),
        }
    }

    /// Create both directories if they are missing
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.result_dir)?;
        info!(
            "Storage ready (uploads: {:?}, results: {:?})",
            self.upload_dir, self.result_dir
        );
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// Keep the original upload bytes under `key`
    pub async fn save_upload(&self, key: &str, bytes: &[u8]) -> Result<PathBuf, ApiError> {
        let path = self.upload_dir.join(key);
        write_atomic(&path, bytes).await?;
        debug!("Saved upload {:?} ({} bytes)", path, bytes.len());
        Ok(path)
    }

    /// Encode a camera frame as JPEG under `key`
    pub async fn save_capture(&self, key: &str, image: DynamicImage) -> Result<PathBuf, ApiError> {
        let path = self.upload_dir.join(key);
        let target = path.clone();
        tokio::task::spawn_blocking(move || encode_to(&target, &image, ImageOutputFormat::Jpeg(90))).await??;
        debug!("Saved capture {:?}", path);
        Ok(path)
    }

    /// Write an annotated image and return the URL it is served at
    pub async fn save_annotated(&self, key: &str, image: RgbImage) -> Result<String, ApiError> {
        let (name, format) = annotated_name(key);
        let path = self.result_dir.join(&name);
        tokio::task::spawn_blocking(move || encode_to(&path, &DynamicImage::ImageRgb8(image), format)).await??;
        debug!("Saved annotated image {}", name);
        Ok(format!("{}/{}", RESULTS_ROUTE, name))
    }
}

/// File name and encoding for the annotated copy of `key`
fn annotated_name(key: &str) -> (String, ImageOutputFormat) {
    let extension = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => (key.to_string(), ImageOutputFormat::Png),
        Some("jpg") | Some("jpeg") => (key.to_string(), ImageOutputFormat::Jpeg(90)),
        _ => (format!("{}.jpg", key), ImageOutputFormat::Jpeg(90)),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Encode into a temp file, then rename into place
fn encode_to(path: &Path, image: &DynamicImage, format: ImageOutputFormat) -> Result<(), ApiError> {
    let tmp = temp_path(path);
    let result = (|| -> Result<(), ApiError> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        image
            .write_to(&mut writer, format)
            .map_err(|e| ApiError::Internal(format!("Failed to encode image: {}", e)))?;
        writer
            .into_inner()
            .map_err(|e| ApiError::Internal(format!("Failed to flush image: {}", e)))?
            .sync_all()?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ApiError> {
    let tmp = temp_path(path);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
