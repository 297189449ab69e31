//! Image preparation
//!
//! Transforms a captured photo into an upload-ready JPEG blob: downsizes
//! to a width cap (never upscales) and re-encodes at fixed quality.
//! Prepared blobs are content-addressed by SHA-256 hash, organized in a
//! two-level path structure.
//!
//! Example: hash "abcd1234..." for user U uploads to "U/ab/cd/abcd1234....jpg"

use crate::error::{EngineError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// An upload-ready photo blob
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// SHA-256 hash of the encoded bytes
    pub hash: String,
}

impl PreparedImage {
    /// Remote object path for this blob, scoped to the owning user
    pub fn object_path(&self, user_id: Uuid) -> String {
        let prefix1 = &self.hash[0..2];
        let prefix2 = &self.hash[2..4];
        format!("{}/{}/{}/{}.jpg", user_id, prefix1, prefix2, self.hash)
    }
}

/// Deterministic photo transformer
#[derive(Clone)]
pub struct ImagePreparer {
    max_width: u32,
    quality: u8,
}

impl ImagePreparer {
    pub fn new(max_width: u32, quality: u8) -> Self {
        Self { max_width, quality }
    }

    /// Read, downsize, and re-encode a captured photo.
    ///
    /// Any failure surfaces as `ImagePreparation` and leaves no partial
    /// state behind.
    pub async fn prepare(&self, path: &Path) -> Result<PreparedImage> {
        let data = fs::read(path).await.map_err(|e| {
            EngineError::ImagePreparation(format!("read {}: {}", path.display(), e))
        })?;

        let max_width = self.max_width;
        let quality = self.quality;

        // Decode/resize/encode are CPU-bound; keep them off the runtime threads
        let bytes = tokio::task::spawn_blocking(move || encode_jpeg(&data, max_width, quality))
            .await
            .map_err(|e| EngineError::ImagePreparation(format!("encode task: {}", e)))??;

        let hash = calculate_hash(&bytes);

        tracing::debug!(
            "Prepared image {} ({} bytes, hash {})",
            path.display(),
            bytes.len(),
            hash
        );

        Ok(PreparedImage {
            bytes,
            content_type: "image/jpeg",
            hash,
        })
    }
}

fn encode_jpeg(data: &[u8], max_width: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)
        .map_err(|e| EngineError::ImagePreparation(format!("decode: {}", e)))?;

    let img = if img.width() > max_width {
        img.resize(max_width, u32::MAX, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(&rgb)
        .map_err(|e| EngineError::ImagePreparation(format!("encode: {}", e)))?;

    Ok(out)
}

fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_test_image(dir: &TempDir, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([90, 120, 200]));
        image::DynamicImage::ImageRgb8(img).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_wide_image_is_downsized_to_cap() {
        let dir = TempDir::new().unwrap();
        let path = write_test_image(&dir, "wide.png", 400, 200);

        let prepared = ImagePreparer::new(100, 80).prepare(&path).await.unwrap();

        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 50);
    }

    #[tokio::test]
    async fn test_narrow_image_is_not_upscaled() {
        let dir = TempDir::new().unwrap();
        let path = write_test_image(&dir, "narrow.png", 60, 40);

        let prepared = ImagePreparer::new(100, 80).prepare(&path).await.unwrap();

        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(decoded.width(), 60);
        assert_eq!(decoded.height(), 40);
    }

    #[tokio::test]
    async fn test_output_is_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = write_test_image(&dir, "photo.png", 120, 80);

        let prepared = ImagePreparer::new(100, 80).prepare(&path).await.unwrap();

        assert_eq!(prepared.content_type, "image/jpeg");
        // JPEG start-of-image marker
        assert_eq!(&prepared.bytes[0..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_object_path_uses_hash_fan_out() {
        let dir = TempDir::new().unwrap();
        let path = write_test_image(&dir, "photo.png", 50, 50);

        let prepared = ImagePreparer::new(100, 80).prepare(&path).await.unwrap();
        let user_id = Uuid::new_v4();
        let object_path = prepared.object_path(user_id);

        assert!(object_path.starts_with(&user_id.to_string()));
        assert!(object_path.ends_with(&format!("{}.jpg", prepared.hash)));
        assert_eq!(prepared.hash.len(), 64);
    }

    #[tokio::test]
    async fn test_missing_file_fails_as_image_preparation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.png");

        let result = ImagePreparer::new(100, 80).prepare(&path).await;
        assert!(matches!(result, Err(EngineError::ImagePreparation(_))));
    }

    #[tokio::test]
    async fn test_garbage_bytes_fail_as_image_preparation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"not an image at all").unwrap();

        let result = ImagePreparer::new(100, 80).prepare(&path).await;
        assert!(matches!(result, Err(EngineError::ImagePreparation(_))));
    }
}
