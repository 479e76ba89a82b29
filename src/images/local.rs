//! Local filesystem image store.
//!
//! Uploads are decoded, shrunk to a maximum width and re-encoded as WebP. The
//! stored name combines a sanitized form of the client's file name with the
//! upload time and a content hash. Every book owns its file, even when two
//! books use the same cover.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};

use super::{ImageStore, ImageUpload};
use crate::error::{AppError, AppResult};

/// Covers wider than this are scaled down.
pub const DEFAULT_MAX_WIDTH: u32 = 800;

const MAX_STEM_LEN: usize = 40;
const HASH_PREFIX_LEN: usize = 8;

pub struct LocalImageStore {
    root: PathBuf,
    max_width: u32,
}

impl LocalImageStore {
    /// Open (creating if needed) the image directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("creating image directory {}", root.display()))?;
        Ok(Self {
            root,
            max_width: DEFAULT_MAX_WIDTH,
        })
    }

    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = max_width.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a stored name to a path inside the root, refusing anything that
    /// could escape it.
    fn path_for(&self, filename: &str) -> Option<PathBuf> {
        let valid = !filename.is_empty()
            && !filename.starts_with('.')
            && !filename.contains(['/', '\\'])
            && !filename.contains("..");
        valid.then(|| self.root.join(filename))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn store(&self, upload: ImageUpload) -> AppResult<String> {
        let max_width = self.max_width;
        let original_size = upload.bytes.len();
        let bytes = upload.bytes;

        let encoded = tokio::task::spawn_blocking(move || transcode(&bytes, max_width))
            .await
            .map_err(anyhow::Error::from)??;

        let filename = format!(
            "{}_{}_{}.webp",
            sanitize_stem(upload.filename.as_deref()),
            Utc::now().timestamp_millis(),
            content_hash(&encoded)
        );
        let path = self.root.join(&filename);

        fs::write(&path, &encoded)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        info!(%filename, original_size, stored_size = encoded.len(), "stored cover image");
        Ok(filename)
    }

    async fn release(&self, filename: &str) -> Result<()> {
        let Some(path) = self.path_for(filename) else {
            anyhow::bail!("refusing to release invalid image name {:?}", filename);
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(%filename, "released cover image");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%filename, "cover image already gone");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}

/// Decode arbitrary image bytes, bound the width and encode as WebP.
fn transcode(bytes: &[u8], max_width: u32) -> AppResult<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::validation(format!("unreadable image: {}", e)))?
        .decode()
        .map_err(|e| AppError::validation(format!("unsupported image: {}", e)))?;

    let img = if img.width() > max_width {
        img.resize(max_width, u32::MAX, FilterType::Lanczos3)
    } else {
        img
    };

    // The WebP encoder only takes 8-bit RGB(A).
    let img = DynamicImage::ImageRgba8(img.to_rgba8());

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::WebP)
        .context("encoding WebP")?;
    Ok(out.into_inner())
}

fn content_hash(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..HASH_PREFIX_LEN].to_string()
}

/// Reduce a client file name to a safe lowercase stem.
fn sanitize_stem(filename: Option<&str>) -> String {
    let stem = filename
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(name))
        .map(|name| name.rsplit_once('.').map_or(name, |(stem, _)| stem))
        .unwrap_or_default();

    let mut clean = String::with_capacity(stem.len());
    for c in stem.chars() {
        match c {
            c if c.is_ascii_alphanumeric() => clean.push(c.to_ascii_lowercase()),
            '-' | '_' => clean.push(c),
            c if c.is_whitespace() => clean.push('_'),
            _ => {}
        }
        if clean.len() >= MAX_STEM_LEN {
            break;
        }
    }

    let clean = clean.trim_matches(['_', '-']).to_string();
    if clean.is_empty() { "cover".to_string() } else { clean }
}
