//! Cover image storage.
//!
//! The catalog only needs two things from an image backend: persist an upload
//! and hand back a filename, and release a filename it no longer references.

mod local;

pub use local::{DEFAULT_MAX_WIDTH, LocalImageStore};

use async_trait::async_trait;
use url::Url;

use crate::error::AppResult;

/// Path prefix under which stored images are served.
pub const IMAGES_ROUTE: &str = "/images";

/// A raw uploaded file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Client-side file name, if any
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Image storage contract for covers.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist an upload and return the stored filename.
    ///
    /// Fails with a validation error when the bytes are not a decodable image.
    async fn store(&self, upload: ImageUpload) -> AppResult<String>;

    /// Delete a stored image. Releasing a file that is already gone succeeds.
    async fn release(&self, filename: &str) -> anyhow::Result<()>;
}

/// Fully-qualified URL for a stored filename.
pub fn image_url(base_url: &str, filename: &str) -> String {
    format!("{}{}/{}", base_url.trim_end_matches('/'), IMAGES_ROUTE, filename)
}

/// Recover the stored filename from an image URL built by [`image_url`].
pub fn filename_from_url(image_url: &str) -> Option<String> {
    let parsed = Url::parse(image_url).ok()?;
    let mut segments = parsed.path_segments()?.rev();
    let filename = segments.next().filter(|s| !s.is_empty())?;
    (segments.next()? == IMAGES_ROUTE.trim_start_matches('/')).then(|| filename.to_string())
}
