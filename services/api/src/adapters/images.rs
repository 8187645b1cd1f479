//! services/api/src/adapters/images.rs
//!
//! This module contains the on-disk store for uploaded profile images.
//! Files land in a single directory that is also served back statically.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use regex::Regex;
use tracing::info;

use crate::config::Config;
use crate::error::ApiError;

/// Both the file extension and the declared content type must match this.
pub const ALLOWED_IMAGE_TYPES: &str = "jpeg|jpg|png|gif|webp";

/// Fallback name prefix when the form carries no usable `userId`.
const ANONYMOUS_PREFIX: &str = "user";

/// Where an image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub filename: String,
    pub url: String,
}

//=========================================================================================
// The Main Store Struct
//=========================================================================================

pub struct ImageStore {
    dir: PathBuf,
    url_prefix: String,
    allowed: Regex,
    /// Last timestamp handed out; every new name gets a strictly larger one.
    last_stamp: AtomicI64,
}

impl ImageStore {
    /// Creates a store writing into `dir`, with files reachable under `url_prefix`.
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            allowed: Regex::new(ALLOWED_IMAGE_TYPES)?,
            last_stamp: AtomicI64::new(0),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(config.upload_dir(), config.upload_url_prefix())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the upload directory (and its parents) if it is missing.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Whether an upload with this extension and content type is an image we take.
    pub fn accepts(&self, extension: &str, content_type: &str) -> bool {
        self.allowed.is_match(extension) && self.allowed.is_match(content_type)
    }

    /// Millisecond wall clock, bumped past the previous value when two uploads
    /// land in the same millisecond.
    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last_stamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_stamp
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Builds `{userId}_{timestamp}{ext}`. The user id is reduced to
    /// `[A-Za-z0-9_-]` so it can never escape the upload directory.
    pub fn file_name(&self, user_id: Option<&str>, extension: &str) -> String {
        let prefix: String = user_id
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        let prefix = if prefix.is_empty() {
            ANONYMOUS_PREFIX
        } else {
            prefix.as_str()
        };
        format!("{prefix}_{}{extension}", self.next_stamp())
    }

    pub async fn save(
        &self,
        user_id: Option<&str>,
        extension: &str,
        bytes: &[u8],
    ) -> std::io::Result<StoredImage> {
        let filename = self.file_name(user_id, extension);
        tokio::fs::write(self.dir.join(&filename), bytes).await?;
        info!(%filename, size = bytes.len(), "profile image stored");
        Ok(StoredImage {
            url: format!("{}/{}", self.url_prefix, filename),
            filename,
        })
    }
}

/// The lower-cased extension of an uploaded file name, dot included, or an
/// empty string when there is none.
pub fn extension_of(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}
