//! Storage backend abstraction for uploaded media.
//!
//! Keys are relative paths under the media root, e.g.
//! `lectures/2025/10/<uuid>_notes.pdf` or `profiles/<uuid>.png`.

pub mod local;

use crate::constants::{LECTURES_PREFIX, PROFILES_PREFIX};
use actix_web::web::Bytes;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime};
use futures::Stream;
use std::pin::Pin;

pub use local::LocalStorage;

/// A boxed stream of bytes for streaming file content.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Represents a retrieved storage object with metadata.
pub struct StorageObject {
    /// Streaming body content
    pub body: ByteStream,
    /// Content length in bytes
    pub content_length: Option<i64>,
    /// MIME content type
    pub content_type: Option<String>,
    /// Entity tag for caching
    pub e_tag: Option<String>,
    /// Content range for partial responses
    pub content_range: Option<String>,
    /// Accept ranges header value
    pub accept_ranges: Option<String>,
    /// Last modified timestamp
    pub last_modified: Option<String>,
}

/// Storage operation errors.
#[derive(Debug)]
pub enum StorageError {
    /// File not found
    NotFound(String),
    /// I/O error
    Io(std::io::Error),
    /// Key escapes the media root or is empty
    InvalidKey(String),
    /// Invalid range request
    InvalidRange(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::InvalidKey(key) => write!(f, "Invalid key: {}", key),
            StorageError::InvalidRange(msg) => write!(f, "Invalid range: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Trait for storage backends.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store a file under `key`, replacing anything already there.
    async fn put_object(&self, data: Vec<u8>, key: &str) -> Result<(), StorageError>;

    /// Retrieve a file.
    ///
    /// Optional `range` parameter supports HTTP Range requests for streaming.
    async fn get_object(
        &self,
        key: &str,
        range: Option<String>,
    ) -> Result<StorageObject, StorageError>;

    /// Byte size of the stored file.
    async fn size(&self, key: &str) -> Result<u64, StorageError>;

    /// Remove a file. Removing a missing file is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Check if a file exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Lower-cased extension of a client supplied file name.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Reduces a client supplied file name to `[A-Za-z0-9._-]`, dropping any path.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let clean: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_start_matches('.');
    if clean.is_empty() {
        "file".to_owned()
    } else {
        clean.chars().take(120).collect()
    }
}

/// `lectures/YYYY/MM/<uuid>_<name>`
pub fn lecture_key(now: NaiveDateTime, filename: &str) -> String {
    format!(
        "{}/{:04}/{:02}/{}_{}",
        LECTURES_PREFIX,
        now.year(),
        now.month(),
        uuid::Uuid::new_v4().simple(),
        sanitize_filename(filename)
    )
}

/// `profiles/<uuid>.<ext>`
pub fn profile_key(ext: &str) -> String {
    format!(
        "{}/{}.{}",
        PROFILES_PREFIX,
        uuid::Uuid::new_v4().simple(),
        ext.to_ascii_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Lecture 1.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(".bashrc"), None);
    }

    #[test]
    fn test_sanitize_filename_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\week 1.pdf"), "week_1.pdf");
        assert_eq!(sanitize_filename("..."), "file");
    }

    #[test]
    fn test_lecture_key_layout() {
        let now = chrono::NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let key = lecture_key(now, "notes.pdf");
        assert!(key.starts_with("lectures/2025/03/"));
        assert!(key.ends_with("_notes.pdf"));
    }

    #[test]
    fn test_profile_key_layout() {
        let key = profile_key("PNG");
        assert!(key.starts_with("profiles/"));
        assert!(key.ends_with(".png"));
    }
}
