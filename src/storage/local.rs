//! Local filesystem storage backend.

use super::{ByteStream, StorageBackend, StorageError, StorageObject};
use actix_web::web::{self, Bytes};
use async_trait::async_trait;
use futures::stream;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

/// Local filesystem storage backend rooted at the media directory.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend.
    ///
    /// The `base_path` directory will be created if it doesn't exist.
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        log::info!("LocalStorage initialized at {:?}", base_path);
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a key to a path under the base directory.
    /// Absolute keys and `..` components are rejected.
    fn get_file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(key);
        let clean = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.base_path.join(rel))
    }

    /// Parse HTTP Range header.
    /// Supports formats like "bytes=0-499" or "bytes=500-"
    fn parse_range(range: &str, file_size: u64) -> Result<(u64, u64), StorageError> {
        let range = range
            .strip_prefix("bytes=")
            .ok_or_else(|| StorageError::InvalidRange("Invalid range format".into()))?;

        let (from, to) = range
            .split_once('-')
            .ok_or_else(|| StorageError::InvalidRange("Invalid range format".into()))?;

        if file_size == 0 {
            return Err(StorageError::InvalidRange("Range not satisfiable".into()));
        }

        let parse = |s: &str| {
            s.parse::<u64>()
                .map_err(|_| StorageError::InvalidRange("Invalid range number".into()))
        };

        let start = if from.is_empty() {
            // Suffix range like "-500" means last 500 bytes
            file_size.saturating_sub(parse(to)?)
        } else {
            parse(from)?
        };

        let end = if to.is_empty() || from.is_empty() {
            file_size - 1
        } else {
            parse(to)?
        };

        if start > end || start >= file_size {
            return Err(StorageError::InvalidRange("Range not satisfiable".into()));
        }

        Ok((start, end.min(file_size - 1)))
    }

    /// Get MIME type from key extension.
    fn get_mime_type(key: &str) -> Option<String> {
        let ext = key.rsplit('.').next()?;
        let mime = match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "mp4" => "video/mp4",
            "mp3" => "audio/mpeg",
            "pdf" => "application/pdf",
            "zip" => "application/zip",
            "doc" => "application/msword",
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "ppt" => "application/vnd.ms-powerpoint",
            "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            _ => "application/octet-stream",
        };
        Some(mime.to_string())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn put_object(&self, data: Vec<u8>, key: &str) -> Result<(), StorageError> {
        let path = self.get_file_path(key)?;
        log::info!("LocalStorage: put_object: {:?}", path);

        web::block(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, data)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        Ok(())
    }

    async fn get_object(
        &self,
        key: &str,
        range: Option<String>,
    ) -> Result<StorageObject, StorageError> {
        let path = self.get_file_path(key)?;
        log::debug!("LocalStorage: get_object: {:?}", path);

        let result = web::block(
            move || -> Result<(Vec<u8>, fs::Metadata, Option<String>), StorageError> {
                let metadata = fs::metadata(&path)?;
                let file_size = metadata.len();

                let (start, end, content_range) = match range {
                    Some(ref header) => {
                        let (start, end) = LocalStorage::parse_range(header, file_size)?;
                        let range_str = format!("bytes {}-{}/{}", start, end, file_size);
                        (start, end + 1, Some(range_str))
                    }
                    None => (0, file_size, None),
                };

                let mut file = fs::File::open(&path)?;
                if start > 0 {
                    file.seek(SeekFrom::Start(start))?;
                }

                let mut buffer = vec![0u8; (end - start) as usize];
                file.read_exact(&mut buffer)?;

                Ok((buffer, metadata, content_range))
            },
        )
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        let (buffer, metadata, content_range) = result;
        let content_length = buffer.len() as i64;

        let modified = metadata.modified().ok();
        let e_tag = modified.map(|t: std::time::SystemTime| {
            let duration = t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
            format!("\"{}-{}\"", duration.as_secs(), metadata.len())
        });
        let last_modified = modified.map(|t: std::time::SystemTime| {
            let datetime: chrono::DateTime<chrono::Utc> = t.into();
            datetime.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
        });

        let body: ByteStream = Box::pin(stream::once(async move { Ok(Bytes::from(buffer)) }));

        Ok(StorageObject {
            body,
            content_length: Some(content_length),
            content_type: Self::get_mime_type(key),
            e_tag,
            content_range,
            accept_ranges: Some("bytes".to_string()),
            last_modified,
        })
    }

    async fn size(&self, key: &str) -> Result<u64, StorageError> {
        let path = self.get_file_path(key)?;
        let metadata = web::block(move || fs::metadata(path))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        Ok(metadata.len())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.get_file_path(key)?;
        log::info!("LocalStorage: delete: {:?}", path);

        let result = web::block(move || fs::remove_file(path))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get_file_path(key)?.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_parse_range() {
        assert_eq!(LocalStorage::parse_range("bytes=0-499", 1000).unwrap(), (0, 499));
        assert_eq!(LocalStorage::parse_range("bytes=500-", 1000).unwrap(), (500, 999));
        assert_eq!(LocalStorage::parse_range("bytes=-100", 1000).unwrap(), (900, 999));
        assert!(LocalStorage::parse_range("bytes=1000-", 1000).is_err());
        assert!(LocalStorage::parse_range("items=0-1", 1000).is_err());
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        assert!(storage.get_file_path("../secret").is_err());
        assert!(storage.get_file_path("/etc/passwd").is_err());
        assert!(storage.get_file_path("").is_err());
        assert!(storage.get_file_path("lectures/2025/01/a.pdf").is_ok());
    }

    #[actix_rt::test]
    async fn test_put_size_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        let key = "lectures/2025/01/abc_notes.pdf";

        storage.put_object(vec![7u8; 2048], key).await.unwrap();
        assert!(storage.exists(key).await.unwrap());
        assert_eq!(storage.size(key).await.unwrap(), 2048);

        let object = storage.get_object(key, None).await.unwrap();
        assert_eq!(object.content_length, Some(2048));
        assert_eq!(object.content_type.as_deref(), Some("application/pdf"));
        let chunks: Vec<_> = object.body.collect().await;
        assert_eq!(chunks.len(), 1);

        let partial = storage
            .get_object(key, Some("bytes=0-99".to_owned()))
            .await
            .unwrap();
        assert_eq!(partial.content_length, Some(100));
        assert_eq!(partial.content_range.as_deref(), Some("bytes 0-99/2048"));

        storage.delete(key).await.unwrap();
        assert!(!storage.exists(key).await.unwrap());
        // Deleting twice is fine.
        storage.delete(key).await.unwrap();
        assert!(matches!(
            storage.size(key).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
