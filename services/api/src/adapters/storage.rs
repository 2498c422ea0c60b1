//! services/api/src/adapters/storage.rs
//!
//! Reads uploaded course materials from the local filesystem.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use coursemate_core::ports::{DocumentStorage, PortError, PortResult};
use tracing::instrument;

/// Resolves material locators against a storage root. Absolute locators are
/// used as-is, matching how uploads were historically recorded.
#[derive(Clone, Debug)]
pub struct LocalDocumentStorage {
    root: PathBuf,
}

impl LocalDocumentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl DocumentStorage for LocalDocumentStorage {
    #[instrument(skip(self))]
    async fn read(&self, locator: &str) -> PortResult<Vec<u8>> {
        let path = self.resolve(locator);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortError::NotFound(format!("{} not found", path.display())),
            _ => PortError::Unexpected(format!("failed to read {}: {}", path.display(), e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_relative_and_absolute_locators() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("course-1")).unwrap();
        std::fs::write(dir.path().join("course-1/week3.pdf"), b"%PDF-1.4").unwrap();

        let storage = LocalDocumentStorage::new(dir.path());
        assert_eq!(storage.read("course-1/week3.pdf").await.unwrap(), b"%PDF-1.4");

        let absolute = dir.path().join("course-1/week3.pdf");
        let absolute = absolute.to_str().unwrap();
        assert_eq!(storage.read(absolute).await.unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDocumentStorage::new(dir.path());
        assert!(matches!(
            storage.read("nope.docx").await,
            Err(PortError::NotFound(_))
        ));
    }
}
