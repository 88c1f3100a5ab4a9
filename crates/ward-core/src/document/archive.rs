//! Storage for generated letter PDFs

use crate::error::{Result, WardError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

#[async_trait]
pub trait DocumentArchive: Send + Sync {
    /// Store a document, returning the path or key it was stored under
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String>;

    async fn load(&self, file_name: &str) -> Result<Option<Vec<u8>>>;

    /// Remove a document. Missing documents are not an error.
    async fn remove(&self, file_name: &str) -> Result<()>;
}

/// Archive in a directory on disk
pub struct FsDocumentArchive {
    root: PathBuf,
}

impl FsDocumentArchive {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, file_name: &str) -> Result<PathBuf> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return Err(WardError::Validation(format!(
                "Invalid document name: {}",
                file_name
            )));
        }
        Ok(self.root.join(file_name))
    }
}

#[async_trait]
impl DocumentArchive for FsDocumentArchive {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        let path = self.path_for(file_name)?;
        let tmp = self.root.join(format!(".tmp_{}", uuid::Uuid::new_v4()));

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        log::debug!("Archived {} ({} bytes)", path.display(), bytes.len());
        Ok(path.display().to_string())
    }

    async fn load(&self, file_name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(file_name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, file_name: &str) -> Result<()> {
        let path = self.path_for(file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process archive for tests
#[derive(Default)]
pub struct MemoryDocumentArchive {
    documents: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDocumentArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn documents(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.documents
            .lock()
            .map_err(|_| WardError::Storage("document archive lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentArchive for MemoryDocumentArchive {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        self.documents()?
            .insert(file_name.to_string(), bytes.to_vec());
        Ok(format!("memory://{}", file_name))
    }

    async fn load(&self, file_name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.documents()?.get(file_name).cloned())
    }

    async fn remove(&self, file_name: &str) -> Result<()> {
        self.documents()?.remove(file_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_archive_save_load_remove() {
        let temp_dir = TempDir::new().unwrap();
        let archive = FsDocumentArchive::new(temp_dir.path().join("generated")).unwrap();

        let stored = archive.save("letter_000001.pdf", b"%PDF-1.5").await.unwrap();
        assert!(stored.ends_with("letter_000001.pdf"));
        assert_eq!(
            archive.load("letter_000001.pdf").await.unwrap().as_deref(),
            Some(&b"%PDF-1.5"[..])
        );

        archive.remove("letter_000001.pdf").await.unwrap();
        archive.remove("letter_000001.pdf").await.unwrap();
        assert!(archive.load("letter_000001.pdf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_archive_rejects_path_names() {
        let temp_dir = TempDir::new().unwrap();
        let archive = FsDocumentArchive::new(temp_dir.path().to_path_buf()).unwrap();
        let err = archive.save("../escape.pdf", b"%PDF").await.unwrap_err();
        assert!(matches!(err, WardError::Validation(_)));
    }
}
