//! Filesystem-backed result store.
//!
//! One file per `(structure_id, kind)` pair under the store root,
//! suitable for a shared filesystem between workers. Writes go through a
//! temp name and rename so readers never observe half-written blobs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::domain::errors::{DomainResult, RelaxError};
use crate::domain::ports::{ResultStore, StoreKey};

pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, key: &StoreKey) -> PathBuf {
        self.root
            .join(&key.structure_id)
            .join(format!("{}.bin", key.kind.as_str()))
    }
}

fn map_not_found(err: std::io::Error, key: &StoreKey) -> RelaxError {
    if err.kind() == std::io::ErrorKind::NotFound {
        RelaxError::NotFound(key.to_string())
    } else {
        RelaxError::Io(err)
    }
}

#[async_trait]
impl ResultStore for FsResultStore {
    async fn put(&self, key: &StoreKey, bytes: Vec<u8>, overwrite: bool) -> DomainResult<()> {
        let path = self.blob_path(key);
        if !overwrite && path.exists() {
            return Err(RelaxError::AlreadyExists(key.to_string()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &StoreKey) -> DomainResult<Vec<u8>> {
        fs::read(self.blob_path(key))
            .await
            .map_err(|e| map_not_found(e, key))
    }

    async fn delete(&self, key: &StoreKey) -> DomainResult<()> {
        fs::remove_file(self.blob_path(key))
            .await
            .map_err(|e| map_not_found(e, key))
    }
}

impl FsResultStore {
    /// Root directory, for diagnostics.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ArtifactKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = FsResultStore::new(dir.path());
        let key = StoreKey::new("s1", ArtifactKind::RelaxedGeometry);

        store.put(&key, b"geometry".to_vec(), false).await.unwrap();
        assert!(dir.path().join("s1/relaxed_geometry.bin").is_file());
        assert_eq!(store.get(&key).await.unwrap(), b"geometry");

        store.delete(&key).await.unwrap();
        assert!(matches!(
            store.get(&key).await,
            Err(RelaxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FsResultStore::new(dir.path());
        let key = StoreKey::new("s1", ArtifactKind::SolverLog);
        store.put(&key, b"log".to_vec(), false).await.unwrap();
        assert!(!dir.path().join("s1/relaxed_geometry.bin.tmp").exists());
        assert!(!dir.path().join("s1/solver_log.bin.tmp").exists());
    }

    #[tokio::test]
    async fn test_existing_blob_guard() {
        let dir = TempDir::new().unwrap();
        let store = FsResultStore::new(dir.path());
        let key = StoreKey::new("s1", ArtifactKind::Result);
        store.put(&key, b"a".to_vec(), false).await.unwrap();
        assert!(matches!(
            store.put(&key, b"b".to_vec(), false).await,
            Err(RelaxError::AlreadyExists(_))
        ));
        store.put(&key, b"b".to_vec(), true).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), b"b");
    }
}
