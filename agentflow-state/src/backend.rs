// ABOUTME: Pluggable key/value storage backends for workflow state and checkpoints
// ABOUTME: Provides an in-memory backend and a one-file-per-key filesystem backend

use crate::error::{StateError, StateResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Key/value storage capability consumed by the state manager.
///
/// `list_keys` supports a trailing-`*` prefix pattern; any other pattern is
/// an exact-match lookup.
#[async_trait]
pub trait StateBackend: Send + Sync + std::fmt::Debug {
    async fn save(&self, key: &str, value: &[u8]) -> StateResult<()>;

    async fn load(&self, key: &str) -> StateResult<Option<Vec<u8>>>;

    /// Returns true when the key existed.
    async fn delete(&self, key: &str) -> StateResult<bool>;

    async fn list_keys(&self, pattern: &str) -> StateResult<Vec<String>>;
}

fn key_matches(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

/// In-memory backend for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn save(&self, key: &str, value: &[u8]) -> StateResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn list_keys(&self, pattern: &str) -> StateResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key_matches(key, pattern))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Filesystem backend storing one file per key under a base directory.
///
/// Keys are sanitized for the filesystem by replacing `:` with `_`, giving
/// the layout `<base_path>/<sanitized-key>.json`. A key index is kept in
/// memory so listings return original keys; on open, pre-existing files are
/// recovered by reversing the sanitization (best effort for keys that did
/// not themselves contain `_`).
#[derive(Debug)]
pub struct FileBackend {
    base_path: PathBuf,
    known_keys: DashMap<String, PathBuf>,
}

impl FileBackend {
    pub async fn new(base_path: impl AsRef<Path>) -> StateResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await?;

        let backend = Self {
            base_path,
            known_keys: DashMap::new(),
        };
        backend.recover_existing_keys().await?;
        Ok(backend)
    }

    fn sanitize(key: &str) -> String {
        key.replace(':', "_")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", Self::sanitize(key)))
    }

    async fn recover_existing_keys(&self) -> StateResult<()> {
        let mut dir = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                let key = stem.replace('_', ":");
                debug!(key = %key, "recovered state file");
                self.known_keys.insert(key, path);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StateBackend for FileBackend {
    async fn save(&self, key: &str, value: &[u8]) -> StateResult<()> {
        let path = self.path_for(key);
        fs::write(&path, value).await?;
        self.known_keys.insert(key.to_string(), path);
        Ok(())
    }

    async fn load(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StateError::Io(err)),
        }
    }

    async fn delete(&self, key: &str) -> StateResult<bool> {
        let path = self.path_for(key);
        self.known_keys.remove(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => {
                warn!(key = %key, error = %err, "failed to delete state file");
                Err(StateError::Io(err))
            }
        }
    }

    async fn list_keys(&self, pattern: &str) -> StateResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .known_keys
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key_matches(key, pattern))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let backend = MemoryBackend::new();

        backend.save("wf:1", b"hello").await.unwrap();
        assert_eq!(backend.load("wf:1").await.unwrap(), Some(b"hello".to_vec()));

        assert!(backend.delete("wf:1").await.unwrap());
        assert!(!backend.delete("wf:1").await.unwrap());
        assert_eq!(backend.load("wf:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_backend_prefix_listing() {
        let backend = MemoryBackend::new();
        backend.save("wf:1:checkpoint:a", b"a").await.unwrap();
        backend.save("wf:1:checkpoint:b", b"b").await.unwrap();
        backend.save("wf:2:checkpoint:c", b"c").await.unwrap();

        let keys = backend.list_keys("wf:1:checkpoint:*").await.unwrap();
        assert_eq!(keys, vec!["wf:1:checkpoint:a", "wf:1:checkpoint:b"]);

        let exact = backend.list_keys("wf:2:checkpoint:c").await.unwrap();
        assert_eq!(exact, vec!["wf:2:checkpoint:c"]);
    }

    #[tokio::test]
    async fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).await.unwrap();

        backend.save("wf:inst", b"{\"x\":1}").await.unwrap();
        assert!(dir.path().join("wf_inst.json").exists());
        assert_eq!(
            backend.load("wf:inst").await.unwrap(),
            Some(b"{\"x\":1}".to_vec())
        );

        let keys = backend.list_keys("wf:*").await.unwrap();
        assert_eq!(keys, vec!["wf:inst"]);

        assert!(backend.delete("wf:inst").await.unwrap());
        assert_eq!(backend.load("wf:inst").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backend_recovers_keys_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = FileBackend::new(dir.path()).await.unwrap();
            backend.save("wf:inst:checkpoint:cp1", b"snap").await.unwrap();
        }

        let reopened = FileBackend::new(dir.path()).await.unwrap();
        let keys = reopened.list_keys("wf:inst:checkpoint:*").await.unwrap();
        assert_eq!(keys, vec!["wf:inst:checkpoint:cp1"]);
    }
}
