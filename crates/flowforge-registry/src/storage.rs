//! Content-addressed artifact store (C10): scheme-URI addressed blob storage with a local
//! filesystem backend and an in-memory test double behind the same trait.

use crate::content_hash::ContentHash;
use async_trait::async_trait;
use flowforge_core::error::{ForgeError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Result of a successful [`ArtifactStore::put`].
#[derive(Debug, Clone)]
pub struct PutResult {
    pub uri: String,
    pub sha256: String,
    pub size: u64,
    pub local_path: Option<PathBuf>,
}

/// Strips, replaces `\` with `/`, and rejects empty, absolute, or traversal-bearing paths.
/// Returns the normalized `/`-joined path with no leading or trailing slash.
pub fn normalize_path(path: &str) -> Result<String> {
    let cleaned = path.trim().replace('\\', "/");
    if cleaned.is_empty() || cleaned.starts_with('/') {
        return Err(ForgeError::Validation(format!("invalid artifact path: {path:?}")));
    }
    let mut segments = Vec::new();
    for segment in cleaned.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(ForgeError::Validation(format!("invalid artifact path: {path:?}")));
        }
        segments.push(segment);
    }
    if segments.is_empty() {
        return Err(ForgeError::Validation(format!("invalid artifact path: {path:?}")));
    }
    Ok(segments.join("/"))
}

fn strip_scheme<'a>(uri: &'a str, scheme: &str) -> Result<&'a str> {
    let prefix = format!("{scheme}://");
    uri.strip_prefix(&prefix)
        .ok_or_else(|| ForgeError::Validation(format!("uri {uri:?} is not a {scheme}:// uri")))
}

/// Content-addressed blob storage, addressed by scheme URI (`local://`, `memory://`).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<PutResult>;
    async fn get(&self, uri: &str) -> Result<Vec<u8>>;
    async fn exists(&self, uri: &str) -> Result<bool>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete(&self, uri: &str) -> Result<()>;
}

/// Writes artifacts under a filesystem root, using an atomic temp-file-then-rename write so a
/// reader never observes a partially written file.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalArtifactStore { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<PutResult> {
        let normalized = normalize_path(path)?;
        let full_path = self.root.join(&normalized);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ForgeError::Io)?;
        }
        let tmp_path = full_path.with_extension(format!(
            "{}.tmp",
            full_path.extension().and_then(|e| e.to_str()).unwrap_or("bin")
        ));
        tokio::fs::write(&tmp_path, &bytes).await.map_err(ForgeError::Io)?;
        tokio::fs::rename(&tmp_path, &full_path).await.map_err(ForgeError::Io)?;

        let sha256 = ContentHash::from_bytes(&bytes);
        Ok(PutResult {
            uri: format!("local://{normalized}"),
            sha256: sha256.to_string(),
            size: bytes.len() as u64,
            local_path: Some(full_path),
        })
    }

    async fn get(&self, uri: &str) -> Result<Vec<u8>> {
        let normalized = strip_scheme(uri, "local")?;
        let full_path = self.root.join(normalized);
        tokio::fs::read(&full_path)
            .await
            .map_err(|e| ForgeError::NotFound(format!("artifact {uri} not found: {e}")))
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let normalized = strip_scheme(uri, "local")?;
        Ok(tokio::fs::try_exists(self.root.join(normalized)).await.unwrap_or(false))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let normalized = if prefix.trim().is_empty() { String::new() } else { normalize_path(prefix)? };
        let base = self.root.join(&normalized);
        let mut uris = Vec::new();
        collect_files(&base, &self.root, &mut uris).await?;
        uris.sort();
        Ok(uris)
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let normalized = strip_scheme(uri, "local")?;
        let full_path = self.root.join(normalized);
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ForgeError::Io(e)),
        }
    }
}

async fn collect_files(dir: &Path, root: &Path, out: &mut Vec<String>) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ForgeError::Io(e)),
    };
    while let Some(entry) = entries.next_entry().await.map_err(ForgeError::Io)? {
        let path = entry.path();
        if path.is_dir() {
            Box::pin(collect_files(&path, root, out)).await?;
        } else {
            let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            out.push(format!("local://{relative}"));
        }
    }
    Ok(())
}

/// Keeps every blob in a process-local map; used by unit tests so they never touch a file.
#[derive(Default)]
pub struct MemoryArtifactStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        MemoryArtifactStore::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<PutResult> {
        let normalized = normalize_path(path)?;
        let sha256 = ContentHash::from_bytes(&bytes);
        let size = bytes.len() as u64;
        self.data.write().await.insert(normalized.clone(), bytes);
        Ok(PutResult { uri: format!("memory://{normalized}"), sha256: sha256.to_string(), size, local_path: None })
    }

    async fn get(&self, uri: &str) -> Result<Vec<u8>> {
        let normalized = strip_scheme(uri, "memory")?;
        self.data
            .read()
            .await
            .get(normalized)
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(format!("artifact {uri} not found")))
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let normalized = strip_scheme(uri, "memory")?;
        Ok(self.data.read().await.contains_key(normalized))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let normalized = if prefix.trim().is_empty() { String::new() } else { normalize_path(prefix)? };
        let mut uris: Vec<String> = self
            .data
            .read()
            .await
            .keys()
            .filter(|key| normalized.is_empty() || key.starts_with(&normalized))
            .map(|key| format!("memory://{key}"))
            .collect();
        uris.sort();
        Ok(uris)
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let normalized = strip_scheme(uri, "memory")?;
        self.data.write().await.remove(normalized);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_rejects_traversal_and_absolute() {
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("/etc/passwd").is_err());
        assert!(normalize_path("a/../b").is_err());
        assert!(normalize_path("").is_err());
        assert!(normalize_path("a//b").is_err());
        assert_eq!(normalize_path("a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(normalize_path(r"a\b.txt").unwrap(), "a/b.txt");
    }

    #[tokio::test]
    async fn memory_store_put_get_roundtrip() {
        let store = MemoryArtifactStore::new();
        let result = store.put("agents/demo/run-1/workflow.yml", b"data".to_vec()).await.unwrap();
        assert_eq!(result.uri, "memory://agents/demo/run-1/workflow.yml");
        assert_eq!(result.size, 4);
        assert!(store.exists(&result.uri).await.unwrap());
        assert_eq!(store.get(&result.uri).await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn memory_store_list_returns_sorted_prefix_matches() {
        let store = MemoryArtifactStore::new();
        store.put("agents/demo/run-1/b.json", b"1".to_vec()).await.unwrap();
        store.put("agents/demo/run-1/a.json", b"2".to_vec()).await.unwrap();
        store.put("agents/other/run-2/c.json", b"3".to_vec()).await.unwrap();
        let uris = store.list("agents/demo").await.unwrap();
        assert_eq!(
            uris,
            vec!["memory://agents/demo/run-1/a.json".to_string(), "memory://agents/demo/run-1/b.json".to_string()]
        );
    }

    #[tokio::test]
    async fn memory_store_get_missing_is_not_found() {
        let store = MemoryArtifactStore::new();
        let err = store.get("memory://nope.txt").await.unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn local_store_put_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let result = store.put("agents/demo/run-1/workflow.yml", b"hello".to_vec()).await.unwrap();
        assert!(result.local_path.unwrap().exists());
        assert_eq!(store.get(&result.uri).await.unwrap(), b"hello");
        assert!(store.exists(&result.uri).await.unwrap());
        store.delete(&result.uri).await.unwrap();
        assert!(!store.exists(&result.uri).await.unwrap());
    }

    #[tokio::test]
    async fn local_store_get_rejects_wrong_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        assert!(store.get("memory://foo").await.is_err());
    }
}
