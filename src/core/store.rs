//! File-backed persistence for job records and artifacts.
//!
//! Layout under the store root:
//!
//! ```text
//! jobs/{id}/job.json
//! jobs/{id}/artifacts/{name}.json
//! jobs/{id}/exports/{file}
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{ArtifactItem, ArtifactKind, Job};

/// Where an object landed and how large it is
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub path: String,
    pub size_bytes: u64,
}

/// Key-value object storage
#[async_trait]
pub trait Store: Send + Sync {
    /// Write an object durably, replacing any previous value
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<StoredObject>;

    /// Read an object, `None` if absent
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Store rooted at a local directory
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
            anyhow::bail!("Invalid store key: '{}'", key);
        }
        Ok(self.root.join(key))
    }

    fn collect_keys<'a>(
        &'a self,
        dir: PathBuf,
        out: &'a mut Vec<String>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to list {}", dir.display()))
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    self.collect_keys(path, out).await?;
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    // Skip in-flight temp files
                    if !key.ends_with(".tmp") {
                        out.push(key);
                    }
                }
            }
            Ok(())
        })
    }
}

#[async_trait]
impl Store for FileStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<StoredObject> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        let mut file = fs::File::create(&tmp)
            .await
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("Failed to sync {}", tmp.display()))?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move {} into place", path.display()))?;

        debug!(key, bytes = bytes.len(), "Stored object");
        Ok(StoredObject {
            path: path.display().to_string(),
            size_bytes: bytes.len() as u64,
        })
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(self.root.clone(), &mut keys).await?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

fn job_key(job_id: Uuid) -> String {
    format!("jobs/{}/job.json", job_id)
}

fn artifact_key(job_id: Uuid, name: &str) -> String {
    format!("jobs/{}/artifacts/{}.json", job_id, name)
}

fn export_key(job_id: Uuid, file_name: &str) -> String {
    format!("jobs/{}/exports/{}", job_id, file_name)
}

/// Typed JSON helpers over a [`Store`]
pub struct JobRepository {
    store: Box<dyn Store>,
}

impl JobRepository {
    pub fn new(store: impl Store + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Repository backed by a [`FileStore`] at `root`
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self::new(FileStore::new(root))
    }

    pub async fn save_job(&self, job: &Job) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(job).context("Failed to serialize job")?;
        self.store.save(&job_key(job.id), &bytes).await?;
        Ok(())
    }

    /// Load every persisted job record. Unreadable records are skipped.
    pub async fn load_jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for key in self.store.list("jobs/").await? {
            if !key.ends_with("/job.json") {
                continue;
            }
            let Some(bytes) = self.store.load(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<Job>(&bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(%key, error = %e, "Skipping unreadable job record"),
            }
        }
        Ok(jobs)
    }

    /// Persist a JSON artifact and describe it for the manifest
    pub async fn save_artifact<T: Serialize + Sync>(
        &self,
        job_id: Uuid,
        name: &str,
        value: &T,
    ) -> Result<ArtifactItem> {
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("Failed to serialize artifact '{}'", name))?;
        let stored = self.store.save(&artifact_key(job_id, name), &bytes).await?;
        Ok(ArtifactItem::new(
            name,
            ArtifactKind::Artifact,
            stored.path,
            "application/json",
            stored.size_bytes,
        ))
    }

    pub async fn load_artifact<T: DeserializeOwned>(
        &self,
        job_id: Uuid,
        name: &str,
    ) -> Result<Option<T>> {
        let Some(bytes) = self.store.load(&artifact_key(job_id, name)).await? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse artifact '{}' for job {}", name, job_id))?;
        Ok(Some(value))
    }

    /// Persist a rendered export file
    pub async fn write_export(
        &self,
        job_id: Uuid,
        name: &str,
        file_name: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<ArtifactItem> {
        let stored = self.store.save(&export_key(job_id, file_name), body).await?;
        Ok(ArtifactItem::new(
            name,
            ArtifactKind::Export,
            stored.path,
            content_type,
            stored.size_bytes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        let stored = store.save("jobs/a/job.json", b"{}").await.unwrap();
        assert_eq!(stored.size_bytes, 2);
        assert!(Path::new(&stored.path).exists());

        assert_eq!(store.load("jobs/a/job.json").await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.load("jobs/b/job.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        store.save("k.json", b"first").await.unwrap();
        store.save("k.json", b"second").await.unwrap();
        assert_eq!(store.load("k.json").await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.list("").await.unwrap(), vec!["k.json"]);
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        store.save("jobs/1/job.json", b"1").await.unwrap();
        store.save("jobs/1/artifacts/tracks.json", b"2").await.unwrap();
        store.save("other/x", b"3").await.unwrap();

        let keys = store.list("jobs/").await.unwrap();
        assert_eq!(keys, vec!["jobs/1/artifacts/tracks.json", "jobs/1/job.json"]);
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        assert!(store.save("../escape", b"x").await.is_err());
        assert!(store.load("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path().join("missing"));
        assert!(store.list("").await.unwrap().is_empty());
    }
}
