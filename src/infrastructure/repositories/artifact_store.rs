use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Blob storage for finished audio and scratch checkpoints.
///
/// Keys are relative, slash-separated paths such as `audio/my-item-1a2b3c4d.mp3`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn exists(&self, key: &str) -> AppResult<bool>;

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// Store `data` under `key`, replacing any previous value. Returns the
    /// public reference of the stored artifact.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<String>;

    /// Returns whether something was removed
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// Keys under `prefix`, sorted
    async fn list(&self, prefix: &str) -> AppResult<Vec<String>>;

    /// Delete every key under `prefix`; returns the number removed
    async fn delete_prefix(&self, prefix: &str) -> AppResult<usize> {
        let mut removed = 0;
        for key in self.list(prefix).await? {
            if self.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Public reference for `key` without touching storage
    fn reference(&self, key: &str) -> String;
}

fn validate_key(key: &str) -> AppResult<()> {
    let path = Path::new(key);
    let valid = !key.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("invalid artifact key '{}'", key)))
    }
}

/// Artifacts as files below a base directory
pub struct FilesystemArtifactStore {
    base_path: PathBuf,
    public_base_url: Option<String>,
}

impl FilesystemArtifactStore {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    async fn collect_files(&self, dir: PathBuf, keys: &mut Vec<String>) -> AppResult<()> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let is_temp = path.extension().is_some_and(|ext| ext == "tmp");
                if is_temp {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.base_path) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    fn backend(&self) -> &'static str {
        "filesystem"
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &path).await?;

        tracing::debug!(
            key = %key,
            size = data.len(),
            content_type = %content_type,
            "Artifact stored"
        );

        Ok(self.reference(key))
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<String>> {
        let prefix = prefix.trim_end_matches('/');
        let start = if prefix.is_empty() {
            self.base_path.clone()
        } else {
            self.path_for(prefix)?
        };

        let mut keys = Vec::new();
        self.collect_files(start, &mut keys).await?;
        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<usize> {
        let removed = self.list(prefix).await?;
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            for key in &removed {
                self.delete(key).await?;
            }
            return Ok(removed.len());
        }

        let dir = self.path_for(prefix)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(removed.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn reference(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base, key),
            None => self.base_path.join(key).to_string_lossy().into_owned(),
        }
    }
}

/// Process-local artifact store, used by tests and ephemeral deployments
#[derive(Default)]
pub struct InMemoryArtifactStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        validate_key(key)?;
        Ok(self.objects.read().contains_key(key))
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.objects.read().get(key).cloned())
    }

    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> AppResult<String> {
        validate_key(key)?;
        self.objects.write().insert(key.to_string(), data.to_vec());
        Ok(self.reference(key))
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        validate_key(key)?;
        Ok(self.objects.write().remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<String>> {
        let prefix = prefix.trim_end_matches('/');
        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|key| {
                prefix.is_empty()
                    || key
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn reference(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}
