use crate::error::AppResult;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A JSON file used as a small document database.
///
/// The whole document is read, mutated in memory and written back through a
/// temp file + rename, so readers never see a half-written file. All
/// mutations go through one async mutex, which serializes writers inside this
/// process only; two processes sharing the file still race (last writer wins).
pub struct JsonDocument<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Current document; a missing file reads as the default document
    pub async fn load(&self) -> AppResult<T> {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Atomic read-modify-write
    pub async fn update<R, F>(&self, mutate: F) -> AppResult<R>
    where
        F: FnOnce(&mut T) -> R + Send,
    {
        let _guard = self.lock.lock().await;
        let mut document = self.read_unlocked().await?;
        let result = mutate(&mut document);
        self.write_unlocked(&document).await?;
        Ok(result)
    }

    async fn read_unlocked(&self) -> AppResult<T> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(T::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_unlocked(&self, document: &T) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(document)?;
        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
