use std::{
    future::Future,
    io::{ErrorKind, SeekFrom},
    ops::Deref,
    path::PathBuf,
};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::debug;

use super::entities::TimeData;

/// Interface for abstracting the key-value store holding timer state. Nothing is cached between
/// calls. Mutations go through [SiteStore::update] so that a read and the write based on it are
/// one unit, even with another process sharing the store.
pub trait SiteStore {
    /// Reads both keys.
    fn load(&self) -> impl Future<Output = Result<TimeData>>;

    /// Applies `change` to the current state and persists the result, holding off every other
    /// writer meanwhile. Returns whatever `change` returns.
    fn update<R>(&self, change: impl FnOnce(&mut TimeData) -> R)
        -> impl Future<Output = Result<R>>;
}

impl<T: Deref> SiteStore for T
where
    T::Target: SiteStore,
{
    fn load(&self) -> impl Future<Output = Result<TimeData>> {
        self.deref().load()
    }

    fn update<R>(
        &self,
        change: impl FnOnce(&mut TimeData) -> R,
    ) -> impl Future<Output = Result<R>> {
        self.deref().update(change)
    }
}

/// The main realization of [SiteStore]. Keeps the document in a single JSON file guarded by an
/// advisory lock, so the CLI and a running host can share it.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    async fn read_document(file: &mut File) -> Result<TimeData> {
        file.seek(SeekFrom::Start(0)).await?;
        let mut content = String::new();
        file.read_to_string(&mut content).await?;
        if content.trim().is_empty() {
            return Ok(TimeData::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_document(file: &mut File, data: &TimeData) -> Result<()> {
        let content = serde_json::to_vec_pretty(data)?;
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        file.write_all(&content).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Unchanged documents are not rewritten.
    async fn modify<R>(file: &mut File, change: impl FnOnce(&mut TimeData) -> R) -> Result<R> {
        let mut data = Self::read_document(file).await?;
        let before = data.clone();
        let result = change(&mut data);
        if data != before {
            Self::write_document(file, &data).await?;
        }
        Ok(result)
    }
}

impl SiteStore for JsonFileStore {
    async fn load(&self) -> Result<TimeData> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state at {:?} yet", self.path);
                return Ok(TimeData::default());
            }
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let result = Self::read_document(&mut file).await;
        file.unlock_async().await?;
        result.with_context(|| format!("Failed to read state from {:?}", self.path))
    }

    async fn update<R>(&self, change: impl FnOnce(&mut TimeData) -> R) -> Result<R> {
        let mut file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {:?}", self.path))?;

        file.lock_exclusive()?;
        let result = Self::modify(&mut file, change).await;
        file.unlock_async().await?;
        result.with_context(|| format!("Failed to update state in {:?}", self.path))
    }
}

#[cfg(test)]
pub use memory::MemoryStore;
