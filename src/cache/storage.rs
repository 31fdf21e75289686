use tracing::info;

use super::{CacheEntry, CacheStorage, CachedResponse, DiskStorage, MemoryStorage};
use crate::{
    config::{StorageKind, StorageSettings},
    error::Result,
    http::request::FetchRequest,
};

/// 根据配置选择的存储后端
#[derive(Clone)]
pub enum Storage {
    Memory(MemoryStorage),
    Disk(DiskStorage),
}

impl Storage {
    pub fn from_settings(settings: &StorageSettings) -> Self {
        match settings.kind {
            StorageKind::Memory => {
                info!("Using in-memory cache storage");
                Storage::Memory(MemoryStorage::new())
            }
            StorageKind::Disk => {
                info!("Using disk cache storage at {}", settings.path);
                Storage::Disk(DiskStorage::new(&settings.path))
            }
        }
    }
}

impl CacheStorage for Storage {
    async fn put(&self, partition: &str, entry: CacheEntry) -> Result<()> {
        match self {
            Storage::Memory(s) => s.put(partition, entry).await,
            Storage::Disk(s) => s.put(partition, entry).await,
        }
    }

    async fn match_in(
        &self,
        partition: &str,
        request: &FetchRequest,
    ) -> Result<Option<CachedResponse>> {
        match self {
            Storage::Memory(s) => s.match_in(partition, request).await,
            Storage::Disk(s) => s.match_in(partition, request).await,
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        match self {
            Storage::Memory(s) => s.keys().await,
            Storage::Disk(s) => s.keys().await,
        }
    }

    async fn has(&self, partition: &str) -> Result<bool> {
        match self {
            Storage::Memory(s) => s.has(partition).await,
            Storage::Disk(s) => s.has(partition).await,
        }
    }

    async fn delete(&self, partition: &str) -> Result<bool> {
        match self {
            Storage::Memory(s) => s.delete(partition).await,
            Storage::Disk(s) => s.delete(partition).await,
        }
    }
}
