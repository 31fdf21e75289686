use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use super::{CacheEntry, CacheStorage, CachedResponse, RequestKey};
use crate::{error::Result, http::request::FetchRequest};

type Partition = DashMap<RequestKey, CacheEntry>;

/// 进程内缓存存储
///
/// 分区列表保持创建顺序，`match_any` 按该顺序查找。
#[derive(Clone, Default)]
pub struct MemoryStorage {
    partitions: Arc<RwLock<Vec<(String, Arc<Partition>)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, name: &str) -> Option<Arc<Partition>> {
        self.partitions
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
    }

    fn open(&self, name: &str) -> Arc<Partition> {
        if let Some(partition) = self.partition(name) {
            return partition;
        }
        let mut partitions = self.partitions.write();
        // 获取写锁期间可能已被其他任务创建
        if let Some((_, partition)) = partitions.iter().find(|(n, _)| n == name) {
            return partition.clone();
        }
        let partition = Arc::new(Partition::new());
        partitions.push((name.to_string(), partition.clone()));
        partition
    }

    /// 分区中的记录数
    pub fn entry_count(&self, name: &str) -> usize {
        self.partition(name).map(|p| p.len()).unwrap_or(0)
    }
}

impl CacheStorage for MemoryStorage {
    async fn put(&self, partition: &str, entry: CacheEntry) -> Result<()> {
        self.open(partition).insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn match_in(
        &self,
        partition: &str,
        request: &FetchRequest,
    ) -> Result<Option<CachedResponse>> {
        let Some(partition) = self.partition(partition) else {
            return Ok(None);
        };
        let found = partition
            .get(&request.key())
            .filter(|entry| entry.matches(request))
            .map(|entry| entry.response.clone());
        Ok(found)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .partitions
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn has(&self, partition: &str) -> Result<bool> {
        Ok(self.partition(partition).is_some())
    }

    async fn delete(&self, partition: &str) -> Result<bool> {
        let mut partitions = self.partitions.write();
        let before = partitions.len();
        partitions.retain(|(name, _)| name != partition);
        Ok(partitions.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue, StatusCode, header::CONTENT_TYPE};

    use super::*;

    fn entry(url: &str, body: &'static str) -> (FetchRequest, CacheEntry) {
        let req = FetchRequest::get(url).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.append("x-custom", HeaderValue::from_static("a"));
        headers.append("x-custom", HeaderValue::from_static("b"));
        let res = CachedResponse::new(StatusCode::OK, headers, body);
        let entry = CacheEntry::new(&req, res);
        (req, entry)
    }

    #[tokio::test]
    async fn test_put_then_match_is_identical() {
        let storage = MemoryStorage::new();
        let (req, entry) = entry("http://site.test/api/data", "payload");
        let expected = entry.response.clone();

        storage.put("dynamic-v1", entry).await.unwrap();
        let found = storage.match_in("dynamic-v1", &req).await.unwrap().unwrap();

        assert_eq!(found, expected);
        let values: Vec<_> = found.headers.get_all("x-custom").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_partition_is_not_created_by_lookup() {
        let storage = MemoryStorage::new();
        let req = FetchRequest::get("http://site.test/").unwrap();
        assert!(storage.match_in("static-v1", &req).await.unwrap().is_none());
        assert!(!storage.has("static-v1").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let storage = MemoryStorage::new();
        let (req, first) = entry("http://site.test/blog", "first");
        let (_, second) = entry("http://site.test/blog", "second");
        storage.put("dynamic-v1", first).await.unwrap();
        storage.put("dynamic-v1", second).await.unwrap();

        let found = storage.match_in("dynamic-v1", &req).await.unwrap().unwrap();
        assert_eq!(found.body, "second");
        assert_eq!(storage.entry_count("dynamic-v1"), 1);
    }

    #[tokio::test]
    async fn test_keys_keep_creation_order_and_delete() {
        let storage = MemoryStorage::new();
        let (req, a) = entry("http://site.test/a.png", "a");
        let (_, b) = entry("http://site.test/a.png", "b");
        storage.put("static-v1", a).await.unwrap();
        storage.put("dynamic-v1", b).await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["static-v1", "dynamic-v1"]);
        let found = storage.match_any(&req).await.unwrap().unwrap();
        assert_eq!(found.body, "a");

        assert!(storage.delete("static-v1").await.unwrap());
        assert!(!storage.delete("static-v1").await.unwrap());
        let found = storage.match_any(&req).await.unwrap().unwrap();
        assert_eq!(found.body, "b");
    }
}
