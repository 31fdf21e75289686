use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use super::{CacheEntry, CacheStorage, CachedResponse, RequestKey};
use crate::{
    error::{Error, Result},
    http::request::FetchRequest,
};

/// 临时文件序号，避免并发写同一个键时互相覆盖临时文件
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

const ENTRY_EXT: &str = "entry";

/// 磁盘缓存存储
///
/// 目录结构：
/// ```text
/// <root>/
///     static-v1.0.0/
///         <md5(key)>.entry
///     dynamic-v1.0.0/
///         <md5(key)>.entry
/// ```
///
/// 每个 entry 文件第一行是 JSON 元数据，换行之后是原始响应体。
/// 写入先落到临时文件再 rename，读者只会看到完整的记录。
#[derive(Clone, Debug)]
pub struct DiskStorage {
    root: Arc<PathBuf>,
}

/// entry 文件中的元数据
#[derive(Serialize, Deserialize, Debug)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, Vec<u8>)>,
    vary: Vec<(String, Option<Vec<u8>>)>,
    stored_at: DateTime<Utc>,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf> {
        validate_partition_name(partition)?;
        Ok(self.root.join(partition))
    }

    fn entry_path(&self, partition: &str, key: &RequestKey) -> Result<PathBuf> {
        let digest = md5::compute(key.to_string().as_bytes());
        Ok(self
            .partition_dir(partition)?
            .join(format!("{digest:x}.{ENTRY_EXT}")))
    }
}

/// 分区名只能是单个路径片段
fn validate_partition_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.starts_with('.');
    if invalid {
        return Err(Error::Storage(format!("invalid partition name: {name:?}")));
    }
    Ok(())
}

fn encode_entry(entry: &CacheEntry) -> Result<Vec<u8>> {
    let meta = EntryMeta {
        key: entry.key.clone(),
        status: entry.response.status.as_u16(),
        headers: entry
            .response
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.as_bytes().to_vec()))
            .collect(),
        vary: entry
            .vary
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.as_ref().map(|v| v.as_bytes().to_vec()),
                )
            })
            .collect(),
        stored_at: entry.stored_at,
    };
    let mut buf = serde_json::to_vec(&meta)?;
    buf.push(b'\n');
    buf.extend_from_slice(&entry.response.body);
    Ok(buf)
}

fn decode_entry(raw: Vec<u8>) -> Result<CacheEntry> {
    let split = raw
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| Error::Storage("corrupted cache entry".to_string()))?;
    let meta: EntryMeta = serde_json::from_slice(&raw[..split])?;
    let body = Bytes::from(raw).slice(split + 1..);

    let mut headers = HeaderMap::new();
    for (name, value) in meta.headers {
        headers.append(
            HeaderName::from_bytes(name.as_bytes()).map_err(http::Error::from)?,
            HeaderValue::from_bytes(&value).map_err(http::Error::from)?,
        );
    }
    let vary = meta
        .vary
        .into_iter()
        .map(|(name, value)| -> Result<(HeaderName, Option<HeaderValue>)> {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(http::Error::from)?;
            let value = value
                .map(|v| HeaderValue::from_bytes(&v))
                .transpose()
                .map_err(http::Error::from)?;
            Ok((name, value))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CacheEntry {
        key: meta.key,
        vary,
        response: CachedResponse {
            status: StatusCode::from_u16(meta.status).map_err(http::Error::from)?,
            headers,
            body,
            oversized: false,
        },
        stored_at: meta.stored_at,
    })
}

impl CacheStorage for DiskStorage {
    async fn put(&self, partition: &str, entry: CacheEntry) -> Result<()> {
        let dir = self.partition_dir(partition)?;
        fs::create_dir_all(&dir).await?;

        let path = self.entry_path(partition, &entry.key)?;
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".{}-{}.tmp", std::process::id(), seq));

        fs::write(&tmp, encode_entry(&entry)?).await?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        debug!("Stored {} in {}", entry.key, partition);
        Ok(())
    }

    async fn match_in(
        &self,
        partition: &str,
        request: &FetchRequest,
    ) -> Result<Option<CachedResponse>> {
        let path = self.entry_path(partition, &request.key())?;
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry = decode_entry(raw)?;
        Ok(entry.matches(request).then_some(entry.response))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut dir = match fs::read_dir(self.root.as_path()).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(err.into()),
        };
        let mut names = vec![];
        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            match item.file_name().into_string() {
                Ok(name) if validate_partition_name(&name).is_ok() => names.push(name),
                Ok(_) => {}
                Err(name) => warn!("Skip non utf-8 partition directory {:?}", name),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn has(&self, partition: &str) -> Result<bool> {
        match fs::metadata(self.partition_dir(partition)?).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, partition: &str) -> Result<bool> {
        match fs::remove_dir_all(self.partition_dir(partition)?).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
