//! Filesystem backend, the always-available default.
//!
//! Layout: `{root}/{key[0..2]}/{key}`. Each file starts with a header line
//! `fpcache1 {expires_unix}\n` followed by the page body. Writes go through a temp
//! file and a rename so readers never see a partial page. Clearing renames the root
//! aside before deleting it, so writers racing the clear start a fresh tree.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::{BackendKind, CacheBackend, StoreError};
use crate::cache::keys::CacheKey;

const HEADER_MAGIC: &str = "fpcache1";
const FAN_OUT_CHARS: usize = 2;

#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// The directory is created lazily on first write.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let key = key.as_str();
        let bucket = key.get(..FAN_OUT_CHARS).unwrap_or("__");
        self.root.join(bucket).join(key)
    }

    fn purge_path(&self) -> PathBuf {
        let name = self
            .root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fpcache".to_string());
        self.root
            .with_file_name(format!(".{name}-purge-{}", Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Files
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => Bytes::from(raw),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let (expires_at, body) = decode_entry(key, raw)?;
        if expires_at <= OffsetDateTime::now_utc().unix_timestamp() {
            debug!(key = %key, "Expired page cache file removed");
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(body))
    }

    async fn set(&self, key: &CacheKey, content: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let Some(parent) = path.parent() else {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                reason: "entry path has no parent",
            });
        };
        fs::create_dir_all(parent).await?;

        let expires_at = expiry_timestamp(ttl);
        let mut payload = Vec::with_capacity(content.len() + 32);
        payload.extend_from_slice(format!("{HEADER_MAGIC} {expires_at}\n").as_bytes());
        payload.extend_from_slice(&content);

        let temp = parent.join(format!(".{key}.{}.tmp", Uuid::new_v4().simple()));
        if let Err(err) = fs::write(&temp, &payload).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let purge = self.purge_path();
        match fs::rename(&self.root, &purge).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        fs::remove_dir_all(&purge).await?;
        Ok(())
    }
}

fn expiry_timestamp(ttl: Duration) -> i64 {
    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    OffsetDateTime::now_utc()
        .unix_timestamp()
        .saturating_add(ttl_secs)
}

fn decode_entry(key: &CacheKey, raw: Bytes) -> Result<(i64, Bytes), StoreError> {
    let corrupt = |reason: &'static str| StoreError::Corrupt {
        key: key.to_string(),
        reason,
    };

    let newline = raw
        .iter()
        .position(|byte| *byte == b'\n')
        .ok_or_else(|| corrupt("missing header"))?;
    let header = std::str::from_utf8(&raw[..newline]).map_err(|_| corrupt("header is not utf-8"))?;
    let expires_at = header
        .strip_prefix(HEADER_MAGIC)
        .map(str::trim)
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(|| corrupt("malformed header"))?;

    Ok((expires_at, raw.slice(newline + 1..)))
}
