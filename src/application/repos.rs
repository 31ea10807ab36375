use async_trait::async_trait;
use thiserror::Error;

/// Key under which the selected backend name is persisted.
pub const BACKEND_KEY: &str = "FPCACHE_BACKEND";

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("settings could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Persistent string key/value settings shared with the host.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ConfigStoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), ConfigStoreError>;

    async fn delete(&self, key: &str) -> Result<(), ConfigStoreError>;
}
