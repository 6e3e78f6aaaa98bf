mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::cli::Args;
use log::info;
use std::sync::Arc;
use thiserror::Error;

pub const SESSIONS_KEY: &str = "chat_sessions";
pub const SETTINGS_KEY: &str = "app_settings";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage quota exceeded: {size} bytes requested, limit is {limit} bytes")] QuotaExceeded {
        size: usize,
        limit: usize,
    },

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

/// String-keyed durable storage. Reads and writes are synchronous; callers
/// treat every failure as recoverable.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

fn check_quota(limit: Option<usize>, value: &str) -> Result<(), StorageError> {
    match limit {
        Some(limit) if value.len() > limit => {
            Err(StorageError::QuotaExceeded { size: value.len(), limit })
        }
        _ => Ok(()),
    }
}

pub fn create_storage(args: &Args) -> Result<Arc<dyn KeyValueStore>, StorageError> {
    let quota = Some(args.storage_quota_bytes).filter(|q| *q > 0);
    if args.in_memory {
        info!("Using in-memory storage; nothing will survive this process");
        return Ok(Arc::new(MemoryStorage::with_quota(quota)));
    }

    let dir = args.resolve_data_dir();
    info!("Chat sessions will be stored in: {}", dir.display());
    let store = FileStorage::open(dir, quota)?;
    Ok(Arc::new(store))
}
