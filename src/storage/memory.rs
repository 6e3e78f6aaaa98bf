use super::{ check_quota, KeyValueStore, StorageError };
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_quota(self.quota, value)?;
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_rejects_oversized_values_and_keeps_old_one() {
        let storage = MemoryStorage::with_quota(Some(4));
        storage.set("k", "abcd").unwrap();
        let err = storage.set("k", "abcde").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { size: 5, limit: 4 }));
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("abcd"));
    }
}
