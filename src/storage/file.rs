use super::{ check_quota, KeyValueStore, StorageError };
use std::fs;
use std::io::{ ErrorKind, Write };
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// One JSON file per key inside a data directory.
pub struct FileStorage {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileStorage {
    pub fn open(dir: PathBuf, quota: Option<usize>) -> Result<Self, StorageError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, quota })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid =
            !key.is_empty() &&
            key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_quota(self.quota, value)?;
        let path = self.path_for(key)?;

        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(value.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file.persist(&path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_key_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().to_path_buf(), None).unwrap();
        assert_eq!(storage.get("chat_sessions").unwrap(), None);
    }

    #[test]
    fn set_then_get_and_remove() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().join("nested"), None).unwrap();
        storage.set("app_settings", "{\"language\":\"ar\"}").unwrap();
        assert_eq!(storage.get("app_settings").unwrap().as_deref(), Some("{\"language\":\"ar\"}"));
        assert!(dir.path().join("nested").join("app_settings.json").exists());

        storage.remove("app_settings").unwrap();
        assert_eq!(storage.get("app_settings").unwrap(), None);
        storage.remove("app_settings").unwrap();
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().to_path_buf(), None).unwrap();
        assert!(matches!(storage.set("../escape", "x"), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn quota_is_enforced_before_writing() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().to_path_buf(), Some(3)).unwrap();
        assert!(matches!(storage.set("k", "toolong"), Err(StorageError::QuotaExceeded { .. })));
        assert_eq!(storage.get("k").unwrap(), None);
    }
}
