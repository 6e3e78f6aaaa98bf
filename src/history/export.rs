use super::HistoryError;
use crate::models::chat::Session;
use chrono::{ NaiveDate, Utc };
use std::fs;
use std::path::{ Path, PathBuf };

const BACKUP_PREFIX: &str = "bev_chat_backup_";

/// A portable backup of the whole session collection.
#[derive(Debug, Clone)]
pub struct SessionExport {
    pub file_name: String,
    pub document: String,
}

impl SessionExport {
    pub fn build(sessions: &[Session]) -> Result<Self, HistoryError> {
        Self::build_for_date(sessions, Utc::now().date_naive())
    }

    pub fn build_for_date(sessions: &[Session], date: NaiveDate) -> Result<Self, HistoryError> {
        Ok(Self {
            file_name: format!("{}{}.json", BACKUP_PREFIX, date.format("%Y-%m-%d")),
            document: serde_json::to_string_pretty(sessions)?,
        })
    }

    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, HistoryError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.document)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_name_embeds_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 15).unwrap();
        let export = SessionExport::build_for_date(&[], date).unwrap();
        assert_eq!(export.file_name, "bev_chat_backup_2024-12-15.json");
        assert_eq!(export.document, "[]");
    }

    #[test]
    fn writes_document_to_directory() {
        let dir = TempDir::new().unwrap();
        let export = SessionExport::build(&[]).unwrap();
        let path = export.write_to_dir(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "[]");
    }
}
