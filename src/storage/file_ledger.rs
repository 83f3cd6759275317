use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::configuration::types::LedgerConfig;
use crate::error_handling::types::PersistenceError;
use crate::storage::storage_trait::ResultLedger;
use crate::storage::types::{NewResult, ResultRecord};

/// Result ledger kept as one JSON document per record in a directory.
///
/// Records are only ever created; the ledger offers no update or delete.
pub struct FileResultLedger {
    directory: PathBuf,
}

impl FileResultLedger {
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self, PersistenceError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            error!("Failed to create ledger dir {}: {}", directory.display(), e);
            PersistenceError::WriteFailed(format!("{}: {}", directory.display(), e))
        })?;
        info!("FileResultLedger initialized at {}", directory.display());
        Ok(Self { directory })
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, PersistenceError> {
        Self::new(&config.directory)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", id))
    }

    /// All records, oldest first.
    pub fn records(&self) -> Result<Vec<(String, ResultRecord)>, PersistenceError> {
        let entries = fs::read_dir(&self.directory).map_err(|e| {
            PersistenceError::ReadFailed(format!("{}: {}", self.directory.display(), e))
        })?;

        let mut out = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| PersistenceError::ReadFailed(e.to_string()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s.to_string(),
                None => continue,
            };
            let bytes = fs::read(&path)
                .map_err(|e| PersistenceError::ReadFailed(format!("{}: {}", path.display(), e)))?;
            let record: ResultRecord = serde_json::from_slice(&bytes)
                .map_err(|e| PersistenceError::Malformed(format!("{}: {}", path.display(), e)))?;
            out.push((id, record));
        }
        out.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then(a.0.cmp(&b.0)));
        Ok(out)
    }
}

fn write_record(dir: &Path, target: &Path, record: &ResultRecord) -> Result<(), PersistenceError> {
    let body = serde_json::to_vec_pretty(record)
        .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| PersistenceError::WriteFailed(format!("{}: {}", dir.display(), e)))?;
    tmp.write_all(&body)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PersistenceError::WriteFailed(format!("{}: {}", target.display(), e)))?;
    // persist_noclobber: an existing record is never overwritten.
    tmp.persist_noclobber(target)
        .map_err(|e| PersistenceError::WriteFailed(format!("{}: {}", target.display(), e.error)))?;
    Ok(())
}

#[async_trait]
impl ResultLedger for FileResultLedger {
    async fn add(&self, result: &NewResult) -> Result<String, PersistenceError> {
        let id = Uuid::new_v4().simple().to_string();
        let record = ResultRecord::stamped(result, Utc::now());
        let dir = self.directory.clone();
        let target = self.record_path(&id);

        tokio::task::spawn_blocking(move || write_record(&dir, &target, &record))
            .await
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))??;

        info!("Result {} recorded for {}", id, result.image_url);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn add_appends_stamped_record() {
        let dir = tempdir().unwrap();
        let ledger = FileResultLedger::new(dir.path().join("detections")).unwrap();

        let before = Utc::now();
        let id = ledger
            .add(&NewResult::captured(
                String::from("https://cdn.example.com/a.jpg"),
                String::from("Photo captured"),
            ))
            .await
            .unwrap();

        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 1);
        let (stored_id, record) = &records[0];
        assert_eq!(stored_id, &id);
        assert_eq!(record.image_url, "https://cdn.example.com/a.jpg");
        assert_eq!(record.message, "Photo captured");
        assert!(record.missing_items.is_empty());
        assert!(record.timestamp >= before);
    }

    #[tokio::test]
    async fn records_are_distinct_and_ordered() {
        let dir = tempdir().unwrap();
        let ledger = FileResultLedger::new(dir.path()).unwrap();

        let first = ledger
            .add(&NewResult::captured(String::from("u1"), String::from("m")))
            .await
            .unwrap();
        let second = ledger
            .add(&NewResult::captured(String::from("u2"), String::from("m")))
            .await
            .unwrap();

        assert_ne!(first, second);
        let urls: Vec<String> = ledger
            .records()
            .unwrap()
            .into_iter()
            .map(|(_, r)| r.image_url)
            .collect();
        assert_eq!(urls, vec!["u1", "u2"]);
    }

    #[test]
    fn record_wire_format() {
        let record = ResultRecord {
            image_url: String::from("u"),
            timestamp: Utc::now(),
            message: String::from("m"),
            missing_items: vec![],
        };
        let value = serde_json::to_value(&record).unwrap();
        let mut keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["image_url", "message", "missing_items", "timestamp"]);
    }
}
