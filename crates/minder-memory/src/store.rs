//! File-backed long-term record store.

use crate::error::MemoryError;
use crate::model::MemoryRecord;
use log::{debug, info};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const RECORDS_FILE: &str = "records.jsonl";

/// JSONL store for memory records. Appends are cheap; the full set is
/// loaded for every recall, which stays reasonable at personal-assistant
/// scale.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!("initialized record store (root={})", root.display());
        Ok(Self { root })
    }

    fn records_path(&self) -> PathBuf {
        self.root.join(RECORDS_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!("{RECORDS_FILE}.tmp"))
    }

    /// Append one record.
    pub fn append(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.records_path())?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        debug!(
            "stored memory record (id={}, session_id={}, summary_len={})",
            record.id,
            record.source_session_id,
            record.summary_text.len()
        );
        Ok(())
    }

    /// Load every record in insertion order.
    pub fn load(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let path = self.records_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: MemoryRecord = serde_json::from_str(&line)?;
            records.push(record);
        }
        Ok(records)
    }

    /// Rewrite the whole store atomically.
    pub fn rewrite(&self, records: &[MemoryRecord]) -> Result<(), MemoryError> {
        let path = self.records_path();
        let temp_path = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            for record in records {
                let line = serde_json::to_string(record)?;
                writeln!(file, "{line}")?;
            }
        }
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        std::fs::rename(temp_path, path)?;
        Ok(())
    }
}
