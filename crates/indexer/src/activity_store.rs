use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use library::{ArtworkReport, ScanReport};
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ACTIVITY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("activity");

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub kind: String,
    pub message: String,
    pub created_at: u64,
    #[serde(default)]
    pub scan: Option<ScanReport>,
}

/// Persisted log of index runs, shared with the track store's database.
#[derive(Clone)]
pub struct ActivityStore {
    db: Arc<Database>,
}

impl ActivityStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn init_tables(&self) -> Result<(), String> {
        let write_txn = self.db.begin_write().map_err(|e| e.to_string())?;
        let _ = write_txn
            .open_table(ACTIVITY_TABLE)
            .map_err(|e| e.to_string())?;
        write_txn.commit().map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn add_event(&self, kind: &str, message: impl Into<String>) -> Result<(), String> {
        self.insert(kind, message.into(), None)
    }

    pub fn record_scan(
        &self,
        report: &ScanReport,
        artwork: Option<&ArtworkReport>,
    ) -> Result<(), String> {
        let mut message = format!(
            "Library scan {}: {} new, {} changed, {} deleted, {} failed in {} ms.",
            if report.cancelled { "cancelled" } else { "finished" },
            report.new,
            report.changed,
            report.deleted,
            report.failed,
            report.elapsed_ms
        );
        if let Some(artwork) = artwork {
            message.push_str(&format!(
                " Artwork: {} albums, {} failed.",
                artwork.albums, artwork.failed
            ));
        }
        self.insert("index", message, Some(report.clone()))
    }

    fn insert(&self, kind: &str, message: String, scan: Option<ScanReport>) -> Result<(), String> {
        let created_at = now_millis();
        let id = format!("{:016}-{}", created_at, Uuid::new_v4());
        let entry = ActivityEntry {
            id: id.clone(),
            kind: kind.to_string(),
            message,
            created_at,
            scan,
        };
        let bytes = bincode::serialize(&entry).map_err(|e| e.to_string())?;
        let write_txn = self.db.begin_write().map_err(|e| e.to_string())?;
        {
            let mut table = write_txn
                .open_table(ACTIVITY_TABLE)
                .map_err(|e| e.to_string())?;
            table
                .insert(id.as_str(), bytes.as_slice())
                .map_err(|e| e.to_string())?;
        }
        write_txn.commit().map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Newest first.
    pub fn list_events(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<ActivityEntry>, usize), String> {
        let read_txn = self.db.begin_read().map_err(|e| e.to_string())?;
        let table = match read_txn.open_table(ACTIVITY_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok((Vec::new(), 0)),
            Err(err) => return Err(err.to_string()),
        };

        let mut all = Vec::new();
        for entry in table.iter().map_err(|err| err.to_string())? {
            let entry = entry.map_err(|err| err.to_string())?;
            let item: ActivityEntry =
                bincode::deserialize(entry.1.value()).map_err(|err| err.to_string())?;
            all.push(item);
        }
        all.sort_by(|a, b| b.id.cmp(&a.id));
        let total = all.len();
        let items = all.into_iter().skip(offset).take(limit).collect();
        Ok((items, total))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, ActivityStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::create(dir.path().join("activity.redb")).unwrap();
        let store = ActivityStore::new(Arc::new(db));
        store.init_tables().unwrap();
        (dir, store)
    }

    #[test]
    fn scan_summaries_are_listed() {
        let (_dir, store) = open_store();
        store.add_event("index", "Library scan started.").unwrap();
        let report = ScanReport {
            new: 3,
            deleted: 1,
            ..ScanReport::default()
        };
        store.record_scan(&report, None).unwrap();

        let (items, total) = store.list_events(10, 0).unwrap();

        assert_eq!(total, 2);
        let summary = items.iter().find(|item| item.scan.is_some()).unwrap();
        assert_eq!(summary.scan.as_ref().unwrap().new, 3);
        assert!(summary.message.contains("3 new"));
    }

    #[test]
    fn paging_skips_and_limits() {
        let (_dir, store) = open_store();
        for idx in 0..5 {
            store.add_event("index", format!("event {}", idx)).unwrap();
        }

        let (items, total) = store.list_events(2, 1).unwrap();

        assert_eq!(total, 5);
        assert_eq!(items.len(), 2);
    }
}
