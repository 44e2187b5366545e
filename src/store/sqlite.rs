//! SQLite-backed record store
//!
//! Documents live in one table per configured collection: the nested channel
//! mapping is stored as a JSON text body, annotations as plain columns. The
//! date column holds the ISO-ish capture string, so the time filter is a
//! lexicographic comparison.

use super::{RecordStore, StoreError, StoredRecord};
use crate::pipeline::types::{timestamp_string, ChannelData, Record, Validation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteRecordStore {
    /// Open (or create) the store at `path` with one table per collection.
    pub fn open(path: &str, collection: &str) -> Result<Self, StoreError> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::InvalidCollection(collection.to_string()));
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Open(e.to_string()))?;

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                device        TEXT NOT NULL,
                date          TEXT NOT NULL,
                data          TEXT,
                label         INTEGER,
                validation    TEXT NOT NULL,
                outlier_model TEXT,
                processed     INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_processed_date
                ON {table}(processed, date);
            "#,
            table = collection
        ))
        .map_err(|e| StoreError::Open(e.to_string()))?;

        log::info!("✅ Record store ready: {} [{}]", path, collection);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: collection.to_string(),
        })
    }

    fn insert_one(conn: &Connection, table: &str, record: &Record) -> Result<(), StoreError> {
        let data_json = match &record.data {
            Some(data) => Some(
                serde_json::to_string(data).map_err(|e| StoreError::Query(e.to_string()))?,
            ),
            None => None,
        };

        conn.execute(
            &format!(
                "INSERT INTO {} (device, date, data, label, validation, outlier_model, processed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                table
            ),
            rusqlite::params![
                record.device,
                record.date,
                data_json,
                record.label,
                record.validation.as_str(),
                record.outlier_model,
                record.processed as i64,
            ],
        )
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &Record) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::insert_one(&conn, &self.table, record)
    }

    async fn insert_batch(&self, records: &[Record]) -> Result<(), StoreError> {
        if records.is_empty() {
            log::warn!("⚠️ No records to insert");
            return Ok(());
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        for record in records {
            Self::insert_one(&tx, &self.table, record)?;
        }
        tx.commit().map_err(|e| StoreError::Query(e.to_string()))?;

        log::info!("✅ {} records inserted", records.len());
        Ok(())
    }

    async fn fetch_unprocessed(&self, since: DateTime<Utc>) -> Result<Vec<StoredRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, device, date, data, label, validation, outlier_model, processed
                 FROM {} WHERE processed = 0 AND date >= ?1 ORDER BY id",
                self.table
            ))
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows = stmt
            .query_map([timestamp_string(since)], |row| {
                let data_json: Option<String> = row.get(3)?;
                let validation: String = row.get(5)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    data_json,
                    row.get::<_, Option<i64>>(4)?,
                    validation,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut fetched = Vec::new();
        for row in rows {
            let (id, device, date, data_json, label, validation, outlier_model, processed) =
                row.map_err(|e| StoreError::Query(e.to_string()))?;

            let data: Option<ChannelData> = match data_json {
                Some(json) => Some(
                    serde_json::from_str(&json).map_err(|e| StoreError::Query(e.to_string()))?,
                ),
                None => None,
            };
            let validation = Validation::from_str(&validation).ok_or_else(|| {
                StoreError::Query(format!("unknown validation state '{}'", validation))
            })?;

            fetched.push(StoredRecord {
                id,
                record: Record {
                    device,
                    date,
                    data,
                    label,
                    validation,
                    outlier_model,
                    processed: processed != 0,
                },
            });
        }

        Ok(fetched)
    }

    async fn mark_processed(&self, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "UPDATE {} SET processed = 1 WHERE id IN ({})",
                self.table, placeholders
            ),
            rusqlite::params_from_iter(ids.iter()),
        )
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    fn make_record(device: &str, at: DateTime<Utc>) -> Record {
        let mut series = BTreeMap::new();
        series.insert("0".to_string(), 1.5);
        let mut data = ChannelData::new();
        data.insert("chest_acc_x".to_string(), series);

        Record {
            device: device.to_string(),
            date: timestamp_string(at),
            data: Some(data),
            label: Some(2),
            validation: Validation::Checked,
            outlier_model: Some("IsolationForest".to_string()),
            processed: false,
        }
    }

    fn open_store() -> (NamedTempFile, SqliteRecordStore) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteRecordStore::open(file.path().to_str().unwrap(), "sensors").unwrap();
        (file, store)
    }

    #[tokio::test]
    async fn test_insert_and_fetch_round_trip() {
        let (_file, store) = open_store();
        let now = Utc::now();

        store.insert(&make_record("sensor01", now)).await.unwrap();

        let fetched = store
            .fetch_unprocessed(now - Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].record.device, "sensor01");
        assert_eq!(fetched[0].record.label, Some(2));
        assert_eq!(fetched[0].record.validation, Validation::Checked);
        assert!(!fetched[0].record.processed);
    }

    #[tokio::test]
    async fn test_date_filter_excludes_old_records() {
        let (_file, store) = open_store();
        let now = Utc::now();

        store
            .insert(&make_record("old", now - Duration::minutes(10)))
            .await
            .unwrap();
        store.insert(&make_record("fresh", now)).await.unwrap();

        let fetched = store
            .fetch_unprocessed(now - Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].record.device, "fresh");
    }

    #[tokio::test]
    async fn test_mark_processed_is_monotonic_and_idempotent() {
        let (_file, store) = open_store();
        let now = Utc::now();
        let since = now - Duration::minutes(1);

        store.insert(&make_record("sensor01", now)).await.unwrap();
        store.insert(&make_record("sensor02", now)).await.unwrap();

        let fetched = store.fetch_unprocessed(since).await.unwrap();
        let ids: Vec<i64> = fetched.iter().map(|r| r.id).collect();

        store.mark_processed(&ids).await.unwrap();
        assert!(store.fetch_unprocessed(since).await.unwrap().is_empty());

        // Re-marking already processed ids is a no-op
        store.mark_processed(&ids).await.unwrap();
        assert!(store.fetch_unprocessed(since).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_subset_leaves_rest_unprocessed() {
        let (_file, store) = open_store();
        let now = Utc::now();
        let since = now - Duration::minutes(1);

        for i in 0..3 {
            store
                .insert(&make_record(&format!("sensor{:02}", i), now))
                .await
                .unwrap();
        }

        let fetched = store.fetch_unprocessed(since).await.unwrap();
        store.mark_processed(&[fetched[0].id]).await.unwrap();

        let remaining = store.fetch_unprocessed(since).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_batch() {
        let (_file, store) = open_store();
        let now = Utc::now();

        let records: Vec<Record> = (0..5)
            .map(|i| make_record(&format!("sensor{:02}", i), now))
            .collect();
        store.insert_batch(&records).await.unwrap();
        store.insert_batch(&[]).await.unwrap();

        let fetched = store
            .fetch_unprocessed(now - Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(fetched.len(), 5);
    }

    #[tokio::test]
    async fn test_record_without_data_survives() {
        let (_file, store) = open_store();
        let now = Utc::now();

        let mut record = make_record("sensor01", now);
        record.data = None;
        store.insert(&record).await.unwrap();

        let fetched = store
            .fetch_unprocessed(now - Duration::minutes(1))
            .await
            .unwrap();
        assert!(fetched[0].record.data.is_none());
    }

    #[test]
    fn test_rejects_suspicious_collection_name() {
        let file = NamedTempFile::new().unwrap();
        let result = SqliteRecordStore::open(file.path().to_str().unwrap(), "sensors; DROP");
        assert!(matches!(result, Err(StoreError::InvalidCollection(_))));
    }
}
