//! In-memory `RecordStore` — backs the engine and dispatcher tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldbell_core::error::{FieldbellError, Result};
use fieldbell_core::traits::RecordStore;
use fieldbell_core::types::{OperatorRecord, Role};
use std::sync::Mutex;

/// Vec-backed store with the same semantics as the SQLite backend.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<OperatorRecord>>,
    next_id: Mutex<i64>,
    /// When set, every write fails with a store error (failure-path tests).
    fail_writes: Mutex<bool>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make all subsequent writes fail.
    pub fn poison_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }

    fn check_writable(&self) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(FieldbellError::Store("write refused (poisoned)".into()));
        }
        Ok(())
    }

    /// Snapshot of one record, by row id.
    pub fn get(&self, record_id: i64) -> Option<OperatorRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == record_id)
            .cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_credentials(
        &self,
        user_name: &str,
        role: Role,
    ) -> Result<Option<OperatorRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user_name == user_name && r.role == role)
            .cloned())
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<OperatorRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.telegram_id == Some(telegram_id))
            .cloned())
    }

    async fn bind_telegram_id(&self, user_name: &str, role: Role, telegram_id: i64) -> Result<()> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        for record in records
            .iter_mut()
            .filter(|r| r.user_name == user_name && r.role == role)
        {
            record.telegram_id = Some(telegram_id);
        }
        Ok(())
    }

    async fn queue_message(
        &self,
        telegram_id: i64,
        body: &str,
        group_id: Option<i64>,
    ) -> Result<()> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        for record in records
            .iter_mut()
            .filter(|r| r.telegram_id == Some(telegram_id))
        {
            record.message_body = Some(body.to_string());
            record.is_sent = false;
            record.sent_at = None;
            record.group_id = group_id;
        }
        Ok(())
    }

    async fn queue_message_by_name(&self, user_name: &str, body: &str) -> Result<bool> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        let mut changed = false;
        for record in records.iter_mut().filter(|r| r.user_name == user_name) {
            record.message_body = Some(body.to_string());
            record.is_sent = false;
            record.sent_at = None;
            changed = true;
        }
        Ok(changed)
    }

    async fn pending_messages(&self) -> Result<Vec<OperatorRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.has_pending_message())
            .cloned()
            .collect())
    }

    async fn pending_count(&self) -> Result<u64> {
        Ok(self.pending_messages().await?.len() as u64)
    }

    async fn mark_sent(&self, record_id: i64, sent_at: DateTime<Utc>) -> Result<()> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id == record_id) {
            record.is_sent = true;
            record.sent_at = Some(sent_at);
        }
        Ok(())
    }

    async fn set_group(&self, record_id: i64, group_id: i64) -> Result<()> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id == record_id) {
            record.group_id = Some(group_id);
        }
        Ok(())
    }

    async fn clear_group_for_record(&self, record_id: i64) -> Result<()> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id == record_id) {
            record.group_id = None;
        }
        Ok(())
    }

    async fn clear_group_everywhere(&self, group_id: i64) -> Result<u64> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        let mut cleared = 0;
        for record in records.iter_mut().filter(|r| r.group_id == Some(group_id)) {
            record.group_id = None;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn distinct_group_ids(&self) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.group_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn insert(&self, mut record: OperatorRecord) -> Result<i64> {
        self.check_writable()?;
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        record.id = *next_id;
        let id = record.id;
        self.records.lock().unwrap().push(record);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_matches_sqlite_semantics() {
        let store = MemoryRecordStore::new();
        let id = store
            .insert(OperatorRecord {
                id: 0,
                user_name: "alice".into(),
                role: Role::Waspang,
                telegram_id: Some(1),
                group_id: None,
                message_body: None,
                is_sent: false,
                sent_at: None,
            })
            .await
            .unwrap();

        // No body yet — not pending
        assert_eq!(store.pending_count().await.unwrap(), 0);

        store.queue_message(1, "report", None).await.unwrap();
        assert_eq!(store.pending_count().await.unwrap(), 1);

        store.mark_sent(id, Utc::now()).await.unwrap();
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poisoned_writes_fail() {
        let store = MemoryRecordStore::new();
        store.poison_writes();
        assert!(
            store
                .bind_telegram_id("alice", Role::Admin, 1)
                .await
                .is_err()
        );
    }
}
