//! SQLite operator ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldbell_core::error::{FieldbellError, Result};
use fieldbell_core::traits::RecordStore;
use fieldbell_core::types::{OperatorRecord, Role};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// Shared SELECT column list — single source of truth for row mapping.
const RECORD_SELECT: &str = "SELECT id, user_name, role_id, telegram_id, group_id, message_body, is_sent, sent_at FROM operator_records";

/// SQLite-backed `RecordStore`.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (or create) the ledger at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS operator_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT NOT NULL,
                role_id INTEGER NOT NULL,
                telegram_id INTEGER,
                group_id INTEGER,
                message_body TEXT,
                is_sent INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT
            );",
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FieldbellError::Store(e.to_string()))
    }
}

/// Map a database row to an `OperatorRecord`.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<OperatorRecord> {
    let role_id: i64 = row.get(2)?;
    let sent_at: Option<String> = row.get(7)?;
    Ok(OperatorRecord {
        id: row.get(0)?,
        user_name: row.get(1)?,
        role: Role::from_role_id(role_id).unwrap_or(Role::Waspang),
        telegram_id: row.get(3)?,
        group_id: row.get(4)?,
        message_body: row.get(5)?,
        is_sent: row.get::<_, i64>(6)? != 0,
        sent_at: sent_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        }),
    })
}

fn store_err(e: rusqlite::Error) -> FieldbellError {
    FieldbellError::Store(e.to_string())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_by_credentials(
        &self,
        user_name: &str,
        role: Role,
    ) -> Result<Option<OperatorRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{RECORD_SELECT} WHERE user_name = ?1 AND role_id = ?2"
            ))
            .map_err(store_err)?;
        let record = stmt
            .query_row(params![user_name, role.role_id()], row_to_record)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(store_err(other)),
            })?;
        Ok(record)
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<OperatorRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{RECORD_SELECT} WHERE telegram_id = ?1"))
            .map_err(store_err)?;
        let record = stmt
            .query_row(params![telegram_id], row_to_record)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(store_err(other)),
            })?;
        Ok(record)
    }

    async fn bind_telegram_id(&self, user_name: &str, role: Role, telegram_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE operator_records SET telegram_id = ?1 WHERE user_name = ?2 AND role_id = ?3",
            params![telegram_id, user_name, role.role_id()],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn queue_message(
        &self,
        telegram_id: i64,
        body: &str,
        group_id: Option<i64>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE operator_records
             SET message_body = ?1, is_sent = 0, sent_at = NULL, group_id = ?2
             WHERE telegram_id = ?3",
            params![body, group_id, telegram_id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn queue_message_by_name(&self, user_name: &str, body: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE operator_records
                 SET message_body = ?1, is_sent = 0, sent_at = NULL
                 WHERE user_name = ?2",
                params![body, user_name],
            )
            .map_err(store_err)?;
        Ok(changed > 0)
    }

    async fn pending_messages(&self) -> Result<Vec<OperatorRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{RECORD_SELECT} WHERE message_body IS NOT NULL AND message_body != '' AND is_sent = 0"
            ))
            .map_err(store_err)?;
        let rows = stmt.query_map([], row_to_record).map_err(store_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    async fn pending_count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM operator_records
                 WHERE message_body IS NOT NULL AND message_body != '' AND is_sent = 0",
                [],
                |r| r.get(0),
            )
            .map_err(store_err)?;
        Ok(count as u64)
    }

    async fn mark_sent(&self, record_id: i64, sent_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE operator_records SET is_sent = 1, sent_at = ?1 WHERE id = ?2",
            params![sent_at.to_rfc3339(), record_id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn set_group(&self, record_id: i64, group_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE operator_records SET group_id = ?1 WHERE id = ?2",
            params![group_id, record_id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn clear_group_for_record(&self, record_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE operator_records SET group_id = NULL WHERE id = ?1",
            params![record_id],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn clear_group_everywhere(&self, group_id: i64) -> Result<u64> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE operator_records SET group_id = NULL WHERE group_id = ?1",
                params![group_id],
            )
            .map_err(store_err)?;
        Ok(changed as u64)
    }

    async fn distinct_group_ids(&self) -> Result<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT group_id FROM operator_records WHERE group_id IS NOT NULL")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |r| r.get::<_, i64>(0))
            .map_err(store_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    async fn insert(&self, record: OperatorRecord) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO operator_records (user_name, role_id, telegram_id, group_id, message_body, is_sent, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.user_name,
                record.role.role_id(),
                record.telegram_id,
                record.group_id,
                record.message_body,
                record.is_sent as i64,
                record.sent_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(store_err)?;
        Ok(conn.last_insert_rowid())
    }
}
