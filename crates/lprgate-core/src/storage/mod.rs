use rusqlite::{Connection, Result};
use std::path::Path;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

mod api_keys;
mod plate_log_query;
mod plate_logs;
mod users;

/// One row of `plate_logs`, as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateLog {
    pub id: i64,
    pub location_code: String,
    pub camera_id: String,
    pub transaction_no: Option<String>,
    pub plate: String,
    pub accuracy: String,
    pub captured_at: i64,
    pub request_data: String,
    pub response_data: String,
    pub response_final: String,
    pub image_url: String,
    pub created_at: i64,
}

/// Insert payload for `plate_logs`; the id is assigned by SQLite.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlateLog {
    pub location_code: String,
    pub camera_id: String,
    pub transaction_no: Option<String>,
    pub plate: String,
    pub accuracy: String,
    pub captured_at: i64,
    pub request_data: String,
    pub response_data: String,
    pub response_final: String,
    pub image_url: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub id: String,
    pub name: Option<String>,
    pub key_hash: String,
    pub status: String,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
}

/// Password-authenticated caller of the recognition endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        // 中文注释：多个识别请求会并发落库；给 SQLite 一点等待时间，避免瞬时 lock 直接把整次识别判为失败。
        conn.busy_timeout(Duration::from_millis(3000))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.busy_timeout(Duration::from_millis(3000))?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.ensure_migrations_table()?;

        self.apply_sql_or_compat_migration(
            "001_plate_logs",
            include_str!("../../migrations/001_plate_logs.sql"),
            |s| s.ensure_plate_log_columns(),
        )?;
        self.apply_sql_migration(
            "002_api_keys",
            include_str!("../../migrations/002_api_keys.sql"),
        )?;
        self.apply_sql_migration(
            "003_plate_logs_search_indexes",
            include_str!("../../migrations/003_plate_logs_search_indexes.sql"),
        )?;
        self.apply_sql_migration(
            "004_users",
            include_str!("../../migrations/004_users.sql"),
        )
    }

    /// Older deployments created `plate_logs` without the image/accuracy columns.
    fn ensure_plate_log_columns(&self) -> Result<()> {
        self.ensure_column("plate_logs", "transaction_no", "TEXT")?;
        self.ensure_column("plate_logs", "accuracy", "TEXT NOT NULL DEFAULT ''")?;
        self.ensure_column("plate_logs", "image_url", "TEXT NOT NULL DEFAULT ''")?;
        Ok(())
    }

    fn ensure_column(&self, table: &str, column: &str, column_type: &str) -> Result<()> {
        if self.has_column(table, column)? {
            return Ok(());
        }
        let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {column_type}");
        self.conn.execute(&sql, [])?;
        Ok(())
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let sql = format!("PRAGMA table_info({table})");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            if name == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn ensure_migrations_table(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn has_migration(&self, version: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM schema_migrations WHERE version = ?1 LIMIT 1")?;
        let mut rows = stmt.query([version])?;
        Ok(rows.next()?.is_some())
    }

    fn mark_migration(&self, version: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            (version, now_ts()),
        )?;
        Ok(())
    }

    fn apply_sql_migration(&self, version: &str, sql: &str) -> Result<()> {
        if self.has_migration(version)? {
            return Ok(());
        }
        self.conn.execute_batch(sql)?;
        self.mark_migration(version)
    }

    fn apply_sql_or_compat_migration<F>(&self, version: &str, sql: &str, compat: F) -> Result<()>
    where
        F: FnOnce(&Self) -> Result<()>,
    {
        if self.has_migration(version)? {
            return Ok(());
        }

        match self.conn.execute_batch(sql) {
            Ok(_) => {}
            // 中文注释：旧库字段冲突时交给下方的 compat 补列，不在这里重复执行。
            Err(err) if Self::is_schema_conflict_error(&err) => {}
            Err(err) => return Err(err),
        }
        // 中文注释：CREATE TABLE IF NOT EXISTS 遇到旧表不会报错，也不会补列；这里无条件补一次，保证老库升级后字段齐全。
        compat(self)?;

        self.mark_migration(version)
    }

    fn is_schema_conflict_error(err: &rusqlite::Error) -> bool {
        match err {
            rusqlite::Error::SqliteFailure(_, maybe_message) => maybe_message
                .as_deref()
                .map(|message| {
                    message.contains("duplicate column name") || message.contains("already exists")
                })
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod migration_tests;

pub fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
