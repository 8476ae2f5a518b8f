use rusqlite::Result;

use super::{now_ts, ApiKey, Storage};

impl Storage {
    pub fn insert_api_key(&self, key: &ApiKey) -> Result<()> {
        self.conn.execute(
            "INSERT INTO api_keys (id, name, key_hash, status, created_at, last_used_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                &key.id,
                &key.name,
                &key.key_hash,
                &key.status,
                key.created_at,
                &key.last_used_at,
            ),
        )?;
        Ok(())
    }

    pub fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, key_hash, status, created_at, last_used_at FROM api_keys WHERE key_hash = ?1 LIMIT 1",
        )?;
        let mut rows = stmt.query([key_hash])?;
        if let Some(row) = rows.next()? {
            Ok(Some(ApiKey {
                id: row.get(0)?,
                name: row.get(1)?,
                key_hash: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
                last_used_at: row.get(5)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn update_api_key_last_used(&self, key_hash: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE api_keys SET last_used_at = ?1 WHERE key_hash = ?2",
            (now_ts(), key_hash),
        )?;
        Ok(())
    }

    pub fn update_api_key_status(&self, key_id: &str, status: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE api_keys SET status = ?1 WHERE id = ?2",
            (status, key_id),
        )?;
        Ok(())
    }
}
