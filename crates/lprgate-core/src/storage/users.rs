use rusqlite::{OptionalExtension, Result};

use super::{now_ts, Storage, User};

impl Storage {
    /// Inserts an active user; the password must already be hashed.
    pub fn insert_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let now = now_ts();
        self.conn.execute(
            "INSERT INTO users (username, password_hash, is_active, created_at, updated_at) VALUES (?1, ?2, 1, ?3, ?3)",
            (username, password_hash, now),
        )?;
        Ok(User {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, username, password_hash, is_active, created_at, updated_at FROM users WHERE username = ?1 LIMIT 1",
                [username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        is_active: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()
    }

    /// Returns false when no such user exists.
    pub fn set_user_active(&self, username: &str, is_active: bool) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE username = ?3",
            (is_active, now_ts(), username),
        )?;
        Ok(changed > 0)
    }
}
