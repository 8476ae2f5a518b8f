use rusqlite::{Result, Row};

use super::plate_log_query::{parse_plate_log_query, PlateLogQuery};
use super::{NewPlateLog, PlateLog, Storage};

const PLATE_LOG_COLUMNS: &str = "id, location_code, camera_id, transaction_no, plate, accuracy, captured_at, request_data, response_data, response_final, image_url, created_at";

impl Storage {
    /// Inserts a row and returns the id SQLite assigned to it.
    pub fn insert_plate_log(&self, log: &NewPlateLog) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO plate_logs (location_code, camera_id, transaction_no, plate, accuracy, captured_at, request_data, response_data, response_final, image_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            (
                &log.location_code,
                &log.camera_id,
                &log.transaction_no,
                &log.plate,
                &log.accuracy,
                log.captured_at,
                &log.request_data,
                &log.response_data,
                &log.response_final,
                &log.image_url,
                log.created_at,
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Returns `QueryReturnedNoRows` when the id does not exist, so callers
    /// can tell a missing row apart from a successful no-op.
    pub fn update_plate_log_request_data(&self, id: i64, request_data: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE plate_logs SET request_data = ?1 WHERE id = ?2",
            (request_data, id),
        )?;
        if changed == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        Ok(())
    }

    pub fn get_plate_log(&self, id: i64) -> Result<Option<PlateLog>> {
        let sql = format!("SELECT {PLATE_LOG_COLUMNS} FROM plate_logs WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(map_plate_log_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn plate_log_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(1) FROM plate_logs", [], |row| row.get(0))
    }

    pub fn list_plate_logs(&self, query: Option<&str>, limit: i64) -> Result<Vec<PlateLog>> {
        let limit = limit.clamp(1, 1000);
        let mut out = Vec::new();
        match parse_plate_log_query(query) {
            PlateLogQuery::All => {
                let sql = format!(
                    "SELECT {PLATE_LOG_COLUMNS} FROM plate_logs ORDER BY created_at DESC, id DESC LIMIT ?1"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let mut rows = stmt.query([limit])?;
                while let Some(row) = rows.next()? {
                    out.push(map_plate_log_row(row)?);
                }
            }
            PlateLogQuery::FieldExact { column, value } => {
                // 中文注释：column 只来自解析器里的白名单常量，拼进 SQL 不会引入注入。
                let sql = format!(
                    "SELECT {PLATE_LOG_COLUMNS} FROM plate_logs WHERE {column} = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let mut rows = stmt.query((value, limit))?;
                while let Some(row) = rows.next()? {
                    out.push(map_plate_log_row(row)?);
                }
            }
            PlateLogQuery::FieldLike { column, pattern } => {
                let sql = format!(
                    "SELECT {PLATE_LOG_COLUMNS} FROM plate_logs WHERE {column} LIKE ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let mut rows = stmt.query((pattern, limit))?;
                while let Some(row) = rows.next()? {
                    out.push(map_plate_log_row(row)?);
                }
            }
            PlateLogQuery::GlobalLike(pattern) => {
                let sql = format!(
                    "SELECT {PLATE_LOG_COLUMNS} FROM plate_logs
                     WHERE plate LIKE ?1
                        OR camera_id LIKE ?1
                        OR location_code LIKE ?1
                        OR IFNULL(transaction_no, '') LIKE ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let mut rows = stmt.query((pattern, limit))?;
                while let Some(row) = rows.next()? {
                    out.push(map_plate_log_row(row)?);
                }
            }
        }
        Ok(out)
    }
}

fn map_plate_log_row(row: &Row<'_>) -> Result<PlateLog> {
    Ok(PlateLog {
        id: row.get(0)?,
        location_code: row.get(1)?,
        camera_id: row.get(2)?,
        transaction_no: row.get(3)?,
        plate: row.get(4)?,
        accuracy: row.get(5)?,
        captured_at: row.get(6)?,
        request_data: row.get(7)?,
        response_data: row.get(8)?,
        response_final: row.get(9)?,
        image_url: row.get(10)?,
        created_at: row.get(11)?,
    })
}
