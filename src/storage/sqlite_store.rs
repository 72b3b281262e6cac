//! SQLite implementation of the BanStore trait

use super::{BanStore, StorageError};
use crate::models::{parse_activity_log, BanLogEntry, BanRecord, BAN_SEPARATOR, UNKNOWN_FIELD};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed ban storage
///
/// Substitutes for the flat-file store behind the same port. Legacy lines
/// have no representation here; a migrated database only holds parseable
/// records.
pub struct SqliteBanStore {
    conn: Mutex<Connection>,
}

impl SqliteBanStore {
    /// Open (or create) a ban database at the specified path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteBanStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory ban database (useful for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteBanStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn all_records(&self) -> Result<Vec<BanRecord>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT kind, duration, reason, admin, banned_on, ckey, cid, ip FROM bans ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BanRecord::from_parts(
                &row.get::<_, String>(0)?,
                &row.get::<_, String>(1)?,
                &row.get::<_, String>(2)?,
                &row.get::<_, String>(3)?,
                &row.get::<_, String>(4)?,
                &row.get::<_, String>(5)?,
                &row.get::<_, String>(6)?,
                &row.get::<_, String>(7)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

impl BanStore for SqliteBanStore {
    fn append_ban(&self, record: &BanRecord) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO bans (kind, duration, reason, admin, banned_on, ckey, cid, ip)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.kind(),
                record.duration(),
                record.reason(),
                record.admin(),
                record.date(),
                record.ckey(),
                record.cid(),
                record.ip(),
            ],
        )?;
        Ok(())
    }

    fn remove_bans(&self, ckey: &str) -> Result<usize, StorageError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM bans WHERE ckey = ?1", params![ckey])?;
        Ok(removed)
    }

    fn ban_entries(&self) -> Result<Vec<BanLogEntry>, StorageError> {
        Ok(self
            .all_records()?
            .into_iter()
            .map(BanLogEntry::Parsed)
            .collect())
    }

    fn raw_ban_log(&self) -> Result<String, StorageError> {
        let mut out = String::new();
        for record in self.all_records()? {
            out.push_str(&record.to_line());
            out.push_str(BAN_SEPARATOR);
            out.push('\n');
        }
        if out.is_empty() {
            out.push_str(BAN_SEPARATOR);
            out.push('\n');
        }
        Ok(out)
    }

    fn reconcile(
        &self,
        activity_logs: &[String],
        target_ckey: Option<&str>,
    ) -> Result<bool, StorageError> {
        let conn = self.conn.lock().unwrap();

        // Rows pending at entry. Every matching session in this pass keeps
        // overwriting them, so the last session wins like the flat-file
        // rewrite; rows already complete never re-derive.
        let mut pending: Vec<(i64, String)> = Vec::new();
        {
            let mut stmt = conn.prepare("SELECT id, ckey FROM bans WHERE cid = ?1 OR ip = ?1")?;
            let rows = stmt.query_map(params![UNKNOWN_FIELD], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                pending.push(row?);
            }
        }

        let mut changed = 0;
        for log in activity_logs {
            for session in parse_activity_log(log) {
                if target_ckey.is_some_and(|ckey| ckey != session.ckey) {
                    continue;
                }
                for (id, ckey) in &pending {
                    if *ckey != session.ckey {
                        continue;
                    }
                    changed += conn.execute(
                        "UPDATE bans SET cid = ?1, ip = ?2 WHERE id = ?3",
                        params![session.cid, session.ip, id],
                    )?;
                }
            }
        }
        Ok(changed > 0)
    }
}
