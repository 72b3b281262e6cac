//! Ban storage port
//!
//! The game servers treat flat files as their database, so the default
//! store is a whole-file read-modify-rewrite over the same files the game
//! process appends to. All access goes through the narrow [`BanStore`]
//! trait so an embedded store can substitute for the flat files without
//! touching the orchestrator or parser logic; [`SqliteBanStore`] is that
//! substitution.
//!
//! There is no locking against the external writer: ban and activity logs
//! only ever grow by appends on the game side, and rewrites here are
//! opportunistic whole-file replacements. Last full rewrite wins.

pub mod sqlite_store;

pub use sqlite_store::SqliteBanStore;

use crate::banlog::merge_and_rewrite;
use crate::models::{parse_ban_log, BanLogEntry, BanRecord, PlayerActivityRecord, BAN_SEPARATOR};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Ban log file name inside a server's base directory.
pub const BANS_FILE: &str = "bans.txt";
/// Player activity log file name inside a server's base directory.
pub const ACTIVITY_FILE: &str = "playerlogs.txt";

/// Errors that can occur during ban storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Narrow storage port for one server's ban records.
///
/// A store owns exactly one server context; cross-server sweeps iterate
/// stores independently and never merge records across them.
pub trait BanStore: Send + Sync {
    /// Append a freshly created ban record.
    fn append_ban(&self, record: &BanRecord) -> Result<(), StorageError>;

    /// Drop every ban record for a ckey, so subsequent ban checks no
    /// longer flag it. Returns how many records were removed.
    fn remove_bans(&self, ckey: &str) -> Result<usize, StorageError>;

    /// All entries of the ban log, legacy lines included.
    fn ban_entries(&self) -> Result<Vec<BanLogEntry>, StorageError>;

    /// The ban log in its wire form, for `listbans`-style dumps.
    fn raw_ban_log(&self) -> Result<String, StorageError>;

    /// Backfill pending records from the given activity logs, optionally
    /// scoped to one ckey. Returns true if anything changed.
    fn reconcile(
        &self,
        activity_logs: &[String],
        target_ckey: Option<&str>,
    ) -> Result<bool, StorageError>;

    fn bans_for(&self, ckey: &str) -> Result<Vec<BanRecord>, StorageError> {
        Ok(self
            .ban_entries()?
            .iter()
            .filter_map(BanLogEntry::as_record)
            .filter(|record| record.ckey() == ckey)
            .cloned()
            .collect())
    }

    fn is_banned(&self, ckey: &str) -> Result<bool, StorageError> {
        Ok(!self.bans_for(ckey)?.is_empty())
    }
}

/// Read-only access to a server's player activity log.
///
/// The game process owns the file and appends one record per session;
/// the bot never writes it.
pub trait ActivitySource: Send + Sync {
    /// Raw text in the wire format, for feeding reconciliation.
    fn raw_activity_log(&self) -> Result<String, StorageError>;

    fn activity_records(&self) -> Result<Vec<PlayerActivityRecord>, StorageError> {
        Ok(crate::models::parse_activity_log(&self.raw_activity_log()?))
    }
}

/// Flat-file store over a server's base directory.
pub struct FlatFileStore {
    basedir: PathBuf,
}

impl FlatFileStore {
    pub fn new<P: AsRef<Path>>(basedir: P) -> Self {
        FlatFileStore {
            basedir: basedir.as_ref().to_path_buf(),
        }
    }

    pub fn bans_path(&self) -> PathBuf {
        self.basedir.join(BANS_FILE)
    }

    pub fn activity_path(&self) -> PathBuf {
        self.basedir.join(ACTIVITY_FILE)
    }

    fn read(&self, path: &Path) -> Result<String, StorageError> {
        std::fs::read_to_string(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), StorageError> {
        std::fs::write(path, content).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

}

impl ActivitySource for FlatFileStore {
    fn raw_activity_log(&self) -> Result<String, StorageError> {
        self.read(&self.activity_path())
    }
}

impl BanStore for FlatFileStore {
    fn append_ban(&self, record: &BanRecord) -> Result<(), StorageError> {
        let path = self.bans_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
        writeln!(file, "{}{}", record.to_line(), BAN_SEPARATOR).map_err(|source| {
            StorageError::Io {
                path: path.clone(),
                source,
            }
        })
    }

    fn remove_bans(&self, ckey: &str) -> Result<usize, StorageError> {
        let path = self.bans_path();
        let entries = parse_ban_log(&self.read(&path)?);
        let mut kept = String::new();
        let mut removed = 0;
        for entry in &entries {
            match entry {
                BanLogEntry::Parsed(record) if record.ckey() == ckey => removed += 1,
                BanLogEntry::Parsed(record) => {
                    kept.push_str(&record.to_line());
                    kept.push_str(BAN_SEPARATOR);
                    kept.push('\n');
                }
                BanLogEntry::Legacy(line) => {
                    kept.push_str(line);
                    kept.push_str(BAN_SEPARATOR);
                    kept.push('\n');
                }
            }
        }
        if kept.is_empty() {
            kept.push_str(BAN_SEPARATOR);
            kept.push('\n');
        }
        if removed > 0 {
            self.write(&path, &kept)?;
        }
        Ok(removed)
    }

    fn ban_entries(&self) -> Result<Vec<BanLogEntry>, StorageError> {
        Ok(parse_ban_log(&self.read(&self.bans_path())?))
    }

    fn raw_ban_log(&self) -> Result<String, StorageError> {
        self.read(&self.bans_path())
    }

    fn reconcile(
        &self,
        activity_logs: &[String],
        target_ckey: Option<&str>,
    ) -> Result<bool, StorageError> {
        let path = self.bans_path();
        let existing = self.read(&path)?;
        let merged = merge_and_rewrite(&existing, activity_logs, target_ckey);
        if merged == existing {
            return Ok(false);
        }
        self.write(&path, &merged)?;
        Ok(true)
    }
}
