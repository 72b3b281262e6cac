//! Ban log reconciliation
//!
//! Freshly appended ban records carry `'0'` for CID and IP because the ban
//! command only knows the ckey. The game server writes CID and IP to the
//! activity log once the player connects, so reconciliation re-reads the
//! ban log, backfills the derived fields from every server's activity log,
//! and rewrites the whole file.
//!
//! Records fall into three buckets:
//! - legacy lines without a ckey field, kept byte-for-byte;
//! - complete records (both derived fields known), never rewritten again;
//! - pending records, eligible for backfill.
//!
//! The operation is idempotent: once a record is complete, repeated calls
//! leave it untouched.

use crate::models::{parse_activity_log, parse_ban_log, BanLogEntry, BanRecord, BAN_SEPARATOR};

enum Slot {
    /// Emitted from its original (trimmed) bytes: legacy lines, complete
    /// records, and records out of scope for a targeted rewrite.
    Untouched(String),
    Pending(BanRecord),
}

/// Merge activity data into a ban log and return the new file content.
///
/// `activity_logs` holds the raw text of every enabled server's activity
/// log. With `target_ckey` set, only that ckey's pending records are
/// rewritten; everything else passes through verbatim so a targeted
/// rewrite never loses unrelated records.
///
/// Never fails: empty or unparseable input is treated as zero existing
/// records and yields a minimal valid log (trailing separator only).
pub fn merge_and_rewrite(
    existing: &str,
    activity_logs: &[String],
    target_ckey: Option<&str>,
) -> String {
    let mut slots: Vec<Slot> = parse_ban_log(existing)
        .into_iter()
        .map(|entry| match entry {
            BanLogEntry::Legacy(line) => Slot::Untouched(line),
            BanLogEntry::Parsed(record) => {
                let out_of_scope = target_ckey.is_some_and(|ckey| record.ckey() != ckey);
                if out_of_scope || record.is_complete() {
                    Slot::Untouched(record.to_line())
                } else {
                    Slot::Pending(record)
                }
            }
        })
        .collect();

    for log in activity_logs {
        for session in parse_activity_log(log) {
            for slot in &mut slots {
                if let Slot::Pending(record) = slot {
                    if record.ckey() == session.ckey {
                        record.backfill(&session.cid, &session.ip);
                    }
                }
            }
        }
    }

    let mut out = String::new();
    for slot in &slots {
        match slot {
            Slot::Untouched(line) => out.push_str(line),
            Slot::Pending(record) => out.push_str(&record.to_line()),
        }
        out.push_str(BAN_SEPARATOR);
        out.push('\n');
    }
    if out.is_empty() {
        out.push_str(BAN_SEPARATOR);
        out.push('\n');
    }
    out
}

/// Collect every ban record for a ckey out of parsed log entries.
/// Legacy lines are excluded from correlation by definition.
pub fn bans_for_ckey<'a>(entries: &'a [BanLogEntry], ckey: &str) -> Vec<&'a BanRecord> {
    entries
        .iter()
        .filter_map(BanLogEntry::as_record)
        .filter(|record| record.ckey() == ckey)
        .collect()
}
