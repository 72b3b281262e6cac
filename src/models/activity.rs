//! Player activity log records
//!
//! The game server appends one record per observed play session to a flat
//! file: records are joined by `|`, fields within a record by `;`, with the
//! positional layout `[0]=ckey, [1]=ip, [2]=cid, [3]=date`. The bot only
//! ever reads these files; the game process owns them.

/// One observed play session for a player.
///
/// Multiple records per ckey are expected (one per session). Fields the
/// server did not report are left empty and contribute nothing to
/// correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerActivityRecord {
    pub ckey: String,
    pub ip: String,
    pub cid: String,
    pub date: String,
}

impl PlayerActivityRecord {
    /// Parse a single `;`-delimited session record.
    ///
    /// Returns `None` for blank input. Missing trailing fields become
    /// empty strings rather than errors.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let mut fields = raw.split(';').map(str::trim);
        let ckey = fields.next().unwrap_or("").to_string();
        if ckey.is_empty() {
            return None;
        }
        Some(PlayerActivityRecord {
            ckey,
            ip: fields.next().unwrap_or("").to_string(),
            cid: fields.next().unwrap_or("").to_string(),
            date: fields.next().unwrap_or("").to_string(),
        })
    }
}

/// Parse a whole activity log file (`|`-joined records).
///
/// Unparseable chunks are skipped; the game server occasionally leaves
/// blank segments behind when rotating the file.
pub fn parse_activity_log(text: &str) -> Vec<PlayerActivityRecord> {
    text.split('|')
        .filter_map(PlayerActivityRecord::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_record() {
        let rec = PlayerActivityRecord::parse("player1;1.2.3.4;CID001;2024-01-01").unwrap();
        assert_eq!(rec.ckey, "player1");
        assert_eq!(rec.ip, "1.2.3.4");
        assert_eq!(rec.cid, "CID001");
        assert_eq!(rec.date, "2024-01-01");
    }

    #[test]
    fn test_parse_partial_record() {
        let rec = PlayerActivityRecord::parse("player1;1.2.3.4").unwrap();
        assert_eq!(rec.ckey, "player1");
        assert_eq!(rec.ip, "1.2.3.4");
        assert_eq!(rec.cid, "");
        assert_eq!(rec.date, "");
    }

    #[test]
    fn test_parse_blank_is_none() {
        assert!(PlayerActivityRecord::parse("").is_none());
        assert!(PlayerActivityRecord::parse("  ").is_none());
        assert!(PlayerActivityRecord::parse(";1.2.3.4;CID001").is_none());
    }

    #[test]
    fn test_parse_activity_log_skips_blanks() {
        let log = "player1;1.2.3.4;CID001;2024-01-01||player2;5.6.7.8;CID002;2024-01-02|";
        let records = parse_activity_log(log);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ckey, "player1");
        assert_eq!(records[1].ckey, "player2");
    }
}
