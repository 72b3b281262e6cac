//! Ban log records
//!
//! Ban logs are flat files shared with the game server process. Records are
//! joined by `|||` plus a newline and fields within a record by `;`. The
//! positional layout the bot relies on is:
//!
//! ```text
//! [0]=type  [1..2]=metadata  [3]=reason  [4]=admin  [5]=date
//! [6..7]=metadata  [8]=ckey  [9]=cid  [10]=ip
//! ```
//!
//! Fields 9 and 10 are derived: the game client reports CID and IP to the
//! activity log, not the ban log, so freshly appended bans carry `'0'` in
//! both slots until reconciliation backfills them. A record without a ckey
//! at position 8 is a legacy or malformed line; it is preserved verbatim
//! and never correlated.

/// Sentinel the game server writes for an unknown CID or IP.
pub const UNKNOWN_FIELD: &str = "0";

/// Record separator in ban log files.
pub const BAN_SEPARATOR: &str = "|||";

/// Number of fields in a fully laid out record.
const FIELD_COUNT: usize = 11;

const F_TYPE: usize = 0;
const F_DURATION: usize = 1;
const F_REASON: usize = 3;
const F_ADMIN: usize = 4;
const F_DATE: usize = 5;
const F_CKEY: usize = 8;
const F_CID: usize = 9;
const F_IP: usize = 10;

/// A parsed ban record with a known ckey field.
///
/// Positional indexing stops at this boundary: everything past the parser
/// works with named accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    fields: Vec<String>,
}

impl BanRecord {
    /// Parse one `;`-delimited ban line.
    ///
    /// Returns `None` when the line has no ckey field (position 8); the
    /// caller keeps such lines verbatim as [`BanLogEntry::Legacy`].
    pub fn parse(raw: &str) -> Option<Self> {
        let fields: Vec<String> = raw.trim().split(';').map(|f| f.to_string()).collect();
        if fields.len() <= F_CKEY || fields[F_CKEY].trim().is_empty() {
            return None;
        }
        Some(BanRecord { fields })
    }

    /// Build a fresh record for a new ban. CID and IP start unknown and
    /// are backfilled by reconciliation.
    pub fn new_ban(admin: &str, ckey: &str, duration: &str, reason: &str, date: &str) -> Self {
        Self::from_parts("BAN", duration, reason, admin, date, ckey, UNKNOWN_FIELD, UNKNOWN_FIELD)
    }

    /// Assemble a record from individual columns, e.g. out of a database
    /// row. Unnamed metadata slots stay empty.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        kind: &str,
        duration: &str,
        reason: &str,
        admin: &str,
        date: &str,
        ckey: &str,
        cid: &str,
        ip: &str,
    ) -> Self {
        let mut fields = vec![String::new(); FIELD_COUNT];
        fields[F_TYPE] = kind.to_string();
        fields[F_DURATION] = duration.to_string();
        fields[F_REASON] = reason.to_string();
        fields[F_ADMIN] = admin.to_string();
        fields[F_DATE] = date.to_string();
        fields[F_CKEY] = ckey.to_string();
        fields[F_CID] = cid.to_string();
        fields[F_IP] = ip.to_string();
        BanRecord { fields }
    }

    pub fn kind(&self) -> &str {
        self.field(F_TYPE)
    }

    pub fn duration(&self) -> &str {
        self.field(F_DURATION)
    }

    pub fn reason(&self) -> &str {
        self.field(F_REASON)
    }

    pub fn admin(&self) -> &str {
        self.field(F_ADMIN)
    }

    pub fn date(&self) -> &str {
        self.field(F_DATE)
    }

    pub fn ckey(&self) -> &str {
        self.field(F_CKEY)
    }

    pub fn cid(&self) -> &str {
        self.field(F_CID)
    }

    pub fn ip(&self) -> &str {
        self.field(F_IP)
    }

    /// Whether both derived fields have been backfilled. Complete records
    /// are never rewritten again.
    pub fn is_complete(&self) -> bool {
        Self::is_known(self.cid()) && Self::is_known(self.ip())
    }

    /// Overwrite the derived CID/IP slots, growing the record to the full
    /// layout if the original line was short.
    pub fn backfill(&mut self, cid: &str, ip: &str) {
        while self.fields.len() < FIELD_COUNT {
            self.fields.push(UNKNOWN_FIELD.to_string());
        }
        self.fields[F_CID] = cid.to_string();
        self.fields[F_IP] = ip.to_string();
    }

    /// Serialize back to the `;`-joined storage form.
    pub fn to_line(&self) -> String {
        self.fields.join(";")
    }

    fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(String::as_str).unwrap_or("")
    }

    fn is_known(value: &str) -> bool {
        !value.is_empty() && value != UNKNOWN_FIELD
    }
}

/// One entry of a ban log file: either a parsed record or a legacy line
/// kept byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanLogEntry {
    Parsed(BanRecord),
    Legacy(String),
}

impl BanLogEntry {
    pub fn as_record(&self) -> Option<&BanRecord> {
        match self {
            BanLogEntry::Parsed(record) => Some(record),
            BanLogEntry::Legacy(_) => None,
        }
    }
}

/// Split a ban log file into entries. Empty input yields no entries;
/// blank segments between separators are dropped.
pub fn parse_ban_log(text: &str) -> Vec<BanLogEntry> {
    text.split(BAN_SEPARATOR)
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| match BanRecord::parse(chunk) {
            Some(record) => BanLogEntry::Parsed(record),
            None => {
                log::debug!("keeping unparseable ban line verbatim: {:?}", chunk);
                BanLogEntry::Legacy(chunk.to_string())
            }
        })
        .collect()
}

/// A validated-but-not-yet-applied ban request.
///
/// Constructed from a moderator command or an automated risk decision and
/// consumed exactly once by the orchestrator; it never outlives the call.
#[derive(Debug, Clone)]
pub struct BanRequest {
    pub ckey: String,
    pub duration: String,
    pub reason: String,
}

impl BanRequest {
    pub fn new(ckey: impl Into<String>, duration: impl Into<String>, reason: impl Into<String>) -> Self {
        BanRequest {
            ckey: ckey.into(),
            duration: duration.into(),
            reason: reason.into(),
        }
    }

    /// `999 years` is the storage literal for a permanent ban; any
    /// duration starting with `perm` is normalized to it.
    pub fn is_permanent(&self) -> bool {
        self.duration == "999 years" || self.duration.to_lowercase().starts_with("perm")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BAN;1 day;;griefing;admin1;2024-01-01;;;player1;0;0";

    #[test]
    fn test_parse_named_fields() {
        let record = BanRecord::parse(SAMPLE).unwrap();
        assert_eq!(record.kind(), "BAN");
        assert_eq!(record.duration(), "1 day");
        assert_eq!(record.reason(), "griefing");
        assert_eq!(record.admin(), "admin1");
        assert_eq!(record.date(), "2024-01-01");
        assert_eq!(record.ckey(), "player1");
        assert_eq!(record.cid(), "0");
        assert_eq!(record.ip(), "0");
        assert!(!record.is_complete());
    }

    #[test]
    fn test_parse_missing_ckey_is_none() {
        assert!(BanRecord::parse("BAN;;;reason;admin;2024-01-01").is_none());
        assert!(BanRecord::parse("BAN;;;reason;admin;2024-01-01;;; ;0;0").is_none());
    }

    #[test]
    fn test_backfill_and_roundtrip() {
        let mut record = BanRecord::parse(SAMPLE).unwrap();
        record.backfill("CID001", "1.2.3.4");
        assert!(record.is_complete());
        assert_eq!(
            record.to_line(),
            "BAN;1 day;;griefing;admin1;2024-01-01;;;player1;CID001;1.2.3.4"
        );
    }

    #[test]
    fn test_backfill_grows_short_record() {
        // Record with a ckey but no cid/ip slots at all
        let mut record = BanRecord::parse("BAN;;;reason;admin;2024-01-01;;;player1").unwrap();
        assert!(!record.is_complete());
        record.backfill("CID9", "9.9.9.9");
        assert_eq!(record.cid(), "CID9");
        assert_eq!(record.ip(), "9.9.9.9");
    }

    #[test]
    fn test_new_ban_layout() {
        let record = BanRecord::new_ban("admin1", "player1", "999 years", "spam", "2024-02-02");
        assert_eq!(record.ckey(), "player1");
        assert_eq!(record.cid(), UNKNOWN_FIELD);
        assert_eq!(record.ip(), UNKNOWN_FIELD);
        // Reparsing our own output must land every field in the same slot
        let reparsed = BanRecord::parse(&record.to_line()).unwrap();
        assert_eq!(reparsed, record);
    }

    #[test]
    fn test_parse_ban_log_buckets() {
        let text = format!("{}|||\nnot a real record|||\n", SAMPLE);
        let entries = parse_ban_log(&text);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].as_record().is_some());
        assert_eq!(entries[1], BanLogEntry::Legacy("not a real record".to_string()));
    }

    #[test]
    fn test_parse_ban_log_empty() {
        assert!(parse_ban_log("").is_empty());
        assert!(parse_ban_log("|||\n|||\n").is_empty());
    }

    #[test]
    fn test_permanent_duration_detection() {
        assert!(BanRequest::new("a", "999 years", "r").is_permanent());
        assert!(BanRequest::new("a", "Permanent", "r").is_permanent());
        assert!(BanRequest::new("a", "PERMABAN", "r").is_permanent());
        assert!(!BanRequest::new("a", "1 day", "r").is_permanent());
    }
}
