pub mod activity;
pub mod ban;

pub use activity::{parse_activity_log, PlayerActivityRecord};
pub use ban::{parse_ban_log, BanLogEntry, BanRecord, BanRequest, BAN_SEPARATOR, UNKNOWN_FIELD};

/// Canonicalize a player identifier into ckey form.
///
/// Ckeys are stored lowercase with every non-alphanumeric character
/// stripped, which is also how the game server normalizes them before
/// writing its own log files.
pub fn canonical_ckey(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.extend(c.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_ckey_lowercases_and_strips() {
        assert_eq!(canonical_ckey("Player_One"), "playerone");
        assert_eq!(canonical_ckey("  Some.Guy  "), "someguy");
        assert_eq!(canonical_ckey("already"), "already");
    }

    #[test]
    fn test_canonical_ckey_numeric_ids_pass_through() {
        // Discord snowflakes stay numeric so the orchestrator can detect them
        assert_eq!(canonical_ckey("123456789"), "123456789");
    }

    #[test]
    fn test_canonical_ckey_empty() {
        assert_eq!(canonical_ckey("   "), "");
        assert_eq!(canonical_ckey("!@#$"), "");
    }
}
