//! Per-ckey identity profile
//!
//! Backs the `ckeyinfo` command and the risk scanner: primary identifiers
//! from the player's own log entries, the expanded cluster, and ban flags
//! for the ckey itself and its linked alts.

use super::{correlate, IdentityCluster};
use crate::banlog::bans_for_ckey;
use crate::models::{BanLogEntry, BanRecord, PlayerActivityRecord};

#[derive(Debug, Clone)]
pub struct CkeyProfile {
    pub ckey: String,
    /// Identifiers seen in the ckey's own records, before expansion.
    pub primary_ips: Vec<String>,
    pub primary_cids: Vec<String>,
    pub primary_dates: Vec<String>,
    /// Full cluster after fixed-point expansion.
    pub cluster: IdentityCluster,
    /// The ckey itself has a ban record.
    pub banned: bool,
    /// Some other ckey in the cluster has a ban record.
    pub altbanned: bool,
}

impl CkeyProfile {
    /// Linked ckeys other than the profiled one.
    pub fn alts(&self) -> impl Iterator<Item = &String> {
        let own = self.ckey.clone();
        self.cluster.ckeys.iter().filter(move |c| **c != own)
    }

    pub fn has_alts(&self) -> bool {
        self.cluster.ckeys.len() > 1
    }
}

/// Build a profile from the unioned activity and ban logs of every
/// enabled server. Returns `None` when the ckey appears in neither log.
pub fn build_profile(
    ckey: &str,
    activity: &[PlayerActivityRecord],
    ban_entries: &[BanLogEntry],
) -> Option<CkeyProfile> {
    let own_bans = bans_for_ckey(ban_entries, ckey);

    let mut primary_ips = Vec::new();
    let mut primary_cids = Vec::new();
    let mut primary_dates = Vec::new();
    let mut seen = false;
    for record in activity.iter().filter(|r| r.ckey == ckey) {
        seen = true;
        push_known(&mut primary_ips, &record.ip);
        push_known(&mut primary_cids, &record.cid);
        push_known(&mut primary_dates, &record.date);
    }
    for record in &own_bans {
        seen = true;
        push_known(&mut primary_ips, record.ip());
        push_known(&mut primary_cids, record.cid());
        push_known(&mut primary_dates, record.date());
    }
    if !seen {
        return None;
    }

    let banned = !own_bans.is_empty();
    let bans: Vec<BanRecord> = ban_entries
        .iter()
        .filter_map(BanLogEntry::as_record)
        .cloned()
        .collect();
    let cluster = correlate(
        &[ckey.to_string()],
        &primary_ips,
        &primary_cids,
        activity,
        &bans,
    );

    let altbanned = cluster
        .ckeys
        .iter()
        .filter(|c| c.as_str() != ckey)
        .any(|c| !bans_for_ckey(ban_entries, c).is_empty());

    Some(CkeyProfile {
        ckey: ckey.to_string(),
        primary_ips,
        primary_cids,
        primary_dates,
        cluster,
        banned,
        altbanned,
    })
}

fn push_known(set: &mut Vec<String>, value: &str) {
    if value.is_empty() || value == "0" || set.iter().any(|v| v == value) {
        return;
    }
    set.push(value.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_ban_log;

    fn session(ckey: &str, ip: &str, cid: &str) -> PlayerActivityRecord {
        PlayerActivityRecord {
            ckey: ckey.to_string(),
            ip: ip.to_string(),
            cid: cid.to_string(),
            date: "2024-01-01".to_string(),
        }
    }

    #[test]
    fn test_unknown_ckey_has_no_profile() {
        let activity = vec![session("a", "1.1.1.1", "C1")];
        assert!(build_profile("ghost", &activity, &[]).is_none());
    }

    #[test]
    fn test_primary_identifiers_collected() {
        let activity = vec![
            session("a", "1.1.1.1", "C1"),
            session("a", "2.2.2.2", "C1"),
        ];
        let profile = build_profile("a", &activity, &[]).unwrap();
        assert_eq!(profile.primary_ips, vec!["1.1.1.1", "2.2.2.2"]);
        assert_eq!(profile.primary_cids, vec!["C1"]);
        assert!(!profile.banned);
        assert!(!profile.altbanned);
        assert!(!profile.has_alts());
    }

    #[test]
    fn test_alt_banned_through_shared_ip() {
        let activity = vec![
            session("a", "9.9.9.9", "C1"),
            session("b", "9.9.9.9", "C2"),
        ];
        let bans = parse_ban_log("BAN;;;grief;adm;2024-01-01;;;b;C2;9.9.9.9|||\n");
        let profile = build_profile("a", &activity, &bans).unwrap();
        assert!(profile.has_alts());
        assert!(!profile.banned);
        assert!(profile.altbanned);
        assert_eq!(profile.alts().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_banned_ckey_with_only_ban_records() {
        // Player never appeared in the activity log but has a ban line
        let bans = parse_ban_log("BAN;;;grief;adm;2024-01-01;;;a;C1;1.1.1.1|||\n");
        let profile = build_profile("a", &[], &bans).unwrap();
        assert!(profile.banned);
        assert_eq!(profile.primary_ips, vec!["1.1.1.1"]);
        assert_eq!(profile.primary_cids, vec!["C1"]);
    }
}
