//! Alt-account identity correlation
//!
//! Players show up across servers under different ckeys but tend to reuse
//! IPs and client ids. Starting from a seed identity, the correlator
//! repeatedly scans the activity log (then the ban log) and unions in the
//! identity of every record matching any value found so far, until a scan
//! adds nothing new or the round cutoff is hit.
//!
//! Matching is a logical OR over ckey, IP and CID. A shared NAT or cafe IP
//! can therefore transitively link unrelated players; that heuristic is
//! inherited from the game community's original tooling and kept as-is.

pub mod profile;

pub use profile::{build_profile, CkeyProfile};

use crate::models::{BanRecord, PlayerActivityRecord};

/// Round cutoff for fixed-point expansion. Pathological or cyclic data
/// terminates with partial results instead of looping forever.
pub const MAX_ROUNDS: usize = 10;

/// Transient result of correlation: everything linked to the seed.
///
/// Items are stored in first-discovery order so results are reproducible.
/// Never persisted; recomputed per query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityCluster {
    pub ckeys: Vec<String>,
    pub ips: Vec<String>,
    pub cids: Vec<String>,
    pub dates: Vec<String>,
}

impl IdentityCluster {
    pub fn from_seed(ckeys: &[String], ips: &[String], cids: &[String]) -> Self {
        let mut cluster = IdentityCluster::default();
        for ckey in ckeys {
            cluster.add_ckey(ckey);
        }
        for ip in ips {
            cluster.add_ip(ip);
        }
        for cid in cids {
            cluster.add_cid(cid);
        }
        cluster
    }

    /// Whether a record's identity intersects the cluster.
    fn matches(&self, ckey: &str, ip: &str, cid: &str) -> bool {
        (known(ckey) && self.ckeys.iter().any(|c| c == ckey))
            || (known(ip) && self.ips.iter().any(|i| i == ip))
            || (known(cid) && self.cids.iter().any(|c| c == cid))
    }

    /// Union a record's identity into the cluster. Returns true if any
    /// new ckey, IP or CID was added; new dates alone do not count as
    /// progress toward the fixed point.
    fn absorb(&mut self, ckey: &str, ip: &str, cid: &str, date: &str) -> bool {
        let mut grew = self.add_ckey(ckey);
        grew |= self.add_ip(ip);
        grew |= self.add_cid(cid);
        self.add_date(date);
        grew
    }

    fn add_ckey(&mut self, ckey: &str) -> bool {
        push_unique(&mut self.ckeys, ckey)
    }

    fn add_ip(&mut self, ip: &str) -> bool {
        push_unique(&mut self.ips, ip)
    }

    fn add_cid(&mut self, cid: &str) -> bool {
        push_unique(&mut self.cids, cid)
    }

    fn add_date(&mut self, date: &str) -> bool {
        push_unique(&mut self.dates, date)
    }
}

/// `'0'` is the unknown sentinel in ban records; empty fields come from
/// partial activity records. Neither participates in matching.
fn known(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

fn push_unique(set: &mut Vec<String>, value: &str) -> bool {
    if !known(value) || set.iter().any(|v| v == value) {
        return false;
    }
    set.push(value.to_string());
    true
}

/// Expand a seed identity to its full cluster across the activity log and
/// then the ban log.
///
/// Each phase rescans its whole log per round and stops as soon as a round
/// adds nothing, or after [`MAX_ROUNDS`] rounds. An empty seed comes back
/// unchanged. Ckeys are matched exactly as stored; callers pass them
/// pre-lowercased.
pub fn correlate(
    seed_ckeys: &[String],
    seed_ips: &[String],
    seed_cids: &[String],
    activity: &[PlayerActivityRecord],
    bans: &[BanRecord],
) -> IdentityCluster {
    let mut cluster = IdentityCluster::from_seed(seed_ckeys, seed_ips, seed_cids);

    for round in 0..MAX_ROUNDS {
        let mut grew = false;
        for record in activity {
            if cluster.matches(&record.ckey, &record.ip, &record.cid) {
                grew |= cluster.absorb(&record.ckey, &record.ip, &record.cid, &record.date);
            }
        }
        if !grew {
            log::debug!("activity expansion converged after {} round(s)", round);
            break;
        }
    }

    for round in 0..MAX_ROUNDS {
        let mut grew = false;
        for record in bans {
            if cluster.matches(record.ckey(), record.ip(), record.cid()) {
                grew |= cluster.absorb(record.ckey(), record.ip(), record.cid(), record.date());
            }
        }
        if !grew {
            log::debug!("ban expansion converged after {} round(s)", round);
            break;
        }
    }

    cluster
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(ckey: &str, ip: &str, cid: &str) -> PlayerActivityRecord {
        PlayerActivityRecord {
            ckey: ckey.to_string(),
            ip: ip.to_string(),
            cid: cid.to_string(),
            date: String::new(),
        }
    }

    fn seed(ckey: &str) -> Vec<String> {
        vec![ckey.to_string()]
    }

    #[test]
    fn test_shared_ip_links_accounts() {
        let activity = vec![
            session("a", "9.9.9.9", "X"),
            session("b", "9.9.9.9", "Y"),
        ];
        let cluster = correlate(&seed("a"), &[], &[], &activity, &[]);
        assert_eq!(cluster.ckeys, vec!["a", "b"]);
        assert_eq!(cluster.ips, vec!["9.9.9.9"]);
        assert_eq!(cluster.cids, vec!["X", "Y"]);
    }

    #[test]
    fn test_empty_seed_unchanged() {
        let activity = vec![session("a", "9.9.9.9", "X")];
        let cluster = correlate(&[], &[], &[], &activity, &[]);
        assert_eq!(cluster, IdentityCluster::default());
    }

    #[test]
    fn test_partial_records_contribute_present_fields() {
        let activity = vec![session("a", "", "X"), session("b", "", "X")];
        let cluster = correlate(&seed("a"), &[], &[], &activity, &[]);
        assert_eq!(cluster.ckeys, vec!["a", "b"]);
        assert!(cluster.ips.is_empty());
    }

    #[test]
    fn test_unknown_sentinel_never_matches() {
        // Two bans with cid/ip still at '0' must not merge via the sentinel
        let bans = vec![
            BanRecord::parse("BAN;;;r;adm;2024;;;a;0;0").unwrap(),
            BanRecord::parse("BAN;;;r;adm;2024;;;b;0;0").unwrap(),
        ];
        let cluster = correlate(&seed("a"), &[], &[], &[], &bans);
        assert_eq!(cluster.ckeys, vec!["a"]);
        assert!(cluster.cids.is_empty());
        assert!(cluster.ips.is_empty());
    }

    #[test]
    fn test_chain_expansion_is_transitive() {
        // a -(ip1)- b -(cid2)- c
        let activity = vec![
            session("a", "1.1.1.1", "C1"),
            session("b", "1.1.1.1", "C2"),
            session("c", "2.2.2.2", "C2"),
        ];
        let cluster = correlate(&seed("a"), &[], &[], &activity, &[]);
        assert_eq!(cluster.ckeys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_round_cutoff_terminates_on_long_chains() {
        // A long hop chain stored in reverse order, so each round can only
        // advance a hop or two. The cutoff returns partial results instead
        // of walking the whole chain.
        let mut activity = Vec::new();
        for i in 0..50 {
            activity.push(session(&format!("p{}", i), &format!("ip{}", i), ""));
            activity.push(session(&format!("p{}", i + 1), &format!("ip{}", i), ""));
        }
        activity.reverse();
        let cluster = correlate(&seed("p0"), &[], &[], &activity, &[]);
        assert!(cluster.ckeys.len() > 1);
        assert!(cluster.ckeys.len() < 51);
    }

    #[test]
    fn test_results_only_grow() {
        let activity = vec![
            session("a", "1.1.1.1", "C1"),
            session("b", "1.1.1.1", "C2"),
        ];
        let first = correlate(&seed("a"), &[], &[], &activity, &[]);
        // Re-seeding with the full result must be a superset (here: equal)
        let second = correlate(&first.ckeys, &first.ips, &first.cids, &activity, &[]);
        for ckey in &first.ckeys {
            assert!(second.ckeys.contains(ckey));
        }
        for ip in &first.ips {
            assert!(second.ips.contains(ip));
        }
    }

    #[test]
    fn test_ban_log_phase_extends_cluster() {
        let activity = vec![session("a", "1.1.1.1", "C1")];
        let bans = vec![BanRecord::parse("BAN;;;r;adm;2024-03-03;;;z;C1;7.7.7.7").unwrap()];
        let cluster = correlate(&seed("a"), &[], &[], &activity, &bans);
        assert_eq!(cluster.ckeys, vec!["a", "z"]);
        assert_eq!(cluster.ips, vec!["1.1.1.1", "7.7.7.7"]);
        assert!(cluster.dates.contains(&"2024-03-03".to_string()));
    }

    #[test]
    fn test_first_discovery_order_is_stable() {
        let activity = vec![
            session("a", "1.1.1.1", "C1"),
            session("c", "1.1.1.1", "C3"),
            session("b", "1.1.1.1", "C2"),
        ];
        let cluster = correlate(&seed("a"), &[], &[], &activity, &[]);
        assert_eq!(cluster.ckeys, vec!["a", "c", "b"]);
        assert_eq!(cluster.cids, vec!["C1", "C3", "C2"]);
    }
}
