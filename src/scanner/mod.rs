//! Alt-account risk scanner
//!
//! Periodically looks at the players currently connected to each server
//! and flags accounts that look like ban evasion: linked to a banned alt,
//! connecting from a blacklisted country or IP range, or created too
//! recently. Flagged accounts get a permanent ban through the normal
//! orchestrator plus a staff notice.
//!
//! Every ckey is evaluated at most once per process lifetime. Verified
//! members and operator-permitted ckeys are never flagged.

use crate::alerting::NoticeSender;
use crate::config::ScannerConfig;
use crate::correlation::{build_profile, CkeyProfile};
use crate::directory::{AccountAgeLookup, IdentityDirectory, PermitList};
use crate::geolocation::CountryLookup;
use crate::models::{BanLogEntry, BanRequest, PlayerActivityRecord};
use crate::moderation::{Moderator, ServerContext};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// One flagged account: the reason recorded in the ban log and the tag
/// appended to the staff notice.
struct Flag {
    reason: String,
    tag: &'static str,
}

pub struct RiskScanner {
    config: ScannerConfig,
    appeal_contact: String,
    permits: Arc<PermitList>,
    directory: Arc<dyn IdentityDirectory>,
    ages: Arc<dyn AccountAgeLookup>,
    geo: Option<CountryLookup>,
    notices: Option<NoticeSender>,
    seen: Mutex<HashSet<String>>,
}

impl RiskScanner {
    pub fn new(
        config: ScannerConfig,
        appeal_contact: impl Into<String>,
        permits: Arc<PermitList>,
        directory: Arc<dyn IdentityDirectory>,
        ages: Arc<dyn AccountAgeLookup>,
        notices: Option<NoticeSender>,
    ) -> Self {
        let geo = match config.geoip_db_path {
            Some(ref path) => match CountryLookup::new(path) {
                Ok(lookup) => Some(lookup),
                Err(e) => {
                    log::warn!("country checks disabled: {}", e);
                    None
                }
            },
            None => None,
        };
        RiskScanner {
            config,
            appeal_contact: appeal_contact.into(),
            permits,
            directory,
            ages,
            geo,
            notices,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Evaluate the given players against one server, banning and
    /// notifying on every flag. Logs are unioned across all servers so a
    /// banned alt on a sibling server still counts.
    pub fn scan_players(
        &self,
        moderator: &Moderator,
        servers: &[ServerContext],
        server: &ServerContext,
        players: &[String],
    ) {
        let (activity, bans) = gather_logs(servers);
        for ckey in players {
            if self.seen.lock().unwrap().contains(ckey) {
                continue;
            }
            if self.permits.is_permitted(ckey) || self.directory.is_verified(ckey) {
                self.seen.lock().unwrap().insert(ckey.clone());
                continue;
            }
            // No log trace yet; leave unseen so the next sweep retries
            let Some(profile) = build_profile(ckey, &activity, &bans) else {
                continue;
            };

            if let Some(flag) = self.evaluate(&profile) {
                let request = BanRequest::new(ckey, "999 years", &flag.reason);
                let result = moderator.ban(server, &request, None);
                log::info!("risk scanner flagged `{}`: {}", ckey, result);
                if let Some(ref notices) = self.notices {
                    notices.notify(&server.name, &format!("{}{}", result, flag.tag));
                }
            }
            self.seen.lock().unwrap().insert(ckey.clone());
        }
    }

    /// Run the checks in fixed order and return the first hit.
    fn evaluate(&self, profile: &CkeyProfile) -> Option<Flag> {
        let investigation = format!(
            "Account under investigation. Appeal at {}",
            self.appeal_contact
        );

        if profile.altbanned {
            return Some(Flag {
                reason: investigation,
                tag: " (Alt Banned)",
            });
        }
        if self.from_blacklisted_country(&profile.cluster.ips) {
            return Some(Flag {
                reason: investigation,
                tag: " (Blacklisted Country)",
            });
        }
        if self.from_blacklisted_region(&profile.cluster.ips) {
            return Some(Flag {
                reason: investigation,
                tag: " (Blacklisted Region)",
            });
        }
        self.account_too_young(&profile.ckey)
    }

    fn from_blacklisted_country(&self, ips: &[String]) -> bool {
        let Some(ref geo) = self.geo else {
            return false;
        };
        if self.config.blacklisted_countries.is_empty() {
            return false;
        }
        ips.iter()
            .filter_map(|ip| geo.country_code(ip))
            .any(|code| self.config.blacklisted_countries.contains(&code))
    }

    fn from_blacklisted_region(&self, ips: &[String]) -> bool {
        ips.iter().any(|ip| {
            self.config
                .blacklisted_regions
                .iter()
                .any(|prefix| ip.starts_with(prefix.as_str()))
        })
    }

    fn account_too_young(&self, ckey: &str) -> Option<Flag> {
        if self.config.min_account_age_days <= 0 {
            return None;
        }
        let created = self.ages.created_on(ckey)?;
        let age_days = (chrono::Utc::now().date_naive() - created).num_days();
        if age_days >= self.config.min_account_age_days {
            return None;
        }
        Some(Flag {
            reason: format!(
                "Byond account `{}` does not meet the requirements to be approved. ({})",
                ckey, created
            ),
            tag: "",
        })
    }
}

/// Union the readable activity and ban logs of every server. Unreadable
/// logs are skipped, never fatal: a sweep with partial data is still
/// better than none.
pub fn gather_logs(servers: &[ServerContext]) -> (Vec<PlayerActivityRecord>, Vec<BanLogEntry>) {
    let mut activity = Vec::new();
    let mut bans = Vec::new();
    for server in servers {
        match server.activity.activity_records() {
            Ok(mut records) => activity.append(&mut records),
            Err(e) => log::warn!("skipping activity log of `{}`: {}", server.key, e),
        }
        match server.store.ban_entries() {
            Ok(mut entries) => bans.append(&mut entries),
            Err(e) => log::warn!("skipping ban log of `{}`: {}", server.key, e),
        }
    }
    (activity, bans)
}

/// Report every verified, unbanned member whose identity cluster links
/// more than one ckey. Backs the manual `fullaltcheck` sweep.
pub fn full_alt_check(
    directory: &dyn IdentityDirectory,
    servers: &[ServerContext],
) -> Vec<String> {
    let (activity, bans) = gather_logs(servers);
    let mut lines = Vec::new();
    for identity in directory.all() {
        let Some(profile) = build_profile(&identity.ckey, &activity, &bans) else {
            continue;
        };
        if profile.banned || !profile.has_alts() {
            continue;
        }
        let alts: Vec<&str> = profile.alts().map(String::as_str).collect();
        lines.push(format!(
            "**{}** is linked to: {}",
            identity.ckey,
            alts.join(", ")
        ));
    }
    lines
}
