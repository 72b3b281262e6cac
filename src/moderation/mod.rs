//! Ban/unban orchestration
//!
//! The orchestrator validates a ban request, applies role changes through
//! the chat platform gateway, appends the ban record through the storage
//! port and schedules deferred reconciliation. Validation failures are
//! routine end-user input mistakes, so they are reported as result
//! strings rather than raised as errors; only the result text
//! distinguishes success, rejection and storage failure.

pub mod reconcile;

pub use reconcile::{
    reconcile_channel, update_ban_logs, ReconcileHandle, ReconcileScheduler, UpdateSummary,
    RECONCILE_DELAY,
};

use crate::directory::{IdentityDirectory, Role, RoleGateway};
use crate::models::{canonical_ckey, BanRecord, BanRequest};
use crate::storage::{ActivitySource, BanStore, StorageError};
use std::sync::Arc;

/// One game server wired for moderation. Clones share the underlying
/// stores.
#[derive(Clone)]
pub struct ServerContext {
    pub key: String,
    pub name: String,
    pub store: Arc<dyn BanStore>,
    pub activity: Arc<dyn ActivitySource>,
}

impl ServerContext {
    /// Wire a configured server to the flat files in its base directory.
    pub fn flat_file(config: &crate::config::ServerConfig) -> Self {
        let store = Arc::new(crate::storage::FlatFileStore::new(&config.basedir));
        ServerContext {
            key: config.key.clone(),
            name: config.name.clone(),
            store: store.clone(),
            activity: store,
        }
    }
}

/// The ban/unban orchestrator.
pub struct Moderator {
    directory: Arc<dyn IdentityDirectory>,
    roles: Arc<dyn RoleGateway>,
    reconciler: Option<ReconcileHandle>,
    /// Admin name recorded when the caller supplies none (automated bans).
    default_admin: String,
}

impl Moderator {
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        roles: Arc<dyn RoleGateway>,
        reconciler: Option<ReconcileHandle>,
        default_admin: impl Into<String>,
    ) -> Self {
        Moderator {
            directory,
            roles,
            reconciler,
            default_admin: default_admin.into(),
        }
    }

    /// Ban a player on one server and return the user-facing result.
    ///
    /// Validation happens in a fixed order and each failure returns its
    /// own message with zero side effects. Role mutations happen before
    /// the log write and are non-fatal: role state may briefly diverge
    /// from log state and gets fixed by the next role sweep.
    pub fn ban(&self, server: &ServerContext, request: &BanRequest, admin: Option<&str>) -> String {
        if request.ckey.trim().is_empty() {
            return "You must specify a ckey to ban.".to_string();
        }
        if request.duration.trim().is_empty() {
            return "You must specify a duration to ban for.".to_string();
        }
        if request.reason.trim().is_empty() {
            return "You must specify a reason for the ban.".to_string();
        }

        let mut ckey = canonical_ckey(&request.ckey);
        if ckey.is_empty() {
            return "You must specify a ckey to ban.".to_string();
        }
        if ckey.chars().all(|c| c.is_ascii_digit()) {
            match self.directory.by_external_id(&ckey) {
                Some(identity) => ckey = identity.ckey,
                None => {
                    return format!(
                        "Unable to find a ckey for <@{}>. Please use the ckey instead of the Discord ID.",
                        ckey
                    );
                }
            }
        }

        let permanent = request.is_permanent();
        let duration = if permanent {
            "999 years"
        } else {
            request.duration.as_str()
        };

        if self.roles.member_exists(&ckey) && !self.roles.has_role(&ckey, Role::Banished) {
            let audit = format!(
                "Banned for {} with the reason {}",
                duration, request.reason
            );
            let result = if permanent {
                self.roles
                    .set_roles(&ckey, &[Role::Banished, Role::PermanentlyBanned], &audit)
            } else {
                self.roles.add_role(&ckey, Role::Banished, &audit)
            };
            if let Err(e) = result {
                log::warn!("role update failed for `{}`: {}", ckey, e);
            }
        }

        let admin = admin.unwrap_or(&self.default_admin);
        let date = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let record = BanRecord::new_ban(admin, &ckey, duration, &request.reason, &date);
        if let Err(e) = server.store.append_ban(&record) {
            log::warn!("unable to record ban on `{}`: {}", server.key, e);
            return format!("Unable to write to the ban log for **{}**: {}", server.name, e);
        }

        if let Some(ref reconciler) = self.reconciler {
            reconciler.schedule(&ckey);
        }

        format!(
            "**{}** banned **{}** from **{}** for **{}** with the reason **{}**",
            admin, ckey, server.name, duration, request.reason
        )
    }

    /// Lift a player's ban on one server.
    ///
    /// Always clears the banished role, downgrades a permanent ban to the
    /// baseline role, then removes the stored records. Failures are
    /// logged, not returned; unlike `ban` this never schedules
    /// reconciliation.
    pub fn unban(&self, server: &ServerContext, ckey: &str, admin: Option<&str>) {
        let ckey = canonical_ckey(ckey);
        let admin = admin.unwrap_or(&self.default_admin);
        let audit = format!("Unbanned by {}", admin);

        if self.roles.member_exists(&ckey) {
            if self.roles.has_role(&ckey, Role::Banished) {
                if let Err(e) = self.roles.remove_role(&ckey, Role::Banished, &audit) {
                    log::warn!("failed to remove banished role from `{}`: {}", ckey, e);
                }
            }
            if self.roles.has_role(&ckey, Role::PermanentlyBanned) {
                if let Err(e) = self.roles.remove_role(&ckey, Role::PermanentlyBanned, &audit) {
                    log::warn!("failed to remove permaban role from `{}`: {}", ckey, e);
                }
                if let Err(e) = self.roles.add_role(&ckey, Role::Cleared, &audit) {
                    log::warn!("failed to restore baseline role for `{}`: {}", ckey, e);
                }
            }
        }

        match server.store.remove_bans(&ckey) {
            Ok(removed) => {
                log::info!("removed {} ban record(s) for `{}` on `{}`", removed, ckey, server.key)
            }
            Err(e) => log::warn!("unable to unban `{}` on `{}`: {}", ckey, server.key, e),
        }
    }

    /// Report every ban line for a ckey across the given servers,
    /// resolving a numeric id through the directory first. Re-applies the
    /// banished role when a live ban is found for a verified member.
    pub fn bancheck(
        &self,
        servers: &[ServerContext],
        ckey_or_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        let ckey = match self.resolve(ckey_or_id) {
            Some(ckey) => ckey,
            None => {
                return Ok(vec![format!(
                    "No ckey found for Discord ID `{}`.",
                    canonical_ckey(ckey_or_id)
                )])
            }
        };

        let mut lines = Vec::new();
        for server in servers {
            for record in server.store.bans_for(&ckey)? {
                lines.push(format!(
                    "**{}** has been **{}** banned from **{}** on **{}** for **{}** by {}.",
                    ckey,
                    record.kind(),
                    server.name,
                    record.date(),
                    record.reason(),
                    record.admin()
                ));
            }
        }

        if lines.is_empty() {
            lines.push(format!("No bans were found for **{}**.", ckey));
        } else if self.roles.member_exists(&ckey) && !self.roles.has_role(&ckey, Role::Banished) {
            if let Err(e) = self.roles.add_role(&ckey, Role::Banished, "bancheck") {
                log::warn!("failed to re-apply banished role to `{}`: {}", ckey, e);
            }
        }
        Ok(lines)
    }

    /// Run `bancheck` over every verified member.
    pub fn fullbancheck(&self, servers: &[ServerContext]) -> Result<Vec<String>, StorageError> {
        let mut lines = Vec::new();
        for identity in self.directory.all() {
            for line in self.bancheck(servers, &identity.ckey)? {
                if !line.starts_with("No bans") {
                    lines.push(line);
                }
            }
        }
        Ok(lines)
    }

    fn resolve(&self, ckey_or_id: &str) -> Option<String> {
        let ckey = canonical_ckey(ckey_or_id);
        if !ckey.is_empty() && ckey.chars().all(|c| c.is_ascii_digit()) {
            return self.directory.by_external_id(&ckey).map(|i| i.ckey);
        }
        Some(ckey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{FileDirectory, InMemoryRoleGateway, VerifiedIdentity};
    use crate::storage::FlatFileStore;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        server: ServerContext,
        roles: Arc<InMemoryRoleGateway>,
        moderator: Moderator,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlatFileStore::new(dir.path()));
        let server = ServerContext {
            key: "tdm".to_string(),
            name: "TDM".to_string(),
            store: store.clone(),
            activity: store,
        };
        let directory = Arc::new(FileDirectory::from_entries(vec![VerifiedIdentity {
            ckey: "player1".to_string(),
            external_id: "123456789".to_string(),
        }]));
        let roles = Arc::new(InMemoryRoleGateway::new());
        roles.add_member("player1", &[Role::Cleared]);
        let moderator = Moderator::new(directory, roles.clone(), None, "warden");
        Fixture {
            _dir: dir,
            server,
            roles,
            moderator,
        }
    }

    fn request(ckey: &str, duration: &str, reason: &str) -> BanRequest {
        BanRequest::new(ckey, duration, reason)
    }

    #[test]
    fn test_validation_order_and_no_side_effects() {
        let f = fixture();
        let msg = f
            .moderator
            .ban(&f.server, &request("", "1 day", "test"), Some("adm"));
        assert_eq!(msg, "You must specify a ckey to ban.");

        let msg = f
            .moderator
            .ban(&f.server, &request("player1", "", "test"), Some("adm"));
        assert_eq!(msg, "You must specify a duration to ban for.");

        let msg = f
            .moderator
            .ban(&f.server, &request("player1", "1 day", ""), Some("adm"));
        assert_eq!(msg, "You must specify a reason for the ban.");

        // No ban log was ever created
        assert!(f.server.store.ban_entries().is_err());
        assert!(!f.roles.has_role("player1", Role::Banished));
    }

    #[test]
    fn test_unresolvable_numeric_ckey() {
        let f = fixture();
        let msg = f
            .moderator
            .ban(&f.server, &request("999999", "999 years", "x"), Some("adm"));
        assert_eq!(
            msg,
            "Unable to find a ckey for <@999999>. Please use the ckey instead of the Discord ID."
        );
        assert!(f.server.store.ban_entries().is_err());
    }

    #[test]
    fn test_numeric_ckey_resolves_through_directory() {
        let f = fixture();
        let msg = f
            .moderator
            .ban(&f.server, &request("123456789", "1 day", "grief"), Some("adm"));
        assert_eq!(
            msg,
            "**adm** banned **player1** from **TDM** for **1 day** with the reason **grief**"
        );
        assert!(f.server.store.is_banned("player1").unwrap());
    }

    #[test]
    fn test_temporary_ban_adds_banished_role() {
        let f = fixture();
        f.moderator
            .ban(&f.server, &request("player1", "1 day", "grief"), Some("adm"));
        assert!(f.roles.has_role("player1", Role::Banished));
        assert!(!f.roles.has_role("player1", Role::PermanentlyBanned));
        assert!(f.roles.has_role("player1", Role::Cleared));
    }

    #[test]
    fn test_permanent_ban_replaces_role_set() {
        let f = fixture();
        let msg = f.moderator.ban(
            &f.server,
            &request("player1", "Permanent", "grief"),
            Some("adm"),
        );
        // `perm` prefixes normalize to the storage literal
        assert!(msg.contains("for **999 years**"));
        assert!(f.roles.has_role("player1", Role::Banished));
        assert!(f.roles.has_role("player1", Role::PermanentlyBanned));
        assert!(!f.roles.has_role("player1", Role::Cleared));

        let bans = f.server.store.bans_for("player1").unwrap();
        assert_eq!(bans[0].duration(), "999 years");
    }

    #[test]
    fn test_ban_of_unverified_player_still_writes_log() {
        let f = fixture();
        let msg = f
            .moderator
            .ban(&f.server, &request("stranger", "1 day", "grief"), Some("adm"));
        assert!(msg.contains("**adm** banned **stranger**"));
        assert!(f.server.store.is_banned("stranger").unwrap());
    }

    #[test]
    fn test_unban_clears_roles_and_records() {
        let f = fixture();
        f.moderator.ban(
            &f.server,
            &request("player1", "999 years", "grief"),
            Some("adm"),
        );
        f.moderator.unban(&f.server, "player1", Some("adm"));

        assert!(!f.roles.has_role("player1", Role::Banished));
        assert!(!f.roles.has_role("player1", Role::PermanentlyBanned));
        assert!(f.roles.has_role("player1", Role::Cleared));
        assert!(!f.server.store.is_banned("player1").unwrap());
    }

    #[test]
    fn test_storage_failure_is_distinguishable() {
        let f = fixture();
        let dead = ServerContext {
            key: "dead".to_string(),
            name: "Dead".to_string(),
            store: Arc::new(FlatFileStore::new("/nonexistent/path/to/server")),
            activity: Arc::new(FlatFileStore::new("/nonexistent/path/to/server")),
        };
        let msg = f
            .moderator
            .ban(&dead, &request("player1", "1 day", "grief"), Some("adm"));
        assert!(msg.starts_with("Unable to write to the ban log for **Dead**"));
    }

    #[test]
    fn test_bancheck_reports_per_server_lines() {
        let f = fixture();
        f.moderator
            .ban(&f.server, &request("player1", "1 day", "grief"), Some("adm"));
        let lines = f
            .moderator
            .bancheck(std::slice::from_ref(&f.server), "player1")
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("**player1** has been **BAN** banned from **TDM**"));
    }

    #[test]
    fn test_bancheck_reapplies_banished_role() {
        let f = fixture();
        f.moderator
            .ban(&f.server, &request("player1", "1 day", "grief"), Some("adm"));
        f.roles
            .remove_role("player1", Role::Banished, "test drift")
            .unwrap();

        f.moderator
            .bancheck(std::slice::from_ref(&f.server), "player1")
            .unwrap();
        assert!(f.roles.has_role("player1", Role::Banished));
    }

    #[test]
    fn test_bancheck_no_bans_found() {
        let f = fixture();
        // Ban someone else so the log exists
        f.moderator
            .ban(&f.server, &request("other", "1 day", "x"), Some("adm"));
        let lines = f
            .moderator
            .bancheck(std::slice::from_ref(&f.server), "player1")
            .unwrap();
        assert_eq!(lines, vec!["No bans were found for **player1**."]);
    }
}
