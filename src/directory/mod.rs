//! Collaborator interfaces around the moderation core
//!
//! The chat platform connection itself is out of scope; the core only
//! needs three things from it: the verified ckey ↔ external account id
//! mapping, role queries/mutations for a member, and an account age
//! lookup. Each is a trait here so the daemon can plug in the live
//! gateway while tests and the CLI use the file-backed or in-memory
//! implementations.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur while reading or mutating collaborator state
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("IO error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No member found for ckey `{0}`")]
    MemberNotFound(String),
}

/// Roles the moderation core manipulates on the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Applied on any ban.
    Banished,
    /// Terminal role set together with Banished on a permanent ban.
    PermanentlyBanned,
    /// Baseline role restored when a permanent ban is lifted.
    Cleared,
}

/// One verified identity mapping. Field names on disk match the cache
/// file the community's verification service already produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    #[serde(rename = "ss13")]
    pub ckey: String,
    #[serde(rename = "discord")]
    pub external_id: String,
}

/// Lookup of verified identity mappings.
pub trait IdentityDirectory: Send + Sync {
    fn by_ckey(&self, ckey: &str) -> Option<VerifiedIdentity>;
    fn by_external_id(&self, id: &str) -> Option<VerifiedIdentity>;

    fn is_verified(&self, ckey: &str) -> bool {
        self.by_ckey(ckey).is_some()
    }

    /// Every verified mapping, for full-roster sweeps.
    fn all(&self) -> Vec<VerifiedIdentity>;
}

/// Role queries and mutations for verified members.
///
/// Mutation failures are non-fatal to callers: role state and log state
/// are allowed to diverge temporarily and get fixed by the next manual
/// role sweep.
pub trait RoleGateway: Send + Sync {
    /// Whether the ckey resolves to a live member at all.
    fn member_exists(&self, ckey: &str) -> bool;
    fn has_role(&self, ckey: &str, role: Role) -> bool;
    fn add_role(&self, ckey: &str, role: Role, reason: &str) -> Result<(), DirectoryError>;
    fn remove_role(&self, ckey: &str, role: Role, reason: &str) -> Result<(), DirectoryError>;
    fn set_roles(&self, ckey: &str, roles: &[Role], reason: &str) -> Result<(), DirectoryError>;
}

/// Account age lookup for the risk scanner. Returns the account creation
/// date, or `None` when the platform lookup fails or has no data.
pub trait AccountAgeLookup: Send + Sync {
    fn created_on(&self, ckey: &str) -> Option<chrono::NaiveDate>;
}

/// Identity directory backed by the verification cache file (a JSON array
/// of `{"ss13": ..., "discord": ...}` objects).
pub struct FileDirectory {
    entries: Vec<VerifiedIdentity>,
}

impl FileDirectory {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<VerifiedIdentity> = serde_json::from_str(&contents)?;
        Ok(FileDirectory { entries })
    }

    pub fn from_entries(entries: Vec<VerifiedIdentity>) -> Self {
        FileDirectory { entries }
    }
}

impl IdentityDirectory for FileDirectory {
    fn by_ckey(&self, ckey: &str) -> Option<VerifiedIdentity> {
        self.entries.iter().find(|e| e.ckey == ckey).cloned()
    }

    fn by_external_id(&self, id: &str) -> Option<VerifiedIdentity> {
        self.entries.iter().find(|e| e.external_id == id).cloned()
    }

    fn all(&self) -> Vec<VerifiedIdentity> {
        self.entries.clone()
    }
}

/// Operator-granted exemptions from the automatic risk-ban checks,
/// persisted as a JSON array of ckeys.
pub struct PermitList {
    path: Option<PathBuf>,
    ckeys: Mutex<HashSet<String>>,
}

impl PermitList {
    pub fn new() -> Self {
        PermitList {
            path: None,
            ckeys: Mutex::new(HashSet::new()),
        }
    }

    /// Load from a file, starting empty if it does not exist yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let path = path.as_ref().to_path_buf();
        let ckeys = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(source) => return Err(DirectoryError::Io { path, source }),
        };
        Ok(PermitList {
            path: Some(path),
            ckeys: Mutex::new(ckeys),
        })
    }

    pub fn is_permitted(&self, ckey: &str) -> bool {
        self.ckeys.lock().unwrap().contains(ckey)
    }

    pub fn permit(&self, ckey: &str) -> Result<(), DirectoryError> {
        self.ckeys.lock().unwrap().insert(ckey.to_string());
        self.persist()
    }

    pub fn revoke(&self, ckey: &str) -> Result<(), DirectoryError> {
        self.ckeys.lock().unwrap().remove(ckey);
        self.persist()
    }

    pub fn all(&self) -> Vec<String> {
        let mut ckeys: Vec<String> = self.ckeys.lock().unwrap().iter().cloned().collect();
        ckeys.sort();
        ckeys
    }

    fn persist(&self) -> Result<(), DirectoryError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let ckeys = self.ckeys.lock().unwrap();
        let contents = serde_json::to_string_pretty(&*ckeys)?;
        std::fs::write(path, contents).map_err(|source| DirectoryError::Io {
            path: path.clone(),
            source,
        })
    }
}

impl Default for PermitList {
    fn default() -> Self {
        Self::new()
    }
}

/// Account ages served from a local cache file (JSON object of
/// ckey → ISO creation date). Refreshing the cache from the game platform
/// is the verification service's job, not ours.
pub struct AgeCache {
    ages: HashMap<String, chrono::NaiveDate>,
}

impl AgeCache {
    pub fn empty() -> Self {
        AgeCache {
            ages: HashMap::new(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ages: HashMap<String, chrono::NaiveDate> = serde_json::from_str(&contents)?;
        Ok(AgeCache { ages })
    }

    pub fn from_map(ages: HashMap<String, chrono::NaiveDate>) -> Self {
        AgeCache { ages }
    }
}

impl AccountAgeLookup for AgeCache {
    fn created_on(&self, ckey: &str) -> Option<chrono::NaiveDate> {
        self.ages.get(ckey).copied()
    }
}

/// In-memory role gateway. The daemon wires the live chat platform here;
/// tests and the one-shot CLI run against this implementation.
pub struct InMemoryRoleGateway {
    members: Mutex<HashMap<String, HashSet<Role>>>,
}

impl InMemoryRoleGateway {
    pub fn new() -> Self {
        InMemoryRoleGateway {
            members: Mutex::new(HashMap::new()),
        }
    }

    /// Register a member with an initial role set.
    pub fn add_member(&self, ckey: &str, roles: &[Role]) {
        self.members
            .lock()
            .unwrap()
            .insert(ckey.to_string(), roles.iter().copied().collect());
    }

    pub fn roles_of(&self, ckey: &str) -> Vec<Role> {
        self.members
            .lock()
            .unwrap()
            .get(ckey)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryRoleGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleGateway for InMemoryRoleGateway {
    fn member_exists(&self, ckey: &str) -> bool {
        self.members.lock().unwrap().contains_key(ckey)
    }

    fn has_role(&self, ckey: &str, role: Role) -> bool {
        self.members
            .lock()
            .unwrap()
            .get(ckey)
            .is_some_and(|roles| roles.contains(&role))
    }

    fn add_role(&self, ckey: &str, role: Role, reason: &str) -> Result<(), DirectoryError> {
        log::debug!("add role {:?} to `{}`: {}", role, ckey, reason);
        let mut members = self.members.lock().unwrap();
        let roles = members
            .get_mut(ckey)
            .ok_or_else(|| DirectoryError::MemberNotFound(ckey.to_string()))?;
        roles.insert(role);
        Ok(())
    }

    fn remove_role(&self, ckey: &str, role: Role, reason: &str) -> Result<(), DirectoryError> {
        log::debug!("remove role {:?} from `{}`: {}", role, ckey, reason);
        let mut members = self.members.lock().unwrap();
        let roles = members
            .get_mut(ckey)
            .ok_or_else(|| DirectoryError::MemberNotFound(ckey.to_string()))?;
        roles.remove(&role);
        Ok(())
    }

    fn set_roles(&self, ckey: &str, roles: &[Role], reason: &str) -> Result<(), DirectoryError> {
        log::debug!("set roles {:?} on `{}`: {}", roles, ckey, reason);
        let mut members = self.members.lock().unwrap();
        match members.get_mut(ckey) {
            Some(existing) => {
                *existing = roles.iter().copied().collect();
                Ok(())
            }
            None => Err(DirectoryError::MemberNotFound(ckey.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn directory() -> FileDirectory {
        FileDirectory::from_entries(vec![
            VerifiedIdentity {
                ckey: "player1".to_string(),
                external_id: "111222333".to_string(),
            },
            VerifiedIdentity {
                ckey: "player2".to_string(),
                external_id: "444555666".to_string(),
            },
        ])
    }

    #[test]
    fn test_directory_lookups() {
        let dir = directory();
        assert_eq!(dir.by_ckey("player1").unwrap().external_id, "111222333");
        assert_eq!(dir.by_external_id("444555666").unwrap().ckey, "player2");
        assert!(dir.by_ckey("ghost").is_none());
        assert!(dir.is_verified("player1"));
        assert!(!dir.is_verified("ghost"));
    }

    #[test]
    fn test_directory_file_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("verified.json");
        std::fs::write(
            &path,
            r#"[{"ss13": "player1", "discord": "111222333"}]"#,
        )
        .unwrap();
        let dir = FileDirectory::load(&path).unwrap();
        assert_eq!(dir.all().len(), 1);
        assert_eq!(dir.by_ckey("player1").unwrap().external_id, "111222333");
    }

    #[test]
    fn test_permit_list_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("permitted.json");
        let list = PermitList::load(&path).unwrap();
        assert!(!list.is_permitted("player1"));

        list.permit("player1").unwrap();
        assert!(list.is_permitted("player1"));

        // A fresh load sees the persisted state
        let reloaded = PermitList::load(&path).unwrap();
        assert!(reloaded.is_permitted("player1"));

        reloaded.revoke("player1").unwrap();
        assert!(!reloaded.is_permitted("player1"));
    }

    #[test]
    fn test_role_gateway_mutations() {
        let gateway = InMemoryRoleGateway::new();
        gateway.add_member("player1", &[Role::Cleared]);

        assert!(gateway.member_exists("player1"));
        assert!(!gateway.has_role("player1", Role::Banished));

        gateway.add_role("player1", Role::Banished, "test").unwrap();
        assert!(gateway.has_role("player1", Role::Banished));

        gateway
            .set_roles("player1", &[Role::Banished, Role::PermanentlyBanned], "test")
            .unwrap();
        assert!(!gateway.has_role("player1", Role::Cleared));
        assert!(gateway.has_role("player1", Role::PermanentlyBanned));

        assert!(gateway.add_role("ghost", Role::Banished, "test").is_err());
    }

    #[test]
    fn test_age_cache() {
        let mut ages = HashMap::new();
        ages.insert(
            "player1".to_string(),
            chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        );
        let cache = AgeCache::from_map(ages);
        assert!(cache.created_on("player1").is_some());
        assert!(cache.created_on("ghost").is_none());
    }
}
