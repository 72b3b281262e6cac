pub mod alerting;
pub mod banlog;
pub mod config;
pub mod correlation;
pub mod directory;
pub mod geolocation;
pub mod input;
pub mod models;
pub mod moderation;
pub mod scanner;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use correlation::{build_profile, CkeyProfile, IdentityCluster};
pub use directory::{FileDirectory, PermitList, Role};
pub use models::{canonical_ckey, BanRecord, BanRequest, PlayerActivityRecord};
pub use moderation::{Moderator, ReconcileScheduler, ServerContext};
pub use scanner::RiskScanner;
pub use storage::{BanStore, FlatFileStore, SqliteBanStore, StorageError};
