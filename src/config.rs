use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the warden daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Game server contexts
    pub servers: Vec<ServerConfig>,
    /// Risk scanner configuration
    pub scanner: ScannerConfig,
    /// Staff channel notification configuration
    pub alerting: AlertConfig,
    /// Collaborator data files
    pub directory: DirectoryConfig,
    /// Appeal contact referenced in every ban reason
    pub appeal_contact: String,
}

/// One game server context. Every context owns exactly one base
/// directory holding its ban and activity logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Shorthand alias for the server
    pub key: String,
    /// Display name used in result messages
    pub name: String,
    /// Base directory of the server's shared files
    pub basedir: PathBuf,
    /// Disabled servers are skipped by every operation
    pub enabled: bool,
}

/// Risk scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Enable the periodic sweep
    pub enabled: bool,
    /// Seconds between sweeps
    pub interval_seconds: u64,
    /// ISO country codes that trigger an automatic ban
    pub blacklisted_countries: Vec<String>,
    /// IP prefixes that trigger an automatic ban
    pub blacklisted_regions: Vec<String>,
    /// Minimum account age in days; 0 disables the age check
    pub min_account_age_days: i64,
    /// Path to a MaxMind country database, if country checks are wanted
    pub geoip_db_path: Option<PathBuf>,
}

/// Staff channel notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub enabled: bool,
    /// Webhook receiving moderation notices
    pub webhook_url: Option<String>,
    /// Display name for posted notices
    pub username: Option<String>,
}

/// Paths to the collaborator data files maintained outside this process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Verified identity cache (JSON array of ss13/discord pairs)
    pub verified_path: PathBuf,
    /// Operator-granted exemption list
    pub permitted_path: PathBuf,
    /// Account age cache (JSON object of ckey -> creation date)
    pub ages_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            servers: vec![ServerConfig {
                key: "tdm".to_string(),
                name: "TDM".to_string(),
                basedir: PathBuf::from("/opt/gameserver/tdm"),
                enabled: true,
            }],
            scanner: ScannerConfig {
                enabled: true,
                interval_seconds: 180,
                blacklisted_countries: Vec::new(),
                blacklisted_regions: Vec::new(),
                min_account_age_days: 30,
                geoip_db_path: None,
            },
            alerting: AlertConfig {
                enabled: false,
                webhook_url: None,
                username: Some("Warden".to_string()),
            },
            directory: DirectoryConfig {
                verified_path: PathBuf::from("verified.json"),
                permitted_path: PathBuf::from("permitted.json"),
                ages_path: None,
            },
            appeal_contact: "discord.gg/gamecommunity".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Enabled server contexts, in configuration order.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }
}
