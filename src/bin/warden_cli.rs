use std::path::PathBuf;
use std::sync::Arc;
use structopt::StructOpt;

use warden::config::Config;
use warden::directory::{FileDirectory, IdentityDirectory, InMemoryRoleGateway, PermitList};
use warden::geolocation::CountryLookup;
use warden::models::BanRequest;
use warden::moderation::{update_ban_logs, Moderator};
use warden::scanner::{full_alt_check, gather_logs};
use warden::{build_profile, ServerContext};

/// Moderation core command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "warden", about = "Game community moderation CLI")]
pub enum Cli {
    /// Ban a ckey from a server
    Ban {
        /// Server key from the configuration
        server: String,
        ckey: String,
        /// Ban duration, e.g. "3 days" or "perm"
        duration: String,
        /// Ban reason
        reason: Vec<String>,
        /// Admin name recorded in the ban log
        #[structopt(short, long)]
        admin: Option<String>,
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Lift every ban of a ckey on a server
    Unban {
        server: String,
        ckey: String,
        #[structopt(short, long)]
        admin: Option<String>,
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Report every ban of a ckey across all servers
    Bancheck {
        ckey: String,
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Run bancheck over every verified member
    Fullbancheck {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Show the identity profile of a ckey
    Ckeyinfo {
        ckey: String,
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Report verified members with linked alt accounts
    Fullaltcheck {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Dump the raw ban log of a server
    Listbans {
        server: String,
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Backfill every server's ban log from the activity logs
    Updatebans {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Exempt a ckey from the automatic risk checks
    Permit {
        ckey: String,
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Withdraw a ckey's exemption
    Revoke {
        ckey: String,
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// List the exempted ckeys
    Permitted {
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Ban {
            server,
            ckey,
            duration,
            reason,
            admin,
            config,
        } => {
            let config = load_config(&config)?;
            let servers = contexts(&config);
            let server = context_for(&servers, &server)?;
            let moderator = moderator(&config);

            let reason = format!("{} Appeal at {}", reason.join(" "), config.appeal_contact);
            let request = BanRequest::new(&ckey, &duration, &reason);
            println!("{}", moderator.ban(server, &request, admin.as_deref()));

            // One-shot process, so backfill immediately instead of arming
            // a deferred timer that would not survive exit
            let logs = activity_logs(&servers);
            if let Err(e) = server.store.reconcile(&logs, Some(&warden::canonical_ckey(&ckey))) {
                log::warn!("backfill after ban failed: {}", e);
            }
        }
        Cli::Unban {
            server,
            ckey,
            admin,
            config,
        } => {
            let config = load_config(&config)?;
            let servers = contexts(&config);
            let server = context_for(&servers, &server)?;
            moderator(&config).unban(server, &ckey, admin.as_deref());
            println!("Unbanned **{}** from **{}**.", ckey, server.name);
        }
        Cli::Bancheck { ckey, config } => {
            let config = load_config(&config)?;
            let servers = contexts(&config);
            for line in moderator(&config).bancheck(&servers, &ckey)? {
                println!("{}", line);
            }
        }
        Cli::Fullbancheck { config } => {
            let config = load_config(&config)?;
            let servers = contexts(&config);
            let lines = moderator(&config).fullbancheck(&servers)?;
            if lines.is_empty() {
                println!("No bans were found for any verified member.");
            }
            for line in lines {
                println!("{}", line);
            }
        }
        Cli::Ckeyinfo { ckey, config } => {
            let config = load_config(&config)?;
            let servers = contexts(&config);
            print_profile(&config, &servers, &ckey)?;
        }
        Cli::Fullaltcheck { config } => {
            let config = load_config(&config)?;
            let servers = contexts(&config);
            let directory = directory(&config);
            let lines = full_alt_check(&*directory, &servers);
            if lines.is_empty() {
                println!("No verified member has linked alt accounts.");
            }
            for line in lines {
                println!("{}", line);
            }
        }
        Cli::Listbans { server, config } => {
            let config = load_config(&config)?;
            let servers = contexts(&config);
            let server = context_for(&servers, &server)?;
            println!("{}", server.store.raw_ban_log()?);
        }
        Cli::Updatebans { config } => {
            let config = load_config(&config)?;
            let servers = contexts(&config);
            let summary = update_ban_logs(&servers);
            for key in &summary.updated {
                println!("Ban log updated on `{}`.", key);
            }
            for (key, error) in &summary.failed {
                println!("Update failed on `{}`: {}", key, error);
            }
            if summary.updated.is_empty() && summary.failed.is_empty() {
                println!("All ban logs are already up to date.");
            }
        }
        Cli::Permit { ckey, config } => {
            let config = load_config(&config)?;
            let permits = PermitList::load(&config.directory.permitted_path)?;
            permits.permit(&warden::canonical_ckey(&ckey))?;
            println!("**{}** is now exempt from the automatic checks.", ckey);
        }
        Cli::Revoke { ckey, config } => {
            let config = load_config(&config)?;
            let permits = PermitList::load(&config.directory.permitted_path)?;
            permits.revoke(&warden::canonical_ckey(&ckey))?;
            println!("**{}** is no longer exempt.", ckey);
        }
        Cli::Permitted { config } => {
            let config = load_config(&config)?;
            let permits = PermitList::load(&config.directory.permitted_path)?;
            let ckeys = permits.all();
            if ckeys.is_empty() {
                println!("No ckeys are permitted.");
            } else {
                println!("{}", ckeys.join(", "));
            }
        }
        Cli::Config { output } => {
            Config::default().to_file(&output)?;
            println!("Default configuration written to {:?}", output);
        }
    }

    Ok(())
}

fn load_config(path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        Config::from_file(path)
    } else {
        log::warn!("Config file not found, using defaults");
        Ok(Config::default())
    }
}

fn contexts(config: &Config) -> Vec<ServerContext> {
    config.enabled_servers().map(ServerContext::flat_file).collect()
}

fn context_for<'a>(
    servers: &'a [ServerContext],
    key: &str,
) -> Result<&'a ServerContext, Box<dyn std::error::Error>> {
    servers
        .iter()
        .find(|s| s.key == key)
        .ok_or_else(|| format!("no enabled server with key `{}`", key).into())
}

fn directory(config: &Config) -> Arc<FileDirectory> {
    Arc::new(match FileDirectory::load(&config.directory.verified_path) {
        Ok(directory) => directory,
        Err(e) => {
            log::warn!("Verified identity cache unavailable: {}", e);
            FileDirectory::from_entries(Vec::new())
        }
    })
}

fn moderator(config: &Config) -> Moderator {
    Moderator::new(
        directory(config),
        Arc::new(InMemoryRoleGateway::new()),
        None,
        "warden",
    )
}

fn activity_logs(servers: &[ServerContext]) -> Vec<String> {
    let mut logs = Vec::new();
    for server in servers {
        match server.activity.raw_activity_log() {
            Ok(text) => logs.push(text),
            Err(e) => log::warn!("skipping activity log of `{}`: {}", server.key, e),
        }
    }
    logs
}

fn print_profile(
    config: &Config,
    servers: &[ServerContext],
    ckey: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ckey = warden::canonical_ckey(ckey);
    let (activity, bans) = gather_logs(servers);
    let Some(profile) = build_profile(&ckey, &activity, &bans) else {
        println!("No records found for **{}**.", ckey);
        return Ok(());
    };

    let directory = directory(config);
    let permits = PermitList::load(&config.directory.permitted_path)?;

    println!("**{}**", profile.ckey);
    match directory.by_ckey(&profile.ckey) {
        Some(identity) => println!("Verified: yes (<@{}>)", identity.external_id),
        None => println!("Verified: no"),
    }
    println!("Permitted: {}", yes_no(permits.is_permitted(&profile.ckey)));
    println!("Banned: {}", yes_no(profile.banned));
    println!("Alt banned: {}", yes_no(profile.altbanned));
    println!("IPs: {}", profile.primary_ips.join(", "));
    println!("CIDs: {}", profile.primary_cids.join(", "));
    println!("Dates: {}", profile.primary_dates.join(", "));

    let alts: Vec<&str> = profile.alts().map(String::as_str).collect();
    if !alts.is_empty() {
        println!("Linked ckeys: {}", alts.join(", "));
    }

    if let Some(ref db_path) = config.scanner.geoip_db_path {
        if let Ok(geo) = CountryLookup::new(db_path) {
            let mut regions: Vec<String> = profile
                .cluster
                .ips
                .iter()
                .filter_map(|ip| geo.country_code(ip))
                .collect();
            regions.sort();
            regions.dedup();
            if !regions.is_empty() {
                println!("Regions: {}", regions.join(", "));
            }
        }
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
