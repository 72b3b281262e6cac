use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use warden::alerting::{notice_channel, WebhookNotifier};
use warden::config::Config;
use warden::directory::{AgeCache, FileDirectory, InMemoryRoleGateway, PermitList};
use warden::input::read_status;
use warden::moderation::{reconcile_channel, Moderator, ReconcileScheduler, RECONCILE_DELAY};
use warden::scanner::RiskScanner;
use warden::ServerContext;

/// Main daemon entry point for the moderation core
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting warden daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Setup graceful shutdown signal handling
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    // Wire each enabled server to its flat files
    let servers: Vec<ServerContext> = config.enabled_servers().map(ServerContext::flat_file).collect();
    if servers.is_empty() {
        log::warn!("No enabled servers configured");
    }
    for server in &servers {
        log::info!("Serving `{}` ({})", server.key, server.name);
    }

    // Collaborator data files
    let directory = Arc::new(match FileDirectory::load(&config.directory.verified_path) {
        Ok(directory) => directory,
        Err(e) => {
            log::warn!("Verified identity cache unavailable: {}", e);
            FileDirectory::from_entries(Vec::new())
        }
    });
    let permits = Arc::new(PermitList::load(&config.directory.permitted_path)?);
    let ages = Arc::new(match config.directory.ages_path {
        Some(ref path) => AgeCache::load(path).unwrap_or_else(|e| {
            log::warn!("Account age cache unavailable: {}", e);
            AgeCache::empty()
        }),
        None => AgeCache::empty(),
    });
    let roles = Arc::new(InMemoryRoleGateway::new());

    let runtime = tokio::runtime::Runtime::new()?;

    // Staff notifier task
    let (notices, notice_rx) = notice_channel();
    runtime.spawn(WebhookNotifier::new(config.alerting.clone()).run(notice_rx));

    // Deferred reconciliation task
    let (reconciler, reconcile_rx) = reconcile_channel();
    let scheduler = ReconcileScheduler::new(servers.clone(), RECONCILE_DELAY);
    runtime.spawn(scheduler.run(reconcile_rx));

    let moderator = Moderator::new(directory.clone(), roles, Some(reconciler), "warden");
    let scanner = RiskScanner::new(
        config.scanner.clone(),
        config.appeal_contact.clone(),
        permits,
        directory,
        ages,
        Some(notices),
    );

    log::info!("Daemon running. Press Ctrl+C to stop.");

    let interval = Duration::from_secs(config.scanner.interval_seconds.max(1));
    let mut last_sweep: Option<Instant> = None;

    // Main sweep loop
    while running.load(Ordering::SeqCst) {
        let due = last_sweep.map_or(true, |at| at.elapsed() >= interval);
        if config.scanner.enabled && due {
            last_sweep = Some(Instant::now());
            sweep(&scanner, &moderator, &servers, &config);
        }

        // Sleep to avoid busy-waiting
        std::thread::sleep(Duration::from_millis(100));
    }

    runtime.shutdown_timeout(Duration::from_secs(5));
    log::info!("Warden daemon stopped");
    Ok(())
}

/// Scan the currently connected players of every server.
fn sweep(scanner: &RiskScanner, moderator: &Moderator, servers: &[ServerContext], config: &Config) {
    for server_config in config.enabled_servers() {
        let status = match read_status(&server_config.basedir) {
            Ok(status) => status,
            Err(e) => {
                log::debug!("no status export for `{}`: {}", server_config.key, e);
                continue;
            }
        };
        if status.players.is_empty() {
            continue;
        }
        let Some(server) = servers.iter().find(|s| s.key == server_config.key) else {
            continue;
        };
        log::debug!(
            "sweeping {} player(s) on `{}`",
            status.players.len(),
            server.key
        );
        scanner.scan_players(moderator, servers, server, &status.players);
    }
}
