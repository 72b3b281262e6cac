//! Deferred ban log reconciliation
//!
//! A fresh ban lands in the log before the player's session shows up in
//! the activity log, so backfilling right away would usually find
//! nothing. Instead each ban arms a per-server timer; when it fires the
//! scheduler re-reads every server's activity log and backfills the ban
//! log once. Bans arriving while a timer is armed coalesce into the
//! pending run instead of arming another one.

use crate::moderation::ServerContext;
use crate::storage::StorageError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Delay between a ban and its backfill run.
pub const RECONCILE_DELAY: Duration = Duration::from_secs(30);

const CHANNEL_CAPACITY: usize = 100;

/// Cheap cloneable handle for requesting a deferred backfill of a ckey.
#[derive(Clone)]
pub struct ReconcileHandle {
    tx: mpsc::Sender<String>,
}

impl ReconcileHandle {
    /// Queue a ckey for backfill. Dropping the request on a full queue is
    /// acceptable: the next full sweep reaches the same state.
    pub fn schedule(&self, ckey: &str) {
        if let Err(e) = self.tx.try_send(ckey.to_string()) {
            log::warn!("reconcile queue full, dropping request for `{}`: {}", ckey, e);
        }
    }
}

/// Create the request channel for a scheduler.
pub fn reconcile_channel() -> (ReconcileHandle, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (ReconcileHandle { tx }, rx)
}

/// Runs deferred backfills against every configured server.
pub struct ReconcileScheduler {
    servers: Arc<Vec<ServerContext>>,
    delay: Duration,
    /// Target ckeys collected per server while its timer is armed.
    pending: Arc<Mutex<HashMap<String, HashSet<String>>>>,
}

impl ReconcileScheduler {
    pub fn new(servers: Vec<ServerContext>, delay: Duration) -> Self {
        ReconcileScheduler {
            servers: Arc::new(servers),
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Consume backfill requests until the channel closes.
    pub async fn run(self, mut rx: mpsc::Receiver<String>) {
        while let Some(ckey) = rx.recv().await {
            for server in self.servers.iter() {
                self.arm(server, &ckey);
            }
        }
        log::info!("reconcile channel closed, scheduler stopping");
    }

    /// Arm the server's timer, or fold the ckey into an armed one.
    fn arm(&self, server: &ServerContext, ckey: &str) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(targets) = pending.get_mut(&server.key) {
            targets.insert(ckey.to_string());
            return;
        }
        pending.insert(server.key.clone(), HashSet::from([ckey.to_string()]));
        drop(pending);

        let server = server.clone();
        let servers = self.servers.clone();
        let delay = self.delay;
        let pending = self.pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let targets = pending.lock().unwrap().remove(&server.key).unwrap_or_default();
            // One target stays scoped; coalesced bans fall back to a full pass
            let target = if targets.len() == 1 {
                targets.iter().next().cloned()
            } else {
                None
            };
            match reconcile_server(&server, &servers, target.as_deref()) {
                Ok(true) => log::info!("backfilled ban log on `{}`", server.key),
                Ok(false) => log::debug!("ban log on `{}` already complete", server.key),
                Err(e) => log::warn!("deferred backfill failed on `{}`: {}", server.key, e),
            }
        });
    }
}

/// Backfill one server's ban log from every server's activity log.
/// Sessions are matched across servers: a pending ban on one server is
/// completed by a session seen on any of them.
fn reconcile_server(
    server: &ServerContext,
    all_servers: &[ServerContext],
    target_ckey: Option<&str>,
) -> Result<bool, StorageError> {
    let mut logs = Vec::new();
    for source in all_servers {
        match source.activity.raw_activity_log() {
            Ok(text) => logs.push(text),
            Err(e) => log::warn!("skipping activity log of `{}`: {}", source.key, e),
        }
    }
    server.store.reconcile(&logs, target_ckey)
}

/// Result of a manual sweep over every server.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Server keys whose ban log was rewritten.
    pub updated: Vec<String>,
    /// Server keys whose sweep failed, with the error text.
    pub failed: Vec<(String, String)>,
}

/// Immediately backfill every server's ban log, unscoped. This is the
/// manual `updatebans` sweep.
pub fn update_ban_logs(servers: &[ServerContext]) -> UpdateSummary {
    let mut summary = UpdateSummary::default();
    for server in servers {
        match reconcile_server(server, servers, None) {
            Ok(true) => summary.updated.push(server.key.clone()),
            Ok(false) => {}
            Err(e) => summary.failed.push((server.key.clone(), e.to_string())),
        }
    }
    summary
}
