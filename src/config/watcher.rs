//! Configuration file watcher for hot reload.
//!
//! Only the backend list is applied live. Algorithm and threshold changes
//! are logged and take effect on restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{BackendConfig, BalancerConfig};
use crate::health::HttpProbe;
use crate::load_balancer::LoadBalancer;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<BalancerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<BalancerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!("Config file change detected, reloading...");
                    match load_config(&path) {
                        Ok(new_config) => {
                            let _ = tx.send(new_config);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// What a reload changed in the backend set.
#[derive(Debug, Default, PartialEq)]
pub struct BackendChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Bring the balancer's backend set in line with `desired`.
///
/// Backends that are already registered keep their metrics, even if their
/// weight changed; a weight change needs an unregister and re-register.
pub fn reconcile_backends(
    balancer: &LoadBalancer,
    probe: Option<&HttpProbe>,
    desired: &[BackendConfig],
) -> BackendChanges {
    let mut changes = BackendChanges::default();

    for current in balancer.registry().snapshot() {
        if !desired.iter().any(|b| b.id == current.id) && balancer.unregister_backend(&current.id) {
            if let Some(probe) = probe {
                probe.remove_target(&current.id);
            }
            changes.removed.push(current.id);
        }
    }

    for backend in desired {
        if balancer.registry().contains(&backend.id) {
            continue;
        }
        match balancer.register_backend(&backend.id, backend.weight) {
            Ok(()) => {
                if let (Some(probe), Some(url)) = (probe, &backend.health_url) {
                    probe.add_target(&backend.id, url);
                }
                changes.added.push(backend.id.clone());
            }
            Err(e) => tracing::warn!(backend = %backend.id, error = %e, "Skipping backend from reload"),
        }
    }

    if !changes.added.is_empty() || !changes.removed.is_empty() {
        tracing::info!(added = ?changes.added, removed = ?changes.removed, "Backends reconciled");
    }
    changes
}
