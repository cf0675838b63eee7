//! Configuration file watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::approval::PolicyGate;
use crate::config::loader::load_config;
use crate::config::schema::RelayConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<RelayConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<RelayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for updates to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!("Failed to reload config: {}. Keeping current configuration.", e);
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded configs to the live approval policy until the channel closes.
///
/// Only the `[approval]` section is hot; other sections need a restart.
pub async fn apply_updates(mut updates: mpsc::UnboundedReceiver<RelayConfig>, gate: PolicyGate) {
    while let Some(config) = updates.recv().await {
        if *gate.current() != config.approval {
            gate.update(config.approval);
        } else {
            tracing::debug!("Reloaded config has an unchanged approval policy");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ApprovalConfig, ApprovalMode};

    #[tokio::test]
    async fn test_apply_updates_swaps_policy() {
        let gate = PolicyGate::new(ApprovalConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut config = RelayConfig::default();
        config.approval.mode = ApprovalMode::DenyAll;
        tx.send(config).unwrap();
        drop(tx);

        apply_updates(rx, gate.clone()).await;
        assert_eq!(gate.current().mode, ApprovalMode::DenyAll);
    }
}
