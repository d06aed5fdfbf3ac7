//! Live dashboard listener.
//!
//! Keeps connected clients current by recomputing the whole dashboard
//! whenever the `releases` table changes and on a fixed refresh interval.
//! The interval matters even without writes: phase statuses move with the
//! clock, so a quiet board still rolls over at midnight.
//!
//! ```text
//! ChangeFeed ──(releases)──> debounce + drain ─┐
//!                                              ├─> list_snapshots() ─> build_dashboard(now) ─> ws_tx
//! refresh interval ────────────────────────────┘
//! ```

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use super::changes::ChangeFeed;
use super::db::DbHandle;
use super::models::Table;
use super::ws::{WsMessage, broadcast_message};
use crate::schedule::{build_dashboard, local_now};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveConfig {
    pub refresh_interval: Duration,
    pub debounce: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            debounce: Duration::from_millis(250),
        }
    }
}

pub struct LiveDashboard;

impl LiveDashboard {
    /// Start the listener task. The subscription is taken before this returns,
    /// so any change published afterwards is observed.
    pub fn spawn(
        db: DbHandle,
        feed: &ChangeFeed,
        ws_tx: broadcast::Sender<String>,
        config: LiveConfig,
    ) -> LiveHandle {
        let mut releases = feed.subscribe(Table::Releases);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            tracing::info!(
                refresh_secs = config.refresh_interval.as_secs_f64(),
                debounce_ms = config.debounce.as_millis() as u64,
                "live dashboard listener started"
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,

                    _ = ticker.tick() => {
                        publish_dashboard(&db, &ws_tx, "interval").await;
                    }

                    event = releases.recv() => {
                        let Some(event) = event else { break };
                        tracing::debug!(row_id = event.row_id, kind = ?event.kind, "release change received");

                        tokio::select! {
                            _ = &mut shutdown_rx => break,
                            _ = tokio::time::sleep(config.debounce) => {}
                        }
                        let mut coalesced = 0usize;
                        while releases.try_recv().is_some() {
                            coalesced += 1;
                        }
                        if coalesced > 0 {
                            tracing::debug!(coalesced, "coalesced release changes");
                        }
                        publish_dashboard(&db, &ws_tx, "change").await;
                    }
                }
            }

            tracing::info!("live dashboard listener stopped");
        });

        LiveHandle { shutdown_tx, task }
    }
}

/// Owner of a running listener. Dropping it also stops the task, but only
/// `shutdown` waits for it to finish.
pub struct LiveHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl LiveHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "live dashboard task ended abnormally");
        }
    }
}

/// Re-read every release, rebuild the dashboard against a fresh `now`, and
/// broadcast it. Returns the number of products shown.
pub async fn refresh_dashboard(db: &DbHandle, ws_tx: &broadcast::Sender<String>) -> Result<usize> {
    let snapshots = db.call(|db| db.list_snapshots()).await?;
    let dashboard = build_dashboard(&snapshots, local_now());
    let count = dashboard.products.len();
    broadcast_message(ws_tx, &WsMessage::DashboardUpdated { dashboard });
    Ok(count)
}

async fn publish_dashboard(db: &DbHandle, ws_tx: &broadcast::Sender<String>, trigger: &'static str) {
    match refresh_dashboard(db, ws_tx).await {
        Ok(products) => tracing::debug!(trigger, products, "dashboard refreshed"),
        Err(e) => tracing::error!(trigger, error = %e, "dashboard refresh failed"),
    }
}
