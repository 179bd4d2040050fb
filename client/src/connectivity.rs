//! Connectivity edge handling.
//!
//! The client distinguishes the device network link from reachability of the
//! remote backend; either can drop independently. Loss edges trigger an
//! immediate recovery save before control returns, so a crash or sleep right
//! after the edge still finds fresh snapshots. Restore edges run recovery
//! and a catch-up sync pass, both best-effort.

use crate::recovery::{RecoveryManager, SaveOptions};
use crate::sync::SyncCoordinator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A transition observed on one of the two connectivity axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEdge {
    /// The device lost its network link.
    NetworkLost,
    /// The device regained its network link.
    NetworkRestored,
    /// The remote backend stopped responding.
    BackendLost,
    /// The remote backend is reachable again.
    BackendRestored,
}

/// Reacts to connectivity edges by saving or restoring recovery state and
/// scheduling sync passes.
pub struct ConnectivityHandler {
    recovery: Arc<RecoveryManager>,
    sync: Arc<SyncCoordinator>,
    network_up: AtomicBool,
    backend_up: AtomicBool,
}

impl ConnectivityHandler {
    pub fn new(recovery: Arc<RecoveryManager>, sync: Arc<SyncCoordinator>) -> Self {
        Self {
            recovery,
            sync,
            network_up: AtomicBool::new(true),
            backend_up: AtomicBool::new(true),
        }
    }

    pub fn is_network_up(&self) -> bool {
        self.network_up.load(Ordering::SeqCst)
    }

    pub fn is_backend_up(&self) -> bool {
        self.backend_up.load(Ordering::SeqCst)
    }

    /// Handle one observed edge.
    ///
    /// Loss edges complete their immediate save before returning; restore
    /// edges run recovery before sync, so restored state is included in the
    /// catch-up pass.
    pub async fn on_edge(&self, edge: ConnectivityEdge) {
        match edge {
            ConnectivityEdge::NetworkLost => {
                self.network_up.store(false, Ordering::SeqCst);
                tracing::info!("network lost, saving recovery state");
                self.recovery.save_all(SaveOptions::immediate()).await;
            }
            ConnectivityEdge::BackendLost => {
                self.backend_up.store(false, Ordering::SeqCst);
                tracing::info!("backend unreachable, saving recovery state");
                self.recovery.save_all(SaveOptions::immediate()).await;
            }
            ConnectivityEdge::NetworkRestored => {
                self.network_up.store(true, Ordering::SeqCst);
                tracing::info!("network restored");
            }
            ConnectivityEdge::BackendRestored => {
                self.backend_up.store(true, Ordering::SeqCst);
                tracing::info!("backend restored, recovering and catching up");
                let restored = self.recovery.attempt_recovery().await;
                if !restored.is_empty() {
                    tracing::info!(scopes = restored.len(), "restored recovery scopes");
                }
                let summary = self.sync.catch_up().await;
                tracing::debug!(?summary, "catch-up pass after reconnect");
            }
        }
    }
}
