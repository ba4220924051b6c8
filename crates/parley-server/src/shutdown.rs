//! Graceful shutdown handling.
//!
//! A [`ShutdownController`] is shared by the HTTP server and every session.
//! Once initiated, the server stops accepting connections and each session
//! announces its user's departure before closing.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Shutdown controller for coordinating graceful shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Creates a new shutdown controller.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Initiates shutdown. Later calls do nothing.
    pub fn initiate_shutdown(&self) {
        let already = self.shutdown_tx.send_replace(true);
        if !already {
            info!("Shutdown initiated");
        }
    }

    /// Completes once shutdown is initiated, immediately if it already was.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        // The sender lives in `self`, so this cannot fail
        let _ = rx.wait_for(|initiated| *initiated).await;
    }
}

/// Waits for SIGINT or SIGTERM, waits out `grace`, then initiates shutdown.
pub async fn setup_signal_handlers(controller: ShutdownController, grace: Duration) {
    wait_for_signal().await;

    if !grace.is_zero() {
        info!(grace_ms = grace.as_millis() as u64, "Delaying shutdown");
        tokio::time::sleep(grace).await;
    }

    controller.initiate_shutdown();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to setup SIGTERM handler: {}", e);
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        () = wait_for_ctrl_c() => {}
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT (Ctrl+C)"),
        Err(e) => {
            error!("Failed to setup Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
