use std::sync::{Arc, OnceLock};

use anyhow::Result;
use futures_util::stream::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::sync::broadcast;

/// Why shutdown started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS signal arrived (SIGTERM, SIGINT)
    Signal(&'static str),
    /// Triggered from code
    Manual,
    /// The shutdown channel went away
    Force,
}

/// Fans the first shutdown request out to every subscriber.
///
/// Only the first trigger counts; later signals are logged and ignored.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Get a receiver for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    /// Check if shutdown has been initiated
    pub fn is_shutdown_initiated(&self) -> bool {
        self.reason.get().is_some()
    }

    /// The reason of the trigger that won, once shutdown has started.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().cloned()
    }

    /// Start shutdown; returns false when it was already under way.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) -> bool {
        if self.reason.set(reason.clone()).is_ok() {
            tracing::info!("Shutdown triggered: {:?}", reason);
            let _ = self.shutdown_tx.send(reason);
            true
        } else {
            tracing::debug!("Shutdown already in progress, ignoring {:?}", reason);
            false
        }
    }

    /// Listen for SIGTERM and SIGINT and trigger shutdown on the first one.
    pub async fn run_signal_handler(&self) -> Result<()> {
        let mut signals = Signals::new([SIGTERM, SIGINT])?;
        let handle = signals.handle();

        tracing::debug!("Signal handler started. Listening for SIGTERM and SIGINT");

        while let Some(signal) = signals.next().await {
            let name = match signal {
                SIGTERM => "SIGTERM",
                SIGINT => "SIGINT",
                _ => continue,
            };
            tracing::info!("Received {}, shutting down", name);
            if !self.trigger_shutdown(ShutdownReason::Signal(name)) {
                tracing::warn!("Shutdown already in progress, ignoring {}", name);
            }
        }

        handle.close();
        Ok(())
    }

    /// Create a shutdown token that can be used to cancel operations
    pub fn shutdown_token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.subscribe(),
            reason: self.reason.clone(),
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A token that can be used to check for shutdown signals
pub struct ShutdownToken {
    receiver: broadcast::Receiver<ShutdownReason>,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl Clone for ShutdownToken {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            reason: self.reason.clone(),
        }
    }
}

impl ShutdownToken {
    /// Check if shutdown has been initiated (non-blocking)
    pub fn is_shutdown_requested(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Resolve once shutdown starts, immediately if it already has.
    pub async fn cancelled(&mut self) -> ShutdownReason {
        if let Some(reason) = self.reason.get() {
            return reason.clone();
        }
        match self.receiver.recv().await {
            Ok(reason) => reason,
            Err(_) => ShutdownReason::Force,
        }
    }

    /// Try to receive shutdown signal without blocking
    pub fn try_recv(&mut self) -> Option<ShutdownReason> {
        match self.receiver.try_recv() {
            Ok(reason) => Some(reason),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(_) => Some(ShutdownReason::Force),
        }
    }
}
