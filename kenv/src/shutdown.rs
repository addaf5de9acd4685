//! Cooperative cancellation threaded through every waiting layer.
//!
//! A single watch channel of unit values plays the role of a cancellable
//! context: the orchestrator's caller holds the [`ShutdownTx`], and every
//! blocking wait selects on its [`ShutdownRx`] so an in-flight HTTP call or
//! poll sleep aborts immediately when shutdown is signalled. Cancellation is
//! always surfaced as [`crate::error::ErrorKind::OperationCancelled`],
//! distinct from a policy timeout.

use tokio::sync::watch;

/// Sending half of the shutdown signal.
///
/// Cloneable so multiple owners can trigger the same shutdown. Dropping every
/// sender also releases waiting receivers, which treat it as cancellation.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Signals shutdown to every subscribed receiver.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver observing this sender.
    ///
    /// A receiver created after the signal was sent has already seen it and
    /// will not observe it again; keep the receiver from
    /// [`create_shutdown_channel`] for pre-cancellation to be visible.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiving half of the shutdown signal.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a connected shutdown sender/receiver pair.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}
