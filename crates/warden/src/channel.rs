//! The outbound channel to the embedding page.

use std::fmt;
use tokio::sync::mpsc;
use warden_core::HostMessage;

/// Delivers [`HostMessage`]s to the embedding page.
///
/// Inbound calls don't go through this trait, they enter through
/// [`Session::on_call`](crate::Session::on_call).
pub trait HostChannel: Send + Sync + fmt::Debug {
    /// Sends a message, returning `false` if the page is gone.
    fn send(&self, message: HostMessage) -> bool;
}

/// In-process [`HostChannel`] backed by an unbounded tokio channel.
#[derive(Clone, Debug)]
pub struct LocalChannel {
    tx: mpsc::UnboundedSender<HostMessage>,
}

impl LocalChannel {
    /// Creates a channel and the receiving half the host reads from.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<HostMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostChannel for LocalChannel {
    fn send(&self, message: HostMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}
