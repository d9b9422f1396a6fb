//! Channel type definitions for inter-task communication

use tokio::sync::{mpsc, watch};

use crate::signal::inbound::InboundMessage;

/// Default inbound mailbox buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Sender half of the inbound message mailbox
pub type MailboxSender = mpsc::Sender<InboundMessage>;

/// Receiver half of the inbound message mailbox
pub type MailboxReceiver = mpsc::Receiver<InboundMessage>;

/// Create a new inbound mailbox with the default buffer size
pub fn create_mailbox() -> (MailboxSender, MailboxReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new inbound mailbox with a custom buffer size
pub fn create_mailbox_with_size(size: usize) -> (MailboxSender, MailboxReceiver) {
    mpsc::channel(size.max(1))
}

/// Process-wide shutdown flag, observed by jobs at loop boundaries
pub type ShutdownReceiver = watch::Receiver<bool>;

/// Create the shutdown channel; send `true` to request a stop
pub fn create_shutdown() -> (watch::Sender<bool>, ShutdownReceiver) {
    watch::channel(false)
}

/// Whether shutdown has been requested
pub fn is_shutdown(rx: &ShutdownReceiver) -> bool {
    *rx.borrow()
}
