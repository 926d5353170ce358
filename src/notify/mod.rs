//! Notification Module
//!
//! Fire-and-forget publication of order-status events to the notification
//! collaborator (push/SSE delivery itself is external). Batch operations emit
//! one event per order whose status they changed, after the change committed.

use crate::types::OrderEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Sink for order-status events.
///
/// `publish` must never block or fail the calling operation; a lost event is
/// acceptable, a rolled-back batch operation because of notification trouble
/// is not.
pub trait Notifier: Send + Sync {
    fn publish(&self, event: OrderEvent);
}

/// Notifier backed by an unbounded channel.
///
/// The receiving half is handed to whatever forwards events out of process
/// (in the binary, a logging drain task).
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<OrderEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OrderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn publish(&self, event: OrderEvent) {
        // Receiver gone means nobody is listening; drop the event silently.
        if self.tx.send(event).is_err() {
            debug!("notification receiver dropped, event discarded");
        }
    }
}

/// No-op notifier for tests and direct library use.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn publish(&self, _event: OrderEvent) {}
}
