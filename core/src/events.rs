//! Tagged event signals
//!
//! Cross-component notifications travel as tagged messages over a channel,
//! the same shape the linkage layer uses for connect results. Entities
//! carry a sender and fire named events into it; whoever owns the receiver
//! drains them on its own schedule. Hot-path policy hooks (mode handlers,
//! join and message gates) stay as listener vectors on the owning module.

use tokio::sync::mpsc;

/// A named event with its source and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event name (`logged_in`, `join_failed`, `privmsg`, ...)
    pub name: String,
    /// UID or server name that fired it
    pub source: String,
    /// Event arguments
    pub payload: Vec<String>,
}

/// Sending half of an event channel
pub type EventSender = mpsc::UnboundedSender<Event>;
/// Receiving half of an event channel
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create an event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
