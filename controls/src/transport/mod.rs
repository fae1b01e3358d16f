//! Message transports between panels and controllers.
//!
//! A transport only knows how to send a [`Message`] and how to hand incoming
//! ones to listeners. Reconnection and queuing are owned by each binding.

pub mod broker;
pub mod window;

pub use broker::{BrokerOptions, BrokerReceiverClient, BrokerSenderClient, PanelTransport};
pub use window::{Window, WindowEvent, WindowTransport};

use crate::error::Result;
use av_controls_types::Message;
use parking_lot::Mutex;
use std::sync::Arc;

/// Observer for incoming messages.
pub type Listener = Box<dyn Fn(&Message) + Send + Sync>;

pub trait Transport: Send + Sync {
    /// Fire-and-forget send. Never blocks on the network.
    fn send(&self, message: Message) -> Result<()>;

    /// Register an observer. Every listener sees every message; there is no
    /// unregistration.
    fn add_listener(&self, listener: Listener);
}

/// Connection state of a network binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Reconnecting { .. } => "Reconnecting",
        }
    }
}

/// Listener list shared between a transport and its I/O side.
#[derive(Clone, Default)]
pub(crate) struct Listeners(Arc<Mutex<Vec<Arc<dyn Fn(&Message) + Send + Sync>>>>);

impl Listeners {
    pub(crate) fn push(&self, listener: Listener) {
        self.0.lock().push(Arc::from(listener));
    }

    /// Calls run outside the lock, so a listener may register another one.
    /// Listeners added during a dispatch see the next message.
    pub(crate) fn dispatch(&self, message: &Message) {
        let listeners = self.0.lock().clone();
        for listener in listeners {
            listener(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listener_can_register_during_dispatch() {
        let listeners = Listeners::default();
        let late_calls = Arc::new(AtomicUsize::new(0));

        let registry = listeners.clone();
        let counter = late_calls.clone();
        listeners.push(Box::new(move |_| {
            let counter = counter.clone();
            registry.push(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        listeners.dispatch(&Message::TimelineRequestState);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        listeners.dispatch(&Message::TimelineRequestState);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
        assert_eq!(listeners.0.lock().len(), 3);
    }
}
