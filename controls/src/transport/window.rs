//! Cross-window binding.
//!
//! A [`Window`] is an in-process mailbox with identity, standing in for a
//! browser window: `post_message` queues an event carrying the source window,
//! and the host delivers queued events with [`Window::dispatch_pending`].

use super::{Listener, Listeners, Transport};
use crate::error::{ControlError, Result};
use av_controls_types::Message;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Event delivered to a window's handlers.
#[derive(Clone)]
pub struct WindowEvent {
    pub source: Weak<Window>,
    pub data: Value,
}

type Handler = Arc<dyn Fn(&WindowEvent) + Send + Sync>;

#[derive(Default)]
pub struct Window {
    name: String,
    inbox: Mutex<VecDeque<WindowEvent>>,
    handlers: Mutex<Vec<Handler>>,
}

impl Window {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            ..Default::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `data` for this window, tagged with the posting window.
    pub fn post_message(&self, data: Value, source: &Arc<Window>) {
        self.inbox.lock().push_back(WindowEvent {
            source: Arc::downgrade(source),
            data,
        });
    }

    pub fn add_event_listener(&self, handler: impl Fn(&WindowEvent) + Send + Sync + 'static) {
        self.handlers.lock().push(Arc::new(handler));
    }

    /// Deliver every queued event to every handler. Returns the event count.
    pub fn dispatch_pending(&self) -> usize {
        let events: Vec<WindowEvent> = self.inbox.lock().drain(..).collect();
        let handlers: Vec<Handler> = self.handlers.lock().clone();
        for event in &events {
            for handler in &handlers {
                handler(event);
            }
        }
        events.len()
    }
}

/// Transport between two windows.
///
/// Outgoing messages are wrapped once in `{type: "wrapped-message", message}`.
/// Incoming events are accepted only when their source is the peer window
/// itself.
pub struct WindowTransport {
    own: Arc<Window>,
    peer: Arc<Window>,
    listeners: Listeners,
}

impl WindowTransport {
    pub fn new(own: Arc<Window>, peer: Arc<Window>) -> Self {
        let listeners = Listeners::default();
        let expected = Arc::downgrade(&peer);
        let sink = listeners.clone();
        own.add_event_listener(move |event| {
            if !Weak::ptr_eq(&event.source, &expected) {
                trace!("Ignoring window event from another source");
                return;
            }
            if event.data.get("type").and_then(Value::as_str) != Some("wrapped-message") {
                trace!("Ignoring unwrapped window event");
                return;
            }
            let Some(inner) = event.data.get("message") else {
                warn!("Wrapped window message without payload");
                return;
            };
            match serde_json::from_value::<Message>(inner.clone()) {
                Ok(message) => sink.dispatch(&message),
                Err(e) => warn!("Failed to parse window message: {}", e),
            }
        });
        Self {
            own,
            peer,
            listeners,
        }
    }

    pub fn peer(&self) -> &Arc<Window> {
        &self.peer
    }
}

impl Transport for WindowTransport {
    fn send(&self, message: Message) -> Result<()> {
        let inner = serde_json::to_value(&message).map_err(ControlError::from)?;
        self.peer.post_message(
            json!({ "type": "wrapped-message", "message": inner }),
            &self.own,
        );
        Ok(())
    }

    fn add_listener(&self, listener: Listener) {
        self.listeners.push(listener);
    }
}
