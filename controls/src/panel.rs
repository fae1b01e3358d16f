//! Visual-side host of a control tree.
//!
//! A panel announces its specification, applies incoming signals to its
//! receiver tree, answers with updates and runs the timeline engine.

use crate::error::{ControlError, Result};
use crate::receiver::Receiver;
use crate::timeline::{FrameLoop, Timeline, TimelineOptions};
use crate::transport::Transport;
use av_controls_types::{ControlPath, Envelope, Message, RootSpecification, Spec};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

pub struct Panel {
    name: String,
    spec: Spec,
    root: Receiver,
    timeline: Timeline,
    transport: Arc<dyn Transport>,
    inbox: Arc<Mutex<VecDeque<Message>>>,
    frame_loop: FrameLoop,
}

impl Panel {
    /// Build the receiver tree for `spec` and start listening on `transport`.
    pub fn new(
        name: impl Into<String>,
        spec: Spec,
        transport: Arc<dyn Transport>,
        options: TimelineOptions,
    ) -> Result<Self> {
        let root = Receiver::from_spec(&spec)?;
        let mut timeline = Timeline::new(&root, &options);

        let outgoing = transport.clone();
        timeline.set_on_message(move |message| {
            if let Err(e) = outgoing.send(message) {
                warn!("Failed to send timeline state: {}", e);
            }
        });

        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let sink = inbox.clone();
        transport.add_listener(Box::new(move |message: &Message| {
            sink.lock().push_back(message.clone());
        }));

        Ok(Self {
            name: name.into(),
            spec,
            root,
            timeline,
            transport,
            inbox,
            frame_loop: FrameLoop::new(options.control_change_debounce),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Say hello and announce the tree.
    pub fn start(&mut self) -> Result<()> {
        info!("Starting panel '{}'", self.name);
        self.transport.send(Message::Ready)?;
        self.announce()?;
        self.frame_loop.start();
        Ok(())
    }

    pub fn stop(&mut self) {
        self.frame_loop.stop();
    }

    pub fn root_specification(&self) -> RootSpecification {
        RootSpecification::new(self.name.clone(), self.spec.clone())
    }

    /// Send the full specification.
    pub fn announce(&self) -> Result<()> {
        debug!("Announcing specification of '{}'", self.name);
        self.transport
            .send(Message::ControllerSpecification(self.root_specification()))
    }

    /// Handle every message received since the last poll.
    pub fn poll(&mut self) -> usize {
        let messages: Vec<Message> = self.inbox.lock().drain(..).collect();
        for message in &messages {
            self.handle_message(message);
        }
        messages.len()
    }

    pub fn handle_message(&mut self, message: &Message) {
        trace!("Panel '{}' got: {}", self.name, message.description());
        match message {
            Message::Nudge => {
                if let Err(e) = self.announce() {
                    warn!("Failed to announce: {}", e);
                }
            }
            Message::ControlSignal { signal } => self.handle_signal(signal),
            Message::TimelineRequestState | Message::TimelineEdit { .. } => {
                if let Some(updates) = self.timeline.handle_message(&mut self.root, message) {
                    self.send_updates(updates);
                    self.frame_loop.request_render();
                }
            }
            Message::TabClosing => debug!("Controller of '{}' closed", self.name),
            _ => trace!("Ignoring {}", message.description()),
        }
    }

    fn handle_signal(&mut self, signal: &Envelope) {
        let path = signal.clone().unwrap_path().0;
        match self.root.handle_signal(signal) {
            Ok(update) => {
                self.timeline.on_control_signal(&path);
                if let Some(update) = update {
                    self.timeline.observe_update(&update);
                    self.send(Message::ControlUpdate { update });
                }
                // a running loop renders the change anyway
                if !self.timeline.is_playing() && !self.timeline.always_render() {
                    self.frame_loop.control_changed(Instant::now());
                }
            }
            Err(e) => warn!("Dropping signal for [{}]: {}", path, e),
        }
    }

    /// Run one frame if the loop is due. Returns the frame delta when a frame
    /// was rendered.
    pub fn frame(&mut self, now: Instant) -> Option<Duration> {
        let dt = self.frame_loop.next_frame(
            now,
            self.timeline.is_playing(),
            self.timeline.always_render(),
        )?;
        let updates = self.timeline.tick(&mut self.root, dt.as_secs_f64());
        self.send_updates(updates);
        Some(dt)
    }

    pub fn request_render(&mut self) {
        self.frame_loop.request_render();
    }

    pub fn root(&self) -> &Receiver {
        &self.root
    }

    pub fn control(&self, path: &ControlPath) -> Result<&Receiver> {
        self.root.route(path)
    }

    /// Mutable access to a node, e.g. to register callbacks.
    pub fn control_mut(&mut self, path: &ControlPath) -> Result<&mut Receiver> {
        self.root.route_mut(path)
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    /// Send an update that originates on the visual side.
    pub fn emit_update(&self, path: &ControlPath, payload: serde_json::Value) {
        self.send(Message::ControlUpdate {
            update: Envelope::wrap_path(path, payload),
        });
    }

    /// Feed a meter value to the cake at `path`. Returns whether an update
    /// went out; values inside the throttle window are only stored.
    pub fn set_cake_value(&mut self, path: &ControlPath, value: f64, now: Instant) -> Result<bool> {
        let node = self.root.route_mut(path)?;
        let control_type = node.control_type();
        let cake = node
            .as_cake_mut()
            .ok_or_else(|| ControlError::signal(control_type, &serde_json::json!({ "value": value })))?;
        match cake.send_value(value, now) {
            Some(payload) => {
                self.emit_update(path, payload);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ask the controller to load a random preset of the button at `path`.
    pub fn request_random_preset(&self, path: &ControlPath) -> Result<()> {
        let payload = self.preset_button(path)?.request_random();
        self.emit_update(path, payload);
        Ok(())
    }

    /// Ask the controller to load the next preset of the button at `path`.
    pub fn request_next_preset(&self, path: &ControlPath) -> Result<()> {
        let payload = self.preset_button(path)?.request_next();
        self.emit_update(path, payload);
        Ok(())
    }

    fn preset_button(&self, path: &ControlPath) -> Result<&crate::receiver::PresetButtonReceiver> {
        self.root
            .route(path)?
            .as_preset_button()
            .ok_or_else(|| ControlError::ControlNotFound(path.clone()))
    }

    fn send_updates(&self, updates: Vec<Envelope>) {
        for update in updates {
            self.send(Message::ControlUpdate { update });
        }
    }

    fn send(&self, message: Message) {
        if let Err(e) = self.transport.send(message) {
            warn!("Panel '{}' failed to send: {}", self.name, e);
        }
    }
}

/// Poll `panel` and run its frame loop every `interval` on the tokio runtime.
pub fn spawn_driver(panel: Arc<Mutex<Panel>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            {
                let mut panel = panel.lock();
                panel.poll();
                panel.frame(Instant::now());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Listener;
    use av_controls_types::TimelineEdit;
    use serde_json::json;

    /// Records sent messages; incoming ones are injected by hand.
    #[derive(Default)]
    struct Loopback {
        sent: Mutex<Vec<Message>>,
        listeners: Mutex<Vec<Listener>>,
    }

    impl Loopback {
        fn deliver(&self, message: Message) {
            for listener in self.listeners.lock().iter() {
                listener(&message);
            }
        }

        fn take(&self) -> Vec<Message> {
            std::mem::take(&mut *self.sent.lock())
        }
    }

    impl Transport for Loopback {
        fn send(&self, message: Message) -> Result<()> {
            self.sent.lock().push(message);
            Ok(())
        }

        fn add_listener(&self, listener: Listener) {
            self.listeners.lock().push(listener);
        }
    }

    fn spec() -> Spec {
        Spec::from_value(json!({
            "type": "group",
            "name": "root",
            "controlSpecs": {
                "fader": {"type": "fader", "name": "f", "initialValue": 0, "min": 0, "max": 100},
                "meter": {"type": "cake", "name": "m", "initialValue": 0, "min": 0, "max": 1},
                "presets": {"type": "preset-button", "name": "p"}
            }
        }))
        .unwrap()
    }

    fn panel() -> (Panel, Arc<Loopback>) {
        let transport = Arc::new(Loopback::default());
        let panel = Panel::new("demo", spec(), transport.clone(), TimelineOptions::default()).unwrap();
        (panel, transport)
    }

    #[test]
    fn test_start_sends_ready_then_spec() {
        let (mut panel, transport) = panel();
        panel.start().unwrap();
        let sent = transport.take();
        assert_eq!(sent[0], Message::Ready);
        assert!(matches!(&sent[1], Message::ControllerSpecification(root) if root.name == "demo"));
    }

    #[test]
    fn test_nudge_reannounces() {
        let (mut panel, transport) = panel();
        transport.deliver(Message::Nudge);
        assert_eq!(panel.poll(), 1);
        assert!(matches!(
            transport.take().as_slice(),
            [Message::ControllerSpecification(_)]
        ));
    }

    #[test]
    fn test_signal_is_answered_with_update() {
        let (mut panel, transport) = panel();
        let signal = Envelope::wrap_path(&["fader"].into(), json!({"value": 42}));
        transport.deliver(Message::ControlSignal { signal });
        panel.poll();

        assert_eq!(
            transport.take(),
            vec![Message::ControlUpdate {
                update: Envelope::wrap_path(&["fader"].into(), json!({"value": 42.0}))
            }]
        );
        assert_eq!(
            panel.timeline().last_value(&["fader"].into(), "value"),
            Some(42.0)
        );
    }

    #[test]
    fn test_bad_signal_is_dropped() {
        let (mut panel, transport) = panel();
        let signal = Envelope::wrap_path(&["nope"].into(), json!({"value": 1}));
        panel.handle_message(&Message::ControlSignal { signal });
        assert!(transport.take().is_empty());
    }

    #[test]
    fn test_timeline_edit_broadcasts_state() {
        let (mut panel, transport) = panel();
        panel.handle_message(&Message::TimelineEdit {
            edit: TimelineEdit::SetPlaying { playing: true },
            seq: None,
        });
        assert!(panel.timeline().is_playing());
        assert!(matches!(
            transport.take().as_slice(),
            [Message::TimelineState { state }] if state.playing
        ));
    }

    #[test]
    fn test_signal_debounces_render_only_when_idle() {
        let (mut panel, _transport) = panel();
        let signal = |v: i64| Message::ControlSignal {
            signal: Envelope::wrap_path(&["fader"].into(), json!({ "value": v })),
        };

        panel.handle_message(&Message::TimelineEdit {
            edit: TimelineEdit::SetPlaying { playing: true },
            seq: None,
        });
        panel.handle_message(&signal(10));
        assert_eq!(panel.frame_loop.render_due(), None);

        panel.handle_message(&Message::TimelineEdit {
            edit: TimelineEdit::SetPlaying { playing: false },
            seq: None,
        });
        panel.handle_message(&Message::TimelineEdit {
            edit: TimelineEdit::SetAlwaysRender { always_render: true },
            seq: None,
        });
        panel.handle_message(&signal(20));
        assert_eq!(panel.frame_loop.render_due(), None);

        panel.handle_message(&Message::TimelineEdit {
            edit: TimelineEdit::SetAlwaysRender { always_render: false },
            seq: None,
        });
        panel.handle_message(&signal(30));
        assert!(panel.frame_loop.render_due().is_some());
    }

    #[test]
    fn test_cake_updates_are_throttled() {
        let (mut panel, transport) = panel();
        let meter: ControlPath = ["meter"].into();
        let t0 = Instant::now();
        assert!(panel.set_cake_value(&meter, 0.5, t0).unwrap());
        assert!(!panel.set_cake_value(&meter, 0.6, t0 + Duration::from_millis(100)).unwrap());
        assert!(panel.set_cake_value(&meter, 0.7, t0 + Duration::from_secs(3)).unwrap());
        assert_eq!(transport.take().len(), 2);
        assert!(panel.set_cake_value(&["fader"].into(), 0.1, t0).is_err());
    }

    #[test]
    fn test_preset_requests_go_out_as_updates() {
        let (panel, transport) = panel();
        panel.request_next_preset(&["presets"].into()).unwrap();
        assert_eq!(
            transport.take(),
            vec![Message::ControlUpdate {
                update: Envelope::wrap_path(&["presets"].into(), json!({"action": "next"}))
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_polls_inbox() {
        let (panel, transport) = panel();
        let panel = Arc::new(Mutex::new(panel));
        let driver = spawn_driver(panel.clone(), Duration::from_millis(16));

        transport.deliver(Message::Nudge);
        tokio::time::sleep(Duration::from_millis(50)).await;
        driver.abort();

        assert!(transport
            .take()
            .iter()
            .any(|m| matches!(m, Message::ControllerSpecification(_))));
    }
}
