//! Controller-side host of a control tree.
//!
//! The controller learns the tree from the panel's specification, mirrors
//! the panel's values from updates and turns user actions into signals.

use crate::error::{ControlError, Result};
use crate::sender::{PresetAction, PresetButtonSender, Sender};
use crate::timeline::TimelineClient;
use crate::transport::Transport;
use av_controls_types::{
    ControlPath, Envelope, Message, RootSpecification, TimelineEdit, TimelinePoint, TimelineState,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub struct Controller {
    transport: Arc<dyn Transport>,
    inbox: Arc<Mutex<VecDeque<Message>>>,
    root: Option<Sender>,
    specification: Option<RootSpecification>,
    timeline: TimelineClient,
}

impl Controller {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let sink = inbox.clone();
        transport.add_listener(Box::new(move |message: &Message| {
            sink.lock().push_back(message.clone());
        }));

        Self {
            transport,
            inbox,
            root: None,
            specification: None,
            timeline: TimelineClient::new(),
        }
    }

    /// Ask the panel to announce itself.
    pub fn start(&self) -> Result<()> {
        self.transport.send(Message::Nudge)
    }

    /// Tell the panel this controller is going away.
    pub fn close(&self) -> Result<()> {
        self.transport.send(Message::TabClosing)
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
        trace!("Controller got: {}", message.description());
        match message {
            Message::Ready => debug!("Panel is ready"),
            Message::ControllerSpecification(root) => self.load_specification(root),
            Message::ControlUpdate { update } => {
                if let Err(e) = self.handle_update(update) {
                    warn!("Dropping update: {}", e);
                }
            }
            Message::TimelineState { .. } => {
                self.timeline.handle_message(message);
            }
            _ => trace!("Ignoring {}", message.description()),
        }
    }

    fn load_specification(&mut self, root: &RootSpecification) {
        match Sender::from_spec(&root.spec) {
            Ok(tree) => {
                info!("Loaded specification of '{}' (v{})", root.name, root.version);
                self.root = Some(tree);
                self.specification = Some(root.clone());
                self.send(Message::TimelineRequestState);
            }
            Err(e) => warn!("Rejecting specification of '{}': {}", root.name, e),
        }
    }

    fn handle_update(&mut self, update: &Envelope) -> Result<()> {
        let (path, payload) = update.clone().unwrap_path();
        let node = self.root_mut(&path)?.route_mut(&path)?;
        if node.as_preset_button().is_some() {
            match PresetButtonSender::parse_action(&payload)? {
                PresetAction::Next => self.next_preset(&path)?,
                PresetAction::Random => self.random_preset(&path)?,
            };
            return Ok(());
        }
        node.handle_update(&payload)
    }

    pub fn specification(&self) -> Option<&RootSpecification> {
        self.specification.as_ref()
    }

    /// The mirrored tree, once the panel has announced it.
    pub fn root(&self) -> Option<&Sender> {
        self.root.as_ref()
    }

    pub fn control(&self, path: &ControlPath) -> Result<&Sender> {
        self.root
            .as_ref()
            .ok_or_else(|| ControlError::ControlNotFound(path.clone()))?
            .route(path)
    }

    fn root_mut(&mut self, path: &ControlPath) -> Result<&mut Sender> {
        self.root
            .as_mut()
            .ok_or_else(|| ControlError::ControlNotFound(path.clone()))
    }

    /// Run a user action on the control at `path` and send the signal it
    /// produces, if any.
    pub fn perform<F>(&mut self, path: &ControlPath, action: F) -> Result<()>
    where
        F: FnOnce(&mut Sender) -> Option<Value>,
    {
        let node = self.root_mut(path)?.route_mut(path)?;
        if let Some(payload) = action(node) {
            self.signal(path, payload)?;
        }
        Ok(())
    }

    /// Send a raw signal payload to the control at `path`.
    pub fn signal(&self, path: &ControlPath, payload: Value) -> Result<()> {
        self.transport.send(Message::ControlSignal {
            signal: Envelope::wrap_path(path, payload),
        })
    }

    /// Store the current state of the button's container as `name`.
    pub fn save_preset(&mut self, button: &ControlPath, name: &str) -> Result<()> {
        let scope = self.preset_scope(button)?;
        let root = self.root_mut(button)?;
        let state = root
            .route(&scope)?
            .state()
            .ok_or_else(|| ControlError::ControlNotFound(scope.clone()))?;
        preset_button(root, button)?.save(name, state);
        debug!("Saved preset '{}' for [{}]", name, scope);
        Ok(())
    }

    /// Restore a preset and send the signals that bring the panel in line.
    /// Returns false when no preset has that name.
    pub fn load_preset(&mut self, button: &ControlPath, name: &str) -> Result<bool> {
        let scope = self.preset_scope(button)?;
        let root = self.root_mut(button)?;
        let Some(state) = preset_button(root, button)?.load(name).cloned() else {
            return Ok(false);
        };
        let signals = root.route_mut(&scope)?.set_state(&state);
        debug!("Loading preset '{}': {} signals", name, signals.len());
        for signal in signals {
            self.transport.send(Message::ControlSignal {
                signal: signal.wrap_in(&scope),
            })?;
        }
        Ok(true)
    }

    pub fn delete_preset(&mut self, button: &ControlPath, name: &str) -> Result<bool> {
        let root = self.root_mut(button)?;
        Ok(preset_button(root, button)?.delete(name))
    }

    pub fn preset_names(&self, button: &ControlPath) -> Result<Vec<String>> {
        self.control(button)?
            .as_preset_button()
            .map(PresetButtonSender::names)
            .ok_or_else(|| ControlError::ControlNotFound(button.clone()))
    }

    /// Load the preset after the current one, wrapping around.
    pub fn next_preset(&mut self, button: &ControlPath) -> Result<bool> {
        let root = self.root_mut(button)?;
        let name = preset_button(root, button)?.next_in_row();
        match name {
            Some(name) => self.load_preset(button, &name),
            None => Ok(false),
        }
    }

    pub fn random_preset(&mut self, button: &ControlPath) -> Result<bool> {
        let root = self.root_mut(button)?;
        let name = preset_button(root, button)?.random();
        match name {
            Some(name) => self.load_preset(button, &name),
            None => Ok(false),
        }
    }

    /// Container whose state a preset button captures. A button on a tabs
    /// page captures the whole tabs control.
    fn preset_scope(&self, button: &ControlPath) -> Result<ControlPath> {
        let parent = button
            .parent()
            .ok_or_else(|| ControlError::ControlNotFound(button.clone()))?;
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| ControlError::ControlNotFound(button.clone()))?;
        if root.route(&parent).is_ok() {
            return Ok(parent);
        }
        parent
            .parent()
            .filter(|tabs| root.route(tabs).is_ok())
            .ok_or(ControlError::ControlNotFound(parent))
    }

    pub fn timeline(&self) -> &TimelineState {
        self.timeline.state()
    }

    pub fn timeline_client(&self) -> &TimelineClient {
        &self.timeline
    }

    pub fn edit_timeline(&mut self, edit: TimelineEdit) -> Result<()> {
        let message = self.timeline.edit(edit);
        self.transport.send(message)
    }

    /// Replace the points of a lane, keeping the local copy until the panel
    /// confirms this edit.
    pub fn set_lane_points(
        &mut self,
        path: ControlPath,
        lane_key: impl Into<String>,
        points: Vec<TimelinePoint>,
    ) -> Result<()> {
        let message = self.timeline.set_lane_points(path, lane_key, points);
        self.transport.send(message)
    }

    pub fn request_timeline_state(&self) -> Result<()> {
        self.transport.send(self.timeline.request_state())
    }

    fn send(&self, message: Message) {
        if let Err(e) = self.transport.send(message) {
            warn!("Controller failed to send: {}", e);
        }
    }
}

fn preset_button<'a>(root: &'a mut Sender, path: &ControlPath) -> Result<&'a mut PresetButtonSender> {
    root.route_mut(path)?
        .as_preset_button_mut()
        .ok_or_else(|| ControlError::ControlNotFound(path.clone()))
}
