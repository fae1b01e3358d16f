//! Timeline automation.
//!
//! The engine keeps per-control automation keyed by path, evaluates lane
//! curves against its clock and feeds the results through the regular signal
//! path of the receiver tree. A live signal to an automated control puts it in
//! manual override until automation is explicitly re-enabled.

pub mod client;
pub mod curve;
pub mod frame_loop;

pub use client::TimelineClient;
pub use frame_loop::FrameLoop;

use crate::receiver::Receiver;
use crate::routing;
use av_controls_types::timeline::sort_points;
use av_controls_types::{
    ControlPath, Envelope, Message, TimelineControl, TimelineEdit, TimelineLane, TimelineState,
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Engine settings.
#[derive(Debug, Clone)]
pub struct TimelineOptions {
    /// Start playing immediately
    pub autoplay: bool,
    /// Clock value at construction, in seconds
    pub initial_time: f64,
    /// Keep rendering frames even while paused
    pub always_render: bool,
    /// Quiet period after a manual control change before an idle render
    pub control_change_debounce: Duration,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            autoplay: false,
            initial_time: 0.0,
            always_render: false,
            control_change_debounce: Duration::from_millis(500),
        }
    }
}

/// Native range of an automatable control.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Range { min: f64, max: f64 },
    Switch,
    Selector { count: usize },
    Joystick,
}

impl Target {
    fn of(node: &Receiver) -> Option<Self> {
        match node {
            Receiver::Fader(c) | Receiver::Knob(c) => Some(Target::Range {
                min: c.spec.min,
                max: c.spec.max,
            }),
            Receiver::Switch(_) | Receiver::ConfirmSwitch(_) => Some(Target::Switch),
            Receiver::Selector(c) => Some(Target::Selector {
                count: c.spec.options.len(),
            }),
            Receiver::Joystick(_) => Some(Target::Joystick),
            _ => None,
        }
    }

    /// Build the signal payload for `control` at `time`, clamped to range.
    fn synthesize(&self, control: &TimelineControl, time: f64) -> Option<Value> {
        match *self {
            Target::Range { min, max } => {
                let v = lane_value(control, &["value"], time)?;
                let v = if min <= max { v.clamp(min, max) } else { v };
                Some(json!({ "value": v }))
            }
            Target::Switch => {
                let v = lane_value(control, &["on", "value"], time)?;
                Some(json!({ "on": v.clamp(0.0, 1.0) >= 0.5 }))
            }
            Target::Selector { count } => {
                if count == 0 {
                    return None;
                }
                let v = lane_value(control, &["index", "value"], time)?;
                let index = v.clamp(0.0, (count - 1) as f64).round() as usize;
                Some(json!({ "index": index }))
            }
            Target::Joystick => {
                let x = lane_value(control, &["x"], time);
                let y = lane_value(control, &["y"], time);
                if x.is_none() && y.is_none() {
                    return None;
                }
                Some(json!({
                    "x": x.unwrap_or(0.0).clamp(-1.0, 1.0),
                    "y": y.unwrap_or(0.0).clamp(-1.0, 1.0),
                }))
            }
        }
    }
}

/// First enabled lane among `keys` that yields a value.
fn lane_value(control: &TimelineControl, keys: &[&str], time: f64) -> Option<f64> {
    keys.iter().find_map(|key| {
        control
            .lane(key)
            .filter(|lane| lane.enabled)
            .and_then(|lane| curve::evaluate(&lane.points, time))
    })
}

/// Callback receiving the engine's outgoing `timeline-state` messages.
pub type MessageCallback = Box<dyn FnMut(Message) + Send>;

pub struct Timeline {
    targets: HashMap<ControlPath, Target>,
    automation: IndexMap<ControlPath, TimelineControl>,
    last_values: HashMap<ControlPath, HashMap<String, f64>>,
    last_applied: HashMap<ControlPath, Value>,
    time: f64,
    playing: bool,
    always_render: bool,
    last_delta: f64,
    on_message: Option<MessageCallback>,
}

impl Timeline {
    /// Index the automatable leaves of `root`.
    pub fn new(root: &Receiver, options: &TimelineOptions) -> Self {
        let mut targets = HashMap::new();
        routing::deep_foreach(root, |path, node| {
            if let Some(target) = Target::of(node) {
                targets.insert(path.clone(), target);
            }
        });
        debug!("Timeline indexed {} automatable controls", targets.len());

        Self {
            targets,
            automation: IndexMap::new(),
            last_values: HashMap::new(),
            last_applied: HashMap::new(),
            time: options.initial_time.max(0.0),
            playing: options.autoplay,
            always_render: options.always_render,
            last_delta: 0.0,
            on_message: None,
        }
    }

    /// Where `timeline-state` broadcasts go.
    pub fn set_on_message(&mut self, callback: impl FnMut(Message) + Send + 'static) {
        self.on_message = Some(Box::new(callback));
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn always_render(&self) -> bool {
        self.always_render
    }

    /// Delta of the most recent tick, in seconds.
    pub fn last_delta(&self) -> f64 {
        self.last_delta
    }

    pub fn is_automatable(&self, path: &ControlPath) -> bool {
        self.targets.contains_key(path)
    }

    pub fn control(&self, path: &ControlPath) -> Option<&TimelineControl> {
        self.automation.get(path)
    }

    /// Last value seen in an update of `path`, by field name.
    pub fn last_value(&self, path: &ControlPath, key: &str) -> Option<f64> {
        self.last_values.get(path)?.get(key).copied()
    }

    /// Advance the clock by `dt` seconds. Evaluates only while playing.
    pub fn tick(&mut self, root: &mut Receiver, dt: f64) -> Vec<Envelope> {
        self.last_delta = dt;
        if !self.playing {
            return Vec::new();
        }
        if dt.is_finite() && dt > 0.0 {
            self.time += dt;
        }
        self.evaluate(root)
    }

    /// Jump to `time` (clamped to zero) and evaluate.
    pub fn seek(&mut self, root: &mut Receiver, time: f64) -> Vec<Envelope> {
        self.time = if time.is_finite() { time.max(0.0) } else { 0.0 };
        self.evaluate(root)
    }

    /// Apply automation at the current time. Returns the updates produced.
    pub fn evaluate(&mut self, root: &mut Receiver) -> Vec<Envelope> {
        let mut updates = Vec::new();
        for (path, control) in &self.automation {
            if !control.is_active() {
                continue;
            }
            let Some(target) = self.targets.get(path) else {
                trace!("No automatable control at [{}]", path);
                continue;
            };
            let Some(payload) = target.synthesize(control, self.time) else {
                continue;
            };
            if self.last_applied.get(path) == Some(&payload) {
                continue;
            }

            let node = match routing::route_mut(root, path) {
                Ok(node) => node,
                Err(e) => {
                    trace!("Automation is inert: {}", e);
                    continue;
                }
            };
            match node.apply_signal(&payload) {
                Ok(Some(update)) => {
                    record_values(&mut self.last_values, path, &update);
                    updates.push(Envelope::wrap_path(path, update));
                    self.last_applied.insert(path.clone(), payload);
                }
                Ok(None) => {}
                Err(e) => warn!("Automation signal rejected: {}", e),
            }
        }
        updates
    }

    /// A live signal reached `path`: automation yields to the human.
    pub fn on_control_signal(&mut self, path: &ControlPath) {
        self.last_applied.remove(path);
        let Some(control) = self.automation.get_mut(path) else {
            return;
        };
        if control.enabled && !control.manual_override {
            control.manual_override = true;
            info!("Manual override on [{}]", path);
            self.broadcast();
        }
    }

    /// Record values carried by an update coming out of the tree.
    pub fn observe_update(&mut self, update: &Envelope) {
        let (path, payload) = update.clone().unwrap_path();
        record_values(&mut self.last_values, &path, &payload);
    }

    /// Handle a timeline protocol message. Returns `None` for other messages,
    /// otherwise the control updates the message caused.
    pub fn handle_message(&mut self, root: &mut Receiver, message: &Message) -> Option<Vec<Envelope>> {
        match message {
            Message::TimelineRequestState => {
                self.broadcast();
                Some(Vec::new())
            }
            Message::TimelineEdit { edit, seq } => Some(self.apply_edit(root, edit.clone(), *seq)),
            _ => None,
        }
    }

    /// Apply one edit, then broadcast the full state.
    pub fn apply_edit(
        &mut self,
        root: &mut Receiver,
        edit: TimelineEdit,
        seq: Option<u64>,
    ) -> Vec<Envelope> {
        debug!("Timeline edit {}", edit.kind());
        let mut reevaluate = true;
        match edit {
            TimelineEdit::SetControlEnabled { path, enabled } => {
                let control = self.control_entry(&path);
                control.enabled = enabled;
                if enabled {
                    control.manual_override = false;
                }
                self.last_applied.remove(&path);
            }
            TimelineEdit::SetLaneEnabled {
                path,
                lane_key,
                enabled,
            } => match self.control_entry(&path).lane_mut(&lane_key) {
                Some(lane) => lane.enabled = enabled,
                None => trace!("No lane '{}' on [{}]", lane_key, path),
            },
            TimelineEdit::SetLanePoints {
                path,
                lane_key,
                mut points,
            } => match self.control_entry(&path).lane_mut(&lane_key) {
                Some(lane) => {
                    sort_points(&mut points);
                    lane.points = points;
                    if seq.is_some() {
                        lane.sequence_number = seq;
                    }
                }
                None => trace!("No lane '{}' on [{}]", lane_key, path),
            },
            TimelineEdit::AddLane { path, lane } => self.add_lane(&path, lane),
            TimelineEdit::RemoveLane { path, lane_key } => {
                self.control_entry(&path)
                    .lanes
                    .retain(|lane| lane.key != lane_key);
            }
            TimelineEdit::SetPlaying { playing } => {
                self.playing = playing;
                reevaluate = false;
            }
            TimelineEdit::Seek { time } => {
                let updates = self.seek(root, time);
                self.broadcast();
                return updates;
            }
            TimelineEdit::SetAlwaysRender { always_render } => {
                self.always_render = always_render;
                reevaluate = false;
            }
        }

        let updates = if reevaluate {
            self.evaluate(root)
        } else {
            Vec::new()
        };
        self.broadcast();
        updates
    }

    fn add_lane(&mut self, path: &ControlPath, mut lane: TimelineLane) {
        let control = self.control_entry(path);
        if control.lane(&lane.key).is_some() {
            trace!("Lane '{}' already exists on [{}]", lane.key, path);
            return;
        }
        sort_points(&mut lane.points);
        control.lanes.push(lane);
    }

    /// Automation for `path`, created lazily.
    fn control_entry(&mut self, path: &ControlPath) -> &mut TimelineControl {
        self.automation
            .entry(path.clone())
            .or_insert_with(|| TimelineControl::new(path.clone()))
    }

    /// Serializable snapshot.
    pub fn state(&self) -> TimelineState {
        TimelineState {
            time: self.time,
            playing: self.playing,
            always_render: self.always_render,
            controls: self.automation.values().cloned().collect(),
        }
    }

    /// Replace the whole automation set from a snapshot.
    pub fn load_state(&mut self, state: TimelineState) {
        self.time = state.time.max(0.0);
        self.playing = state.playing;
        self.always_render = state.always_render;
        self.automation = state
            .controls
            .into_iter()
            .map(|mut control| {
                for lane in &mut control.lanes {
                    sort_points(&mut lane.points);
                }
                (control.path.clone(), control)
            })
            .collect();
        self.last_applied.clear();
    }

    /// Send the full state through the message callback.
    pub fn broadcast(&mut self) {
        let state = self.state();
        if let Some(callback) = self.on_message.as_mut() {
            callback(Message::TimelineState { state });
        }
    }
}

fn record_values(
    last_values: &mut HashMap<ControlPath, HashMap<String, f64>>,
    path: &ControlPath,
    payload: &Value,
) {
    let Some(fields) = payload.as_object() else {
        return;
    };
    for (key, value) in fields {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };
        if let Some(number) = number {
            last_values
                .entry(path.clone())
                .or_default()
                .insert(key.clone(), number);
        }
    }
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("time", &self.time)
            .field("playing", &self.playing)
            .field("always_render", &self.always_render)
            .field("controls", &self.automation.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use av_controls_types::TimelinePoint;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn tree() -> Receiver {
        Receiver::from_value(json!({
            "type": "group",
            "name": "root",
            "controlSpecs": {
                "g": {
                    "type": "group",
                    "name": "g",
                    "controlSpecs": {
                        "fader1": {"type": "fader", "name": "f", "initialValue": 0, "min": 0, "max": 10}
                    }
                },
                "sw": {"type": "switch", "name": "sw"},
                "sel": {"type": "selector", "name": "sel", "options": ["a", "b", "c"]},
                "stick": {"type": "joystick", "name": "stick"}
            }
        }))
        .unwrap()
    }

    fn fader_path() -> ControlPath {
        ControlPath::from(["g", "fader1"])
    }

    fn fader_value(root: &Receiver) -> f64 {
        root.route(&fader_path()).unwrap().as_value().unwrap().value()
    }

    fn automate(timeline: &mut Timeline, root: &mut Receiver, path: ControlPath, key: &str, points: Vec<TimelinePoint>) {
        timeline.apply_edit(
            root,
            TimelineEdit::AddLane {
                path: path.clone(),
                lane: TimelineLane::new(key).with_points(points),
            },
            None,
        );
        timeline.apply_edit(
            root,
            TimelineEdit::SetControlEnabled {
                path,
                enabled: true,
            },
            None,
        );
    }

    #[test]
    fn test_tick_only_evaluates_while_playing() {
        let mut root = tree();
        let mut timeline = Timeline::new(&root, &TimelineOptions::default());
        automate(
            &mut timeline,
            &mut root,
            fader_path(),
            "value",
            vec![TimelinePoint::anchor(0.0, 0.0), TimelinePoint::anchor(10.0, 10.0)],
        );

        timeline.tick(&mut root, 5.0);
        assert_eq!(timeline.time(), 0.0);

        timeline.apply_edit(&mut root, TimelineEdit::SetPlaying { playing: true }, None);
        let updates = timeline.tick(&mut root, 5.0);
        assert_eq!(timeline.time(), 5.0);
        assert_eq!(fader_value(&root), 5.0);
        assert_eq!(updates.len(), 1);
        assert_eq!(timeline.last_value(&fader_path(), "value"), Some(5.0));
    }

    #[test]
    fn test_seek_clamps_and_evaluates() {
        let mut root = tree();
        let mut timeline = Timeline::new(&root, &TimelineOptions::default());
        automate(
            &mut timeline,
            &mut root,
            fader_path(),
            "value",
            vec![TimelinePoint::anchor(0.0, 2.0), TimelinePoint::anchor(1.0, 50.0)],
        );
        timeline.seek(&mut root, -3.0);
        assert_eq!(timeline.time(), 0.0);
        assert_eq!(fader_value(&root), 2.0);
        // clamped to the fader max
        timeline.seek(&mut root, 1.0);
        assert_eq!(fader_value(&root), 10.0);
    }

    #[test]
    fn test_manual_override_until_reenabled() {
        let mut root = tree();
        let mut timeline = Timeline::new(
            &root,
            &TimelineOptions {
                autoplay: true,
                ..Default::default()
            },
        );
        automate(
            &mut timeline,
            &mut root,
            fader_path(),
            "value",
            vec![TimelinePoint::anchor(0.0, 0.0), TimelinePoint::anchor(10.0, 10.0)],
        );

        // a human moves the fader
        let signal = Envelope::wrap_path(&fader_path(), json!({"value": 7.5}));
        root.handle_signal(&signal).unwrap();
        timeline.on_control_signal(&fader_path());

        let control = timeline.control(&fader_path()).unwrap();
        assert!(control.manual_override);
        assert!(control.enabled);

        timeline.tick(&mut root, 2.0);
        assert_eq!(fader_value(&root), 7.5);

        timeline.apply_edit(
            &mut root,
            TimelineEdit::SetControlEnabled {
                path: fader_path(),
                enabled: true,
            },
            None,
        );
        assert!(!timeline.control(&fader_path()).unwrap().manual_override);
        timeline.tick(&mut root, 1.0);
        assert_eq!(fader_value(&root), 3.0);
    }

    #[test]
    fn test_add_lane_is_idempotent() {
        let mut root = tree();
        let mut timeline = Timeline::new(&root, &TimelineOptions::default());
        let edit = TimelineEdit::AddLane {
            path: fader_path(),
            lane: TimelineLane::new("value"),
        };
        timeline.apply_edit(&mut root, edit.clone(), None);
        let once = timeline.state();
        timeline.apply_edit(&mut root, edit, None);
        assert_eq!(timeline.state(), once);
        assert_eq!(timeline.control(&fader_path()).unwrap().lanes.len(), 1);
    }

    #[test]
    fn test_unknown_lane_is_a_no_op_and_path_is_created() {
        let mut root = tree();
        let mut timeline = Timeline::new(&root, &TimelineOptions::default());
        let path = ControlPath::from(["vanished"]);
        timeline.apply_edit(
            &mut root,
            TimelineEdit::SetLanePoints {
                path: path.clone(),
                lane_key: "value".to_string(),
                points: vec![TimelinePoint::anchor(0.0, 1.0)],
            },
            Some(3),
        );
        let control = timeline.control(&path).unwrap();
        assert!(control.lanes.is_empty());
        assert!(control.enabled);
    }

    #[test]
    fn test_new_lane_applies_without_explicit_enable() {
        let mut root = tree();
        let mut timeline = Timeline::new(&root, &TimelineOptions::default());
        timeline.apply_edit(
            &mut root,
            TimelineEdit::AddLane {
                path: fader_path(),
                lane: TimelineLane::new("value").with_points(vec![
                    TimelinePoint::anchor(0.0, 0.0),
                    TimelinePoint::anchor(10.0, 10.0),
                ]),
            },
            None,
        );
        let updates = timeline.seek(&mut root, 4.0);
        assert_eq!(updates.len(), 1);
        assert_eq!(fader_value(&root), 4.0);
        assert!(timeline.control(&fader_path()).unwrap().is_active());
    }

    #[test]
    fn test_set_lane_points_sorts_and_tags() {
        let mut root = tree();
        let mut timeline = Timeline::new(&root, &TimelineOptions::default());
        automate(&mut timeline, &mut root, fader_path(), "value", Vec::new());
        timeline.apply_edit(
            &mut root,
            TimelineEdit::SetLanePoints {
                path: fader_path(),
                lane_key: "value".to_string(),
                points: vec![TimelinePoint::anchor(4.0, 4.0), TimelinePoint::anchor(1.0, 1.0)],
            },
            Some(9),
        );
        let lane = timeline
            .control(&fader_path())
            .unwrap()
            .lane("value")
            .unwrap()
            .clone();
        assert_eq!(lane.points[0].t, 1.0);
        assert_eq!(lane.sequence_number, Some(9));
    }

    #[test]
    fn test_native_ranges() {
        let mut root = tree();
        let mut timeline = Timeline::new(&root, &TimelineOptions::default());
        automate(
            &mut timeline,
            &mut root,
            ControlPath::from(["sw"]),
            "value",
            vec![TimelinePoint::anchor(0.0, 0.7)],
        );
        automate(
            &mut timeline,
            &mut root,
            ControlPath::from(["sel"]),
            "index",
            vec![TimelinePoint::anchor(0.0, 7.0)],
        );
        automate(
            &mut timeline,
            &mut root,
            ControlPath::from(["stick"]),
            "x",
            vec![TimelinePoint::anchor(0.0, -3.0)],
        );

        assert!(root.route(&["sw"].into()).unwrap().as_switch().unwrap().is_on());
        assert_eq!(root.route(&["sel"].into()).unwrap().as_selector().unwrap().index(), 2);
        let p = root.route(&["stick"].into()).unwrap().as_joystick().unwrap().position();
        assert_eq!((p.x, p.y), (-1.0, 0.0));
    }

    #[test]
    fn test_every_edit_broadcasts_state() {
        let mut root = tree();
        let mut timeline = Timeline::new(&root, &TimelineOptions::default());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        timeline.set_on_message(move |m| sink.lock().push(m));

        timeline.apply_edit(&mut root, TimelineEdit::Seek { time: 2.0 }, None);
        timeline.handle_message(&mut root, &Message::TimelineRequestState);
        assert!(timeline.handle_message(&mut root, &Message::Nudge).is_none());

        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        match &sent[0] {
            Message::TimelineState { state } => assert_eq!(state.time, 2.0),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
