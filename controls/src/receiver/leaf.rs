//! Leaf receivers: validate signals, hold runtime values, call user callbacks.

use crate::error::{ControlError, Result};
use av_controls_types::{
    ControlType, Dot, DotsSpec, JoystickSpec, LabelSpec, PlainSpec, Position, PresetButtonSpec,
    RangeSpec, SelectorSpec, SwitchSpec, TextboxSpec,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

/// Boxed user callback.
pub type Callback<T> = Box<dyn FnMut(T) + Send>;

/// Default minimum interval between two cake meter updates.
pub const CAKE_THROTTLE: Duration = Duration::from_millis(2000);

fn parse<T: DeserializeOwned>(control_type: ControlType, payload: &Value) -> Result<T> {
    T::deserialize(payload).map_err(|_| ControlError::signal(control_type, payload))
}

fn finite(control_type: ControlType, payload: &Value, values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ControlError::signal(control_type, payload))
    }
}

#[derive(Deserialize)]
struct ValueSignal {
    value: f64,
}

#[derive(Deserialize)]
struct OnSignal {
    on: bool,
}

/// Fader or knob.
pub struct ValueReceiver {
    pub spec: RangeSpec,
    control_type: ControlType,
    value: f64,
    on_change: Option<Callback<f64>>,
}

impl ValueReceiver {
    pub fn new(control_type: ControlType, spec: RangeSpec) -> Self {
        Self {
            value: spec.initial_value,
            spec,
            control_type,
            on_change: None,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn on_change(&mut self, callback: impl FnMut(f64) + Send + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    pub(crate) fn apply(&mut self, payload: &Value) -> Result<Value> {
        let signal: ValueSignal = parse(self.control_type, payload)?;
        finite(self.control_type, payload, &[signal.value])?;
        self.value = signal.value;
        if let Some(cb) = self.on_change.as_mut() {
            cb(signal.value);
        }
        Ok(json!({ "value": signal.value }))
    }
}

/// Switch or confirm switch. Confirmation happens on the controller side.
pub struct SwitchReceiver {
    pub spec: SwitchSpec,
    control_type: ControlType,
    on: bool,
    on_change: Option<Callback<bool>>,
}

impl SwitchReceiver {
    pub fn new(control_type: ControlType, spec: SwitchSpec) -> Self {
        Self {
            on: spec.initially_on,
            spec,
            control_type,
            on_change: None,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn on_change(&mut self, callback: impl FnMut(bool) + Send + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    pub(crate) fn apply(&mut self, payload: &Value) -> Result<Value> {
        let signal: OnSignal = parse(self.control_type, payload)?;
        self.on = signal.on;
        if let Some(cb) = self.on_change.as_mut() {
            cb(signal.on);
        }
        Ok(json!({ "on": signal.on }))
    }
}

pub struct ConfirmButtonReceiver {
    pub spec: PlainSpec,
    confirmed: bool,
    on_confirm: Option<Callback<()>>,
}

impl ConfirmButtonReceiver {
    pub fn new(spec: PlainSpec) -> Self {
        Self {
            spec,
            confirmed: false,
            on_confirm: None,
        }
    }

    /// Whether the last signal was a confirmation.
    pub fn confirmed(&self) -> bool {
        self.confirmed
    }

    /// Called on every `{confirmed: true}` signal.
    pub fn on_confirm(&mut self, callback: impl FnMut(()) + Send + 'static) {
        self.on_confirm = Some(Box::new(callback));
    }

    pub(crate) fn apply(&mut self, payload: &Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Signal {
            confirmed: bool,
        }
        let signal: Signal = parse(ControlType::ConfirmButton, payload)?;
        self.confirmed = signal.confirmed;
        if signal.confirmed {
            if let Some(cb) = self.on_confirm.as_mut() {
                cb(());
            }
        }
        Ok(json!({ "confirmed": signal.confirmed }))
    }
}

pub struct SelectorReceiver {
    pub spec: SelectorSpec,
    index: usize,
    on_change: Option<Callback<usize>>,
}

impl SelectorReceiver {
    pub fn new(spec: SelectorSpec) -> Self {
        Self {
            index: spec.initial_index,
            spec,
            on_change: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Currently selected option label.
    pub fn selected(&self) -> Option<&str> {
        self.spec.options.get(self.index).map(String::as_str)
    }

    pub fn on_change(&mut self, callback: impl FnMut(usize) + Send + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    pub(crate) fn apply(&mut self, payload: &Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Signal {
            index: usize,
        }
        let signal: Signal = parse(ControlType::Selector, payload)?;
        if signal.index >= self.spec.options.len() {
            return Err(ControlError::signal(ControlType::Selector, payload));
        }
        self.index = signal.index;
        if let Some(cb) = self.on_change.as_mut() {
            cb(signal.index);
        }
        Ok(json!({ "index": signal.index }))
    }
}

pub struct JoystickReceiver {
    pub spec: JoystickSpec,
    position: Position,
    on_change: Option<Callback<Position>>,
}

impl JoystickReceiver {
    pub fn new(spec: JoystickSpec) -> Self {
        Self {
            position: spec.initial_value,
            spec,
            on_change: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn on_change(&mut self, callback: impl FnMut(Position) + Send + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    pub(crate) fn apply(&mut self, payload: &Value) -> Result<Value> {
        let position: Position = parse(ControlType::Joystick, payload)?;
        finite(ControlType::Joystick, payload, &[position.x, position.y])?;
        self.position = position;
        if let Some(cb) = self.on_change.as_mut() {
            cb(position);
        }
        Ok(json!({ "x": position.x, "y": position.y }))
    }
}

/// Velocity-sensitive momentary pad.
pub struct PadReceiver {
    pub spec: PlainSpec,
    pressed: bool,
    velocity: f64,
    on_press: Option<Callback<f64>>,
    on_release: Option<Callback<()>>,
}

impl PadReceiver {
    pub fn new(spec: PlainSpec) -> Self {
        Self {
            spec,
            pressed: false,
            velocity: 0.0,
            on_press: None,
            on_release: None,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Called with the velocity on a released to pressed edge.
    pub fn on_press(&mut self, callback: impl FnMut(f64) + Send + 'static) {
        self.on_press = Some(Box::new(callback));
    }

    /// Called on a pressed to released edge.
    pub fn on_release(&mut self, callback: impl FnMut(()) + Send + 'static) {
        self.on_release = Some(Box::new(callback));
    }

    pub(crate) fn apply(&mut self, payload: &Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Signal {
            pressed: bool,
            #[serde(default)]
            velocity: Option<f64>,
        }
        let signal: Signal = parse(ControlType::Pad, payload)?;
        if let Some(v) = signal.velocity {
            finite(ControlType::Pad, payload, &[v])?;
        }

        let was_pressed = self.pressed;
        self.pressed = signal.pressed;
        if signal.pressed && !was_pressed {
            self.velocity = signal.velocity.unwrap_or(1.0);
            let velocity = self.velocity;
            if let Some(cb) = self.on_press.as_mut() {
                cb(velocity);
            }
        } else if !signal.pressed && was_pressed {
            if let Some(cb) = self.on_release.as_mut() {
                cb(());
            }
        }

        Ok(match signal.velocity {
            Some(v) => json!({ "pressed": signal.pressed, "velocity": v }),
            None => json!({ "pressed": signal.pressed }),
        })
    }
}

pub struct TextboxReceiver {
    pub spec: TextboxSpec,
    text: String,
    on_change: Option<Callback<String>>,
}

impl TextboxReceiver {
    pub fn new(spec: TextboxSpec) -> Self {
        Self {
            text: spec.initial_text.clone(),
            spec,
            on_change: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn on_change(&mut self, callback: impl FnMut(String) + Send + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    pub(crate) fn apply(&mut self, payload: &Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Signal {
            text: String,
        }
        let signal: Signal = parse(ControlType::Textbox, payload)?;
        self.text = signal.text;
        if let Some(cb) = self.on_change.as_mut() {
            cb(self.text.clone());
        }
        Ok(json!({ "text": self.text }))
    }
}

/// Receives single letters typed on the controller.
pub struct LetterboxReceiver {
    pub spec: PlainSpec,
    last_letter: Option<String>,
    on_letter: Option<Callback<String>>,
}

impl LetterboxReceiver {
    pub fn new(spec: PlainSpec) -> Self {
        Self {
            spec,
            last_letter: None,
            on_letter: None,
        }
    }

    pub fn last_letter(&self) -> Option<&str> {
        self.last_letter.as_deref()
    }

    pub fn on_letter(&mut self, callback: impl FnMut(String) + Send + 'static) {
        self.on_letter = Some(Box::new(callback));
    }

    pub(crate) fn apply(&mut self, payload: &Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Signal {
            letter: String,
        }
        let signal: Signal = parse(ControlType::Letterbox, payload)?;
        if let Some(cb) = self.on_letter.as_mut() {
            cb(signal.letter.clone());
        }
        let update = json!({ "letter": signal.letter });
        self.last_letter = Some(signal.letter);
        Ok(update)
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum DotsSignal {
    Single { index: usize, dot: Dot },
    Full { dots: Vec<Dot> },
}

/// A set of draggable points.
pub struct DotsReceiver {
    pub spec: DotsSpec,
    dots: Vec<Dot>,
    on_change: Option<Callback<Vec<Dot>>>,
}

impl DotsReceiver {
    pub fn new(spec: DotsSpec) -> Self {
        Self {
            dots: spec.initial_values.clone(),
            spec,
            on_change: None,
        }
    }

    pub fn dots(&self) -> &[Dot] {
        &self.dots
    }

    pub fn on_change(&mut self, callback: impl FnMut(Vec<Dot>) + Send + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    pub(crate) fn apply(&mut self, payload: &Value) -> Result<Value> {
        let signal: DotsSignal = parse(ControlType::Dots, payload)?;
        match signal {
            DotsSignal::Single { index, dot } => {
                finite(ControlType::Dots, payload, &dot)?;
                let slot = self
                    .dots
                    .get_mut(index)
                    .ok_or_else(|| ControlError::signal(ControlType::Dots, payload))?;
                *slot = dot;
            }
            DotsSignal::Full { dots } => {
                let flat: Vec<f64> = dots.iter().flatten().copied().collect();
                finite(ControlType::Dots, payload, &flat)?;
                self.dots = dots;
            }
        }
        if let Some(cb) = self.on_change.as_mut() {
            cb(self.dots.clone());
        }
        Ok(json!({ "values": self.dots }))
    }
}

/// Display-only meter driven from the visual side.
pub struct CakeReceiver {
    pub spec: RangeSpec,
    value: f64,
    throttle: Duration,
    last_sent: Option<Instant>,
}

impl CakeReceiver {
    pub fn new(spec: RangeSpec) -> Self {
        Self {
            value: spec.initial_value,
            spec,
            throttle: CAKE_THROTTLE,
            last_sent: None,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Record a new meter value. Returns the update payload to send, or
    /// `None` while the previous update is still inside the throttle window.
    pub fn send_value(&mut self, value: f64, now: Instant) -> Option<Value> {
        self.value = value;
        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < self.throttle {
                return None;
            }
        }
        self.last_sent = Some(now);
        Some(json!({ "value": value }))
    }
}

pub struct LabelReceiver {
    pub spec: LabelSpec,
}

impl LabelReceiver {
    pub fn new(spec: LabelSpec) -> Self {
        Self { spec }
    }
}

/// Preset buttons live on the controller; the visual side can only ask for
/// the next or a random preset.
pub struct PresetButtonReceiver {
    pub spec: PresetButtonSpec,
}

impl PresetButtonReceiver {
    pub fn new(spec: PresetButtonSpec) -> Self {
        Self { spec }
    }

    pub fn request_random(&self) -> Value {
        json!({ "action": "random" })
    }

    pub fn request_next(&self) -> Value {
        json!({ "action": "next" })
    }
}

pub(crate) fn ignore_signal(control_type: ControlType, payload: &Value) {
    debug!("Ignoring signal for {}: {}", control_type, payload);
}
