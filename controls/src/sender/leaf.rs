//! Leaf senders: controller-side mirrors that turn user actions into signal
//! payloads and follow the updates coming back from the panel.

use crate::error::{ControlError, Result};
use crate::state::ControlState;
use av_controls_types::{
    ControlType, Dot, DotsSpec, JoystickSpec, LabelSpec, PlainSpec, Position, RangeSpec,
    SelectorSpec, SwitchSpec, TextboxSpec,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// How long a confirm control stays armed after the first press.
pub const DEFUSE_WINDOW: Duration = Duration::from_secs(4);

fn parse<T: DeserializeOwned>(control_type: ControlType, payload: &Value) -> Result<T> {
    T::deserialize(payload).map_err(|_| ControlError::update(control_type, payload))
}

/// Fader or knob.
#[derive(Debug, Clone)]
pub struct ValueSender {
    pub spec: RangeSpec,
    control_type: ControlType,
    value: f64,
}

impl ValueSender {
    pub fn new(control_type: ControlType, spec: RangeSpec) -> Self {
        Self {
            value: spec.initial_value,
            spec,
            control_type,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set an absolute value, clamped to the spec range.
    pub fn set_value(&mut self, value: f64) -> Value {
        let (min, max) = (self.spec.min, self.spec.max);
        self.value = if min <= max { value.clamp(min, max) } else { value };
        json!({ "value": self.value })
    }

    /// Set a value from `[0, 1]`, mapped linearly onto `[min, max]`.
    pub fn set_norm_value(&mut self, norm: f64) -> Value {
        let value = norm * (self.spec.max - self.spec.min) + self.spec.min;
        self.set_value(value)
    }

    pub fn norm_value(&self) -> f64 {
        let span = self.spec.max - self.spec.min;
        if span == 0.0 {
            0.0
        } else {
            (self.value - self.spec.min) / span
        }
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        #[derive(Deserialize)]
        struct Update {
            value: f64,
        }
        self.value = parse::<Update>(self.control_type, payload)?.value;
        Ok(())
    }

    pub(crate) fn state(&self) -> ControlState {
        ControlState::Number(self.value)
    }

    pub(crate) fn restore(&mut self, state: &ControlState) -> Option<Value> {
        state.as_f64().map(|v| self.set_value(v))
    }
}

#[derive(Deserialize)]
struct OnUpdate {
    on: bool,
}

#[derive(Debug, Clone)]
pub struct SwitchSender {
    pub spec: SwitchSpec,
    on: bool,
}

impl SwitchSender {
    pub fn new(spec: SwitchSpec) -> Self {
        Self {
            on: spec.initially_on,
            spec,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn set_on(&mut self, on: bool) -> Value {
        self.on = on;
        json!({ "on": on })
    }

    pub fn toggle(&mut self) -> Value {
        self.set_on(!self.on)
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        self.on = parse::<OnUpdate>(ControlType::Switch, payload)?.on;
        Ok(())
    }
}

/// Switch that only flips on a second press inside the defuse window.
#[derive(Debug, Clone)]
pub struct ConfirmSwitchSender {
    pub spec: SwitchSpec,
    on: bool,
    armed_at: Option<Instant>,
}

impl ConfirmSwitchSender {
    pub fn new(spec: SwitchSpec) -> Self {
        Self {
            on: spec.initially_on,
            spec,
            armed_at: None,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn is_armed(&self, now: Instant) -> bool {
        self.armed_at
            .is_some_and(|at| now.saturating_duration_since(at) < DEFUSE_WINDOW)
    }

    /// First press arms silently; a second press inside the window toggles.
    pub fn press(&mut self, now: Instant) -> Option<Value> {
        if self.is_armed(now) {
            self.armed_at = None;
            self.on = !self.on;
            Some(json!({ "on": self.on }))
        } else {
            self.armed_at = Some(now);
            None
        }
    }

    pub fn cancel(&mut self) {
        self.armed_at = None;
    }

    pub(crate) fn set_on(&mut self, on: bool) -> Value {
        self.armed_at = None;
        self.on = on;
        json!({ "on": on })
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        self.on = parse::<OnUpdate>(ControlType::ConfirmSwitch, payload)?.on;
        Ok(())
    }
}

/// Button that sends `{confirmed:false}` on arming and `{confirmed:true}` on
/// a second press inside the defuse window.
#[derive(Debug, Clone)]
pub struct ConfirmButtonSender {
    pub spec: PlainSpec,
    armed_at: Option<Instant>,
}

impl ConfirmButtonSender {
    pub fn new(spec: PlainSpec) -> Self {
        Self {
            spec,
            armed_at: None,
        }
    }

    pub fn is_armed(&self, now: Instant) -> bool {
        self.armed_at
            .is_some_and(|at| now.saturating_duration_since(at) < DEFUSE_WINDOW)
    }

    pub fn press(&mut self, now: Instant) -> Value {
        if self.is_armed(now) {
            self.armed_at = None;
            json!({ "confirmed": true })
        } else {
            self.armed_at = Some(now);
            json!({ "confirmed": false })
        }
    }

    pub fn cancel(&mut self) {
        self.armed_at = None;
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        #[derive(Deserialize)]
        struct Update {
            confirmed: bool,
        }
        if parse::<Update>(ControlType::ConfirmButton, payload)?.confirmed {
            self.armed_at = None;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SelectorSender {
    pub spec: SelectorSpec,
    index: usize,
}

impl SelectorSender {
    pub fn new(spec: SelectorSpec) -> Self {
        Self {
            index: spec.initial_index,
            spec,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn options(&self) -> &[String] {
        &self.spec.options
    }

    /// Select an option. `None` when the index is out of range.
    pub fn select(&mut self, index: usize) -> Option<Value> {
        if index >= self.spec.options.len() {
            return None;
        }
        self.index = index;
        Some(json!({ "index": index }))
    }

    pub fn increment(&mut self) -> Option<Value> {
        let count = self.spec.options.len();
        if count == 0 {
            return None;
        }
        self.select((self.index + 1) % count)
    }

    pub fn decrement(&mut self) -> Option<Value> {
        let count = self.spec.options.len();
        if count == 0 {
            return None;
        }
        self.select((self.index + count - 1) % count)
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        #[derive(Deserialize)]
        struct Update {
            index: usize,
        }
        self.index = parse::<Update>(ControlType::Selector, payload)?.index;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JoystickSender {
    pub spec: JoystickSpec,
    position: Position,
}

impl JoystickSender {
    pub fn new(spec: JoystickSpec) -> Self {
        Self {
            position: spec.initial_value,
            spec,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Move the stick; both axes are clamped to `[-1, 1]`.
    pub fn set_position(&mut self, x: f64, y: f64) -> Value {
        self.position = Position {
            x: x.clamp(-1.0, 1.0),
            y: y.clamp(-1.0, 1.0),
        };
        json!({ "x": self.position.x, "y": self.position.y })
    }

    /// Spring back to the centre.
    pub fn reset(&mut self) -> Value {
        self.set_position(0.0, 0.0)
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        self.position = parse(ControlType::Joystick, payload)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PadSender {
    pub spec: PlainSpec,
    pressed: bool,
}

impl PadSender {
    pub fn new(spec: PlainSpec) -> Self {
        Self {
            spec,
            pressed: false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn press(&mut self, velocity: f64) -> Value {
        self.pressed = true;
        json!({ "pressed": true, "velocity": velocity })
    }

    pub fn release(&mut self) -> Value {
        self.pressed = false;
        json!({ "pressed": false })
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        #[derive(Deserialize)]
        struct Update {
            pressed: bool,
        }
        self.pressed = parse::<Update>(ControlType::Pad, payload)?.pressed;
        Ok(())
    }
}

/// Text is edited locally and only sent on submit.
#[derive(Debug, Clone)]
pub struct TextboxSender {
    pub spec: TextboxSpec,
    text: String,
}

impl TextboxSender {
    pub fn new(spec: TextboxSpec) -> Self {
        Self {
            text: spec.initial_text.clone(),
            spec,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn submit(&self) -> Value {
        json!({ "text": self.text })
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        #[derive(Deserialize)]
        struct Update {
            text: String,
        }
        self.text = parse::<Update>(ControlType::Textbox, payload)?.text;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LetterboxSender {
    pub spec: PlainSpec,
}

impl LetterboxSender {
    pub fn new(spec: PlainSpec) -> Self {
        Self { spec }
    }

    pub fn send_letter(&self, letter: impl Into<String>) -> Value {
        json!({ "letter": letter.into() })
    }
}

#[derive(Debug, Clone)]
pub struct DotsSender {
    pub spec: DotsSpec,
    dots: Vec<Dot>,
}

impl DotsSender {
    pub fn new(spec: DotsSpec) -> Self {
        Self {
            dots: spec.initial_values.clone(),
            spec,
        }
    }

    pub fn dots(&self) -> &[Dot] {
        &self.dots
    }

    /// Move one dot. `None` when the index does not exist.
    pub fn move_dot(&mut self, index: usize, dot: Dot) -> Option<Value> {
        let slot = self.dots.get_mut(index)?;
        *slot = dot;
        Some(json!({ "type": "single", "index": index, "dot": dot }))
    }

    /// Replace every dot.
    pub fn set_dots(&mut self, dots: Vec<Dot>) -> Value {
        self.dots = dots;
        json!({ "type": "full", "dots": self.dots })
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        #[derive(Deserialize)]
        struct Update {
            values: Vec<Dot>,
        }
        self.dots = parse::<Update>(ControlType::Dots, payload)?.values;
        Ok(())
    }
}

/// Mirror of a visual-side meter.
#[derive(Debug, Clone)]
pub struct CakeSender {
    pub spec: RangeSpec,
    value: f64,
}

impl CakeSender {
    pub fn new(spec: RangeSpec) -> Self {
        Self {
            value: spec.initial_value,
            spec,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub(crate) fn handle_update(&mut self, payload: &Value) -> Result<()> {
        #[derive(Deserialize)]
        struct Update {
            value: f64,
        }
        self.value = parse::<Update>(ControlType::Cake, payload)?.value;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LabelSender {
    pub spec: LabelSpec,
}

impl LabelSender {
    pub fn new(spec: LabelSpec) -> Self {
        Self { spec }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use av_controls_types::BaseArgs;

    fn fader(min: f64, max: f64) -> ValueSender {
        ValueSender::new(
            ControlType::Fader,
            RangeSpec {
                base: BaseArgs::named("f"),
                initial_value: min,
                min,
                max,
                decimal_places: 0,
            },
        )
    }

    #[test]
    fn test_norm_value_maps_onto_range() {
        let mut f = fader(0.0, 100.0);
        assert_eq!(f.set_norm_value(0.5), json!({"value": 50.0}));
        assert_eq!(f.norm_value(), 0.5);

        let mut f = fader(-10.0, 10.0);
        f.set_norm_value(0.25);
        assert_eq!(f.value(), -5.0);
        // out of range input is clamped
        f.set_value(50.0);
        assert_eq!(f.value(), 10.0);
    }

    #[test]
    fn test_confirm_button_needs_two_presses() {
        let mut button = ConfirmButtonSender::new(PlainSpec::default());
        let t0 = Instant::now();
        assert_eq!(button.press(t0), json!({"confirmed": false}));
        assert!(button.is_armed(t0 + Duration::from_secs(1)));
        assert_eq!(
            button.press(t0 + Duration::from_secs(1)),
            json!({"confirmed": true})
        );
        assert!(!button.is_armed(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_confirm_button_window_expires() {
        let mut button = ConfirmButtonSender::new(PlainSpec::default());
        let t0 = Instant::now();
        button.press(t0);
        assert_eq!(
            button.press(t0 + Duration::from_secs(5)),
            json!({"confirmed": false})
        );
        button.cancel();
        assert!(!button.is_armed(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_confirm_switch_arms_silently() {
        let mut sw = ConfirmSwitchSender::new(SwitchSpec::default());
        let t0 = Instant::now();
        assert!(sw.press(t0).is_none());
        assert_eq!(
            sw.press(t0 + Duration::from_millis(100)),
            Some(json!({"on": true}))
        );
        assert!(sw.is_on());
    }

    #[test]
    fn test_selector_wraps_around() {
        let mut sel = SelectorSender::new(SelectorSpec {
            base: BaseArgs::named("s"),
            options: vec!["a".into(), "b".into(), "c".into()],
            initial_index: 0,
        });
        assert_eq!(sel.decrement(), Some(json!({"index": 2})));
        assert_eq!(sel.increment(), Some(json!({"index": 0})));
        assert_eq!(sel.select(7), None);
        assert_eq!(sel.index(), 0);
    }

    #[test]
    fn test_handle_update_rejects_malformed() {
        let mut f = fader(0.0, 1.0);
        assert!(matches!(
            f.handle_update(&json!({"on": true})),
            Err(ControlError::UpdateParsing { .. })
        ));
        f.handle_update(&json!({"value": 0.75})).unwrap();
        assert_eq!(f.value(), 0.75);
    }
}
