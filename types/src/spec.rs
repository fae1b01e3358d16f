//! Control specifications: the static shape of a control tree.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Child specs of a container, keyed by child id, in insertion order.
pub type SpecsDict = IndexMap<String, Spec>;

/// A dot of a `dots` control: `[x, y]`.
pub type Dot = [f64; 2];

/// Geometry and styling shared by every control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseArgs {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub color: String,
}

impl BaseArgs {
    /// Base args with a name and default geometry.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Spec for controls with no type-specific parameters (pad, confirm button, letterbox).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlainSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
}

/// Spec for numeric range controls (fader, knob, cake meter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    pub initial_value: f64,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub decimal_places: u32,
}

/// Spec for on/off controls (switch, confirm switch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    #[serde(default)]
    pub initially_on: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    pub options: Vec<String>,
    #[serde(default)]
    pub initial_index: usize,
}

/// Joystick position, each axis nominally in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoystickSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    #[serde(default)]
    pub initial_value: Position,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextboxSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    #[serde(default)]
    pub initial_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DotsSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    #[serde(default)]
    pub initial_values: Vec<Dot>,
    #[serde(default = "default_x_padding")]
    pub x_padding: f64,
    #[serde(default = "default_y_padding")]
    pub y_padding: f64,
}

fn default_x_padding() -> f64 {
    0.01
}

fn default_y_padding() -> f64 {
    -1.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    #[serde(default)]
    pub label_position: LabelPosition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetButtonSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    /// Opaque rendering hint passed through to the widget layer.
    #[serde(default)]
    pub stencil: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    #[serde(default)]
    pub control_specs: SpecsDict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    #[serde(default)]
    pub control_specs: SpecsDict,
    #[serde(default = "default_modal_size")]
    pub modal_width: f64,
    #[serde(default = "default_modal_size")]
    pub modal_height: f64,
}

fn default_modal_size() -> f64 {
    80.0
}

/// Paged container: page id -> (control id -> spec).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabsSpec {
    #[serde(flatten)]
    pub base: BaseArgs,
    #[serde(default)]
    pub pages: IndexMap<String, SpecsDict>,
    #[serde(default)]
    pub initially_active_id: String,
}

/// Immutable description of one control node.
///
/// Built once when the tree is constructed; structural changes require a
/// new spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Spec {
    Fader(RangeSpec),
    Knob(RangeSpec),
    Cake(RangeSpec),
    Switch(SwitchSpec),
    ConfirmSwitch(SwitchSpec),
    ConfirmButton(PlainSpec),
    Pad(PlainSpec),
    Letterbox(PlainSpec),
    Selector(SelectorSpec),
    Joystick(JoystickSpec),
    Textbox(TextboxSpec),
    Dots(DotsSpec),
    Label(LabelSpec),
    PresetButton(PresetButtonSpec),
    Group(GroupSpec),
    Tabs(TabsSpec),
    Modal(ModalSpec),
}

impl Spec {
    /// Parse a raw JSON spec, rejecting unknown `type` discriminants first so
    /// the caller gets [`UnknownControlType`] instead of a generic serde error.
    pub fn from_value(value: serde_json::Value) -> Result<Self, SpecParseError> {
        check_types(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// The discriminant of this spec.
    pub fn control_type(&self) -> ControlType {
        match self {
            Spec::Fader(_) => ControlType::Fader,
            Spec::Knob(_) => ControlType::Knob,
            Spec::Cake(_) => ControlType::Cake,
            Spec::Switch(_) => ControlType::Switch,
            Spec::ConfirmSwitch(_) => ControlType::ConfirmSwitch,
            Spec::ConfirmButton(_) => ControlType::ConfirmButton,
            Spec::Pad(_) => ControlType::Pad,
            Spec::Letterbox(_) => ControlType::Letterbox,
            Spec::Selector(_) => ControlType::Selector,
            Spec::Joystick(_) => ControlType::Joystick,
            Spec::Textbox(_) => ControlType::Textbox,
            Spec::Dots(_) => ControlType::Dots,
            Spec::Label(_) => ControlType::Label,
            Spec::PresetButton(_) => ControlType::PresetButton,
            Spec::Group(_) => ControlType::Group,
            Spec::Tabs(_) => ControlType::Tabs,
            Spec::Modal(_) => ControlType::Modal,
        }
    }

    /// Geometry and styling of this control.
    pub fn base(&self) -> &BaseArgs {
        match self {
            Spec::Fader(s) | Spec::Knob(s) | Spec::Cake(s) => &s.base,
            Spec::Switch(s) | Spec::ConfirmSwitch(s) => &s.base,
            Spec::ConfirmButton(s) | Spec::Pad(s) | Spec::Letterbox(s) => &s.base,
            Spec::Selector(s) => &s.base,
            Spec::Joystick(s) => &s.base,
            Spec::Textbox(s) => &s.base,
            Spec::Dots(s) => &s.base,
            Spec::Label(s) => &s.base,
            Spec::PresetButton(s) => &s.base,
            Spec::Group(s) => &s.base,
            Spec::Tabs(s) => &s.base,
            Spec::Modal(s) => &s.base,
        }
    }

    pub fn name(&self) -> &str {
        &self.base().name
    }

    pub fn is_container(&self) -> bool {
        self.control_type().is_container()
    }
}

/// Walk a raw spec and its nested children, checking every `type` field.
fn check_types(value: &serde_json::Value) -> Result<(), UnknownControlType> {
    let type_name = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    type_name.parse::<ControlType>()?;

    if let Some(children) = value.get("controlSpecs").and_then(|c| c.as_object()) {
        for child in children.values() {
            check_types(child)?;
        }
    }
    if let Some(pages) = value.get("pages").and_then(|p| p.as_object()) {
        for page in pages.values().filter_map(|p| p.as_object()) {
            for child in page.values() {
                check_types(child)?;
            }
        }
    }
    Ok(())
}

/// Discriminant of a [`Spec`], as it appears in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlType {
    Fader,
    Knob,
    Cake,
    Switch,
    ConfirmSwitch,
    ConfirmButton,
    Pad,
    Letterbox,
    Selector,
    Joystick,
    Textbox,
    Dots,
    Label,
    PresetButton,
    Group,
    Tabs,
    Modal,
}

impl ControlType {
    /// Every known discriminant.
    pub const ALL: [ControlType; 17] = [
        ControlType::Fader,
        ControlType::Knob,
        ControlType::Cake,
        ControlType::Switch,
        ControlType::ConfirmSwitch,
        ControlType::ConfirmButton,
        ControlType::Pad,
        ControlType::Letterbox,
        ControlType::Selector,
        ControlType::Joystick,
        ControlType::Textbox,
        ControlType::Dots,
        ControlType::Label,
        ControlType::PresetButton,
        ControlType::Group,
        ControlType::Tabs,
        ControlType::Modal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Fader => "fader",
            ControlType::Knob => "knob",
            ControlType::Cake => "cake",
            ControlType::Switch => "switch",
            ControlType::ConfirmSwitch => "confirm-switch",
            ControlType::ConfirmButton => "confirm-button",
            ControlType::Pad => "pad",
            ControlType::Letterbox => "letterbox",
            ControlType::Selector => "selector",
            ControlType::Joystick => "joystick",
            ControlType::Textbox => "textbox",
            ControlType::Dots => "dots",
            ControlType::Label => "label",
            ControlType::PresetButton => "preset-button",
            ControlType::Group => "group",
            ControlType::Tabs => "tabs",
            ControlType::Modal => "modal",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ControlType::Group | ControlType::Tabs | ControlType::Modal
        )
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlType {
    type Err = UnknownControlType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownControlType(s.to_string()))
    }
}

/// A `type` discriminant that no control implements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown control type: '{0}'")]
pub struct UnknownControlType(pub String);

/// Error returned by [`Spec::from_value`].
#[derive(Debug, Error)]
pub enum SpecParseError {
    #[error(transparent)]
    UnknownType(#[from] UnknownControlType),

    #[error("Invalid spec: {0}")]
    Json(#[from] serde_json::Error),
}
