//! Controller-side control nodes.
//!
//! A [`Sender`] tree is built from the specification a panel announces. Each
//! leaf mirrors the panel's value, turns user actions into signal payloads and
//! follows the updates the panel sends back.

mod leaf;
mod preset;

pub use leaf::{
    CakeSender, ConfirmButtonSender, ConfirmSwitchSender, DotsSender, JoystickSender,
    LabelSender, LetterboxSender, PadSender, SelectorSender, SwitchSender, TextboxSender,
    ValueSender, DEFUSE_WINDOW,
};
pub use preset::{PresetAction, PresetButtonSender};

use crate::error::{ControlError, Result};
use crate::registry::Registry;
use crate::routing::{self, Children, ChildrenMut, TreeNode};
use crate::state::ControlState;
use av_controls_types::{
    ControlPath, ControlType, Envelope, GroupSpec, ModalSpec, Spec, SpecsDict, TabsSpec,
};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct GroupSender {
    pub spec: GroupSpec,
    pub controls: IndexMap<String, Sender>,
}

#[derive(Debug, Clone)]
pub struct ModalSender {
    pub spec: ModalSpec,
    pub controls: IndexMap<String, Sender>,
    pub open: bool,
}

#[derive(Debug, Clone)]
pub struct TabsSender {
    pub spec: TabsSpec,
    pub pages: IndexMap<String, IndexMap<String, Sender>>,
    pub active: String,
}

/// A controller-side control node.
#[derive(Debug, Clone)]
pub enum Sender {
    Fader(ValueSender),
    Knob(ValueSender),
    Cake(CakeSender),
    Switch(SwitchSender),
    ConfirmSwitch(ConfirmSwitchSender),
    ConfirmButton(ConfirmButtonSender),
    Pad(PadSender),
    Letterbox(LetterboxSender),
    Selector(SelectorSender),
    Joystick(JoystickSender),
    Textbox(TextboxSender),
    Dots(DotsSender),
    Label(LabelSender),
    PresetButton(PresetButtonSender),
    Group(GroupSender),
    Tabs(TabsSender),
    Modal(ModalSender),
}

impl Sender {
    /// Build a tree with the standard registry.
    pub fn from_spec(spec: &Spec) -> Result<Self> {
        Registry::standard().create_sender(spec)
    }

    pub(crate) fn build(registry: &Registry, spec: &Spec) -> Result<Self> {
        Ok(match spec {
            Spec::Fader(s) => Sender::Fader(ValueSender::new(ControlType::Fader, s.clone())),
            Spec::Knob(s) => Sender::Knob(ValueSender::new(ControlType::Knob, s.clone())),
            Spec::Cake(s) => Sender::Cake(CakeSender::new(s.clone())),
            Spec::Switch(s) => Sender::Switch(SwitchSender::new(s.clone())),
            Spec::ConfirmSwitch(s) => Sender::ConfirmSwitch(ConfirmSwitchSender::new(s.clone())),
            Spec::ConfirmButton(s) => Sender::ConfirmButton(ConfirmButtonSender::new(s.clone())),
            Spec::Pad(s) => Sender::Pad(PadSender::new(s.clone())),
            Spec::Letterbox(s) => Sender::Letterbox(LetterboxSender::new(s.clone())),
            Spec::Selector(s) => Sender::Selector(SelectorSender::new(s.clone())),
            Spec::Joystick(s) => Sender::Joystick(JoystickSender::new(s.clone())),
            Spec::Textbox(s) => Sender::Textbox(TextboxSender::new(s.clone())),
            Spec::Dots(s) => Sender::Dots(DotsSender::new(s.clone())),
            Spec::Label(s) => Sender::Label(LabelSender::new(s.clone())),
            Spec::PresetButton(s) => Sender::PresetButton(PresetButtonSender::new(s.clone())),
            Spec::Group(s) => Sender::Group(GroupSender {
                controls: build_children(registry, &s.control_specs)?,
                spec: s.clone(),
            }),
            Spec::Modal(s) => Sender::Modal(ModalSender {
                controls: build_children(registry, &s.control_specs)?,
                spec: s.clone(),
                open: false,
            }),
            Spec::Tabs(s) => {
                let mut pages = IndexMap::with_capacity(s.pages.len());
                for (page_id, specs) in &s.pages {
                    pages.insert(page_id.clone(), build_children(registry, specs)?);
                }
                let active = if s.pages.contains_key(&s.initially_active_id) {
                    s.initially_active_id.clone()
                } else {
                    s.pages.keys().next().cloned().unwrap_or_default()
                };
                Sender::Tabs(TabsSender {
                    spec: s.clone(),
                    pages,
                    active,
                })
            }
        })
    }

    pub fn control_type(&self) -> ControlType {
        match self {
            Sender::Fader(_) => ControlType::Fader,
            Sender::Knob(_) => ControlType::Knob,
            Sender::Cake(_) => ControlType::Cake,
            Sender::Switch(_) => ControlType::Switch,
            Sender::ConfirmSwitch(_) => ControlType::ConfirmSwitch,
            Sender::ConfirmButton(_) => ControlType::ConfirmButton,
            Sender::Pad(_) => ControlType::Pad,
            Sender::Letterbox(_) => ControlType::Letterbox,
            Sender::Selector(_) => ControlType::Selector,
            Sender::Joystick(_) => ControlType::Joystick,
            Sender::Textbox(_) => ControlType::Textbox,
            Sender::Dots(_) => ControlType::Dots,
            Sender::Label(_) => ControlType::Label,
            Sender::PresetButton(_) => ControlType::PresetButton,
            Sender::Group(_) => ControlType::Group,
            Sender::Tabs(_) => ControlType::Tabs,
            Sender::Modal(_) => ControlType::Modal,
        }
    }

    pub fn route(&self, path: &ControlPath) -> Result<&Sender> {
        routing::route(self, path)
    }

    pub fn route_mut(&mut self, path: &ControlPath) -> Result<&mut Sender> {
        routing::route_mut(self, path)
    }

    /// Apply a leaf update payload to this node's mirrored value.
    pub fn handle_update(&mut self, payload: &Value) -> Result<()> {
        match self {
            Sender::Fader(c) | Sender::Knob(c) => c.handle_update(payload),
            Sender::Cake(c) => c.handle_update(payload),
            Sender::Switch(c) => c.handle_update(payload),
            Sender::ConfirmSwitch(c) => c.handle_update(payload),
            Sender::ConfirmButton(c) => c.handle_update(payload),
            Sender::Pad(c) => c.handle_update(payload),
            Sender::Selector(c) => c.handle_update(payload),
            Sender::Joystick(c) => c.handle_update(payload),
            Sender::Textbox(c) => c.handle_update(payload),
            Sender::Dots(c) => c.handle_update(payload),
            Sender::PresetButton(_) => PresetButtonSender::parse_action(payload).map(|_| ()),
            Sender::Letterbox(_) | Sender::Label(_) => {
                debug!("No mirrored value for {}: {}", self.control_type(), payload);
                Ok(())
            }
            Sender::Group(_) | Sender::Tabs(_) | Sender::Modal(_) => {
                Err(ControlError::update(self.control_type(), payload))
            }
        }
    }

    /// Snapshot of this node. Stateless leaves return `None`.
    pub fn state(&self) -> Option<ControlState> {
        match self {
            Sender::Fader(c) | Sender::Knob(c) => Some(c.state()),
            Sender::Switch(c) => Some(ControlState::Bool(c.is_on())),
            Sender::ConfirmSwitch(c) => Some(ControlState::Bool(c.is_on())),
            Sender::Selector(c) => Some(ControlState::Number(c.index() as f64)),
            Sender::Joystick(c) => Some(ControlState::Position(c.position())),
            Sender::Textbox(c) => Some(ControlState::Text(c.text().to_string())),
            Sender::Dots(c) => Some(ControlState::Dots(c.dots().to_vec())),
            Sender::Group(g) => Some(children_state(&g.controls)),
            Sender::Modal(m) => Some(children_state(&m.controls)),
            Sender::Tabs(t) => Some(ControlState::Group(
                t.pages
                    .iter()
                    .map(|(page_id, controls)| (page_id.clone(), children_state(controls)))
                    .collect(),
            )),
            Sender::Cake(_)
            | Sender::ConfirmButton(_)
            | Sender::Pad(_)
            | Sender::Letterbox(_)
            | Sender::Label(_)
            | Sender::PresetButton(_) => None,
        }
    }

    /// Restore a snapshot. Returns the signals, relative to this node, that
    /// bring the panel in line. Mismatched entries are skipped.
    pub fn set_state(&mut self, state: &ControlState) -> Vec<Envelope> {
        let payload = match (&mut *self, state) {
            (Sender::Fader(c) | Sender::Knob(c), s) => c.restore(s),
            (Sender::Switch(c), ControlState::Bool(on)) => Some(c.set_on(*on)),
            (Sender::ConfirmSwitch(c), ControlState::Bool(on)) => Some(c.set_on(*on)),
            (Sender::Selector(c), ControlState::Number(n)) if *n >= 0.0 => {
                c.select(n.round() as usize)
            }
            (Sender::Joystick(c), ControlState::Position(p)) => Some(c.set_position(p.x, p.y)),
            (Sender::Textbox(c), ControlState::Text(text)) => {
                c.set_text(text.clone());
                Some(c.submit())
            }
            (Sender::Dots(c), ControlState::Dots(dots)) => Some(c.set_dots(dots.clone())),
            (Sender::Group(g), ControlState::Group(children)) => {
                return restore_children(&mut g.controls, children);
            }
            (Sender::Modal(m), ControlState::Group(children)) => {
                return restore_children(&mut m.controls, children);
            }
            (Sender::Tabs(t), ControlState::Group(pages)) => {
                let mut signals = Vec::new();
                for (page_id, page_state) in pages {
                    let (Some(controls), ControlState::Group(children)) =
                        (t.pages.get_mut(page_id), page_state)
                    else {
                        continue;
                    };
                    signals.extend(
                        restore_children(controls, children)
                            .into_iter()
                            .map(|s| s.wrap(page_id.clone())),
                    );
                }
                return signals;
            }
            (node, state) => {
                if node.state().is_some() {
                    warn!("Cannot restore {} from {:?}", node.control_type(), state);
                }
                None
            }
        };
        payload.map(Envelope::Leaf).into_iter().collect()
    }

    pub fn as_value(&self) -> Option<&ValueSender> {
        match self {
            Sender::Fader(c) | Sender::Knob(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_value_mut(&mut self) -> Option<&mut ValueSender> {
        match self {
            Sender::Fader(c) | Sender::Knob(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_switch_mut(&mut self) -> Option<&mut SwitchSender> {
        match self {
            Sender::Switch(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_selector_mut(&mut self) -> Option<&mut SelectorSender> {
        match self {
            Sender::Selector(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_joystick_mut(&mut self) -> Option<&mut JoystickSender> {
        match self {
            Sender::Joystick(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_pad_mut(&mut self) -> Option<&mut PadSender> {
        match self {
            Sender::Pad(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_textbox_mut(&mut self) -> Option<&mut TextboxSender> {
        match self {
            Sender::Textbox(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_preset_button(&self) -> Option<&PresetButtonSender> {
        match self {
            Sender::PresetButton(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_preset_button_mut(&mut self) -> Option<&mut PresetButtonSender> {
        match self {
            Sender::PresetButton(c) => Some(c),
            _ => None,
        }
    }
}

impl TreeNode for Sender {
    fn children(&self) -> Children<'_, Self> {
        match self {
            Sender::Group(g) => Children::Flat(&g.controls),
            Sender::Modal(m) => Children::Flat(&m.controls),
            Sender::Tabs(t) => Children::Paged(&t.pages),
            _ => Children::Leaf,
        }
    }

    fn children_mut(&mut self) -> ChildrenMut<'_, Self> {
        match self {
            Sender::Group(g) => ChildrenMut::Flat(&mut g.controls),
            Sender::Modal(m) => ChildrenMut::Flat(&mut m.controls),
            Sender::Tabs(t) => ChildrenMut::Paged(&mut t.pages),
            _ => ChildrenMut::Leaf,
        }
    }
}

fn build_children(registry: &Registry, specs: &SpecsDict) -> Result<IndexMap<String, Sender>> {
    specs
        .iter()
        .map(|(id, spec)| Ok((id.clone(), registry.create_sender(spec)?)))
        .collect()
}

fn children_state(controls: &IndexMap<String, Sender>) -> ControlState {
    ControlState::Group(
        controls
            .iter()
            .filter_map(|(id, c)| c.state().map(|s| (id.clone(), s)))
            .collect(),
    )
}

fn restore_children(
    controls: &mut IndexMap<String, Sender>,
    states: &IndexMap<String, ControlState>,
) -> Vec<Envelope> {
    let mut signals = Vec::new();
    for (id, state) in states {
        match controls.get_mut(id) {
            Some(child) => signals.extend(
                child
                    .set_state(state)
                    .into_iter()
                    .map(|s| s.wrap(id.clone())),
            ),
            None => debug!("Skipping state for missing control '{}'", id),
        }
    }
    signals
}
