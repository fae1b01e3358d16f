//! Visual-side control nodes.
//!
//! A [`Receiver`] tree mirrors a [`Spec`] tree. Signals arrive wrapped along
//! the target path, are routed to one leaf, validated there and answered with
//! an update wrapped along the same path.

mod leaf;

pub use leaf::{
    Callback, CakeReceiver, ConfirmButtonReceiver, DotsReceiver, JoystickReceiver,
    LabelReceiver, LetterboxReceiver, PadReceiver, PresetButtonReceiver, SelectorReceiver,
    SwitchReceiver, TextboxReceiver, ValueReceiver, CAKE_THROTTLE,
};

use crate::error::{ControlError, Result};
use crate::registry::Registry;
use crate::routing::{self, Children, ChildrenMut, TreeNode};
use av_controls_types::{
    ControlPath, ControlType, Envelope, GroupSpec, ModalSpec, Spec, SpecsDict, TabsSpec,
};
use indexmap::IndexMap;
use serde_json::{json, Value};

pub struct GroupReceiver {
    pub spec: GroupSpec,
    pub controls: IndexMap<String, Receiver>,
}

pub struct ModalReceiver {
    pub spec: ModalSpec,
    pub controls: IndexMap<String, Receiver>,
}

pub struct TabsReceiver {
    pub spec: TabsSpec,
    pub pages: IndexMap<String, IndexMap<String, Receiver>>,
}

/// A visual-side control node.
pub enum Receiver {
    Fader(ValueReceiver),
    Knob(ValueReceiver),
    Cake(CakeReceiver),
    Switch(SwitchReceiver),
    ConfirmSwitch(SwitchReceiver),
    ConfirmButton(ConfirmButtonReceiver),
    Pad(PadReceiver),
    Letterbox(LetterboxReceiver),
    Selector(SelectorReceiver),
    Joystick(JoystickReceiver),
    Textbox(TextboxReceiver),
    Dots(DotsReceiver),
    Label(LabelReceiver),
    PresetButton(PresetButtonReceiver),
    Group(GroupReceiver),
    Tabs(TabsReceiver),
    Modal(ModalReceiver),
}

impl Receiver {
    /// Build a tree with the standard registry.
    pub fn from_spec(spec: &Spec) -> Result<Self> {
        Registry::standard().create_receiver(spec)
    }

    /// Build a tree from raw JSON, rejecting unknown `type` discriminants.
    pub fn from_value(value: Value) -> Result<Self> {
        Registry::standard().create_receiver_from_value(value)
    }

    /// Constructor used by the standard registry for every discriminant.
    pub(crate) fn build(registry: &Registry, spec: &Spec) -> Result<Self> {
        Ok(match spec {
            Spec::Fader(s) => Receiver::Fader(ValueReceiver::new(ControlType::Fader, s.clone())),
            Spec::Knob(s) => Receiver::Knob(ValueReceiver::new(ControlType::Knob, s.clone())),
            Spec::Cake(s) => Receiver::Cake(CakeReceiver::new(s.clone())),
            Spec::Switch(s) => {
                Receiver::Switch(SwitchReceiver::new(ControlType::Switch, s.clone()))
            }
            Spec::ConfirmSwitch(s) => Receiver::ConfirmSwitch(SwitchReceiver::new(
                ControlType::ConfirmSwitch,
                s.clone(),
            )),
            Spec::ConfirmButton(s) => {
                Receiver::ConfirmButton(ConfirmButtonReceiver::new(s.clone()))
            }
            Spec::Pad(s) => Receiver::Pad(PadReceiver::new(s.clone())),
            Spec::Letterbox(s) => Receiver::Letterbox(LetterboxReceiver::new(s.clone())),
            Spec::Selector(s) => Receiver::Selector(SelectorReceiver::new(s.clone())),
            Spec::Joystick(s) => Receiver::Joystick(JoystickReceiver::new(s.clone())),
            Spec::Textbox(s) => Receiver::Textbox(TextboxReceiver::new(s.clone())),
            Spec::Dots(s) => Receiver::Dots(DotsReceiver::new(s.clone())),
            Spec::Label(s) => Receiver::Label(LabelReceiver::new(s.clone())),
            Spec::PresetButton(s) => Receiver::PresetButton(PresetButtonReceiver::new(s.clone())),
            Spec::Group(s) => Receiver::Group(GroupReceiver {
                controls: build_children(registry, &s.control_specs)?,
                spec: s.clone(),
            }),
            Spec::Modal(s) => Receiver::Modal(ModalReceiver {
                controls: build_children(registry, &s.control_specs)?,
                spec: s.clone(),
            }),
            Spec::Tabs(s) => {
                let mut pages = IndexMap::with_capacity(s.pages.len());
                for (page_id, specs) in &s.pages {
                    pages.insert(page_id.clone(), build_children(registry, specs)?);
                }
                Receiver::Tabs(TabsReceiver {
                    spec: s.clone(),
                    pages,
                })
            }
        })
    }

    pub fn control_type(&self) -> ControlType {
        match self {
            Receiver::Fader(_) => ControlType::Fader,
            Receiver::Knob(_) => ControlType::Knob,
            Receiver::Cake(_) => ControlType::Cake,
            Receiver::Switch(_) => ControlType::Switch,
            Receiver::ConfirmSwitch(_) => ControlType::ConfirmSwitch,
            Receiver::ConfirmButton(_) => ControlType::ConfirmButton,
            Receiver::Pad(_) => ControlType::Pad,
            Receiver::Letterbox(_) => ControlType::Letterbox,
            Receiver::Selector(_) => ControlType::Selector,
            Receiver::Joystick(_) => ControlType::Joystick,
            Receiver::Textbox(_) => ControlType::Textbox,
            Receiver::Dots(_) => ControlType::Dots,
            Receiver::Label(_) => ControlType::Label,
            Receiver::PresetButton(_) => ControlType::PresetButton,
            Receiver::Group(_) => ControlType::Group,
            Receiver::Tabs(_) => ControlType::Tabs,
            Receiver::Modal(_) => ControlType::Modal,
        }
    }

    /// Route a wrapped signal to its leaf and apply it.
    ///
    /// Returns the leaf's update wrapped along the same path, or `None` for
    /// controls that ignore signals.
    pub fn handle_signal(&mut self, signal: &Envelope) -> Result<Option<Envelope>> {
        let (path, payload) = signal.clone().unwrap_path();
        let target = routing::route_mut(self, &path)?;
        let update = target.apply_signal(&payload)?;
        Ok(update.map(|u| Envelope::wrap_path(&path, u)))
    }

    /// Validate and apply a leaf payload to this node.
    pub fn apply_signal(&mut self, payload: &Value) -> Result<Option<Value>> {
        let update = match self {
            Receiver::Fader(c) | Receiver::Knob(c) => c.apply(payload)?,
            Receiver::Switch(c) | Receiver::ConfirmSwitch(c) => c.apply(payload)?,
            Receiver::ConfirmButton(c) => c.apply(payload)?,
            Receiver::Pad(c) => c.apply(payload)?,
            Receiver::Letterbox(c) => c.apply(payload)?,
            Receiver::Selector(c) => c.apply(payload)?,
            Receiver::Joystick(c) => c.apply(payload)?,
            Receiver::Textbox(c) => c.apply(payload)?,
            Receiver::Dots(c) => c.apply(payload)?,
            Receiver::Cake(_) | Receiver::Label(_) | Receiver::PresetButton(_) => {
                leaf::ignore_signal(self.control_type(), payload);
                return Ok(None);
            }
            Receiver::Group(_) | Receiver::Tabs(_) | Receiver::Modal(_) => {
                return Err(ControlError::signal(self.control_type(), payload));
            }
        };
        Ok(Some(update))
    }

    /// Current runtime value in update form, for leaves that hold one.
    pub fn current_value(&self) -> Option<Value> {
        match self {
            Receiver::Fader(c) | Receiver::Knob(c) => Some(json!({ "value": c.value() })),
            Receiver::Cake(c) => Some(json!({ "value": c.value() })),
            Receiver::Switch(c) | Receiver::ConfirmSwitch(c) => Some(json!({ "on": c.is_on() })),
            Receiver::Selector(c) => Some(json!({ "index": c.index() })),
            Receiver::Joystick(c) => {
                let p = c.position();
                Some(json!({ "x": p.x, "y": p.y }))
            }
            Receiver::Textbox(c) => Some(json!({ "text": c.text() })),
            Receiver::Dots(c) => Some(json!({ "values": c.dots() })),
            Receiver::Pad(c) => Some(json!({ "pressed": c.is_pressed() })),
            _ => None,
        }
    }

    /// Find a node below this one.
    pub fn route(&self, path: &ControlPath) -> Result<&Receiver> {
        routing::route(self, path)
    }

    pub fn route_mut(&mut self, path: &ControlPath) -> Result<&mut Receiver> {
        routing::route_mut(self, path)
    }

    pub fn as_value(&self) -> Option<&ValueReceiver> {
        match self {
            Receiver::Fader(c) | Receiver::Knob(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_value_mut(&mut self) -> Option<&mut ValueReceiver> {
        match self {
            Receiver::Fader(c) | Receiver::Knob(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<&SwitchReceiver> {
        match self {
            Receiver::Switch(c) | Receiver::ConfirmSwitch(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_switch_mut(&mut self) -> Option<&mut SwitchReceiver> {
        match self {
            Receiver::Switch(c) | Receiver::ConfirmSwitch(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_selector(&self) -> Option<&SelectorReceiver> {
        match self {
            Receiver::Selector(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_joystick(&self) -> Option<&JoystickReceiver> {
        match self {
            Receiver::Joystick(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_pad_mut(&mut self) -> Option<&mut PadReceiver> {
        match self {
            Receiver::Pad(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_cake_mut(&mut self) -> Option<&mut CakeReceiver> {
        match self {
            Receiver::Cake(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_preset_button(&self) -> Option<&PresetButtonReceiver> {
        match self {
            Receiver::PresetButton(c) => Some(c),
            _ => None,
        }
    }
}

impl TreeNode for Receiver {
    fn children(&self) -> Children<'_, Self> {
        match self {
            Receiver::Group(g) => Children::Flat(&g.controls),
            Receiver::Modal(m) => Children::Flat(&m.controls),
            Receiver::Tabs(t) => Children::Paged(&t.pages),
            _ => Children::Leaf,
        }
    }

    fn children_mut(&mut self) -> ChildrenMut<'_, Self> {
        match self {
            Receiver::Group(g) => ChildrenMut::Flat(&mut g.controls),
            Receiver::Modal(m) => ChildrenMut::Flat(&mut m.controls),
            Receiver::Tabs(t) => ChildrenMut::Paged(&mut t.pages),
            _ => ChildrenMut::Leaf,
        }
    }
}

fn build_children(registry: &Registry, specs: &SpecsDict) -> Result<IndexMap<String, Receiver>> {
    specs
        .iter()
        .map(|(id, spec)| Ok((id.clone(), registry.create_receiver(spec)?)))
        .collect()
}
