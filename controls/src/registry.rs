//! Discriminant -> constructor table for both roles.

use crate::error::Result;
use crate::receiver::Receiver;
use crate::sender::Sender;
use av_controls_types::{ControlType, Spec, UnknownControlType};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

pub type ReceiverConstructor = fn(&Registry, &Spec) -> Result<Receiver>;
pub type SenderConstructor = fn(&Registry, &Spec) -> Result<Sender>;

/// Maps each control type to the constructors used to build its nodes.
///
/// Containers build their children through the same registry, so a registry
/// missing a type fails construction of any tree that uses it.
#[derive(Clone, Default)]
pub struct Registry {
    receivers: HashMap<ControlType, ReceiverConstructor>,
    senders: HashMap<ControlType, SenderConstructor>,
}

impl Registry {
    /// An empty registry. Every construction fails until types are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in control type, built once per process.
    pub fn standard() -> &'static Registry {
        static STANDARD: OnceLock<Registry> = OnceLock::new();
        STANDARD.get_or_init(|| {
            let mut registry = Registry::new();
            for control_type in ControlType::ALL {
                registry.register(control_type, Receiver::build, Sender::build);
            }
            registry
        })
    }

    pub fn register(
        &mut self,
        control_type: ControlType,
        receiver: ReceiverConstructor,
        sender: SenderConstructor,
    ) {
        self.receivers.insert(control_type, receiver);
        self.senders.insert(control_type, sender);
    }

    pub fn contains(&self, control_type: ControlType) -> bool {
        self.receivers.contains_key(&control_type)
    }

    pub fn create_receiver(&self, spec: &Spec) -> Result<Receiver> {
        let control_type = spec.control_type();
        let constructor = self
            .receivers
            .get(&control_type)
            .ok_or_else(|| UnknownControlType(control_type.to_string()))?;
        constructor(self, spec)
    }

    pub fn create_sender(&self, spec: &Spec) -> Result<Sender> {
        let control_type = spec.control_type();
        let constructor = self
            .senders
            .get(&control_type)
            .ok_or_else(|| UnknownControlType(control_type.to_string()))?;
        constructor(self, spec)
    }

    pub fn create_receiver_from_value(&self, value: Value) -> Result<Receiver> {
        let spec = Spec::from_value(value)?;
        self.create_receiver(&spec)
    }

    pub fn create_sender_from_value(&self, value: Value) -> Result<Sender> {
        let spec = Spec::from_value(value)?;
        self.create_sender(&spec)
    }
}
