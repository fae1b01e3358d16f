//! Named snapshots of a container's state.

use crate::error::{ControlError, Result};
use crate::state::ControlState;
use av_controls_types::{ControlType, PresetButtonSpec};
use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use serde_json::Value;

/// Preset request coming back from the visual side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetAction {
    Next,
    Random,
}

/// Holds presets of its parent container. The parent is addressed by path
/// (the button's path without its last segment).
#[derive(Debug, Clone)]
pub struct PresetButtonSender {
    pub spec: PresetButtonSpec,
    presets: IndexMap<String, ControlState>,
    current: Option<String>,
}

impl PresetButtonSender {
    pub fn new(spec: PresetButtonSpec) -> Self {
        Self {
            spec,
            presets: IndexMap::new(),
            current: None,
        }
    }

    /// Store a snapshot under `name`, replacing any previous one.
    pub fn save(&mut self, name: impl Into<String>, state: ControlState) {
        let name = name.into();
        self.presets.insert(name.clone(), state);
        self.current = Some(name);
    }

    /// Snapshot stored under `name`; marks it as current.
    pub fn load(&mut self, name: &str) -> Option<&ControlState> {
        let state = self.presets.get(name)?;
        self.current = Some(name.to_string());
        Some(state)
    }

    pub fn delete(&mut self, name: &str) -> bool {
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        self.presets.shift_remove(name).is_some()
    }

    /// Preset names in save order.
    pub fn names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Name following the current preset, wrapping at the end.
    pub fn next_in_row(&self) -> Option<String> {
        if self.presets.is_empty() {
            return None;
        }
        let next = match self
            .current
            .as_deref()
            .and_then(|c| self.presets.get_index_of(c))
        {
            Some(i) => (i + 1) % self.presets.len(),
            None => 0,
        };
        self.presets.get_index(next).map(|(name, _)| name.clone())
    }

    /// A random preset name.
    pub fn random(&self) -> Option<String> {
        let names = self.names();
        names.choose(&mut rand::rng()).cloned()
    }

    /// Presets replace the whole set, e.g. when restored from elsewhere.
    pub fn set_presets(&mut self, presets: IndexMap<String, ControlState>) {
        self.presets = presets;
        self.current = None;
    }

    pub fn presets(&self) -> &IndexMap<String, ControlState> {
        &self.presets
    }

    pub(crate) fn parse_action(payload: &Value) -> Result<PresetAction> {
        #[derive(Deserialize)]
        struct Update {
            action: PresetAction,
        }
        Update::deserialize(payload)
            .map(|u| u.action)
            .map_err(|_| ControlError::update(ControlType::PresetButton, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn button() -> PresetButtonSender {
        let mut b = PresetButtonSender::new(PresetButtonSpec::default());
        b.save("a", ControlState::Number(1.0));
        b.save("b", ControlState::Number(2.0));
        b.save("c", ControlState::Number(3.0));
        b
    }

    #[test]
    fn test_next_in_row_wraps() {
        let mut b = button();
        assert_eq!(b.current(), Some("c"));
        assert_eq!(b.next_in_row().as_deref(), Some("a"));
        b.load("a");
        assert_eq!(b.next_in_row().as_deref(), Some("b"));
    }

    #[test]
    fn test_delete_clears_current() {
        let mut b = button();
        assert!(b.delete("c"));
        assert!(!b.delete("c"));
        assert_eq!(b.current(), None);
        assert_eq!(b.names(), vec!["a", "b"]);
        assert_eq!(b.next_in_row().as_deref(), Some("a"));
    }

    #[test]
    fn test_random_picks_existing_name() {
        let b = button();
        let name = b.random().unwrap();
        assert!(b.names().contains(&name));
        assert!(PresetButtonSender::new(PresetButtonSpec::default())
            .random()
            .is_none());
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(
            PresetButtonSender::parse_action(&json!({"action": "random"})).unwrap(),
            PresetAction::Random
        );
        assert!(PresetButtonSender::parse_action(&json!({"action": "jump"})).is_err());
    }
}
