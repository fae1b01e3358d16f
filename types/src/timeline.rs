//! Timeline automation state and edits.

use crate::path::ControlPath;
use serde::{Deserialize, Serialize};

/// Role of a keyframe point in a curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointKind {
    /// Curve passes through the point. Older clients send `pos`.
    #[default]
    #[serde(alias = "pos")]
    Anchor,
    /// Bezier control point between two anchors
    Handle,
}

/// One keyframe: value `v` at time `t` (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub t: f64,
    pub v: f64,
    #[serde(default)]
    pub kind: PointKind,
}

impl TimelinePoint {
    pub fn anchor(t: f64, v: f64) -> Self {
        Self {
            t,
            v,
            kind: PointKind::Anchor,
        }
    }

    pub fn handle(t: f64, v: f64) -> Self {
        Self {
            t,
            v,
            kind: PointKind::Handle,
        }
    }

    pub fn is_anchor(&self) -> bool {
        self.kind == PointKind::Anchor
    }
}

/// Sort points by time in place. Equal times keep their relative order.
pub fn sort_points(points: &mut [TimelinePoint]) {
    points.sort_by(|a, b| a.t.total_cmp(&b.t));
}

/// A keyed curve driving one signal field of a control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineLane {
    pub key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub points: Vec<TimelinePoint>,
    /// Sequence number of the edit that last replaced the points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

impl TimelineLane {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            enabled: true,
            points: Vec::new(),
            sequence_number: None,
        }
    }

    pub fn with_points(mut self, points: Vec<TimelinePoint>) -> Self {
        self.points = points;
        self
    }
}

fn default_true() -> bool {
    true
}

/// Automation for one control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineControl {
    pub path: ControlPath,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub manual_override: bool,
    #[serde(default)]
    pub lanes: Vec<TimelineLane>,
}

impl TimelineControl {
    /// Fresh automation for a path. Enabled, so a lane takes effect as soon
    /// as it has points.
    pub fn new(path: ControlPath) -> Self {
        Self {
            path,
            enabled: true,
            manual_override: false,
            lanes: Vec::new(),
        }
    }

    pub fn lane(&self, key: &str) -> Option<&TimelineLane> {
        self.lanes.iter().find(|l| l.key == key)
    }

    pub fn lane_mut(&mut self, key: &str) -> Option<&mut TimelineLane> {
        self.lanes.iter_mut().find(|l| l.key == key)
    }

    /// Automation is applied only when enabled and not taken over by a human.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.manual_override
    }
}

/// Serializable snapshot of the whole engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineState {
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub playing: bool,
    #[serde(default)]
    pub always_render: bool,
    #[serde(default)]
    pub controls: Vec<TimelineControl>,
}

impl TimelineState {
    pub fn control(&self, path: &ControlPath) -> Option<&TimelineControl> {
        self.controls.iter().find(|c| &c.path == path)
    }

    pub fn control_mut(&mut self, path: &ControlPath) -> Option<&mut TimelineControl> {
        self.controls.iter_mut().find(|c| &c.path == path)
    }
}

/// Edits a controller can apply to a panel's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum TimelineEdit {
    SetControlEnabled {
        path: ControlPath,
        enabled: bool,
    },
    SetLaneEnabled {
        path: ControlPath,
        lane_key: String,
        enabled: bool,
    },
    /// Full replacement of a lane's points
    SetLanePoints {
        path: ControlPath,
        lane_key: String,
        points: Vec<TimelinePoint>,
    },
    AddLane {
        path: ControlPath,
        lane: TimelineLane,
    },
    RemoveLane {
        path: ControlPath,
        lane_key: String,
    },
    SetPlaying {
        playing: bool,
    },
    Seek {
        time: f64,
    },
    SetAlwaysRender {
        always_render: bool,
    },
}

impl TimelineEdit {
    /// Wire discriminant of the edit.
    pub fn kind(&self) -> &'static str {
        match self {
            TimelineEdit::SetControlEnabled { .. } => "set-control-enabled",
            TimelineEdit::SetLaneEnabled { .. } => "set-lane-enabled",
            TimelineEdit::SetLanePoints { .. } => "set-lane-points",
            TimelineEdit::AddLane { .. } => "add-lane",
            TimelineEdit::RemoveLane { .. } => "remove-lane",
            TimelineEdit::SetPlaying { .. } => "set-playing",
            TimelineEdit::Seek { .. } => "seek",
            TimelineEdit::SetAlwaysRender { .. } => "set-always-render",
        }
    }

    /// Control addressed by the edit, if any.
    pub fn path(&self) -> Option<&ControlPath> {
        match self {
            TimelineEdit::SetControlEnabled { path, .. }
            | TimelineEdit::SetLaneEnabled { path, .. }
            | TimelineEdit::SetLanePoints { path, .. }
            | TimelineEdit::AddLane { path, .. }
            | TimelineEdit::RemoveLane { path, .. } => Some(path),
            TimelineEdit::SetPlaying { .. }
            | TimelineEdit::Seek { .. }
            | TimelineEdit::SetAlwaysRender { .. } => None,
        }
    }
}
