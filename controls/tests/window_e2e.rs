//! End-to-end tests of a panel and a controller talking through windows.

use av_controls::types::{ControlPath, Spec, TimelineEdit, TimelineLane, TimelinePoint};
use av_controls::{Controller, Panel, TimelineOptions, Window, WindowTransport};
use serde_json::json;
use std::sync::Arc;

struct Rig {
    controller_window: Arc<Window>,
    panel_window: Arc<Window>,
    panel: Panel,
    controller: Controller,
}

impl Rig {
    fn new() -> Self {
        let controller_window = Window::new("controller");
        let panel_window = Window::new("panel");

        let spec = Spec::from_value(json!({
            "type": "group",
            "name": "root",
            "controlSpecs": {
                "mix": {
                    "type": "group",
                    "name": "mix",
                    "controlSpecs": {
                        "fader": {"type": "fader", "name": "Level", "initialValue": 0, "min": 0, "max": 100}
                    }
                },
                "tabs": {
                    "type": "tabs",
                    "name": "tabs",
                    "pages": {
                        "page1": {"sw": {"type": "switch", "name": "Mute"}}
                    }
                }
            }
        }))
        .unwrap();

        let panel_transport = Arc::new(WindowTransport::new(
            panel_window.clone(),
            controller_window.clone(),
        ));
        let controller_transport = Arc::new(WindowTransport::new(
            controller_window.clone(),
            panel_window.clone(),
        ));

        let panel = Panel::new("demo", spec, panel_transport, TimelineOptions::default()).unwrap();
        let controller = Controller::new(controller_transport);

        Self {
            controller_window,
            panel_window,
            panel,
            controller,
        }
    }

    /// Deliver messages both ways until nothing is left in flight.
    fn pump(&mut self) {
        for _ in 0..8 {
            let mut moved = self.panel_window.dispatch_pending();
            moved += self.panel.poll();
            moved += self.controller_window.dispatch_pending();
            moved += self.controller.poll();
            if moved == 0 {
                return;
            }
        }
    }

    fn connected() -> Self {
        let mut rig = Self::new();
        rig.panel.start().unwrap();
        rig.controller.start().unwrap();
        rig.pump();
        rig
    }
}

fn path(segments: &[&str]) -> ControlPath {
    ControlPath::from(segments)
}

#[test]
fn test_controller_learns_specification() {
    let rig = Rig::connected();
    let spec = rig.controller.specification().unwrap();
    assert_eq!(spec.name, "demo");
    assert_eq!(spec.version, av_controls::types::PROTOCOL_VERSION);
    assert!(rig.controller.control(&path(&["mix", "fader"])).is_ok());
}

#[test]
fn test_fader_round_trip() {
    let mut rig = Rig::connected();
    let fader = path(&["mix", "fader"]);

    rig.controller
        .perform(&fader, |node| node.as_value_mut().map(|f| f.set_norm_value(0.5)))
        .unwrap();
    rig.pump();

    let panel_value = rig.panel.control(&fader).unwrap().as_value().unwrap().value();
    assert_eq!(panel_value, 50.0);
    let mirrored = rig.controller.control(&fader).unwrap().as_value().unwrap().value();
    assert_eq!(mirrored, 50.0);
}

#[test]
fn test_signal_reaches_control_inside_tabs() {
    let mut rig = Rig::connected();
    let switch = path(&["tabs", "page1", "sw"]);

    rig.controller
        .perform(&switch, |node| node.as_switch_mut().map(|s| s.set_on(true)))
        .unwrap();
    rig.pump();

    assert!(rig.panel.control(&switch).unwrap().as_switch().unwrap().is_on());
}

#[test]
fn test_automation_moves_controller_mirror() {
    let mut rig = Rig::connected();
    let fader = path(&["mix", "fader"]);

    rig.controller
        .edit_timeline(TimelineEdit::AddLane {
            path: fader.clone(),
            lane: TimelineLane::new("value").with_points(vec![
                TimelinePoint::anchor(0.0, 0.0),
                TimelinePoint::anchor(10.0, 100.0),
            ]),
        })
        .unwrap();
    rig.controller
        .edit_timeline(TimelineEdit::SetControlEnabled {
            path: fader.clone(),
            enabled: true,
        })
        .unwrap();
    rig.controller
        .edit_timeline(TimelineEdit::Seek { time: 2.5 })
        .unwrap();
    rig.pump();

    let mirrored = rig.controller.control(&fader).unwrap().as_value().unwrap().value();
    assert_eq!(mirrored, 25.0);
    assert_eq!(rig.controller.timeline().time, 2.5);
    assert!(rig.controller.timeline().control(&fader).unwrap().enabled);
}

#[test]
fn test_stale_timeline_echo_is_suppressed() {
    let mut rig = Rig::connected();
    let fader = path(&["mix", "fader"]);
    rig.controller
        .edit_timeline(TimelineEdit::AddLane {
            path: fader.clone(),
            lane: TimelineLane::new("value"),
        })
        .unwrap();
    rig.pump();

    let a = vec![TimelinePoint::anchor(0.0, 10.0)];
    let b = vec![TimelinePoint::anchor(0.0, 20.0)];
    rig.controller
        .set_lane_points(fader.clone(), "value", a)
        .unwrap();
    rig.controller
        .set_lane_points(fader.clone(), "value", b.clone())
        .unwrap();

    // the panel answers each edit with a snapshot; the first one is stale
    rig.pump();

    let lane = rig
        .controller
        .timeline()
        .control(&fader)
        .and_then(|c| c.lane("value"))
        .cloned()
        .unwrap();
    assert_eq!(lane.points, b);
    assert!(!rig.controller.timeline_client().has_pending(&fader, "value"));
}

#[test]
fn test_unknown_signal_does_not_break_session() {
    let mut rig = Rig::connected();
    rig.controller
        .signal(&path(&["mix", "missing"]), json!({"value": 1}))
        .unwrap();
    rig.pump();

    let fader = path(&["mix", "fader"]);
    rig.controller
        .perform(&fader, |node| node.as_value_mut().map(|f| f.set_value(12.0)))
        .unwrap();
    rig.pump();
    assert_eq!(
        rig.panel.control(&fader).unwrap().as_value().unwrap().value(),
        12.0
    );
}
