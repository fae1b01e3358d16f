//! Controller-side mirror of a panel's timeline.
//!
//! Lane point edits are optimistic: the client keeps its own copy of a lane
//! from the moment it sends new points until a snapshot tags that lane with
//! the edit's sequence number or a later one, so a stale broadcast never
//! overwrites newer local points.

use av_controls_types::timeline::sort_points;
use av_controls_types::{ControlPath, Message, TimelineEdit, TimelinePoint, TimelineState};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Points sent for a lane, waiting for their echo.
#[derive(Debug, Clone)]
struct PendingEdit {
    seq: u64,
    points: Vec<TimelinePoint>,
}

#[derive(Debug, Clone, Default)]
pub struct TimelineClient {
    state: TimelineState,
    pending: HashMap<(ControlPath, String), PendingEdit>,
    next_seq: u64,
}

impl TimelineClient {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            ..Default::default()
        }
    }

    /// Start minting sequence numbers at `seq`.
    pub fn starting_at(seq: u64) -> Self {
        Self {
            next_seq: seq,
            ..Default::default()
        }
    }

    /// Local view of the timeline.
    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    pub fn has_pending(&self, path: &ControlPath, lane_key: &str) -> bool {
        self.pending
            .contains_key(&(path.clone(), lane_key.to_string()))
    }

    /// Replace a lane's points locally and build the tagged edit to send.
    pub fn set_lane_points(
        &mut self,
        path: ControlPath,
        lane_key: impl Into<String>,
        mut points: Vec<TimelinePoint>,
    ) -> Message {
        let lane_key = lane_key.into();
        sort_points(&mut points);

        let seq = self.next_seq;
        self.next_seq += 1;

        match self
            .state
            .control_mut(&path)
            .and_then(|c| c.lane_mut(&lane_key))
        {
            Some(lane) => {
                lane.points = points.clone();
                self.pending.insert(
                    (path.clone(), lane_key.clone()),
                    PendingEdit {
                        seq,
                        points: points.clone(),
                    },
                );
            }
            // the panel ignores points for a lane it does not have either
            None => {
                self.pending.remove(&(path.clone(), lane_key.clone()));
            }
        }
        trace!("Sending points for [{}] '{}' (seq {})", path, lane_key, seq);

        Message::TimelineEdit {
            edit: TimelineEdit::SetLanePoints {
                path,
                lane_key,
                points,
            },
            seq: Some(seq),
        }
    }

    /// Build any other edit. Lane point edits go through
    /// [`set_lane_points`](Self::set_lane_points) so they get tagged.
    pub fn edit(&mut self, edit: TimelineEdit) -> Message {
        match edit {
            TimelineEdit::SetLanePoints {
                path,
                lane_key,
                points,
            } => self.set_lane_points(path, lane_key, points),
            edit => Message::TimelineEdit { edit, seq: None },
        }
    }

    pub fn request_state(&self) -> Message {
        Message::TimelineRequestState
    }

    /// Adopt a snapshot from the panel, keeping local copies of lanes with
    /// edits still in flight.
    pub fn apply_snapshot(&mut self, mut incoming: TimelineState) {
        let mut settled = Vec::new();
        for ((path, lane_key), pending) in &self.pending {
            let Some(lane) = incoming
                .control_mut(path)
                .and_then(|c| c.lane_mut(lane_key))
            else {
                trace!("Lane [{}] '{}' is gone, dropping local points", path, lane_key);
                settled.push((path.clone(), lane_key.clone()));
                continue;
            };
            if lane.sequence_number.is_some_and(|seq| seq >= pending.seq) {
                settled.push((path.clone(), lane_key.clone()));
            } else {
                lane.points = pending.points.clone();
            }
        }
        for key in settled {
            debug!("Edit for [{}] '{}' settled", key.0, key.1);
            self.pending.remove(&key);
        }
        self.state = incoming;
    }

    /// Feed an incoming message. Returns true when it was a timeline snapshot.
    pub fn handle_message(&mut self, message: &Message) -> bool {
        match message {
            Message::TimelineState { state } => {
                self.apply_snapshot(state.clone());
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use av_controls_types::{TimelineControl, TimelineLane};

    fn path() -> ControlPath {
        ControlPath::from(["g", "fader1"])
    }

    fn snapshot(x_points: Vec<TimelinePoint>, seq: Option<u64>) -> TimelineState {
        let mut x = TimelineLane::new("x").with_points(x_points);
        x.sequence_number = seq;
        TimelineState {
            controls: vec![TimelineControl {
                path: path(),
                enabled: true,
                manual_override: false,
                lanes: vec![x, TimelineLane::new("y")],
            }],
            ..Default::default()
        }
    }

    fn lane_points(client: &TimelineClient, key: &str) -> Vec<TimelinePoint> {
        client
            .state()
            .control(&path())
            .and_then(|c| c.lane(key))
            .map(|l| l.points.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut client = TimelineClient::starting_at(7);
        let first = client.set_lane_points(path(), "x", Vec::new());
        let second = client.set_lane_points(path(), "x", Vec::new());
        assert!(matches!(first, Message::TimelineEdit { seq: Some(7), .. }));
        assert!(matches!(second, Message::TimelineEdit { seq: Some(8), .. }));
    }

    #[test]
    fn test_stale_echo_does_not_overwrite_newer_points() {
        let a = vec![TimelinePoint::anchor(0.0, 1.0)];
        let b = vec![TimelinePoint::anchor(0.0, 2.0)];

        let mut client = TimelineClient::starting_at(7);
        client.apply_snapshot(snapshot(Vec::new(), None));
        client.set_lane_points(path(), "x", a.clone());
        client.set_lane_points(path(), "x", b.clone());

        // the panel echoes seq 7 with A
        client.apply_snapshot(snapshot(a.clone(), Some(7)));
        assert_eq!(lane_points(&client, "x"), b);
        assert!(client.has_pending(&path(), "x"));

        // and then seq 8 with B
        client.apply_snapshot(snapshot(b.clone(), Some(8)));
        assert_eq!(lane_points(&client, "x"), b);
        assert!(!client.has_pending(&path(), "x"));

        // with nothing pending the snapshot wins
        client.apply_snapshot(snapshot(a.clone(), Some(8)));
        assert_eq!(lane_points(&client, "x"), a);
    }

    #[test]
    fn test_other_lanes_adopt_snapshot() {
        let mut client = TimelineClient::new();
        client.apply_snapshot(snapshot(Vec::new(), None));
        client.set_lane_points(path(), "x", vec![TimelinePoint::anchor(0.0, 5.0)]);

        let mut incoming = snapshot(Vec::new(), None);
        incoming.controls[0].lanes[1].points = vec![TimelinePoint::anchor(1.0, 1.0)];
        client.apply_snapshot(incoming);

        assert_eq!(lane_points(&client, "x"), vec![TimelinePoint::anchor(0.0, 5.0)]);
        assert_eq!(lane_points(&client, "y"), vec![TimelinePoint::anchor(1.0, 1.0)]);
    }

    #[test]
    fn test_points_for_unknown_lane_are_not_held() {
        let mut client = TimelineClient::new();
        let message = client.set_lane_points(path(), "x", vec![TimelinePoint::anchor(0.0, 99.0)]);
        assert!(matches!(message, Message::TimelineEdit { seq: Some(1), .. }));
        assert!(!client.has_pending(&path(), "x"));

        let panel_points = vec![TimelinePoint::anchor(0.0, 1.0)];
        for _ in 0..3 {
            client.apply_snapshot(snapshot(panel_points.clone(), None));
            assert_eq!(lane_points(&client, "x"), panel_points);
        }
    }

    #[test]
    fn test_lane_removed_by_panel_drops_pending() {
        let mut client = TimelineClient::new();
        client.apply_snapshot(snapshot(Vec::new(), None));
        client.set_lane_points(path(), "x", vec![TimelinePoint::anchor(0.0, 3.0)]);
        assert!(client.has_pending(&path(), "x"));

        let mut without_x = snapshot(Vec::new(), None);
        without_x.controls[0].lanes.remove(0);
        client.apply_snapshot(without_x);
        assert!(!client.has_pending(&path(), "x"));

        // the lane comes back later with the panel's points
        let restored = vec![TimelinePoint::anchor(2.0, 2.0)];
        client.apply_snapshot(snapshot(restored.clone(), None));
        assert_eq!(lane_points(&client, "x"), restored);
    }

    #[test]
    fn test_later_sequence_number_settles_pending() {
        let mut client = TimelineClient::starting_at(3);
        client.apply_snapshot(snapshot(Vec::new(), None));
        client.set_lane_points(path(), "x", vec![TimelinePoint::anchor(0.0, 3.0)]);

        // another client's edit overtook ours
        let theirs = vec![TimelinePoint::anchor(0.0, 40.0)];
        client.apply_snapshot(snapshot(theirs.clone(), Some(12)));
        assert!(!client.has_pending(&path(), "x"));
        assert_eq!(lane_points(&client, "x"), theirs);

        client.apply_snapshot(snapshot(Vec::new(), Some(12)));
        assert!(lane_points(&client, "x").is_empty());
    }
}
