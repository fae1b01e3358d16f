//! Render loop scheduling.
//!
//! Host-agnostic: the caller feeds monotonic instants and renders whenever
//! [`FrameLoop::next_frame`] hands back a delta.

use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct FrameLoop {
    running: bool,
    render_requested: bool,
    debounce: Duration,
    render_due: Option<Instant>,
    last_frame: Option<Instant>,
}

impl FrameLoop {
    pub fn new(debounce: Duration) -> Self {
        Self {
            running: false,
            render_requested: false,
            debounce,
            render_due: None,
            last_frame: None,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.render_requested = true;
    }

    /// Cancel upcoming frames.
    pub fn stop(&mut self) {
        self.running = false;
        self.render_requested = false;
        self.render_due = None;
        self.last_frame = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Render one frame even when idle.
    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    /// A control changed by hand. Bursts inside the debounce window collapse
    /// into a single render once the window has passed.
    pub fn control_changed(&mut self, now: Instant) {
        self.render_due = Some(now + self.debounce);
    }

    /// When a debounced render will fire, if one is armed.
    pub fn render_due(&self) -> Option<Instant> {
        self.render_due
    }

    /// Whether a frame is due at `now`, and the time since the previous one.
    ///
    /// The loop stays armed while `playing` or `always_render`. An idle loop
    /// forgets its previous frame, so the first delta after a pause is zero.
    pub fn next_frame(&mut self, now: Instant, playing: bool, always_render: bool) -> Option<Duration> {
        if !self.running {
            return None;
        }

        let debounced = self.render_due.is_some_and(|due| now >= due);
        if !(playing || always_render || self.render_requested || debounced) {
            self.last_frame = None;
            return None;
        }

        if debounced {
            trace!("Debounced render");
            self.render_due = None;
        }
        self.render_requested = false;

        let dt = self
            .last_frame
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);
        self.last_frame = if playing || always_render {
            Some(now)
        } else {
            None
        };
        Some(dt)
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}
