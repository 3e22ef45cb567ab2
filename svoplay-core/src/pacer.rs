//! Fixed-rate frame pacing
//!
//! Playback runs off a 30 fps reference scaled by the configured speed.
//! The pacer only answers "is it time for another frame?"; the session
//! moves the clock forward once a grab actually succeeds, so a failed grab
//! never buys a burst of catch-up frames later.

use crate::config::MIN_PLAYBACK_SPEED;

/// Reference rate that a playback speed of 1.0 maps to
pub const BASE_FRAME_RATE: f64 = 30.0;

/// Tolerance for float rounding in host timestamps such as `k / 60.0`.
/// The pacing rule is still `now - last >= 1 / (30 * speed)`.
const PACING_EPSILON: f64 = 1e-9;

/// Seconds between frames at the given speed
pub fn frame_interval(playback_speed: f64) -> f64 {
    1.0 / (BASE_FRAME_RATE * playback_speed.max(MIN_PLAYBACK_SPEED))
}

/// Monotonic reading (seconds) of the last accepted frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PacingClock {
    last_frame: f64,
}

impl PacingClock {
    pub fn starting_at(now: f64) -> Self {
        Self { last_frame: now }
    }

    pub fn last_frame(&self) -> f64 {
        self.last_frame
    }
}

#[derive(Debug, Clone, Default)]
pub struct FramePacer {
    clock: PacingClock,
}

impl FramePacer {
    pub fn new(clock: PacingClock) -> Self {
        Self { clock }
    }

    /// True once a full frame interval has elapsed since the last accepted frame
    pub fn should_advance(&self, now: f64, playback_speed: f64) -> bool {
        now - self.clock.last_frame + PACING_EPSILON >= frame_interval(playback_speed)
    }

    /// Record that a frame was accepted at `now`
    pub fn mark_frame(&mut self, now: f64) {
        self.clock.last_frame = now;
    }

    /// Seconds left before the gate opens, zero if already open
    pub fn time_until_next(&self, now: f64, playback_speed: f64) -> f64 {
        let remaining = frame_interval(playback_speed) - (now - self.clock.last_frame);
        remaining.max(0.0)
    }

    pub fn clock(&self) -> PacingClock {
        self.clock
    }
}
