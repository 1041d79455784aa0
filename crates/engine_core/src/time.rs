//! Frame timing for the render loop.

use std::time::{Duration, Instant};

/// Weight of the newest sample in the smoothed FPS estimate.
const FPS_SMOOTHING: f32 = 0.1;

/// Measures per-frame deltas.
///
/// Deltas are capped at `max_delta` so a long stall (window drag, debugger
/// break) does not make animated parameters jump.
#[derive(Debug)]
pub struct FrameClock {
    /// Time when the clock was created.
    start_time: Instant,
    /// Time of the last tick.
    last_frame: Instant,
    /// Duration of the last frame after capping.
    delta: Duration,
    /// Frames ticked or advanced since creation.
    frame_count: u64,
    /// Upper bound applied to every delta.
    max_delta: Duration,
    /// Exponentially smoothed frames-per-second.
    fps_smoothed: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Create a clock starting now, with deltas capped at 100 ms.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
            max_delta: Duration::from_millis(100),
            fps_smoothed: 0.0,
        }
    }

    /// Sample the wall clock and return the capped delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let raw = now - self.last_frame;
        self.last_frame = now;
        self.record(raw)
    }

    /// Advance by a fixed step without reading the wall clock (headless runs).
    pub fn advance(&mut self, step: Duration) -> f32 {
        self.last_frame += step;
        self.record(step)
    }

    fn record(&mut self, raw: Duration) -> f32 {
        self.delta = raw.min(self.max_delta);
        self.frame_count += 1;

        let dt = self.delta.as_secs_f32();
        if dt > 0.0 {
            let sample = 1.0 / dt;
            self.fps_smoothed = if self.fps_smoothed == 0.0 {
                sample
            } else {
                self.fps_smoothed + (sample - self.fps_smoothed) * FPS_SMOOTHING
            };
        }
        dt
    }

    /// Capped delta of the last frame in seconds.
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Wall time since the clock was created, in seconds.
    pub fn elapsed_seconds(&self) -> f32 {
        (self.last_frame - self.start_time).as_secs_f32()
    }

    /// Number of frames recorded so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Smoothed frames-per-second.
    pub fn fps(&self) -> f32 {
        self.fps_smoothed
    }

    /// Change the delta cap.
    pub fn set_max_delta(&mut self, max_delta: Duration) {
        self.max_delta = max_delta;
    }
}
