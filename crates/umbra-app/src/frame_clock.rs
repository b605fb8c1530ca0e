//! Variable-rate frame timing.
//!
//! Shadow and environment schedules advance by the real time between frames,
//! so the clock hands out that delta directly instead of fixed steps. Long
//! stalls (window drags, debugger breaks) are clamped so one frame never
//! sweeps every face of every map.

use std::time::Instant;

use tracing::warn;

/// Largest delta handed to the renderer, in seconds.
pub const MAX_FRAME_TIME: f32 = 0.25;

/// Seconds between FPS reports.
const REPORT_INTERVAL: f32 = 5.0;

/// Measures the time between rendered frames.
pub struct FrameClock {
    previous_time: Instant,
    frame_count: u64,
    elapsed: f32,
    report_timer: f32,
    report_frames: u32,
}

impl FrameClock {
    /// Creates a new `FrameClock` starting from the current instant.
    pub fn new() -> Self {
        Self {
            previous_time: Instant::now(),
            frame_count: 0,
            elapsed: 0.0,
            report_timer: 0.0,
            report_frames: 0,
        }
    }

    /// Start timing from now, e.g. after a long initialization.
    pub fn reset(&mut self) {
        self.previous_time = Instant::now();
    }

    /// Seconds since the previous call, clamped to [`MAX_FRAME_TIME`].
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let frame_time = now.duration_since(self.previous_time).as_secs_f32();
        self.previous_time = now;
        self.advance(frame_time)
    }

    /// Record a frame that took `frame_time` seconds and return the delta to
    /// render with.
    pub fn advance(&mut self, frame_time: f32) -> f32 {
        let mut dt = frame_time.max(0.0);
        if dt > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                dt * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            dt = MAX_FRAME_TIME;
        }

        self.elapsed += dt;
        self.frame_count += 1;
        self.report_frames += 1;
        self.report_timer += dt;
        if self.report_timer >= REPORT_INTERVAL {
            tracing::debug!(
                fps = self.report_frames as f32 / self.report_timer,
                frames = self.frame_count,
                "frame rate"
            );
            self.report_timer = 0.0;
            self.report_frames = 0;
        }
        dt
    }

    /// Returns the total number of frames timed.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Sum of every clamped delta, in seconds.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_passes_short_frames_through() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.advance(0.016), 0.016);
        assert_eq!(clock.frame_count(), 1);
    }

    #[test]
    fn test_long_frame_is_clamped() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.advance(3.0), MAX_FRAME_TIME);
        assert!((clock.elapsed() - MAX_FRAME_TIME).abs() < 1e-6);
    }

    #[test]
    fn test_negative_frame_time_is_zero() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.advance(-1.0), 0.0);
    }

    #[test]
    fn test_elapsed_accumulates() {
        let mut clock = FrameClock::new();
        for _ in 0..10 {
            clock.advance(0.1);
        }
        assert!((clock.elapsed() - 1.0).abs() < 1e-5);
        assert_eq!(clock.frame_count(), 10);
    }

    #[test]
    fn test_tick_is_bounded() {
        let mut clock = FrameClock::new();
        let dt = clock.tick();
        assert!((0.0..=MAX_FRAME_TIME).contains(&dt));
    }
}
