//! Frame timing for the orchestrator.
//!
//! [`FrameClock`] hands out clamped integration steps and keeps a frames per
//! second figure that is refreshed (and logged) once per second.
//!
//! ```ignore
//! let mut clock = FrameClock::new();
//! let tick = clock.tick();
//! println!("dt {:.4}s elapsed {:.2}s", tick.delta.seconds(), tick.elapsed);
//! ```

use std::time::{Duration, Instant};

use crate::physics::DeltaTime;

/// How often the FPS figure is recomputed.
pub const FPS_INTERVAL: Duration = Duration::from_secs(1);

/// Result of advancing the clock by one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Clamped integration step.
    pub delta: DeltaTime,
    /// Unclamped seconds since the previous tick, zero while paused.
    pub raw_seconds: f32,
    /// Seconds of unpaused time since the clock started.
    pub elapsed: f32,
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Set when the FPS figure was refreshed on this tick.
    pub fps_report: Option<f32>,
}

/// Frame clock with pause support.
#[derive(Debug)]
pub struct FrameClock {
    last_frame: Instant,
    elapsed_secs: f32,
    frame_count: u64,
    fps: f32,
    fps_frames: u64,
    fps_window: f32,
    paused: bool,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            elapsed_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frames: 0,
            fps_window: 0.0,
            paused: false,
        }
    }

    /// Advance using the wall clock.
    pub fn tick(&mut self) -> Tick {
        let now = Instant::now();
        let raw = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.advance(raw)
    }

    /// Advance by an explicit raw delta in seconds.
    ///
    /// The raw value drives the FPS window; the integration step is clamped.
    pub fn advance(&mut self, raw_seconds: f32) -> Tick {
        let delta = DeltaTime::clamped(raw_seconds);
        if self.paused {
            return Tick {
                delta: DeltaTime::default(),
                raw_seconds: 0.0,
                elapsed: self.elapsed_secs,
                frame: self.frame_count,
                fps_report: None,
            };
        }

        self.frame_count += 1;
        self.elapsed_secs += delta.seconds();

        let mut fps_report = None;
        if raw_seconds.is_finite() && raw_seconds > 0.0 {
            self.fps_frames += 1;
            self.fps_window += raw_seconds;
            if self.fps_window >= FPS_INTERVAL.as_secs_f32() {
                self.fps = self.fps_frames as f32 / self.fps_window;
                self.fps_frames = 0;
                self.fps_window = 0.0;
                fps_report = Some(self.fps);
            }
        }

        Tick {
            delta,
            raw_seconds: if raw_seconds.is_finite() { raw_seconds.max(0.0) } else { 0.0 },
            elapsed: self.elapsed_secs,
            frame: self.frame_count,
            fps_report,
        }
    }

    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Most recent frames-per-second figure (0 until the first window closes).
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// While paused, ticks return a zero delta and elapsed time stops.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume without counting the paused interval as a frame delta.
    pub fn resume(&mut self) {
        if self.paused {
            self.last_frame = Instant::now();
            self.paused = false;
        }
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
    use crate::physics::MAX_DELTA;
    use std::thread;

    #[test]
    fn test_clock_new() {
        let clock = FrameClock::new();
        assert_eq!(clock.frame(), 0);
        assert!(!clock.is_paused());
        assert_eq!(clock.fps(), 0.0);
    }

    #[test]
    fn test_tick_uses_wall_clock() {
        let mut clock = FrameClock::new();
        thread::sleep(Duration::from_millis(5));
        let tick = clock.tick();
        assert!(tick.delta.seconds() > 0.0);
        assert!(tick.delta.seconds() <= MAX_DELTA);
        assert_eq!(tick.frame, 1);
    }

    #[test]
    fn test_slow_frame_is_clamped() {
        let mut clock = FrameClock::new();
        let tick = clock.advance(0.5);
        assert_eq!(tick.delta.seconds(), MAX_DELTA);
        assert_eq!(clock.elapsed(), MAX_DELTA);
    }

    #[test]
    fn test_fps_reported_once_per_second() {
        let mut clock = FrameClock::new();
        let mut reports = Vec::new();
        for _ in 0..120 {
            if let Some(fps) = clock.advance(1.0 / 60.0).fps_report {
                reports.push(fps);
            }
        }
        // Accumulated float error can push the second report to frame 121.
        assert!(!reports.is_empty() && reports.len() <= 2);
        assert!((reports[0] - 60.0).abs() < 1.0);
    }

    #[test]
    fn test_pause_freezes_time() {
        let mut clock = FrameClock::new();
        clock.advance(0.01);
        clock.pause();
        let before = clock.elapsed();
        let tick = clock.advance(0.01);
        assert_eq!(tick.delta.seconds(), 0.0);
        assert_eq!(clock.elapsed(), before);
        clock.resume();
        assert!(!clock.is_paused());
    }
}
