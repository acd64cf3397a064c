//! Fixed-timestep driver for the coordinator.
//!
//! The coordinator reconciles once per step at 60 Hz regardless of how fast
//! the host spins. Long stalls are clamped so a stalled host catches up with
//! a bounded burst instead of hundreds of back-to-back steps.

use std::time::{Duration, Instant};

/// Fixed step: 60 Hz.
pub const FIXED_DT: f64 = 1.0 / 60.0;

/// Longest frame time fed into the accumulator.
pub const MAX_FRAME_TIME: f64 = 0.25;

pub struct TickLoop {
    previous_time: Instant,
    accumulator: f64,
    total_time: f64,
    frame_count: u64,
    step_count: u64,
}

impl TickLoop {
    pub fn new() -> Self {
        Self {
            previous_time: Instant::now(),
            accumulator: 0.0,
            total_time: 0.0,
            frame_count: 0,
            step_count: 0,
        }
    }

    /// Measures wall time since the previous frame and runs the steps it
    /// covers. Returns how many steps ran.
    pub fn tick(&mut self, step_fn: impl FnMut(f64)) -> u32 {
        let now = Instant::now();
        let frame_time = now.duration_since(self.previous_time).as_secs_f64();
        self.previous_time = now;
        self.advance(frame_time, step_fn)
    }

    /// Runs `step_fn(FIXED_DT)` once for each whole step in `frame_time`
    /// plus the carried remainder.
    pub fn advance(&mut self, frame_time: f64, mut step_fn: impl FnMut(f64)) -> u32 {
        let mut frame_time = frame_time.max(0.0);
        if frame_time > MAX_FRAME_TIME {
            tracing::warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }

        self.accumulator += frame_time;
        let mut steps = 0;
        while self.accumulator >= FIXED_DT {
            step_fn(FIXED_DT);
            self.total_time += FIXED_DT;
            self.accumulator -= FIXED_DT;
            self.step_count += 1;
            steps += 1;
        }
        self.frame_count += 1;
        steps
    }

    /// Time left until the next step is due.
    pub fn until_next_step(&self) -> Duration {
        Duration::from_secs_f64((FIXED_DT - self.accumulator).max(0.0))
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Simulated time covered by the steps run so far, in seconds.
    pub fn total_time(&self) -> f64 {
        self.total_time
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new()
    }
}
