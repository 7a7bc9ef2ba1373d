//! Callback-driven clocks.
//!
//! Hosts call back once per display refresh at an uneven rate. The clocks in
//! this module turn those callbacks into time that only moves forward and
//! never jumps by more than a configured cap.

use crate::{ClockAnomaly, ClockConfig};

/// Time contributed by one host callback.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClockAdvance {
    /// Time added to the clock.
    pub delta_ms: f64,
    /// Wall time that was discarded because it exceeded the delta cap.
    pub dropped_ms: f64,
}

/// Free-running clock fed by host frame callbacks.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    elapsed_ms: f64,
    last_callback_ms: Option<f64>,
    max_delta_ms: f64,
    fixed_step_ms: f64,
    max_substeps: u32,
    accumulator_ms: f64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(&ClockConfig::default())
    }
}

impl PlaybackClock {
    pub fn new(config: &ClockConfig) -> Self {
        Self {
            elapsed_ms: 0.0,
            last_callback_ms: None,
            max_delta_ms: config.max_delta_ms,
            fixed_step_ms: config.fixed_step_ms,
            max_substeps: config.max_substeps.max(1),
            accumulator_ms: 0.0,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn reset(&mut self) {
        self.elapsed_ms = 0.0;
        self.last_callback_ms = None;
        self.accumulator_ms = 0.0;
    }

    /// Forgets the last callback so time spent paused or hidden is never
    /// counted when callbacks resume.
    pub fn pause(&mut self) {
        self.last_callback_ms = None;
    }

    /// Re-anchors on `now_ms`; the next callback advances from here.
    pub fn resume(&mut self, now_ms: f64) {
        self.last_callback_ms = Some(now_ms);
    }

    /// Feeds one host callback. The first callback after construction or a
    /// pause only anchors the clock.
    pub fn advance(&mut self, now_ms: f64) -> ClockAdvance {
        let Some(last) = self.last_callback_ms.replace(now_ms) else {
            return ClockAdvance::default();
        };

        let gap = now_ms - last;
        if gap < 0.0 {
            ClockAnomaly::NonMonotonic {
                previous_ms: last,
                now_ms,
            }
            .report();
            // Keep the later timestamp as the reference point.
            self.last_callback_ms = Some(last);
            return ClockAdvance::default();
        }

        let delta_ms = gap.min(self.max_delta_ms);
        let dropped_ms = gap - delta_ms;
        if dropped_ms > 0.0 {
            ClockAnomaly::Stall { gap_ms: gap, dropped_ms }.report();
        }

        self.elapsed_ms += delta_ms;
        self.accumulator_ms += delta_ms;
        ClockAdvance {
            delta_ms,
            dropped_ms,
        }
    }

    /// Drains the accumulator in fixed steps, at most `max_substeps` per call.
    /// Whatever still exceeds `fixed_step × max_substeps` afterwards is
    /// discarded so a slow consumer cannot fall further and further behind.
    pub fn fixed_steps(&mut self) -> u32 {
        let mut steps = 0;
        while self.accumulator_ms >= self.fixed_step_ms && steps < self.max_substeps {
            self.accumulator_ms -= self.fixed_step_ms;
            steps += 1;
        }
        if self.accumulator_ms > self.fixed_step_ms * self.max_substeps as f64 {
            tracing::warn!(
                backlog_ms = self.accumulator_ms,
                "fixed-step backlog overflowed, resetting accumulator"
            );
            self.accumulator_ms = 0.0;
        }
        steps
    }

    /// Fraction of a fixed step left in the accumulator, for interpolation.
    pub fn interpolation_alpha(&self) -> f64 {
        (self.accumulator_ms / self.fixed_step_ms).clamp(0.0, 1.0)
    }
}

/// Self-correcting toggle scheduler for flicker stimuli.
///
/// Edges are kept on the grid `start + k × interval`. A late callback fires
/// one toggle and folds its overshoot back into the next deadline instead of
/// restarting the phase, so the long-run toggle rate stays on target however
/// the individual callbacks jitter.
#[derive(Debug, Clone)]
pub struct EdgeClock {
    interval_ms: f64,
    started_ms: Option<f64>,
    expected_next_edge_ms: f64,
    level: bool,
    toggles: u64,
}

impl EdgeClock {
    pub fn with_interval(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            started_ms: None,
            expected_next_edge_ms: 0.0,
            level: false,
            toggles: 0,
        }
    }

    /// Toggles twice per cycle of `frequency_hz`.
    pub fn for_frequency(frequency_hz: f64) -> Self {
        Self::with_interval(500.0 / frequency_hz)
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn level(&self) -> bool {
        self.level
    }

    pub fn toggles(&self) -> u64 {
        self.toggles
    }

    pub fn expected_next_edge_ms(&self) -> Option<f64> {
        self.started_ms.map(|_| self.expected_next_edge_ms)
    }

    /// Starts the stimulus in the ON state at `now_ms`.
    pub fn start(&mut self, now_ms: f64) {
        self.started_ms = Some(now_ms);
        self.expected_next_edge_ms = now_ms + self.interval_ms;
        self.level = true;
        self.toggles = 0;
    }

    pub fn stop(&mut self) {
        self.started_ms = None;
        self.level = false;
    }

    /// Feeds one host callback; returns the new level when an edge fired.
    /// An unstarted clock starts on its first callback.
    pub fn on_frame(&mut self, now_ms: f64) -> Option<bool> {
        if self.started_ms.is_none() {
            self.start(now_ms);
            return None;
        }
        if now_ms < self.expected_next_edge_ms {
            return None;
        }

        self.level = !self.level;
        self.toggles += 1;
        let overshoot = (now_ms - self.expected_next_edge_ms).rem_euclid(self.interval_ms);
        self.expected_next_edge_ms = now_ms + self.interval_ms - overshoot;
        Some(self.level)
    }

    /// Observed toggle rate since `start`, in toggles per second.
    pub fn measured_toggle_rate_hz(&self, now_ms: f64) -> Option<f64> {
        let started = self.started_ms?;
        let span = now_ms - started;
        (span > 0.0).then(|| self.toggles as f64 * 1000.0 / span)
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn first_callback_only_anchors() {
        let mut clock = PlaybackClock::default();
        assert_eq!(clock.advance(1_000.0), ClockAdvance::default());
        let step = clock.advance(1_016.0);
        assert_eq!(step.delta_ms, 16.0);
        assert_eq!(clock.elapsed_ms(), 16.0);
    }

    #[test]
    fn stalls_are_clamped_to_max_delta() {
        let mut clock = PlaybackClock::default();
        clock.advance(0.0);
        let step = clock.advance(5_000.0);
        assert_eq!(step.delta_ms, 100.0);
        assert_eq!(step.dropped_ms, 4_900.0);
        assert_eq!(clock.elapsed_ms(), 100.0);
    }

    #[test]
    fn backwards_timestamps_do_not_rewind() {
        let mut clock = PlaybackClock::default();
        clock.advance(100.0);
        clock.advance(150.0);
        assert_eq!(clock.advance(120.0), ClockAdvance::default());
        clock.advance(160.0);
        assert_eq!(clock.elapsed_ms(), 60.0);
    }

    #[test]
    fn pause_discards_hidden_time() {
        let mut clock = PlaybackClock::default();
        clock.advance(0.0);
        clock.advance(50.0);
        clock.pause();
        clock.advance(90_000.0);
        clock.advance(90_020.0);
        assert_eq!(clock.elapsed_ms(), 70.0);

        clock.pause();
        clock.resume(120_000.0);
        assert_eq!(clock.advance(120_010.0).delta_ms, 10.0);
        assert_eq!(clock.elapsed_ms(), 80.0);
    }

    #[test]
    fn elapsed_time_never_decreases() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut clock = PlaybackClock::default();
        let mut now = 0.0;
        let mut previous = 0.0;
        for _ in 0..5_000 {
            now += rng.random_range(0.0..250.0);
            clock.advance(now);
            assert!(clock.elapsed_ms() >= previous);
            previous = clock.elapsed_ms();
        }
    }

    #[test]
    fn fixed_steps_are_capped_per_callback() {
        let config = ClockConfig {
            max_delta_ms: 100.0,
            fixed_step_ms: 10.0,
            max_substeps: 4,
        };
        let mut clock = PlaybackClock::new(&config);
        clock.advance(0.0);
        clock.advance(25.0);
        assert_eq!(clock.fixed_steps(), 2);
        assert!((clock.interpolation_alpha() - 0.5).abs() < 1e-9);

        // 5 ms left + 100 ms: four steps drain 40 ms, the remaining 65 ms
        // exceeds the 40 ms cap and is dropped.
        clock.advance(1_000.0);
        assert_eq!(clock.fixed_steps(), 4);
        assert_eq!(clock.interpolation_alpha(), 0.0);
        assert_eq!(clock.fixed_steps(), 0);
    }

    #[test]
    fn edge_clock_toggles_on_grid() {
        let mut edges = EdgeClock::with_interval(50.0);
        assert_eq!(edges.on_frame(0.0), None);
        assert!(edges.level());
        assert_eq!(edges.on_frame(49.0), None);
        assert_eq!(edges.on_frame(57.0), Some(false));
        // Overshoot of 7 ms is folded back: next edge stays at 100.
        assert_eq!(edges.expected_next_edge_ms(), Some(100.0));
        assert_eq!(edges.on_frame(100.0), Some(true));
        // A long stall fires a single toggle and keeps the phase.
        assert_eq!(edges.on_frame(333.0), Some(false));
        assert_eq!(edges.expected_next_edge_ms(), Some(350.0));
        assert_eq!(edges.toggles(), 3);
    }

    fn simulate_edges(callbacks: usize, seed: u64) -> (f64, f64) {
        let frequency_hz = 10.0;
        let frame_ms = 1000.0 / 60.0;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut edges = EdgeClock::for_frequency(frequency_hz);

        let mut now = 0.0;
        edges.on_frame(now);
        for _ in 0..callbacks {
            now += frame_ms * (1.0 + rng.random_range(-0.3..0.3));
            edges.on_frame(now);
        }
        let expected = now / edges.interval_ms();
        let rate = edges.measured_toggle_rate_hz(now).unwrap();
        (edges.toggles() as f64 - expected, rate / (2.0 * frequency_hz))
    }

    #[test]
    fn drift_stays_bounded_under_jitter() {
        let (short_error, short_ratio) = simulate_edges(2_000, 11);
        let (long_error, long_ratio) = simulate_edges(40_000, 11);

        assert!((short_ratio - 1.0).abs() < 0.01, "ratio {short_ratio}");
        assert!((long_ratio - 1.0).abs() < 0.01, "ratio {long_ratio}");
        // The absolute toggle error does not accumulate with session length.
        assert!(short_error.abs() <= 1.0, "error {short_error}");
        assert!(long_error.abs() <= 1.0, "error {long_error}");
    }
}
