//! Refresh-rate measurement and stimulus frequency snapping.
//!
//! A flicker frequency that is not an integer submultiple of the display
//! refresh rate beats against it and shows visible jitter. The corrector
//! measures the real refresh rate once per process and snaps requested
//! frequencies so that every half cycle lands on a whole number of frames.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{ClockAnomaly, FrequencyConfig};

/// Stream of host frame callbacks.
pub trait FrameSource {
    /// Waits for the next frame callback and returns its timestamp in
    /// milliseconds, or `None` if the host did not call back within `timeout`.
    fn next_frame(&mut self, timeout: Duration) -> Option<f64>;
}

/// Result of a refresh-rate measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRateMeasurement {
    /// Median of the instantaneous rates.
    pub refresh_hz: f64,
    pub mean_hz: f64,
    /// Standard deviation of the frame time.
    pub jitter_ms: f64,
    pub min_frame_ms: f64,
    pub max_frame_ms: f64,
    pub samples: usize,
    /// The host never delivered enough frames; `refresh_hz` is the fallback.
    pub fallback: bool,
}

impl FrameRateMeasurement {
    pub fn fallback(refresh_hz: f64) -> Self {
        let frame_ms = 1000.0 / refresh_hz;
        Self {
            refresh_hz,
            mean_hz: refresh_hz,
            jitter_ms: 0.0,
            min_frame_ms: frame_ms,
            max_frame_ms: frame_ms,
            samples: 0,
            fallback: true,
        }
    }
}

/// Samples `sample_count` consecutive frame intervals and reports the median
/// instantaneous rate. Falls back to `fallback_refresh_hz` when the host does
/// not produce enough frames before the measurement timeout.
pub fn measure_frame_rate<S: FrameSource + ?Sized>(
    source: &mut S,
    config: &FrequencyConfig,
) -> FrameRateMeasurement {
    let wanted = config.sample_count + 1;
    let deadline = Instant::now() + Duration::from_millis(config.measurement_timeout_ms);
    let mut stamps = Vec::with_capacity(wanted);

    while stamps.len() < wanted {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match source.next_frame(remaining) {
            Some(stamp) => stamps.push(stamp),
            None => break,
        }
    }

    let frame_times: Vec<f64> = stamps
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|frame_ms| *frame_ms > 0.0)
        .collect();

    if stamps.len() < wanted || frame_times.is_empty() {
        let anomaly = ClockAnomaly::MeasurementTimeout {
            collected: stamps.len(),
            fallback_hz: config.fallback_refresh_hz,
        };
        anomaly.report();
        return FrameRateMeasurement::fallback(config.fallback_refresh_hz);
    }

    let mut rates: Vec<f64> = frame_times.iter().map(|frame_ms| 1000.0 / frame_ms).collect();
    let count = frame_times.len() as f64;
    let mean_frame = frame_times.iter().sum::<f64>() / count;
    let variance = frame_times
        .iter()
        .map(|frame_ms| (frame_ms - mean_frame).powi(2))
        .sum::<f64>()
        / count;

    let measurement = FrameRateMeasurement {
        refresh_hz: median(&mut rates),
        mean_hz: rates.iter().sum::<f64>() / rates.len() as f64,
        jitter_ms: variance.sqrt(),
        min_frame_ms: frame_times.iter().copied().fold(f64::INFINITY, f64::min),
        max_frame_ms: frame_times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        samples: rates.len(),
        fallback: false,
    };
    tracing::info!(
        refresh_hz = measurement.refresh_hz,
        mean_hz = measurement.mean_hz,
        jitter_ms = measurement.jitter_ms,
        samples = measurement.samples,
        "measured display refresh rate"
    );
    measurement
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) * 0.5
    } else {
        values[mid]
    }
}

/// Snaps `requested_hz` to `measured_hz / (2N)` for an integer
/// `N <= max_divisor`, preferring a divisor whose result lies inside the
/// configured band. Only when no divisor lands in the band is the result
/// clamped to it.
///
/// The band is expected to satisfy `min_hz <= max_hz`, as checked by
/// [`EngineConfig::validate`](crate::EngineConfig::validate); an inverted band
/// degrades to its upper bound.
pub fn snap_to_refresh_rate(requested_hz: f64, measured_hz: f64, config: &FrequencyConfig) -> f64 {
    let band = config.band;
    if !(requested_hz > 0.0 && measured_hz > 0.0) {
        tracing::warn!(requested_hz, measured_hz, "cannot snap non-positive frequency");
        return band.clamp(requested_hz.max(0.0));
    }

    let max_divisor = config.max_divisor.max(1) as f64;
    let at = |divisor: f64| measured_hz / (2.0 * divisor);

    let mut divisor = (measured_hz / (2.0 * requested_hz)).round().clamp(1.0, max_divisor);
    while at(divisor) > band.max_hz && divisor < max_divisor {
        divisor += 1.0;
    }
    while at(divisor) < band.min_hz && divisor > 1.0 {
        divisor -= 1.0;
    }

    let snapped = at(divisor);
    if !band.contains(snapped) {
        tracing::warn!(
            requested_hz,
            measured_hz,
            snapped,
            "no refresh-rate divisor inside the band, clamping"
        );
    }
    band.clamp(snapped)
}

enum CacheState {
    Empty,
    Measuring,
    Ready(FrameRateMeasurement),
}

/// Process-wide refresh-rate cache with single-flight measurement.
///
/// Lifecycle: empty until the first [`get_or_measure`](Self::get_or_measure),
/// measuring while that call runs, then ready for the rest of the process.
/// Callers arriving while a measurement is in flight block until it settles
/// and share its result. [`reset`](Self::reset) returns the cache to empty and
/// exists for tests.
pub struct FrameRateCache {
    state: Mutex<CacheState>,
    settled: Condvar,
}

impl Default for FrameRateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRateCache {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::Empty),
            settled: Condvar::new(),
        }
    }

    pub fn get_or_measure<F>(&self, measure: F) -> FrameRateMeasurement
    where
        F: FnOnce() -> FrameRateMeasurement,
    {
        let mut state = self.lock();
        loop {
            match &*state {
                CacheState::Ready(measurement) => return *measurement,
                CacheState::Empty => break,
                CacheState::Measuring => {}
            }
            state = self
                .settled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *state = CacheState::Measuring;
        drop(state);

        let mut flight = InFlight {
            cache: self,
            result: None,
        };
        let measurement = measure();
        flight.result = Some(measurement);
        measurement
    }

    pub fn cached(&self) -> Option<FrameRateMeasurement> {
        match &*self.lock() {
            CacheState::Ready(measurement) => Some(*measurement),
            _ => None,
        }
    }

    /// Test-only: forgets the cached measurement.
    pub fn reset(&self) {
        *self.lock() = CacheState::Empty;
        self.settled.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Publishes the result, or clears the slot if the measurement panicked,
// and wakes every waiter.
struct InFlight<'a> {
    cache: &'a FrameRateCache,
    result: Option<FrameRateMeasurement>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.cache.lock() = match self.result {
            Some(measurement) => CacheState::Ready(measurement),
            None => CacheState::Empty,
        };
        self.cache.settled.notify_all();
    }
}

/// The process-wide cache.
pub fn frame_rate_cache() -> &'static FrameRateCache {
    static CACHE: FrameRateCache = FrameRateCache::new();
    &CACHE
}

/// Measured refresh rate, sampled from `source` on first use and cached for
/// the rest of the process.
pub fn refresh_rate<S: FrameSource + ?Sized>(
    source: &mut S,
    config: &FrequencyConfig,
) -> FrameRateMeasurement {
    frame_rate_cache().get_or_measure(|| measure_frame_rate(source, config))
}

/// Deterministic stand-in for a display: callbacks at `refresh_hz` with
/// uniform per-frame jitter and optional periodic stalls.
#[derive(Debug, Clone)]
pub struct SimulatedDisplay {
    frame_ms: f64,
    jitter: f64,
    now_ms: f64,
    frame: u64,
    stall: Option<(u64, f64)>,
    rng: ChaCha8Rng,
}

impl SimulatedDisplay {
    /// `jitter` is the largest relative deviation of a single frame time,
    /// e.g. `0.3` for ±30%.
    pub fn new(refresh_hz: f64, jitter: f64, seed: u64) -> Self {
        Self {
            frame_ms: 1000.0 / refresh_hz,
            jitter: jitter.abs(),
            now_ms: 0.0,
            frame: 0,
            stall: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Adds `stall_ms` to every `every`-th frame.
    pub fn with_stalls(mut self, every: u64, stall_ms: f64) -> Self {
        self.stall = (every > 0).then_some((every, stall_ms));
        self
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn next_timestamp(&mut self) -> f64 {
        let mut frame_ms = self.frame_ms;
        if self.jitter > 0.0 {
            frame_ms *= 1.0 + self.rng.random_range(-self.jitter..=self.jitter);
        }
        self.frame += 1;
        if let Some((every, stall_ms)) = self.stall {
            if self.frame % every == 0 {
                frame_ms += stall_ms;
            }
        }
        self.now_ms += frame_ms.max(0.0);
        self.now_ms
    }
}

impl FrameSource for SimulatedDisplay {
    fn next_frame(&mut self, _timeout: Duration) -> Option<f64> {
        Some(self.next_timestamp())
    }
}
