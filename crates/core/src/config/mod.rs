use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{AudioPolicy, BlockLayout, EngineError, PlayerOptions, Result};

/// Top-level configuration structure for a playback session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub frequency: FrequencyConfig,
    pub clock: ClockConfig,
    pub layout: BlockLayout,
    pub audio: AudioPolicy,
    pub player: PlayerOptions,
}

impl EngineConfig {
    /// Reads a JSON configuration file. Fields missing from the file keep
    /// their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.frequency.validate()?;
        self.clock.validate()?;
        self.layout.validate()?;
        if !(self.player.speed.is_finite() && self.player.speed > 0.0) {
            return Err(EngineError::config("player speed must be positive"));
        }
        Ok(())
    }
}

/// Acceptable stimulus frequency range, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyBand {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl Default for FrequencyBand {
    fn default() -> Self {
        Self {
            min_hz: 8.0,
            max_hz: 15.0,
        }
    }
}

impl FrequencyBand {
    pub fn contains(&self, hz: f64) -> bool {
        hz >= self.min_hz && hz <= self.max_hz
    }

    /// Clamps into the band. An inverted band never panics: the upper bound
    /// wins.
    pub fn clamp(&self, hz: f64) -> f64 {
        hz.max(self.min_hz).min(self.max_hz)
    }
}

/// Configuration of the refresh-rate measurement and frequency snapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrequencyConfig {
    pub band: FrequencyBand,
    /// Number of instantaneous rates sampled per measurement.
    pub sample_count: usize,
    pub measurement_timeout_ms: u64,
    pub fallback_refresh_hz: f64,
    /// Largest refresh-rate divisor considered when snapping.
    pub max_divisor: u32,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            band: FrequencyBand::default(),
            sample_count: 100,
            measurement_timeout_ms: 3_000,
            fallback_refresh_hz: 60.0,
            max_divisor: 30,
        }
    }
}

impl FrequencyConfig {
    fn validate(&self) -> Result<()> {
        if self.band.min_hz <= 0.0 || self.band.min_hz > self.band.max_hz {
            return Err(EngineError::config("frequency band must satisfy 0 < min <= max"));
        }
        if self.sample_count == 0 {
            return Err(EngineError::config("sample count must be at least one"));
        }
        if self.fallback_refresh_hz <= 0.0 {
            return Err(EngineError::config("fallback refresh rate must be positive"));
        }
        if self.max_divisor == 0 {
            return Err(EngineError::config("max divisor must be at least one"));
        }
        Ok(())
    }
}

/// Configuration of the callback-driven playback clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClockConfig {
    /// Largest time step a single callback may contribute.
    pub max_delta_ms: f64,
    pub fixed_step_ms: f64,
    pub max_substeps: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            max_delta_ms: 100.0,
            fixed_step_ms: 1000.0 / 60.0,
            max_substeps: 5,
        }
    }
}

impl ClockConfig {
    fn validate(&self) -> Result<()> {
        if !(self.max_delta_ms > 0.0 && self.fixed_step_ms > 0.0) {
            return Err(EngineError::config("clock steps must be positive"));
        }
        if self.max_substeps == 0 {
            return Err(EngineError::config("max substeps must be at least one"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_reference_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "clock": { "maxDeltaMs": 50.0 } }"#).unwrap();

        assert_eq!(config.clock.max_delta_ms, 50.0);
        assert_eq!(config.clock.max_substeps, 5);
        assert_eq!(config.frequency.sample_count, 100);
        assert_eq!(config.frequency.band, FrequencyBand::default());
        assert_eq!(config.layout, BlockLayout::default());
    }

    #[test]
    fn rejects_inverted_band() {
        let err = EngineConfig::from_json_str(
            r#"{ "frequency": { "band": { "minHz": 20.0, "maxHz": 10.0 } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("frequency band"));
    }

    #[test]
    fn band_clamps_and_contains() {
        let band = FrequencyBand::default();
        assert!(band.contains(12.0));
        assert!(!band.contains(20.0));
        assert_eq!(band.clamp(3.0), 8.0);

        let inverted = FrequencyBand {
            min_hz: 20.0,
            max_hz: 10.0,
        };
        assert_eq!(inverted.clamp(12.0), 10.0);
    }
}
