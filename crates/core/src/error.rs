use crate::timeline::Channel;

/// Result alias that carries the crate level [`EngineError`] type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Common error type for the core crate.
///
/// Only failures that must stop a session before it starts live here.
/// Everything that can go wrong while a session is running is recovered
/// inside the engine and reported through [`ClockAnomaly`] or
/// [`AudioDispatchFailure`] instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// Configuration that parsed but cannot drive a session.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}

/// Malformed or unresolvable input to the timeline compiler. Compilation
/// never partially succeeds: any of these aborts the whole program.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("block {block}: unknown operator type `{name}` on {channel}")]
    UnknownOperator {
        block: usize,
        channel: Channel,
        name: String,
    },
    #[error("block {block}: unknown wipe style `{name}` on {channel}")]
    UnknownStyle {
        block: usize,
        channel: Channel,
        name: String,
    },
    #[error("unknown resolution policy `{0}`")]
    UnknownPolicy(String),
    #[error("block {block}: no asset for motion `{motion}` on {channel} (variant {variant:?})")]
    MissingAsset {
        block: usize,
        motion: String,
        channel: Channel,
        variant: Option<u32>,
    },
    #[error("block {block}: progressive {channel} of motion `{motion}` has no background asset")]
    MissingBackground {
        block: usize,
        motion: String,
        channel: Channel,
    },
    #[error("block {block}: empty motion id")]
    EmptyMotion { block: usize },
    #[error("invalid block layout: {0}")]
    InvalidLayout(&'static str),
    #[error("tick duration must be positive and finite, got {0} ms")]
    InvalidTickDuration(f64),
}

/// Non-fatal timing irregularities. They are logged where they are detected
/// and the engine carries on with a safe value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockAnomaly {
    /// The host did not deliver enough frames to measure its refresh rate.
    MeasurementTimeout { collected: usize, fallback_hz: f64 },
    /// A callback gap longer than the delta cap; the excess was dropped.
    Stall { gap_ms: f64, dropped_ms: f64 },
    /// A host timestamp earlier than the previous one.
    NonMonotonic { previous_ms: f64, now_ms: f64 },
}

impl ClockAnomaly {
    pub(crate) fn report(&self) {
        match *self {
            ClockAnomaly::MeasurementTimeout {
                collected,
                fallback_hz,
            } => tracing::warn!(
                collected,
                fallback_hz,
                "frame rate measurement timed out, using fallback refresh rate"
            ),
            ClockAnomaly::Stall { gap_ms, dropped_ms } => tracing::warn!(
                gap_ms,
                dropped_ms,
                "frame callback stalled, clamping time step"
            ),
            ClockAnomaly::NonMonotonic {
                previous_ms,
                now_ms,
            } => tracing::warn!(
                previous_ms,
                now_ms,
                "host timestamp moved backwards, ignoring callback delta"
            ),
        }
    }
}

/// Raised by an [`AudioSink`](crate::player::AudioSink) that could not start a
/// sound. The player logs it and keeps playing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audio dispatch failed at tick {tick}: {reason}")]
pub struct AudioDispatchFailure {
    pub tick: u64,
    pub reason: String,
}

impl AudioDispatchFailure {
    pub fn new<T: Into<String>>(tick: u64, reason: T) -> Self {
        Self {
            tick,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_errors_name_the_offending_block() {
        let err = CompileError::UnknownOperator {
            block: 3,
            channel: Channel::Set2,
            name: "SPIN".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("block 3"));
        assert!(text.contains("SPIN"));
        assert!(text.contains("set2"));
    }

    #[test]
    fn compile_errors_convert_into_engine_errors() {
        let err: EngineError = CompileError::EmptyMotion { block: 0 }.into();
        assert!(matches!(err, EngineError::Compile(_)));
        assert_eq!(err.to_string(), "block 0: empty motion id");
    }
}
