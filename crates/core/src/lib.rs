//! Core library for the stimulus timeline engine.
//!
//! The engine turns an authored sequence of motion blocks into a
//! deterministic, tick-indexed timeline and plays it back against host frame
//! callbacks. Each module owns one subsystem: refresh-rate measurement and
//! frequency snapping, timeline compilation, callback-driven clocks, the
//! runtime player and the stateless frame renderer.

pub mod assets;
pub mod clock;
pub mod config;
pub mod error;
pub mod frequency;
pub mod player;
pub mod render;
pub mod timeline;

pub use assets::{AssetEntry, AssetHandle, AssetIndex, AssetRecord, ResolutionPolicy};
pub use clock::{ClockAdvance, EdgeClock, PlaybackClock};
pub use config::{ClockConfig, EngineConfig, FrequencyBand, FrequencyConfig};
pub use error::{AudioDispatchFailure, ClockAnomaly, CompileError, EngineError, Result};
pub use frequency::{
    frame_rate_cache, measure_frame_rate, refresh_rate, snap_to_refresh_rate, FrameRateCache,
    FrameRateMeasurement, FrameSource, SimulatedDisplay,
};
pub use player::{AudioSink, Frame, PlaybackState, PlayerOptions, RuntimePlayer};
pub use render::{inspect, render_frame, FallingObject, FrameDescription, Layer, TickInspection};
pub use timeline::{
    build_timeline, events_at_tick, find_current_event, find_current_event_linear, tick_at,
    AudioEvent, AudioKind, AudioPolicy, Block, BlockLayout, Channel, CompilerSettings, Operator,
    OperatorDescriptor, OperatorKind, Program, ResolvedBlock, ResolvedChannel, ResolvedTimeline,
    SpanPhase, SpanPosition, Tick, TickCursor, Timed, Timeline, TimelineCompiler, VisualEvent,
    VisualKind, WipeStyle,
};
