//! Tick-indexed timeline model and its compiler.
//!
//! A [`Timeline`] is produced once per session by [`TimelineCompiler`] and
//! [`build_timeline`], then shared read-only (usually behind an `Arc`) by the
//! player, the renderer and any debug overlay.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AssetHandle;

pub mod compiler;
pub mod layout;
pub mod lookup;
pub mod program;

pub use compiler::{
    build_timeline, AudioPolicy, Block, CompilerSettings, Operator, OperatorDescriptor,
    ResolvedBlock, ResolvedChannel, ResolvedTimeline, TimelineCompiler, WipeStyle,
};
pub use layout::{BlockLayout, SpanPhase, SpanPosition};
pub use lookup::{
    events_at_tick, find_current_event, find_current_event_linear, tick_at, Timed, TickCursor,
};
pub use program::Program;

/// Atomic unit of playback time.
pub type Tick = u64;

/// One of the two independent stimulus channels of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Set1,
    Set2,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Set1, Channel::Set2];

    /// Zero-based position of the channel inside a block.
    pub fn index(self) -> usize {
        match self {
            Channel::Set1 => 0,
            Channel::Set2 => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Set1 => f.write_str("set1"),
            Channel::Set2 => f.write_str("set2"),
        }
    }
}

/// Operator family without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorKind {
    Binary,
    Progressive,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualEvent {
    pub tick: Tick,
    pub block_index: usize,
    /// `None` for explain and transition ticks.
    pub channel: Option<Channel>,
    pub kind: VisualKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisualKind {
    Binary {
        on: bool,
        asset: AssetHandle,
    },
    /// Wipe-style reveal of `foreground` over `background`.
    Progressive {
        progress: f32,
        style: WipeStyle,
        foreground: AssetHandle,
        background: AssetHandle,
    },
    Drop {
        obj_index: u32,
        asset: AssetHandle,
    },
    Explain {
        motion_id: String,
    },
    Transition,
}

impl VisualKind {
    pub fn operator(&self) -> Option<OperatorKind> {
        match self {
            VisualKind::Binary { .. } => Some(OperatorKind::Binary),
            VisualKind::Progressive { .. } => Some(OperatorKind::Progressive),
            VisualKind::Drop { .. } => Some(OperatorKind::Drop),
            VisualKind::Explain { .. } | VisualKind::Transition => None,
        }
    }

    /// Explain and transition ticks hide every other layer.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, VisualKind::Explain { .. } | VisualKind::Transition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioKind {
    CueStart,
    Impact,
    Reward,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioEvent {
    pub tick: Tick,
    pub block_index: usize,
    pub channel: Option<Channel>,
    pub kind: AudioKind,
}

/// Immutable compiler output. Both event lists are sorted by tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub visuals: Vec<VisualEvent>,
    pub audio: Vec<AudioEvent>,
    pub total_ticks: Tick,
    pub tick_duration_ms: f64,
    pub layout: BlockLayout,
}

impl Timeline {
    /// Number of blocks the timeline was compiled from.
    pub fn block_count(&self) -> usize {
        let block_ticks = self.layout.block_ticks();
        if block_ticks == 0 {
            0
        } else {
            (self.total_ticks / block_ticks) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_ticks == 0
    }

    /// Furthest point playback may reach: the start of the last tick.
    pub fn end_bound_ms(&self) -> f64 {
        self.total_ticks.saturating_sub(1) as f64 * self.tick_duration_ms
    }

    /// Tick displayed at `elapsed_ms`, clamped to the last tick.
    /// Returns `None` for an empty timeline.
    pub fn tick_at(&self, elapsed_ms: f64) -> Option<Tick> {
        if self.is_empty() {
            return None;
        }
        Some(tick_at(elapsed_ms, self.tick_duration_ms).min(self.total_ticks - 1))
    }

    pub fn visuals_at(&self, tick: Tick) -> &[VisualEvent] {
        events_at_tick(&self.visuals, tick)
    }

    pub fn audio_at(&self, tick: Tick) -> &[AudioEvent] {
        events_at_tick(&self.audio, tick)
    }
}

impl Timed for VisualEvent {
    fn tick(&self) -> Tick {
        self.tick
    }
}

impl Timed for AudioEvent {
    fn tick(&self) -> Tick {
        self.tick
    }
}
