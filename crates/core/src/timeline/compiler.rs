//! Deterministic expansion of authored blocks into a [`Timeline`].
//!
//! Compilation runs in two stages. [`TimelineCompiler::compile`] validates
//! the authored input and resolves every asset, drawing from a `ChaCha8Rng`
//! seeded with the caller's seed. [`build_timeline`] then expands the
//! resolved blocks into tick-indexed events without touching any randomness.
//! The same `(blocks, assets, seed, policy)` always yields the same timeline.

use std::{fmt, str::FromStr};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    AssetEntry, AssetIndex, AudioEvent, AudioKind, BlockLayout, Channel, CompileError,
    ResolutionPolicy, Tick, Timeline, VisualEvent, VisualKind,
};

/// Authored, unvalidated operator as it arrives from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl OperatorDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            style: None,
        }
    }

    pub fn binary() -> Self {
        Self::new("BINARY")
    }

    pub fn progressive(style: impl Into<String>) -> Self {
        Self {
            kind: "PROGRESSIVE".to_string(),
            style: Some(style.into()),
        }
    }

    pub fn drop() -> Self {
        Self::new("DROP")
    }
}

/// One authored unit: a motion and an operator for each channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub motion_id: String,
    pub set1: OperatorDescriptor,
    pub set2: OperatorDescriptor,
}

impl Block {
    pub fn new(
        motion_id: impl Into<String>,
        set1: OperatorDescriptor,
        set2: OperatorDescriptor,
    ) -> Self {
        Self {
            motion_id: motion_id.into(),
            set1,
            set2,
        }
    }

    pub fn operator(&self, channel: Channel) -> &OperatorDescriptor {
        match channel {
            Channel::Set1 => &self.set1,
            Channel::Set2 => &self.set2,
        }
    }
}

/// Direction the foreground is revealed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WipeStyle {
    #[default]
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

impl FromStr for WipeStyle {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "lefttoright" | "wipe" | "ltr" => Ok(WipeStyle::LeftToRight),
            "righttoleft" | "rtl" => Ok(WipeStyle::RightToLeft),
            "toptobottom" | "ttb" => Ok(WipeStyle::TopToBottom),
            "bottomtotop" | "btt" => Ok(WipeStyle::BottomToTop),
            _ => Err(()),
        }
    }
}

/// Validated channel behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Binary,
    Progressive { style: WipeStyle },
    Drop,
}

impl Operator {
    pub fn parse(
        descriptor: &OperatorDescriptor,
        block: usize,
        channel: Channel,
    ) -> Result<Self, CompileError> {
        match descriptor.kind.trim().to_ascii_uppercase().as_str() {
            "BINARY" => Ok(Operator::Binary),
            "DROP" => Ok(Operator::Drop),
            "PROGRESSIVE" => {
                let style = match descriptor.style.as_deref() {
                    None => WipeStyle::default(),
                    Some(name) => name.parse().map_err(|_| CompileError::UnknownStyle {
                        block,
                        channel,
                        name: name.to_string(),
                    })?,
                };
                Ok(Operator::Progressive { style })
            }
            _ => Err(CompileError::UnknownOperator {
                block,
                channel,
                name: descriptor.kind.clone(),
            }),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Binary => f.write_str("BINARY"),
            Operator::Progressive { .. } => f.write_str("PROGRESSIVE"),
            Operator::Drop => f.write_str("DROP"),
        }
    }
}

/// Which ticks carry audio events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioPolicy {
    /// A cue on the first tick of every stimulus sub-span.
    #[default]
    ActionOnset,
    /// Onset cues, an impact on every later falling-object spawn and a
    /// reward on the last tick of each block.
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerSettings {
    pub layout: BlockLayout,
    pub tick_duration_ms: f64,
    pub audio_policy: AudioPolicy,
}

impl CompilerSettings {
    /// One tick per stimulus cycle at `frequency_hz`.
    pub fn for_frequency(frequency_hz: f64, layout: BlockLayout, audio_policy: AudioPolicy) -> Self {
        Self {
            layout,
            tick_duration_ms: 1000.0 / frequency_hz,
            audio_policy,
        }
    }

    fn validate(&self) -> Result<(), CompileError> {
        self.layout.validate()?;
        if !(self.tick_duration_ms.is_finite() && self.tick_duration_ms > 0.0) {
            return Err(CompileError::InvalidTickDuration(self.tick_duration_ms));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedChannel {
    pub channel: Channel,
    pub operator: Operator,
    pub variant: u32,
    pub asset: AssetEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBlock {
    pub motion_id: String,
    pub channels: [ResolvedChannel; 2],
}

/// Fully validated program, ready for expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTimeline {
    pub blocks: Vec<ResolvedBlock>,
    pub settings: CompilerSettings,
    pub seed: u64,
    pub policy: ResolutionPolicy,
}

#[derive(Debug, Clone)]
pub struct TimelineCompiler {
    settings: CompilerSettings,
}

impl TimelineCompiler {
    pub fn new(settings: CompilerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Validates `blocks` and resolves their assets under the named policy.
    pub fn compile(
        &self,
        blocks: &[Block],
        assets: &AssetIndex,
        seed: u64,
        policy: &str,
    ) -> Result<ResolvedTimeline, CompileError> {
        self.compile_with_policy(blocks, assets, seed, policy.parse()?)
    }

    pub fn compile_with_policy(
        &self,
        blocks: &[Block],
        assets: &AssetIndex,
        seed: u64,
        policy: ResolutionPolicy,
    ) -> Result<ResolvedTimeline, CompileError> {
        self.settings.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut resolved = Vec::with_capacity(blocks.len());

        for (index, block) in blocks.iter().enumerate() {
            if block.motion_id.trim().is_empty() {
                return Err(CompileError::EmptyMotion { block: index });
            }

            let mut resolve_channel = |channel: Channel| -> Result<ResolvedChannel, CompileError> {
                let operator = Operator::parse(block.operator(channel), index, channel)?;
                let (variant, entry) =
                    assets.resolve(index, &block.motion_id, channel, policy, &mut rng)?;
                if matches!(operator, Operator::Progressive { .. }) && entry.background.is_none() {
                    return Err(CompileError::MissingBackground {
                        block: index,
                        motion: block.motion_id.clone(),
                        channel,
                    });
                }
                Ok(ResolvedChannel {
                    channel,
                    operator,
                    variant,
                    asset: entry.clone(),
                })
            };

            let set1 = resolve_channel(Channel::Set1)?;
            let set2 = resolve_channel(Channel::Set2)?;
            resolved.push(ResolvedBlock {
                motion_id: block.motion_id.clone(),
                channels: [set1, set2],
            });
        }

        tracing::debug!(
            blocks = resolved.len(),
            seed,
            %policy,
            "resolved stimulus program"
        );

        Ok(ResolvedTimeline {
            blocks: resolved,
            settings: self.settings.clone(),
            seed,
            policy,
        })
    }

    /// Convenience for `compile` followed by [`build_timeline`].
    pub fn compile_timeline(
        &self,
        blocks: &[Block],
        assets: &AssetIndex,
        seed: u64,
        policy: &str,
    ) -> Result<Timeline, CompileError> {
        self.compile(blocks, assets, seed, policy)
            .and_then(|resolved| build_timeline(&resolved))
    }
}

/// Expands resolved blocks into tick-indexed visual and audio events.
///
/// The settings and every progressive background are checked again, so a
/// `ResolvedTimeline` edited or deserialized after [`TimelineCompiler::compile`]
/// fails here instead of producing a partial timeline.
pub fn build_timeline(resolved: &ResolvedTimeline) -> Result<Timeline, CompileError> {
    resolved.settings.validate()?;
    let layout = &resolved.settings.layout;
    let policy = resolved.settings.audio_policy;
    let mut visuals = Vec::new();
    let mut audio = Vec::new();

    for (block_index, block) in resolved.blocks.iter().enumerate() {
        let block_start = layout.block_start(block_index);
        let transition = layout.transition_len(block_index);

        for offset in 0..layout.explain_ticks {
            let kind = if offset < transition {
                VisualKind::Transition
            } else {
                VisualKind::Explain {
                    motion_id: block.motion_id.clone(),
                }
            };
            visuals.push(VisualEvent {
                tick: block_start + offset as Tick,
                block_index,
                channel: None,
                kind,
            });
        }

        for resolved_channel in &block.channels {
            expand_channel(
                layout,
                policy,
                block_index,
                &block.motion_id,
                resolved_channel,
                &mut visuals,
                &mut audio,
            )?;
        }

        if policy == AudioPolicy::Full {
            audio.push(AudioEvent {
                tick: block_start + layout.block_ticks() - 1,
                block_index,
                channel: None,
                kind: AudioKind::Reward,
            });
        }
    }

    debug_assert!(visuals.windows(2).all(|pair| pair[0].tick <= pair[1].tick));
    debug_assert!(audio.windows(2).all(|pair| pair[0].tick <= pair[1].tick));

    let timeline = Timeline {
        visuals,
        audio,
        total_ticks: resolved.blocks.len() as Tick * layout.block_ticks(),
        tick_duration_ms: resolved.settings.tick_duration_ms,
        layout: layout.clone(),
    };
    tracing::debug!(
        total_ticks = timeline.total_ticks,
        visuals = timeline.visuals.len(),
        audio = timeline.audio.len(),
        "built timeline"
    );
    Ok(timeline)
}

fn expand_channel(
    layout: &BlockLayout,
    policy: AudioPolicy,
    block_index: usize,
    motion_id: &str,
    resolved: &ResolvedChannel,
    visuals: &mut Vec<VisualEvent>,
    audio: &mut Vec<AudioEvent>,
) -> Result<(), CompileError> {
    let channel = resolved.channel;
    let start = layout.channel_start(block_index, channel);
    let span = layout.set_ticks;
    let image = &resolved.asset.image;
    let event = |offset: u32, kind: VisualKind| VisualEvent {
        tick: start + offset as Tick,
        block_index,
        channel: Some(channel),
        kind,
    };
    let cue = |offset: u32, kind: AudioKind| AudioEvent {
        tick: start + offset as Tick,
        block_index,
        channel: Some(channel),
        kind,
    };

    audio.push(cue(0, AudioKind::CueStart));

    match resolved.operator {
        Operator::Binary => {
            for offset in 0..span {
                visuals.push(event(
                    offset,
                    VisualKind::Binary {
                        on: offset % 2 == 0,
                        asset: image.clone(),
                    },
                ));
            }
        }
        Operator::Progressive { style } => {
            let background = resolved.asset.background.clone().ok_or_else(|| {
                CompileError::MissingBackground {
                    block: block_index,
                    motion: motion_id.to_string(),
                    channel,
                }
            })?;
            for offset in 0..span {
                let progress = if span == 1 {
                    1.0
                } else {
                    offset as f32 / (span - 1) as f32
                };
                visuals.push(event(
                    offset,
                    VisualKind::Progressive {
                        progress,
                        style,
                        foreground: image.clone(),
                        background: background.clone(),
                    },
                ));
            }
        }
        Operator::Drop => {
            let spawns = (0..span).step_by(layout.drop_cadence as usize);
            for (obj_index, offset) in spawns.enumerate() {
                visuals.push(event(
                    offset,
                    VisualKind::Drop {
                        obj_index: obj_index as u32,
                        asset: image.clone(),
                    },
                ));
                if policy == AudioPolicy::Full && obj_index > 0 {
                    audio.push(cue(offset, AudioKind::Impact));
                }
            }
        }
    }
    Ok(())
}
