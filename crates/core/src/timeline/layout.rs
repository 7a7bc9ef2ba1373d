use serde::{Deserialize, Serialize};

use crate::{Channel, CompileError, Tick};

/// Fixed tick proportions shared by every block of a session.
///
/// A block is laid out as `explain | set1 | set2`. The transition between two
/// blocks occupies the first `transition_ticks` of the explain window of the
/// later block, so the first block never has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockLayout {
    pub explain_ticks: u32,
    pub set_ticks: u32,
    pub transition_ticks: u32,
    /// Ticks between two falling-object spawns.
    pub drop_cadence: u32,
    /// Ticks a falling object stays on screen.
    pub drop_lifetime_ticks: u32,
    /// Most falling objects drawn at once per channel.
    pub max_drop_objects: usize,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self {
            explain_ticks: 10,
            set_ticks: 20,
            transition_ticks: 2,
            drop_cadence: 2,
            drop_lifetime_ticks: 8,
            max_drop_objects: 4,
        }
    }
}

/// Which part of a block a tick falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpanPhase {
    Transition,
    Explain,
    Stimulus,
}

/// Decoded position of a tick inside the block grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanPosition {
    pub block_index: usize,
    pub phase: SpanPhase,
    pub channel: Option<Channel>,
    /// First tick of the sub-span.
    pub start: Tick,
    /// Offset of the tick from `start`.
    pub offset: u32,
}

impl BlockLayout {
    pub fn block_ticks(&self) -> Tick {
        self.explain_ticks as Tick + 2 * self.set_ticks as Tick
    }

    pub fn validate(&self) -> Result<(), CompileError> {
        if self.set_ticks == 0 {
            return Err(CompileError::InvalidLayout("stimulus sub-span must be at least one tick"));
        }
        if self.transition_ticks > self.explain_ticks {
            return Err(CompileError::InvalidLayout(
                "transition cannot be longer than the explain window",
            ));
        }
        if self.drop_cadence == 0 {
            return Err(CompileError::InvalidLayout("drop cadence must be at least one tick"));
        }
        if self.drop_lifetime_ticks == 0 || self.max_drop_objects == 0 {
            return Err(CompileError::InvalidLayout("drop window must hold at least one object"));
        }
        Ok(())
    }

    pub fn block_start(&self, block_index: usize) -> Tick {
        block_index as Tick * self.block_ticks()
    }

    /// Number of leading explain ticks rendered as a transition.
    pub fn transition_len(&self, block_index: usize) -> u32 {
        if block_index == 0 {
            0
        } else {
            self.transition_ticks
        }
    }

    /// First tick of a channel's stimulus sub-span.
    pub fn channel_start(&self, block_index: usize, channel: Channel) -> Tick {
        self.block_start(block_index)
            + self.explain_ticks as Tick
            + channel.index() as Tick * self.set_ticks as Tick
    }

    /// Decodes `tick` into its block, phase and sub-span offset. The caller
    /// is responsible for checking the tick against the timeline length.
    pub fn locate(&self, tick: Tick) -> Option<SpanPosition> {
        let block_ticks = self.block_ticks();
        if block_ticks == 0 {
            return None;
        }
        let block_index = (tick / block_ticks) as usize;
        let block_start = self.block_start(block_index);
        let offset = (tick - block_start) as u32;

        let transition = self.transition_len(block_index);
        let position = if offset < transition {
            SpanPosition {
                block_index,
                phase: SpanPhase::Transition,
                channel: None,
                start: block_start,
                offset,
            }
        } else if offset < self.explain_ticks {
            SpanPosition {
                block_index,
                phase: SpanPhase::Explain,
                channel: None,
                start: block_start + transition as Tick,
                offset: offset - transition,
            }
        } else {
            let stimulus = offset - self.explain_ticks;
            let channel = if stimulus < self.set_ticks {
                Channel::Set1
            } else {
                Channel::Set2
            };
            let start = self.channel_start(block_index, channel);
            SpanPosition {
                block_index,
                phase: SpanPhase::Stimulus,
                channel: Some(channel),
                start,
                offset: (tick - start) as u32,
            }
        };
        Some(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_block_is_fifty_ticks() {
        let layout = BlockLayout::default();
        assert_eq!(layout.block_ticks(), 50);
        assert_eq!(layout.channel_start(0, Channel::Set1), 10);
        assert_eq!(layout.channel_start(2, Channel::Set2), 130);
    }

    #[test]
    fn locates_every_sub_span() {
        let layout = BlockLayout::default();

        let first = layout.locate(0).unwrap();
        assert_eq!(first.phase, SpanPhase::Explain);
        assert_eq!(first.offset, 0);

        let transition = layout.locate(51).unwrap();
        assert_eq!(transition.block_index, 1);
        assert_eq!(transition.phase, SpanPhase::Transition);
        assert_eq!(transition.offset, 1);

        let explain = layout.locate(53).unwrap();
        assert_eq!(explain.phase, SpanPhase::Explain);
        assert_eq!(explain.offset, 1);

        let set1 = layout.locate(60).unwrap();
        assert_eq!(set1.channel, Some(Channel::Set1));
        assert_eq!(set1.offset, 0);

        let set2 = layout.locate(99).unwrap();
        assert_eq!(set2.channel, Some(Channel::Set2));
        assert_eq!(set2.start, 80);
        assert_eq!(set2.offset, 19);
    }

    #[test]
    fn rejects_degenerate_layouts() {
        let layout = BlockLayout {
            set_ticks: 0,
            ..BlockLayout::default()
        };
        assert!(layout.validate().is_err());

        let layout = BlockLayout {
            transition_ticks: 11,
            ..BlockLayout::default()
        };
        assert!(layout.validate().is_err());
    }
}
