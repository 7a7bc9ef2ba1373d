use serde::{Deserialize, Serialize};

use crate::{Channel, OperatorKind, SpanPhase, Tick, Timeline};

/// Decoded view of the tick shown at a point in time. Meant for
/// verification and debug overlays, not for driving stimuli.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickInspection {
    pub tick: Tick,
    pub block_index: usize,
    pub channel: Option<Channel>,
    pub operator: Option<OperatorKind>,
    pub phase: SpanPhase,
    pub sub_frame_index: u32,
}

pub fn inspect(elapsed_ms: f64, timeline: &Timeline) -> Option<TickInspection> {
    let tick = timeline.tick_at(elapsed_ms)?;
    let position = timeline.layout.locate(tick)?;

    // Every stimulus sub-span opens with an event, so the latest event of the
    // channel at or before `tick` carries its operator.
    let operator = position.channel.and_then(|channel| {
        let end = timeline.visuals.partition_point(|event| event.tick <= tick);
        timeline.visuals[..end]
            .iter()
            .rev()
            .take_while(|event| event.tick >= position.start)
            .find(|event| event.channel == Some(channel))
            .and_then(|event| event.kind.operator())
    });

    Some(TickInspection {
        tick,
        block_index: position.block_index,
        channel: position.channel,
        operator,
        phase: position.phase,
        sub_frame_index: position.offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AssetEntry, AssetIndex, AudioPolicy, Block, BlockLayout, CompilerSettings,
        OperatorDescriptor, TimelineCompiler,
    };

    #[test]
    fn decodes_block_channel_and_operator() {
        let mut assets = AssetIndex::new();
        for channel in Channel::ALL {
            assets.register("sway", channel, 0, AssetEntry::new("sway.png"));
        }
        let blocks = vec![
            Block::new("sway", OperatorDescriptor::binary(), OperatorDescriptor::drop()),
            Block::new("sway", OperatorDescriptor::drop(), OperatorDescriptor::binary()),
        ];
        let timeline = TimelineCompiler::new(CompilerSettings {
            layout: BlockLayout::default(),
            tick_duration_ms: 10.0,
            audio_policy: AudioPolicy::ActionOnset,
        })
        .compile_timeline(&blocks, &assets, 3, "fixed")
        .unwrap();

        let info = inspect(335.0, &timeline).unwrap();
        assert_eq!(info.tick, 33);
        assert_eq!(info.block_index, 0);
        assert_eq!(info.channel, Some(Channel::Set2));
        assert_eq!(info.operator, Some(OperatorKind::Drop));
        assert_eq!(info.phase, SpanPhase::Stimulus);
        assert_eq!(info.sub_frame_index, 3);

        let info = inspect(505.0, &timeline).unwrap();
        assert_eq!(info.block_index, 1);
        assert_eq!(info.phase, SpanPhase::Transition);
        assert_eq!(info.operator, None);

        let info = inspect(610.0, &timeline).unwrap();
        assert_eq!(info.operator, Some(OperatorKind::Drop));
        assert_eq!(info.sub_frame_index, 1);

        assert!(inspect(0.0, &Timeline { total_ticks: 0, ..timeline }).is_none());
    }
}
