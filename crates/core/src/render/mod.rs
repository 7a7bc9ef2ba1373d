//! Stateless frame description.
//!
//! [`render_frame`] is a pure function of `(elapsed_ms, &Timeline)`: it keeps
//! nothing between calls, so the primary renderer and a debug overlay reading
//! the same pair always agree. Drawing the description is left to the host.

use serde::{Deserialize, Serialize};

use crate::{
    events_at_tick, AssetHandle, Channel, SpanPhase, Tick, Timed, Timeline, VisualKind, WipeStyle,
};

pub mod inspect;

pub use inspect::{inspect, TickInspection};

/// Everything to draw for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescription {
    /// `None` when the timeline is empty.
    pub tick: Option<Tick>,
    pub layers: Vec<Layer>,
}

impl FrameDescription {
    pub fn is_blank(&self) -> bool {
        self.layers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "camelCase")]
pub enum Layer {
    Explain {
        block_index: usize,
        motion_id: String,
    },
    Transition {
        block_index: usize,
    },
    Flash {
        channel: Channel,
        on: bool,
        asset: AssetHandle,
    },
    /// Foreground clipped at `progress` along `style` over the background.
    Wipe {
        channel: Channel,
        style: WipeStyle,
        progress: f32,
        foreground: AssetHandle,
        background: AssetHandle,
    },
    FallingObjects {
        channel: Channel,
        objects: Vec<FallingObject>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallingObject {
    pub obj_index: u32,
    pub asset: AssetHandle,
    /// How far the object has fallen, in `[0, 1)`.
    pub fall: f32,
}

/// Describes the frame shown at `elapsed_ms`.
pub fn render_frame(elapsed_ms: f64, timeline: &Timeline) -> FrameDescription {
    let Some(tick) = timeline.tick_at(elapsed_ms) else {
        return FrameDescription::default();
    };
    let mut frame = FrameDescription {
        tick: Some(tick),
        layers: Vec::new(),
    };

    let current = events_at_tick(&timeline.visuals, tick);
    if let Some(exclusive) = current.iter().find(|event| event.kind.is_exclusive()) {
        let layer = match &exclusive.kind {
            VisualKind::Explain { motion_id } => Layer::Explain {
                block_index: exclusive.block_index,
                motion_id: motion_id.clone(),
            },
            _ => Layer::Transition {
                block_index: exclusive.block_index,
            },
        };
        frame.layers.push(layer);
        return frame;
    }

    for event in current {
        let Some(channel) = event.channel else {
            continue;
        };
        match &event.kind {
            VisualKind::Binary { on, asset } => frame.layers.push(Layer::Flash {
                channel,
                on: *on,
                asset: asset.clone(),
            }),
            VisualKind::Progressive {
                progress,
                style,
                foreground,
                background,
            } => frame.layers.push(Layer::Wipe {
                channel,
                style: *style,
                progress: *progress,
                foreground: foreground.clone(),
                background: background.clone(),
            }),
            _ => {}
        }
    }

    if let Some(objects) = falling_objects(timeline, tick) {
        frame.layers.push(objects);
    }
    frame
}

// Spawns from the current stimulus sub-span that are still on screen, capped
// to the most recent `max_drop_objects`.
fn falling_objects(timeline: &Timeline, tick: Tick) -> Option<Layer> {
    let layout = &timeline.layout;
    let position = layout.locate(tick)?;
    let channel = position.channel.filter(|_| position.phase == SpanPhase::Stimulus)?;

    let lifetime = layout.drop_lifetime_ticks.max(1) as Tick;
    let window_start = position.start.max((tick + 1).saturating_sub(lifetime));
    let lo = timeline
        .visuals
        .partition_point(|event| event.tick() < window_start);
    let hi = timeline.visuals.partition_point(|event| event.tick() <= tick);

    let mut objects: Vec<FallingObject> = timeline.visuals[lo..hi]
        .iter()
        .filter(|event| event.channel == Some(channel))
        .filter_map(|event| match &event.kind {
            VisualKind::Drop { obj_index, asset } => Some(FallingObject {
                obj_index: *obj_index,
                asset: asset.clone(),
                fall: (tick - event.tick) as f32 / lifetime as f32,
            }),
            _ => None,
        })
        .collect();
    if objects.is_empty() {
        return None;
    }
    let overflow = objects.len().saturating_sub(layout.max_drop_objects);
    objects.drain(..overflow);
    Some(Layer::FallingObjects { channel, objects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AssetEntry, AssetIndex, AudioPolicy, Block, BlockLayout, CompilerSettings,
        OperatorDescriptor, TimelineCompiler,
    };

    fn timeline() -> Timeline {
        let mut assets = AssetIndex::new();
        for channel in Channel::ALL {
            assets.register(
                "reach",
                channel,
                0,
                AssetEntry::new(format!("reach-{channel}.png")).with_background("sky.png"),
            );
        }
        let blocks = vec![
            Block::new(
                "reach",
                OperatorDescriptor::binary(),
                OperatorDescriptor::progressive("bottomToTop"),
            ),
            Block::new("reach", OperatorDescriptor::drop(), OperatorDescriptor::drop()),
        ];
        TimelineCompiler::new(CompilerSettings {
            layout: BlockLayout::default(),
            tick_duration_ms: 100.0,
            audio_policy: AudioPolicy::ActionOnset,
        })
        .compile_timeline(&blocks, &assets, 0, "fixed")
        .unwrap()
    }

    #[test]
    fn explain_suppresses_everything_else() {
        let timeline = timeline();
        let frame = render_frame(50.0, &timeline);
        assert_eq!(frame.tick, Some(0));
        assert_eq!(
            frame.layers,
            [Layer::Explain {
                block_index: 0,
                motion_id: "reach".to_string()
            }]
        );
        let frame = render_frame(5_000.0, &timeline);
        assert_eq!(frame.layers, [Layer::Transition { block_index: 1 }]);
    }

    #[test]
    fn flashes_and_wipes_follow_their_events() {
        let timeline = timeline();
        let frame = render_frame(1_150.0, &timeline);
        assert!(matches!(
            frame.layers.as_slice(),
            [Layer::Flash {
                channel: Channel::Set1,
                on: false,
                ..
            }]
        ));

        let frame = render_frame(4_900.0, &timeline);
        match frame.layers.as_slice() {
            [Layer::Wipe {
                progress, style, ..
            }] => {
                assert_eq!(*progress, 1.0);
                assert_eq!(*style, WipeStyle::BottomToTop);
            }
            other => panic!("unexpected layers {other:?}"),
        }
    }

    #[test]
    fn falling_objects_are_windowed_and_capped() {
        let timeline = timeline();
        // Block 1 set1 spans ticks 60..80 with spawns every 2nd tick.
        let frame = render_frame(6_100.0, &timeline);
        match frame.layers.as_slice() {
            [Layer::FallingObjects { channel, objects }] => {
                assert_eq!(*channel, Channel::Set1);
                assert_eq!(objects.len(), 1);
                assert_eq!(objects[0].fall, 1.0 / 8.0);
            }
            other => panic!("unexpected layers {other:?}"),
        }

        let frame = render_frame(7_500.0, &timeline);
        match frame.layers.as_slice() {
            [Layer::FallingObjects { objects, .. }] => {
                let indices: Vec<u32> = objects.iter().map(|o| o.obj_index).collect();
                assert_eq!(indices, [4, 5, 6, 7]);
                assert!(objects.iter().all(|o| (0.0..1.0).contains(&o.fall)));
            }
            other => panic!("unexpected layers {other:?}"),
        }

        // Set2 starts fresh: nothing from set1 carries over.
        let frame = render_frame(8_000.0, &timeline);
        match frame.layers.as_slice() {
            [Layer::FallingObjects { channel, objects }] => {
                assert_eq!(*channel, Channel::Set2);
                assert_eq!(objects.len(), 1);
                assert_eq!(objects[0].obj_index, 0);
            }
            other => panic!("unexpected layers {other:?}"),
        }
    }

    #[test]
    fn rendering_is_independent_of_call_history() {
        let timeline = timeline();
        let forward: Vec<_> = (0..100)
            .map(|tick| render_frame(tick as f64 * 100.0 + 10.0, &timeline))
            .collect();
        let backward: Vec<_> = (0..100)
            .rev()
            .map(|tick| render_frame(tick as f64 * 100.0 + 10.0, &timeline))
            .collect();
        assert!(forward.iter().eq(backward.iter().rev()));
    }

    #[test]
    fn empty_timeline_renders_blank() {
        let timeline = Timeline {
            visuals: Vec::new(),
            audio: Vec::new(),
            total_ticks: 0,
            tick_duration_ms: 100.0,
            layout: BlockLayout::default(),
        };
        let frame = render_frame(1_000.0, &timeline);
        assert!(frame.is_blank());
        assert_eq!(frame.tick, None);
    }
}
