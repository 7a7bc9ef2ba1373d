use std::{cell::RefCell, rc::Rc, sync::Arc};

use stimulus_timeline_core::{
    find_current_event, find_current_event_linear, AssetEntry, AssetIndex, AudioDispatchFailure,
    AudioEvent, AudioKind, AudioPolicy, Block, BlockLayout, Channel, CompilerSettings,
    OperatorKind, PlayerOptions, ResolvedTimeline, RuntimePlayer, SimulatedDisplay, TickCursor,
    Timeline, TimelineCompiler,
};

const MOTIONS: [&str; 5] = ["wave", "clap", "reach", "march", "spin"];

fn blocks() -> Vec<Block> {
    use stimulus_timeline_core::OperatorDescriptor as Op;
    vec![
        Block::new(MOTIONS[0], Op::binary(), Op::progressive("leftToRight")),
        Block::new(MOTIONS[1], Op::drop(), Op::binary()),
        Block::new(MOTIONS[2], Op::progressive("topToBottom"), Op::drop()),
        Block::new(MOTIONS[3], Op::binary(), Op::binary()),
        Block::new(MOTIONS[4], Op::drop(), Op::progressive("rightToLeft")),
    ]
}

fn assets() -> AssetIndex {
    let mut index = AssetIndex::new();
    for motion in MOTIONS {
        for channel in Channel::ALL {
            for variant in 0..4 {
                index.register(
                    motion,
                    channel,
                    variant,
                    AssetEntry::new(format!("{motion}-{channel}-{variant}.png"))
                        .with_background(format!("{motion}-bg-{variant}.png")),
                );
            }
        }
    }
    index
}

fn compiler() -> TimelineCompiler {
    TimelineCompiler::new(CompilerSettings::for_frequency(
        12.0,
        BlockLayout::default(),
        AudioPolicy::ActionOnset,
    ))
}

fn resolve(seed: u64) -> ResolvedTimeline {
    compiler()
        .compile(&blocks(), &assets(), seed, "presets")
        .unwrap()
}

fn compile(seed: u64) -> Timeline {
    compiler()
        .compile_timeline(&blocks(), &assets(), seed, "presets")
        .unwrap()
}

#[test]
fn five_block_session_has_expected_shape() {
    let timeline = compile(42);

    assert_eq!(timeline.total_ticks, 250);
    assert_eq!(timeline.block_count(), 5);
    assert!((timeline.tick_duration_ms - 1000.0 / 12.0).abs() < 1e-9);
    assert_eq!(timeline.visuals.len(), 220);
    assert_eq!(timeline.visuals.first().unwrap().tick, 0);
    assert_eq!(timeline.visuals.last().unwrap().tick, 249);

    let cue_ticks: Vec<u64> = timeline.audio.iter().map(|event| event.tick).collect();
    assert_eq!(cue_ticks, [10, 30, 60, 80, 110, 130, 160, 180, 210, 230]);
    assert!(timeline
        .audio
        .iter()
        .all(|event| event.kind == AudioKind::CueStart));
}

#[test]
fn operators_appear_in_authored_order() {
    let timeline = compile(42);
    let expected = [
        (OperatorKind::Binary, OperatorKind::Progressive),
        (OperatorKind::Drop, OperatorKind::Binary),
        (OperatorKind::Progressive, OperatorKind::Drop),
        (OperatorKind::Binary, OperatorKind::Binary),
        (OperatorKind::Drop, OperatorKind::Progressive),
    ];
    for (block_index, (set1, set2)) in expected.into_iter().enumerate() {
        for (channel, operator) in [(Channel::Set1, set1), (Channel::Set2, set2)] {
            let kinds: Vec<_> = timeline
                .visuals
                .iter()
                .filter(|event| event.block_index == block_index && event.channel == Some(channel))
                .map(|event| event.kind.operator())
                .collect();
            assert!(!kinds.is_empty());
            assert!(kinds.iter().all(|kind| *kind == Some(operator)));
        }
    }
}

#[test]
fn same_seed_reproduces_the_timeline() {
    assert_eq!(compile(42), compile(42));
    assert_eq!(resolve(42), resolve(42));
    assert_eq!(
        serde_json::to_string(&compile(42)).unwrap(),
        serde_json::to_string(&compile(42)).unwrap()
    );
}

#[test]
fn other_seed_changes_only_variants() {
    let a = compile(42);
    let b = compile(7);

    let shape = |timeline: &Timeline| -> Vec<_> {
        timeline
            .visuals
            .iter()
            .map(|event| (event.tick, event.channel, event.kind.operator()))
            .collect()
    };
    assert_eq!(shape(&a), shape(&b));
    assert_eq!(a.audio, b.audio);

    let variants = |resolved: &ResolvedTimeline| -> Vec<u32> {
        resolved
            .blocks
            .iter()
            .flat_map(|block| block.channels.iter().map(|channel| channel.variant))
            .collect()
    };
    assert_ne!(variants(&resolve(42)), variants(&resolve(7)));
}

#[test]
fn cursor_lookup_matches_full_scan() {
    let timeline = compile(42);
    let mut cursor = TickCursor::new();
    let mut elapsed = 0.0;
    while elapsed < 21_000.0 {
        let fast = find_current_event(
            &timeline.visuals,
            elapsed,
            timeline.tick_duration_ms,
            &mut cursor,
        );
        let slow =
            find_current_event_linear(&timeline.visuals, elapsed, timeline.tick_duration_ms);
        assert_eq!(fast, slow, "elapsed {elapsed}");
        elapsed += 7.3;
    }
}

#[test]
fn full_playback_hears_every_cue_once() {
    let timeline = Arc::new(compile(42));
    let heard = Rc::new(RefCell::new(Vec::new()));
    let ended = Rc::new(RefCell::new(0));

    let sink_log = Rc::clone(&heard);
    let end_count = Rc::clone(&ended);
    let mut player = RuntimePlayer::new(Arc::clone(&timeline), PlayerOptions::default())
        .with_audio_sink(move |event: &AudioEvent| -> Result<(), AudioDispatchFailure> {
            sink_log.borrow_mut().push(event.tick);
            Ok(())
        })
        .with_on_ended(move || *end_count.borrow_mut() += 1);

    let mut display = SimulatedDisplay::new(60.0, 0.0, 0);
    player.play(display.now_ms());
    let mut last_tick = 0;
    for _ in 0..5_000 {
        let frame = player.on_frame(display.next_timestamp());
        let tick = frame.tick.unwrap();
        assert!(tick >= last_tick && tick <= last_tick + 1);
        last_tick = tick;
        if frame.ended {
            break;
        }
    }

    assert_eq!(last_tick, 249);
    assert_eq!(*ended.borrow(), 1);
    assert_eq!(
        *heard.borrow(),
        [10, 30, 60, 80, 110, 130, 160, 180, 210, 230]
    );
    assert!(!player.state().is_playing);
}
