use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use stimulus_timeline_core::{
    inspect, refresh_rate, snap_to_refresh_rate, AudioDispatchFailure, AudioEvent,
    CompilerSettings, EdgeClock, EngineConfig, Program, RuntimePlayer, SimulatedDisplay, Timeline,
    TimelineCompiler,
};
use tracing_subscriber::EnvFilter;

// Frame callbacks a simulation may consume before giving up on the end.
const MAX_SIMULATED_FRAMES: usize = 1_000_000;

fn main() -> stimulus_timeline_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Compile {
            program,
            seed,
            policy,
            frequency,
            output,
        } => run_compile(&config, &program, seed, &policy, frequency, output.as_deref()),
        Commands::Snap {
            requested,
            measured,
        } => run_snap(&config, requested, measured),
        Commands::Measure {
            refresh,
            jitter,
            seed,
        } => run_measure(&config, refresh, jitter, seed),
        Commands::Simulate {
            program,
            seed,
            policy,
            frequency,
            refresh,
            jitter,
        } => run_simulate(&config, &program, seed, &policy, frequency, refresh, jitter),
    }
}

fn compile(
    config: &EngineConfig,
    program: &Path,
    seed: u64,
    policy: &str,
    frequency: f64,
) -> stimulus_timeline_core::Result<Timeline> {
    let program = Program::from_json_file(program)?;
    let settings = CompilerSettings::for_frequency(frequency, config.layout.clone(), config.audio);
    let timeline = TimelineCompiler::new(settings).compile_timeline(
        &program.blocks,
        &program.asset_index(),
        seed,
        policy,
    )?;
    tracing::info!(
        blocks = timeline.block_count(),
        total_ticks = timeline.total_ticks,
        visuals = timeline.visuals.len(),
        audio = timeline.audio.len(),
        tick_ms = timeline.tick_duration_ms,
        "compiled timeline"
    );
    Ok(timeline)
}

fn run_compile(
    config: &EngineConfig,
    program: &Path,
    seed: u64,
    policy: &str,
    frequency: f64,
    output: Option<&Path>,
) -> stimulus_timeline_core::Result<()> {
    let timeline = compile(config, program, seed, policy, frequency)?;
    let json = serde_json::to_string_pretty(&timeline)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!(?path, "wrote timeline");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_snap(
    config: &EngineConfig,
    requested: f64,
    measured: f64,
) -> stimulus_timeline_core::Result<()> {
    let snapped = snap_to_refresh_rate(requested, measured, &config.frequency);
    tracing::info!(requested, measured, snapped, "snapped frequency");
    println!("{snapped:.4}");
    Ok(())
}

fn run_measure(
    config: &EngineConfig,
    refresh: f64,
    jitter: f64,
    seed: u64,
) -> stimulus_timeline_core::Result<()> {
    let mut display = SimulatedDisplay::new(refresh, jitter, seed);
    let measurement = refresh_rate(&mut display, &config.frequency);
    println!("{}", serde_json::to_string_pretty(&measurement)?);
    Ok(())
}

fn run_simulate(
    config: &EngineConfig,
    program: &Path,
    seed: u64,
    policy: &str,
    frequency: f64,
    refresh: f64,
    jitter: f64,
) -> stimulus_timeline_core::Result<()> {
    let mut display = SimulatedDisplay::new(refresh, jitter, seed);
    let measurement = refresh_rate(&mut display, &config.frequency);
    let snapped = snap_to_refresh_rate(frequency, measurement.refresh_hz, &config.frequency);
    tracing::info!(
        measured_hz = measurement.refresh_hz,
        requested_hz = frequency,
        snapped_hz = snapped,
        "corrected stimulus frequency"
    );

    let timeline = Arc::new(compile(config, program, seed, policy, snapped)?);
    let cues = Rc::new(RefCell::new(0usize));
    let sink_cues = Rc::clone(&cues);
    let mut player = RuntimePlayer::new(Arc::clone(&timeline), config.player.clone())
        .with_audio_sink(move |event: &AudioEvent| -> Result<(), AudioDispatchFailure> {
            tracing::info!(
                tick = event.tick,
                block = event.block_index,
                kind = ?event.kind,
                "audio cue"
            );
            *sink_cues.borrow_mut() += 1;
            Ok(())
        });
    let mut edges = EdgeClock::for_frequency(snapped);

    let start_ms = display.now_ms();
    player.play(start_ms);
    edges.start(start_ms);

    let mut frames = 0;
    let mut last_block = None;
    let mut ended = timeline.is_empty();
    while !ended && frames < MAX_SIMULATED_FRAMES {
        let now = display.next_timestamp();
        let frame = player.on_frame(now);
        edges.on_frame(now);
        frames += 1;

        if let Some(info) = inspect(frame.state.elapsed_ms, &timeline) {
            if last_block != Some(info.block_index) {
                last_block = Some(info.block_index);
                tracing::debug!(block = info.block_index, tick = info.tick, "entered block");
            }
        }
        ended = frame.ended;
    }

    let now = display.now_ms();
    let summary = serde_json::json!({
        "frames": frames,
        "ended": ended,
        "elapsedMs": player.state().elapsed_ms,
        "totalTicks": timeline.total_ticks,
        "audioCues": *cues.borrow(),
        "snappedHz": snapped,
        "edgeToggles": edges.toggles(),
        "edgeRateHz": edges.measured_toggle_rate_hz(now),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic stimulus timeline engine", long_about = None)]
struct Cli {
    /// Optional JSON engine configuration.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a program file into a timeline.
    Compile {
        /// Path to the program JSON (blocks and assets).
        program: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
        /// Asset resolution policy: `fixed` or `presets`.
        #[arg(short, long, default_value = "fixed")]
        policy: String,
        /// Stimulus frequency in Hz; one tick per cycle.
        #[arg(short, long, default_value_t = 10.0)]
        frequency: f64,
        /// Write the timeline here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Snap a requested frequency to a measured refresh rate.
    Snap { requested: f64, measured: f64 },
    /// Measure the refresh rate of a simulated display.
    Measure {
        #[arg(long, default_value_t = 60.0)]
        refresh: f64,
        #[arg(long, default_value_t = 0.1)]
        jitter: f64,
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
    },
    /// Play a program against a simulated display until it ends.
    Simulate {
        program: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
        #[arg(short, long, default_value = "fixed")]
        policy: String,
        #[arg(short, long, default_value_t = 10.0)]
        frequency: f64,
        #[arg(long, default_value_t = 60.0)]
        refresh: f64,
        #[arg(long, default_value_t = 0.1)]
        jitter: f64,
    },
}
