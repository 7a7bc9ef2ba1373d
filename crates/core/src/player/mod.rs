//! Runtime player: the single owner of playback state.
//!
//! Each host callback goes through [`RuntimePlayer::on_frame`], which always
//! advances time, derives the tick, dispatches that tick's audio and renders,
//! in that order and exactly once.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    render::{render_frame, FrameDescription},
    AudioDispatchFailure, AudioEvent, ClockConfig, PlaybackClock, Tick, TickCursor, Timeline,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerOptions {
    /// Start playing on the first frame callback.
    pub auto_play: bool,
    pub speed: f64,
    /// Largest wall-clock gap between two callbacks that counts as playback.
    pub max_delta_ms: f64,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            auto_play: false,
            speed: 1.0,
            max_delta_ms: ClockConfig::default().max_delta_ms,
        }
    }
}

/// Snapshot of the player's state. Copies only; nothing outside the player
/// can change the original.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub elapsed_ms: f64,
    pub is_playing: bool,
    /// Tick whose audio was last dispatched; audio fires only when the
    /// current tick differs from it.
    pub last_dispatched_tick: Option<Tick>,
}

/// Realizes audio events. Starting a sound may fail; the player logs the
/// failure and keeps going.
pub trait AudioSink {
    fn dispatch(&mut self, event: &AudioEvent) -> Result<(), AudioDispatchFailure>;
}

impl<F> AudioSink for F
where
    F: FnMut(&AudioEvent) -> Result<(), AudioDispatchFailure>,
{
    fn dispatch(&mut self, event: &AudioEvent) -> Result<(), AudioDispatchFailure> {
        self(event)
    }
}

/// Output of one host callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub tick: Option<Tick>,
    pub state: PlaybackState,
    pub description: FrameDescription,
    /// Playback reached the end during this callback.
    pub ended: bool,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    wall_ms: f64,
    elapsed_ms: f64,
}

pub struct RuntimePlayer {
    timeline: Arc<Timeline>,
    options: PlayerOptions,
    state: PlaybackState,
    anchor: Option<Anchor>,
    clock: PlaybackClock,
    audio_cursor: TickCursor,
    audio_sink: Option<Box<dyn AudioSink>>,
    on_ended: Option<Box<dyn FnMut()>>,
    ended_notified: bool,
    autoplay_pending: bool,
}

impl RuntimePlayer {
    pub fn new(timeline: Arc<Timeline>, options: PlayerOptions) -> Self {
        let clock = PlaybackClock::new(&ClockConfig {
            max_delta_ms: options.max_delta_ms,
            ..ClockConfig::default()
        });
        Self {
            timeline,
            autoplay_pending: options.auto_play,
            options,
            state: PlaybackState::default(),
            anchor: None,
            clock,
            audio_cursor: TickCursor::new(),
            audio_sink: None,
            on_ended: None,
            ended_notified: false,
        }
    }

    pub fn with_audio_sink(mut self, sink: impl AudioSink + 'static) -> Self {
        self.audio_sink = Some(Box::new(sink));
        self
    }

    pub fn with_on_ended(mut self, on_ended: impl FnMut() + 'static) -> Self {
        self.on_ended = Some(Box::new(on_ended));
        self
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_tick(&self) -> Option<Tick> {
        self.timeline.tick_at(self.state.elapsed_ms)
    }

    /// Starts or resumes playback, anchoring elapsed time at `now_ms`.
    pub fn play(&mut self, now_ms: f64) {
        self.autoplay_pending = false;
        if self.state.is_playing {
            return;
        }
        self.anchor = Some(Anchor {
            wall_ms: now_ms,
            elapsed_ms: self.state.elapsed_ms,
        });
        self.clock.resume(now_ms);
        self.state.is_playing = true;
        tracing::debug!(elapsed_ms = self.state.elapsed_ms, "playback started");
    }

    pub fn pause(&mut self) {
        self.autoplay_pending = false;
        if !self.state.is_playing {
            return;
        }
        self.stop();
        tracing::debug!(elapsed_ms = self.state.elapsed_ms, "playback paused");
    }

    /// Jumps to `elapsed_ms`. Audio for the landing tick fires again on the
    /// next frame and the end notification is re-armed.
    pub fn seek(&mut self, elapsed_ms: f64, now_ms: f64) {
        if !elapsed_ms.is_finite() {
            tracing::warn!(elapsed_ms, "ignoring seek to a non-finite position");
            return;
        }
        self.state.elapsed_ms = elapsed_ms.clamp(0.0, self.timeline.end_bound_ms());
        self.state.last_dispatched_tick = None;
        self.audio_cursor.reset();
        self.ended_notified = false;
        if self.state.is_playing {
            self.anchor = Some(Anchor {
                wall_ms: now_ms,
                elapsed_ms: self.state.elapsed_ms,
            });
            self.clock.resume(now_ms);
        }
    }

    /// Back to the start, paused.
    pub fn reset(&mut self) {
        self.pause();
        self.seek(0.0, 0.0);
    }

    /// Handles one host frame callback.
    pub fn on_frame(&mut self, now_ms: f64) -> Frame {
        if self.autoplay_pending {
            self.play(now_ms);
        }

        let reached_end = self.advance(now_ms);
        let tick = self.timeline.tick_at(self.state.elapsed_ms);
        if let Some(tick) = tick.filter(|_| self.state.is_playing) {
            self.dispatch_audio(tick);
        }
        let description = render_frame(self.state.elapsed_ms, &self.timeline);

        let ended = reached_end && self.state.is_playing;
        if ended {
            self.finish();
        }

        Frame {
            tick,
            state: self.state,
            description,
            ended,
        }
    }

    // Returns whether playback sits on the end bound.
    fn advance(&mut self, now_ms: f64) -> bool {
        let Some(anchor) = self.anchor.as_mut() else {
            return false;
        };

        let step = self.clock.advance(now_ms);
        // Cut stalled wall time out of the anchor so it never turns into
        // playback time.
        anchor.wall_ms += step.dropped_ms;

        let bound = self.timeline.end_bound_ms();
        let elapsed = anchor.elapsed_ms + (now_ms - anchor.wall_ms) * self.options.speed;
        self.state.elapsed_ms = elapsed.clamp(self.state.elapsed_ms, bound.max(self.state.elapsed_ms));
        self.state.elapsed_ms >= bound
    }

    fn dispatch_audio(&mut self, tick: Tick) {
        if self.state.last_dispatched_tick == Some(tick) {
            return;
        }
        self.state.last_dispatched_tick = Some(tick);

        // Skipped ticks are passed over: only the landing tick sounds.
        self.audio_cursor.advance(&self.timeline.audio, tick);
        let Some(sink) = self.audio_sink.as_mut() else {
            return;
        };
        for event in self.audio_cursor.at_tick(&self.timeline.audio, tick) {
            tracing::debug!(tick, kind = ?event.kind, channel = ?event.channel, "audio cue");
            if let Err(failure) = sink.dispatch(event) {
                tracing::warn!(%failure, "audio cue skipped");
            }
        }
    }

    fn stop(&mut self) {
        self.state.is_playing = false;
        self.anchor = None;
        self.clock.pause();
    }

    fn finish(&mut self) {
        self.stop();
        if self.ended_notified {
            return;
        }
        self.ended_notified = true;
        tracing::info!(
            elapsed_ms = self.state.elapsed_ms,
            total_ticks = self.timeline.total_ticks,
            "playback ended"
        );
        if let Some(on_ended) = self.on_ended.as_mut() {
            on_ended();
        }
    }
}

impl fmt::Debug for RuntimePlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimePlayer")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("total_ticks", &self.timeline.total_ticks)
            .field("ended_notified", &self.ended_notified)
            .finish()
    }
}
