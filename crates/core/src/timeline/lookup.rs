//! Tick lookups over sorted event lists.
//!
//! Stateless lookups use binary search. Monotonic playback uses a
//! caller-owned [`TickCursor`] that only ever walks forward.

use crate::Tick;

/// Anything positioned on the tick grid.
pub trait Timed {
    fn tick(&self) -> Tick;
}

// Absorbs float error when `elapsed_ms` is an exact multiple of the tick.
const TICK_EPSILON: f64 = 1e-9;

/// `floor(elapsed_ms / tick_duration_ms + 1e-9)`, so an elapsed time a hair
/// below a tick boundary from float error still lands on that tick. Negative
/// time maps to tick 0.
pub fn tick_at(elapsed_ms: f64, tick_duration_ms: f64) -> Tick {
    if !(elapsed_ms > 0.0) || !(tick_duration_ms > 0.0) {
        return 0;
    }
    (elapsed_ms / tick_duration_ms + TICK_EPSILON).floor() as Tick
}

/// All events scheduled exactly on `tick`.
pub fn events_at_tick<E: Timed>(events: &[E], tick: Tick) -> &[E] {
    let lo = events.partition_point(|event| event.tick() < tick);
    let hi = events.partition_point(|event| event.tick() <= tick);
    &events[lo..hi]
}

/// Forward-only position in a sorted event list.
///
/// After any non-monotonic jump (a seek backwards) the owner must call
/// [`TickCursor::reset`]. Moving backwards without a reset is a contract
/// violation and trips a debug assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickCursor {
    index: usize,
    last_tick: Option<Tick>,
}

impl TickCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.last_tick = None;
    }

    /// Number of events already passed.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    /// Moves past every event scheduled at or before `tick`.
    pub fn advance<E: Timed>(&mut self, events: &[E], tick: Tick) {
        if let Some(last) = self.last_tick {
            debug_assert!(
                tick >= last,
                "seek violation: cursor moved from tick {last} back to {tick} without a reset"
            );
        }
        self.last_tick = Some(tick);
        while events
            .get(self.index)
            .is_some_and(|event| event.tick() <= tick)
        {
            self.index += 1;
        }
    }

    /// Latest event at or before the cursor's tick.
    pub fn current<'a, E: Timed>(&self, events: &'a [E]) -> Option<&'a E> {
        events[..self.index.min(events.len())].last()
    }

    /// Events scheduled exactly on `tick`, which must be the tick the cursor
    /// was last advanced to.
    pub fn at_tick<'a, E: Timed>(&self, events: &'a [E], tick: Tick) -> &'a [E] {
        let end = self.index.min(events.len());
        let mut start = end;
        while start > 0 && events[start - 1].tick() == tick {
            start -= 1;
        }
        &events[start..end]
    }
}

/// Latest event at or before the tick shown at `elapsed_ms`, walking
/// `cursor` forward. Amortized O(1) per call under monotonic playback.
pub fn find_current_event<'a, E: Timed>(
    events: &'a [E],
    elapsed_ms: f64,
    tick_duration_ms: f64,
    cursor: &mut TickCursor,
) -> Option<&'a E> {
    cursor.advance(events, tick_at(elapsed_ms, tick_duration_ms));
    cursor.current(events)
}

/// Full-scan reference for [`find_current_event`].
pub fn find_current_event_linear<E: Timed>(
    events: &[E],
    elapsed_ms: f64,
    tick_duration_ms: f64,
) -> Option<&E> {
    let tick = tick_at(elapsed_ms, tick_duration_ms);
    events.iter().take_while(|event| event.tick() <= tick).last()
}
