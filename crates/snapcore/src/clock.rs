//! The musical clock.
//!
//! Tracks bar/beat/tick position at 24 PPQN, either pacing itself from an
//! internal BPM or slaved to ticks arriving from an external clock input
//! port. Answers quantization-boundary queries used by the transition
//! engine to schedule Jump and Drop.
//!
//! Like `chaosgarden::tick_clock::TickClock`, position advancement is
//! driven by wall-clock `Instant`s rather than a background thread: the
//! host calls `poll()` as often as it likes (a UI frame tick, an event
//! loop iteration) and the clock catches up, emitting any tick/beat/bar
//! events that would have fired in between. This keeps the core
//! single-threaded — there is no timer thread owned by the clock itself.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::registry::{bpm_to_midi, midi_to_bpm};

pub const DEFAULT_PPQN: u16 = 24;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;

/// Where the clock takes its timing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockSource {
    Internal,
    External,
}

/// Quantization granularity for a scheduled Jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantization {
    None,
    Beat,
    Bar,
    TwoBar,
    FourBar,
}

/// Which kind of clock event a listener wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEventKind {
    Tick,
    Beat,
    Bar,
}

/// An event fired by the clock as musical time advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Fired on every tick, with the (possibly just-updated) position.
    Tick { bar: u32, beat: u8 },
    Beat { bar: u32, beat: u8 },
    Bar { bar: u32 },
}

impl ClockEvent {
    pub fn kind(&self) -> ClockEventKind {
        match self {
            ClockEvent::Tick { .. } => ClockEventKind::Tick,
            ClockEvent::Beat { .. } => ClockEventKind::Beat,
            ClockEvent::Bar { .. } => ClockEventKind::Bar,
        }
    }
}

/// Public snapshot of the clock's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockState {
    pub is_running: bool,
    pub source: ClockSource,
    pub bpm: f64,
    pub current_beat: u8,
    pub current_bar: u32,
    pub beats_per_bar: u8,
    pub ppqn: u16,
}

type ClockListener = Box<dyn FnMut(ClockEvent) + Send>;

/// The musical clock.
pub struct Clock {
    state: ClockState,
    /// Sub-beat phase, 0..ppqn. Not part of the public `ClockState` — the
    /// spec's data model only names bar/beat, this is bookkeeping for
    /// precise quantization-boundary math.
    ticks_in_beat: u16,
    /// Wall-clock accumulator (ms) for the internal generator.
    tick_accumulator_ms: f64,
    last_poll: Option<Instant>,
    listeners: Vec<(Option<ClockEventKind>, ClockListener)>,
}

impl Clock {
    pub fn new(bpm: f64, beats_per_bar: u8) -> Self {
        Self {
            state: ClockState {
                is_running: false,
                source: ClockSource::Internal,
                bpm: bpm.clamp(MIN_BPM, MAX_BPM),
                current_beat: 0,
                current_bar: 0,
                beats_per_bar,
                ppqn: DEFAULT_PPQN,
            },
            ticks_in_beat: 0,
            tick_accumulator_ms: 0.0,
            last_poll: None,
            listeners: Vec::new(),
        }
    }

    pub fn from_config(config: &snapcore_config::EngineConfig) -> Self {
        Self::new(config.default_bpm, config.beats_per_bar)
    }

    /// Register a listener for one event kind.
    pub fn on_event(&mut self, kind: ClockEventKind, listener: impl FnMut(ClockEvent) + Send + 'static) {
        self.listeners.push((Some(kind), Box::new(listener)));
    }

    /// Register a listener for every event kind.
    pub fn on_all(&mut self, listener: impl FnMut(ClockEvent) + Send + 'static) {
        self.listeners.push((None, Box::new(listener)));
    }

    fn emit(&mut self, event: ClockEvent) {
        for (kind, listener) in self.listeners.iter_mut() {
            if kind.map_or(true, |k| k == event.kind()) {
                listener(event);
            }
        }
    }

    // -------------------------------------------------------------------
    // Transport control
    // -------------------------------------------------------------------

    /// Starting when already running is a no-op.
    pub fn start(&mut self) {
        if self.state.is_running {
            return;
        }
        self.state.is_running = true;
        self.last_poll = Some(Instant::now());
        self.tick_accumulator_ms = 0.0;
    }

    /// Stopping when stopped is a no-op.
    pub fn stop(&mut self) {
        self.state.is_running = false;
    }

    /// Returns position to bar 0, beat 0 and clears the tick accumulator.
    /// Independent of running state.
    pub fn reset(&mut self) {
        self.state.current_bar = 0;
        self.state.current_beat = 0;
        self.ticks_in_beat = 0;
        self.tick_accumulator_ms = 0.0;
    }

    // -------------------------------------------------------------------
    // External clock port ingestion
    // -------------------------------------------------------------------

    /// A tick while stopped, or while source=internal, is silently
    /// absorbed.
    pub fn ingest_external_tick(&mut self) {
        if self.state.source != ClockSource::External || !self.state.is_running {
            return;
        }
        self.advance_one_tick();
    }

    pub fn ingest_external_start(&mut self) {
        if self.state.source != ClockSource::External {
            return;
        }
        self.reset();
        self.state.is_running = true;
    }

    pub fn ingest_external_stop(&mut self) {
        if self.state.source != ClockSource::External {
            return;
        }
        self.state.is_running = false;
    }

    pub fn ingest_external_continue(&mut self) {
        if self.state.source != ClockSource::External {
            return;
        }
        self.state.is_running = true;
    }

    // -------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------

    /// Clamp to `[MIN_BPM, MAX_BPM]`. If running on the internal source,
    /// the generator re-paces on the very next `poll()` — no explicit
    /// restart needed, since the tick interval is recomputed from `bpm`
    /// each time.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.state.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// If running, transparently stop and restart under the new source;
    /// position is preserved.
    pub fn set_source(&mut self, source: ClockSource) {
        self.state.source = source;
        if self.state.is_running && source == ClockSource::Internal {
            self.tick_accumulator_ms = 0.0;
            self.last_poll = Some(Instant::now());
        }
    }

    pub fn get_state(&self) -> ClockState {
        self.state.clone()
    }

    // -------------------------------------------------------------------
    // Internal generator
    // -------------------------------------------------------------------

    /// Catch up on any ticks that would have fired since the last call,
    /// when running on the internal source. No-op otherwise.
    pub fn poll(&mut self) {
        if self.state.source != ClockSource::Internal || !self.state.is_running {
            return;
        }

        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_poll.unwrap_or(now)).as_secs_f64() * 1000.0;
        self.last_poll = Some(now);
        self.tick_accumulator_ms += elapsed_ms;

        let interval_ms = Self::ms_per_tick(self.state.bpm, self.state.ppqn);
        while self.tick_accumulator_ms >= interval_ms {
            self.tick_accumulator_ms -= interval_ms;
            self.advance_one_tick();
        }
    }

    fn ms_per_tick(bpm: f64, ppqn: u16) -> f64 {
        60_000.0 / (bpm * ppqn as f64)
    }

    fn advance_one_tick(&mut self) {
        self.ticks_in_beat += 1;
        if self.ticks_in_beat >= self.state.ppqn {
            self.ticks_in_beat = 0;
            self.state.current_beat += 1;
            if self.state.current_beat >= self.state.beats_per_bar {
                self.state.current_beat = 0;
                self.state.current_bar += 1;
                self.emit(ClockEvent::Bar { bar: self.state.current_bar });
            }
            self.emit(ClockEvent::Beat { bar: self.state.current_bar, beat: self.state.current_beat });
        }
        self.emit(ClockEvent::Tick { bar: self.state.current_bar, beat: self.state.current_beat });
    }

    // -------------------------------------------------------------------
    // Quantization queries
    // -------------------------------------------------------------------

    fn ticks_per_bar(&self) -> u32 {
        self.state.beats_per_bar as u32 * self.state.ppqn as u32
    }

    fn tick_in_bar(&self) -> u32 {
        self.state.current_beat as u32 * self.state.ppqn as u32 + self.ticks_in_beat as u32
    }

    /// Milliseconds until the next boundary of kind `q`. 0 if exactly on
    /// the boundary.
    pub fn time_until_next_quantization(&self, q: Quantization) -> u64 {
        let ms_per_tick = Self::ms_per_tick(self.state.bpm, self.state.ppqn);

        let remaining_ticks: u64 = match q {
            Quantization::None => 0,
            Quantization::Beat => {
                if self.ticks_in_beat == 0 {
                    0
                } else {
                    (self.state.ppqn - self.ticks_in_beat) as u64
                }
            }
            Quantization::Bar => {
                let pos = self.tick_in_bar();
                if pos == 0 {
                    0
                } else {
                    (self.ticks_per_bar() - pos) as u64
                }
            }
            Quantization::TwoBar | Quantization::FourBar => {
                let cycle = if matches!(q, Quantization::TwoBar) { 2 } else { 4 };
                let ticks_per_bar = self.ticks_per_bar();
                let pos = (self.state.current_bar % cycle) * ticks_per_bar + self.tick_in_bar();
                let ticks_per_cycle = cycle * ticks_per_bar;
                if pos == 0 {
                    0
                } else {
                    (ticks_per_cycle - pos) as u64
                }
            }
        };

        (remaining_ticks as f64 * ms_per_tick).round() as u64
    }

    /// Milliseconds from now until the first tick of `target_bar`. 0 if
    /// `target_bar <= current_bar`.
    pub fn time_until_bar(&self, target_bar: u32) -> u64 {
        if target_bar <= self.state.current_bar {
            return 0;
        }
        let ms_per_tick = Self::ms_per_tick(self.state.bpm, self.state.ppqn);
        let bars_remaining = (target_bar - self.state.current_bar) as u64;
        let ticks_remaining = bars_remaining * self.ticks_per_bar() as u64 - self.tick_in_bar() as u64;
        (ticks_remaining as f64 * ms_per_tick).round() as u64
    }

    /// The smallest multiple of `cycle_len` strictly greater than the
    /// current bar.
    pub fn next_cycle_bar(&self, cycle_len: u32) -> u32 {
        let cycle_len = cycle_len.max(1);
        (self.state.current_bar / cycle_len + 1) * cycle_len
    }

    /// Convenience: map a 0-127 tempo-CC value through this clock's own
    /// BPM range ([20, 300]), distinct from the [40, 240] tempo-CC range
    /// used by the coordinator-level mapping in `registry::apply_tempo_cc`.
    pub fn bpm_from_clock_midi(value: u8) -> f64 {
        midi_to_bpm(value, MIN_BPM, MAX_BPM)
    }

    pub fn clock_midi_from_bpm(bpm: f64) -> u8 {
        bpm_to_midi(bpm, MIN_BPM, MAX_BPM)
    }
}
