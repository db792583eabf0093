//! Transition Engine: turns a trigger + settings into the correct sequence
//! of emitted messages at the correct moments, honoring musical time,
//! cancellation, and the current-value shadow.
//!
//! Like the Clock, this is host-polled rather than thread-driven: the
//! host calls `poll()` on its own cadence (ideally ~60 Hz while a Jump is
//! active) and the engine fires whatever deadlines have passed and
//! advances whatever interpolation is in flight. This keeps the whole
//! core on one logical execution context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::clock::{Clock, Quantization};
use crate::message::{MessageSink, WireMessage};
use crate::registry::ParameterRegistry;
use crate::store::SnapshotStore;

/// Target frame interval for Jump interpolation, ~60 Hz.
pub const INTERPOLATION_FRAME_MS: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionMode {
    Jump,
    Drop,
}

/// An immutable configuration object passed per trigger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionSettings {
    pub mode: TransitionMode,
    /// Jump only.
    pub fade_ms: u32,
    /// Jump only.
    pub quantization: Quantization,
    /// Drop only, 1..32.
    pub cycle_length_bars: u32,
    /// Drop only.
    pub repeat: bool,
}

impl TransitionSettings {
    pub fn jump(fade_ms: u32, quantization: Quantization) -> Self {
        Self {
            mode: TransitionMode::Jump,
            fade_ms,
            quantization,
            cycle_length_bars: 1,
            repeat: false,
        }
    }

    pub fn drop(cycle_length_bars: u32, repeat: bool) -> Self {
        Self {
            mode: TransitionMode::Drop,
            fade_ms: 0,
            quantization: Quantization::None,
            cycle_length_bars: cycle_length_bars.clamp(1, 32),
            repeat,
        }
    }
}

/// An accepted-but-not-yet-fired transition.
#[derive(Debug, Clone)]
struct ScheduledTransition {
    snapshot_id: Uuid,
    settings: TransitionSettings,
    /// Wall-clock deadline.
    deadline: Instant,
    /// Drop only: the bar index this deadline corresponds to.
    target_bar: Option<u32>,
    #[allow(dead_code)]
    scheduled_at: Instant,
}

/// Active only during a Jump's fade.
#[derive(Debug, Clone)]
struct InterpolationState {
    snapshot_id: Uuid,
    /// (parameter_id, start, target), in the snapshot's enabled-parameter
    /// iteration order.
    targets: Vec<(String, u8, u8)>,
    start_time: Instant,
    duration_ms: u64,
}

/// A read-only view of in-flight interpolation, for UI progress callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolationProgress {
    pub snapshot_id: Uuid,
    pub progress: f64,
    pub values: Vec<(String, u8)>,
}

type ProgressCallback = Box<dyn FnMut(&InterpolationProgress) + Send>;
type CompleteCallback = Box<dyn FnMut(Uuid) + Send>;

/// Cubic ease-out: `1 - (1 - t)^3`. Monotonically non-decreasing on
/// [0, 1], `eased(0) = 0`, `eased(1) = 1`.
pub fn ease_out_cubic(progress: f64) -> f64 {
    let t = progress.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// The transition scheduler/interpolator.
pub struct TransitionEngine {
    registry: ParameterRegistry,
    scheduled: Option<ScheduledTransition>,
    interpolation: Option<InterpolationState>,
    message_sink: Option<Arc<dyn MessageSink>>,
    on_interpolation_update: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Default for TransitionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionEngine {
    pub fn new() -> Self {
        Self {
            registry: ParameterRegistry::new(),
            scheduled: None,
            interpolation: None,
            message_sink: None,
            on_interpolation_update: None,
            on_complete: None,
        }
    }

    /// Install the sink every emitted `WireMessage` is sent to, mirroring
    /// how `chaosgarden::latent::LatentManager` holds an
    /// `Arc<dyn IOPubPublisher>` and calls `.publish()` on it.
    pub fn on_message(&mut self, sink: Arc<dyn MessageSink>) {
        self.message_sink = Some(sink);
    }

    pub fn on_interpolation_update(&mut self, callback: impl FnMut(&InterpolationProgress) + Send + 'static) {
        self.on_interpolation_update = Some(Box::new(callback));
    }

    pub fn on_complete(&mut self, callback: impl FnMut(Uuid) + Send + 'static) {
        self.on_complete = Some(Box::new(callback));
    }

    pub fn scheduled(&self) -> bool {
        self.scheduled.is_some()
    }

    pub fn interpolation(&self) -> Option<InterpolationProgress> {
        self.interpolation.as_ref().map(Self::progress_of)
    }

    pub fn is_active(&self) -> bool {
        self.scheduled.is_some() || self.interpolation.is_some()
    }

    fn progress_of(state: &InterpolationState) -> InterpolationProgress {
        let elapsed_ms = state.start_time.elapsed().as_secs_f64() * 1000.0;
        let progress = if state.duration_ms == 0 {
            1.0
        } else {
            (elapsed_ms / state.duration_ms as f64).clamp(0.0, 1.0)
        };
        let eased = ease_out_cubic(progress);
        let values = state
            .targets
            .iter()
            .map(|(id, start, target)| {
                let value = (*start as f64 + (*target as f64 - *start as f64) * eased).round() as u8;
                (id.clone(), value)
            })
            .collect();
        InterpolationProgress { snapshot_id: state.snapshot_id, progress, values }
    }

    /// Cancels any scheduled-but-not-fired transition and any in-progress
    /// Jump interpolation. Synchronous: after return, no further
    /// callbacks or messages from the cancelled transition will occur.
    /// Idempotent.
    pub fn cancel(&mut self) {
        if self.scheduled.take().is_some() {
            debug!("cancelled scheduled transition");
        }
        if self.interpolation.take().is_some() {
            debug!("cancelled in-progress jump interpolation");
        }
    }

    /// Schedule or immediately begin a Jump. A missing `snapshot_id` is a
    /// silent no-op.
    pub fn execute_jump(&mut self, snapshot_id: Uuid, settings: TransitionSettings, store: &mut SnapshotStore, clock: &Clock) {
        self.cancel();
        if store.get(snapshot_id).is_none() {
            debug!(%snapshot_id, "execute_jump: unknown snapshot, no-op");
            return;
        }

        if matches!(settings.quantization, Quantization::None) {
            self.begin_jump_interpolation(snapshot_id, settings, store);
            return;
        }

        let delay_ms = clock.time_until_next_quantization(settings.quantization);
        let now = Instant::now();
        self.scheduled = Some(ScheduledTransition {
            snapshot_id,
            settings,
            deadline: now + Duration::from_millis(delay_ms),
            target_bar: None,
            scheduled_at: now,
        });
    }

    /// Schedule a bar-aligned Drop. A missing `snapshot_id` is a silent
    /// no-op.
    pub fn execute_drop(&mut self, snapshot_id: Uuid, settings: TransitionSettings, store: &SnapshotStore, clock: &Clock) {
        self.cancel();
        if store.get(snapshot_id).is_none() {
            debug!(%snapshot_id, "execute_drop: unknown snapshot, no-op");
            return;
        }

        let target_bar = clock.next_cycle_bar(settings.cycle_length_bars);
        let delay_ms = clock.time_until_bar(target_bar);
        let now = Instant::now();
        self.scheduled = Some(ScheduledTransition {
            snapshot_id,
            settings,
            deadline: now + Duration::from_millis(delay_ms),
            target_bar: Some(target_bar),
            scheduled_at: now,
        });
    }

    fn begin_jump_interpolation(&mut self, snapshot_id: Uuid, settings: TransitionSettings, store: &mut SnapshotStore) {
        let targets = store.interpolation_targets(snapshot_id);
        if settings.fade_ms == 0 {
            self.apply_jump_targets_immediately(snapshot_id, &targets, store);
            return;
        }
        self.interpolation = Some(InterpolationState {
            snapshot_id,
            targets,
            start_time: Instant::now(),
            duration_ms: settings.fade_ms as u64,
        });
    }

    fn apply_jump_targets_immediately(&mut self, snapshot_id: Uuid, targets: &[(String, u8, u8)], store: &mut SnapshotStore) {
        for (parameter_id, _start, target) in targets {
            if let Some(descriptor) = self.registry.get(parameter_id) {
                for msg in crate::registry::encode_value(&descriptor.encoding, *target) {
                    if let Some(sink) = self.message_sink.as_ref() {
                        sink.send(msg);
                    }
                }
            }
            store.set_current(parameter_id, *target);
        }
        self.complete(snapshot_id);
    }

    fn complete(&mut self, snapshot_id: Uuid) {
        if let Some(cb) = self.on_complete.as_mut() {
            cb(snapshot_id);
        }
    }

    /// Drive time forward: fires any due scheduled transition and
    /// advances any in-progress Jump interpolation, emitting messages
    /// through whatever sink `on_message` installed and writing through
    /// to `store`'s current-value shadow. The host should call this at
    /// ~60 Hz ([`INTERPOLATION_FRAME_MS`]) while a Jump may be active, and
    /// at least once per tick otherwise.
    pub fn poll(&mut self, store: &mut SnapshotStore, clock: &Clock) {
        self.fire_due_scheduled(store, clock);
        self.advance_interpolation(store);
    }

    fn fire_due_scheduled(&mut self, store: &mut SnapshotStore, clock: &Clock) {
        let Some(scheduled) = self.scheduled.as_ref() else { return };
        if Instant::now() < scheduled.deadline {
            return;
        }
        let scheduled = self.scheduled.take().unwrap();

        match scheduled.settings.mode {
            TransitionMode::Jump => {
                self.begin_jump_interpolation(scheduled.snapshot_id, scheduled.settings, store);
            }
            TransitionMode::Drop => {
                self.fire_drop(&scheduled, store);
                if scheduled.settings.repeat {
                    self.reschedule_drop(&scheduled, clock);
                }
            }
        }
    }

    fn fire_drop(&mut self, scheduled: &ScheduledTransition, store: &mut SnapshotStore) {
        let messages = store.outbound_messages(scheduled.snapshot_id, &self.registry);
        for msg in messages {
            if let Some(sink) = self.message_sink.as_ref() {
                sink.send(msg);
            }
        }
        store.apply_to_current(scheduled.snapshot_id);
        trace!(snapshot_id = %scheduled.snapshot_id, target_bar = ?scheduled.target_bar, "drop fired");
        self.complete(scheduled.snapshot_id);
    }

    fn reschedule_drop(&mut self, fired: &ScheduledTransition, clock: &Clock) {
        let next_bar = clock.next_cycle_bar(fired.settings.cycle_length_bars);
        let delay_ms = clock.time_until_bar(next_bar);
        let now = Instant::now();
        self.scheduled = Some(ScheduledTransition {
            snapshot_id: fired.snapshot_id,
            settings: fired.settings,
            deadline: now + Duration::from_millis(delay_ms),
            target_bar: Some(next_bar),
            scheduled_at: now,
        });
    }

    fn advance_interpolation(&mut self, store: &mut SnapshotStore) {
        let Some(state) = self.interpolation.as_ref() else { return };
        let progress = Self::progress_of(state);

        for (parameter_id, value) in &progress.values {
            if let Some(descriptor) = self.registry.get(parameter_id) {
                for msg in crate::registry::encode_value(&descriptor.encoding, *value) {
                    if let Some(sink) = self.message_sink.as_ref() {
                        sink.send(msg);
                    }
                }
            }
            store.set_current(parameter_id, *value);
        }

        if let Some(cb) = self.on_interpolation_update.as_mut() {
            cb(&progress);
        }

        if progress.progress >= 1.0 {
            let snapshot_id = progress.snapshot_id;
            self.interpolation = None;
            self.complete(snapshot_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RecordingSink;
    use crate::store::Position;
    use std::sync::Mutex;
    use std::thread;

    fn setup() -> (TransitionEngine, SnapshotStore, Clock, ParameterRegistry) {
        let registry = ParameterRegistry::new();
        let store = SnapshotStore::new(8, 16, &registry);
        let clock = Clock::new(120.0, 4);
        (TransitionEngine::new(), store, clock, registry)
    }

    #[test]
    fn ease_out_cubic_boundaries_and_monotonic() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        let mut last = -1.0;
        let mut t = 0.0;
        while t <= 1.0 {
            let e = ease_out_cubic(t);
            assert!(e >= last);
            last = e;
            t += 0.05;
        }
    }

    #[test]
    fn execute_jump_on_unknown_snapshot_is_noop() {
        let (mut engine, mut store, clock, _registry) = setup();
        engine.execute_jump(Uuid::new_v4(), TransitionSettings::jump(500, Quantization::None), &mut store, &clock);
        assert!(!engine.is_active());
    }

    #[test]
    fn jump_no_quantization_begins_interpolation_immediately() {
        let (mut engine, mut store, clock, _registry) = setup();
        let id = store.create_empty(Position::new(0, 0), "J").unwrap();
        store.set_parameter(id, "track_3_pan", 0, true);

        engine.execute_jump(id, TransitionSettings::jump(1000, Quantization::None), &mut store, &clock);
        assert!(engine.interpolation().is_some());
        assert!(!engine.scheduled());
    }

    #[test]
    fn jump_zero_duration_completes_immediately() {
        let (mut engine, mut store, clock, _registry) = setup();
        let id = store.create_empty(Position::new(0, 0), "J").unwrap();
        store.set_parameter(id, "track_3_pan", 0, true);

        let sink = Arc::new(RecordingSink::new());
        engine.on_message(sink.clone());
        let completed = Arc::new(Mutex::new(false));
        let completed_clone = completed.clone();
        engine.on_complete(move |_| *completed_clone.lock().unwrap() = true);

        engine.execute_jump(id, TransitionSettings::jump(0, Quantization::None), &mut store, &clock);

        assert!(*completed.lock().unwrap());
        assert!(!engine.is_active());
        assert_eq!(sink.len(), 1);
        assert_eq!(store.get_current("track_3_pan"), Some(0));
    }

    #[test]
    fn quantized_jump_with_zero_fade_updates_shadow_on_fire() {
        let (mut engine, mut store, mut clock, _registry) = setup();
        clock.set_bpm(300.0);
        clock.start();
        let id = store.create_empty(Position::new(0, 0), "J").unwrap();
        store.set_parameter(id, "track_3_pan", 10, true);

        engine.execute_jump(id, TransitionSettings::jump(0, Quantization::Bar), &mut store, &clock);
        assert!(engine.scheduled());

        run_for(&mut engine, &mut store, &mut clock, Duration::from_millis(900));

        assert!(!engine.is_active());
        assert_eq!(store.get_current("track_3_pan"), Some(10));
    }

    #[test]
    fn jump_interpolation_reaches_target_and_updates_shadow() {
        let (mut engine, mut store, clock, _registry) = setup();
        let id = store.create_empty(Position::new(0, 0), "J").unwrap();
        store.set_parameter(id, "track_3_pan", 0, true);

        engine.execute_jump(id, TransitionSettings::jump(50, Quantization::None), &mut store, &clock);

        let mut iterations = 0;
        while engine.is_active() && iterations < 200 {
            engine.poll(&mut store, &clock);
            thread::sleep(Duration::from_millis(5));
            iterations += 1;
        }

        assert!(!engine.is_active());
        assert_eq!(store.get_current("track_3_pan"), Some(0));
    }

    #[test]
    fn cancel_during_jump_stops_emission_and_suppresses_completion() {
        let (mut engine, mut store, clock, _registry) = setup();
        let id = store.create_empty(Position::new(0, 0), "J").unwrap();
        store.set_parameter(id, "track_3_pan", 0, true);

        let completed = Arc::new(Mutex::new(false));
        let completed_clone = completed.clone();
        engine.on_complete(move |_| *completed_clone.lock().unwrap() = true);

        engine.execute_jump(id, TransitionSettings::jump(5000, Quantization::None), &mut store, &clock);
        engine.poll(&mut store, &clock);
        let before = store.get_current("track_3_pan").unwrap();

        engine.cancel();
        assert!(!engine.is_active());

        for _ in 0..10 {
            engine.poll(&mut store, &clock);
        }
        assert!(!*completed.lock().unwrap());
        assert_eq!(store.get_current("track_3_pan"), Some(before));
    }

    #[test]
    fn cancel_is_idempotent() {
        let (mut engine, _store, _clock, _registry) = setup();
        engine.cancel();
        engine.cancel();
        assert!(!engine.is_active());
    }

    /// Runs `clock`/`engine` forward in real wall-clock time, since the
    /// Engine's scheduled-transition deadline is its own `Instant`, not
    /// driven by tick delivery.
    fn run_for(engine: &mut TransitionEngine, store: &mut SnapshotStore, clock: &mut Clock, duration: Duration) {
        let start = Instant::now();
        while start.elapsed() < duration {
            clock.poll();
            engine.poll(store, clock);
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn drop_fires_at_deadline_with_one_message_per_enabled_parameter() {
        let (mut engine, mut store, mut clock, _registry) = setup();
        clock.set_bpm(300.0); // bar = 800ms at beats_per_bar=4, keeps the test fast
        clock.start();

        let id = store.create_empty(Position::new(0, 0), "D").unwrap();
        store.set_parameter(id, "track_1_volume", 100, true);
        store.set_parameter(id, "track_1_mute", 127, false);

        let sink = Arc::new(RecordingSink::new());
        engine.on_message(sink.clone());

        engine.execute_drop(id, TransitionSettings::drop(1, false), &store, &clock);
        assert!(engine.scheduled());

        run_for(&mut engine, &mut store, &mut clock, Duration::from_millis(900));

        assert!(!engine.is_active());
        assert_eq!(store.get_current("track_1_volume"), Some(100));
        let msgs = sink.drain();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0], WireMessage::Cc { channel: 1, cc: 7, value: 100 });
    }

    #[test]
    fn retrigger_overrides_previous_drop() {
        let (mut engine, mut store, mut clock, _registry) = setup();
        clock.set_bpm(300.0);
        clock.start();

        let snap_a = store.create_empty(Position::new(0, 0), "A").unwrap();
        store.set_parameter(snap_a, "track_1_volume", 10, true);
        let snap_b = store.create_empty(Position::new(0, 1), "B").unwrap();
        store.set_parameter(snap_b, "track_1_volume", 90, true);

        let completions = Arc::new(Mutex::new(Vec::new()));
        let completions_clone = completions.clone();
        engine.on_complete(move |id| completions_clone.lock().unwrap().push(id));

        engine.execute_drop(snap_a, TransitionSettings::drop(4, false), &store, &clock);
        run_for(&mut engine, &mut store, &mut clock, Duration::from_millis(400));
        // A is still scheduled (cycle=4 bars => 3200ms away); retrigger with B before it fires.
        engine.execute_drop(snap_b, TransitionSettings::drop(4, false), &store, &clock);
        run_for(&mut engine, &mut store, &mut clock, Duration::from_millis(3300));

        let completions = completions.lock().unwrap();
        assert_eq!(*completions, vec![snap_b]);
        assert_eq!(store.get_current("track_1_volume"), Some(90));
    }

    #[test]
    fn repeat_drop_reschedules_at_next_cycle() {
        let (mut engine, mut store, mut clock, _registry) = setup();
        clock.set_bpm(300.0);
        clock.start();

        let id = store.create_empty(Position::new(0, 0), "D").unwrap();
        store.set_parameter(id, "track_1_volume", 50, true);

        let fire_count = Arc::new(Mutex::new(0));
        let fire_count_clone = fire_count.clone();
        engine.on_complete(move |_| *fire_count_clone.lock().unwrap() += 1);

        engine.execute_drop(id, TransitionSettings::drop(1, true), &store, &clock);

        run_for(&mut engine, &mut store, &mut clock, Duration::from_millis(1800));

        assert!(*fire_count.lock().unwrap() >= 2);
        assert!(engine.scheduled());
    }
}
