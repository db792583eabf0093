//! Snapcore Demo CLI
//!
//! Demonstrates the snapcore modules end-to-end:
//! - Load engine configuration (defaults, no files present)
//! - Build the parameter registry and an empty snapshot grid
//! - Capture a snapshot from the current-value shadow
//! - Run a Drop on an internal clock
//! - Run a quantized Jump and watch it cancel mid-fade

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use snapcore::{
    Clock, MessageSink, ParameterRegistry, Position, Quantization, SnapshotStore, TransitionEngine,
    TransitionSettings, WireMessage,
};
use snapcore_config::EngineConfig;

/// Prints every emitted message to stdout, standing in for a real
/// transport sink a host would hand the engine.
struct ConsoleSink;

impl MessageSink for ConsoleSink {
    fn send(&self, message: WireMessage) {
        println!("  sink <- {message:?}");
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    println!("Snapcore Demo");
    println!("=============\n");

    println!("Loading engine configuration...");
    let (config, sources) = EngineConfig::load_with_sources_from(None).expect("default config should always load");
    println!(
        "  default_bpm={} banks={} slots_per_bank={} ({} file(s), {} env override(s))",
        config.default_bpm,
        config.banks,
        config.slots_per_bank,
        sources.files.len(),
        sources.env_overrides.len()
    );
    println!();

    println!("Building parameter registry...");
    let registry = ParameterRegistry::new();
    println!("  {} addressable parameters", registry.len());
    println!();

    println!("Capturing current state...");
    let mut store = SnapshotStore::from_config(&config, &registry);
    let snapshot_id = store.capture(Position::new(0, 0), "Startup State").unwrap();
    println!("  captured snapshot {snapshot_id} at (0, 0)");
    println!();

    println!("Preparing a Drop snapshot...");
    let drop_id = store.create_empty(Position::new(0, 1), "Drop Target").unwrap();
    store.set_parameter(drop_id, "track_1_volume", 110, true);
    store.set_parameter(drop_id, "track_1_mute", 0, true);

    let mut clock = Clock::from_config(&config);
    clock.set_bpm(240.0); // keep the demo snappy: one bar = 1000ms
    clock.start();

    let mut engine = TransitionEngine::new();
    engine.on_message(Arc::new(ConsoleSink));
    engine.on_complete(|id| println!("  transition complete: {id}"));

    println!("Running Drop (cycle_length=1 bar)...");
    engine.execute_drop(drop_id, TransitionSettings::drop(1, false), &store, &clock);
    run_until_idle(&mut engine, &mut store, &mut clock, Duration::from_secs(2));
    println!();

    println!("Running quantized Jump, then cancelling mid-fade...");
    let jump_id = store.create_empty(Position::new(0, 2), "Jump Target").unwrap();
    store.set_parameter(jump_id, "track_1_pan", 0, true);
    engine.execute_jump(jump_id, TransitionSettings::jump(800, Quantization::Bar), &mut store, &clock);

    let deadline = std::time::Instant::now() + Duration::from_millis(1200);
    while std::time::Instant::now() < deadline {
        clock.poll();
        engine.poll(&mut store, &clock);
        if engine.interpolation().is_some() {
            println!("  cancelling mid-fade");
            engine.cancel();
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    println!("  is_active={}", engine.is_active());
    println!();

    println!("Demo complete.");
    println!();
    println!("Summary of snapcore modules demonstrated:");
    println!("  registry - ParameterRegistry, unit conversions");
    println!("  store    - SnapshotStore, current-value shadow");
    println!("  clock    - Clock, internal generation, quantization queries");
    println!("  engine   - TransitionEngine, Drop and Jump");
}

fn run_until_idle(engine: &mut TransitionEngine, store: &mut SnapshotStore, clock: &mut Clock, timeout: Duration) {
    let deadline = std::time::Instant::now() + timeout;
    while engine.is_active() && std::time::Instant::now() < deadline {
        clock.poll();
        engine.poll(store, clock);
        thread::sleep(Duration::from_millis(10));
    }
}
