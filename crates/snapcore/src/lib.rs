//! `snapcore` — a real-time musical snapshot and transition engine.
//!
//! Captures sets of parameter values addressed as MIDI Control Change,
//! Program Change, Note, and NRPN messages targeting a downstream
//! hardware groovebox, organizes them into a bank/slot grid, and
//! transitions between them in musical time via two modes: a quantized,
//! smoothly-interpolated Jump, and a bar-aligned, instantaneous Drop.
//!
//! Four components, built leaves-first:
//! - [`registry`] — the static parameter catalogue and wire encodings.
//! - [`store`] — the snapshot grid and the current-value shadow.
//! - [`clock`] — musical time: internal generation or external slaving.
//! - [`engine`] — the scheduler/interpolator tying the above together.
//!
//! The whole core runs on one logical execution context: nothing here
//! spawns a thread. Hosts drive it by calling `Clock::poll` and
//! `TransitionEngine::poll` on their own cadence (an event loop tick, a
//! UI frame), the same cooperative model `chaosgarden::tick_clock` uses.

pub mod clock;
pub mod engine;
pub mod message;
pub mod registry;
pub mod store;

pub use clock::{Clock, ClockEvent, ClockEventKind, ClockSource, ClockState, Quantization};
pub use engine::{InterpolationProgress, TransitionEngine, TransitionMode, TransitionSettings};
pub use message::{MessageSink, RecordingSink, WireMessage};
pub use registry::{ParameterCategory, ParameterDescriptor, ParameterRegistry, SemanticRange, WireEncoding};
pub use store::{Position, Snapshot, SnapshotParameter, SnapshotPatch, SnapshotStore};
