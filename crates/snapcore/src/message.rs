//! Outbound wire messages and the sink that accepts them.
//!
//! Mirrors the shape of `chaosgarden::primitives::MidiMessage`, restricted
//! to the message kinds the parameter registry actually encodes: CC, PC,
//! Note, and NRPN. Transport-level Start/Stop/Continue/Timing Clock bytes
//! are a coordinator concern, not the core's — they are not represented
//! here.

use serde::{Deserialize, Serialize};

/// A single outbound parameter message, addressed by MIDI channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Control Change.
    Cc { channel: u8, cc: u8, value: u8 },
    /// Program Change.
    Pc { channel: u8, program: u8 },
    /// Note On (`on: true`) or Note Off (`on: false`).
    Note {
        channel: u8,
        note: u8,
        velocity: u8,
        on: bool,
    },
    /// Non-Registered Parameter Number, encoded as an MSB/LSB/value
    /// triplet.
    Nrpn {
        channel: u8,
        msb: u8,
        lsb: u8,
        value: u8,
    },
}

/// Accepts one outbound wire message at a time, synchronously.
///
/// The sink must not block; backpressure is out of scope here —
/// implementations are expected to enqueue or forward immediately.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: WireMessage);
}

/// A sink that records every message it receives, for tests and the demo
/// binary.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: std::sync::Mutex<Vec<WireMessage>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<WireMessage> {
        std::mem::take(&mut self.messages.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSink for RecordingSink {
    fn send(&self, message: WireMessage) {
        self.messages.lock().unwrap().push(message);
    }
}
