//! Parameter Registry: the static, process-wide catalogue of addressable
//! parameters and their wire encodings.
//!
//! Built once and never mutated afterward. Covers the global scene/tempo/
//! groove parameters plus the generated 16-track × {volume, mute, pan}
//! cross-product.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::message::WireMessage;

/// Taxonomy tag for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterCategory {
    Scene,
    Tempo,
    Track,
    Groove,
    Transport,
}

/// Where a semantic unit maps onto the wire's 0-127 domain, for the
/// conversion helpers below. Informational only — the wire value is
/// always the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SemanticRange {
    Bpm { min: f64, max: f64 },
    Percent,
    Pan,
    Bool,
    None,
}

/// How a parameter id is addressed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireEncoding {
    Cc { channel: u8, cc: u8 },
    Pc { channel: u8 },
    /// `velocity_default` is used when a snapshot parameter's value is
    /// the "on" velocity; value 0 always encodes as Note Off regardless.
    Note { channel: u8, note: u8 },
    Nrpn { channel: u8, msb: u8, lsb: u8 },
}

/// A single catalogue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub id: String,
    pub display_name: String,
    pub encoding: WireEncoding,
    pub default: u8,
    pub category: ParameterCategory,
    pub semantic: SemanticRange,
}

/// Encode a single parameter value into its wire message(s):
///
/// - CC -> one CC message.
/// - PC -> one PC message (value becomes the program number).
/// - Note -> Note On with the value as velocity if value > 0, else Note Off.
/// - NRPN -> three CC messages (MSB=99, LSB=98, value=6), in that order.
pub fn encode_value(encoding: &WireEncoding, value: u8) -> Vec<WireMessage> {
    match *encoding {
        WireEncoding::Cc { channel, cc } => vec![WireMessage::Cc { channel, cc, value }],
        WireEncoding::Pc { channel } => vec![WireMessage::Pc { channel, program: value }],
        WireEncoding::Note { channel, note } => {
            if value > 0 {
                vec![WireMessage::Note { channel, note, velocity: value, on: true }]
            } else {
                vec![WireMessage::Note { channel, note, velocity: 0, on: false }]
            }
        }
        WireEncoding::Nrpn { channel, msb, lsb } => vec![
            WireMessage::Cc { channel, cc: 99, value: msb },
            WireMessage::Cc { channel, cc: 98, value: lsb },
            WireMessage::Cc { channel, cc: 6, value },
        ],
    }
}

/// The immutable catalogue of all addressable parameters.
#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    by_id: HashMap<String, ParameterDescriptor>,
}

impl ParameterRegistry {
    /// Build the catalogue: the fixed global parameters plus the
    /// 16-channel track cross-product.
    pub fn new() -> Self {
        let mut by_id = HashMap::new();

        let fixed = [
            ("delayed_scene", "Delayed Scene", 82, 0, ParameterCategory::Scene),
            ("prev_scene", "Previous Scene", 83, 0, ParameterCategory::Scene),
            ("next_scene", "Next Scene", 84, 0, ParameterCategory::Scene),
            ("scene_direct", "Scene Direct", 85, 0, ParameterCategory::Scene),
            ("tempo", "Tempo", 80, 64, ParameterCategory::Tempo),
            ("groove", "Groove", 81, 64, ParameterCategory::Groove),
        ];
        for (id, name, cc, default, category) in fixed {
            let semantic = match category {
                ParameterCategory::Tempo => SemanticRange::Bpm { min: 40.0, max: 240.0 },
                _ => SemanticRange::None,
            };
            by_id.insert(
                id.to_string(),
                ParameterDescriptor {
                    id: id.to_string(),
                    display_name: name.to_string(),
                    encoding: WireEncoding::Cc { channel: 1, cc },
                    default,
                    category,
                    semantic,
                },
            );
        }

        for channel in 1u8..=16 {
            let volume_id = format!("track_{channel}_volume");
            by_id.insert(
                volume_id.clone(),
                ParameterDescriptor {
                    id: volume_id,
                    display_name: format!("Track {channel} Volume"),
                    encoding: WireEncoding::Cc { channel, cc: 7 },
                    default: 100,
                    category: ParameterCategory::Track,
                    semantic: SemanticRange::Percent,
                },
            );

            let mute_id = format!("track_{channel}_mute");
            by_id.insert(
                mute_id.clone(),
                ParameterDescriptor {
                    id: mute_id,
                    display_name: format!("Track {channel} Mute"),
                    encoding: WireEncoding::Cc { channel, cc: 9 },
                    default: 0,
                    category: ParameterCategory::Track,
                    semantic: SemanticRange::Bool,
                },
            );

            let pan_id = format!("track_{channel}_pan");
            by_id.insert(
                pan_id.clone(),
                ParameterDescriptor {
                    id: pan_id,
                    display_name: format!("Track {channel} Pan"),
                    encoding: WireEncoding::Cc { channel, cc: 10 },
                    default: 64,
                    category: ParameterCategory::Track,
                    semantic: SemanticRange::Pan,
                },
            );
        }

        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&ParameterDescriptor> {
        self.by_id.get(id)
    }

    pub fn by_channel_cc(&self, channel: u8, cc: u8) -> Option<&ParameterDescriptor> {
        self.by_id
            .values()
            .find(|d| matches!(d.encoding, WireEncoding::Cc { channel: c, cc: n } if c == channel && n == cc))
    }

    pub fn by_category(&self, category: ParameterCategory) -> Vec<&ParameterDescriptor> {
        self.by_id.values().filter(|d| d.category == category).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// UNIT CONVERSIONS
// =============================================================================

/// Map a 0-127 wire value to BPM over `[min, max]`.
pub fn midi_to_bpm(value: u8, min: f64, max: f64) -> f64 {
    min + (value as f64 / 127.0) * (max - min)
}

/// Map a BPM in `[min, max]` to a 0-127 wire value.
pub fn bpm_to_midi(bpm: f64, min: f64, max: f64) -> u8 {
    let clamped = bpm.clamp(min, max);
    (((clamped - min) / (max - min)) * 127.0).round() as u8
}

/// Map a wire value to a volume percentage (0-100).
pub fn midi_to_volume_percent(value: u8) -> f64 {
    (value as f64 / 127.0) * 100.0
}

/// Map a volume percentage (0-100) to a wire value.
pub fn volume_percent_to_midi(percent: f64) -> u8 {
    ((percent.clamp(0.0, 100.0) / 100.0) * 127.0).round() as u8
}

/// Map a pan wire value to the semantic range -50..+50, 64 as centre.
pub fn midi_to_pan(value: u8) -> i8 {
    (((value as i16) - 64) * 50 / 63) as i8
}

/// Map a semantic pan (-50..+50) to a wire value, 64 as centre.
pub fn pan_to_midi(pan: i8) -> u8 {
    let clamped = pan.clamp(-50, 50) as i16;
    (64 + (clamped * 63 / 50)) as u8
}

/// Map a boolean mute state to its wire value.
pub fn mute_to_midi(muted: bool) -> u8 {
    if muted {
        127
    } else {
        0
    }
}

/// Map a wire value to a boolean mute state, threshold at 64.
pub fn midi_to_mute(value: u8) -> bool {
    value >= 64
}

/// Interpret an observed `cc=80, channel=1` tempo control change. The core
/// itself never calls this — it lives at the coordinator seam that owns
/// the clock input port.
///
/// Returns `None` (and logs a warning) if the mapped BPM falls outside
/// `[min_bpm, max_bpm]`.
pub fn apply_tempo_cc(value: u8, min_bpm: f64, max_bpm: f64) -> Option<f64> {
    let bpm = midi_to_bpm(value, min_bpm, max_bpm);
    if bpm < min_bpm || bpm > max_bpm {
        warn!(value, bpm, "tempo CC mapped outside valid BPM range, ignoring");
        return None;
    }
    Some(bpm)
}
