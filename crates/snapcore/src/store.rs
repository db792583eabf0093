//! Snapshot Store: the bank/slot grid of snapshots, the current-value
//! shadow, and the parameter-value bookkeeping the transition engine
//! reads from and writes through.
//!
//! Grounded in `chaosgarden::patterns`'s Uuid-keyed collection and
//! builder-method conventions, and in `chaosgarden::primitives`'s use of
//! `chrono::{DateTime, Utc}` timestamps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::WireMessage;
use crate::registry::{encode_value, ParameterRegistry};

/// Clamp every parameter's value to the wire's 0-127 domain, in place.
fn clamp_parameters(parameters: &mut [SnapshotParameter]) {
    for p in parameters.iter_mut() {
        p.value = p.value.min(127);
    }
}

/// Address of a snapshot within the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub bank: u8,
    pub slot: u8,
}

impl Position {
    pub fn new(bank: u8, slot: u8) -> Self {
        Self { bank, slot }
    }
}

/// One parameter value held by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotParameter {
    pub parameter_id: String,
    pub value: u8,
    /// Disabled parameters are skipped by both Jump interpolation and Drop
    /// application.
    pub enabled: bool,
}

/// A snapshot: a named, addressable bundle of parameter values plus
/// optional one-shot messages fired once on Drop/Jump-arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub name: String,
    pub position: Position,
    pub parameters: Vec<SnapshotParameter>,
    pub one_shots: Vec<WireMessage>,
    pub color_tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Snapshot {
    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    /// Index of a parameter by id, if present.
    fn param_index(&self, parameter_id: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.parameter_id == parameter_id)
    }
}

/// Partial update for `SnapshotStore::update` — absent fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct SnapshotPatch {
    pub name: Option<String>,
    pub parameters: Option<Vec<SnapshotParameter>>,
    pub one_shots: Option<Vec<WireMessage>>,
    pub color_tag: Option<Option<String>>,
}

/// The snapshot store: owns the bank/slot grid and the current-value
/// shadow — the core's best understanding of what the downstream
/// device's parameters currently hold.
pub struct SnapshotStore {
    banks: u8,
    slots_per_bank: u8,
    by_id: HashMap<Uuid, Snapshot>,
    by_position: HashMap<Position, Uuid>,
    current: HashMap<String, u8>,
}

impl SnapshotStore {
    /// `registry` seeds the current-value shadow with each parameter's
    /// default, before anything has been captured or applied.
    pub fn new(banks: u8, slots_per_bank: u8, registry: &ParameterRegistry) -> Self {
        let current = registry.all().map(|d| (d.id.clone(), d.default)).collect();
        Self {
            banks,
            slots_per_bank,
            by_id: HashMap::new(),
            by_position: HashMap::new(),
            current,
        }
    }

    pub fn from_config(config: &snapcore_config::EngineConfig, registry: &ParameterRegistry) -> Self {
        Self::new(config.banks, config.slots_per_bank, registry)
    }

    fn position_in_bounds(&self, position: Position) -> bool {
        position.bank < self.banks && position.slot < self.slots_per_bank
    }

    /// Evicts whatever snapshot currently occupies `position`, preserving
    /// uniqueness of bank/slot addresses.
    fn evict_position(&mut self, position: Position) {
        if let Some(old_id) = self.by_position.remove(&position) {
            self.by_id.remove(&old_id);
            debug!(?position, %old_id, "evicted snapshot occupying position");
        }
    }

    fn insert(&mut self, snapshot: Snapshot) -> Uuid {
        let id = snapshot.id;
        let position = snapshot.position;
        self.evict_position(position);
        self.by_position.insert(position, id);
        self.by_id.insert(id, snapshot);
        id
    }

    /// Create an empty, unnamed snapshot at `position` with no parameters
    /// enabled. Out-of-bounds positions are rejected (`None`) rather than
    /// raised as an error.
    pub fn create_empty(&mut self, position: Position, name: impl Into<String>) -> Option<Uuid> {
        if !self.position_in_bounds(position) {
            warn!(?position, "create_empty: position out of bounds");
            return None;
        }
        let now = Utc::now();
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            name: name.into(),
            position,
            parameters: Vec::new(),
            one_shots: Vec::new(),
            color_tag: None,
            created_at: now,
            modified_at: now,
        };
        Some(self.insert(snapshot))
    }

    /// Create a snapshot at `position` whose parameters list is the full
    /// current-value shadow, all enabled — the "capture current state"
    /// primitive.
    pub fn capture(&mut self, position: Position, name: impl Into<String>) -> Option<Uuid> {
        if !self.position_in_bounds(position) {
            warn!(?position, "capture: position out of bounds");
            return None;
        }
        let mut parameters: Vec<SnapshotParameter> = self
            .current
            .iter()
            .map(|(parameter_id, &value)| SnapshotParameter {
                parameter_id: parameter_id.clone(),
                value,
                enabled: true,
            })
            .collect();
        parameters.sort_by(|a, b| a.parameter_id.cmp(&b.parameter_id));
        let now = Utc::now();
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            name: name.into(),
            position,
            parameters,
            one_shots: Vec::new(),
            color_tag: None,
            created_at: now,
            modified_at: now,
        };
        Some(self.insert(snapshot))
    }

    pub fn get(&self, id: Uuid) -> Option<&Snapshot> {
        self.by_id.get(&id)
    }

    pub fn find_by_position(&self, position: Position) -> Option<&Snapshot> {
        self.by_position.get(&position).and_then(|id| self.by_id.get(id))
    }

    pub fn list_all(&self) -> Vec<&Snapshot> {
        self.by_id.values().collect()
    }

    pub fn list_by_bank(&self, bank: u8) -> Vec<&Snapshot> {
        self.by_id.values().filter(|s| s.position.bank == bank).collect()
    }

    /// Rename a snapshot and bump `modified_at`.
    pub fn rename(&mut self, id: Uuid, name: impl Into<String>) -> bool {
        if let Some(s) = self.by_id.get_mut(&id) {
            s.name = name.into();
            s.touch();
            true
        } else {
            false
        }
    }

    /// Move a snapshot to a new position, evicting any occupant there.
    pub fn relocate(&mut self, id: Uuid, new_position: Position) -> bool {
        if !self.position_in_bounds(new_position) || !self.by_id.contains_key(&id) {
            return false;
        }
        let old_position = self.by_id.get(&id).unwrap().position;
        self.by_position.remove(&old_position);
        self.evict_position(new_position);
        self.by_position.insert(new_position, id);
        let s = self.by_id.get_mut(&id).unwrap();
        s.position = new_position;
        s.touch();
        true
    }

    pub fn set_parameter(&mut self, id: Uuid, parameter_id: &str, value: u8, enabled: bool) -> bool {
        let value = value.min(127);
        let Some(s) = self.by_id.get_mut(&id) else { return false };
        match s.param_index(parameter_id) {
            Some(idx) => {
                s.parameters[idx].value = value;
                s.parameters[idx].enabled = enabled;
            }
            None => s.parameters.push(SnapshotParameter {
                parameter_id: parameter_id.to_string(),
                value,
                enabled,
            }),
        }
        s.touch();
        true
    }

    pub fn remove_parameter(&mut self, id: Uuid, parameter_id: &str) -> bool {
        let Some(s) = self.by_id.get_mut(&id) else { return false };
        let before = s.parameters.len();
        s.parameters.retain(|p| p.parameter_id != parameter_id);
        let changed = s.parameters.len() != before;
        if changed {
            s.touch();
        }
        changed
    }

    pub fn toggle_parameter_enabled(&mut self, id: Uuid, parameter_id: &str) -> Option<bool> {
        let s = self.by_id.get_mut(&id)?;
        let idx = s.param_index(parameter_id)?;
        s.parameters[idx].enabled = !s.parameters[idx].enabled;
        let now_enabled = s.parameters[idx].enabled;
        s.touch();
        Some(now_enabled)
    }

    pub fn set_one_shots(&mut self, id: Uuid, one_shots: Vec<WireMessage>) -> bool {
        let Some(s) = self.by_id.get_mut(&id) else { return false };
        s.one_shots = one_shots;
        s.touch();
        true
    }

    pub fn set_color_tag(&mut self, id: Uuid, color_tag: Option<String>) -> bool {
        let Some(s) = self.by_id.get_mut(&id) else { return false };
        s.color_tag = color_tag;
        s.touch();
        true
    }

    pub fn delete(&mut self, id: Uuid) -> bool {
        if let Some(s) = self.by_id.remove(&id) {
            self.by_position.remove(&s.position);
            true
        } else {
            false
        }
    }

    /// Duplicate a snapshot into `destination`, suffixing the name with
    /// " (copy)", with a fresh id and timestamps. Evicts whatever
    /// previously occupied `destination`. Returns `None` if the
    /// destination is out of bounds or the source does not exist.
    pub fn copy(&mut self, id: Uuid, destination: Position) -> Option<Uuid> {
        if !self.position_in_bounds(destination) {
            warn!(?destination, "copy: destination out of bounds");
            return None;
        }
        let source = self.by_id.get(&id)?.clone();
        let now = Utc::now();
        let copy = Snapshot {
            id: Uuid::new_v4(),
            name: format!("{} (copy)", source.name),
            position: destination,
            parameters: source.parameters,
            one_shots: source.one_shots,
            color_tag: source.color_tag,
            created_at: now,
            modified_at: now,
        };
        Some(self.insert(copy))
    }

    /// Merge allowed field updates onto a snapshot; any field left `None`
    /// is unchanged. Bumps `modified_at` if anything changed.
    pub fn update(&mut self, id: Uuid, patch: SnapshotPatch) -> bool {
        let Some(s) = self.by_id.get_mut(&id) else { return false };
        let mut changed = false;
        if let Some(name) = patch.name {
            s.name = name;
            changed = true;
        }
        if let Some(mut parameters) = patch.parameters {
            clamp_parameters(&mut parameters);
            s.parameters = parameters;
            changed = true;
        }
        if let Some(one_shots) = patch.one_shots {
            s.one_shots = one_shots;
            changed = true;
        }
        if let Some(color_tag) = patch.color_tag {
            s.color_tag = color_tag;
            changed = true;
        }
        if changed {
            s.touch();
        }
        changed
    }

    /// All positions in the grid not currently occupied, in bank-major,
    /// slot-minor order.
    pub fn empty_positions(&self) -> Vec<Position> {
        let mut out = Vec::new();
        for bank in 0..self.banks {
            for slot in 0..self.slots_per_bank {
                let position = Position::new(bank, slot);
                if !self.by_position.contains_key(&position) {
                    out.push(position);
                }
            }
        }
        out
    }

    pub fn next_available(&self) -> Option<Position> {
        self.empty_positions().into_iter().next()
    }

    // -------------------------------------------------------------------
    // Current-value shadow
    // -------------------------------------------------------------------

    pub fn get_current(&self, parameter_id: &str) -> Option<u8> {
        self.current.get(parameter_id).copied()
    }

    pub fn set_current(&mut self, parameter_id: &str, value: u8) {
        self.current.insert(parameter_id.to_string(), value.min(127));
    }

    pub fn reset_current(&mut self, registry: &ParameterRegistry) {
        self.current = registry.all().map(|d| (d.id.clone(), d.default)).collect();
    }

    pub fn current_snapshot(&self) -> HashMap<String, u8> {
        self.current.clone()
    }

    // -------------------------------------------------------------------
    // Transition-engine support
    // -------------------------------------------------------------------

    /// `(parameter_id, from, to)` for every enabled parameter in the
    /// snapshot, `from` taken from the current-value shadow. Parameters
    /// with no current-value entry fall back to their snapshot value as
    /// both endpoints (no movement).
    pub fn interpolation_targets(&self, id: Uuid) -> Vec<(String, u8, u8)> {
        let Some(s) = self.by_id.get(&id) else { return Vec::new() };
        s.parameters
            .iter()
            .filter(|p| p.enabled)
            .map(|p| {
                let from = self.current.get(&p.parameter_id).copied().unwrap_or(p.value);
                (p.parameter_id.clone(), from, p.value)
            })
            .collect()
    }

    /// Wire messages for instantaneously applying every enabled parameter
    /// in the snapshot, followed by its one-shot messages, in declaration
    /// order — the Drop application order.
    pub fn outbound_messages(&self, id: Uuid, registry: &ParameterRegistry) -> Vec<WireMessage> {
        let Some(s) = self.by_id.get(&id) else { return Vec::new() };
        let mut out = Vec::new();
        for p in s.parameters.iter().filter(|p| p.enabled) {
            let Some(descriptor) = registry.get(&p.parameter_id) else {
                warn!(parameter_id = %p.parameter_id, "unknown parameter id in snapshot, skipping");
                continue;
            };
            out.extend(encode_value(&descriptor.encoding, p.value));
        }
        out.extend(s.one_shots.iter().copied());
        out
    }

    /// Apply a snapshot's outbound messages to the current-value shadow,
    /// as Drop/Jump-arrival would: every enabled parameter's new value is
    /// reflected in the shadow.
    pub fn apply_to_current(&mut self, id: Uuid) {
        let Some(s) = self.by_id.get(&id) else { return };
        let updates: Vec<(String, u8)> = s
            .parameters
            .iter()
            .filter(|p| p.enabled)
            .map(|p| (p.parameter_id.clone(), p.value))
            .collect();
        for (parameter_id, value) in updates {
            self.current.insert(parameter_id, value);
        }
    }

    // -------------------------------------------------------------------
    // Import/export
    // -------------------------------------------------------------------

    /// Replace the grid's contents wholesale, e.g. from a loaded project
    /// file. Snapshots with positions outside the configured grid, or
    /// colliding at the same position, are resolved by evict-on-assign in
    /// file order.
    pub fn load(&mut self, snapshots: Vec<Snapshot>) {
        self.by_id.clear();
        self.by_position.clear();
        for mut snapshot in snapshots {
            if !self.position_in_bounds(snapshot.position) {
                warn!(position = ?snapshot.position, "load: dropping snapshot at out-of-bounds position");
                continue;
            }
            clamp_parameters(&mut snapshot.parameters);
            self.insert(snapshot);
        }
    }

    pub fn export(&self) -> Vec<Snapshot> {
        let mut all: Vec<Snapshot> = self.by_id.values().cloned().collect();
        all.sort_by_key(|s| (s.position.bank, s.position.slot));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SnapshotStore {
        let registry = ParameterRegistry::new();
        SnapshotStore::new(8, 16, &registry)
    }

    #[test]
    fn current_shadow_seeded_from_registry_defaults() {
        let store = store();
        assert_eq!(store.get_current("tempo"), Some(64));
        assert_eq!(store.get_current("track_1_volume"), Some(100));
    }

    #[test]
    fn create_empty_rejects_out_of_bounds() {
        let mut store = store();
        assert!(store.create_empty(Position::new(8, 0), "x").is_none());
        assert!(store.create_empty(Position::new(0, 16), "x").is_none());
    }

    #[test]
    fn create_and_find_by_position() {
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "Intro").unwrap();
        let found = store.find_by_position(Position::new(0, 0)).unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.name, "Intro");
    }

    #[test]
    fn assigning_to_occupied_position_evicts_the_old_snapshot() {
        let mut store = store();
        let first = store.create_empty(Position::new(1, 1), "First").unwrap();
        let second = store.create_empty(Position::new(1, 1), "Second").unwrap();
        assert!(store.get(first).is_none());
        assert!(store.get(second).is_some());
        assert_eq!(store.find_by_position(Position::new(1, 1)).unwrap().id, second);
    }

    #[test]
    fn capture_pulls_full_current_shadow() {
        let mut store = store();
        store.set_current("tempo", 90);
        let id = store.capture(Position::new(0, 0), "Snap").unwrap();
        let snap = store.get(id).unwrap();
        assert_eq!(snap.parameters.len(), ParameterRegistry::new().len());
        let tempo = snap.parameters.iter().find(|p| p.parameter_id == "tempo").unwrap();
        assert_eq!(tempo.value, 90);
        assert!(tempo.enabled);
    }

    #[test]
    fn update_merges_only_present_fields() {
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "Original").unwrap();
        store.set_parameter(id, "tempo", 50, true);
        let ok = store.update(
            id,
            SnapshotPatch {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        );
        assert!(ok);
        let snap = store.get(id).unwrap();
        assert_eq!(snap.name, "Renamed");
        assert_eq!(snap.parameters.len(), 1);
    }

    #[test]
    fn set_parameter_inserts_or_updates() {
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "x").unwrap();
        store.set_parameter(id, "tempo", 50, true);
        assert_eq!(store.get(id).unwrap().parameters.len(), 1);
        store.set_parameter(id, "tempo", 60, false);
        let snap = store.get(id).unwrap();
        assert_eq!(snap.parameters.len(), 1);
        assert_eq!(snap.parameters[0].value, 60);
        assert!(!snap.parameters[0].enabled);
    }

    #[test]
    fn set_parameter_clamps_to_127() {
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "x").unwrap();
        store.set_parameter(id, "tempo", 200, true);
        assert_eq!(store.get(id).unwrap().parameters[0].value, 127);
    }

    #[test]
    fn set_current_clamps_to_127() {
        let mut store = store();
        store.set_current("tempo", 255);
        assert_eq!(store.get_current("tempo"), Some(127));
    }

    #[test]
    fn update_clamps_replacement_parameters() {
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "x").unwrap();
        store.update(
            id,
            SnapshotPatch {
                parameters: Some(vec![SnapshotParameter {
                    parameter_id: "tempo".to_string(),
                    value: 200,
                    enabled: true,
                }]),
                ..Default::default()
            },
        );
        assert_eq!(store.get(id).unwrap().parameters[0].value, 127);
    }

    #[test]
    fn load_clamps_out_of_range_parameter_values() {
        let registry = ParameterRegistry::new();
        let mut store = SnapshotStore::new(2, 2, &registry);
        let now = Utc::now();
        let loaded = Snapshot {
            id: Uuid::new_v4(),
            name: "Loaded".to_string(),
            position: Position::new(0, 0),
            parameters: vec![SnapshotParameter {
                parameter_id: "tempo".to_string(),
                value: 255,
                enabled: true,
            }],
            one_shots: vec![],
            color_tag: None,
            created_at: now,
            modified_at: now,
        };
        store.load(vec![loaded]);
        let found = store.find_by_position(Position::new(0, 0)).unwrap();
        assert_eq!(found.parameters[0].value, 127);
    }

    #[test]
    fn toggle_and_remove_parameter() {
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "x").unwrap();
        store.set_parameter(id, "tempo", 50, true);
        assert_eq!(store.toggle_parameter_enabled(id, "tempo"), Some(false));
        assert!(store.remove_parameter(id, "tempo"));
        assert!(store.get(id).unwrap().parameters.is_empty());
    }

    #[test]
    fn copy_lands_at_destination_with_suffix() {
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "Groove").unwrap();
        store.set_parameter(id, "tempo", 77, true);
        let copy_id = store.copy(id, Position::new(3, 3)).unwrap();
        let copy = store.get(copy_id).unwrap();
        assert_eq!(copy.name, "Groove (copy)");
        assert_eq!(copy.position, Position::new(3, 3));
        assert_eq!(copy.parameters[0].value, 77);
    }

    #[test]
    fn copy_rejects_out_of_bounds_destination() {
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "Only").unwrap();
        assert!(store.copy(id, Position::new(99, 0)).is_none());
    }

    #[test]
    fn delete_frees_the_position() {
        let mut store = store();
        let id = store.create_empty(Position::new(2, 2), "x").unwrap();
        assert!(store.delete(id));
        assert!(store.find_by_position(Position::new(2, 2)).is_none());
        assert!(!store.delete(id));
    }

    #[test]
    fn interpolation_targets_use_current_as_from() {
        let mut store = store();
        store.set_current("tempo", 40);
        let id = store.create_empty(Position::new(0, 0), "x").unwrap();
        store.set_parameter(id, "tempo", 100, true);
        store.set_parameter(id, "groove", 10, false);
        let targets = store.interpolation_targets(id);
        assert_eq!(targets, vec![("tempo".to_string(), 40, 100)]);
    }

    #[test]
    fn outbound_messages_skip_disabled_and_append_one_shots() {
        let registry = ParameterRegistry::new();
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "x").unwrap();
        store.set_parameter(id, "tempo", 100, true);
        store.set_parameter(id, "groove", 10, false);
        store.set_one_shots(id, vec![WireMessage::Pc { channel: 1, program: 5 }]);

        let msgs = store.outbound_messages(id, &registry);
        assert_eq!(msgs, vec![WireMessage::Cc { channel: 1, cc: 80, value: 100 }, WireMessage::Pc { channel: 1, program: 5 }]);
    }

    #[test]
    fn apply_to_current_updates_only_enabled() {
        let mut store = store();
        let id = store.create_empty(Position::new(0, 0), "x").unwrap();
        store.set_parameter(id, "tempo", 100, true);
        store.set_parameter(id, "groove", 10, false);
        store.apply_to_current(id);
        assert_eq!(store.get_current("tempo"), Some(100));
        assert_eq!(store.get_current("groove"), Some(64));
    }

    #[test]
    fn load_replaces_grid_and_drops_out_of_bounds() {
        let registry = ParameterRegistry::new();
        let mut store = SnapshotStore::new(2, 2, &registry);
        let now = Utc::now();
        let good = Snapshot {
            id: Uuid::new_v4(),
            name: "Good".to_string(),
            position: Position::new(0, 0),
            parameters: vec![],
            one_shots: vec![],
            color_tag: None,
            created_at: now,
            modified_at: now,
        };
        let bad = Snapshot {
            id: Uuid::new_v4(),
            name: "Bad".to_string(),
            position: Position::new(9, 9),
            parameters: vec![],
            one_shots: vec![],
            color_tag: None,
            created_at: now,
            modified_at: now,
        };
        store.load(vec![good.clone(), bad]);
        assert_eq!(store.list_all().len(), 1);
        assert!(store.find_by_position(Position::new(0, 0)).is_some());
    }

    #[test]
    fn export_sorted_by_position() {
        let mut store = store();
        store.create_empty(Position::new(1, 0), "b").unwrap();
        store.create_empty(Position::new(0, 5), "a").unwrap();
        let exported = store.export();
        assert_eq!(exported[0].position, Position::new(0, 5));
        assert_eq!(exported[1].position, Position::new(1, 0));
    }
}
