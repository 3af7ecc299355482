//! Delta state helper
//!
//! Per-component key/value store that records, for every property,
//! either its full value (before the baseline marker) or the sequence
//! of operations applied since the baseline (after `mark_initial_state`).
//! Saving a marked helper transmits only the recorded operations; the
//! values present at mark time form a frozen template that restore
//! replays those operations against.

use arbor_types::{PropertyKey, StateValue};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single recorded mutation against the baseline template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeltaOp {
    /// Overwrite the keyed slot with a value
    Put(StateValue),

    /// Clear the keyed slot
    Remove,

    /// Append a value to a list-valued property
    ListAdd(StateValue),

    /// Remove the first equal value from a list-valued property
    ListRemove(StateValue),

    /// Insert an entry into a map-valued property
    MapPut(String, StateValue),

    /// Remove an entry from a map-valued property
    MapRemove(String),
}

/// Saved helper state: the full map before the baseline, the recorded
/// operation sequence after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SavedState {
    Full(HashMap<PropertyKey, StateValue>),
    Delta(Vec<(PropertyKey, DeltaOp)>),
}

/// Resolves a value expression against an external object graph.
///
/// This is the one seam where the state helper touches the expression
/// language collaborator; the implementation is a black box here.
pub trait ExpressionResolver {
    fn eval(&self, expression: &str) -> Option<StateValue>;
}

/// Per-component property store with delta tracking.
///
/// Before `mark_initial_state` the helper is a plain map. After the
/// mark, the map is frozen as the template and every mutation appends
/// a [`DeltaOp`]; reads overlay the recorded operations on the
/// template.
#[derive(Debug, Default)]
pub struct DeltaStateHelper {
    /// Live map pre-mark; frozen template post-mark
    values: HashMap<PropertyKey, StateValue>,

    /// Operations recorded since the mark, in application order
    delta_ops: Vec<(PropertyKey, DeltaOp)>,

    /// Whether the baseline marker has been passed
    initial_state: bool,
}

impl DeltaStateHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the helper is past its baseline marker.
    pub fn initial_state(&self) -> bool {
        self.initial_state
    }

    /// Freeze the current values as the baseline template. Mutations
    /// from here on are recorded as delta operations.
    pub fn mark_initial_state(&mut self) {
        self.initial_state = true;
        self.delta_ops.clear();
    }

    /// Fold any recorded operations back into the full map and leave
    /// baseline mode. Used when a tree is about to serve as a fresh
    /// template again.
    pub fn clear_initial_state(&mut self) {
        if self.initial_state {
            let keys: Vec<PropertyKey> = self.touched_keys();
            for key in keys {
                match self.resolve(&key) {
                    Some(value) => {
                        self.values.insert(key, value);
                    }
                    None => {
                        self.values.remove(&key);
                    }
                }
            }
            self.delta_ops.clear();
            self.initial_state = false;
        }
    }

    fn touched_keys(&self) -> Vec<PropertyKey> {
        let mut keys = Vec::new();
        for (key, _) in &self.delta_ops {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Currently visible value for a key: the template value overlaid
    /// with every recorded operation for that key, in order.
    fn resolve(&self, key: &PropertyKey) -> Option<StateValue> {
        let mut current = self.values.get(key).cloned();
        for (op_key, op) in &self.delta_ops {
            if op_key != key {
                continue;
            }
            current = apply_op(current, op, key);
        }
        current
    }

    /// Get the currently visible logical value for a key.
    pub fn get(&self, key: &PropertyKey) -> Option<StateValue> {
        if self.initial_state {
            self.resolve(key)
        } else {
            self.values.get(key).cloned()
        }
    }

    /// Like [`get`](Self::get), falling back to an externally resolved
    /// value (an expression binding) when no local value is set.
    pub fn eval_with<F>(&self, key: &PropertyKey, fallback: F) -> Option<StateValue>
    where
        F: FnOnce() -> Option<StateValue>,
    {
        self.get(key).or_else(fallback)
    }

    /// Set a property, returning the previously visible value.
    ///
    /// Post-mark the mutation is recorded only when the value actually
    /// differs from what a read would currently see.
    pub fn put(&mut self, key: PropertyKey, value: StateValue) -> Option<StateValue> {
        if !self.initial_state {
            return self.values.insert(key, value);
        }
        let previous = self.resolve(&key);
        if previous.as_ref() != Some(&value) {
            self.delta_ops.push((key, DeltaOp::Put(value)));
        }
        previous
    }

    /// Remove a property, returning the previously visible value.
    /// Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &PropertyKey) -> Option<StateValue> {
        if !self.initial_state {
            return self.values.remove(key);
        }
        let previous = self.resolve(key);
        if previous.is_some() {
            self.delta_ops.push((key.clone(), DeltaOp::Remove));
        }
        previous
    }

    /// Append a value to a list-valued property, creating the list if
    /// the key is absent.
    ///
    /// # Panics
    ///
    /// Panics if the key currently holds a non-list value.
    pub fn add_to_list(&mut self, key: PropertyKey, value: StateValue) {
        if !self.initial_state {
            let slot = self
                .values
                .entry(key.clone())
                .or_insert_with(|| StateValue::List(Vec::new()));
            match slot {
                StateValue::List(items) => items.push(value),
                other => panic!(
                    "list operation on non-list property `{}` (found {:?})",
                    key.as_str(),
                    other
                ),
            }
            return;
        }
        assert_list_shape(self.resolve(&key).as_ref(), &key);
        self.delta_ops.push((key, DeltaOp::ListAdd(value)));
    }

    /// Remove the first equal value from a list-valued property.
    /// Removing an absent value (or from an absent list) is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the key currently holds a non-list value.
    pub fn remove_from_list(&mut self, key: &PropertyKey, value: &StateValue) {
        if !self.initial_state {
            match self.values.get_mut(key) {
                Some(StateValue::List(items)) => {
                    if let Some(pos) = items.iter().position(|v| v == value) {
                        items.remove(pos);
                    }
                }
                Some(other) => panic!(
                    "list operation on non-list property `{}` (found {:?})",
                    key.as_str(),
                    other
                ),
                None => {}
            }
            return;
        }
        let current = self.resolve(key);
        assert_list_shape(current.as_ref(), key);
        let present = current
            .and_then(|v| v.as_list().map(|items| items.contains(value)))
            .unwrap_or(false);
        if present {
            self.delta_ops
                .push((key.clone(), DeltaOp::ListRemove(value.clone())));
        }
    }

    /// Insert an entry into a map-valued property, creating the map if
    /// the key is absent. Recorded only when the entry actually changes.
    ///
    /// # Panics
    ///
    /// Panics if the key currently holds a non-map value.
    pub fn put_in_map(&mut self, key: PropertyKey, subkey: impl Into<String>, value: StateValue) {
        let subkey = subkey.into();
        if !self.initial_state {
            let slot = self
                .values
                .entry(key.clone())
                .or_insert_with(|| StateValue::Map(BTreeMap::new()));
            match slot {
                StateValue::Map(entries) => {
                    entries.insert(subkey, value);
                }
                other => panic!(
                    "map operation on non-map property `{}` (found {:?})",
                    key.as_str(),
                    other
                ),
            }
            return;
        }
        let current = self.resolve(&key);
        assert_map_shape(current.as_ref(), &key);
        let unchanged = current
            .and_then(|v| v.as_map().and_then(|m| m.get(&subkey).cloned()))
            .map(|existing| existing == value)
            .unwrap_or(false);
        if !unchanged {
            self.delta_ops.push((key, DeltaOp::MapPut(subkey, value)));
        }
    }

    /// Remove an entry from a map-valued property. Removing an absent
    /// entry is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the key currently holds a non-map value.
    pub fn remove_from_map(&mut self, key: &PropertyKey, subkey: &str) {
        if !self.initial_state {
            match self.values.get_mut(key) {
                Some(StateValue::Map(entries)) => {
                    entries.remove(subkey);
                }
                Some(other) => panic!(
                    "map operation on non-map property `{}` (found {:?})",
                    key.as_str(),
                    other
                ),
                None => {}
            }
            return;
        }
        let current = self.resolve(key);
        assert_map_shape(current.as_ref(), key);
        let present = current
            .and_then(|v| v.as_map().map(|m| m.contains_key(subkey)))
            .unwrap_or(false);
        if present {
            self.delta_ops
                .push((key.clone(), DeltaOp::MapRemove(subkey.to_string())));
        }
    }

    /// Save the helper's state.
    ///
    /// Pre-mark: `None` iff no properties are set, else the full map.
    /// Post-mark: `None` iff no operations were recorded, else the
    /// ordered operation sequence.
    pub fn save_state(&self) -> Option<SavedState> {
        if self.initial_state {
            if self.delta_ops.is_empty() {
                None
            } else {
                Some(SavedState::Delta(self.delta_ops.clone()))
            }
        } else if self.values.is_empty() {
            None
        } else {
            Some(SavedState::Full(self.values.clone()))
        }
    }

    /// Restore previously saved state.
    ///
    /// A full payload replaces the map outright. A delta payload is
    /// replayed in order against the existing template values,
    /// creating list/map containers from the template if absent.
    ///
    /// # Panics
    ///
    /// Panics if a list/map operation targets a template value of an
    /// incompatible shape. That is a contract violation, not a
    /// recoverable condition.
    pub fn restore_state(&mut self, saved: SavedState) {
        match saved {
            SavedState::Full(map) => {
                self.values = map;
                self.delta_ops.clear();
            }
            SavedState::Delta(ops) => {
                for (key, op) in ops {
                    let current = self.values.get(&key).cloned();
                    match apply_op(current, &op, &key) {
                        Some(value) => {
                            self.values.insert(key, value);
                        }
                        None => {
                            self.values.remove(&key);
                        }
                    }
                }
                self.delta_ops.clear();
            }
        }
    }

    /// Number of properties currently visible (test support).
    pub fn len(&self) -> usize {
        if !self.initial_state {
            return self.values.len();
        }
        let mut keys: Vec<&PropertyKey> = self.values.keys().collect();
        for (key, _) in &self.delta_ops {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys.into_iter()
            .filter(|key| self.resolve(key).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply one operation to the current value of its key.
///
/// Panics when the operation's shape disagrees with the value it is
/// applied to: replaying a list op against a scalar template means the
/// caller saved and restored across incompatible component versions.
fn apply_op(current: Option<StateValue>, op: &DeltaOp, key: &PropertyKey) -> Option<StateValue> {
    match op {
        DeltaOp::Put(value) => Some(value.clone()),
        DeltaOp::Remove => None,
        DeltaOp::ListAdd(value) => {
            let mut items = match current {
                Some(StateValue::List(items)) => items,
                None => Vec::new(),
                Some(other) => panic!(
                    "list delta replayed against non-list template for `{}` (found {:?})",
                    key.as_str(),
                    other
                ),
            };
            items.push(value.clone());
            Some(StateValue::List(items))
        }
        DeltaOp::ListRemove(value) => match current {
            Some(StateValue::List(mut items)) => {
                if let Some(pos) = items.iter().position(|v| v == value) {
                    items.remove(pos);
                }
                Some(StateValue::List(items))
            }
            None => None,
            Some(other) => panic!(
                "list delta replayed against non-list template for `{}` (found {:?})",
                key.as_str(),
                other
            ),
        },
        DeltaOp::MapPut(subkey, value) => {
            let mut entries = match current {
                Some(StateValue::Map(entries)) => entries,
                None => BTreeMap::new(),
                Some(other) => panic!(
                    "map delta replayed against non-map template for `{}` (found {:?})",
                    key.as_str(),
                    other
                ),
            };
            entries.insert(subkey.clone(), value.clone());
            Some(StateValue::Map(entries))
        }
        DeltaOp::MapRemove(subkey) => match current {
            Some(StateValue::Map(mut entries)) => {
                entries.remove(subkey);
                Some(StateValue::Map(entries))
            }
            None => None,
            Some(other) => panic!(
                "map delta replayed against non-map template for `{}` (found {:?})",
                key.as_str(),
                other
            ),
        },
    }
}

fn assert_list_shape(value: Option<&StateValue>, key: &PropertyKey) {
    if let Some(other) = value {
        if !matches!(other, StateValue::List(_)) {
            panic!(
                "list operation on non-list property `{}` (found {:?})",
                key.as_str(),
                other
            );
        }
    }
}

fn assert_map_shape(value: Option<&StateValue>, key: &PropertyKey) {
    if let Some(other) = value {
        if !matches!(other, StateValue::Map(_)) {
            panic!(
                "map operation on non-map property `{}` (found {:?})",
                key.as_str(),
                other
            );
        }
    }
}
