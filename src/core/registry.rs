//! Aggregation of named lists with shared defaults and bulk queries.
//!
//! The registry is deliberately thin: it constructs lists from a
//! merged configuration, forwards bulk operations, and answers
//! cross-list queries. Convenience accessors degrade to a logged
//! sentinel when the named list is missing; the registry never fails a
//! running story over a typo'd list name.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use super::list::{ListConfig, ListSnapshot, ListValue};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON serialization error: {0}")]
    Encode(#[from] ron::Error),
    #[error("RON deserialization error: {0}")]
    Decode(#[from] ron::error::SpannedError),
}

/// Full registry state: the §6 save-file shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub lists: FxHashMap<String, ListSnapshot>,
}

// RON definition-file helpers — the data format declares intent
// (exclusive vs flags) rather than config fields.

#[derive(Debug, Deserialize)]
enum RonListKind {
    Exclusive,
    Flags,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "List")]
struct RonListDef {
    name: String,
    kind: RonListKind,
    possible: Vec<String>,
    #[serde(default)]
    initial: Vec<String>,
}

/// Name-to-list registry with a shared default configuration.
#[derive(Debug, Default)]
pub struct ListRegistry {
    lists: FxHashMap<String, ListValue>,
    default_config: ListConfig,
}

impl ListRegistry {
    pub fn new(default_config: ListConfig) -> Self {
        Self {
            lists: FxHashMap::default(),
            default_config,
        }
    }

    /// Construct and register a list, merging the registry default
    /// config with a per-call override (override wins). Redefining an
    /// existing name replaces it.
    pub fn define(
        &mut self,
        name: &str,
        possible: &[&str],
        initial: &[&str],
        config: Option<ListConfig>,
    ) -> &mut ListValue {
        if self.lists.contains_key(name) {
            warn!(list = name, "redefining existing list");
        }
        let merged = config.unwrap_or_else(|| self.default_config.clone());
        let list = ListValue::with_active(name, possible, initial, merged);
        match self.lists.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(list);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(list),
        }
    }

    /// Define a list used under the exclusive convention: at most one
    /// active state, maintained via `enter`/`set_value`. Exclusivity
    /// is a usage discipline, not a structural difference.
    pub fn define_exclusive(
        &mut self,
        name: &str,
        possible: &[&str],
        initial: Option<&str>,
    ) -> &mut ListValue {
        let initial: Vec<&str> = initial.into_iter().collect();
        self.define(name, possible, &initial, None)
    }

    /// Define a many-active-states flags list.
    pub fn define_flags(
        &mut self,
        name: &str,
        possible: &[&str],
        initial: &[&str],
    ) -> &mut ListValue {
        self.define(name, possible, initial, None)
    }

    pub fn list(&self, name: &str) -> Option<&ListValue> {
        self.lists.get(name)
    }

    pub fn list_mut(&mut self, name: &str) -> Option<&mut ListValue> {
        self.lists.get_mut(name)
    }

    pub fn contains_list(&self, name: &str) -> bool {
        self.lists.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Registered list names, sorted for determinism.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.lists.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    // -- bulk operations --------------------------------------------

    pub fn reset_all(&mut self) {
        for list in self.lists.values_mut() {
            list.reset();
        }
    }

    pub fn lock_all(&mut self) {
        for list in self.lists.values_mut() {
            list.lock();
        }
    }

    pub fn unlock_all(&mut self) {
        for list in self.lists.values_mut() {
            list.unlock();
        }
    }

    pub fn clear_all_history(&mut self) {
        for list in self.lists.values_mut() {
            list.clear_history();
        }
    }

    // -- cross-list queries -----------------------------------------

    pub fn is_state_active_anywhere(&self, state: &str) -> bool {
        self.lists.values().any(|l| l.contains(state))
    }

    /// Names of lists in which `state` is currently active, sorted.
    pub fn find_lists_with_state(&self, state: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .lists
            .values()
            .filter(|l| l.contains(state))
            .map(|l| l.name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Map of list name to its active states.
    pub fn active_summary(&self) -> FxHashMap<String, Vec<String>> {
        self.lists
            .iter()
            .map(|(name, list)| (name.clone(), list.active_values().to_vec()))
            .collect()
    }

    // -- convenience accessors --------------------------------------
    // All of these degrade to a logged sentinel on a missing list.

    fn missing(&self, name: &str, op: &str) {
        warn!(list = name, op, "operation on unknown list");
    }

    /// Current value of an exclusive-style list (its first active
    /// state), or `None`.
    pub fn get_value(&self, name: &str) -> Option<&str> {
        match self.lists.get(name) {
            Some(list) => list.active_values().first().map(String::as_str),
            None => {
                self.missing(name, "get_value");
                None
            }
        }
    }

    /// Set the sole active state of an exclusive-style list.
    pub fn set_value(&mut self, name: &str, state: &str) -> bool {
        match self.lists.get_mut(name) {
            Some(list) => list.enter(state),
            None => {
                self.missing(name, "set_value");
                false
            }
        }
    }

    pub fn get_values(&self, name: &str) -> Vec<String> {
        match self.lists.get(name) {
            Some(list) => list.active_values().to_vec(),
            None => {
                self.missing(name, "get_values");
                Vec::new()
            }
        }
    }

    pub fn set_values(&mut self, name: &str, states: &[&str]) -> bool {
        match self.lists.get_mut(name) {
            Some(list) => list.set(states),
            None => {
                self.missing(name, "set_values");
                false
            }
        }
    }

    pub fn has_value(&self, name: &str, state: &str) -> bool {
        match self.lists.get(name) {
            Some(list) => list.contains(state),
            None => {
                self.missing(name, "has_value");
                false
            }
        }
    }

    pub fn add_value(&mut self, name: &str, state: &str) -> bool {
        match self.lists.get_mut(name) {
            Some(list) => list.add(state),
            None => {
                self.missing(name, "add_value");
                false
            }
        }
    }

    pub fn remove_value(&mut self, name: &str, state: &str) -> bool {
        match self.lists.get_mut(name) {
            Some(list) => list.remove(state),
            None => {
                self.missing(name, "remove_value");
                false
            }
        }
    }

    pub fn toggle_value(&mut self, name: &str, state: &str) -> bool {
        match self.lists.get_mut(name) {
            Some(list) => list.toggle(state),
            None => {
                self.missing(name, "toggle_value");
                false
            }
        }
    }

    // -- serialization ----------------------------------------------

    pub fn get_state(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            lists: self
                .lists
                .iter()
                .map(|(name, list)| (name.clone(), list.snapshot()))
                .collect(),
        }
    }

    /// Restore every list's possible/active values from a snapshot.
    /// Lists missing from the registry are created with the default
    /// config; lists absent from the snapshot are left untouched.
    pub fn restore_state(&mut self, snapshot: &RegistrySnapshot) {
        for (name, list_snap) in &snapshot.lists {
            if let Some(list) = self.lists.get_mut(name) {
                list.restore(list_snap);
            } else {
                let possible: Vec<&str> =
                    list_snap.possible_values.iter().map(String::as_str).collect();
                let list = self.define(name, &possible, &[], None);
                list.restore(list_snap);
            }
        }
    }

    /// Snapshot to a RON string.
    pub fn serialize(&self) -> Result<String, RegistryError> {
        Ok(ron::to_string(&self.get_state())?)
    }

    /// Restore from a RON string produced by [`serialize`](Self::serialize).
    pub fn deserialize(&mut self, input: &str) -> Result<(), RegistryError> {
        let snapshot: RegistrySnapshot = ron::from_str(input)?;
        self.restore_state(&snapshot);
        Ok(())
    }

    /// Define lists from a RON definition string.
    pub fn load_definitions(&mut self, input: &str) -> Result<usize, RegistryError> {
        let defs: Vec<RonListDef> = ron::from_str(input)?;
        let count = defs.len();
        for def in defs {
            let possible: Vec<&str> = def.possible.iter().map(String::as_str).collect();
            match def.kind {
                RonListKind::Exclusive => {
                    let initial = def.initial.first().map(String::as_str);
                    self.define_exclusive(&def.name, &possible, initial);
                }
                RonListKind::Flags => {
                    let initial: Vec<&str> = def.initial.iter().map(String::as_str).collect();
                    self.define_flags(&def.name, &possible, &initial);
                }
            }
        }
        Ok(count)
    }

    /// Define lists from a RON definition file.
    pub fn load_definitions_from_ron(&mut self, path: &Path) -> Result<usize, RegistryError> {
        let contents = std::fs::read_to_string(path)?;
        self.load_definitions(&contents)
    }
}
