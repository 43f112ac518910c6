//! Named multi-state containers for persistent story state.
//!
//! A `ListValue` tracks which of a declared set of states are active,
//! with lifecycle hooks, a logical lock, and a bounded mutation
//! history. A "flags" list holds many active states at once; the
//! "exclusive" idiom (at most one active state) is enforced by using
//! [`ListValue::enter`], not by a separate structural type.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Hook fired when a single state becomes active or inactive.
pub type StateHook = Box<dyn FnMut(&str)>;
/// List-level hook fired after any mutation, with the active set
/// before and after.
pub type TransitionHook = Box<dyn FnMut(&[String], &[String])>;

/// Registered lifecycle handlers, keyed by state name, plus one
/// list-level transition handler. Handlers live in an explicit table
/// and are dispatched by the mutation paths; they are never cloned and
/// never serialized.
#[derive(Default)]
pub struct HookTable {
    enter: FxHashMap<String, StateHook>,
    exit: FxHashMap<String, StateHook>,
    transition: Option<TransitionHook>,
}

/// Per-list behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    /// Permit activating states outside the declared possible set.
    pub allow_undeclared: bool,
    /// Record successful mutations in the history log.
    pub track_history: bool,
    /// History length cap; oldest entries are evicted first.
    pub max_history: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            allow_undeclared: false,
            track_history: true,
            max_history: 50,
        }
    }
}

/// Direction of a recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    Added,
    Removed,
}

/// One entry in a list's mutation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: String,
    pub action: HistoryAction,
    /// Monotonic per-list sequence number.
    pub at: u64,
}

/// Serializable list state: the §6 save-file shape. History and hooks
/// are not part of it; use [`ListValue::copy`] to carry history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub name: String,
    pub possible_values: Vec<String>,
    pub active_values: Vec<String>,
}

/// A named multi-state container with bounded history and hooks.
///
/// Mutations return a changed-flag and fail silently: a locked list,
/// an undeclared state, or a no-op all yield `false`. Queries are
/// never affected by the lock.
pub struct ListValue {
    name: String,
    possible: Vec<String>,
    /// Insertion-ordered, duplicate-free.
    active: Vec<String>,
    locked: bool,
    config: ListConfig,
    history: Vec<HistoryEntry>,
    history_seq: u64,
    hooks: HookTable,
}

impl fmt::Debug for ListValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListValue")
            .field("name", &self.name)
            .field("possible", &self.possible)
            .field("active", &self.active)
            .field("locked", &self.locked)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl ListValue {
    pub fn new(name: &str, possible: &[&str], config: ListConfig) -> Self {
        Self {
            name: name.to_string(),
            possible: possible.iter().map(|s| s.to_string()).collect(),
            active: Vec::new(),
            locked: false,
            config,
            history: Vec::new(),
            history_seq: 0,
            hooks: HookTable::default(),
        }
    }

    /// Construct with an initial active set. Initial states bypass
    /// hooks and history; they are the list's starting condition, not
    /// transitions.
    pub fn with_active(name: &str, possible: &[&str], active: &[&str], config: ListConfig) -> Self {
        let mut list = Self::new(name, possible, config);
        for state in active {
            if list.is_valid(state) && !list.contains(state) {
                list.active.push(state.to_string());
            }
        }
        list
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn possible_values(&self) -> &[String] {
        &self.possible
    }

    pub fn active_values(&self) -> &[String] {
        &self.active
    }

    fn is_valid(&self, state: &str) -> bool {
        self.config.allow_undeclared || self.possible.iter().any(|s| s == state)
    }

    // -- mutation ---------------------------------------------------

    /// Activate a state. Returns `false` without side effects when the
    /// list is locked, the state is undeclared, or it is already
    /// active.
    pub fn add(&mut self, state: &str) -> bool {
        if self.locked {
            return false;
        }
        if !self.is_valid(state) {
            warn!(list = %self.name, state, "add refused: state not in possible set");
            return false;
        }
        if self.contains(state) {
            return false;
        }
        let before = self.active.clone();
        self.active.push(state.to_string());
        self.record(state, HistoryAction::Added);
        self.fire_enter(state);
        self.fire_transition(&before);
        true
    }

    /// Deactivate a state. Returns `false` when locked, undeclared, or
    /// not currently active.
    pub fn remove(&mut self, state: &str) -> bool {
        if self.locked {
            return false;
        }
        if !self.is_valid(state) {
            warn!(list = %self.name, state, "remove refused: state not in possible set");
            return false;
        }
        let Some(pos) = self.active.iter().position(|s| s == state) else {
            return false;
        };
        let before = self.active.clone();
        self.active.remove(pos);
        self.record(state, HistoryAction::Removed);
        self.fire_exit(state);
        self.fire_transition(&before);
        true
    }

    /// Add if inactive, remove if active.
    pub fn toggle(&mut self, state: &str) -> bool {
        if self.contains(state) {
            self.remove(state)
        } else {
            self.add(state)
        }
    }

    /// The exclusive-list idiom: deactivate everything else, then
    /// activate `state`. Each exit and the entry fire their hooks.
    pub fn enter(&mut self, state: &str) -> bool {
        if self.locked {
            return false;
        }
        if !self.is_valid(state) {
            warn!(list = %self.name, state, "enter refused: state not in possible set");
            return false;
        }
        let others: Vec<String> = self
            .active
            .iter()
            .filter(|s| s.as_str() != state)
            .cloned()
            .collect();
        let mut changed = false;
        for other in &others {
            changed |= self.remove(other);
        }
        changed |= self.add(state);
        changed
    }

    /// Replace the active set exactly. All requested states are
    /// validated first; if any is undeclared, nothing changes.
    pub fn set(&mut self, states: &[&str]) -> bool {
        if self.locked {
            return false;
        }
        if let Some(bad) = states.iter().find(|s| !self.is_valid(s)) {
            warn!(list = %self.name, state = %bad, "set refused: state not in possible set");
            return false;
        }
        let to_remove: Vec<String> = self
            .active
            .iter()
            .filter(|s| !states.contains(&s.as_str()))
            .cloned()
            .collect();
        let to_add: Vec<&str> = states
            .iter()
            .filter(|s| !self.contains(s))
            .copied()
            .collect();
        let mut changed = false;
        for state in &to_remove {
            changed |= self.remove(state);
        }
        for state in to_add {
            changed |= self.add(state);
        }
        changed
    }

    /// Deactivate every active state, firing exits.
    pub fn clear(&mut self) -> bool {
        if self.locked {
            return false;
        }
        let active: Vec<String> = self.active.clone();
        let mut changed = false;
        for state in &active {
            changed |= self.remove(state);
        }
        changed
    }

    /// Alias for [`clear`](Self::clear).
    pub fn reset(&mut self) -> bool {
        self.clear()
    }

    // -- queries ----------------------------------------------------

    pub fn contains(&self, state: &str) -> bool {
        self.active.iter().any(|s| s == state)
    }

    pub fn count(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_any_active(&self, states: &[&str]) -> bool {
        states.iter().any(|s| self.contains(s))
    }

    pub fn are_all_active(&self, states: &[&str]) -> bool {
        states.iter().all(|s| self.contains(s))
    }

    /// Whether this list's active states are a subset of `other`'s.
    pub fn is_subset_of(&self, other: &ListValue) -> bool {
        self.active.iter().all(|s| other.contains(s))
    }

    /// Set equality of active states, order-independent.
    pub fn equals(&self, other: &ListValue) -> bool {
        self.count() == other.count() && self.is_subset_of(other)
    }

    // -- locking ----------------------------------------------------

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Run `f` with the list locked, then restore the previous lock
    /// state. Guards a caller-defined critical section against
    /// accidental mutation; queries remain available throughout.
    pub fn with_lock<R>(&mut self, f: impl FnOnce(&mut ListValue) -> R) -> R {
        let was_locked = self.locked;
        self.locked = true;
        let result = f(self);
        self.locked = was_locked;
        result
    }

    // -- hooks ------------------------------------------------------

    pub fn on_enter(&mut self, state: &str, hook: StateHook) {
        self.hooks.enter.insert(state.to_string(), hook);
    }

    pub fn on_exit(&mut self, state: &str, hook: StateHook) {
        self.hooks.exit.insert(state.to_string(), hook);
    }

    pub fn on_transition(&mut self, hook: TransitionHook) {
        self.hooks.transition = Some(hook);
    }

    fn fire_enter(&mut self, state: &str) {
        if let Some(hook) = self.hooks.enter.get_mut(state) {
            hook(state);
        }
    }

    fn fire_exit(&mut self, state: &str) {
        if let Some(hook) = self.hooks.exit.get_mut(state) {
            hook(state);
        }
    }

    fn fire_transition(&mut self, before: &[String]) {
        if let Some(hook) = self.hooks.transition.as_mut() {
            hook(before, &self.active);
        }
    }

    // -- history ----------------------------------------------------

    fn record(&mut self, state: &str, action: HistoryAction) {
        if !self.config.track_history {
            return;
        }
        self.history.push(HistoryEntry {
            state: state.to_string(),
            action,
            at: self.history_seq,
        });
        self.history_seq += 1;
        if self.history.len() > self.config.max_history {
            let excess = self.history.len() - self.config.max_history;
            self.history.drain(..excess);
        }
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The most recent `n` history entries, oldest first.
    pub fn recent_transitions(&self, n: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// The most recent activation of `state`, if still in the log.
    pub fn last_entry(&self, state: &str) -> Option<&HistoryEntry> {
        self.history
            .iter()
            .rev()
            .find(|e| e.action == HistoryAction::Added && e.state == state)
    }

    /// The most recent deactivation of `state`, if still in the log.
    pub fn last_exit(&self, state: &str) -> Option<&HistoryEntry> {
        self.history
            .iter()
            .rev()
            .find(|e| e.action == HistoryAction::Removed && e.state == state)
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // -- copy & snapshot --------------------------------------------

    /// Independent clone. The possible-value list is copied, never
    /// shared, so mutating the copy cannot alias the original. Hooks
    /// do not carry over.
    pub fn copy(&self, include_history: bool) -> ListValue {
        ListValue {
            name: self.name.clone(),
            possible: self.possible.clone(),
            active: self.active.clone(),
            locked: self.locked,
            config: self.config.clone(),
            history: if include_history {
                self.history.clone()
            } else {
                Vec::new()
            },
            history_seq: if include_history { self.history_seq } else { 0 },
            hooks: HookTable::default(),
        }
    }

    pub fn snapshot(&self) -> ListSnapshot {
        ListSnapshot {
            name: self.name.clone(),
            possible_values: self.possible.clone(),
            active_values: self.active.clone(),
        }
    }

    /// Replace possible/active values from a snapshot. Restoration is
    /// not a transition: no hooks fire and no history is recorded.
    pub fn restore(&mut self, snapshot: &ListSnapshot) {
        self.possible = snapshot.possible_values.clone();
        self.active = snapshot.active_values.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn doors() -> ListValue {
        ListValue::new("doors", &["north", "south", "east"], ListConfig::default())
    }

    #[test]
    fn add_and_remove() {
        let mut list = doors();
        assert!(list.add("north"));
        assert!(list.contains("north"));
        assert_eq!(list.count(), 1);
        assert!(list.remove("north"));
        assert!(list.is_empty());
    }

    #[test]
    fn add_is_idempotent() {
        let mut list = doors();
        assert!(list.add("north"));
        assert!(!list.add("north"));
        assert_eq!(list.count(), 1);
        // only one history entry recorded
        assert_eq!(list.history().len(), 1);
    }

    #[test]
    fn remove_inactive_is_noop() {
        let mut list = doors();
        assert!(!list.remove("north"));
        assert!(list.history().is_empty());
    }

    #[test]
    fn undeclared_state_refused() {
        let mut list = doors();
        assert!(!list.add("trapdoor"));
        assert!(list.is_empty());
    }

    #[test]
    fn undeclared_state_allowed_with_escape() {
        let mut list = ListValue::new(
            "notes",
            &[],
            ListConfig {
                allow_undeclared: true,
                ..ListConfig::default()
            },
        );
        assert!(list.add("anything"));
        assert!(list.contains("anything"));
    }

    #[test]
    fn toggle_round_trip() {
        let mut list = doors();
        assert!(list.toggle("south"));
        assert!(list.contains("south"));
        assert!(list.toggle("south"));
        assert!(!list.contains("south"));
        assert_eq!(list.history().len(), 2);
        assert_eq!(list.history()[0].action, HistoryAction::Added);
        assert_eq!(list.history()[1].action, HistoryAction::Removed);
    }

    #[test]
    fn enter_clears_other_states() {
        let mut list = doors();
        list.add("north");
        list.add("south");
        assert!(list.enter("east"));
        assert_eq!(list.active_values(), &["east".to_string()]);
    }

    #[test]
    fn enter_sole_active_is_noop() {
        let mut list = doors();
        list.add("north");
        assert!(!list.enter("north"));
    }

    #[test]
    fn set_is_atomic() {
        let mut list = doors();
        list.add("north");
        // one bad state poisons the whole request
        assert!(!list.set(&["south", "trapdoor"]));
        assert_eq!(list.active_values(), &["north".to_string()]);

        assert!(list.set(&["south", "east"]));
        assert!(list.contains("south"));
        assert!(list.contains("east"));
        assert!(!list.contains("north"));
    }

    #[test]
    fn set_identical_is_noop() {
        let mut list = doors();
        list.add("north");
        assert!(!list.set(&["north"]));
    }

    #[test]
    fn clear_empties() {
        let mut list = doors();
        list.add("north");
        list.add("south");
        assert!(list.clear());
        assert!(list.is_empty());
        assert!(!list.clear());
    }

    #[test]
    fn queries() {
        let mut list = doors();
        list.add("north");
        list.add("south");
        assert!(list.is_any_active(&["south", "east"]));
        assert!(!list.is_any_active(&["east"]));
        assert!(list.are_all_active(&["north", "south"]));
        assert!(!list.are_all_active(&["north", "east"]));

        let mut other = doors();
        other.add("south");
        other.add("north");
        other.add("east");
        assert!(list.is_subset_of(&other));
        assert!(!other.is_subset_of(&list));
        assert!(!list.equals(&other));
        other.remove("east");
        assert!(list.equals(&other));
    }

    #[test]
    fn lock_blocks_mutation_not_queries() {
        let mut list = doors();
        list.add("north");
        list.lock();
        assert!(!list.add("south"));
        assert!(!list.remove("north"));
        assert!(!list.enter("east"));
        assert!(!list.set(&["east"]));
        assert!(!list.clear());
        assert!(list.contains("north"));
        assert_eq!(list.count(), 1);
        list.unlock();
        assert!(list.add("south"));
    }

    #[test]
    fn with_lock_restores_previous_state() {
        let mut list = doors();
        let mutated = list.with_lock(|l| l.add("north"));
        assert!(!mutated);
        assert!(!list.is_locked());

        // nesting keeps the outer lock
        list.lock();
        list.with_lock(|_| {});
        assert!(list.is_locked());
    }

    #[test]
    fn hooks_fire_once_per_mutation() {
        let mut list = doors();
        let entries = Rc::new(RefCell::new(Vec::new()));
        let exits = Rc::new(RefCell::new(Vec::new()));

        let e = Rc::clone(&entries);
        list.on_enter("north", Box::new(move |s| e.borrow_mut().push(s.to_string())));
        let x = Rc::clone(&exits);
        list.on_exit("north", Box::new(move |s| x.borrow_mut().push(s.to_string())));

        list.add("north");
        list.add("north"); // no-op, no second firing
        list.remove("north");
        list.remove("north");

        assert_eq!(*entries.borrow(), vec!["north"]);
        assert_eq!(*exits.borrow(), vec!["north"]);
    }

    #[test]
    fn transition_hook_sees_before_and_after() {
        let mut list = doors();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        list.on_transition(Box::new(move |before, after| {
            s.borrow_mut().push((before.to_vec(), after.to_vec()));
        }));

        list.add("north");
        list.remove("north");
        let log = seen.borrow();
        assert_eq!(log[0], (vec![], vec!["north".to_string()]));
        assert_eq!(log[1], (vec!["north".to_string()], vec![]));
    }

    #[test]
    fn enter_fires_exits_then_entry() {
        let mut list = doors();
        let order = Rc::new(RefCell::new(Vec::new()));
        for state in ["north", "south", "east"] {
            let enter_log = Rc::clone(&order);
            list.on_enter(
                state,
                Box::new(move |s| enter_log.borrow_mut().push(format!("+{s}"))),
            );
            let exit_log = Rc::clone(&order);
            list.on_exit(
                state,
                Box::new(move |s| exit_log.borrow_mut().push(format!("-{s}"))),
            );
        }
        list.add("north");
        list.add("south");
        order.borrow_mut().clear();
        list.enter("east");
        assert_eq!(*order.borrow(), vec!["-north", "-south", "+east"]);
    }

    #[test]
    fn history_is_bounded() {
        let mut list = ListValue::new(
            "busy",
            &["on"],
            ListConfig {
                max_history: 4,
                ..ListConfig::default()
            },
        );
        for _ in 0..5 {
            list.add("on");
            list.remove("on");
        }
        assert_eq!(list.history().len(), 4);
        // oldest entries evicted: sequence numbers keep climbing
        assert_eq!(list.history()[0].at, 6);
        assert_eq!(list.history()[3].at, 9);
    }

    #[test]
    fn history_lookups() {
        let mut list = doors();
        list.add("north");
        list.add("south");
        list.remove("north");
        list.add("north");

        let last = list.last_entry("north").unwrap();
        assert_eq!(last.at, 3);
        let exit = list.last_exit("north").unwrap();
        assert_eq!(exit.at, 2);
        assert!(list.last_exit("south").is_none());

        let recent = list.recent_transitions(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, HistoryAction::Removed);
        assert_eq!(recent[1].action, HistoryAction::Added);
    }

    #[test]
    fn history_disabled() {
        let mut list = ListValue::new(
            "quiet",
            &["on"],
            ListConfig {
                track_history: false,
                ..ListConfig::default()
            },
        );
        list.add("on");
        list.remove("on");
        assert!(list.history().is_empty());
    }

    #[test]
    fn copy_is_independent() {
        let mut list = doors();
        list.add("north");
        let mut copied = list.copy(true);
        assert_eq!(copied.active_values(), list.active_values());
        assert_eq!(copied.history().len(), 1);

        copied.add("south");
        assert!(!list.contains("south"));

        let bare = list.copy(false);
        assert!(bare.history().is_empty());
    }

    #[test]
    fn snapshot_restore_skips_hooks_and_history() {
        let mut list = doors();
        list.add("north");
        let snap = list.snapshot();
        assert_eq!(snap.active_values, vec!["north".to_string()]);

        let mut fresh = doors();
        let fired = Rc::new(RefCell::new(0));
        let f = Rc::clone(&fired);
        fresh.on_enter("north", Box::new(move |_| *f.borrow_mut() += 1));
        fresh.restore(&snap);
        assert!(fresh.contains("north"));
        assert_eq!(*fired.borrow(), 0);
        assert!(fresh.history().is_empty());
    }
}
