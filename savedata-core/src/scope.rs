//! Scopes, lifecycle transitions, and the per-feature save data object.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::value::Table;

/// A named subtree of a feature's state with its own lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// Never cleared automatically. Survives process restarts.
    Persistent,
    /// Cleared when a new session starts.
    Run,
    /// Cleared when a new sub-session starts.
    Level,
    /// Cleared when a new area starts. Never written to the save slot.
    Room,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::Persistent, Scope::Run, Scope::Level, Scope::Room];

    /// Scopes written to the save slot.
    pub const DURABLE: [Scope; 3] = [Scope::Persistent, Scope::Run, Scope::Level];

    pub fn name(self) -> &'static str {
        match self {
            Scope::Persistent => "persistent",
            Scope::Run => "run",
            Scope::Level => "level",
            Scope::Room => "room",
        }
    }

    pub fn from_name(name: &str) -> Option<Scope> {
        Self::ALL.iter().copied().find(|scope| scope.name() == name)
    }

    pub fn is_transient(self) -> bool {
        self != Scope::Persistent
    }

    pub fn is_durable(self) -> bool {
        self != Scope::Room
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Externally delivered lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The host process started; durable state is loaded from the slot.
    ProcessStart,
    /// A fresh session started.
    SessionStart,
    /// A session that was already in progress at process start resumed.
    SessionContinue,
    /// The session ended and the host returned to its menu.
    SessionEnd,
    SubSessionStart,
    AreaStart,
    /// The same area start, delivered one tick later once area contents settle.
    AreaStartDeferred,
}

impl Transition {
    /// Scopes whose lifetime ends at this transition, ignoring area-clear timing.
    pub fn cleared_scopes(self) -> &'static [Scope] {
        match self {
            Transition::SessionStart | Transition::SessionEnd => &[Scope::Run, Scope::Level, Scope::Room],
            Transition::SubSessionStart => &[Scope::Level, Scope::Room],
            Transition::AreaStart | Transition::AreaStartDeferred => &[Scope::Room],
            Transition::ProcessStart | Transition::SessionContinue => &[],
        }
    }
}

/// A feature's state object: one table per scope it uses.
#[derive(Debug, Default, PartialEq)]
pub struct SaveData {
    scopes: BTreeMap<Scope, Table>,
}

/// Shared handle through which both the feature and the manager see the same state.
pub type SharedSaveData = Rc<RefCell<SaveData>>;

impl SaveData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style scope setter.
    pub fn with_scope(mut self, scope: Scope, table: Table) -> Self {
        self.scopes.insert(scope, table);
        self
    }

    /// Wraps this state in a shared handle for registration.
    pub fn shared(self) -> SharedSaveData {
        Rc::new(RefCell::new(self))
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains_key(&scope)
    }

    pub fn scope(&self, scope: Scope) -> Option<&Table> {
        self.scopes.get(&scope)
    }

    pub fn scope_mut(&mut self, scope: Scope) -> Option<&mut Table> {
        self.scopes.get_mut(&scope)
    }

    pub fn set_scope(&mut self, scope: Scope, table: Table) -> Option<Table> {
        self.scopes.insert(scope, table)
    }

    pub fn scopes(&self) -> impl Iterator<Item = (Scope, &Table)> + '_ {
        self.scopes.iter().map(|(scope, table)| (*scope, table))
    }

    /// True when the only scope present is `room`, which is never saved.
    pub fn is_room_only(&self) -> bool {
        self.scopes.keys().all(|scope| *scope == Scope::Room)
    }
}
