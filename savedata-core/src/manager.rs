/*!
The save data manager: feature registry and lifecycle driver.

Features register a shared state object once. The manager then clears scopes as
lifecycle transitions arrive, writes the durable scopes of every feature to the
save slot on save, and merges them back into the live state on load.
*/

use std::cell::{Ref, RefMut};
use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::codec::CodecRegistry;
use crate::config::{AreaClearTiming, ManagerConfig};
use crate::copy::{Copier, CopyMode};
use crate::merge::merge_into;
use crate::scope::{SaveData, Scope, SharedSaveData, Transition};
use crate::slot::{MemorySlot, SaveSlot};
use crate::text::{JsonCodec, TextCodec};
use crate::value::Table;
use crate::{Result, SaveDataError};

#[cfg(feature = "metrics")]
use crate::observability::SaveTimer;

/// Whether a feature currently takes part in clearing, saving and rewinding.
pub enum Activity {
    Always,
    Never,
    /// Evaluated at every clear, save and rewind backup.
    When(Box<dyn Fn() -> bool>),
}

impl Activity {
    pub fn is_active(&self) -> bool {
        match self {
            Activity::Always => true,
            Activity::Never => false,
            Activity::When(predicate) => predicate(),
        }
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Always => f.write_str("Always"),
            Activity::Never => f.write_str("Never"),
            Activity::When(_) => f.write_str("When(..)"),
        }
    }
}

/// A feature's request to be managed, built with chained options.
///
/// ```rust
/// use savedata_core::{table, Registration, SaveData, Scope};
///
/// let state = SaveData::new()
///     .with_scope(Scope::Run, table! { "kills" => 0 })
///     .shared();
/// let registration = Registration::new("kill_counter", state)
///     .active_when(|| true)
///     .ignore_rewind();
/// assert_eq!(registration.name(), "kill_counter");
/// ```
#[derive(Debug)]
pub struct Registration {
    name: String,
    state: SharedSaveData,
    activity: Activity,
    saved: bool,
    rewind_persistent: bool,
    ignore_rewind: bool,
}

impl Registration {
    pub fn new<N: Into<String>>(name: N, state: SharedSaveData) -> Self {
        Self {
            name: name.into(),
            state,
            activity: Activity::Always,
            saved: true,
            rewind_persistent: false,
            ignore_rewind: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Only clear, save and rewind this feature while `predicate` holds.
    pub fn active_when<F: Fn() -> bool + 'static>(mut self, predicate: F) -> Self {
        self.activity = Activity::When(Box::new(predicate));
        self
    }

    pub fn activity(mut self, activity: Activity) -> Self {
        self.activity = activity;
        self
    }

    /// Keep clearing this feature's scopes but never write them to the slot.
    ///
    /// Use this for state holding values that have no codec.
    pub fn never_saved(mut self) -> Self {
        self.saved = false;
        self
    }

    /// Also roll the persistent scope back on rewind.
    pub fn rewind_persistent(mut self) -> Self {
        self.rewind_persistent = true;
        self
    }

    /// Exclude this feature from rewind backups entirely.
    pub fn ignore_rewind(mut self) -> Self {
        self.ignore_rewind = true;
        self
    }
}

/// A registered feature and the defaults captured when it registered.
#[derive(Debug)]
struct Feature {
    state: SharedSaveData,
    defaults: BTreeMap<Scope, Table>,
    activity: Activity,
    saved: bool,
    rewind_persistent: bool,
    ignore_rewind: bool,
}

impl Feature {
    fn state(&self, name: &str) -> Result<Ref<'_, SaveData>> {
        self.state
            .try_borrow()
            .map_err(|_| SaveDataError::validation(format!("Save data for feature \"{name}\" is mutably borrowed")))
    }

    fn state_mut(&self, name: &str) -> Result<RefMut<'_, SaveData>> {
        self.state
            .try_borrow_mut()
            .map_err(|_| SaveDataError::validation(format!("Save data for feature \"{name}\" is already borrowed")))
    }

    fn is_persisted(&self) -> bool {
        self.saved && self.activity.is_active()
    }

    fn rewind_scopes(&self) -> &'static [Scope] {
        if self.rewind_persistent {
            &[Scope::Persistent, Scope::Run, Scope::Level]
        } else {
            &[Scope::Run, Scope::Level]
        }
    }
}

fn scope_path(name: &str, scope: Scope) -> String {
    format!("{name} > {scope}")
}

/// Registry of features plus the lifecycle state machine driving them.
///
/// Generic over the save slot and the text codec so hosts and tests can plug
/// in their own adapters.
///
/// # Example
/// ```rust
/// use savedata_core::{table, MemorySlot, Registration, SaveData, SaveDataManager, Scope, Transition};
///
/// let mut manager = SaveDataManager::new(MemorySlot::new());
/// manager.initialize();
///
/// let state = SaveData::new()
///     .with_scope(Scope::Persistent, table! { "max" => 3 })
///     .with_scope(Scope::Room, table! { "visited" => false })
///     .shared();
/// manager.register(Registration::new("hp", state.clone()))?;
///
/// manager.on_transition(Transition::SessionStart)?;
/// manager.on_save()?;
/// # Ok::<(), savedata_core::SaveDataError>(())
/// ```
pub struct SaveDataManager<S, C = JsonCodec>
where
    S: SaveSlot,
    C: TextCodec,
{
    slot: S,
    codec: C,
    codecs: CodecRegistry,
    config: ManagerConfig,
    features: BTreeMap<String, Feature>,
    rewind_backups: BTreeMap<String, BTreeMap<Scope, Table>>,
    rewind_pending: bool,
    already_initialized: bool,
    torn_down: bool,
    in_session: bool,
}

impl<S: SaveSlot> SaveDataManager<S, JsonCodec> {
    /// Create a manager with the JSON codec and default configuration
    pub fn new(slot: S) -> Self {
        Self::with_config(slot, JsonCodec::new(), ManagerConfig::default())
    }
}

impl<S, C> SaveDataManager<S, C>
where
    S: SaveSlot,
    C: TextCodec,
{
    /// Create a manager with explicit adapters and configuration
    ///
    /// The `slot` section of `config` is ignored here; the slot is given directly.
    pub fn with_config(slot: S, codec: C, config: ManagerConfig) -> Self {
        Self {
            slot,
            codec,
            codecs: CodecRegistry::new(),
            config,
            features: BTreeMap::new(),
            rewind_backups: BTreeMap::new(),
            rewind_pending: false,
            already_initialized: false,
            torn_down: false,
            in_session: false,
        }
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Codec registry used for every copy; register classes and factories here
    /// before registering features that use them.
    pub fn codecs_mut(&mut self) -> &mut CodecRegistry {
        &mut self.codecs
    }

    /// One-time upgrade step that enables registration.
    ///
    /// Returns `false` when the manager was already initialized.
    pub fn initialize(&mut self) -> bool {
        if self.already_initialized {
            return false;
        }
        self.already_initialized = true;
        debug!(slot = %self.slot.describe(), codec = self.codec.name(), "Save data manager initialized");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.already_initialized
    }

    fn copier(&self, mode: CopyMode) -> Copier<'_> {
        Copier::new(mode, &self.codecs).with_tracing(self.config.trace_traversal)
    }

    /// Register a feature's state object.
    ///
    /// Captures a copy of every scope as the default that clearing restores.
    /// Saved features are trial-serialized here so values without a codec fail
    /// now rather than at the first save. The feature's durable scopes are then
    /// recovered from the save slot.
    ///
    /// # Errors
    /// * `SaveDataError::NotInitialized` - If `initialize` has not been called
    /// * `SaveDataError::TornDown` - If the manager has been torn down
    /// * `SaveDataError::DuplicateFeature` - If the name is already registered
    pub fn register(&mut self, registration: Registration) -> Result<()> {
        let Registration {
            name,
            state,
            activity,
            mut saved,
            rewind_persistent,
            ignore_rewind,
        } = registration;

        if self.torn_down {
            return Err(SaveDataError::TornDown(name));
        }
        if !self.already_initialized {
            return Err(SaveDataError::NotInitialized);
        }
        if self.features.contains_key(&name) {
            return Err(SaveDataError::DuplicateFeature(name));
        }

        let defaults = {
            let data = state
                .try_borrow()
                .map_err(|_| SaveDataError::validation(format!("Save data for feature \"{name}\" is mutably borrowed")))?;

            // Room state is rebuilt on every area start, so there is nothing to persist.
            if data.is_room_only() {
                saved = false;
            }

            let none = self.copier(CopyMode::None);
            let mut defaults = BTreeMap::new();
            for (scope, table) in data.scopes() {
                defaults.insert(scope, none.copy_root(table, &scope_path(&name, scope))?);
            }

            if saved {
                let serialize = self.copier(CopyMode::Serialize);
                for (scope, table) in data.scopes().filter(|(scope, _)| scope.is_durable()) {
                    serialize.copy_root(table, &scope_path(&name, scope))?;
                }
            }
            defaults
        };

        let feature = Feature {
            state,
            defaults,
            activity,
            saved,
            rewind_persistent,
            ignore_rewind,
        };

        if feature.saved {
            let stored = self.read_slot();
            let staged = self.stage_feature(&name, &feature, &stored)?;
            apply_staged(&name, &feature, staged)?;
        }

        debug!(feature = %name, saved = feature.saved, scopes = feature.defaults.len(), "Registered feature");
        self.features.insert(name, feature);
        Ok(())
    }

    /// Stop managing a feature. Its live state is left as it is.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        if self.features.remove(name).is_none() {
            return Err(SaveDataError::UnknownFeature(name.to_string()));
        }
        self.rewind_backups.remove(name);
        debug!(feature = %name, "Removed feature");
        Ok(())
    }

    /// Restore one scope of one feature to its registered default, regardless
    /// of the feature's activity.
    pub fn reset(&self, name: &str, scope: Scope) -> Result<()> {
        let feature = self
            .features
            .get(name)
            .ok_or_else(|| SaveDataError::UnknownFeature(name.to_string()))?;
        let copier = self.copier(CopyMode::None);
        let mut state = feature.state_mut(name)?;
        restore_default(&copier, name, feature, &mut state, scope)
    }

    /// Drive the lifecycle.
    pub fn on_transition(&mut self, transition: Transition) -> Result<()> {
        debug!(?transition, "Lifecycle transition");
        match transition {
            Transition::ProcessStart => self.on_load(),
            Transition::SessionStart => {
                self.in_session = true;
                self.rewind_pending = false;
                self.restore_defaults(transition.cleared_scopes())
            }
            Transition::SessionContinue => {
                if self.in_session {
                    return Ok(());
                }
                self.in_session = true;
                self.rewind_pending = false;
                self.on_load()
            }
            Transition::SessionEnd => {
                self.on_save()?;
                self.in_session = false;
                self.restore_defaults(transition.cleared_scopes())
            }
            Transition::SubSessionStart => {
                self.restore_defaults(transition.cleared_scopes())?;
                if self.config.autosave_on_sub_session {
                    self.on_save()?;
                }
                Ok(())
            }
            Transition::AreaStart => {
                if self.config.area_clear == AreaClearTiming::Immediate {
                    self.restore_defaults(transition.cleared_scopes())?;
                }
                if self.rewind_pending {
                    self.rewind_pending = false;
                    self.restore_rewind_backup()
                } else {
                    self.make_rewind_backup()
                }
            }
            Transition::AreaStartDeferred => {
                if self.config.area_clear == AreaClearTiming::Deferred {
                    self.restore_defaults(transition.cleared_scopes())?;
                }
                Ok(())
            }
        }
    }

    fn restore_defaults(&self, scopes: &[Scope]) -> Result<()> {
        let copier = self.copier(CopyMode::None);
        for (name, feature) in &self.features {
            if !feature.activity.is_active() {
                debug!(feature = %name, "Skipping inactive feature");
                continue;
            }
            let mut state = feature.state_mut(name)?;
            for &scope in scopes {
                restore_default(&copier, name, feature, &mut state, scope)?;
            }
        }
        Ok(())
    }

    /// Roll session and sub-session state back to the backup taken at the
    /// previous area start. Takes effect on the next [`Transition::AreaStart`].
    pub fn request_rewind(&mut self) {
        debug!("Rewind requested for next area start");
        self.rewind_pending = true;
    }

    fn make_rewind_backup(&mut self) -> Result<()> {
        let copier = Copier::new(CopyMode::Serialize, &self.codecs).with_tracing(self.config.trace_traversal);
        for (name, feature) in &self.features {
            if feature.ignore_rewind || !feature.is_persisted() {
                continue;
            }
            let state = feature.state(name)?;
            let mut backup = BTreeMap::new();
            for &scope in feature.rewind_scopes() {
                if let Some(table) = state.scope(scope) {
                    backup.insert(scope, copier.copy_root(table, &scope_path(name, scope))?);
                }
            }
            self.rewind_backups.insert(name.clone(), backup);
        }
        Ok(())
    }

    fn restore_rewind_backup(&self) -> Result<()> {
        let copier = self.copier(CopyMode::Deserialize);
        for (name, feature) in &self.features {
            if feature.ignore_rewind || !feature.is_persisted() {
                continue;
            }
            let Some(backup) = self.rewind_backups.get(name) else {
                continue;
            };
            let mut state = feature.state_mut(name)?;
            for (scope, table) in backup {
                if let Some(live) = state.scope_mut(*scope) {
                    merge_into(live, copier.copy_root(table, &scope_path(name, *scope))?);
                }
            }
            debug!(feature = %name, "Restored rewind backup");
        }
        Ok(())
    }

    /// The combined serialized table a save would write, keyed by feature name.
    pub fn snapshot(&self) -> Result<Table> {
        let copier = self.copier(CopyMode::Serialize);
        let mut combined = Table::new();
        for (name, feature) in &self.features {
            if !feature.is_persisted() {
                continue;
            }
            let state = feature.state(name)?;
            let mut slice = Table::new();
            for (scope, table) in state.scopes().filter(|(scope, _)| scope.is_durable()) {
                slice.insert(scope.name(), copier.copy_root(table, &scope_path(name, scope))?);
            }
            if !slice.is_empty() {
                combined.insert(name.as_str(), slice);
            }
        }
        Ok(combined)
    }

    /// Save event from the host.
    pub fn on_save(&self) -> Result<()> {
        self.save_to_slot()
    }

    /// Save outside the host's save event, e.g. from a menu callback.
    pub fn force_save(&self) -> Result<()> {
        info!("Forced save");
        self.save_to_slot()
    }

    fn save_to_slot(&self) -> Result<()> {
        #[cfg(feature = "metrics")]
        let timer = SaveTimer::start();

        let result = self.snapshot().and_then(|combined| {
            let text = self.codec.encode(&combined)?;
            self.slot.write(&text)?;
            Ok((combined.len(), text.len()))
        });

        match result {
            Ok((features, bytes)) => {
                #[cfg(feature = "metrics")]
                timer.finish(bytes);
                info!(features, bytes, slot = %self.slot.describe(), "Saved data");
                Ok(())
            }
            Err(err) => {
                #[cfg(feature = "metrics")]
                timer.finish_with_error();
                Err(err)
            }
        }
    }

    /// Load event from the host.
    pub fn on_load(&self) -> Result<()> {
        self.load_from_slot()
    }

    /// Reload from the slot, overwriting live fields with stored ones.
    pub fn force_load(&self) -> Result<()> {
        info!("Forced load");
        self.load_from_slot()
    }

    /// Every stored slice is deserialized before any live state is touched, so
    /// a bad slice leaves all features as they were.
    fn load_from_slot(&self) -> Result<()> {
        let stored = self.read_slot();
        let mut staged = Vec::new();
        for (name, feature) in self.features.iter().filter(|(_, feature)| feature.saved) {
            staged.push((name.as_str(), feature, self.stage_feature(name, feature, &stored)?));
        }

        let mut targets = Vec::with_capacity(staged.len());
        for (name, feature, scopes) in staged {
            if !scopes.is_empty() {
                targets.push((feature.state_mut(name)?, scopes));
            }
        }
        for (mut state, scopes) in targets {
            merge_scopes(&mut state, scopes);
        }
        crate::observability::record_load();
        info!(features = stored.len(), slot = %self.slot.describe(), "Loaded data");
        Ok(())
    }

    /// Missing, unreadable or corrupt slot contents all read as an empty table.
    fn read_slot(&self) -> Table {
        let text = match self.slot.read() {
            Ok(Some(text)) => text,
            Ok(None) => return Table::new(),
            Err(err) => {
                warn!(error = %err, slot = %self.slot.describe(), "Failed to read save slot; using empty data");
                return Table::new();
            }
        };
        if text.trim().is_empty() {
            return Table::new();
        }
        self.codec.decode(&text)
    }

    /// Deserializes a feature's stored durable scopes without touching its state.
    fn stage_feature(&self, name: &str, feature: &Feature, stored: &Table) -> Result<Vec<(Scope, Table)>> {
        let Some(slice) = stored.get(name) else {
            return Ok(Vec::new());
        };
        let Some(slice) = slice.as_table() else {
            warn!(feature = %name, found = slice.type_name(), "Ignoring stored feature data that is not a table");
            return Ok(Vec::new());
        };

        let copier = self.copier(CopyMode::Deserialize);
        let mut staged = Vec::new();
        for (key, value) in slice {
            let Some(scope) = key.as_str().and_then(Scope::from_name).filter(|scope| scope.is_durable()) else {
                debug!(feature = %name, key = %key, "Ignoring unknown stored scope");
                continue;
            };
            let Some(table) = value.as_table() else {
                warn!(feature = %name, %scope, found = value.type_name(), "Ignoring stored scope that is not a table");
                continue;
            };
            if !feature.defaults.contains_key(&scope) {
                continue;
            }
            staged.push((scope, copier.copy_root(table, &scope_path(name, scope))?));
        }
        Ok(staged)
    }

    /// Drop every registration. Later registrations fail with `TornDown`.
    pub fn teardown(&mut self) {
        self.features.clear();
        self.rewind_backups.clear();
        self.rewind_pending = false;
        self.torn_down = true;
        debug!("Save data manager torn down");
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    /// Registered feature names in sorted order.
    pub fn feature_names(&self) -> Vec<&str> {
        self.features.keys().map(String::as_str).collect()
    }

    pub fn log_subscribers(&self) {
        info!(count = self.features.len(), "Save data manager subscribers:");
        for name in self.features.keys() {
            info!("- {name}");
        }
    }

    /// True between a session start (or continue) and the session end.
    pub fn in_session(&self) -> bool {
        self.in_session
    }

    pub fn in_menu(&self) -> bool {
        !self.in_session
    }
}

impl<S, C> fmt::Debug for SaveDataManager<S, C>
where
    S: SaveSlot,
    C: TextCodec,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveDataManager")
            .field("slot", &self.slot.describe())
            .field("codec", &self.codec.name())
            .field("features", &self.feature_names())
            .field("already_initialized", &self.already_initialized)
            .field("torn_down", &self.torn_down)
            .field("in_session", &self.in_session)
            .finish()
    }
}

fn apply_staged(name: &str, feature: &Feature, staged: Vec<(Scope, Table)>) -> Result<()> {
    if staged.is_empty() {
        return Ok(());
    }
    let mut state = feature.state_mut(name)?;
    merge_scopes(&mut state, staged);
    Ok(())
}

fn merge_scopes(state: &mut SaveData, staged: Vec<(Scope, Table)>) {
    for (scope, loaded) in staged {
        if let Some(live) = state.scope_mut(scope) {
            merge_into(live, loaded);
        }
    }
}

fn restore_default(copier: &Copier<'_>, name: &str, feature: &Feature, state: &mut SaveData, scope: Scope) -> Result<()> {
    let (Some(live), Some(default)) = (state.scope_mut(scope), feature.defaults.get(&scope)) else {
        return Ok(());
    };
    *live = copier.copy_root(default, &scope_path(name, scope))?;
    Ok(())
}

/// Create a manager whose slot and codec come from configuration
///
/// # Example
/// ```rust
/// use savedata_core::{create_manager_from_config, ManagerConfig};
///
/// let config = ManagerConfig::from_json(r#"{"slot": {"backend": "memory"}, "pretty_json": true}"#)?;
/// let manager = create_manager_from_config(config)?;
/// assert!(!manager.is_initialized());
/// # Ok::<(), savedata_core::SaveDataError>(())
/// ```
pub fn create_manager_from_config(config: ManagerConfig) -> Result<SaveDataManager<Box<dyn SaveSlot>>> {
    config.validate()?;
    let slot = config.slot.build()?;
    let codec = if config.pretty_json {
        JsonCodec::pretty()
    } else {
        JsonCodec::new()
    };
    Ok(SaveDataManager::with_config(slot, codec, config))
}

/// Create an initialized manager over a fresh in-memory slot
pub fn create_memory_manager() -> SaveDataManager<MemorySlot> {
    let mut manager = SaveDataManager::new(MemorySlot::new());
    manager.initialize();
    manager
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Rng;
    use crate::slot::MockSaveSlot;
    use crate::table;
    use crate::value::{Brand, DefaultMap, Factory, Value};
    use std::cell::Cell;
    use std::rc::Rc;

    fn persistent_int(state: &SharedSaveData, scope: Scope, key: &str) -> Option<i64> {
        state.borrow().scope(scope).and_then(|table| table.get(key)).and_then(Value::as_int)
    }

    fn set_int(state: &SharedSaveData, scope: Scope, key: &str, value: i64) {
        state.borrow_mut().scope_mut(scope).unwrap().insert(key, value);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut manager = SaveDataManager::new(MemorySlot::new());
        assert!(manager.initialize());
        assert!(!manager.initialize());
        assert!(manager.is_initialized());
    }

    #[test]
    fn test_register_requires_initialize() {
        let mut manager = SaveDataManager::new(MemorySlot::new());
        let state = SaveData::new().with_scope(Scope::Run, Table::new()).shared();
        let result = manager.register(Registration::new("a", state));
        assert!(matches!(result, Err(SaveDataError::NotInitialized)));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut manager = create_memory_manager();
        let state = SaveData::new().with_scope(Scope::Run, Table::new()).shared();
        manager.register(Registration::new("a", state.clone())).unwrap();

        let err = manager.register(Registration::new("a", state)).unwrap_err();
        assert!(matches!(err, SaveDataError::DuplicateFeature(ref name) if name == "a"));
    }

    #[test]
    fn test_register_after_teardown_fails() {
        let mut manager = create_memory_manager();
        manager.teardown();
        let state = SaveData::new().with_scope(Scope::Run, Table::new()).shared();
        let err = manager.register(Registration::new("late", state)).unwrap_err();
        assert!(matches!(err, SaveDataError::TornDown(ref name) if name == "late"));
    }

    #[test]
    fn test_persistent_value_survives_restart() {
        let slot = MemorySlot::new();
        let mut first = SaveDataManager::new(slot.clone());
        first.initialize();
        let state = SaveData::new().with_scope(Scope::Persistent, table! { "max" => 3 }).shared();
        first.register(Registration::new("hp", state.clone())).unwrap();
        set_int(&state, Scope::Persistent, "max", 5);
        first.on_save().unwrap();

        let mut second = SaveDataManager::new(slot);
        second.initialize();
        let fresh = SaveData::new().with_scope(Scope::Persistent, table! { "max" => 3 }).shared();
        second.register(Registration::new("hp", fresh.clone())).unwrap();
        second.on_load().unwrap();

        assert_eq!(persistent_int(&fresh, Scope::Persistent, "max"), Some(5));
    }

    #[test]
    fn test_area_start_clears_room_and_skips_inactive() {
        let mut manager = create_memory_manager();
        let x = SaveData::new().with_scope(Scope::Room, table! { "n" => 0 }).shared();
        let y = SaveData::new().with_scope(Scope::Room, table! { "n" => 0 }).shared();
        let z = SaveData::new()
            .with_scope(Scope::Room, table! { "n" => 0 })
            .with_scope(Scope::Persistent, table! { "n" => 0 })
            .shared();
        manager.register(Registration::new("x", x.clone())).unwrap();
        manager.register(Registration::new("y", y.clone())).unwrap();
        manager.register(Registration::new("z", z.clone()).active_when(|| false)).unwrap();

        for state in [&x, &y, &z] {
            set_int(state, Scope::Room, "n", 9);
        }
        set_int(&z, Scope::Persistent, "n", 9);

        manager.on_transition(Transition::AreaStart).unwrap();
        assert_eq!(persistent_int(&x, Scope::Room, "n"), Some(0));
        assert_eq!(persistent_int(&y, Scope::Room, "n"), Some(0));
        assert_eq!(persistent_int(&z, Scope::Room, "n"), Some(9));

        manager.on_save().unwrap();
        assert!(manager.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_clearing_keeps_the_shared_handle() {
        let mut manager = create_memory_manager();
        let state = SaveData::new().with_scope(Scope::Level, table! { "seen" => table! { "a" => true } }).shared();
        let feature_view = Rc::clone(&state);
        manager.register(Registration::new("map", state)).unwrap();

        feature_view
            .borrow_mut()
            .scope_mut(Scope::Level)
            .unwrap()
            .get_mut("seen")
            .unwrap()
            .as_table_mut()
            .unwrap()
            .insert("b", true);
        manager.on_transition(Transition::SubSessionStart).unwrap();

        let data = feature_view.borrow();
        let seen = data.scope(Scope::Level).unwrap().get("seen").unwrap().as_table().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen.contains_key("b"));
    }

    #[test]
    fn test_deferred_area_clear_waits_for_deferred_event() {
        let config = ManagerConfig {
            area_clear: AreaClearTiming::Deferred,
            ..ManagerConfig::default()
        };
        let mut manager = SaveDataManager::with_config(MemorySlot::new(), JsonCodec::new(), config);
        manager.initialize();
        let state = SaveData::new().with_scope(Scope::Room, table! { "n" => 0 }).shared();
        manager.register(Registration::new("r", state.clone())).unwrap();

        set_int(&state, Scope::Room, "n", 4);
        manager.on_transition(Transition::AreaStart).unwrap();
        assert_eq!(persistent_int(&state, Scope::Room, "n"), Some(4));

        manager.on_transition(Transition::AreaStartDeferred).unwrap();
        assert_eq!(persistent_int(&state, Scope::Room, "n"), Some(0));
    }

    #[test]
    fn test_session_end_saves_then_clears() {
        let mut manager = create_memory_manager();
        let state = SaveData::new()
            .with_scope(Scope::Persistent, table! { "wins" => 0 })
            .with_scope(Scope::Run, table! { "floor" => 1 })
            .shared();
        manager.register(Registration::new("stats", state.clone())).unwrap();
        manager.on_transition(Transition::SessionStart).unwrap();
        assert!(manager.in_session());

        set_int(&state, Scope::Persistent, "wins", 1);
        set_int(&state, Scope::Run, "floor", 6);
        manager.on_transition(Transition::SessionEnd).unwrap();

        assert!(manager.in_menu());
        assert_eq!(persistent_int(&state, Scope::Run, "floor"), Some(1));
        assert_eq!(persistent_int(&state, Scope::Persistent, "wins"), Some(1));

        let stored = manager.codec.decode(&manager.slot().read().unwrap().unwrap());
        let stats = stored.get("stats").unwrap().as_table().unwrap();
        let run = stats.get("run").unwrap().as_table().unwrap();
        assert_eq!(run.get("floor"), Some(&Value::Int(6)));
    }

    #[test]
    fn test_session_continue_restores_run_state_once() {
        let slot = MemorySlot::new();
        let mut first = SaveDataManager::new(slot.clone());
        first.initialize();
        let state = SaveData::new().with_scope(Scope::Run, table! { "floor" => 1 }).shared();
        first.register(Registration::new("run", state.clone())).unwrap();
        set_int(&state, Scope::Run, "floor", 4);
        first.on_save().unwrap();

        let mut second = SaveDataManager::new(slot);
        second.initialize();
        let resumed = SaveData::new().with_scope(Scope::Run, table! { "floor" => 1 }).shared();
        second.register(Registration::new("run", resumed.clone())).unwrap();
        set_int(&resumed, Scope::Run, "floor", 1);

        second.on_transition(Transition::SessionContinue).unwrap();
        assert_eq!(persistent_int(&resumed, Scope::Run, "floor"), Some(4));

        set_int(&resumed, Scope::Run, "floor", 5);
        second.on_transition(Transition::SessionContinue).unwrap();
        assert_eq!(persistent_int(&resumed, Scope::Run, "floor"), Some(5));
    }

    #[test]
    fn test_sub_session_autosave() {
        let config = ManagerConfig {
            autosave_on_sub_session: true,
            ..ManagerConfig::default()
        };
        let mut manager = SaveDataManager::with_config(MemorySlot::new(), JsonCodec::new(), config);
        manager.initialize();
        let state = SaveData::new().with_scope(Scope::Persistent, table! { "n" => 0 }).shared();
        manager.register(Registration::new("f", state)).unwrap();

        assert!(!manager.slot().exists());
        manager.on_transition(Transition::SubSessionStart).unwrap();
        assert!(manager.slot().exists());
    }

    #[test]
    fn test_rewind_restores_previous_area_backup() {
        let mut manager = create_memory_manager();
        let state = SaveData::new()
            .with_scope(Scope::Persistent, table! { "coins" => 0 })
            .with_scope(Scope::Run, table! { "coins" => 0 })
            .shared();
        manager.register(Registration::new("wallet", state.clone())).unwrap();

        set_int(&state, Scope::Run, "coins", 10);
        manager.on_transition(Transition::AreaStart).unwrap();

        set_int(&state, Scope::Run, "coins", 25);
        set_int(&state, Scope::Persistent, "coins", 3);
        manager.request_rewind();
        manager.on_transition(Transition::AreaStart).unwrap();

        assert_eq!(persistent_int(&state, Scope::Run, "coins"), Some(10));
        assert_eq!(persistent_int(&state, Scope::Persistent, "coins"), Some(3));
    }

    #[test]
    fn test_rewind_respects_feature_options() {
        let mut manager = create_memory_manager();
        let everything = SaveData::new()
            .with_scope(Scope::Persistent, table! { "n" => 0 })
            .shared();
        let ignored = SaveData::new().with_scope(Scope::Run, table! { "n" => 0 }).shared();
        manager
            .register(Registration::new("everything", everything.clone()).rewind_persistent())
            .unwrap();
        manager.register(Registration::new("ignored", ignored.clone()).ignore_rewind()).unwrap();

        manager.on_transition(Transition::AreaStart).unwrap();
        set_int(&everything, Scope::Persistent, "n", 7);
        set_int(&ignored, Scope::Run, "n", 7);
        manager.request_rewind();
        manager.on_transition(Transition::AreaStart).unwrap();

        assert_eq!(persistent_int(&everything, Scope::Persistent, "n"), Some(0));
        assert_eq!(persistent_int(&ignored, Scope::Run, "n"), Some(7));
    }

    #[test]
    fn test_activity_predicate_is_reevaluated() {
        let mut manager = create_memory_manager();
        let active = Rc::new(Cell::new(false));
        let flag = Rc::clone(&active);
        let state = SaveData::new().with_scope(Scope::Persistent, table! { "n" => 1 }).shared();
        manager
            .register(Registration::new("toggle", state).active_when(move || flag.get()))
            .unwrap();

        assert!(manager.snapshot().unwrap().is_empty());
        active.set(true);
        assert!(manager.snapshot().unwrap().contains_key("toggle"));
    }

    #[test]
    fn test_room_only_and_never_saved_features_are_not_written() {
        let mut manager = create_memory_manager();
        let room = SaveData::new().with_scope(Scope::Room, table! { "n" => 0 }).shared();
        let scratch = SaveData::new().with_scope(Scope::Run, table! { "n" => 0 }).shared();
        manager.register(Registration::new("room", room)).unwrap();
        manager.register(Registration::new("scratch", scratch.clone()).never_saved()).unwrap();

        assert!(manager.snapshot().unwrap().is_empty());

        set_int(&scratch, Scope::Run, "n", 2);
        manager.on_transition(Transition::SessionStart).unwrap();
        assert_eq!(persistent_int(&scratch, Scope::Run, "n"), Some(0));
    }

    #[test]
    fn test_unregistered_factory_fails_at_registration() {
        let mut manager = create_memory_manager();
        let counts = DefaultMap::with_factory(Factory::new("empty_list", || Value::Array(Vec::new())));
        let state = SaveData::new().with_scope(Scope::Persistent, table! { "counts" => counts }).shared();

        let err = manager.register(Registration::new("lists", state)).unwrap_err();
        assert!(matches!(err, SaveDataError::UnknownFactory { ref name, .. } if name == "empty_list"));
        assert!(!manager.is_registered("lists"));
    }

    #[test]
    fn test_registered_factory_round_trips() {
        let slot = MemorySlot::new();
        let factory = Factory::new("zero", || Value::Int(0));

        let mut first = SaveDataManager::new(slot.clone());
        first.initialize();
        first.codecs_mut().register_factory(factory.clone());
        let state = SaveData::new()
            .with_scope(Scope::Persistent, table! { "counts" => DefaultMap::with_factory(factory.clone()) })
            .shared();
        first.register(Registration::new("counter", state.clone())).unwrap();
        {
            let mut data = state.borrow_mut();
            let counts = data
                .scope_mut(Scope::Persistent)
                .unwrap()
                .get_mut("counts")
                .unwrap()
                .as_default_map_mut()
                .unwrap();
            *counts.get_or_insert_default("a") = Value::Int(2);
        }
        first.on_save().unwrap();

        let mut second = SaveDataManager::new(slot);
        second.initialize();
        second.codecs_mut().register_factory(factory.clone());
        let resumed = SaveData::new()
            .with_scope(Scope::Persistent, table! { "counts" => DefaultMap::with_factory(factory) })
            .shared();
        second.register(Registration::new("counter", resumed.clone())).unwrap();

        let mut data = resumed.borrow_mut();
        let counts = data
            .scope_mut(Scope::Persistent)
            .unwrap()
            .get_mut("counts")
            .unwrap()
            .as_default_map_mut()
            .unwrap();
        assert_eq!(counts.get("a"), Some(&Value::Int(2)));
        assert_eq!(counts.get_or_insert_default("b"), &Value::Int(0));
    }

    #[test]
    fn test_reset_and_remove() {
        let mut manager = create_memory_manager();
        let state = SaveData::new().with_scope(Scope::Room, table! { "n" => 0 }).shared();
        manager.register(Registration::new("f", state.clone())).unwrap();

        set_int(&state, Scope::Room, "n", 3);
        manager.reset("f", Scope::Room).unwrap();
        assert_eq!(persistent_int(&state, Scope::Room, "n"), Some(0));

        assert!(matches!(manager.reset("g", Scope::Room), Err(SaveDataError::UnknownFeature(_))));

        manager.remove("f").unwrap();
        assert!(!manager.is_registered("f"));
        assert!(matches!(manager.remove("f"), Err(SaveDataError::UnknownFeature(_))));
    }

    #[test]
    fn test_save_propagates_slot_failure() {
        let mut slot = MockSaveSlot::new();
        slot.expect_read().returning(|| Ok(None));
        slot.expect_write()
            .returning(|_| Err(SaveDataError::slot("disk full")));
        slot.expect_describe().returning(|| "mock".to_string());

        let mut manager = SaveDataManager::new(slot);
        manager.initialize();
        let state = SaveData::new().with_scope(Scope::Persistent, table! { "n" => 1 }).shared();
        manager.register(Registration::new("f", state)).unwrap();

        let err = manager.on_save().unwrap_err();
        assert_eq!(err.to_string(), "Save slot error: disk full");
    }

    #[test]
    fn test_load_downgrades_read_failure() {
        let mut slot = MockSaveSlot::new();
        slot.expect_read()
            .returning(|| Err(SaveDataError::slot("permission denied")));
        slot.expect_describe().returning(|| "mock".to_string());

        let mut manager = SaveDataManager::new(slot);
        manager.initialize();
        let state = SaveData::new().with_scope(Scope::Persistent, table! { "n" => 1 }).shared();
        manager.register(Registration::new("f", state.clone())).unwrap();

        manager.on_load().unwrap();
        assert_eq!(persistent_int(&state, Scope::Persistent, "n"), Some(1));
    }

    #[test]
    fn test_load_ignores_corrupt_and_foreign_data() {
        let slot = MemorySlot::with_contents(r#"{"f": {"persistent": 4, "room": {"n": 2}}, "other": {}}"#);
        let mut manager = SaveDataManager::new(slot);
        manager.initialize();
        let state = SaveData::new()
            .with_scope(Scope::Persistent, table! { "n" => 1 })
            .with_scope(Scope::Room, table! { "n" => 1 })
            .shared();
        manager.register(Registration::new("f", state.clone())).unwrap();

        assert_eq!(persistent_int(&state, Scope::Persistent, "n"), Some(1));
        assert_eq!(persistent_int(&state, Scope::Room, "n"), Some(1));

        let corrupt = SaveDataManager::new(MemorySlot::with_contents("{not json"));
        assert!(corrupt.on_load().is_ok());
    }

    #[test]
    fn test_bad_slice_leaves_every_feature_untouched() {
        let slot = MemorySlot::new();
        let mut manager = SaveDataManager::new(slot.clone());
        manager.initialize();
        let states: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let state = SaveData::new().with_scope(Scope::Persistent, table! { "n" => 0 }).shared();
                manager.register(Registration::new(name, state.clone())).unwrap();
                state
            })
            .collect();

        slot.write(
            r#"{"a": {"persistent": {"n": 1}},
                "b": {"persistent": {"n": {"@rng": ""}}},
                "c": {"persistent": {"n": 2}}}"#,
        )
        .unwrap();

        let err = manager.on_load().unwrap_err();
        match err {
            SaveDataError::MissingBrandField { brand, field, path } => {
                assert_eq!(brand, Brand::Rng);
                assert_eq!(field, "seed");
                assert_eq!(path, "b > persistent > n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        for state in &states {
            assert_eq!(persistent_int(state, Scope::Persistent, "n"), Some(0));
        }
    }

    #[test]
    fn test_failed_registration_leaves_state_untouched() {
        let slot = MemorySlot::with_contents(
            r#"{"d": {"persistent": {"n": 7}, "run": {"rng": {"@rng": ""}}}}"#,
        );
        let mut manager = SaveDataManager::new(slot);
        manager.initialize();
        let state = SaveData::new()
            .with_scope(Scope::Persistent, table! { "n" => 0 })
            .with_scope(Scope::Run, table! { "rng" => Rng::new(1) })
            .shared();

        let err = manager.register(Registration::new("d", state.clone())).unwrap_err();
        assert!(matches!(err, SaveDataError::MissingBrandField { .. }));
        assert!(!manager.is_registered("d"));
        assert_eq!(persistent_int(&state, Scope::Persistent, "n"), Some(0));
    }

    #[test]
    fn test_create_manager_from_config() {
        let config = ManagerConfig {
            pretty_json: true,
            ..ManagerConfig::default()
        };
        let mut manager = create_manager_from_config(config).unwrap();
        manager.initialize();
        assert_eq!(manager.slot().describe(), "memory");

        let state = SaveData::new().with_scope(Scope::Persistent, table! { "n" => 1 }).shared();
        manager.register(Registration::new("f", state)).unwrap();
        manager.force_save().unwrap();
        assert!(manager.slot().read().unwrap().unwrap().contains('\n'));
    }

    #[test]
    fn test_feature_names_are_sorted() {
        let mut manager = create_memory_manager();
        for name in ["b", "a", "c"] {
            let state = SaveData::new().with_scope(Scope::Run, Table::new()).shared();
            manager.register(Registration::new(name, state)).unwrap();
        }
        assert_eq!(manager.feature_names(), vec!["a", "b", "c"]);
        manager.log_subscribers();
    }
}
