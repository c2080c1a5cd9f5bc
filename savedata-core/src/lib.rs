/*!
# Savedata Core Engine

Scope-aware save data management and round-trip-safe value serialization.

This crate provides the foundational functionality for keeping named chunks of
mutable state in sync with a host's lifecycle, with support for:

- A dynamically typed value model with live Map, Set and DefaultMap containers
- A deep copy engine that also serializes to, and deserializes from, plain tables
- An open codec registry for opaque host objects (RNG, Vector, user classes)
- Scope clearing on session, sub-session and area transitions
- A JSON save envelope with integrity verification

## Architecture

The core keeps the domain logic apart from infrastructure:
- The copy engine and the manager only see tables and the codec registry
- Save slots and text codecs are implemented as adapters
- New host object types plug in through `ObjectCodec` without touching the engine

## Usage

```rust
use savedata_core::{table, MemorySlot, Registration, SaveData, SaveDataManager, SaveSlot, Scope, Transition};

let slot = MemorySlot::new();
let mut manager = SaveDataManager::new(slot.clone());
manager.initialize();

let state = SaveData::new()
    .with_scope(Scope::Persistent, table! { "max" => 3 })
    .with_scope(Scope::Run, table! { "floor" => 1 })
    .shared();
manager.register(Registration::new("hp", state.clone()))?;

// Mutate through the shared handle, then let the lifecycle drive saving
state.borrow_mut().scope_mut(Scope::Persistent).unwrap().insert("max", 5);
manager.on_transition(Transition::SessionEnd)?;
assert!(slot.exists());
# Ok::<(), savedata_core::SaveDataError>(())
```
*/

pub mod codec;
pub mod config;
pub mod copy;
pub mod error;
pub mod introspect;
pub mod manager;
pub mod merge;
pub mod metadata;
pub mod observability;
pub mod scope;
pub mod slot;
pub mod text;
pub mod value;

#[cfg(test)]
mod error_tests;

pub use codec::{ClassCodec, ClassRecord, CodecRegistry, ObjectCodec, Rng, RngCodec, Vector, VectorCodec};
pub use config::{AreaClearTiming, ManagerConfig, SlotBackend, SlotConfig};
pub use copy::{deep_copy, deep_copy_table, CopyMode, TraversalPath};
pub use error::{Result, SaveDataError};
pub use manager::{create_manager_from_config, create_memory_manager, Activity, Registration, SaveDataManager};
pub use merge::merge_into;
pub use metadata::SaveMetadata;
pub use observability::{init_default_observability, init_observability};
pub use scope::{SaveData, Scope, SharedSaveData, Transition};
pub use slot::{FileSlot, MemorySlot, SaveSlot};
pub use text::{JsonCodec, TextCodec};
pub use value::{Brand, DefaultMap, DefaultSource, Factory, HostObject, Key, Map, Set, Table, Value};
