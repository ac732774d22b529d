//! Zone-server kernel: the live objects a task can observe and mutate.
//!
//! # Invariants
//! - Objects are reached through the [`Registry`]; a [`WeakRef`] never keeps
//!   an object alive and resolves to `None` once it is destroyed.
//! - Object state is only mutated through an [`EntityGuard`]. Guards are
//!   acquired outer-before-inner (see [`lock`]).
//! - Every world-level mutation is recorded as a [`WorldEvent`].

pub mod entity;
pub mod error;
pub mod handle;
pub mod lock;
pub mod message;
pub mod world;
pub mod zone;

pub use entity::{
    ComponentSlot, ContainmentType, Entity, EntityKind, EntitySpec, EntityState, OptionBits,
    COMPONENT_ACTIVE,
};
pub use error::KernelError;
pub use handle::{Registry, WeakRef};
pub use lock::{EntityGuard, LockRole};
pub use message::{Broadcast, ShipMessage};
pub use world::{World, WorldEvent, ZoneSwitch};
pub use zone::{Station, StationIndex, StationLookup, Zone};
