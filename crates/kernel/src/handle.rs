//! Identifier-keyed object registry and the weak handles that resolve through it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use drydock_common::EntityId;
use parking_lot::RwLock;

use crate::entity::Entity;
use crate::error::KernelError;

type Slots = RwLock<BTreeMap<EntityId, Arc<Entity>>>;

/// Live objects keyed by id.
///
/// Uses BTreeMap for deterministic iteration order. Removing an object from
/// the registry expires every [`WeakRef`] to it; strong `Arc<Entity>` handles
/// already handed out stay usable until dropped.
#[derive(Default)]
pub struct Registry {
    slots: Arc<Slots>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: Arc<Entity>) {
        self.slots.write().insert(entity.id(), entity);
    }

    pub fn remove(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.slots.write().remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.slots.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Ids of all live objects, in canonical order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.slots.read().keys().copied().collect()
    }

    /// Non-owning handle to `id`. The id does not need to be live yet.
    pub fn weak(&self, id: EntityId) -> WeakRef {
        WeakRef {
            id,
            slots: Arc::downgrade(&self.slots),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

/// A non-owning reference: an id plus the registry it resolves against.
#[derive(Clone)]
pub struct WeakRef {
    id: EntityId,
    slots: Weak<Slots>,
}

impl WeakRef {
    /// A handle that never resolves.
    pub fn dangling(id: EntityId) -> Self {
        Self {
            id,
            slots: Weak::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The live object, or `None` if it was destroyed or its registry is gone.
    pub fn resolve(&self) -> Option<Arc<Entity>> {
        let slots = self.slots.upgrade()?;
        let entity = slots.read().get(&self.id).cloned();
        entity
    }

    pub fn try_resolve(&self) -> Result<Arc<Entity>, KernelError> {
        self.resolve().ok_or(KernelError::HandleExpired(self.id))
    }

    pub fn is_live(&self) -> bool {
        self.resolve().is_some()
    }
}

impl fmt::Debug for WeakRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakRef({})", self.id)
    }
}

impl PartialEq for WeakRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.slots.ptr_eq(&other.slots)
    }
}
