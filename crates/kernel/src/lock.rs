//! Ordered entity locking.
//!
//! # Lock Order
//!
//! When two objects are mutated together, the owning object is locked first
//! and the contained object is locked *within* it:
//!
//! ```text
//! Outer (ship, container) → Inner (occupant, device)
//! ```
//!
//! An outer lock may only be taken by a thread that holds no entity lock. An
//! inner lock names an already-held guard as context and may only be taken
//! while that guard is the most recent lock held by the thread, so nested
//! locks always form a single chain rooted at one outer lock:
//!
//! ```text
//! ship → occupant → occupant's parent fixture
//! ```
//!
//! Violations are programming errors and trip a debug assertion.
//!
//! Guards release on drop, so every exit path (early return, `?`, panic)
//! unlocks. Operations that may block for an unbounded time call
//! [`assert_unlocked`] first.

use std::ops::{Deref, DerefMut};

use drydock_common::EntityId;
use parking_lot::MutexGuard;

use crate::entity::{Entity, EntityState};

/// Role an entity lock was acquired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockRole {
    Outer,
    Inner,
}

impl LockRole {
    fn label(self) -> &'static str {
        match self {
            LockRole::Outer => "outer",
            LockRole::Inner => "inner",
        }
    }
}

/// Scoped exclusive access to an entity's state.
pub struct EntityGuard<'a> {
    entity: &'a Entity,
    role: LockRole,
    state: MutexGuard<'a, EntityState>,
}

impl<'a> EntityGuard<'a> {
    pub(crate) fn acquire_outer(entity: &'a Entity) -> Self {
        ledger::before_outer(entity.id());
        let state = entity.state.lock();
        ledger::acquired(entity.id(), LockRole::Outer);
        Self {
            entity,
            role: LockRole::Outer,
            state,
        }
    }

    pub(crate) fn acquire_inner(entity: &'a Entity, context: &EntityGuard<'_>) -> Self {
        ledger::before_inner(entity.id(), context.id());
        let state = entity.state.lock();
        ledger::acquired(entity.id(), LockRole::Inner);
        Self {
            entity,
            role: LockRole::Inner,
            state,
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id()
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    pub fn role(&self) -> LockRole {
        self.role
    }
}

impl Deref for EntityGuard<'_> {
    type Target = EntityState;

    fn deref(&self) -> &EntityState {
        &self.state
    }
}

impl DerefMut for EntityGuard<'_> {
    fn deref_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        ledger::released(self.entity.id());
    }
}

/// Entity locks held by the current thread, earliest first.
pub fn held_locks() -> Vec<(EntityId, LockRole)> {
    ledger::held()
}

/// Debug-asserts that the current thread holds no entity lock.
pub fn assert_unlocked(operation: &str) {
    let held = ledger::held();
    debug_assert!(
        held.is_empty(),
        "{operation} must not run under an entity lock; holding {held:?}"
    );
}

mod ledger {
    use super::LockRole;
    use drydock_common::EntityId;
    use std::cell::RefCell;

    thread_local! {
        static HELD: RefCell<Vec<(EntityId, LockRole)>> = const { RefCell::new(Vec::new()) };
    }

    pub fn before_outer(next: EntityId) {
        HELD.with(|held| {
            let held = held.borrow();
            debug_assert!(
                held.is_empty(),
                "lock order violation: acquiring {next} as outer while holding {:?}",
                held.iter()
                    .map(|(id, role)| format!("{id}:{}", role.label()))
                    .collect::<Vec<_>>()
            );
        });
    }

    pub fn before_inner(next: EntityId, context: EntityId) {
        HELD.with(|held| {
            let held = held.borrow();
            debug_assert!(
                next != context,
                "lock order violation: {next} named itself as lock context"
            );
            debug_assert!(
                matches!(held.last(), Some(&(id, _)) if id == context),
                "lock order violation: acquiring {next} as inner within {context}, \
                 but the most recent lock held is {:?}",
                held.last()
            );
        });
    }

    pub fn acquired(id: EntityId, role: LockRole) {
        HELD.with(|held| held.borrow_mut().push((id, role)));
    }

    pub fn released(id: EntityId) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|(held_id, _)| *held_id == id) {
                held.remove(pos);
            }
        });
    }

    pub fn held() -> Vec<(EntityId, LockRole)> {
        HELD.with(|held| held.borrow().clone())
    }
}
