use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use drydock_common::{EntityId, Transform};
use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::entity::{ContainmentType, Entity, EntityKind, EntitySpec, EntityState, OptionBits};
use crate::error::KernelError;
use crate::handle::{Registry, WeakRef};
use crate::lock::{self, EntityGuard};
use crate::message::{Broadcast, ShipMessage};
use crate::zone::Zone;

/// An event record produced by every world-level mutation.
///
/// The log lets tests and tools observe what a sequence of tasks actually did
/// without holding any entity lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    Spawned {
        id: EntityId,
        kind: EntityKind,
        zone: Option<String>,
        transform: Transform,
    },
    /// Removed from the live world. Weak handles to it stop resolving.
    DestroyedFromWorld { id: EntityId },
    /// Removed from durable storage.
    DestroyedFromStorage { id: EntityId },
    DespawnNotified { id: EntityId, zone: String },
    Moved {
        id: EntityId,
        old: Transform,
        new: Transform,
    },
    ZoneSwitched {
        id: EntityId,
        from: Option<String>,
        to: String,
        position: Vec3,
        parent_id: Option<EntityId>,
        force_reconnect: bool,
    },
    /// A ship was packed back into its owner's control device.
    Stored {
        ship: EntityId,
        device: EntityId,
        owner: EntityId,
        zone: String,
        position: Vec3,
    },
}

/// Parameters of a zone switch for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSwitch {
    pub zone_name: String,
    /// Local position inside `parent_id`, or world position with no parent.
    pub position: Vec3,
    pub parent_id: Option<EntityId>,
    pub force_reconnect: bool,
    pub containment: ContainmentType,
}

/// The zone server: authoritative set of live objects, zones and storage.
///
/// Shared as `Arc<World>`; every entity keeps a weak back-reference to it.
/// All mutations go through explicit operations and are logged.
pub struct World {
    this: Weak<World>,
    registry: Registry,
    zones: RwLock<BTreeMap<String, Arc<Zone>>>,
    /// Ids of objects with a durable record.
    storage: Mutex<BTreeSet<EntityId>>,
    outbox: Mutex<Vec<Broadcast>>,
    event_log: Mutex<Vec<WorldEvent>>,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            registry: Registry::new(),
            zones: RwLock::new(BTreeMap::new()),
            storage: Mutex::new(BTreeSet::new()),
            outbox: Mutex::new(Vec::new()),
            event_log: Mutex::new(Vec::new()),
        })
    }

    pub fn add_zone(&self, zone: Zone) -> Arc<Zone> {
        let zone = Arc::new(zone);
        self.zones
            .write()
            .insert(zone.name().to_string(), Arc::clone(&zone));
        zone
    }

    pub fn zone(&self, name: &str) -> Option<Arc<Zone>> {
        self.zones.read().get(name).cloned()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn entity_count(&self) -> usize {
        self.registry.len()
    }

    /// Look up a live object by id.
    pub fn get_object(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.registry.get(id)
    }

    pub fn weak(&self, id: EntityId) -> WeakRef {
        self.registry.weak(id)
    }

    /// Create and register an object. Durable objects (persistence > 0) also
    /// get a storage record.
    pub fn spawn(&self, spec: EntitySpec) -> Result<Arc<Entity>, KernelError> {
        let zone = match &spec.zone {
            Some(name) => Some(
                self.zone(name)
                    .ok_or_else(|| KernelError::UnknownZone(name.clone()))?,
            ),
            None => None,
        };
        let id = EntityId::new();
        let state = EntityState {
            transform: spec.transform,
            option_bits: OptionBits(spec.option_bits),
            components: spec.components.iter().copied().collect(),
            booster: Default::default(),
            persistence_level: spec.persistence_level,
            occupants: Vec::new(),
            parent_id: spec.parent_id,
            containment: spec.containment,
            control_device: spec.control_device,
            stored_zone: spec.stored_zone.clone(),
            stored_position: spec.stored_position,
            stored_ship: None,
        };
        let owner = spec.owner.map(|owner| self.registry.weak(owner));
        let entity = Arc::new(Entity::new(
            id,
            spec.kind,
            self.this.clone(),
            owner,
            zone,
            state,
        ));
        self.registry.insert(Arc::clone(&entity));
        if spec.persistence_level > 0 {
            self.storage.lock().insert(id);
        }
        tracing::debug!(%id, kind = ?spec.kind, "spawned");
        self.record(WorldEvent::Spawned {
            id,
            kind: spec.kind,
            zone: spec.zone,
            transform: spec.transform,
        });
        Ok(entity)
    }

    /// Put `occupant` aboard `ship`.
    pub fn board(&self, ship: &Arc<Entity>, occupant: &Arc<Entity>) {
        let mut ship_guard = ship.lock();
        let mut occupant_guard = occupant.lock_within(&ship_guard);
        if occupant_guard.parent_id.is_none() {
            occupant_guard.parent_id = Some(ship.id());
            occupant_guard.containment = ContainmentType::Onboard;
        }
        ship_guard.occupants.push(self.registry.weak(occupant.id()));
    }

    /// Remove a locked object from the live world. Its storage record, if any, is kept.
    pub fn destroy_from_world(&self, entity: &mut EntityGuard<'_>) {
        entity.set_zone(None);
        if self.registry.remove(entity.id()).is_some() {
            self.record(WorldEvent::DestroyedFromWorld { id: entity.id() });
        }
    }

    pub fn destroy_from_storage(&self, entity: &EntityGuard<'_>) {
        if self.storage.lock().remove(&entity.id()) {
            self.record(WorldEvent::DestroyedFromStorage { id: entity.id() });
        }
    }

    pub fn is_persisted(&self, id: EntityId) -> bool {
        self.storage.lock().contains(&id)
    }

    /// Tell `zone` that the object is gone from its observers' view.
    pub fn notify_despawn(&self, id: EntityId, zone: &Zone) {
        self.record(WorldEvent::DespawnNotified {
            id,
            zone: zone.name().to_string(),
        });
    }

    /// Move `entity` into another zone.
    ///
    /// Locks `entity` itself, so the caller must hold no entity lock.
    pub fn switch_zone(&self, entity: &Arc<Entity>, switch: ZoneSwitch) -> Result<(), KernelError> {
        lock::assert_unlocked("switch_zone");
        let zone = self
            .zone(&switch.zone_name)
            .ok_or_else(|| KernelError::UnknownZone(switch.zone_name.clone()))?;

        let mut guard = entity.lock();
        let from = guard.zone().map(|z| z.name().to_string());
        guard.set_zone(Some(zone));
        guard.transform.position = switch.position;
        guard.parent_id = switch.parent_id;
        guard.containment = switch.containment;
        drop(guard);

        tracing::debug!(
            id = %entity.id(),
            ?from,
            to = %switch.zone_name,
            "zone switched"
        );
        self.record(WorldEvent::ZoneSwitched {
            id: entity.id(),
            from,
            to: switch.zone_name,
            position: switch.position,
            parent_id: switch.parent_id,
            force_reconnect: switch.force_reconnect,
        });
        Ok(())
    }

    /// Pack a locked ship into `device`, to be re-launched from `zone_name` at `position`.
    ///
    /// The ship leaves the live world but keeps its storage record.
    pub fn store_ship(
        &self,
        owner: &Entity,
        ship: &mut EntityGuard<'_>,
        device: &Entity,
        zone_name: &str,
        position: Vec3,
    ) -> Result<(), KernelError> {
        if !device.is_ship_control_device() {
            return Err(KernelError::NotAControlDevice(device.id()));
        }
        {
            let mut device_guard = device.lock_within(ship);
            device_guard.stored_ship = Some(ship.id());
            device_guard.stored_zone = Some(zone_name.to_string());
            device_guard.stored_position = position;
        }

        ship.set_zone(None);
        ship.transform.position = position;
        self.registry.remove(ship.id());
        self.storage.lock().insert(ship.id());

        tracing::info!(ship = %ship.id(), device = %device.id(), zone = zone_name, "ship stored");
        self.record(WorldEvent::Stored {
            ship: ship.id(),
            device: device.id(),
            owner: owner.id(),
            zone: zone_name.to_string(),
            position,
        });
        Ok(())
    }

    pub fn broadcast(&self, from: EntityId, message: ShipMessage, reliable: bool) {
        tracing::trace!(%from, kind = message.kind(), reliable, "broadcast");
        self.outbox.lock().push(Broadcast {
            from,
            message,
            reliable,
        });
    }

    /// Drain and return every message broadcast so far.
    pub fn drain_broadcasts(&self) -> Vec<Broadcast> {
        std::mem::take(&mut *self.outbox.lock())
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.outbox.lock().clone()
    }

    pub(crate) fn record(&self, event: WorldEvent) {
        self.event_log.lock().push(event);
    }

    /// Drain and return the event log.
    pub fn drain_events(&self) -> Vec<WorldEvent> {
        std::mem::take(&mut *self.event_log.lock())
    }

    pub fn events(&self) -> Vec<WorldEvent> {
        self.event_log.lock().clone()
    }
}
