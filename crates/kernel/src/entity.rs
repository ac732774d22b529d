//! Live objects: ships, creatures, control devices and fixtures.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use drydock_common::{EntityId, Transform};
use glam::{Quat, Vec3};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::handle::WeakRef;
use crate::lock::EntityGuard;
use crate::message::ShipMessage;
use crate::world::{World, WorldEvent};
use crate::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Ship,
    Creature,
    ShipControlDevice,
    /// Anything an occupant can be parented to inside a ship: a seat, a turret, a cell.
    Fixture,
}

/// How an occupant sits inside its parent container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContainmentType {
    #[default]
    None,
    Slotted,
    Contained,
    Onboard,
}

/// Ship option bits, broadcast to observers when changed with notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OptionBits(pub u32);

impl OptionBits {
    pub const WINGS_OPEN: u32 = 1 << 0;
    pub const DESTROYING: u32 = 1 << 1;

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit == bit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentSlot {
    Reactor,
    Engine,
    Shield,
    Booster,
}

/// Component flag: the component is currently engaged.
pub const COMPONENT_ACTIVE: u32 = 1 << 0;

/// Booster energy and recharge state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoosterState {
    pub energy: f32,
    pub max_energy: f32,
    pub recharging: bool,
}

impl Default for BoosterState {
    fn default() -> Self {
        Self {
            energy: 100.0,
            max_energy: 100.0,
            recharging: false,
        }
    }
}

/// Mutable per-object state, reachable only through an [`EntityGuard`].
#[derive(Debug)]
pub struct EntityState {
    pub(crate) transform: Transform,
    pub(crate) option_bits: OptionBits,
    pub(crate) components: BTreeMap<ComponentSlot, u32>,
    pub(crate) booster: BoosterState,
    pub(crate) persistence_level: u8,
    pub(crate) occupants: Vec<WeakRef>,
    pub(crate) parent_id: Option<EntityId>,
    pub(crate) containment: ContainmentType,
    pub(crate) control_device: Option<EntityId>,
    pub(crate) stored_zone: Option<String>,
    pub(crate) stored_position: Vec3,
    pub(crate) stored_ship: Option<EntityId>,
}

impl EntityState {
    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn rotation(&self) -> Quat {
        self.transform.rotation
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
    }

    pub fn option_bits(&self) -> OptionBits {
        self.option_bits
    }

    pub fn has_option(&self, bit: u32) -> bool {
        self.option_bits.contains(bit)
    }

    pub fn component_flags(&self, slot: ComponentSlot) -> u32 {
        self.components.get(&slot).copied().unwrap_or(0)
    }

    pub fn is_component_active(&self, slot: ComponentSlot) -> bool {
        self.component_flags(slot) & COMPONENT_ACTIVE != 0
    }

    pub fn booster(&self) -> BoosterState {
        self.booster
    }

    /// 0 is ephemeral; anything higher must be stored rather than destroyed.
    pub fn persistence_level(&self) -> u8 {
        self.persistence_level
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }

    pub fn occupant_at(&self, index: usize) -> Option<WeakRef> {
        self.occupants.get(index).cloned()
    }

    pub fn parent_id(&self) -> Option<EntityId> {
        self.parent_id
    }

    pub fn containment(&self) -> ContainmentType {
        self.containment
    }

    pub fn control_device(&self) -> Option<EntityId> {
        self.control_device
    }

    pub fn stored_zone(&self) -> Option<&str> {
        self.stored_zone.as_deref()
    }

    pub fn stored_position(&self) -> Vec3 {
        self.stored_position
    }

    pub fn stored_ship(&self) -> Option<EntityId> {
        self.stored_ship
    }
}

/// A live object. State sits behind the entity's own lock.
///
/// The zone reference lives in its own cell so it can be checked without
/// waiting for the entity lock. That cell is a leaf: nothing is locked while
/// it is held, and it is only written through an [`EntityGuard`].
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    server: Weak<World>,
    owner: Option<WeakRef>,
    zone: RwLock<Option<Arc<Zone>>>,
    pub(crate) state: Mutex<EntityState>,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        kind: EntityKind,
        server: Weak<World>,
        owner: Option<WeakRef>,
        zone: Option<Arc<Zone>>,
        state: EntityState,
    ) -> Self {
        Self {
            id,
            kind,
            server,
            owner,
            zone: RwLock::new(zone),
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_ship_control_device(&self) -> bool {
        self.kind == EntityKind::ShipControlDevice
    }

    /// The zone server this object lives in, if it is still running.
    pub fn zone_server(&self) -> Option<Arc<World>> {
        self.server.upgrade()
    }

    /// The zone the object is in. `None` while detached or after destruction.
    pub fn zone(&self) -> Option<Arc<Zone>> {
        self.zone.read().clone()
    }

    /// Weak reference to the owning object, fixed at spawn.
    pub fn owner(&self) -> Option<WeakRef> {
        self.owner.clone()
    }

    /// Lock as the outer (owning) object. The thread must hold no other entity lock.
    pub fn lock(&self) -> EntityGuard<'_> {
        EntityGuard::acquire_outer(self)
    }

    /// Lock as a contained object. `context` must be the lock this thread acquired last.
    pub fn lock_within<'a>(&'a self, context: &EntityGuard<'_>) -> EntityGuard<'a> {
        EntityGuard::acquire_inner(self, context)
    }
}

impl EntityGuard<'_> {
    pub fn zone(&self) -> Option<Arc<Zone>> {
        self.entity().zone()
    }

    pub(crate) fn set_zone(&mut self, zone: Option<Arc<Zone>>) {
        *self.entity().zone.write() = zone;
    }

    /// Send `message` to everything observing this object.
    pub fn broadcast(&self, message: ShipMessage, reliable: bool) {
        if let Some(server) = self.entity().zone_server() {
            server.broadcast(self.id(), message, reliable);
        }
    }

    pub fn broadcast_all(&self, messages: Vec<ShipMessage>, reliable: bool) {
        for message in messages {
            self.broadcast(message, reliable);
        }
    }

    pub fn set_option_bit(&mut self, bit: u32, notify: bool) {
        let bits = self.option_bits.0 | bit;
        self.update_options(bits, notify);
    }

    pub fn clear_option_bit(&mut self, bit: u32, notify: bool) {
        let bits = self.option_bits.0 & !bit;
        self.update_options(bits, notify);
    }

    fn update_options(&mut self, bits: u32, notify: bool) {
        if self.option_bits.0 == bits {
            return;
        }
        self.option_bits = OptionBits(bits);
        if notify {
            let ship = self.id();
            self.broadcast(ShipMessage::OptionsChanged { ship, bits }, true);
        }
    }

    pub fn remove_component_flag(&mut self, slot: ComponentSlot, flag: u32, notify: bool) {
        let flags = self.component_flags(slot) & !flag;
        self.update_component(slot, flags, notify);
    }

    fn update_component(&mut self, slot: ComponentSlot, flags: u32, notify: bool) {
        if self.component_flags(slot) == flags {
            return;
        }
        self.components.insert(slot, flags);
        if notify {
            let ship = self.id();
            self.broadcast(ShipMessage::ComponentChanged { ship, slot, flags }, true);
        }
    }

    /// Drain the booster and put it into recharge. Used when a boost is cut short.
    pub fn restart_booster(&mut self, notify: bool) {
        self.booster.energy = 0.0;
        self.booster.recharging = true;
        if notify {
            let ship = self.id();
            let energy = self.booster.energy;
            self.broadcast(
                ShipMessage::BoosterChanged {
                    ship,
                    energy,
                    recharging: true,
                },
                true,
            );
        }
    }

    /// Replace the transform and record the move in the world log.
    pub fn set_transform(&mut self, new: Transform) {
        let old = self.transform;
        self.transform = new;
        if let Some(server) = self.entity().zone_server() {
            server.record(WorldEvent::Moved {
                id: self.id(),
                old,
                new,
            });
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        let mut t = self.transform;
        t.position = position;
        self.set_transform(t);
    }
}

/// Description of an object to spawn.
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub kind: EntityKind,
    pub transform: Transform,
    pub zone: Option<String>,
    pub owner: Option<EntityId>,
    pub persistence_level: u8,
    pub parent_id: Option<EntityId>,
    pub containment: ContainmentType,
    pub control_device: Option<EntityId>,
    pub option_bits: u32,
    pub components: Vec<(ComponentSlot, u32)>,
    pub stored_zone: Option<String>,
    pub stored_position: Vec3,
}

impl EntitySpec {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            transform: Transform::default(),
            zone: None,
            owner: None,
            persistence_level: 0,
            parent_id: None,
            containment: ContainmentType::None,
            control_device: None,
            option_bits: 0,
            components: Vec::new(),
            stored_zone: None,
            stored_position: Vec3::ZERO,
        }
    }

    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn owned_by(mut self, owner: EntityId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn persistence(mut self, level: u8) -> Self {
        self.persistence_level = level;
        self
    }

    pub fn parented_to(mut self, parent: EntityId, containment: ContainmentType) -> Self {
        self.parent_id = Some(parent);
        self.containment = containment;
        self
    }

    pub fn controlled_by(mut self, device: EntityId) -> Self {
        self.control_device = Some(device);
        self
    }

    pub fn with_options(mut self, bits: u32) -> Self {
        self.option_bits = bits;
        self
    }

    pub fn with_component(mut self, slot: ComponentSlot, flags: u32) -> Self {
        self.components.push((slot, flags));
        self
    }

    /// Where a control device re-launches its ship from.
    pub fn stored_at(mut self, zone: impl Into<String>, position: Vec3) -> Self {
        self.stored_zone = Some(zone.into());
        self.stored_position = position;
        self
    }
}
