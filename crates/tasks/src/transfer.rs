//! Moves one occupant of a relocated ship into the ship's destination zone.

use std::sync::Arc;

use drydock_kernel::{Entity, WeakRef, ZoneSwitch};
use drydock_sched::Task;

use crate::error::TaskError;

pub const LABEL: &str = "DestroyShipTransfer";

/// One-shot transfer of a single occupant.
///
/// Holds the ship strongly for its short life, the occupant weakly, and the
/// destination zone name as captured when the sequence fanned out.
#[derive(Debug)]
pub struct TransferOccupantTask {
    ship: Arc<Entity>,
    occupant: WeakRef,
    zone_name: String,
}

impl TransferOccupantTask {
    pub fn new(ship: Arc<Entity>, occupant: WeakRef, zone_name: String) -> Self {
        Self {
            ship,
            occupant,
            zone_name,
        }
    }

    pub fn ship(&self) -> &Arc<Entity> {
        &self.ship
    }

    pub fn occupant(&self) -> &WeakRef {
        &self.occupant
    }

    pub fn zone_name(&self) -> &str {
        &self.zone_name
    }

    /// Run the transfer, reporting why it stopped if it did.
    pub fn transfer(&self) -> Result<(), TaskError> {
        let occupant = self
            .occupant
            .resolve()
            .ok_or(TaskError::HandleExpired(self.occupant.id()))?;
        let server = self
            .ship
            .zone_server()
            .ok_or(TaskError::MissingCapability("zone server"))?;

        let switch = {
            let ship = self.ship.lock();
            let mut member = occupant.lock_within(&ship);

            let position = member.position();
            let parent_id = member.parent_id();

            let rotation = match parent_id {
                Some(id) if id == ship.id() => Some(ship.rotation()),
                Some(id) => server.get_object(id).map(|parent| {
                    let guard = parent.lock_within(&member);
                    guard.rotation()
                }),
                None => None,
            };
            if let Some(rotation) = rotation {
                member.set_rotation(rotation);
            }

            ZoneSwitch {
                zone_name: self.zone_name.clone(),
                position,
                parent_id,
                force_reconnect: false,
                containment: member.containment(),
            }
        };

        server.switch_zone(&occupant, switch)?;
        Ok(())
    }
}

impl Task for TransferOccupantTask {
    fn run(self: Box<Self>) {
        match self.transfer() {
            Ok(()) => tracing::debug!(
                ship = %self.ship.id(),
                occupant = %self.occupant.id(),
                zone = %self.zone_name,
                "occupant transferred"
            ),
            Err(err) if err.is_silent() => tracing::debug!(
                ship = %self.ship.id(),
                occupant = %self.occupant.id(),
                %err,
                "occupant transfer skipped"
            ),
            Err(err) => tracing::error!(
                ship = %self.ship.id(),
                occupant = %self.occupant.id(),
                %err,
                "failed to transfer occupant of destroyed ship"
            ),
        }
    }
}
