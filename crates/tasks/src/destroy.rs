//! The destruction sequence of a single ship.

use std::sync::Arc;
use std::time::{Duration, Instant};

use drydock_kernel::{
    ComponentSlot, Entity, EntityGuard, OptionBits, ShipMessage, WeakRef, World, Zone,
    COMPONENT_ACTIVE,
};
use drydock_sched::Task;
use glam::{Quat, Vec3};

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::plan::{self, Action, ShipFacts, Stage};
use crate::transfer::{self, TransferOccupantTask};

pub const LABEL: &str = "DestroyShipTask";

/// Self-rescheduling destruction of one ship.
///
/// Each invocation runs one stage under the ship's lock and either finishes
/// or hands itself back to the scheduler for the next stage.
pub struct DestroyShipTask {
    target: WeakRef,
    stage: Stage,
    created_at: Instant,
    ctx: Arc<TaskContext>,
}

impl DestroyShipTask {
    pub fn new(target: WeakRef, ctx: Arc<TaskContext>) -> Self {
        Self {
            target,
            stage: Stage::Initiate,
            created_at: Instant::now(),
            ctx,
        }
    }

    /// Resume a sequence at an arbitrary stage.
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Schedule the first stage to run as soon as a worker is free.
    pub fn start(target: WeakRef, ctx: Arc<TaskContext>) {
        let task = Self::new(target, Arc::clone(&ctx));
        ctx.scheduler().schedule(Box::new(task), LABEL, Duration::ZERO);
    }

    pub fn target(&self) -> &WeakRef {
        &self.target
    }

    /// The stage the next invocation will run.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run one stage. Returns the delay after which the task wants to run again.
    pub fn run_stage(&mut self) -> Result<Option<Duration>, TaskError> {
        let stage = self.stage;
        self.stage = stage.next();

        let ship = self.target.try_resolve()?;
        let zone = ship.zone().ok_or(TaskError::MissingCapability("zone"))?;
        let owner = ship.owner().and_then(|owner| owner.resolve());
        let server = ship
            .zone_server()
            .ok_or(TaskError::MissingCapability("zone server"))?;

        let mut guard = ship.lock();

        let facts = ShipFacts {
            has_owner: owner.is_some(),
            persistence_level: guard.persistence_level(),
        };
        let step = plan::plan(stage, facts, self.ctx.config().relocate_delay());

        match step.action {
            Action::Initiate { destroy_now } => {
                self.initiate(&server, &mut guard, &zone, destroy_now);
            }
            Action::Relocate => self.relocate(&ship, &mut guard, &zone)?,
            Action::StoreInDevice => {
                let owner = owner.ok_or(TaskError::MissingCapability("owner"))?;
                self.store_in_device(&owner, &mut guard)?;
            }
            Action::Destroy => {
                server.destroy_from_world(&mut guard);
                server.destroy_from_storage(&guard);
            }
            Action::Nothing => {}
        }

        if let Some(next) = step.next {
            debug_assert_eq!(next.stage, self.stage);
            return Ok(Some(next.delay));
        }
        Ok(None)
    }

    fn initiate(&self, server: &World, ship: &mut EntityGuard<'_>, zone: &Zone, destroy_now: bool) {
        ship.clear_option_bit(OptionBits::WINGS_OPEN, true);

        if ship.is_component_active(ComponentSlot::Booster) {
            ship.remove_component_flag(ComponentSlot::Booster, COMPONENT_ACTIVE, true);
            ship.restart_booster(true);
        }

        let severity = self.ctx.severity();
        let id = ship.id();
        ship.broadcast(ShipMessage::DestroyShip { ship: id, severity }, false);

        if destroy_now {
            tracing::debug!("no owner and not durable, destroying now");
            server.destroy_from_world(ship);
            server.destroy_from_storage(ship);
        } else {
            ship.set_option_bit(OptionBits::DESTROYING, true);
        }

        server.notify_despawn(id, zone);
    }

    fn relocate(
        &self,
        ship: &Arc<Entity>,
        guard: &mut EntityGuard<'_>,
        zone: &Zone,
    ) -> Result<(), TaskError> {
        guard.clear_option_bit(OptionBits::DESTROYING, true);

        let lookup = zone
            .station_lookup()
            .ok_or(TaskError::MissingCapability("station lookup"))?;
        let config = self.ctx.config();
        let station = lookup.nearest_station_position(guard.position(), &config.faction);
        let destination = station + self.ctx.station_offset();

        let mut transform = guard.transform();
        transform.rotation = Quat::IDENTITY;
        // Y and Z are applied swapped.
        transform.position = Vec3::new(destination.x, destination.z, destination.y);
        guard.set_transform(transform);

        let id = guard.id();
        let messages = vec![
            ShipMessage::DataTransform {
                ship: id,
                transform,
            },
            ShipMessage::ShipState3 {
                ship: id,
                option_bits: guard.option_bits().0,
                persistence_level: guard.persistence_level(),
            },
            ShipMessage::ShipState6 {
                ship: id,
                zone: Some(zone.name().to_string()),
                occupants: guard.occupant_count(),
            },
        ];
        guard.broadcast_all(messages, true);

        let total = guard.occupant_count();
        tracing::info!(
            position = ?transform.position,
            occupants = total,
            "ship relocated"
        );
        for index in 0..total {
            let Some(occupant) = guard.occupant_at(index) else {
                continue;
            };
            let task =
                TransferOccupantTask::new(Arc::clone(ship), occupant, zone.name().to_string());
            let delay = self.ctx.transfer_delay();
            self.ctx
                .scheduler()
                .schedule(Box::new(task), transfer::LABEL, delay);
        }
        Ok(())
    }

    fn store_in_device(&self, owner: &Entity, ship: &mut EntityGuard<'_>) -> Result<(), TaskError> {
        let server = owner
            .zone_server()
            .ok_or(TaskError::MissingCapability("owner zone server"))?;
        let device_id = ship
            .control_device()
            .ok_or(TaskError::MissingCapability("control device"))?;
        let device = server
            .get_object(device_id)
            .ok_or(TaskError::MissingCapability("control device"))?;
        if !device.is_ship_control_device() {
            return Err(TaskError::MissingCapability("ship control device"));
        }

        let (zone_name, position) = {
            let device = device.lock_within(ship);
            let zone = device
                .stored_zone()
                .ok_or(TaskError::MissingCapability("stored zone"))?
                .to_string();
            (zone, device.stored_position())
        };
        self.ctx
            .store()
            .store(owner, ship, &device, &zone_name, position)
    }
}

impl Task for DestroyShipTask {
    fn run(mut self: Box<Self>) {
        let span = tracing::info_span!(
            "destroy_ship",
            ship = %self.target.id(),
            stage = self.stage.index()
        );
        let _enter = span.enter();

        match self.run_stage() {
            Ok(Some(delay)) => {
                tracing::debug!(
                    next_stage = self.stage.index(),
                    delay_ms = delay.as_millis() as u64,
                    "re-scheduling"
                );
                let ctx = Arc::clone(&self.ctx);
                ctx.scheduler().schedule(self, LABEL, delay);
            }
            Ok(None) => tracing::debug!(
                elapsed_ms = self.created_at.elapsed().as_millis() as u64,
                "destruction sequence step finished"
            ),
            Err(err) if err.is_silent() => tracing::debug!(%err, "destruction stage aborted"),
            Err(err) => tracing::warn!(%err, "destruction stage failed"),
        }
    }
}
