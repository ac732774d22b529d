//! Where an owned ship goes when its destruction sequence finalizes.

use drydock_kernel::{Entity, EntityGuard};
use glam::Vec3;

use crate::error::TaskError;

/// Packs a ship back into its owner's control device.
pub trait ShipStore: Send + Sync {
    /// `ship` is locked by the caller; `device` may be locked within it.
    fn store(
        &self,
        owner: &Entity,
        ship: &mut EntityGuard<'_>,
        device: &Entity,
        zone_name: &str,
        position: Vec3,
    ) -> Result<(), TaskError>;
}

/// Stores through the owner's zone server.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceStore;

impl ShipStore for DeviceStore {
    fn store(
        &self,
        owner: &Entity,
        ship: &mut EntityGuard<'_>,
        device: &Entity,
        zone_name: &str,
        position: Vec3,
    ) -> Result<(), TaskError> {
        let server = owner
            .zone_server()
            .ok_or(TaskError::MissingCapability("owner zone server"))?;
        server.store_ship(owner, ship, device, zone_name, position)?;
        Ok(())
    }
}
