use drydock_common::EntityId;

/// Errors surfaced by kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("entity {0} no longer resolves")]
    HandleExpired(EntityId),
    #[error("unknown zone {0:?}")]
    UnknownZone(String),
    #[error("entity {0} is not a ship control device")]
    NotAControlDevice(EntityId),
}
