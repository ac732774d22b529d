//! Payloads broadcast from a ship to its observers.

use drydock_common::{EntityId, Transform};
use serde::{Deserialize, Serialize};

use crate::entity::ComponentSlot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShipMessage {
    /// Plays the destruction effect. `severity` only varies the client visuals.
    DestroyShip { ship: EntityId, severity: f32 },
    OptionsChanged { ship: EntityId, bits: u32 },
    ComponentChanged { ship: EntityId, slot: ComponentSlot, flags: u32 },
    BoosterChanged { ship: EntityId, energy: f32, recharging: bool },
    DataTransform { ship: EntityId, transform: Transform },
    /// Baseline 3: option bits and persistence.
    ShipState3 { ship: EntityId, option_bits: u32, persistence_level: u8 },
    /// Baseline 6: zone membership and crew.
    ShipState6 { ship: EntityId, zone: Option<String>, occupants: usize },
}

impl ShipMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ShipMessage::DestroyShip { .. } => "DestroyShip",
            ShipMessage::OptionsChanged { .. } => "OptionsChanged",
            ShipMessage::ComponentChanged { .. } => "ComponentChanged",
            ShipMessage::BoosterChanged { .. } => "BoosterChanged",
            ShipMessage::DataTransform { .. } => "DataTransform",
            ShipMessage::ShipState3 { .. } => "ShipState3",
            ShipMessage::ShipState6 { .. } => "ShipState6",
        }
    }
}

/// One message sent from `from` to its observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub from: EntityId,
    pub message: ShipMessage,
    /// Unreliable messages may be dropped by the transport.
    pub reliable: bool,
}
