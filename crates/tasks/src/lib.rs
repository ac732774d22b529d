//! Staged ship destruction.
//!
//! A destroyed ship is not removed in one go. [`DestroyShipTask`] plays the
//! destruction effect, then (for owned or durable ships) relocates the hull
//! next to a neutral station and fans out one [`TransferOccupantTask`] per
//! occupant, each re-invocation scheduled with a delay so no worker is held
//! for the whole sequence.
//!
//! # Invariants
//! - Every invocation re-resolves its ship; a ship that disappeared between
//!   stages turns the invocation into a no-op.
//! - The ship lock is held for exactly one stage and released on every path.
//! - A sub-task failure is logged and never reaches the parent or a sibling.
//! - At most one destruction sequence per ship is assumed, not enforced.

pub mod config;
pub mod context;
pub mod destroy;
pub mod error;
pub mod plan;
pub mod store;
pub mod transfer;

pub use config::DestroyConfig;
pub use context::TaskContext;
pub use destroy::DestroyShipTask;
pub use error::TaskError;
pub use plan::{Action, Reschedule, ShipFacts, Stage, Step};
pub use store::{DeviceStore, ShipStore};
pub use transfer::TransferOccupantTask;
