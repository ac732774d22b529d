//! Shared types used across the drydock crates.

pub mod types;

pub use types::{EntityId, Transform};
