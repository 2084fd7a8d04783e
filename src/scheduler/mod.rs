//! VM placement policies

pub mod core;
pub mod scoring;

pub use self::core::{PlacementPolicy, PolicyKind};
pub use scoring::{CarbonWeights, PowerModel};
