//! Plugins shipped with the demo. Each one registers itself in the catalog.

pub mod audit;
pub mod bind;
pub mod sign;
