//! The region table: a heap split into fixed-size regions, each with a role, a bump pointer,
//! liveness metadata and a remembered set.

mod marktable;
#[allow(clippy::module_inception)]
mod region;
mod regionspace;
mod remset;

pub use self::marktable::HeapMarkBitmap;
pub use self::region::{Region, RegionId, RegionRole};
pub use self::regionspace::{EvacuationReserve, RegionSpace};
pub use self::remset::RemSet;
