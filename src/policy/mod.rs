//! Memory policies. The collector manages the whole heap as one region space.

pub mod region;
