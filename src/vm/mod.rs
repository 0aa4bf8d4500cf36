//! The interface between the collector and a language runtime ("binding").
//!
//! A runtime provides a value that implements [`VMBinding`]: [`Scanning`] reports root slots and
//! [`Collection`] receives callbacks. The object layout is fixed by [`ObjectModel`], with types
//! registered in a [`TypeTable`].

mod collection;
pub mod object_model;
mod scanning;
mod slot;

pub use self::collection::Collection;
pub use self::object_model::{ObjectModel, TypeDescriptor, TypeId, TypeTable};
pub use self::scanning::Scanning;
pub use self::slot::RootSlot;

/// Everything the collector needs from a runtime.
pub trait VMBinding: Scanning + Collection + Sized + Send + Sync + 'static {}

impl<T: Scanning + Collection + Sized + Send + Sync + 'static> VMBinding for T {}

#[cfg(test)]
mod tests;
