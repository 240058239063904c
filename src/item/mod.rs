//! Runtime-typed values stored in scopes and parameters.
//!
//! Variables hold [`ItemRef`]s: shared, lockable handles to a [`Value`].
//! Two variables may hold the same item, and the [`Cloner`](crate::cloner::Cloner)
//! preserves that sharing when a scope tree is copied.
//!
//! [`Value`] is a closed tagged union. Every variant carries an [`ItemType`]
//! tag which parameters check at resolution time, so a misrouted actual name
//! fails with [`EngineError::TypeMismatch`](crate::EngineError::TypeMismatch)
//! instead of producing garbage downstream.

mod random;
mod value;

pub use random::RandomSource;
pub use value::{ItemRef, ItemType, Value};
