//! Stores for application state.

pub mod rides;

pub use rides::{ErrorKind, OpStatus, RideError, RideState, RideStore};
