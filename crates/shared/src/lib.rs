//! Shared types for the ridewave client and any Rust backend speaking the
//! same REST and real-time protocol.

pub mod error;
pub mod fare;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
