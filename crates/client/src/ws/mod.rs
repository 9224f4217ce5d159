//! WebSocket module for real-time ride updates.
//!
//! This module provides:
//! - A single persistent connection per session, with bounded auto-reconnect
//! - The authenticate/join handshake, repeated after every reconnect
//! - Decoding of inbound frames into [`ServerEvent`](ridewave_shared::ServerEvent)s
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │          Transport           │
//! │ (connection loop, handshake) │
//! └──────────────────────────────┘
//!                │ Connector (tungstenite, or a fake in tests)
//!                ▼
//!        ┌───────────────┐
//!        │ EventDispatcher│
//!        └───────────────┘
//!                │
//!       ┌────────┴────────┐
//!       ▼                 ▼
//!  ┌──────────┐     ┌────────────┐
//!  │RideStore │     │ UI watchers│
//!  └──────────┘     └────────────┘
//! ```
//!
//! Consumers never read transport state directly; they subscribe to
//! `connect`, `disconnect` and `connect_failed` on the dispatcher.

mod connection;
mod transport;

pub use connection::{ConnectionState, Connector, Link, TransportError, TungsteniteConnector};
pub use transport::{Transport, SERVER_UNREACHABLE_MESSAGE};
