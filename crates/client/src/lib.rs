//! Ridewave Client - real-time ride-state sync for the ride-booking app
//!
//! This crate keeps a rider's (or captain's) view of their ride in step with
//! the backend: a REST client for baselines and mutations, one WebSocket
//! transport for pushes, an in-process event dispatcher between them, and the
//! auth and ride stores the UI reads from. [`App`] wires it all together.

pub mod logging;

pub mod api_client;
pub mod app;
pub mod auth_session;
pub mod config;
pub mod dispatcher;
pub mod notify;
pub mod offline;
pub mod routes;
pub mod storage;
pub mod stores;
pub mod ws;

pub use api_client::{ApiClient, Credential};
pub use app::{App, AppParts};
pub use auth_session::{AuthError, AuthStore};
pub use config::ClientConfig;
pub use dispatcher::EventDispatcher;
pub use notify::{Notification, Notifier};
pub use offline::ConnectivityMonitor;
pub use routes::Route;
pub use stores::{RideError, RideState, RideStore};
pub use ws::Transport;
