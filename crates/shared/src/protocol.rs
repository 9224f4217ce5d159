//! Real-time channel framing.
//!
//! Every frame on the socket is a JSON object `{ "event": .., "data": .., "ts": .. }`.
//! Inbound frames are decoded into [`ServerEvent`]; outbound frames are built
//! from [`ClientCommand`] or from an arbitrary event name via [`WsEnvelope::new`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Coordinates, Place, Ride, Role, VehicleType};

/// Inbound event names.
pub const EVENT_RIDE_UPDATE: &str = "ride_update";
pub const EVENT_CAPTAIN_LOCATION: &str = "captain_location";
pub const EVENT_NEW_RIDE_REQUEST: &str = "new_ride_request";

/// Outbound event names.
pub const EVENT_AUTHENTICATE: &str = "authenticate";
pub const EVENT_JOIN: &str = "join";
pub const EVENT_UPDATE_LOCATION: &str = "update_location";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsEnvelope {
    #[serde(default = "new_frame_id")]
    pub id: String,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub ts: DateTime<Utc>,
}

fn new_frame_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl WsEnvelope {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: new_frame_id(),
            event: event.into(),
            data,
            ts: Utc::now(),
        }
    }
}

/// Live position of the captain serving a ride.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptainLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captain_id: Option<String>,
    pub location: Coordinates,
}

/// Captain-side notice that a rider nearby wants a ride.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestNotice {
    #[serde(alias = "_id", alias = "id")]
    pub ride_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup: Option<Place>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<Place>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,
}

/// Events pushed by the server, plus the connection lifecycle events the
/// transport synthesizes locally.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    RideUpdate(Ride),
    CaptainLocation(CaptainLocation),
    NewRideRequest(RideRequestNotice),
    Connected,
    Disconnected { reason: String },
    /// Reconnect attempts are exhausted for this episode.
    ConnectFailed { attempts: u32 },
    /// A frame whose event name the client does not consume.
    Other { event: String, data: serde_json::Value },
}

pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_CONNECT_FAILED: &str = "connect_failed";

impl ServerEvent {
    /// Dispatcher key for this event.
    pub fn name(&self) -> &str {
        match self {
            ServerEvent::RideUpdate(_) => EVENT_RIDE_UPDATE,
            ServerEvent::CaptainLocation(_) => EVENT_CAPTAIN_LOCATION,
            ServerEvent::NewRideRequest(_) => EVENT_NEW_RIDE_REQUEST,
            ServerEvent::Connected => EVENT_CONNECT,
            ServerEvent::Disconnected { .. } => EVENT_DISCONNECT,
            ServerEvent::ConnectFailed { .. } => EVENT_CONNECT_FAILED,
            ServerEvent::Other { event, .. } => event,
        }
    }

    /// Decode an inbound frame. Unknown names become [`ServerEvent::Other`];
    /// a known name with a malformed payload is an error.
    pub fn from_envelope(envelope: WsEnvelope) -> Result<Self, serde_json::Error> {
        Ok(match envelope.event.as_str() {
            EVENT_RIDE_UPDATE => ServerEvent::RideUpdate(serde_json::from_value(envelope.data)?),
            EVENT_CAPTAIN_LOCATION => {
                ServerEvent::CaptainLocation(serde_json::from_value(envelope.data)?)
            }
            EVENT_NEW_RIDE_REQUEST => {
                ServerEvent::NewRideRequest(serde_json::from_value(envelope.data)?)
            }
            _ => ServerEvent::Other {
                event: envelope.event,
                data: envelope.data,
            },
        })
    }
}

/// Messages the client sends on its own behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Authenticate {
        token: String,
    },
    Join {
        user_id: String,
        user_type: Role,
    },
    UpdateLocation {
        user_id: String,
        location: Coordinates,
    },
}

impl ClientCommand {
    pub fn into_envelope(self) -> WsEnvelope {
        let (event, data) = match self {
            ClientCommand::Authenticate { token } => {
                (EVENT_AUTHENTICATE, serde_json::json!({ "token": token }))
            }
            ClientCommand::Join { user_id, user_type } => (
                EVENT_JOIN,
                serde_json::json!({ "userId": user_id, "userType": user_type }),
            ),
            ClientCommand::UpdateLocation { user_id, location } => (
                EVENT_UPDATE_LOCATION,
                serde_json::json!({ "userId": user_id, "location": location }),
            ),
        };
        WsEnvelope::new(event, data)
    }
}
