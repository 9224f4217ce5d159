//! Shared data models for rides, places and identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Geography ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the WGS84 latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    #[serde(default)]
    pub address: String,
    pub coordinates: Coordinates,
}

// --- Ride status ---

/// Ride lifecycle.
///
/// `requested -> accepted -> in_progress -> completed`, with
/// `requested | accepted -> cancelled`. Statuses the client does not know are
/// carried verbatim in `Unknown` so a newer backend never breaks decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RideStatus {
    Requested,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Unknown(String),
}

impl RideStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RideStatus::Requested => "requested",
            RideStatus::Accepted => "accepted",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
            RideStatus::Unknown(s) => s,
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        match self {
            RideStatus::Completed | RideStatus::Cancelled => true,
            RideStatus::Requested | RideStatus::Accepted | RideStatus::InProgress => false,
            // An unrecognized status is treated as still live until the
            // server says otherwise.
            RideStatus::Unknown(_) => false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether a captain is expected to be attached at this status.
    pub fn has_captain_assigned(&self) -> bool {
        match self {
            RideStatus::Accepted | RideStatus::InProgress | RideStatus::Completed => true,
            RideStatus::Requested | RideStatus::Cancelled | RideStatus::Unknown(_) => false,
        }
    }

    pub fn can_transition_to(&self, next: &RideStatus) -> bool {
        use RideStatus::*;
        match (self, next) {
            (Requested, Accepted) | (Accepted, InProgress) | (InProgress, Completed) => true,
            (Requested, Cancelled) | (Accepted, Cancelled) => true,
            (Completed, _) | (Cancelled, _) => false,
            // Unknown on either side cannot be judged locally.
            (Unknown(_), _) | (_, Unknown(_)) => true,
            _ => false,
        }
    }
}

impl From<String> for RideStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "requested" | "pending" => RideStatus::Requested,
            "accepted" => RideStatus::Accepted,
            "in_progress" | "ongoing" => RideStatus::InProgress,
            "completed" => RideStatus::Completed,
            "cancelled" => RideStatus::Cancelled,
            _ => RideStatus::Unknown(s),
        }
    }
}

impl From<RideStatus> for String {
    fn from(status: RideStatus) -> Self {
        match status {
            RideStatus::Unknown(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Vehicles and fares ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VehicleType {
    Car,
    Moto,
    Auto,
    Other(String),
}

impl VehicleType {
    pub fn as_str(&self) -> &str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Moto => "moto",
            VehicleType::Auto => "auto",
            VehicleType::Other(s) => s,
        }
    }
}

impl From<String> for VehicleType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "car" => VehicleType::Car,
            "moto" | "motorcycle" | "bike" => VehicleType::Moto,
            "auto" => VehicleType::Auto,
            _ => VehicleType::Other(s),
        }
    }
}

impl From<VehicleType> for String {
    fn from(v: VehicleType) -> Self {
        match v {
            VehicleType::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl From<&str> for VehicleType {
    fn from(s: &str) -> Self {
        VehicleType::from(s.to_string())
    }
}

/// Fare attached to a ride. Either side may be missing depending on how far
/// the ride has progressed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fare {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated: Option<f64>,
    #[serde(default, rename = "final", skip_serializing_if = "Option::is_none")]
    pub final_amount: Option<f64>,
}

/// Informational breakdown returned by `POST /rides/estimate`. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FareEstimate {
    /// Kilometres.
    pub distance: f64,
    /// Minutes.
    pub duration: f64,
    pub base_fare: f64,
    pub distance_charge: f64,
    pub time_charge: f64,
    pub total: f64,
}

// --- Captains ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub plate: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<VehicleType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptainInfo {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<Vehicle>,
}

// --- Rides ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideRating {
    pub value: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    #[serde(alias = "_id")]
    pub id: String,
    pub status: RideStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup: Option<Place>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<Place>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<Fare>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, alias = "captain", skip_serializing_if = "Option::is_none")]
    pub assigned_captain: Option<CaptainInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captain_live_location: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<RideRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Ride {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// A ride request as the booking wizard collects it. Every piece may still be
/// missing; [`RideDraft::validate`] turns it into a [`RideRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideDraft {
    #[serde(default)]
    pub pickup: Option<PlaceDraft>,
    #[serde(default)]
    pub dropoff: Option<PlaceDraft>,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaceDraft {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl PlaceDraft {
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            address: None,
            coordinates: Some(Coordinates::new(lat, lng)),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    fn resolve(&self, field: &str) -> Result<Place, String> {
        let coordinates = self
            .coordinates
            .ok_or_else(|| format!("{field} location is missing coordinates"))?;
        if !coordinates.is_valid() {
            return Err(format!(
                "{field} coordinates are out of range ({}, {})",
                coordinates.lat, coordinates.lng
            ));
        }
        Ok(Place {
            address: self.address.clone().unwrap_or_default(),
            coordinates,
        })
    }
}

/// Validated body for `POST /rides/request`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub pickup: Place,
    pub dropoff: Place,
    pub vehicle_type: VehicleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}

impl RideDraft {
    /// Check the coordinate sub-structure of both places before anything
    /// touches the network.
    pub fn validate(&self) -> Result<RideRequest, String> {
        let pickup = self
            .pickup
            .as_ref()
            .ok_or_else(|| "pickup location is required".to_string())?
            .resolve("pickup")?;
        let dropoff = self
            .dropoff
            .as_ref()
            .ok_or_else(|| "dropoff location is required".to_string())?
            .resolve("dropoff")?;
        Ok(RideRequest {
            pickup,
            dropoff,
            vehicle_type: self.vehicle_type.clone().unwrap_or(VehicleType::Car),
            payment_method: self.payment_method.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FareQuery {
    pub origin: Coordinates,
    pub destination: Coordinates,
    #[serde(rename = "vehicleType", default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<VehicleType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingRequest {
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

// --- Identity ---

/// Which side of the marketplace a session belongs to. Stored as
/// `user`/`captain`, matching the REST namespaces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "user")]
    Rider,
    #[serde(rename = "captain")]
    Captain,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Rider => "user",
            Role::Captain => "captain",
        }
    }

    /// REST namespace for identity endpoints.
    pub fn namespace(&self) -> &'static str {
        match self {
            Role::Rider => "/users",
            Role::Captain => "/captains",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" | "rider" => Some(Role::Rider),
            "captain" => Some(Role::Captain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullName {
    #[serde(default)]
    pub firstname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub fullname: FullName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    /// Captains only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<Vehicle>,
}

impl Profile {
    /// Overlay fields the server confirmed onto this snapshot.
    pub fn merge(&mut self, confirmed: &serde_json::Value) -> Result<(), serde_json::Error> {
        let mut current = serde_json::to_value(&*self)?;
        if let (Some(base), Some(patch)) = (current.as_object_mut(), confirmed.as_object()) {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
        *self = serde_json::from_value(current)?;
        Ok(())
    }
}

/// The single identity active in this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub token: String,
    pub role: Role,
    pub profile: Profile,
}

impl Session {
    pub fn subject_id(&self) -> &str {
        &self.profile.id
    }
}

/// Registration payload. Captains additionally send a vehicle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationData {
    pub fullname: FullName,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<Vehicle>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// --- Payments ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub ride_id: String,
    pub payment_method_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub ride_id: String,
    pub amount: f64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
