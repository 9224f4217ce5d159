//! HTTP API client for the ride backend.
//!
//! Every failure leaves this module as one of the [`ApiError`] shapes; the
//! stores above never see a `reqwest` error. The per-concern traits
//! ([`RideApi`], [`AuthApi`], [`HealthProbe`], [`PaymentApi`]) are the seams
//! the stores are built against.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use ridewave_shared::{
    fare, ApiError, Coordinates, Credentials, FareEstimate, FareQuery, PaymentMethod,
    PaymentRecord, PaymentRequest, Profile, RatingRequest, RegistrationData, Ride, RideRequest,
    Role, VehicleType,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bearer credential shared between the auth store (writer) and the REST
/// client (reader).
#[derive(Debug, Clone, Default)]
pub struct Credential(Arc<RwLock<Option<String>>>);

impl Credential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Successful login: the credential plus the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(alias = "user", alias = "captain")]
    pub profile: Profile,
}

#[async_trait]
pub trait RideApi: Send + Sync {
    async fn request_ride(&self, request: &RideRequest) -> Result<Ride, ApiError>;
    /// `Ok(None)` when the server answers with an empty ride.
    async fn active_ride(&self) -> Result<Option<Ride>, ApiError>;
    async fn ride_history(&self) -> Result<Vec<Ride>, ApiError>;
    /// The server may or may not echo the cancelled ride back.
    async fn cancel_ride(&self, ride_id: &str) -> Result<Option<Ride>, ApiError>;
    async fn estimate_fare(&self, query: &FareQuery) -> Result<FareEstimate, ApiError>;
    async fn rate_ride(&self, ride_id: &str, rating: &RatingRequest) -> Result<(), ApiError>;
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, role: Role, credentials: &Credentials) -> Result<AuthResponse, ApiError>;
    async fn signup(&self, role: Role, data: &RegistrationData) -> Result<(), ApiError>;
    /// Takes the token explicitly: the shared credential is already cleared
    /// by the time the server is told.
    async fn logout(&self, role: Role, token: &str) -> Result<(), ApiError>;
    async fn update_profile(
        &self,
        role: Role,
        patch: &serde_json::Value,
    ) -> Result<Profile, ApiError>;
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok` only for a success status.
    async fn check_health(&self) -> Result<(), ApiError>;
}

#[async_trait]
pub trait PaymentApi: Send + Sync {
    async fn payment_methods(&self) -> Result<Vec<PaymentMethod>, ApiError>;
    async fn add_payment_method(&self, method: &serde_json::Value)
        -> Result<PaymentMethod, ApiError>;
    async fn remove_payment_method(&self, method_id: &str) -> Result<(), ApiError>;
    async fn process_payment(&self, payment: &PaymentRequest) -> Result<PaymentRecord, ApiError>;
    async fn payment_history(&self) -> Result<Vec<PaymentRecord>, ApiError>;
}

// The backend is inconsistent about wrapping payloads; accept both forms.

#[derive(Deserialize)]
#[serde(untagged)]
enum RideBody {
    Bare(Ride),
    Wrapped { ride: Option<Ride> },
}

impl RideBody {
    fn into_ride(self) -> Option<Ride> {
        match self {
            RideBody::Bare(ride) => Some(ride),
            RideBody::Wrapped { ride } => ride,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RidesBody {
    Bare(Vec<Ride>),
    Wrapped { rides: Vec<Ride> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EstimateBody {
    Bare(FareEstimate),
    Wrapped {
        #[serde(alias = "fare")]
        estimate: FareEstimate,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileBody {
    Bare(Profile),
    Wrapped {
        #[serde(alias = "user", alias = "captain")]
        profile: Profile,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "methods", alias = "payments", alias = "history")]
        items: Vec<T>,
    },
}

impl<T> ListBody<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListBody::Bare(v) | ListBody::Wrapped { items: v } => v,
        }
    }
}

/// Fold a transport-level failure into the shared taxonomy.
fn normalize(err: reqwest::Error) -> ApiError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ApiError::Connectivity(err.to_string())
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Connectivity(err.to_string())
    }
}

/// HTTP client for the ride backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credential: Credential,
    health_path: String,
    local_fare_fallback: bool,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            credential: Credential::new(),
            health_path: "/health".to_string(),
            local_fare_fallback: false,
        }
    }

    /// Rebuild the underlying client with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Compute a local estimate when the estimate endpoint is unreachable.
    pub fn with_local_fare_fallback(mut self, enabled: bool) -> Self {
        self.local_fare_fallback = enabled;
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Send a request with the installed credential and return the body of a
    /// success response.
    async fn execute(&self, rb: RequestBuilder) -> Result<String, ApiError> {
        let rb = match self.credential.get() {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        };
        self.send(rb).await
    }

    async fn send(&self, rb: RequestBuilder) -> Result<String, ApiError> {
        let resp = rb.send().await.map_err(normalize)?;
        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Connectivity(format!("failed to read body: {e}")))?;

        if !is_success {
            let err = ApiError::from_status(status, text);
            if let ApiError::Server { status, body } = &err {
                crate::log_error!("server error {}: {}", status, body);
            }
            return Err(err);
        }
        Ok(text)
    }

    fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
        let text = if text.trim().is_empty() { "null" } else { text };
        serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let text = self.execute(self.client.get(self.url(path))).await?;
        Self::decode(&text)
    }

    pub async fn post_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let text = self
            .execute(self.client.post(self.url(path)).json(body))
            .await?;
        Self::decode(&text)
    }

    pub async fn put_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let text = self
            .execute(self.client.put(self.url(path)).json(body))
            .await?;
        Self::decode(&text)
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(self.client.delete(self.url(path))).await?;
        Ok(())
    }
}

#[async_trait]
impl RideApi for ApiClient {
    async fn request_ride(&self, request: &RideRequest) -> Result<Ride, ApiError> {
        let body: Option<RideBody> = self.post_json("/rides/request", request).await?;
        body.and_then(RideBody::into_ride)
            .ok_or_else(|| ApiError::Decode("ride request returned no ride".to_string()))
    }

    async fn active_ride(&self) -> Result<Option<Ride>, ApiError> {
        let body: Option<RideBody> = self.get_json("/rides/active").await?;
        Ok(body.and_then(RideBody::into_ride))
    }

    async fn ride_history(&self) -> Result<Vec<Ride>, ApiError> {
        let body: Option<RidesBody> = self.get_json("/rides/user/history").await?;
        Ok(match body {
            Some(RidesBody::Bare(rides)) | Some(RidesBody::Wrapped { rides }) => rides,
            None => Vec::new(),
        })
    }

    async fn cancel_ride(&self, ride_id: &str) -> Result<Option<Ride>, ApiError> {
        let value: serde_json::Value = self
            .post_json(&format!("/rides/{ride_id}/cancel"), &serde_json::json!({}))
            .await?;
        // The echo is informational; a shape we don't know is not a failure.
        Ok(serde_json::from_value::<RideBody>(value)
            .ok()
            .and_then(RideBody::into_ride))
    }

    async fn estimate_fare(&self, query: &FareQuery) -> Result<FareEstimate, ApiError> {
        match self.post_json::<_, EstimateBody>("/rides/estimate", query).await {
            Ok(EstimateBody::Bare(est)) | Ok(EstimateBody::Wrapped { estimate: est }) => Ok(est),
            Err(ApiError::Connectivity(reason)) if self.local_fare_fallback => {
                crate::log_warn!("fare estimate unreachable ({}), estimating locally", reason);
                let vehicle = query.vehicle_type.clone().unwrap_or(VehicleType::Car);
                Ok(fare::estimate_locally(
                    &query.origin,
                    &query.destination,
                    &vehicle,
                ))
            }
            Err(e) => Err(e),
        }
    }

    async fn rate_ride(&self, ride_id: &str, rating: &RatingRequest) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .post_json(&format!("/ratings/ride/{ride_id}"), rating)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, role: Role, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.post_json(&format!("{}/login", role.namespace()), credentials)
            .await
    }

    async fn signup(&self, role: Role, data: &RegistrationData) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .post_json(&format!("{}/signup", role.namespace()), data)
            .await?;
        Ok(())
    }

    async fn logout(&self, role: Role, token: &str) -> Result<(), ApiError> {
        let rb = self
            .client
            .get(self.url(&format!("{}/logout", role.namespace())))
            .bearer_auth(token);
        self.send(rb).await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        role: Role,
        patch: &serde_json::Value,
    ) -> Result<Profile, ApiError> {
        let body: ProfileBody = self
            .put_json(&format!("{}/profile", role.namespace()), patch)
            .await?;
        Ok(match body {
            ProfileBody::Bare(p) | ProfileBody::Wrapped { profile: p } => p,
        })
    }
}

#[async_trait]
impl HealthProbe for ApiClient {
    async fn check_health(&self) -> Result<(), ApiError> {
        self.execute(self.client.get(self.url(&self.health_path)))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl PaymentApi for ApiClient {
    async fn payment_methods(&self) -> Result<Vec<PaymentMethod>, ApiError> {
        let body: ListBody<PaymentMethod> = self.get_json("/payments/methods").await?;
        Ok(body.into_vec())
    }

    async fn add_payment_method(
        &self,
        method: &serde_json::Value,
    ) -> Result<PaymentMethod, ApiError> {
        self.post_json("/payments/methods", method).await
    }

    async fn remove_payment_method(&self, method_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/payments/methods/{method_id}")).await
    }

    async fn process_payment(&self, payment: &PaymentRequest) -> Result<PaymentRecord, ApiError> {
        self.post_json("/payments/process", payment).await
    }

    async fn payment_history(&self) -> Result<Vec<PaymentRecord>, ApiError> {
        let body: ListBody<PaymentRecord> = self.get_json("/payments/history").await?;
        Ok(body.into_vec())
    }
}

/// Convenience for callers that only have two points and a vehicle.
pub fn fare_query(
    origin: Coordinates,
    destination: Coordinates,
    vehicle_type: Option<VehicleType>,
) -> FareQuery {
    FareQuery {
        origin,
        destination,
        vehicle_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridewave_shared::RideStatus;

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.url("/rides/active"), "http://localhost:3000/rides/active");
        assert_eq!(client.url("health"), "http://localhost:3000/health");
        assert_eq!(client.url("https://other/x"), "https://other/x");
    }

    #[test]
    fn test_ride_body_forms() {
        let bare: RideBody = serde_json::from_str(r#"{"id":"r1","status":"requested"}"#).unwrap();
        assert_eq!(bare.into_ride().unwrap().status, RideStatus::Requested);

        let wrapped: RideBody =
            serde_json::from_str(r#"{"ride":{"_id":"r2","status":"accepted"}}"#).unwrap();
        assert_eq!(wrapped.into_ride().unwrap().id, "r2");

        let empty: RideBody = serde_json::from_str(r#"{"ride":null}"#).unwrap();
        assert!(empty.into_ride().is_none());

        let none: Option<RideBody> = ApiClient::decode("").unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_auth_response_aliases() {
        let resp: AuthResponse = serde_json::from_str(
            r#"{"token":"abc","captain":{"_id":"c1","email":"c@x.io","vehicle":{"plate":"KA01"}}}"#,
        )
        .unwrap();
        assert_eq!(resp.token, "abc");
        assert_eq!(resp.profile.vehicle.unwrap().plate, "KA01");
    }

    #[test]
    fn test_list_body_forms() {
        let bare: ListBody<PaymentMethod> =
            serde_json::from_str(r#"[{"id":"m1","type":"card"}]"#).unwrap();
        assert_eq!(bare.into_vec().len(), 1);
        let wrapped: ListBody<PaymentMethod> =
            serde_json::from_str(r#"{"methods":[{"id":"m1","type":"card","last4":"4242"}]}"#)
                .unwrap();
        assert_eq!(wrapped.into_vec()[0].last4.as_deref(), Some("4242"));
    }

    #[test]
    fn test_credential_is_shared() {
        let cred = Credential::new();
        let client = ApiClient::new("http://x").with_credential(cred.clone());
        cred.set("abc123");
        assert_eq!(client.credential().get().as_deref(), Some("abc123"));
        cred.clear();
        assert_eq!(client.credential().get(), None);
    }

    #[tokio::test]
    async fn test_unreachable_estimate_falls_back_locally() {
        // Port 9 (discard) on localhost is closed on any sane test host.
        let client = ApiClient::new("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2))
            .with_local_fare_fallback(true);
        let query = fare_query(
            Coordinates::new(12.97, 77.59),
            Coordinates::new(12.97, 77.59),
            None,
        );
        let est = client.estimate_fare(&query).await.unwrap();
        assert_eq!(est.total, VehicleType::Car.tariff().base);
    }
}
