//! In-process fakes for the client's network seams.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use ridewave_client::api_client::{
    AuthApi, AuthResponse, Credential, HealthProbe, PaymentApi, RideApi,
};
use ridewave_client::config::{ClientConfig, MonitorConfig};
use ridewave_client::storage::MemoryStorage;
use ridewave_client::ws::{Connector, Link, TransportError};
use ridewave_client::{App, AppParts, ConnectivityMonitor, Notifier, RideStore};
use ridewave_shared::{
    fare, ApiError, Credentials, FareEstimate, FareQuery, FullName, PaymentMethod, PaymentRecord,
    PaymentRequest, PlaceDraft, Profile, RatingRequest, RegistrationData, Ride, RideDraft,
    RideRequest, RideStatus, Role, VehicleType,
};
use tokio::sync::Notify;

pub fn ride(id: &str, status: RideStatus) -> Ride {
    Ride {
        id: id.to_string(),
        status,
        pickup: None,
        dropoff: None,
        vehicle_type: None,
        fare: None,
        payment_method: None,
        assigned_captain: None,
        captain_live_location: None,
        rating: None,
        created_at: None,
    }
}

pub fn profile(id: &str) -> Profile {
    Profile {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        fullname: FullName::default(),
        phone: None,
        rating: None,
        vehicle: None,
    }
}

pub fn draft(pickup: (f64, f64), dropoff: (f64, f64)) -> RideDraft {
    RideDraft {
        pickup: Some(PlaceDraft::at(pickup.0, pickup.1)),
        dropoff: Some(PlaceDraft::at(dropoff.0, dropoff.1)),
        vehicle_type: Some(VehicleType::Car),
        payment_method: None,
    }
}

#[derive(Default)]
pub struct FakeRideApi {
    pub calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub next_id: AtomicUsize,
    /// `None` answers "no active ride" with an empty body.
    pub active: Mutex<Option<Result<Ride, ApiError>>>,
    pub history: Mutex<Option<Result<Vec<Ride>, ApiError>>>,
    pub request_error: Mutex<Option<ApiError>>,
    /// Holds `active_ride` until notified.
    pub active_gate: Mutex<Option<Arc<Notify>>>,
    /// Holds `request_ride` until notified.
    pub request_gate: Mutex<Option<Arc<Notify>>>,
    /// Yield inside `request_ride` so concurrent callers interleave.
    pub slow_requests: bool,
}

impl FakeRideApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RideApi for FakeRideApi {
    async fn request_ride(&self, request: &RideRequest) -> Result<Ride, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.request_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.slow_requests {
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
        }
        if let Some(e) = self.request_error.lock().unwrap().clone() {
            return Err(e);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut created = ride(&format!("ride-{n}"), RideStatus::Requested);
        created.pickup = Some(request.pickup.clone());
        created.dropoff = Some(request.dropoff.clone());
        created.vehicle_type = Some(request.vehicle_type.clone());
        Ok(created)
    }

    async fn active_ride(&self) -> Result<Option<Ride>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.active_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.active.lock().unwrap().clone() {
            None => Ok(None),
            Some(result) => result.map(Some),
        }
    }

    async fn ride_history(&self) -> Result<Vec<Ride>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.history.lock().unwrap().clone().unwrap_or(Ok(Vec::new()))
    }

    async fn cancel_ride(&self, _ride_id: &str) -> Result<Option<Ride>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    async fn estimate_fare(&self, query: &FareQuery) -> Result<FareEstimate, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(fare::estimate_locally(
            &query.origin,
            &query.destination,
            &query.vehicle_type.clone().unwrap_or(VehicleType::Car),
        ))
    }

    async fn rate_ride(&self, _ride_id: &str, _rating: &RatingRequest) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeAuthApi {
    pub token: String,
    pub calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub fail_logout: bool,
}

impl FakeAuthApi {
    pub fn issuing(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: token.to_string(),
            calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            fail_logout: true,
        })
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, _role: Role, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = credentials.email.split('@').next().unwrap_or("u1").to_string();
        Ok(AuthResponse {
            token: self.token.clone(),
            profile: profile(&id),
        })
    }

    async fn signup(&self, _role: Role, _data: &RegistrationData) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self, _role: Role, _token: &str) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout {
            Err(ApiError::Server {
                status: 500,
                body: "logout exploded".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn update_profile(
        &self,
        _role: Role,
        _patch: &serde_json::Value,
    ) -> Result<Profile, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ApiError::Unauthorized("jwt expired".to_string()))
    }
}

#[derive(Default)]
pub struct FakeHealth {
    pub calls: AtomicUsize,
}

#[async_trait]
impl HealthProbe for FakeHealth {
    async fn check_health(&self) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePayments {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PaymentApi for FakePayments {
    async fn payment_methods(&self) -> Result<Vec<PaymentMethod>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn add_payment_method(
        &self,
        _method: &serde_json::Value,
    ) -> Result<PaymentMethod, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ApiError::Validation("unsupported".to_string()))
    }

    async fn remove_payment_method(&self, _method_id: &str) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn process_payment(&self, _payment: &PaymentRequest) -> Result<PaymentRecord, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ApiError::Validation("unsupported".to_string()))
    }

    async fn payment_history(&self) -> Result<Vec<PaymentRecord>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Every connection attempt fails.
#[derive(Default)]
pub struct RefusingConnector {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self, _url: &str) -> Result<Link, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Connect("connection refused".to_string()))
    }
}

/// Accepts every connection and hands the server end to the test.
#[derive(Default)]
pub struct LoopbackConnector {
    pub attempts: AtomicUsize,
    ends: Mutex<Vec<(UnboundedReceiver<String>, UnboundedSender<String>)>>,
}

impl LoopbackConnector {
    /// Wait for the client to connect and return the server's end.
    pub async fn accept(&self) -> (UnboundedReceiver<String>, UnboundedSender<String>) {
        loop {
            if let Some(end) = self.ends.lock().unwrap().pop() {
                return end;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, _url: &str) -> Result<Link, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let (to_server, from_client) = unbounded();
        let (to_client, from_server) = unbounded();
        self.ends.lock().unwrap().push((from_client, to_client));
        Ok(Link {
            outbound: to_server,
            inbound: from_server,
        })
    }
}

pub struct Harness {
    pub app: App,
    pub rides: Arc<FakeRideApi>,
    pub auth: Arc<FakeAuthApi>,
    pub health: Arc<FakeHealth>,
    pub payments: Arc<FakePayments>,
    pub storage: Arc<MemoryStorage>,
    pub credential: Credential,
}

pub fn harness(
    rides: Arc<FakeRideApi>,
    auth: Arc<FakeAuthApi>,
    connector: Arc<dyn Connector>,
) -> Harness {
    let health = Arc::new(FakeHealth::default());
    let payments = Arc::new(FakePayments::default());
    let storage = Arc::new(MemoryStorage::new());
    let credential = Credential::new();
    let config = ClientConfig {
        storage_dir: None,
        ..ClientConfig::default()
    };
    let app = App::with_parts(
        config,
        AppParts {
            rides: rides.clone(),
            auth: auth.clone(),
            health: health.clone(),
            payments: payments.clone(),
            connector,
            storage: storage.clone(),
            credential: credential.clone(),
        },
    );
    Harness {
        app,
        rides,
        auth,
        health,
        payments,
        storage,
        credential,
    }
}

/// A ride store for a real (non-synthetic) session.
pub fn ride_store(api: Arc<FakeRideApi>) -> (RideStore, Notifier) {
    let credential = Credential::new();
    credential.set("abc123");
    let notifier = Notifier::new();
    let monitor = ConnectivityMonitor::new(
        Arc::new(FakeHealth::default()),
        MonitorConfig::default(),
        credential,
        notifier.clone(),
    );
    (RideStore::new(api, monitor, notifier.clone()), notifier)
}
