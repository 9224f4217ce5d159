//! Application bootstrap.
//!
//! [`App`] constructs and owns every long-lived piece: one dispatcher, one
//! transport, one connectivity monitor, the auth and ride stores, and the
//! notification channel. Session activation and teardown happen here and
//! nowhere else.

use std::sync::{Arc, Mutex};

use ridewave_shared::{
    ApiError, Coordinates, FareEstimate, Profile, RegistrationData, Ride, RideDraft, Role,
    Session, VehicleType,
};

use crate::api_client::{ApiClient, AuthApi, Credential, HealthProbe, PaymentApi, RideApi};
use crate::auth_session::{AuthError, AuthStore, LoginOutcome, RegisterOutcome};
use crate::config::ClientConfig;
use crate::dispatcher::EventDispatcher;
use crate::notify::Notifier;
use crate::offline::ConnectivityMonitor;
use crate::routes::Route;
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::stores::{RideError, RideStore};
use crate::ws::{Connector, Transport, TungsteniteConnector};

/// The collaborators [`App`] is assembled from. [`App::new`] wires the real
/// ones; tests pass fakes.
pub struct AppParts {
    pub rides: Arc<dyn RideApi>,
    pub auth: Arc<dyn AuthApi>,
    pub health: Arc<dyn HealthProbe>,
    pub payments: Arc<dyn PaymentApi>,
    pub connector: Arc<dyn Connector>,
    pub storage: Arc<dyn Storage>,
    /// Must be the credential the REST client reads.
    pub credential: Credential,
}

pub struct App {
    config: ClientConfig,
    notifier: Notifier,
    dispatcher: EventDispatcher,
    auth: AuthStore,
    rides: RideStore,
    transport: Transport,
    monitor: ConnectivityMonitor,
    payments: Arc<dyn PaymentApi>,
    redirect: Mutex<Option<Route>>,
}

impl App {
    pub fn new(config: ClientConfig) -> Self {
        let credential = Credential::new();
        let api = Arc::new(
            ApiClient::new(config.api_url.clone())
                .with_timeout(config.request_timeout)
                .with_credential(credential.clone())
                .with_health_path(config.health_path.clone())
                .with_local_fare_fallback(config.local_fare_fallback),
        );
        let storage: Arc<dyn Storage> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStorage::new(dir.clone())),
            None => Arc::new(MemoryStorage::new()),
        };

        let parts = AppParts {
            rides: api.clone(),
            auth: api.clone(),
            health: api.clone(),
            payments: api,
            connector: Arc::new(TungsteniteConnector),
            storage,
            credential,
        };
        Self::with_parts(config, parts)
    }

    pub fn with_parts(config: ClientConfig, parts: AppParts) -> Self {
        let notifier = Notifier::new();
        let dispatcher = EventDispatcher::new();
        let prefix = config.monitor.synthetic_prefix.clone();

        let monitor = ConnectivityMonitor::new(
            parts.health,
            config.monitor.clone(),
            parts.credential.clone(),
            notifier.clone(),
        );
        let auth = AuthStore::new(parts.auth, parts.storage, parts.credential, prefix.clone());
        let rides = RideStore::new(parts.rides, monitor.clone(), notifier.clone());
        let transport = Transport::new(
            config.ws_url.clone(),
            config.reconnect.clone(),
            prefix,
            parts.connector,
            dispatcher.clone(),
            notifier.clone(),
        );

        Self {
            config,
            notifier,
            dispatcher,
            auth,
            rides,
            transport,
            monitor,
            payments: parts.payments,
            redirect: Mutex::new(None),
        }
    }

    /// Restore a persisted session, start liveness checks and, for a restored
    /// session, the real-time channel. Must run inside a tokio runtime.
    pub fn start(&self) -> Option<Session> {
        let session = self.auth.restore();
        self.monitor.start();
        if let Some(session) = &session {
            self.activate(session);
        }
        session
    }

    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        role: Role,
    ) -> Result<LoginOutcome, AuthError> {
        let result = self.auth.login(identifier, secret, role).await;
        match &result {
            Ok(outcome) => {
                self.deactivate();
                self.activate(&outcome.session);
            }
            Err(e) => {
                self.notifier.error(e.user_message());
            }
        }
        result
    }

    /// Explore the app with a local-only session; no network traffic happens
    /// until a real login.
    pub fn login_offline(&self, identifier: &str, role: Role) -> LoginOutcome {
        let outcome = self.auth.login_offline(identifier, role);
        self.deactivate();
        self.activate(&outcome.session);
        self.notifier
            .info("Offline mode: rides cannot be booked until you log in.");
        outcome
    }

    pub async fn register(
        &self,
        data: &RegistrationData,
        role: Role,
    ) -> Result<RegisterOutcome, AuthError> {
        let result = self.auth.register(data, role).await;
        if let Err(e) = &result {
            self.notifier.error(e.user_message());
        }
        result
    }

    /// End the session. Local state is gone before the server is contacted.
    pub async fn logout(&self) -> Option<Route> {
        self.deactivate();
        self.auth.logout().await
    }

    /// The backend rejected the credential: tear the session down once and
    /// return the login route. Later calls without a session return `None`.
    pub fn handle_auth_failure(&self) -> Option<Route> {
        let route = self.auth.handle_credential_rejected()?;
        self.deactivate();
        self.notifier
            .warn(ApiError::Unauthorized(String::new()).user_message());
        *self.redirect.lock().unwrap_or_else(|e| e.into_inner()) = Some(route.clone());
        Some(route)
    }

    /// Route the shell should navigate to after an auth failure, if any.
    pub fn take_redirect(&self) -> Option<Route> {
        self.redirect.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Stop background work, keeping the persisted session.
    pub fn shutdown(&self) {
        self.monitor.stop();
        self.rides.detach();
        self.transport.teardown();
        crate::log_info!("Shut down");
    }

    pub async fn fetch_active_ride(&self) -> Result<Option<Ride>, RideError> {
        let result = self.rides.fetch_active_ride().await;
        self.check_auth(result)
    }

    pub async fn fetch_ride_history(&self) -> Vec<Ride> {
        let result = self.rides.try_fetch_ride_history().await;
        self.check_auth(result).unwrap_or_default()
    }

    pub async fn request_ride(&self, draft: &RideDraft) -> Result<Ride, RideError> {
        let result = self.rides.request_ride(draft).await;
        self.check_auth(result)
    }

    pub async fn cancel_ride(&self, ride_id: &str) -> Result<(), RideError> {
        let result = self.rides.cancel_ride(ride_id).await;
        self.check_auth(result)
    }

    pub async fn rate_ride(
        &self,
        ride_id: &str,
        value: u8,
        comment: Option<String>,
    ) -> Result<(), RideError> {
        let result = self.rides.rate_ride(ride_id, value, comment).await;
        self.check_auth(result)
    }

    pub async fn estimated_fare(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        vehicle_type: Option<VehicleType>,
    ) -> Result<FareEstimate, RideError> {
        let result = self
            .rides
            .estimated_fare(origin, destination, vehicle_type)
            .await;
        self.check_auth(result)
    }

    pub async fn update_profile(&self, patch: &serde_json::Value) -> Result<Profile, AuthError> {
        let result = self.auth.update_profile(patch).await;
        match &result {
            Err(AuthError::Api(e)) if e.is_unauthorized() => {
                self.handle_auth_failure();
            }
            Err(e) => {
                self.notifier.error(e.user_message());
            }
            Ok(_) => {}
        }
        result
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn rides(&self) -> &RideStore {
        &self.rides
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn payments(&self) -> &Arc<dyn PaymentApi> {
        &self.payments
    }

    fn check_auth<T>(&self, result: Result<T, RideError>) -> Result<T, RideError> {
        if let Err(e) = &result {
            if e.is_unauthorized() {
                self.handle_auth_failure();
            }
        }
        result
    }

    fn activate(&self, session: &Session) {
        // Offline sessions get no pushes, so nothing to subscribe to.
        if !self.monitor.is_offline_mode() {
            self.rides.attach(&self.dispatcher);
        }
        if !self.transport.initialize(session) {
            crate::log_info!("Real-time channel not started for this session");
        }
    }

    fn deactivate(&self) {
        self.rides.detach();
        self.transport.teardown();
        self.rides.reset();
    }
}
