//! Ride store: the current ride and the rider's history.
//!
//! REST results give the baseline; `ride_update` and `captain_location`
//! pushes arriving through the [`EventDispatcher`] keep it current. Every
//! mutating operation is confirm-then-apply: local state changes only after
//! the server accepted the request.
//!
//! Responses can resolve in any order, so each write to the active ride bumps
//! a revision. A fetch whose baseline was overtaken by a newer write (a push,
//! a request, a cancel) is discarded instead of clobbering it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use ridewave_shared::{
    ApiError, CaptainLocation, Coordinates, FareEstimate, RatingRequest, Ride, RideDraft,
    RideRating, RideStatus, ServerEvent, VehicleType, EVENT_CAPTAIN_LOCATION, EVENT_RIDE_UPDATE,
};
use tokio::sync::watch;

use crate::api_client::{fare_query, RideApi};
use crate::dispatcher::{EventDispatcher, SubscriptionId};
use crate::notify::Notifier;
use crate::offline::ConnectivityMonitor;

/// Progress of one store operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OpStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// What views render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideState {
    pub active: Option<Ride>,
    pub history: Vec<Ride>,
    pub active_status: OpStatus,
    pub history_status: OpStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Authentication,
    Validation,
    Server,
    /// The request conflicts with local ride state.
    State,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RideError {
    #[error("{0}")]
    Validation(String),
    #[error("a ride is already active")]
    AlreadyActive,
    #[error("no active ride")]
    NoActiveRide,
    #[error("ride {requested} is not the active ride ({active})")]
    RideMismatch { requested: String, active: String },
    #[error("a {0} ride cannot be cancelled")]
    NotCancellable(RideStatus),
    #[error("no server session")]
    Offline,
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl RideError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RideError::Validation(_) => ErrorKind::Validation,
            RideError::AlreadyActive
            | RideError::NoActiveRide
            | RideError::RideMismatch { .. }
            | RideError::NotCancellable(_) => ErrorKind::State,
            RideError::Offline => ErrorKind::Connectivity,
            RideError::Api(e) => match e {
                ApiError::Connectivity(_) => ErrorKind::Connectivity,
                ApiError::Unauthorized(_) => ErrorKind::Authentication,
                ApiError::Validation(_) | ApiError::NotFound(_) | ApiError::Conflict(_) => {
                    ErrorKind::Validation
                }
                ApiError::Server { .. } | ApiError::Decode(_) => ErrorKind::Server,
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }

    pub fn user_message(&self) -> String {
        match self {
            RideError::Validation(msg) => format!("Please check your trip details: {msg}."),
            RideError::AlreadyActive => "You already have an active ride.".to_string(),
            RideError::NoActiveRide => "You have no active ride.".to_string(),
            RideError::RideMismatch { .. } => "That ride is no longer your active ride.".to_string(),
            RideError::NotCancellable(_) => "This ride can no longer be cancelled.".to_string(),
            RideError::Offline => {
                "You are using an offline session. Log in to book rides.".to_string()
            }
            RideError::Api(ApiError::Validation(reason)) if !reason.trim().is_empty() => {
                format!("The ride request was rejected: {reason}")
            }
            RideError::Api(e) => e.user_message().to_string(),
        }
    }
}

#[derive(Default)]
struct Inner {
    view: RideState,
    /// Bumped on every write to `view.active`.
    revision: u64,
    /// Bumped by `reset`; results started under an older epoch are dropped.
    epoch: u64,
    /// Rides known to have ended. Late non-terminal pushes for them are stale.
    closed: HashSet<String>,
    request_in_flight: bool,
}

impl Inner {
    fn set_active(&mut self, ride: Option<Ride>) {
        self.view.active = ride;
        self.revision += 1;
    }

    fn upsert_history(&mut self, ride: Ride) {
        match self.view.history.iter_mut().find(|r| r.id == ride.id) {
            Some(existing) => *existing = ride,
            None => self.view.history.insert(0, ride),
        }
    }

    fn close(&mut self, ride: Ride) {
        if self.view.active.as_ref().is_some_and(|r| r.id == ride.id) {
            self.set_active(None);
        }
        self.closed.insert(ride.id.clone());
        self.upsert_history(ride);
    }

    /// Pushed snapshots replace the active ride wholesale.
    fn apply_ride_update(&mut self, ride: Ride) -> bool {
        if ride.status.is_terminal() {
            crate::log_debug!("ride {} ended ({})", ride.id, ride.status);
            self.close(ride);
            return true;
        }
        if self.closed.contains(&ride.id) {
            crate::log_debug!("ignoring stale push for closed ride {}", ride.id);
            return false;
        }

        let tracked = self.view.active.as_ref().map(|r| r.id.clone());
        match tracked {
            Some(id) if id == ride.id => {
                self.set_active(Some(ride));
                true
            }
            None => {
                crate::log_debug!("adopting pushed ride {}", ride.id);
                self.set_active(Some(ride));
                true
            }
            Some(id) => {
                crate::log_debug!("ignoring push for ride {} while {} is active", ride.id, id);
                false
            }
        }
    }

    fn apply_captain_location(&mut self, update: &CaptainLocation) -> bool {
        if !update.location.is_valid() {
            return false;
        }
        let Some(active) = self.view.active.as_mut() else {
            return false;
        };
        if update.ride_id.as_ref().is_some_and(|id| *id != active.id) {
            return false;
        }
        active.captain_live_location = Some(update.location);
        self.revision += 1;
        true
    }
}

struct Shared {
    inner: Mutex<Inner>,
    changes: watch::Sender<RideState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate under the lock and notify watchers if the view changed.
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.lock();
        let result = f(&mut inner);
        let view = inner.view.clone();
        drop(inner);
        self.changes.send_if_modified(|current| {
            if *current != view {
                *current = view;
                true
            } else {
                false
            }
        });
        result
    }
}

/// Clears the in-flight request marker however the request ends.
struct RequestGuard<'a>(&'a Shared);

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().request_in_flight = false;
    }
}

struct Attachment {
    dispatcher: EventDispatcher,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
}

pub struct RideStore {
    api: Arc<dyn RideApi>,
    monitor: ConnectivityMonitor,
    notifier: Notifier,
    shared: Arc<Shared>,
    attachment: Mutex<Option<Attachment>>,
}

impl RideStore {
    pub fn new(api: Arc<dyn RideApi>, monitor: ConnectivityMonitor, notifier: Notifier) -> Self {
        let (changes, _) = watch::channel(RideState::default());
        Self {
            api,
            monitor,
            notifier,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                changes,
            }),
            attachment: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> RideState {
        self.shared.lock().view.clone()
    }

    pub fn active_ride(&self) -> Option<Ride> {
        self.shared.lock().view.active.clone()
    }

    pub fn history(&self) -> Vec<Ride> {
        self.shared.lock().view.history.clone()
    }

    /// Watch every change to the rendered state.
    pub fn watch(&self) -> watch::Receiver<RideState> {
        self.shared.changes.subscribe()
    }

    /// Load the current non-terminal ride. "No active ride" is a normal,
    /// absent result.
    pub async fn fetch_active_ride(&self) -> Result<Option<Ride>, RideError> {
        if self.monitor.is_offline_mode() {
            return Ok(None);
        }

        let (revision, epoch) = self.shared.update(|s| {
            s.view.active_status = OpStatus::Loading;
            (s.revision, s.epoch)
        });

        let found = match self.api.active_ride().await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                let err = RideError::from(e);
                crate::log_warn!("Failed to fetch active ride: {}", err);
                self.shared.update(|s| {
                    if s.epoch == epoch {
                        s.view.active_status = OpStatus::Error(err.user_message());
                    }
                });
                self.report(&err);
                return Err(err);
            }
        };

        Ok(self.shared.update(|s| {
            if s.epoch != epoch {
                return None;
            }
            s.view.active_status = OpStatus::Ready;
            if s.revision != revision {
                crate::log_debug!("active ride changed during fetch; keeping newer state");
                return s.view.active.clone();
            }
            match found {
                Some(ride) if ride.status.is_terminal() => {
                    s.close(ride);
                    None
                }
                found => {
                    s.set_active(found.clone());
                    found
                }
            }
        }))
    }

    /// Load past rides. Never fails: on error the history is empty and the
    /// user is notified.
    pub async fn fetch_ride_history(&self) -> Vec<Ride> {
        self.try_fetch_ride_history().await.unwrap_or_default()
    }

    /// Like [`fetch_ride_history`](Self::fetch_ride_history), but hands the
    /// failure back so the session owner can react to a rejected credential.
    /// The history is emptied on error either way.
    pub async fn try_fetch_ride_history(&self) -> Result<Vec<Ride>, RideError> {
        if self.monitor.is_offline_mode() {
            return Ok(Vec::new());
        }

        let epoch = self.shared.update(|s| {
            s.view.history_status = OpStatus::Loading;
            s.epoch
        });

        match self.api.ride_history().await {
            Ok(rides) => Ok(self.shared.update(|s| {
                if s.epoch != epoch {
                    return Vec::new();
                }
                s.view.history = rides.clone();
                s.view.history_status = OpStatus::Ready;
                rides
            })),
            Err(e) => {
                let err = RideError::from(e);
                crate::log_warn!("Failed to fetch ride history: {}", err);
                self.report(&err);
                self.shared.update(|s| {
                    if s.epoch == epoch {
                        s.view.history.clear();
                        s.view.history_status = OpStatus::Error(err.user_message());
                    }
                });
                Err(err)
            }
        }
    }

    /// Book a ride. Missing or malformed coordinates are rejected before
    /// anything is sent, as is a second request while a ride is active.
    pub async fn request_ride(&self, draft: &RideDraft) -> Result<Ride, RideError> {
        let request = draft.validate().map_err(RideError::Validation)?;
        if self.monitor.is_offline_mode() {
            return Err(RideError::Offline);
        }

        let (revision, epoch) = {
            let mut inner = self.shared.lock();
            if inner.view.active.is_some() || inner.request_in_flight {
                return Err(RideError::AlreadyActive);
            }
            inner.request_in_flight = true;
            (inner.revision, inner.epoch)
        };
        let _guard = RequestGuard(&self.shared);

        match self.api.request_ride(&request).await {
            Ok(ride) => {
                crate::log_info!("Requested ride {}", ride.id);
                self.shared.update(|s| {
                    if s.epoch != epoch {
                        return;
                    }
                    // Pushes that landed while the request was in flight are newer.
                    if s.revision != revision || s.closed.contains(&ride.id) {
                        crate::log_debug!(
                            "ride {} changed during request; keeping pushed state",
                            ride.id
                        );
                        return;
                    }
                    s.set_active(Some(ride.clone()));
                });
                Ok(ride)
            }
            Err(e) => {
                let err = RideError::from(e);
                crate::log_warn!("Ride request failed: {}", err);
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Cancel the active ride. Refuses to touch any other ride.
    pub async fn cancel_ride(&self, ride_id: &str) -> Result<(), RideError> {
        let active = self.active_ride().ok_or(RideError::NoActiveRide)?;
        if active.id != ride_id {
            return Err(RideError::RideMismatch {
                requested: ride_id.to_string(),
                active: active.id,
            });
        }
        if !active.status.can_transition_to(&RideStatus::Cancelled) {
            return Err(RideError::NotCancellable(active.status));
        }
        if self.monitor.is_offline_mode() {
            return Err(RideError::Offline);
        }

        let epoch = self.shared.lock().epoch;
        match self.api.cancel_ride(ride_id).await {
            Ok(echo) => {
                let mut cancelled = echo.unwrap_or(active);
                cancelled.status = RideStatus::Cancelled;
                crate::log_info!("Cancelled ride {}", cancelled.id);
                self.shared.update(|s| {
                    if s.epoch == epoch {
                        s.close(cancelled);
                    }
                });
                Ok(())
            }
            Err(e) => {
                let err = RideError::from(e);
                crate::log_warn!("Cancel of ride {} failed: {}", ride_id, err);
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Rate a finished ride. The rating shows up locally only once the server
    /// has accepted it.
    pub async fn rate_ride(
        &self,
        ride_id: &str,
        value: u8,
        comment: Option<String>,
    ) -> Result<(), RideError> {
        if !(1..=5).contains(&value) {
            return Err(RideError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }
        if self.monitor.is_offline_mode() {
            return Err(RideError::Offline);
        }

        let comment = comment.filter(|c| !c.trim().is_empty());
        let rating = RatingRequest {
            rating: value,
            comment: comment.clone(),
        };
        let epoch = self.shared.lock().epoch;
        if let Err(e) = self.api.rate_ride(ride_id, &rating).await {
            let err = RideError::from(e);
            crate::log_warn!("Rating ride {} failed: {}", ride_id, err);
            self.report(&err);
            return Err(err);
        }

        let confirmed = RideRating { value, comment };
        self.shared.update(|s| {
            if s.epoch != epoch {
                return;
            }
            for ride in s.view.history.iter_mut().filter(|r| r.id == ride_id) {
                ride.rating = Some(confirmed.clone());
            }
            if let Some(active) = s.view.active.as_mut().filter(|r| r.id == ride_id) {
                active.rating = Some(confirmed.clone());
            }
        });
        Ok(())
    }

    /// Quote a trip. Pure read; the store never substitutes a value on
    /// failure.
    pub async fn estimated_fare(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        vehicle_type: Option<VehicleType>,
    ) -> Result<FareEstimate, RideError> {
        if !origin.is_valid() || !destination.is_valid() {
            return Err(RideError::Validation(
                "pickup and dropoff need valid coordinates".to_string(),
            ));
        }
        if self.monitor.is_offline_mode() {
            return Err(RideError::Offline);
        }

        self.api
            .estimate_fare(&fare_query(origin, destination, vehicle_type))
            .await
            .map_err(|e| {
                let err = RideError::from(e);
                crate::log_warn!("Fare estimate failed: {}", err);
                self.report(&err);
                err
            })
    }

    /// Surface a failure to the user. Credential rejections are left to the
    /// session owner, which tears the session down and says so once.
    fn report(&self, err: &RideError) {
        if !err.is_unauthorized() {
            self.notifier.error(err.user_message());
        }
    }

    pub fn apply_ride_update(&self, ride: Ride) -> bool {
        self.shared.update(|s| s.apply_ride_update(ride))
    }

    pub fn apply_captain_location(&self, update: &CaptainLocation) -> bool {
        self.shared.update(|s| s.apply_captain_location(update))
    }

    /// Subscribe to ride pushes. Re-attaching replaces earlier subscriptions.
    pub fn attach(&self, dispatcher: &EventDispatcher) {
        self.detach();

        let shared = Arc::clone(&self.shared);
        let on_ride = dispatcher.subscribe(EVENT_RIDE_UPDATE, move |event| {
            if let ServerEvent::RideUpdate(ride) = event {
                shared.update(|s| s.apply_ride_update(ride.clone()));
            }
            Ok(())
        });

        let shared = Arc::clone(&self.shared);
        let on_location = dispatcher.subscribe(EVENT_CAPTAIN_LOCATION, move |event| {
            if let ServerEvent::CaptainLocation(update) = event {
                if !shared.update(|s| s.apply_captain_location(update)) {
                    crate::log_debug!("dropped unattributable captain location");
                }
            }
            Ok(())
        });

        *self.attachment.lock().unwrap_or_else(|e| e.into_inner()) = Some(Attachment {
            dispatcher: dispatcher.clone(),
            subscriptions: vec![
                (EVENT_RIDE_UPDATE, on_ride),
                (EVENT_CAPTAIN_LOCATION, on_location),
            ],
        });
    }

    /// Drop this store's subscriptions. Safe to call when not attached.
    pub fn detach(&self) {
        let attachment = self.attachment.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(Attachment {
            dispatcher,
            subscriptions,
        }) = attachment
        {
            for (event, id) in subscriptions {
                dispatcher.unsubscribe(event, Some(id));
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attachment
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Forget everything (session ended). Results of operations still in
    /// flight are discarded when they land.
    pub fn reset(&self) {
        self.shared.update(|s| {
            let epoch = s.epoch + 1;
            *s = Inner {
                epoch,
                ..Inner::default()
            };
        });
    }
}
