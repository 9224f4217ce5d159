//! Authentication session management with durable persistence.
//!
//! [`AuthStore`] holds the one active identity. It is the only writer of the
//! shared [`Credential`]; the REST client and the connectivity monitor read
//! it. Storage follows the `token` / `userType` / `user|captain` layout
//! described in [`crate::storage`].

use std::sync::{Arc, RwLock};

use ridewave_shared::{
    ApiError, Credentials, FullName, Profile, RegistrationData, Role, Session,
};

use crate::api_client::{AuthApi, Credential};
use crate::offline::is_synthetic_token;
use crate::routes::Route;
use crate::storage::{
    load_json, save_json, Storage, CAPTAIN_PROFILE_KEY, RIDER_PROFILE_KEY, ROLE_KEY, TOKEN_KEY,
};

pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your details and try again.";
pub const REGISTER_FAILED_MESSAGE: &str = "Registration failed. Please try again.";
pub const ALREADY_EXISTS_MESSAGE: &str = "An account with this email already exists.";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),
    /// The server's rejection reason, or a generic failure text.
    #[error("{0}")]
    Rejected(String),
    #[error("account already exists")]
    AlreadyExists,
    #[error("not signed in")]
    NotAuthenticated,
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidInput(msg) | AuthError::Rejected(msg) => msg.clone(),
            AuthError::AlreadyExists => ALREADY_EXISTS_MESSAGE.to_string(),
            AuthError::NotAuthenticated => "Please log in to continue.".to_string(),
            AuthError::Api(e) => e.user_message().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub session: Session,
    pub landing: Route,
}

/// Registration never signs in; the caller is sent to login instead.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterOutcome {
    pub redirect: Route,
}

fn profile_key(role: Role) -> &'static str {
    match role {
        Role::Rider => RIDER_PROFILE_KEY,
        Role::Captain => CAPTAIN_PROFILE_KEY,
    }
}

fn is_duplicate(err: &ApiError) -> bool {
    matches!(err, ApiError::Conflict(_))
        || err
            .reason()
            .is_some_and(|r| r.to_lowercase().contains("already exists"))
}

pub struct AuthStore {
    api: Arc<dyn AuthApi>,
    storage: Arc<dyn Storage>,
    credential: Credential,
    synthetic_prefix: String,
    session: RwLock<Option<Session>>,
}

impl AuthStore {
    pub fn new(
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn Storage>,
        credential: Credential,
        synthetic_prefix: impl Into<String>,
    ) -> Self {
        Self {
            api,
            storage,
            credential,
            synthetic_prefix: synthetic_prefix.into(),
            session: RwLock::new(None),
        }
    }

    /// Load a persisted session, if any, and install its credential.
    pub fn restore(&self) -> Option<Session> {
        let token = self.storage.get(TOKEN_KEY)?;
        let role = self
            .storage
            .get(ROLE_KEY)
            .and_then(|r| Role::parse(&r))
            .unwrap_or(Role::Rider);

        let Some(profile) = load_json::<Profile>(self.storage.as_ref(), profile_key(role)) else {
            crate::log_warn!("Stored credential has no {} profile; discarding", role.as_str());
            self.clear_local();
            return None;
        };

        let session = Session {
            token,
            role,
            profile,
        };
        self.install(&session);
        crate::log_info!("Restored {} session for {}", role.as_str(), session.subject_id());
        Some(session)
    }

    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        role: Role,
    ) -> Result<LoginOutcome, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            return Err(AuthError::InvalidInput(
                "Email and password are required.".to_string(),
            ));
        }

        let credentials = Credentials {
            email: identifier.to_string(),
            password: secret.to_string(),
        };
        let response = self.api.login(role, &credentials).await.map_err(|e| {
            crate::log_warn!("Login as {} failed: {}", role.as_str(), e);
            if e.is_connectivity() {
                AuthError::Api(e)
            } else {
                AuthError::Rejected(e.reason().unwrap_or_else(|| LOGIN_FAILED_MESSAGE.to_string()))
            }
        })?;

        let session = Session {
            token: response.token,
            role,
            profile: response.profile,
        };
        self.persist(&session);
        self.install(&session);
        crate::log_info!("Logged in as {} {}", role.as_str(), session.subject_id());

        Ok(LoginOutcome {
            landing: Route::landing_for(role),
            session,
        })
    }

    /// Install a local-only session whose token carries the synthetic prefix.
    /// Nothing touches the network while it is active.
    pub fn login_offline(&self, identifier: &str, role: Role) -> LoginOutcome {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let session = Session {
            token: format!("{}{}", self.synthetic_prefix, id),
            role,
            profile: Profile {
                id: format!("offline-{id}"),
                email: identifier.trim().to_string(),
                fullname: FullName::default(),
                phone: None,
                rating: None,
                vehicle: None,
            },
        };
        self.persist(&session);
        self.install(&session);
        crate::log_info!("Started offline {} session", role.as_str());

        LoginOutcome {
            landing: Route::landing_for(role),
            session,
        }
    }

    pub async fn register(
        &self,
        data: &RegistrationData,
        role: Role,
    ) -> Result<RegisterOutcome, AuthError> {
        if data.email.trim().is_empty() || data.password.is_empty() {
            return Err(AuthError::InvalidInput(
                "Email and password are required.".to_string(),
            ));
        }
        if role == Role::Captain && data.vehicle.is_none() {
            return Err(AuthError::InvalidInput(
                "Vehicle details are required for captains.".to_string(),
            ));
        }

        self.api.signup(role, data).await.map_err(|e| {
            crate::log_warn!("Signup as {} failed: {}", role.as_str(), e);
            if is_duplicate(&e) {
                AuthError::AlreadyExists
            } else if e.is_connectivity() {
                AuthError::Api(e)
            } else {
                AuthError::Rejected(
                    e.reason()
                        .unwrap_or_else(|| REGISTER_FAILED_MESSAGE.to_string()),
                )
            }
        })?;

        Ok(RegisterOutcome {
            redirect: Route::login_prefilled(role, Some(data.email.trim().to_string())),
        })
    }

    /// Clear the session locally, then tell the server on a best-effort basis.
    /// Local teardown never waits on or depends on the network.
    pub async fn logout(&self) -> Option<Route> {
        let previous = self.take_session();
        self.clear_local();

        let session = previous?;
        crate::log_info!("Logged out {}", session.subject_id());

        if !is_synthetic_token(&session.token, &self.synthetic_prefix) {
            if let Err(e) = self.api.logout(session.role, &session.token).await {
                crate::log_warn!("Server-side logout failed: {}", e);
            }
        }
        Some(Route::login_for(session.role))
    }

    /// The server rejected the credential. Tears the session down once and
    /// returns the login route; with no session there is nowhere to redirect
    /// from, so `None` breaks any redirect loop.
    pub fn handle_credential_rejected(&self) -> Option<Route> {
        let session = self.take_session()?;
        self.clear_local();
        crate::log_warn!("Credential for {} rejected; session cleared", session.subject_id());
        Some(Route::login_for(session.role))
    }

    /// Apply a partial profile update once the server has confirmed it.
    pub async fn update_profile(&self, patch: &serde_json::Value) -> Result<Profile, AuthError> {
        let role = self.role().ok_or(AuthError::NotAuthenticated)?;
        if self.is_synthetic() {
            return Err(AuthError::Api(ApiError::Connectivity(
                "offline session".to_string(),
            )));
        }

        let confirmed = self.api.update_profile(role, patch).await?;
        let confirmed = serde_json::to_value(&confirmed)
            .map_err(|e| AuthError::Api(ApiError::Decode(e.to_string())))?;

        let mut guard = self.session.write().unwrap_or_else(|e| e.into_inner());
        // Logged out while the request was in flight.
        let session = guard.as_mut().ok_or(AuthError::NotAuthenticated)?;
        session
            .profile
            .merge(&confirmed)
            .map_err(|e| AuthError::Api(ApiError::Decode(e.to_string())))?;
        let profile = session.profile.clone();
        drop(guard);

        save_json(self.storage.as_ref(), profile_key(role), &profile);
        Ok(profile)
    }

    pub fn session(&self) -> Option<Session> {
        self.session.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn token(&self) -> Option<String> {
        self.session().map(|s| s.token)
    }

    pub fn role(&self) -> Option<Role> {
        self.session().map(|s| s.role)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn is_synthetic(&self) -> bool {
        self.token()
            .is_some_and(|t| is_synthetic_token(&t, &self.synthetic_prefix))
    }

    fn install(&self, session: &Session) {
        self.credential.set(session.token.clone());
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
    }

    fn take_session(&self) -> Option<Session> {
        self.session.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn persist(&self, session: &Session) {
        let storage = self.storage.as_ref();
        storage.set(TOKEN_KEY, &session.token);
        storage.set(ROLE_KEY, session.role.as_str());
        let (keep, drop_key) = match session.role {
            Role::Rider => (RIDER_PROFILE_KEY, CAPTAIN_PROFILE_KEY),
            Role::Captain => (CAPTAIN_PROFILE_KEY, RIDER_PROFILE_KEY),
        };
        if !save_json(storage, keep, &session.profile) {
            crate::log_warn!("Failed to persist {} profile", session.role.as_str());
        }
        storage.remove(drop_key);
    }

    fn clear_local(&self) {
        self.credential.clear();
        for key in [TOKEN_KEY, ROLE_KEY, RIDER_PROFILE_KEY, CAPTAIN_PROFILE_KEY] {
            self.storage.remove(key);
        }
    }
}
