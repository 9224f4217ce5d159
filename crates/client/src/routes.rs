//! Navigation targets the stores hand back to the shell.

use ridewave_shared::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    // Landing pages
    Home,
    CaptainHome,

    // Auth routes
    Login { prefill_email: Option<String> },
    CaptainLogin { prefill_email: Option<String> },
    Signup,
    CaptainSignup,

    Riding,
    CaptainRiding,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/home",
            Route::CaptainHome => "/captain-home",
            Route::Login { .. } => "/login",
            Route::CaptainLogin { .. } => "/captain-login",
            Route::Signup => "/signup",
            Route::CaptainSignup => "/captain-signup",
            Route::Riding => "/riding",
            Route::CaptainRiding => "/captain-riding",
        }
    }

    /// Where a freshly authenticated session lands.
    pub fn landing_for(role: Role) -> Self {
        match role {
            Role::Rider => Route::Home,
            Role::Captain => Route::CaptainHome,
        }
    }

    pub fn login_for(role: Role) -> Self {
        Self::login_prefilled(role, None)
    }

    pub fn login_prefilled(role: Role, prefill_email: Option<String>) -> Self {
        match role {
            Role::Rider => Route::Login { prefill_email },
            Role::Captain => Route::CaptainLogin { prefill_email },
        }
    }

    /// Routes reachable without a session. Redirecting to one of these can
    /// never bounce back to login.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Route::Login { .. } | Route::CaptainLogin { .. } | Route::Signup | Route::CaptainSignup
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_routes() {
        assert_eq!(Route::landing_for(Role::Rider).path(), "/home");
        assert_eq!(Route::landing_for(Role::Captain).path(), "/captain-home");
        assert!(Route::login_for(Role::Captain).is_public());
        assert!(!Route::Home.is_public());
    }
}
