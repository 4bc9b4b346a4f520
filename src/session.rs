//! Single-administrator session guard.
//!
//! The guard owns the process session state. It follows the identity
//! provider's notifications and only lets a request through when the
//! signed-in identity satisfies the authorization predicate.

use log::{info, warn};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::identity::{AuthError, Identity, IdentityProvider};

/// Process-wide session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the identity provider's first notification
    Unresolved,
    Authenticated(Identity),
    Unauthenticated,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad credentials or provider failure
    #[error("login failed: {0}")]
    Auth(#[from] AuthError),
    /// Credentials were valid but the identity is not allowed in
    #[error("unauthorized email address '{email}', access denied")]
    UnauthorizedIdentity { email: String },
    /// No authorized identity is signed in; the caller should go to login
    #[error("not signed in as an authorized user, please log in")]
    NotAuthorized,
}

/// Decides whether a signed-in identity may use the admin surface
pub type AuthorizationPredicate = Box<dyn Fn(&Identity) -> bool + Send + Sync>;

/// Predicate allowing exactly one email address
pub fn single_email(email: impl Into<String>) -> AuthorizationPredicate {
    let allowed = email.into();
    Box::new(move |identity: &Identity| identity.email == allowed)
}

pub struct SessionGuard {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<RwLock<SessionState>>,
    is_allowed: AuthorizationPredicate,
}

impl SessionGuard {
    /// Create the guard and start following `provider`'s session notifications
    pub fn new(provider: Arc<dyn IdentityProvider>, is_allowed: AuthorizationPredicate) -> Self {
        let state = Arc::new(RwLock::new(SessionState::Unresolved));

        let observed = Arc::clone(&state);
        provider.observe_session(Box::new(move |identity| {
            let next = match identity {
                Some(identity) => SessionState::Authenticated(identity.clone()),
                None => SessionState::Unauthenticated,
            };
            *observed.write().unwrap_or_else(PoisonError::into_inner) = next;
        }));

        Self {
            provider,
            state,
            is_allowed,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: SessionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn is_authorized(&self) -> bool {
        self.authorize().is_ok()
    }

    /// The authorized identity, or `NotAuthorized` when the caller must log in
    pub fn authorize(&self) -> Result<Identity, SessionError> {
        match self.state() {
            SessionState::Authenticated(identity) if (self.is_allowed)(&identity) => Ok(identity),
            _ => Err(SessionError::NotAuthorized),
        }
    }

    /// Sign in and check the identity against the predicate.
    ///
    /// A valid sign-in by a disallowed identity is signed straight back out and
    /// reported as `UnauthorizedIdentity`, distinct from bad credentials.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let identity = self.provider.authenticate(email.trim(), password)?;

        if (self.is_allowed)(&identity) {
            info!("Signed in as {}", identity.email);
            self.set_state(SessionState::Authenticated(identity.clone()));
            return Ok(identity);
        }

        warn!("Signing out unauthorized identity {}", identity.email);
        if let Err(e) = self.provider.sign_out() {
            warn!("Sign-out after unauthorized login failed: {}", e);
        }
        self.set_state(SessionState::Unauthenticated);
        Err(SessionError::UnauthorizedIdentity {
            email: identity.email,
        })
    }

    pub fn sign_out(&self) -> Result<(), SessionError> {
        self.provider.sign_out()?;
        self.set_state(SessionState::Unauthenticated);
        Ok(())
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
