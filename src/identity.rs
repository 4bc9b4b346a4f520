//! Identity provider seam and the local account provider.

use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// A signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

/// Identity provider errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential pair was rejected
    #[error("{0}")]
    InvalidCredentials(String),
    /// The provider could not be reached or answered unexpectedly
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Called with the current identity whenever the session changes
pub type SessionObserver = Box<dyn Fn(Option<&Identity>) + Send + Sync>;

pub trait IdentityProvider: Send + Sync {
    /// Sign in with an email/password pair
    fn authenticate(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Register an observer. It is called once right away with the current
    /// identity and again on every sign-in or sign-out.
    fn observe_session(&self, observer: SessionObserver);

    fn sign_out(&self) -> Result<(), AuthError>;
}

/// Holds the provider-side session and fans out changes to observers
#[derive(Default)]
pub struct SessionNotifier {
    current: Mutex<Option<Identity>>,
    observers: Mutex<Vec<SessionObserver>>,
}

impl SessionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Identity> {
        lock(&self.current).clone()
    }

    pub fn subscribe(&self, observer: SessionObserver) {
        let current = self.current();
        observer(current.as_ref());
        lock(&self.observers).push(observer);
    }

    pub fn publish(&self, identity: Option<Identity>) {
        *lock(&self.current) = identity.clone();
        for observer in lock(&self.observers).iter() {
            observer(identity.as_ref());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identity provider backed by a fixed table of accounts (email -> password)
pub struct LocalIdentityProvider {
    accounts: HashMap<String, String>,
    notifier: SessionNotifier,
}

impl LocalIdentityProvider {
    pub fn new<I, E, P>(accounts: I) -> Self
    where
        I: IntoIterator<Item = (E, P)>,
        E: Into<String>,
        P: Into<String>,
    {
        Self {
            accounts: accounts
                .into_iter()
                .map(|(email, password)| (email.into().trim().to_lowercase(), password.into()))
                .collect(),
            notifier: SessionNotifier::new(),
        }
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn authenticate(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(AuthError::InvalidCredentials(
                "Invalid email address.".to_string(),
            ));
        }

        let key = email.to_lowercase();
        match self.accounts.get(&key) {
            None => Err(AuthError::InvalidCredentials(
                "No user found with the provided email.".to_string(),
            )),
            Some(expected) if expected != password => Err(AuthError::InvalidCredentials(
                "Incorrect password. Please try again.".to_string(),
            )),
            Some(_) => {
                let identity = Identity {
                    uid: format!("local:{}", key),
                    email: key,
                };
                debug!("Local sign-in for {}", identity.email);
                self.notifier.publish(Some(identity.clone()));
                Ok(identity)
            }
        }
    }

    fn observe_session(&self, observer: SessionObserver) {
        self.notifier.subscribe(observer);
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        self.notifier.publish(None);
        Ok(())
    }
}
