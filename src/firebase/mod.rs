//! Firebase backend over the public REST APIs.
//!
//! One `FirebaseBackend` is the identity provider, the document store
//! (Firestore) and the blob store (Cloud Storage). Sign-in stores the ID token
//! that authorizes the later document and storage requests.

mod firestore;
mod storage;

pub use firestore::{decode_document, encode_document};

use log::info;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::config::FirebaseConfig;
use crate::identity::{AuthError, Identity, IdentityProvider, SessionNotifier, SessionObserver};
use crate::store::StoreError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    local_id: String,
    email: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

pub struct FirebaseBackend {
    http: Client,
    api_key: String,
    project_id: String,
    storage_bucket: String,
    auth_endpoint: String,
    firestore_endpoint: String,
    storage_endpoint: String,
    id_token: RwLock<Option<String>>,
    notifier: SessionNotifier,
}

impl FirebaseBackend {
    pub fn new(config: &FirebaseConfig, api_key: String) -> Result<Self, StoreError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_key,
            project_id: config.project_id.clone(),
            storage_bucket: config.storage_bucket.clone(),
            auth_endpoint: config.auth_endpoint.trim_end_matches('/').to_string(),
            firestore_endpoint: config.firestore_endpoint.trim_end_matches('/').to_string(),
            storage_endpoint: config.storage_endpoint.trim_end_matches('/').to_string(),
            id_token: RwLock::new(None),
            notifier: SessionNotifier::new(),
        })
    }

    /// ID token of the signed-in user
    fn token(&self) -> Result<String, StoreError> {
        self.id_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::NotSignedIn)
    }

    fn set_token(&self, token: Option<String>) {
        *self.id_token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

/// Pull the `error.message` (and status) out of a failed Google API response
fn error_message(response: Response) -> String {
    let text = response.text().unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => match envelope.error.status {
            Some(status) => format!("{} ({})", envelope.error.message, status),
            None => envelope.error.message,
        },
        Err(_) => text,
    }
}

fn rejection(response: Response) -> StoreError {
    let status = response.status().as_u16();
    StoreError::Rejected {
        status,
        message: error_message(response),
    }
}

/// User-facing text for identity toolkit error codes
fn describe_sign_in_error(code: &str) -> String {
    let code = code.split([' ', ':']).next().unwrap_or_default();
    match code {
        "EMAIL_NOT_FOUND" => "No user found with the provided email.".to_string(),
        "INVALID_PASSWORD" => "Incorrect password. Please try again.".to_string(),
        "INVALID_EMAIL" => "Invalid email address.".to_string(),
        "INVALID_LOGIN_CREDENTIALS" => "Invalid email or password.".to_string(),
        "USER_DISABLED" => "This account has been disabled.".to_string(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts, please try again later.".to_string(),
        other => format!("Failed to login ({}). Please try again.", other),
    }
}

impl IdentityProvider for FirebaseBackend {
    fn authenticate(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let url = format!("{}/v1/accounts:signInWithPassword", self.auth_endpoint);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&SignInRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response);
            return if status.as_u16() == 400 {
                Err(AuthError::InvalidCredentials(describe_sign_in_error(&message)))
            } else {
                Err(AuthError::Provider(format!("{}: {}", status, message)))
            };
        }

        let body: SignInResponse = response
            .json()
            .map_err(|e| AuthError::Provider(format!("invalid sign-in response: {}", e)))?;

        let identity = Identity {
            uid: body.local_id,
            email: body.email,
        };
        self.set_token(Some(body.id_token));
        info!("Firebase sign-in for {}", identity.email);
        self.notifier.publish(Some(identity.clone()));
        Ok(identity)
    }

    fn observe_session(&self, observer: SessionObserver) {
        self.notifier.subscribe(observer);
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        self.set_token(None);
        self.notifier.publish(None);
        Ok(())
    }
}
