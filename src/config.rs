use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Documents and media on the local filesystem
    Local,
    /// Firebase Authentication, Firestore and Cloud Storage
    Firebase,
}

impl BackendKind {
    /// Name used in the config file, also the name of its settings section
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Firebase => "firebase",
        }
    }

    pub fn missing_section_error(&self) -> String {
        format!(
            "backend is \"{0}\" but [{0}] section is missing in config",
            self.name()
        )
    }
}

fn default_login_profile() -> String {
    "default".to_string()
}

fn default_auth_endpoint() -> String {
    "https://identitytoolkit.googleapis.com".to_string()
}

fn default_firestore_endpoint() -> String {
    "https://firestore.googleapis.com".to_string()
}

fn default_storage_endpoint() -> String {
    "https://firebasestorage.googleapis.com".to_string()
}

/// Application configuration file structure
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Which backend stores lessons
    pub backend: BackendKind,
    /// The only email address allowed to upload content
    pub authorized_email: String,
    /// Credential profile holding the login email/password (default: "default")
    #[serde(default = "default_login_profile")]
    pub login_profile: String,
    /// Local backend settings (maps to [local] section in TOML)
    pub local: Option<LocalConfig>,
    /// Firebase backend settings (maps to [firebase] section in TOML)
    pub firebase: Option<FirebaseConfig>,
}

/// Local filesystem backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Directory holding `documents/` and `blobs/`
    pub root_dir: PathBuf,
    /// Base URL that serves the `blobs/` directory (default: file:// URLs)
    pub public_base_url: Option<String>,
}

/// Firebase backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseConfig {
    pub project_id: String,
    /// Cloud Storage bucket, e.g. my-project.appspot.com
    pub storage_bucket: String,
    /// Credential profile name to look up the API key from the credentials file
    pub credential_profile: String,
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: String,
    #[serde(default = "default_firestore_endpoint")]
    pub firestore_endpoint: String,
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the section for the selected backend exists and the
    /// authorized email is set.
    pub fn validate(&self) -> Result<(), String> {
        if self.authorized_email.trim().is_empty() {
            return Err("authorized_email must not be empty".to_string());
        }

        match self.backend {
            BackendKind::Local if self.local.is_none() => Err(self.backend.missing_section_error()),
            BackendKind::Firebase => match &self.firebase {
                None => Err(self.backend.missing_section_error()),
                Some(fb) if fb.project_id.trim().is_empty() || fb.storage_bucket.trim().is_empty() => {
                    Err("[firebase] project_id and storage_bucket must be set".to_string())
                }
                Some(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_config() {
        let config: AppConfig = toml::from_str(
            r#"
            backend = "local"
            authorized_email = "admin@example.com"

            [local]
            root_dir = "data"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.login_profile, "default");
        assert_eq!(config.local.as_ref().unwrap().root_dir, PathBuf::from("data"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_firebase_defaults_and_validation() {
        let config: AppConfig = toml::from_str(
            r#"
            backend = "firebase"
            authorized_email = "admin@example.com"
            login_profile = "admin"

            [firebase]
            project_id = "demo"
            storage_bucket = "demo.appspot.com"
            credential_profile = "prod"
            "#,
        )
        .unwrap();

        let fb = config.firebase.as_ref().unwrap();
        assert_eq!(fb.auth_endpoint, "https://identitytoolkit.googleapis.com");
        assert_eq!(fb.storage_endpoint, "https://firebasestorage.googleapis.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_backend_section() {
        let config: AppConfig = toml::from_str(
            r#"
            backend = "firebase"
            authorized_email = "admin@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.validate().unwrap_err(),
            "backend is \"firebase\" but [firebase] section is missing in config"
        );

        let config: AppConfig = toml::from_str(
            r#"
            backend = "local"
            authorized_email = "admin@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.validate().unwrap_err(),
            BackendKind::Local.missing_section_error()
        );
        assert!(BackendKind::Local.missing_section_error().contains("[local]"));

        let config: AppConfig = toml::from_str(
            r#"
            backend = "local"
            authorized_email = " "
            [local]
            root_dir = "x"
            "#,
        )
        .unwrap();
        assert!(config.validate().unwrap_err().contains("authorized_email"));
    }
}
