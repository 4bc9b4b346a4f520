use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Credentials file structure
///
/// Format:
/// ```toml
/// [firebase.profile_name]
/// api_key = "your_web_api_key"
///
/// [login.profile_name]
/// email = "admin@example.com"
/// password = "your_password"
///
/// # accounts accepted by the local backend
/// [accounts."admin@example.com"]
/// password = "your_password"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Credentials {
    #[serde(default)]
    pub firebase: HashMap<String, ApiKeyProfile>,
    #[serde(default)]
    pub login: HashMap<String, LoginProfile>,
    #[serde(default)]
    pub accounts: HashMap<String, AccountProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyProfile {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginProfile {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountProfile {
    pub password: String,
}

/// Get the default credentials file path: ~/.config/lesson_admin/credentials.toml
pub fn get_credentials_path() -> Result<PathBuf, String> {
    let home = std::env::var("HOME").map_err(|_| "HOME environment variable not set".to_string())?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("lesson_admin")
        .join("credentials.toml"))
}

/// Load credentials from `path`
/// Returns None if the file doesn't exist
pub fn load_credentials(
    path: &Path,
) -> Result<Option<Credentials>, Box<dyn std::error::Error + Send + Sync>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let credentials: Credentials = toml::from_str(&content)?;

    Ok(Some(credentials))
}

fn lookup<'a, T>(
    credentials: &'a Option<Credentials>,
    section: &str,
    select: impl Fn(&'a Credentials) -> &'a HashMap<String, T>,
    profile: &str,
) -> Result<&'a T, String> {
    match credentials {
        Some(creds) => select(creds).get(profile).ok_or_else(|| {
            format!(
                "Credential profile '[{}.{}]' not found in credentials file",
                section, profile
            )
        }),
        None => Err("Credentials file not found".to_string()),
    }
}

/// Firebase web API key for a profile
pub fn get_api_key(credentials: &Option<Credentials>, profile: &str) -> Result<String, String> {
    lookup(credentials, "firebase", |c| &c.firebase, profile).map(|p| p.api_key.clone())
}

/// Login email/password for a profile
pub fn get_login(credentials: &Option<Credentials>, profile: &str) -> Result<LoginProfile, String> {
    lookup(credentials, "login", |c| &c.login, profile).cloned()
}

/// (email, password) pairs for the local identity provider
pub fn local_accounts(credentials: &Option<Credentials>) -> Vec<(String, String)> {
    credentials
        .iter()
        .flat_map(|c| c.accounts.iter())
        .map(|(email, account)| (email.clone(), account.password.clone()))
        .collect()
}
