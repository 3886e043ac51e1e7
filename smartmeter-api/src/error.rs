use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmartmeterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The identity provider's login page had no form to submit credentials to.
    #[error("Could not find login form on authorization page: {0}")]
    AuthFormParse(String),

    /// Credentials were rejected, either at the form POST or the code exchange.
    #[error("Login failed: {0}")]
    Login(String),

    /// Still rejected after re-authenticating once.
    #[error("Unauthorized after re-authentication: {url}")]
    Unauthorized { url: String },

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("API error {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Deserialization error: {0}")]
    Deserialize(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SmartmeterError {
    /// True when the failure means the account could not be (re-)authenticated.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthFormParse(_) | Self::Login(_) | Self::Unauthorized { .. }
        )
    }
}

impl From<serde_json::Error> for SmartmeterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialize(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SmartmeterError>;
