//! Gateway API key and secret.

use crate::error::AuthError;
use secrecy::{ExposeSecret, SecretString};

const API_KEY_VAR: &str = "GATEWAY_API_KEY";
const SECRET_KEY_VAR: &str = "GATEWAY_SECRET_KEY";

/// Key pair for the gateway. `Debug` never prints the secret.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    secret_key: SecretString,
}

impl ApiCredentials {
    /// Read `GATEWAY_API_KEY` and `GATEWAY_SECRET_KEY`, after loading `.env`
    /// if one exists.
    ///
    /// # Errors
    /// See [`ApiCredentials::from_env_vars`].
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();
        Self::from_env_vars(API_KEY_VAR, SECRET_KEY_VAR)
    }

    /// Read the key pair from two named variables.
    ///
    /// # Errors
    /// `MissingCredential` for an unset variable, `EmptyCredential` for a
    /// blank one.
    pub fn from_env_vars(key_var: &str, secret_var: &str) -> Result<Self, AuthError> {
        Ok(Self::new(read_var(key_var)?, read_var(secret_var)?))
    }

    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key: SecretString::from(secret_key),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The raw secret. Only the signer should call this.
    pub fn expose_secret(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

fn read_var(name: &str) -> Result<String, AuthError> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Err(AuthError::EmptyCredential(name.to_string())),
        Ok(value) => Ok(value),
        Err(_) => Err(AuthError::MissingCredential(name.to_string())),
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}
