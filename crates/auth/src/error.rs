use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential variable {0} is not set")]
    MissingCredential(String),

    #[error("credential variable {0} is empty")]
    EmptyCredential(String),

    /// HMAC rejected the secret as key material.
    #[error("secret cannot be used as a signing key")]
    InvalidSigningKey,
}
