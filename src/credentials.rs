//! OAuth 1.0a credentials.
//!
//! Both secrets are wrapped in `SecretString` so they never show up in
//! `Debug` output and are zeroed on drop.

use secrecy::{ExposeSecret, SecretString};

/// Consumer and access-token credentials for signing brokerage requests.
///
/// There is no `Default`; a signer is always built from explicit credentials.
#[derive(Clone)]
pub struct Credentials {
    consumer_key: String,
    consumer_secret: SecretString,
    access_token: String,
    access_token_secret: SecretString,
}

impl Credentials {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: SecretString::from(consumer_secret.into()),
            access_token: access_token.into(),
            access_token_secret: SecretString::from(access_token_secret.into()),
        }
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Only for building the signing key. Never log the return value.
    pub(crate) fn consumer_secret(&self) -> &str {
        self.consumer_secret.expose_secret()
    }

    /// Only for building the signing key. Never log the return value.
    pub(crate) fn access_token_secret(&self) -> &str {
        self.access_token_secret.expose_secret()
    }

    /// True when any of the four values is empty. Such credentials still sign,
    /// the brokerage just rejects the request.
    pub fn is_incomplete(&self) -> bool {
        self.consumer_key.is_empty()
            || self.access_token.is_empty()
            || self.consumer_secret().is_empty()
            || self.access_token_secret().is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[REDACTED]")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"[REDACTED]")
            .finish()
    }
}
