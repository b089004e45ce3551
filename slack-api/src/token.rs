//! Access tokens
//!
//! Tokens are wiped from memory on drop and never printed.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A Slack token (`xoxb-`, `xoxp-`, or a public file token).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token value. Keep the borrow short.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Adds `Authorization: Bearer <token>` to a request
    pub(crate) fn set_auth_header(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.0)
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

impl From<String> for SecretToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SecretToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}
