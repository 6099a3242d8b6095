//! Callback query parsing.
//!
//! The server finishes a provider round-trip by redirecting back with query
//! parameters: `token`/`error` for logins, and
//! `provider`/`providerId`/`oauthEmail`/`stateToken`/`error` for connects.

use crate::constants::EMAIL_REQUIRED_PREFIX;
use crate::error::{AuthError, Result};
use crate::state::{LinkStateToken, ProviderName};
use serde::Deserialize;
use std::fmt;

/// Query of the login callback page.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackQuery {
    /// Bearer token on success.
    #[serde(default)]
    pub token: Option<String>,

    /// Error string on failure.
    #[serde(default)]
    pub error: Option<String>,
}

/// What a login callback asks the controller to do.
#[derive(Clone, PartialEq, Eq)]
pub enum CallbackRoute {
    /// Establish a session from this token.
    Token(String),
    /// Resolve a pending registration for this pending token.
    EmailRequired(String),
    /// Show a failure for this server error string.
    Error(String),
    /// Neither parameter was present.
    Missing,
}

impl CallbackQuery {
    /// Parse a query string, with or without its leading `?`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the query is not valid
    /// `application/x-www-form-urlencoded`.
    pub fn parse(query: &str) -> Result<Self> {
        serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|e| AuthError::Validation(format!("malformed callback query: {e}")))
    }

    /// Decide what the callback means.
    ///
    /// An `error` wins over a `token`; empty values count as absent.
    ///
    /// ```
    /// use bookclub_auth::callback::{CallbackQuery, CallbackRoute};
    ///
    /// let query = CallbackQuery::parse("?error=EMAIL_REQUIRED:abc123").unwrap();
    /// assert!(query.route() == CallbackRoute::EmailRequired("abc123".into()));
    /// ```
    #[must_use]
    pub fn route(&self) -> CallbackRoute {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.is_empty())
        }

        if let Some(error) = present(&self.error) {
            return match error.strip_prefix(EMAIL_REQUIRED_PREFIX) {
                Some(pending) if !pending.is_empty() => {
                    CallbackRoute::EmailRequired(pending.to_string())
                },
                _ => CallbackRoute::Error(error.to_string()),
            };
        }

        match present(&self.token) {
            Some(token) => CallbackRoute::Token(token.to_string()),
            None => CallbackRoute::Missing,
        }
    }
}

impl fmt::Debug for CallbackQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQuery")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Debug for CallbackRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::EmailRequired(_) => f.write_str("EmailRequired(<redacted>)"),
            Self::Error(error) => f.debug_tuple("Error").field(error).finish(),
            Self::Missing => f.write_str("Missing"),
        }
    }
}

/// Query of the provider-connect callback page.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectCallback {
    /// Provider being linked.
    #[serde(default)]
    pub provider: Option<String>,

    /// Account id at the provider.
    #[serde(default)]
    pub provider_id: Option<String>,

    /// Email the provider reported.
    #[serde(default)]
    pub oauth_email: Option<String>,

    /// Link state token issued with the connect URL.
    #[serde(default)]
    pub state_token: Option<String>,

    /// Error string on failure.
    #[serde(default)]
    pub error: Option<String>,
}

/// A connect callback with everything a link request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    /// Provider being linked.
    pub provider: ProviderName,
    /// Account id at the provider.
    pub provider_id: String,
    /// Email the provider reported.
    pub oauth_email: Option<String>,
    /// Link state token to round-trip.
    pub state_token: LinkStateToken,
}

impl ConnectCallback {
    /// Parse a query string, with or without its leading `?`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the query is not valid
    /// `application/x-www-form-urlencoded`.
    pub fn parse(query: &str) -> Result<Self> {
        serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|e| AuthError::Validation(format!("malformed connect query: {e}")))
    }

    /// Validate the parameters into a link request.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] carrying the server's `error`, if present
    /// - [`AuthError::InvalidLinkState`] if the provider, provider id or
    ///   state token is missing or the provider is unknown
    pub fn into_request(self) -> Result<LinkRequest> {
        if let Some(error) = self.error.filter(|e| !e.is_empty()) {
            return Err(AuthError::Validation(error));
        }

        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let provider = non_empty(self.provider)
            .and_then(|p| p.parse::<ProviderName>().ok())
            .ok_or(AuthError::InvalidLinkState)?;
        let provider_id = non_empty(self.provider_id).ok_or(AuthError::InvalidLinkState)?;
        let state_token = non_empty(self.state_token).ok_or(AuthError::InvalidLinkState)?;

        Ok(LinkRequest {
            provider,
            provider_id,
            oauth_email: non_empty(self.oauth_email),
            state_token: LinkStateToken(state_token),
        })
    }
}

impl fmt::Debug for ConnectCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectCallback")
            .field("provider", &self.provider)
            .field("provider_id", &self.provider_id)
            .field("oauth_email", &self.oauth_email)
            .field("state_token", &self.state_token.as_ref().map(|_| "<redacted>"))
            .field("error", &self.error)
            .finish()
    }
}
