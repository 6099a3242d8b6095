//! Client configuration.
//!
//! Values come from the application (or the environment through
//! [`ClientConfig::from_env`]); nothing here is read implicitly.

use crate::error::{AuthError, Result};
use crate::state::ProviderName;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the API server base URL.
pub const ENV_SERVER_URL: &str = "BOOKCLUB_SERVER_URL";

/// Environment variable overriding the application origin.
pub const ENV_APP_ORIGIN: &str = "BOOKCLUB_APP_ORIGIN";

/// Environment variable naming the session storage file.
pub const ENV_STORAGE_PATH: &str = "BOOKCLUB_STORAGE_PATH";

/// Environment variable for the popup timeout in seconds (`0` disables it).
pub const ENV_POPUP_TIMEOUT_SECS: &str = "BOOKCLUB_POPUP_TIMEOUT_SECS";

/// Identity client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API server base URL, without trailing slash.
    ///
    /// Default: `http://localhost:8080`
    pub server_url: String,

    /// Path prefix of the JSON API routes.
    ///
    /// Default: `/api`. The provider authorization route is not prefixed.
    pub api_prefix: String,

    /// Origin of this application. Cross-window messages from any other
    /// origin are ignored.
    ///
    /// Default: `http://localhost:5173`
    pub app_origin: String,

    /// Quiet period before a username availability probe.
    ///
    /// Default: 400ms
    pub username_debounce: Duration,

    /// Quiet period before an email availability probe.
    ///
    /// Default: 800ms
    pub email_debounce: Duration,

    /// How long a popup login may stay unanswered before it fails.
    ///
    /// Default: 5 minutes. `None` waits indefinitely.
    pub popup_timeout: Option<Duration>,

    /// File backing durable session storage. `None` keeps it in memory.
    pub storage_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Create a configuration for the given server and application origin.
    #[must_use]
    pub fn new(server_url: impl Into<String>, app_origin: impl Into<String>) -> Self {
        Self {
            server_url: trim_slash(server_url.into()),
            app_origin: trim_slash(app_origin.into()),
            ..Self::default()
        }
    }

    /// Load configuration from the environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_SERVER_URL) {
            config.server_url = trim_slash(url);
        }
        if let Ok(origin) = std::env::var(ENV_APP_ORIGIN) {
            config.app_origin = trim_slash(origin);
        }
        if let Ok(path) = std::env::var(ENV_STORAGE_PATH) {
            config.storage_path = Some(PathBuf::from(path));
        }
        if let Ok(secs) = std::env::var(ENV_POPUP_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                AuthError::Config(format!("{ENV_POPUP_TIMEOUT_SECS} must be a number of seconds"))
            })?;
            config.popup_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if !config.server_url.starts_with("http://") && !config.server_url.starts_with("https://")
        {
            return Err(AuthError::Config(format!(
                "{ENV_SERVER_URL} must be an http(s) URL, got {}",
                config.server_url
            )));
        }

        tracing::debug!(
            server_url = %config.server_url,
            app_origin = %config.app_origin,
            "Loaded client configuration"
        );

        Ok(config)
    }

    /// Set the username debounce window.
    #[must_use]
    pub const fn with_username_debounce(mut self, debounce: Duration) -> Self {
        self.username_debounce = debounce;
        self
    }

    /// Set the email debounce window.
    #[must_use]
    pub const fn with_email_debounce(mut self, debounce: Duration) -> Self {
        self.email_debounce = debounce;
        self
    }

    /// Set (or disable) the popup timeout.
    #[must_use]
    pub const fn with_popup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.popup_timeout = timeout;
        self
    }

    /// Persist the session to a file.
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Full URL of a JSON API route, e.g. `api_url("/login")`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.server_url, self.api_prefix, path)
    }

    /// Server-side authorization endpoint a login navigates to.
    #[must_use]
    pub fn authorization_url(&self, provider: ProviderName) -> String {
        format!(
            "{}/oauth2/authorization/{}",
            self.server_url,
            provider.path_segment()
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            api_prefix: "/api".to_string(),
            app_origin: "http://localhost:5173".to_string(),
            username_debounce: Duration::from_millis(400),
            email_debounce: Duration::from_millis(800),
            popup_timeout: Some(Duration::from_secs(300)),
            storage_path: None,
        }
    }
}

fn trim_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
