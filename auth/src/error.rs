//! Error types for identity and session operations.

use crate::claims::ClaimsError;
use crate::state::ProviderName;
use thiserror::Error;

/// Result type alias for identity operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Failure taxonomy used to decide how an error is handled.
///
/// Each [`AuthError`] belongs to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network failure or a non-2xx response without a usable body.
    /// Retrying is left to the user.
    Transport,

    /// Field-scoped conflicts and input problems. The user stays on the
    /// current step and corrects the input.
    Validation,

    /// Provider identity conflicts. Never merged or overwritten.
    IdentityConflict,

    /// Expired or invalid pending, bearer or verification tokens. The flow
    /// starts over and partial client state is dropped.
    TokenLifecycle,

    /// Malformed bearer token. Equivalent to having no session.
    Decode,

    /// Local storage or configuration problems.
    Local,
}

/// Comprehensive error taxonomy for the identity subsystem.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Transport
    // ═══════════════════════════════════════════════════════════

    /// Server could not be reached.
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// Server answered with an error status the client does not recognise.
    #[error("Server returned {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Body text or message field, possibly empty
        message: String,
    },

    /// A 2xx response whose body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    // ═══════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════

    /// Username/password rejected.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Login refused until the email address is verified.
    #[error("Email address not verified")]
    EmailNotVerified,

    /// Username is already in use.
    #[error("Username already taken")]
    UsernameTaken,

    /// An account with this email already exists.
    #[error("An account with this email already exists")]
    AccountExists,

    /// Input rejected before or by the server.
    #[error("Invalid input: {0}")]
    Validation(String),

    // ═══════════════════════════════════════════════════════════
    // Identity conflicts
    // ═══════════════════════════════════════════════════════════

    /// The provider identity is bound to a different account.
    #[error("This provider account is already linked to another user")]
    AlreadyLinkedElsewhere,

    /// The current account already has another identity for this provider.
    #[error("A different {0} account is already linked")]
    ProviderAlreadyLinked(ProviderName),

    /// Removing this link would leave the account without a sign-in method.
    #[error("Cannot remove the last sign-in method")]
    LastAuthMethod,

    // ═══════════════════════════════════════════════════════════
    // Token lifecycle
    // ═══════════════════════════════════════════════════════════

    /// Pending registration token is expired, invalid or already used.
    #[error("Registration session expired")]
    PendingTokenExpired,

    /// Bearer token has expired.
    #[error("Session has expired")]
    SessionExpired,

    /// Operation needs a session and there is none.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Link state token was rejected by the server.
    #[error("Invalid or expired link state token")]
    InvalidLinkState,

    /// Email verification token is expired or invalid.
    #[error("Verification link expired or invalid")]
    VerificationTokenInvalid,

    /// Password reset token is expired, invalid or already used.
    #[error("Password reset link expired or invalid")]
    ResetTokenInvalid,

    // ═══════════════════════════════════════════════════════════
    // Decode
    // ═══════════════════════════════════════════════════════════

    /// Bearer token could not be decoded.
    #[error("Malformed token: {0}")]
    Claims(#[from] ClaimsError),

    // ═══════════════════════════════════════════════════════════
    // Local
    // ═══════════════════════════════════════════════════════════

    /// Durable storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Popup could not be opened or reached.
    #[error("Popup error: {0}")]
    Popup(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Classify this error into the failure taxonomy.
    ///
    /// # Examples
    ///
    /// ```
    /// # use bookclub_auth::{AuthError, ErrorKind};
    /// assert_eq!(AuthError::UsernameTaken.kind(), ErrorKind::Validation);
    /// assert_eq!(AuthError::LastAuthMethod.kind(), ErrorKind::IdentityConflict);
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) | Self::Server { .. } | Self::InvalidResponse(_) => {
                ErrorKind::Transport
            },
            Self::InvalidCredentials
            | Self::EmailNotVerified
            | Self::UsernameTaken
            | Self::AccountExists
            | Self::Validation(_) => ErrorKind::Validation,
            Self::AlreadyLinkedElsewhere | Self::ProviderAlreadyLinked(_) | Self::LastAuthMethod => {
                ErrorKind::IdentityConflict
            },
            Self::PendingTokenExpired
            | Self::SessionExpired
            | Self::NotAuthenticated
            | Self::InvalidLinkState
            | Self::VerificationTokenInvalid
            | Self::ResetTokenInvalid => ErrorKind::TokenLifecycle,
            Self::Claims(_) => ErrorKind::Decode,
            Self::Storage(_) | Self::Popup(_) | Self::Config(_) => ErrorKind::Local,
        }
    }

    /// Returns `true` if the user should start the flow over.
    #[must_use]
    pub const fn requires_restart(&self) -> bool {
        matches!(self.kind(), ErrorKind::TokenLifecycle | ErrorKind::Decode)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::Unreachable(error.to_string())
        }
    }
}
