//! Display categories for server failure strings.
//!
//! Classification only picks wording. It never decides which state a flow
//! moves to.

/// Closed set of failure categories shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// An account already exists for the identity.
    AccountExists,
    /// The account's email address is not verified.
    NotVerified,
    /// A token expired or was rejected.
    InvalidToken,
    /// Anything else.
    #[default]
    Generic,
}

const ACCOUNT_EXISTS: &[&str] = &["already exists", "account_exists", "account exists"];
const NOT_VERIFIED: &[&str] = &["not verified", "unverified", "verify your email"];
const INVALID_TOKEN: &[&str] = &["expired", "invalid token", "invalid_token", "token is invalid"];

impl ErrorCategory {
    /// Classify a server failure string by case-insensitive substring.
    ///
    /// ```
    /// use bookclub_auth::ErrorCategory;
    ///
    /// assert_eq!(ErrorCategory::classify("Email NOT VERIFIED"), ErrorCategory::NotVerified);
    /// assert_eq!(ErrorCategory::classify("boom"), ErrorCategory::Generic);
    /// ```
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let mentions = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));

        if mentions(ACCOUNT_EXISTS) {
            Self::AccountExists
        } else if mentions(NOT_VERIFIED) {
            Self::NotVerified
        } else if mentions(INVALID_TOKEN) {
            Self::InvalidToken
        } else {
            Self::Generic
        }
    }
}
