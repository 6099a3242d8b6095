//! User-facing wording for identity outcomes.
//!
//! Reducers record classified outcomes; this module is the only place
//! that turns them into text.

use crate::category::ErrorCategory;
use crate::error::AuthError;
use crate::state::{
    FailureReason, FieldError, LinkResult, LoginFailure, ProviderName, RegistrationError,
};

/// Message for a failed login.
#[must_use]
pub fn describe_failure(failure: &LoginFailure) -> String {
    match &failure.reason {
        FailureReason::MissingParameters => {
            "There was an error logging in. Please try again.".to_string()
        },
        FailureReason::InvalidToken => {
            "Failed to process authentication token. Please log in again.".to_string()
        },
        FailureReason::PopupClosed => {
            "The login window was closed before signing in finished.".to_string()
        },
        FailureReason::Cancelled => "Sign-in was cancelled.".to_string(),
        FailureReason::VerificationPending { email } => {
            format!("Please check {email} to verify your email and complete registration.")
        },
        FailureReason::Unreachable(_) => {
            "Could not reach the sign-in service. Please try again.".to_string()
        },
        FailureReason::Provider(message) => match failure.category {
            ErrorCategory::AccountExists => {
                "An account with this email already exists. Please login instead.".to_string()
            },
            ErrorCategory::NotVerified => "Please verify your email before logging in.".to_string(),
            ErrorCategory::InvalidToken => {
                "Your sign-in link has expired. Please try logging in again.".to_string()
            },
            ErrorCategory::Generic if message.trim().is_empty() => {
                "There was an error logging in. Please try again.".to_string()
            },
            ErrorCategory::Generic => message.clone(),
        },
    }
}

/// Message for a registration field error.
#[must_use]
pub const fn describe_field_error(error: FieldError) -> &'static str {
    match error {
        FieldError::TooShort => "Username must be at least 3 characters.",
        FieldError::InvalidEmail => "Please enter a valid email address.",
        FieldError::UsernameTaken => "This username is already taken.",
        FieldError::AccountExists => "An account with this email already exists.",
    }
}

/// Message for a form-level registration error.
#[must_use]
pub fn describe_registration_error(error: &RegistrationError) -> String {
    match error {
        RegistrationError::SessionExpired => {
            "Session expired. Please try logging in again.".to_string()
        },
        RegistrationError::Failed(_) => "Registration failed. Please try again.".to_string(),
    }
}

/// Message for a link or disconnect outcome.
#[must_use]
pub fn describe_link_result(result: &LinkResult) -> String {
    match result {
        LinkResult::Linked {
            link,
            email_mismatch: None,
        } => format!("{} account linked.", display_provider(link.provider)),
        LinkResult::Linked {
            link,
            email_mismatch: Some(mismatch),
        } => format!(
            "{} account linked. Its email ({}) differs from your account email ({}).",
            display_provider(link.provider),
            mismatch.oauth_email,
            mismatch.account_email
        ),
        LinkResult::AlreadyLinked(provider) => format!(
            "{} account is already linked to your profile.",
            display_provider(*provider)
        ),
        LinkResult::AlreadyLinkedElsewhere(_) => {
            "This OAuth account is already linked to another user. Please use a different account."
                .to_string()
        },
        LinkResult::ProviderAlreadyLinked(_) => {
            "You already have this provider linked. Disconnect it first to link a different account."
                .to_string()
        },
        LinkResult::Disconnected(provider) => {
            format!("{} account disconnected.", display_provider(*provider))
        },
        LinkResult::LastAuthMethod(provider) => format!(
            "{} is your only sign-in method. Set a password before removing your last sign-in method.",
            display_provider(*provider)
        ),
        LinkResult::InvalidState => {
            "This link request is invalid or has expired. Please try again.".to_string()
        },
        LinkResult::NotAuthenticated => "Please log in to link accounts.".to_string(),
        LinkResult::Failed(_) => "Failed to link account. Please try again.".to_string(),
    }
}

/// Message for an account operation error.
#[must_use]
pub fn describe_error(error: &AuthError) -> String {
    match error {
        AuthError::InvalidCredentials => {
            "Invalid username or password. Please try again.".to_string()
        },
        AuthError::EmailNotVerified => "Please verify your email before logging in.".to_string(),
        AuthError::UsernameTaken => describe_field_error(FieldError::UsernameTaken).to_string(),
        AuthError::AccountExists => {
            "An account with this email already exists. Please login instead.".to_string()
        },
        AuthError::VerificationTokenInvalid => {
            "Verification failed. The link may have expired or is invalid.".to_string()
        },
        AuthError::ResetTokenInvalid => {
            "The reset link is invalid or has expired. Please request a new one.".to_string()
        },
        AuthError::SessionExpired | AuthError::PendingTokenExpired => {
            "Session expired. Please try logging in again.".to_string()
        },
        AuthError::Unreachable(_) => {
            "Could not reach the server. Please try again later.".to_string()
        },
        AuthError::Validation(message) => message.clone(),
        _ => "Something went wrong. Please try again.".to_string(),
    }
}

const fn display_provider(provider: ProviderName) -> &'static str {
    match provider {
        ProviderName::Google => "Google",
        ProviderName::GitHub => "GitHub",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identity_conflicts_read_differently() {
        let provider = ProviderName::GitHub;
        let messages: HashSet<String> = [
            LinkResult::AlreadyLinked(provider),
            LinkResult::AlreadyLinkedElsewhere(provider),
            LinkResult::ProviderAlreadyLinked(provider),
            LinkResult::LastAuthMethod(provider),
            LinkResult::InvalidState,
            LinkResult::NotAuthenticated,
        ]
        .iter()
        .map(describe_link_result)
        .collect();

        assert_eq!(messages.len(), 6);
    }

    #[test]
    fn last_method_message_asks_for_a_password() {
        let message = describe_link_result(&LinkResult::LastAuthMethod(ProviderName::Google));
        assert!(message.contains("Set a password before removing your last sign-in method"));
    }

    #[test]
    fn provider_failures_follow_their_category() {
        let failure = LoginFailure::new(FailureReason::Provider("User NOT VERIFIED".into()));
        assert_eq!(
            describe_failure(&failure),
            "Please verify your email before logging in."
        );

        let failure = LoginFailure::new(FailureReason::Provider("quota exceeded".into()));
        assert_eq!(describe_failure(&failure), "quota exceeded");
    }

    #[test]
    fn expired_registration_asks_to_start_over() {
        assert!(describe_registration_error(&RegistrationError::SessionExpired)
            .contains("try logging in again"));
    }
}
