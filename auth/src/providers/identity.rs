//! Identity server API trait and wire types.

use crate::callback::LinkRequest;
use crate::error::Result;
use crate::state::{AuthUser, EmailMismatch, Password, ProviderName, Role, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// The server's identity endpoints.
///
/// Bearer-authenticated calls take the token explicitly: the session store
/// owns it and the caller reads it right before the call.
///
/// # Implementation Notes
///
/// - Error bodies carry `{code, error, message}`; map known codes onto the
///   matching [`AuthError`](crate::AuthError) variant
/// - Availability probes answer 200 (free) or 409 (taken)
pub trait IdentityApi: Send + Sync {
    /// `POST /login`.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`](crate::AuthError::InvalidCredentials),
    /// [`AuthError::EmailNotVerified`](crate::AuthError::EmailNotVerified),
    /// or a transport error.
    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<LoginResponse>> + Send;

    /// `POST /register`. No session results; the account must verify its
    /// email first.
    ///
    /// # Errors
    ///
    /// Validation errors for taken usernames or emails, or transport errors.
    fn register(&self, request: &RegisterRequest) -> impl Future<Output = Result<()>> + Send;

    /// `GET /verify-email?token=`.
    ///
    /// # Errors
    ///
    /// [`AuthError::VerificationTokenInvalid`](crate::AuthError::VerificationTokenInvalid)
    /// or a transport error.
    fn verify_email(&self, token: &str) -> impl Future<Output = Result<LoginResponse>> + Send;

    /// `POST /resend-verification`.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn resend_verification(&self, email: &str) -> impl Future<Output = Result<()>> + Send;

    /// `POST /oauth/submit-email`. Triggers a verification email; does not
    /// complete the registration.
    ///
    /// # Errors
    ///
    /// [`AuthError::AccountExists`](crate::AuthError::AccountExists),
    /// [`AuthError::PendingTokenExpired`](crate::AuthError::PendingTokenExpired),
    /// or transport errors.
    fn submit_email(&self, request: &SubmitEmailRequest)
    -> impl Future<Output = Result<String>> + Send;

    /// `POST /oauth/complete-registration`. Consumes the pending token.
    ///
    /// # Errors
    ///
    /// [`AuthError::UsernameTaken`](crate::AuthError::UsernameTaken),
    /// [`AuthError::AccountExists`](crate::AuthError::AccountExists),
    /// [`AuthError::PendingTokenExpired`](crate::AuthError::PendingTokenExpired),
    /// or transport errors.
    fn complete_registration(
        &self,
        request: &CompleteRegistrationRequest,
    ) -> impl Future<Output = Result<RegistrationResponse>> + Send;

    /// `GET /oauth/connect/{provider}`, returning the provider-scoped
    /// authorization URL.
    ///
    /// # Errors
    ///
    /// [`AuthError::SessionExpired`](crate::AuthError::SessionExpired) or
    /// transport errors.
    fn connect_url(
        &self,
        bearer: &str,
        provider: ProviderName,
    ) -> impl Future<Output = Result<String>> + Send;

    /// `POST /oauth/link`.
    ///
    /// # Errors
    ///
    /// Identity conflicts, [`AuthError::InvalidLinkState`](crate::AuthError::InvalidLinkState),
    /// or transport errors.
    fn link(
        &self,
        bearer: &str,
        request: &LinkRequest,
    ) -> impl Future<Output = Result<LinkResponse>> + Send;

    /// `DELETE /oauth/disconnect/{provider}`.
    ///
    /// # Errors
    ///
    /// [`AuthError::LastAuthMethod`](crate::AuthError::LastAuthMethod) or
    /// transport errors.
    fn disconnect(
        &self,
        bearer: &str,
        provider: ProviderName,
    ) -> impl Future<Output = Result<()>> + Send;

    /// `GET /available/username`. `true` when free.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn username_available(&self, username: &str) -> impl Future<Output = Result<bool>> + Send;

    /// `GET /available/mail`. `true` when free.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn email_available(&self, email: &str) -> impl Future<Output = Result<bool>> + Send;

    /// `POST /forgot-password`. Sends a reset link to `email`.
    ///
    /// # Errors
    ///
    /// Validation or transport errors.
    fn request_password_reset(&self, email: &str) -> impl Future<Output = Result<()>> + Send;

    /// `GET /reset-password?token=`. `true` while the link is usable.
    ///
    /// # Errors
    ///
    /// Transport errors.
    fn validate_reset_token(&self, token: &str) -> impl Future<Output = Result<bool>> + Send;

    /// `PUT /reset-password`. Consumes the reset token.
    ///
    /// # Errors
    ///
    /// [`AuthError::ResetTokenInvalid`](crate::AuthError::ResetTokenInvalid),
    /// validation or transport errors.
    fn reset_password(
        &self,
        request: &PasswordResetRequest,
    ) -> impl Future<Output = Result<()>> + Send;

    /// `PUT /user/{id}`. A username change comes back with a reissued
    /// token.
    ///
    /// # Errors
    ///
    /// [`AuthError::UsernameTaken`](crate::AuthError::UsernameTaken),
    /// [`AuthError::AccountExists`](crate::AuthError::AccountExists),
    /// [`AuthError::SessionExpired`](crate::AuthError::SessionExpired),
    /// or transport errors.
    fn update_profile(
        &self,
        bearer: &str,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<ProfileResponse>> + Send;

    /// `GET /oauth/health`.
    ///
    /// # Errors
    ///
    /// Transport errors mean the OAuth subsystem is unavailable.
    fn health(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Login and email verification response.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Bearer token.
    pub token: String,

    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// The signed-in user.
    #[serde(default)]
    pub user: Option<AuthUser>,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponse")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// `POST /register` body.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    /// Username.
    pub username: String,
    /// Email.
    pub email: String,
    /// Password.
    pub password: String,
    /// Role, always `ROLE_`-prefixed when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// `POST /oauth/submit-email` body.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEmailRequest {
    /// Pending token.
    pub pending_token: String,
    /// Email to verify.
    pub email: String,
    /// Chosen username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `POST /oauth/complete-registration` body.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRegistrationRequest {
    /// Pending token.
    pub pending_token: String,
    /// Chosen username.
    pub username: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `POST /oauth/complete-registration` response.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    /// Bearer token for the new account.
    pub token: String,
    /// Account id.
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Username.
    #[serde(default)]
    pub username: Option<String>,
    /// Email.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Role.
    #[serde(default)]
    pub role: Option<String>,
}

impl RegistrationResponse {
    /// Profile snapshot for the new account, if the response named one.
    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        let username = self.username.clone()?;
        Some(AuthUser {
            id: self.user_id.map(UserId),
            username,
            display_name: self.name.clone(),
            email: self.email.clone(),
            avatar_ref: None,
            role: self.role.clone().map(Role).unwrap_or_default(),
            oauth_providers: std::collections::BTreeSet::new(),
            has_password: false,
        })
    }
}

impl fmt::Debug for RegistrationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationResponse")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// `PUT /reset-password` body.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PasswordResetRequest {
    /// Token from the reset link.
    pub token: String,
    /// New password.
    pub password: String,
}

impl fmt::Debug for PasswordResetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordResetRequest")
            .field("token", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Profile fields to change. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// New username.
    pub username: Option<String>,
    /// New primary email.
    pub email: Option<String>,
    /// New password; also how an OAuth-only account gains one.
    pub password: Option<Password>,
}

impl ProfileUpdate {
    /// Whether nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password.is_none()
    }

    /// The `user` part of the update form. The server calls the email
    /// `mail`.
    #[must_use]
    pub fn to_body(&self, user_id: UserId) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert("id".into(), user_id.0.into());
        if let Some(username) = &self.username {
            body.insert("username".into(), username.clone().into());
        }
        if let Some(email) = &self.email {
            body.insert("mail".into(), email.clone().into());
        }
        if let Some(password) = &self.password {
            body.insert("password".into(), password.0.clone().into());
        }
        serde_json::Value::Object(body)
    }
}

/// `PUT /user/{id}` response. Every field is optional; an empty body is
/// a plain success.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    /// Reissued bearer token.
    #[serde(default)]
    pub token: Option<String>,
    /// Reissued refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Updated profile.
    #[serde(default)]
    pub user: Option<AuthUser>,
}

impl fmt::Debug for ProfileResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileResponse")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Successful `POST /oauth/link` outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResponse {
    /// Link recorded.
    Linked {
        /// Present when the provider email differs from the account's.
        email_mismatch: Option<EmailMismatch>,
    },
    /// The pairing already existed.
    AlreadyLinked,
}
