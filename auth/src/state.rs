//! Identity state types.
//!
//! Domain records (users, sessions, pending registrations, provider links)
//! and the reducer state for the login flow, the registration resolver, the
//! linking coordinator and account operations. All types are `Clone` so
//! the store can hand out snapshots.

use crate::callback::ConnectCallback;
use crate::category::ErrorCategory;
use crate::claims::{self, Claims};
use crate::constants::{ADMIN_ROLE, DEFAULT_ROLE, ROLE_PREFIX};
use crate::error::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Numeric account identifier assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one popup window opened by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PopupId(pub uuid::Uuid);

impl PopupId {
    /// Generate a new random `PopupId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PopupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PopupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Providers
// ═══════════════════════════════════════════════════════════════════════

/// Third-party identity providers the server integrates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderName {
    /// Google.
    #[serde(rename = "GOOGLE", alias = "google", alias = "Google")]
    Google,

    /// GitHub.
    #[serde(rename = "GITHUB", alias = "github", alias = "GitHub")]
    GitHub,
}

impl ProviderName {
    /// Every supported provider.
    pub const ALL: [Self; 2] = [Self::Google, Self::GitHub];

    /// Wire name (`GOOGLE`, `GITHUB`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "GOOGLE",
            Self::GitHub => "GITHUB",
        }
    }

    /// Lowercase form used in URL paths.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            other => Err(AuthError::Validation(format!("unknown provider: {other}"))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Session and User
// ═══════════════════════════════════════════════════════════════════════

/// Credentials held by the session store.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token presented on authenticated requests.
    pub bearer_token: String,

    /// Refresh token, when the server issued one.
    pub refresh_token: Option<String>,
}

impl Session {
    /// Session with a bearer token only.
    #[must_use]
    pub fn new(bearer_token: impl Into<String>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            refresh_token: None,
        }
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("bearer_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A password on its way to the server.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(pub String);

impl From<&str> for Password {
    fn from(password: &str) -> Self {
        Self(password.to_string())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Account role as issued by the server.
///
/// Stored verbatim; [`Role::normalized`] strips a `ROLE_` prefix. Admin
/// status is always derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    /// Role name without the `ROLE_` prefix.
    #[must_use]
    pub fn normalized(&self) -> &str {
        self.0.strip_prefix(ROLE_PREFIX).unwrap_or(&self.0)
    }

    /// Whether the normalized role is `ADMIN`.
    ///
    /// ```
    /// # use bookclub_auth::Role;
    /// assert!(Role::from("ROLE_ADMIN").is_admin());
    /// assert!(Role::from("ADMIN").is_admin());
    /// assert!(!Role::from("USER").is_admin());
    /// ```
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.normalized() == ADMIN_ROLE
    }
}

impl Default for Role {
    fn default() -> Self {
        Self(DEFAULT_ROLE.to_string())
    }
}

impl From<&str> for Role {
    fn from(role: &str) -> Self {
        Self(role.to_string())
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        Self(role)
    }
}

/// The signed-in user as the client knows them.
///
/// Derived from token claims, enriched by server responses, and mirrored
/// to storage so a reload keeps profile fields the token does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    /// Server account id, when known.
    #[serde(default)]
    pub id: Option<UserId>,

    /// Login name.
    pub username: String,

    /// Display name.
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,

    /// Primary email.
    #[serde(default)]
    pub email: Option<String>,

    /// Avatar image reference.
    #[serde(default, alias = "imageUrl", alias = "avatarUrl")]
    pub avatar_ref: Option<String>,

    /// Role as issued.
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: Role,

    /// Providers linked to this account. Names this client does not
    /// support are dropped.
    #[serde(default, deserialize_with = "known_providers")]
    pub oauth_providers: BTreeSet<ProviderName>,

    /// Whether the account can sign in with a password.
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_password: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn known_providers<'de, D>(deserializer: D) -> Result<BTreeSet<ProviderName>, D::Error>
where
    D: Deserializer<'de>,
{
    let names: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(names
        .unwrap_or_default()
        .iter()
        .filter_map(|name| name.parse().ok())
        .collect())
}

impl AuthUser {
    /// Minimal user built from token claims alone.
    #[must_use]
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            id: claims.numeric_id.map(UserId),
            username: claims.subject.clone(),
            display_name: None,
            email: None,
            avatar_ref: None,
            role: claims.role.clone().map(Role).unwrap_or_default(),
            oauth_providers: BTreeSet::new(),
            has_password: false,
        }
    }

    /// Whether this user is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Whether `claims` describe this same account.
    ///
    /// Ids decide when both sides have one; otherwise the username must
    /// equal the subject.
    #[must_use]
    pub fn matches(&self, claims: &Claims) -> bool {
        match (self.id, claims.numeric_id) {
            (Some(UserId(id)), Some(claimed)) => id == claimed,
            _ => self.username == claims.subject,
        }
    }

    /// Overlay token claims: the token is authoritative for id, username
    /// and role.
    pub fn merge_claims(&mut self, claims: &Claims) {
        if let Some(id) = claims.numeric_id {
            self.id = Some(UserId(id));
        }
        self.username.clone_from(&claims.subject);
        if let Some(role) = &claims.role {
            self.role = Role(role.clone());
        }
    }

    /// Whether `provider` is linked.
    #[must_use]
    pub fn has_provider(&self, provider: ProviderName) -> bool {
        self.oauth_providers.contains(&provider)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Pending Registration and Links
// ═══════════════════════════════════════════════════════════════════════

/// An OAuth login that authenticated a person but not yet an account.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingRegistration {
    /// Single-use token for the terminal registration call.
    pub pending_token: String,

    /// Provider the person signed in with, when the token names it.
    pub provider: Option<ProviderName>,

    /// Username proposed by the server.
    pub suggested_username: Option<String>,

    /// Display name from the provider profile.
    pub suggested_display_name: Option<String>,
}

impl PendingRegistration {
    /// Wrap a pending token, reading prefill hints from its payload.
    ///
    /// Tokens that are not decodable simply carry no hints.
    #[must_use]
    pub fn from_token(pending_token: impl Into<String>) -> Self {
        let pending_token = pending_token.into();
        let payload = claims::decode_payload(&pending_token).ok();

        let text = |key: &str| {
            payload
                .as_ref()
                .and_then(|p| p.get(key))
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            provider: text("provider").and_then(|p| p.parse().ok()),
            suggested_username: text("suggestedUsername"),
            suggested_display_name: text("name"),
            pending_token,
        }
    }
}

impl fmt::Debug for PendingRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRegistration")
            .field("pending_token", &"<redacted>")
            .field("provider", &self.provider)
            .field("suggested_username", &self.suggested_username)
            .field("suggested_display_name", &self.suggested_display_name)
            .finish()
    }
}

/// One external provider account bound to a local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderLink {
    /// Provider.
    pub provider: ProviderName,
    /// Account id at the provider.
    pub provider_id: String,
    /// When the link was recorded.
    pub linked_at: DateTime<Utc>,
}

/// Server-issued correlation value authorizing one connect callback.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkStateToken(pub String);

impl fmt::Debug for LinkStateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LinkStateToken(<redacted>)")
    }
}

/// Where the host should show the user next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Default view after signing in.
    Landing,
    /// Login form.
    Login,
    /// Email entry for a pending registration.
    EmailRequired,
    /// Username choice for a pending registration.
    CompleteRegistration,
    /// Profile page (linked providers).
    Profile,
}

// ═══════════════════════════════════════════════════════════════════════
// Reducer State
// ═══════════════════════════════════════════════════════════════════════

/// Root identity state managed by the auth reducer.
///
/// The session itself is not here: it lives in the
/// [`SessionStore`](crate::session::SessionStore), the only writer of
/// credentials.
///
/// # Examples
///
/// ```
/// # use bookclub_auth::AuthState;
/// let state = AuthState::default();
/// assert!(state.registration.is_none());
/// assert!(!state.flow.is_awaiting());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    /// Login flow controller.
    pub flow: FlowState,

    /// Pending registration being resolved.
    pub registration: Option<RegistrationState>,

    /// Provider linking.
    pub linking: LinkingState,

    /// Password login, registration and verification.
    pub account: AccountState,
}

/// Login flow controller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowState {
    /// Current phase.
    pub phase: FlowPhase,

    /// Set once this navigation's callback has been consumed. Lives only as
    /// long as the page does.
    pub callback_consumed: bool,
}

impl FlowState {
    /// Whether a provider round-trip is in progress.
    #[must_use]
    pub const fn is_awaiting(&self) -> bool {
        matches!(self.phase, FlowPhase::AwaitingProvider { .. })
    }

    /// The popup the flow is waiting on, if any.
    #[must_use]
    pub const fn awaiting_popup(&self) -> Option<PopupId> {
        match self.phase {
            FlowPhase::AwaitingProvider {
                mode: LoginMode::Popup { popup },
                ..
            } => Some(popup),
            _ => None,
        }
    }
}

/// How a login reaches the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    /// Full-page redirect; the outcome arrives on a fresh page load.
    Redirect,
    /// Second window that reports back by message.
    Popup {
        /// The popup's id.
        popup: PopupId,
    },
}

/// Flow controller phases.
///
/// Every phase after `AwaitingProvider` is terminal for the controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FlowPhase {
    /// Nothing in progress.
    #[default]
    Idle,

    /// Waiting for the provider round-trip.
    AwaitingProvider {
        /// Provider.
        provider: ProviderName,
        /// Redirect or popup.
        mode: LoginMode,
    },

    /// Signed in.
    Success {
        /// The signed-in user.
        user: AuthUser,
    },

    /// Login failed.
    Failure(LoginFailure),

    /// Provider login needs more input; handed to the registration resolver.
    EmailRequired(PendingRegistration),

    /// Provider connect callback received; handed to the linking coordinator.
    ConnectSuccess(ConnectCallback),
}

/// A failed login with its display category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginFailure {
    /// What went wrong.
    pub reason: FailureReason,
    /// How to present it.
    pub category: ErrorCategory,
}

impl LoginFailure {
    /// Build a failure, classifying provider error text.
    #[must_use]
    pub fn new(reason: FailureReason) -> Self {
        let category = match &reason {
            FailureReason::Provider(message) => ErrorCategory::classify(message),
            FailureReason::InvalidToken => ErrorCategory::InvalidToken,
            FailureReason::VerificationPending { .. } => ErrorCategory::NotVerified,
            FailureReason::MissingParameters
            | FailureReason::PopupClosed
            | FailureReason::Cancelled
            | FailureReason::Unreachable(_) => ErrorCategory::Generic,
        };
        Self { reason, category }
    }
}

/// Why a login ended without a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The server reported an error string.
    Provider(String),
    /// Callback carried neither `token` nor `error`.
    MissingParameters,
    /// Token received but unusable (malformed or already expired).
    InvalidToken,
    /// Popup closed or timed out without answering.
    PopupClosed,
    /// User abandoned the flow inside the popup.
    Cancelled,
    /// A verification email was sent; sign-in continues from that email.
    VerificationPending {
        /// Address the email went to.
        email: String,
    },
    /// Popup could not be opened or the server could not be reached.
    Unreachable(String),
}

// ─── Registration resolver ───────────────────────────────────────────

/// The two independently validated registration fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Username.
    Username,
    /// Email.
    Email,
}

impl Field {
    /// Stable name for logs and effect ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
        }
    }
}

/// Pending registration being resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationState {
    /// Token and prefill hints.
    pub pending: PendingRegistration,
    /// Current step.
    pub step: RegistrationStep,
    /// Username field.
    pub username: FieldState,
    /// Email field.
    pub email: FieldState,
    /// Optional display name.
    pub display_name: Option<String>,
    /// A terminal call is in flight.
    pub submitting: bool,
    /// Form-level error.
    pub error: Option<RegistrationError>,
}

impl RegistrationState {
    /// Fresh state for `pending` at `step`, username prefilled.
    #[must_use]
    pub fn new(pending: PendingRegistration, step: RegistrationStep) -> Self {
        let username = FieldState {
            value: pending.suggested_username.clone().unwrap_or_default(),
            ..FieldState::default()
        };
        Self {
            display_name: pending.suggested_display_name.clone(),
            pending,
            step,
            username,
            email: FieldState::default(),
            submitting: false,
            error: None,
        }
    }

    /// Field by name.
    #[must_use]
    pub const fn field(&self, field: Field) -> &FieldState {
        match field {
            Field::Username => &self.username,
            Field::Email => &self.email,
        }
    }

    /// Field by name, mutably.
    pub fn field_mut(&mut self, field: Field) -> &mut FieldState {
        match field {
            Field::Username => &mut self.username,
            Field::Email => &mut self.email,
        }
    }
}

/// Registration steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStep {
    /// Provider gave no usable email.
    EnterEmail,
    /// Fresh signup needs a username.
    ChooseUsername,
    /// Verification email sent; the user continues from the email.
    VerificationSent {
        /// Address the email went to.
        email: String,
    },
    /// Pending token is no longer usable; the user must sign in again.
    Expired,
}

/// One input with debounced availability validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldState {
    /// Current input.
    pub value: String,
    /// Bumped on every edit; probe results carry the generation they checked.
    pub generation: u64,
    /// Availability of `value`.
    pub availability: Availability,
    /// Field-scoped error.
    pub error: Option<FieldError>,
}

/// Availability of a field value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Availability {
    /// Nothing checked yet.
    #[default]
    Idle,
    /// Value fails local validation; never sent to the server.
    Invalid,
    /// Debounce window open or probe in flight.
    Checking,
    /// Server says free.
    Available,
    /// Server says taken.
    Taken,
    /// Probe failed; the server decides on submit.
    Unknown,
}

/// Field-scoped validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// Username shorter than the minimum.
    TooShort,
    /// Email not syntactically valid.
    InvalidEmail,
    /// Username already in use.
    UsernameTaken,
    /// Email belongs to an existing account.
    AccountExists,
}

/// Form-level registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Pending token expired, invalid or already used.
    SessionExpired,
    /// Server unreachable or returned an unexpected error.
    Failed(String),
}

// ─── Linking coordinator ─────────────────────────────────────────────

/// Account-linking state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkingState {
    /// Provider whose connect URL is being requested.
    pub connecting: Option<ProviderName>,
    /// Provider being disconnected.
    pub disconnecting: Option<ProviderName>,
    /// Outcome of the last link or disconnect.
    pub last_result: Option<LinkResult>,
}

/// Linked provider email differs from the account email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMismatch {
    /// Email at the provider.
    pub oauth_email: String,
    /// Account's primary email.
    pub account_email: String,
}

/// Outcomes of link and disconnect, each surfaced distinctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResult {
    /// Provider added to the account.
    Linked {
        /// The new link.
        link: ProviderLink,
        /// Set when the provider email differs (a notice, not an error).
        email_mismatch: Option<EmailMismatch>,
    },
    /// Pairing already existed; nothing changed.
    AlreadyLinked(ProviderName),
    /// Provider identity belongs to a different account.
    AlreadyLinkedElsewhere(ProviderName),
    /// Account already has another identity for this provider.
    ProviderAlreadyLinked(ProviderName),
    /// Provider removed from the account.
    Disconnected(ProviderName),
    /// Provider is the account's last sign-in method.
    LastAuthMethod(ProviderName),
    /// Callback parameters or state token rejected.
    InvalidState,
    /// No session to link to.
    NotAuthenticated,
    /// Anything else.
    Failed(String),
}

impl LinkResult {
    /// Whether the account's provider set may have changed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Linked { .. } | Self::AlreadyLinked(_) | Self::Disconnected(_)
        )
    }
}

// ─── Account operations ──────────────────────────────────────────────

/// Password login, registration, verification, reset, profile and logout
/// state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountState {
    /// A request is in flight.
    pub in_flight: bool,
    /// Result of the last operation.
    pub outcome: Option<AccountOutcome>,
    /// Result of the last OAuth health probe.
    pub oauth_available: Option<bool>,
    /// Whether the reset link being shown is usable, once checked.
    pub reset_token_valid: Option<bool>,
}

/// Results of account operations.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountOutcome {
    /// Signed in with a password or a verification link.
    SignedIn(AuthUser),
    /// Account created; a verification email was sent.
    Registered {
        /// Address the email went to.
        email: String,
    },
    /// Verification email sent again.
    VerificationResent {
        /// Address the email went to.
        email: String,
    },
    /// Password reset link sent.
    ResetEmailSent {
        /// Address the link went to.
        email: String,
    },
    /// New password stored; the user can log in with it.
    PasswordReset,
    /// Profile saved.
    ProfileUpdated(AuthUser),
    /// Session cleared.
    SignedOut,
    /// Operation failed.
    Failed(AuthError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn claims(sub: &str, id: Option<i64>, role: Option<&str>) -> Claims {
        Claims {
            subject: sub.to_string(),
            numeric_id: id,
            role: role.map(str::to_string),
            expiry_epoch_seconds: 0,
        }
    }

    #[test]
    fn role_normalization() {
        assert!(Role::from("ROLE_ADMIN").is_admin());
        assert!(Role::from("ADMIN").is_admin());
        assert!(!Role::from("USER").is_admin());
        assert!(!Role::from("ROLE_USER").is_admin());
        assert_eq!(Role::from("ROLE_USER").normalized(), "USER");
    }

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("GOOGLE".parse::<ProviderName>().unwrap(), ProviderName::Google);
        assert_eq!("github".parse::<ProviderName>().unwrap(), ProviderName::GitHub);
        assert!("facebook".parse::<ProviderName>().is_err());
    }

    #[test]
    fn auth_user_reads_server_json() {
        let user: AuthUser = serde_json::from_str(
            r#"{"id":5,"username":"ana","role":"ROLE_ADMIN","email":"a@x.io",
                "avatarRef":"a.png","oauthProviders":["GOOGLE"],"hasPassword":true}"#,
        )
        .unwrap();

        assert_eq!(user.id, Some(UserId(5)));
        assert!(user.is_admin());
        assert!(user.has_provider(ProviderName::Google));
        assert!(!user.has_provider(ProviderName::GitHub));
        assert!(user.has_password);
    }

    #[test]
    fn auth_user_defaults_missing_fields() {
        let user: AuthUser = serde_json::from_str(r#"{"username":"ana"}"#).unwrap();
        assert_eq!(user.role, Role::default());
        assert!(user.oauth_providers.is_empty());
    }

    #[test]
    fn auth_user_reads_null_fields_as_defaults() {
        let user: AuthUser = serde_json::from_str(
            r#"{"id":null,"username":"ana","role":null,"oauthProviders":null,
                "hasPassword":null,"email":null}"#,
        )
        .unwrap();

        assert_eq!(user.role, Role::default());
        assert!(user.oauth_providers.is_empty());
        assert!(!user.has_password);
        assert!(user.id.is_none());
    }

    #[test]
    fn auth_user_drops_unsupported_providers() {
        let user: AuthUser = serde_json::from_str(
            r#"{"username":"ana","oauthProviders":["FACEBOOK","github","GOOGLE"]}"#,
        )
        .unwrap();

        assert_eq!(
            user.oauth_providers,
            BTreeSet::from([ProviderName::Google, ProviderName::GitHub])
        );
    }

    #[test]
    fn auth_user_snapshot_reads_back() {
        let mut user = AuthUser::from_claims(&claims("ana", Some(1), Some("ROLE_ADMIN")));
        user.oauth_providers.insert(ProviderName::GitHub);
        user.has_password = true;

        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(serde_json::from_str::<AuthUser>(&json).unwrap(), user);
    }

    #[test]
    fn identity_match_prefers_ids() {
        let mut user = AuthUser::from_claims(&claims("ana", Some(1), None));
        assert!(user.matches(&claims("renamed", Some(1), None)));
        assert!(!user.matches(&claims("ana", Some(2), None)));

        user.id = None;
        assert!(user.matches(&claims("ana", Some(2), None)));
        assert!(!user.matches(&claims("bob", None, None)));
    }

    #[test]
    fn merge_claims_keeps_profile_fields() {
        let mut user = AuthUser::from_claims(&claims("ana", Some(1), None));
        user.avatar_ref = Some("a.png".to_string());
        user.merge_claims(&claims("ana2", Some(1), Some("ROLE_ADMIN")));

        assert_eq!(user.username, "ana2");
        assert_eq!(user.avatar_ref.as_deref(), Some("a.png"));
        assert!(user.is_admin());
    }

    #[test]
    fn pending_registration_prefills_from_token() {
        let body = URL_SAFE_NO_PAD
            .encode(r#"{"suggestedUsername":"ana_b","name":"Ana B","provider":"github"}"#);
        let pending = PendingRegistration::from_token(format!("h.{body}.s"));

        assert_eq!(pending.suggested_username.as_deref(), Some("ana_b"));
        assert_eq!(pending.suggested_display_name.as_deref(), Some("Ana B"));
        assert_eq!(pending.provider, Some(ProviderName::GitHub));
    }

    #[test]
    fn opaque_pending_token_has_no_hints() {
        let pending = PendingRegistration::from_token("abc123");
        assert_eq!(pending.pending_token, "abc123");
        assert!(pending.suggested_username.is_none());
        assert!(pending.provider.is_none());
    }

    #[test]
    fn tokens_are_redacted_in_debug_output() {
        let session = Session::new("secret-token").with_refresh_token(Some("r".into()));
        assert!(!format!("{session:?}").contains("secret-token"));

        let pending = PendingRegistration::from_token("secret-pending");
        assert!(!format!("{pending:?}").contains("secret-pending"));
    }

    #[test]
    fn login_failure_category_follows_reason() {
        let failure = LoginFailure::new(FailureReason::Provider("Account already exists".into()));
        assert_eq!(failure.category, ErrorCategory::AccountExists);
        assert_eq!(
            LoginFailure::new(FailureReason::PopupClosed).category,
            ErrorCategory::Generic
        );
    }
}
