//! Identity actions.
//!
//! Every input to the identity reducers: user intents, callback pages,
//! popup messages, timers, and the results of server calls.

use crate::callback::{CallbackQuery, ConnectCallback, LinkRequest};
use crate::error::AuthError;
use crate::popup::WindowMessage;
use crate::providers::{
    LinkResponse, LoginResponse, ProfileResponse, ProfileUpdate, RegistrationResponse,
};
use crate::state::{
    Field, Password, PendingRegistration, PopupId, ProviderName, RegistrationStep,
};

/// Identity action.
///
/// - **Intents**: what the user or host asked for (`StartPopupLogin`,
///   `FieldEdited`, `Disconnect`, ...)
/// - **Results**: what an effect observed (`LinkCompleted`,
///   `AvailabilityChecked`, ...), carried as `Result<_, AuthError>`
///
/// # Architecture Note
///
/// Actions are the only way into the identity state machine. Results
/// re-enter through the store, so every decision is made in a reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    // ═══════════════════════════════════════════════════════════════════════
    // Login Flow
    // ═══════════════════════════════════════════════════════════════════════
    /// Full-page redirect to the provider's authorization endpoint.
    StartLogin {
        /// Provider to sign in with.
        provider: ProviderName,
    },

    /// Open a popup at the provider's authorization endpoint.
    StartPopupLogin {
        /// Provider to sign in with.
        provider: ProviderName,
    },

    /// The popup could not be opened.
    PopupOpenFailed {
        /// Popup that failed.
        popup: PopupId,
        /// Why.
        error: AuthError,
    },

    /// A cross-window message arrived. Untrusted until checked.
    PopupMessageReceived(WindowMessage),

    /// The popup timeout elapsed.
    PopupTimedOut {
        /// Popup that timed out.
        popup: PopupId,
    },

    /// The host observed the popup closing.
    PopupClosed {
        /// Popup that closed.
        popup: PopupId,
    },

    /// Login callback page loaded. May fire more than once per navigation.
    CallbackReceived(CallbackQuery),

    /// Connect callback page loaded. May fire more than once per navigation.
    ConnectCallbackReceived(ConnectCallback),

    /// A new navigation began; re-arm the callback guard.
    ResetFlow,

    // ═══════════════════════════════════════════════════════════════════════
    // Pending Registration
    // ═══════════════════════════════════════════════════════════════════════
    /// Start resolving a pending registration.
    BeginRegistration {
        /// Token and prefill hints.
        pending: PendingRegistration,
        /// First step.
        step: RegistrationStep,
    },

    /// A registration field changed.
    FieldEdited {
        /// Which field.
        field: Field,
        /// New value.
        value: String,
    },

    /// The display name changed. Not validated.
    DisplayNameEdited {
        /// New display name.
        name: String,
    },

    /// A field's debounce window closed.
    DebounceElapsed {
        /// Which field.
        field: Field,
        /// Field generation the window was opened for.
        generation: u64,
    },

    /// An availability probe finished.
    AvailabilityChecked {
        /// Which field.
        field: Field,
        /// Generation the probe checked.
        generation: u64,
        /// Value the probe checked.
        value: String,
        /// `Ok(true)` when free.
        result: Result<bool, AuthError>,
    },

    /// Submit the email for verification.
    SubmitEmail,

    /// Email submission finished.
    EmailSubmitted {
        /// Address that was submitted.
        email: String,
        /// Server message on success.
        result: Result<String, AuthError>,
    },

    /// Complete the registration with the chosen username.
    CompleteRegistration,

    /// Registration completion finished.
    RegistrationCompleted {
        /// New account token and profile on success.
        result: Result<RegistrationResponse, AuthError>,
    },

    /// Give up on the pending registration.
    AbandonRegistration,

    // ═══════════════════════════════════════════════════════════════════════
    // Account Linking
    // ═══════════════════════════════════════════════════════════════════════
    /// Link another provider to the signed-in account.
    Connect {
        /// Provider to link.
        provider: ProviderName,
    },

    /// Connect URL request finished.
    ConnectUrlReceived {
        /// Provider being linked.
        provider: ProviderName,
        /// Provider-scoped authorization URL.
        result: Result<String, AuthError>,
    },

    /// Record a link from a validated connect callback.
    CompleteLink(LinkRequest),

    /// Link request finished.
    LinkCompleted {
        /// What was requested.
        request: LinkRequest,
        /// Server outcome.
        result: Result<LinkResponse, AuthError>,
    },

    /// Remove a provider from the signed-in account.
    Disconnect {
        /// Provider to remove.
        provider: ProviderName,
    },

    /// Disconnect finished.
    Disconnected {
        /// Provider removed.
        provider: ProviderName,
        /// Server outcome.
        result: Result<(), AuthError>,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Account Operations
    // ═══════════════════════════════════════════════════════════════════════
    /// Password login.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: Password,
    },

    /// Password login finished.
    LoginCompleted {
        /// Token and user on success.
        result: Result<LoginResponse, AuthError>,
    },

    /// Create an account with a password.
    Register {
        /// Username.
        username: String,
        /// Email.
        email: String,
        /// Password.
        password: Password,
        /// Requested role, with or without `ROLE_` prefix.
        role: Option<String>,
    },

    /// Registration finished.
    Registered {
        /// Address the verification email went to.
        email: String,
        /// Server outcome.
        result: Result<(), AuthError>,
    },

    /// Follow an email verification link.
    VerifyEmail {
        /// Verification token.
        token: String,
    },

    /// Verification finished.
    EmailVerified {
        /// Token and user on success.
        result: Result<LoginResponse, AuthError>,
    },

    /// Send the verification email again.
    ResendVerification {
        /// Address to send to.
        email: String,
    },

    /// Resend finished.
    VerificationResent {
        /// Address sent to.
        email: String,
        /// Server outcome.
        result: Result<(), AuthError>,
    },

    /// Sign out.
    Logout,

    // ═══════════════════════════════════════════════════════════════════════
    // Password Reset
    // ═══════════════════════════════════════════════════════════════════════
    /// Email a password reset link.
    RequestPasswordReset {
        /// Account email.
        email: String,
    },

    /// Reset link request finished.
    PasswordResetRequested {
        /// Address the link went to.
        email: String,
        /// Server outcome.
        result: Result<(), AuthError>,
    },

    /// Check a reset link before showing the new-password form.
    ValidateResetToken {
        /// Token from the link.
        token: String,
    },

    /// Reset link check finished.
    ResetTokenValidated {
        /// `Ok(true)` while the link is usable.
        result: Result<bool, AuthError>,
    },

    /// Choose a new password through a reset link.
    ResetPassword {
        /// Token from the link.
        token: String,
        /// New password.
        password: Password,
        /// Repeated new password.
        confirmation: Password,
    },

    /// Password reset finished.
    PasswordResetCompleted {
        /// Server outcome.
        result: Result<(), AuthError>,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Profile
    // ═══════════════════════════════════════════════════════════════════════
    /// Change the signed-in user's username, email or password.
    UpdateProfile(ProfileUpdate),

    /// Profile update finished.
    ProfileUpdated {
        /// Email that was submitted, if any.
        email: Option<String>,
        /// Whether a password was set.
        password_set: bool,
        /// Server outcome.
        result: Result<ProfileResponse, AuthError>,
    },

    /// Probe the server's OAuth subsystem.
    CheckOAuthHealth,

    /// Health probe finished.
    OAuthHealthChecked {
        /// Whether OAuth logins can be offered.
        available: bool,
    },
}
