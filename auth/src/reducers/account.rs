//! Account operations reducer.
//!
//! Password login, password registration, email verification, password
//! reset, profile changes, logout and the OAuth health probe. Logins funnel
//! into the same session store as provider logins.

use super::{EMAIL_DEBOUNCE, POPUP_TIMEOUT, USERNAME_DEBOUNCE, navigate};
use crate::actions::AuthAction;
use crate::constants::ROLE_PREFIX;
use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use crate::providers::{
    IdentityApi, KeyValueStorage, LoginResponse, Navigator, PasswordResetRequest, PopupOpener,
    ProfileResponse, ProfileUpdate, RegisterRequest,
};
use crate::state::{AccountOutcome, AuthState, AuthUser, FlowPhase, Route, Session};
use crate::utils::{
    check_reset_password, is_valid_email, is_valid_profile_password, is_valid_username,
    normalize_email,
};
use bookclub_core::effect::Effect;
use bookclub_core::reducer::Reducer;
use bookclub_core::{SmallVec, smallvec};
use std::marker::PhantomData;

/// Account operations reducer.
pub struct AccountReducer<A, S, N, P> {
    _phantom: PhantomData<fn() -> (A, S, N, P)>,
}

impl<A, S, N, P> AccountReducer<A, S, N, P> {
    /// Create a new account reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<A, S, N, P> Default for AccountReducer<A, S, N, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S, N, P> Clone for AccountReducer<A, S, N, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

/// Requested role with the server's `ROLE_` prefix.
fn prefixed_role(role: &str) -> String {
    let role = role.trim().to_ascii_uppercase();
    if role.starts_with(ROLE_PREFIX) {
        role
    } else {
        format!("{ROLE_PREFIX}{role}")
    }
}

/// Trim and check a profile update, dropping blank fields.
fn normalize_update(update: ProfileUpdate) -> Result<ProfileUpdate, AuthError> {
    let username = update
        .username
        .map(|username| username.trim().to_string())
        .filter(|username| !username.is_empty());
    let email = update
        .email
        .map(|email| normalize_email(&email))
        .filter(|email| !email.is_empty());
    let password = update.password.filter(|password| !password.0.is_empty());

    if username.as_deref().is_some_and(|u| !is_valid_username(u)) {
        return Err(AuthError::Validation(
            "username must be at least 3 characters".into(),
        ));
    }
    if email.as_deref().is_some_and(|e| !is_valid_email(e)) {
        return Err(AuthError::Validation("invalid email".into()));
    }
    if password
        .as_ref()
        .is_some_and(|p| !is_valid_profile_password(&p.0))
    {
        return Err(AuthError::Validation(
            "password must be at least 6 characters".into(),
        ));
    }

    let update = ProfileUpdate {
        username,
        email,
        password,
    };
    if update.is_empty() {
        return Err(AuthError::Validation("nothing to update".into()));
    }
    Ok(update)
}

impl<A, S, N, P> AccountReducer<A, S, N, P>
where
    A: IdentityApi + Clone + 'static,
    S: KeyValueStorage + 'static,
    N: Navigator + Clone + 'static,
    P: PopupOpener + Clone + 'static,
{
    fn fail(state: &mut AuthState, error: AuthError) -> SmallVec<[Effect<AuthAction>; 4]> {
        tracing::info!(%error, "Account operation failed");
        state.account.in_flight = false;
        state.account.outcome = Some(AccountOutcome::Failed(error));
        smallvec![Effect::None]
    }

    /// Store the session from a login or verification response.
    fn sign_in(
        state: &mut AuthState,
        result: Result<LoginResponse, AuthError>,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        state.account.in_flight = false;
        let response = match result {
            Ok(response) => response,
            Err(error) => return Self::fail(state, error),
        };

        let session = Session::new(response.token).with_refresh_token(response.refresh_token);
        let established = match response.user {
            Some(user) => env.session.establish_with_user(session, user),
            None => env.session.establish(session),
        };

        match established {
            Ok(user) => {
                tracing::info!(username = %user.username, "Signed in");
                metrics::counter!("auth.login.succeeded", "mode" => "password").increment(1);
                state.account.outcome = Some(AccountOutcome::SignedIn(user.clone()));
                state.flow.phase = FlowPhase::Success { user };
                smallvec![navigate(&env.navigator, Route::Landing)]
            },
            Err(error) => Self::fail(state, error),
        }
    }

    /// The session is gone: report it and send the user to log in.
    fn signed_out(
        state: &mut AuthState,
        error: AuthError,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        env.session.clear();
        let mut effects = Self::fail(state, error);
        effects.push(navigate(&env.navigator, Route::Login));
        effects
    }

    /// Store a saved profile, adopting a reissued token when there is one.
    fn profile_saved(
        env: &AuthEnvironment<A, S, N, P>,
        response: ProfileResponse,
        email: Option<String>,
        password_set: bool,
    ) -> Result<AuthUser, AuthError> {
        let mut user = response
            .user
            .or_else(|| env.session.current_user())
            .ok_or(AuthError::NotAuthenticated)?;
        if let Some(email) = email {
            user.email = Some(email);
        }
        if password_set {
            user.has_password = true;
        }

        match response.token {
            Some(token) => {
                let refresh = response
                    .refresh_token
                    .or_else(|| env.session.get().and_then(|session| session.refresh_token));
                let session = Session::new(token).with_refresh_token(refresh);
                env.session.establish_with_user(session, user)
            },
            None => {
                env.session.update_user(user)?;
                env.session
                    .current_user()
                    .ok_or(AuthError::NotAuthenticated)
            },
        }
    }
}

impl<A, S, N, P> Reducer for AccountReducer<A, S, N, P>
where
    A: IdentityApi + Clone + 'static,
    S: KeyValueStorage + 'static,
    N: Navigator + Clone + 'static,
    P: PopupOpener + Clone + 'static,
{
    type State = AuthState;
    type Action = AuthAction;
    type Environment = AuthEnvironment<A, S, N, P>;

    #[allow(clippy::too_many_lines)] // One arm per account operation
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ═══════════════════════════════════════════════════════════════════
            // Password Login
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::Login { username, password } => {
                let username = username.trim().to_string();
                if username.is_empty() || password.0.is_empty() {
                    return Self::fail(state, AuthError::InvalidCredentials);
                }
                state.account.in_flight = true;
                state.account.outcome = None;

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.login(&username, &password.0).await;
                    Some(AuthAction::LoginCompleted { result })
                }))]
            },

            AuthAction::LoginCompleted { result } => Self::sign_in(state, result, env),

            // ═══════════════════════════════════════════════════════════════════
            // Password Registration
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::Register {
                username,
                email,
                password,
                role,
            } => {
                let username = username.trim().to_string();
                let email = normalize_email(&email);
                if !is_valid_username(&username) {
                    return Self::fail(
                        state,
                        AuthError::Validation("username must be at least 3 characters".into()),
                    );
                }
                if !is_valid_email(&email) {
                    return Self::fail(state, AuthError::Validation("invalid email".into()));
                }

                state.account.in_flight = true;
                state.account.outcome = None;

                let request = RegisterRequest {
                    username,
                    email: email.clone(),
                    password: password.0,
                    role: role.as_deref().map(prefixed_role),
                };
                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.register(&request).await;
                    Some(AuthAction::Registered { email, result })
                }))]
            },

            AuthAction::Registered { email, result } => match result {
                Ok(()) => {
                    tracing::info!("Account registered, verification pending");
                    metrics::counter!("auth.account.registered").increment(1);
                    state.account.in_flight = false;
                    state.account.outcome = Some(AccountOutcome::Registered { email });
                    smallvec![Effect::None]
                },
                Err(error) => Self::fail(state, error),
            },

            // ═══════════════════════════════════════════════════════════════════
            // Email Verification
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::VerifyEmail { token } => {
                if token.trim().is_empty() {
                    return Self::fail(state, AuthError::VerificationTokenInvalid);
                }
                state.account.in_flight = true;
                state.account.outcome = None;

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.verify_email(&token).await;
                    Some(AuthAction::EmailVerified { result })
                }))]
            },

            AuthAction::EmailVerified { result } => Self::sign_in(state, result, env),

            AuthAction::ResendVerification { email } => {
                let email = normalize_email(&email);
                if !is_valid_email(&email) {
                    return Self::fail(state, AuthError::Validation("invalid email".into()));
                }
                state.account.in_flight = true;

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.resend_verification(&email).await;
                    Some(AuthAction::VerificationResent { email, result })
                }))]
            },

            AuthAction::VerificationResent { email, result } => match result {
                Ok(()) => {
                    state.account.in_flight = false;
                    state.account.outcome = Some(AccountOutcome::VerificationResent { email });
                    smallvec![Effect::None]
                },
                Err(error) => Self::fail(state, error),
            },

            // ═══════════════════════════════════════════════════════════════════
            // Password Reset
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::RequestPasswordReset { email } => {
                let email = normalize_email(&email);
                if !is_valid_email(&email) {
                    return Self::fail(state, AuthError::Validation("invalid email".into()));
                }
                state.account.in_flight = true;
                state.account.outcome = None;

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.request_password_reset(&email).await;
                    Some(AuthAction::PasswordResetRequested { email, result })
                }))]
            },

            AuthAction::PasswordResetRequested { email, result } => match result {
                Ok(()) => {
                    tracing::info!("Password reset link sent");
                    state.account.in_flight = false;
                    state.account.outcome = Some(AccountOutcome::ResetEmailSent { email });
                    smallvec![Effect::None]
                },
                Err(error) => Self::fail(state, error),
            },

            AuthAction::ValidateResetToken { token } => {
                if token.trim().is_empty() {
                    state.account.reset_token_valid = Some(false);
                    return smallvec![Effect::None];
                }
                state.account.reset_token_valid = None;

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.validate_reset_token(&token).await;
                    Some(AuthAction::ResetTokenValidated { result })
                }))]
            },

            AuthAction::ResetTokenValidated { result } => match result {
                Ok(valid) => {
                    state.account.reset_token_valid = Some(valid);
                    smallvec![Effect::None]
                },
                Err(error) => Self::fail(state, error),
            },

            AuthAction::ResetPassword {
                token,
                password,
                confirmation,
            } => {
                if token.trim().is_empty() {
                    state.account.reset_token_valid = Some(false);
                    return Self::fail(state, AuthError::ResetTokenInvalid);
                }
                if let Err(problem) = check_reset_password(&password.0, &confirmation.0) {
                    return Self::fail(state, AuthError::Validation(problem.message().into()));
                }
                state.account.in_flight = true;
                state.account.outcome = None;

                let request = PasswordResetRequest {
                    token,
                    password: password.0,
                };
                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.reset_password(&request).await;
                    Some(AuthAction::PasswordResetCompleted { result })
                }))]
            },

            AuthAction::PasswordResetCompleted { result } => match result {
                Ok(()) => {
                    tracing::info!("Password reset");
                    metrics::counter!("auth.password.reset").increment(1);
                    state.account.in_flight = false;
                    state.account.reset_token_valid = None;
                    state.account.outcome = Some(AccountOutcome::PasswordReset);
                    smallvec![navigate(&env.navigator, Route::Login)]
                },
                Err(AuthError::ResetTokenInvalid) => {
                    state.account.reset_token_valid = Some(false);
                    Self::fail(state, AuthError::ResetTokenInvalid)
                },
                Err(error) => Self::fail(state, error),
            },

            // ═══════════════════════════════════════════════════════════════════
            // Profile
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::UpdateProfile(update) => {
                let (Some(user), Some(bearer)) =
                    (env.session.current_user(), env.session.bearer_token())
                else {
                    return Self::signed_out(state, AuthError::NotAuthenticated, env);
                };
                let Some(user_id) = user.id else {
                    return Self::fail(
                        state,
                        AuthError::Validation("account id is unknown".into()),
                    );
                };
                let update = match normalize_update(update) {
                    Ok(update) => update,
                    Err(error) => return Self::fail(state, error),
                };
                state.account.in_flight = true;
                state.account.outcome = None;

                let email = update.email.clone();
                let password_set = update.password.is_some();
                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.update_profile(&bearer, user_id, &update).await;
                    Some(AuthAction::ProfileUpdated {
                        email,
                        password_set,
                        result,
                    })
                }))]
            },

            AuthAction::ProfileUpdated {
                email,
                password_set,
                result,
            } => {
                let response = match result {
                    Ok(response) => response,
                    Err(AuthError::SessionExpired) => {
                        return Self::signed_out(state, AuthError::SessionExpired, env);
                    },
                    Err(error) => return Self::fail(state, error),
                };

                match Self::profile_saved(env, response, email, password_set) {
                    Ok(user) => {
                        tracing::info!(username = %user.username, "Profile updated");
                        state.account.in_flight = false;
                        state.account.outcome = Some(AccountOutcome::ProfileUpdated(user.clone()));
                        if matches!(state.flow.phase, FlowPhase::Success { .. }) {
                            state.flow.phase = FlowPhase::Success { user };
                        }
                        smallvec![Effect::None]
                    },
                    Err(error) => Self::fail(state, error),
                }
            },

            // ═══════════════════════════════════════════════════════════════════
            // Logout
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::Logout => {
                env.session.clear();
                tracing::info!("Signed out");
                metrics::counter!("auth.logout").increment(1);

                state.flow.phase = FlowPhase::Idle;
                state.registration = None;
                state.linking = crate::state::LinkingState::default();
                state.account.in_flight = false;
                state.account.outcome = Some(AccountOutcome::SignedOut);

                smallvec![
                    Effect::Cancel { id: POPUP_TIMEOUT },
                    Effect::Cancel {
                        id: USERNAME_DEBOUNCE
                    },
                    Effect::Cancel { id: EMAIL_DEBOUNCE },
                    navigate(&env.navigator, Route::Login),
                ]
            },

            // ═══════════════════════════════════════════════════════════════════
            // Health
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::CheckOAuthHealth => {
                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let available = match api.health().await {
                        Ok(()) => true,
                        Err(error) => {
                            tracing::warn!(%error, "OAuth health check failed");
                            false
                        },
                    };
                    Some(AuthAction::OAuthHealthChecked { available })
                }))]
            },

            AuthAction::OAuthHealthChecked { available } => {
                state.account.oauth_available = Some(available);
                smallvec![Effect::None]
            },

            _ => smallvec![Effect::None],
        }
    }
}
