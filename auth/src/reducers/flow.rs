//! Login flow reducer.
//!
//! # Flow
//!
//! ```text
//! Idle ─StartLogin──────► AwaitingProvider{Redirect} ─(page unload)
//! Idle ─StartPopupLogin─► AwaitingProvider{Popup} ─┬─ PopupMessageReceived ─► Success | Failure
//!                                                  └─ PopupTimedOut/Closed ─► Failure(PopupClosed)
//! (page load) ─CallbackReceived────────► Success | Failure | EmailRequired
//! (page load) ─ConnectCallbackReceived─► ConnectSuccess ─► linking
//! ```
//!
//! Callback pages may be rendered twice for one navigation. The first
//! `CallbackReceived` or `ConnectCallbackReceived` consumes the
//! navigation; later ones are ignored until `ResetFlow`.

use super::{POPUP_TIMEOUT, dispatch, navigate, redirect};
use crate::actions::AuthAction;
use crate::callback::{CallbackQuery, CallbackRoute, ConnectCallback};
use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use crate::popup::{PopupMessage, WindowMessage};
use crate::providers::{IdentityApi, KeyValueStorage, Navigator, PopupOpener};
use crate::state::{
    AuthState, FailureReason, FlowPhase, LinkResult, LoginFailure, LoginMode,
    PendingRegistration, PopupId, ProviderName, RegistrationStep, Route, Session,
};
use bookclub_core::effect::Effect;
use bookclub_core::reducer::Reducer;
use bookclub_core::{SmallVec, smallvec};
use std::marker::PhantomData;

/// Login flow reducer.
pub struct FlowReducer<A, S, N, P> {
    _phantom: PhantomData<fn() -> (A, S, N, P)>,
}

impl<A, S, N, P> FlowReducer<A, S, N, P> {
    /// Create a new flow reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<A, S, N, P> Default for FlowReducer<A, S, N, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S, N, P> Clone for FlowReducer<A, S, N, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<A, S, N, P> FlowReducer<A, S, N, P>
where
    A: IdentityApi + Clone + 'static,
    S: KeyValueStorage + 'static,
    N: Navigator + Clone + 'static,
    P: PopupOpener + Clone + 'static,
{
    fn fail(state: &mut AuthState, reason: FailureReason) {
        tracing::info!(reason = ?reason, "Login failed");
        metrics::counter!("auth.login.failed").increment(1);
        state.flow.phase = FlowPhase::Failure(LoginFailure::new(reason));
    }

    fn start_popup(
        state: &mut AuthState,
        provider: ProviderName,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        let popup = PopupId::new();
        state.flow.phase = FlowPhase::AwaitingProvider {
            provider,
            mode: LoginMode::Popup { popup },
        };
        tracing::info!(%provider, %popup, "Opening login popup");

        let popups = env.popups.clone();
        let url = env.config.authorization_url(provider);
        let open = Effect::Future(Box::pin(async move {
            match popups.open(popup, &url) {
                Ok(()) => None,
                Err(error) => Some(AuthAction::PopupOpenFailed { popup, error }),
            }
        }));

        match env.config.popup_timeout {
            Some(duration) => smallvec![
                open,
                Effect::Delay {
                    duration,
                    action: Box::new(AuthAction::PopupTimedOut { popup }),
                }
                .cancellable(POPUP_TIMEOUT),
            ],
            None => smallvec![open],
        }
    }

    fn on_popup_message(
        state: &mut AuthState,
        message: &WindowMessage,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        if message.origin != env.config.app_origin {
            tracing::warn!(origin = %message.origin, "Ignoring message from foreign origin");
            return smallvec![Effect::None];
        }

        if state.flow.awaiting_popup() != Some(message.source) {
            tracing::debug!(source = %message.source, "Ignoring message from unawaited popup");
            return smallvec![Effect::None];
        }

        let Some(parsed) = message.message() else {
            tracing::debug!("Ignoring unrecognised popup message");
            return smallvec![Effect::None];
        };

        let cancel_timer = Effect::Cancel { id: POPUP_TIMEOUT };
        match parsed {
            PopupMessage::Success { token } => match env.session.establish(Session::new(token)) {
                Ok(user) => {
                    tracing::info!(username = %user.username, "Popup login succeeded");
                    metrics::counter!("auth.login.succeeded", "mode" => "popup").increment(1);
                    state.flow.phase = FlowPhase::Success { user };
                    smallvec![cancel_timer, navigate(&env.navigator, Route::Landing)]
                },
                Err(error) => {
                    tracing::warn!(%error, "Popup delivered an unusable token");
                    Self::fail(state, FailureReason::InvalidToken);
                    smallvec![cancel_timer]
                },
            },
            PopupMessage::Error { reason } => {
                Self::fail(state, FailureReason::Provider(reason));
                smallvec![cancel_timer]
            },
            PopupMessage::Cancel => {
                Self::fail(state, FailureReason::Cancelled);
                smallvec![cancel_timer]
            },
            PopupMessage::VerificationSent { email } => {
                Self::fail(state, FailureReason::VerificationPending { email });
                smallvec![cancel_timer]
            },
        }
    }

    fn on_callback(
        state: &mut AuthState,
        query: &CallbackQuery,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        if state.flow.callback_consumed {
            tracing::debug!("Callback already consumed for this navigation");
            return smallvec![Effect::None];
        }
        state.flow.callback_consumed = true;

        match query.route() {
            CallbackRoute::Token(token) => match env.session.establish(Session::new(token)) {
                Ok(user) => {
                    tracing::info!(username = %user.username, "Redirect login succeeded");
                    metrics::counter!("auth.login.succeeded", "mode" => "redirect").increment(1);
                    state.flow.phase = FlowPhase::Success { user };
                    smallvec![navigate(&env.navigator, Route::Landing)]
                },
                Err(error) => {
                    tracing::warn!(%error, "Callback carried an unusable token");
                    Self::fail(state, FailureReason::InvalidToken);
                    smallvec![navigate(&env.navigator, Route::Login)]
                },
            },
            CallbackRoute::EmailRequired(token) => {
                let pending = PendingRegistration::from_token(token);
                tracing::info!(provider = ?pending.provider, "Provider login needs an email");
                state.flow.phase = FlowPhase::EmailRequired(pending.clone());
                smallvec![dispatch(AuthAction::BeginRegistration {
                    pending,
                    step: RegistrationStep::EnterEmail,
                })]
            },
            CallbackRoute::Error(message) => {
                Self::fail(state, FailureReason::Provider(message));
                smallvec![Effect::None]
            },
            CallbackRoute::Missing => {
                Self::fail(state, FailureReason::MissingParameters);
                smallvec![Effect::None]
            },
        }
    }

    fn on_connect_callback(
        state: &mut AuthState,
        callback: ConnectCallback,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        if state.flow.callback_consumed {
            tracing::debug!("Connect callback already consumed for this navigation");
            return smallvec![Effect::None];
        }
        state.flow.callback_consumed = true;
        state.flow.phase = FlowPhase::ConnectSuccess(callback.clone());

        match callback.into_request() {
            Ok(request) => smallvec![dispatch(AuthAction::CompleteLink(request))],
            Err(error) => {
                tracing::warn!(%error, "Rejecting connect callback");
                state.linking.last_result = Some(match error {
                    AuthError::InvalidLinkState => LinkResult::InvalidState,
                    other => LinkResult::Failed(other.to_string()),
                });
                smallvec![navigate(&env.navigator, Route::Profile)]
            },
        }
    }
}

impl<A, S, N, P> Reducer for FlowReducer<A, S, N, P>
where
    A: IdentityApi + Clone + 'static,
    S: KeyValueStorage + 'static,
    N: Navigator + Clone + 'static,
    P: PopupOpener + Clone + 'static,
{
    type State = AuthState;
    type Action = AuthAction;
    type Environment = AuthEnvironment<A, S, N, P>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ═══════════════════════════════════════════════════════════════════
            // Redirect Login
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::StartLogin { provider } => {
                tracing::info!(%provider, "Redirecting to provider");
                state.flow.phase = FlowPhase::AwaitingProvider {
                    provider,
                    mode: LoginMode::Redirect,
                };
                smallvec![redirect(
                    &env.navigator,
                    env.config.authorization_url(provider)
                )]
            },

            // ═══════════════════════════════════════════════════════════════════
            // Popup Login
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::StartPopupLogin { provider } => Self::start_popup(state, provider, env),

            AuthAction::PopupOpenFailed { popup, error } => {
                if state.flow.awaiting_popup() != Some(popup) {
                    return smallvec![Effect::None];
                }
                Self::fail(state, FailureReason::Unreachable(error.to_string()));
                smallvec![Effect::Cancel { id: POPUP_TIMEOUT }]
            },

            AuthAction::PopupMessageReceived(message) => {
                Self::on_popup_message(state, &message, env)
            },

            AuthAction::PopupTimedOut { popup } => {
                if state.flow.awaiting_popup() == Some(popup) {
                    tracing::info!(%popup, "Popup login timed out");
                    Self::fail(state, FailureReason::PopupClosed);
                }
                smallvec![Effect::None]
            },

            AuthAction::PopupClosed { popup } => {
                if state.flow.awaiting_popup() != Some(popup) {
                    return smallvec![Effect::None];
                }
                Self::fail(state, FailureReason::PopupClosed);
                smallvec![Effect::Cancel { id: POPUP_TIMEOUT }]
            },

            // ═══════════════════════════════════════════════════════════════════
            // Callback Pages
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::CallbackReceived(query) => Self::on_callback(state, &query, env),

            AuthAction::ConnectCallbackReceived(callback) => {
                Self::on_connect_callback(state, callback, env)
            },

            AuthAction::ResetFlow => {
                state.flow.callback_consumed = false;
                state.flow.phase = FlowPhase::Idle;
                smallvec![Effect::Cancel { id: POPUP_TIMEOUT }]
            },

            _ => smallvec![Effect::None],
        }
    }
}
