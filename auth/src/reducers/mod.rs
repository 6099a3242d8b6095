//! Identity reducers.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
//! The one exception is the session store, whose operations are
//! synchronous and run inside the reducer so that every credential write
//! happens under the store's state lock, in action order.
//!
//! - [`FlowReducer`]: redirect and popup logins, callback pages
//! - [`RegistrationReducer`]: pending registrations and debounced validation
//! - [`LinkingReducer`]: connect, link and disconnect
//! - [`AccountReducer`]: password login, verification, password reset,
//!   profile changes, logout

pub mod account;
pub mod flow;
pub mod linking;
pub mod registration;

use crate::actions::AuthAction;
use crate::environment::AuthEnvironment;
use crate::providers::{IdentityApi, KeyValueStorage, Navigator, PopupOpener};
use crate::state::{AuthState, Field, Route};
use bookclub_core::effect::{Effect, EffectId};
use bookclub_core::reducer::Reducer;
use bookclub_core::SmallVec;

pub use account::AccountReducer;
pub use flow::FlowReducer;
pub use linking::LinkingReducer;
pub use registration::RegistrationReducer;

/// Timer that fails a popup login nobody answered.
pub const POPUP_TIMEOUT: EffectId = EffectId::new("popup-timeout");

/// Debounce window of the username field.
pub const USERNAME_DEBOUNCE: EffectId = EffectId::new("debounce:username");

/// Debounce window of the email field.
pub const EMAIL_DEBOUNCE: EffectId = EffectId::new("debounce:email");

/// Debounce effect id for `field`.
#[must_use]
pub const fn debounce_id(field: Field) -> EffectId {
    match field {
        Field::Username => USERNAME_DEBOUNCE,
        Field::Email => EMAIL_DEBOUNCE,
    }
}

/// Ask the host to show `route`.
pub(crate) fn navigate<N>(navigator: &N, route: Route) -> Effect<AuthAction>
where
    N: Navigator + Clone + 'static,
{
    let navigator = navigator.clone();
    Effect::Future(Box::pin(async move {
        navigator.navigate(route);
        None
    }))
}

/// Ask the host to leave the app for `url`.
pub(crate) fn redirect<N>(navigator: &N, url: String) -> Effect<AuthAction>
where
    N: Navigator + Clone + 'static,
{
    let navigator = navigator.clone();
    Effect::Future(Box::pin(async move {
        navigator.redirect(&url);
        None
    }))
}

/// Feed `action` back into the store.
pub(crate) fn dispatch(action: AuthAction) -> Effect<AuthAction> {
    Effect::Future(Box::pin(async move { Some(action) }))
}

/// Unified identity reducer.
///
/// Routes each action to the sub-reducer that owns it.
pub struct AuthReducer<A, S, N, P> {
    flow: FlowReducer<A, S, N, P>,
    registration: RegistrationReducer<A, S, N, P>,
    linking: LinkingReducer<A, S, N, P>,
    account: AccountReducer<A, S, N, P>,
}

impl<A, S, N, P> AuthReducer<A, S, N, P> {
    /// Create a new identity reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flow: FlowReducer::new(),
            registration: RegistrationReducer::new(),
            linking: LinkingReducer::new(),
            account: AccountReducer::new(),
        }
    }
}

impl<A, S, N, P> Default for AuthReducer<A, S, N, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S, N, P> Clone for AuthReducer<A, S, N, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<A, S, N, P> std::fmt::Debug for AuthReducer<A, S, N, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthReducer").finish_non_exhaustive()
    }
}

impl<A, S, N, P> Reducer for AuthReducer<A, S, N, P>
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
            // Login flow
            AuthAction::StartLogin { .. }
            | AuthAction::StartPopupLogin { .. }
            | AuthAction::PopupOpenFailed { .. }
            | AuthAction::PopupMessageReceived(_)
            | AuthAction::PopupTimedOut { .. }
            | AuthAction::PopupClosed { .. }
            | AuthAction::CallbackReceived(_)
            | AuthAction::ConnectCallbackReceived(_)
            | AuthAction::ResetFlow => self.flow.reduce(state, action, env),

            // Pending registration
            AuthAction::BeginRegistration { .. }
            | AuthAction::FieldEdited { .. }
            | AuthAction::DisplayNameEdited { .. }
            | AuthAction::DebounceElapsed { .. }
            | AuthAction::AvailabilityChecked { .. }
            | AuthAction::SubmitEmail
            | AuthAction::EmailSubmitted { .. }
            | AuthAction::CompleteRegistration
            | AuthAction::RegistrationCompleted { .. }
            | AuthAction::AbandonRegistration => self.registration.reduce(state, action, env),

            // Account linking
            AuthAction::Connect { .. }
            | AuthAction::ConnectUrlReceived { .. }
            | AuthAction::CompleteLink(_)
            | AuthAction::LinkCompleted { .. }
            | AuthAction::Disconnect { .. }
            | AuthAction::Disconnected { .. } => self.linking.reduce(state, action, env),

            // Account operations
            AuthAction::Login { .. }
            | AuthAction::LoginCompleted { .. }
            | AuthAction::Register { .. }
            | AuthAction::Registered { .. }
            | AuthAction::VerifyEmail { .. }
            | AuthAction::EmailVerified { .. }
            | AuthAction::ResendVerification { .. }
            | AuthAction::VerificationResent { .. }
            | AuthAction::Logout
            | AuthAction::RequestPasswordReset { .. }
            | AuthAction::PasswordResetRequested { .. }
            | AuthAction::ValidateResetToken { .. }
            | AuthAction::ResetTokenValidated { .. }
            | AuthAction::ResetPassword { .. }
            | AuthAction::PasswordResetCompleted { .. }
            | AuthAction::UpdateProfile(_)
            | AuthAction::ProfileUpdated { .. }
            | AuthAction::CheckOAuthHealth
            | AuthAction::OAuthHealthChecked { .. } => self.account.reduce(state, action, env),
        }
    }
}
