//! Account-linking reducer.
//!
//! Adds and removes provider identities on the signed-in account. Every
//! server outcome is surfaced as its own [`LinkResult`], and the user
//! snapshot's provider set only changes on a confirmed link or
//! disconnect.

use super::{navigate, redirect};
use crate::actions::AuthAction;
use crate::callback::LinkRequest;
use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use crate::providers::{IdentityApi, KeyValueStorage, LinkResponse, Navigator, PopupOpener};
use crate::state::{AuthState, LinkResult, ProviderLink, ProviderName, Route};
use bookclub_core::effect::Effect;
use bookclub_core::reducer::Reducer;
use bookclub_core::{SmallVec, smallvec};
use std::marker::PhantomData;

/// Account-linking reducer.
pub struct LinkingReducer<A, S, N, P> {
    _phantom: PhantomData<fn() -> (A, S, N, P)>,
}

impl<A, S, N, P> LinkingReducer<A, S, N, P> {
    /// Create a new linking reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<A, S, N, P> Default for LinkingReducer<A, S, N, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S, N, P> Clone for LinkingReducer<A, S, N, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<A, S, N, P> LinkingReducer<A, S, N, P>
where
    A: IdentityApi + Clone + 'static,
    S: KeyValueStorage + 'static,
    N: Navigator + Clone + 'static,
    P: PopupOpener + Clone + 'static,
{
    /// No usable session: record it and send the user to log in.
    fn not_authenticated(
        state: &mut AuthState,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        tracing::info!("Linking requires a signed-in user");
        env.session.clear();
        state.linking.last_result = Some(LinkResult::NotAuthenticated);
        smallvec![navigate(&env.navigator, Route::Login)]
    }

    /// Add or remove `provider` on the stored user snapshot.
    fn update_providers(env: &AuthEnvironment<A, S, N, P>, provider: ProviderName, linked: bool) {
        let Some(mut user) = env.session.current_user() else {
            return;
        };
        if linked {
            user.oauth_providers.insert(provider);
        } else {
            user.oauth_providers.remove(&provider);
        }
        if let Err(error) = env.session.update_user(user) {
            tracing::warn!(%error, %provider, "Failed to update linked providers");
        }
    }

    fn on_link_completed(
        state: &mut AuthState,
        request: LinkRequest,
        result: Result<LinkResponse, AuthError>,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        let provider = request.provider;
        let outcome = match result {
            Ok(LinkResponse::Linked { email_mismatch }) => {
                Self::update_providers(env, provider, true);
                metrics::counter!("auth.link.linked", "provider" => provider.as_str())
                    .increment(1);
                LinkResult::Linked {
                    link: ProviderLink {
                        provider,
                        provider_id: request.provider_id,
                        linked_at: env.clock.now(),
                    },
                    email_mismatch,
                }
            },
            Ok(LinkResponse::AlreadyLinked) => LinkResult::AlreadyLinked(provider),
            Err(AuthError::AlreadyLinkedElsewhere) => LinkResult::AlreadyLinkedElsewhere(provider),
            Err(AuthError::ProviderAlreadyLinked(_)) => LinkResult::ProviderAlreadyLinked(provider),
            Err(AuthError::InvalidLinkState) => LinkResult::InvalidState,
            Err(AuthError::SessionExpired | AuthError::NotAuthenticated) => {
                return Self::not_authenticated(state, env);
            },
            Err(error) => {
                tracing::warn!(%error, %provider, "Link failed");
                LinkResult::Failed(error.to_string())
            },
        };

        tracing::info!(%provider, outcome = ?outcome, "Link finished");
        state.linking.last_result = Some(outcome);
        smallvec![navigate(&env.navigator, Route::Profile)]
    }
}

impl<A, S, N, P> Reducer for LinkingReducer<A, S, N, P>
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
            // Connect
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::Connect { provider } => {
                let Some(bearer) = env.session.active_bearer_token() else {
                    return Self::not_authenticated(state, env);
                };
                tracing::info!(%provider, "Requesting connect URL");
                state.linking.connecting = Some(provider);
                state.linking.last_result = None;

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.connect_url(&bearer, provider).await;
                    Some(AuthAction::ConnectUrlReceived { provider, result })
                }))]
            },

            AuthAction::ConnectUrlReceived { provider, result } => {
                state.linking.connecting = None;
                match result {
                    Ok(url) => {
                        tracing::info!(%provider, "Redirecting to provider for linking");
                        smallvec![redirect(&env.navigator, url)]
                    },
                    Err(AuthError::SessionExpired | AuthError::NotAuthenticated) => {
                        Self::not_authenticated(state, env)
                    },
                    Err(error) => {
                        tracing::warn!(%error, %provider, "Could not start linking");
                        state.linking.last_result = Some(LinkResult::Failed(error.to_string()));
                        smallvec![Effect::None]
                    },
                }
            },

            // ═══════════════════════════════════════════════════════════════════
            // Link
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::CompleteLink(request) => {
                let Some(bearer) = env.session.active_bearer_token() else {
                    return Self::not_authenticated(state, env);
                };
                tracing::info!(provider = %request.provider, "Recording provider link");

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.link(&bearer, &request).await;
                    Some(AuthAction::LinkCompleted { request, result })
                }))]
            },

            AuthAction::LinkCompleted { request, result } => {
                Self::on_link_completed(state, request, result, env)
            },

            // ═══════════════════════════════════════════════════════════════════
            // Disconnect
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::Disconnect { provider } => {
                let Some(bearer) = env.session.active_bearer_token() else {
                    return Self::not_authenticated(state, env);
                };
                tracing::info!(%provider, "Disconnecting provider");
                state.linking.disconnecting = Some(provider);
                state.linking.last_result = None;

                let api = env.api.clone();
                smallvec![Effect::Future(Box::pin(async move {
                    let result = api.disconnect(&bearer, provider).await;
                    Some(AuthAction::Disconnected { provider, result })
                }))]
            },

            AuthAction::Disconnected { provider, result } => {
                state.linking.disconnecting = None;
                let outcome = match result {
                    Ok(()) => {
                        Self::update_providers(env, provider, false);
                        metrics::counter!("auth.link.disconnected", "provider" => provider.as_str())
                            .increment(1);
                        LinkResult::Disconnected(provider)
                    },
                    Err(AuthError::LastAuthMethod) => LinkResult::LastAuthMethod(provider),
                    Err(AuthError::SessionExpired | AuthError::NotAuthenticated) => {
                        return Self::not_authenticated(state, env);
                    },
                    Err(error) => {
                        tracing::warn!(%error, %provider, "Disconnect failed");
                        LinkResult::Failed(error.to_string())
                    },
                };
                state.linking.last_result = Some(outcome);
                smallvec![Effect::None]
            },

            _ => smallvec![Effect::None],
        }
    }
}
