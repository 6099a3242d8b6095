//! Identity environment.
//!
//! Dependencies injected into the identity reducers.

use crate::config::ClientConfig;
use crate::providers::{IdentityApi, KeyValueStorage, Navigator, PopupOpener};
use crate::session::SessionStore;
use bookclub_core::environment::Clock;
use std::sync::Arc;

/// Identity environment.
///
/// # Type Parameters
///
/// - `A`: Identity server API
/// - `S`: Durable storage behind the session store
/// - `N`: Navigator
/// - `P`: Popup opener
pub struct AuthEnvironment<A, S, N, P>
where
    A: IdentityApi + Clone,
    S: KeyValueStorage,
    N: Navigator + Clone,
    P: PopupOpener + Clone,
{
    /// Identity server API.
    pub api: A,

    /// The one session store of this client.
    pub session: Arc<SessionStore<S>>,

    /// Navigation.
    pub navigator: N,

    /// Popup windows.
    pub popups: P,

    /// Clock used for link timestamps.
    pub clock: Arc<dyn Clock>,

    /// Client configuration.
    pub config: Arc<ClientConfig>,
}

impl<A, S, N, P> AuthEnvironment<A, S, N, P>
where
    A: IdentityApi + Clone,
    S: KeyValueStorage,
    N: Navigator + Clone,
    P: PopupOpener + Clone,
{
    /// Create a new identity environment.
    #[must_use]
    pub fn new(
        api: A,
        session: Arc<SessionStore<S>>,
        navigator: N,
        popups: P,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        Self {
            api,
            session,
            navigator,
            popups,
            clock,
            config: Arc::new(config),
        }
    }
}

impl<A, S, N, P> Clone for AuthEnvironment<A, S, N, P>
where
    A: IdentityApi + Clone,
    S: KeyValueStorage,
    N: Navigator + Clone,
    P: PopupOpener + Clone,
{
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            session: Arc::clone(&self.session),
            navigator: self.navigator.clone(),
            popups: self.popups.clone(),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
        }
    }
}
