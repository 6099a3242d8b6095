//! Mock provider implementations for testing.
//!
//! In-memory implementations of every provider trait, plus a
//! [`MockHarness`] that wires them into an [`AuthEnvironment`] over
//! [`MemoryStorage`].

pub mod api;
pub mod host;
pub mod token;

pub use crate::stores::MemoryStorage;
pub use api::{ApiCall, MockIdentityApi};
pub use host::{MockPopupOpener, Navigation, RecordingNavigator};
pub use token::mint_token;

use crate::config::ClientConfig;
use crate::environment::AuthEnvironment;
use crate::session::SessionStore;
use bookclub_core::environment::Clock;
use std::sync::Arc;

/// Environment assembled from mocks.
pub type MockEnvironment =
    AuthEnvironment<MockIdentityApi, Arc<MemoryStorage>, RecordingNavigator, MockPopupOpener>;

/// A mock environment with handles to each mock for scripting and
/// inspection.
#[derive(Clone)]
pub struct MockHarness {
    /// The environment to hand to reducers and stores.
    pub env: MockEnvironment,
    /// Scripted server.
    pub api: MockIdentityApi,
    /// Storage behind the session store.
    pub storage: Arc<MemoryStorage>,
    /// Recorded navigation.
    pub navigator: RecordingNavigator,
    /// Recorded popups.
    pub popups: MockPopupOpener,
}

impl MockHarness {
    /// Build a harness over empty storage.
    #[must_use]
    pub fn new(config: ClientConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_storage(config, clock, Arc::new(MemoryStorage::new()))
    }

    /// Build a harness over existing storage, as after a reload.
    #[must_use]
    pub fn with_storage(
        config: ClientConfig,
        clock: Arc<dyn Clock>,
        storage: Arc<MemoryStorage>,
    ) -> Self {
        let api = MockIdentityApi::new();
        let navigator = RecordingNavigator::new();
        let popups = MockPopupOpener::new();
        let session = Arc::new(SessionStore::open(Arc::clone(&storage), Arc::clone(&clock)));

        Self {
            env: AuthEnvironment::new(
                api.clone(),
                session,
                navigator.clone(),
                popups.clone(),
                clock,
                config,
            ),
            api,
            storage,
            navigator,
            popups,
        }
    }
}
