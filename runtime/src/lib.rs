//! # Bookclub Runtime
//!
//! Runtime implementation for the bookclub client architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation registry**: Keeps at most one running effect per [`EffectId`]
//!
//! Reducers run one at a time behind the store's write lock, which gives the
//! event-loop ordering a UI thread would: an action is fully reduced, and its
//! effects scheduled, before the next action is looked at.
//!
//! ## Example
//!
//! ```ignore
//! use bookclub_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```
//!
//! [`EffectId`]: bookclub_core::effect::EffectId

use bookclub_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is observed.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the action broadcast channel
    pub broadcast_capacity: usize,

    /// Timeout used by [`store::Store::shutdown_default`]
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a new store configuration
    #[must_use]
    pub const fn new(broadcast_capacity: usize, default_shutdown_timeout: Duration) -> Self {
        Self {
            broadcast_capacity,
            default_shutdown_timeout,
        }
    }

    /// Set the action broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 64,
            default_shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle for waiting on the effects started by one `send`
///
/// Only effects scheduled directly by that action are tracked; actions fed
/// back by those effects get handles of their own.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// A handle with nothing to wait for
    #[must_use]
    pub fn completed() -> Self {
        let (_, rx) = watch::channel(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of tracked effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait until every tracked effect has finished (or been cancelled)
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait with an upper bound
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running when the
    /// timeout elapses.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Decrements the per-send counter when a task ends, aborted or not
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicU64, AtomicUsize, DecrementGuard, Duration,
        Effect, EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreConfig, StoreError,
    };
    use bookclub_core::effect::EffectId;
    use futures::future::{BoxFuture, join_all};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::broadcast;
    use tokio::task::AbortHandle;

    /// A running cancellable effect
    struct Registration {
        token: u64,
        abort: AbortHandle,
    }

    type Registry = Arc<Mutex<HashMap<EffectId, Registration>>>;

    /// The Store - runtime coordinator for a reducer
    ///
    /// Holds state behind an async `RwLock`, runs the reducer for every
    /// action, executes returned effects on tokio tasks and feeds any
    /// produced actions back in. Cloning a store yields another handle to
    /// the same state.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        config: StoreConfig,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        action_broadcast: broadcast::Sender<A>,
        cancellations: Registry,
        next_token: Arc<AtomicU64>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Clone + Send + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with default configuration
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                config,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
                cancellations: Arc::new(Mutex::new(HashMap::new())),
                next_token: Arc::new(AtomicU64::new(0)),
            }
        }

        /// The environment this store injects into its reducer
        #[must_use]
        pub const fn environment(&self) -> &E {
            &self.environment
        }

        /// Send an action to the store
        ///
        /// The reducer runs under the state write lock; effects are started
        /// before this returns. The returned handle can be awaited for the
        /// effects this action scheduled directly.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] once shutdown began.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.actions.sent").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let effects = self
                    .reducer
                    .reduce(&mut *state, action.clone(), &self.environment);
                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            // Observers see the action once its state change is visible
            let _ = self.action_broadcast.send(action);

            for effect in effects {
                self.execute_effect(effect, &tracking);
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching action to be reduced
        ///
        /// Subscribes before sending so a fast effect cannot slip past.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`] if nothing matched in time
        /// - [`StoreError::ChannelClosed`] if the broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to every action the store reduces
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read from the current state
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Number of effects still running across all sends
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Stop accepting actions, abort cancellable effects and wait for the rest
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still
        /// running when `timeout` elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            let running: Vec<_> = self.registry().drain().collect();
            for (id, registration) in running {
                tracing::debug!(effect_id = %id, "Aborting cancellable effect on shutdown");
                registration.abort.abort();
            }

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Shut down using the configured default timeout
        ///
        /// # Errors
        ///
        /// See [`Store::shutdown`].
        pub async fn shutdown_default(&self) -> Result<(), StoreError> {
            self.shutdown(self.config.default_shutdown_timeout).await
        }

        fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<EffectId, Registration>> {
            self.cancellations
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }

        /// Spawn a task counted against both the per-send tracking and the
        /// store-wide pending counter
        fn spawn_tracked<F>(&self, tracking: &EffectTracking, task: F) -> tokio::task::JoinHandle<()>
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);

            let guard = DecrementGuard(tracking.clone());
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

            tokio::spawn(async move {
                let _guard = guard;
                let _pending_guard = pending_guard;
                task.await;
            })
        }

        /// Feed an effect-produced action back into the store
        async fn feed_back(&self, action: A) {
            if let Err(error) = self.send(action).await {
                tracing::debug!(%error, "Dropped effect output");
            }
        }

        #[tracing::instrument(skip(self, effect, tracking), name = "execute_effect")]
        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking);
                    }
                },
                Effect::Cancellable { id, effect } => {
                    metrics::counter!("store.effects.executed", "type" => "cancellable")
                        .increment(1);
                    self.start_cancellable(id, *effect, tracking);
                },
                Effect::Cancel { id } => {
                    metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                    let removed = self.registry().remove(&id);
                    if let Some(registration) = removed {
                        tracing::debug!(effect_id = %id, "Cancelling effect");
                        metrics::counter!("store.effects.cancelled").increment(1);
                        registration.abort.abort();
                    }
                },
                effect @ (Effect::Future(_) | Effect::Delay { .. } | Effect::Sequential(_)) => {
                    let store = self.clone();
                    let inner = tracking.clone();
                    self.spawn_tracked(tracking, async move {
                        store.run_inline(effect, inner).await;
                    });
                },
            }
        }

        fn start_cancellable(&self, id: EffectId, effect: Effect<A>, tracking: &EffectTracking) {
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);

            // The registry stays locked until the new task is registered so
            // a fast task cannot deregister before it was recorded.
            let mut registry = self.registry();

            if let Some(previous) = registry.remove(&id) {
                tracing::trace!(effect_id = %id, "Superseding running effect");
                metrics::counter!("store.effects.cancelled").increment(1);
                previous.abort.abort();
            }

            let store = self.clone();
            let inner = tracking.clone();
            let task_id = id.clone();
            let handle = self.spawn_tracked(tracking, async move {
                store.run_inline(effect, inner).await;
                let mut registry = store.registry();
                if registry.get(&task_id).is_some_and(|r| r.token == token) {
                    registry.remove(&task_id);
                }
            });

            registry.insert(
                id,
                Registration {
                    token,
                    abort: handle.abort_handle(),
                },
            );
        }

        /// Run an effect to completion inside the current task
        fn run_inline(&self, effect: Effect<A>, tracking: EffectTracking) -> BoxFuture<'static, ()> {
            let store = self.clone();
            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        metrics::counter!("store.effects.executed", "type" => "future")
                            .increment(1);
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action");
                            store.feed_back(action).await;
                        }
                    },
                    Effect::Delay { duration, action } => {
                        metrics::counter!("store.effects.executed", "type" => "delay")
                            .increment(1);
                        tokio::time::sleep(duration).await;
                        tracing::trace!(?duration, "Effect::Delay elapsed");
                        store.feed_back(*action).await;
                    },
                    Effect::Parallel(effects) => {
                        join_all(
                            effects
                                .into_iter()
                                .map(|effect| store.run_inline(effect, tracking.clone())),
                        )
                        .await;
                    },
                    Effect::Sequential(effects) => {
                        metrics::counter!("store.effects.executed", "type" => "sequential")
                            .increment(1);
                        for effect in effects {
                            store.run_inline(effect, tracking.clone()).await;
                        }
                    },
                    effect @ (Effect::Cancellable { .. } | Effect::Cancel { .. }) => {
                        store.execute_effect(effect, &tracking);
                    },
                }
            })
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
                cancellations: Arc::clone(&self.cancellations),
                next_token: Arc::clone(&self.next_token),
            }
        }
    }
}

pub use store::Store;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bookclub_core::effect::EffectId;
    use bookclub_core::{SmallVec, smallvec};

    #[derive(Debug, Clone, Default)]
    struct TestState {
        value: i32,
        applied: Vec<&'static str>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Increment,
        AddLater { amount: i32, delay_ms: u64 },
        Debounced(&'static str),
        Type(&'static str),
        StopTyping,
        Apply(&'static str),
        Chain,
    }

    #[derive(Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut TestState,
            action: TestAction,
            _env: &(),
        ) -> SmallVec<[Effect<TestAction>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::AddLater { amount, delay_ms } => smallvec![Effect::Future(Box::pin(
                    async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        Some(TestAction::Apply(if amount > 0 { "add" } else { "noop" }))
                    }
                ))],
                TestAction::Type(text) => smallvec![
                    Effect::Delay {
                        duration: Duration::from_millis(400),
                        action: Box::new(TestAction::Debounced(text)),
                    }
                    .cancellable(EffectId::new("typing"))
                ],
                TestAction::StopTyping => smallvec![Effect::Cancel {
                    id: EffectId::new("typing")
                }],
                TestAction::Debounced(text) | TestAction::Apply(text) => {
                    state.applied.push(text);
                    smallvec![Effect::None]
                },
                TestAction::Chain => smallvec![Effect::chain(vec![
                    Effect::Delay {
                        duration: Duration::from_millis(10),
                        action: Box::new(TestAction::Apply("first")),
                    },
                    Effect::Delay {
                        duration: Duration::from_millis(10),
                        action: Box::new(TestAction::Apply("second")),
                    },
                ])],
            }
        }
    }

    fn store() -> Store<TestState, TestAction, (), TestReducer> {
        Store::new(TestState::default(), TestReducer, ())
    }

    #[tokio::test]
    async fn send_reduces_synchronously() {
        let store = store();
        store.send(TestAction::Increment).await.unwrap();
        store.send(TestAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 2);
    }

    #[tokio::test]
    async fn future_output_is_fed_back() {
        let store = store();
        let mut handle = store
            .send(TestAction::AddLater {
                amount: 1,
                delay_ms: 5,
            })
            .await
            .unwrap();
        handle.wait().await;
        assert_eq!(store.state(|s| s.applied.clone()).await, vec!["add"]);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_cancellable_effect_supersedes_running_one() {
        let store = store();
        store.send(TestAction::Type("ab")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.send(TestAction::Type("abc")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut last = store.send(TestAction::Type("abcd")).await.unwrap();
        last.wait().await;

        assert_eq!(store.state(|s| s.applied.clone()).await, vec!["abcd"]);
        assert_eq!(store.pending_effects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_the_registered_effect() {
        let store = store();
        let mut typing = store.send(TestAction::Type("draft")).await.unwrap();
        store.send(TestAction::StopTyping).await.unwrap();
        typing.wait().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(store.state(|s| s.applied.is_empty()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_effects_run_in_order() {
        let store = store();
        let mut handle = store.send(TestAction::Chain).await.unwrap();
        handle.wait().await;
        assert_eq!(
            store.state(|s| s.applied.clone()).await,
            vec!["first", "second"]
        );
    }

    #[tokio::test]
    async fn send_and_wait_for_observes_fed_back_action() {
        let store = store();
        let action = store
            .send_and_wait_for(
                TestAction::AddLater {
                    amount: 1,
                    delay_ms: 1,
                },
                |a| matches!(a, TestAction::Apply(_)),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(action, TestAction::Apply("add"));
    }

    #[tokio::test(start_paused = true)]
    async fn send_and_wait_for_times_out() {
        let store = store();
        let result = store
            .send_and_wait_for(
                TestAction::Increment,
                |a| matches!(a, TestAction::Apply(_)),
                Duration::from_millis(50),
            )
            .await;
        assert_eq!(result.unwrap_err(), StoreError::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rejects_new_actions_and_aborts_timers() {
        let store = store();
        store.send(TestAction::Type("pending")).await.unwrap();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(
            store.send(TestAction::Increment).await.unwrap_err(),
            StoreError::ShutdownInProgress
        );
        assert!(store.state(|s| s.applied.is_empty()).await);
    }

    #[tokio::test]
    async fn completed_handle_does_not_block() {
        let mut handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        handle
            .wait_with_timeout(Duration::from_millis(10))
            .await
            .unwrap();
    }
}
