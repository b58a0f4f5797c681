//! # Carelane Runtime
//!
//! Runtime for hosting Carelane reducers.
//!
//! The [`Store`] owns reducer state behind a `tokio::sync::RwLock`. Every
//! action is reduced while holding the write lock, which makes each reducer
//! call a critical section: two concurrent "assign" actions against the same
//! request, or two requests competing for the last free slot of an actor,
//! are serialised and observe each other's effects on state.
//!
//! Effects returned by the reducer run *after* the lock is released, so
//! persistence and timers never extend the critical section.
//!
//! ## Example
//!
//! ```ignore
//! use carelane_runtime::Store;
//!
//! let store = Store::new(LifecycleState::default(), LifecycleReducer, environment);
//!
//! store.send(LifecycleAction::RegisterActor { actor }).await?;
//!
//! let open = store.state(|s| s.requests.len()).await;
//! ```

use carelane_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Timed out waiting for an action's effects to finish
        #[error("Timed out waiting for effects after {0:?}")]
        Timeout(std::time::Duration),
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] so callers (mostly tests and the demo
/// binary) can wait until the effects spawned by one action have finished.
/// Only effects spawned directly by the action are tracked; actions fed back
/// by those effects get their own handles.
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

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracking) = Self::new();
        handle
    }

    /// Number of tracked effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all tracked effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all tracked effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout(timeout))
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Internal: effect counter shared by every effect spawned for one action
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

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Keeps the counter honest even if the effect's future panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, DecrementGuard, Effect, EffectHandle, EffectTracking, Ordering, Reducer, RwLock,
        StoreError,
    };
    use tokio::sync::watch;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
            }
        }

        /// Send an action to the store
        ///
        /// The action is reduced under the state's write lock; the returned
        /// effects are then spawned and tracked by the returned handle.
        ///
        /// # Errors
        ///
        /// Currently infallible; the `Result` leaves room for admission
        /// control without changing callers.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            tracing::debug!("Processing action");
            metrics::counter!("store.commands.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect_internal(effect, tracking.clone());
            }

            Ok(handle)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let open = store.state(|s| s.requests.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        fn execute_effect_internal(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();

                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking);
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            let _ = store.send(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    tracing::trace!("Executing Effect::Delay (duration: {:?})", duration);
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    tracking.increment();

                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking);
                        tokio::time::sleep(duration).await;
                        tracing::trace!("Effect::Delay elapsed, sending action");
                        let _ = store.send(*action).await;
                    });
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect_internal(effect, tracking.clone());
                    }
                },
                Effect::Sequential(effects) => {
                    let effect_count = effects.len();
                    metrics::counter!("store.effects.executed", "type" => "sequential").increment(1);
                    tracking.increment();

                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = DecrementGuard(tracking);

                        for (idx, effect) in effects.into_iter().enumerate() {
                            tracing::trace!(
                                "Executing sequential effect {} of {}",
                                idx + 1,
                                effect_count
                            );

                            let (sub_tx, mut sub_rx) = watch::channel(());
                            let sub_tracking = EffectTracking {
                                counter: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
                                notifier: Arc::new(sub_tx),
                            };

                            store.execute_effect_internal(effect, sub_tracking.clone());

                            while sub_tracking.counter.load(Ordering::SeqCst) > 0 {
                                if sub_rx.changed().await.is_err() {
                                    break;
                                }
                            }
                        }
                    });
                },
            }
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
            }
        }
    }
}

pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use carelane_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};

    // A waiting-room counter: enough to exercise every effect shape.
    #[derive(Debug, Clone, Default)]
    struct WaitingRoom {
        waiting: i32,
        log: Vec<&'static str>,
    }

    #[derive(Debug, Clone)]
    enum RoomAction {
        Arrive,
        Leave,
        ArriveLater,
        ArriveInBatch,
        ArriveSoon,
        Note(&'static str),
        NoteInOrder,
    }

    #[derive(Debug, Clone)]
    struct RoomEnv;

    #[derive(Debug, Clone)]
    struct RoomReducer;

    impl Reducer for RoomReducer {
        type State = WaitingRoom;
        type Action = RoomAction;
        type Environment = RoomEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                RoomAction::Arrive => {
                    state.waiting += 1;
                    smallvec![Effect::None]
                },
                RoomAction::Leave => {
                    state.waiting -= 1;
                    smallvec![Effect::None]
                },
                RoomAction::ArriveLater => smallvec![Effect::Delay {
                    duration: Duration::from_millis(10),
                    action: Box::new(RoomAction::Arrive),
                }],
                RoomAction::ArriveInBatch => smallvec![Effect::merge(vec![
                    Effect::Future(Box::pin(async { Some(RoomAction::Arrive) })),
                    Effect::Future(Box::pin(async { Some(RoomAction::Arrive) })),
                ])],
                RoomAction::ArriveSoon => smallvec![Effect::Future(Box::pin(async {
                    Some(RoomAction::Arrive)
                }))],
                RoomAction::Note(entry) => {
                    state.log.push(entry);
                    smallvec![Effect::None]
                },
                RoomAction::NoteInOrder => smallvec![Effect::chain(vec![
                    Effect::Future(Box::pin(async { Some(RoomAction::Note("first")) })),
                    Effect::Future(Box::pin(async { Some(RoomAction::Note("second")) })),
                ])],
            }
        }
    }

    #[tokio::test]
    async fn send_reduces_synchronously() {
        let store = Store::new(WaitingRoom::default(), RoomReducer, RoomEnv);

        let _ = store.send(RoomAction::Arrive).await;
        let _ = store.send(RoomAction::Arrive).await;
        let _ = store.send(RoomAction::Leave).await;

        assert_eq!(store.state(|s| s.waiting).await, 1);
    }

    #[tokio::test]
    async fn future_effect_feeds_back() -> Result<(), StoreError> {
        let store = Store::new(WaitingRoom::default(), RoomReducer, RoomEnv);

        let mut handle = store.send(RoomAction::ArriveSoon).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await?;

        assert_eq!(store.state(|s| s.waiting).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn delay_effect_fires_later() -> Result<(), StoreError> {
        let store = Store::new(WaitingRoom::default(), RoomReducer, RoomEnv);

        let mut handle = store.send(RoomAction::ArriveLater).await?;
        assert_eq!(store.state(|s| s.waiting).await, 0);

        handle.wait_with_timeout(Duration::from_secs(1)).await?;
        assert_eq!(store.state(|s| s.waiting).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn parallel_effects_all_run() -> Result<(), StoreError> {
        let store = Store::new(WaitingRoom::default(), RoomReducer, RoomEnv);

        let mut handle = store.send(RoomAction::ArriveInBatch).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await?;

        assert_eq!(store.state(|s| s.waiting).await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn sequential_effects_keep_order() -> Result<(), StoreError> {
        let store = Store::new(WaitingRoom::default(), RoomReducer, RoomEnv);

        let mut handle = store.send(RoomAction::NoteInOrder).await?;
        handle.wait_with_timeout(Duration::from_secs(1)).await?;

        assert_eq!(store.state(|s| s.log.clone()).await, vec!["first", "second"]);
        Ok(())
    }

    #[tokio::test]
    #[allow(clippy::panic)]
    async fn concurrent_sends_are_serialised() {
        let store = Store::new(WaitingRoom::default(), RoomReducer, RoomEnv);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let _ = store.send(RoomAction::Arrive).await;
                })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                panic!("concurrent send task panicked: {e}");
            }
        }

        assert_eq!(store.state(|s| s.waiting).await, 20);
    }

    #[tokio::test]
    async fn completed_handle_does_not_block() -> Result<(), StoreError> {
        let mut handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        handle.wait_with_timeout(Duration::from_millis(10)).await
    }
}
