//! Concurrency tests for the last-slot problem.
//!
//! Many callers race to bind the same actor. Whatever the interleaving, the
//! actor's load must never exceed its capacity and exactly one caller wins.
//!
//! Run with: `cargo test --test concurrency_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/expect

use carelane_core::reducer::Reducer;
use carelane_lifecycle::error::AssignmentError;
use carelane_lifecycle::types::ActorKind;
use carelane_lifecycle::{
    Actor, Caller, DomainType, InMemoryRequestRepository, LifecycleAction, LifecycleConfig,
    LifecycleEnvironment, LifecycleError, LifecycleReducer, LifecycleState, ProviderId,
    RequestDraft, RequestId, RequestRepository, Status, SubjectId, TransitionPayload,
};
use carelane_lifecycle::status::HomecareStatus;
use carelane_runtime::Store;
use carelane_testing::test_clock;
use std::sync::{Arc, Mutex};

const CONTENDERS: usize = 100;

fn environment() -> LifecycleEnvironment {
    LifecycleEnvironment::new(
        Arc::new(test_clock()),
        LifecycleConfig::default(),
        Arc::new(InMemoryRequestRepository::new()),
    )
}

/// A roster with one single-slot caregiver and `n` pending bookings.
fn contested_state(n: usize) -> (LifecycleState, ProviderId, Vec<RequestId>) {
    let provider = ProviderId::new();
    let env = environment();
    let mut state = LifecycleState::default();

    let _ = LifecycleReducer.reduce(
        &mut state,
        LifecycleAction::RegisterActor {
            actor: Actor::new(provider, "Only nurse", ActorKind::Caregiver, 1),
        },
        &env,
    );
    for i in 0..n {
        let draft = RequestDraft::new(
            DomainType::HomecareBooking,
            provider,
            SubjectId::new(),
            format!("Client {i}"),
        );
        let _ = LifecycleReducer.reduce(&mut state, LifecycleAction::SubmitRequest { draft }, &env);
    }

    let ids = state.requests.keys().copied().collect();
    (state, provider, ids)
}

/// 100 concurrent assignments against one actor with `max_concurrent = 1`.
///
/// Verifies that:
/// - Exactly 1 assignment succeeds
/// - Exactly 99 fail with `NoEligibleActor`
/// - The actor's load ends at 1
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_slot_one_winner() {
    let (initial, provider, ids) = contested_state(CONTENDERS);
    let state = Arc::new(Mutex::new(initial));
    let env = Arc::new(environment());

    let mut handles = Vec::with_capacity(CONTENDERS);
    for id in ids {
        let state = Arc::clone(&state);
        let env = Arc::clone(&env);

        handles.push(tokio::spawn(async move {
            let mut guard = state.lock().unwrap();
            let _effects = LifecycleReducer.reduce(
                &mut guard,
                LifecycleAction::AssignActor {
                    id,
                    caller: Caller::staff(provider),
                },
                &env,
            );
            guard.last_error.clone()
        }));
    }

    let mut wins = 0;
    let mut no_eligible = 0;
    for handle in handles {
        match handle.await.unwrap() {
            None => wins += 1,
            Some(LifecycleError::Assignment(AssignmentError::NoEligibleActor)) => no_eligible += 1,
            Some(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(no_eligible, CONTENDERS - 1);

    let state = state.lock().unwrap();
    assert_eq!(state.actors[0].current_load, 1);
    let confirmed = state
        .requests
        .values()
        .filter(|r| r.status == Status::HomecareBooking(HomecareStatus::Confirmed))
        .count();
    assert_eq!(confirmed, 1);
}

/// The same race through the store, which serialises reductions itself.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn store_serialises_competing_assignments() {
    let (initial, provider, ids) = contested_state(CONTENDERS);
    let store = Store::new(initial, LifecycleReducer, environment());

    let mut handles = Vec::with_capacity(CONTENDERS);
    for id in ids.iter().copied() {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut handle = store
                .send(LifecycleAction::AssignActor {
                    id,
                    caller: Caller::staff(provider),
                })
                .await
                .unwrap();
            handle.wait().await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let (load, assigned) = store
        .state(|s| {
            let assigned = s
                .requests
                .values()
                .filter(|r| r.assigned_actor_id.is_some())
                .count();
            (s.actors[0].current_load, assigned)
        })
        .await;
    assert_eq!(load, 1);
    assert_eq!(assigned, 1);
}

/// Releasing the slot lets the next booking in.
#[tokio::test]
async fn released_slot_is_reusable() {
    let (initial, provider, ids) = contested_state(2);
    let store = Store::new(initial, LifecycleReducer, environment());
    let staff = Caller::staff(provider);

    for id in &ids {
        store
            .send(LifecycleAction::AssignActor { id: *id, caller: staff })
            .await
            .unwrap()
            .wait()
            .await;
    }
    let winner = store
        .state(|s| {
            s.requests
                .values()
                .find(|r| r.assigned_actor_id.is_some())
                .map(|r| r.id)
        })
        .await
        .expect("one booking holds the nurse");
    let loser = ids.iter().copied().find(|id| *id != winner).unwrap();

    store
        .send(LifecycleAction::RequestTransition {
            id: winner,
            target: Status::HomecareBooking(HomecareStatus::Cancelled),
            caller: staff,
            payload: TransitionPayload::reason("client travelling"),
        })
        .await
        .unwrap()
        .wait()
        .await;
    store
        .send(LifecycleAction::AssignActor { id: loser, caller: staff })
        .await
        .unwrap()
        .wait()
        .await;

    let status = store.state(move |s| s.request(loser).map(|r| r.status)).await;
    assert_eq!(status, Some(Status::HomecareBooking(HomecareStatus::Confirmed)));
    assert_eq!(store.state(|s| s.actors[0].current_load).await, 1);
}

/// Saves spawned back to back may finish in either order; the repository
/// must still end on the request the state holds.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn back_to_back_saves_converge_on_latest_version() {
    for _ in 0..50 {
        let repository = Arc::new(InMemoryRequestRepository::new());
        let env = LifecycleEnvironment::new(
            Arc::new(test_clock()),
            LifecycleConfig::default(),
            repository.clone(),
        );
        let store = Store::new(LifecycleState::default(), LifecycleReducer, env);
        let provider = ProviderId::new();
        let draft = RequestDraft::new(
            DomainType::HomecareBooking,
            provider,
            SubjectId::new(),
            "Client",
        );

        let mut submitted = store
            .send(LifecycleAction::SubmitRequest { draft })
            .await
            .unwrap();
        let id = store
            .state(|s| s.requests.keys().next().copied())
            .await
            .expect("request submitted");
        let mut cancelled = store
            .send(LifecycleAction::RequestTransition {
                id,
                target: Status::HomecareBooking(HomecareStatus::Cancelled),
                caller: Caller::staff(provider),
                payload: TransitionPayload::reason("duplicate booking"),
            })
            .await
            .unwrap();
        submitted.wait().await;
        cancelled.wait().await;

        let held = store.state(move |s| s.request(id).cloned()).await.unwrap();
        let stored = repository.load(id).await.unwrap();
        assert_eq!(stored, held);
        assert_eq!(store.state(|s| s.last_error.clone()).await, None);
    }
}
