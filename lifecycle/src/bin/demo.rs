//! Walks a homecare booking and an emergency call through a store.
//!
//! Configuration comes from `CARELANE_*` environment variables (a `.env`
//! file is honoured); logging from `RUST_LOG`.

use carelane_core::environment::SystemClock;
use carelane_lifecycle::status::{EmergencyStatus, HomecareStatus};
use carelane_lifecycle::types::{ActorKind, GeoPoint, LineItem, ProviderId, SubjectId, Urgency};
use carelane_lifecycle::{
    Actor, Caller, DomainType, InMemoryRequestRepository, LifecycleAction, LifecycleConfig,
    LifecycleEnvironment, LifecycleReducer, LifecycleState, Money, RequestDraft, RequestId,
    Status, StatsQuery, TransitionPayload,
};
use carelane_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type LifecycleStore = Store<LifecycleState, LifecycleAction, LifecycleEnvironment, LifecycleReducer>;

async fn dispatch(store: &LifecycleStore, action: LifecycleAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut handle = store.send(action).await?;
    if handle.wait_with_timeout(Duration::from_secs(1)).await.is_err() {
        info!(pending = handle.pending(), "Effects still pending (SLA timers)");
    }

    if let Some(error) = store.state(|s| s.last_error.clone()).await {
        warn!(%error, "Command rejected");
    }
    Ok(())
}

async fn newest_request(store: &LifecycleStore) -> Option<RequestId> {
    store
        .state(|s| {
            s.requests
                .values()
                .max_by_key(|r| (r.created_at, r.id))
                .map(|r| r.id)
        })
        .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carelane_lifecycle=info,carelane_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LifecycleConfig::from_env();
    info!(
        tax_rate_bps = config.pricing.tax_rate_bps,
        emergency_timeout = ?config.emergency.accept_timeout,
        "Configuration loaded"
    );

    let repository = Arc::new(InMemoryRequestRepository::new());
    let env = LifecycleEnvironment::new(Arc::new(SystemClock), config, repository.clone());
    let store = Store::new(LifecycleState::default(), LifecycleReducer, env);

    let provider = ProviderId::new();
    let client = SubjectId::new();
    let home = GeoPoint::new(30.0444, 31.2357);

    for actor in [
        Actor::new(provider, "Nurse Amal", ActorKind::Caregiver, 2)
            .with_capability("wound-care")
            .at(GeoPoint::new(30.05, 31.24)),
        Actor::new(provider, "Nurse Youssef", ActorKind::Caregiver, 2)
            .with_capability("wound-care")
            .at(GeoPoint::new(30.2, 31.4)),
        Actor::new(provider, "Medic 7", ActorKind::Paramedic, 1).at(GeoPoint::new(30.04, 31.23)),
    ] {
        dispatch(&store, LifecycleAction::RegisterActor { actor }).await?;
    }

    // Homecare booking: confirm, start, complete
    let booking = RequestDraft::new(DomainType::HomecareBooking, provider, client, "Mrs. Haddad")
        .service_type("wound care")
        .requires("wound-care")
        .at(home)
        .item(LineItem::new("Home visit", 2, Money::from_cents(4_500)));
    dispatch(&store, LifecycleAction::SubmitRequest { draft: booking }).await?;
    let Some(booking_id) = newest_request(&store).await else {
        return Err("booking was not created".into());
    };

    let staff = Caller::staff(provider);
    dispatch(&store, LifecycleAction::AssignActor { id: booking_id, caller: staff }).await?;
    for target in [HomecareStatus::InProgress, HomecareStatus::Completed] {
        dispatch(
            &store,
            LifecycleAction::RequestTransition {
                id: booking_id,
                target: Status::HomecareBooking(target),
                caller: staff,
                payload: TransitionPayload::default(),
            },
        )
        .await?;
    }

    // Emergency: paid by the client, accepted by the crew. The client may no
    // longer cancel once a crew is bound; the provider can.
    let call = RequestDraft::new(DomainType::Emergency, provider, client, "Mrs. Haddad")
        .service_type("cardiac")
        .urgency(Urgency::Critical)
        .at(home)
        .distance_km(4.2);
    dispatch(&store, LifecycleAction::SubmitRequest { draft: call }).await?;
    let Some(call_id) = newest_request(&store).await else {
        return Err("emergency was not created".into());
    };

    dispatch(
        &store,
        LifecycleAction::RequestTransition {
            id: call_id,
            target: Status::Emergency(EmergencyStatus::Paid),
            caller: Caller::client(client),
            payload: TransitionPayload::default(),
        },
    )
    .await?;
    dispatch(&store, LifecycleAction::AssignActor { id: call_id, caller: Caller::operator(provider) })
        .await?;
    dispatch(
        &store,
        LifecycleAction::RequestTransition {
            id: call_id,
            target: Status::Emergency(EmergencyStatus::Cancelled),
            caller: Caller::client(client),
            payload: TransitionPayload::reason("patient recovered"),
        },
    )
    .await?;
    dispatch(
        &store,
        LifecycleAction::RequestTransition {
            id: call_id,
            target: Status::Emergency(EmergencyStatus::Cancelled),
            caller: Caller::provider(provider),
            payload: TransitionPayload::reason("patient recovered"),
        },
    )
    .await?;

    let stats = store.state(|s| s.stats(&StatsQuery::default())).await;
    info!(
        total = stats.total,
        completed = stats.completed,
        cancelled = stats.cancelled,
        completion_rate = stats.completion_rate,
        revenue = %stats.total_revenue,
        average_response_minutes = ?stats.average_minutes,
        persisted = repository.len().await,
        "Demo finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
