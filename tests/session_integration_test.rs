//! Session wiring: push channel into the notification log, import polling
//! into metrics refresh, and the REST-backed dashboard loader.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use httpmock::Method::GET;
use httpmock::MockServer;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::{timeout, Instant};

use common::{MockJobApi, MockPushTransport};
use offerwatch_lib::api::ApiClient;
use offerwatch_lib::bus::event_types::{
    triggers_metrics_refresh, EVENT_IMPORT_COMPLETED, EVENT_NOTIFICATION_RECEIVED,
};
use offerwatch_lib::bus::SyncEvent;
use offerwatch_lib::channel::ChannelState;
use offerwatch_lib::metrics::loader::AnalyticsSource;
use offerwatch_lib::metrics::LoadRequest;
use offerwatch_lib::poller::{PollerState, StartOutcome};
use offerwatch_lib::session::SessionParts;
use offerwatch_lib::{Session, SessionContext, SyncConfig};

fn offline_session(transport: Arc<MockPushTransport>, jobs: Arc<MockJobApi>) -> Session {
    let config = SyncConfig::default();
    let analytics = Arc::new(
        ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1), None)
            .expect("client should build"),
    );
    Session::with_parts(
        &config,
        SessionContext::new("alice", "tok-123"),
        SessionParts {
            transport,
            jobs,
            analytics,
        },
    )
}

async fn next_matching<F>(events: &mut broadcast::Receiver<SyncEvent>, matches: F) -> SyncEvent
where
    F: Fn(&SyncEvent) -> bool,
{
    timeout(Duration::from_secs(120), async {
        loop {
            let event = events.recv().await.expect("bus closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not published in time")
}

#[tokio::test(start_paused = true)]
async fn pushed_events_reach_the_log_in_order() {
    let transport = MockPushTransport::new();
    let session = offline_session(transport.clone(), Arc::new(MockJobApi::finishing_after(0)));
    let mut events = session.bus().subscribe();

    session.start();
    transport.wait_for_connects(1).await;
    assert_eq!(transport.last_bearer().as_deref(), Some("Bearer tok-123"));

    transport.push(
        json!({
            "type": "offer_update",
            "offer_id": 7,
            "offer_number": "OFF-7",
            "status": "ACCETTATA",
            "message": "Offer OFF-7 accepted"
        })
        .to_string(),
    );
    transport.push("not json at all");
    transport.push(r#"{"message":"Import finished"}"#);

    next_matching(&mut events, |event| event.is(EVENT_NOTIFICATION_RECEIVED)).await;
    let second = next_matching(&mut events, |event| event.is(EVENT_NOTIFICATION_RECEIVED)).await;
    assert_eq!(second.payload["unread"], 2);

    let log = session.notifications().snapshot();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].message, "Import finished");
    let update = log[1].offer_update().expect("typed offer update");
    assert_eq!(update.offer_id, 7);
    assert_eq!(update.status.as_deref(), Some("ACCETTATA"));

    assert!(session.notifications().mark_read(log[1].id));
    assert!(!session.notifications().mark_read(log[1].id));
    assert_eq!(session.notifications().unread_count(), 1);
    assert_eq!(session.channel().state(), ChannelState::Connected);
}

#[tokio::test(start_paused = true)]
async fn dropped_channel_reconnects_until_shutdown() {
    let transport = MockPushTransport::new();
    let session = offline_session(transport.clone(), Arc::new(MockJobApi::finishing_after(0)));
    session.start();
    transport.wait_for_connects(1).await;

    let dropped_at = Instant::now();
    transport.drop_connection();
    transport.wait_for_connects(2).await;
    assert!(dropped_at.elapsed() >= Duration::from_secs(5));

    transport.push(r#"{"message":"after reconnect"}"#);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.notifications().len(), 1);

    session.shutdown();
    session.shutdown();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connects(), 2);
    assert_eq!(session.channel().state(), ChannelState::Idle);
}

#[tokio::test(start_paused = true)]
async fn finished_import_requests_metrics_refresh() {
    let transport = MockPushTransport::new();
    let jobs = Arc::new(MockJobApi::finishing_after(2));
    let session = offline_session(transport, jobs.clone());
    let mut events = session.bus().subscribe();

    assert_eq!(session.poller().start().await.unwrap(), StartOutcome::Started);
    assert_eq!(session.poller().start().await.unwrap(), StartOutcome::AlreadyRunning);

    let completed = next_matching(&mut events, |event| event.is(EVENT_IMPORT_COMPLETED)).await;
    assert_eq!(completed.category, "import");
    next_matching(&mut events, triggers_metrics_refresh).await;

    assert_eq!(session.poller().state(), PollerState::Completed);
    assert_eq!(jobs.triggers.load(Ordering::SeqCst), 1);
    assert_eq!(jobs.samples.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_session_stops_polling() {
    let transport = MockPushTransport::new();
    let jobs = Arc::new(MockJobApi::finishing_after(usize::MAX));
    let session = offline_session(transport.clone(), jobs.clone());

    session.start();
    session.poller().start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(3_100)).await;
    let sampled = jobs.samples.load(Ordering::SeqCst);
    assert_eq!(sampled, 1);

    drop(session);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(jobs.samples.load(Ordering::SeqCst), sampled);
    assert_eq!(transport.connects(), 1);
}

#[tokio::test]
async fn loader_reads_analytics_through_the_session() {
    let server = MockServer::start();
    let monthly = server.mock(|when, then| {
        when.method(GET)
            .path("/analytics/monthly-evolution/2025")
            .header("authorization", "Bearer tok-123");
        then.status(200).json_body(json!([
            { "month": "January", "requests": 10, "accepted": 5, "order_value": 1000.0 },
            { "month": "February", "requests": 20, "accepted": 15, "order_value": 2500.5 }
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/dashboard/stats");
        then.status(200).json_body(json!({
            "total_offers": 30,
            "accepted": 20,
            "in_progress": 10,
            "total_value": 3500.5
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/analytics/item-mix/2025");
        then.status(401).json_body(json!({ "detail": "expired" }));
    });

    let config = SyncConfig {
        api_url: server.base_url(),
        ..SyncConfig::default()
    };
    let session = Session::connect(&config, SessionContext::new("alice", "tok-123"))
        .expect("session should build");

    let snapshot = session.loader().load(&LoadRequest::for_year(2025)).await;

    monthly.assert();
    assert_eq!(snapshot.totals().requests, 30);
    assert_eq!(snapshot.stats.total_offers, 30);
    assert!(snapshot.unauthorized());
    assert!(snapshot
        .failures
        .iter()
        .any(|failure| failure.source == AnalyticsSource::ItemMix && failure.unauthorized));
    assert_eq!(snapshot.failures.len(), 9);
}
