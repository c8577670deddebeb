//! Live subscriptions: channel dedup, fan-out, tenant scoping, cache
//! interplay, and sign-out teardown.

use campus_data::{ChangeEvent, ChangeKind, DataConfig, DataService, FilterSet, QueryParams};
use campus_test_utils::{
    seed_active_tenant, student_row, Filter, MemoryBackend, StorageBackend, TenantFixture,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const EVENT_WAIT: Duration = Duration::from_secs(1);
const QUIET_WAIT: Duration = Duration::from_millis(150);

async fn setup() -> (Arc<MemoryBackend>, DataService, TenantFixture) {
    let backend = Arc::new(MemoryBackend::new());
    let fixture = seed_active_tenant(&backend, "greenfield").await;
    let service = DataService::new(Arc::clone(&backend) as _, DataConfig::default());
    (backend, service, fixture)
}

fn forwarding_callback() -> (
    impl Fn(&ChangeEvent) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<ChangeEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |event: &ChangeEvent| {
        let _ = tx.send(event.clone());
    };
    (callback, rx)
}

#[tokio::test]
async fn test_identical_subscriptions_share_one_channel_and_fan_out() {
    let (_backend, service, fixture) = setup().await;
    let session = fixture.session();

    let (cb_a, mut rx_a) = forwarding_callback();
    let (cb_b, mut rx_b) = forwarding_callback();

    let handle_a = service
        .subscribe(&session, "students", FilterSet::new(), cb_a)
        .await
        .unwrap();
    let handle_b = service
        .subscribe(&session, "students", FilterSet::new(), cb_b)
        .await
        .unwrap();
    assert_eq!(
        service.subscriptions().channel_count(),
        1,
        "identical keys must share one underlying channel"
    );

    service
        .create(&session, "students", student_row("Asha", "c-1"))
        .await
        .unwrap();

    let event_a = timeout(EVENT_WAIT, rx_a.recv()).await.unwrap().unwrap();
    let event_b = timeout(EVENT_WAIT, rx_b.recv()).await.unwrap().unwrap();
    assert_eq!(event_a.kind, ChangeKind::Insert);
    assert_eq!(event_a, event_b);

    // Unsubscribing one callback leaves the other receiving events.
    handle_a.unsubscribe();
    assert_eq!(service.subscriptions().channel_count(), 1);

    service
        .create(&session, "students", student_row("Vik", "c-1"))
        .await
        .unwrap();
    let second = timeout(EVENT_WAIT, rx_b.recv()).await.unwrap().unwrap();
    assert_eq!(
        second.new_row.as_ref().unwrap().get("name"),
        Some(&json!("Vik"))
    );
    // The detached callback (and its channel sender) is gone: either the
    // channel reports closed or nothing arrives.
    assert!(
        timeout(QUIET_WAIT, rx_a.recv()).await.unwrap_or(None).is_none(),
        "detached callback must not receive further events"
    );

    // The last unsubscribe closes the channel.
    handle_b.unsubscribe();
    assert_eq!(service.subscriptions().channel_count(), 0);
}

#[tokio::test]
async fn test_events_are_scoped_to_the_subscribers_tenant() {
    let backend = Arc::new(MemoryBackend::new());
    let green = seed_active_tenant(&backend, "greenfield").await;
    let hill = seed_active_tenant(&backend, "hillside").await;
    let service = DataService::new(Arc::clone(&backend) as _, DataConfig::default());

    let (callback, mut rx) = forwarding_callback();
    let _handle = service
        .subscribe(&green.session(), "students", FilterSet::new(), callback)
        .await
        .unwrap();

    service
        .create(&hill.session(), "students", student_row("Mira", "c-2"))
        .await
        .unwrap();
    assert!(
        timeout(QUIET_WAIT, rx.recv()).await.is_err(),
        "another tenant's writes must never reach this subscription"
    );

    service
        .create(&green.session(), "students", student_row("Asha", "c-1"))
        .await
        .unwrap();
    let event = timeout(EVENT_WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.tenant_id, Some(green.tenant_id));
}

#[tokio::test]
async fn test_subscription_filters_select_matching_rows_only() {
    let (_backend, service, fixture) = setup().await;
    let session = fixture.session();

    let (callback, mut rx) = forwarding_callback();
    let _handle = service
        .subscribe(
            &session,
            "students",
            FilterSet::new().with(Filter::eq("class_id", json!("c-1"))),
            callback,
        )
        .await
        .unwrap();

    service
        .create(&session, "students", student_row("Other", "c-9"))
        .await
        .unwrap();
    assert!(timeout(QUIET_WAIT, rx.recv()).await.is_err());

    service
        .create(&session, "students", student_row("Match", "c-1"))
        .await
        .unwrap();
    let event = timeout(EVENT_WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(
        event.new_row.as_ref().unwrap().get("name"),
        Some(&json!("Match"))
    );
}

#[tokio::test]
async fn test_non_matching_change_still_invalidates_table_cache() {
    let (backend, service, fixture) = setup().await;
    let session = fixture.session();

    // A narrowly-filtered subscription is the only channel on the table.
    let (callback, mut rx) = forwarding_callback();
    let _handle = service
        .subscribe(
            &session,
            "students",
            FilterSet::new().with(Filter::eq("class_id", json!("c-1"))),
            callback,
        )
        .await
        .unwrap();

    let broad = service
        .read(&session, "students", QueryParams::new())
        .await
        .unwrap();
    assert!(broad.rows.is_empty());
    assert_eq!(service.cache().len(), 1);

    // An out-of-band write the filter does NOT match must still invalidate
    // the table's cached reads; only callback dispatch is predicate-gated.
    let mut external = student_row("Other", "c-9");
    external.insert("tenant_id".into(), json!(fixture.tenant_id.to_string()));
    backend.insert("students", vec![external]).await.unwrap();

    let mut invalidated = false;
    for _ in 0..100 {
        if service.cache().is_empty() {
            invalidated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(invalidated, "non-matching change must invalidate the table cache");
    assert!(
        timeout(QUIET_WAIT, rx.recv()).await.is_err(),
        "non-matching change must not reach the callback"
    );

    let refreshed = service
        .read(&session, "students", QueryParams::new())
        .await
        .unwrap();
    assert!(!refreshed.from_cache);
    assert_eq!(refreshed.rows.len(), 1);
}

#[tokio::test]
async fn test_change_notification_invalidates_the_cache() {
    let (backend, service, fixture) = setup().await;
    let session = fixture.session();

    let (callback, mut rx) = forwarding_callback();
    let _handle = service
        .subscribe(&session, "students", FilterSet::new(), callback)
        .await
        .unwrap();

    service
        .create(&session, "students", student_row("Asha", "c-1"))
        .await
        .unwrap();
    let _ = timeout(EVENT_WAIT, rx.recv()).await.unwrap().unwrap();

    let cached = service
        .read(&session, "students", QueryParams::new())
        .await
        .unwrap();
    assert!(!cached.from_cache);

    // A write that bypasses the service (another process) still invalidates
    // the cache through the change feed.
    let mut external = student_row("External", "c-1");
    external.insert("tenant_id".into(), json!(fixture.tenant_id.to_string()));
    backend.insert("students", vec![external]).await.unwrap();
    let _ = timeout(EVENT_WAIT, rx.recv()).await.unwrap().unwrap();

    let refreshed = service
        .read(&session, "students", QueryParams::new())
        .await
        .unwrap();
    assert!(
        !refreshed.from_cache,
        "change notification must invalidate the cached read"
    );
    assert_eq!(refreshed.rows.len(), 2);
}

#[tokio::test]
async fn test_sign_out_tears_down_tenant_channels() {
    let (_backend, service, fixture) = setup().await;
    let session = fixture.session();

    let (callback, mut rx) = forwarding_callback();
    let _handle = service
        .subscribe(&session, "students", FilterSet::new(), callback)
        .await
        .unwrap();
    assert_eq!(service.subscriptions().channel_count(), 1);

    service.end_session(&session);
    assert_eq!(service.subscriptions().channel_count(), 0);

    service
        .create(&session, "students", student_row("Late", "c-1"))
        .await
        .unwrap();
    assert!(
        timeout(QUIET_WAIT, rx.recv()).await.unwrap_or(None).is_none(),
        "a torn-down session must not receive live updates"
    );
}
