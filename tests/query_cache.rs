//! Read side of the case client: de-duplication, cancellation, retries and
//! targeted change notification.

mod support;

use std::sync::Arc;
use std::time::Duration;

use caseflow::application::policy::{case_key, cases_key};
use caseflow::cache::{ErrorKind, QueryData, QueryFilter, QueryStatus, ServiceError};
use caseflow::domain::cases::UpdateStatusPayload;
use caseflow::domain::types::CaseStatus;
use support::{ScriptedApi, case, client};
use tokio::time::{Instant, timeout};

fn slow_api() -> Arc<ScriptedApi> {
    Arc::new(
        ScriptedApi::new(vec![
            case("case-1", CaseStatus::New),
            case("case-2", CaseStatus::InReview),
        ])
        .with_latency(Duration::from_millis(100)),
    )
}

#[tokio::test(start_paused = true)]
async fn concurrent_reads_share_one_fetch() {
    let api = slow_api();
    let client = client(Arc::clone(&api));

    let first = client.list();
    let second = client.list();
    assert!(first.is_loading());
    assert!(second.is_fetching());

    let (a, b) = tokio::join!(client.fetch_list(), client.fetch_list());

    assert_eq!(a.expect("list loads").len(), 2);
    assert_eq!(b.expect("list loads").len(), 2);
    assert_eq!(api.list_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn fresh_list_is_served_from_cache_until_stale() {
    let api = slow_api();
    let client = client(Arc::clone(&api));

    client.fetch_list().await.expect("list loads");
    client.fetch_list().await.expect("cached");
    assert_eq!(api.list_calls(), 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    let state = client.list();
    assert!(state.is_stale);
    assert!(state.data.is_some());
    assert!(state.is_fetching());

    client.fetch_list().await.expect("refreshed");
    assert_eq!(api.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_read_result_is_never_observed() {
    let api = slow_api();
    let client = client(Arc::clone(&api));
    let queries = client.engine().queries();

    client.list();
    assert!(queries.cancel(&cases_key()));
    assert!(!queries.is_fetching(&cases_key()));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(client.cached_list().is_none());
    assert_eq!(
        queries.state(&cases_key()).map(|state| state.status),
        Some(QueryStatus::Idle)
    );

    // a later read starts over
    let state = client.list();
    assert!(state.is_loading());
    client.fetch_list().await.expect("list loads");
    assert_eq!(api.list_calls(), 2);
    assert!(client.cached_list().is_some());
}

#[tokio::test(start_paused = true)]
async fn list_retries_server_errors_with_backoff() {
    let api = slow_api();
    api.fail_list(ServiceError::server(500, "flaky"));
    api.fail_list(ServiceError::server(502, "flaky"));
    let client = client(Arc::clone(&api));

    let started = Instant::now();
    let cases = client.fetch_list().await.expect("succeeds on third attempt");

    assert_eq!(cases.len(), 2);
    assert_eq!(api.list_calls(), 3);
    // three calls of 100 ms plus 250 ms and 500 ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(1_050));
}

#[tokio::test(start_paused = true)]
async fn list_gives_up_after_configured_retries() {
    let api = slow_api();
    for _ in 0..4 {
        api.fail_list(ServiceError::server(500, "down"));
    }
    let client = client(Arc::clone(&api));

    let error = client.fetch_list().await.expect_err("retries exhausted");

    assert_eq!(error.kind(), ErrorKind::Server);
    assert_eq!(api.list_calls(), 4);
    let state = client
        .engine()
        .queries()
        .state(&cases_key())
        .expect("query known");
    assert!(state.is_error());
    assert!(state.data.is_none());
}

#[tokio::test(start_paused = true)]
async fn not_found_is_never_retried() {
    let api = slow_api();
    api.fail_list(ServiceError::not_found("cases"));
    let client = client(Arc::clone(&api));

    let error = client.fetch_list().await.expect_err("not found");

    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(api.list_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn detail_fails_after_one_attempt() {
    let api = slow_api();
    api.fail_get(ServiceError::server(500, "boom"));
    let client = client(Arc::clone(&api));

    let error = client.fetch_detail("case-1").await.expect_err("no retry");

    assert_eq!(error.status(), 500);
    assert_eq!(api.get_calls(), 1);
    let state = client
        .engine()
        .queries()
        .state(&case_key("case-1"))
        .expect("query known");
    assert!(state.is_error());
    assert_eq!(state.error, Some(ServiceError::server(500, "boom")));
}

#[tokio::test(start_paused = true)]
async fn unknown_case_surfaces_not_found() {
    let api = slow_api();
    let client = client(Arc::clone(&api));

    let error = client.fetch_detail("case-404").await.expect_err("absent");

    assert_eq!(error, ServiceError::not_found("case-404"));
    assert_eq!(api.get_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn store_writes_wake_only_affected_subscribers() {
    let api = Arc::new(ScriptedApi::new(vec![
        case("case-1", CaseStatus::New),
        case("case-2", CaseStatus::InReview),
    ]));
    let client = client(Arc::clone(&api));
    client.fetch_list().await.expect("list loads");
    client.fetch_detail("case-1").await.expect("detail loads");
    client.fetch_detail("case-2").await.expect("detail loads");

    // time is paused, so nothing is stale and subscribing starts no fetch
    let mut first = client.subscribe_detail("case-1");
    let mut second = client.subscribe_detail("case-2");
    let mut list = client.subscribe_list();
    assert_eq!(api.get_calls(), 2);

    let reply = api.hold_update("case-1");
    let handle = client
        .try_update_status("case-1", UpdateStatusPayload::new(CaseStatus::Approved))
        .expect("valid change");

    assert!(first.changed().await);
    let patched = first
        .peek()
        .and_then(|state| state.data)
        .and_then(QueryData::into_entity)
        .map(|record| record.status);
    assert_eq!(patched, Some(CaseStatus::Approved));
    assert!(list.changed().await);
    assert!(
        timeout(Duration::from_millis(50), second.changed())
            .await
            .is_err()
    );

    reply
        .send(Ok(case("case-1", CaseStatus::Approved)))
        .expect("update waiting");
    assert!(handle.outcome().await.is_ok());
    assert!(
        timeout(Duration::from_millis(500), second.changed())
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn invalidation_refetches_only_subscribed_queries() {
    let api = slow_api();
    let client = client(Arc::clone(&api));
    client.fetch_list().await.expect("list loads");
    client.fetch_detail("case-1").await.expect("detail loads");
    let _list = client.subscribe_list();

    let marked = client.engine().queries().invalidate(&QueryFilter::All);

    assert_eq!(marked, 2);
    assert!(client.engine().queries().is_fetching(&cases_key()));
    assert!(!client.engine().queries().is_fetching(&case_key("case-1")));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(api.list_calls(), 2);
    assert_eq!(api.get_calls(), 1);
    assert!(!client.engine().queries().is_stale(&cases_key()));
    assert!(client.engine().queries().is_stale(&case_key("case-1")));
}

#[tokio::test(start_paused = true)]
async fn subscription_refetch_ignores_freshness() {
    let api = slow_api();
    let client = client(Arc::clone(&api));
    let subscription = client.subscribe_list();

    subscription.refetch().await.expect("first load");
    subscription.refetch().await.expect("forced reload");

    assert_eq!(api.list_calls(), 2);
    assert!(subscription.state().is_success());
    drop(subscription);
    assert_eq!(client.engine().queries().subscriber_count(&cases_key()), 0);
}

#[tokio::test(start_paused = true)]
async fn render_loop_over_a_subscription_fetches_once() {
    let api = slow_api();
    let client = client(Arc::clone(&api));
    let mut subscription = client.subscribe_detail("case-1");

    let render = async {
        let mut renders = 0;
        while subscription.changed().await {
            let _ = subscription.state();
            renders += 1;
        }
        renders
    };
    // the loop only ends when the query goes away
    assert!(timeout(Duration::from_millis(300), render).await.is_err());

    assert_eq!(api.get_calls(), 1);
    assert!(subscription.state().is_success());
    assert!(!client.engine().queries().is_fetching(&case_key("case-1")));
}
