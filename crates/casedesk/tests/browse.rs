//! Browse session against the scripted case service.

use std::sync::Arc;
use std::time::Duration;

use casedesk::browse::{BrowseSession, BrowseSettings, BrowseUpdate};
use casedesk_api::testing::{Call, ScriptedCaseService};
use casedesk_api::{ApiError, CaseFilter, CaseService};
use tokio::time::{advance, Instant};

fn session(service: &Arc<ScriptedCaseService>, page_size: usize) -> BrowseSession {
    let service: Arc<dyn CaseService> = service.clone();
    BrowseSession::new(
        service,
        BrowseSettings {
            page_size,
            debounce: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        },
    )
}

async fn first_page(session: &mut BrowseSession) {
    session.load_first_page(CaseFilter::default());
    let update = session.next_update().await.unwrap();
    assert!(matches!(update, BrowseUpdate::PageLoaded { .. }), "{:?}", update);
}

#[tokio::test(start_paused = true)]
async fn test_fast_navigation_fetches_final_selection_once() {
    let service = Arc::new(ScriptedCaseService::with_case_count(10));
    let mut session = session(&service, 5);
    first_page(&mut session).await;

    let now = Instant::now();
    session.move_selection(1, now);
    session.move_selection(1, now + Duration::from_millis(30));
    session.move_selection(1, now + Duration::from_millis(60));
    session.tick(now + Duration::from_millis(100));

    advance(Duration::from_millis(600)).await;
    session.tick(Instant::now());

    match session.next_update().await.unwrap() {
        BrowseUpdate::DetailShown(id) => assert_eq!(id, ScriptedCaseService::id(4)),
        other => panic!("unexpected update: {:?}", other),
    }
    assert_eq!(service.total_calls(Call::Case), 1);
    assert_eq!(
        session.displayed().unwrap().case.summary,
        "Case 4".to_string()
    );

    // Back and forth over cached rows: no more fetches.
    session.move_selection(-3, Instant::now());
    advance(Duration::from_millis(600)).await;
    session.tick(Instant::now());
    session.next_update().await.unwrap();
    session.move_selection(3, Instant::now());
    session.move_selection(-3, Instant::now());
    advance(Duration::from_millis(600)).await;
    session.tick(Instant::now());
    assert!(session.drain(Instant::now()).is_empty());
    assert_eq!(service.total_calls(Call::Case), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_result_does_not_replace_display() {
    let service = Arc::new(ScriptedCaseService::with_case_count(3));
    service.set_delay(&ScriptedCaseService::id(1), Duration::from_secs(2));
    let mut session = session(&service, 10);
    first_page(&mut session).await;

    advance(Duration::from_millis(500)).await;
    session.tick(Instant::now());

    session.move_selection(1, Instant::now());
    advance(Duration::from_millis(500)).await;
    session.tick(Instant::now());

    match session.next_update().await.unwrap() {
        BrowseUpdate::DetailShown(id) => assert_eq!(id, ScriptedCaseService::id(2)),
        other => panic!("unexpected update: {:?}", other),
    }
    match session.next_update().await.unwrap() {
        BrowseUpdate::DetailCached(id) => assert_eq!(id, ScriptedCaseService::id(1)),
        other => panic!("unexpected update: {:?}", other),
    }

    assert_eq!(session.displayed().unwrap().id(), &ScriptedCaseService::id(2));
    assert!(session.detail().cached(&ScriptedCaseService::id(1)).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_pages_load_sequentially_without_gaps() {
    let service = Arc::new(ScriptedCaseService::with_case_count(12));
    let mut session = session(&service, 5);
    first_page(&mut session).await;

    session.maybe_load_more(10);
    session.maybe_load_more(10);
    session.maybe_load_more(10);
    assert!(session.list().is_loading());
    session.next_update().await.unwrap();

    session.maybe_load_more(10);
    match session.next_update().await.unwrap() {
        BrowseUpdate::PageLoaded { loaded, total, .. } => {
            assert_eq!(loaded, 12);
            assert_eq!(total, Some(12));
        }
        other => panic!("unexpected update: {:?}", other),
    }
    session.maybe_load_more(10);
    assert!(!session.list().is_loading());

    assert_eq!(service.list_calls(), vec![(0, 5), (5, 5), (10, 5)]);
    let ids: Vec<_> = session.list().rows().map(|c| c.id.clone()).collect();
    let expected: Vec<_> = (1..=12).map(ScriptedCaseService::id).collect();
    assert_eq!(ids, expected);
}

#[tokio::test(start_paused = true)]
async fn test_filter_change_clears_detail_cache() {
    let service = Arc::new(ScriptedCaseService::with_case_count(3));
    let mut session = session(&service, 10);
    first_page(&mut session).await;

    advance(Duration::from_millis(500)).await;
    session.tick(Instant::now());
    session.next_update().await.unwrap();
    assert_eq!(session.detail().cache_len(), 1);

    session.load_first_page(CaseFilter {
        statuses: vec!["Open".into()],
        ..Default::default()
    });
    assert_eq!(session.detail().cache_len(), 0);
    assert!(session.list().is_empty());
    session.next_update().await.unwrap();
    assert_eq!(session.list().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_page_failure_keeps_loaded_rows() {
    let service = Arc::new(ScriptedCaseService::with_case_count(8));
    let mut session = session(&service, 4);
    first_page(&mut session).await;

    service.fail_next_list(ApiError::Status {
        code: 503,
        message: "maintenance".into(),
    });
    session.maybe_load_more(10);
    match session.next_update().await.unwrap() {
        BrowseUpdate::PageFailed(err) => assert!(err.is_transient()),
        other => panic!("unexpected update: {:?}", other),
    }
    assert_eq!(session.list().len(), 4);

    session.maybe_load_more(10);
    session.next_update().await.unwrap();
    assert_eq!(session.list().len(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_slow_list_times_out() {
    let service = Arc::new(ScriptedCaseService::with_case_count(2));
    service.set_list_delay(Duration::from_secs(60));
    let mut session = session(&service, 10);

    session.load_first_page(CaseFilter::default());
    match session.next_update().await.unwrap() {
        BrowseUpdate::PageFailed(ApiError::Timeout { after, .. }) => {
            assert_eq!(after, Duration::from_secs(30));
        }
        other => panic!("unexpected update: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_detail_is_not_cached() {
    let service = Arc::new(ScriptedCaseService::with_case_count(2));
    service.fail(
        &ScriptedCaseService::id(1),
        Call::Case,
        ApiError::Unauthorized("token expired".into()),
    );
    let mut session = session(&service, 10);
    first_page(&mut session).await;

    advance(Duration::from_millis(500)).await;
    session.tick(Instant::now());
    match session.next_update().await.unwrap() {
        BrowseUpdate::DetailFailed { error, current, .. } => {
            assert!(error.is_unauthorized());
            assert!(current);
        }
        other => panic!("unexpected update: {:?}", other),
    }
    assert_eq!(session.detail().cache_len(), 0);

    service.clear_failure(&ScriptedCaseService::id(1), Call::Case);
    session.move_selection(1, Instant::now());
    session.move_selection(-1, Instant::now());
    advance(Duration::from_millis(500)).await;
    session.tick(Instant::now());
    assert!(matches!(
        session.next_update().await.unwrap(),
        BrowseUpdate::DetailShown(_)
    ));
}
