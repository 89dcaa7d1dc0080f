mod common;

use std::sync::Arc;

use common::{cache, eventually, fake_pdf, FakeDecoder, FakeFetcher};
use folio_preview::render::{
    DocId, RenderKey, RenderStatus, RetryPolicy, ThumbnailOrchestrator, ThumbnailSettings,
};

fn ids(values: &[&str]) -> Vec<DocId> {
    values.iter().map(|v| DocId::from(*v)).collect()
}

fn orchestrator(fetcher: Arc<FakeFetcher>, settings: ThumbnailSettings) -> ThumbnailOrchestrator {
    ThumbnailOrchestrator::new(cache(), fetcher, FakeDecoder::new(), settings)
}

#[tokio::test]
async fn test_failed_fetch_leaves_no_entry_and_no_marker() {
    let fetcher = FakeFetcher::new();
    fetcher.insert("1", fake_pdf(2));
    fetcher.insert("2", fake_pdf(2));
    fetcher.insert("3", fake_pdf(4));
    fetcher.fail("2");

    let thumbnails = orchestrator(fetcher.clone(), ThumbnailSettings::default());
    let list = ids(&["1", "2", "3"]);
    let report = thumbnails.sync(&list);
    assert_eq!(report.started.len(), 3);
    report.wait().await;

    let cache = thumbnails.cache();
    assert!(thumbnails.thumbnail(&DocId::from("1")).is_some());
    assert!(thumbnails.thumbnail(&DocId::from("2")).is_none());
    assert!(thumbnails.thumbnail(&DocId::from("3")).is_some());
    assert_eq!(cache.len(), 2);
    assert!(!cache.has_in_flight(&RenderKey::thumbnail("2")));
    assert_eq!(
        thumbnails.status(&DocId::from("2")),
        RenderStatus::Failed {
            attempts: 1,
            terminal: false
        }
    );
}

#[tokio::test]
async fn test_rapid_syncs_fetch_once() {
    let fetcher = FakeFetcher::gated();
    fetcher.insert("9", fake_pdf(1));
    let thumbnails = orchestrator(fetcher.clone(), ThumbnailSettings::default());

    let list = ids(&["9"]);
    let first = thumbnails.sync(&list);
    let second = thumbnails.sync(&list);
    assert_eq!(first.started.len(), 1);
    assert!(second.started.is_empty());
    assert_eq!(second.in_flight, 1);
    assert_eq!(thumbnails.status(&DocId::from("9")), RenderStatus::Loading);

    fetcher.release();
    first.wait().await;

    let third = thumbnails.sync(&list);
    assert_eq!(third.cached, 1);
    assert_eq!(fetcher.calls("9"), 1);
    assert_eq!(thumbnails.status(&DocId::from("9")), RenderStatus::Ready);
}

#[tokio::test]
async fn test_slow_document_does_not_hold_back_others() {
    let fetcher = FakeFetcher::new();
    fetcher.insert("a", fake_pdf(1));
    fetcher.insert("b", fake_pdf(1));
    fetcher.hold("a");
    let thumbnails = orchestrator(fetcher.clone(), ThumbnailSettings::default());
    let mut events = thumbnails.subscribe();

    let report = thumbnails.sync(&ids(&["a", "b"]));
    assert_eq!(report.started.len(), 2);

    assert!(eventually(|| thumbnails.status(&DocId::from("b")) == RenderStatus::Ready).await);
    assert_eq!(thumbnails.status(&DocId::from("a")), RenderStatus::Loading);
    assert!(thumbnails.thumbnail(&DocId::from("a")).is_none());

    fetcher.release_id("a");
    report.wait().await;
    assert_eq!(thumbnails.status(&DocId::from("a")), RenderStatus::Ready);

    let mut ready = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.status == RenderStatus::Ready {
            ready.push(event.id);
        }
    }
    assert_eq!(ready, ids(&["b", "a"]));
}

#[tokio::test]
async fn test_thumbnail_is_first_page_at_configured_scale() {
    let fetcher = FakeFetcher::new();
    fetcher.insert("7", fake_pdf(5));
    let thumbnails = orchestrator(fetcher, ThumbnailSettings::default());

    thumbnails.sync(&ids(&["7"])).wait().await;

    let image = thumbnails.thumbnail(&DocId::from("7")).unwrap();
    assert_eq!((image.width(), image.height()), (200, 300));
    assert!(image.data_uri().starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn test_render_is_deterministic_across_cache_clears() {
    let fetcher = FakeFetcher::new();
    fetcher.insert("4", fake_pdf(3));
    let thumbnails = orchestrator(fetcher.clone(), ThumbnailSettings::default());
    let list = ids(&["4"]);

    thumbnails.sync(&list).wait().await;
    let first = thumbnails.thumbnail(&DocId::from("4")).unwrap();

    thumbnails.cache().clear();
    thumbnails.sync(&list).wait().await;
    let second = thumbnails.thumbnail(&DocId::from("4")).unwrap();

    assert_eq!(fetcher.calls("4"), 2);
    assert_eq!(
        (first.width(), first.height()),
        (second.width(), second.height())
    );
}

#[tokio::test]
async fn test_retries_stop_after_max_attempts() {
    let fetcher = FakeFetcher::new();
    fetcher.insert("5", fake_pdf(1));
    fetcher.fail("5");
    let settings = ThumbnailSettings {
        retry: RetryPolicy { max_attempts: 2 },
        ..ThumbnailSettings::default()
    };
    let thumbnails = orchestrator(fetcher.clone(), settings);
    let list = ids(&["5"]);

    thumbnails.sync(&list).wait().await;
    thumbnails.sync(&list).wait().await;
    let report = thumbnails.sync(&list);
    assert_eq!(report.failed, 1);
    assert!(report.started.is_empty());
    assert_eq!(fetcher.calls("5"), 2);
    assert_eq!(
        thumbnails.status(&DocId::from("5")),
        RenderStatus::Failed {
            attempts: 2,
            terminal: true
        }
    );

    // Invalidation clears the failure history
    fetcher.heal("5");
    thumbnails.invalidate(&DocId::from("5"));
    thumbnails.sync(&list).wait().await;
    assert_eq!(thumbnails.status(&DocId::from("5")), RenderStatus::Ready);
}

#[tokio::test]
async fn test_empty_and_undecodable_documents_fail_quietly() {
    let fetcher = FakeFetcher::new();
    fetcher.insert("empty", fake_pdf(0));
    fetcher.insert("junk", b"<html>not a pdf</html>".to_vec());
    let thumbnails = orchestrator(fetcher, ThumbnailSettings::default());

    thumbnails.sync(&ids(&["empty", "junk"])).wait().await;

    assert!(thumbnails.cache().is_empty());
    assert_eq!(thumbnails.cache().stats().in_flight, 0);
    for id in ["empty", "junk"] {
        assert!(matches!(
            thumbnails.status(&DocId::from(id)),
            RenderStatus::Failed { .. }
        ));
    }
}

#[tokio::test]
async fn test_invalidate_during_render_discards_stale_result() {
    let fetcher = FakeFetcher::gated();
    fetcher.insert("8", fake_pdf(1));
    let thumbnails = orchestrator(fetcher.clone(), ThumbnailSettings::default());
    let list = ids(&["8"]);

    let stale = thumbnails.sync(&list);
    thumbnails.invalidate(&DocId::from("8"));
    assert_eq!(thumbnails.status(&DocId::from("8")), RenderStatus::Absent);

    let fresh = thumbnails.sync(&list);
    assert_eq!(fresh.started.len(), 1);

    fetcher.release();
    stale.wait().await;
    fresh.wait().await;

    assert_eq!(fetcher.calls("8"), 2);
    assert_eq!(thumbnails.status(&DocId::from("8")), RenderStatus::Ready);
    assert_eq!(thumbnails.cache().stats().in_flight, 0);
}

#[tokio::test]
async fn test_events_report_loading_then_ready() {
    let fetcher = FakeFetcher::new();
    fetcher.insert("6", fake_pdf(1));
    let thumbnails = orchestrator(fetcher, ThumbnailSettings::default());
    let mut events = thumbnails.subscribe();

    thumbnails.sync(&ids(&["6"])).wait().await;

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert_eq!(first.id, DocId::from("6"));
    assert_eq!(first.status, RenderStatus::Loading);
    assert_eq!(second.status, RenderStatus::Ready);
}

#[tokio::test]
async fn test_shutdown_releases_markers() {
    let fetcher = FakeFetcher::gated();
    fetcher.insert("1", fake_pdf(1));
    let thumbnails = orchestrator(fetcher, ThumbnailSettings::default());

    let _report = thumbnails.sync(&ids(&["1"]));
    assert_eq!(thumbnails.active_renders(), 1);

    thumbnails.shutdown();
    let cache = thumbnails.cache().clone();
    assert!(eventually(|| cache.stats().in_flight == 0).await);
    assert_eq!(thumbnails.status(&DocId::from("1")), RenderStatus::Absent);
}
