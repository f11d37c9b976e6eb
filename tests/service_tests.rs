mod common;

use common::{service_over, temp_data_dir, MockResponse, MockTransport};
use link_preview::{PreviewService, PreviewServiceConfig};
use std::time::Duration;

const ARTICLE_URL: &str = "https://example.com/article";
const ARTICLE_HTML: &str =
    r#"<meta property="og:description" content="A great article about testing."><p>Some body text.</p>"#;
const ARTICLE_PREVIEW: &str = "A great article about testing.";

#[tokio::test]
async fn sequential_calls_fetch_once() {
    let transport = MockTransport::new();
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    let service = service_over(transport.clone());

    let first = service.resolve_preview(ARTICLE_URL).await;
    let second = service.resolve_preview(ARTICLE_URL).await;

    assert_eq!(first.as_deref(), Some(ARTICLE_PREVIEW));
    assert_eq!(first, second);
    assert_eq!(transport.get_count(), 1);
}

#[tokio::test]
async fn concurrent_calls_coalesce_into_one_fetch() {
    let transport = MockTransport::with_delay(Duration::from_millis(50));
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    let service = service_over(transport.clone());

    let results = futures::future::join_all(
        (0..8).map(|_| service.resolve_preview(ARTICLE_URL)),
    )
    .await;

    assert_eq!(transport.get_count(), 1);
    for result in results {
        assert_eq!(result.as_deref(), Some(ARTICLE_PREVIEW));
    }
}

#[tokio::test]
async fn raw_urls_share_one_canonical_slot() {
    let transport = MockTransport::new();
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    let service = service_over(transport.clone());

    let first = service
        .resolve_preview("https://Example.com/article#comments")
        .await;
    let second = service.resolve_preview(ARTICLE_URL).await;

    assert_eq!(first, second);
    assert_eq!(transport.get_count(), 1);
}

#[tokio::test]
async fn expired_entries_are_refetched() {
    let transport = MockTransport::new();
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    let service = PreviewService::new_with_config(
        PreviewServiceConfig::new()
            .with_transport(transport.clone())
            .with_ttl(Duration::from_secs(1)),
    );

    assert!(service.resolve_preview(ARTICLE_URL).await.is_some());
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(service.resolve_preview(ARTICLE_URL).await.is_some());

    assert_eq!(transport.get_count(), 2);
}

#[tokio::test]
async fn blocked_extensions_never_touch_the_network() {
    let transport = MockTransport::new();
    let service = service_over(transport.clone());

    assert_eq!(
        service.resolve_preview("https://example.com/image.png").await,
        None
    );
    assert_eq!(transport.get_count(), 0);
    assert_eq!(transport.head_count(), 0);
}

#[tokio::test]
async fn unnormalizable_urls_resolve_to_none() {
    let transport = MockTransport::new();
    let service = service_over(transport.clone());

    assert_eq!(service.resolve_preview("not a url").await, None);
    assert_eq!(service.resolve_preview("ftp://example.com/x").await, None);
    assert_eq!(transport.get_count(), 0);
}

#[tokio::test]
async fn status_urls_route_through_oembed_only() {
    let transport = MockTransport::new();
    transport.route(
        "https://publish.twitter.com/oembed",
        MockResponse::json(
            r#"{"html":"<blockquote><p>Hello from the bird site</p></blockquote>","title":"someuser on X"}"#,
        ),
    );
    let service = service_over(transport.clone());

    assert!(link_preview::is_status_url("https://x.com/someuser/status/12345"));
    assert!(!link_preview::is_status_url("https://example.com/status/12345"));

    let preview = service
        .resolve_preview("https://x.com/someuser/status/12345")
        .await;

    assert_eq!(preview.as_deref(), Some("Hello from the bird site"));
    assert_eq!(transport.get_count(), 1);
    let urls = transport.get_urls();
    assert!(urls[0].starts_with("https://publish.twitter.com/oembed"));
    assert!(urls[0].contains("someuser%2Fstatus%2F12345"));
}

#[tokio::test]
async fn failed_fetches_are_negatively_cached() {
    let transport = MockTransport::new();
    let service = service_over(transport.clone());

    assert_eq!(service.resolve_preview(ARTICLE_URL).await, None);
    assert_eq!(service.resolve_preview(ARTICLE_URL).await, None);

    // The 404 outcome was cached; no second attempt within the TTL window.
    assert_eq!(transport.get_count(), 1);
    assert_eq!(service.cache_len().await, 1);
}

#[tokio::test]
async fn batch_resolution_coalesces_duplicates() {
    let transport = MockTransport::new();
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    transport.route(
        "https://example.com/other",
        MockResponse::html("<title>Other page</title>"),
    );
    let service = service_over(transport.clone());

    let results = service
        .resolve_previews(&[ARTICLE_URL, "https://example.com/other", ARTICLE_URL])
        .await;

    assert_eq!(results[0].as_deref(), Some(ARTICLE_PREVIEW));
    assert_eq!(results[1].as_deref(), Some("Other page"));
    assert_eq!(results[0], results[2]);
    assert_eq!(transport.get_count(), 2);
}

#[tokio::test]
async fn positive_previews_survive_a_restart() {
    let data_dir = temp_data_dir("restart");

    let transport = MockTransport::new();
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    let service = PreviewService::new_with_config(
        PreviewServiceConfig::new()
            .with_transport(transport.clone())
            .with_data_dir(&data_dir),
    );
    assert_eq!(
        service.resolve_preview(ARTICLE_URL).await.as_deref(),
        Some(ARTICLE_PREVIEW)
    );
    service.flush().await;
    drop(service);

    // Fresh process: nothing routed, so any fetch would come back empty.
    let cold_transport = MockTransport::new();
    let restarted = PreviewService::new_with_config(
        PreviewServiceConfig::new()
            .with_transport(cold_transport.clone())
            .with_data_dir(&data_dir),
    );
    assert_eq!(
        restarted.resolve_preview(ARTICLE_URL).await.as_deref(),
        Some(ARTICLE_PREVIEW)
    );
    assert_eq!(cold_transport.get_count(), 0);

    std::fs::remove_dir_all(data_dir).ok();
}

#[tokio::test]
async fn negative_results_are_not_persisted() {
    let data_dir = temp_data_dir("negative");

    let transport = MockTransport::new();
    let service = PreviewService::new_with_config(
        PreviewServiceConfig::new()
            .with_transport(transport.clone())
            .with_data_dir(&data_dir),
    );
    assert_eq!(service.resolve_preview(ARTICLE_URL).await, None);
    service.flush().await;
    drop(service);

    // After a restart the URL is retried: the negative outcome died with
    // the process.
    let transport = MockTransport::new();
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    let restarted = PreviewService::new_with_config(
        PreviewServiceConfig::new()
            .with_transport(transport.clone())
            .with_data_dir(&data_dir),
    );
    assert_eq!(
        restarted.resolve_preview(ARTICLE_URL).await.as_deref(),
        Some(ARTICLE_PREVIEW)
    );
    assert_eq!(transport.get_count(), 1);

    std::fs::remove_dir_all(data_dir).ok();
}

#[tokio::test]
async fn disk_payload_is_versioned_json() {
    let data_dir = temp_data_dir("payload");

    let transport = MockTransport::new();
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    let service = PreviewService::new_with_config(
        PreviewServiceConfig::new()
            .with_transport(transport)
            .with_data_dir(&data_dir),
    );
    service.resolve_preview(ARTICLE_URL).await;
    service.flush().await;

    let raw = std::fs::read_to_string(data_dir.join(link_preview::CACHE_FILE_NAME)).unwrap();
    let payload: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(payload["version"], 1);
    let entry = &payload["entries"][ARTICLE_URL];
    assert_eq!(entry["previewText"], ARTICLE_PREVIEW);
    assert!(entry["fetchedAt"].is_i64());

    std::fs::remove_dir_all(data_dir).ok();
}

#[tokio::test]
async fn legacy_string_timestamps_load() {
    let data_dir = temp_data_dir("legacy");
    std::fs::create_dir_all(&data_dir).unwrap();

    let fetched_at = chrono::Utc::now() - chrono::Duration::hours(1);
    let payload = format!(
        r#"{{"version":1,"entries":{{"{ARTICLE_URL}":{{"previewText":"{ARTICLE_PREVIEW}","fetchedAt":"{}"}}}}}}"#,
        fetched_at.to_rfc3339()
    );
    std::fs::write(data_dir.join(link_preview::CACHE_FILE_NAME), payload).unwrap();

    let transport = MockTransport::new();
    let service = PreviewService::new_with_config(
        PreviewServiceConfig::new()
            .with_transport(transport.clone())
            .with_data_dir(&data_dir),
    );
    assert_eq!(
        service.resolve_preview(ARTICLE_URL).await.as_deref(),
        Some(ARTICLE_PREVIEW)
    );
    assert_eq!(transport.get_count(), 0);

    std::fs::remove_dir_all(data_dir).ok();
}

#[tokio::test]
async fn purge_drops_expired_entries() {
    let transport = MockTransport::new();
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    let service = PreviewService::new_with_config(
        PreviewServiceConfig::new()
            .with_transport(transport.clone())
            .with_ttl(Duration::from_secs(1)),
    );

    service.resolve_preview(ARTICLE_URL).await;
    assert_eq!(service.cache_len().await, 1);

    tokio::time::sleep(Duration::from_millis(2100)).await;
    service.purge_expired().await;
    assert!(service.cache_is_empty().await);
}

#[tokio::test]
async fn corrupt_cache_file_degrades_to_memory_only() {
    let data_dir = temp_data_dir("corrupt");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(data_dir.join(link_preview::CACHE_FILE_NAME), "{ nope").unwrap();

    let transport = MockTransport::new();
    transport.route(ARTICLE_URL, MockResponse::html(ARTICLE_HTML));
    let service = PreviewService::new_with_config(
        PreviewServiceConfig::new()
            .with_transport(transport.clone())
            .with_data_dir(&data_dir),
    );

    assert_eq!(
        service.resolve_preview(ARTICLE_URL).await.as_deref(),
        Some(ARTICLE_PREVIEW)
    );
    assert_eq!(transport.get_count(), 1);

    std::fs::remove_dir_all(data_dir).ok();
}
