//! API integration tests for crop retrieval and error handling.
//!
//! Tests verify:
//! - Crop retrieval for images and video frames
//! - Error cases (bad parameters, failed fetches, undecodable sources)
//! - HTTP response codes and headers
//! - Health and admin routes

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use image::ImageFormat;
use std::time::Duration;
use tower::ServiceExt;

use roi_streamer::error::IoError;
use roi_streamer::RouterConfig;

use super::test_utils::{
    crop_uri, decode_png, gradient_png, is_valid_png, solid_image, MockCapture, MockRemote,
    TestHarness,
};

const IMAGE_URL: &str = "https://img.example/photo.png";
const VIDEO_URL: &str = "https://video.example/clip.mp4";

async fn get(router: axum::Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.oneshot(request).await.unwrap()
}

async fn error_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn image_harness() -> TestHarness {
    TestHarness::new(
        MockRemote::new().with_body(IMAGE_URL, gradient_png(100, 80)),
        None,
    )
}

// =============================================================================
// Crop Retrieval
// =============================================================================

#[tokio::test]
async fn test_crop_retrieval_success() {
    let harness = image_harness();

    let response = get(harness.router(), &crop_uri(IMAGE_URL, 10, 20, 30, 50)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_valid_png(&body), "Response should be a valid PNG");

    let crop = decode_png(&body);
    assert_eq!(crop.dimensions(), (20, 30));
    assert_eq!(crop.get_pixel(0, 0).0, [10, 20, 7]);
    assert_eq!(crop.get_pixel(19, 29).0, [29, 49, 7]);
}

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let harness = image_harness();
    let uri = crop_uri(IMAGE_URL, 0, 0, 16, 16);

    let first = get(harness.router(), &uri).await;
    assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");
    let first_body = first.into_body().collect().await.unwrap().to_bytes();

    let second = get(harness.router(), &uri).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
    let second_body = second.into_body().collect().await.unwrap().to_bytes();

    assert_eq!(first_body, second_body);
    assert_eq!(harness.remote.call_count(), 1);
}

#[tokio::test]
async fn test_crop_clamped_to_source_bounds() {
    let harness = image_harness();

    let response = get(harness.router(), &crop_uri(IMAGE_URL, -10, 70, 120, 200)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let crop = decode_png(&body);
    assert_eq!(crop.dimensions(), (100, 10));
    assert_eq!(crop.get_pixel(0, 0).0, [0, 70, 7]);
}

#[tokio::test]
async fn test_jpeg_source_returns_png() {
    let harness = TestHarness::new(
        MockRemote::new().with_body(
            "https://img.example/photo.jpg",
            solid_image(32, 32, [200, 10, 10], ImageFormat::Jpeg),
        ),
        None,
    );

    let response = get(
        harness.router(),
        &crop_uri("https://img.example/photo.jpg", 4, 4, 12, 12),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(decode_png(&body).dimensions(), (8, 8));
}

#[tokio::test]
async fn test_video_frame_crop() {
    let harness = TestHarness::new(MockRemote::new(), Some(MockCapture::new()));

    let uri = format!("{}&ms=1500", crop_uri(VIDEO_URL, 0, 0, 8, 8));
    let response = get(harness.router(), &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let crop = decode_png(&body);
    assert_eq!(crop.dimensions(), (8, 8));
    assert_eq!(crop.get_pixel(0, 0).0[0], MockCapture::frame_red(1500));

    assert_eq!(
        harness.capture().requests(),
        vec![(VIDEO_URL.to_string(), 1500)]
    );
    assert_eq!(harness.remote.call_count(), 0);
}

#[tokio::test]
async fn test_video_timestamps_cached_independently() {
    let harness = TestHarness::new(MockRemote::new(), Some(MockCapture::new()));
    let base = crop_uri(VIDEO_URL, 0, 0, 4, 4);

    for ms in [0, 1000] {
        let response = get(harness.router(), &format!("{}&ms={}", base, ms)).await;
        assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");
    }
    let response = get(harness.router(), &format!("{}&ms=1000", base)).await;
    assert_eq!(response.headers().get("x-cache").unwrap(), "HIT");

    assert_eq!(harness.capture().call_count(), 2);
}

// =============================================================================
// Parameter Errors
// =============================================================================

#[tokio::test]
async fn test_missing_parameters_rejected() {
    let harness = image_harness();

    for uri in [
        "/crop".to_string(),
        "/crop?left=0&top=0&right=1&bottom=1".to_string(),
        format!("/crop?url={}&left=0&top=0&right=1", IMAGE_URL),
    ] {
        let response = get(harness.router(), &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {}", uri);
        let error = error_body(response).await;
        assert_eq!(error["error"], "invalid_request");
        assert_eq!(error["status"], 400);
    }

    assert_eq!(harness.remote.call_count(), 0);
}

#[tokio::test]
async fn test_non_integer_parameters_rejected() {
    let harness = image_harness();

    let response = get(
        harness.router(),
        &format!("/crop?url={}&left=abc&top=0&right=1&bottom=1", IMAGE_URL),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(
        harness.router(),
        &format!("{}&ms=1.5", crop_uri(IMAGE_URL, 0, 0, 1, 1)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_url_rejected() {
    let harness = image_harness();

    let response = get(harness.router(), &crop_uri("not-a-url", 0, 0, 4, 4)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_body(response).await["error"], "invalid_request");
    assert_eq!(harness.remote.call_count(), 0);
}

#[tokio::test]
async fn test_inverted_box_rejected() {
    let harness = image_harness();

    let response = get(harness.router(), &crop_uri(IMAGE_URL, 30, 0, 10, 10)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(harness.router(), &crop_uri(IMAGE_URL, 0, 10, 10, 10)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(harness.remote.call_count(), 0);
}

#[tokio::test]
async fn test_box_outside_source_rejected() {
    let harness = image_harness();

    let response = get(harness.router(), &crop_uri(IMAGE_URL, 200, 200, 300, 300)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_negative_video_timestamp_rejected() {
    let harness = TestHarness::new(MockRemote::new(), Some(MockCapture::new()));

    let uri = format!("{}&ms=-1", crop_uri(VIDEO_URL, 0, 0, 4, 4));
    let response = get(harness.router(), &uri).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.capture().call_count(), 0);
}

// =============================================================================
// Source Errors
// =============================================================================

#[tokio::test]
async fn test_fetch_failure_is_bad_gateway() {
    let harness = TestHarness::new(
        MockRemote::new().with_error(
            IMAGE_URL,
            IoError::Connection("connection refused".to_string()),
        ),
        None,
    );

    let response = get(harness.router(), &crop_uri(IMAGE_URL, 0, 0, 4, 4)).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let error = error_body(response).await;
    assert_eq!(error["error"], "fetch_error");
    assert_eq!(error["status"], 502);
}

#[tokio::test]
async fn test_remote_not_found_is_bad_gateway() {
    let harness = TestHarness::new(MockRemote::new(), None);

    let response = get(
        harness.router(),
        &crop_uri("https://img.example/missing.png", 0, 0, 4, 4),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_undecodable_source_is_unsupported_media() {
    let harness = TestHarness::new(
        MockRemote::new().with_body(IMAGE_URL, bytes::Bytes::from_static(b"<html>nope</html>")),
        None,
    );

    let response = get(harness.router(), &crop_uri(IMAGE_URL, 0, 0, 4, 4)).await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(error_body(response).await["error"], "decode_error");
}

#[tokio::test]
async fn test_video_without_capture_is_server_error() {
    let harness = image_harness();

    let response = get(harness.router(), &crop_uri(VIDEO_URL, 0, 0, 4, 4)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_body(response).await["error"], "capture_not_configured");
    assert_eq!(harness.remote.call_count(), 0);
}

#[tokio::test]
async fn test_request_timeout_is_gateway_timeout() {
    let harness = TestHarness::new(
        MockRemote::new()
            .with_body(IMAGE_URL, gradient_png(8, 8))
            .with_delay(Duration::from_millis(500)),
        None,
    );
    let router = harness.router_with(
        RouterConfig::new()
            .with_tracing(false)
            .with_request_timeout(Some(Duration::from_millis(50))),
    );

    let response = get(router, &crop_uri(IMAGE_URL, 0, 0, 4, 4)).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(error_body(response).await["error"], "cancelled");
    assert_eq!(harness.service.cache_stats().roi_entries, 0);
}

// =============================================================================
// Health and Admin
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let harness = image_harness();

    let response = get(harness.router(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let health = error_body(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["application"], "roi-streamer");
    assert!(health["version"].is_string());
}

#[tokio::test]
async fn test_cache_stats_endpoint() {
    let harness = image_harness();

    let response = get(harness.router(), &crop_uri(IMAGE_URL, 0, 0, 8, 8)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(harness.router(), "/cache/stats").await;
    assert_eq!(response.status(), StatusCode::OK);

    let stats = error_body(response).await;
    assert_eq!(stats["roi_entries"], 1);
    assert_eq!(stats["source_entries"], 1);
    assert!(stats["roi_size"].as_u64().unwrap() > 0);
    assert!(stats["source_size"].as_u64().unwrap() >= 100 * 80 * 3);
}

#[tokio::test]
async fn test_cache_clear_endpoint() {
    let harness = image_harness();
    let uri = crop_uri(IMAGE_URL, 0, 0, 8, 8);

    get(harness.router(), &uri).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/cache/clear")
        .body(Body::empty())
        .unwrap();
    let response = harness.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stats = harness.service.cache_stats();
    assert_eq!(stats.roi_entries, 0);
    assert_eq!(stats.source_entries, 0);

    // Both tiers are gone, so the source is fetched again
    let response = get(harness.router(), &uri).await;
    assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");
    assert_eq!(harness.remote.call_count(), 2);
}

#[tokio::test]
async fn test_admin_routes_disabled_by_default() {
    let harness = image_harness();
    let router = harness.router_with(RouterConfig::new().with_tracing(false));

    let response = get(router.clone(), "/cache/stats").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/cache/clear")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let harness = image_harness();
    let router = harness.router_with(RouterConfig::new().with_cache_max_age(60));

    let response = get(router, &crop_uri(IMAGE_URL, 0, 0, 4, 4)).await;
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=60"
    );
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_cors_exposes_cache_status_header() {
    let harness = image_harness();

    let request = Request::builder()
        .uri(crop_uri(IMAGE_URL, 0, 0, 4, 4))
        .header("origin", "https://viewer.example")
        .body(Body::empty())
        .unwrap();
    let response = harness.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let exposed = response
        .headers()
        .get("access-control-expose-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(exposed.contains("x-cache"), "exposed: {}", exposed);
}

#[tokio::test]
async fn test_cors_preflight_allows_admin_post() {
    let harness = image_harness();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/cache/clear")
        .header("origin", "https://viewer.example")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = harness.router().oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let methods = response
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(methods.contains("POST"), "methods: {}", methods);
    assert!(methods.contains("GET"), "methods: {}", methods);
}

#[tokio::test]
async fn test_cors_restricted_origins() {
    let harness = image_harness();
    let router = harness.router_with(
        RouterConfig::new()
            .with_tracing(false)
            .with_cors_origins(vec!["https://viewer.example".to_string()]),
    );

    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://viewer.example")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "https://viewer.example"
    );

    let request = Request::builder()
        .uri("/health")
        .header("origin", "https://other.example")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());
}
