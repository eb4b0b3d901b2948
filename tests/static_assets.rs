use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH},
    },
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use parlato::{
    application::{
        render::{RenderError, RenderMode, RenderPipeline},
        token::TokenService,
    },
    config::UpstreamSettings,
    infra::{
        assets::StaticAssets,
        http::{HttpState, build_router},
    },
};

struct DocumentPipeline;

#[async_trait]
impl RenderPipeline for DocumentPipeline {
    fn mode(&self) -> RenderMode {
        RenderMode::Compiled
    }

    async fn render(&self, _path: &str) -> Result<String, RenderError> {
        Ok("<html><body>app shell</body></html>".to_string())
    }
}

fn upstream_settings() -> UpstreamSettings {
    UpstreamSettings {
        sessions_url: "http://127.0.0.1:9/v1/realtime/sessions"
            .parse()
            .expect("url"),
        model: "gpt-4o-mini-realtime-preview-2024-12-17".to_string(),
        voice: "verse".to_string(),
        api_key: None,
    }
}

fn seed_dist(dir: &Path) {
    std::fs::create_dir_all(dir.join("assets")).expect("assets dir");
    std::fs::write(dir.join("assets/app.css"), "body{margin:0}").expect("css");
    std::fs::write(dir.join("assets/app.js"), "console.log(1);").expect("js");
    std::fs::write(dir.join("assets/entry.mjs"), "export default 1;").expect("mjs");
    std::fs::write(dir.join("logo.svg"), "<svg></svg>").expect("svg");
}

fn state_with_assets(dir: &Path) -> HttpState {
    HttpState {
        mode: RenderMode::Compiled,
        pipeline: Arc::new(DocumentPipeline),
        tokens: Arc::new(TokenService::new(&upstream_settings())),
        assets: Some(Arc::new(StaticAssets::new(dir.to_path_buf()))),
    }
}

async fn get(state: HttpState, path: &str) -> axum::response::Response {
    build_router(state)
        .oneshot(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response")
}

#[tokio::test]
async fn stylesheet_is_served_as_text_css() {
    let dir = TempDir::new().expect("temp dir");
    seed_dist(dir.path());

    let response = get(state_with_assets(dir.path()), "/assets/app.css").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).expect("content type"),
        "text/css"
    );
    let body = response.into_body().collect().await.expect("body").to_bytes();
    assert_eq!(&body[..], b"body{margin:0}");
}

#[tokio::test]
async fn scripts_are_served_as_application_javascript() {
    let dir = TempDir::new().expect("temp dir");
    seed_dist(dir.path());
    let state = state_with_assets(dir.path());

    for path in ["/assets/app.js", "/assets/entry.mjs"] {
        let response = get(state.clone(), path).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).expect("content type"),
            "application/javascript"
        );
    }
}

#[tokio::test]
async fn other_extensions_fall_back_to_guessed_type() {
    let dir = TempDir::new().expect("temp dir");
    seed_dist(dir.path());

    let response = get(state_with_assets(dir.path()), "/logo.svg").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).expect("content type"),
        "image/svg+xml"
    );
}

#[tokio::test]
async fn assets_carry_cache_headers_and_revalidate() {
    let dir = TempDir::new().expect("temp dir");
    seed_dist(dir.path());
    let state = state_with_assets(dir.path());

    let response = get(state.clone(), "/assets/app.css").await;
    assert_eq!(
        response.headers().get(CACHE_CONTROL).expect("cache control"),
        "public, max-age=86400"
    );
    let etag = response
        .headers()
        .get(ETAG)
        .expect("etag")
        .to_str()
        .expect("ascii")
        .to_string();
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let revalidation = build_router(state)
        .oneshot(
            Request::builder()
                .uri("/assets/app.css")
                .header(IF_NONE_MATCH, etag.as_str())
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(revalidation.status(), StatusCode::NOT_MODIFIED);
    let body = revalidation
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert!(body.is_empty());
}

#[tokio::test]
async fn asset_miss_falls_through_to_the_document() {
    let dir = TempDir::new().expect("temp dir");
    seed_dist(dir.path());

    let response = get(state_with_assets(dir.path()), "/profile/settings").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).expect("content type"),
        "text/html; charset=utf-8"
    );
    let body = response.into_body().collect().await.expect("body").to_bytes();
    assert_eq!(&body[..], b"<html><body>app shell</body></html>");
}

#[tokio::test]
async fn traversal_components_never_reach_the_filesystem() {
    let dir = TempDir::new().expect("temp dir");
    seed_dist(dir.path());
    std::fs::write(dir.path().parent().expect("parent").join("secret.txt"), "x")
        .expect("outside file");

    let response = get(state_with_assets(dir.path()), "/assets/../../secret.txt").await;

    // The request resolves as an SPA route, not as a file outside the root.
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).expect("content type"),
        "text/html; charset=utf-8"
    );
}

#[tokio::test]
async fn live_mode_serves_the_document_even_for_asset_paths() {
    let dir = TempDir::new().expect("temp dir");
    seed_dist(dir.path());
    let state = HttpState {
        mode: RenderMode::Live,
        pipeline: Arc::new(DocumentPipeline),
        tokens: Arc::new(TokenService::new(&upstream_settings())),
        assets: None,
    };

    let response = get(state, "/assets/app.css").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).expect("content type"),
        "text/html; charset=utf-8"
    );
}
