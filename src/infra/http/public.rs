use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        Request, StatusCode,
        header::{CONTENT_TYPE, IF_NONE_MATCH},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use metrics::counter;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        render::{RenderMode, RenderPipeline},
        token::TokenService,
    },
    infra::{
        assets::StaticAssets,
        telemetry::{METRIC_RENDER_FAILED, METRIC_RENDER_OK},
    },
};

use super::middleware::{log_responses, set_request_context};

const TOKEN_FAILURE_BODY: &str = r#"{"error":"Failed to generate token"}"#;

/// Everything the dispatcher needs, fixed at startup. The mode and the
/// matching pipeline are chosen once; the asset passthrough is only present
/// in compiled mode.
#[derive(Clone)]
pub struct HttpState {
    pub mode: RenderMode,
    pub pipeline: Arc<dyn RenderPipeline>,
    pub tokens: Arc<TokenService>,
    pub assets: Option<Arc<StaticAssets>>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/token", get(issue_token))
        .fallback(render_app)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn issue_token(State(state): State<HttpState>) -> Response {
    const SOURCE: &str = "infra::http::public::issue_token";

    match state.tokens.issue().await {
        Ok(body) => json_response(body),
        Err(err) => {
            // The upstream failure never reaches the caller; it is logged by
            // the response middleware through the attached report.
            let mut response = (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, "application/json")],
                TOKEN_FAILURE_BODY,
            )
                .into_response();
            ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err)
                .attach(&mut response);
            response
        }
    }
}

async fn render_app(State(state): State<HttpState>, request: Request<Body>) -> Response {
    const SOURCE: &str = "infra::http::public::render_app";

    let uri = request.uri().clone();
    let path = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/")
        .to_string();

    if let Some(assets) = state.assets.as_ref() {
        let validator = request.headers().get(IF_NONE_MATCH);
        match assets.serve(uri.path(), validator).await {
            Ok(Some(response)) => return response,
            Ok(None) => {}
            Err(err) => {
                return HttpError::from_error(
                    SOURCE,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read static asset",
                    &err,
                )
                .into_response();
            }
        }
    }

    match state.pipeline.render(&path).await {
        Ok(html) => {
            counter!(METRIC_RENDER_OK, "mode" => state.mode.as_str()).increment(1);
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/html; charset=utf-8")],
                html,
            )
                .into_response()
        }
        Err(err) => {
            counter!(METRIC_RENDER_FAILED, "mode" => state.mode.as_str()).increment(1);
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to render application",
                &err,
            )
            .into_response()
        }
    }
}

fn json_response(body: Bytes) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        Body::from(body),
    )
        .into_response()
}
