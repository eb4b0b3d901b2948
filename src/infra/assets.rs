//! Compiled static-asset passthrough over the build output directory.

use std::path::{Component, Path, PathBuf};

use axum::{
    body::Body,
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use metrics::counter;
use sha2::{Digest, Sha256};
use tokio::fs;

use super::telemetry::METRIC_ASSET_HIT;

const ASSET_CACHE_CONTROL: &str = "public, max-age=86400";

/// Filesystem-backed static assets produced by the client build.
///
/// The directory is treated as immutable for the process lifetime, so
/// responses carry long-lived cache metadata with a strong validator.
#[derive(Debug)]
pub struct StaticAssets {
    root: PathBuf,
}

impl StaticAssets {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Attempt to serve `request_path` from the asset directory.
    ///
    /// Returns `Ok(None)` when the path does not map to a servable file,
    /// letting the caller fall through to the render pipeline. Traversal
    /// components and directory paths are treated as misses rather than
    /// errors; only genuine read failures surface as `Err`.
    pub async fn serve(
        &self,
        request_path: &str,
        if_none_match: Option<&HeaderValue>,
    ) -> Result<Option<Response>, std::io::Error> {
        let Some(relative) = sanitize(request_path) else {
            return Ok(None);
        };

        let candidate = self.root.join(&relative);
        match fs::metadata(&candidate).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        }

        let bytes = Bytes::from(fs::read(&candidate).await?);
        let etag = strong_etag(&bytes);

        counter!(METRIC_ASSET_HIT).increment(1);

        if let Some(validator) = if_none_match
            && validator.to_str().is_ok_and(|value| value == etag)
        {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            apply_cache_headers(&mut response, &etag);
            return Ok(Some(response));
        }

        let mut response = Response::new(Body::from(bytes.clone()));
        *response.status_mut() = StatusCode::OK;

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(content_type_for(&relative).as_ref()) {
            headers.insert(CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
            headers.insert(CONTENT_LENGTH, value);
        }
        apply_cache_headers(&mut response, &etag);

        Ok(Some(response))
    }
}

fn apply_cache_headers(response: &mut Response, etag: &str) {
    let headers = response.headers_mut();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static(ASSET_CACHE_CONTROL),
    );
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(ETAG, value);
    }
}

fn sanitize(request_path: &str) -> Option<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        return None;
    }

    let relative = Path::new(trimmed);
    if relative.is_absolute()
        || relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }

    Some(relative.to_path_buf())
}

/// Infer the response content type, with explicit overrides for stylesheet
/// and script extensions so a misconfigured mime table cannot break the app.
fn content_type_for(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("css") => "text/css".to_string(),
        Some("js") | Some("mjs") => "application/javascript".to_string(),
        _ => mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string(),
    }
}

fn strong_etag(bytes: &Bytes) -> String {
    let digest = Sha256::digest(bytes);
    format!("\"{}\"", hex::encode(digest))
}
