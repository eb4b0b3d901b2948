//! HTTP-backed implementations of the render seams.
//!
//! The transform/reload engine and the render function itself live in
//! external processes; these clients are the only thing this crate knows
//! about them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::types::{LiveBridge, ModuleProvider, RenderEntry, RenderError, RenderOutcome};

const READY_PATH: &str = "__ssr/ready";
const TRANSFORM_PATH: &str = "__ssr/transform";
const RENDER_PATH: &str = "__ssr/render";

/// Frames kept when tidying a failure diagnostic.
const MAX_STACK_FRAMES: usize = 8;

#[derive(Debug, Serialize)]
struct TransformRequest<'a> {
    url: &'a str,
    template: &'a str,
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
}

/// Invokes an external render endpoint over HTTP.
pub struct HttpRenderEntry {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpRenderEntry {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl RenderEntry for HttpRenderEntry {
    async fn render(&self, path: &str) -> Result<RenderOutcome, RenderError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&RenderRequest { url: path })
            .send()
            .await
            .map_err(|err| RenderError::Invoke(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Invoke(format!(
                "render endpoint returned status {status}"
            )));
        }

        response
            .json::<RenderOutcome>()
            .await
            .map_err(|err| RenderError::Invoke(err.to_string()))
    }
}

/// Load-on-demand provider for the prebuilt renderer endpoint. Compiled mode
/// wraps this in a `CachedModuleProvider` so the client is built exactly once.
pub struct HttpModuleProvider {
    client: reqwest::Client,
    base: Url,
}

impl HttpModuleProvider {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }
}

#[async_trait]
impl ModuleProvider for HttpModuleProvider {
    async fn load_render_entry(&self) -> Result<Arc<dyn RenderEntry>, RenderError> {
        let endpoint = self
            .base
            .join(RENDER_PATH)
            .map_err(|err| RenderError::EntryLoad(err.to_string()))?;
        Ok(Arc::new(HttpRenderEntry::new(
            self.client.clone(),
            endpoint,
        )))
    }
}

/// Client for the development bridge: readiness, template transforms, and
/// hot module loading all go through the bridge process. The hot semantics
/// live upstream; each `load_render_entry` call observes whatever the bridge
/// has re-evaluated since the previous request.
pub struct DevServerBridge {
    client: reqwest::Client,
    base: Url,
}

impl DevServerBridge {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    fn endpoint(&self, path: &'static str) -> Result<Url, RenderError> {
        self.base
            .join(path)
            .map_err(|err| RenderError::Transform(err.to_string()))
    }
}

#[async_trait]
impl LiveBridge for DevServerBridge {
    async fn acquire(&self) -> Result<(), RenderError> {
        let endpoint = self.endpoint(READY_PATH)?;
        let response = self.client.get(endpoint).send().await.map_err(|err| {
            RenderError::Transform(format!("bridge unreachable at {}: {err}", self.base))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Transform(format!(
                "bridge readiness probe returned status {status}"
            )));
        }
        Ok(())
    }

    async fn transform_template(&self, path: &str, raw: &str) -> Result<String, RenderError> {
        let endpoint = self.endpoint(TRANSFORM_PATH)?;
        let response = self
            .client
            .post(endpoint)
            .json(&TransformRequest {
                url: path,
                template: raw,
            })
            .send()
            .await
            .map_err(|err| RenderError::Transform(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Transform(format!(
                "transform endpoint returned status {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|err| RenderError::Transform(err.to_string()))
    }

    async fn load_render_entry(&self) -> Result<Arc<dyn RenderEntry>, RenderError> {
        let endpoint = self
            .base
            .join(RENDER_PATH)
            .map_err(|err| RenderError::EntryLoad(err.to_string()))?;
        Ok(Arc::new(HttpRenderEntry::new(
            self.client.clone(),
            endpoint,
        )))
    }

    fn normalize_failure(&self, error: RenderError) -> RenderError {
        match error {
            RenderError::Transform(message) => RenderError::Transform(tidy_stack(&message)),
            RenderError::EntryLoad(message) => RenderError::EntryLoad(tidy_stack(&message)),
            RenderError::Invoke(message) => RenderError::Invoke(tidy_stack(&message)),
            other => other,
        }
    }
}

/// Trim bundler-internal frames out of a multi-line diagnostic so the logged
/// trace points at application source.
fn tidy_stack(message: &str) -> String {
    let mut kept = Vec::new();
    let mut frames = 0usize;

    for line in message.lines() {
        let is_frame = line.trim_start().starts_with("at ");
        if is_frame {
            if line.contains("/node_modules/") || frames >= MAX_STACK_FRAMES {
                continue;
            }
            frames += 1;
        }
        kept.push(line);
    }

    kept.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tidy_stack_drops_dependency_frames() {
        let raw = "ReferenceError: boom\n    at render (/srv/app/client/entry-server.jsx:4:3)\n    at run (/srv/app/node_modules/vite/dist/node.js:10:1)";
        let tidied = tidy_stack(raw);
        assert!(tidied.contains("entry-server.jsx"));
        assert!(!tidied.contains("node_modules"));
    }

    #[test]
    fn tidy_stack_caps_frame_count() {
        let mut raw = String::from("Error: deep");
        for index in 0..20 {
            raw.push_str(&format!("\n    at frame{index} (/srv/app/mod.js:1:1)"));
        }
        let tidied = tidy_stack(&raw);
        assert_eq!(
            tidied.lines().filter(|l| l.trim_start().starts_with("at ")).count(),
            MAX_STACK_FRAMES
        );
    }

    #[test]
    fn tidy_stack_keeps_single_line_messages() {
        assert_eq!(tidy_stack("connection refused"), "connection refused");
    }
}
