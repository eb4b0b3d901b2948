use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Literal marker in the page template where the rendered body is injected.
pub const SSR_OUTLET: &str = "<!--ssr-outlet-->";

/// Which pipeline serves application pages; fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Live,
    Compiled,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Live => "live",
            RenderMode::Compiled => "compiled",
        }
    }
}

/// Output of one render-entry invocation. A missing body is tolerated and
/// rendered as an empty outlet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderOutcome {
    pub html: Option<String>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read template `{path}`: {message}")]
    TemplateRead { path: String, message: String },
    #[error("template transform failed: {0}")]
    Transform(String),
    #[error("render entry load failed: {0}")]
    EntryLoad(String),
    #[error("render invocation failed: {0}")]
    Invoke(String),
}

impl RenderError {
    pub fn template_read(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateRead {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The render function: takes a request path, produces body HTML for it.
#[async_trait]
pub trait RenderEntry: Send + Sync {
    async fn render(&self, path: &str) -> Result<RenderOutcome, RenderError>;
}

/// Source of the render entry. Live mode backs this with a hot-reloading
/// implementation; compiled mode wraps one in a load-once cache.
#[async_trait]
pub trait ModuleProvider: Send + Sync {
    async fn load_render_entry(&self) -> Result<Arc<dyn RenderEntry>, RenderError>;
}

/// Handle onto the external live-reload engine. Acquired once at startup in
/// live mode; per-request operations borrow it read-only.
#[async_trait]
pub trait LiveBridge: Send + Sync {
    /// Readiness probe; live startup blocks until this succeeds.
    async fn acquire(&self) -> Result<(), RenderError>;

    /// Rewrite the raw template for the given request path (asset URL
    /// rewriting, reload-client injection).
    async fn transform_template(&self, path: &str, raw: &str) -> Result<String, RenderError>;

    /// Load the render entry fresh, observing source edits since the last call.
    async fn load_render_entry(&self) -> Result<Arc<dyn RenderEntry>, RenderError>;

    /// Rewrite failure diagnostics for readability. Classification must not
    /// change: the result is still an error of the same shape.
    fn normalize_failure(&self, error: RenderError) -> RenderError;
}

/// A complete page pipeline for one mode.
#[async_trait]
pub trait RenderPipeline: Send + Sync {
    fn mode(&self) -> RenderMode;

    /// Produce the full HTML document for a request path.
    async fn render(&self, path: &str) -> Result<String, RenderError>;
}

/// Substitute the outlet marker with the rendered body, or with nothing when
/// the entry produced no body.
pub(crate) fn substitute_outlet(template: &str, body: Option<&str>) -> String {
    template.replace(SSR_OUTLET, body.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_injects_body_html() {
        let html = substitute_outlet("<main><!--ssr-outlet--></main>", Some("<div>X</div>"));
        assert_eq!(html, "<main><div>X</div></main>");
    }

    #[test]
    fn substitute_tolerates_missing_body() {
        let html = substitute_outlet("<main><!--ssr-outlet--></main>", None);
        assert_eq!(html, "<main></main>");
        assert!(!html.contains(SSR_OUTLET));
    }

    #[test]
    fn substitute_replaces_every_occurrence() {
        let html = substitute_outlet("<!--ssr-outlet--><hr><!--ssr-outlet-->", Some("x"));
        assert_eq!(html, "x<hr>x");
    }
}
