use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::fs;

use super::types::{LiveBridge, RenderError, RenderMode, RenderPipeline, substitute_outlet};

/// Development pipeline: template and render entry are sourced fresh on every
/// request through the live bridge, so source edits are observed without a
/// restart.
pub struct LiveRenderPipeline {
    bridge: Arc<dyn LiveBridge>,
    template_path: PathBuf,
}

impl LiveRenderPipeline {
    /// Acquire the bridge and build the pipeline. Serving must not begin
    /// until this returns; an acquisition failure is fatal to startup.
    pub async fn acquire(
        bridge: Arc<dyn LiveBridge>,
        template_path: PathBuf,
    ) -> Result<Self, RenderError> {
        bridge.acquire().await?;
        Ok(Self {
            bridge,
            template_path,
        })
    }

    async fn render_inner(&self, path: &str) -> Result<String, RenderError> {
        let raw = fs::read_to_string(&self.template_path).await.map_err(|err| {
            RenderError::template_read(self.template_path.display().to_string(), err.to_string())
        })?;

        let template = self.bridge.transform_template(path, &raw).await?;
        let entry = self.bridge.load_render_entry().await?;
        let outcome = entry.render(path).await?;

        Ok(substitute_outlet(&template, outcome.html.as_deref()))
    }
}

#[async_trait]
impl RenderPipeline for LiveRenderPipeline {
    fn mode(&self) -> RenderMode {
        RenderMode::Live
    }

    async fn render(&self, path: &str) -> Result<String, RenderError> {
        self.render_inner(path)
            .await
            .map_err(|err| self.bridge.normalize_failure(err))
    }
}
