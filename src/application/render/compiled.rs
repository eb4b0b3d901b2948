use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::{fs, sync::OnceCell};

use super::types::{
    ModuleProvider, RenderEntry, RenderError, RenderMode, RenderPipeline, substitute_outlet,
};

/// Wraps any provider in a load-once cache: the render entry is resolved on
/// first use and reused for the process lifetime.
pub struct CachedModuleProvider {
    inner: Arc<dyn ModuleProvider>,
    loaded: OnceCell<Arc<dyn RenderEntry>>,
}

impl CachedModuleProvider {
    pub fn new(inner: Arc<dyn ModuleProvider>) -> Self {
        Self {
            inner,
            loaded: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ModuleProvider for CachedModuleProvider {
    async fn load_render_entry(&self) -> Result<Arc<dyn RenderEntry>, RenderError> {
        self.loaded
            .get_or_try_init(|| self.inner.load_render_entry())
            .await
            .cloned()
    }
}

/// Production pipeline: prebuilt template and render entry, both immutable
/// for the process lifetime. The template is read once and cached.
pub struct CompiledRenderPipeline {
    template_path: PathBuf,
    template: OnceCell<String>,
    provider: Arc<dyn ModuleProvider>,
}

impl CompiledRenderPipeline {
    pub fn new(template_path: PathBuf, provider: Arc<dyn ModuleProvider>) -> Self {
        Self {
            template_path,
            template: OnceCell::new(),
            provider,
        }
    }

    async fn template(&self) -> Result<&String, RenderError> {
        self.template
            .get_or_try_init(|| async {
                fs::read_to_string(&self.template_path).await.map_err(|err| {
                    RenderError::template_read(
                        self.template_path.display().to_string(),
                        err.to_string(),
                    )
                })
            })
            .await
    }
}

#[async_trait]
impl RenderPipeline for CompiledRenderPipeline {
    fn mode(&self) -> RenderMode {
        RenderMode::Compiled
    }

    async fn render(&self, path: &str) -> Result<String, RenderError> {
        let template = self.template().await?;
        let entry = self.provider.load_render_entry().await?;
        let outcome = entry.render(path).await?;
        Ok(substitute_outlet(template, outcome.html.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use super::*;
    use crate::application::render::types::{RenderOutcome, SSR_OUTLET};

    struct FakeEntry;

    #[async_trait]
    impl RenderEntry for FakeEntry {
        async fn render(&self, path: &str) -> Result<RenderOutcome, RenderError> {
            Ok(RenderOutcome {
                html: Some(format!("<div data-path=\"{path}\">X</div>")),
            })
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ModuleProvider for CountingProvider {
        async fn load_render_entry(&self) -> Result<Arc<dyn RenderEntry>, RenderError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeEntry))
        }
    }

    fn write_template(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("index.html");
        std::fs::write(&path, format!("<html><body>{SSR_OUTLET}</body></html>"))
            .expect("write template");
        path
    }

    #[tokio::test]
    async fn cached_provider_loads_the_entry_once() {
        let inner = Arc::new(CountingProvider::default());
        let cached = CachedModuleProvider::new(inner.clone());

        let first = cached.load_render_entry().await.expect("load");
        let second = cached.load_render_entry().await.expect("load");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(inner.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_renders_are_byte_identical() {
        let dir = TempDir::new().expect("temp dir");
        let template = write_template(&dir);
        let provider = Arc::new(CountingProvider::default());
        let pipeline =
            CompiledRenderPipeline::new(template, Arc::new(CachedModuleProvider::new(provider)));

        let first = pipeline.render("/app").await.expect("render");
        let second = pipeline.render("/app").await.expect("render");

        assert_eq!(first, second);
        assert!(first.contains("<div data-path=\"/app\">X</div>"));
        assert!(!first.contains(SSR_OUTLET));
    }

    #[tokio::test]
    async fn template_is_read_once_and_cached() {
        let dir = TempDir::new().expect("temp dir");
        let template = write_template(&dir);
        let pipeline = CompiledRenderPipeline::new(
            template.clone(),
            Arc::new(CountingProvider::default()),
        );

        let first = pipeline.render("/").await.expect("render");

        // The artifact is immutable by contract; a rewrite on disk must not
        // leak into subsequent responses.
        std::fs::write(&template, "<html><body>changed</body></html>").expect("rewrite");
        let second = pipeline.render("/").await.expect("render");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_template_is_a_read_error() {
        let dir = TempDir::new().expect("temp dir");
        let pipeline = CompiledRenderPipeline::new(
            dir.path().join("missing.html"),
            Arc::new(CountingProvider::default()),
        );

        let err = pipeline.render("/").await.expect_err("read failure");
        assert!(matches!(err, RenderError::TemplateRead { .. }));
    }
}
