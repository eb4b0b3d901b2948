//! Dual-mode page rendering.
//!
//! The pipeline stays pure from the server's perspective: given a request
//! path it produces a complete HTML document, with all state changes (module
//! reloading, template transforms) owned by the external engine behind the
//! bridge seam. Exactly one pipeline is constructed per process and the mode
//! never changes after startup.

mod bridge;
mod compiled;
mod live;
mod types;

pub use bridge::{DevServerBridge, HttpModuleProvider, HttpRenderEntry};
pub use compiled::{CachedModuleProvider, CompiledRenderPipeline};
pub use live::LiveRenderPipeline;
pub use types::{
    LiveBridge, ModuleProvider, RenderEntry, RenderError, RenderMode, RenderOutcome,
    RenderPipeline, SSR_OUTLET,
};
