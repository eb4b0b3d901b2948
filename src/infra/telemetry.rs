use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

pub(crate) const METRIC_TOKEN_ISSUED: &str = "parlato_token_issued_total";
pub(crate) const METRIC_TOKEN_FAILED: &str = "parlato_token_failed_total";
pub(crate) const METRIC_RENDER_OK: &str = "parlato_render_ok_total";
pub(crate) const METRIC_RENDER_FAILED: &str = "parlato_render_failed_total";
pub(crate) const METRIC_ASSET_HIT: &str = "parlato_static_hit_total";

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_TOKEN_ISSUED,
            Unit::Count,
            "Total number of upstream session tokens relayed to callers."
        );
        describe_counter!(
            METRIC_TOKEN_FAILED,
            Unit::Count,
            "Total number of token issuance attempts that failed."
        );
        describe_counter!(
            METRIC_RENDER_OK,
            Unit::Count,
            "Total number of successfully rendered application pages."
        );
        describe_counter!(
            METRIC_RENDER_FAILED,
            Unit::Count,
            "Total number of page renders that failed."
        );
        describe_counter!(
            METRIC_ASSET_HIT,
            Unit::Count,
            "Total number of requests served from the compiled asset directory."
        );
    });
}
