use std::{process, sync::Arc};

use parlato::{
    application::{
        error::AppError,
        render::{
            CachedModuleProvider, CompiledRenderPipeline, DevServerBridge, HttpModuleProvider,
            LiveRenderPipeline, RenderMode, RenderPipeline,
        },
        token::TokenService,
    },
    config,
    infra::{assets::StaticAssets, error::InfraError, http, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    // Optional .env for local development; the upstream secret arrives this way.
    let _ = dotenvy::dotenv();

    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let serve_args = match cli_args.command {
        Some(config::Command::Serve(args)) => *args,
        None => config::ServeArgs::default(),
    };

    let mode = if serve_args.dev {
        RenderMode::Live
    } else {
        RenderMode::Compiled
    };

    run_serve(settings, mode).await
}

async fn run_serve(settings: config::Settings, mode: RenderMode) -> Result<(), AppError> {
    let tokens = Arc::new(TokenService::new(&settings.upstream));

    // The pipeline is fixed here for the process lifetime. Live acquisition
    // completes before the listener binds; its failure aborts startup.
    let (pipeline, assets): (Arc<dyn RenderPipeline>, Option<Arc<StaticAssets>>) = match mode {
        RenderMode::Live => {
            let bridge = Arc::new(DevServerBridge::new(settings.render.bridge_url.clone()));
            let pipeline =
                LiveRenderPipeline::acquire(bridge, settings.render.dev_template.clone())
                    .await
                    .map_err(|err| {
                        AppError::unexpected(format!("live bridge acquisition failed: {err}"))
                    })?;
            (Arc::new(pipeline), None)
        }
        RenderMode::Compiled => {
            let provider = Arc::new(CachedModuleProvider::new(Arc::new(
                HttpModuleProvider::new(settings.render.renderer_url.clone()),
            )));
            let pipeline =
                CompiledRenderPipeline::new(settings.render.dist_template.clone(), provider);
            let assets = Arc::new(StaticAssets::new(settings.render.dist_dir.clone()));
            (Arc::new(pipeline), Some(assets))
        }
    };

    let state = http::HttpState {
        mode,
        pipeline,
        tokens,
        assets,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        addr = %settings.server.addr,
        mode = mode.as_str(),
        "parlato listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
