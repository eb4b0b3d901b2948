//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "parlato";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DEV_TEMPLATE: &str = "client/index.html";
const DEFAULT_DIST_TEMPLATE: &str = "dist/client/index.html";
const DEFAULT_DIST_DIR: &str = "dist/client";
const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:5173/";
const DEFAULT_RENDERER_URL: &str = "http://127.0.0.1:4173/";
const DEFAULT_SESSIONS_URL: &str = "https://api.openai.com/v1/realtime/sessions";
const DEFAULT_MODEL: &str = "gpt-4o-mini-realtime-preview-2024-12-17";
const DEFAULT_VOICE: &str = "verse";
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Command-line arguments for the Parlato binary.
#[derive(Debug, Parser)]
#[command(name = "parlato", version, about = "Parlato voice console server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PARLATO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Parlato HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    /// Serve through the live development bridge instead of prebuilt artifacts.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub dev: bool,

    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the development template path.
    #[arg(long = "render-dev-template", value_name = "PATH")]
    pub render_dev_template: Option<PathBuf>,

    /// Override the compiled template path.
    #[arg(long = "render-dist-template", value_name = "PATH")]
    pub render_dist_template: Option<PathBuf>,

    /// Override the compiled static-asset directory.
    #[arg(long = "render-dist-dir", value_name = "PATH")]
    pub render_dist_dir: Option<PathBuf>,

    /// Override the live development bridge base URL.
    #[arg(long = "render-bridge-url", value_name = "URL")]
    pub render_bridge_url: Option<String>,

    /// Override the compiled renderer base URL.
    #[arg(long = "render-renderer-url", value_name = "URL")]
    pub render_renderer_url: Option<String>,

    /// Override the upstream session-issuance endpoint.
    #[arg(long = "upstream-sessions-url", value_name = "URL")]
    pub upstream_sessions_url: Option<String>,

    /// Override the upstream model identifier.
    #[arg(long = "upstream-model", value_name = "MODEL")]
    pub upstream_model: Option<String>,

    /// Override the upstream voice parameter.
    #[arg(long = "upstream-voice", value_name = "VOICE")]
    pub upstream_voice: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub dev_template: PathBuf,
    pub dist_template: PathBuf,
    pub dist_dir: PathBuf,
    pub bridge_url: Url,
    pub renderer_url: Url,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub sessions_url: Url,
    pub model: String,
    pub voice: String,
    /// Server-held secret. Its absence is deliberately not rejected here;
    /// an unauthenticated upstream call fails at issuance time instead.
    pub api_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PARLATO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    if raw.upstream.api_key.is_none() {
        raw.upstream.api_key = std::env::var(API_KEY_ENV).ok();
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    upstream: RawUpstreamSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.render_dev_template.as_ref() {
            self.render.dev_template = Some(path.clone());
        }
        if let Some(path) = overrides.render_dist_template.as_ref() {
            self.render.dist_template = Some(path.clone());
        }
        if let Some(path) = overrides.render_dist_dir.as_ref() {
            self.render.dist_dir = Some(path.clone());
        }
        if let Some(url) = overrides.render_bridge_url.as_ref() {
            self.render.bridge_url = Some(url.clone());
        }
        if let Some(url) = overrides.render_renderer_url.as_ref() {
            self.render.renderer_url = Some(url.clone());
        }
        if let Some(url) = overrides.upstream_sessions_url.as_ref() {
            self.upstream.sessions_url = Some(url.clone());
        }
        if let Some(model) = overrides.upstream_model.as_ref() {
            self.upstream.model = Some(model.clone());
        }
        if let Some(voice) = overrides.upstream_voice.as_ref() {
            self.upstream.voice = Some(voice.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            upstream,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;
        let upstream = build_upstream_settings(upstream)?;

        Ok(Self {
            server,
            logging,
            render,
            upstream,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let dev_template = non_empty_path(
        render.dev_template,
        DEFAULT_DEV_TEMPLATE,
        "render.dev_template",
    )?;
    let dist_template = non_empty_path(
        render.dist_template,
        DEFAULT_DIST_TEMPLATE,
        "render.dist_template",
    )?;
    let dist_dir = non_empty_path(render.dist_dir, DEFAULT_DIST_DIR, "render.dist_dir")?;

    let bridge_url = parse_url(render.bridge_url, DEFAULT_BRIDGE_URL, "render.bridge_url")?;
    let renderer_url = parse_url(
        render.renderer_url,
        DEFAULT_RENDERER_URL,
        "render.renderer_url",
    )?;

    Ok(RenderSettings {
        dev_template,
        dist_template,
        dist_dir,
        bridge_url,
        renderer_url,
    })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let sessions_url = parse_url(
        upstream.sessions_url,
        DEFAULT_SESSIONS_URL,
        "upstream.sessions_url",
    )?;

    let model = upstream.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
    if model.trim().is_empty() {
        return Err(LoadError::invalid("upstream.model", "must not be empty"));
    }

    let voice = upstream.voice.unwrap_or_else(|| DEFAULT_VOICE.to_string());
    if voice.trim().is_empty() {
        return Err(LoadError::invalid("upstream.voice", "must not be empty"));
    }

    let api_key = upstream.api_key.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(UpstreamSettings {
        sessions_url,
        model,
        voice,
        api_key,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    dev_template: Option<PathBuf>,
    dist_template: Option<PathBuf>,
    dist_dir: Option<PathBuf>,
    bridge_url: Option<String>,
    renderer_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    sessions_url: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    api_key: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_url(value: Option<String>, default: &str, key: &'static str) -> Result<Url, LoadError> {
    let candidate = value.unwrap_or_else(|| default.to_string());
    Url::parse(&candidate)
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{candidate}`: {err}")))
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_port_3000() {
        let raw = RawSettings::default();
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.server.addr.port(), 3000);
        assert_eq!(
            settings.render.dev_template,
            PathBuf::from("client/index.html")
        );
        assert_eq!(
            settings.render.dist_template,
            PathBuf::from("dist/client/index.html")
        );
        assert_eq!(settings.render.dist_dir, PathBuf::from("dist/client"));
        assert_eq!(settings.upstream.voice, "verse");
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn blank_api_key_is_treated_as_absent() {
        let mut raw = RawSettings::default();
        raw.upstream.api_key = Some("   ".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.upstream.api_key.is_none());
    }

    #[test]
    fn invalid_bridge_url_is_rejected() {
        let mut raw = RawSettings::default();
        raw.render.bridge_url = Some("not a url".to_string());
        let err = Settings::from_raw(raw).expect_err("invalid settings");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "render.bridge_url",
                ..
            }
        ));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["parlato"]);
        assert!(args.command.is_none());
    }

    #[test]
    fn parse_serve_dev_flag() {
        let args = CliArgs::parse_from(["parlato", "serve", "--dev"]);
        match args.command.expect("serve command") {
            Command::Serve(serve) => assert!(serve.dev),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "parlato",
            "serve",
            "--server-host",
            "127.0.0.1",
            "--server-port",
            "8080",
            "--upstream-sessions-url",
            "http://127.0.0.1:9000/sessions",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert!(!serve.dev);
                assert_eq!(serve.overrides.server_host.as_deref(), Some("127.0.0.1"));
                assert_eq!(serve.overrides.server_port, Some(8080));
                assert_eq!(
                    serve.overrides.upstream_sessions_url.as_deref(),
                    Some("http://127.0.0.1:9000/sessions")
                );
            }
        }
    }
}
