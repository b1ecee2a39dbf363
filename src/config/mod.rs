use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 9000;
const DEFAULT_HTTP_PORT: u16 = 9001;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:5174".to_string(),
    ]
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "taskify")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./taskify-data"))
}

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// WebSocket server port (default: 9000).
    port: Option<u16>,
    /// HTTP server port (default: 9001).
    http_port: Option<u16>,
    /// Bind address for both servers (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,taskifyd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Origins allowed by the HTTP CORS layer.
    cors_origins: Option<Vec<String>>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub port: u16,
    pub http_port: u16,
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub log: String,
    pub log_format: String,
    pub cors_origins: Vec<String>,
}

impl BoardConfig {
    pub fn new(
        port: Option<u16>,
        http_port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        log_format: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let http_port = http_port.or(toml.http_port).unwrap_or(DEFAULT_HTTP_PORT);
        let bind_address = bind_address
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());
        let log_format = log_format
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());
        let cors_origins = toml.cors_origins.unwrap_or_else(default_cors_origins);

        Self {
            port,
            http_port,
            bind_address,
            data_dir,
            log,
            log_format,
            cors_origins,
        }
    }
}
