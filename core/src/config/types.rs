use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub http_server: HttpServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "taleforge_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_kind")]
    pub kind: StoreKind,

    /// Directory for the file store. Defaults to `<data dir>/tasks`.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_store_kind() -> StoreKind {
    StoreKind::File
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_terminal_persist_attempts")]
    pub terminal_persist_attempts: u32,

    #[serde(default = "default_terminal_persist_backoff_ms")]
    pub terminal_persist_backoff_ms: u64,

    /// Stop awaiting an in-flight stage call as soon as the task is cancelled,
    /// instead of waiting for the next checkpoint.
    #[serde(default)]
    pub abandon_in_flight_on_cancel: bool,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_terminal_persist_attempts() -> u32 {
    5
}

fn default_terminal_persist_backoff_ms() -> u64 {
    200
}

fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            terminal_persist_attempts: default_terminal_persist_attempts(),
            terminal_persist_backoff_ms: default_terminal_persist_backoff_ms(),
            abandon_in_flight_on_cancel: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationProvider {
    /// Deterministic templates, no network.
    Offline,
    /// OpenAI-compatible chat completions endpoint.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: GenerationProvider,

    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_generation_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries inside a stage before it falls back to a default value.
    #[serde(default = "default_generation_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,
}

fn default_generation_provider() -> GenerationProvider {
    GenerationProvider::Offline
}

fn default_generation_base_url() -> String {
    "http://127.0.0.1:11434/v1".to_string()
}

fn default_generation_model() -> String {
    "llama3.1".to_string()
}

fn default_generation_timeout_ms() -> u64 {
    60_000
}

fn default_generation_max_retries() -> u32 {
    2
}

fn default_generation_temperature() -> f32 {
    0.8
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            base_url: default_generation_base_url(),
            api_key: String::new(),
            model: default_generation_model(),
            timeout_ms: default_generation_timeout_ms(),
            max_retries: default_generation_max_retries(),
            temperature: default_generation_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}
