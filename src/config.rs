//! Configuration resolution for medscribe
//!
//! Resolution priority for every setting: environment variable → TOML config
//! file → compiled default. The TOML file lives at
//! `~/.config/medscribe/config.toml` (overridable via `MEDSCRIBE_CONFIG`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Default per-chunk / per-file payload cap (50 MB)
const DEFAULT_MAX_CHUNK_BYTES: u64 = 50 * 1024 * 1024;
/// Abandoned upload sessions are reclaimed after this TTL
const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
/// Reaper sweep period
const DEFAULT_REAPER_PERIOD_SECS: u64 = 5 * 60;
/// Window during which a repeated request signature is treated as a duplicate
const DEFAULT_DEDUP_WINDOW_SECS: u64 = 30;
/// Time bucket for the fallback request fingerprint
const DEFAULT_FINGERPRINT_BUCKET_SECS: u64 = 5;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5731";

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the HTTP server binds to
    pub bind_address: String,
    /// Data directory holding the database, chunk spool, and audio store
    pub root_folder: PathBuf,
    /// Base URL prefix for generated storage URLs
    pub public_base_url: String,
    /// Default OpenAI API key; absent key fails at first AI call, not at startup
    pub openai_api_key: Option<String>,
    /// Maximum accepted chunk / single-shot payload size in bytes
    pub max_chunk_bytes: u64,
    /// Upload session time-to-live
    pub session_ttl: Duration,
    /// Expiry reaper sweep period
    pub reaper_period: Duration,
    /// Deduplication window
    pub dedup_window: Duration,
    /// Time bucket used by the fallback fingerprint derivation
    pub fingerprint_bucket: Duration,
}

/// On-disk TOML representation (all fields optional)
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    bind_address: Option<String>,
    root_folder: Option<String>,
    public_base_url: Option<String>,
    openai_api_key: Option<String>,
    max_chunk_bytes: Option<u64>,
    session_ttl_secs: Option<u64>,
    reaper_period_secs: Option<u64>,
    dedup_window_secs: Option<u64>,
    fingerprint_bucket_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment and TOML file
    pub fn load() -> Self {
        let toml = load_toml_config();

        let bind_address = env_or("MEDSCRIBE_BIND_ADDRESS", toml.bind_address.clone())
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let root_folder = env_or("MEDSCRIBE_ROOT_FOLDER", toml.root_folder.clone())
            .map(PathBuf::from)
            .unwrap_or_else(default_root_folder);

        let public_base_url = env_or("MEDSCRIBE_PUBLIC_BASE_URL", toml.public_base_url.clone())
            .unwrap_or_else(|| format!("http://{}", bind_address));

        // MEDSCRIBE_OPENAI_API_KEY takes precedence; plain OPENAI_API_KEY also
        // honored for compatibility with standard tooling.
        let openai_api_key = std::env::var("MEDSCRIBE_OPENAI_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or(toml.openai_api_key.clone());

        let max_chunk_bytes = env_parse("MEDSCRIBE_MAX_CHUNK_BYTES")
            .or(toml.max_chunk_bytes)
            .unwrap_or(DEFAULT_MAX_CHUNK_BYTES);

        let session_ttl_secs = env_parse("MEDSCRIBE_SESSION_TTL_SECS")
            .or(toml.session_ttl_secs)
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        let reaper_period_secs = env_parse("MEDSCRIBE_REAPER_PERIOD_SECS")
            .or(toml.reaper_period_secs)
            .unwrap_or(DEFAULT_REAPER_PERIOD_SECS);

        let dedup_window_secs = env_parse("MEDSCRIBE_DEDUP_WINDOW_SECS")
            .or(toml.dedup_window_secs)
            .unwrap_or(DEFAULT_DEDUP_WINDOW_SECS);

        let fingerprint_bucket_secs = env_parse("MEDSCRIBE_FINGERPRINT_BUCKET_SECS")
            .or(toml.fingerprint_bucket_secs)
            .unwrap_or(DEFAULT_FINGERPRINT_BUCKET_SECS);

        let config = Config {
            bind_address,
            root_folder,
            public_base_url,
            openai_api_key,
            max_chunk_bytes,
            session_ttl: Duration::from_secs(session_ttl_secs),
            reaper_period: Duration::from_secs(reaper_period_secs),
            dedup_window: Duration::from_secs(dedup_window_secs),
            fingerprint_bucket: Duration::from_secs(fingerprint_bucket_secs),
        };

        info!(
            root_folder = %config.root_folder.display(),
            bind_address = %config.bind_address,
            "Configuration resolved"
        );
        if config.openai_api_key.is_none() {
            warn!("No OpenAI API key configured; AI processing will fail until one is provided");
        }

        config
    }

    /// Directory holding per-session chunk temp files
    pub fn chunks_dir(&self) -> PathBuf {
        self.root_folder.join("chunks")
    }

    /// Directory backing the local blob store
    pub fn audio_dir(&self) -> PathBuf {
        self.root_folder.join("audio")
    }

    /// Scratch directory for merged artifacts and single-shot spool files
    pub fn tmp_dir(&self) -> PathBuf {
        self.root_folder.join("tmp")
    }

    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("medscribe.db")
    }

    /// Construct a config suitable for tests: everything under `root`, tiny
    /// tunables left at their production defaults.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let root_folder = root.into();
        Config {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            public_base_url: format!("http://{}", DEFAULT_BIND_ADDRESS),
            root_folder,
            openai_api_key: None,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            reaper_period: Duration::from_secs(DEFAULT_REAPER_PERIOD_SECS),
            dedup_window: Duration::from_secs(DEFAULT_DEDUP_WINDOW_SECS),
            fingerprint_bucket: Duration::from_secs(DEFAULT_FINGERPRINT_BUCKET_SECS),
        }
    }
}

fn env_or(name: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty()).or(fallback)
}

fn env_parse(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparseable numeric environment variable");
            None
        }
    }
}

/// Locate and parse the TOML config file, if present
fn load_toml_config() -> TomlConfig {
    let path = std::env::var("MEDSCRIBE_CONFIG")
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::config_dir().map(|d| d.join("medscribe").join("config.toml")));

    let Some(path) = path else {
        return TomlConfig::default();
    };
    if !path.exists() {
        return TomlConfig::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded TOML config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse TOML config; using defaults");
                TomlConfig::default()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read TOML config; using defaults");
            TomlConfig::default()
        }
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("medscribe"))
        .unwrap_or_else(|| PathBuf::from("./medscribe_data"))
}
