use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_CLICKHOUSE_DATABASE, DEFAULT_CLICKHOUSE_URL,
    DEFAULT_FLAMEGRAPH_DIR, DEFAULT_GRAPH_VIEWER_URL, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_RENDERER, DEFAULT_SAMPLE_PERIOD_NS,
    DEFAULT_WINDOW_MARGIN_HOURS, MAX_WINDOW_MARGIN_HOURS,
};

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// ClickHouse connection section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ClickhouseFileConfig {
    /// HTTP endpoint (or use CHLENS_CLICKHOUSE_URL env var)
    pub url: Option<String>,
    /// Default database (default: "default")
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Enable LZ4 compression (default: true)
    pub compression: Option<bool>,
}

/// Log polling section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CorrelationFileConfig {
    pub timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub window_margin_hours: Option<u64>,
}

/// Profiling section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileFileConfig {
    pub output_dir: Option<String>,
    /// Renderer program followed by its arguments
    pub renderer: Option<Vec<String>>,
    pub sample_period_ns: Option<u64>,
}

/// Pipeline graph section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct GraphFileConfig {
    pub viewer_url: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub clickhouse: Option<ClickhouseFileConfig>,
    pub correlation: Option<CorrelationFileConfig>,
    pub profile: Option<ProfileFileConfig>,
    pub graph: Option<GraphFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(ch) = other.clickhouse {
            let current = self
                .clickhouse
                .get_or_insert_with(ClickhouseFileConfig::default);
            if ch.url.is_some() {
                tracing::trace!(url = ?ch.url, "Merging clickhouse.url");
                current.url = ch.url;
            }
            if ch.database.is_some() {
                current.database = ch.database;
            }
            if ch.user.is_some() {
                current.user = ch.user;
            }
            if ch.password.is_some() {
                current.password = ch.password;
            }
            if ch.compression.is_some() {
                current.compression = ch.compression;
            }
        }

        if let Some(correlation) = other.correlation {
            let current = self
                .correlation
                .get_or_insert_with(CorrelationFileConfig::default);
            if correlation.timeout_secs.is_some() {
                tracing::trace!(timeout_secs = ?correlation.timeout_secs, "Merging correlation.timeout_secs");
                current.timeout_secs = correlation.timeout_secs;
            }
            if correlation.poll_interval_ms.is_some() {
                current.poll_interval_ms = correlation.poll_interval_ms;
            }
            if correlation.window_margin_hours.is_some() {
                current.window_margin_hours = correlation.window_margin_hours;
            }
        }

        if let Some(profile) = other.profile {
            let current = self.profile.get_or_insert_with(ProfileFileConfig::default);
            if profile.output_dir.is_some() {
                current.output_dir = profile.output_dir;
            }
            if profile.renderer.is_some() {
                tracing::trace!(renderer = ?profile.renderer, "Merging profile.renderer");
                current.renderer = profile.renderer;
            }
            if profile.sample_period_ns.is_some() {
                current.sample_period_ns = profile.sample_period_ns;
            }
        }

        if let Some(graph) = other.graph {
            let current = self.graph.get_or_insert_with(GraphFileConfig::default);
            if graph.viewer_url.is_some() {
                current.viewer_url = graph.viewer_url;
            }
        }
    }
}

// =============================================================================
// Runtime Config
// =============================================================================

/// ClickHouse connection (final/runtime)
#[derive(Debug, Clone)]
pub struct ClickhouseConfig {
    pub url: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub compression: bool,
}

/// Log polling and search window (final/runtime)
#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub window_margin: Duration,
}

/// Profiling and flamegraph output (final/runtime)
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub output_dir: PathBuf,
    pub renderer: Vec<String>,
    pub sample_period_ns: u64,
}

/// Pipeline graph output (final/runtime)
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub viewer_url: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub clickhouse: ClickhouseConfig,
    pub correlation: CorrelationConfig,
    pub profile: ProfileConfig,
    pub graph: GraphConfig,
}

/// `~/.chlens/chlens.json`
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

impl AppConfig {
    /// Load configuration with priority (lowest to highest):
    /// 1. Built-in defaults
    /// 2. Profile directory config (~/.chlens/chlens.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::resolve(cli, file_config);
        config.validate()?;
        Ok(config)
    }

    /// Layer configs: defaults -> file config -> CLI/env overrides
    fn resolve(cli: &CliConfig, file_config: FileConfig) -> Self {
        let file_ch = file_config.clickhouse.unwrap_or_default();
        let file_correlation = file_config.correlation.unwrap_or_default();
        let file_profile = file_config.profile.unwrap_or_default();
        let file_graph = file_config.graph.unwrap_or_default();

        let clickhouse = ClickhouseConfig {
            url: cli
                .url
                .clone()
                .or(file_ch.url)
                .unwrap_or_else(|| DEFAULT_CLICKHOUSE_URL.to_string()),
            database: cli
                .database
                .clone()
                .or(file_ch.database)
                .unwrap_or_else(|| DEFAULT_CLICKHOUSE_DATABASE.to_string()),
            user: cli.user.clone().or(file_ch.user),
            password: cli.password.clone().or(file_ch.password),
            compression: file_ch.compression.unwrap_or(true),
        };

        let timeout_secs = cli
            .timeout
            .or(file_correlation.timeout_secs)
            .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS);
        let correlation = CorrelationConfig {
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_millis(
                file_correlation
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            window_margin: Duration::from_secs(
                file_correlation
                    .window_margin_hours
                    .unwrap_or(DEFAULT_WINDOW_MARGIN_HOURS)
                    .saturating_mul(3600),
            ),
        };

        let profile = ProfileConfig {
            output_dir: expand_path(
                file_profile
                    .output_dir
                    .as_deref()
                    .unwrap_or(DEFAULT_FLAMEGRAPH_DIR),
            ),
            renderer: file_profile
                .renderer
                .unwrap_or_else(|| DEFAULT_RENDERER.iter().map(|s| s.to_string()).collect()),
            sample_period_ns: file_profile
                .sample_period_ns
                .unwrap_or(DEFAULT_SAMPLE_PERIOD_NS),
        };

        let graph = GraphConfig {
            viewer_url: file_graph
                .viewer_url
                .unwrap_or_else(|| DEFAULT_GRAPH_VIEWER_URL.to_string()),
        };

        Self {
            clickhouse,
            correlation,
            profile,
            graph,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.clickhouse.url.trim().is_empty() {
            anyhow::bail!("clickhouse.url must not be empty");
        }
        if self.correlation.timeout.is_zero() {
            anyhow::bail!("correlation.timeout_secs must be greater than 0");
        }
        if self.correlation.poll_interval.is_zero() {
            anyhow::bail!("correlation.poll_interval_ms must be greater than 0");
        }
        if self.correlation.window_margin > Duration::from_secs(MAX_WINDOW_MARGIN_HOURS * 3600) {
            anyhow::bail!(
                "correlation.window_margin_hours must be at most {}",
                MAX_WINDOW_MARGIN_HOURS
            );
        }
        if self
            .profile
            .renderer
            .first()
            .is_none_or(|program| program.trim().is_empty())
        {
            anyhow::bail!("profile.renderer must name a program");
        }
        if self.profile.sample_period_ns == 0 {
            anyhow::bail!("profile.sample_period_ns must be greater than 0");
        }
        Ok(())
    }
}
