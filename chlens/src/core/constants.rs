// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths, log filters and identifiers)
pub const APP_NAME_LOWER: &str = "chlens";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".chlens";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "chlens.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "CHLENS_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "CHLENS_LOG";

// =============================================================================
// Environment Variables - ClickHouse
// =============================================================================

/// Environment variable for the ClickHouse HTTP endpoint
pub const ENV_CLICKHOUSE_URL: &str = "CHLENS_CLICKHOUSE_URL";

/// Environment variable for the default database
pub const ENV_CLICKHOUSE_DATABASE: &str = "CHLENS_CLICKHOUSE_DATABASE";

/// Environment variable for the ClickHouse user
pub const ENV_CLICKHOUSE_USER: &str = "CHLENS_CLICKHOUSE_USER";

/// Environment variable for the ClickHouse password
pub const ENV_CLICKHOUSE_PASSWORD: &str = "CHLENS_CLICKHOUSE_PASSWORD";

/// Environment variable for the log polling timeout (seconds)
pub const ENV_TIMEOUT: &str = "CHLENS_TIMEOUT";

// =============================================================================
// ClickHouse Defaults
// =============================================================================

/// Default ClickHouse HTTP endpoint
pub const DEFAULT_CLICKHOUSE_URL: &str = "http://localhost:8123";

/// Default database
pub const DEFAULT_CLICKHOUSE_DATABASE: &str = "default";

/// User assumed for common queries when none is configured
pub const DEFAULT_CLICKHOUSE_USER: &str = "default";

// =============================================================================
// Correlation Defaults
// =============================================================================

/// How long to wait for a tagged query to show up in `system.query_log`
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 10;

/// Delay between two log lookups
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Clock skew tolerated between this host and the server when bounding the
/// `event_time` search range. Generous on purpose: the tag is the real filter.
pub const DEFAULT_WINDOW_MARGIN_HOURS: u64 = 24;

/// Upper bound for `correlation.window_margin_hours` (ten years)
pub const MAX_WINDOW_MARGIN_HOURS: u64 = 24 * 365 * 10;

// =============================================================================
// Profiling Defaults
// =============================================================================

/// Directory receiving `<query_id>.flamegraph.{data,svg}`
pub const DEFAULT_FLAMEGRAPH_DIR: &str = "flamegraphs";

/// Sampling period for `query_profiler_cpu_time_period_ns` (10ms)
pub const DEFAULT_SAMPLE_PERIOD_NS: u64 = 10_000_000;

/// Placeholder replaced by the folded-stack data path in renderer arguments
pub const RENDERER_INPUT_PLACEHOLDER: &str = "{input}";

/// Placeholder replaced by the image path in renderer arguments
pub const RENDERER_OUTPUT_PLACEHOLDER: &str = "{output}";

/// Default flamegraph renderer (writes SVG to stdout)
pub const DEFAULT_RENDERER: &[&str] = &["flamegraph.pl", RENDERER_INPUT_PLACEHOLDER];

// =============================================================================
// Graph Viewer
// =============================================================================

/// External Graphviz viewer; the URL-encoded DOT text is appended after `#`
pub const DEFAULT_GRAPH_VIEWER_URL: &str = "https://dreampuf.github.io/GraphvizOnline/#";

// =============================================================================
// Artifact Naming
// =============================================================================

/// Suffix of the folded-stack data file
pub const FLAMEGRAPH_DATA_SUFFIX: &str = "flamegraph.data";

/// Suffix of the rendered flamegraph image
pub const FLAMEGRAPH_IMAGE_SUFFIX: &str = "flamegraph.svg";
