use clap::{Args, Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_CLICKHOUSE_DATABASE, ENV_CLICKHOUSE_PASSWORD, ENV_CLICKHOUSE_URL, ENV_CLICKHOUSE_USER,
    ENV_CONFIG, ENV_TIMEOUT,
};

#[derive(Parser)]
#[command(name = "chlens")]
#[command(
    version,
    about = "Correlate ClickHouse statements with their query log, pipeline graph and CPU profile",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'C', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// ClickHouse HTTP endpoint
    #[arg(long, global = true, env = ENV_CLICKHOUSE_URL)]
    pub url: Option<String>,

    /// Default database
    #[arg(long = "db", global = true, env = ENV_CLICKHOUSE_DATABASE)]
    pub database: Option<String>,

    /// ClickHouse user
    #[arg(long = "ch-user", global = true, env = ENV_CLICKHOUSE_USER)]
    pub user: Option<String>,

    /// ClickHouse password
    #[arg(long, global = true, env = ENV_CLICKHOUSE_PASSWORD, hide_env_values = true)]
    pub password: Option<String>,

    /// Seconds to wait for log records to appear
    #[arg(long, global = true, env = ENV_TIMEOUT)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Run a statement and report its query_id and duration from system.query_log
    Run {
        /// Don't print the tag, query id and duration
        #[arg(short, long)]
        silent: bool,

        /// The statement to run (read from stdin when omitted)
        querytext: Vec<String>,
    },
    /// Run a statement and print its rows as plain text
    Text {
        /// The statement to run (read from stdin when omitted)
        querytext: Vec<String>,
    },
    /// Print the EXPLAIN PIPELINE graph of a statement
    Pipeline {
        #[command(flatten)]
        source: SourceArgs,

        /// Pass `compact = 1` to EXPLAIN PIPELINE
        #[arg(short, long)]
        compact: bool,

        /// Print a link to an online graph viewer instead of the DOT text
        #[arg(short = 'l', long = "create-link")]
        create_link: bool,
    },
    /// Collect CPU samples of a statement and write a flamegraph
    Flame {
        #[command(flatten)]
        source: SourceArgs,

        /// Keep samples in time order instead of aggregating identical stacks
        #[arg(long)]
        chronological: bool,

        /// Directory for the folded data and the rendered image
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Only write the folded-stack data file
        #[arg(long)]
        no_render: bool,
    },
    /// Run one of the built-in diagnostic queries
    Common(CommonArgs),
}

/// A statement given inline or a past execution picked by its query id
#[derive(Args, Clone, Debug, Default)]
pub struct SourceArgs {
    /// The query_id of a past query to analyse
    #[arg(short = 'q', long = "query-id")]
    pub query_id: Option<String>,

    /// The statement to analyse (read from stdin when omitted)
    pub querytext: Vec<String>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct CommonArgs {
    /// Name of the query (see --list)
    pub name: Option<String>,

    /// List available queries
    #[arg(long)]
    pub list: bool,

    /// Database LIKE pattern
    #[arg(long)]
    pub database: Option<String>,

    /// Table LIKE pattern
    #[arg(long)]
    pub table: Option<String>,

    /// Column LIKE pattern
    #[arg(long)]
    pub column: Option<String>,

    /// User whose queries to list
    #[arg(long)]
    pub user: Option<String>,

    /// Lower bound for event_time (`YYYY-MM-DD hh:mm:ss`)
    #[arg(long)]
    pub since: Option<String>,

    /// Row limit, overrides the query's default
    #[arg(long)]
    pub limit: Option<u64>,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub url: Option<String>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<u64>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        url: cli.url,
        database: cli.database,
        user: cli.user,
        password: cli.password,
        timeout: cli.timeout,
    };
    (config, cli.command)
}
