//! Core application

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

use crate::core::cli::{self, CliConfig, CommonArgs, Commands, SourceArgs};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::{ClickhouseExecutor, QueryExecutor};
use crate::domain::common_queries::{self, COMMON_QUERIES, CommonQueryParams};
use crate::domain::{
    FlamegraphWriter, LogPoller, PipelineGraphFetcher, ChlensError, ProfileSampler, Query,
    QuerySource, TagCorrelator, TraceOrder,
};
use crate::utils::file::expand_path;
use crate::utils::terminal::{format_rows, terminal_link};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub executor: Arc<dyn QueryExecutor>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        // Listing needs no connection
        if let Commands::Common(CommonArgs { list: true, .. }) = command {
            Self::print_common_queries();
            return Ok(());
        }

        let app = Self::init(&cli_config).await?;
        app.shutdown.install_signal_handlers();
        app.dispatch(command).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let executor = ClickhouseExecutor::connect(&config.clickhouse)
            .await
            .with_context(|| format!("Failed to connect to ClickHouse at {}", config.clickhouse.url))?;

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            executor: Arc::new(executor),
        })
    }

    async fn dispatch(&self, command: Commands) -> Result<()> {
        let started = std::time::Instant::now();
        let result = self
            .shutdown
            .run_until_cancelled(self.execute(command))
            .await
            .unwrap_or_else(|| {
                Err(ChlensError::Cancelled {
                    elapsed_ms: started.elapsed().as_millis(),
                })
            });

        result.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(
                    timeout_secs = self.config.correlation.timeout.as_secs(),
                    "Log records can take several seconds to flush; retry with a larger --timeout"
                );
            }
            anyhow::Error::from(e)
        })
    }

    async fn execute(&self, command: Commands) -> Result<(), ChlensError> {
        match command {
            Commands::Run { silent, querytext } => self.run_correlated(silent, &querytext).await,
            Commands::Text { querytext } => self.run_text(&querytext).await,
            Commands::Pipeline {
                source,
                compact,
                create_link,
            } => self.show_pipeline(&source, compact, create_link).await,
            Commands::Flame {
                source,
                chronological,
                out_dir,
                no_render,
            } => {
                let order = if chronological {
                    TraceOrder::Chronological
                } else {
                    TraceOrder::Aggregated
                };
                self.write_flamegraph(&source, order, out_dir, no_render)
                    .await
            }
            Commands::Common(args) => self.run_common(&args).await,
        }
    }

    fn poller(&self) -> LogPoller {
        LogPoller::new(
            self.config.correlation.timeout,
            self.config.correlation.poll_interval,
        )
        .with_cancellation(self.shutdown.token())
    }

    async fn run_correlated(&self, silent: bool, querytext: &[String]) -> Result<(), ChlensError> {
        let query = Query::new(&statement_text(querytext).await?)?;
        let correlator = TagCorrelator::new(
            self.executor.clone(),
            self.poller(),
            self.config.correlation.window_margin,
        );

        let _quiet = silent.then(|| self.executor.feedback().quiet());
        let result = correlator.correlate(&query).await?;

        if !silent {
            println!("query_id: {}", result.query_id);
            println!("duration_ms: {}", result.duration_ms);
        }
        Ok(())
    }

    async fn run_text(&self, querytext: &[String]) -> Result<(), ChlensError> {
        let query = Query::new(&statement_text(querytext).await?)?;
        let rows = self.executor.execute(&query.to_sql()).await?;
        print!("{}", format_rows(&rows));
        Ok(())
    }

    async fn show_pipeline(
        &self,
        source: &SourceArgs,
        compact: bool,
        create_link: bool,
    ) -> Result<(), ChlensError> {
        let source = resolve_source(source).await?;
        let graph = PipelineGraphFetcher::new(self.executor.clone())
            .fetch(&source, compact)
            .await?;

        if create_link {
            println!("{}", terminal_link(&graph.viewer_url(&self.config.graph.viewer_url)));
        } else {
            println!("{}", graph.dot());
        }
        Ok(())
    }

    async fn write_flamegraph(
        &self,
        source: &SourceArgs,
        order: TraceOrder,
        out_dir: Option<PathBuf>,
        no_render: bool,
    ) -> Result<(), ChlensError> {
        let source = resolve_source(source).await?;
        let out_dir = out_dir
            .map(|dir| expand_path(&dir.to_string_lossy()))
            .unwrap_or_else(|| self.config.profile.output_dir.clone());

        let sampler = ProfileSampler::new(
            self.executor.clone(),
            self.poller(),
            self.config.correlation.window_margin,
            self.config.profile.sample_period_ns,
        );
        let trace = sampler.sample(&source, order).await?;

        let writer = FlamegraphWriter::new(self.config.profile.renderer.clone());
        if no_render {
            let data_path = writer.write_data(&trace, &out_dir).await?;
            println!("{}", data_path.display());
        } else {
            let artifacts = writer.write(&trace, &out_dir).await?;
            println!("{}", artifacts.data_path.display());
            println!("{}", artifacts.image_path.display());
        }
        Ok(())
    }

    async fn run_common(&self, args: &CommonArgs) -> Result<(), ChlensError> {
        let name = args.name.as_deref().ok_or_else(|| {
            ChlensError::validation("a common query name is required (see --list)")
        })?;
        let params = CommonQueryParams {
            database: args.database.clone(),
            table: args.table.clone(),
            column: args.column.clone(),
            user: args
                .user
                .clone()
                .or_else(|| self.config.clickhouse.user.clone()),
            since: args.since.clone(),
            limit: args.limit,
        };

        let query = common_queries::find(name)?.render(&params)?;
        let rows = self.executor.execute(&query.to_sql()).await?;
        print!("{}", format_rows(&rows));
        Ok(())
    }

    fn print_common_queries() {
        for query in COMMON_QUERIES {
            println!("{:<20} {}", query.name, query.description);
        }
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}

/// Statement from the command line, or from stdin when none was given
async fn statement_text(querytext: &[String]) -> Result<String, ChlensError> {
    if !querytext.is_empty() {
        return Ok(querytext.join(" "));
    }
    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;
    Ok(text)
}

async fn resolve_source(source: &SourceArgs) -> Result<QuerySource, ChlensError> {
    let text = match source.query_id {
        Some(_) => None,
        None => Some(statement_text(&source.querytext).await?),
    };
    QuerySource::resolve(source.query_id.as_deref(), text.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inline_statement_is_joined() {
        let text = statement_text(&["SELECT".to_string(), "1".to_string()])
            .await
            .unwrap();
        assert_eq!(text, "SELECT 1");
    }

    #[tokio::test]
    async fn test_query_id_source_skips_stdin() {
        let source = SourceArgs {
            query_id: Some("5f8b3c1e-0c44-4a4e-9d55-6b0a8f2d9e11".to_string()),
            querytext: Vec::new(),
        };
        assert!(matches!(
            resolve_source(&source).await.unwrap(),
            QuerySource::Execution(_)
        ));

        let bad = SourceArgs {
            query_id: Some("bad-id".to_string()),
            querytext: Vec::new(),
        };
        assert!(matches!(
            resolve_source(&bad).await,
            Err(ChlensError::Validation(_))
        ));
    }
}
