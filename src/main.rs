use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use onion_forum_crawler::config::Config;
use onion_forum_crawler::dates::RunContext;
use onion_forum_crawler::db::Database;
use onion_forum_crawler::fetch::{Fetcher, HttpTransport, SessionCredential};
use onion_forum_crawler::snapshot::{save_snapshot, SnapshotKind};
use onion_forum_crawler::walker::{
    prompt_session_cookie, stdin_lines, ConsoleOperator, ForumWalkOutcome, ForumWalker,
    OperatorDecisionSource, UserDirectoryWalker, WalkTermination,
};

/// Crawl the forums and user directory of an onion-routed board
#[derive(Parser)]
#[command(name = "onion-forum-crawler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Console verbosity, repeat for more (overrides LOG_VERBOSITY)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl forums, subforums and their post listings
    Forums,

    /// Crawl the user directory
    Users {
        /// 1-based user directory page to start at
        #[arg(long, default_value_t = 1)]
        start_page: usize,

        /// Also visit every user's profile page
        #[arg(long)]
        detailed: bool,
    },

    /// Crawl forums, then the user directory
    All {
        /// Also visit every user's profile page
        #[arg(long)]
        detailed: bool,
    },
}

/// How a crawl ended, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RunStatus {
    Success,
    FetchFailed,
    OperatorAborted,
}

impl RunStatus {
    fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::FetchFailed => ExitCode::from(2),
            Self::OperatorAborted => ExitCode::from(3),
        }
    }
}

impl From<&WalkTermination> for RunStatus {
    fn from(termination: &WalkTermination) -> Self {
        match termination {
            WalkTermination::Exhausted => Self::Success,
            WalkTermination::FetchFailed { .. } => Self::FetchFailed,
            WalkTermination::OperatorAborted => Self::OperatorAborted,
        }
    }
}

/// Everything a crawl command needs.
struct Crawl {
    config: Config,
    fetcher: Fetcher,
    credential: SessionCredential,
    ctx: RunContext,
    db: Option<Database>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match Config::from_env().and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(1);
        }
    };
    if cli.verbose > 0 {
        config.log_verbosity = cli.verbose;
    }

    let _guard = match init_tracing(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::from(1);
        }
    };

    match run(cli.command, config).await {
        Ok(status) => {
            info!(?status, "Crawler finished");
            status.exit_code()
        }
        Err(e) => {
            error!("Fatal error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(command: Commands, config: Config) -> Result<RunStatus> {
    info!(base_url = %config.base_url, proxy = %config.proxy_url, "Starting onion-forum-crawler");

    // One reader for the cookie prompt and the captcha prompts alike.
    let mut console = stdin_lines();
    let token = match config.session_cookie.clone() {
        Some(token) => token,
        None => prompt_session_cookie(&mut console, &config.cookie_name)
            .await
            .context("Failed to read session cookie")?
            .context("No session cookie given")?,
    };
    let credential = SessionCredential::new(config.cookie_name.clone(), token);

    let transport = HttpTransport::new(&config.proxy_url).context("Failed to build HTTP client")?;
    let fetcher = Fetcher::new(Arc::new(transport));

    let db = if config.persist_to_database {
        Some(
            Database::new(&config.database_path)
                .await
                .context("Failed to initialize database")?,
        )
    } else {
        info!("Database persistence disabled, writing snapshots only");
        None
    };

    let crawl = Crawl {
        config,
        fetcher,
        credential,
        ctx: RunContext::now(),
        db,
    };

    let mut operator = ConsoleOperator::from_lines(console);
    let status = match command {
        Commands::Forums => crawl.forums().await,
        Commands::Users {
            start_page,
            detailed,
        } => crawl.users(start_page, detailed, &mut operator).await?,
        Commands::All { detailed } => {
            let forums = crawl.forums().await;
            let users = crawl.users(1, detailed, &mut operator).await?;
            forums.max(users)
        }
    };

    if let Some(db) = &crawl.db {
        match db.row_counts().await {
            Ok(counts) => {
                for (table, rows) in counts {
                    info!(table, rows, "Database contents");
                }
            }
            Err(e) => warn!(error = %e, "Failed to count stored rows"),
        }
    }
    Ok(status)
}

impl Crawl {
    async fn forums(&self) -> RunStatus {
        let walker = ForumWalker::new(
            self.fetcher.clone(),
            self.credential.clone(),
            self.config.base_url.clone(),
            self.ctx,
        );

        match walker.walk().await {
            ForumWalkOutcome::Completed(forums) => {
                self.snapshot(SnapshotKind::Forums, &forums).await;
                if let Some(db) = &self.db {
                    db.store_forums(&forums).await;
                }
                RunStatus::Success
            }
            ForumWalkOutcome::ListingUnreachable => {
                error!(url = %self.config.base_url, "Forum listing unreachable, nothing crawled");
                RunStatus::FetchFailed
            }
            ForumWalkOutcome::UnknownPageShape { url, partial } => {
                error!(url = %url, forums = partial.len(), "Forum crawl stopped at a page of unknown shape, partial result is not stored");
                self.snapshot(SnapshotKind::Forums, &partial).await;
                RunStatus::FetchFailed
            }
        }
    }

    async fn users(
        &self,
        start_page: usize,
        detailed: bool,
        operator: &mut dyn OperatorDecisionSource,
    ) -> Result<RunStatus> {
        let start_url = self
            .config
            .userlist_start_url(start_page)
            .context("Invalid start page")?;
        let walker = UserDirectoryWalker::new(
            self.fetcher.clone(),
            self.credential.clone(),
            start_url,
            self.ctx,
        );

        let termination = if detailed {
            let walk = walker.walk_detailed(operator).await;
            self.snapshot(SnapshotKind::UsersDetailed, &walk.users).await;
            if let Some(db) = &self.db {
                db.store_users_detailed(&walk.users).await;
            }
            walk.termination
        } else {
            let walk = walker.walk_general().await;
            self.snapshot(SnapshotKind::UsersGeneral, &walk.users).await;
            if let Some(db) = &self.db {
                db.store_users_general(&walk.users).await;
            }
            walk.termination
        };

        if termination == WalkTermination::OperatorAborted {
            warn!("User crawl aborted by the operator, collected users were saved");
        }
        Ok(RunStatus::from(&termination))
    }

    async fn snapshot<T: serde::Serialize + ?Sized>(&self, kind: SnapshotKind, records: &T) {
        save_snapshot(
            &self.config.snapshot_dir,
            kind,
            self.ctx.crawl_timestamp(),
            records,
        )
        .await;
    }
}

fn console_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "info,onion_forum_crawler=debug",
    }
}

fn init_tracing(config: &Config) -> Result<WorkerGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directive(config.log_verbosity)));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    let console = if use_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_filter(console_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_filter(console_filter)
            .boxed()
    };

    // The log file always records the full debug trail of the crawl.
    let log_dir = config
        .log_file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let log_name = config
        .log_file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("darknet-crawler.log");
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(log_name)
        .build(log_dir)
        .with_context(|| format!("Failed to open log file {}", config.log_file_path.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    let file = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new("info,onion_forum_crawler=debug"));

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_users_subcommand() {
        let cli = Cli::try_parse_from(["onion-forum-crawler", "-vv", "users", "--start-page", "3", "--detailed"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Users {
                start_page: 3,
                detailed: true
            }
        ));
    }

    #[test]
    fn test_exit_status_severity() {
        assert_eq!(RunStatus::Success.max(RunStatus::FetchFailed), RunStatus::FetchFailed);
        assert_eq!(
            RunStatus::from(&WalkTermination::OperatorAborted),
            RunStatus::OperatorAborted
        );
        assert_eq!(console_directive(0), "warn");
    }
}
