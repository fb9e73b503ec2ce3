mod approvals;
mod collect;
mod score;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::approvals::ApprovalCommands;

#[derive(Debug, Parser)]
#[command(name = "trendgate-cli")]
#[command(about = "Collect, score, and gate trend signals")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run one collection pass over every enabled source
    Collect {
        /// Only query this source (e.g. youtube)
        #[arg(long)]
        source: Option<String>,
        /// Print the planned queries without calling any source
        #[arg(long)]
        dry_run: bool,
    },
    /// Score entities observed in the window and queue them for approval
    Score {
        /// Override `TRENDGATE_SCORING_WINDOW_DAYS`
        #[arg(long, value_parser = clap::value_parser!(u32).range(2..))]
        window_days: Option<u32>,
        /// Print scores without writing predictions
        #[arg(long)]
        dry_run: bool,
    },
    /// Review and decide pending approvals
    Approvals {
        #[command(subcommand)]
        command: ApprovalCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("trendgate-cli: no command given, see --help");
        return Ok(());
    };

    let config = trendgate_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Db { command } => run_db(&config, command).await,
        Commands::Collect { source, dry_run } => {
            collect::run_collect(&config, source.as_deref(), dry_run).await
        }
        Commands::Score {
            window_days,
            dry_run,
        } => {
            let pool = connect(&config, true).await?;
            score::run_score(&pool, &config, window_days, dry_run).await
        }
        Commands::Approvals { command } => {
            let pool = connect(&config, false).await?;
            approvals::run_approvals(&pool, command).await
        }
    }
}

async fn run_db(config: &trendgate_core::AppConfig, command: DbCommands) -> anyhow::Result<()> {
    let pool = connect(config, false).await?;
    match command {
        DbCommands::Ping => {
            trendgate_db::ping(&pool).await?;
            println!("database: ok");
        }
        DbCommands::Migrate => {
            let applied = trendgate_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
    }
    Ok(())
}

/// Open the pool, optionally bringing the schema up to date first.
pub(crate) async fn connect(
    config: &trendgate_core::AppConfig,
    migrate: bool,
) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = trendgate_db::PoolConfig::from_app_config(config);
    let pool = trendgate_db::connect_pool(&config.database_url, pool_config).await?;
    if migrate {
        trendgate_db::run_migrations(&pool).await?;
    }
    Ok(pool)
}

#[cfg(test)]
mod tests;
