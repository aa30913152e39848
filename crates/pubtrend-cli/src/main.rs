mod query;

use clap::{Parser, Subcommand};
use pubtrend_core::DurationKey;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pubtrend-cli")]
#[command(about = "Operator commands for the publication trend stores")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// List trending publications for a duration
    Trending {
        /// One of currently, today, week, month, year
        #[arg(long, default_value = "currently")]
        duration: DurationKey,
        /// Maximum number of rows to show
        #[arg(long, default_value = "10")]
        limit: i64,
        /// Sort column; unknown columns fall back to score
        #[arg(long)]
        sort: Option<String>,
        /// asc or desc
        #[arg(long, default_value = "desc")]
        order: String,
    },
    /// Top publications with their time-series aggregates
    Top {
        #[arg(long, default_value = "currently")]
        duration: DurationKey,
        #[arg(long, default_value = "10")]
        n: i64,
        /// Comma-separated metric fields
        #[arg(long, default_value = "score")]
        fields: String,
        /// Comma-separated DOIs to use instead of the top N
        #[arg(long)]
        dois: Option<String>,
    },
    /// Resolve a scope to publication DOIs
    Scope {
        /// publication, author or fieldOfStudy
        kind: String,
        /// DOI for publications, numeric id otherwise
        id: Option<String>,
        #[arg(long, default_value = "currently")]
        duration: DurationKey,
    },
    /// Compare a publication's trending metrics with the population
    Profile {
        doi: String,
        #[arg(long, default_value = "currently")]
        duration: DurationKey,
        /// Print the comparison as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("pubtrend-cli: no command given; see --help");
        return Ok(());
    };

    let config = pubtrend_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let stores = pubtrend_db::Stores::connect(&config).await?;

    match command {
        Commands::Migrate => query::run_migrate(&stores).await,
        Commands::Trending {
            duration,
            limit,
            sort,
            order,
        } => query::run_trending(&stores, duration, limit, sort, order).await,
        Commands::Top {
            duration,
            n,
            fields,
            dois,
        } => query::run_top(&stores, duration, n, &fields, dois.as_deref()).await,
        Commands::Scope { kind, id, duration } => {
            query::run_scope(&stores, &kind, id.as_deref(), duration).await
        }
        Commands::Profile {
            doi,
            duration,
            json,
        } => query::run_profile(&stores, &doi, duration, json).await,
    }
}
