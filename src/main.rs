use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use txsearch::{
    CommitCoordinator, Condition, DbKind, Field, IndexDatabase, RepositoryConfig, SearchIndex,
    SearchParameters, SortOrder,
};

#[derive(Parser)]
#[command(name = "txsearch")]
#[command(about = "Maintenance tooling for the transactional search index")]
struct Cli {
    /// Index datasource (sqlite:, postgres://, mysql://)
    #[arg(long, env = "TXSEARCH_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Skip dialect detection
    #[arg(long, global = true)]
    dialect: Option<DbKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the index tables if missing
    Init,
    /// Query the durable index and print JSON
    Search {
        /// Filter such as `fedora_id=info:fedora/*` or `content_size>=1024`
        #[arg(short, long = "condition")]
        conditions: Vec<String>,
        /// Comma-separated fields to return
        #[arg(long, value_delimiter = ',')]
        fields: Vec<Field>,
        #[arg(long, default_value_t = 100)]
        max_results: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long, default_value = "fedora_id")]
        order_by: Field,
        #[arg(long, default_value = "asc")]
        order: SortOrder,
        /// Include the total number of matches
        #[arg(long)]
        total: bool,
    },
    /// Empty every index table
    Reset,
    /// Purge all staging rows. Only safe while no repository process is running.
    Reconcile,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let database_url = cli
        .database_url
        .context("--database-url or TXSEARCH_DATABASE_URL is required")?;
    let mut config = RepositoryConfig::new(&database_url).min_connections(0);
    if let Some(dialect) = cli.dialect {
        config = config.dialect(dialect);
    }

    let db = IndexDatabase::connect(&config)
        .await
        .with_context(|| format!("Failed to connect to '{}'", config.redacted_url()))?;

    let outcome = run(cli.command, &db, &config).await;
    db.close().await;
    outcome
}

async fn run(command: Command, db: &IndexDatabase, config: &RepositoryConfig) -> Result<()> {
    match command {
        Command::Init => {
            db.apply_schema().await.context("Failed to apply schema")?;
            info!(dialect = %db.kind(), "Schema ready");
        }
        Command::Search {
            conditions,
            fields,
            max_results,
            offset,
            order_by,
            order,
            total,
        } => {
            let mut params = SearchParameters::new()
                .max_results(max_results)
                .offset(offset)
                .order_by(order_by, order)
                .include_total_count(total);
            if !fields.is_empty() {
                params = params.fields(fields);
            }
            for expression in &conditions {
                let condition = Condition::parse(expression)
                    .with_context(|| format!("Invalid condition '{}'", expression))?;
                params = params.condition(condition);
            }

            let index = SearchIndex::new(db.clone(), config.type_cache_capacity);
            let result = index.search(&params).await.context("Search failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Reset => {
            let index = SearchIndex::new(db.clone(), config.type_cache_capacity);
            index.reset().await.context("Failed to reset index")?;
        }
        Command::Reconcile => {
            let purged = CommitCoordinator::new(db.clone())
                .purge_orphans(&[])
                .await
                .context("Failed to purge staging rows")?;
            info!(purged, "Purged staging rows");
        }
    }
    Ok(())
}
