use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

mod api;
mod config;
mod error;
mod funnel;
mod listing;
mod metrics;
mod models;
mod refresh;
mod report;
mod store;

use config::{ServeConfig, StoreConfig};
use listing::PeopleFilter;
use refresh::{RefreshTask, SharedDashboard};
use store::{AirtableClient, RecordSource};

#[derive(Parser)]
#[command(name = "funnel-dashboard")]
#[command(about = "Recruitment funnel dashboard backed by an Airtable base", long_about = None)]
struct Cli {
    #[command(flatten)]
    store: StoreConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard API and keep the dashboard refreshed
    Serve {
        #[command(flatten)]
        serve: ServeConfig,
    },
    /// Fetch once and write a markdown report
    Report {
        #[arg(long, default_value = "funnel-report.md")]
        out: PathBuf,
    },
    /// Fetch once and print the flow graph as JSON
    Graph,
    /// List people, optionally filtered
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Write the rows as CSV instead of printing them
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let client = AirtableClient::new(cli.store).context("failed to build Airtable client")?;
    let source: Arc<dyn RecordSource> = Arc::new(client);

    match cli.command {
        Commands::Serve { serve } => run_server(source, serve).await?,
        Commands::Report { out } => {
            let snapshot = refresh::run_cycle(source.as_ref(), Utc::now()).await?;
            std::fs::write(&out, report::build_report(&snapshot))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Graph => {
            let people = source.fetch_people().await?;
            let graph = funnel::build_flow_graph(&people)?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Commands::List {
            search,
            status,
            csv,
        } => {
            let filter = PeopleFilter { search, status };
            let rows = listing::filter_people(source.fetch_people().await?, &filter);

            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                listing::write_csv(file, &rows)?;
                println!("Exported {} people to {}.", rows.len(), path.display());
                return Ok(());
            }

            if rows.is_empty() {
                println!("No people match these filters.");
                return Ok(());
            }
            for person in &rows {
                println!(
                    "- {} [{}] {} (created {})",
                    person.name,
                    person.status.as_deref().unwrap_or("no status"),
                    person.id,
                    person.created.date_naive()
                );
            }
        }
    }

    Ok(())
}

async fn run_server(source: Arc<dyn RecordSource>, serve: ServeConfig) -> anyhow::Result<()> {
    let dashboard = SharedDashboard::default();
    let task = RefreshTask::spawn(source.clone(), dashboard.clone(), serve.refresh_interval());

    let app = api::build_router(api::AppState::new(source, dashboard));
    let listener = tokio::net::TcpListener::bind(serve.bind)
        .await
        .with_context(|| format!("failed to bind {}", serve.bind))?;
    info!("funnel-dashboard listening on http://{}", serve.bind);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await;

    task.shutdown().await;
    served.context("HTTP server failed")
}
