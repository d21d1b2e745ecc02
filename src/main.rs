use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod http;
mod intake;
mod models;
mod pipeline;
mod report;
mod scoring;

use config::AppConfig;
use intake::{DocumentStore, UploadedBlob};
use models::{ReportOutcome, SubmissionIdentity};
use pipeline::Pipeline;
use scoring::CommandScorer;

#[derive(Parser)]
#[command(name = "answer-sheet-ledger")]
#[command(about = "Scores uploaded answer sheets and keeps a ledger of results", long_about = None)]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the results ledger if it does not exist
    InitDb,
    /// Serve the upload form endpoint, results listing and chart
    Serve {
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },
    /// Score one answer sheet and record the result
    Submit {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        roll_no: String,
        #[arg(long, default_value = "")]
        semester: String,
    },
    /// List recorded results, newest first
    Results {
        /// Print the listing as JSON
        #[arg(long, conflicts_with = "csv_path")]
        json: bool,
        /// Write the listing to a CSV file instead
        #[arg(long = "csv")]
        csv_path: Option<PathBuf>,
    },
    /// Render the performance chart from every recorded result
    Report,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "answer_sheet_ledger=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    config.ensure_dirs()?;
    let pool = db::connect(&config.database_url).await?;
    db::init_db(&pool)
        .await
        .context("failed to initialize the results ledger")?;

    match cli.command {
        Commands::InitDb => {
            let total = db::count(&pool).await?;
            println!("Schema ready ({total} results recorded).");
        }
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or(config.bind_addr);
            let state = Arc::new(build_pipeline(pool, &config)?);
            let app = http::router(state, config.max_upload_bytes);

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!("listening on {addr}");
            axum::serve(listener, app).await.context("server error")?;
        }
        Commands::Submit {
            file,
            name,
            roll_no,
            semester,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let blob = UploadedBlob {
                file_name: file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                bytes,
            };

            let pipeline = build_pipeline(pool, &config)?;
            let record = pipeline
                .submit(SubmissionIdentity::new(name, roll_no, semester), &blob)
                .await?;
            println!(
                "Recorded #{} {} ({}, semester {}) mark {}.",
                record.id,
                record.identity.name,
                record.identity.roll_no,
                record.identity.semester,
                record.mark
            );
        }
        Commands::Results { json, csv_path } => {
            let records = db::list_descending(&pool).await?;

            if let Some(path) = csv_path {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::export_csv(&records, file)?;
                println!("Wrote {} results to {}.", records.len(), path.display());
            } else if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No results recorded yet.");
            } else {
                for record in &records {
                    println!(
                        "#{} {} ({}, semester {}) mark {} on {}",
                        record.id,
                        record.identity.name,
                        record.identity.roll_no,
                        record.identity.semester,
                        record.mark,
                        record.display_date()
                    );
                }
            }
        }
        Commands::Report => match report::render_report(&pool, &config.graph_dir).await? {
            ReportOutcome::Empty => println!("No results recorded yet."),
            ReportOutcome::Rendered { path, bars } => {
                println!("Chart of {} results written to {}.", bars.len(), path.display());
            }
        },
    }

    Ok(())
}

fn build_pipeline(pool: sqlx::SqlitePool, config: &AppConfig) -> anyhow::Result<Pipeline> {
    let Some((program, args)) = config.scorer_cmd.as_deref().and_then(<[String]>::split_first)
    else {
        bail!("SCORER_CMD must name the answer-sheet scoring program");
    };
    let scorer = CommandScorer::new(program, config.scorer_timeout).with_args(args.to_vec());

    Ok(Pipeline::new(
        pool,
        DocumentStore::new(&config.upload_dir),
        Arc::new(scorer),
        &config.graph_dir,
    ))
}
