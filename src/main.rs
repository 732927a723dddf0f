use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brandkit::api::{self, AppState};
use brandkit::config::Config;
use brandkit::db::{BrandStore, Database};
use brandkit::models::{BrandContext, CreateBrandInput};
use brandkit::pipeline::{
    progress_channel, AcceptanceCommitter, GenerationOrchestrator, RunRequest,
};
use brandkit::requirements;
use brandkit::service::{GenerationClient, GenerationService, PlaceholderService};

#[derive(Parser)]
#[command(name = "brandkit")]
#[command(about = "Staged brand content generation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Parse and validate a requirements file
    Parse {
        /// Path to the requirements file
        file: PathBuf,
    },
    /// Create a brand from a requirements file and generate its content
    Generate {
        /// Path to the requirements file
        file: PathBuf,
        /// Brand name
        #[arg(long)]
        name: String,
        /// Owning user id
        #[arg(long)]
        user: String,
        /// Merge the generated content into the brand when done
        #[arg(long)]
        accept: bool,
        /// Use placeholder content instead of the generation service
        #[arg(long)]
        offline: bool,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "brandkit=debug,tower_http=debug".into()),
    );

    // Logs go to stderr so `parse`/`generate` output on stdout stays machine readable
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let db = Database::open_configured(config)?;
    db.migrate()?;
    Ok(db)
}

async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting brandkit server on port {}", port);

    let db = open_database(&config)?;
    let service: Arc<dyn GenerationService> = Arc::new(GenerationClient::from_config(&config));
    let staging_ttl = config.staging_ttl;
    let state = AppState::new(db, service, config);
    state.staging.spawn_sweeper(staging_ttl);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("brandkit server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn parse(file: PathBuf) -> anyhow::Result<bool> {
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let outcome = requirements::parse(&text);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.success)
}

async fn generate(
    config: Config,
    file: PathBuf,
    name: String,
    user: String,
    accept: bool,
    offline: bool,
) -> anyhow::Result<bool> {
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let outcome = requirements::parse(&text);
    if !outcome.success {
        for error in outcome.error_list() {
            eprintln!("error: {}", error);
        }
        return Ok(false);
    }
    let questionnaire = outcome
        .data
        .context("Parsed requirements carried no questionnaire")?;

    let db = open_database(&config)?;
    let brand = db.create_brand(CreateBrandInput {
        name,
        user_id: user,
    })?;
    tracing::info!(brand_id = %brand.id, "Created brand {}", brand.name);

    let service: Arc<dyn GenerationService> = if offline {
        Arc::new(PlaceholderService::new())
    } else {
        Arc::new(GenerationClient::from_config(&config))
    };
    let store: Arc<dyn BrandStore> = Arc::new(db.clone());
    let orchestrator = GenerationOrchestrator::new(service, store.clone(), config.clone());

    let (reporter, mut stream) = progress_channel();
    let printer = tokio::spawn(async move {
        while let Some(steps) = stream.recv().await {
            let line: Vec<String> = steps
                .iter()
                .map(|s| format!("{}:{}", s.id, s.status.as_str()))
                .collect();
            eprintln!("{}", line.join("  "));
        }
    });

    let request = RunRequest {
        brand: BrandContext::from(&brand),
        questionnaire,
    };
    let result = orchestrator.run(request, reporter).await;
    printer.await?;

    let bundle = match result {
        Ok(bundle) => bundle,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(false);
        }
    };

    if accept {
        let committer = AcceptanceCommitter::new(store, config.accept_retries);
        let outcome = committer.accept(brand.id, &bundle)?;
        tracing::info!(brand_id = %brand.id, version = outcome.version, "Content accepted");
    }

    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = Config::from_env();

    let ok = match cli.command {
        Some(Commands::Serve { port }) => {
            serve(config, port).await?;
            true
        }
        Some(Commands::Parse { file }) => parse(file)?,
        Some(Commands::Generate {
            file,
            name,
            user,
            accept,
            offline,
        }) => generate(config, file, name, user, accept, offline).await?,
        None => {
            serve(config, 3000).await?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
