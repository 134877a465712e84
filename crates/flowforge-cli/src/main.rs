//! Command-line front end (C20): `serve` runs the HTTP API, `optimize` and `parity` drive a
//! single orchestration operation directly against the configured backends and print the
//! result as JSON, bypassing HTTP and auth entirely (a local-dev admin context is built
//! in-process instead).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flowforge_api::auth::{AuthContext, Role};
use flowforge_api::{build_router, AppState, OrchestrationService};
use flowforge_core::config::{ArtifactStoreBackend, Settings};
use flowforge_registry::{ArtifactStore, InMemoryRepository, LocalArtifactStore, MemoryArtifactStore, Repository, SqliteRepository};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "flowforge")]
#[command(author = "FlowForge Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Automated-agent optimization service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve,
    /// Run a single optimize pass and print the result as JSON
    Optimize(OptimizeArgs),
    /// Run a single manual-parity benchmark and print the result as JSON
    Parity(ParityArgs),
}

#[derive(Args)]
struct OptimizeArgs {
    /// Agent name to optimize
    #[arg(long)]
    agent_name: String,
    /// Natural-language task description driving dataset synthesis
    #[arg(long)]
    task_desc: String,
    /// Experiment profile tag (e.g. "full_system", "no_search")
    #[arg(long, default_value = "full_system")]
    profile: String,
    /// Override the default synthesized dataset size
    #[arg(long)]
    dataset_size: Option<usize>,
    /// Deterministic seed for dataset synthesis and search
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct ParityArgs {
    /// Agent name to benchmark
    #[arg(long)]
    agent_name: String,
    /// Natural-language task description driving dataset synthesis
    #[arg(long)]
    task_desc: String,
    /// Path to the manual blueprint, relative to the configured manual-blueprints directory
    #[arg(long)]
    manual_blueprint_path: String,
    /// Override the default synthesized dataset size
    #[arg(long)]
    dataset_size: Option<usize>,
    /// Deterministic seed for dataset synthesis
    #[arg(long)]
    seed: Option<u64>,
    /// Maximum score gap tolerated before parity fails
    #[arg(long, default_value_t = 0.05)]
    parity_margin: f64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flowforge=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(false).with_file(false).with_line_number(false))
        .init();
}

fn local_dev_context(tenant_id: &str) -> AuthContext {
    AuthContext { principal: "cli".to_string(), tenant_id: tenant_id.to_string(), role: Role::Admin }
}

async fn open_repository(settings: &Settings) -> Result<Arc<dyn Repository>> {
    if settings.database_url == "sqlite://:memory:" {
        return Ok(Arc::new(InMemoryRepository::new()));
    }
    let path = settings.database_url.strip_prefix("sqlite://").unwrap_or(&settings.database_url);
    let repository = SqliteRepository::open(path).await.context("failed to open sqlite repository")?;
    Ok(Arc::new(repository))
}

fn open_artifact_store(settings: &Settings) -> Arc<dyn ArtifactStore> {
    match settings.artifact_store_backend {
        ArtifactStoreBackend::Local => Arc::new(LocalArtifactStore::new(&settings.artifacts_dir)),
        ArtifactStoreBackend::Memory => Arc::new(MemoryArtifactStore::new()),
    }
}

async fn run_serve() -> Result<()> {
    let settings = Arc::new(Settings::from_env().context("failed to load settings from environment")?);
    let repository = open_repository(&settings).await?;
    let artifact_store = open_artifact_store(&settings);
    let bind_addr = settings.http_bind_addr.clone();

    let state = AppState::new(settings, repository, artifact_store);
    let router = build_router(state);

    tracing::info!(%bind_addr, "starting flowforge api");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.context("failed to bind http listener")?;
    axum::serve(listener, router).await.context("http server exited")?;
    Ok(())
}

async fn run_optimize(args: OptimizeArgs) -> Result<()> {
    let settings = Arc::new(Settings::from_env().context("failed to load settings from environment")?);
    let repository = open_repository(&settings).await?;
    let artifact_store = open_artifact_store(&settings);
    let ctx = local_dev_context(&settings.auth_default_tenant_id);

    let service = OrchestrationService::new(repository, artifact_store, settings);
    let response = service
        .optimize(&ctx, &args.agent_name, &args.task_desc, args.dataset_size, &args.profile, args.seed)
        .await
        .context("optimize run failed")?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_parity(args: ParityArgs) -> Result<()> {
    let settings = Arc::new(Settings::from_env().context("failed to load settings from environment")?);
    let repository = open_repository(&settings).await?;
    let artifact_store = open_artifact_store(&settings);
    let ctx = local_dev_context(&settings.auth_default_tenant_id);

    let service = OrchestrationService::new(repository, artifact_store, settings);
    let response = service
        .benchmark_manual_parity(
            &ctx,
            &args.agent_name,
            &args.task_desc,
            &args.manual_blueprint_path,
            args.dataset_size,
            args.seed,
            args.parity_margin,
        )
        .await
        .context("parity benchmark failed")?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => run_serve().await,
        Commands::Optimize(args) => run_optimize(args).await,
        Commands::Parity(args) => run_parity(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clap_parses_known_subcommands() {
        Cli::try_parse_from(["flowforge", "serve"]).expect("serve should parse");
        Cli::try_parse_from([
            "flowforge",
            "optimize",
            "--agent-name",
            "triage-bot",
            "--task-desc",
            "classify support tickets",
        ])
        .expect("optimize should parse");
        Cli::try_parse_from([
            "flowforge",
            "parity",
            "--agent-name",
            "triage-bot",
            "--task-desc",
            "classify support tickets",
            "--manual-blueprint-path",
            "triage-bot/manual.yml",
        ])
        .expect("parity should parse");
    }

    #[test]
    fn clap_enforces_required_args() {
        assert!(Cli::try_parse_from(["flowforge", "optimize"]).is_err());
        assert!(Cli::try_parse_from(["flowforge", "parity", "--agent-name", "x"]).is_err());
    }
}
