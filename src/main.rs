// src/main.rs
// Pentad - multi-persona LLM relay

use anyhow::Result;
use clap::{Parser, Subcommand};
use pentad::{OpenRouterClient, PentadConfig, server};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pentad")]
#[command(about = "Fan one prompt out to several LLM personas and stream them side by side")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Address to bind
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// Print the configured persona roster
    Personas,
}

async fn run_server(
    mut config: PentadConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let client = OpenRouterClient::new(config.api_key.clone())?
        .with_endpoint(config.upstream_url.clone())
        .with_request_timeout(config.upstream_timeout);

    let state = server::AppState::from_config(&config, Arc::new(client))?;
    state.uploads.ensure_dir().await?;

    info!(
        personas = state.roster.len(),
        upstream = %config.upstream_url,
        timeout_secs = config.upstream_timeout.as_secs(),
        token_limit = config.token_limit,
        upload_dir = %config.upload_dir.display(),
        "Pentad configured"
    );

    let app = server::create_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Pentad running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn print_roster(config: &PentadConfig) -> Result<()> {
    let roster = config.load_roster()?;
    for persona in roster.personas() {
        println!("{:<16} {:<20} {}", persona.id, persona.name, persona.model);
    }
    let synth = roster.synthesizer();
    println!("{:<16} {:<20} {} (synthesis)", synth.id, synth.name, synth.model);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv(); // Load .env from current directory

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Missing credentials stop the process before anything binds
    let config = match PentadConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve { host, port }) => run_server(config, host, port).await,
        None => run_server(config, None, None).await,
        Some(Commands::Personas) => print_roster(&config),
    }
}
