//! `agentrestd`: serves one JSON document over REST.
//!
//! ```text
//! agentrestd -c agent.toml
//! agentrestd -i 0.0.0.0 -p 8080 -n s2e_opm -d s2e_opm.json -s 4096
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use agentrest::agent::{self, DocumentService};
use agentrest::config::AgentConfig;
use agentrest::engine;
use agentrest::router::Router;
use agentrest::server::Server;

#[derive(Debug, Parser)]
#[command(name = "agentrestd", version, about = "REST agent serving a JSON document")]
struct Cli {
    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    ip: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Module name the routes are registered under
    #[arg(short = 'n', long)]
    module: Option<String>,

    /// Maximum HTTP body size in bytes
    #[arg(short = 's', long = "size")]
    max_body_size: Option<usize>,

    /// JSON document to serve
    #[arg(short, long)]
    document: Option<PathBuf>,

    /// Answer 405 for a known path with an unregistered method
    #[arg(long)]
    method_not_allowed: bool,
}

impl Cli {
    fn into_config(self) -> Result<AgentConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::load(path)?,
            None => AgentConfig::default(),
        };
        if let Some(ip) = self.ip {
            config.server.ip = ip;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(module) = self.module {
            config.module = module;
        }
        if let Some(size) = self.max_body_size {
            config.server.max_body_size = size;
        }
        if let Some(document) = self.document {
            config.document = document;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let method_not_allowed = cli.method_not_allowed;
    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("agentrestd: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.as_str().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(config, method_not_allowed).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "agent stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AgentConfig, method_not_allowed: bool) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(%config, "agentrestd starting");

    let router = Router::new().method_not_allowed(method_not_allowed);
    agent::install(&router, &config.module, DocumentService::new(&config.document))?;

    let server = Server::bind(config.server.bind_address())
        .await?
        .max_request_size(config.server.max_request_size());

    tokio::select! {
        result = engine::serve(server, Arc::new(router)) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, shutting down"),
    }
    Ok(())
}
