//! # Knowledge Bridge CLI (`kb`)
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb search "<query>"` | Run one knowledge base search and print the response |
//! | `kb serve` | Start the tool-calling HTTP server (with MCP at `/mcp`) |
//! | `kb tools` | Print the registered tool definitions as JSON |
//!
//! ## Examples
//!
//! ```bash
//! # Claim lookup
//! kb search 1234
//!
//! # Full tool result as JSON
//! kb search "what is a claim?" --json
//!
//! # Serve tools for a voice agent
//! RUST_LOG=knowledge_bridge=debug kb serve --config ./config/kb.toml
//! ```
//!
//! AWS credentials are read from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
//! and `AWS_SESSION_TOKEN`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use knowledge_bridge::bedrock::{AwsCredentials, BedrockKnowledgeBaseClient};
use knowledge_bridge::bridge::KnowledgeBaseBridge;
use knowledge_bridge::config::{self, Config};
use knowledge_bridge::models::ToolCallRequest;
use knowledge_bridge::retrieval::Retriever;
use knowledge_bridge::server;
use knowledge_bridge::traits::ToolRegistry;

/// Knowledge Bridge: exposes an Amazon Bedrock knowledge base as a
/// callable tool for conversational agents.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Knowledge Bridge: knowledge base search as a callable tool for conversational agents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the knowledge base once.
    ///
    /// Identifier-like queries ("claim 77", "ticket 9") are rewritten
    /// before the hybrid search; if that finds nothing a plain semantic
    /// search with the original text follows.
    Search {
        /// Question, claim ID, or ticket number.
        query: String,

        /// Print the full tool result as JSON instead of the response text.
        #[arg(long)]
        json: bool,
    },

    /// Start the tool-calling HTTP server on `[server].bind`.
    Serve,

    /// Print registered tool definitions as JSON.
    Tools,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("knowledge_bridge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Wire config and credentials into a bridge over the Bedrock client.
fn build_bridge(cfg: &Config, credentials: AwsCredentials) -> anyhow::Result<KnowledgeBaseBridge> {
    let kb = &cfg.knowledge_base;
    let client = BedrockKnowledgeBaseClient::new(kb, credentials)
        .context("Failed to create Bedrock knowledge base client")?;
    let retriever = Retriever::new(Arc::new(client), kb.id.clone(), kb.max_results);
    Ok(KnowledgeBaseBridge::new(Arc::new(retriever)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Search { query, json } => {
            let bridge = build_bridge(&cfg, AwsCredentials::from_env()?)?;
            let result = bridge.handle(ToolCallRequest::new(query)).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.response());
            }
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Serve => {
            let bridge = build_bridge(&cfg, AwsCredentials::from_env()?)?;
            let tools = ToolRegistry::with_knowledge_base(bridge);
            server::run_server(&cfg, Arc::new(tools)).await?;
        }
        Commands::Tools => {
            // Listing never calls the knowledge base, so credentials are optional.
            let credentials =
                AwsCredentials::from_env().unwrap_or_else(|_| AwsCredentials::new("", "", None));
            let tools = ToolRegistry::with_knowledge_base(build_bridge(&cfg, credentials)?);
            println!("{}", serde_json::to_string_pretty(&tools.describe())?);
        }
    }

    Ok(())
}
