//! Dealflow CLI — command-line interface for the Dealflow copilot.
//!
//! Reuses the same core domain logic (dealflow-core) and server bootstrap
//! (dealflow-server) that power the web frontend.

mod commands;

use clap::{Parser, Subcommand};

/// Dealflow CLI — AI-assisted investment research pipeline
#[derive(Parser)]
#[command(
    name = "dealflow",
    version,
    about = "Dealflow CLI — AI-assisted investment research pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Dealflow HTTP backend server
    Server {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3410)]
        port: u16,
    },

    /// Run an analysis workflow interactively: stream each step's progress
    /// and decide continue / refine / skip at every review gate
    Run {
        /// Company name
        #[arg(long)]
        company: String,
        /// Company website URL
        #[arg(long)]
        website: String,
        /// Sector (e.g. SaaS, Fintech, Marketplace)
        #[arg(long, default_value = "Technology")]
        sector: String,
        /// Geographic region (e.g. Vietnam, Southeast Asia)
        #[arg(long, default_value = "Global")]
        region: String,
        /// HQ location if different from region
        #[arg(long)]
        hq: Option<String>,
        /// Data-room files (plain text; include to add the data-room step)
        #[arg(long = "doc")]
        documents: Vec<String>,
        /// Use scripted agents instead of the LLM provider
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Server { host, port } => commands::server::run(host, port).await,
        Commands::Run {
            company,
            website,
            sector,
            region,
            hq,
            documents,
            offline,
        } => {
            commands::run::run(
                company, website, sector, region, hq, documents, offline,
            )
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
