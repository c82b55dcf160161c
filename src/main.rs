use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pdfintake_lib::config::AppConfig;

/// PDF intake service: classify uploaded PDFs, extract their text, map it onto schemas
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API
    Serve {
        /// Address to listen on (overrides PDFINTAKE_BIND)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// SQLite database path (overrides PDFINTAKE_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Extract text from local PDF files and print the batch result as JSON
    Extract {
        /// PDF files, processed in the order given
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Number of pages OCR'd concurrently (overrides PDFINTAKE_OCR_WORKERS)
        #[arg(long)]
        workers: Option<usize>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pdfintake_lib::init_tracing();
    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Serve { bind, db } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(db) = db {
                config.db_path = db;
            }
            pdfintake_lib::serve(config).await?;
        }
        Command::Extract {
            files,
            workers,
            pretty,
        } => {
            if let Some(workers) = workers {
                config.ocr_workers = workers.max(1);
            }
            let batch = pdfintake_lib::extract_files(&config, &files).await?;
            let json = if pretty {
                serde_json::to_string_pretty(&batch)?
            } else {
                serde_json::to_string(&batch)?
            };
            println!("{json}");
        }
    }

    Ok(())
}
