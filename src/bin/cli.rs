//! marketlog CLI
//!
//! Maintenance and inspection commands over a marketlog base directory.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use marketlog::{Config, LogEngine, Result};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// marketlog CLI
#[derive(Parser, Debug)]
#[command(name = "marketlog-cli")]
#[command(about = "Inspect and maintain append-only JSONL log streams")]
#[command(version)]
struct Args {
    /// Base directory holding one subdirectory per stream
    #[arg(short, long, default_value = "./marketlog_data")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild index files from data files
    Reindex {
        /// Only this stream (default: every stream)
        #[arg(short, long)]
        stream: Option<String>,
    },

    /// Print the last record of a stream
    Tail {
        stream: String,
    },

    /// Print records by global line number (inclusive)
    Range {
        stream: String,
        from: u64,
        to: u64,
    },

    /// Print file and record counts of a stream
    Stats {
        stream: String,
    },

    /// List streams under the base directory
    Streams,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,marketlog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("marketlog v{}", marketlog::VERSION);

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::builder().base_dir(&args.base_dir).try_build()?;
    let engine: LogEngine<Value> = LogEngine::open(config).await?;

    match args.command {
        Commands::Reindex { stream } => {
            let all = match stream {
                Some(stream) => vec![engine.reindex_stream(&stream).await?],
                None => engine.reindex_all().await?,
            };
            for stats in all {
                print_json(&json!({
                    "stream": stats.stream,
                    "files": stats.files,
                    "records": stats.records,
                    "bytes": stats.bytes_scanned,
                    "dropped_tails": stats.dropped_tails,
                }));
            }
        }
        Commands::Tail { stream } => {
            if let Some(record) = engine.read_last_record(&stream).await? {
                print_json(&record);
            }
        }
        Commands::Range { stream, from, to } => {
            for record in engine.read_from_line_range(&stream, from, to).await? {
                print_json(&record);
            }
        }
        Commands::Stats { stream } => {
            let stats = engine.stream_stats(&stream).await?;
            print_json(&json!({
                "stream": stats.stream,
                "files": stats.file_count,
                "records": stats.record_count,
                "bytes": stats.total_bytes,
                "first_message_time": stats.first_message_time,
                "last_message_time": stats.last_message_time,
            }));
        }
        Commands::Streams => {
            for stream in engine.list_streams().await? {
                println!("{}", stream);
            }
        }
    }
    Ok(())
}

fn print_json(value: &Value) {
    println!("{}", value);
}
