mod classify;
mod extract;
mod fetch;
mod input;
mod pipeline;
mod store;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "zapscan", about = "Batch site analyzer: blog/niche detection with resumable CSV output")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, classify and record every domain not already in the output
    Run {
        /// Domain list, one per line
        #[arg(short, long)]
        input: PathBuf,
        /// Record store (created on first run, appended to afterwards)
        #[arg(short, long, default_value = "zap_results.csv")]
        output: PathBuf,
        /// Per-attempt network timeout in seconds
        #[arg(long, default_value_t = 15)]
        timeout: u64,
        /// Retry attempts per domain after the first try
        #[arg(long, default_value_t = 2)]
        retries: u32,
        /// Worker pool size
        #[arg(short, long, default_value_t = 6)]
        concurrency: usize,
        /// Max domains to process this run (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show record store statistics
    Stats {
        #[arg(short, long, default_value = "zap_results.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            output,
            timeout,
            retries,
            concurrency,
            limit,
        } => {
            let domains = input::read_domains(&input)?;
            let index = store::load_index(&output)?;
            let mut record_store = store::RecordStore::open(&output)?;
            println!(
                "Loaded {} unique domains; {} records already in store",
                domains.len(),
                index.len()
            );

            let config = pipeline::PipelineConfig {
                timeout: Duration::from_secs(timeout),
                max_retries: retries,
                concurrency: concurrency.max(1),
                limit,
            };
            let stats = pipeline::run(&mut record_store, &index, domains, &config).await?;
            println!(
                "Done: {} processed ({} ok, {} failed), {} skipped as done.",
                stats.processed, stats.ok, stats.failed, stats.skipped
            );
            Ok(())
        }
        Commands::Stats { output } => {
            let s = store::read_stats(&output)?;
            println!("Total:   {}", s.total);
            println!("Ok:      {}", s.ok);
            println!("Failed:  {}", s.failed);
            println!("Blogs:   {}", s.blogs);
            println!("Niches:  {}", s.distinct_niches);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
