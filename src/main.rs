use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::error;

mod assemble;
mod config;
mod constants;
mod detail;
mod discovery;
mod error;
mod extraction;
mod fetcher;
mod logging;
mod pipeline;
mod resolver;
mod sink;
mod types;

use crate::config::Config;
use crate::discovery::ListingSource;
use crate::extraction::OpenAiExtractor;
use crate::fetcher::RenderSession;
use crate::pipeline::CrawlPipeline;
use crate::sink::OutputSink;

#[derive(Parser)]
#[command(name = "bolmal_scraper")]
#[command(about = "Concert ticket-notice scraper feeding the Bolmal service")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    /// Infinite-scroll notice listing
    Scroll,
    /// Paginated notice board
    Board,
}

impl From<SourceArg> for ListingSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Scroll => ListingSource::Scroll,
            SourceArg::Board => ListingSource::Board,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a listing and save the assembled notice texts
    Crawl {
        #[arg(long, value_enum, default_value = "scroll")]
        source: SourceArg,
    },
    /// Extract structured records from a saved crawl and deliver them
    Extract {
        /// Raw crawl file; defaults to today's
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Run the full pipeline (crawl, extract, deliver)
    Run {
        #[arg(long, value_enum, default_value = "scroll")]
        source: SourceArg,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    logging::init_logging();
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load()?;
    let sink = OutputSink::new(&config.output);
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Crawl { source } => {
            println!("🔄 Crawling notice listing...");

            let mut session = RenderSession::new(&config.fetcher)?;
            let pipeline = CrawlPipeline::new(config);
            let (texts, stats) = pipeline.collect_texts(&mut session, source.into()).await?;
            let path = sink.write_raw_texts(&texts, today)?;

            println!("\n📊 Crawl results:");
            println!("   Discovered: {}", stats.discovered);
            println!("   Assembled: {}", stats.assembled);
            println!("   Fetch errors: {}", stats.fetch_errors);
            println!("   Skipped links: {}", stats.skipped_links);
            println!("   Attempts: {}", stats.attempts);
            println!("   Output file: {}", path.display());
            if !stats.crawl_completed {
                println!("⚠️  Retry budget exhausted; output is partial");
            }
        }
        Commands::Extract { input } => {
            println!("🔍 Extracting structured records...");

            let path = input.unwrap_or_else(|| {
                PathBuf::from(&config.output.dir).join(format!("{}.raw.json", today.format("%Y-%m-%d")))
            });
            let texts = OutputSink::read_raw_texts(&path)?;

            let extractor = OpenAiExtractor::from_env(&config.extraction.model)?;
            let pipeline = CrawlPipeline::new(config);
            let (records, failures) = pipeline.extract_records(&extractor, &texts).await;

            let artifact = sink.write_artifact(&records, today)?;
            println!("\n📊 Extraction results:");
            println!("   Records: {}", records.len());
            println!("   Failures: {}", failures);
            println!("   Artifact: {}", artifact.display());

            match sink.submit(&records).await {
                Ok(status) => println!("📤 Submitted downstream (status {status})"),
                Err(e) => {
                    error!("Submission failed: {}", e);
                    println!("❌ Submission failed: {e}");
                }
            }
        }
        Commands::Run { source } => {
            println!("🚀 Running full pipeline (crawl + extract)...");

            let mut session = RenderSession::new(&config.fetcher)?;
            let extractor = OpenAiExtractor::from_env(&config.extraction.model)?;
            let pipeline = CrawlPipeline::new(config);

            match pipeline
                .run(&mut session, &extractor, &sink, source.into())
                .await
            {
                Ok(report) => {
                    println!("\n📊 Run results:");
                    println!("   Discovered: {}", report.stats.discovered);
                    println!("   Assembled: {}", report.stats.assembled);
                    println!("   Records: {}", report.records.len());
                    println!("   Fetch errors: {}", report.stats.fetch_errors);
                    println!("   Extraction failures: {}", report.stats.extraction_failures);
                    println!("   Artifact: {}", report.artifact.display());
                    match report.submit_status {
                        Some(status) => println!("   Submit status: {status}"),
                        None => println!("   Submit status: failed"),
                    }
                    if !report.stats.crawl_completed {
                        println!("⚠️  Retry budget exhausted; results are partial");
                    }
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    println!("❌ Pipeline failed: {e}");
                }
            }
        }
    }
    Ok(())
}
