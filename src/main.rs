use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use fillscan::config::AppConfig;
use fillscan::router::{best_venue, ModelCache, OrderSnapshot};

#[derive(Parser)]
#[command(name = "fillscan")]
#[command(about = "FIX execution-quality toolkit: fills, metrics, quotes, routing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert FIX logs (NewOrderSingle + ExecutionReport fills) to CSV
    Extract(ExtractArgs),
    /// Per-venue execution metrics from a fills CSV
    Metrics(MetricsArgs),
    /// Annotate fills with prevailing quotes and price improvement
    Annotate(AnnotateArgs),
    /// Train per-venue price-improvement models
    Train(TrainArgs),
    /// Pick the venue with the best predicted price improvement
    Route(RouteArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Path to input FIX log
    #[arg(long)]
    input_fix_file: PathBuf,
    /// Path to output fills CSV
    #[arg(long)]
    output_csv_file: PathBuf,
}

#[derive(Args)]
struct MetricsArgs {
    /// Path to input fills CSV
    #[arg(long)]
    input_csv_file: PathBuf,
    /// Path to output metrics CSV
    #[arg(long)]
    output_metrics_file: PathBuf,
}

#[derive(Args)]
struct AnnotateArgs {
    /// Path to fills CSV (extract output)
    #[arg(long)]
    executions: PathBuf,
    /// Path to quotes CSV (ticker,ask_price,bid_price,sip_timestamp)
    #[arg(long)]
    quotes: PathBuf,
    /// Path to output annotated CSV
    #[arg(long)]
    output: PathBuf,
    /// Only load quotes for symbols present in the fills
    #[arg(long)]
    filter_symbols: bool,
}

#[derive(Args)]
struct TrainArgs {
    /// Path to annotated CSV (annotate output)
    #[arg(long)]
    input: PathBuf,
    /// Directory for models.json and evaluation_results.csv
    #[arg(long)]
    output_dir: PathBuf,
    /// Override the configured per-venue sample floor
    #[arg(long)]
    min_samples: Option<usize>,
    /// Override the configured held-out fraction
    #[arg(long)]
    test_fraction: Option<f64>,
}

#[derive(Args)]
struct RouteArgs {
    /// Path to the trained model set (models.json)
    #[arg(long)]
    models: PathBuf,
    /// Ticker symbol (reported, not a model input)
    #[arg(long, default_value = "")]
    symbol: String,
    /// Order side: B or 1 for buy, anything else sell
    #[arg(long)]
    side: String,
    /// Order quantity
    #[arg(long)]
    quantity: f64,
    /// Limit price
    #[arg(long)]
    limit_price: f64,
    /// NBBO bid price at decision time
    #[arg(long)]
    bid_price: f64,
    /// NBBO ask price at decision time
    #[arg(long)]
    ask_price: f64,
    /// NBBO bid size, if known
    #[arg(long)]
    bid_size: Option<f64>,
    /// NBBO ask size, if known
    #[arg(long)]
    ask_size: Option<f64>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fillscan=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_default();

    match cli.command {
        Commands::Extract(args) => {
            fillscan::fix::extract_file(&args.input_fix_file, &args.output_csv_file)?;
        }
        Commands::Metrics(args) => {
            fillscan::metrics::metrics_file(&args.input_csv_file, &args.output_metrics_file)?;
        }
        Commands::Annotate(args) => {
            fillscan::features::annotate_file(
                &args.executions,
                &args.quotes,
                &args.output,
                &config.session,
                args.filter_symbols,
            )?;
        }
        Commands::Train(args) => {
            let mut training = config.training.clone();
            if let Some(min_samples) = args.min_samples {
                training.min_samples = min_samples;
            }
            if let Some(test_fraction) = args.test_fraction {
                training.test_fraction = test_fraction;
            }
            fillscan::model::train_file(&args.input, &args.output_dir, &training)?;
        }
        Commands::Route(args) => {
            let cache = ModelCache::load(&args.models)?;
            let order = OrderSnapshot {
                symbol: args.symbol,
                side: args.side,
                quantity: args.quantity,
                limit_price: args.limit_price,
                bid_price: args.bid_price,
                ask_price: args.ask_price,
                bid_size: args.bid_size,
                ask_size: args.ask_size,
            };
            match best_venue(&cache, &order) {
                Some(choice) => {
                    println!("{},{:.6}", choice.venue, choice.predicted_improvement);
                }
                None => {
                    tracing::warn!("no venue model produced a prediction");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
