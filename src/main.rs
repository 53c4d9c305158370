use anyhow::{Context, Result, bail};
use clap::Parser;
use jpy_acb::config::Config;
use jpy_acb::ledger::{self, TradeLedger};
use jpy_acb::model::q2;
use jpy_acb::{CostBasisEngine, PrefetchedOracle, fair_value_queries};
use std::fs::File;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reconstructs realized profit and acquisition cost from normalized
/// exchange ledgers.
#[derive(Debug, Parser)]
#[command(name = "jpy-acb", version)]
struct Args {
    /// JSON run configuration (exchanges, hard forks, kind labels).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the annotated ledger.
    #[arg(short, long, default_value = "annotated_ledger.csv")]
    output: PathBuf,

    /// Resolve every fair-value lookup before replaying.
    #[arg(long)]
    prefetch: bool,

    /// Normalized ledger CSVs (market,type,price,cost,amount,time,exchange).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => Config::default(),
    };

    let labels = cfg.kind_labels();
    let mut rows = Vec::new();
    for input in &args.inputs {
        if !input.exists() {
            bail!("CSV not found: {}", input.display());
        }
        let loaded = ledger::load_csv(input, &labels, cfg.input_offset())
            .with_context(|| format!("reading {}", input.display()))?;
        info!(path = %input.display(), rows = loaded.len(), "loaded ledger");
        rows.extend(loaded);
    }
    let trades = TradeLedger::build(rows);
    info!(rows = trades.len(), "ledger built");

    let outcome = if args.prefetch {
        let queries = fair_value_queries(&trades);
        info!(queries = queries.len(), "prefetching fair values");
        let table = PrefetchedOracle::prefetch(queries, &mut cfg.oracle())
            .context("prefetching fair values")?;
        CostBasisEngine::new(table, cfg.engine_settings()).replay(trades)?
    } else {
        CostBasisEngine::new(cfg.oracle(), cfg.engine_settings()).replay(trades)?
    };

    let out_file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    ledger::write_annotated(&outcome.ledger, out_file)?;

    println!("\n=== JPY PROFIT SUMMARY (WEIGHTED AVERAGE COST) ===");
    for year in &outcome.years {
        println!("\n{year}");
    }
    println!(
        "\nTotal realized profit (JPY): {}",
        q2(outcome.state.total_profit())
    );
    println!("\nWrote annotated ledger: {}", args.output.display());
    Ok(())
}
