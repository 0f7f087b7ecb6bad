use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;

use csim_core::{CandleSeries, Pattern, Side, SimConfig};
use csim_detect::{detect_patterns, SyntheticSeries};
use csim_engine::{EventKind, GamePhase, GameState, Stats};

#[derive(Parser, Debug)]
#[command(name = "csim", about = "Pattern detection and candle-replay simulator")]
struct Cli {
    /// Path to CSV candle data file
    #[arg(long, conflicts_with = "synthetic")]
    candles: Option<PathBuf>,

    /// Generate a synthetic series of this many candles instead
    #[arg(long)]
    synthetic: Option<usize>,

    /// Random seed for synthetic data
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Path to TOML config file(s), comma-separated for merge
    #[arg(long, default_value = "config/default.toml")]
    config: String,

    /// How many patterns to detect
    #[arg(long, default_value = "5")]
    patterns: usize,

    /// Initial balance (overrides config)
    #[arg(long)]
    initial_balance: Option<f64>,

    /// Quantity traded per detected pattern
    #[arg(long, default_value = "1.0")]
    quantity: f64,

    /// Output file path (stdout if not specified)
    #[arg(long)]
    output_file: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct OutputReport {
    meta: OutputMeta,
    patterns: Vec<PatternReport>,
    replay: ReplayReport,
}

#[derive(Debug, Serialize)]
struct OutputMeta {
    candle_source: String,
    total_candles: usize,
    patterns_detected: usize,
    elapsed_ms: u128,
}

#[derive(Debug, Serialize)]
struct PatternReport {
    kind: String,
    start_index: usize,
    end_index: usize,
    expected_entry: f64,
    expected_exit: f64,
    stop_loss: f64,
    quality: u8,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    initial_balance: f64,
    final_balance: f64,
    final_equity: f64,
    realized_pnl: f64,
    orders_placed: usize,
    orders_unfilled: usize,
    stats: Stats,
}

fn main() {
    let cli = Cli::parse();
    let start = Instant::now();

    // Load config
    let config_paths: Vec<PathBuf> = cli.config.split(',').map(PathBuf::from).collect();
    let config_refs: Vec<&std::path::Path> = config_paths.iter().map(|p| p.as_path()).collect();
    let config = match SimConfig::from_toml_files(&config_refs) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    // Load or generate candles
    let load_start = Instant::now();
    let (series, source) = match (&cli.candles, cli.synthetic) {
        (Some(path), _) => {
            eprintln!("Loading candles from {:?}...", path);
            match CandleSeries::from_csv(path) {
                Ok(s) => (s, path.display().to_string()),
                Err(e) => {
                    eprintln!("Error loading candles: {}", e);
                    std::process::exit(1);
                }
            }
        }
        (None, Some(n)) => {
            eprintln!("Generating {} synthetic candles (seed {})...", n, cli.seed);
            let series = SyntheticSeries::new(cli.seed)
                .random_walk(n, 100.0, 0.4)
                .build();
            (series, format!("synthetic:{}:{}", n, cli.seed))
        }
        (None, None) => {
            eprintln!("Either --candles or --synthetic is required");
            std::process::exit(1);
        }
    };
    eprintln!(
        "Loaded {} candles in {:.1}ms",
        series.len(),
        load_start.elapsed().as_secs_f64() * 1000.0
    );

    // Detect patterns
    let detect_start = Instant::now();
    let patterns = detect_patterns(&series, cli.patterns, &config.detection);
    eprintln!(
        "Detected {} patterns in {:.1}ms",
        patterns.len(),
        detect_start.elapsed().as_secs_f64() * 1000.0
    );

    // Replay, trading each detected pattern as its setup approaches
    let initial_balance = cli.initial_balance.unwrap_or(config.paper.initial_balance);
    let replay_start = Instant::now();
    let replay = match run_replay(&series, &patterns, initial_balance, cli.quantity) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Replay failed: {}", e);
            std::process::exit(1);
        }
    };
    eprintln!(
        "Replay complete in {:.1}ms",
        replay_start.elapsed().as_secs_f64() * 1000.0
    );

    // Build output
    let elapsed = start.elapsed();
    let report = OutputReport {
        meta: OutputMeta {
            candle_source: source,
            total_candles: series.len(),
            patterns_detected: patterns.len(),
            elapsed_ms: elapsed.as_millis(),
        },
        patterns: patterns
            .iter()
            .map(|p| PatternReport {
                kind: p.kind.label().to_string(),
                start_index: p.start_index,
                end_index: p.end_index,
                expected_entry: p.expected_entry,
                expected_exit: p.expected_exit,
                stop_loss: p.stop_loss,
                quality: p.quality,
            })
            .collect(),
        replay,
    };

    print_summary(&report);

    let json = serde_json::to_string_pretty(&report).expect("JSON serialization failed");
    if let Some(output_path) = &cli.output_file {
        std::fs::write(output_path, &json).expect("Failed to write output file");
        eprintln!("Results written to {:?}", output_path);
    } else {
        println!("{}", json);
    }

    eprintln!("\nTotal elapsed: {:.1}ms", elapsed.as_secs_f64() * 1000.0);
}

/// Advance through the whole series, placing a buy-stop at each pattern's
/// expected entry (with its projected stop and exit) once the engine hints
/// the pattern is forming.
fn run_replay(
    series: &CandleSeries,
    patterns: &[Pattern],
    initial_balance: f64,
    quantity: f64,
) -> csim_core::Result<ReplayReport> {
    let series = Arc::new(series.clone());
    let mut game = GameState::new(series, initial_balance, patterns.to_vec())?;

    let mut orders_placed = 0usize;
    let mut hints_seen = 0usize;
    while game.phase() == GamePhase::Active {
        let hints_now = game
            .events()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Hint))
            .count();
        while hints_seen < hints_now {
            // Hints arrive in pattern order; place one order per hint.
            if let Some(pattern) = patterns.get(orders_placed) {
                match game.place_pending_order(
                    Side::Long,
                    pattern.expected_entry,
                    quantity,
                    Some(pattern.stop_loss),
                    Some(pattern.expected_exit),
                    None,
                ) {
                    Ok(order) => {
                        eprintln!(
                            "  [{}] {} order at {:.4} (sl {:.4}, tp {:.4})",
                            game.current_index(),
                            pattern.kind.label(),
                            order.target_price,
                            pattern.stop_loss,
                            pattern.expected_exit
                        );
                        orders_placed += 1;
                    }
                    Err(e) => {
                        eprintln!("  order for {} skipped: {}", pattern.kind.label(), e);
                    }
                }
            }
            hints_seen += 1;
        }
        game.advance_candle()?;
    }

    Ok(ReplayReport {
        initial_balance,
        final_balance: game.account.balance,
        final_equity: game.account.equity,
        realized_pnl: game.account.realized_pnl,
        orders_placed,
        orders_unfilled: game.pending_orders.len(),
        stats: game.stats.clone(),
    })
}

fn print_summary(report: &OutputReport) {
    eprintln!("\n{}", "=".repeat(80));
    eprintln!("Candle Replay Simulation Results");
    eprintln!("{}", "=".repeat(80));
    eprintln!(
        "Candles: {} | Patterns: {} | Elapsed: {}ms",
        report.meta.total_candles, report.meta.patterns_detected, report.meta.elapsed_ms
    );
    eprintln!("{}", "-".repeat(80));
    eprintln!(
        "{:<16} {:>8} {:>8} {:>12} {:>12} {:>12} {:>8}",
        "Pattern", "Start", "End", "Entry", "Exit", "Stop", "Quality"
    );
    eprintln!("{}", "-".repeat(80));
    for p in &report.patterns {
        eprintln!(
            "{:<16} {:>8} {:>8} {:>12.4} {:>12.4} {:>12.4} {:>8}",
            p.kind, p.start_index, p.end_index, p.expected_entry, p.expected_exit, p.stop_loss,
            p.quality
        );
    }
    eprintln!("{}", "-".repeat(80));
    let s = &report.replay.stats;
    eprintln!(
        "Trades: {} | WinRate: {:.1}% | PF: {:.2} | Sharpe: {:.2} | MaxDD: {:.2}%",
        s.total_trades, s.win_rate, s.profit_factor, s.sharpe_ratio, s.max_drawdown_pct
    );
    eprintln!(
        "Balance: {:.2} -> {:.2} (equity {:.2}, realized {:+.2})",
        report.replay.initial_balance,
        report.replay.final_balance,
        report.replay.final_equity,
        report.replay.realized_pnl
    );
    eprintln!("{}", "=".repeat(80));
}
