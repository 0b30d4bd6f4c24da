/// Custody Ledger — Script Runner
///
/// Deploys a ledger, replays a JSON call script against it, and prints
/// the resulting counters and canonical state hash.
///
/// ```bash
/// custody-ledger calls.json
/// custody-ledger calls.json --config policy.json --strict
/// ```

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use custody_ledger::domain::LedgerConfig;
use custody_ledger::hashing::canonical_hash;
use custody_ledger::script::{run_script, CallOutcome, CallScript};

/// Custody ledger script runner
#[derive(Parser, Debug)]
#[command(name = "custody-ledger")]
#[command(about = "Replay a call script against a fresh custody ledger")]
#[command(version)]
struct Args {
    /// Path to the call script (JSON)
    script: PathBuf,

    /// Ledger policy (JSON), overrides the script's own config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Exit with status 1 if any call is rejected
    #[arg(long)]
    strict: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let script = CallScript::from_json(&fs::read_to_string(&args.script)?)?;
    let config = match &args.config {
        Some(path) => Some(serde_json::from_str::<LedgerConfig>(&fs::read_to_string(path)?)?),
        None => None,
    };

    tracing::info!("Running {} calls from {}", script.calls.len(), args.script.display());

    let report = run_script(&script, config);

    for (i, (call, outcome)) in script.calls.iter().zip(&report.outcomes).enumerate() {
        match outcome {
            CallOutcome::Accepted { sequence } => {
                println!("[{}] {} accepted (sequence {})", i, call.entry_point, sequence)
            }
            CallOutcome::Returned(values) => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                println!("[{}] {} -> [{}]", i, call.entry_point, rendered.join(", "))
            }
            CallOutcome::Rejected(err) => {
                println!("[{}] {} REJECTED: {}", i, call.entry_point, err)
            }
        }
    }

    let ledger = &report.ledger;
    println!("\n===========================================");
    println!("device_count: {}", ledger.device_count());
    println!("cycle_count:  {}", ledger.cycle_count());
    for (user, count) in &ledger.state().user_cycle_count {
        println!("  {} -> {}", user, count);
    }
    println!("state hash:   {}", canonical_hash(ledger.state()));

    let rejected = report.rejected();
    if rejected > 0 {
        println!("{} call(s) rejected", rejected);
        if args.strict {
            std::process::exit(1);
        }
    }

    Ok(())
}
