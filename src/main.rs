use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use calc_agent::{
    EquationStore, Evaluator, LatencyTable, MemoryStore, Op, UnitPool, normalize, validate,
};
use clap::Parser;
use clap::Subcommand;
use miette::IntoDiagnostic;
use miette::WrapErr;
use rayon::prelude::*;

#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the canonical form of an expression.
    Normalize { expression: String },
    /// Check an expression and report what is wrong with it.
    Validate { expression: String },
    /// Evaluate one expression and print the result.
    Eval {
        expression: String,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Evaluate a file of expressions, one per line, concurrently.
    Batch {
        filename: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Debug, clap::Args)]
struct EngineArgs {
    /// Compute units available; every operator application needs one, so
    /// nothing completes with zero units.
    #[arg(long, default_value_t = 2)]
    units: usize,
    /// Latency charged per `+` application, in milliseconds.
    #[arg(long, default_value_t = LatencyTable::DEFAULT_MS)]
    plus_ms: u64,
    /// Latency charged per `-` application, in milliseconds.
    #[arg(long, default_value_t = LatencyTable::DEFAULT_MS)]
    minus_ms: u64,
    /// Latency charged per `*` application, in milliseconds.
    #[arg(long, default_value_t = LatencyTable::DEFAULT_MS)]
    times_ms: u64,
    /// Latency charged per `/` application, in milliseconds.
    #[arg(long, default_value_t = LatencyTable::DEFAULT_MS)]
    divide_ms: u64,
}

impl EngineArgs {
    fn latencies(&self) -> LatencyTable {
        let table = LatencyTable::default();
        table.set(Op::Plus, Duration::from_millis(self.plus_ms));
        table.set(Op::Minus, Duration::from_millis(self.minus_ms));
        table.set(Op::Star, Duration::from_millis(self.times_ms));
        table.set(Op::Slash, Duration::from_millis(self.divide_ms));
        table
    }
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Normalize { expression } => {
            println!("{}", normalize(&expression));
        }
        Commands::Validate { expression } => {
            if let Err(e) = validate(&expression) {
                eprintln!("{e:?}");
                std::process::exit(65);
            }
            println!("ok");
        }
        Commands::Eval { expression, engine } => {
            if let Err(e) = validate(&expression) {
                eprintln!("{e:?}");
                std::process::exit(65);
            }
            let store = Arc::new(MemoryStore::new());
            let calc = Evaluator::new(
                store.clone(),
                Arc::new(UnitPool::new(engine.units)),
                Arc::new(engine.latencies()),
            );
            let id = store.insert(&expression);
            let value = calc.evaluate(id)?;
            println!("{value}");
        }
        Commands::Batch { filename, engine } => {
            let contents = fs::read_to_string(&filename)
                .into_diagnostic()
                .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;

            let store = Arc::new(MemoryStore::new());
            let calc = Evaluator::new(
                store.clone(),
                Arc::new(UnitPool::new(engine.units)),
                Arc::new(engine.latencies()),
            );

            let mut rejected = 0usize;
            let ids: Vec<_> = contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .filter_map(|line| match validate(line) {
                    Ok(()) => Some(store.insert(line)),
                    Err(e) => {
                        eprintln!("{e:?}");
                        rejected += 1;
                        None
                    }
                })
                .collect();

            // Terminal statuses land in the store; failures are part of
            // the listing rather than early exits.
            ids.par_iter().for_each(|&id| {
                let _ = calc.evaluate(id);
            });

            for equation in store.list() {
                println!("#{} {} -> {}", equation.id, equation.text, equation.status);
            }
            if rejected > 0 {
                std::process::exit(65);
            }
        }
    }
    Ok(())
}
