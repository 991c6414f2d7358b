//! Event Query Search CLI - Run searches from a JSON run file.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use event_query_search::{compute::run_all, schema::RunSpec};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <run.json>", args[0]);
        eprintln!();
        eprintln!("Search for event queries that track each reference series in a run file.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  run.json  Path to run specification (config, corpus, data sets)");
        eprintln!();
        eprintln!("Example run file is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_run();
        return;
    }

    let run_path = PathBuf::from(&args[1]);

    let run_str = fs::read_to_string(&run_path).unwrap_or_else(|e| {
        eprintln!("Error reading run file: {}", e);
        std::process::exit(1);
    });

    let spec: RunSpec = serde_json::from_str(&run_str).unwrap_or_else(|e| {
        eprintln!("Error parsing run file: {}", e);
        std::process::exit(1);
    });

    println!("Event Query Search");
    println!("==================");
    println!("Corpus: {}", spec.corpus.display());
    println!("Data sets: {}", spec.datasets.len());
    println!(
        "Population: {} ({} survivors, {} generations)",
        spec.config.population.size,
        spec.config.population.survivors,
        spec.config.population.generations
    );
    println!("Score method: {:?}", spec.config.score_method);
    println!("Output: {}", spec.output_dir.display());
    println!();

    let start = Instant::now();
    let outcomes = run_all(&spec).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let mut failures = 0;
    for (name, result) in &outcomes {
        match result {
            Ok(outcome) => {
                println!(
                    "{}: best {} after {} candidates ({} improvements, stopped: {:?})",
                    name,
                    outcome.best_score,
                    outcome.iterations,
                    outcome.improvements,
                    outcome.stop_reason
                );
                if !outcome.best_summary.is_empty() {
                    println!("{}", outcome.best_summary);
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: failed: {}", name, e);
            }
        }
    }

    println!();
    println!("Time: {:.2}s", start.elapsed().as_secs_f32());

    if failures > 0 {
        std::process::exit(1);
    }
}

fn print_example_run() {
    let spec = RunSpec::default();
    match serde_json::to_string_pretty(&spec) {
        Ok(json) => {
            println!("Example run file (run.json):");
            println!("{}", json);
        }
        Err(e) => {
            eprintln!("Error serializing example: {}", e);
            std::process::exit(1);
        }
    }
}
