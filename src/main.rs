//! jarmap CLI - call-graph extraction and incremental indexing for JVM bytecode
//!
//! Usage: jarmap <command> [arguments]

mod cli;
mod version;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use jarmap::client::AnalyzerClient;
use jarmap::orchestrator::{self, RunOptions, RunReport};
use jarmap::package::load_manifest;
use jarmap::service;
use jarmap::store::Store;

use cli::{parse_args, print_usage, Command};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        print_usage();
        return if args.is_empty() {
            ExitCode::from(1)
        } else {
            ExitCode::SUCCESS
        };
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            return ExitCode::from(1);
        }
    };

    match dispatch(command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn dispatch(command: Command) -> Result<ExitCode> {
    match command {
        Command::Version => {
            println!("{}", version::version());
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve { host, port } => {
            service::run(&host, port)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            db_path,
            manifest,
            init,
            analyzer_url,
            domains,
            limit,
        } => {
            let specs = load_manifest(&manifest)?;
            let options = RunOptions {
                init,
                analyzer_url,
                domains,
                limit,
            };
            let report = orchestrator::run(&db_path, &specs, &options)?;
            print_report(&report);
            if report.has_failures() {
                Ok(ExitCode::from(2))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::Status { db_path } => {
            run_status(&db_path)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Shutdown { analyzer_url } => {
            let client = AnalyzerClient::new(&analyzer_url)?;
            let response = client.shutdown()?;
            println!("{}", response.status);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_report(report: &RunReport) {
    println!("Run summary");
    println!(
        "  index phase:   {} symbols, {} collisions in {:.2}s",
        report.total_symbols(),
        report.total_collisions(),
        report.index_duration.as_secs_f64()
    );
    println!(
        "  analyze phase: {} nodes, {} edges in {:.2}s",
        report.total_nodes(),
        report.total_edges(),
        report.analyze_duration.as_secs_f64()
    );

    for package in &report.packages {
        if let Some(error) = &package.error {
            println!("  FAILED {}: {}", package.name, error);
        } else if package.skipped {
            println!("  skipped {} (unchanged)", package.name);
        } else {
            println!(
                "  {} - {} symbols, {} classes, {} nodes, {} edges, {} decode failures",
                package.name,
                package.symbols,
                package.classes,
                package.nodes,
                package.edges,
                package.decode_failures
            );
        }
    }
}

fn run_status(db_path: &Path) -> Result<()> {
    if !db_path.is_file() {
        anyhow::bail!("no database at {}", db_path.display());
    }
    let store = Store::open(db_path, false).context("failed to open store")?;
    let counts = store.counts()?;

    println!("Database: {}", db_path.display());
    println!("  symbols:  {}", counts.symbols);
    println!("  nodes:    {}", counts.nodes);
    println!("  edges:    {}", counts.edges);
    println!("  packages: {}", counts.packages);

    for (package, hash, indexed_at) in store.all_metadata()? {
        let short_hash = &hash[..hash.len().min(12)];
        println!("  {} {} indexed_at={}", package, short_hash, indexed_at);
    }
    Ok(())
}
