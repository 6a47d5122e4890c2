//! CLI argument parsing for jarmap
//!
//! Defines the Command enum and parse_args() function for all CLI commands.

use anyhow::{bail, Result};
use std::path::PathBuf;

use jarmap::client::default_base_url;
use jarmap::service::{DEFAULT_HOST, DEFAULT_PORT};

pub fn print_usage() {
    eprintln!("jarmap - Call-graph extraction and incremental indexing for JVM bytecode");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  jarmap <command> [arguments]");
    eprintln!("  jarmap --help");
    eprintln!();
    eprintln!("  jarmap serve [--host <ADDR>] [--port <N>]");
    eprintln!("  jarmap run --db <FILE> --packages <FILE> [--init] [--analyzer <URL>] [--domains <P1,P2>] [--limit <N>]");
    eprintln!("  jarmap status --db <FILE>");
    eprintln!("  jarmap shutdown [--analyzer <URL>]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  serve           Run the analysis service on the loopback interface");
    eprintln!("  run             Index and analyze all packages from a manifest");
    eprintln!("  status          Show row counts and per-package metadata");
    eprintln!("  shutdown        Ask a running analysis service to exit");
    eprintln!();
    eprintln!("Serve arguments:");
    eprintln!("  --host <ADDR>       Listen address (default: {})", DEFAULT_HOST);
    eprintln!("  --port <N>          Listen port (default: {})", DEFAULT_PORT);
    eprintln!();
    eprintln!("Run arguments:");
    eprintln!("  --db <FILE>         Path to the SQLite fact base");
    eprintln!("  --packages <FILE>   JSON manifest of package specs");
    eprintln!("  --init              Drop and recreate all tables before the run");
    eprintln!(
        "  --analyzer <URL>    Analysis service base URL (default: {})",
        default_base_url()
    );
    eprintln!("  --domains <P1,P2>   Comma-separated FQN prefixes to analyze; empty keeps all");
    eprintln!("  --limit <N>         Max classes per package (test runs; requires --init)");
    eprintln!();
    eprintln!("Status arguments:");
    eprintln!("  --db <FILE>         Path to the SQLite fact base");
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Serve {
        host: String,
        port: u16,
    },
    Run {
        db_path: PathBuf,
        manifest: PathBuf,
        init: bool,
        analyzer_url: String,
        domains: Vec<String>,
        limit: Option<usize>,
    },
    Status {
        db_path: PathBuf,
    },
    Shutdown {
        analyzer_url: String,
    },
    Version,
}

/// Parse command-line arguments (without the program name).
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        bail!("no command given");
    };

    match command.as_str() {
        "--version" | "-V" | "version" => Ok(Command::Version),
        "serve" => parse_serve(&args[1..]),
        "run" => parse_run(&args[1..]),
        "status" => parse_status(&args[1..]),
        "shutdown" => parse_shutdown(&args[1..]),
        other => bail!("unknown command: {}", other),
    }
}

fn parse_serve(args: &[String]) -> Result<Command> {
    let mut host = DEFAULT_HOST.to_string();
    let mut port = DEFAULT_PORT;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--host" => host = required_value(&mut iter, "--host")?,
            "--port" => {
                let value = required_value(&mut iter, "--port")?;
                port = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid --port value: {}", value))?;
            }
            other => bail!("unknown serve argument: {}", other),
        }
    }
    Ok(Command::Serve { host, port })
}

fn parse_run(args: &[String]) -> Result<Command> {
    let mut db_path: Option<PathBuf> = None;
    let mut manifest: Option<PathBuf> = None;
    let mut init = false;
    let mut analyzer_url = default_base_url();
    let mut domains: Vec<String> = Vec::new();
    let mut limit: Option<usize> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--db" => db_path = Some(PathBuf::from(required_value(&mut iter, "--db")?)),
            "--packages" => {
                manifest = Some(PathBuf::from(required_value(&mut iter, "--packages")?))
            }
            "--init" => init = true,
            "--analyzer" => analyzer_url = required_value(&mut iter, "--analyzer")?,
            "--domains" => {
                let value = required_value(&mut iter, "--domains")?;
                domains = value
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "--limit" => {
                let value = required_value(&mut iter, "--limit")?;
                limit = Some(
                    value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("invalid --limit value: {}", value))?,
                );
            }
            other => bail!("unknown run argument: {}", other),
        }
    }

    let Some(db_path) = db_path else {
        bail!("run requires --db <FILE>");
    };
    let Some(manifest) = manifest else {
        bail!("run requires --packages <FILE>");
    };

    Ok(Command::Run {
        db_path,
        manifest,
        init,
        analyzer_url,
        domains,
        limit,
    })
}

fn parse_status(args: &[String]) -> Result<Command> {
    let mut db_path: Option<PathBuf> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--db" => db_path = Some(PathBuf::from(required_value(&mut iter, "--db")?)),
            other => bail!("unknown status argument: {}", other),
        }
    }
    let Some(db_path) = db_path else {
        bail!("status requires --db <FILE>");
    };
    Ok(Command::Status { db_path })
}

fn parse_shutdown(args: &[String]) -> Result<Command> {
    let mut analyzer_url = default_base_url();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--analyzer" => analyzer_url = required_value(&mut iter, "--analyzer")?,
            other => bail!("unknown shutdown argument: {}", other),
        }
    }
    Ok(Command::Shutdown { analyzer_url })
}

fn required_value(iter: &mut std::slice::Iter<'_, String>, flag: &str) -> Result<String> {
    match iter.next() {
        Some(value) => Ok(value.clone()),
        None => bail!("{} requires a value", flag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cmd = parse_args(&args(&["serve"])).unwrap();
        assert_eq!(
            cmd,
            Command::Serve {
                host: "127.0.0.1".to_string(),
                port: 7421,
            }
        );
    }

    #[test]
    fn test_parse_run_full() {
        let cmd = parse_args(&args(&[
            "run",
            "--db",
            "facts.db",
            "--packages",
            "packages.json",
            "--init",
            "--domains",
            "com.axelor,com.ex",
            "--limit",
            "50",
        ]))
        .unwrap();
        match cmd {
            Command::Run {
                db_path,
                manifest,
                init,
                domains,
                limit,
                ..
            } => {
                assert_eq!(db_path, PathBuf::from("facts.db"));
                assert_eq!(manifest, PathBuf::from("packages.json"));
                assert!(init);
                assert_eq!(domains, vec!["com.axelor", "com.ex"]);
                assert_eq!(limit, Some(50));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_run_requires_db_and_manifest() {
        assert!(parse_args(&args(&["run", "--db", "facts.db"])).is_err());
        assert!(parse_args(&args(&["run", "--packages", "p.json"])).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        assert!(parse_args(&args(&["frobnicate"])).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_flag_value() {
        assert!(parse_args(&args(&["status", "--db"])).is_err());
    }
}
