//! Vitals CLI entry point.
//!
//! ## CLI Subcommands
//!
//! - `vitals-cli scrape` - Run one cycle and print exposition text
//! - `vitals-cli health` - Run one cycle and print the health summary (exit 0/1)
//! - `vitals-cli config show|defaults|validate` - Inspect configuration

use std::process::ExitCode;

use vitals_core::cli::{config_cmd, run_health, run_scrape};
use vitals_core::config;
use vitals_core::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "scrape" => {
            init_cli_logging();
            let code = run_scrape().await;
            ExitCode::from(code as u8)
        }
        "health" => {
            init_cli_logging();
            let pretty = args.iter().skip(2).any(|a| a == "--pretty");
            let code = run_health(pretty).await;
            ExitCode::from(code as u8)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => {
                    let code = config_cmd::run_validate();
                    ExitCode::from(code as u8)
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("vitals {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_cli_logging() {
    let log_config = config::load().logging;
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Logging disabled: {}", e);
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "vitals - telemetry aggregation runtime v{}

USAGE:
    vitals-cli [COMMAND] [OPTIONS]

COMMANDS:
    scrape       Run one collection cycle and print exposition text
    health       Run one collection cycle and print the health summary
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    vitals-cli scrape
    vitals-cli health --pretty
    vitals-cli config validate

ENVIRONMENT:
    VITALS_COLLECTION_DEADLINE_MS  Shared collection deadline (default: 30000)
    VITALS_LOG_FORMAT              json or pretty (default: json)
    VITALS_LOG_LEVEL               Log filter directive (default: info)
    See `vitals-cli config defaults` for the full list.

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    2  Output error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "scrape" => {
            eprintln!(
                "vitals-cli scrape - Print exposition text

USAGE:
    vitals-cli scrape

DESCRIPTION:
    Runs every enabled metric source once under the shared deadline and
    prints the rendered snapshot in exposition format to stdout.
"
            );
        }
        "health" => {
            eprintln!(
                "vitals-cli health - Health summary

USAGE:
    vitals-cli health [--pretty]

DESCRIPTION:
    Runs one collection cycle and prints the health summary as JSON.

EXIT CODES:
    0  Healthy
    1  Unhealthy, degraded or no data
"
            );
        }
        "config" => {
            eprintln!(
                "vitals-cli config - Inspect configuration

USAGE:
    vitals-cli config <SUBCOMMAND>

SUBCOMMANDS:
    show           Show effective configuration
    defaults       Show default configuration
    validate       Warn about suspicious combinations (exit 1 on warnings)
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'vitals-cli help' for general usage.",
                command
            );
        }
    }
}
