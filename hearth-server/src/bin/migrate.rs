//! Migration Command-Line Tool
//!
//! Usage:
//!   cargo run -p hearth-server --bin migrate -- status    list migrations and their state
//!   cargo run -p hearth-server --bin migrate -- run       apply pending migrations
//!   cargo run -p hearth-server --bin migrate -- renew     wipe and rebuild (development only)
//!   cargo run -p hearth-server --bin migrate -- history   print the history table as JSON lines

use std::process::ExitCode;
use std::sync::Arc;

use hearth_migrate::{MigrationConfig, MigrationRunner, RunReport};
use hearth_pg::{DbConfig, PgDatabase};
use hearth_server::init_tracing;

fn print_report(report: &RunReport) {
    for result in &report.outcomes {
        println!("{:>6} {:<32} {:?}", result.version, result.name, result.outcome);
    }
    println!(
        "executed={} success={}{}",
        report.executed,
        report.success,
        report
            .error
            .as_ref()
            .map(|e| format!(" error={}", e))
            .unwrap_or_default()
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("{}", e);
    }

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());
    let db = match PgDatabase::from_config(&DbConfig::from_env()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("Failed to configure database: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let runner = MigrationRunner::new(db, MigrationConfig::from_env());

    match command.as_str() {
        "status" => match runner.status().await {
            Ok(statuses) => {
                for status in statuses {
                    println!("{:>6} {:<32} {:?}", status.version, status.name, status.state);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to read migration status: {}", e);
                ExitCode::FAILURE
            }
        },
        "run" => {
            let report = runner.run_pending().await;
            print_report(&report);
            if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        "renew" => match runner.renew_database().await {
            Ok(report) => {
                print_report(&report);
                if report.success {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                eprintln!("Renew refused: {}", e);
                ExitCode::FAILURE
            }
        },
        "history" => match runner.history().await {
            Ok(records) => {
                for record in records {
                    match serde_json::to_string(&record) {
                        Ok(line) => println!("{}", line),
                        Err(e) => eprintln!("Failed to encode record {}: {}", record.version, e),
                    }
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to read migration history: {}", e);
                ExitCode::FAILURE
            }
        },
        other => {
            eprintln!("Unknown command '{}'. Expected status, run, renew or history.", other);
            ExitCode::FAILURE
        }
    }
}
