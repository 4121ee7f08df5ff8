use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use myplace_sinks::DEFAULT_CSV_PATH;
use myplace_sync::{run_once_from_env, SinkChoice};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "myplace-sync")]
#[command(about = "Export one day of MyPlace guest signups to CSV or Marketing Cloud")]
struct Cli {
    /// Signup day to export (YYYY-MM-DD). Defaults to yesterday, local time.
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write matching guests to a CSV file
    Csv {
        #[arg(long, default_value = DEFAULT_CSV_PATH)]
        output: PathBuf,
    },
    /// Upsert matching guests into a Marketing Cloud data extension
    Sfmc,
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let choice = match cli.command.unwrap_or(Commands::Csv {
        output: PathBuf::from(DEFAULT_CSV_PATH),
    }) {
        Commands::Csv { output } => SinkChoice::Csv { output },
        Commands::Sfmc => SinkChoice::Sfmc,
    };

    match run_once_from_env(choice, cli.date).await {
        Ok(summary) => {
            println!(
                "sync complete: run_id={} day={} fetched={} matched={} delivered={} sink={} destination={}",
                summary.run_id,
                summary.target_day,
                summary.fetched,
                summary.matched,
                summary.delivered,
                summary.sink,
                summary.destination
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("sync failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
