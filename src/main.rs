//! TripBot - freight dispatch helper for Telegram groups.

use clap::Parser;
use std::process::ExitCode;

use tripbot::cli::Commands;
use tripbot::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Commands::parse();

    let _guard = match logging::init(args.json_logs) {
        Ok((guard, _)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
