//! Agency node binary.

use clap::Parser;
use std::process::ExitCode;

use agency::Commands;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments; logging is set up per command
    let args = Commands::parse();

    // Run the command
    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
