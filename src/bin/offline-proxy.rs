use std::process::ExitCode;

use clap::Parser;
use offline_proxy::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 0 = warn, 1 = info, 2+ = debug; RUST_LOG still wins
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(format!("offline_proxy={level}")),
    )
    .init();

    match offline_proxy::cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
