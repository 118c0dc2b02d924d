use clap::Parser;

use tiercache::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match cli::load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::init_logger_from_settings(&settings, &cli) {
        eprintln!("Logger initialization error: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = cli::execute_command(cli.command(), settings).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
