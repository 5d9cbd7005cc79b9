// graceful-drain
// Command line entry point

mod cli;

use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    if let Err(e) = cli::commands::execute(cli.command).await {
        cli::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
