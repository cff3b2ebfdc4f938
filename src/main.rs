use std::process::ExitCode;

use clap::Parser;
use lfsck_gather::cmd::{gather_command::GatherCommands, handler::handle_gather_command};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lfsck-gather")]
#[command(version, about = "Gather lfsck cross-reference tables from a Lustre target", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: GatherCommands,

    /// Log per-record detail
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();

    match handle_gather_command(cli.command) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
