use crate::allocate::{run_allocate, AllocateArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use donation_matcher::error::AppError;
use donation_matcher::workflows::donations::SelectionStrategy;

#[derive(Parser, Debug)]
#[command(
    name = "Donation Matcher",
    about = "Match donations to open aid requests and text donors where to send funds",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run one donation through the allocation engine against a local ledger
    Allocate(AllocateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured selection strategy
    #[arg(long, value_parser = parse_strategy)]
    pub(crate) strategy: Option<SelectionStrategy>,
    /// Seed the selection RNG for reproducible matching
    #[arg(long)]
    pub(crate) seed: Option<u64>,
}

pub(crate) fn parse_strategy(raw: &str) -> Result<SelectionStrategy, String> {
    raw.parse::<SelectionStrategy>()
        .map_err(|err| err.to_string())
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Allocate(args) => run_allocate(args).await,
    }
}
