mod allocate;
mod cli;
mod infra;
mod routes;
mod server;

use donation_matcher::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
