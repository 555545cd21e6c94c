mod cli;
mod infra;
mod query;
mod routes;
mod server;

use property_query::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
