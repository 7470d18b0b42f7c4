use anyhow::Result;
use job_hive_common::AppConfig;
use job_hive_crawler::run_server;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real deployments use the process environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Load configuration from environment
    let config = AppConfig::from_env();

    run_server(config).await
}
