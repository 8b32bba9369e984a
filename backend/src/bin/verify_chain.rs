//! Operational CLI: verify the audit hash chain from a terminal.
//!
//! Exits 0 when the chain is intact and 1 when a break is found, so it
//! can run from cron or a compliance runbook.

use backend::services::audit;
use clap::Parser;
use log::error;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser, Debug)]
#[command(name = "verify_chain", about = "Verify the audit-event hash chain")]
struct Args {
    /// Postgres connection string; falls back to the configured lending URL.
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    dotenv::dotenv().ok();
    let args = Args::parse();

    let url = match args.database_url {
        Some(url) => url,
        None => {
            let configuration = backend::configuration::get_configuration()?;
            configuration.database.lending_connection_string()
        }
    };

    let pool = PgPoolOptions::new().max_connections(1).connect(&url).await?;
    let result = audit::verify_chain(&pool).await.map_err(|e| {
        error!("Verification failed to run: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.status != "OK" {
        std::process::exit(1);
    }
    Ok(())
}
