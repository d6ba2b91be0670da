use parking_buddy::{
    config,
    core::{
        jobs::{self, LogNotifier},
        lot::{self, NewLot},
        user,
    },
    errors::Result,
};
use dotenvy::dotenv;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    let report_interval = config::scheduler::report_interval()?;

    // 3. Connect and make sure the schema exists
    let db = config::database::create_connection()
        .await
        .inspect(|_| info!("Database connection established."))
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    config::database::create_tables(&db).await?;

    // 4. Bootstrap the admin account
    match config::users::admin_account_from_env() {
        Some(account) => {
            let admin = user::ensure_admin(&db, account).await?;
            info!("Admin account: {}", admin.username);
        }
        None => warn!("Admin environment variables not set; no admin account bootstrapped"),
    }

    // 5. Seed lots from config.toml, if present
    if Path::new(CONFIG_PATH).exists() {
        let lot_config = config::lots::load_default_config()
            .inspect_err(|e| error!("Failed to load {}: {}", CONFIG_PATH, e))?;
        let lots: Vec<NewLot> = lot_config.lots.into_iter().map(Into::into).collect();
        lot::seed_lots(&db, lots).await?;
    } else {
        info!("No {} found; skipping lot seeding.", CONFIG_PATH);
    }

    // 6. Start background jobs
    let (queue, receiver) = jobs::channel(jobs::JOB_QUEUE_CAPACITY);
    let worker = tokio::spawn(jobs::run_worker(db.clone(), receiver, LogNotifier));
    let scheduler = tokio::spawn(jobs::run_scheduler(queue, report_interval));

    info!("ParkingBuddy running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested.");

    // Dropping the scheduler drops the last queue handle, which lets the worker drain and exit.
    scheduler.abort();
    if let Err(e) = worker.await {
        error!("Job worker ended abnormally: {}", e);
    }

    db.close().await?;
    Ok(())
}
