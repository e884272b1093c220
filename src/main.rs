use dotenvy::dotenv;
use std::path::Path;
use stokvel_ledger::{
    config::{database, settings},
    core::{group, seed},
    errors::Result,
};
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

    // 3. Connect and create the schema
    if std::env::var("DATABASE_URL").is_err() {
        std::fs::create_dir_all("data")?;
    }
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database schema ready."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 4. Seed groups and admins
    if Path::new(CONFIG_PATH).exists() {
        let config = settings::load_config(CONFIG_PATH)?;
        seed::seed_from_config(&db, &config)
            .await
            .inspect_err(|e| error!("Failed to seed from {}: {}", CONFIG_PATH, e))?;
    } else {
        warn!("{} not found, skipping seeding.", CONFIG_PATH);
    }

    // 5. Report where every group stands
    for g in group::get_all_groups(&db).await? {
        let summary = group::group_savings_summary(&db, g.id).await?;
        info!(
            group = %summary.group.name,
            members = summary.member_count,
            saved = summary.total_saved,
            target = summary.group_target,
            "{:.1}% of group target",
            summary.progress_percent
        );
    }

    Ok(())
}
