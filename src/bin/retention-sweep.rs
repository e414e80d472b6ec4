/// Run the retention sweep once, for external schedulers.
/// Example cron entry: 0 2 * * * /app/retention-sweep
///
/// Usage: retention-sweep [--days N] [--dry-run]

use clap::Parser;
use mybus_api::{
    db,
    services::retention::RetentionSweep,
    store::{DataSource, PgStore},
};

#[derive(Parser)]
#[command(name = "retention-sweep", about = "Delete expired notifications and sent push queue items")]
struct Args {
    /// Retention window in days (defaults to RETENTION_DAYS, then 30)
    #[arg(long)]
    days: Option<i64>,

    /// Only count what would be deleted
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let days = match args.days {
        Some(d) => d,
        None => std::env::var("RETENTION_DAYS")
            .unwrap_or_else(|_| "30".into())
            .parse()?,
    };
    if days < 1 {
        anyhow::bail!("--days must be at least 1");
    }

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;
    let pool = db::create_pool(&database_url).await?;
    let store = PgStore::new(pool);

    if args.dry_run {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
        let notifications = store.expired_notification_ids(cutoff, usize::MAX).await?;
        let queue_items = store.expired_push_item_ids(cutoff, usize::MAX).await?;
        tracing::info!(
            "Dry run (cutoff {}): {} notifications and {} queue items would be deleted",
            cutoff,
            notifications.len(),
            queue_items.len()
        );
        return Ok(());
    }

    tracing::info!("Starting retention sweep ({} days)...", days);
    let report = RetentionSweep::run(&store, days).await;
    if let Some(error) = report.error {
        anyhow::bail!("retention sweep stopped early: {error}");
    }
    tracing::info!("Retention sweep completed");
    Ok(())
}
