use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mybus_api::{
    build_router,
    config::{Config, DataSourceKind},
    db,
    services::{
        email::{DryRunMail, MailTransport, SmtpMailer},
        metrics,
        push::{DryRunPush, FcmPushProvider, PushProvider},
        retention::RetentionSweep,
        users::UserService,
    },
    store::{DataSource, FixtureStore, PgStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn DataSource> = match (config.data_source, config.database_url.as_deref()) {
        (DataSourceKind::Remote, Some(url)) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            info!("Database connected and migrations applied");
            Arc::new(PgStore::new(pool))
        }
        (DataSourceKind::Remote, None) => anyhow::bail!("DATABASE_URL is required for DATA_SOURCE=remote"),
        (DataSourceKind::Fixture, _) => {
            warn!("Using the in-memory fixture store; data is lost on restart");
            Arc::new(FixtureStore::seeded().await)
        }
    };

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        UserService::ensure_admin(store.as_ref(), email, password).await?;
    }

    let push: Arc<dyn PushProvider> = match (&config.fcm_project_id, &config.fcm_access_token) {
        (Some(project), Some(token)) => {
            info!("FCM configured for project {project}");
            Arc::new(FcmPushProvider::new(project, token.clone()))
        }
        _ => {
            info!("FCM not configured, pushes are logged and dropped");
            Arc::new(DryRunPush::new())
        }
    };

    let mailer: Arc<dyn MailTransport> = match SmtpMailer::new(&config) {
        Some(smtp) => {
            info!("SMTP email service configured");
            Arc::new(smtp)
        }
        None => {
            info!("SMTP not configured, queued email is logged and dropped");
            Arc::new(DryRunMail::new())
        }
    };

    RetentionSweep::start(store.clone(), config.retention_days, config.sweep_interval_hours);
    metrics::start(store.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::start(config, store, push, mailer).await;
    let app = build_router(state);

    info!("MyBus admin API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
