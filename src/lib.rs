pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use config::Config;
use middleware::auth::JwtSecret;
use services::dispatcher::Dispatcher;
use services::email::MailTransport;
use services::push::PushProvider;
use services::session::SessionRegistry;
use services::triggers::{spawn_worker, TriggerBus, TriggerHandler};
use store::DataSource;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DataSource>,
    pub dispatcher: Arc<Dispatcher>,
    pub triggers: TriggerBus,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    /// Wires the dispatcher around `store`, spawns the trigger worker and
    /// hands it every queue item still waiting in the store.
    pub async fn start(
        config: Config,
        store: Arc<dyn DataSource>,
        push: Arc<dyn PushProvider>,
        mailer: Arc<dyn MailTransport>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(push, store.clone()));
        let (triggers, rx) = TriggerBus::new();
        let handler = TriggerHandler::new(
            store.clone(),
            dispatcher.clone(),
            mailer,
            config.undeliverable_policy,
        );
        spawn_worker(Arc::new(handler), rx);

        match triggers.replay_queued(store.as_ref()).await {
            Ok(0) => {}
            Ok(n) => info!("Replaying {n} queued items left from before startup"),
            Err(e) => warn!("Could not scan for queued items: {e}"),
        }

        Self {
            config: Arc::new(config),
            store,
            dispatcher,
            triggers,
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(Any);

    let jwt_secret = JwtSecret(state.config.jwt_secret.clone());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/device-login", post(routes::auth::device_login))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/push-token", post(routes::auth::register_push_token))
        // Students
        .route("/students", get(routes::students::list_students).post(routes::students::create_student))
        .route("/students/import", post(routes::students::import_students))
        .route(
            "/students/{id}",
            get(routes::students::get_student)
                .put(routes::students::update_student)
                .delete(routes::students::delete_student),
        )
        .route("/students/{id}/approve", post(routes::students::approve_student))
        .route("/students/{id}/reject", post(routes::students::reject_student))
        .route("/students/{id}/relink", post(routes::students::relink_student))
        // Parents and supervisors
        .route("/parents", get(routes::users::list_parents).post(routes::users::create_parent))
        .route("/parents/{id}", put(routes::users::update_parent).delete(routes::users::delete_parent))
        .route("/parents/{id}/children", get(routes::users::list_children))
        .route("/supervisors", get(routes::users::list_supervisors).post(routes::users::create_supervisor))
        .route(
            "/supervisors/{id}",
            put(routes::users::update_supervisor).delete(routes::users::delete_supervisor),
        )
        // Buses and trips
        .route("/buses", get(routes::buses::list_buses).post(routes::buses::create_bus))
        .route("/buses/{id}", put(routes::buses::update_bus).delete(routes::buses::delete_bus))
        .route("/trips", get(routes::buses::list_trips))
        .route("/bus-routes", get(routes::bus_routes::list_routes).post(routes::bus_routes::create_route))
        .route(
            "/bus-routes/{id}",
            put(routes::bus_routes::update_route).delete(routes::bus_routes::delete_route),
        )
        // Complaints
        .route("/complaints", get(routes::complaints::list_complaints).post(routes::complaints::create_complaint))
        .route("/complaints/export", get(routes::complaints::export_complaints))
        .route("/complaints/{id}/start", post(routes::complaints::start_complaint))
        .route("/complaints/{id}/respond", post(routes::complaints::respond_complaint))
        .route("/complaints/{id}/status", post(routes::complaints::update_complaint_status))
        // Domain notifications
        .route(
            "/notifications",
            get(routes::notifications::list_notifications).post(routes::notifications::send_notification),
        )
        .route("/notifications/bulk", post(routes::notifications::send_bulk))
        .route("/notifications/stats/{scope}", get(routes::notifications::get_stats))
        .route("/notifications/{id}/read", post(routes::notifications::mark_read))
        // Delivery queues and direct pushes
        .route("/queue/push", post(routes::queue::enqueue_push))
        .route("/queue/email", post(routes::queue::enqueue_email))
        .route("/push/send", post(routes::push::send))
        .route("/push/batch", post(routes::push::send_batch))
        .route("/push/test", post(routes::push::send_test))
        .route("/push/data-only", post(routes::push::send_data_only))
        // Dashboard, settings and maintenance
        .route("/stats", get(routes::stats::dashboard))
        .route("/settings", get(routes::settings::get_settings))
        .route("/settings/{category}", put(routes::settings::update_settings))
        .route("/export", get(routes::settings::export_all))
        .route("/maintenance/retention", post(routes::maintenance::run_retention))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Spreadsheet uploads
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state)
}
