//! qc-rate library - image quality-control rating service
//!
//! Serves images one at a time to raters, least-rated first, and records
//! their PASS/UNSURE/FAIL verdicts or clicked problem points.

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod forms;
pub mod html;
pub mod judgment;
pub mod selector;
pub mod session;
pub mod workflow;

use config::ServiceSettings;
use dispatcher::TaskDispatcher;
use session::SessionStore;
use workflow::RatingWorkflow;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub workflow: RatingWorkflow,
    pub sessions: SessionStore,
    pub settings: Arc<ServiceSettings>,
}

impl AppState {
    /// Create application state with a fresh dispatcher sized from `settings`
    pub fn new(db: SqlitePool, settings: ServiceSettings) -> Self {
        let dispatcher = TaskDispatcher::new(settings.worker_count);
        let workflow = RatingWorkflow::new(
            db.clone(),
            settings.selection_policy,
            dispatcher,
            settings.task_timeout,
        );

        Self {
            db,
            workflow,
            sessions: SessionStore::new(),
            settings: Arc::new(settings),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let pages = Router::new()
        .route("/", get(api::index_page).post(api::start_session))
        .route("/rate/:slug", get(api::rate_page).post(api::submit_judgment))
        .route("/rate/:slug/next", get(api::next_image_partial))
        .route("/static/clicks.js", get(api::serve_clicks_js))
        .route("/static/hotkeys.js", get(api::serve_hotkeys_js));

    let json_api = Router::new()
        .route("/api/images/", get(api::list_images_handler))
        .route("/api/image/", axum::routing::post(api::create_image_handler))
        .route(
            "/api/image/:id/",
            get(api::get_image_handler).delete(api::delete_image_handler),
        )
        .route("/api/ratings/", get(api::list_ratings_handler))
        .route("/api/clicks/", get(api::list_clicks_handler));

    Router::new()
        .merge(pages)
        .merge(json_api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
