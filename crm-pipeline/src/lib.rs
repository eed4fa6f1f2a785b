//! crm-pipeline library - lead management and pipeline reconciliation service
//!
//! Every lead creation or status change increments the matching pipeline
//! stage aggregate and recalculates conversion rates across the funnel.

use axum::Router;
use crm_common::events::EventBus;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;
pub mod services;

use services::{LeadService, PipelineReconciler};

/// Module name reported by the health endpoint and in logs
pub const MODULE_NAME: &str = "crm-pipeline";

/// Event bus capacity per subscriber
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Lead and pipeline change notifications
    pub events: EventBus,
    pub reconciler: PipelineReconciler,
    pub leads: LeadService,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, events: EventBus) -> Self {
        let reconciler = PipelineReconciler::new(db.clone(), events.clone());
        let leads = LeadService::new(db, events.clone(), reconciler.clone());
        Self {
            events,
            reconciler,
            leads,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let api = Router::new()
        .route("/api/buildinfo", get(api::get_build_info))
        .route("/api/events", get(api::event_stream))
        .route("/api/leads", get(api::list_leads).post(api::create_lead))
        .route(
            "/api/leads/:id",
            get(api::get_lead)
                .put(api::update_lead)
                .delete(api::delete_lead),
        )
        .route("/api/leads/:id/status", put(api::update_lead_status))
        .route("/api/public/leads", post(api::capture_public_lead))
        .route("/api/pipeline", get(api::list_stages))
        .route("/api/pipeline/summary", get(api::get_summary))
        .route("/api/pipeline/:stage", get(api::get_stage))
        .route(
            "/api/pipeline/recalculate/conversion-rates",
            put(api::recalculate_conversion_rates),
        )
        .route(
            "/pipeline/recalculate/conversion-rates",
            put(api::recalculate_conversion_rates),
        );

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
