//! HTTP API handlers for crm-pipeline

pub mod buildinfo;
pub mod health;
pub mod leads;
pub mod pipeline;
pub mod sse;

pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use leads::{
    capture_public_lead, create_lead, delete_lead, get_lead, list_leads, update_lead,
    update_lead_status,
};
pub use pipeline::{get_stage, get_summary, list_stages, recalculate_conversion_rates};
pub use sse::event_stream;
