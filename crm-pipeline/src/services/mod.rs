//! Business logic between the HTTP handlers and the store

pub mod leads;
pub mod reconciliation;
pub mod scheduler;
pub mod summary;

pub use leads::LeadService;
pub use reconciliation::PipelineReconciler;
