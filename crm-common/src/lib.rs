//! # CRM Common Library
//!
//! Shared code for the CRM services including:
//! - Pipeline stage and lead source enumerations
//! - Database models and schema initialization
//! - Event types (CrmEvent enum) and SSE helpers
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod stage;

pub use error::{Error, Result};
pub use stage::{LeadSource, LeadStatus, Stage};
