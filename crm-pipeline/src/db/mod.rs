//! Database access layer for crm-pipeline
//!
//! Schema creation lives in `crm_common::db`; this module holds the queries.

use crm_common::{Error, Result};
use std::fmt::Display;
use std::str::FromStr;

pub mod leads;
pub mod pipeline;

pub use leads::LeadFilter;

/// Parse a value read back from the store
///
/// A stored value that no longer parses (for example a stage string edited
/// directly in the database) is a server-side data fault, not bad input.
pub(crate) fn parse_stored<T>(column: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::Internal(format!("Corrupt value {:?} in {}: {}", value, column, e)))
}
