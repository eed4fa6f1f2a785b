//! Sales pipeline stage and lead source enumerations
//!
//! `Stage` is the single canonical enumeration for both a lead's status and
//! the key of a pipeline aggregate row. `LeadStatus` is an alias, so the two
//! can never diverge.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// Position of a lead in the sales funnel
///
/// Variants are declared in logical pipeline order; `position()` exposes that
/// order as an integer so the store can sort rows without relying on string
/// collation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    Contacted,
    Qualified,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

/// A lead's status is a pipeline stage
pub type LeadStatus = Stage;

impl Stage {
    /// Zero-based position in the pipeline (NEW = 0 ... CLOSED_LOST = 6)
    pub fn position(&self) -> i64 {
        match self {
            Stage::New => 0,
            Stage::Contacted => 1,
            Stage::Qualified => 2,
            Stage::Proposal => 3,
            Stage::Negotiation => 4,
            Stage::ClosedWon => 5,
            Stage::ClosedLost => 6,
        }
    }

    /// String stored in the database and used on the wire
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Stage::New => "new",
            Stage::Contacted => "contacted",
            Stage::Qualified => "qualified",
            Stage::Proposal => "proposal",
            Stage::Negotiation => "negotiation",
            Stage::ClosedWon => "closed_won",
            Stage::ClosedLost => "closed_lost",
        }
    }

    /// All stages in pipeline order
    pub fn all_variants() -> &'static [Stage] {
        &[
            Stage::New,
            Stage::Contacted,
            Stage::Qualified,
            Stage::Proposal,
            Stage::Negotiation,
            Stage::ClosedWon,
            Stage::ClosedLost,
        ]
    }

    /// Win rate recorded on this stage's aggregate row
    pub fn win_rate(&self) -> f64 {
        if *self == Stage::ClosedWon {
            100.0
        } else {
            0.0
        }
    }

    /// Loss rate recorded on this stage's aggregate row
    pub fn loss_rate(&self) -> f64 {
        if *self == Stage::ClosedLost {
            100.0
        } else {
            0.0
        }
    }

    /// True for the two terminal stages
    pub fn is_closed(&self) -> bool {
        matches!(self, Stage::ClosedWon | Stage::ClosedLost)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::New
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::all_variants()
            .iter()
            .copied()
            .find(|stage| stage.to_db_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown pipeline stage: {:?}", s)))
    }
}

/// Channel a lead arrived through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    SocialMedia,
    Email,
    Phone,
    Other,
}

impl LeadSource {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            LeadSource::Website => "website",
            LeadSource::Referral => "referral",
            LeadSource::SocialMedia => "social_media",
            LeadSource::Email => "email",
            LeadSource::Phone => "phone",
            LeadSource::Other => "other",
        }
    }

    pub fn all_variants() -> &'static [LeadSource] {
        &[
            LeadSource::Website,
            LeadSource::Referral,
            LeadSource::SocialMedia,
            LeadSource::Email,
            LeadSource::Phone,
            LeadSource::Other,
        ]
    }
}

impl Default for LeadSource {
    fn default() -> Self {
        LeadSource::Other
    }
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}

impl FromStr for LeadSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadSource::all_variants()
            .iter()
            .copied()
            .find(|source| source.to_db_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown lead source: {:?}", s)))
    }
}
