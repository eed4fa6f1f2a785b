//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stage::{LeadSource, LeadStatus, Stage};
use crate::{Error, Result};

/// Highest lead score accepted
pub const MAX_LEAD_SCORE: i64 = 100;

/// Largest budget a single lead may carry
///
/// Keeps stage value sums far from `f64` overflow.
pub const MAX_BUDGET: f64 = 1e15;

/// Prospect preferences captured with a lead (stored as a JSON document)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadPreferences {
    /// Expected deal budget; contributes to the stage's total value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

impl LeadPreferences {
    /// Budget contribution to pipeline value (absent budget counts as 0)
    pub fn budget_or_zero(&self) -> f64 {
        self.budget.unwrap_or(0.0)
    }

    /// Budget, if present, must be finite and non-negative
    pub fn validate(&self) -> Result<()> {
        match self.budget {
            Some(budget) if !budget.is_finite() => {
                Err(Error::InvalidInput("Budget must be a finite number".to_string()))
            }
            Some(budget) if budget < 0.0 => Err(Error::InvalidInput(format!(
                "Budget must be non-negative, got {}",
                budget
            ))),
            Some(budget) if budget > MAX_BUDGET => Err(Error::InvalidInput(format!(
                "Budget must not exceed {}, got {}",
                MAX_BUDGET, budget
            ))),
            _ => Ok(()),
        }
    }
}

/// Sales prospect record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub score: i64,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub preferences: LeadPreferences,
    pub last_contact: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new lead in the `new` stage with default attributes
    pub fn new(company_name: String, contact_name: String, email: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            company_name,
            contact_name,
            email,
            phone: None,
            status: Stage::New,
            source: LeadSource::default(),
            score: 0,
            notes: None,
            assigned_to: None,
            preferences: LeadPreferences::default(),
            last_contact: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check field-level invariants before persisting
    pub fn validate(&self) -> Result<()> {
        if self.company_name.trim().is_empty() {
            return Err(Error::InvalidInput("Company name is required".to_string()));
        }
        if self.contact_name.trim().is_empty() {
            return Err(Error::InvalidInput("Contact name is required".to_string()));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::InvalidInput(format!("Invalid email address: {:?}", self.email)));
        }
        if !(0..=MAX_LEAD_SCORE).contains(&self.score) {
            return Err(Error::InvalidInput(format!(
                "Lead score must be between 0 and {}, got {}",
                MAX_LEAD_SCORE, self.score
            )));
        }
        self.preferences.validate()
    }
}

/// Derived metrics stored on a pipeline stage row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub average_deal_size: f64,
    /// Not computed yet; always `None`
    pub average_time_in_stage: Option<f64>,
    pub win_rate: f64,
    pub loss_rate: f64,
}

/// Aggregate counters for one pipeline stage
///
/// `count` and `value` are a cumulative tally of stage visits: a lead that
/// moves on keeps its contribution to every stage it has occupied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub stage: Stage,
    pub count: i64,
    pub value: f64,
    pub conversion_rate: f64,
    pub metrics: StageMetrics,
    pub last_updated: DateTime<Utc>,
}

impl PipelineStage {
    /// Zero-valued row for a stage that has never been referenced
    pub fn empty(stage: Stage) -> Self {
        Self {
            stage,
            count: 0,
            value: 0.0,
            conversion_rate: 0.0,
            metrics: StageMetrics {
                average_deal_size: 0.0,
                average_time_in_stage: None,
                win_rate: stage.win_rate(),
                loss_rate: stage.loss_rate(),
            },
            last_updated: Utc::now(),
        }
    }
}
