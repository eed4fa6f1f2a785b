//! Lead lifecycle operations
//!
//! Lead creation and status changes are the two writes that feed the
//! pipeline aggregate; both call into [`PipelineReconciler`] after the lead
//! itself has been saved.

use chrono::{DateTime, Utc};
use crm_common::db::{Lead, LeadPreferences};
use crm_common::events::{CrmEvent, EventBus};
use crm_common::{Error, LeadSource, LeadStatus, Result, Stage};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use super::reconciliation::PipelineReconciler;
use crate::db::{self, LeadFilter};
use crate::pagination::{calculate_pagination, PAGE_SIZE};

/// Lead submitted by a sales representative
#[derive(Debug, Clone, Deserialize)]
pub struct NewLead {
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub preferences: Option<LeadPreferences>,
    #[serde(default)]
    pub last_contact: Option<DateTime<Utc>>,
}

/// Lead submitted through the public capture form
///
/// Always enters the pipeline as `new`; source defaults to `website`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublicLeadForm {
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub preferences: Option<LeadPreferences>,
}

/// Manual edit of a lead; absent fields are left unchanged
///
/// Status is deliberately absent: use [`LeadService::update_lead_status`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeadUpdate {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<LeadSource>,
    pub score: Option<i64>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub preferences: Option<LeadPreferences>,
    pub last_contact: Option<DateTime<Utc>>,
}

/// Query parameters for listing leads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub assigned_to: Option<Uuid>,
}

fn default_page() -> i64 {
    1
}

/// One page of leads
#[derive(Debug, Serialize)]
pub struct LeadPage {
    pub total_results: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub leads: Vec<Lead>,
}

/// Lead operations backed by the store
#[derive(Clone)]
pub struct LeadService {
    db: SqlitePool,
    events: EventBus,
    reconciler: PipelineReconciler,
}

impl LeadService {
    pub fn new(db: SqlitePool, events: EventBus, reconciler: PipelineReconciler) -> Self {
        Self {
            db,
            events,
            reconciler,
        }
    }

    /// Create a lead and count it into its stage
    pub async fn create_lead(&self, input: NewLead) -> Result<Lead> {
        let mut lead = Lead::new(input.company_name, input.contact_name, input.email);
        lead.phone = input.phone;
        lead.status = input.status.unwrap_or_default();
        lead.source = input.source.unwrap_or_default();
        lead.score = input.score.unwrap_or(0);
        lead.notes = input.notes;
        lead.assigned_to = input.assigned_to;
        lead.preferences = input.preferences.unwrap_or_default();
        lead.last_contact = input.last_contact;

        self.insert_and_reconcile(lead).await
    }

    /// Create a lead from the public capture form
    pub async fn capture_public_lead(&self, form: PublicLeadForm) -> Result<Lead> {
        let mut lead = Lead::new(form.company_name, form.contact_name, form.email);
        lead.phone = form.phone;
        lead.status = Stage::New;
        lead.source = form.source.unwrap_or(LeadSource::Website);
        lead.notes = form.message;
        lead.preferences = form.preferences.unwrap_or_default();

        self.insert_and_reconcile(lead).await
    }

    async fn insert_and_reconcile(&self, lead: Lead) -> Result<Lead> {
        lead.validate()?;
        db::leads::insert_lead(&self.db, &lead).await?;

        info!(lead_id = %lead.id, status = %lead.status, source = %lead.source, "Lead created");
        self.events.emit_lossy(CrmEvent::LeadCreated {
            lead_id: lead.id,
            status: lead.status,
            timestamp: lead.created_at,
        });

        self.reconcile(&lead).await?;
        Ok(lead)
    }

    /// Move a lead to `status` and count it into the new stage
    ///
    /// Setting the status the lead already has is not a change and leaves
    /// the pipeline untouched.
    pub async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead> {
        let mut lead = self.get_lead(id).await?;
        if lead.status == status {
            return Ok(lead);
        }

        let old_status = lead.status;
        let now = Utc::now();
        if !db::leads::update_lead_status(&self.db, id, status, now).await? {
            return Err(Error::NotFound(format!("Lead {}", id)));
        }
        lead.status = status;
        lead.updated_at = now;

        info!(lead_id = %id, from = %old_status, to = %status, "Lead status changed");
        self.events.emit_lossy(CrmEvent::LeadStatusChanged {
            lead_id: id,
            old_status,
            new_status: status,
            timestamp: now,
        });

        self.reconcile(&lead).await?;
        Ok(lead)
    }

    async fn reconcile(&self, lead: &Lead) -> Result<()> {
        if let Err(e) = self.reconciler.update_pipeline_metrics(lead).await {
            warn!(
                lead_id = %lead.id,
                "Lead saved but pipeline metrics update failed: {}", e
            );
            return Err(e);
        }
        Ok(())
    }

    /// Apply a manual edit; the pipeline is not touched
    pub async fn update_lead(&self, id: Uuid, update: LeadUpdate) -> Result<Lead> {
        let mut lead = self.get_lead(id).await?;

        if let Some(company_name) = update.company_name {
            lead.company_name = company_name;
        }
        if let Some(contact_name) = update.contact_name {
            lead.contact_name = contact_name;
        }
        if let Some(email) = update.email {
            lead.email = email;
        }
        if update.phone.is_some() {
            lead.phone = update.phone;
        }
        if let Some(source) = update.source {
            lead.source = source;
        }
        if let Some(score) = update.score {
            lead.score = score;
        }
        if update.notes.is_some() {
            lead.notes = update.notes;
        }
        if update.assigned_to.is_some() {
            lead.assigned_to = update.assigned_to;
        }
        if let Some(preferences) = update.preferences {
            lead.preferences = preferences;
        }
        if update.last_contact.is_some() {
            lead.last_contact = update.last_contact;
        }
        lead.updated_at = Utc::now();

        lead.validate()?;
        if !db::leads::update_lead(&self.db, &lead).await? {
            return Err(Error::NotFound(format!("Lead {}", id)));
        }

        Ok(lead)
    }

    pub async fn get_lead(&self, id: Uuid) -> Result<Lead> {
        db::leads::load_lead(&self.db, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Lead {}", id)))
    }

    pub async fn list_leads(&self, query: &LeadQuery) -> Result<LeadPage> {
        let filter = LeadFilter {
            status: query.status,
            source: query.source,
            assigned_to: query.assigned_to,
        };

        let total_results = db::leads::count_leads(&self.db, &filter).await?;
        let pagination = calculate_pagination(total_results, query.page);
        let leads = db::leads::list_leads(&self.db, &filter, PAGE_SIZE, pagination.offset).await?;

        Ok(LeadPage {
            total_results,
            page: pagination.page,
            page_size: PAGE_SIZE,
            total_pages: pagination.total_pages,
            leads,
        })
    }

    /// Delete a lead; its past pipeline contributions remain
    pub async fn delete_lead(&self, id: Uuid) -> Result<()> {
        if !db::leads::delete_lead(&self.db, id).await? {
            return Err(Error::NotFound(format!("Lead {}", id)));
        }
        info!(lead_id = %id, "Lead deleted");
        Ok(())
    }

    /// Leads currently in each stage, for every stage in pipeline order
    pub async fn current_occupancy(&self) -> Result<Vec<(Stage, i64)>> {
        let counts = db::leads::count_by_status(&self.db).await?;
        Ok(Stage::all_variants()
            .iter()
            .map(|stage| {
                let count = counts
                    .iter()
                    .find(|(s, _)| s == stage)
                    .map(|(_, c)| *c)
                    .unwrap_or(0);
                (*stage, count)
            })
            .collect())
    }
}
