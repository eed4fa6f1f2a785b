//! Lead database operations

use chrono::{DateTime, Utc};
use crm_common::db::{Lead, LeadPreferences};
use crm_common::{Error, LeadSource, LeadStatus, Result, Stage};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::parse_stored;

const LEAD_COLUMNS: &str = r#"
    id, company_name, contact_name, email, phone, status, source, score, notes,
    assigned_to, preferences, last_contact, created_at, updated_at
"#;

/// Optional filters for listing leads
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub assigned_to: Option<Uuid>,
}

impl LeadFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1 = 1");
        if let Some(status) = self.status {
            builder.push(" AND status = ").push_bind(status.to_db_string());
        }
        if let Some(source) = self.source {
            builder.push(" AND source = ").push_bind(source.to_db_string());
        }
        if let Some(owner) = self.assigned_to {
            builder.push(" AND assigned_to = ").push_bind(owner.to_string());
        }
    }
}

/// Insert a new lead
pub async fn insert_lead(pool: &SqlitePool, lead: &Lead) -> Result<()> {
    let preferences = serde_json::to_string(&lead.preferences)?;

    sqlx::query(
        r#"
        INSERT INTO leads (
            id, company_name, contact_name, email, phone, status, source, score, notes,
            assigned_to, preferences, last_contact, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(lead.id.to_string())
    .bind(&lead.company_name)
    .bind(&lead.contact_name)
    .bind(&lead.email)
    .bind(&lead.phone)
    .bind(lead.status.to_db_string())
    .bind(lead.source.to_db_string())
    .bind(lead.score)
    .bind(&lead.notes)
    .bind(lead.assigned_to.map(|id| id.to_string()))
    .bind(preferences)
    .bind(lead.last_contact)
    .bind(lead.created_at)
    .bind(lead.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load lead by id
pub async fn load_lead(pool: &SqlitePool, id: Uuid) -> Result<Option<Lead>> {
    let row = sqlx::query(&format!("SELECT {} FROM leads WHERE id = ?", LEAD_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(lead_from_row).transpose()
}

/// Overwrite the editable fields of an existing lead
///
/// Status is not written here; status changes go through [`update_lead_status`].
/// Returns false if no lead has this id.
pub async fn update_lead(pool: &SqlitePool, lead: &Lead) -> Result<bool> {
    let preferences = serde_json::to_string(&lead.preferences)?;

    let result = sqlx::query(
        r#"
        UPDATE leads SET
            company_name = ?, contact_name = ?, email = ?, phone = ?, source = ?,
            score = ?, notes = ?, assigned_to = ?, preferences = ?, last_contact = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&lead.company_name)
    .bind(&lead.contact_name)
    .bind(&lead.email)
    .bind(&lead.phone)
    .bind(lead.source.to_db_string())
    .bind(lead.score)
    .bind(&lead.notes)
    .bind(lead.assigned_to.map(|id| id.to_string()))
    .bind(preferences)
    .bind(lead.last_contact)
    .bind(lead.updated_at)
    .bind(lead.id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Set a lead's status; returns false if no lead has this id
pub async fn update_lead_status(
    pool: &SqlitePool,
    id: Uuid,
    status: LeadStatus,
    updated_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE leads SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.to_db_string())
        .bind(updated_at)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a lead; returns false if no lead has this id
pub async fn delete_lead(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM leads WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Count leads matching a filter
pub async fn count_leads(pool: &SqlitePool, filter: &LeadFilter) -> Result<i64> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM leads");
    filter.push_where(&mut builder);

    let count: i64 = builder.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}

/// List leads matching a filter, newest first
pub async fn list_leads(
    pool: &SqlitePool,
    filter: &LeadFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Lead>> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM leads", LEAD_COLUMNS));
    filter.push_where(&mut builder);
    builder
        .push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter().map(lead_from_row).collect()
}

/// Number of leads currently in each status
///
/// Unlike the pipeline aggregate this is a snapshot: each lead is counted
/// once, in its present stage. Stages with no leads are omitted.
pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(Stage, i64)>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM leads GROUP BY status")
            .fetch_all(pool)
            .await?;

    let mut counts = rows
        .into_iter()
        .map(|(status, count)| Ok((parse_stored::<Stage>("leads.status", &status)?, count)))
        .collect::<Result<Vec<_>>>()?;
    counts.sort_by_key(|(stage, _)| stage.position());

    Ok(counts)
}

fn lead_from_row(row: &SqliteRow) -> Result<Lead> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let source: String = row.try_get("source")?;
    let assigned_to: Option<String> = row.try_get("assigned_to")?;
    let preferences: String = row.try_get("preferences")?;

    let preferences: LeadPreferences = serde_json::from_str(&preferences)
        .map_err(|e| Error::Internal(format!("Corrupt preferences for lead {}: {}", id, e)))?;

    Ok(Lead {
        id: parse_stored("leads.id", &id)?,
        company_name: row.try_get("company_name")?,
        contact_name: row.try_get("contact_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        status: parse_stored("leads.status", &status)?,
        source: parse_stored("leads.source", &source)?,
        score: row.try_get("score")?,
        notes: row.try_get("notes")?,
        assigned_to: assigned_to
            .as_deref()
            .map(|owner| parse_stored("leads.assigned_to", owner))
            .transpose()?,
        preferences,
        last_contact: row.try_get("last_contact")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
