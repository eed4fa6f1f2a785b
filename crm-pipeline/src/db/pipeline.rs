//! Pipeline stage aggregate database operations
//!
//! One row per stage, created on first reference and never deleted.

use chrono::{DateTime, Utc};
use crm_common::db::{PipelineStage, StageMetrics};
use crm_common::{Error, Result, Stage};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use super::parse_stored;

const STAGE_COLUMNS: &str = r#"
    stage, count, value, conversion_rate, average_deal_size,
    average_time_in_stage, win_rate, loss_rate, last_updated
"#;

/// Add one lead worth `amount` to a stage's counters
///
/// The increment happens inside a single upsert, so concurrent writers never
/// lose each other's updates. An absent row is treated as zero-valued.
/// Derived metrics are recomputed from the post-increment totals in the same
/// statement. Returns the row as stored after the update.
///
/// An amount that is negative or not finite, or one that would push the
/// stage value past `f64::MAX`, is rejected with `InvalidInput` and nothing
/// is written.
pub async fn increment_stage<'e, E>(
    executor: E,
    stage: Stage,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<PipelineStage>
where
    E: Executor<'e, Database = Sqlite>,
{
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::InvalidInput(format!(
            "Stage amount must be a finite non-negative number, got {}",
            amount
        )));
    }

    let sql = format!(
        r#"
        INSERT INTO pipeline_stages (
            stage, position, count, value, conversion_rate, average_deal_size,
            average_time_in_stage, win_rate, loss_rate, last_updated
        ) VALUES (?, ?, 1, ?, 0, ?, NULL, ?, ?, ?)
        ON CONFLICT(stage) DO UPDATE SET
            count = pipeline_stages.count + 1,
            value = pipeline_stages.value + excluded.value,
            average_deal_size = (pipeline_stages.value + excluded.value)
                                / (pipeline_stages.count + 1),
            average_time_in_stage = NULL,
            win_rate = excluded.win_rate,
            loss_rate = excluded.loss_rate,
            last_updated = excluded.last_updated
        WHERE pipeline_stages.value + excluded.value <= ?
        RETURNING {}
        "#,
        STAGE_COLUMNS
    );

    let row = sqlx::query(&sql)
        .bind(stage.to_db_string())
        .bind(stage.position())
        .bind(amount)
        .bind(amount)
        .bind(stage.win_rate())
        .bind(stage.loss_rate())
        .bind(now)
        .bind(f64::MAX)
        .fetch_optional(executor)
        .await?;

    match row {
        Some(row) => stage_from_row(&row),
        None => Err(Error::InvalidInput(format!(
            "Adding {} to stage {} would overflow its total value",
            amount, stage
        ))),
    }
}

/// Load one stage row, if it has ever been referenced
pub async fn load_stage<'e, E>(executor: E, stage: Stage) -> Result<Option<PipelineStage>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM pipeline_stages WHERE stage = ?", STAGE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(stage.to_db_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(stage_from_row).transpose()
}

/// Load every stage row in pipeline order
pub async fn load_all_stages<'e, E>(executor: E) -> Result<Vec<PipelineStage>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM pipeline_stages ORDER BY position", STAGE_COLUMNS);
    let rows = sqlx::query(&sql).fetch_all(executor).await?;

    rows.iter().map(stage_from_row).collect()
}

/// Take the database write lock inside the current transaction
///
/// Must be the first statement of a read-then-write transaction; a deferred
/// transaction that reads first cannot later upgrade to a writer once another
/// connection has committed.
pub async fn acquire_write_lock<'e, E>(executor: E) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE pipeline_stages SET conversion_rate = conversion_rate WHERE stage IS NULL")
        .execute(executor)
        .await?;

    Ok(())
}

/// Persist a stage's conversion rate
pub async fn set_conversion_rate<'e, E>(executor: E, stage: Stage, rate: f64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE pipeline_stages SET conversion_rate = ? WHERE stage = ?")
        .bind(rate)
        .bind(stage.to_db_string())
        .execute(executor)
        .await?;

    Ok(())
}

fn stage_from_row(row: &SqliteRow) -> Result<PipelineStage> {
    let stage: String = row.try_get("stage")?;

    Ok(PipelineStage {
        stage: parse_stored("pipeline_stages.stage", &stage)?,
        count: row.try_get("count")?,
        value: row.try_get("value")?,
        conversion_rate: row.try_get("conversion_rate")?,
        metrics: StageMetrics {
            average_deal_size: row.try_get("average_deal_size")?,
            average_time_in_stage: row.try_get("average_time_in_stage")?,
            win_rate: row.try_get("win_rate")?,
            loss_rate: row.try_get("loss_rate")?,
        },
        last_updated: row.try_get("last_updated")?,
    })
}
