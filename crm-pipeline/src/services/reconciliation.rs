//! Lead-to-pipeline metrics reconciliation
//!
//! Keeps the per-stage aggregate rows consistent as leads are created and
//! change status:
//! - [`map_status`] picks the aggregate row for a lead
//! - [`PipelineReconciler::update_pipeline_metrics`] increments that row
//! - [`PipelineReconciler::recalculate_conversion_rates`] recomputes every
//!   stage's conversion rate from the adjacent stage counts
//!
//! Aggregates are cumulative: a lead advancing from `qualified` to `proposal`
//! adds to `proposal` and leaves its earlier `qualified` contribution in place.

use chrono::Utc;
use crm_common::db::{Lead, PipelineStage};
use crm_common::events::{CrmEvent, EventBus};
use crm_common::{LeadStatus, Result, Stage};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db;

/// Pipeline stage a lead with `status` is counted under
pub fn map_status(status: LeadStatus) -> Stage {
    status
}

/// Conversion rate from `current_count` to `next_count`, as a whole percentage
///
/// Returns 0 when the current stage is empty or the result is not finite.
pub fn conversion_rate(current_count: i64, next_count: i64) -> f64 {
    if current_count <= 0 {
        return 0.0;
    }

    let rate = (next_count as f64 / current_count as f64 * 100.0).round();
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}

/// Conversion rates for stage counts given in pipeline order
///
/// Returns one rate per adjacent pair (`counts.len() - 1` entries); the last
/// stage has no successor and gets no rate. Fewer than two counts yields an
/// empty vector.
pub fn compute_conversion_rates(counts: &[i64]) -> Vec<f64> {
    counts
        .windows(2)
        .map(|pair| conversion_rate(pair[0], pair[1]))
        .collect()
}

/// Runs metric updates and conversion-rate recalculation against the store
#[derive(Clone)]
pub struct PipelineReconciler {
    db: SqlitePool,
    events: EventBus,
}

impl PipelineReconciler {
    pub fn new(db: SqlitePool, events: EventBus) -> Self {
        Self { db, events }
    }

    /// Count `lead` into the stage for its current status
    ///
    /// Increments the stage's count by one and its value by the lead's budget
    /// (0 when absent), refreshes average deal size and win/loss rate, then
    /// recalculates conversion rates across all stages. Store errors are
    /// returned as-is; the caller's lead write is not rolled back.
    pub async fn update_pipeline_metrics(&self, lead: &Lead) -> Result<PipelineStage> {
        let stage = map_status(lead.status);
        let amount = lead.preferences.budget_or_zero();

        let row = db::pipeline::increment_stage(&self.db, stage, amount, Utc::now()).await?;

        debug!(
            lead_id = %lead.id,
            stage = %stage,
            count = row.count,
            value = row.value,
            average_deal_size = row.metrics.average_deal_size,
            "Pipeline stage incremented"
        );

        self.events.emit_lossy(CrmEvent::PipelineStageUpdated {
            stage,
            count: row.count,
            value: row.value,
            timestamp: row.last_updated,
        });

        let stages = self.recalculate_conversion_rates().await?;

        // Return the row with its freshly computed conversion rate
        Ok(stages
            .into_iter()
            .find(|s| s.stage == stage)
            .unwrap_or(row))
    }

    /// Recompute every stage's conversion rate from the stored counts
    ///
    /// Rows are read in pipeline order; each row's rate becomes
    /// `round(next.count / count * 100)` (0 for an empty stage). The last row
    /// keeps its stored rate. The pass runs in one write transaction, so
    /// concurrent passes serialize; only rows whose rate changed are written.
    /// Returns all rows with their current rates; an empty store yields an
    /// empty vector.
    pub async fn recalculate_conversion_rates(&self) -> Result<Vec<PipelineStage>> {
        let mut tx = self.db.begin().await?;
        db::pipeline::acquire_write_lock(&mut *tx).await?;

        let mut stages = db::pipeline::load_all_stages(&mut *tx).await?;
        let counts: Vec<i64> = stages.iter().map(|s| s.count).collect();
        let rates = compute_conversion_rates(&counts);

        let mut changed = 0;
        for (row, rate) in stages.iter_mut().zip(rates) {
            if row.conversion_rate != rate {
                db::pipeline::set_conversion_rate(&mut *tx, row.stage, rate).await?;
                row.conversion_rate = rate;
                changed += 1;
            }
        }

        tx.commit().await?;

        if changed > 0 {
            info!(stages = stages.len(), changed, "Conversion rates recalculated");
            self.events.emit_lossy(CrmEvent::ConversionRatesRecalculated {
                stages_updated: changed,
                timestamp: Utc::now(),
            });
        }

        Ok(stages)
    }

    /// All stage rows in pipeline order
    pub async fn stages(&self) -> Result<Vec<PipelineStage>> {
        db::pipeline::load_all_stages(&self.db).await
    }

    /// One stage row, if it has ever been referenced
    pub async fn stage(&self, stage: Stage) -> Result<Option<PipelineStage>> {
        db::pipeline::load_stage(&self.db, stage).await
    }
}
