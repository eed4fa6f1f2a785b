//! Pipeline summary combining cumulative and current-state views
//!
//! Stage rows count every stage visit ever recorded. The summary places the
//! number of leads presently in each stage next to those tallies so both
//! readings are available to dashboards.

use crm_common::db::PipelineStage;
use crm_common::Stage;
use serde::Serialize;

use super::reconciliation::conversion_rate;

/// One stage in the summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub stage: Stage,
    /// Cumulative stage visits (aggregate row count)
    pub stage_visits: i64,
    /// Leads whose status is this stage right now
    pub current_leads: i64,
    pub value: f64,
    pub conversion_rate: f64,
}

/// Totals across the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub total_stage_visits: i64,
    pub total_value: f64,
    pub current_leads: i64,
    pub open_leads: i64,
    pub won_leads: i64,
    pub lost_leads: i64,
    /// Won share of currently closed leads, as a whole percentage
    pub win_rate: f64,
    pub stages: Vec<StageSummary>,
}

/// Build the summary from stage rows and current per-stage lead counts
///
/// Every stage appears in the output in pipeline order, whether or not it
/// has an aggregate row yet.
pub fn summarize(rows: &[PipelineStage], occupancy: &[(Stage, i64)]) -> PipelineSummary {
    let current_for = |stage: Stage| {
        occupancy
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };

    let stages: Vec<StageSummary> = Stage::all_variants()
        .iter()
        .map(|&stage| {
            let row = rows
                .iter()
                .find(|r| r.stage == stage)
                .cloned()
                .unwrap_or_else(|| PipelineStage::empty(stage));
            StageSummary {
                stage,
                stage_visits: row.count,
                current_leads: current_for(stage),
                value: row.value,
                conversion_rate: row.conversion_rate,
            }
        })
        .collect();

    let won_leads = current_for(Stage::ClosedWon);
    let lost_leads = current_for(Stage::ClosedLost);
    let current_leads: i64 = stages.iter().map(|s| s.current_leads).sum();
    let open_leads = stages
        .iter()
        .filter(|s| !s.stage.is_closed())
        .map(|s| s.current_leads)
        .sum();

    PipelineSummary {
        total_stage_visits: rows.iter().map(|r| r.count).sum(),
        total_value: rows.iter().map(|r| r.value).sum(),
        current_leads,
        open_leads,
        won_leads,
        lost_leads,
        win_rate: conversion_rate(won_leads + lost_leads, won_leads),
        stages,
    }
}
