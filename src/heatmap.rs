//! Heatmap construction
//!
//! Turns the buckets of one grouping into a group × tier concentration matrix,
//! adds a weighted average risk per row and derives the critical groups view.
//!
//! Weighted average risk is `Σ(pct_i × weight_i) / Σ(pct_i)` scaled to 0-100,
//! and 0 for a row with no respondents.

use crate::aggregate::round_to;
use crate::config::{RecommendationThresholds, TierTable, TierWeights};
use crate::error::AnalyticsError;
use crate::types::{
    AggregationBucket, CriticalGroup, HeatmapMatrix, HeatmapRow, Recommendation, RiskTier,
    TierDistribution,
};
use std::cmp::Ordering;

/// Builder for heatmap matrices
#[derive(Debug, Clone)]
pub struct HeatmapBuilder {
    weights: TierWeights,
    levels: TierTable,
}

impl Default for HeatmapBuilder {
    fn default() -> Self {
        Self::new(TierWeights::default(), TierTable::weighted_percentage())
    }
}

impl HeatmapBuilder {
    /// `levels` classifies each row's weighted average into a risk level
    pub fn new(weights: TierWeights, levels: TierTable) -> Self {
        Self { weights, levels }
    }

    /// Build one row per bucket, keeping bucket order.
    ///
    /// Fails with [`AnalyticsError::MissingTierWeight`] when a bucket holds
    /// respondents in a tier the weight table does not cover.
    pub fn build(&self, buckets: &[AggregationBucket]) -> Result<HeatmapMatrix, AnalyticsError> {
        let tiers = self.weights.tiers();
        let rows = buckets
            .iter()
            .map(|bucket| self.build_row(bucket, &tiers))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HeatmapMatrix { tiers, rows })
    }

    fn build_row(
        &self,
        bucket: &AggregationBucket,
        tiers: &[RiskTier],
    ) -> Result<HeatmapRow, AnalyticsError> {
        if let Some((tier, _)) = bucket
            .tier_distribution
            .iter()
            .find(|(tier, pct)| **pct > 0.0 && !tiers.contains(*tier))
        {
            return Err(AnalyticsError::MissingTierWeight(*tier));
        }

        let cells: TierDistribution = tiers
            .iter()
            .map(|tier| {
                let pct = bucket.tier_distribution.get(tier).copied().unwrap_or(0.0);
                (*tier, pct)
            })
            .collect();

        let weighted_average_risk = weighted_average_risk(&cells, &self.weights)?;

        Ok(HeatmapRow {
            group_key: bucket.group_key.clone(),
            respondent_count: bucket.respondent_count,
            risk_level: self.levels.classify(weighted_average_risk),
            cells,
            weighted_average_risk,
        })
    }
}

/// Weighted average risk of a distribution on a 0-100 scale, two decimals
pub fn weighted_average_risk(
    distribution: &TierDistribution,
    weights: &TierWeights,
) -> Result<f64, AnalyticsError> {
    let mut weighted = 0.0;
    let mut total = 0.0;

    for (tier, pct) in distribution {
        if *pct <= 0.0 {
            continue;
        }
        weighted += pct * weights.weight(*tier)?;
        total += pct;
    }

    if total <= 0.0 {
        return Ok(0.0);
    }

    Ok(round_to(weighted / total * 100.0, 2))
}

/// Canned recommendation for one row
pub fn recommend(row: &HeatmapRow, thresholds: &RecommendationThresholds) -> Recommendation {
    let moderate_share = row.cells.get(&RiskTier::Moderate).copied().unwrap_or(0.0);

    if row.weighted_average_risk >= thresholds.critical {
        Recommendation::CriticalIntervention
    } else if row.weighted_average_risk >= thresholds.priority {
        Recommendation::PriorityProgram
    } else if moderate_share >= thresholds.preventive_moderate_share {
        Recommendation::PreventiveProgram
    } else {
        Recommendation::MaintainPractices
    }
}

impl HeatmapMatrix {
    /// Top `top_n` non-empty rows by descending weighted average risk.
    /// Ties are broken by group key.
    pub fn critical_groups(
        &self,
        top_n: usize,
        thresholds: &RecommendationThresholds,
    ) -> Vec<CriticalGroup> {
        let mut rows: Vec<&HeatmapRow> = self
            .rows
            .iter()
            .filter(|row| row.respondent_count > 0)
            .collect();

        rows.sort_by(|a, b| {
            b.weighted_average_risk
                .partial_cmp(&a.weighted_average_risk)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.group_key.cmp(&b.group_key))
        });

        rows.into_iter()
            .take(top_n)
            .enumerate()
            .map(|(idx, row)| {
                let recommendation = recommend(row, thresholds);
                CriticalGroup {
                    rank: idx + 1,
                    group_key: row.group_key.clone(),
                    respondent_count: row.respondent_count,
                    weighted_average_risk: row.weighted_average_risk,
                    recommendation,
                    message: recommendation.message().to_string(),
                }
            })
            .collect()
    }
}
