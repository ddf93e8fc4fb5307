//! Pipeline orchestration
//!
//! This module provides the public API of the engine. One analytics pass runs
//! a snapshot through every stage and returns a [`DashboardReport`]:
//! category normalization → scoring → filtering → aggregation, heatmap,
//! correlation and trend.
//!
//! The pass is a pure function of (snapshot, filter, configuration). Output
//! only contains ordered maps and no wall-clock time, so running it twice on
//! the same input produces byte-identical JSON.

use crate::aggregate::{Aggregator, GroupDimension};
use crate::category::CategoryNormalizer;
use crate::config::EngineConfig;
use crate::correlation::CorrelationAnalyzer;
use crate::error::AnalyticsError;
use crate::filter::AnalyticsFilter;
use crate::heatmap::HeatmapBuilder;
use crate::scoring::ScoreCalculator;
use crate::snapshot::{parse_snapshot, Snapshot};
use crate::trend::TrendAggregator;
use crate::types::{
    AggregationBucket, Assessment, CorrelationPair, CriticalGroup, Exclusion, ExclusionReason,
    HeatmapMatrix, OverallSummary, ScoredRespondent, TimeTrendPoint,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Everything the dashboard needs from one analytics pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
    pub engine_version: String,
    pub snapshot_version: u64,
    pub summary: OverallSummary,
    /// Included respondents, in snapshot order
    pub scored: Vec<ScoredRespondent>,
    /// Entries that could not be scored, in snapshot order
    pub exclusions: Vec<Exclusion>,
    pub groupings: BTreeMap<GroupDimension, Vec<AggregationBucket>>,
    pub heatmap: HeatmapMatrix,
    pub critical_groups: Vec<CriticalGroup>,
    pub correlations: Vec<CorrelationPair>,
    pub trend: Vec<TimeTrendPoint>,
}

impl DashboardReport {
    /// Encode as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, AnalyticsError> {
        serde_json::to_string_pretty(self).map_err(AnalyticsError::JsonError)
    }
}

/// Output of the scoring stage
#[derive(Debug, Clone)]
pub struct ScoringOutcome<'s> {
    pub assessments: Vec<Assessment<'s>>,
    pub exclusions: Vec<Exclusion>,
}

/// Engine holding a validated configuration and the stages built from it
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    config: EngineConfig,
    normalizer: CategoryNormalizer,
    calculator: ScoreCalculator,
    aggregator: Aggregator,
    heatmap: HeatmapBuilder,
    trend: TrendAggregator,
}

impl Default for AnalyticsEngine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}

impl AnalyticsEngine {
    /// Validate `config` and build the stages
    pub fn new(config: EngineConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Build from a JSON configuration; absent fields keep their defaults
    pub fn from_json_config(json: &str) -> Result<Self, AnalyticsError> {
        Ok(Self::build(EngineConfig::from_json(json)?))
    }

    fn build(config: EngineConfig) -> Self {
        Self {
            normalizer: CategoryNormalizer::new(&config.category_rules),
            calculator: ScoreCalculator::new(config.score_tiers.clone(), config.risk_flags.clone()),
            aggregator: Aggregator::new(config.score_tiers.tiers()),
            heatmap: HeatmapBuilder::new(config.tier_weights.clone(), config.heatmap_tiers.clone()),
            trend: TrendAggregator::new(config.trend.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Normalize and score every entry.
    ///
    /// An entry is excluded when its profile belongs to another respondent,
    /// when its respondent was already scored earlier in the snapshot, or when
    /// its answers cannot be scored. Excluded entries do not claim the
    /// respondent id, so a later complete record is still scored.
    pub fn score_snapshot<'s>(&self, snapshot: &'s Snapshot) -> ScoringOutcome<'s> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut assessments = Vec::with_capacity(snapshot.len());
        let mut exclusions = Vec::new();

        for entry in snapshot.entries() {
            let respondent_id = entry.record.respondent_id.as_str();

            let result = if entry.is_mismatched() {
                Err(ExclusionReason::ProfileMismatch {
                    profile_id: entry.profile.respondent_id.clone(),
                })
            } else if seen.contains(respondent_id) {
                Err(ExclusionReason::DuplicateRespondent)
            } else {
                let category = self
                    .normalizer
                    .normalize(entry.profile.organizational_label());
                self.calculator.score(&entry.record, category)
            };

            match result {
                Ok(scored) => {
                    seen.insert(respondent_id);
                    assessments.push(Assessment {
                        scored,
                        profile: &entry.profile,
                    });
                }
                Err(reason) => {
                    debug!(respondent_id, reason = ?reason, "respondent excluded");
                    exclusions.push(Exclusion {
                        respondent_id: respondent_id.to_string(),
                        reason,
                    });
                }
            }
        }

        ScoringOutcome {
            assessments,
            exclusions,
        }
    }

    /// Run one analytics pass
    pub fn run(
        &self,
        snapshot: &Snapshot,
        filter: &AnalyticsFilter,
    ) -> Result<DashboardReport, AnalyticsError> {
        filter.validate()?;

        let ScoringOutcome {
            assessments,
            exclusions,
        } = self.score_snapshot(snapshot);
        let scored_count = assessments.len();

        let utc_offset_minutes = self.config.trend.utc_offset_minutes;
        let items: Vec<Assessment<'_>> = assessments
            .into_iter()
            .filter(|item| filter.matches_at_offset(item, utc_offset_minutes))
            .collect();
        debug!(
            scored = scored_count,
            included = items.len(),
            "filter applied"
        );

        let summary = self.summarize(snapshot.len(), scored_count, exclusions.len(), &items);

        let report_config = &self.config.report;
        let mut groupings = BTreeMap::new();
        for dimension in &report_config.dimensions {
            let buckets = self.aggregator.aggregate_dimension(
                &items,
                *dimension,
                report_config.include_empty_categories,
            );
            groupings.insert(*dimension, buckets);
        }
        debug!(dimensions = groupings.len(), "groupings computed");

        let heatmap_buckets = match groupings.get(&report_config.heatmap_dimension) {
            Some(buckets) => buckets.clone(),
            None => self.aggregator.aggregate_dimension(
                &items,
                report_config.heatmap_dimension,
                report_config.include_empty_categories,
            ),
        };
        let heatmap = self.heatmap.build(&heatmap_buckets)?;
        let critical_groups =
            heatmap.critical_groups(report_config.critical_top_n, &self.config.recommendations);
        debug!(rows = heatmap.rows.len(), "heatmap built");

        let correlations = CorrelationAnalyzer::analyze_all(&self.config.correlation_pairs, &items);
        let trend = self.trend.weekly(items.iter().map(|item| &item.scored));
        debug!(
            pairs = correlations.len(),
            points = trend.len(),
            "correlations and trend computed"
        );

        info!(
            snapshot_version = snapshot.version,
            respondents = snapshot.len(),
            scored = scored_count,
            excluded = exclusions.len(),
            included = items.len(),
            "analytics pass complete"
        );

        Ok(DashboardReport {
            engine_version: crate::ENGINE_VERSION.to_string(),
            snapshot_version: snapshot.version,
            summary,
            scored: items.into_iter().map(|item| item.scored).collect(),
            exclusions,
            groupings,
            heatmap,
            critical_groups,
            correlations,
            trend,
        })
    }

    fn summarize(
        &self,
        total_entries: usize,
        scored: usize,
        excluded: usize,
        items: &[Assessment<'_>],
    ) -> OverallSummary {
        let overall = self
            .aggregator
            .bucket("Overall", items.iter().map(|item| &item.scored));
        let high_risk = items
            .iter()
            .filter(|item| item.scored.risk_tier.is_high_risk())
            .count();
        let percent_high_risk = if items.is_empty() {
            0.0
        } else {
            crate::aggregate::round_to(high_risk as f64 / items.len() as f64 * 100.0, 1)
        };

        OverallSummary {
            total_entries,
            scored,
            excluded,
            filtered_out: scored - items.len(),
            respondent_count: items.len(),
            average_score: overall.average_score,
            percent_high_risk,
            tier_distribution: overall.tier_distribution,
        }
    }
}

/// One-shot conversion from snapshot JSON to dashboard JSON.
///
/// # Arguments
/// * `snapshot_json` - Snapshot payload from the record store
/// * `config_json` - Engine configuration, `None` for defaults
/// * `filter_json` - Filter descriptor, `None` for everyone
///
/// # Example
/// ```ignore
/// let dashboard = survey_to_dashboard_json(&snapshot_json, None, None)?;
/// ```
pub fn survey_to_dashboard_json(
    snapshot_json: &str,
    config_json: Option<&str>,
    filter_json: Option<&str>,
) -> Result<String, AnalyticsError> {
    let engine = match config_json {
        Some(json) => AnalyticsEngine::from_json_config(json)?,
        None => AnalyticsEngine::default(),
    };
    let filter = match filter_json {
        Some(json) => serde_json::from_str(json)?,
        None => AnalyticsFilter::default(),
    };
    let snapshot = parse_snapshot(snapshot_json)?;

    engine.run(&snapshot, &filter)?.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterField;
    use crate::snapshot::SnapshotEntry;
    use crate::types::{
        CorrelationStatus, MacroCategory, RawResponseRecord, Recommendation, RespondentProfile,
        RiskTier,
    };
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn make_entry(
        id: &str,
        profile_id: &str,
        department: &str,
        answers: &[i32],
        day: u32,
        tenure_years: f64,
    ) -> SnapshotEntry {
        SnapshotEntry::new(
            RawResponseRecord {
                respondent_id: id.to_string(),
                answers: answers
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| ((idx + 1) as u8, *v))
                    .collect(),
                responded_at: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
            },
            RespondentProfile {
                respondent_id: profile_id.to_string(),
                department: Some(department.to_string()),
                tenure_years: Some(tenure_years),
                ..Default::default()
            },
        )
    }

    fn make_snapshot() -> Snapshot {
        let sum_10 = [3, 3, 3, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        let sum_30 = [3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 0, 0];
        let sum_5 = [3, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        Snapshot::new(
            3,
            vec![
                make_entry("r-1", "r-1", "Operador de Línea", &sum_10, 15, 2.0),
                make_entry("r-2", "r-2", "Operador de Línea", &sum_30, 17, 12.0),
                make_entry("r-3", "r-3", "Recursos Humanos", &sum_5, 24, 1.0),
                make_entry("r-4", "r-4", "Almacén", &[1; 11], 24, 3.0),
                make_entry("r-5", "r-9", "Almacén", &[1; 12], 24, 3.0),
                make_entry("r-1", "r-1", "Operador de Línea", &[0; 12], 25, 2.0),
            ],
        )
    }

    #[test]
    fn test_full_pass() {
        let snapshot = make_snapshot();
        let report = AnalyticsEngine::default()
            .run(&snapshot, &AnalyticsFilter::default())
            .unwrap();

        assert_eq!(report.snapshot_version, 3);
        assert_eq!(report.summary.total_entries, 6);
        assert_eq!(report.summary.scored, 3);
        assert_eq!(report.summary.excluded, 3);
        assert_eq!(report.summary.respondent_count, 3);
        assert!((report.summary.average_score - 15.0).abs() < 1e-9);
        assert!((report.summary.percent_high_risk - 33.3).abs() < 1e-9);

        let scored_ids: Vec<&str> = report
            .scored
            .iter()
            .map(|s| s.respondent_id.as_str())
            .collect();
        assert_eq!(scored_ids, vec!["r-1", "r-2", "r-3"]);
        assert_eq!(report.scored[0].category, MacroCategory::OperationsMaintenance);
        assert_eq!(report.scored[2].category, MacroCategory::AdministrationHr);
    }

    #[test]
    fn test_exclusions_in_snapshot_order() {
        let snapshot = make_snapshot();
        let report = AnalyticsEngine::default()
            .run(&snapshot, &AnalyticsFilter::default())
            .unwrap();

        assert_eq!(
            report.exclusions,
            vec![
                Exclusion {
                    respondent_id: "r-4".to_string(),
                    reason: ExclusionReason::MissingItems { missing: vec![12] },
                },
                Exclusion {
                    respondent_id: "r-5".to_string(),
                    reason: ExclusionReason::ProfileMismatch {
                        profile_id: "r-9".to_string()
                    },
                },
                Exclusion {
                    respondent_id: "r-1".to_string(),
                    reason: ExclusionReason::DuplicateRespondent,
                },
            ]
        );
    }

    #[test]
    fn test_category_grouping_and_heatmap() {
        let snapshot = make_snapshot();
        let report = AnalyticsEngine::default()
            .run(&snapshot, &AnalyticsFilter::default())
            .unwrap();

        let categories = &report.groupings[&GroupDimension::Category];
        let keys: Vec<&str> = categories.iter().map(|b| b.group_key.as_str()).collect();
        assert_eq!(keys, vec!["Administration & HR", "Operations & Maintenance"]);

        let operations = &categories[1];
        assert_eq!(operations.respondent_count, 2);
        assert!((operations.average_score - 20.0).abs() < 1e-9);
        assert_eq!(operations.tier_distribution[&RiskTier::Moderate], 50.0);
        assert_eq!(operations.tier_distribution[&RiskTier::VeryHigh], 50.0);

        // (50 × 0.5 + 50 × 0.9) / 100
        let row = &report.heatmap.rows[1];
        assert_eq!(row.group_key, "Operations & Maintenance");
        assert!((row.weighted_average_risk - 70.0).abs() < 1e-9);
        assert_eq!(row.risk_level, RiskTier::High);

        assert_eq!(report.critical_groups.len(), 2);
        assert_eq!(report.critical_groups[0].group_key, "Operations & Maintenance");
        assert_eq!(
            report.critical_groups[0].recommendation,
            Recommendation::CriticalIntervention
        );
        assert_eq!(
            report.critical_groups[1].recommendation,
            Recommendation::PriorityProgram
        );
    }

    #[test]
    fn test_trend_and_correlations() {
        let snapshot = make_snapshot();
        let report = AnalyticsEngine::default()
            .run(&snapshot, &AnalyticsFilter::default())
            .unwrap();

        let weeks: Vec<(&str, usize)> = report
            .trend
            .iter()
            .map(|p| (p.week.as_str(), p.respondent_count))
            .collect();
        assert_eq!(weeks, vec![("2024-W03", 2), ("2024-W04", 1)]);
        assert!((report.trend[0].percent_high_risk - 50.0).abs() < 1e-9);

        assert_eq!(report.correlations.len(), 6);
        let tenure = &report.correlations[0];
        assert_eq!(tenure.pair_id, "tenure_years~total_score");
        assert_eq!(tenure.sample_size, 3);
        assert_eq!(tenure.status, CorrelationStatus::Computed);
        assert!(tenure.coefficient > 0.9);

        // No motivation scores in the snapshot
        let motivation = &report.correlations[2];
        assert_eq!(motivation.status, CorrelationStatus::NoData);
        assert_eq!(motivation.coefficient, 0.0);
    }

    #[test]
    fn test_filter_narrows_every_view() {
        let snapshot = make_snapshot();
        let filter = AnalyticsFilter::new()
            .with_attribute(FilterField::Category, "Operations & Maintenance");
        let report = AnalyticsEngine::default().run(&snapshot, &filter).unwrap();

        assert_eq!(report.summary.scored, 3);
        assert_eq!(report.summary.filtered_out, 1);
        assert_eq!(report.summary.respondent_count, 2);
        assert_eq!(report.groupings[&GroupDimension::Category].len(), 1);
        assert_eq!(report.trend.len(), 1);
    }

    #[test]
    fn test_incomplete_record_does_not_claim_respondent() {
        let snapshot = Snapshot::new(
            1,
            vec![
                make_entry("r-7", "r-7", "Almacén", &[1; 11], 15, 3.0),
                make_entry("r-7", "r-7", "Almacén", &[1; 12], 16, 3.0),
                make_entry("r-7", "r-7", "Almacén", &[0; 12], 17, 3.0),
            ],
        );
        let report = AnalyticsEngine::default()
            .run(&snapshot, &AnalyticsFilter::default())
            .unwrap();

        assert_eq!(report.scored.len(), 1);
        assert_eq!(report.scored[0].total_score, 12);
        let reasons: Vec<&ExclusionReason> = report.exclusions.iter().map(|e| &e.reason).collect();
        assert_eq!(
            reasons,
            vec![
                &ExclusionReason::MissingItems { missing: vec![12] },
                &ExclusionReason::DuplicateRespondent,
            ]
        );
    }

    #[test]
    fn test_date_filter_follows_trend_offset() {
        let mut entry = make_entry("r-1", "r-1", "Almacén", &[1; 12], 21, 3.0);
        entry.record.responded_at = Utc.with_ymd_and_hms(2024, 1, 21, 23, 0, 0).unwrap();
        let snapshot = Snapshot::new(1, vec![entry]);

        let mut config = EngineConfig::default();
        config.trend.utc_offset_minutes = 120;
        let engine = AnalyticsEngine::new(config).unwrap();

        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 1, d);
        let monday_week = AnalyticsFilter::new().with_date_range(day(22), day(28));
        let report = engine.run(&snapshot, &monday_week).unwrap();
        assert_eq!(report.summary.respondent_count, 1);
        assert_eq!(report.trend.len(), 1);
        assert_eq!(report.trend[0].week, "2024-W04");

        let sunday_week = AnalyticsFilter::new().with_date_range(day(15), day(21));
        let report = engine.run(&snapshot, &sunday_week).unwrap();
        assert_eq!(report.summary.respondent_count, 0);
        assert!(report.trend.is_empty());
    }

    #[test]
    fn test_empty_categories_on_request() {
        let mut config = EngineConfig::default();
        config.report.include_empty_categories = true;
        let engine = AnalyticsEngine::new(config).unwrap();

        let report = engine
            .run(&make_snapshot(), &AnalyticsFilter::default())
            .unwrap();
        let categories = &report.groupings[&GroupDimension::Category];
        assert_eq!(categories.len(), MacroCategory::ALL.len());
        assert_eq!(report.heatmap.rows.len(), MacroCategory::ALL.len());
        // Empty rows never make the critical list
        assert_eq!(report.critical_groups.len(), 2);
    }

    #[test]
    fn test_empty_snapshot() {
        let report = AnalyticsEngine::default()
            .run(&Snapshot::default(), &AnalyticsFilter::default())
            .unwrap();

        assert_eq!(report.summary.respondent_count, 0);
        assert_eq!(report.summary.average_score, 0.0);
        assert!(report.summary.tier_distribution.values().all(|p| *p == 0.0));
        assert!(report.heatmap.rows.is_empty());
        assert!(report.trend.is_empty());
        assert!(report
            .correlations
            .iter()
            .all(|c| c.status == CorrelationStatus::NoData));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.tier_weights.weights.remove(&RiskTier::VeryHigh);
        assert!(matches!(
            AnalyticsEngine::new(config),
            Err(AnalyticsError::MissingTierWeight(RiskTier::VeryHigh))
        ));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let filter = AnalyticsFilter::new().with_age_range(Some(60), Some(20));
        let result = AnalyticsEngine::default().run(&make_snapshot(), &filter);
        assert!(matches!(result, Err(AnalyticsError::InvalidConfig(_))));
    }

    #[test]
    fn test_repeated_runs_are_byte_identical() {
        let snapshot = make_snapshot();
        let engine = AnalyticsEngine::default();

        let first = engine
            .run(&snapshot, &AnalyticsFilter::default())
            .unwrap()
            .to_json()
            .unwrap();
        let second = engine
            .run(&snapshot, &AnalyticsFilter::default())
            .unwrap()
            .to_json()
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_survey_to_dashboard_json() {
        let snapshot_json = r#"{
            "version": 1,
            "entries": [{
                "record": {
                    "respondent_id": "r-1",
                    "answers": {"1": 3, "2": 3, "3": 3, "4": 3, "5": 3, "6": 3,
                                "7": 3, "8": 3, "9": 3, "10": 0, "11": 0, "12": 0},
                    "responded_at": "2024-01-15T09:00:00Z"
                },
                "profile": {"respondent_id": "r-1", "role": "Safety Inspector"}
            }]
        }"#;

        let json = survey_to_dashboard_json(
            snapshot_json,
            Some(r#"{"report": {"critical_top_n": 1}}"#),
            Some(r#"{"min_age": null}"#),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["snapshot_version"], 1);
        assert_eq!(value["scored"][0]["total_score"], 27);
        assert_eq!(value["scored"][0]["risk_tier"], "high");
        assert_eq!(value["scored"][0]["category"], "safety_health_environment");
        assert_eq!(value["critical_groups"].as_array().unwrap().len(), 1);
        assert!(value["groupings"]["category"].is_array());
    }

    #[test]
    fn test_survey_to_dashboard_json_errors() {
        assert!(matches!(
            survey_to_dashboard_json("[]", None, None),
            Err(AnalyticsError::ParseError(_))
        ));
        assert!(matches!(
            survey_to_dashboard_json(
                "{}",
                Some(r#"{"trend": {"weeks_per_bucket": 0}}"#),
                None,
            ),
            Err(AnalyticsError::InvalidConfig(_))
        ));
    }
}
