//! Engine configuration
//!
//! Every tunable of an analytics pass lives here as plain data: tier tables,
//! tier weights, the category rule table, risk-flag framing, correlation pairs,
//! trend bucketing and report layout. All objects deserialize with defaults for
//! missing fields, and [`EngineConfig::validate`] rejects structurally invalid
//! settings before any data is touched.

use crate::aggregate::GroupDimension;
use crate::category::CategoryRuleTable;
use crate::correlation::CorrelationPairSpec;
use crate::error::AnalyticsError;
use crate::types::{RiskTier, ITEM_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Largest UTC offset accepted for trend bucketing (18 hours)
const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// How a band's upper bound compares against a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundKind {
    /// `value <= bound`
    Inclusive,
    /// `value < bound`
    Exclusive,
}

/// One tier and its upper bound; `None` means unbounded (last band only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBand {
    pub tier: RiskTier,
    pub upper_bound: Option<f64>,
}

impl TierBand {
    pub fn bounded(tier: RiskTier, upper_bound: f64) -> Self {
        Self {
            tier,
            upper_bound: Some(upper_bound),
        }
    }

    pub fn unbounded(tier: RiskTier) -> Self {
        Self {
            tier,
            upper_bound: None,
        }
    }
}

/// Named, ordered classification table mapping a value onto tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub name: String,
    pub bound_kind: BoundKind,
    /// Lowest tier first
    pub bands: Vec<TierBand>,
}

impl TierTable {
    /// Four-tier table over the raw 0-36 total score
    pub fn score() -> Self {
        Self {
            name: "score".to_string(),
            bound_kind: BoundKind::Inclusive,
            bands: vec![
                TierBand::bounded(RiskTier::Low, 9.0),
                TierBand::bounded(RiskTier::Moderate, 18.0),
                TierBand::bounded(RiskTier::High, 27.0),
                TierBand::unbounded(RiskTier::VeryHigh),
            ],
        }
    }

    /// Five-tier table over a 0-100 weighted percentage
    pub fn weighted_percentage() -> Self {
        Self {
            name: "weighted_percentage".to_string(),
            bound_kind: BoundKind::Exclusive,
            bands: vec![
                TierBand::bounded(RiskTier::VeryLow, 20.0),
                TierBand::bounded(RiskTier::Low, 40.0),
                TierBand::bounded(RiskTier::Moderate, 60.0),
                TierBand::bounded(RiskTier::High, 80.0),
                TierBand::unbounded(RiskTier::VeryHigh),
            ],
        }
    }

    /// Classify a value. Values above every bound land in the last band.
    pub fn classify(&self, value: f64) -> RiskTier {
        for band in &self.bands {
            match band.upper_bound {
                Some(bound) => {
                    let within = match self.bound_kind {
                        BoundKind::Inclusive => value <= bound,
                        BoundKind::Exclusive => value < bound,
                    };
                    if within {
                        return band.tier;
                    }
                }
                None => return band.tier,
            }
        }
        self.bands
            .last()
            .map(|band| band.tier)
            .unwrap_or(RiskTier::VeryHigh)
    }

    /// Tiers of this table, lowest first
    pub fn tiers(&self) -> Vec<RiskTier> {
        self.bands.iter().map(|band| band.tier).collect()
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        let invalid = |msg: String| {
            AnalyticsError::InvalidConfig(format!("tier table '{}': {msg}", self.name))
        };

        if self.bands.is_empty() {
            return Err(invalid("no bands".to_string()));
        }

        let last = self.bands.len() - 1;
        let mut previous: Option<&TierBand> = None;
        for (idx, band) in self.bands.iter().enumerate() {
            match (idx == last, band.upper_bound) {
                (true, Some(_)) => {
                    return Err(invalid("last band must be unbounded".to_string()));
                }
                (false, None) => {
                    return Err(invalid(format!(
                        "band {} ({}) is unbounded but is not the last band",
                        idx, band.tier
                    )));
                }
                (_, Some(bound)) if !bound.is_finite() => {
                    return Err(invalid(format!("band {} has a non-finite bound", idx)));
                }
                _ => {}
            }

            if let Some(prev) = previous {
                if band.tier <= prev.tier {
                    return Err(invalid(format!(
                        "tiers must be strictly ascending ({} after {})",
                        band.tier, prev.tier
                    )));
                }
                if let (Some(prev_bound), Some(bound)) = (prev.upper_bound, band.upper_bound) {
                    if bound <= prev_bound {
                        return Err(invalid(format!(
                            "bounds must be strictly increasing ({bound} after {prev_bound})"
                        )));
                    }
                }
            }
            previous = Some(band);
        }

        Ok(())
    }
}

/// Per-tier weights used for the weighted average risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierWeights {
    pub weights: BTreeMap<RiskTier, f64>,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            weights: BTreeMap::from([
                (RiskTier::VeryLow, 0.1),
                (RiskTier::Low, 0.3),
                (RiskTier::Moderate, 0.5),
                (RiskTier::High, 0.7),
                (RiskTier::VeryHigh, 0.9),
            ]),
        }
    }
}

impl TierWeights {
    /// Weight for a tier. A missing entry is a configuration error, never zero.
    pub fn weight(&self, tier: RiskTier) -> Result<f64, AnalyticsError> {
        self.weights
            .get(&tier)
            .copied()
            .ok_or(AnalyticsError::MissingTierWeight(tier))
    }

    /// Tiers that carry a weight, lowest first
    pub fn tiers(&self) -> Vec<RiskTier> {
        self.weights.keys().copied().collect()
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.weights.is_empty() {
            return Err(AnalyticsError::InvalidConfig(
                "tier weight table is empty".to_string(),
            ));
        }
        for (tier, weight) in &self.weights {
            if !weight.is_finite() || !(0.0..=1.0).contains(weight) {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "weight for tier {tier} must be within [0, 1], got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Item framing used by the risk-flag count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskFlagConfig {
    /// Items where a low answer signals risk (1-based)
    pub positively_framed_items: BTreeSet<u8>,
    /// Positively framed items are flagged at or below this answer
    pub positive_flag_max: i32,
    /// Remaining items are flagged at or above this answer
    pub negative_flag_min: i32,
}

impl Default for RiskFlagConfig {
    fn default() -> Self {
        Self {
            positively_framed_items: BTreeSet::from([1, 3, 4, 7, 8, 12]),
            positive_flag_max: 1,
            negative_flag_min: 2,
        }
    }
}

impl RiskFlagConfig {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if let Some(item) = self
            .positively_framed_items
            .iter()
            .find(|item| **item == 0 || usize::from(**item) > ITEM_COUNT)
        {
            return Err(AnalyticsError::InvalidConfig(format!(
                "positively framed item {item} is outside 1..={ITEM_COUNT}"
            )));
        }
        Ok(())
    }
}

/// Time bucketing for the trend series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Number of ISO weeks per bucket
    pub weeks_per_bucket: u32,
    /// Offset applied to UTC timestamps before taking the calendar date
    pub utc_offset_minutes: i32,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            weeks_per_bucket: 1,
            utc_offset_minutes: 0,
        }
    }
}

impl TrendConfig {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.weeks_per_bucket == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "weeks_per_bucket must be at least 1".to_string(),
            ));
        }
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(AnalyticsError::InvalidConfig(format!(
                "utc_offset_minutes {} is beyond ±{MAX_UTC_OFFSET_MINUTES}",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }
}

/// Weighted-average thresholds behind the canned recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationThresholds {
    /// At or above: critical intervention
    pub critical: f64,
    /// At or above: priority program
    pub priority: f64,
    /// Moderate-tier share at or above: preventive program
    pub preventive_moderate_share: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            critical: 50.0,
            priority: 30.0,
            preventive_moderate_share: 40.0,
        }
    }
}

/// Which groupings the dashboard report contains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub dimensions: Vec<GroupDimension>,
    /// Grouping rendered as the heatmap
    pub heatmap_dimension: GroupDimension,
    /// Emit zero-count buckets for categories nobody in the snapshot belongs to
    pub include_empty_categories: bool,
    /// Size of the critical groups view
    pub critical_top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dimensions: vec![
                GroupDimension::Category,
                GroupDimension::Shift,
                GroupDimension::Gender,
                GroupDimension::ContractType,
            ],
            heatmap_dimension: GroupDimension::Category,
            include_empty_categories: false,
            critical_top_n: 5,
        }
    }
}

/// Complete configuration of an analytics pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Classifies total scores
    pub score_tiers: TierTable,
    /// Classifies heatmap weighted averages
    pub heatmap_tiers: TierTable,
    pub tier_weights: TierWeights,
    pub category_rules: CategoryRuleTable,
    pub risk_flags: RiskFlagConfig,
    pub correlation_pairs: Vec<CorrelationPairSpec>,
    pub trend: TrendConfig,
    pub report: ReportConfig,
    pub recommendations: RecommendationThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            score_tiers: TierTable::score(),
            heatmap_tiers: TierTable::weighted_percentage(),
            tier_weights: TierWeights::default(),
            category_rules: CategoryRuleTable::default(),
            risk_flags: RiskFlagConfig::default(),
            correlation_pairs: CorrelationPairSpec::defaults(),
            trend: TrendConfig::default(),
            report: ReportConfig::default(),
            recommendations: RecommendationThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from JSON; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section. Fails on the first problem found.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        self.score_tiers.validate()?;
        self.heatmap_tiers.validate()?;
        self.tier_weights.validate()?;
        self.category_rules.validate()?;
        self.risk_flags.validate()?;
        self.trend.validate()?;

        for spec in &self.correlation_pairs {
            spec.validate()?;
        }

        // Every tier a score can land in must have a heatmap weight
        for tier in self.score_tiers.tiers() {
            self.tier_weights.weight(tier)?;
        }

        Ok(())
    }
}
