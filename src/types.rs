//! Core types for the psyrisk engine
//!
//! This module defines the data that flows through each stage of an analytics
//! pass: raw survey records and profiles supplied by the record store, scored
//! respondents, and the serializable result structures handed back to the
//! presentation layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of items in the survey instrument
pub const ITEM_COUNT: usize = 12;

/// Lowest valid answer to a single item
pub const MIN_ANSWER: i32 = 0;

/// Highest valid answer to a single item
pub const MAX_ANSWER: i32 = 3;

/// Highest possible total score (12 items × 3)
pub const MAX_TOTAL_SCORE: u32 = (ITEM_COUNT as u32) * (MAX_ANSWER as u32);

/// Group key used when a respondent has no value for the grouped attribute
pub const UNSPECIFIED_KEY: &str = "Unspecified";

/// Ordered risk classification.
///
/// The survey score scheme uses four tiers (Low..VeryHigh); the heatmap
/// weighting scheme adds `VeryLow`. Which tiers a scheme uses is decided by its
/// [`crate::config::TierTable`], not by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl RiskTier {
    /// All tiers, lowest first
    pub const ALL: [RiskTier; 5] = [
        RiskTier::VeryLow,
        RiskTier::Low,
        RiskTier::Moderate,
        RiskTier::High,
        RiskTier::VeryHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::VeryLow => "very_low",
            RiskTier::Low => "low",
            RiskTier::Moderate => "moderate",
            RiskTier::High => "high",
            RiskTier::VeryHigh => "very_high",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::VeryLow => "Very Low",
            RiskTier::Low => "Low",
            RiskTier::Moderate => "Moderate",
            RiskTier::High => "High",
            RiskTier::VeryHigh => "Very High",
        }
    }

    /// High and Very High count as high risk
    pub fn is_high_risk(&self) -> bool {
        matches!(self, RiskTier::High | RiskTier::VeryHigh)
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Macro-category derived from a free-text department or role label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroCategory {
    AdministrationHr,
    EngineeringProjects,
    OperationsMaintenance,
    SafetyHealthEnvironment,
    LogisticsSupply,
    ServicesSupport,
    QualityControl,
    Management,
    /// Empty or missing label. Never produced for a non-empty label.
    Unspecified,
}

impl MacroCategory {
    /// Every category, including the `Unspecified` sentinel
    pub const ALL: [MacroCategory; 9] = [
        MacroCategory::AdministrationHr,
        MacroCategory::EngineeringProjects,
        MacroCategory::OperationsMaintenance,
        MacroCategory::SafetyHealthEnvironment,
        MacroCategory::LogisticsSupply,
        MacroCategory::ServicesSupport,
        MacroCategory::QualityControl,
        MacroCategory::Management,
        MacroCategory::Unspecified,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MacroCategory::AdministrationHr => "Administration & HR",
            MacroCategory::EngineeringProjects => "Engineering & Projects",
            MacroCategory::OperationsMaintenance => "Operations & Maintenance",
            MacroCategory::SafetyHealthEnvironment => "Safety/Health/Environment",
            MacroCategory::LogisticsSupply => "Logistics & Supply",
            MacroCategory::ServicesSupport => "Services & Support",
            MacroCategory::QualityControl => "Quality & Control",
            MacroCategory::Management => "Management",
            MacroCategory::Unspecified => "Unspecified",
        }
    }
}

impl fmt::Display for MacroCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One respondent's survey answers as stored by the record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponseRecord {
    /// Respondent identifier
    pub respondent_id: String,
    /// Item number (1-12) to raw answer
    pub answers: BTreeMap<u8, i32>,
    /// When the survey was submitted
    pub responded_at: DateTime<Utc>,
}

/// Work and demographic attributes of a respondent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RespondentProfile {
    pub respondent_id: String,
    /// Free-text department label
    #[serde(default)]
    pub department: Option<String>,
    /// Free-text role or job title
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub tenure_years: Option<f64>,
    #[serde(default)]
    pub contract_type: Option<String>,
    #[serde(default)]
    pub education_level: Option<String>,
    /// Whether the respondent reports using protective equipment
    #[serde(default)]
    pub uses_protective_equipment: Option<bool>,
    /// Whether the respondent had a workplace incident before
    #[serde(default)]
    pub prior_incident: Option<bool>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub satisfaction_score: Option<f64>,
    #[serde(default)]
    pub motivation_score: Option<f64>,
}

impl RespondentProfile {
    /// Label used for category normalization: department, falling back to role
    pub fn organizational_label(&self) -> Option<&str> {
        non_blank(self.department.as_deref()).or_else(|| non_blank(self.role.as_deref()))
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A respondent that passed scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRespondent {
    pub respondent_id: String,
    /// Sum of all 12 answers, 0-36
    pub total_score: u32,
    pub risk_tier: RiskTier,
    /// Number of items answered in the risk direction
    pub risk_flag_count: usize,
    pub category: MacroCategory,
    pub responded_at: DateTime<Utc>,
}

/// Why a respondent was left out of scoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Fewer than 12 items answered
    MissingItems { missing: Vec<u8> },
    /// An answer outside 0-3
    AnswerOutOfRange { item: u8, value: i32 },
    /// An item number outside 1-12
    UnknownItem { item: u8 },
    /// The profile paired with the record belongs to someone else
    ProfileMismatch { profile_id: String },
    /// The respondent already appeared earlier in the snapshot
    DuplicateRespondent,
}

/// A respondent excluded from an analytics pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub respondent_id: String,
    pub reason: ExclusionReason,
}

/// Percentage of respondents per tier
pub type TierDistribution = BTreeMap<RiskTier, f64>;

/// Aggregate statistics for one group of respondents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationBucket {
    pub group_key: String,
    pub respondent_count: usize,
    /// Mean total score (0 for an empty bucket)
    pub average_score: f64,
    /// Percentage per tier, one decimal, summing to 100 (all zero when empty)
    pub tier_distribution: TierDistribution,
}

/// Canned recommendation for a group, keyed to its weighted average risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    CriticalIntervention,
    PriorityProgram,
    PreventiveProgram,
    MaintainPractices,
}

impl Recommendation {
    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::CriticalIntervention => {
                "Critical intervention: immediate psychosocial risk intervention required"
            }
            Recommendation::PriorityProgram => {
                "Priority program: schedule a targeted psychosocial risk program"
            }
            Recommendation::PreventiveProgram => {
                "Preventive program: reinforce prevention for the moderate-risk population"
            }
            Recommendation::MaintainPractices => "Maintain current practices and keep monitoring",
        }
    }
}

/// One group row of the heatmap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRow {
    pub group_key: String,
    pub respondent_count: usize,
    /// Percentage per heatmap column
    pub cells: TierDistribution,
    /// Weighted average risk on a 0-100 scale (0 for an empty row)
    pub weighted_average_risk: f64,
    /// Tier of the weighted average under the weighted-percentage table
    pub risk_level: RiskTier,
}

/// Group × tier concentration matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapMatrix {
    /// Column order
    pub tiers: Vec<RiskTier>,
    pub rows: Vec<HeatmapRow>,
}

/// A heatmap row surfaced in the critical groups view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalGroup {
    pub rank: usize,
    pub group_key: String,
    pub respondent_count: usize,
    pub weighted_average_risk: f64,
    pub recommendation: Recommendation,
    pub message: String,
}

/// Correlation strength by absolute coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    VeryWeak,
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

/// Correlation direction by sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationDirection {
    Positive,
    Negative,
    Neutral,
}

/// Whether a coefficient was actually computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStatus {
    Computed,
    /// Empty, mismatched or zero-variance input; the coefficient is 0
    NoData,
}

/// Pearson correlation between two respondent variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    /// `"<x>~<y>"`
    pub pair_id: String,
    pub variable_x: String,
    pub variable_y: String,
    /// Coefficient in [-1, 1]
    pub coefficient: f64,
    pub strength: CorrelationStrength,
    pub direction: CorrelationDirection,
    pub status: CorrelationStatus,
    /// Respondents with both variables present
    pub sample_size: usize,
}

/// Statistics for one time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeTrendPoint {
    /// ISO week of the window start, e.g. `2024-W03`
    pub week: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub respondent_count: usize,
    pub average_score: f64,
    /// Share of respondents in High or Very High, 0-100
    pub percent_high_risk: f64,
}

/// A scored respondent alongside the profile it was scored from
#[derive(Debug, Clone)]
pub struct Assessment<'a> {
    pub scored: ScoredRespondent,
    pub profile: &'a RespondentProfile,
}

/// Whole-snapshot figures shown above the dashboard's breakdowns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    /// Entries in the snapshot
    pub total_entries: usize,
    /// Entries that could be scored
    pub scored: usize,
    /// Entries excluded from scoring
    pub excluded: usize,
    /// Scored respondents left out by the filter
    pub filtered_out: usize,
    /// Scored respondents included in the analytics
    pub respondent_count: usize,
    pub average_score: f64,
    /// Share of included respondents in High or Very High, 0-100
    pub percent_high_risk: f64,
    pub tier_distribution: TierDistribution,
}
