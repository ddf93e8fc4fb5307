//! Pairwise correlation
//!
//! Computes the Pearson product-moment coefficient between two respondent
//! variables and labels it by strength and direction. The analyzer never
//! discovers pairs; it runs exactly the pairs it is given.
//!
//! Empty, mismatched or zero-variance input yields a coefficient of 0 tagged
//! [`CorrelationStatus::NoData`], so "nothing to measure" stays distinguishable
//! from "measured, no correlation".

use crate::aggregate::round_to;
use crate::error::AnalyticsError;
use crate::types::{
    Assessment, CorrelationDirection, CorrelationPair, CorrelationStatus, CorrelationStrength,
    MacroCategory,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Relative tolerance under which a series is treated as constant
const VARIANCE_EPSILON: f64 = 1e-12;

/// Pearson coefficient of two equal-length series.
///
/// `r = (nΣxy − ΣxΣy) / sqrt((nΣx² − (Σx)²)(nΣy² − (Σy)²))`
///
/// Returns `None` for empty or mismatched series and when either series has
/// no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.is_empty() || x.len() != y.len() {
        return None;
    }

    let n = x.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_yy = 0.0;
    let mut sum_xy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sum_x += a;
        sum_y += b;
        sum_xx += a * a;
        sum_yy += b * b;
        sum_xy += a * b;
    }

    let numerator = n * sum_xy - sum_x * sum_y;
    let var_x = n * sum_xx - sum_x * sum_x;
    let var_y = n * sum_yy - sum_y * sum_y;

    if var_x <= VARIANCE_EPSILON * (n * sum_xx).max(1.0)
        || var_y <= VARIANCE_EPSILON * (n * sum_yy).max(1.0)
    {
        return None;
    }

    let denominator = (var_x * var_y).sqrt();
    if !denominator.is_finite() || denominator <= 0.0 {
        return None;
    }

    Some((numerator / denominator).clamp(-1.0, 1.0))
}

/// Strength label by absolute coefficient
pub fn strength(coefficient: f64) -> CorrelationStrength {
    let r = coefficient.abs();
    if r >= 0.8 {
        CorrelationStrength::VeryStrong
    } else if r >= 0.6 {
        CorrelationStrength::Strong
    } else if r >= 0.4 {
        CorrelationStrength::Moderate
    } else if r >= 0.2 {
        CorrelationStrength::Weak
    } else {
        CorrelationStrength::VeryWeak
    }
}

/// Direction label by sign, with a ±0.1 neutral band
pub fn direction(coefficient: f64) -> CorrelationDirection {
    if coefficient > 0.1 {
        CorrelationDirection::Positive
    } else if coefficient < -0.1 {
        CorrelationDirection::Negative
    } else {
        CorrelationDirection::Neutral
    }
}

/// Correlate two labelled series
pub fn correlate(variable_x: &str, variable_y: &str, x: &[f64], y: &[f64]) -> CorrelationPair {
    let (coefficient, status) = match pearson(x, y) {
        Some(r) => (round_to(r, 4), CorrelationStatus::Computed),
        None => (0.0, CorrelationStatus::NoData),
    };

    CorrelationPair {
        pair_id: format!("{variable_x}~{variable_y}"),
        variable_x: variable_x.to_string(),
        variable_y: variable_y.to_string(),
        coefficient,
        strength: strength(coefficient),
        direction: direction(coefficient),
        status,
        sample_size: if x.len() == y.len() { x.len() } else { 0 },
    }
}

/// A numeric encoding of one respondent attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variable", content = "value", rename_all = "snake_case")]
pub enum Variable {
    TenureYears,
    Age,
    TotalScore,
    RiskFlagCount,
    Confidence,
    Satisfaction,
    Motivation,
    /// 1 when protective equipment is used
    ProtectiveEquipment,
    /// 1 when the respondent had a prior incident
    PriorIncident,
    /// 1 when gender equals the value (case-insensitive)
    GenderIs(String),
    /// 1 when shift equals the value (case-insensitive)
    ShiftIs(String),
    /// 1 when the respondent's macro-category is the given one
    CategoryIs(MacroCategory),
}

impl Variable {
    pub fn name(&self) -> String {
        match self {
            Variable::TenureYears => "tenure_years".to_string(),
            Variable::Age => "age".to_string(),
            Variable::TotalScore => "total_score".to_string(),
            Variable::RiskFlagCount => "risk_flag_count".to_string(),
            Variable::Confidence => "confidence".to_string(),
            Variable::Satisfaction => "satisfaction".to_string(),
            Variable::Motivation => "motivation".to_string(),
            Variable::ProtectiveEquipment => "protective_equipment".to_string(),
            Variable::PriorIncident => "prior_incident".to_string(),
            Variable::GenderIs(value) => format!("gender={}", value.trim().to_lowercase()),
            Variable::ShiftIs(value) => format!("shift={}", value.trim().to_lowercase()),
            Variable::CategoryIs(category) => format!("category={}", category.label()),
        }
    }

    /// Value for one respondent, `None` when the attribute is missing
    pub fn encode(&self, assessment: &Assessment<'_>) -> Option<f64> {
        let profile = assessment.profile;
        let flag = |b: bool| if b { 1.0 } else { 0.0 };

        let value = match self {
            Variable::TenureYears => profile.tenure_years,
            Variable::Age => profile.age.map(f64::from),
            Variable::TotalScore => Some(f64::from(assessment.scored.total_score)),
            Variable::RiskFlagCount => Some(assessment.scored.risk_flag_count as f64),
            Variable::Confidence => profile.confidence_score,
            Variable::Satisfaction => profile.satisfaction_score,
            Variable::Motivation => profile.motivation_score,
            Variable::ProtectiveEquipment => profile.uses_protective_equipment.map(flag),
            Variable::PriorIncident => profile.prior_incident.map(flag),
            Variable::GenderIs(expected) => one_hot(profile.gender.as_deref(), expected),
            Variable::ShiftIs(expected) => one_hot(profile.shift.as_deref(), expected),
            Variable::CategoryIs(category) => Some(flag(assessment.scored.category == *category)),
        };

        value.filter(|v| v.is_finite())
    }
}

fn one_hot(actual: Option<&str>, expected: &str) -> Option<f64> {
    let actual = actual.map(str::trim).filter(|a| !a.is_empty())?;
    let matched = actual.to_lowercase() == expected.trim().to_lowercase();
    Some(if matched { 1.0 } else { 0.0 })
}

/// One configured variable pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationPairSpec {
    pub x: Variable,
    pub y: Variable,
}

impl CorrelationPairSpec {
    pub fn new(x: Variable, y: Variable) -> Self {
        Self { x, y }
    }

    /// Pairs reported by default
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(Variable::TenureYears, Variable::TotalScore),
            Self::new(Variable::Confidence, Variable::Satisfaction),
            Self::new(Variable::Motivation, Variable::TotalScore),
            Self::new(Variable::ProtectiveEquipment, Variable::PriorIncident),
            Self::new(Variable::Age, Variable::TotalScore),
            Self::new(Variable::GenderIs("female".to_string()), Variable::Motivation),
        ]
    }

    pub fn is_self_pair(&self) -> bool {
        self.x == self.y
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        for variable in [&self.x, &self.y] {
            if let Variable::GenderIs(value) | Variable::ShiftIs(value) = variable {
                if value.trim().is_empty() {
                    return Err(AnalyticsError::InvalidConfig(format!(
                        "correlation variable {variable:?} needs a non-blank value"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Runs configured pairs over a set of assessments
pub struct CorrelationAnalyzer;

impl CorrelationAnalyzer {
    /// Correlate one pair. Respondents missing either variable are left out.
    pub fn analyze_pair(spec: &CorrelationPairSpec, items: &[Assessment<'_>]) -> CorrelationPair {
        let (x, y): (Vec<f64>, Vec<f64>) = items
            .iter()
            .filter_map(|item| Some((spec.x.encode(item)?, spec.y.encode(item)?)))
            .unzip();

        let pair = correlate(&spec.x.name(), &spec.y.name(), &x, &y);
        debug!(
            pair = %pair.pair_id,
            sample_size = pair.sample_size,
            coefficient = pair.coefficient,
            "correlation computed"
        );
        pair
    }

    /// Correlate every pair in order, skipping self-correlations
    pub fn analyze_all(
        specs: &[CorrelationPairSpec],
        items: &[Assessment<'_>],
    ) -> Vec<CorrelationPair> {
        specs
            .iter()
            .filter(|spec| {
                if spec.is_self_pair() {
                    warn!(variable = %spec.x.name(), "skipping self-correlation pair");
                    return false;
                }
                true
            })
            .map(|spec| Self::analyze_pair(spec, items))
            .collect()
    }
}
