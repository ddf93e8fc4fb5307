//! Group aggregation
//!
//! Groups scored respondents by a categorical key and computes, per group, the
//! respondent count, the mean total score and the percentage of members in
//! each tier. Distributions are rounded to one decimal with a largest-remainder
//! pass so that non-empty groups always sum to exactly 100.0 in tenths.

use crate::types::{
    non_blank, AggregationBucket, Assessment, MacroCategory, RiskTier, ScoredRespondent,
    TierDistribution, UNSPECIFIED_KEY,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Percentages are distributed in tenths of a percent
const TENTHS_TOTAL: u64 = 1000;

/// Attribute a grouping is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDimension {
    /// Normalized macro-category
    Category,
    /// Raw department label
    Department,
    /// Raw role label
    Role,
    Shift,
    Gender,
    ContractType,
    EducationLevel,
    AgeBand,
    TenureBand,
}

impl GroupDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupDimension::Category => "category",
            GroupDimension::Department => "department",
            GroupDimension::Role => "role",
            GroupDimension::Shift => "shift",
            GroupDimension::Gender => "gender",
            GroupDimension::ContractType => "contract_type",
            GroupDimension::EducationLevel => "education_level",
            GroupDimension::AgeBand => "age_band",
            GroupDimension::TenureBand => "tenure_band",
        }
    }

    /// Group key of one assessment under this dimension
    pub fn key(&self, assessment: &Assessment<'_>) -> String {
        let profile = assessment.profile;
        let raw = |value: &Option<String>| {
            non_blank(value.as_deref())
                .unwrap_or(UNSPECIFIED_KEY)
                .to_string()
        };

        match self {
            GroupDimension::Category => assessment.scored.category.label().to_string(),
            GroupDimension::Department => raw(&profile.department),
            GroupDimension::Role => raw(&profile.role),
            GroupDimension::Shift => raw(&profile.shift),
            GroupDimension::Gender => raw(&profile.gender),
            GroupDimension::ContractType => raw(&profile.contract_type),
            GroupDimension::EducationLevel => raw(&profile.education_level),
            GroupDimension::AgeBand => profile
                .age
                .map(age_band)
                .unwrap_or(UNSPECIFIED_KEY)
                .to_string(),
            GroupDimension::TenureBand => profile
                .tenure_years
                .and_then(tenure_band)
                .unwrap_or(UNSPECIFIED_KEY)
                .to_string(),
        }
    }

    /// Every possible key, when the dimension has a closed set of values
    pub fn universe(&self) -> Option<Vec<String>> {
        match self {
            GroupDimension::Category => Some(
                MacroCategory::ALL
                    .iter()
                    .map(|c| c.label().to_string())
                    .collect(),
            ),
            _ => None,
        }
    }
}

fn age_band(age: u32) -> &'static str {
    match age {
        0..=24 => "<25",
        25..=34 => "25-34",
        35..=44 => "35-44",
        45..=54 => "45-54",
        _ => "55+",
    }
}

fn tenure_band(years: f64) -> Option<&'static str> {
    if !years.is_finite() || years < 0.0 {
        return None;
    }
    let band = if years < 1.0 {
        "<1"
    } else if years < 3.0 {
        "1-3"
    } else if years < 5.0 {
        "3-5"
    } else if years < 10.0 {
        "5-10"
    } else {
        "10+"
    };
    Some(band)
}

/// Aggregator over a fixed set of distribution tiers
#[derive(Debug, Clone)]
pub struct Aggregator {
    tiers: Vec<RiskTier>,
}

impl Aggregator {
    /// `tiers` are the distribution keys every bucket reports, even at 0%
    pub fn new(tiers: Vec<RiskTier>) -> Self {
        Self { tiers }
    }

    /// One bucket per key observed in `items`, ordered by key
    pub fn aggregate_by<F>(&self, items: &[Assessment<'_>], key: F) -> Vec<AggregationBucket>
    where
        F: Fn(&Assessment<'_>) -> String,
    {
        self.group(items, key, &[])
    }

    /// Like [`Aggregator::aggregate_by`], plus empty buckets for unseen keys of `universe`
    pub fn with_universe<F>(
        &self,
        items: &[Assessment<'_>],
        key: F,
        universe: &[String],
    ) -> Vec<AggregationBucket>
    where
        F: Fn(&Assessment<'_>) -> String,
    {
        self.group(items, key, universe)
    }

    /// Aggregate along a dimension; `full_universe` adds empty buckets where the
    /// dimension's key set is closed
    pub fn aggregate_dimension(
        &self,
        items: &[Assessment<'_>],
        dimension: GroupDimension,
        full_universe: bool,
    ) -> Vec<AggregationBucket> {
        let key = |assessment: &Assessment<'_>| dimension.key(assessment);
        match dimension.universe().filter(|_| full_universe) {
            Some(universe) => self.with_universe(items, key, &universe),
            None => self.aggregate_by(items, key),
        }
    }

    /// Single bucket over an arbitrary set of respondents
    pub fn bucket<'s, I>(&self, group_key: impl Into<String>, members: I) -> AggregationBucket
    where
        I: IntoIterator<Item = &'s ScoredRespondent>,
    {
        let mut counts: BTreeMap<RiskTier, u64> = self.tiers.iter().map(|t| (*t, 0)).collect();
        let mut total_score: u64 = 0;
        let mut n: u64 = 0;

        for member in members {
            *counts.entry(member.risk_tier).or_insert(0) += 1;
            total_score += u64::from(member.total_score);
            n += 1;
        }

        let average_score = if n == 0 {
            0.0
        } else {
            round_to(total_score as f64 / n as f64, 2)
        };

        AggregationBucket {
            group_key: group_key.into(),
            respondent_count: n as usize,
            average_score,
            tier_distribution: distribute_percentages(&counts, n),
        }
    }

    fn group<F>(
        &self,
        items: &[Assessment<'_>],
        key: F,
        universe: &[String],
    ) -> Vec<AggregationBucket>
    where
        F: Fn(&Assessment<'_>) -> String,
    {
        let mut groups: BTreeMap<String, Vec<&ScoredRespondent>> = universe
            .iter()
            .map(|k| (k.clone(), Vec::new()))
            .collect();

        for item in items {
            groups.entry(key(item)).or_default().push(&item.scored);
        }

        groups
            .into_iter()
            .map(|(group_key, members)| self.bucket(group_key, members))
            .collect()
    }
}

/// Convert tier counts into one-decimal percentages summing to 100.0.
///
/// Each tier gets the floor of its exact share in tenths; leftover tenths go to
/// the largest remainders (ties to the lower tier). All zero when `n == 0`.
pub fn distribute_percentages(counts: &BTreeMap<RiskTier, u64>, n: u64) -> TierDistribution {
    if n == 0 {
        return counts.keys().map(|tier| (*tier, 0.0)).collect();
    }

    let mut shares: Vec<(RiskTier, u64, u64)> = counts
        .iter()
        .map(|(tier, count)| {
            let scaled = count * TENTHS_TOTAL;
            (*tier, scaled / n, scaled % n)
        })
        .collect();

    let assigned: u64 = shares.iter().map(|(_, tenths, _)| tenths).sum();
    let mut leftover = TENTHS_TOTAL.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|a, b| shares[*b].2.cmp(&shares[*a].2).then(shares[*a].0.cmp(&shares[*b].0)));
    for idx in order {
        if leftover == 0 {
            break;
        }
        if shares[idx].2 > 0 {
            shares[idx].1 += 1;
            leftover -= 1;
        }
    }

    shares
        .into_iter()
        .map(|(tier, tenths, _)| (tier, tenths as f64 / 10.0))
        .collect()
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
