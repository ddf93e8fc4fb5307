//! Filter descriptor
//!
//! Narrows a snapshot before aggregation: attribute constraints
//! (field = any of a set of values), a response date range and age/tenure
//! ranges. All bounds are inclusive. A respondent missing an attribute that a
//! constraint names does not match, unless the constraint accepts
//! `"Unspecified"`.
//!
//! Response dates are compared as local calendar dates. The pipeline passes
//! the trend's UTC offset so that a date range and the weekly trend agree on
//! which day a response belongs to.

use crate::error::AnalyticsError;
use crate::types::{non_blank, Assessment, UNSPECIFIED_KEY};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute an [`AnalyticsFilter`] can constrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    /// Normalized macro-category label
    Category,
    Department,
    Role,
    Shift,
    Gender,
    ContractType,
    EducationLevel,
}

impl FilterField {
    fn value<'a>(&self, assessment: &'a Assessment<'_>) -> &'a str {
        let profile = assessment.profile;
        let raw = match self {
            FilterField::Category => return assessment.scored.category.label(),
            FilterField::Department => profile.department.as_deref(),
            FilterField::Role => profile.role.as_deref(),
            FilterField::Shift => profile.shift.as_deref(),
            FilterField::Gender => profile.gender.as_deref(),
            FilterField::ContractType => profile.contract_type.as_deref(),
            FilterField::EducationLevel => profile.education_level.as_deref(),
        };
        non_blank(raw).unwrap_or(UNSPECIFIED_KEY)
    }
}

/// Which respondents an analytics pass covers. The default matches everyone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsFilter {
    /// Field to accepted values; a respondent must match every field listed
    pub attributes: BTreeMap<FilterField, BTreeSet<String>>,
    /// First response date included (local calendar date)
    pub responded_from: Option<NaiveDate>,
    /// Last response date included (local calendar date)
    pub responded_to: Option<NaiveDate>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub min_tenure_years: Option<f64>,
    pub max_tenure_years: Option<f64>,
}

impl AnalyticsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `value` for `field` (in addition to values already accepted)
    pub fn with_attribute(mut self, field: FilterField, value: impl Into<String>) -> Self {
        self.attributes
            .entry(field)
            .or_default()
            .insert(value.into().trim().to_lowercase());
        self
    }

    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.responded_from = from;
        self.responded_to = to;
        self
    }

    pub fn with_age_range(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_age = min;
        self.max_age = max;
        self
    }

    pub fn with_tenure_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_tenure_years = min;
        self.max_tenure_years = max;
        self
    }

    /// True when no constraint is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Stable textual form, used as part of cache keys
    pub fn fingerprint(&self) -> Result<String, AnalyticsError> {
        serde_json::to_string(self).map_err(|e| {
            AnalyticsError::EncodingError(format!("Failed to fingerprint filter: {}", e))
        })
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        let invalid = |msg: &str| Err(AnalyticsError::InvalidConfig(format!("filter: {msg}")));

        if let (Some(from), Some(to)) = (self.responded_from, self.responded_to) {
            if from > to {
                return invalid("responded_from is after responded_to");
            }
        }
        if let (Some(min), Some(max)) = (self.min_age, self.max_age) {
            if min > max {
                return invalid("min_age is above max_age");
            }
        }
        for bound in [self.min_tenure_years, self.max_tenure_years].into_iter().flatten() {
            if !bound.is_finite() {
                return invalid("tenure bounds must be finite");
            }
        }
        if let (Some(min), Some(max)) = (self.min_tenure_years, self.max_tenure_years) {
            if min > max {
                return invalid("min_tenure_years is above max_tenure_years");
            }
        }
        if self.attributes.values().any(BTreeSet::is_empty) {
            return invalid("attribute constraint with no accepted values");
        }
        Ok(())
    }

    /// Whether one assessment passes every constraint, dates taken in UTC
    pub fn matches(&self, assessment: &Assessment<'_>) -> bool {
        self.matches_at_offset(assessment, 0)
    }

    /// Like [`Self::matches`], with response dates shifted by
    /// `utc_offset_minutes` before the date range is checked
    pub fn matches_at_offset(&self, assessment: &Assessment<'_>, utc_offset_minutes: i32) -> bool {
        self.matches_attributes(assessment)
            && self.matches_date(assessment, utc_offset_minutes)
            && self.matches_age(assessment)
            && self.matches_tenure(assessment)
    }

    fn matches_attributes(&self, assessment: &Assessment<'_>) -> bool {
        self.attributes.iter().all(|(field, accepted)| {
            let value = field.value(assessment).to_lowercase();
            accepted
                .iter()
                .any(|candidate| candidate.trim().to_lowercase() == value)
        })
    }

    fn matches_date(&self, assessment: &Assessment<'_>, utc_offset_minutes: i32) -> bool {
        let offset = Duration::minutes(i64::from(utc_offset_minutes));
        let date = (assessment.scored.responded_at + offset).date_naive();
        self.responded_from.map_or(true, |from| date >= from)
            && self.responded_to.map_or(true, |to| date <= to)
    }

    fn matches_age(&self, assessment: &Assessment<'_>) -> bool {
        if self.min_age.is_none() && self.max_age.is_none() {
            return true;
        }
        match assessment.profile.age {
            Some(age) => {
                self.min_age.map_or(true, |min| age >= min)
                    && self.max_age.map_or(true, |max| age <= max)
            }
            None => false,
        }
    }

    fn matches_tenure(&self, assessment: &Assessment<'_>) -> bool {
        if self.min_tenure_years.is_none() && self.max_tenure_years.is_none() {
            return true;
        }
        match assessment.profile.tenure_years.filter(|t| t.is_finite()) {
            Some(tenure) => {
                self.min_tenure_years.map_or(true, |min| tenure >= min)
                    && self.max_tenure_years.map_or(true, |max| tenure <= max)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MacroCategory, RespondentProfile, RiskTier, ScoredRespondent};
    use chrono::{TimeZone, Utc};

    fn make_profile() -> RespondentProfile {
        RespondentProfile {
            respondent_id: "r-1".to_string(),
            department: Some("Almacén Central".to_string()),
            shift: Some("Night".to_string()),
            gender: Some("Female".to_string()),
            age: Some(34),
            tenure_years: Some(4.5),
            ..Default::default()
        }
    }

    fn make_assessment(profile: &RespondentProfile) -> Assessment<'_> {
        Assessment {
            scored: ScoredRespondent {
                respondent_id: profile.respondent_id.clone(),
                total_score: 12,
                risk_tier: RiskTier::Moderate,
                risk_flag_count: 2,
                category: MacroCategory::LogisticsSupply,
                responded_at: Utc.with_ymd_and_hms(2024, 2, 10, 8, 30, 0).unwrap(),
            },
            profile,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everyone() {
        let profile = make_profile();
        let filter = AnalyticsFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&make_assessment(&profile)));
    }

    #[test]
    fn test_attribute_match_is_case_insensitive() {
        let profile = make_profile();
        let item = make_assessment(&profile);

        let filter = AnalyticsFilter::new()
            .with_attribute(FilterField::Shift, "NIGHT")
            .with_attribute(FilterField::Category, "logistics & supply");
        assert!(filter.matches(&item));

        let filter = AnalyticsFilter::new().with_attribute(FilterField::Shift, "Day");
        assert!(!filter.matches(&item));
    }

    #[test]
    fn test_any_of_accepted_values() {
        let profile = make_profile();
        let filter = AnalyticsFilter::new()
            .with_attribute(FilterField::Gender, "male")
            .with_attribute(FilterField::Gender, "female");
        assert!(filter.matches(&make_assessment(&profile)));
    }

    #[test]
    fn test_missing_attribute_matches_only_unspecified() {
        let profile = make_profile();
        let item = make_assessment(&profile);

        let filter = AnalyticsFilter::new().with_attribute(FilterField::ContractType, "permanent");
        assert!(!filter.matches(&item));

        let filter =
            AnalyticsFilter::new().with_attribute(FilterField::ContractType, "Unspecified");
        assert!(filter.matches(&item));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let profile = make_profile();
        let item = make_assessment(&profile);

        let filter = AnalyticsFilter::new()
            .with_date_range(Some(date(2024, 2, 10)), Some(date(2024, 2, 10)));
        assert!(filter.matches(&item));

        let filter = AnalyticsFilter::new().with_date_range(Some(date(2024, 2, 11)), None);
        assert!(!filter.matches(&item));

        let filter = AnalyticsFilter::new().with_date_range(None, Some(date(2024, 2, 9)));
        assert!(!filter.matches(&item));
    }

    #[test]
    fn test_date_range_uses_local_date() {
        let profile = make_profile();
        let mut item = make_assessment(&profile);
        // Sunday 23:00 UTC is already Monday at +02:00
        item.scored.responded_at = Utc.with_ymd_and_hms(2024, 1, 21, 23, 0, 0).unwrap();

        let last_week = AnalyticsFilter::new()
            .with_date_range(Some(date(2024, 1, 15)), Some(date(2024, 1, 21)));
        let this_week = AnalyticsFilter::new()
            .with_date_range(Some(date(2024, 1, 22)), Some(date(2024, 1, 28)));

        assert!(last_week.matches(&item));
        assert!(!this_week.matches(&item));
        assert!(!last_week.matches_at_offset(&item, 120));
        assert!(this_week.matches_at_offset(&item, 120));
        assert!(last_week.matches_at_offset(&item, -300));
    }

    #[test]
    fn test_age_and_tenure_ranges() {
        let profile = make_profile();
        let item = make_assessment(&profile);

        assert!(AnalyticsFilter::new()
            .with_age_range(Some(25), Some(34))
            .matches(&item));
        assert!(!AnalyticsFilter::new()
            .with_age_range(Some(35), None)
            .matches(&item));
        assert!(AnalyticsFilter::new()
            .with_tenure_range(Some(3.0), Some(5.0))
            .matches(&item));
        assert!(!AnalyticsFilter::new()
            .with_tenure_range(None, Some(4.0))
            .matches(&item));
    }

    #[test]
    fn test_range_excludes_missing_values() {
        let profile = RespondentProfile {
            respondent_id: "r-2".to_string(),
            ..Default::default()
        };
        let item = make_assessment(&profile);

        assert!(!AnalyticsFilter::new().with_age_range(Some(18), None).matches(&item));
        assert!(!AnalyticsFilter::new()
            .with_tenure_range(Some(0.0), None)
            .matches(&item));
    }

    #[test]
    fn test_validate() {
        assert!(AnalyticsFilter::new().validate().is_ok());
        assert!(AnalyticsFilter::new()
            .with_date_range(Some(date(2024, 3, 1)), Some(date(2024, 2, 1)))
            .validate()
            .is_err());
        assert!(AnalyticsFilter::new()
            .with_age_range(Some(50), Some(20))
            .validate()
            .is_err());
        assert!(AnalyticsFilter::new()
            .with_tenure_range(Some(f64::NAN), None)
            .validate()
            .is_err());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = AnalyticsFilter::new()
            .with_attribute(FilterField::Shift, "Night")
            .with_attribute(FilterField::Gender, "Female");
        let b = AnalyticsFilter::new()
            .with_attribute(FilterField::Gender, "female")
            .with_attribute(FilterField::Shift, "night");

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_ne!(
            a.fingerprint().unwrap(),
            AnalyticsFilter::new().fingerprint().unwrap()
        );
    }
}
