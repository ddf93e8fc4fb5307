//! Time-trend aggregation
//!
//! Buckets scored respondents into ISO calendar weeks (or runs of N weeks) by
//! response timestamp and reports count, mean score and high-risk share per
//! bucket. Empty buckets are omitted; callers needing a dense axis fill gaps
//! themselves.

use crate::aggregate::round_to;
use crate::config::TrendConfig;
use crate::types::{ScoredRespondent, TimeTrendPoint};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Per-bucket running totals
#[derive(Debug, Default)]
struct WeekAccumulator {
    count: usize,
    score_sum: u64,
    high_risk: usize,
}

/// Weekly trend aggregator
#[derive(Debug, Clone, Default)]
pub struct TrendAggregator {
    config: TrendConfig,
}

impl TrendAggregator {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Local calendar date of a timestamp after the configured UTC offset
    pub fn local_date(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        (timestamp + Duration::minutes(i64::from(self.config.utc_offset_minutes))).date_naive()
    }

    /// Monday that opens the bucket containing `date`.
    ///
    /// Multi-week buckets are aligned on a fixed Monday grid (0001-01-01 is a
    /// Monday), so bucket boundaries do not depend on which dates are present.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        let week_start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
        let weeks_per_bucket = i64::from(self.config.weeks_per_bucket.max(1));
        let week_index = i64::from(week_start.num_days_from_ce() - 1).div_euclid(7);
        week_start - Duration::weeks(week_index.rem_euclid(weeks_per_bucket))
    }

    /// One point per non-empty bucket, oldest first
    pub fn weekly<'s, I>(&self, items: I) -> Vec<TimeTrendPoint>
    where
        I: IntoIterator<Item = &'s ScoredRespondent>,
    {
        let mut buckets: BTreeMap<NaiveDate, WeekAccumulator> = BTreeMap::new();

        for item in items {
            let start = self.bucket_start(self.local_date(item.responded_at));
            let acc = buckets.entry(start).or_default();
            acc.count += 1;
            acc.score_sum += u64::from(item.total_score);
            if item.risk_tier.is_high_risk() {
                acc.high_risk += 1;
            }
        }

        let span_days = i64::from(self.config.weeks_per_bucket.max(1)) * 7 - 1;

        buckets
            .into_iter()
            .map(|(start, acc)| {
                let iso = start.iso_week();
                let n = acc.count as f64;
                TimeTrendPoint {
                    week: format!("{}-W{:02}", iso.year(), iso.week()),
                    start_date: start,
                    end_date: start + Duration::days(span_days),
                    respondent_count: acc.count,
                    average_score: round_to(acc.score_sum as f64 / n, 2),
                    percent_high_risk: round_to(acc.high_risk as f64 / n * 100.0, 1),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MacroCategory, RiskTier};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn make_scored(
        day: (i32, u32, u32),
        hour: u32,
        total_score: u32,
        risk_tier: RiskTier,
    ) -> ScoredRespondent {
        ScoredRespondent {
            respondent_id: format!("r-{}-{}-{}-{hour}", day.0, day.1, day.2),
            total_score,
            risk_tier,
            risk_flag_count: 0,
            category: MacroCategory::Management,
            responded_at: Utc.with_ymd_and_hms(day.0, day.1, day.2, hour, 0, 0).unwrap(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_points() {
        let items = vec![
            // 2024-W03: Mon 15 Jan .. Sun 21 Jan
            make_scored((2024, 1, 15), 9, 10, RiskTier::Moderate),
            make_scored((2024, 1, 21), 23, 30, RiskTier::VeryHigh),
            // 2024-W05
            make_scored((2024, 1, 31), 12, 20, RiskTier::High),
        ];

        let points = TrendAggregator::default().weekly(&items);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].week, "2024-W03");
        assert_eq!(points[0].start_date, date(2024, 1, 15));
        assert_eq!(points[0].end_date, date(2024, 1, 21));
        assert_eq!(points[0].respondent_count, 2);
        assert!((points[0].average_score - 20.0).abs() < 1e-9);
        assert!((points[0].percent_high_risk - 50.0).abs() < 1e-9);

        // W04 is empty and omitted
        assert_eq!(points[1].week, "2024-W05");
        assert!((points[1].percent_high_risk - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_points_are_chronological() {
        let items = vec![
            make_scored((2024, 3, 4), 9, 5, RiskTier::Low),
            make_scored((2023, 12, 27), 9, 5, RiskTier::Low),
            make_scored((2024, 1, 2), 9, 5, RiskTier::Low),
        ];

        let points = TrendAggregator::default().weekly(&items);
        let weeks: Vec<&str> = points.iter().map(|p| p.week.as_str()).collect();
        assert_eq!(weeks, vec!["2023-W52", "2024-W01", "2024-W10"]);
    }

    #[test]
    fn test_iso_year_boundary() {
        // 2020-12-31 falls in 2020-W53, 2021-01-03 too
        let items = vec![
            make_scored((2020, 12, 31), 9, 5, RiskTier::Low),
            make_scored((2021, 1, 3), 9, 5, RiskTier::Low),
        ];

        let points = TrendAggregator::default().weekly(&items);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].week, "2020-W53");
        assert_eq!(points[0].start_date, date(2020, 12, 28));
    }

    #[test]
    fn test_utc_offset_moves_late_responses() {
        // Sunday 23:00 UTC is Monday 01:00 at UTC+2
        let items = vec![make_scored((2024, 1, 21), 23, 5, RiskTier::Low)];

        let utc = TrendAggregator::default().weekly(&items);
        assert_eq!(utc[0].week, "2024-W03");

        let shifted = TrendAggregator::new(TrendConfig {
            utc_offset_minutes: 120,
            ..Default::default()
        })
        .weekly(&items);
        assert_eq!(shifted[0].week, "2024-W04");
    }

    #[test]
    fn test_multi_week_buckets_are_aligned() {
        let aggregator = TrendAggregator::new(TrendConfig {
            weeks_per_bucket: 2,
            ..Default::default()
        });

        let a = aggregator.bucket_start(date(2024, 1, 17));
        let b = aggregator.bucket_start(date(2024, 1, 24));
        let c = aggregator.bucket_start(date(2024, 1, 31));

        assert_eq!(a.weekday(), chrono::Weekday::Mon);
        assert!(a == b || b == c);
        assert_ne!(a, c);

        let points = aggregator.weekly(&[
            make_scored((2024, 1, 17), 9, 6, RiskTier::Low),
            make_scored((2024, 1, 24), 9, 12, RiskTier::Moderate),
        ]);
        let total: usize = points.iter().map(|p| p.respondent_count).sum();
        assert_eq!(total, 2);
        for point in &points {
            assert_eq!((point.end_date - point.start_date).num_days(), 13);
        }
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<ScoredRespondent> = Vec::new();
        assert!(TrendAggregator::default().weekly(&items).is_empty());
    }
}
