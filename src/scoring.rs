//! Survey scoring
//!
//! Converts one respondent's 12 raw answers into a total score, a risk tier and
//! a risk-flag count. Two independent views of the same answers are kept:
//! - [`raw_sum`]: plain sum of all items, no reversal, used for the tier
//! - [`risk_flagged`]: items answered in the risk direction, where positively
//!   framed items count as risky when answered low
//!
//! Incomplete or out-of-range answer sets are never coerced; they come back as
//! an [`ExclusionReason`].

use crate::config::{RiskFlagConfig, TierTable};
use crate::types::{
    ExclusionReason, MacroCategory, RawResponseRecord, RiskTier, ScoredRespondent, ITEM_COUNT,
    MAX_ANSWER, MIN_ANSWER,
};
use std::collections::BTreeMap;

/// A complete, range-checked answer set (index 0 is item 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemAnswers([u8; ITEM_COUNT]);

impl ItemAnswers {
    /// Answer to a 1-based item number
    pub fn get(&self, item: u8) -> Option<u8> {
        usize::from(item)
            .checked_sub(1)
            .and_then(|idx| self.0.get(idx).copied())
    }

    pub fn as_array(&self) -> &[u8; ITEM_COUNT] {
        &self.0
    }
}

impl TryFrom<&BTreeMap<u8, i32>> for ItemAnswers {
    type Error = ExclusionReason;

    fn try_from(answers: &BTreeMap<u8, i32>) -> Result<Self, Self::Error> {
        if let Some(item) = answers
            .keys()
            .find(|item| **item == 0 || usize::from(**item) > ITEM_COUNT)
        {
            return Err(ExclusionReason::UnknownItem { item: *item });
        }

        if let Some((item, value)) = answers
            .iter()
            .find(|(_, value)| !(MIN_ANSWER..=MAX_ANSWER).contains(*value))
        {
            return Err(ExclusionReason::AnswerOutOfRange {
                item: *item,
                value: *value,
            });
        }

        let mut values = [0u8; ITEM_COUNT];
        let mut missing = Vec::new();
        for (idx, slot) in values.iter_mut().enumerate() {
            let item = (idx + 1) as u8;
            match answers.get(&item) {
                Some(value) => *slot = *value as u8,
                None => missing.push(item),
            }
        }

        if !missing.is_empty() {
            return Err(ExclusionReason::MissingItems { missing });
        }

        Ok(Self(values))
    }
}

/// Sum of all 12 answers with equal, non-negated weight (0-36)
pub fn raw_sum(answers: &ItemAnswers) -> u32 {
    answers.0.iter().map(|v| u32::from(*v)).sum()
}

/// Item numbers answered in the risk direction
///
/// Positively framed items are flagged when the answer is at or below
/// `positive_flag_max`; every other item when it is at or above
/// `negative_flag_min`.
pub fn risk_flagged(answers: &ItemAnswers, config: &RiskFlagConfig) -> Vec<u8> {
    answers
        .0
        .iter()
        .enumerate()
        .filter_map(|(idx, value)| {
            let item = (idx + 1) as u8;
            let value = i32::from(*value);
            let flagged = if config.positively_framed_items.contains(&item) {
                value <= config.positive_flag_max
            } else {
                value >= config.negative_flag_min
            };
            flagged.then_some(item)
        })
        .collect()
}

/// Score calculator holding the tier table and item framing
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    tiers: TierTable,
    risk_flags: RiskFlagConfig,
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::new(TierTable::score(), RiskFlagConfig::default())
    }
}

impl ScoreCalculator {
    pub fn new(tiers: TierTable, risk_flags: RiskFlagConfig) -> Self {
        Self { tiers, risk_flags }
    }

    /// Tier for a total score
    pub fn classify(&self, total_score: u32) -> RiskTier {
        self.tiers.classify(f64::from(total_score))
    }

    /// Score one record, or report why it cannot be scored
    pub fn score(
        &self,
        record: &RawResponseRecord,
        category: MacroCategory,
    ) -> Result<ScoredRespondent, ExclusionReason> {
        let answers = ItemAnswers::try_from(&record.answers)?;
        let total_score = raw_sum(&answers);

        Ok(ScoredRespondent {
            respondent_id: record.respondent_id.clone(),
            total_score,
            risk_tier: self.classify(total_score),
            risk_flag_count: risk_flagged(&answers, &self.risk_flags).len(),
            category,
            responded_at: record.responded_at,
        })
    }
}
