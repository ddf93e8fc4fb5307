//! Caller-side recompute scheduler
//!
//! Coalesces upstream change notifications into a single recomputation. A
//! batch of changes fires once no new change has arrived for the quiet period,
//! or once the maximum delay since the batch's first change has passed,
//! whichever comes first. The caller drives it by calling
//! [`RecomputeScheduler::poll`] with the current time; nothing here owns a
//! timer or a thread.
//!
//! Results of a superseded ticket are not cancelled, only recognised as stale
//! through [`RecomputeScheduler::is_current`].

use crate::error::AnalyticsError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default quiet period in milliseconds
pub const DEFAULT_QUIET_PERIOD_MS: i64 = 1_000;

/// Default maximum delay in milliseconds
pub const DEFAULT_MAX_DELAY_MS: i64 = 5_000;

/// Coalescing policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fire after this long without a new change
    pub quiet_period_ms: i64,
    /// Fire at the latest this long after the first change of a batch
    pub max_delay_ms: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.quiet_period_ms <= 0 {
            return Err(AnalyticsError::InvalidConfig(
                "quiet_period_ms must be positive".to_string(),
            ));
        }
        if self.max_delay_ms < self.quiet_period_ms {
            return Err(AnalyticsError::InvalidConfig(format!(
                "max_delay_ms ({}) must be at least quiet_period_ms ({})",
                self.max_delay_ms, self.quiet_period_ms
            )));
        }
        Ok(())
    }
}

/// Permission to run one recomputation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeTicket {
    pub id: Uuid,
    /// Newest snapshot version among the coalesced changes
    pub snapshot_version: u64,
    /// Number of change notifications folded into this ticket
    pub coalesced_events: usize,
    pub first_change_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingBatch {
    first_change_at: DateTime<Utc>,
    last_change_at: DateTime<Utc>,
    events: usize,
    snapshot_version: u64,
}

/// Debouncing scheduler owned by the caller layer
#[derive(Debug, Clone, Default)]
pub struct RecomputeScheduler {
    config: SchedulerConfig,
    pending: Option<PendingBatch>,
    /// Most recently issued ticket and its snapshot version
    latest: Option<(Uuid, u64)>,
    in_flight: bool,
}

impl RecomputeScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Default::default()
        })
    }

    /// Record one upstream change
    pub fn notify_change(&mut self, snapshot_version: u64, now: DateTime<Utc>) {
        match self.pending.as_mut() {
            Some(batch) => {
                batch.last_change_at = now;
                batch.events += 1;
                batch.snapshot_version = batch.snapshot_version.max(snapshot_version);
            }
            None => {
                self.pending = Some(PendingBatch {
                    first_change_at: now,
                    last_change_at: now,
                    events: 1,
                    snapshot_version,
                });
            }
        }
    }

    /// When the pending batch will fire, if there is one
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending.as_ref().map(|batch| {
            let quiet = batch.last_change_at + Duration::milliseconds(self.config.quiet_period_ms);
            let max = batch.first_change_at + Duration::milliseconds(self.config.max_delay_ms);
            quiet.min(max)
        })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Issue a ticket when the pending batch is due
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<RecomputeTicket> {
        let deadline = self.next_deadline()?;
        if now < deadline {
            return None;
        }
        let batch = self.pending.take()?;

        if self.in_flight {
            if let Some((previous, version)) = self.latest {
                warn!(
                    ticket = %previous,
                    snapshot_version = version,
                    "recompute ticket superseded before completion"
                );
            }
        }

        let ticket = RecomputeTicket {
            id: Uuid::new_v4(),
            snapshot_version: batch.snapshot_version,
            coalesced_events: batch.events,
            first_change_at: batch.first_change_at,
            issued_at: now,
        };
        debug!(
            ticket = %ticket.id,
            snapshot_version = ticket.snapshot_version,
            coalesced_events = ticket.coalesced_events,
            "recompute ticket issued"
        );

        self.latest = Some((ticket.id, ticket.snapshot_version));
        self.in_flight = true;
        Some(ticket)
    }

    /// Whether results computed for `ticket` are still the newest wanted.
    ///
    /// False once a later ticket was issued, or once a change for a newer
    /// snapshot is waiting.
    pub fn is_current(&self, ticket: &RecomputeTicket) -> bool {
        let latest = matches!(self.latest, Some((id, _)) if id == ticket.id);
        let newer_pending = self
            .pending
            .as_ref()
            .is_some_and(|batch| batch.snapshot_version > ticket.snapshot_version);
        latest && !newer_pending
    }

    /// Mark a ticket's computation finished. Returns [`Self::is_current`].
    pub fn complete(&mut self, ticket: &RecomputeTicket) -> bool {
        let current = self.is_current(ticket);
        if matches!(self.latest, Some((id, _)) if id == ticket.id) {
            self.in_flight = false;
        }
        current
    }
}
