//! psyrisk - Analytics engine for psychosocial risk survey dashboards
//!
//! Turns a snapshot of 12-item survey responses and respondent profiles into
//! the structures an organizational dashboard renders, through a deterministic
//! pipeline: category normalization → scoring → aggregation → heatmap,
//! correlation and weekly trend.
//!
//! ## Modules
//!
//! - **Engine**: pure, synchronous stages driven by [`AnalyticsEngine`]
//! - **Caller layer**: [`ResultCache`] and [`RecomputeScheduler`] for hosts that
//!   recompute on upstream change notifications

pub mod aggregate;
pub mod cache;
pub mod category;
pub mod config;
pub mod correlation;
pub mod error;
pub mod filter;
pub mod heatmap;
pub mod pipeline;
pub mod scheduler;
pub mod scoring;
pub mod snapshot;
pub mod trend;
pub mod types;

pub use aggregate::{Aggregator, GroupDimension};
pub use cache::{CacheKey, ResultCache};
pub use category::{CategoryNormalizer, CategoryRuleTable};
pub use config::{EngineConfig, TierTable, TierWeights};
pub use correlation::{pearson, CorrelationAnalyzer, CorrelationPairSpec, Variable};
pub use error::AnalyticsError;
pub use filter::{AnalyticsFilter, FilterField};
pub use heatmap::HeatmapBuilder;
pub use pipeline::{survey_to_dashboard_json, AnalyticsEngine, DashboardReport};
pub use scheduler::{RecomputeScheduler, RecomputeTicket, SchedulerConfig};
pub use scoring::{raw_sum, risk_flagged, ScoreCalculator};
pub use snapshot::{parse_snapshot, Snapshot, SnapshotEntry};
pub use trend::TrendAggregator;

/// Engine version embedded in every dashboard report
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
