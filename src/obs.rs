//! Observability helpers and collaborator interfaces for refresh flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `token_keeper.flow` with the `flow`
//!   and `stage` fields, plus per-tick warnings from the background scheduler.
//! - Enable `metrics` to increment the `token_keeper_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.
//!
//! Independently of both features, callers may attach a [`MetricsSink`] to the refresher
//! to receive one [`RefreshMetric`] per terminal refresh resolution.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// One record per refresh attempt resolution, delivered to the [`MetricsSink`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshMetric {
	/// Resolution instant in epoch milliseconds.
	pub timestamp: i64,
	/// Whether the refresh ultimately succeeded.
	pub success: bool,
	/// Elapsed time since the refresh call began.
	pub latency: Duration,
	/// Subject the refresh ran for.
	pub profile: String,
	/// Retries performed, i.e. attempts minus one.
	pub retry_count: u32,
	/// Stable error code on failure.
	pub error_code: Option<String>,
	/// Free-form annotations.
	pub tags: Option<BTreeMap<String, String>>,
}

/// Sink receiving one [`RefreshMetric`] per terminal refresh resolution.
///
/// Implementations own retention and must not block: `record` is called from inside the
/// refresh path.
pub trait MetricsSink
where
	Self: Send + Sync,
{
	/// Accepts a resolved refresh metric.
	fn record(&self, metric: RefreshMetric);
}

/// Credential flows observed by this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Caller-driven `ensure_valid_token` path.
	EnsureValid,
	/// Refresh wire exchange.
	Refresh,
	/// Background proactive-refresh scheduler tick.
	Background,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::EnsureValid => "ensure_valid",
			FlowKind::Refresh => "refresh",
			FlowKind::Background => "background",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
