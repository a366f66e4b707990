//! Token-bucket admission control, with a keyed variant for per-subject budgets.

pub mod bucket;
pub mod keyed;

pub use bucket::TokenBucket;
pub use keyed::{KeyedLimiterConfig, KeyedRateLimiter};

// self
use crate::_prelude::*;

/// Token-bucket configuration shared by [`TokenBucket`] and [`KeyedRateLimiter`].
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
	/// Maximum number of permits the bucket can hold.
	pub capacity: f64,
	/// Permits added per elapsed [`refill_interval`](Self::refill_interval).
	pub refill_rate: f64,
	/// Interval at which [`refill_rate`](Self::refill_rate) permits accrue.
	pub refill_interval: Duration,
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self { capacity: 10., refill_rate: 1., refill_interval: Duration::from_secs(1) }
	}
}
