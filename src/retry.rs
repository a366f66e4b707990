//! Backoff and retry-eligibility policy for the refresh exchange.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Statuses worth retrying: throttling plus transient upstream failures.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Backoff/jitter schedule and retry-eligibility decisions.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
	/// Total attempts allowed, including the first.
	pub max_attempts: u32,
	/// HTTP statuses eligible for a retry.
	pub retryable_statuses: Vec<u16>,
	/// Delay before the second attempt; doubles per attempt thereafter.
	pub base_delay: Duration,
	/// Upper bound on the computed delay.
	pub max_delay: Duration,
	/// Perturbs each delay by up to ±20% to avoid synchronized retry storms.
	pub jitter: bool,
}
impl RetryPolicy {
	/// Holds iff `status` is retryable and attempts remain after `attempt` (1-based).
	pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
		self.retryable_statuses.contains(&status) && attempt < self.max_attempts
	}

	/// Delay before the attempt following `attempt` (1-based): exponential growth from
	/// the base, capped, optionally jittered.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(31);
		let grown = self
			.base_delay
			.saturating_mul(2_u32.saturating_pow(exponent))
			.min(self.max_delay);

		if !self.jitter || grown.is_zero() {
			return grown;
		}

		grown.mul_f64(rand::rng().random_range(0.8..=1.2))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(8),
			jitter: true,
		}
	}
}
