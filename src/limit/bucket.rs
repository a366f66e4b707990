//! Single token bucket with lazy, access-time refill.

// self
use crate::{_prelude::*, error::RateLimitError, limit::RateLimitConfig};

/// Mutable bucket state shared by [`TokenBucket`] and the keyed limiter's entries.
///
/// Refill is computed as a pure function of elapsed wall-clock time at the moment of
/// access: for each whole refill interval since the last computation, `refill_rate`
/// permits accrue, capped at capacity. No per-bucket timer exists.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BucketState {
	tokens: f64,
	last_refill: Instant,
}
impl BucketState {
	pub(crate) fn new(config: &RateLimitConfig, now: Instant) -> Self {
		Self { tokens: config.capacity, last_refill: now }
	}

	fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
		if config.refill_rate <= 0. || config.refill_interval.is_zero() {
			return;
		}

		let elapsed = now.saturating_duration_since(self.last_refill);
		let intervals = elapsed.as_nanos() / config.refill_interval.as_nanos();

		if intervals == 0 {
			return;
		}

		let replenished = self.tokens + intervals as f64 * config.refill_rate;

		if replenished >= config.capacity {
			self.tokens = config.capacity;
			// A full bucket accrues nothing, so the interval phase can restart here.
			self.last_refill = now;
		} else {
			self.tokens = replenished;
			self.last_refill += config.refill_interval * intervals as u32;
		}
	}

	/// Available permits after a hypothetical refill, without committing it.
	fn projected(&self, config: &RateLimitConfig, now: Instant) -> f64 {
		let mut probe = *self;

		probe.refill(config, now);

		probe.tokens
	}

	pub(crate) fn try_consume(
		&mut self,
		config: &RateLimitConfig,
		permits: f64,
		now: Instant,
	) -> Result<(), RateLimitError> {
		self.refill(config, now);

		if self.tokens + f64::EPSILON >= permits {
			self.tokens = (self.tokens - permits).max(0.);

			Ok(())
		} else {
			Err(RateLimitError::Exhausted {
				requested: permits,
				retry_after: retry_after(config, self.tokens, permits),
			})
		}
	}

	pub(crate) fn available(&mut self, config: &RateLimitConfig, now: Instant) -> f64 {
		self.refill(config, now);

		self.tokens
	}

	pub(crate) fn reset(&mut self, config: &RateLimitConfig, now: Instant) {
		self.tokens = config.capacity;
		self.last_refill = now;
	}

	pub(crate) fn can_consume(&self, config: &RateLimitConfig, permits: f64, now: Instant) -> bool {
		self.projected(config, now) + f64::EPSILON >= permits
	}
}

/// Time until the shortfall is replenished at the configured refill rate; `None` when the
/// bucket never refills.
fn retry_after(config: &RateLimitConfig, available: f64, requested: f64) -> Option<Duration> {
	if config.refill_rate <= 0. || config.refill_interval.is_zero() {
		return None;
	}

	let shortfall = requested - available;
	let intervals = (shortfall / config.refill_rate).ceil().max(1.);

	Some(config.refill_interval * intervals as u32)
}

/// Token-bucket admission control for a single shared budget.
///
/// Sharing one instance across subjects caps the upstream endpoint's total admitted call
/// rate regardless of which subject triggers a given call.
#[derive(Debug)]
pub struct TokenBucket {
	config: RateLimitConfig,
	state: Mutex<BucketState>,
}
impl TokenBucket {
	/// Creates a full bucket with the provided configuration.
	pub fn new(config: RateLimitConfig) -> Self {
		let state = Mutex::new(BucketState::new(&config, Instant::now()));

		Self { config, state }
	}

	/// Deducts `permits` tokens if available after lazy refill; otherwise fails with
	/// [`RateLimitError::Exhausted`] carrying the replenishment delay.
	pub fn consume(&self, permits: f64) -> Result<(), RateLimitError> {
		self.state.lock().try_consume(&self.config, permits, Instant::now())
	}

	/// Availability check identical to [`consume`](Self::consume) but without mutating
	/// bucket state.
	pub fn can_consume(&self, permits: f64) -> bool {
		self.state.lock().can_consume(&self.config, permits, Instant::now())
	}

	/// Current token count after lazy refill.
	pub fn available(&self) -> f64 {
		self.state.lock().available(&self.config, Instant::now())
	}

	/// Restores the bucket to full capacity.
	pub fn reset(&self) {
		self.state.lock().reset(&self.config, Instant::now());
	}

	/// Returns the bucket's configuration.
	pub fn config(&self) -> &RateLimitConfig {
		&self.config
	}
}
