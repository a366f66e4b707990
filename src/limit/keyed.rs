//! Per-subject token buckets with idle eviction.

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	error::RateLimitError,
	limit::{RateLimitConfig, bucket::BucketState},
};

/// Configuration for [`KeyedRateLimiter`] housekeeping.
#[derive(Clone, Copy, Debug)]
pub struct KeyedLimiterConfig {
	/// Buckets untouched for longer than this are discarded by the sweep.
	pub idle_after: Duration,
	/// Period of the background idle-eviction sweep.
	pub sweep_interval: Duration,
}
impl Default for KeyedLimiterConfig {
	fn default() -> Self {
		Self { idle_after: Duration::from_secs(600), sweep_interval: Duration::from_secs(60) }
	}
}

struct Entry {
	state: BucketState,
	touched: Instant,
}

struct KeyedInner {
	config: RateLimitConfig,
	housekeeping: KeyedLimiterConfig,
	buckets: Mutex<HashMap<String, Entry>>,
}
impl KeyedInner {
	fn sweep(&self, now: Instant) {
		let idle_after = self.housekeeping.idle_after;

		self.buckets.lock().retain(|_, entry| now.saturating_duration_since(entry.touched) <= idle_after);
	}
}

/// One lazily created token bucket per subject key, sharing a single configuration.
///
/// Memory stays bounded for unboundedly many distinct subjects: a background sweep,
/// running on its own period, discards buckets untouched for longer than the configured
/// idle window. The sweep task holds only a weak reference and is aborted on drop, so
/// the limiter never keeps an otherwise-idle process alive.
///
/// Must be created inside a Tokio runtime.
pub struct KeyedRateLimiter {
	inner: Arc<KeyedInner>,
	sweeper: JoinHandle<()>,
}
impl KeyedRateLimiter {
	/// Creates a keyed limiter and spawns its idle-eviction sweep task.
	pub fn new(config: RateLimitConfig, housekeeping: KeyedLimiterConfig) -> Self {
		let inner = Arc::new(KeyedInner { config, housekeeping, buckets: Mutex::new(HashMap::new()) });
		let weak = Arc::downgrade(&inner);
		let sweeper = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(housekeeping.sweep_interval);

			// The first tick resolves immediately; skip it so sweeps start one period in.
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let Some(inner) = weak.upgrade() else { break };

				inner.sweep(Instant::now());
			}
		});

		Self { inner, sweeper }
	}

	/// Deducts `permits` from the subject's bucket, creating a full bucket on first use.
	pub fn consume(&self, key: &str, permits: f64) -> Result<(), RateLimitError> {
		let now = Instant::now();
		let mut buckets = self.inner.buckets.lock();
		let entry = buckets
			.entry(key.into())
			.or_insert_with(|| Entry { state: BucketState::new(&self.inner.config, now), touched: now });

		entry.touched = now;

		entry.state.try_consume(&self.inner.config, permits, now)
	}

	/// Availability check for the subject's bucket without mutating it; an unknown
	/// subject is a full bucket.
	pub fn can_consume(&self, key: &str, permits: f64) -> bool {
		let now = Instant::now();

		match self.inner.buckets.lock().get(key) {
			Some(entry) => entry.state.can_consume(&self.inner.config, permits, now),
			None => permits <= self.inner.config.capacity,
		}
	}

	/// Current token count for the subject after lazy refill.
	pub fn available(&self, key: &str) -> f64 {
		let now = Instant::now();

		match self.inner.buckets.lock().get_mut(key) {
			Some(entry) => entry.state.available(&self.inner.config, now),
			None => self.inner.config.capacity,
		}
	}

	/// Restores the subject's bucket to full capacity.
	pub fn reset(&self, key: &str) {
		let now = Instant::now();

		if let Some(entry) = self.inner.buckets.lock().get_mut(key) {
			entry.state.reset(&self.inner.config, now);
			entry.touched = now;
		}
	}

	/// Discards every tracked bucket.
	pub fn clear(&self) {
		self.inner.buckets.lock().clear();
	}

	/// Number of subjects currently holding a bucket.
	pub fn tracked_subjects(&self) -> usize {
		self.inner.buckets.lock().len()
	}

	/// Runs one idle-eviction pass immediately; normally driven by the sweep task.
	pub fn sweep_idle(&self) {
		self.inner.sweep(Instant::now());
	}
}
impl Drop for KeyedRateLimiter {
	fn drop(&mut self) {
		self.sweeper.abort();
	}
}
impl Debug for KeyedRateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeyedRateLimiter")
			.field("config", &self.inner.config)
			.field("tracked_subjects", &self.tracked_subjects())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn limiter(capacity: f64) -> KeyedRateLimiter {
		KeyedRateLimiter::new(
			RateLimitConfig { capacity, refill_rate: 1., refill_interval: Duration::from_secs(1) },
			KeyedLimiterConfig {
				idle_after: Duration::from_secs(60),
				sweep_interval: Duration::from_secs(10),
			},
		)
	}

	#[tokio::test(start_paused = true)]
	async fn budgets_are_independent_per_subject() {
		let limiter = limiter(1.);

		limiter.consume("alice", 1.).expect("Alice's first permit should be granted.");
		limiter.consume("bob", 1.).expect("Bob's budget should be untouched by Alice.");

		let err = limiter.consume("alice", 1.).expect_err("Alice's budget should be spent.");

		assert!(matches!(err, RateLimitError::Exhausted { .. }));
		assert_eq!(limiter.tracked_subjects(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn reset_and_clear_scope_correctly() {
		let limiter = limiter(1.);

		limiter.consume("alice", 1.).expect("Alice's first permit should be granted.");
		limiter.consume("bob", 1.).expect("Bob's first permit should be granted.");
		limiter.reset("alice");

		assert_eq!(limiter.available("alice"), 1.);
		assert_eq!(limiter.available("bob"), 0.);

		limiter.clear();

		assert_eq!(limiter.tracked_subjects(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn idle_buckets_are_evicted() {
		let limiter = limiter(2.);

		limiter.consume("alice", 1.).expect("Alice's first permit should be granted.");
		tokio::time::advance(Duration::from_secs(30)).await;
		limiter.consume("bob", 1.).expect("Bob's first permit should be granted.");
		tokio::time::advance(Duration::from_secs(45)).await;
		limiter.sweep_idle();

		// Alice has been idle for 75 s, Bob for 45 s; only Alice is discarded.
		assert_eq!(limiter.tracked_subjects(), 1);
		assert_eq!(limiter.available("alice"), 2.);
	}

	#[tokio::test(start_paused = true)]
	async fn background_sweep_runs_on_its_own_period() {
		let limiter = limiter(2.);

		limiter.consume("alice", 1.).expect("Alice's first permit should be granted.");
		// Past the idle window plus a sweep period; the spawned task evicts on its own.
		tokio::time::advance(Duration::from_secs(75)).await;
		tokio::task::yield_now().await;

		assert_eq!(limiter.tracked_subjects(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn unknown_subject_reports_full_budget() {
		let limiter = limiter(3.);

		assert!(limiter.can_consume("nobody", 3.));
		assert!(!limiter.can_consume("nobody", 4.));
		assert_eq!(limiter.available("nobody"), 3.);
		assert_eq!(limiter.tracked_subjects(), 0);
	}
}
