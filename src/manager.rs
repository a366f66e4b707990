//! Credential lifecycle orchestration: lock-free fast path, double-checked single-flight
//! refresh, and the background proactive-refresh scheduler.

// crates.io
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	error::AuthError,
	lock::{MutexConfig, QueuedMutex},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::TokenRefresher,
	store::TokenStore,
	token::TokenData,
};

/// Configuration for [`AuthManager`].
#[derive(Clone, Copy, Debug)]
pub struct AuthManagerConfig {
	/// A credential within this window of its expiry is treated as stale and refreshed.
	pub refresh_threshold: Duration,
	/// Cadence of the background proactive-refresh scheduler.
	pub background_interval: Duration,
	/// Configuration for the per-subject refresh lock.
	pub lock: MutexConfig,
}
impl Default for AuthManagerConfig {
	fn default() -> Self {
		Self {
			refresh_threshold: Duration::from_secs(300),
			background_interval: Duration::from_secs(60),
			lock: MutexConfig::default(),
		}
	}
}

/// Keeps one subject's credential pair valid.
///
/// There is no persistent state machine: validity is inferred from the store, and
/// "refreshing" from the lock. The mutex serializes every refresh for the subject, so
/// manual [`ensure_valid_token`](Self::ensure_valid_token) calls and background ticks can
/// never run two simultaneous exchanges; every concurrent caller observes either the
/// still-valid old credential or the fully persisted new one.
pub struct AuthManager {
	profile: String,
	store: Arc<dyn TokenStore>,
	refresher: Arc<TokenRefresher>,
	config: AuthManagerConfig,
	refresh_lock: QueuedMutex,
	refreshing: AtomicBool,
	background: Mutex<Option<JoinHandle<()>>>,
}
impl AuthManager {
	/// Creates a manager governing the provided profile.
	pub fn new(
		profile: impl Into<String>,
		store: Arc<dyn TokenStore>,
		refresher: Arc<TokenRefresher>,
		config: AuthManagerConfig,
	) -> Self {
		Self {
			profile: profile.into(),
			store,
			refresher,
			refresh_lock: QueuedMutex::new(config.lock),
			config,
			refreshing: AtomicBool::new(false),
			background: Mutex::new(None),
		}
	}

	/// Returns a valid credential, refreshing it first when stale.
	///
	/// The common case reads the store without touching the lock. A stale or absent
	/// record serializes through the refresh mutex, re-checks the store (another caller
	/// may have refreshed while this one queued), and only then performs the exchange
	/// and persists its result. The lock is released on every exit path.
	pub async fn ensure_valid_token(&self) -> Result<TokenData> {
		const KIND: FlowKind = FlowKind::EnsureValid;

		let span = FlowSpan::new(KIND, "ensure_valid_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				if let Some(current) = self.store.read(&self.profile).await?
					&& !current.expires_within(self.config.refresh_threshold)
				{
					return Ok(current);
				}

				let permit = self.refresh_lock.acquire().await?;
				let outcome = self.refresh_locked().await;

				permit.release();

				outcome
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn refresh_locked(&self) -> Result<TokenData> {
		// Double-check after winning the lock; the previous holder may have done the work.
		let current = match self.store.read(&self.profile).await? {
			Some(token) if !token.expires_within(self.config.refresh_threshold) =>
				return Ok(token),
			Some(token) => token,
			None =>
				return Err(AuthError::MissingCredential { profile: self.profile.clone() }.into()),
		};
		let _guard = RefreshingGuard::arm(&self.refreshing);
		let fresh = self
			.refresher
			.refresh(current.refresh_token.expose(), &current.scopes, &self.profile)
			.await?;

		self.store.write(&self.profile, &fresh).await?;

		Ok(fresh)
	}

	/// Starts the background proactive-refresh scheduler; a second start while already
	/// scheduled is a no-op.
	///
	/// Every tick invokes [`ensure_valid_token`](Self::ensure_valid_token); a failing
	/// tick is reported via [`obs`] and never stops subsequent ticks. The task holds
	/// only a weak reference to the manager and a spawned Tokio task does not keep an
	/// exiting process alive.
	pub fn start_background_refresh(self: &Arc<Self>) {
		let mut slot = self.background.lock();

		if slot.as_ref().is_some_and(|task| !task.is_finished()) {
			return;
		}

		let weak = Arc::downgrade(self);
		let interval = self.config.background_interval;

		*slot = Some(tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);

			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			// The first tick resolves immediately; the schedule starts one period in.
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let Some(manager) = weak.upgrade() else { break };

				obs::record_flow_outcome(FlowKind::Background, FlowOutcome::Attempt);

				match manager.ensure_valid_token().await {
					Ok(_) => obs::record_flow_outcome(FlowKind::Background, FlowOutcome::Success),
					Err(error) => {
						obs::record_flow_outcome(FlowKind::Background, FlowOutcome::Failure);
						obs::note_background_failure(&manager.profile, &error);
					},
				}
			}
		}));
	}

	/// Stops the background scheduler; safe to call when it was never started.
	pub fn stop_background_refresh(&self) {
		if let Some(task) = self.background.lock().take() {
			task.abort();
		}
	}

	/// Reports whether a refresh exchange is currently executing.
	pub fn is_refresh_in_progress(&self) -> bool {
		self.refreshing.load(Ordering::Acquire)
	}

	/// Subject this manager governs.
	pub fn profile_id(&self) -> &str {
		&self.profile
	}
}
impl Drop for AuthManager {
	fn drop(&mut self) {
		self.stop_background_refresh();
	}
}
impl Debug for AuthManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthManager")
			.field("profile", &self.profile)
			.field("config", &self.config)
			.field("refreshing", &self.is_refresh_in_progress())
			.finish()
	}
}

/// Clears the in-progress flag on every exit path, including cancellation.
struct RefreshingGuard<'a>(&'a AtomicBool);
impl<'a> RefreshingGuard<'a> {
	fn arm(flag: &'a AtomicBool) -> Self {
		flag.store(true, Ordering::Release);

		Self(flag)
	}
}
impl Drop for RefreshingGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{refresh::tests::ScriptedTransport, store::MemoryTokenStore};

	const SUCCESS_BODY: &str = r#"{
		"access_token": "access-new",
		"refresh_token": "refresh-new",
		"expires_in": 1800,
		"token_type": "Bearer",
		"scope": "email profile"
	}"#;

	fn build_manager(
		responses: impl IntoIterator<Item = (u16, &'static str)>,
		config: AuthManagerConfig,
	) -> (Arc<AuthManager>, Arc<ScriptedTransport>, Arc<MemoryTokenStore>) {
		let transport = Arc::new(ScriptedTransport::new(responses));
		let endpoint =
			Url::parse("https://auth.example.com/token").expect("Fixture URL should parse.");
		let refresher = Arc::new(
			TokenRefresher::new(endpoint, "client-1", transport.clone())
				.with_policy(crate::retry::RetryPolicy { jitter: false, ..Default::default() }),
		);
		let store = Arc::new(MemoryTokenStore::default());
		let manager =
			Arc::new(AuthManager::new("alice", store.clone(), refresher, config));

		(manager, transport, store)
	}

	async fn seed(store: &MemoryTokenStore, expires_in: Duration) {
		let token = TokenData::granted_now(
			"access-old",
			"refresh-old",
			expires_in,
			["email", "profile"],
			"fp-test",
		);

		store.write("alice", &token).await.expect("Memory write should never fail.");
	}

	#[tokio::test(start_paused = true)]
	async fn fast_path_skips_lock_and_wire() {
		let (manager, transport, store) =
			build_manager([(200, SUCCESS_BODY)], AuthManagerConfig::default());

		seed(&store, Duration::from_secs(3600)).await;

		let token = manager
			.ensure_valid_token()
			.await
			.expect("Fresh credential should be returned as-is.");

		assert_eq!(token.access_token.expose(), "access-old");
		assert_eq!(transport.calls(), 0);
		assert!(!manager.refresh_lock.is_locked());
	}

	#[tokio::test(start_paused = true)]
	async fn stale_credential_is_refreshed_once_and_persisted() {
		// Threshold 300 s, credential expiring in 200 s.
		let (manager, transport, store) =
			build_manager([(200, SUCCESS_BODY)], AuthManagerConfig::default());

		seed(&store, Duration::from_secs(200)).await;

		let token = manager
			.ensure_valid_token()
			.await
			.expect("Stale credential should be refreshed.");

		assert_eq!(transport.calls(), 1);
		assert_eq!(token.access_token.expose(), "access-new");
		assert!(token.expires_at > crate::_prelude::now_ms());

		let persisted = store
			.read("alice")
			.await
			.expect("Read should never error.")
			.expect("Refreshed credential should be persisted.");

		assert_eq!(persisted, token);
	}

	#[tokio::test(start_paused = true)]
	async fn missing_credential_is_an_authentication_failure() {
		let (manager, transport, _store) =
			build_manager([(200, SUCCESS_BODY)], AuthManagerConfig::default());
		let err = manager
			.ensure_valid_token()
			.await
			.expect_err("No stored credential should fail.");

		assert_eq!(transport.calls(), 0);
		assert!(matches!(err, Error::Auth(AuthError::MissingCredential { .. })));
		assert!(!manager.refresh_lock.is_locked());
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_callers_share_a_single_exchange() {
		let (manager, transport, store) =
			build_manager([(200, SUCCESS_BODY)], AuthManagerConfig::default());

		seed(&store, Duration::from_secs(10)).await;

		let mut callers = Vec::new();

		for _ in 0..8 {
			let manager = manager.clone();

			callers.push(tokio::spawn(async move { manager.ensure_valid_token().await }));
		}

		let mut tokens = Vec::new();

		for caller in callers {
			tokens.push(
				caller
					.await
					.expect("Caller task should not panic.")
					.expect("Every concurrent caller should resolve."),
			);
		}

		// Exactly one exchange; every caller observes the same new credential.
		assert_eq!(transport.calls(), 1);

		for token in &tokens {
			assert_eq!(token.access_token.expose(), "access-new");
		}
	}

	#[tokio::test(start_paused = true)]
	async fn refresher_failure_releases_the_lock() {
		let (manager, transport, store) =
			build_manager([(400, "invalid_request")], AuthManagerConfig::default());

		seed(&store, Duration::from_secs(10)).await;

		manager
			.ensure_valid_token()
			.await
			.expect_err("Non-retryable exchange failure should propagate.");

		assert_eq!(transport.calls(), 1);
		assert!(!manager.refresh_lock.is_locked());
		assert!(!manager.is_refresh_in_progress());

		// The stale-but-valid credential is untouched.
		let persisted = store
			.read("alice")
			.await
			.expect("Read should never error.")
			.expect("Old credential should survive a failed refresh.");

		assert_eq!(persisted.access_token.expose(), "access-old");
	}

	#[tokio::test(start_paused = true)]
	async fn background_scheduler_refreshes_and_survives_failures() {
		let config = AuthManagerConfig {
			background_interval: Duration::from_secs(1),
			..Default::default()
		};
		let (manager, transport, store) = build_manager([(200, SUCCESS_BODY)], config);

		manager.start_background_refresh();
		// Idempotent: a second start while scheduled is a no-op.
		manager.start_background_refresh();

		// Let the task register its interval before the clock moves.
		tokio::task::yield_now().await;

		// Two ticks fail with MissingCredential; the scheduler keeps going.
		tokio::time::advance(Duration::from_millis(2_100)).await;
		tokio::task::yield_now().await;

		assert_eq!(transport.calls(), 0);

		seed(&store, Duration::from_secs(10)).await;
		tokio::time::advance(Duration::from_secs(1)).await;
		tokio::task::yield_now().await;

		assert_eq!(transport.calls(), 1);

		let persisted = store
			.read("alice")
			.await
			.expect("Read should never error.")
			.expect("Background tick should persist the refreshed credential.");

		assert_eq!(persisted.access_token.expose(), "access-new");

		manager.stop_background_refresh();
		// Safe to stop twice.
		manager.stop_background_refresh();
	}

	#[tokio::test(start_paused = true)]
	async fn accessors_reflect_profile_and_idle_state() {
		let (manager, _transport, _store) =
			build_manager([(200, SUCCESS_BODY)], AuthManagerConfig::default());

		assert_eq!(manager.profile_id(), "alice");
		assert!(!manager.is_refresh_in_progress());
	}
}
