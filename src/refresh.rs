//! Refresh exchange orchestration: rate-limit gate, retry/backoff, metric emission.
//!
//! [`TokenRefresher`] owns one terminal resolution per call: it consumes a rate-limit
//! permit (when a limiter is attached), performs the wire exchange under the retry
//! policy, and emits exactly one [`RefreshMetric`] whether the call succeeds, is
//! throttled, or exhausts its attempts.

// self
use crate::{
	_prelude::*,
	error::{AuthError, ExchangeError, RateLimitError},
	http::{RefreshRequestBody, TokenTransport, TransportResponse},
	limit::TokenBucket,
	obs::{MetricsSink, RefreshMetric},
	retry::RetryPolicy,
	token::TokenData,
};

/// Device fingerprint collaborator consulted once per successful exchange.
pub trait FingerprintProvider
where
	Self: Send + Sync,
{
	/// Produces the fingerprint string stamped into new credentials.
	fn fingerprint(&self) -> String;
}

/// Fixed fingerprint, for hosts whose identity string is composed elsewhere.
#[derive(Clone, Debug)]
pub struct StaticFingerprint(String);
impl StaticFingerprint {
	/// Wraps a precomposed fingerprint string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}
}
impl FingerprintProvider for StaticFingerprint {
	fn fingerprint(&self) -> String {
		self.0.clone()
	}
}

/// Success body of the refresh exchange.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
	access_token: String,
	refresh_token: String,
	expires_in: u64,
	#[serde(default)]
	scope: String,
}

/// Performs the refresh exchange, gated by an optional rate limiter and governed by a
/// [`RetryPolicy`].
pub struct TokenRefresher {
	endpoint: Url,
	client_id: String,
	client_secret: Option<String>,
	transport: Arc<dyn TokenTransport>,
	policy: RetryPolicy,
	limiter: Option<Arc<TokenBucket>>,
	metrics: Option<Arc<dyn MetricsSink>>,
	fingerprint: Arc<dyn FingerprintProvider>,
}
impl TokenRefresher {
	/// Creates a refresher for the provided token endpoint, client identifier, and
	/// transport, with the default retry policy and no limiter or metrics sink.
	pub fn new(
		endpoint: Url,
		client_id: impl Into<String>,
		transport: Arc<dyn TokenTransport>,
	) -> Self {
		Self {
			endpoint,
			client_id: client_id.into(),
			client_secret: None,
			transport,
			policy: RetryPolicy::default(),
			limiter: None,
			metrics: None,
			fingerprint: Arc::new(StaticFingerprint::new("unknown-device")),
		}
	}

	/// Sets or replaces the confidential client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the retry policy.
	pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Attaches a rate limiter consulted before every exchange.
	///
	/// Sharing one bucket across refreshers caps the endpoint's total admitted call rate
	/// regardless of which subject triggers a given call.
	pub fn with_rate_limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
		self.limiter = Some(limiter);

		self
	}

	/// Attaches a metrics sink receiving one record per terminal resolution.
	pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
		self.metrics = Some(metrics);

		self
	}

	/// Replaces the fingerprint collaborator.
	pub fn with_fingerprint(mut self, fingerprint: Arc<dyn FingerprintProvider>) -> Self {
		self.fingerprint = fingerprint;

		self
	}

	/// Exchanges `refresh_token` for a new credential pair.
	///
	/// A rate-limit refusal fails immediately with [`AuthError::RateLimitExceeded`] and
	/// is never retried here; a 401 fails immediately with
	/// [`ExchangeError::RefreshRejected`]; retryable statuses and transport failures are
	/// retried under the policy's backoff until attempts run out.
	pub async fn refresh(
		&self,
		refresh_token: &str,
		scopes: &[String],
		profile: &str,
	) -> Result<TokenData> {
		let started = Instant::now();

		if let Some(limiter) = &self.limiter
			&& let Err(RateLimitError::Exhausted { retry_after, .. }) = limiter.consume(1.)
		{
			self.emit(profile, false, 1, Some("rate_limited"), started);

			return Err(AuthError::RateLimitExceeded { profile: profile.into(), retry_after }.into());
		}

		let body =
			RefreshRequestBody::new(refresh_token, &self.client_id, self.client_secret.clone());
		let mut attempt = 1_u32;

		loop {
			let failure = match self.transport.send(&self.endpoint, &body).await {
				Ok(response) if (200..300).contains(&response.status) =>
					match self.build_token(&response, scopes) {
						Ok(token) => {
							self.emit(profile, true, attempt, None, started);

							return Ok(token);
						},
						Err(err) => {
							self.emit(profile, false, attempt, Some("malformed_response"), started);

							return Err(err.into());
						},
					},
				Ok(response) if response.status == 401 => {
					self.emit(profile, false, attempt, Some("unauthorized"), started);

					return Err(ExchangeError::RefreshRejected.into());
				},
				Ok(response) => ExchangeError::UnexpectedStatus {
					status: response.status,
					message: body_excerpt(&response.body),
				},
				Err(err) => err,
			};
			// Transport failures carry no status; they share the retry budget.
			let eligible = match &failure {
				ExchangeError::UnexpectedStatus { status, .. } =>
					self.policy.retryable_statuses.contains(status),
				ExchangeError::Transport { .. } => true,
				_ => false,
			};

			if eligible && attempt < self.policy.max_attempts {
				tokio::time::sleep(self.policy.delay_for(attempt)).await;

				attempt += 1;

				continue;
			}
			if eligible {
				self.emit(profile, false, attempt, Some("retries_exhausted"), started);

				return Err(ExchangeError::RetriesExhausted {
					attempts: attempt,
					last: Box::new(failure),
				}
				.into());
			}

			self.emit(profile, false, attempt, Some("unexpected_status"), started);

			return Err(failure.into());
		}
	}

	fn build_token(
		&self,
		response: &TransportResponse,
		requested_scopes: &[String],
	) -> Result<TokenData, ExchangeError> {
		let deserializer = &mut serde_json::Deserializer::from_slice(&response.body);
		let body: TokenEndpointResponse = serde_path_to_error::deserialize(deserializer)
			.map_err(|source| ExchangeError::MalformedResponse { source })?;
		let scopes: Vec<String> = if body.scope.trim().is_empty() {
			// Providers may omit the scope echo; the grant keeps what was requested.
			requested_scopes.to_vec()
		} else {
			body.scope.split_whitespace().map(Into::into).collect()
		};

		Ok(TokenData::granted_now(
			body.access_token,
			body.refresh_token,
			Duration::from_secs(body.expires_in),
			scopes,
			self.fingerprint.fingerprint(),
		))
	}

	fn emit(
		&self,
		profile: &str,
		success: bool,
		attempts: u32,
		error_code: Option<&str>,
		started: Instant,
	) {
		if let Some(metrics) = &self.metrics {
			metrics.record(RefreshMetric {
				timestamp: now_ms(),
				success,
				latency: started.elapsed(),
				profile: profile.into(),
				retry_count: attempts.saturating_sub(1),
				error_code: error_code.map(Into::into),
				tags: None,
			});
		}
	}
}
impl Debug for TokenRefresher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRefresher")
			.field("endpoint", &self.endpoint.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("policy", &self.policy)
			.field("rate_limited", &self.limiter.is_some())
			.finish()
	}
}

fn body_excerpt(body: &[u8]) -> String {
	const MAX: usize = 256;

	let text = String::from_utf8_lossy(body);

	text.chars().take(MAX).collect()
}
