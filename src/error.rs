//! Crate-level error types shared across the lock, limiter, refresher, store, and manager.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Authentication-layer failure.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Exclusive-lock failure (timed out or queue full).
	#[error(transparent)]
	Lock(#[from] LockError),
	/// Rate-limit budget exhausted.
	#[error(transparent)]
	RateLimit(#[from] RateLimitError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Refresh-exchange failure (propagated after retries are exhausted).
	#[error(transparent)]
	Exchange(#[from] ExchangeError),
	/// Credential schema validation failure.
	#[error(transparent)]
	Validation(#[from] ValidationError),
}

/// Authentication failures surfaced by the manager and refresher.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// No refresh credential exists for the profile; re-authentication is required.
	#[error("No refresh credential is available for profile `{profile}`.")]
	MissingCredential {
		/// Profile the credential was requested for.
		profile: String,
	},
	/// The authorization-layer rate limiter refused the refresh attempt.
	#[error("Refresh rate limit exceeded for profile `{profile}`.")]
	RateLimitExceeded {
		/// Profile whose refresh was refused.
		profile: String,
		/// Time until the required permits are replenished, when computable.
		retry_after: Option<Duration>,
	},
}

/// Failures raised by [`QueuedMutex`](crate::lock::QueuedMutex).
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LockError {
	/// The waiter's deadline elapsed while it was still queued.
	#[error("Lock acquisition timed out after {waited:?}.")]
	Timeout {
		/// Duration the waiter spent queued before giving up.
		waited: Duration,
	},
	/// Enqueueing would exceed the configured queue bound.
	#[error("Lock wait queue is full ({capacity} waiters).")]
	QueueFull {
		/// Configured queue capacity.
		capacity: usize,
	},
}

/// Failures raised by the token-bucket rate limiters.
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum RateLimitError {
	/// The bucket holds fewer tokens than the request needs.
	#[error("Rate limit exceeded; {requested} permit(s) requested.")]
	Exhausted {
		/// Permits the caller asked for.
		requested: f64,
		/// Time until the shortfall is replenished at the configured refill rate;
		/// `None` when the refill rate is zero.
		retry_after: Option<Duration>,
	},
}

/// Failures raised during the refresh wire exchange.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Token endpoint answered 401; the refresh credential itself is invalid. Never retried.
	#[error("Token endpoint rejected the refresh credential (401).")]
	RefreshRejected,
	/// Token endpoint answered a non-retryable, non-success status.
	#[error("Token endpoint returned an unexpected status {status}: {message}.")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u16,
		/// Response body excerpt.
		message: String,
	},
	/// Every allowed attempt failed; carries the final error.
	#[error("Refresh failed after {attempts} attempt(s): {last}.")]
	RetriesExhausted {
		/// Attempts performed, including the first.
		attempts: u32,
		/// Final attempt's failure.
		#[source]
		last: BoxError,
	},
	/// Transport-level failure (DNS, TCP, TLS) with no HTTP status.
	#[error("Network error occurred while calling the token endpoint.")]
	Transport {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Token endpoint responded 2xx with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl ExchangeError {
	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Transport { source: Box::new(src) }
	}
}

/// Credential schema violations, surfaced only by explicit validation calls.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// Access token is empty.
	#[error("Access token must not be empty.")]
	EmptyAccessToken,
	/// Refresh token is empty.
	#[error("Refresh token must not be empty.")]
	EmptyRefreshToken,
	/// Expiry or grant instant is not a positive epoch-ms value.
	#[error("Credential instants must be positive epoch-millisecond values.")]
	NonPositiveInstant,
	/// Grant instant is later than the expiry instant.
	#[error("Credential was granted after its own expiry.")]
	GrantedAfterExpiry,
	/// Token type is not the supported `Bearer` constant.
	#[error("Unsupported token type `{token_type}`.")]
	UnsupportedTokenType {
		/// Offending token type value.
		token_type: String,
	},
}
