//! Immutable credential records and the redacting secret wrapper.

// self
use crate::{_prelude::*, error::ValidationError};

/// Token type issued by the refresh exchange; the only type this crate supports.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Immutable access/refresh credential pair.
///
/// Each successful refresh exchange produces a wholly new value that supersedes the prior
/// one; records are never mutated in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
	/// Short-lived access token; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Long-lived refresh token exchanged for the next access token.
	pub refresh_token: TokenSecret,
	/// Expiry instant in epoch milliseconds.
	pub expires_at: i64,
	/// Grant instant in epoch milliseconds.
	pub granted_at: i64,
	/// Granted scopes, order-preserving and deduplicated.
	pub scopes: Vec<String>,
	/// Token type; always [`TOKEN_TYPE_BEARER`].
	pub token_type: String,
	/// Device fingerprint captured at grant time.
	pub device_fingerprint: String,
}
impl TokenData {
	/// Creates a record stamped `granted_at = now` with a relative expiry.
	///
	/// `scopes` keeps first-occurrence order and drops duplicates.
	pub fn granted_now(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_in: Duration,
		scopes: impl IntoIterator<Item = impl Into<String>>,
		device_fingerprint: impl Into<String>,
	) -> Self {
		let granted_at = now_ms();
		let mut seen = Vec::new();

		for scope in scopes {
			let scope = scope.into();

			if !scope.is_empty() && !seen.contains(&scope) {
				seen.push(scope);
			}
		}

		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
			expires_at: granted_at + expires_in.as_millis() as i64,
			granted_at,
			scopes: seen,
			token_type: TOKEN_TYPE_BEARER.into(),
			device_fingerprint: device_fingerprint.into(),
		}
	}

	/// Checks the schema invariants: non-empty secrets, positive instants ordered
	/// `granted_at <= expires_at`, and the `Bearer` token type.
	pub fn validate(&self) -> Result<(), ValidationError> {
		if self.access_token.expose().is_empty() {
			return Err(ValidationError::EmptyAccessToken);
		}
		if self.refresh_token.expose().is_empty() {
			return Err(ValidationError::EmptyRefreshToken);
		}
		if self.expires_at <= 0 || self.granted_at <= 0 {
			return Err(ValidationError::NonPositiveInstant);
		}
		if self.granted_at > self.expires_at {
			return Err(ValidationError::GrantedAfterExpiry);
		}
		if self.token_type != TOKEN_TYPE_BEARER {
			return Err(ValidationError::UnsupportedTokenType {
				token_type: self.token_type.clone(),
			});
		}

		Ok(())
	}

	/// Returns `true` if the record has expired at the provided epoch-ms instant.
	pub fn is_expired_at(&self, instant_ms: i64) -> bool {
		instant_ms >= self.expires_at
	}

	/// Returns `true` if the record expires within `threshold` of the current clock.
	///
	/// This is the freshness check behind the manager's fast path; a record inside the
	/// window is treated as stale even though it is still technically usable.
	pub fn expires_within(&self, threshold: Duration) -> bool {
		now_ms() + threshold.as_millis() as i64 >= self.expires_at
	}
}
impl Debug for TokenData {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenData")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("granted_at", &self.granted_at)
			.field("scopes", &self.scopes)
			.field("token_type", &self.token_type)
			.field("device_fingerprint", &self.device_fingerprint)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn fixture() -> TokenData {
		TokenData::granted_now(
			"access",
			"refresh",
			Duration::from_secs(3600),
			["email", "profile", "email"],
			"fp-1",
		)
	}

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn granted_now_dedupes_scopes_and_expires_in_the_future() {
		let token = fixture();

		assert_eq!(token.scopes, vec!["email".to_string(), "profile".to_string()]);
		assert_eq!(token.token_type, TOKEN_TYPE_BEARER);
		assert!(token.expires_at > now_ms());
		assert!(token.granted_at <= token.expires_at);
		token.validate().expect("Freshly granted token should validate.");
	}

	#[test]
	fn validate_rejects_schema_violations() {
		let mut empty_access = fixture();

		empty_access.access_token = TokenSecret::new("");

		assert_eq!(empty_access.validate(), Err(ValidationError::EmptyAccessToken));

		let mut inverted = fixture();

		inverted.granted_at = inverted.expires_at + 1;

		assert_eq!(inverted.validate(), Err(ValidationError::GrantedAfterExpiry));

		let mut mac = fixture();

		mac.token_type = "MAC".into();

		assert_eq!(
			mac.validate(),
			Err(ValidationError::UnsupportedTokenType { token_type: "MAC".into() })
		);
	}

	#[test]
	fn freshness_window_flags_imminent_expiry() {
		let mut token = fixture();

		token.expires_at = now_ms() + 200_000;

		assert!(token.expires_within(Duration::from_secs(300)));
		assert!(!token.expires_within(Duration::from_secs(100)));
		assert!(!token.is_expired_at(now_ms()));
		assert!(token.is_expired_at(token.expires_at));
	}

	#[test]
	fn debug_never_leaks_secrets() {
		let mut token = fixture();

		token.access_token = TokenSecret::new("super-secret-value");

		let rendered = format!("{token:?}");

		assert!(!rendered.contains("super-secret-value"));
		assert!(rendered.contains("<redacted>"));
	}
}
