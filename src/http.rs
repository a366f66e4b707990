//! Transport seam for the refresh wire exchange.
//!
//! The crate's only demand on an HTTP stack is "send this request, hand back status and
//! body". [`TokenTransport`] captures exactly that, so the refresher stays testable with
//! an in-process fake while production uses the feature-gated reqwest adapter.

// std
use std::ops::Deref;
// self
use crate::{_prelude::*, error::ExchangeError};

/// Boxed future returned by [`TokenTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, ExchangeError>> + 'a + Send>>;

/// HTTP capability consumed by the refresher: one POST, one status + body back.
pub trait TokenTransport
where
	Self: Send + Sync,
{
	/// Sends the refresh exchange request to `url`.
	///
	/// Implementations surface only transport-level failures (DNS, TCP, TLS) as errors;
	/// every HTTP response, success or not, resolves to a [`TransportResponse`] so the
	/// refresher owns the status-code policy.
	fn send<'a>(&'a self, url: &'a Url, body: &'a RefreshRequestBody) -> TransportFuture<'a>;
}

/// Status and raw body of a token-endpoint response.
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: u16,
	/// Raw response body.
	pub body: Vec<u8>,
}

/// Wire body of the refresh exchange.
#[derive(Clone, Serialize)]
pub struct RefreshRequestBody {
	/// Always `refresh_token`.
	pub grant_type: &'static str,
	/// Refresh credential being exchanged.
	pub refresh_token: String,
	/// OAuth client identifier.
	pub client_id: String,
	/// Optional confidential client secret.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub client_secret: Option<String>,
}
impl RefreshRequestBody {
	/// Builds the exchange body for the provided credential and client.
	pub fn new(
		refresh_token: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: Option<String>,
	) -> Self {
		Self {
			grant_type: "refresh_token",
			refresh_token: refresh_token.into(),
			client_id: client_id.into(),
			client_secret,
		}
	}
}
impl Debug for RefreshRequestBody {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshRequestBody")
			.field("grant_type", &self.grant_type)
			.field("refresh_token", &"<redacted>")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenTransport for ReqwestTransport {
	fn send<'a>(&'a self, url: &'a Url, body: &'a RefreshRequestBody) -> TransportFuture<'a> {
		Box::pin(async move {
			let response = self
				.0
				.post(url.clone())
				.json(body)
				.send()
				.await
				.map_err(ExchangeError::transport)?;
			let status = response.status().as_u16();
			let body = response.bytes().await.map_err(ExchangeError::transport)?.to_vec();

			Ok(TransportResponse { status, body })
		})
	}
}
