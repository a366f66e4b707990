//! Durable, atomic, permission-hardened credential persistence.

pub mod encrypted;
pub mod file;
pub mod memory;

pub use encrypted::{CipherError, EncryptedTokenStore, TokenCipher};
pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;

// self
use crate::{_prelude::*, token::TokenData};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for credential records, one record per subject.
///
/// The read path deliberately conflates "never written", "corrupted", and (for the
/// encrypted variant) "wrong decryption key" into one uniform absent result: the
/// caller's remedy is re-authentication, not error handling.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Returns the validated record for the profile, or `None`.
	///
	/// File absence, malformed content, and schema-validation failure are all
	/// indistinguishable to the caller.
	fn read<'a>(&'a self, profile: &'a str) -> StoreFuture<'a, Option<TokenData>>;

	/// Persists or replaces the profile's record atomically.
	fn write<'a>(&'a self, profile: &'a str, token: &'a TokenData) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
///
/// [`Permissions`](StoreError::Permissions) is distinct from [`Io`](StoreError::Io) so
/// callers can tell "couldn't persist at all" from "persisted but the security invariant
/// could not be verified".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failure surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Generic I/O failure while persisting.
	#[error("I/O error: {message}.")]
	Io {
		/// Human-readable error payload.
		message: String,
	},
	/// The record was persisted but the owner-only permission bits did not verify.
	#[error("Persisted `{path}` but could not verify owner-only permissions (mode {mode:o}).")]
	Permissions {
		/// Destination path.
		path: String,
		/// Mode bits observed after the rename.
		mode: u32,
	},
	/// Encryption failed while preparing the at-rest payload.
	#[error("Cipher error: {message}.")]
	Cipher {
		/// Human-readable error payload.
		message: String,
	},
}
