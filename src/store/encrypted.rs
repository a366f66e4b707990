//! At-rest encryption wrapper over the file store.
//!
//! The encryption primitive itself is an external capability expressed by
//! [`TokenCipher`]; this module only guarantees that, when a passphrase is configured,
//! plaintext credential material never touches disk.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
// self
use crate::{
	_prelude::*,
	store::{FileTokenStore, StoreError, StoreFuture, TokenStore},
	token::TokenData,
};

/// Error produced by [`TokenCipher`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct CipherError {
	/// Human-readable error payload.
	pub message: String,
}
impl CipherError {
	/// Wraps a message into a cipher error.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// External capability: encrypt/decrypt text under a passphrase.
pub trait TokenCipher
where
	Self: Send + Sync,
{
	/// Encrypts `plaintext` under `passphrase`.
	fn encrypt(&self, plaintext: &str, passphrase: &str) -> Result<Vec<u8>, CipherError>;

	/// Decrypts `ciphertext` under `passphrase`.
	///
	/// A wrong passphrase may fail or may yield garbage; either way the store's read
	/// path collapses it to an absent record.
	fn decrypt(&self, ciphertext: &[u8], passphrase: &str) -> Result<String, CipherError>;
}

/// On-disk payload when a passphrase is configured.
#[derive(Serialize, Deserialize)]
struct EncryptedEnvelope {
	encrypted: String,
}

/// [`TokenStore`] wrapper that encrypts records at rest.
///
/// With a passphrase, the on-disk payload is `{ "encrypted": "<base64 ciphertext>" }`;
/// without one it is a pure pass-through to the underlying file store.
pub struct EncryptedTokenStore {
	inner: FileTokenStore,
	cipher: Arc<dyn TokenCipher>,
	passphrase: Option<String>,
}
impl EncryptedTokenStore {
	/// Wraps a file store with the provided cipher and optional passphrase.
	pub fn new(
		inner: FileTokenStore,
		cipher: Arc<dyn TokenCipher>,
		passphrase: Option<String>,
	) -> Self {
		Self { inner, cipher, passphrase }
	}

	fn decrypt_record(&self, bytes: &[u8], passphrase: &str) -> Option<TokenData> {
		let envelope = serde_json::from_slice::<EncryptedEnvelope>(bytes).ok()?;
		let ciphertext = BASE64.decode(envelope.encrypted).ok()?;
		let plaintext = self.cipher.decrypt(&ciphertext, passphrase).ok()?;
		let token = serde_json::from_str::<TokenData>(&plaintext).ok()?;

		token.validate().ok()?;

		Some(token)
	}
}
impl TokenStore for EncryptedTokenStore {
	fn read<'a>(&'a self, profile: &'a str) -> StoreFuture<'a, Option<TokenData>> {
		let Some(passphrase) = self.passphrase.as_deref() else {
			return self.inner.read(profile);
		};

		Box::pin(async move {
			let Some(bytes) = FileTokenStore::read_raw(&self.inner.path_for(profile)) else {
				return Ok(None);
			};

			Ok(self.decrypt_record(&bytes, passphrase))
		})
	}

	fn write<'a>(&'a self, profile: &'a str, token: &'a TokenData) -> StoreFuture<'a, ()> {
		let Some(passphrase) = self.passphrase.as_deref() else {
			return self.inner.write(profile, token);
		};

		Box::pin(async move {
			let plaintext = serde_json::to_string(token).map_err(|e| {
				StoreError::Serialization { message: format!("Failed to serialize record: {e}") }
			})?;
			let ciphertext = self
				.cipher
				.encrypt(&plaintext, passphrase)
				.map_err(|e| StoreError::Cipher { message: e.message })?;
			let envelope = EncryptedEnvelope { encrypted: BASE64.encode(ciphertext) };
			let serialized = serde_json::to_vec_pretty(&envelope).map_err(|e| {
				StoreError::Serialization { message: format!("Failed to serialize envelope: {e}") }
			})?;

			FileTokenStore::write_raw(&self.inner.path_for(profile), &serialized)
		})
	}
}
impl Debug for EncryptedTokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EncryptedTokenStore")
			.field("inner", &self.inner)
			.field("passphrase_set", &self.passphrase.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::fs;
	// self
	use super::*;
	use crate::store::file::tests::{build_token, temp_dir};

	/// Keyed XOR, good enough to prove the store never writes plaintext.
	struct XorCipher;
	impl XorCipher {
		fn keystream(passphrase: &str, len: usize) -> impl Iterator<Item = u8> + '_ {
			passphrase.bytes().cycle().take(len)
		}
	}
	impl TokenCipher for XorCipher {
		fn encrypt(&self, plaintext: &str, passphrase: &str) -> Result<Vec<u8>, CipherError> {
			if passphrase.is_empty() {
				return Err(CipherError::new("Passphrase must not be empty."));
			}

			Ok(plaintext
				.bytes()
				.zip(Self::keystream(passphrase, plaintext.len()))
				.map(|(byte, key)| byte ^ key)
				.collect())
		}

		fn decrypt(&self, ciphertext: &[u8], passphrase: &str) -> Result<String, CipherError> {
			let bytes: Vec<u8> = ciphertext
				.iter()
				.zip(Self::keystream(passphrase, ciphertext.len()))
				.map(|(byte, key)| byte ^ key)
				.collect();

			String::from_utf8(bytes).map_err(|_| CipherError::new("Wrong passphrase."))
		}
	}

	fn build_store(dir: &std::path::Path, passphrase: Option<&str>) -> EncryptedTokenStore {
		let inner = FileTokenStore::open(dir).expect("Failed to open file store.");

		EncryptedTokenStore::new(inner, Arc::new(XorCipher), passphrase.map(Into::into))
	}

	#[tokio::test]
	async fn encrypted_round_trip_and_no_plaintext_on_disk() {
		let dir = temp_dir();
		let store = build_store(&dir, Some("correct horse"));
		let token = build_token();

		store.write("alice", &token).await.expect("Failed to persist encrypted record.");

		let raw = fs::read(store.inner.path_for("alice")).expect("Encrypted file should exist.");
		let raw_text = String::from_utf8_lossy(&raw);

		assert!(raw_text.contains("\"encrypted\""));
		assert!(!raw_text.contains("access-token"));
		assert!(!raw_text.contains("refresh-token"));

		let fetched = store
			.read("alice")
			.await
			.expect("Read should never error.")
			.expect("Encrypted record should decrypt under its own passphrase.");

		assert_eq!(fetched, token);

		fs::remove_dir_all(&dir).expect("Failed to remove temporary store directory.");
	}

	#[tokio::test]
	async fn wrong_passphrase_reads_as_absent() {
		let dir = temp_dir();
		let writer = build_store(&dir, Some("passphrase-a"));
		let reader = build_store(&dir, Some("passphrase-b"));

		writer.write("alice", &build_token()).await.expect("Failed to persist encrypted record.");

		assert_eq!(reader.read("alice").await.expect("Read should never error."), None);

		fs::remove_dir_all(&dir).expect("Failed to remove temporary store directory.");
	}

	#[tokio::test]
	async fn without_passphrase_is_a_pure_pass_through() {
		let dir = temp_dir();
		let store = build_store(&dir, None);
		let token = build_token();

		store.write("alice", &token).await.expect("Failed to persist plain record.");

		let raw = fs::read(store.inner.path_for("alice")).expect("Plain file should exist.");

		assert!(String::from_utf8_lossy(&raw).contains("access-token"));

		let plain = FileTokenStore::open(&dir).expect("Failed to reopen file store.");
		let fetched = plain
			.read("alice")
			.await
			.expect("Read should never error.")
			.expect("Pass-through record should be readable by the plain store.");

		assert_eq!(fetched, token);

		fs::remove_dir_all(&dir).expect("Failed to remove temporary store directory.");
	}
}
