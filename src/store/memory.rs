//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// crates.io
use parking_lot::RwLock;
// self
use crate::{
	_prelude::*,
	store::{StoreFuture, TokenStore},
	token::TokenData,
};

type StoreMap = Arc<RwLock<HashMap<String, TokenData>>>;

/// Storage backend that keeps records in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenStore(StoreMap);
impl MemoryTokenStore {
	/// Number of profiles currently holding a record.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no record is held.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenStore for MemoryTokenStore {
	fn read<'a>(&'a self, profile: &'a str) -> StoreFuture<'a, Option<TokenData>> {
		let map = self.0.clone();

		Box::pin(async move {
			let record = map.read().get(profile).cloned();

			Ok(record.filter(|token| token.validate().is_ok()))
		})
	}

	fn write<'a>(&'a self, profile: &'a str, token: &'a TokenData) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(profile.into(), token.clone());

			Ok(())
		})
	}
}
