//! File-backed [`TokenStore`] with atomic, permission-hardened writes.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{StoreError, StoreFuture, TokenStore},
	token::TokenData,
};

#[cfg(unix)] const OWNER_ONLY_MODE: u32 = 0o600;

/// Persists one `<profile>.json` per subject under a directory.
///
/// Writes go to a colocated temporary file that is permission-restricted before any
/// payload bytes land, then atomically renamed over the destination, so no reader ever
/// observes a partially written or world-readable record.
#[derive(Clone, Debug)]
pub struct FileTokenStore {
	dir: PathBuf,
}
impl FileTokenStore {
	/// Opens (or creates) a store rooted at the provided directory.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let dir = dir.into();

		fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
			message: format!("Failed to create store directory {}: {e}", dir.display()),
		})?;

		Ok(Self { dir })
	}

	/// Destination path for a profile; non-filename characters are folded to `-`.
	pub(crate) fn path_for(&self, profile: &str) -> PathBuf {
		let safe: String = profile
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '-' })
			.collect();
		let safe = if safe.is_empty() { "default".into() } else { safe };

		self.dir.join(format!("{safe}.json"))
	}

	/// Reads the raw payload, collapsing every anomaly to `None`.
	pub(crate) fn read_raw(path: &Path) -> Option<Vec<u8>> {
		fs::read(path).ok()
	}

	/// Atomically persists `bytes` at `path` with owner-only permissions.
	pub(crate) fn write_raw(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Io {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		let mut tmp_path = path.to_path_buf();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Io {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			// Restrict before any payload bytes land.
			#[cfg(unix)]
			{
				use std::os::unix::fs::PermissionsExt;

				file.set_permissions(fs::Permissions::from_mode(OWNER_ONLY_MODE)).map_err(|e| {
					StoreError::Io {
						message: format!("Failed to restrict {}: {e}", tmp_path.display()),
					}
				})?;
			}

			file.write_all(bytes).map_err(|e| StoreError::Io {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Io {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, path).map_err(|e| StoreError::Io {
			message: format!("Failed to replace {}: {e}", path.display()),
		})?;

		Self::verify_permissions(path)
	}

	/// Re-reads the destination's permission bits to confirm the hardening took effect.
	#[cfg(unix)]
	fn verify_permissions(path: &Path) -> Result<(), StoreError> {
		use std::os::unix::fs::PermissionsExt;

		let metadata = fs::metadata(path).map_err(|e| StoreError::Io {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;
		let mode = metadata.permissions().mode() & 0o777;

		if mode == OWNER_ONLY_MODE {
			Ok(())
		} else {
			Err(StoreError::Permissions { path: path.display().to_string(), mode })
		}
	}

	#[cfg(not(unix))]
	fn verify_permissions(_path: &Path) -> Result<(), StoreError> {
		Ok(())
	}
}
impl TokenStore for FileTokenStore {
	fn read<'a>(&'a self, profile: &'a str) -> StoreFuture<'a, Option<TokenData>> {
		Box::pin(async move {
			let Some(bytes) = Self::read_raw(&self.path_for(profile)) else {
				return Ok(None);
			};
			let Ok(token) = serde_json::from_slice::<TokenData>(&bytes) else {
				return Ok(None);
			};

			if token.validate().is_err() {
				return Ok(None);
			}

			Ok(Some(token))
		})
	}

	fn write<'a>(&'a self, profile: &'a str, token: &'a TokenData) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let serialized = serde_json::to_vec_pretty(token).map_err(|e| {
				StoreError::Serialization { message: format!("Failed to serialize record: {e}") }
			})?;

			Self::write_raw(&self.path_for(profile), &serialized)
		})
	}
}
