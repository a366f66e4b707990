//! Keeps long-lived OAuth sessions alive - single-flight refresh, token-bucket rate limiting, and
//! permission-hardened encrypted token stores in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod error;
pub mod http;
pub mod limit;
pub mod lock;
pub mod manager;
pub mod obs;
pub mod refresh;
pub mod retry;
pub mod store;
pub mod token;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::{
			Arc,
			atomic::{AtomicBool, Ordering},
		},
	};

	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::Client as ReqwestClient;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio::time::{Duration, Instant};
	pub use url::Url;

	pub use crate::error::{Error, Result};

	/// Milliseconds since the Unix epoch, the crate's wall-clock unit.
	pub fn now_ms() -> i64 {
		(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
	}
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
