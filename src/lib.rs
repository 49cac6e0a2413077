//! Authenticated request dispatcher: bearer attachment, proactive expiry checks, single-flight
//! token refresh, and session teardown for clients of token-authenticated HTTP backends.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod obs;
pub mod store;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use crate::{
		config::{ApiDescriptor, DispatchPolicy},
		dispatch::{Dispatcher, SessionTerminated},
		error::ConfigError,
		http::ReqwestHttpClient,
		store::{MemoryStore, SessionStore},
	};

	/// Dispatcher type alias used by reqwest-backed integration tests.
	pub type ReqwestTestDispatcher = Dispatcher<ReqwestHttpClient>;

	/// Counts how often the dispatcher reported a terminated session.
	#[derive(Clone, Debug, Default)]
	pub struct TerminationCounter(Arc<AtomicUsize>);
	impl TerminationCounter {
		/// Returns the number of callback invocations so far.
		pub fn count(&self) -> usize {
			self.0.load(Ordering::SeqCst)
		}
	}
	impl SessionTerminated for TerminationCounter {
		fn session_terminated(&self) {
			self.0.fetch_add(1, Ordering::SeqCst);
		}
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> Result<ReqwestHttpClient, ConfigError> {
		let client = ReqwestClient::builder().danger_accept_invalid_certs(true).build()?;

		Ok(ReqwestHttpClient::with_client(client))
	}

	/// Constructs a [`Dispatcher`] against `base_url`, backed by an in-memory store and a
	/// counter of termination callbacks.
	pub fn build_reqwest_test_dispatcher(
		base_url: &str,
		policy: DispatchPolicy,
	) -> Result<(ReqwestTestDispatcher, Arc<MemoryStore>, TerminationCounter)> {
		let base_url = Url::parse(base_url).map_err(|source| ConfigError::InvalidPath {
			path: base_url.to_owned(),
			source,
		})?;
		let descriptor =
			ApiDescriptor::builder(base_url).policy(policy).build().map_err(ConfigError::from)?;
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn SessionStore> = store_backend.clone();
		let terminations = TerminationCounter::default();
		let dispatcher: ReqwestTestDispatcher = Dispatcher::with_http_client(
			store,
			descriptor,
			test_reqwest_http_client()?,
			terminations.clone(),
		);

		Ok((dispatcher, store_backend, terminations))
	}

	/// Forges an unsigned token whose payload carries `exp`.
	///
	/// The dispatcher never verifies signatures, so this is enough to drive expiry checks.
	pub fn unsigned_access_token(label: &str, exp: i64) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
		let payload = URL_SAFE_NO_PAD
			.encode(format!(r#"{{"token_type":"access","exp":{exp},"jti":"{label}"}}"#));

		format!("{header}.{payload}.signature")
	}

	/// Forges an unsigned token expiring `ttl` from now (negative values are already expired).
	pub fn access_token_expiring_in(label: &str, ttl: Duration) -> String {
		unsigned_access_token(label, (OffsetDateTime::now_utc() + ttl).unix_timestamp())
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
