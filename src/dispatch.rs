//! Authenticated request dispatch with proactive expiry checks and session teardown.
//!
//! [`Dispatcher::dispatch`] resolves a [`RequestDescriptor`] against the configured backend,
//! attaches the stored access token as a bearer credential, and transparently refreshes the
//! token first when its `exp` claim has passed. Concurrent dispatches that all observe an
//! expired token share one in-flight refresh (see [`refresh`]). When the refresh cannot
//! produce a token, the persisted session is cleared, the injected [`SessionTerminated`]
//! callback fires once, and every waiting dispatch fails with [`Error::AuthExpired`].

pub mod refresh;

mod session;

pub use refresh::RefreshMetrics;

// crates.io
use http::StatusCode;
// self
use crate::{
	_prelude::*,
	auth::{self, SessionKey, TokenSecret},
	config::ApiDescriptor,
	error::ConfigError,
	http::{DispatchResponse, HttpTransport, RequestDescriptor},
	obs::{self, FlowKind},
	store::SessionStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Dispatcher specialized for the crate's default reqwest transport.
pub type ReqwestDispatcher = Dispatcher<ReqwestHttpClient>;

/// Callback fired when an unrecoverable refresh failure ends the session.
///
/// Applications use it to send the user back to their login entry point. Closures
/// implement it automatically.
pub trait SessionTerminated
where
	Self: Send + Sync,
{
	/// Invoked after the persisted session has been cleared.
	fn session_terminated(&self);
}
impl<F> SessionTerminated for F
where
	F: Send + Sync + Fn(),
{
	fn session_terminated(&self) {
		self()
	}
}

/// Wraps outbound calls with bearer attachment, silent refresh, and session teardown.
///
/// Clones share the transport, store, metrics, and the in-flight refresh slot, so a refresh
/// started through one clone is awaited by dispatches made through the others.
pub struct Dispatcher<C>
where
	C: ?Sized + HttpTransport,
{
	/// HTTP transport used for every outbound request.
	pub http_client: Arc<C>,
	/// Store holding the persisted session.
	pub store: Arc<dyn SessionStore>,
	/// Backend endpoints and refresh policy.
	pub descriptor: ApiDescriptor,
	/// Callback fired once per unrecoverable refresh failure.
	pub on_terminated: Arc<dyn SessionTerminated>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	inflight: Arc<Mutex<Option<refresh::SharedRefresh>>>,
}
impl<C> Dispatcher<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a dispatcher that reuses the caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn SessionStore>,
		descriptor: ApiDescriptor,
		http_client: impl Into<Arc<C>>,
		on_terminated: impl 'static + SessionTerminated,
	) -> Self {
		Self {
			http_client: http_client.into(),
			store,
			descriptor,
			on_terminated: Arc::new(on_terminated),
			refresh_metrics: Default::default(),
			inflight: Default::default(),
		}
	}

	/// Sends `request`, attaching a currently valid bearer token when one is stored.
	///
	/// - Requests to the refresh endpoint are sent as-is.
	/// - Without a stored access token the request is sent anonymously.
	/// - An expired (or unreadable) token is refreshed first; if that fails the session is torn
	///   down and [`Error::AuthExpired`] is returned without sending the request.
	/// - `401`/`403` surface as [`Error::Unauthorized`]/[`Error::Forbidden`], a `400` with field
	///   errors as [`Error::Validation`], and other non-2xx statuses as [`Error::Api`].
	pub async fn dispatch(&self, request: RequestDescriptor) -> Result<DispatchResponse> {
		obs::observe(FlowKind::Dispatch, "dispatch", async move {
			if self.descriptor.is_refresh_endpoint(&request.path) {
				return self.send(&request, None).await?.error_for_status();
			}

			let token = self.current_access_token().await?;
			let response = self.send(&request, token.as_ref()).await?;
			let retry = response.status == StatusCode::UNAUTHORIZED
				&& self.descriptor.policy.retry_on_unauthorized;

			if let (true, Some(rejected)) = (retry, token.as_ref()) {
				#[cfg(feature = "tracing")]
				tracing::debug!(path = %request.path, "Bearer token rejected; refreshing once.");

				let renewed = self
					.refresh_shared(rejected)
					.await
					.map_err(|source| Error::AuthExpired { source })?;

				return self.send(&request, Some(&renewed)).await?.error_for_status();
			}

			response.error_for_status()
		})
		.await
	}

	/// Returns a usable access token, refreshing an expired one; `None` when none is stored.
	async fn current_access_token(&self) -> Result<Option<TokenSecret>> {
		let stored = self.store.fetch(SessionKey::AccessToken).await?;
		let Some(raw) = stored.filter(|value| !value.is_empty()) else {
			return Ok(None);
		};
		let token = TokenSecret::new(raw);

		if !self.is_expired(&token) {
			return Ok(Some(token));
		}

		#[cfg(feature = "tracing")]
		tracing::debug!("Access token expired; refreshing before dispatch.");

		self.refresh_shared(&token)
			.await
			.map(Some)
			.map_err(|source| Error::AuthExpired { source })
	}

	fn is_expired(&self, token: &TokenSecret) -> bool {
		auth::is_token_expired(
			token.expose(),
			OffsetDateTime::now_utc(),
			self.descriptor.policy.expiry_margin,
		)
	}

	async fn send(
		&self,
		request: &RequestDescriptor,
		bearer: Option<&TokenSecret>,
	) -> Result<DispatchResponse> {
		let url = self
			.descriptor
			.resolve(&request.path)
			.map_err(|source| ConfigError::InvalidPath { path: request.path.clone(), source })?;
		let wire = request.to_http(&url, bearer)?;
		let response = self.http_client.execute(wire).await?;

		Ok(response.into())
	}
}
#[cfg(feature = "reqwest")]
impl Dispatcher<ReqwestHttpClient> {
	/// Creates a new dispatcher backed by a default reqwest client.
	pub fn new(
		store: Arc<dyn SessionStore>,
		descriptor: ApiDescriptor,
		on_terminated: impl 'static + SessionTerminated,
	) -> Self {
		Self::with_http_client(store, descriptor, ReqwestHttpClient::default(), on_terminated)
	}
}
impl<C> Clone for Dispatcher<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			store: self.store.clone(),
			descriptor: self.descriptor.clone(),
			on_terminated: self.on_terminated.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			inflight: self.inflight.clone(),
		}
	}
}
impl<C> Debug for Dispatcher<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("descriptor", &self.descriptor)
			.field("refresh_in_flight", &self.inflight.lock().is_some())
			.finish()
	}
}
