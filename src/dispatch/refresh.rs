//! Access-token refresh with a shared in-flight slot and failure teardown.
//!
//! [`Dispatcher::refresh_access_token`] is the bare refresh procedure: one `POST` of
//! `{"refresh": <token>}` to the refresh endpoint, persisting the returned `access` token.
//! Dispatches never call it directly. They go through a single-flight slot so that every
//! caller that observes an expired token while a refresh is running awaits that refresh
//! instead of starting another. The caller that runs the shared refresh is also the one that
//! clears the session and fires the termination callback when it fails, so both happen once
//! per failed refresh no matter how many dispatches were waiting.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use async_lock::OnceCell;
// self
use crate::{
	_prelude::*,
	auth::{SessionKey, TokenSecret},
	dispatch::Dispatcher,
	error::RefreshError,
	http::{self, DispatchResponse, HttpTransport, RequestDescriptor},
	obs::{self, FlowKind},
};

pub(crate) type SharedRefresh = Arc<OnceCell<Result<TokenSecret, RefreshError>>>;

#[derive(Serialize)]
struct RefreshRequest<'a> {
	refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
	access: String,
	// Present only when the backend rotates refresh tokens.
	#[serde(default)]
	refresh: Option<String>,
}

impl<C> Dispatcher<C>
where
	C: ?Sized + HttpTransport,
{
	/// Exchanges the stored refresh token for a new access token and persists it.
	///
	/// Failures are returned as-is: nothing is retried and the session is left untouched.
	/// Each call hits the refresh endpoint, so two calls yield two independently issued
	/// tokens.
	pub async fn refresh_access_token(&self) -> Result<TokenSecret, RefreshError> {
		obs::observe(FlowKind::Refresh, "refresh_access_token", async {
			self.refresh_metrics.record_attempt();

			let result = self.request_new_access_token().await;

			match &result {
				Ok(_) => self.refresh_metrics.record_success(),
				Err(_) => self.refresh_metrics.record_failure(),
			}

			result
		})
		.await
	}

	/// Joins the in-flight refresh, or starts one, on behalf of a dispatch holding `stale`.
	pub(crate) async fn refresh_shared(
		&self,
		stale: &TokenSecret,
	) -> Result<TokenSecret, RefreshError> {
		let (cell, joined) = {
			let mut inflight = self.inflight.lock();

			match inflight.as_ref() {
				Some(cell) => (cell.clone(), true),
				None => {
					let cell = SharedRefresh::default();

					*inflight = Some(cell.clone());

					(cell, false)
				},
			}
		};

		if joined {
			self.refresh_metrics.record_coalesced();

			#[cfg(feature = "tracing")]
			tracing::debug!("Awaiting a refresh started by another dispatch.");
		}

		let outcome = cell.get_or_init(|| self.refresh_or_terminate(stale)).await.clone();
		let mut inflight = self.inflight.lock();

		if inflight.as_ref().is_some_and(|current| Arc::ptr_eq(current, &cell)) {
			*inflight = None;
		}

		outcome
	}

	async fn refresh_or_terminate(&self, stale: &TokenSecret) -> Result<TokenSecret, RefreshError> {
		if let Some(current) = self.reusable_token(stale).await {
			#[cfg(feature = "tracing")]
			tracing::debug!("Reusing an access token refreshed by another caller.");

			return Ok(current);
		}

		let e = match self.refresh_access_token().await {
			Ok(token) => return Ok(token),
			Err(e) => e,
		};

		// Another dispatch already tore the session down; a late 401 must not end it twice.
		if matches!(e, RefreshError::MissingRefreshToken) && self.session_already_ended().await {
			#[cfg(feature = "tracing")]
			tracing::debug!("Session already ended; skipping teardown.");

			return Err(e);
		}

		self.terminate_session(&e).await;

		Err(e)
	}

	async fn session_already_ended(&self) -> bool {
		self.store
			.fetch(SessionKey::AccessToken)
			.await
			.is_ok_and(|token| token.is_none_or(|token| token.is_empty()))
	}

	// A stored token that differs from the one the caller saw and has not expired was
	// minted by a refresh that finished after the caller read the store.
	async fn reusable_token(&self, stale: &TokenSecret) -> Option<TokenSecret> {
		let current = self.store.fetch(SessionKey::AccessToken).await.ok().flatten()?;

		if current.is_empty() || current == stale.expose() {
			return None;
		}

		let current = TokenSecret::new(current);

		(!self.is_expired(&current)).then_some(current)
	}

	async fn terminate_session(&self, _cause: &RefreshError) {
		#[cfg(feature = "tracing")]
		tracing::warn!(error = %_cause, "Token refresh failed; terminating the session.");

		if let Err(_e) = self.store.clear().await {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %_e, "Failed to clear the session store; removing keys one by one.");

			for key in SessionKey::ALL {
				if let Err(_e) = self.store.remove(key).await {
					#[cfg(feature = "tracing")]
					tracing::error!(?key, error = %_e, "Failed to remove a session key during teardown.");
				}
			}
		}

		self.on_terminated.session_terminated();
	}

	async fn request_new_access_token(&self) -> Result<TokenSecret, RefreshError> {
		let refresh_token = self
			.store
			.fetch(SessionKey::RefreshToken)
			.await?
			.filter(|value| !value.is_empty())
			.ok_or(RefreshError::MissingRefreshToken)?;
		let endpoint = &self.descriptor.endpoints.refresh;
		let url = self
			.descriptor
			.resolve(endpoint)
			.map_err(|e| RefreshError::Request { message: format!("{endpoint}: {e}") })?;
		let request =
			RequestDescriptor::post(endpoint.as_str()).json(&RefreshRequest { refresh: &refresh_token })?;
		let response =
			DispatchResponse::from(self.http_client.execute(request.to_http(&url, None)?).await?);

		if !response.status.is_success() {
			return Err(RefreshError::Rejected { status: response.status.as_u16() });
		}

		let body = http::parse_json::<RefreshResponse>(response.status, &response.body)?;

		if body.access.is_empty() {
			return Err(RefreshError::MalformedResponse { message: "access is empty".into() });
		}

		self.store.save(SessionKey::AccessToken, body.access.clone()).await?;

		if let Some(rotated) = body.refresh.filter(|value| !value.is_empty()) {
			self.store.save(SessionKey::RefreshToken, rotated).await?;
		}

		Ok(TokenSecret::new(body.access))
	}
}
