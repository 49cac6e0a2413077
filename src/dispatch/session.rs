//! Login, registration, and logout flows that create and destroy the persisted session.

// self
use crate::{
	_prelude::*,
	auth::{
		LoginRequest, LoginResponse, RegisterRequest, SessionKey, UserProfile,
		session::RegisterResponse,
	},
	dispatch::Dispatcher,
	http::{HttpTransport, RequestDescriptor},
	obs::{self, FlowKind},
	store::StoreError,
};

impl<C> Dispatcher<C>
where
	C: ?Sized + HttpTransport,
{
	/// Signs in with `credentials` and persists the returned session.
	///
	/// The request is sent anonymously even when a previous session is still stored. On
	/// success the credential pair, the JSON-encoded user, and the `logged_in`/`is_admin`
	/// flags replace whatever the store held under those keys.
	pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse> {
		obs::observe(FlowKind::Login, "login", async {
			let request = RequestDescriptor::post(self.descriptor.endpoints.login.as_str())
				.json(credentials)?;
			let response: LoginResponse =
				self.send(&request, None).await?.error_for_status()?.json()?;
			let user = serde_json::to_string(&response.user).map_err(|e| {
				StoreError::Serialization { message: format!("Failed to encode user profile: {e}") }
			})?;
			let credentials = &response.credentials;

			self.store
				.save(SessionKey::AccessToken, credentials.access_token.expose().to_owned())
				.await?;
			self.store
				.save(SessionKey::RefreshToken, credentials.refresh_token.expose().to_owned())
				.await?;
			self.store.save(SessionKey::User, user).await?;
			self.store.save(SessionKey::LoggedIn, true.to_string()).await?;
			self.store.save(SessionKey::IsAdmin, response.user.is_admin.to_string()).await?;

			#[cfg(feature = "tracing")]
			tracing::debug!(is_admin = response.user.is_admin, "Session established.");

			Ok(response)
		})
		.await
	}

	/// Creates an account; the caller still has to [`login`](Self::login) afterwards.
	pub async fn register(&self, account: &RegisterRequest) -> Result<UserProfile> {
		obs::observe(FlowKind::Register, "register", async {
			let request = RequestDescriptor::post(self.descriptor.endpoints.register.as_str())
				.json(account)?;
			let response: RegisterResponse =
				self.send(&request, None).await?.error_for_status()?.json()?;

			Ok(response.user)
		})
		.await
	}

	/// Clears the persisted session.
	///
	/// This is a user-initiated sign-out, so the termination callback is not fired.
	pub async fn logout(&self) -> Result<()> {
		obs::observe(FlowKind::Logout, "logout", async {
			self.store.clear().await?;

			Ok(())
		})
		.await
	}

	/// Returns the persisted user profile, if any.
	pub async fn current_user(&self) -> Result<Option<UserProfile>> {
		let Some(raw) = self.store.fetch(SessionKey::User).await? else {
			return Ok(None);
		};
		let user = serde_json::from_str(&raw).map_err(|e| StoreError::Serialization {
			message: format!("Failed to decode stored user profile: {e}"),
		})?;

		Ok(Some(user))
	}

	/// Returns `true` while the store marks a login as active.
	pub async fn is_logged_in(&self) -> Result<bool> {
		Ok(self.store.fetch(SessionKey::LoggedIn).await?.as_deref() == Some("true"))
	}
}
