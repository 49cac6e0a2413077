//! Persisted session keys, credential pairs, and the login/registration payloads that create them.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Logical keys persisted by a [`SessionStore`](crate::store::SessionStore).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKey {
	/// Signed access token carrying an `exp` claim.
	AccessToken,
	/// Refresh token, opaque to the client.
	RefreshToken,
	/// JSON-encoded [`UserProfile`] of the signed-in user.
	User,
	/// `"true"` while a login is active.
	LoggedIn,
	/// `"true"` when the signed-in user is an administrator.
	IsAdmin,
}
impl SessionKey {
	/// Every key a session may persist.
	pub const ALL: [SessionKey; 5] =
		[Self::AccessToken, Self::RefreshToken, Self::User, Self::LoggedIn, Self::IsAdmin];

	/// Returns the stable storage label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AccessToken => "access_token",
			Self::RefreshToken => "refresh_token",
			Self::User => "user",
			Self::LoggedIn => "logged_in",
			Self::IsAdmin => "is_admin",
		}
	}
}
impl Display for SessionKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Access + refresh token pair minted at login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
	/// Short-lived bearer credential.
	pub access_token: TokenSecret,
	/// Long-lived credential used only to mint access tokens.
	pub refresh_token: TokenSecret,
}
impl CredentialPair {
	/// Builds a pair from raw token strings.
	pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
		}
	}
}

/// User record returned by the authentication endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
	/// Backend primary key.
	pub id: Option<u64>,
	/// Login e-mail address.
	pub email: String,
	/// Display name.
	pub username: String,
	/// Given name.
	pub first_name: Option<String>,
	/// Family name.
	pub last_name: Option<String>,
	/// Account creation timestamp as sent by the backend.
	pub created_date: Option<String>,
	/// Whether the account may sign in.
	pub is_active: bool,
	/// Whether the account reviews travel requests.
	pub is_admin: bool,
	/// Whether the account has staff privileges on the backend.
	pub is_staff: bool,
}

/// Credentials submitted to the login endpoint.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
	/// Login e-mail address.
	pub email: String,
	/// Plain-text password; never logged.
	pub password: String,
	/// Requests an administrator session.
	#[serde(rename = "isAdmin")]
	pub is_admin: bool,
}
impl LoginRequest {
	/// Builds an employee login request.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into(), is_admin: false }
	}

	/// Requests an administrator session instead of an employee one.
	pub fn as_admin(mut self) -> Self {
		self.is_admin = true;

		self
	}
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.field("is_admin", &self.is_admin)
			.finish()
	}
}

/// Successful login payload.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
	/// Human-readable confirmation.
	#[serde(default)]
	pub message: Option<String>,
	/// Signed-in user.
	pub user: UserProfile,
	/// Newly minted credential pair.
	#[serde(flatten)]
	pub credentials: CredentialPair,
}

/// Account details submitted to the registration endpoint.
#[derive(Clone, Serialize)]
pub struct RegisterRequest {
	/// Display name.
	pub username: String,
	/// Login e-mail address.
	pub email: String,
	/// Plain-text password; never logged.
	pub password: String,
}
impl RegisterRequest {
	/// Builds a registration request.
	pub fn new(
		username: impl Into<String>,
		email: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self { username: username.into(), email: email.into(), password: password.into() }
	}
}
impl Debug for RegisterRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RegisterRequest")
			.field("username", &self.username)
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterResponse {
	pub(crate) user: UserProfile,
}
