//! Backend descriptor and dispatch policy consumed by the dispatcher.
//!
//! [`ApiDescriptor`] names the backend base URL and the authentication endpoints relative to
//! it. [`DispatchPolicy`] carries the tunables that change how expiry and `401` responses are
//! handled; both default to the backend's historical behavior.

// self
use crate::_prelude::*;

/// Default refresh endpoint path.
pub const DEFAULT_REFRESH_ENDPOINT: &str = "/api/token/refresh/";
/// Default login endpoint path.
pub const DEFAULT_LOGIN_ENDPOINT: &str = "/authenticate/login/";
/// Default registration endpoint path.
pub const DEFAULT_REGISTER_ENDPOINT: &str = "/authenticate/register/";

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ApiDescriptorError {
	/// Base URL must be reachable over HTTP(S).
	#[error("The base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Base URL that failed validation.
		url: String,
	},
	/// Base URL cannot have paths joined onto it.
	#[error("The base URL cannot act as a base for endpoint paths: {url}.")]
	NotABase {
		/// Base URL that failed validation.
		url: String,
	},
	/// Query strings and fragments would be dropped when joining paths.
	#[error("The base URL must not carry a query or fragment: {url}.")]
	UnexpectedQueryOrFragment {
		/// Base URL that failed validation.
		url: String,
	},
	/// Endpoint paths must name a resource.
	#[error("The {endpoint} endpoint path `{path}` is invalid.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed validation.
		path: String,
	},
}

/// Authentication endpoints, relative to [`ApiDescriptor::base_url`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoints {
	/// Refresh endpoint; requests to it never carry credentials.
	pub refresh: String,
	/// Login endpoint.
	pub login: String,
	/// Registration endpoint.
	pub register: String,
}
impl Default for ApiEndpoints {
	fn default() -> Self {
		Self {
			refresh: DEFAULT_REFRESH_ENDPOINT.into(),
			login: DEFAULT_LOGIN_ENDPOINT.into(),
			register: DEFAULT_REGISTER_ENDPOINT.into(),
		}
	}
}

/// Knobs that adjust refresh behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPolicy {
	/// Tokens expiring within this window are refreshed before use. Zero keeps the exact
	/// `exp < now` comparison.
	pub expiry_margin: Duration,
	/// When set, a `401` on a request that carried a token triggers one refresh and one retry.
	pub retry_on_unauthorized: bool,
}
impl DispatchPolicy {
	/// Overrides the expiry margin; negative values clamp to zero.
	pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
		self.expiry_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Enables or disables the reactive refresh-and-retry path.
	pub fn with_retry_on_unauthorized(mut self, enabled: bool) -> Self {
		self.retry_on_unauthorized = enabled;

		self
	}
}

/// Immutable backend descriptor consumed by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDescriptor {
	/// Base URL every request path is resolved against.
	pub base_url: Url,
	/// Authentication endpoint paths.
	pub endpoints: ApiEndpoints,
	/// Refresh policy.
	pub policy: DispatchPolicy,
}
impl ApiDescriptor {
	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> ApiDescriptorBuilder {
		ApiDescriptorBuilder::new(base_url)
	}

	/// Resolves a request path (leading `/` optional) against the base URL.
	pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
		self.base_url.join(normalize_path(path))
	}

	/// Returns `true` when `path` targets the refresh endpoint, ignoring any query or fragment.
	pub fn is_refresh_endpoint(&self, path: &str) -> bool {
		route(path) == route(&self.endpoints.refresh)
	}

	fn validate(&self) -> Result<(), ApiDescriptorError> {
		let url = &self.base_url;

		if !matches!(url.scheme(), "http" | "https") {
			return Err(ApiDescriptorError::UnsupportedScheme { url: url.to_string() });
		}
		if url.cannot_be_a_base() {
			return Err(ApiDescriptorError::NotABase { url: url.to_string() });
		}
		if url.query().is_some() || url.fragment().is_some() {
			return Err(ApiDescriptorError::UnexpectedQueryOrFragment { url: url.to_string() });
		}

		validate_endpoint("refresh", &self.endpoints.refresh)?;
		validate_endpoint("login", &self.endpoints.login)?;
		validate_endpoint("register", &self.endpoints.register)?;

		Ok(())
	}
}

/// Builder for [`ApiDescriptor`] values.
#[derive(Debug)]
pub struct ApiDescriptorBuilder {
	/// Base URL being configured.
	pub base_url: Url,
	/// Endpoint paths.
	pub endpoints: ApiEndpoints,
	/// Refresh policy.
	pub policy: DispatchPolicy,
}
impl ApiDescriptorBuilder {
	/// Creates a new builder seeded with the provided base URL and default endpoints.
	pub fn new(base_url: Url) -> Self {
		Self { base_url, endpoints: ApiEndpoints::default(), policy: DispatchPolicy::default() }
	}

	/// Sets the refresh endpoint path.
	pub fn refresh_endpoint(mut self, path: impl Into<String>) -> Self {
		self.endpoints.refresh = path.into();

		self
	}

	/// Sets the login endpoint path.
	pub fn login_endpoint(mut self, path: impl Into<String>) -> Self {
		self.endpoints.login = path.into();

		self
	}

	/// Sets the registration endpoint path.
	pub fn register_endpoint(mut self, path: impl Into<String>) -> Self {
		self.endpoints.register = path.into();

		self
	}

	/// Overrides the refresh policy.
	pub fn policy(mut self, policy: DispatchPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(mut self) -> Result<ApiDescriptor, ApiDescriptorError> {
		// `Url::join` replaces the last segment unless the base ends with a slash.
		if !self.base_url.path().ends_with('/') {
			let path = format!("{}/", self.base_url.path());

			self.base_url.set_path(&path);
		}

		let descriptor = ApiDescriptor {
			base_url: self.base_url,
			endpoints: self.endpoints,
			policy: self.policy.with_expiry_margin(self.policy.expiry_margin),
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

fn normalize_path(path: &str) -> &str {
	path.trim_start_matches('/')
}

fn route(path: &str) -> &str {
	let path = normalize_path(path);

	path.split(['?', '#']).next().unwrap_or(path)
}

fn validate_endpoint(name: &'static str, path: &str) -> Result<(), ApiDescriptorError> {
	if normalize_path(path).is_empty() || path.chars().any(char::is_whitespace) {
		Err(ApiDescriptorError::InvalidEndpoint { endpoint: name, path: path.to_owned() })
	} else {
		Ok(())
	}
}
