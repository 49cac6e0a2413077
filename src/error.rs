//! Dispatcher-level error types shared across transport, storage, and session flows.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or request construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS) while reaching an endpoint.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The session ended because no usable access token could be produced.
	#[error("Session expired and the access token could not be refreshed.")]
	AuthExpired {
		/// Refresh failure that terminated the session.
		#[source]
		source: RefreshError,
	},
	/// Endpoint answered `401 Unauthorized`.
	#[error("Request is unauthorized: {message}.")]
	Unauthorized {
		/// Server-supplied reason string.
		message: String,
	},
	/// Endpoint answered `403 Forbidden`.
	#[error("Request is forbidden: {message}.")]
	Forbidden {
		/// Server-supplied reason string.
		message: String,
	},
	/// Endpoint answered `400 Bad Request` with per-field validation messages.
	#[error("Request failed validation: {message}.")]
	Validation {
		/// Server-supplied summary.
		message: String,
		/// Messages keyed by the offending field, in the order the server sent them.
		errors: BTreeMap<String, Vec<String>>,
	},
	/// Endpoint answered with any other non-success status.
	#[error("Endpoint returned HTTP {status}: {message}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Server-supplied reason string.
		message: String,
	},
}
impl Error {
	/// Returns `true` when the caller's session has ended and a new login is required.
	pub fn is_auth_expired(&self) -> bool {
		matches!(self, Self::AuthExpired { .. })
	}
}

/// Configuration and request construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Backend descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::config::ApiDescriptorError),
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] http::Error),
	/// Request path could not be joined onto the base URL.
	#[error("Request path `{path}` is not a valid URL reference.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized to JSON.
	#[error("Request body could not be serialized.")]
	RequestBody(#[source] serde_json::Error),
	/// Response body did not match the expected JSON shape.
	#[error("Response body is malformed.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling `{url}`.")]
	Network {
		/// Target URL of the failed call.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		url: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { url: url.into(), source: Box::new(src) }
	}
}

/// Reasons the refresh endpoint could not mint a new access token.
///
/// Values are cloned to every caller that awaited the same in-flight refresh, so
/// underlying errors are flattened into messages.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// No refresh token is persisted for the session.
	#[error("No refresh token is stored for the session.")]
	MissingRefreshToken,
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the refresh token with HTTP {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
	/// Refresh endpoint answered 2xx without a usable `access` token.
	#[error("Refresh endpoint returned a malformed body: {message}.")]
	MalformedResponse {
		/// Parser diagnostics.
		message: String,
	},
	/// Refresh request could not be built.
	#[error("Refresh request could not be built: {message}.")]
	Request {
		/// Construction diagnostics.
		message: String,
	},
	/// Refresh endpoint could not be reached.
	#[error("Refresh endpoint is unreachable: {message}.")]
	Transport {
		/// Transport diagnostics.
		message: String,
	},
	/// Refreshed token could not be persisted.
	#[error("Refreshed token could not be stored: {0}")]
	Storage(#[from] crate::store::StoreError),
}
impl From<TransportError> for RefreshError {
	fn from(e: TransportError) -> Self {
		Self::Transport { message: error_chain(&e) }
	}
}
impl From<ConfigError> for RefreshError {
	fn from(e: ConfigError) -> Self {
		match e {
			ConfigError::ResponseParse { source, .. } =>
				Self::MalformedResponse { message: source.to_string() },
			e => Self::Request { message: error_chain(&e) },
		}
	}
}

fn error_chain(e: &dyn StdError) -> String {
	let mut message = e.to_string();
	let mut source = e.source();

	while let Some(cause) = source {
		message.push_str(": ");
		message.push_str(&cause.to_string());

		source = cause.source();
	}

	message
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn auth_expired_exposes_refresh_cause() {
		let err = Error::AuthExpired { source: RefreshError::Rejected { status: 500 } };

		assert!(err.is_auth_expired());

		let source = StdError::source(&err).expect("AuthExpired should expose its refresh cause.");

		assert_eq!(
			source.to_string(),
			"Refresh endpoint rejected the refresh token with HTTP 500."
		);
	}

	#[test]
	fn transport_errors_flatten_into_refresh_messages() {
		let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
		let refresh = RefreshError::from(TransportError::network("http://127.0.0.1/", io));

		match refresh {
			RefreshError::Transport { message } => {
				assert!(message.contains("http://127.0.0.1/"));
				assert!(message.ends_with("connection refused"));
			},
			other => panic!("Unexpected refresh error: {other:?}."),
		}
	}

	#[test]
	fn response_parse_errors_become_malformed_refresh_responses() {
		let mut deserializer = serde_json::Deserializer::from_str(r#"{"access":null}"#);
		let source = serde_path_to_error::deserialize::<_, BTreeMap<String, String>>(
			&mut deserializer,
		)
		.expect_err("A null access token should not deserialize into a string map.");
		let refresh = RefreshError::from(ConfigError::ResponseParse { source, status: 200 });

		assert!(matches!(
			refresh,
			RefreshError::MalformedResponse { ref message } if message.starts_with("access")
		));
	}

	#[test]
	fn store_error_converts_into_dispatcher_error_with_source() {
		let store_error = StoreError::Backend { message: "disk full".into() };
		let err: Error = store_error.clone().into();

		assert!(matches!(err, Error::Storage(_)));
		assert!(err.to_string().contains("disk full"));
		assert_eq!(
			StdError::source(&err)
				.expect("Storage errors should expose the store error as their source.")
				.to_string(),
			store_error.to_string()
		);
	}
}
