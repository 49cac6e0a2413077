//! Transport primitives: request descriptors, responses, and the pluggable HTTP client.
//!
//! The dispatcher only speaks [`HttpTransport`], which moves plain [`http`] requests and
//! responses. [`ReqwestHttpClient`] is the default implementation; tests and embedders can
//! provide their own to fake or wrap the network.

// std
use std::ops::Deref;
// crates.io
use http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransportError},
};

/// Request type handed to an [`HttpTransport`].
pub type HttpRequest = http::Request<Vec<u8>>;
/// Response type produced by an [`HttpTransport`].
pub type HttpResponse = http::Response<Vec<u8>>;
/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing dispatcher requests.
///
/// Implementations must return every HTTP response, whatever its status, as `Ok`;
/// `Err` is reserved for failures to obtain a response at all.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and collects the full response body.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Caller's intended HTTP call, before credentials are attached.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the backend base URL; a leading `/` is optional.
	pub path: String,
	/// Optional pre-serialized body.
	pub body: Option<Vec<u8>>,
	/// Extra request headers.
	pub headers: HeaderMap,
}
impl RequestDescriptor {
	/// Creates a descriptor without body or headers.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), body: None, headers: HeaderMap::new() }
	}

	/// Shorthand for a `GET` descriptor.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Shorthand for a `POST` descriptor.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Shorthand for a `PUT` descriptor.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Shorthand for a `PATCH` descriptor.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// Shorthand for a `DELETE` descriptor.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body).map_err(ConfigError::RequestBody)?;

		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		self.body = Some(bytes);

		Ok(self)
	}

	/// Adds or replaces a request header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Builds the wire request for `url`, attaching `bearer` when provided.
	pub(crate) fn to_http(
		&self,
		url: &Url,
		bearer: Option<&TokenSecret>,
	) -> Result<HttpRequest, ConfigError> {
		let mut builder = http::Request::builder().method(self.method.clone()).uri(url.as_str());

		if let Some(headers) = builder.headers_mut() {
			headers.extend(self.headers.clone());

			if let Some(token) = bearer {
				let mut value =
					HeaderValue::from_str(&token.bearer()).map_err(http::Error::from)?;

				value.set_sensitive(true);
				headers.insert(AUTHORIZATION, value);
			}
		}

		Ok(builder.body(self.body.clone().unwrap_or_default())?)
	}
}

/// Fully buffered response returned to dispatcher callers.
#[derive(Clone, Debug)]
pub struct DispatchResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl DispatchResponse {
	/// Deserializes the body as JSON, reporting the failing path on mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		Ok(parse_json(self.status, &self.body)?)
	}

	/// Returns the body as UTF-8 text, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Converts non-success statuses into the matching [`Error`] variant.
	///
	/// `401` maps to [`Error::Unauthorized`] and `403` to [`Error::Forbidden`]. A `400` whose
	/// body carries field errors, either under `errors` or as the whole body, maps to
	/// [`Error::Validation`]. Every other non-2xx status maps to [`Error::Api`].
	pub fn error_for_status(self) -> Result<Self> {
		let status = self.status;

		if status.is_success() {
			return Ok(self);
		}

		let body = serde_json::from_slice::<Value>(&self.body).ok();
		let message = body.as_ref().and_then(error_message).unwrap_or_else(|| {
			status.canonical_reason().unwrap_or("Unexpected response").to_owned()
		});

		Err(match status {
			StatusCode::UNAUTHORIZED => Error::Unauthorized { message },
			StatusCode::FORBIDDEN => Error::Forbidden { message },
			StatusCode::BAD_REQUEST => match body.as_ref().and_then(field_errors) {
				Some(errors) => Error::Validation { message, errors },
				None => Error::Api { status: status.as_u16(), message },
			},
			_ => Error::Api { status: status.as_u16(), message },
		})
	}
}
impl From<HttpResponse> for DispatchResponse {
	fn from(response: HttpResponse) -> Self {
		let (parts, body) = response.into_parts();

		Self { status: parts.status, headers: parts.headers, body }
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let url = request.uri().to_string();
			let request = reqwest::Request::try_from(request)
				.map_err(|e| TransportError::network(url.as_str(), e))?;
			let response = client
				.execute(request)
				.await
				.map_err(|e| TransportError::network(url.as_str(), e))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body =
				response.bytes().await.map_err(|e| TransportError::network(url.as_str(), e))?;
			let mut response_new = HttpResponse::new(body.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

// The backend reports failures under `error`, `message`, or `detail` depending on the view.
fn error_message(body: &Value) -> Option<String> {
	["error", "message", "detail"]
		.into_iter()
		.find_map(|field| body.get(field)?.as_str().map(str::to_owned))
}

// Serializer errors arrive either wrapped as `{"message": .., "errors": {..}}` or bare, with
// each field mapped to a message list. Wrapped maps may also carry a single string per field.
fn field_errors(body: &Value) -> Option<BTreeMap<String, Vec<String>>> {
	let (fields, wrapped) = match body.get("errors") {
		Some(Value::Object(errors)) => (errors, true),
		Some(_) => return None,
		None => (body.as_object()?, false),
	};
	let mut errors = BTreeMap::new();

	for (field, messages) in fields {
		let messages = match messages {
			Value::String(message) if wrapped => vec![message.clone()],
			Value::Array(items) => items
				.iter()
				.map(|item| match item {
					Value::String(message) => message.clone(),
					other => other.to_string(),
				})
				.collect(),
			_ => return None,
		};

		errors.insert(field.clone(), messages);
	}

	(!errors.is_empty()).then_some(errors)
}

pub(crate) fn parse_json<T>(status: StatusCode, body: &[u8]) -> Result<T, ConfigError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| ConfigError::ResponseParse { source, status: status.as_u16() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: u16, body: &str) -> DispatchResponse {
		DispatchResponse {
			status: StatusCode::from_u16(status).expect("Status fixture should be valid."),
			headers: HeaderMap::new(),
			body: body.as_bytes().to_vec(),
		}
	}

	#[test]
	fn to_http_attaches_sensitive_bearer_header() {
		let url = Url::parse("http://127.0.0.1:8000/users/travel-requests/")
			.expect("Fixture URL should parse.");
		let descriptor = RequestDescriptor::post("users/travel-requests/")
			.json(&serde_json::json!({ "project_name": "Kickoff" }))
			.expect("JSON body should serialize.");
		let request = descriptor
			.to_http(&url, Some(&TokenSecret::new("T1")))
			.expect("Wire request should build.");
		let authorization =
			request.headers().get(AUTHORIZATION).expect("Authorization header should be set.");

		assert_eq!(request.method(), Method::POST);
		assert_eq!(request.uri(), "http://127.0.0.1:8000/users/travel-requests/");
		assert_eq!(authorization, "Bearer T1");
		assert!(authorization.is_sensitive());
		assert_eq!(
			request.headers().get(CONTENT_TYPE).expect("Content type should be set for JSON."),
			"application/json"
		);
		assert_eq!(request.body(), br#"{"project_name":"Kickoff"}"#);
	}

	#[test]
	fn to_http_without_bearer_sends_no_authorization() {
		let url = Url::parse("http://127.0.0.1:8000/users/travel-requests/")
			.expect("Fixture URL should parse.");
		let request = RequestDescriptor::get("users/travel-requests/")
			.to_http(&url, None)
			.expect("Wire request should build.");

		assert!(request.headers().get(AUTHORIZATION).is_none());
		assert!(request.body().is_empty());
	}

	#[test]
	fn error_for_status_classifies_statuses() {
		assert!(response(201, "{}").error_for_status().is_ok());
		assert!(matches!(
			response(401, r#"{"error":"Invalid credentials"}"#).error_for_status(),
			Err(Error::Unauthorized { message }) if message == "Invalid credentials"
		));
		assert!(matches!(
			response(403, r#"{"detail":"Only admins may approve"}"#).error_for_status(),
			Err(Error::Forbidden { message }) if message == "Only admins may approve"
		));
		assert!(matches!(
			response(502, "<html>bad gateway</html>").error_for_status(),
			Err(Error::Api { status: 502, message }) if message == "Bad Gateway"
		));
	}

	#[test]
	fn bad_requests_with_field_errors_become_validation_errors() {
		let wrapped = response(
			400,
			r#"{"message":"Validation failed","errors":{"email":["user with this email already exists."],"username":"This field may not be blank."}}"#,
		)
		.error_for_status()
		.expect_err("Bad requests should fail.");

		match wrapped {
			Error::Validation { message, errors } => {
				assert_eq!(message, "Validation failed");
				assert_eq!(
					errors,
					BTreeMap::from([
						("email".to_owned(), vec!["user with this email already exists.".to_owned()]),
						("username".to_owned(), vec!["This field may not be blank.".to_owned()]),
					])
				);
			},
			other => panic!("Unexpected error: {other:?}."),
		}

		assert!(matches!(
			response(400, r#"{"phone":["Enter a valid phone number."]}"#).error_for_status(),
			Err(Error::Validation { message, errors })
				if message == "Bad Request" && errors["phone"] == ["Enter a valid phone number."]
		));
		assert!(matches!(
			response(400, r#"{"error":"Unknown travel request"}"#).error_for_status(),
			Err(Error::Api { status: 400, message }) if message == "Unknown travel request"
		));
		assert!(matches!(
			response(400, r#"{"errors":{}}"#).error_for_status(),
			Err(Error::Api { status: 400, message }) if message == "Bad Request"
		));
	}

	#[test]
	fn json_reports_failing_path() {
		#[allow(dead_code)]
		#[derive(Debug, Deserialize)]
		struct Payload {
			access: String,
		}

		let err = response(200, r#"{"access":42}"#)
			.json::<Payload>()
			.expect_err("Mismatched payloads should fail to parse.");

		match err {
			Error::Config(ConfigError::ResponseParse { source, status }) => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "access");
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}
}
