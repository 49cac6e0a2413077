//! Demonstrates a dispatcher against a mock backend: login persists the session, an expired
//! access token is refreshed before the next call, and a rejected refresh ends the session.

// std
use std::sync::Arc;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use session_dispatch::{
	auth::{LoginRequest, SessionKey},
	config::ApiDescriptor,
	dispatch::Dispatcher,
	http::RequestDescriptor,
	store::{MemoryStore, SessionStore},
};

fn unsigned_token(ttl: Duration) -> String {
	let exp = (OffsetDateTime::now_utc() + ttl).unix_timestamp();

	format!(
		"{}.{}.demo",
		URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
		URL_SAFE_NO_PAD.encode(format!(r#"{{"token_type":"access","exp":{exp}}}"#))
	)
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let expired = unsigned_token(Duration::seconds(-1));
	let renewed = unsigned_token(Duration::minutes(5));
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/authenticate/login/");
			then.status(200).json_body(json!({
				"message": "Login successful",
				"user": { "id": 1, "email": "ada@example.com", "username": "ada" },
				"access_token": expired,
				"refresh_token": "demo-refresh"
			}));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token/refresh/");
			then.status(200).json_body(json!({ "access": renewed }));
		})
		.await;
	let requests_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/users/travel-requests/")
				.header("authorization", format!("Bearer {renewed}"));
			then.status(200).json_body(json!([{ "id": 1, "project_name": "Kickoff" }]));
		})
		.await;
	let store = Arc::new(MemoryStore::default());
	let descriptor = ApiDescriptor::builder(Url::parse(&server.base_url())?).build()?;
	let dispatcher = Dispatcher::new(store.clone() as Arc<dyn SessionStore>, descriptor, || {
		println!("Session terminated; the user must sign in again.")
	});
	let login = dispatcher.login(&LoginRequest::new("ada@example.com", "demo-password")).await?;

	println!("Signed in as {}.", login.user.username);

	let response = dispatcher.dispatch(RequestDescriptor::get("users/travel-requests/")).await?;

	println!("Travel requests: {}.", response.text());
	println!(
		"Stored access token was replaced: {}.",
		store.fetch(SessionKey::AccessToken).await?.as_deref() == Some(renewed.as_str())
	);

	login_mock.assert_async().await;
	refresh_mock.assert_async().await;
	requests_mock.assert_async().await;

	Ok(())
}
