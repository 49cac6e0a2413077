// std
use std::{
	env, fs,
	path::{Path, PathBuf},
	process,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use http::{StatusCode, header::AUTHORIZATION};
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use session_dispatch::{
	auth::SessionKey,
	config::ApiDescriptor,
	dispatch::Dispatcher,
	error::{Error, RefreshError, TransportError},
	http::{HttpRequest, HttpResponse, HttpTransport, RequestDescriptor, TransportFuture},
	store::{FileStore, MemoryStore, SessionStore, StoreError, StoreFuture},
};

/// Records every request and answers from a fixed script keyed by path.
#[derive(Default)]
struct ScriptedTransport {
	seen: Mutex<Vec<(String, Option<String>)>>,
	refresh: Option<(StatusCode, String)>,
	offline: bool,
}
impl ScriptedTransport {
	fn seen(&self) -> Vec<(String, Option<String>)> {
		self.seen.lock().clone()
	}
}
impl HttpTransport for ScriptedTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let path = request.uri().path().to_owned();
			let bearer = request
				.headers()
				.get(AUTHORIZATION)
				.and_then(|value| value.to_str().ok())
				.map(str::to_owned);

			self.seen.lock().push((path.clone(), bearer));

			if self.offline {
				let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "offline");

				return Err(TransportError::network(request.uri().to_string(), io));
			}

			let (status, body) = match (path.as_str(), &self.refresh) {
				("/api/token/refresh/", Some((status, body))) => (*status, body.as_str()),
				_ => (StatusCode::OK, "{}"),
			};
			let mut response = HttpResponse::new(body.as_bytes().to_vec());

			*response.status_mut() = status;

			Ok(response)
		})
	}
}

/// Delegates to a [`MemoryStore`] but refuses to clear it in one go.
#[derive(Clone, Default)]
struct UnclearableStore {
	inner: MemoryStore,
}
impl SessionStore for UnclearableStore {
	fn fetch(&self, key: SessionKey) -> StoreFuture<'_, Option<String>> {
		self.inner.fetch(key)
	}

	fn save(&self, key: SessionKey, value: String) -> StoreFuture<'_, ()> {
		self.inner.save(key, value)
	}

	fn remove(&self, key: SessionKey) -> StoreFuture<'_, Option<String>> {
		self.inner.remove(key)
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "disk quota exceeded".into() }) })
	}
}

fn token(ttl: Duration) -> String {
	let exp = (OffsetDateTime::now_utc() + ttl).unix_timestamp();

	format!(
		"{}.{}.sig",
		URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#),
		URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#))
	)
}

fn temp_store() -> (FileStore, PathBuf) {
	let path = env::temp_dir().join(format!(
		"session_dispatch_transport_it_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos()
	));
	let store = FileStore::open(&path).expect("Failed to open file store for transport test.");

	(store, path)
}

fn remove_snapshot(path: &Path) {
	fs::remove_file(path).expect("Failed to remove transport test snapshot.");

	let mut lock = path.as_os_str().to_owned();

	lock.push(".lock");

	let _ = fs::remove_file(lock);
}

fn dispatcher(
	transport: ScriptedTransport,
	store: impl SessionStore + 'static,
) -> (Dispatcher<ScriptedTransport>, Arc<AtomicUsize>) {
	let descriptor = ApiDescriptor::builder(
		Url::parse("https://travel.example.com").expect("Fixture URL should parse."),
	)
	.build()
	.expect("Descriptor should build.");
	let terminated = Arc::new(AtomicUsize::new(0));
	let counter = terminated.clone();
	let dispatcher: Dispatcher<ScriptedTransport> = Dispatcher::with_http_client(
		Arc::new(store) as Arc<dyn SessionStore>,
		descriptor,
		transport,
		move || {
			counter.fetch_add(1, Ordering::SeqCst);
		},
	);

	(dispatcher, terminated)
}

#[tokio::test]
async fn network_failures_propagate_without_ending_the_session() {
	let (store, path) = temp_store();
	let access = token(Duration::minutes(5));

	store.save(SessionKey::AccessToken, access.clone()).await.expect("Failed to seed token.");
	store.save(SessionKey::RefreshToken, "refresh-1".into()).await.expect("Failed to seed token.");

	let (dispatcher, terminated) =
		dispatcher(ScriptedTransport { offline: true, ..Default::default() }, store.clone());
	let err = dispatcher
		.dispatch(RequestDescriptor::get("users/profile/"))
		.await
		.expect_err("Offline transports should fail the dispatch.");

	assert!(matches!(err, Error::Transport(TransportError::Network { .. })));
	assert_eq!(
		dispatcher.http_client.seen(),
		vec![("/users/profile/".to_owned(), Some(format!("Bearer {access}")))]
	);
	assert_eq!(
		store.fetch(SessionKey::AccessToken).await.expect("Fetch should succeed."),
		Some(access)
	);
	assert_eq!(terminated.load(Ordering::SeqCst), 0);

	remove_snapshot(&path);
}

#[tokio::test]
async fn unreachable_refresh_endpoint_terminates_a_file_backed_session() {
	let (store, path) = temp_store();

	store
		.save(SessionKey::AccessToken, token(Duration::minutes(-5)))
		.await
		.expect("Failed to seed token.");
	store.save(SessionKey::RefreshToken, "refresh-1".into()).await.expect("Failed to seed token.");

	let (dispatcher, terminated) =
		dispatcher(ScriptedTransport { offline: true, ..Default::default() }, store);
	let err = dispatcher
		.dispatch(RequestDescriptor::get("users/profile/"))
		.await
		.expect_err("An unreachable refresh endpoint should end the session.");

	assert!(matches!(err, Error::AuthExpired { source: RefreshError::Transport { .. } }));
	// Only the refresh was attempted; the requested call never left the client.
	assert_eq!(dispatcher.http_client.seen(), vec![("/api/token/refresh/".to_owned(), None)]);
	assert_eq!(terminated.load(Ordering::SeqCst), 1);

	let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

	for key in SessionKey::ALL {
		assert_eq!(reopened.fetch(key).await.expect("Fetch should succeed."), None);
	}

	remove_snapshot(&path);
}

#[tokio::test]
async fn refreshed_token_is_written_through_to_disk() {
	let (store, path) = temp_store();
	let renewed = token(Duration::minutes(5));
	let body = serde_json::json!({ "access": renewed }).to_string();

	store
		.save(SessionKey::AccessToken, token(Duration::minutes(-5)))
		.await
		.expect("Failed to seed token.");
	store.save(SessionKey::RefreshToken, "refresh-1".into()).await.expect("Failed to seed token.");

	let (dispatcher, terminated) = dispatcher(
		ScriptedTransport { refresh: Some((StatusCode::OK, body)), ..Default::default() },
		store,
	);

	dispatcher
		.dispatch(RequestDescriptor::get("/users/profile/"))
		.await
		.expect("Dispatch should succeed after refreshing.");

	assert_eq!(
		dispatcher.http_client.seen(),
		vec![
			("/api/token/refresh/".to_owned(), None),
			("/users/profile/".to_owned(), Some(format!("Bearer {renewed}"))),
		]
	);

	let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

	assert_eq!(
		reopened.fetch(SessionKey::AccessToken).await.expect("Fetch should succeed."),
		Some(renewed)
	);
	assert_eq!(terminated.load(Ordering::SeqCst), 0);

	remove_snapshot(&path);
}

#[tokio::test]
async fn teardown_removes_each_key_when_the_store_cannot_clear() {
	let store = UnclearableStore::default();

	for (key, value) in [
		(SessionKey::AccessToken, token(Duration::minutes(-5))),
		(SessionKey::RefreshToken, "refresh-1".to_owned()),
		(SessionKey::User, r#"{"username":"ada"}"#.to_owned()),
		(SessionKey::LoggedIn, "true".to_owned()),
		(SessionKey::IsAdmin, "false".to_owned()),
	] {
		store.save(key, value).await.expect("Failed to seed session state.");
	}

	let (dispatcher, terminated) = dispatcher(
		ScriptedTransport {
			refresh: Some((StatusCode::UNAUTHORIZED, r#"{"detail":"Token is blacklisted"}"#.into())),
			..Default::default()
		},
		store.clone(),
	);
	let err = dispatcher
		.dispatch(RequestDescriptor::get("users/profile/"))
		.await
		.expect_err("A rejected refresh should end the session.");

	assert!(matches!(err, Error::AuthExpired { source: RefreshError::Rejected { status: 401 } }));
	assert_eq!(terminated.load(Ordering::SeqCst), 1);
	// The failed clear must not leave a usable refresh token behind.
	assert!(store.inner.is_empty(), "left behind: {:?}", store.inner.snapshot());

	let response = dispatcher
		.dispatch(RequestDescriptor::get("users/profile/"))
		.await
		.expect("An ended session should dispatch anonymously.");

	assert_eq!(response.status, StatusCode::OK);
	assert_eq!(
		dispatcher.http_client.seen().last(),
		Some(&("/users/profile/".to_owned(), None))
	);
	assert_eq!(terminated.load(Ordering::SeqCst), 1);
}
