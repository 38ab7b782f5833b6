//! Integration test harness for Clementine.
//!
//! Spins up an in-process mock backend (axum on an ephemeral port) that
//! speaks the real wire protocol: bearer-token auth, `POST /auth/refresh`
//! for token renewal, and the cart/wishlist/catalog endpoints. Tests drive
//! a fully wired [`AppState`] against it.
//!
//! # Fixed test data
//!
//! - Users: `alice`/`secret1` (customer), `admin`/`admin-pw` (admin);
//!   registering the username `taken` conflicts.
//! - Products: `p-42` (Terracotta Planter, $19.99), `p-7` (Enamel Mug,
//!   $12.00).
//! - Coupon: `WELCOME10` is the only valid code.
//!
//! # Fault injection
//!
//! [`MockBackend`] exposes switches that make individual endpoints fail or
//! answer 401 unconditionally, plus [`MockBackend::expire_all_tokens`] to
//! simulate access-token expiry and [`MockBackend::refresh_calls`] to count
//! refresh round trips.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;

use clementine_client::config::ClientConfig;
use clementine_client::notify::RecordingNotifier;
use clementine_client::state::AppState;

// =============================================================================
// Backend state
// =============================================================================

#[derive(Default)]
struct BackendState {
    /// Currently valid access tokens.
    tokens: Mutex<HashSet<String>>,
    next_token: AtomicU64,
    refresh_calls: AtomicU64,

    // Fault switches
    refresh_should_fail: AtomicBool,
    cart_get_should_fail: AtomicBool,
    cart_always_unauthorized: AtomicBool,
    wishlist_get_should_fail: AtomicBool,
    wishlist_add_should_fail: AtomicBool,
    wishlist_remove_should_fail: AtomicBool,

    /// Server-side cart: product id -> quantity.
    cart: Mutex<BTreeMap<String, u32>>,
    /// Server-side wishlist, in insertion order.
    wishlist: Mutex<Vec<String>>,
}

impl BackendState {
    fn issue_token(&self) -> String {
        let n = self.next_token.fetch_add(1, Ordering::AcqRel) + 1;
        let token = format!("tok-{n}");
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(token.clone());
        token
    }

    fn token_is_valid(&self, token: &str) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(token)
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"message": message}))).into_response()
}

fn product_json(id: &str) -> Option<Value> {
    match id {
        "p-42" => Some(json!({
            "id": "p-42",
            "name": "Terracotta Planter",
            "price": {"amount": "19.99", "currencyCode": "USD"},
            "imageUrl": "https://img.example/p-42.jpg",
        })),
        "p-7" => Some(json!({
            "id": "p-7",
            "name": "Enamel Mug",
            "price": {"amount": "12.00", "currencyCode": "USD"},
        })),
        _ => None,
    }
}

fn known_credentials(username: &str, password: &str) -> Option<&'static str> {
    match (username, password) {
        ("alice", "secret1") => Some("customer"),
        ("admin", "admin-pw") => Some("admin"),
        _ => None,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
}

fn require_auth(state: &BackendState, headers: &HeaderMap) -> Result<(), Response> {
    let authorized = bearer_token(headers).is_some_and(|t| state.token_is_valid(&t));
    if authorized {
        Ok(())
    } else {
        Err(error_body(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn login(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    match known_credentials(username, password) {
        Some(role) => Json(json!({
            "accessToken": state.issue_token(),
            "principalId": username,
            "role": role,
        }))
        .into_response(),
        None => error_body(StatusCode::UNAUTHORIZED, "Invalid credentials"),
    }
}

async fn register(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default();
    if username == "taken" {
        return error_body(StatusCode::CONFLICT, "Username already exists");
    }

    Json(json!({
        "accessToken": state.issue_token(),
        "principalId": username,
        "role": "customer",
    }))
    .into_response()
}

async fn refresh(State(state): State<Arc<BackendState>>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::AcqRel);

    if state.refresh_should_fail.load(Ordering::Acquire) {
        return error_body(StatusCode::UNAUTHORIZED, "Refresh token expired");
    }

    Json(json!({"accessToken": state.issue_token()})).into_response()
}

async fn get_product(
    State(_state): State<Arc<BackendState>>,
    Path(id): Path<String>,
) -> Response {
    match product_json(&id) {
        Some(product) => Json(product).into_response(),
        None => error_body(StatusCode::NOT_FOUND, "Product not found"),
    }
}

async fn get_cart(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if state.cart_always_unauthorized.load(Ordering::Acquire) {
        return error_body(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }
    if state.cart_get_should_fail.load(Ordering::Acquire) {
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Cart unavailable");
    }

    let cart = state
        .cart
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let lines: Vec<Value> = cart
        .iter()
        .filter_map(|(id, quantity)| {
            product_json(id).map(|product| {
                json!({"productId": id, "quantity": quantity, "product": product})
            })
        })
        .collect();
    Json(lines).into_response()
}

async fn cart_add(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if state.cart_always_unauthorized.load(Ordering::Acquire) {
        return error_body(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }

    let id = body["productId"].as_str().unwrap_or_default().to_owned();
    if product_json(&id).is_none() {
        return error_body(StatusCode::NOT_FOUND, "Product not found");
    }
    let quantity = u32::try_from(body["quantity"].as_u64().unwrap_or(1)).unwrap_or(1);

    *state
        .cart
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .entry(id)
        .or_insert(0) += quantity;
    StatusCode::OK.into_response()
}

async fn cart_remove(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }

    let id = body["productId"].as_str().unwrap_or_default();
    state
        .cart
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .remove(id);
    StatusCode::OK.into_response()
}

async fn cart_update(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }

    let id = body["productId"].as_str().unwrap_or_default().to_owned();
    let quantity = u32::try_from(body["quantity"].as_u64().unwrap_or(0)).unwrap_or(0);

    let mut cart = state
        .cart
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if quantity == 0 {
        cart.remove(&id);
    } else {
        cart.insert(id, quantity);
    }
    StatusCode::OK.into_response()
}

async fn cart_apply_coupon(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }

    if body["code"].as_str() == Some("WELCOME10") {
        StatusCode::OK.into_response()
    } else {
        error_body(StatusCode::BAD_REQUEST, "Invalid coupon")
    }
}

async fn place_order(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }

    let mut cart = state
        .cart
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if cart.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "Cart is empty");
    }
    cart.clear();
    Json(json!({"orderId": "ord-1"})).into_response()
}

async fn get_wishlist(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }
    if state.wishlist_get_should_fail.load(Ordering::Acquire) {
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Wishlist unavailable");
    }

    let wishlist = state
        .wishlist
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    Json(wishlist.clone()).into_response()
}

async fn wishlist_add(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }
    if state.wishlist_add_should_fail.load(Ordering::Acquire) {
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Wishlist unavailable");
    }

    let id = body["productId"].as_str().unwrap_or_default().to_owned();
    let mut wishlist = state
        .wishlist
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if !wishlist.contains(&id) {
        wishlist.push(id);
    }
    StatusCode::OK.into_response()
}

async fn wishlist_remove(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = require_auth(&state, &headers) {
        return resp;
    }
    if state.wishlist_remove_should_fail.load(Ordering::Acquire) {
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Wishlist unavailable");
    }

    let id = body["productId"].as_str().unwrap_or_default();
    state
        .wishlist
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .retain(|p| p != id);
    StatusCode::OK.into_response()
}

// =============================================================================
// Public harness
// =============================================================================

/// Handle to a running mock backend.
pub struct MockBackend {
    state: Arc<BackendState>,
    addr: SocketAddr,
}

impl MockBackend {
    /// Start the backend on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound (test environment problem).
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());

        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/auth/refresh", post(refresh))
            .route("/products/{id}", get(get_product))
            .route("/cart", get(get_cart))
            .route("/cart/add", post(cart_add))
            .route("/cart/remove", post(cart_remove))
            .route("/cart/update", post(cart_update))
            .route("/cart/apply-coupon", post(cart_apply_coupon))
            .route("/orders", post(place_order))
            .route("/wishlist", get(get_wishlist))
            .route("/wishlist/add", post(wishlist_add))
            .route("/wishlist/remove", post(wishlist_remove))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock backend");
        });

        Self { state, addr }
    }

    /// Base URL of the running backend.
    ///
    /// # Panics
    ///
    /// Panics if the socket address does not form a valid URL (cannot
    /// happen for a bound listener).
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("valid base url")
    }

    /// Invalidate every issued access token; the next authenticated request
    /// will 401 and force the client through a refresh.
    pub fn expire_all_tokens(&self) {
        self.state
            .tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    /// Number of `POST /auth/refresh` calls observed so far.
    #[must_use]
    pub fn refresh_calls(&self) -> u64 {
        self.state.refresh_calls.load(Ordering::Acquire)
    }

    /// Make `POST /auth/refresh` answer 401 from now on.
    pub fn fail_refresh(&self) {
        self.state.refresh_should_fail.store(true, Ordering::Release);
    }

    /// Make `GET /cart` answer 500 from now on.
    pub fn fail_cart_get(&self) {
        self.state
            .cart_get_should_fail
            .store(true, Ordering::Release);
    }

    /// Make the cart endpoints answer 401 regardless of the token.
    pub fn cart_always_unauthorized(&self) {
        self.state
            .cart_always_unauthorized
            .store(true, Ordering::Release);
    }

    /// Make `GET /wishlist` answer 500 from now on.
    pub fn fail_wishlist_get(&self) {
        self.state
            .wishlist_get_should_fail
            .store(true, Ordering::Release);
    }

    /// Make `POST /wishlist/add` answer 500 from now on.
    pub fn fail_wishlist_add(&self) {
        self.state
            .wishlist_add_should_fail
            .store(true, Ordering::Release);
    }

    /// Make `POST /wishlist/remove` answer 500 from now on.
    pub fn fail_wishlist_remove(&self) {
        self.state
            .wishlist_remove_should_fail
            .store(true, Ordering::Release);
    }

    /// Server-side cart contents (product id -> quantity).
    #[must_use]
    pub fn server_cart(&self) -> BTreeMap<String, u32> {
        self.state
            .cart
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Server-side wishlist contents.
    #[must_use]
    pub fn server_wishlist(&self) -> Vec<String> {
        self.state
            .wishlist
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// A wired client against a private mock backend and a private state dir.
pub struct TestContext {
    /// The mock backend, for fault injection and server-side assertions.
    pub backend: MockBackend,
    /// Fully wired client state under test.
    pub state: AppState,
    /// Captured notifications.
    pub notifier: Arc<RecordingNotifier>,
    state_dir: TempDir,
}

impl TestContext {
    /// Start a backend and wire a fresh client against it.
    ///
    /// # Panics
    ///
    /// Panics if the backend cannot start or the state store cannot be
    /// opened.
    pub async fn new() -> Self {
        let backend = MockBackend::start().await;
        let state_dir = tempfile::tempdir().expect("tempdir");

        let (state, notifier) = Self::wire(&backend, state_dir.path());
        Self {
            backend,
            state,
            notifier,
            state_dir,
        }
    }

    /// Simulate an application restart: a fresh [`AppState`] (and a fresh
    /// notifier) over the same persisted state and the same backend.
    ///
    /// # Panics
    ///
    /// Panics if the state store cannot be reopened.
    pub fn restart(&mut self) {
        let (state, notifier) = Self::wire(&self.backend, self.state_dir.path());
        self.state = state;
        self.notifier = notifier;
    }

    fn wire(
        backend: &MockBackend,
        state_dir: &std::path::Path,
    ) -> (AppState, Arc<RecordingNotifier>) {
        let config = ClientConfig {
            api_base_url: backend.base_url(),
            state_dir: state_dir.to_path_buf(),
            profile: "default".to_owned(),
        };
        let notifier = RecordingNotifier::shared();
        let state = AppState::new(config, notifier.clone()).expect("wire app state");
        (state, notifier)
    }

    /// Log in as the stock customer account.
    ///
    /// # Panics
    ///
    /// Panics if the login is rejected.
    pub async fn login_as_alice(&self) {
        let password = secrecy::SecretString::from("secret1");
        assert!(
            self.state.session.login("alice", &password).await,
            "stock login must succeed"
        );
    }
}
