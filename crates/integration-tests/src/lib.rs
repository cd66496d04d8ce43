//! Integration test support for the LTRQ storefront.
//!
//! [`Upstream`] is a single axum server standing in for every service the
//! storefront talks to: the remote cart store, the product table, the
//! completion endpoint and the identity provider. It records what it
//! receives so tests can assert on the wire traffic of the real clients.
//!
//! ```text
//! GET   /cart/fetch                          cart store read (Bearer)
//! POST  /cart/sync                           cart store write (Bearer)
//! GET   /rows/                               catalog list (Token)
//! POST  /rows/                               catalog create
//! PATCH /rows/{id}/                          catalog update
//! POST  /v1/chat/completions                 completion (Bearer)
//! POST  /identity/{method}?key=              sign-in / sign-up
//! POST  /securetoken/token?key=              ID token refresh
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Form, Json, Router};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tower::ServiceExt;
use url::Url;

use ltrq_storefront::config::{
    AssistantConfig, CartStoreConfig, CatalogConfig, IdentityConfig, StorefrontConfig,
};

pub const CATALOG_TOKEN: &str = "catalog-token-for-tests";
pub const OPENAI_KEY: &str = "sk-test-completions";
pub const FIREBASE_KEY: &str = "firebase-web-key";

/// How the completion endpoint answers.
#[derive(Debug, Clone)]
pub enum CompletionReply {
    Text(String),
    Status { status: StatusCode, body: Value, retry_after: Option<u64> },
}

/// Everything the upstream has seen, plus its scripted data.
#[derive(Debug)]
pub struct Recorded {
    /// Rows of the product table, in store casing, with `id`.
    pub products: Vec<Value>,
    /// Cart returned by `GET /cart/fetch`; `None` answers 500.
    pub stored_cart: Option<Value>,
    /// Answer `POST /cart/sync` with a 500 and this error message.
    pub reject_sync: Option<String>,
    pub cart_fetch_auth: Vec<String>,
    pub cart_writes: Vec<(String, Value)>,
    pub catalog_auth: Vec<String>,
    pub catalog_queries: Vec<String>,
    pub catalog_reads: usize,
    pub completion_reply: CompletionReply,
    pub completion_auth: Vec<String>,
    pub completion_requests: Vec<Value>,
    /// email -> (password, local id)
    pub accounts: HashMap<String, (String, String)>,
    pub identity_calls: Vec<(String, Value)>,
    pub refresh_forms: Vec<HashMap<String, String>>,
    pub issued_tokens: usize,
    /// `expiresIn` handed out with every ID token.
    pub expires_in: String,
}

impl Default for Recorded {
    fn default() -> Self {
        Self {
            products: Vec::new(),
            stored_cart: Some(json!([])),
            reject_sync: None,
            cart_fetch_auth: Vec::new(),
            cart_writes: Vec::new(),
            catalog_auth: Vec::new(),
            catalog_queries: Vec::new(),
            catalog_reads: 0,
            completion_reply: CompletionReply::Text("Happy to help!".to_string()),
            completion_auth: Vec::new(),
            completion_requests: Vec::new(),
            accounts: HashMap::new(),
            identity_calls: Vec::new(),
            refresh_forms: Vec::new(),
            issued_tokens: 0,
            expires_in: "3600".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpstreamState {
    inner: Arc<Mutex<Recorded>>,
}

impl UpstreamState {
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().await
    }
}

/// A running mock upstream.
pub struct Upstream {
    pub state: UpstreamState,
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Upstream {
    /// Start the mock on an ephemeral port.
    pub async fn start(recorded: Recorded) -> Self {
        let state = UpstreamState {
            inner: Arc::new(Mutex::new(recorded)),
        };

        let app = Router::new()
            .route("/cart/fetch", get(cart_fetch))
            .route("/cart/sync", post(cart_sync))
            .route("/rows/", get(rows_list).post(rows_create))
            .route("/rows/{id}/", patch(rows_update))
            .route("/v1/chat/completions", post(completions))
            .route("/identity/{method}", post(identity))
            .route("/securetoken/token", post(refresh))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let local_addr = listener
            .local_addr()
            .expect("listener address should resolve");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

            server.await.expect("test server should run");
        });

        Self {
            state,
            base_url: format!("http://{local_addr}"),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("{}{path}", self.base_url)).expect("mock url should parse")
    }

    /// Storefront configuration pointing every client at this mock.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        StorefrontConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            cart: CartStoreConfig {
                sync_url: self.url("/cart/sync"),
                fetch_url: self.url("/cart/fetch"),
                debounce: Duration::from_millis(50),
            },
            catalog: CatalogConfig {
                rows_url: self.url("/rows/"),
                api_token: SecretString::from(CATALOG_TOKEN),
            },
            assistant: AssistantConfig {
                api_key: Some(SecretString::from(OPENAI_KEY)),
                completions_url: self.url("/v1/chat/completions"),
                model: "gpt-3.5-turbo".to_string(),
                max_tokens: 150,
            },
            identity: IdentityConfig {
                api_key: SecretString::from(FIREBASE_KEY),
                identity_base_url: self.url("/identity/"),
                token_base_url: self.url("/securetoken/"),
            },
            http_timeout: Duration::from_secs(5),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Stop the server and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.expect("server task should join");
        }
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// =============================================================================
// Catalog fixtures
// =============================================================================

/// A product row as the store returns it.
#[must_use]
pub fn product_row(id: i64, item_id: i64, name: &str, stock: i64) -> Value {
    json!({
        "id": id,
        "itemID": item_id,
        "itemName": name,
        "price": "39.99",
        "stockQuantity": stock,
        "color": "Blue",
        "itemSize": "M",
        "material": "Denim",
        "dimension": "N/A",
        "status": "Active",
        "SKU": format!("SKU-{item_id}"),
        "categoryID": "bottoms",
        "subCategoryID": "jeans",
        "discount": 0,
        "isOnSale": false,
        "averageRating": "4.5",
        "reviewCount": 12
    })
}

// =============================================================================
// Mock handlers
// =============================================================================

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn cart_fetch(State(state): State<UpstreamState>, headers: HeaderMap) -> Response {
    let mut recorded = state.lock().await;
    recorded
        .cart_fetch_auth
        .push(header_value(&headers, header::AUTHORIZATION));

    match recorded.stored_cart.clone() {
        Some(cart) => Json(json!({ "cart": cart })).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Cart not readable" })),
        )
            .into_response(),
    }
}

async fn cart_sync(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut recorded = state.lock().await;
    recorded
        .cart_writes
        .push((header_value(&headers, header::AUTHORIZATION), body));

    match recorded.reject_sync.clone() {
        Some(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": message })),
        )
            .into_response(),
        None => Json(json!({ "ok": true })).into_response(),
    }
}

fn catalog_authorized(recorded: &mut Recorded, headers: &HeaderMap) -> bool {
    let auth = header_value(headers, header::AUTHORIZATION);
    let ok = auth == format!("Token {CATALOG_TOKEN}");
    recorded.catalog_auth.push(auth);
    ok
}

async fn rows_list(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut recorded = state.lock().await;
    if !catalog_authorized(&mut recorded, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "bad token" }))).into_response();
    }
    recorded.catalog_reads += 1;
    recorded.catalog_queries.push(
        query
            .get("user_field_names")
            .cloned()
            .unwrap_or_default(),
    );

    let products = recorded.products.clone();
    Json(json!({ "count": products.len(), "results": products })).into_response()
}

async fn rows_create(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    Json(mut row): Json<Value>,
) -> Response {
    let mut recorded = state.lock().await;
    if !catalog_authorized(&mut recorded, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let next_id = i64::try_from(recorded.products.len()).unwrap_or(0) + 1000;
    row["id"] = json!(next_id);
    recorded.products.push(row.clone());
    (StatusCode::OK, Json(row)).into_response()
}

async fn rows_update(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<Value>,
) -> Response {
    let mut recorded = state.lock().await;
    if !catalog_authorized(&mut recorded, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let Some(row) = recorded
        .products
        .iter_mut()
        .find(|row| row["id"].as_i64() == Some(id))
    else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "ERROR_ROW_DOES_NOT_EXIST" })))
            .into_response();
    };

    if let (Some(row), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            row.insert(key.clone(), value.clone());
        }
    }
    Json(row.clone()).into_response()
}

async fn completions(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut recorded = state.lock().await;
    recorded
        .completion_auth
        .push(header_value(&headers, header::AUTHORIZATION));
    recorded.completion_requests.push(body);

    match recorded.completion_reply.clone() {
        CompletionReply::Text(text) => Json(json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": text }, "finish_reason": "stop" }
            ]
        }))
        .into_response(),
        CompletionReply::Status {
            status,
            body,
            retry_after,
        } => {
            let mut response = (status, Json(body)).into_response();
            if let Some(seconds) = retry_after {
                response
                    .headers_mut()
                    .insert("Retry-After", seconds.to_string().parse().unwrap());
            }
            response
        }
    }
}

fn provider_error(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": { "code": 400, "message": message } })),
    )
        .into_response()
}

fn issue_tokens(recorded: &mut Recorded) -> (String, String) {
    recorded.issued_tokens += 1;
    (
        format!("id-token-{}", recorded.issued_tokens),
        format!("refresh-token-{}", recorded.issued_tokens),
    )
}

async fn identity(
    State(state): State<UpstreamState>,
    Path(method): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let mut recorded = state.lock().await;
    recorded.identity_calls.push((method.clone(), body.clone()));

    if query.get("key").map(String::as_str) != Some(FIREBASE_KEY) {
        return provider_error("API_KEY_INVALID");
    }

    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();

    let local_id = match method.as_str() {
        "accounts:signInWithPassword" => match recorded.accounts.get(&email) {
            None => return provider_error("EMAIL_NOT_FOUND"),
            Some((expected, _)) if *expected != password => {
                return provider_error("INVALID_PASSWORD");
            }
            Some((_, local_id)) => local_id.clone(),
        },
        "accounts:signUp" => {
            if recorded.accounts.contains_key(&email) {
                return provider_error("EMAIL_EXISTS");
            }
            let local_id = format!("uid-{}", recorded.accounts.len() + 1);
            recorded
                .accounts
                .insert(email.clone(), (password, local_id.clone()));
            local_id
        }
        _ => return provider_error("OPERATION_NOT_ALLOWED"),
    };

    let (id_token, refresh_token) = issue_tokens(&mut recorded);
    Json(json!({
        "kind": "identitytoolkit#VerifyPasswordResponse",
        "localId": local_id,
        "email": email,
        "idToken": id_token,
        "refreshToken": refresh_token,
        "expiresIn": recorded.expires_in
    }))
    .into_response()
}

async fn refresh(
    State(state): State<UpstreamState>,
    Query(query): Query<HashMap<String, String>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut recorded = state.lock().await;
    recorded.refresh_forms.push(form.clone());

    if query.get("key").map(String::as_str) != Some(FIREBASE_KEY) {
        return provider_error("API_KEY_INVALID");
    }
    if form.get("refresh_token").is_none_or(|token| token == "revoked") {
        return provider_error("INVALID_REFRESH_TOKEN");
    }

    let (id_token, refresh_token) = issue_tokens(&mut recorded);
    Json(json!({
        "id_token": id_token,
        "refresh_token": refresh_token,
        "expires_in": recorded.expires_in,
        "token_type": "Bearer"
    }))
    .into_response()
}

// =============================================================================
// Router client
// =============================================================================

/// JSON response from the storefront router.
#[derive(Debug)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Drives the storefront router like a browser, keeping the session cookie.
pub struct TestClient {
    app: Router,
    cookie: Option<String>,
}

impl TestClient {
    #[must_use]
    pub const fn new(app: Router) -> Self {
        Self { app, cookie: None }
    }

    pub async fn get(&mut self, uri: &str) -> JsonResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&mut self, uri: &str, body: Value) -> JsonResponse {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn send(&mut self, method: Method, uri: &str, body: Option<Value>) -> JsonResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request should build"),
            None => builder.body(Body::empty()).expect("request should build"),
        };

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("request should succeed");

        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            self.cookie = set_cookie.split(';').next().map(str::to_string);
        }

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should read");
        let body = serde_json::from_slice::<Value>(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));

        JsonResponse { status, body }
    }
}
