//! Client facade and request pipeline
//!
//! Every request flows through one pipeline: build from a plan, send with
//! the current access token, and on a 401 from a non-public endpoint run
//! exactly one coordinated refresh and replay the plan once. Responses are
//! normalized into the shared envelope shape before callers see them.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use common::Envelope;
use ryde_auth::{AuthEvent, AuthEvents, SessionStore};

use crate::api::{AuthApi, BookingsApi, TransactionsApi, VehiclesApi};
use crate::error::{Error, Result};
use crate::metrics;
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::request::{RequestPlan, UploadPayload, is_public_endpoint, join_url};
use crate::response::normalize;

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ryde API client.
///
/// Cheap to clone; clones share one session store, one HTTP connection
/// pool, and one refresh coordinator, so concurrent callers never race
/// each other into duplicate refresh calls.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ryde_client::{RydeClient, SessionStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SessionStore::load("ryde-session.json".into()).await?;
/// let client = RydeClient::builder()
///     .base_url("https://api.ryde.example")
///     .session_store(Arc::new(store))
///     .build()?;
///
/// let profile = client.auth().profile().await?;
/// println!("signed in as {}", profile.email);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RydeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
    coordinator: RefreshCoordinator,
}

impl RydeClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client from `RYDE_API_BASE_URL` and `RYDE_SESSION_FILE`.
    ///
    /// The base URL is required; the session file defaults to
    /// `ryde-session.json` in the working directory.
    pub async fn from_env() -> Result<Self> {
        let base_url = std::env::var("RYDE_API_BASE_URL")
            .map_err(|_| Error::Config("RYDE_API_BASE_URL is not set".into()))?;
        let session_file = std::env::var("RYDE_SESSION_FILE")
            .unwrap_or_else(|_| String::from("ryde-session.json"));
        let store = SessionStore::load(session_file.into())
            .await
            .map_err(|e| Error::Config(format!("loading session state: {e}")))?;
        Self::builder()
            .base_url(base_url)
            .session_store(Arc::new(store))
            .build()
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The session store backing this client.
    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    /// Subscribe to session expiry notifications.
    ///
    /// A message arrives when a refresh attempt is rejected outright and
    /// the local session has been torn down. Logging out does not fire it.
    pub fn subscribe_auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.coordinator.subscribe()
    }

    /// Refresh the session outside the 401 path, e.g. from a timer.
    ///
    /// Joins a refresh already in flight instead of starting another.
    pub async fn refresh_session(&self) -> Result<()> {
        match self.inner.coordinator.refresh().await {
            RefreshOutcome::Refreshed => Ok(()),
            RefreshOutcome::SessionExpired => Err(Error::SessionExpired),
            RefreshOutcome::Transient(reason) => Err(Error::RefreshFailed(reason)),
        }
    }

    /// Access the auth API.
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    /// Access the vehicles API.
    pub fn vehicles(&self) -> VehiclesApi {
        VehiclesApi::new(self.clone())
    }

    /// Access the bookings API.
    pub fn bookings(&self) -> BookingsApi {
        BookingsApi::new(self.clone())
    }

    /// Access the transactions API.
    pub fn transactions(&self) -> TransactionsApi {
        TransactionsApi::new(self.clone())
    }

    /// Make a GET request, with optional query parameters.
    pub async fn get(&self, endpoint: &str, params: Option<&Value>) -> Result<Envelope> {
        let mut plan = RequestPlan::new(Method::GET, endpoint);
        if let Some(params) = params {
            plan = plan.query_from(params);
        }
        self.execute(plan).await
    }

    /// Make a POST request with a JSON body.
    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Envelope> {
        self.execute(RequestPlan::new(Method::POST, endpoint).json(body))
            .await
    }

    /// Make a PUT request with a JSON body.
    pub async fn put(&self, endpoint: &str, body: Value) -> Result<Envelope> {
        self.execute(RequestPlan::new(Method::PUT, endpoint).json(body))
            .await
    }

    /// Make a PATCH request with a JSON body.
    pub async fn patch(&self, endpoint: &str, body: Value) -> Result<Envelope> {
        self.execute(RequestPlan::new(Method::PATCH, endpoint).json(body))
            .await
    }

    /// Make a DELETE request.
    pub async fn delete(&self, endpoint: &str) -> Result<Envelope> {
        self.execute(RequestPlan::new(Method::DELETE, endpoint)).await
    }

    /// Upload a file as multipart form data.
    pub async fn upload_file(&self, endpoint: &str, payload: UploadPayload) -> Result<Envelope> {
        self.execute(RequestPlan::new(Method::POST, endpoint).multipart(payload))
            .await
    }

    /// Execute a custom request plan through the full pipeline.
    pub async fn request(&self, plan: RequestPlan) -> Result<Envelope> {
        self.execute(plan).await
    }

    async fn execute(&self, plan: RequestPlan) -> Result<Envelope> {
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        let url = join_url(&self.inner.base_url, &plan.endpoint);
        debug!(
            %request_id,
            method = %plan.method,
            endpoint = %plan.endpoint,
            "sending request"
        );

        let mut response = self.dispatch(&url, &plan).await?;

        if response.status().as_u16() == 401 && !is_public_endpoint(&plan.endpoint) {
            debug!(%request_id, endpoint = %plan.endpoint, "unauthorized, coordinating refresh");
            match self.inner.coordinator.refresh().await {
                RefreshOutcome::Refreshed => {
                    // Replay once with the rotated token; a second 401 falls
                    // through to normalization like any other status.
                    response = self.dispatch(&url, &plan).await?;
                }
                RefreshOutcome::SessionExpired => return Err(Error::SessionExpired),
                RefreshOutcome::Transient(reason) => return Err(Error::RefreshFailed(reason)),
            }
        }

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading response body: {e}")))?;
        metrics::record_request(plan.method.as_str(), status);

        let result = normalize(status, &text);
        if let Err(e) = &result {
            debug!(%request_id, status, error = %e, "request resolved to an error");
        }
        result
    }

    /// One wire attempt. Reads the access token fresh each time so a
    /// replay after refresh picks up the rotated token.
    async fn dispatch(&self, url: &str, plan: &RequestPlan) -> Result<reqwest::Response> {
        let token = self.inner.store.access_token().await;
        plan.build(&self.inner.http, url, token.as_deref())
            .send()
            .await
            .map_err(|e| Error::Http(format!("request to {url} failed: {e}")))
    }
}

impl std::fmt::Debug for RydeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Session state stays out of Debug output; it holds live tokens
        f.debug_struct("RydeClient")
            .field("base_url", &self.inner.base_url)
            .finish_non_exhaustive()
    }
}

/// Builder for creating a [`RydeClient`].
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    store: Option<Arc<SessionStore>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            store: None,
        }
    }

    /// Set the API base URL. Required, and must be absolute.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the session store. Required.
    pub fn session_store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RydeClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "base_url must be absolute, got {base_url:?}"
            )));
        }
        let store = self
            .store
            .ok_or_else(|| Error::Config("a session store is required".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;

        let coordinator = RefreshCoordinator::new(
            http.clone(),
            base_url.clone(),
            store.clone(),
            AuthEvents::new(),
        );

        Ok(RydeClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                store,
                coordinator,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
