//! Request construction
//!
//! A `RequestPlan` captures everything needed to build one request, and
//! can build it more than once: a replay after a session refresh reuses
//! the same plan. Building is pure apart from the bearer value handed in
//! by the caller, which is read fresh per attempt so replays pick up
//! rotated tokens.

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::warn;

/// Endpoints whose 401 responses pass through untouched.
///
/// These are the unauthenticated auth flows; a 401 from them means bad
/// input, not an expired session, so they must never trigger recovery.
pub const PUBLIC_ENDPOINTS: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/refresh",
    "/auth/reset-password",
    "/auth/verify-email",
];

/// Whether a 401 from this endpoint should skip session recovery.
pub fn is_public_endpoint(endpoint: &str) -> bool {
    PUBLIC_ENDPOINTS
        .iter()
        .any(|public| endpoint.contains(public))
}

/// Join an endpoint onto the base URL with exactly one slash between
/// them. Endpoints that already carry a scheme pass through verbatim.
pub fn join_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Body variants the pipeline can rebuild for a replay.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(UploadPayload),
}

/// An owned multipart upload.
///
/// Keeps the raw bytes and fields so the form can be re-created for every
/// attempt; `reqwest::multipart::Form` itself is consumed on send.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    file_field: String,
    file_name: String,
    bytes: Vec<u8>,
    fields: Vec<(String, String)>,
}

impl UploadPayload {
    /// File upload under the backend's default part name `"file"`.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_field: "file".into(),
            file_name: file_name.into(),
            bytes,
            fields: Vec::new(),
        }
    }

    /// Override the part name the backend expects for the file.
    pub fn file_field(mut self, name: impl Into<String>) -> Self {
        self.file_field = name.into();
        self
    }

    /// Attach an extra form field; the value is string-coerced.
    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    fn to_form(&self) -> Form {
        let part = Part::bytes(self.bytes.clone()).file_name(self.file_name.clone());
        let mut form = Form::new().part(self.file_field.clone(), part);
        for (key, value) in &self.fields {
            form = form.text(key.clone(), value.clone());
        }
        form
    }
}

/// Everything needed to build (and rebuild) one request.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub method: Method,
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl RequestPlan {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Attach a multipart body.
    pub fn multipart(mut self, payload: UploadPayload) -> Self {
        self.body = RequestBody::Multipart(payload);
        self
    }

    /// Attach caller headers. The pipeline still owns `Authorization` and
    /// `Content-Type`; see [`RequestPlan::build`].
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Serialize query parameters from a JSON object.
    ///
    /// `Null` values are skipped entirely. Strings go through bare;
    /// everything else uses its JSON rendering.
    pub fn query_from(mut self, params: &Value) -> Self {
        if let Some(map) = params.as_object() {
            for (key, value) in map {
                match value {
                    Value::Null => continue,
                    Value::String(s) => self.query.push((key.clone(), s.clone())),
                    other => self.query.push((key.clone(), other.to_string())),
                }
            }
        }
        self
    }

    /// Assemble the wire request.
    ///
    /// Header order: caller headers first, then the bearer override when a
    /// token is present, then `Content-Type: application/json` for
    /// everything except multipart (the transport computes the multipart
    /// boundary itself).
    pub(crate) fn build(
        &self,
        http: &reqwest::Client,
        url: &str,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut headers = self.headers.clone();
        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => {
                    warn!("stored access token is not a valid header value, sending without it");
                }
            }
        }
        if !matches!(self.body, RequestBody::Multipart(_)) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let mut request = http.request(self.method.clone(), url).headers(headers);
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }
        match &self.body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(value),
            RequestBody::Multipart(payload) => request.multipart(payload.to_form()),
        }
    }
}
