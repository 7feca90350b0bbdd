//! Session refresh against the backend
//!
//! One wire interaction: `POST <base>/auth/refresh?refreshToken=<token>`
//! with no body. The backend returns rotated tokens either top-level or
//! nested under `data`; both shapes are accepted, including mixed ones.
//!
//! Failure classification drives the caller's recovery: a 5xx response or
//! a transport failure is transient (the session is still worth keeping),
//! while any other rejection means the refresh token itself is dead.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Rotated tokens from a successful refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    /// Some backends omit the rotated refresh token; the caller keeps the
    /// old one in that case.
    pub refresh_token: Option<String>,
}

/// Raw refresh response shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    data: Option<RefreshData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl RefreshResponse {
    /// Prefer top-level tokens, fall back to the nested payload.
    fn into_pair(self) -> Option<TokenPair> {
        let (nested_access, nested_refresh) = match self.data {
            Some(data) => (data.access_token, data.refresh_token),
            None => (None, None),
        };
        let access_token = self.access_token.or(nested_access)?;
        Some(TokenPair {
            access_token,
            refresh_token: self.refresh_token.or(nested_refresh),
        })
    }
}

/// Exchange a refresh token for a rotated token pair.
pub async fn refresh_session(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
) -> Result<TokenPair> {
    let url = format!("{}/auth/refresh", base_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .query(&[("refreshToken", refresh)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 5xx is the backend's problem, not the token's
        if status.is_server_error() {
            return Err(Error::RefreshFailed(format!(
                "refresh endpoint returned {status}: {body}"
            )));
        }

        return Err(Error::RefreshRejected(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let payload = response
        .json::<RefreshResponse>()
        .await
        .map_err(|e| Error::RefreshRejected(format!("invalid refresh response: {e}")))?;

    payload
        .into_pair()
        .ok_or_else(|| Error::RefreshRejected("refresh response carried no access token".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn pair_prefers_top_level_tokens() {
        let response: RefreshResponse = serde_json::from_str(
            r#"{"accessToken":"at_top","refreshToken":"rt_top","data":{"accessToken":"at_nested"}}"#,
        )
        .unwrap();
        let pair = response.into_pair().unwrap();
        assert_eq!(pair.access_token, "at_top");
        assert_eq!(pair.refresh_token.as_deref(), Some("rt_top"));
    }

    #[test]
    fn pair_falls_back_to_nested_tokens() {
        let response: RefreshResponse = serde_json::from_str(
            r#"{"success":true,"data":{"accessToken":"at_n","refreshToken":"rt_n"}}"#,
        )
        .unwrap();
        let pair = response.into_pair().unwrap();
        assert_eq!(pair.access_token, "at_n");
        assert_eq!(pair.refresh_token.as_deref(), Some("rt_n"));
    }

    #[test]
    fn pair_allows_mixed_shapes() {
        let response: RefreshResponse = serde_json::from_str(
            r#"{"accessToken":"at_top","data":{"refreshToken":"rt_nested"}}"#,
        )
        .unwrap();
        let pair = response.into_pair().unwrap();
        assert_eq!(pair.access_token, "at_top");
        assert_eq!(pair.refresh_token.as_deref(), Some("rt_nested"));
    }

    #[test]
    fn pair_requires_an_access_token() {
        let response: RefreshResponse =
            serde_json::from_str(r#"{"success":true,"message":"ok"}"#).unwrap();
        assert!(response.into_pair().is_none());
    }

    #[tokio::test]
    async fn refresh_sends_token_as_query_param() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(query_param("refreshToken", "rt_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "at_2",
                "refreshToken": "rt_2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let pair = refresh_session(&client, &server.uri(), "rt_1").await.unwrap();
        assert_eq!(pair.access_token, "at_2");
        assert_eq!(pair.refresh_token.as_deref(), Some("rt_2"));
    }

    #[tokio::test]
    async fn refresh_5xx_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = refresh_session(&client, &server.uri(), "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RefreshFailed(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_4xx_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "message": "token revoked" })),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = refresh_session(&client, &server.uri(), "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RefreshRejected(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_without_access_token_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = refresh_session(&client, &server.uri(), "rt_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RefreshRejected(_)), "got: {err:?}");
    }
}
