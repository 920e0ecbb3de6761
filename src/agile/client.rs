//! HTTP access to the JIRA Agile REST API
//!
//! The sync core talks to the provider only through [`AgileApi`], which
//! returns raw JSON for a path under the agile base. [`JiraAgileClient`] is
//! the reqwest implementation; tests substitute canned responses.

use super::retry::{with_retry, RetryConfig};
use crate::{AgileSyncError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Base path of the agile API below the site URL
pub const AGILE_API_PATH: &str = "rest/agile/1.0";

/// Per-request timeout for agile list and detail calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only access to the agile API
#[async_trait]
pub trait AgileApi: Send + Sync {
    /// GET `path` (relative to the agile base) with `query`.
    ///
    /// A 404 must surface as [`AgileSyncError::NotFound`] so list fetchers
    /// can treat it as an empty result.
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value>;
}

/// How requests authenticate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// API token sent as `Authorization: Bearer`
    Bearer(String),
    /// Username and password (or API token) via HTTP basic auth
    Basic { username: String, password: String },
    /// Anonymous access (public instances, tests)
    #[default]
    None,
}

/// reqwest-backed agile API client
pub struct JiraAgileClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    retry: RetryConfig,
}

impl JiraAgileClient {
    /// Create a client for the site at `api_url` (e.g. `https://acme.atlassian.net`)
    pub fn new(api_url: &str, credentials: Credentials, retry: RetryConfig) -> Result<Self> {
        let api_url = api_url.trim_end_matches('/');
        if api_url.is_empty() {
            return Err(AgileSyncError::Config("JIRA api_url is empty".to_string()));
        }

        let client = Client::builder()
            .user_agent(concat!("agilesync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/{}", api_url, AGILE_API_PATH),
            credentials,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_once(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut request = self.client.get(url).query(query).timeout(REQUEST_TIMEOUT);
        request = match &self.credentials {
            Credentials::Bearer(token) => request.bearer_auth(token),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::None => request,
        };

        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(AgileSyncError::NotFound(url.to_string())),
            StatusCode::UNAUTHORIZED => Err(AgileSyncError::Api {
                status: 401,
                message: "JIRA authentication failed".to_string(),
            }),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                Err(AgileSyncError::RateLimited(retry_after))
            }
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(AgileSyncError::Api {
                    status: status.as_u16(),
                    message: error_body,
                })
            }
        }
    }
}

#[async_trait]
impl AgileApi for JiraAgileClient {
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = self.url(path);
        debug!(url = %url, ?query, "GET");
        let url = url.as_str();
        with_retry(&self.retry, path, move || self.get_once(url, query)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    async fn sprint_issues(Path(id): Path<i64>) -> impl IntoResponse {
        if id == 404 {
            (StatusCode::NOT_FOUND, Json(serde_json::json!({"errorMessages": ["gone"]})))
        } else {
            (
                StatusCode::OK,
                Json(serde_json::json!({"startAt": 0, "total": 0, "issues": []})),
            )
        }
    }

    async fn boards(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        Json(serde_json::json!({
            "startAt": params.get("startAt").cloned().unwrap_or_default(),
            "isLast": true,
            "values": []
        }))
    }

    async fn whoami(headers: HeaderMap) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Json(serde_json::json!({ "authorization": auth }))
    }

    async fn broken() -> impl IntoResponse {
        (StatusCode::BAD_REQUEST, "bad jql")
    }

    async fn spawn_server() -> String {
        let app = Router::new()
            .route("/rest/agile/1.0/board", get(boards))
            .route("/rest/agile/1.0/sprint/{id}/issue", get(sprint_issues))
            .route("/rest/agile/1.0/whoami", get(whoami))
            .route("/rest/agile/1.0/broken", get(broken));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_not_found_maps_to_not_found() {
        let base = spawn_server().await;
        let client = JiraAgileClient::new(&base, Credentials::None, RetryConfig::none()).unwrap();

        let err = client.get_json("sprint/404/issue", &[]).await.unwrap_err();
        assert!(err.is_not_found());

        let ok = client.get_json("sprint/7/issue", &[]).await.unwrap();
        assert_eq!(ok["total"], 0);
    }

    #[tokio::test]
    async fn test_query_is_forwarded() {
        let base = spawn_server().await;
        let client = JiraAgileClient::new(&base, Credentials::None, RetryConfig::none()).unwrap();
        let page = client
            .get_json("board", &[("startAt", "200".to_string())])
            .await
            .unwrap();
        assert_eq!(page["startAt"], "200");
    }

    #[tokio::test]
    async fn test_bearer_credentials() {
        let base = spawn_server().await;
        let client = JiraAgileClient::new(
            &format!("{}/", base),
            Credentials::Bearer("sekret".to_string()),
            RetryConfig::none(),
        )
        .unwrap();
        let body = client.get_json("/whoami", &[]).await.unwrap();
        assert_eq!(body["authorization"], "Bearer sekret");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let base = spawn_server().await;
        let client =
            JiraAgileClient::new(&base, Credentials::None, RetryConfig::default()).unwrap();
        let err = client.get_json("broken", &[]).await.unwrap_err();
        match err {
            AgileSyncError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad jql");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_api_url_is_config_error() {
        let err = JiraAgileClient::new("", Credentials::None, RetryConfig::none())
            .err()
            .unwrap();
        assert!(matches!(err, AgileSyncError::Config(_)));
    }
}
