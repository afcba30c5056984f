//! REST client for the session and dashboard endpoints.

use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::service::DashboardService;
use crate::types::{
    AnalyticsSnapshot, CommunityInsights, CommunitySummary, DashboardPayload, MemberQuery,
    MemberSummary, PersonalOverview,
};
use async_trait::async_trait;
use cohort_core::{CommunityId, LoadError, UserId, UserIdentity};
use cohort_session::{CredentialStore, IdentityOutcome, SessionBackend, StoredCredentials};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const IDENTITY_PATH: &str = "/api/v1/session/me";
const REFRESH_PATH: &str = "/api/v1/session/refresh";
const LOGOUT_PATH: &str = "/api/v1/session/logout";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at_ms: Option<i64>,
}

/// Bearer-token REST client. The token is read from the credential store on
/// every request, so a refresh is picked up immediately.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
}

impl RestClient {
    pub fn new(
        config: &DashboardConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, DashboardError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, &config.api_base_url, credentials))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn stored(&self) -> Result<Option<StoredCredentials>, LoadError> {
        self.credentials
            .load()
            .map_err(|err| LoadError::transport(err.to_string()))
    }

    fn auth_headers(&self) -> Result<HeaderMap, LoadError> {
        let mut headers = HeaderMap::new();
        if let Some(credentials) = self.stored()? {
            let value = HeaderValue::from_str(&format!("Bearer {}", credentials.access_token))
                .map_err(|e| LoadError::transport(e.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn get_json<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T, LoadError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let mut request = self.client.get(self.url(path)).headers(self.auth_headers()?);
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request.send().await.map_err(transport_error)?;
        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, LoadError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| LoadError::decode(e.to_string()));
    }
    let text = response.text().await.unwrap_or_default();
    Err(LoadError::Status {
        status: status.as_u16(),
        message: error_message(&text),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(api_error) => format!("{}: {}", api_error.code, api_error.message),
        Err(_) => body.to_string(),
    }
}

fn transport_error(err: reqwest::Error) -> LoadError {
    if err.is_decode() {
        LoadError::decode(err.to_string())
    } else {
        LoadError::transport(err.to_string())
    }
}

#[async_trait]
impl SessionBackend for RestClient {
    async fn current_identity(&self) -> Result<IdentityOutcome, LoadError> {
        if self.stored()?.is_none() {
            debug!("no stored credentials, skipping identity request");
            return Ok(IdentityOutcome::Unauthenticated);
        }
        match self.get_json::<UserIdentity, ()>(IDENTITY_PATH, None).await {
            Ok(identity) => Ok(IdentityOutcome::Authenticated(identity)),
            Err(err) if err.is_auth_failure() => Ok(IdentityOutcome::Unauthenticated),
            Err(err) => Err(err),
        }
    }

    async fn refresh_credentials(&self) -> Result<(), LoadError> {
        let Some(refresh_token) = self.stored()?.and_then(|c| c.refresh_token) else {
            return Err(LoadError::Unauthenticated);
        };

        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let tokens: TokenResponse = parse_response(response).await?;

        let mut renewed = StoredCredentials::new(tokens.access_token)
            .with_refresh_token(tokens.refresh_token.unwrap_or(refresh_token));
        renewed.expires_at_ms = tokens.expires_at_ms;
        self.credentials
            .save(&renewed)
            .map_err(|err| LoadError::transport(err.to_string()))?;
        debug!("stored refreshed credentials");
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), LoadError> {
        let response = self
            .client
            .post(self.url(LOGOUT_PATH))
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(LoadError::Status {
            status: status.as_u16(),
            message: error_message(&text),
        })
    }
}

#[async_trait]
impl DashboardService for RestClient {
    async fn community_summary(&self, community: &CommunityId) -> Result<CommunitySummary, LoadError> {
        let path = format!("/api/v1/communities/{}/summary", community);
        self.get_json::<_, ()>(&path, None).await
    }

    async fn community_insights(&self, community: &CommunityId) -> Result<CommunityInsights, LoadError> {
        let path = format!("/api/v1/communities/{}/insights", community);
        self.get_json::<_, ()>(&path, None).await
    }

    async fn dashboard(&self, user: &UserId) -> Result<DashboardPayload, LoadError> {
        let path = format!("/api/v1/users/{}/dashboard", user);
        self.get_json::<_, ()>(&path, None).await
    }

    async fn members(&self, query: &MemberQuery) -> Result<Vec<MemberSummary>, LoadError> {
        self.get_json("/api/v1/members", Some(query)).await
    }

    async fn analytics(&self, community: &CommunityId) -> Result<AnalyticsSnapshot, LoadError> {
        let path = format!("/api/v1/communities/{}/analytics", community);
        self.get_json::<_, ()>(&path, None).await
    }

    async fn personal_overview(&self, user: &UserId) -> Result<PersonalOverview, LoadError> {
        let path = format!("/api/v1/users/{}/personal", user);
        self.get_json::<_, ()>(&path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_session::MemoryCredentialStore;
    use std::time::Duration;

    fn client(credentials: MemoryCredentialStore) -> RestClient {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        // Port 9 (discard) is not expected to accept connections.
        RestClient::with_client(http, "http://127.0.0.1:9/", Arc::new(credentials))
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = client(MemoryCredentialStore::new());
        assert_eq!(client.base_url(), "http://127.0.0.1:9");
        assert_eq!(client.url(IDENTITY_PATH), "http://127.0.0.1:9/api/v1/session/me");
    }

    #[test]
    fn test_auth_header_from_store() {
        let client = client(MemoryCredentialStore::with_credentials(StoredCredentials::new("tok")));
        let headers = client.auth_headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");

        let anonymous = self::client(MemoryCredentialStore::new());
        assert!(anonymous.auth_headers().unwrap().is_empty());
    }

    #[test]
    fn test_error_message_prefers_api_body() {
        assert_eq!(
            error_message(r#"{"code":"FORBIDDEN","message":"not a member"}"#),
            "FORBIDDEN: not a member"
        );
        assert_eq!(error_message("bad gateway"), "bad gateway");
    }

    #[tokio::test]
    async fn test_identity_without_credentials_is_unauthenticated() {
        let client = client(MemoryCredentialStore::new());
        assert_eq!(
            client.current_identity().await.unwrap(),
            IdentityOutcome::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_rejected() {
        let client = client(MemoryCredentialStore::with_credentials(StoredCredentials::new("tok")));
        assert_eq!(
            client.refresh_credentials().await.unwrap_err(),
            LoadError::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let client = client(MemoryCredentialStore::with_credentials(StoredCredentials::new("tok")));
        let err = client.current_identity().await.unwrap_err();
        assert!(matches!(err, LoadError::Transport { .. }));
    }
}
