use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::config::Timeframe;
use crate::throttle::RateLimiter;
use crate::types::{AccountStatus, TransactionTotals};
use crate::{ECONOMY_API_BASE, SESSION_COOKIE, USERS_API_BASE};

/// Per-request timeout for every Roblox call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{endpoint} rejected the session cookie (HTTP 401); it is invalid or expired")]
    Unauthorized { endpoint: &'static str },

    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
    },

    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {endpoint}: {reason}")]
    Decode {
        endpoint: &'static str,
        reason: String,
    },

    #[error("session cookie contains characters that cannot be sent in a header")]
    InvalidCookie,
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Identity returned by the authenticated-user lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthenticatedUser {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyResponse {
    robux: i64,
}

#[derive(Debug, Deserialize)]
struct UserProfileResponse {
    #[serde(default, rename = "isBanned")]
    is_banned: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    created: Option<String>,
}

const AUTHENTICATED_USER: &str = "authenticated-user";
const TRANSACTION_TOTALS: &str = "transaction-totals";
const CURRENCY: &str = "currency";
const USER_PROFILE: &str = "user-profile";

/// Cookie-authenticated client for the Roblox users and economy APIs.
///
/// Every request waits on the shared [`RateLimiter`] first.
#[derive(Debug, Clone)]
pub struct RobloxClient {
    http: Client,
    cookie: HeaderValue,
    users_base: String,
    economy_base: String,
    limiter: Arc<RateLimiter>,
}

impl RobloxClient {
    /// Client for the production endpoints.
    pub fn new(cookie: &str, limiter: Arc<RateLimiter>) -> Result<Self, ApiError> {
        Self::with_base_urls(cookie, USERS_API_BASE, ECONOMY_API_BASE, limiter)
    }

    /// Client pointed at custom base URLs (local relays, tests).
    pub fn with_base_urls(
        cookie: &str,
        users_base: &str,
        economy_base: &str,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ApiError> {
        let mut cookie = HeaderValue::from_str(&format!("{SESSION_COOKIE}={}", cookie.trim()))
            .map_err(|_| ApiError::InvalidCookie)?;
        cookie.set_sensitive(true);

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| ApiError::Request {
                endpoint: "client",
                source,
            })?;

        Ok(Self {
            http,
            cookie,
            users_base: users_base.trim_end_matches('/').to_string(),
            economy_base: economy_base.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    /// Look up the user that owns the session cookie.
    pub async fn authenticated_user(&self) -> Result<AuthenticatedUser, ApiError> {
        let url = format!("{}/v1/users/authenticated", self.users_base);
        self.get_json(AUTHENTICATED_USER, &url, &[]).await
    }

    /// Transaction totals summary for `timeframe`.
    pub async fn transaction_totals(
        &self,
        user_id: u64,
        timeframe: Timeframe,
    ) -> Result<TransactionTotals, ApiError> {
        let url = format!(
            "{}/v2/users/{user_id}/transaction-totals",
            self.economy_base
        );
        self.get_json(
            TRANSACTION_TOTALS,
            &url,
            &[
                ("timeFrame", timeframe.as_str()),
                ("transactionType", "summary"),
            ],
        )
        .await
    }

    /// Current currency balance.
    pub async fn balance(&self, user_id: u64) -> Result<i64, ApiError> {
        let url = format!("{}/v1/users/{user_id}/currency", self.economy_base);
        let resp: CurrencyResponse = self.get_json(CURRENCY, &url, &[]).await?;
        Ok(resp.robux)
    }

    /// Public profile of `user_id`, reduced to the fields the monitor tracks.
    pub async fn account_status(&self, user_id: u64) -> Result<AccountStatus, ApiError> {
        let url = format!("{}/v1/users/{user_id}", self.users_base);
        let resp: UserProfileResponse = self.get_json(USER_PROFILE, &url, &[]).await?;
        Ok(AccountStatus {
            is_banned: resp.is_banned,
            username: resp.name.unwrap_or_else(|| "Unknown".to_string()),
            created_at: resp.created.unwrap_or_else(|| "Unknown".to_string()),
        })
    }

    /// Raw JSON of an endpoint, for probing.
    pub async fn get_raw(
        &self,
        endpoint: &'static str,
        url: &str,
    ) -> Result<serde_json::Value, ApiError> {
        self.get_json(endpoint, url, &[]).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.limiter.acquire().await;
        debug!("GET {endpoint}");

        let resp = self
            .http
            .get(url)
            .query(query)
            .header(COOKIE, self.cookie.clone())
            .send()
            .await
            .map_err(|source| ApiError::Request { endpoint, source })?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => return Err(ApiError::Unauthorized { endpoint }),
            status if !status.is_success() => {
                return Err(ApiError::Status { endpoint, status });
            }
            _ => {}
        }

        let body = resp
            .bytes()
            .await
            .map_err(|source| ApiError::Request { endpoint, source })?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
            endpoint,
            reason: e.to_string(),
        })
    }

    pub fn users_base(&self) -> &str {
        &self.users_base
    }

    pub fn economy_base(&self) -> &str {
        &self.economy_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const COOKIE_VALUE: &str = "_|WARNING:-DO-NOT-SHARE-THIS.--test";

    fn client(server: &mockito::Server) -> RobloxClient {
        RobloxClient::with_base_urls(
            COOKIE_VALUE,
            &server.url(),
            &server.url(),
            RateLimiter::unlimited(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn authenticated_user_sends_cookie() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/users/authenticated")
            .match_header("cookie", format!(".ROBLOSECURITY={COOKIE_VALUE}").as_str())
            .with_status(200)
            .with_body(r#"{"id": 42, "name": "builder", "displayName": "Builder"}"#)
            .create_async()
            .await;

        let user = client(&server).authenticated_user().await.unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.name, "builder");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_distinguished() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/users/authenticated")
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server).authenticated_user().await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn server_error_is_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/users/7/currency")
            .with_status(503)
            .create_async()
            .await;

        let err = client(&server).balance(7).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                ..
            }
        ));
        assert!(!err.is_unauthorized());
    }

    #[tokio::test]
    async fn transaction_totals_passes_timeframe() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/users/7/transaction-totals")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timeFrame".into(), "Month".into()),
                Matcher::UrlEncoded("transactionType".into(), "summary".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"salesTotal": 150, "purchasesTotal": 3, "unknownTotal": 9}"#)
            .create_async()
            .await;

        let totals = client(&server)
            .transaction_totals(7, Timeframe::Month)
            .await
            .unwrap();
        assert_eq!(totals.get("salesTotal"), 150);
        assert_eq!(totals.get("purchasesTotal"), 3);
        assert_eq!(totals.get("affiliatePayoutTotal"), 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn balance_parses_robux() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/users/7/currency")
            .with_status(200)
            .with_body(r#"{"robux": 1234}"#)
            .create_async()
            .await;

        assert_eq!(client(&server).balance(7).await.unwrap(), 1234);
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/users/7/currency")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = client(&server).balance(7).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Decode {
                endpoint: "currency",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn account_status_defaults_missing_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/users/7")
            .with_status(200)
            .with_body(r#"{"isBanned": true}"#)
            .create_async()
            .await;

        let status = client(&server).account_status(7).await.unwrap();
        assert!(status.is_banned);
        assert_eq!(status.username, "Unknown");
        assert_eq!(status.created_at, "Unknown");
    }

    #[test]
    fn cookie_with_newline_is_rejected() {
        let err = RobloxClient::new("bad\ncookie", RateLimiter::unlimited()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidCookie));
    }

    #[test]
    fn base_urls_are_normalized() {
        let c = RobloxClient::with_base_urls(
            COOKIE_VALUE,
            "http://localhost:1/",
            "http://localhost:2//",
            RateLimiter::unlimited(),
        )
        .unwrap();
        assert_eq!(c.users_base(), "http://localhost:1");
        assert_eq!(c.economy_base(), "http://localhost:2");
    }
}
