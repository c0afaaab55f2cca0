//! HTTP client for the Maubot management API.

use std::time::Duration;

use log::{debug, error, info};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use crate::maubot::{AccountRecord, ApiError, MaubotApi};

/// HTTP client for the Maubot management API.
///
/// # Examples
///
/// ```no_run
/// let maubot = MaubotClient::new("http://localhost:29316/_matrix/maubot", Duration::from_secs(5))?;
/// let token = maubot.login("alice", "password").await?;
/// ```
pub struct MaubotClient {
    /// Maubot API base URL
    url: String,
    /// HTTP client
    client: Client,
}

#[derive(Deserialize, Debug)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Error body returned by Maubot.
#[derive(Deserialize, Debug)]
struct ErrorResponse {
    error: String,
}

impl MaubotClient {
    /// Create a new [MaubotClient].
    ///
    /// # Arguments
    ///
    /// * `url` - Base URL of the Maubot management API, without trailing slash.
    /// * `timeout` - Timeout of a single request.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError(format!("failed to build HTTP client: {}", e)))?;
        Ok(MaubotClient {
            url: url.to_owned(),
            client,
        })
    }

    /// Sends a request, failing on transport errors and non-2xx answers.
    async fn send<T: DeserializeOwned>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request.send().await.map_err(|e| {
            error!("failed to request Maubot API {}: {}", url, e);
            ApiError(format!("failed to request {}: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            error!("Maubot API {} answered {}: {}", url, status, message);
            return Err(ApiError(format!("{} from {}: {}", status, url, message)));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError(format!("invalid response from {}: {}", url, e)))
    }
}

impl MaubotApi for MaubotClient {
    /// Request `POST /v1/auth/login` and return the session token.
    async fn login(&self, admin_name: &str, admin_password: &str) -> Result<String, ApiError> {
        let url = format!("{}/v1/auth/login", &self.url);
        info!("login in Maubot as {}", admin_name);

        let request = self.client.post(&url).json(&json!({
            "username": admin_name,
            "password": admin_password,
        }));
        let response: LoginResponse = self.send(&url, request).await?;

        response
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError("token not found in Maubot API response".to_owned()))
    }

    /// Request `POST /v1/client/auth/{homeserver}/register` with the session token.
    async fn register_account(
        &self,
        token: &str,
        account_name: &str,
        account_password: &str,
        homeserver: &str,
    ) -> Result<AccountRecord, ApiError> {
        let url = format!("{}/v1/client/auth/{}/register", &self.url, homeserver);
        info!("register {} on {}", account_name, homeserver);

        let request = self.client.post(&url).bearer_auth(token).json(&json!({
            "username": account_name,
            "password": account_password,
        }));
        let account: AccountRecord = self.send(&url, request).await?;

        debug!("registered {} with device {}", account.user_id, account.device_id);

        Ok(account)
    }
}
