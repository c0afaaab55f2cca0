//! Maubot management API.
//!
//! Only the two calls needed to register a Matrix client account are used:
//! admin login and account registration on a homeserver.

mod client;

use mockall::automock;
use serde::Deserialize;
use thiserror::Error;

pub use crate::maubot::client::MaubotClient;

/// Any failure while talking to the Maubot API.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ApiError(pub String);

/// Matrix account registered through Maubot.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AccountRecord {
    pub user_id: String,
    pub access_token: String,
    pub device_id: String,
}

/// Trait for calling the Maubot API.
///
/// This trait abstracts the HTTP operations for easier testing with mocks.
#[automock]
pub trait MaubotApi {
    /// Logs an admin in and returns a session token.
    async fn login(&self, admin_name: &str, admin_password: &str) -> Result<String, ApiError>;
    /// Registers a Matrix account on a homeserver known by Maubot.
    async fn register_account(
        &self,
        token: &str,
        account_name: &str,
        account_password: &str,
        homeserver: &str,
    ) -> Result<AccountRecord, ApiError>;
}
