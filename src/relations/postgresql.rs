//! PostgreSQL integration.
//!
//! The PostgreSQL provider publishes in its application databag:
//!
//! ```text
//! endpoints: "10.1.2.3:5432,10.1.2.4:5432"
//! database: "maubot"
//! username: "relation_id_4"
//! password: "..."
//! ```
//!
//! Newer providers move `username` and `password` into a Juju secret and
//! publish its id as `secret-user` instead.

use log::{debug, info};

use crate::{
    juju::{HookToolError, HookTools, RelationData},
    relations::{RelationError, publish_app_data, remote_app_data},
};

pub const RELATION_NAME: &str = "postgresql";
const SECRET_USER_FIELD: &str = "secret-user";

/// Credentials published by the PostgreSQL provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresqlCredentials {
    /// Primary endpoint, `host:port`
    pub endpoint: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl PostgresqlCredentials {
    /// Builds the credentials from the provider databag.
    ///
    /// The first entry of the comma-separated `endpoints` field is the primary.
    ///
    /// # Errors
    ///
    /// Returns [`RelationError::MissingData`] if any of the four fields is empty.
    pub fn from_relation_data(data: &RelationData) -> Result<Self, RelationError> {
        let field = |key: &str| data.get(key).map(String::as_str).unwrap_or_default();

        let endpoints = field("endpoints");
        if endpoints.is_empty() {
            return Err(RelationError::missing(RELATION_NAME, "no endpoints published"));
        }
        let endpoint = endpoints.split(',').next().unwrap_or_default();

        let credentials = PostgresqlCredentials {
            endpoint: endpoint.to_owned(),
            database: field("database").to_owned(),
            username: field("username").to_owned(),
            password: field("password").to_owned(),
        };

        if credentials.endpoint.is_empty()
            || credentials.database.is_empty()
            || credentials.username.is_empty()
            || credentials.password.is_empty()
        {
            return Err(RelationError::missing(
                RELATION_NAME,
                "missing mandatory relation data",
            ));
        }

        Ok(credentials)
    }

    /// Connection URL as expected in the Maubot `database` setting.
    pub fn connection_url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}/{}",
            self.username, self.password, self.endpoint, self.database
        )
    }
}

/// Resolves the database connection URL from the PostgreSQL relation.
///
/// # Errors
///
/// Returns [`RelationError::MissingData`] if the relation is absent or being
/// removed, its remote application is gone, or the published data is incomplete.
pub async fn resolve<J: HookTools>(juju: &J, broken: Option<&str>) -> Result<String, RelationError> {
    let Some(mut data) = remote_app_data(juju, RELATION_NAME, broken).await? else {
        return Err(RelationError::missing(RELATION_NAME, "no postgresql relation"));
    };

    if let Some(secret_id) = data.get(SECRET_USER_FIELD).cloned() {
        debug!("read postgresql user from secret");
        let secret = juju.secret_get(&secret_id).await?;
        for key in ["username", "password"] {
            if let Some(value) = secret.get(key) {
                data.entry(key.to_owned()).or_insert_with(|| value.clone());
            }
        }
    }

    let credentials = PostgresqlCredentials::from_relation_data(&data)?;

    info!(
        "resolved postgresql database {} on {}",
        credentials.database, credentials.endpoint
    );

    Ok(credentials.connection_url())
}

/// Asks the PostgreSQL provider to create a database named after the application.
pub async fn request_database<J: HookTools>(
    juju: &J,
    database: &str,
) -> Result<(), HookToolError> {
    info!("request postgresql database {}", database);
    let data = RelationData::from([("database".to_owned(), database.to_owned())]);
    publish_app_data(juju, RELATION_NAME, &data).await
}
