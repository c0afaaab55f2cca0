//! Matrix-auth integration.
//!
//! The Synapse operator publishes the homeserver URL and the id of a Juju
//! secret holding the registration shared secret. Without the integration
//! Maubot is pointed at the public matrix.org homeserver.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;

use crate::{
    juju::HookTools,
    relations::{RelationError, remote_app_data},
};

pub const RELATION_NAME: &str = "matrix-auth";
/// Homeserver name registered when the integration is present.
pub const HOMESERVER_NAME: &str = "synapse";

const DEFAULT_HOMESERVER_NAME: &str = "matrix";
const DEFAULT_HOMESERVER_URL: &str = "https://matrix-client.matrix.org";
const DEFAULT_HOMESERVER_SECRET: &str = "null";

const HOMESERVER_FIELD: &str = "homeserver";
const SHARED_SECRET_ID_FIELD: &str = "shared_secret_id";
const SHARED_SECRET_KEY: &str = "shared-secret";

/// Homeserver entry of the Maubot `homeservers` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomeserverCredentials {
    pub url: String,
    pub secret: String,
}

/// Homeserver name to credentials.
pub type Homeservers = BTreeMap<String, HomeserverCredentials>;

/// Homeservers used when the matrix-auth integration is absent.
pub fn default_homeservers() -> Homeservers {
    Homeservers::from([(
        DEFAULT_HOMESERVER_NAME.to_owned(),
        HomeserverCredentials {
            url: DEFAULT_HOMESERVER_URL.to_owned(),
            secret: DEFAULT_HOMESERVER_SECRET.to_owned(),
        },
    )])
}

/// Resolves the homeservers Maubot can register accounts on.
///
/// # Errors
///
/// Returns [`RelationError::MissingData`] if the relation is established but
/// the homeserver URL or the shared secret cannot be resolved.
pub async fn resolve<J: HookTools>(
    juju: &J,
    broken: Option<&str>,
) -> Result<Homeservers, RelationError> {
    let Some(data) = remote_app_data(juju, RELATION_NAME, broken).await? else {
        warn!("no matrix-auth relation, using default matrix credentials");
        return Ok(default_homeservers());
    };

    let field = |key: &str| {
        data.get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    };

    let (Some(homeserver), Some(secret_id)) = (field(HOMESERVER_FIELD), field(SHARED_SECRET_ID_FIELD))
    else {
        return Err(RelationError::missing(
            RELATION_NAME,
            "missing mandatory relation data",
        ));
    };

    let secret = juju.secret_get(secret_id).await?;
    let Some(shared_secret) = secret
        .get(SHARED_SECRET_KEY)
        .filter(|value| !value.is_empty())
    else {
        return Err(RelationError::missing(RELATION_NAME, "empty shared secret"));
    };

    info!("resolved matrix homeserver {}", homeserver);

    Ok(Homeservers::from([(
        HOMESERVER_NAME.to_owned(),
        HomeserverCredentials {
            url: homeserver.to_owned(),
            secret: shared_secret.clone(),
        },
    )]))
}
