//! Operator actions.
//!
//! Each action answers with a flat result map holding its result fields and an
//! `error` field. On failure the result fields stay empty, `error` carries the
//! message and the action is failed with the same message.
//!
//! - [`create_admin`]: adds a Maubot admin with a generated password
//! - [`delete_admin`]: removes a Maubot admin
//! - [`reset_admin_password`]: generates a new password for an admin
//! - [`register_client_account`]: registers a Matrix account through Maubot

pub mod create_admin;
pub mod delete_admin;
pub mod register_client_account;
pub mod reset_admin_password;

use std::collections::BTreeMap;

use log::{error, info, warn};
use thiserror::Error;

use crate::{
    maubot::ApiError,
    workload::{
        Workload, WorkloadError,
        config_file::{ConfigFile, ConfigFileError, WorkloadConfig},
        is_ready,
        layer::MAUBOT_SERVICE,
    },
};

/// Result map of an action, passed to `action-set`.
pub type ActionResults = BTreeMap<String, String>;

/// Admin seeded by the Maubot image, never managed through actions.
pub const ROOT_ADMIN: &str = "root";
const ERROR_KEY: &str = "error";

/// Reasons an action fails. The display text is what the operator sees.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A mandatory action parameter was not given.
    #[error("{0} is required")]
    MissingParameter(String),
    /// The request cannot be served in the current state.
    #[error("{0}")]
    Precondition(String),
    #[error("failed to read configuration, check the logs")]
    Load(#[source] ConfigFileError),
    #[error("failed to push configuration, check the logs")]
    Push(#[source] ConfigFileError),
    /// The configuration was written but Maubot did not restart.
    ///
    /// `persisted` holds the results that already took effect, they are
    /// reported along with the failure.
    #[error("failed to restart maubot, check the logs")]
    Restart {
        #[source]
        source: WorkloadError,
        persisted: ActionResults,
    },
    #[error("error while interacting with Maubot: {0}")]
    Api(#[from] ApiError),
    /// A `register-client-account` precondition, reported like Maubot errors.
    #[error("error while interacting with Maubot: {0}")]
    Maubot(String),
}

/// Final result of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Result fields and `error`, always all present
    pub results: ActionResults,
    /// Failure message, `None` when the action succeeded
    pub failure: Option<String>,
}

impl ActionOutcome {
    /// Builds the outcome of an action declaring `result_keys` as result fields.
    pub fn new(action: &str, result_keys: &[&str], result: Result<ActionResults, ActionError>) -> Self {
        let mut results: ActionResults = result_keys
            .iter()
            .chain([&ERROR_KEY])
            .map(|key| (key.to_string(), String::new()))
            .collect();

        match result {
            Ok(values) => {
                info!("{} succeeded", action);
                results.extend(values);
                ActionOutcome {
                    results,
                    failure: None,
                }
            }
            Err(e) => {
                match std::error::Error::source(&e) {
                    Some(source) => error!("{} failed: {}: {}", action, e, source),
                    None => error!("{} failed: {}", action, e),
                }
                if let ActionError::Restart { persisted, .. } = &e {
                    warn!("{} wrote the configuration before failing", action);
                    results.extend(persisted.clone());
                }
                let message = e.to_string();
                results.insert(ERROR_KEY.to_owned(), message.clone());
                ActionOutcome {
                    results,
                    failure: Some(message),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Value of a result field, empty when unset.
    #[cfg(test)]
    pub fn result(&self, key: &str) -> &str {
        self.results.get(key).map(String::as_str).unwrap_or_default()
    }
}

pub(crate) fn ensure_not_root(name: &str, message: &str) -> Result<(), ActionError> {
    if name == ROOT_ADMIN {
        return Err(ActionError::Precondition(message.to_owned()));
    }
    Ok(())
}

pub(crate) async fn ensure_ready<W: Workload>(workload: &W) -> Result<(), ActionError> {
    if !is_ready(workload).await {
        return Err(ActionError::Precondition("maubot is not ready".to_owned()));
    }
    Ok(())
}

pub(crate) async fn load<W: Workload>(
    file: &ConfigFile<'_, W>,
) -> Result<WorkloadConfig, ActionError> {
    file.load().await.map_err(ActionError::Load)
}

/// Persists the configuration and restarts Maubot so it picks it up.
///
/// Returns `results` once both succeeded. They are carried by the error when
/// only the restart failed.
pub(crate) async fn apply<W: Workload>(
    workload: &W,
    file: &ConfigFile<'_, W>,
    config: &WorkloadConfig,
    results: ActionResults,
) -> Result<ActionResults, ActionError> {
    file.persist(config).await.map_err(ActionError::Push)?;
    match workload.restart(MAUBOT_SERVICE).await {
        Ok(()) => Ok(results),
        Err(source) => Err(ActionError::Restart {
            source,
            persisted: results,
        }),
    }
}
