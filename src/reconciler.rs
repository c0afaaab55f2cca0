//! Workload reconciliation.
//!
//! Every hook ends up here: the Maubot configuration and the Pebble plan are
//! rebuilt from the current relation state and the services are restarted.
//! Running it twice with the same inputs leaves the workload unchanged.

use log::{debug, error, info};
use thiserror::Error;

use crate::{
    config::WorkloadSettings,
    juju::{HookToolError, HookTools, Status},
    relations::{RelationError, matrix_auth, postgresql},
    workload::{
        Workload, WorkloadError,
        config_file::{ConfigFile, ConfigFileError},
        layer::{LAYER_LABEL, MAUBOT_SERVICE, SERVICES, maubot_layer},
    },
};

const PUBLIC_URL_OPTION: &str = "public-url";

/// Errors failing a reconcile. Missing relations are not errors, they block the unit.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("workload operation failed: {0}")]
    Workload(#[from] WorkloadError),
    #[error("failed to update maubot configuration: {0}")]
    ConfigFile(#[from] ConfigFileError),
    #[error(transparent)]
    HookTool(#[from] HookToolError),
}

/// Makes the workload match the current relation state and charm configuration.
///
/// `broken_relation` is the id of a relation being removed by the current
/// hook, its data is ignored. Returns the status set on the unit, or `None`
/// when the workload container is not reachable yet.
///
/// # Errors
///
/// Returns an error on any container, configuration or hook tool failure.
/// Missing relation data sets a blocked status and is not an error.
pub async fn reconcile<W: Workload, J: HookTools>(
    workload: &W,
    juju: &J,
    settings: &WorkloadSettings,
    broken_relation: Option<&str>,
) -> Result<Option<Status>, ReconcileError> {
    juju.status_set(&Status::Maintenance(String::new())).await?;

    if !workload.can_connect().await {
        info!("workload container is not reachable yet");
        return Ok(None);
    }

    prepare_files(workload, settings).await?;

    let file = ConfigFile::new(workload, &settings.config_path);
    let mut config = file.load().await?;

    let resolved = async {
        let database = postgresql::resolve(juju, broken_relation).await?;
        let homeservers = matrix_auth::resolve(juju, broken_relation).await?;
        Ok::<_, RelationError>((database, homeservers))
    }
    .await;

    let (database, homeservers) = match resolved {
        Ok(resolved) => resolved,
        Err(RelationError::MissingData { relation, reason }) => {
            info!("{} relation not usable: {}", relation, reason);
            let status = Status::Blocked(format!("{} integration is required", relation));
            juju.status_set(&status).await?;
            stop_maubot(workload).await;
            return Ok(Some(status));
        }
        Err(RelationError::HookTool(e)) => return Err(e.into()),
    };

    let public_url = juju.config_get(PUBLIC_URL_OPTION).await?;

    config.set_database(&database);
    config.set_homeservers(&homeservers)?;
    config.set_public_url(public_url.as_deref());
    file.persist(&config).await?;

    workload
        .add_layer(LAYER_LABEL, &maubot_layer(&settings.config_path))
        .await?;
    for service in SERVICES {
        info!("restart {}", service);
        workload.restart(service).await?;
    }

    juju.status_set(&Status::Active).await?;
    Ok(Some(Status::Active))
}

/// Seeds the configuration file from the example and creates the data directories.
///
/// An existing configuration file is never overwritten.
async fn prepare_files<W: Workload>(
    workload: &W,
    settings: &WorkloadSettings,
) -> Result<(), WorkloadError> {
    if workload.exists(&settings.config_path).await? {
        debug!("{} already exists", settings.config_path);
    } else {
        info!(
            "copy {} to {}",
            settings.example_config_path, settings.config_path
        );
        let example = workload.pull(&settings.example_config_path).await?;
        workload.push(&settings.config_path, &example).await?;
    }

    for dir in &settings.data_dirs {
        workload.make_dir(dir).await?;
    }

    Ok(())
}

/// Stops Maubot while a required integration is missing.
///
/// A service absent from the plan is already stopped, other failures are logged only.
async fn stop_maubot<W: Workload>(workload: &W) {
    match workload.stop(MAUBOT_SERVICE).await {
        Ok(()) => info!("stopped {}", MAUBOT_SERVICE),
        Err(e) if e.is_missing_service() => debug!("{} is not in the plan", MAUBOT_SERVICE),
        Err(e) => error!("failed to stop {}: {}", MAUBOT_SERVICE, e),
    }
}
