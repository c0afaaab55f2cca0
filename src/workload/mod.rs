//! Workload container integration.
//!
//! The Maubot processes run in a container supervised by Pebble. This module
//! provides everything the operator needs to act on that container:
//!
//! - [`Workload`]: process and file operations on the container, mocked in tests
//! - [`PebbleClient`]: the [`Workload`] implementation over the Pebble API socket
//! - [`layer`]: the Pebble layer declaring the Maubot services
//! - [`config_file`]: read-modify-write access to the Maubot configuration file
//! - [`is_ready`]: the readiness predicate shared by the reconciler and the actions

pub mod config_file;
pub mod layer;
mod pebble;

use std::{io, time::Duration};

use log::debug;
use mockall::automock;
use serde::Deserialize;
use thiserror::Error;

use crate::workload::layer::{Layer, MAUBOT_SERVICE};
pub use crate::workload::pebble::PebbleClient;

/// Errors raised by workload operations.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// The Pebble socket could not be connected to.
    #[error("failed to reach pebble: {0}")]
    Connect(#[from] io::Error),
    /// The HTTP exchange with Pebble failed.
    #[error("pebble connection failed: {0}")]
    Http(#[from] hyper::Error),
    /// Pebble did not answer in time.
    #[error("pebble did not answer within {0:?}")]
    Timeout(Duration),
    /// The request could not be built.
    #[error("invalid pebble request: {0}")]
    Request(#[from] http::Error),
    /// A multipart response could not be read.
    #[error("invalid multipart response: {0}")]
    Multipart(#[from] multer::Error),
    /// Pebble answered with an error.
    #[error("{status_code} {status}: {message}")]
    Api {
        status_code: u16,
        status: String,
        message: String,
        kind: Option<String>,
    },
    /// A service change completed with an error.
    #[error("change {id} failed: {message}")]
    Change { id: String, message: String },
    /// A file operation failed on a specific path.
    #[error("{path}: {message}")]
    Path { path: String, message: String },
    /// Pebble answered with something that could not be understood.
    #[error("unexpected pebble response: {0}")]
    Protocol(String),
}

impl WorkloadError {
    /// Whether the error reports a service absent from the plan.
    ///
    /// Stopping a service that was never declared is a no-op for the operator.
    pub fn is_missing_service(&self) -> bool {
        match self {
            WorkloadError::Api {
                status_code,
                message,
                ..
            } => *status_code == 400 && message.starts_with("service") && message.ends_with("does not exist"),
            _ => false,
        }
    }

    /// Whether the error reports a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorkloadError::Api {
                status_code, kind, ..
            } => *status_code == 404 || kind.as_deref() == Some("not-found"),
            WorkloadError::Path { message, .. } => message.contains("no such file or directory"),
            _ => false,
        }
    }
}

/// Current state of a Pebble service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Inactive,
    Backoff,
    Error,
    #[serde(other)]
    Unknown,
}

/// A service of the Pebble plan and its state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Startup mode, `enabled` or `disabled`
    #[serde(default)]
    pub startup: String,
    /// Current state
    pub current: ServiceStatus,
}

impl ServiceInfo {
    pub fn is_running(&self) -> bool {
        self.current == ServiceStatus::Active
    }
}

/// Operations on the workload container.
///
/// This trait abstracts the container supervisor for easier testing with mocks.
#[automock]
pub trait Workload {
    /// Whether the supervisor answers.
    async fn can_connect(&self) -> bool;
    /// Whether a path exists in the container.
    async fn exists(&self, path: &str) -> Result<bool, WorkloadError>;
    /// Reads a UTF-8 file.
    async fn pull(&self, path: &str) -> Result<String, WorkloadError>;
    /// Writes a UTF-8 file, replacing its content.
    async fn push(&self, path: &str, content: &str) -> Result<(), WorkloadError>;
    /// Creates a directory and its parents, succeeding when it already exists.
    async fn make_dir(&self, path: &str) -> Result<(), WorkloadError>;
    /// Adds a layer to the plan, combined with any existing layer of the same label.
    async fn add_layer(&self, label: &str, layer: &Layer) -> Result<(), WorkloadError>;
    /// Looks a service up in the plan, `None` when it is not declared.
    async fn service(&self, name: &str) -> Result<Option<ServiceInfo>, WorkloadError>;
    /// Restarts a service, starting it when stopped.
    async fn restart(&self, name: &str) -> Result<(), WorkloadError>;
    /// Stops a service.
    async fn stop(&self, name: &str) -> Result<(), WorkloadError>;
}

/// Whether the Maubot service is declared and running.
///
/// Requires the supervisor to be reachable, the `maubot` service to be in the
/// plan and its current state to be active. Errors count as not ready.
pub async fn is_ready<W: Workload>(workload: &W) -> bool {
    if !workload.can_connect().await {
        debug!("workload is not reachable");
        return false;
    }

    match workload.service(MAUBOT_SERVICE).await {
        Ok(Some(service)) => service.is_running(),
        Ok(None) => {
            debug!("{} service is not in the plan", MAUBOT_SERVICE);
            false
        }
        Err(e) => {
            debug!("failed to get {} service: {}", MAUBOT_SERVICE, e);
            false
        }
    }
}
