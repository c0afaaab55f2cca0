//! Juju agent integration.
//!
//! The operator is executed by the Juju agent once per hook or action, and
//! talks back to the agent through the hook tools (`config-get`,
//! `relation-get`, `status-set`, ...). This module provides:
//!
//! - [`HookTools`]: the trait the rest of the operator uses, mocked in tests
//! - [`JujuHookTools`]: the implementation spawning the hook tool processes
//! - [`Status`]: the unit workload status
//! - [`JujuContext`]: identity of the running unit, read from the environment

mod hook_tools;

use std::{collections::HashMap, fmt, io};

use thiserror::Error;

pub use crate::juju::hook_tools::{HookTools, JujuHookTools};
#[cfg(test)]
pub use crate::juju::hook_tools::MockHookTools;
use crate::utils::app_name;

/// Key-value data of one side of a relation.
pub type RelationData = HashMap<String, String>;

/// Errors raised while calling a hook tool.
#[derive(Debug, Error)]
pub enum HookToolError {
    /// The hook tool could not be spawned.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },
    /// The hook tool exited with a non-zero status.
    #[error("{tool} failed: {stderr}")]
    Failed { tool: String, stderr: String },
    /// The hook tool output is not the expected JSON.
    #[error("unexpected output from {tool}: {source}")]
    Output {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
    /// A variable set by the Juju agent is missing.
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Workload status of the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The workload is running.
    Active,
    /// A required dependency is missing, an operator needs to act.
    Blocked(String),
    /// The operator is working on the workload.
    Maintenance(String),
}

impl Status {
    /// Status name as understood by `status-set`.
    pub fn name(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Blocked(_) => "blocked",
            Status::Maintenance(_) => "maintenance",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Status::Active => "",
            Status::Blocked(message) | Status::Maintenance(message) => message,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message().is_empty() {
            write!(f, "{}", self.name())
        } else {
            write!(f, "{}: {}", self.name(), self.message())
        }
    }
}

/// Identity of the unit the operator runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JujuContext {
    /// Unit name, e.g. `maubot/0`
    pub unit_name: String,
    /// Model name, e.g. `chat`
    pub model_name: String,
    /// Relation the running hook is about, e.g. `postgresql:4`
    pub relation_id: Option<String>,
}

impl JujuContext {
    /// Reads the unit identity from the variables set by the Juju agent.
    pub fn from_env() -> Result<Self, HookToolError> {
        let unit_name =
            std::env::var("JUJU_UNIT_NAME").map_err(|_| HookToolError::MissingEnv("JUJU_UNIT_NAME"))?;
        let model_name = std::env::var("JUJU_MODEL_NAME")
            .map_err(|_| HookToolError::MissingEnv("JUJU_MODEL_NAME"))?;

        Ok(JujuContext {
            unit_name,
            model_name,
            relation_id: std::env::var("JUJU_RELATION_ID").ok(),
        })
    }

    /// Application name of the unit.
    pub fn app_name(&self) -> &str {
        app_name(&self.unit_name)
    }
}
