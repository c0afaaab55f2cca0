//! Hook tool client.
//!
//! This module provides the [`HookTools`] trait and its [`JujuHookTools`]
//! implementation, which runs the tools shipped by the Juju agent and parses
//! their JSON output.

use std::{collections::BTreeMap, path::PathBuf};

use log::debug;
use mockall::automock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::process::Command;

use crate::juju::{HookToolError, RelationData, Status};

/// Requests the operator sends to the Juju agent.
///
/// This trait abstracts the hook tools for easier testing with mocks.
#[automock]
pub trait HookTools {
    /// Reads a charm configuration option, `None` when unset.
    async fn config_get(&self, key: &str) -> Result<Option<String>, HookToolError>;
    /// Whether this unit is the application leader.
    async fn is_leader(&self) -> Result<bool, HookToolError>;
    /// Lists the ids of the relations established on an endpoint.
    async fn relation_ids(&self, endpoint: &str) -> Result<Vec<String>, HookToolError>;
    /// Name of the remote application of a relation, `None` when it is gone.
    async fn relation_app(&self, relation_id: &str) -> Result<Option<String>, HookToolError>;
    /// Reads the application databag published by `app` on a relation.
    async fn relation_get_app(
        &self,
        relation_id: &str,
        app: &str,
    ) -> Result<RelationData, HookToolError>;
    /// Writes to the application databag of this application on a relation.
    async fn relation_set_app(
        &self,
        relation_id: &str,
        data: &RelationData,
    ) -> Result<(), HookToolError>;
    /// Reads the content of a Juju secret.
    async fn secret_get(&self, secret_id: &str) -> Result<RelationData, HookToolError>;
    /// Sets the unit workload status.
    async fn status_set(&self, status: &Status) -> Result<(), HookToolError>;
    /// Reads an action parameter, `None` when it was not given.
    async fn action_get(&self, key: &str) -> Result<Option<String>, HookToolError>;
    /// Sets the results of the running action.
    async fn action_set(&self, results: &BTreeMap<String, String>) -> Result<(), HookToolError>;
    /// Marks the running action as failed.
    async fn action_fail(&self, message: &str) -> Result<(), HookToolError>;
}

/// Hook tools provided by the Juju agent.
///
/// The tools are looked up in `PATH`, where the agent puts them before
/// dispatching.
#[derive(Debug, Clone, Default)]
pub struct JujuHookTools {
    /// Directory holding the tools, `PATH` lookup when `None`
    tools_dir: Option<PathBuf>,
}

impl JujuHookTools {
    /// Create a new [JujuHookTools] resolving the tools from `PATH`.
    pub fn new() -> Self {
        JujuHookTools { tools_dir: None }
    }

    /// Create a new [JujuHookTools] resolving the tools from `tools_dir`.
    #[cfg(test)]
    pub fn with_tools_dir(tools_dir: impl Into<PathBuf>) -> Self {
        JujuHookTools {
            tools_dir: Some(tools_dir.into()),
        }
    }

    fn program(&self, tool: &str) -> PathBuf {
        match &self.tools_dir {
            Some(dir) => dir.join(tool),
            None => PathBuf::from(tool),
        }
    }

    /// Runs a tool and returns its standard output.
    ///
    /// Arguments are not logged, they may carry secrets.
    async fn run(&self, tool: &str, args: &[String]) -> Result<String, HookToolError> {
        debug!("running hook tool {}", tool);

        let output = Command::new(self.program(tool))
            .args(args)
            .output()
            .await
            .map_err(|source| HookToolError::Spawn {
                tool: tool.to_owned(),
                source,
            })?;

        if !output.status.success() {
            return Err(HookToolError::Failed {
                tool: tool.to_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_json<T: DeserializeOwned>(
        &self,
        tool: &str,
        args: &[String],
    ) -> Result<T, HookToolError> {
        let stdout = self.run(tool, args).await?;
        serde_json::from_str(&stdout).map_err(|source| HookToolError::Output {
            tool: tool.to_owned(),
            source,
        })
    }
}

/// Converts a JSON scalar printed by a hook tool into an optional string.
fn optional_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl HookTools for JujuHookTools {
    async fn config_get(&self, key: &str) -> Result<Option<String>, HookToolError> {
        let value: Value = self
            .run_json("config-get", &args(&[key, "--format=json"]))
            .await?;
        Ok(optional_string(value))
    }

    async fn is_leader(&self) -> Result<bool, HookToolError> {
        self.run_json("is-leader", &args(&["--format=json"])).await
    }

    async fn relation_ids(&self, endpoint: &str) -> Result<Vec<String>, HookToolError> {
        let ids: Option<Vec<String>> = self
            .run_json("relation-ids", &args(&[endpoint, "--format=json"]))
            .await?;
        Ok(ids.unwrap_or_default())
    }

    async fn relation_app(&self, relation_id: &str) -> Result<Option<String>, HookToolError> {
        let value: Value = self
            .run_json(
                "relation-list",
                &args(&["-r", relation_id, "--app", "--format=json"]),
            )
            .await?;
        Ok(optional_string(value))
    }

    async fn relation_get_app(
        &self,
        relation_id: &str,
        app: &str,
    ) -> Result<RelationData, HookToolError> {
        let data: Option<RelationData> = self
            .run_json(
                "relation-get",
                &args(&["-r", relation_id, "--app", "--format=json", "-", app]),
            )
            .await?;
        Ok(data.unwrap_or_default())
    }

    async fn relation_set_app(
        &self,
        relation_id: &str,
        data: &RelationData,
    ) -> Result<(), HookToolError> {
        let mut arguments = args(&["-r", relation_id, "--app"]);
        let mut pairs: Vec<String> = data.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        pairs.sort();
        arguments.extend(pairs);
        self.run("relation-set", &arguments).await?;
        Ok(())
    }

    async fn secret_get(&self, secret_id: &str) -> Result<RelationData, HookToolError> {
        let content: Option<RelationData> = self
            .run_json("secret-get", &args(&[secret_id, "--format=json"]))
            .await?;
        Ok(content.unwrap_or_default())
    }

    async fn status_set(&self, status: &Status) -> Result<(), HookToolError> {
        let mut arguments = args(&[status.name()]);
        if !status.message().is_empty() {
            arguments.push(status.message().to_owned());
        }
        self.run("status-set", &arguments).await?;
        Ok(())
    }

    async fn action_get(&self, key: &str) -> Result<Option<String>, HookToolError> {
        let value: Value = self
            .run_json("action-get", &args(&[key, "--format=json"]))
            .await?;
        Ok(optional_string(value))
    }

    async fn action_set(&self, results: &BTreeMap<String, String>) -> Result<(), HookToolError> {
        if results.is_empty() {
            return Ok(());
        }
        let arguments: Vec<String> = results
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        self.run("action-set", &arguments).await?;
        Ok(())
    }

    async fn action_fail(&self, message: &str) -> Result<(), HookToolError> {
        self.run("action-fail", &args(&[message])).await?;
        Ok(())
    }
}
