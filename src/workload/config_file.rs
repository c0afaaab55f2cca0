//! Maubot configuration file.
//!
//! The Maubot configuration lives in a YAML file inside the workload
//! container. It is the only state shared by the reconciler and the actions,
//! and it is always handled as a whole:
//!
//! 1. [`ConfigFile::load`] pulls and parses the full document
//! 2. the caller mutates the in-memory [`WorkloadConfig`]
//! 3. [`ConfigFile::persist`] serializes and pushes the full document back
//!
//! Keys the operator does not manage are kept untouched.

use log::debug;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::{
    relations::matrix_auth::Homeservers,
    workload::{Workload, WorkloadError},
};

const DATABASE_KEY: &str = "database";
const HOMESERVERS_KEY: &str = "homeservers";
const SERVER_KEY: &str = "server";
const PUBLIC_URL_KEY: &str = "public_url";
const ADMINS_KEY: &str = "admins";

/// Errors raised while loading or persisting the configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read from or written to the container.
    #[error(transparent)]
    Workload(#[from] WorkloadError),
    /// The file is not valid YAML.
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The document root is not a mapping.
    #[error("invalid configuration: root is not a mapping")]
    NotAMapping,
}

/// In-memory Maubot configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadConfig {
    document: Mapping,
}

impl WorkloadConfig {
    /// Parses a configuration document, an empty document is an empty mapping.
    pub fn parse(content: &str) -> Result<Self, ConfigFileError> {
        if content.trim().is_empty() {
            return Ok(WorkloadConfig {
                document: Mapping::new(),
            });
        }

        match serde_yaml::from_str::<Value>(content)? {
            Value::Mapping(document) => Ok(WorkloadConfig { document }),
            Value::Null => Ok(WorkloadConfig {
                document: Mapping::new(),
            }),
            _ => Err(ConfigFileError::NotAMapping),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigFileError> {
        Ok(serde_yaml::to_string(&self.document)?)
    }

    #[cfg(test)]
    pub fn database(&self) -> Option<&str> {
        self.document.get(DATABASE_KEY).and_then(Value::as_str)
    }

    pub fn set_database(&mut self, url: &str) {
        self.document
            .insert(DATABASE_KEY.into(), Value::String(url.to_owned()));
    }

    /// Replaces the whole `homeservers` section.
    pub fn set_homeservers(&mut self, homeservers: &Homeservers) -> Result<(), ConfigFileError> {
        let value = serde_yaml::to_value(homeservers)?;
        self.document.insert(HOMESERVERS_KEY.into(), value);
        Ok(())
    }

    pub fn has_homeserver(&self, name: &str) -> bool {
        self.document
            .get(HOMESERVERS_KEY)
            .and_then(Value::as_mapping)
            .is_some_and(|homeservers| homeservers.contains_key(name))
    }

    #[cfg(test)]
    pub fn public_url(&self) -> Option<&str> {
        self.document
            .get(SERVER_KEY)
            .and_then(|server| server.get(PUBLIC_URL_KEY))
            .and_then(Value::as_str)
    }

    /// Sets `server.public_url`, `None` writes a null value.
    pub fn set_public_url(&mut self, url: Option<&str>) {
        let value = url.map_or(Value::Null, |url| Value::String(url.to_owned()));
        self.section_mut(SERVER_KEY)
            .insert(PUBLIC_URL_KEY.into(), value);
    }

    pub fn has_admin(&self, name: &str) -> bool {
        self.admins().is_some_and(|admins| admins.contains_key(name))
    }

    /// Password (or password hash) of an admin.
    #[cfg(test)]
    pub fn admin_password(&self, name: &str) -> Option<&str> {
        self.admins()
            .and_then(|admins| admins.get(name))
            .and_then(Value::as_str)
    }

    /// Inserts or overwrites an admin.
    pub fn set_admin(&mut self, name: &str, password: &str) {
        self.section_mut(ADMINS_KEY)
            .insert(name.into(), Value::String(password.to_owned()));
    }

    /// Removes an admin, returns whether it existed.
    pub fn remove_admin(&mut self, name: &str) -> bool {
        match self.document.get_mut(ADMINS_KEY).and_then(Value::as_mapping_mut) {
            Some(admins) => admins.remove(name).is_some(),
            None => false,
        }
    }

    fn admins(&self) -> Option<&Mapping> {
        self.document.get(ADMINS_KEY).and_then(Value::as_mapping)
    }

    /// Returns a top-level mapping, replacing a missing or scalar value.
    fn section_mut(&mut self, key: &str) -> &mut Mapping {
        let entry = self
            .document
            .entry(key.into())
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if !entry.is_mapping() {
            *entry = Value::Mapping(Mapping::new());
        }
        match entry {
            Value::Mapping(mapping) => mapping,
            _ => unreachable!("entry was just set to a mapping"),
        }
    }
}

/// Access to the configuration file stored in the workload container.
pub struct ConfigFile<'a, W: Workload> {
    workload: &'a W,
    path: &'a str,
}

impl<'a, W: Workload> ConfigFile<'a, W> {
    pub fn new(workload: &'a W, path: &'a str) -> Self {
        ConfigFile { workload, path }
    }

    /// Pulls and parses the full configuration document.
    pub async fn load(&self) -> Result<WorkloadConfig, ConfigFileError> {
        debug!("load configuration {}", self.path);
        let content = self.workload.pull(self.path).await?;
        WorkloadConfig::parse(&content)
    }

    /// Serializes and pushes the full configuration document.
    pub async fn persist(&self, config: &WorkloadConfig) -> Result<(), ConfigFileError> {
        debug!("persist configuration {}", self.path);
        let content = config.to_yaml()?;
        self.workload.push(self.path, &content).await?;
        Ok(())
    }
}
