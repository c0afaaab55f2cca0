//! Operator settings.
//!
//! The operator needs to know where Pebble and the Maubot API listen and where
//! the workload keeps its files. Every setting has a default matching the
//! Maubot OCI image, so the operator runs without any settings file.
//!
//! Settings are layered with [`figment`]:
//!
//! 1. built-in defaults ([`Settings::default`]);
//! 2. an optional YAML file passed with `--config`;
//! 3. environment variables prefixed with `MAUBOT_OPERATOR_`, `__` separating
//!    nested keys.
//!
//! # Settings File Format
//!
//! ```yaml
//! pebble:
//!   socket: "/charm/containers/maubot/pebble.socket"
//!   timeout: 30
//!
//! maubot:
//!   url: "http://localhost:29316/_matrix/maubot"
//!   timeout: 5
//!
//! workload:
//!   config_path: "/data/config.yaml"
//!   example_config_path: "/example-config.yaml"
//!   data_dirs:
//!     - "/data/plugins"
//!     - "/data/trash"
//!     - "/data/dbs"
//! ```
//!
//! # Environment Variable Overrides
//!
//! ```bash
//! export MAUBOT_OPERATOR_PEBBLE__SOCKET="/charm/containers/maubot/pebble.socket"
//! export MAUBOT_OPERATOR_MAUBOT__TIMEOUT=10
//! ```

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

/// Root settings structure of the operator.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Pebble API settings
    pub pebble: PebbleSettings,
    /// Maubot API settings
    pub maubot: MaubotSettings,
    /// Workload filesystem layout
    pub workload: WorkloadSettings,
}

/// Pebble API settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PebbleSettings {
    /// Pebble API socket of the workload container, as mounted in the charm
    /// container by the Juju agent.
    pub socket: String,
    /// Timeout in seconds of a single Pebble request.
    ///
    /// Waiting for a service change counts as one request.
    pub timeout: u64,
}

/// Maubot management API settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MaubotSettings {
    /// Root URL of the Maubot management API, without trailing slash.
    pub url: String,
    /// Timeout in seconds of a single Maubot API request.
    pub timeout: u64,
}

/// Paths used inside the workload container.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkloadSettings {
    /// Maubot configuration file.
    pub config_path: String,
    /// Example configuration shipped in the image, copied to `config_path`
    /// when the latter does not exist yet.
    pub example_config_path: String,
    /// Directories Maubot expects to exist before starting.
    pub data_dirs: Vec<String>,
}

impl Default for PebbleSettings {
    fn default() -> Self {
        PebbleSettings {
            socket: "/charm/containers/maubot/pebble.socket".to_owned(),
            timeout: 30,
        }
    }
}

impl Default for MaubotSettings {
    fn default() -> Self {
        MaubotSettings {
            url: "http://localhost:29316/_matrix/maubot".to_owned(),
            timeout: 5,
        }
    }
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        WorkloadSettings {
            config_path: "/data/config.yaml".to_owned(),
            example_config_path: "/example-config.yaml".to_owned(),
            data_dirs: vec![
                "/data/plugins".to_owned(),
                "/data/trash".to_owned(),
                "/data/dbs".to_owned(),
            ],
        }
    }
}

impl PebbleSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl MaubotSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Settings {
    /// Loads the settings from the defaults, an optional YAML file and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is given but does not exist, if the file is
    /// not valid YAML, or if a value has the wrong type.
    pub fn load(path: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        if let Some(path) = path {
            if !Path::new(path).exists() {
                return Err(figment::Error::from(format!(
                    "settings file {} not found",
                    path
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }

        let mut settings: Settings = figment
            .merge(Env::prefixed("MAUBOT_OPERATOR_").split("__"))
            .extract()?;

        // Endpoints are joined with sub paths, drop the trailing slash
        trim_trailing_slash(&mut settings.maubot.url);

        Ok(settings)
    }
}

fn trim_trailing_slash(url: &mut String) {
    while url.ends_with('/') {
        url.pop();
    }
}
