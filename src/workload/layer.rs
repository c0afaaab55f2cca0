//! Pebble layer of the Maubot workload.
//!
//! The container runs three services:
//!
//! - `maubot`: the bot framework itself
//! - `nginx`: reverse proxy in front of Maubot, started after it
//! - `blackbox`: blackbox exporter probing Maubot for the metrics integration

use std::collections::BTreeMap;

use serde::Serialize;

pub const LAYER_LABEL: &str = "maubot";
pub const MAUBOT_SERVICE: &str = "maubot";
pub const NGINX_SERVICE: &str = "nginx";
pub const BLACKBOX_SERVICE: &str = "blackbox";

/// Services restarted at the end of every reconcile, in this order.
pub const SERVICES: [&str; 3] = [MAUBOT_SERVICE, NGINX_SERVICE, BLACKBOX_SERVICE];

/// How a layer service combines with the same service of lower layers.
///
/// The operator owns its services, it always replaces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    Replace,
}

/// Whether Pebble starts the service on boot and on `replan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    Enabled,
}

/// A service entry of a Pebble layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Service {
    #[serde(rename = "override")]
    pub override_policy: Override,
    pub summary: String,
    pub command: String,
    pub startup: Startup,
    /// Services that must be started before this one
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

/// A Pebble configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layer {
    pub summary: String,
    pub description: String,
    pub services: BTreeMap<String, Service>,
}

impl Layer {
    /// Serializes the layer to the YAML format Pebble expects.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Builds the layer declaring the Maubot services.
///
/// `config_path` is the Maubot configuration file, its directory is used as
/// the Maubot working directory.
pub fn maubot_layer(config_path: &str) -> Layer {
    let working_dir = config_path
        .rsplit_once('/')
        .map(|(dir, _)| if dir.is_empty() { "/" } else { dir })
        .unwrap_or("/");

    let mut services = BTreeMap::new();
    services.insert(
        BLACKBOX_SERVICE.to_owned(),
        Service {
            override_policy: Override::Replace,
            summary: "blackbox-exporter".to_owned(),
            command: "/usr/bin/blackbox_exporter --config.file=/etc/blackbox.yaml".to_owned(),
            startup: Startup::Enabled,
            after: vec![],
            working_dir: None,
        },
    );
    services.insert(
        NGINX_SERVICE.to_owned(),
        Service {
            override_policy: Override::Replace,
            summary: "nginx".to_owned(),
            command: "/usr/sbin/nginx".to_owned(),
            startup: Startup::Enabled,
            after: vec![MAUBOT_SERVICE.to_owned()],
            working_dir: None,
        },
    );
    services.insert(
        MAUBOT_SERVICE.to_owned(),
        Service {
            override_policy: Override::Replace,
            summary: "maubot".to_owned(),
            command: format!("python3 -m maubot -c {}", config_path),
            startup: Startup::Enabled,
            after: vec![],
            working_dir: Some(working_dir.to_owned()),
        },
    );

    Layer {
        summary: "maubot layer".to_owned(),
        description: "pebble config layer for maubot".to_owned(),
        services,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maubot_layer_services() {
        let layer = maubot_layer("/data/config.yaml");

        assert_eq!(layer.services.len(), 3);
        let maubot = &layer.services[MAUBOT_SERVICE];
        assert_eq!(maubot.command, "python3 -m maubot -c /data/config.yaml");
        assert_eq!(maubot.working_dir.as_deref(), Some("/data"));
        assert_eq!(maubot.startup, Startup::Enabled);

        let nginx = &layer.services[NGINX_SERVICE];
        assert_eq!(nginx.after, vec![MAUBOT_SERVICE.to_owned()]);
        assert!(nginx.working_dir.is_none());

        assert!(layer.services.contains_key(BLACKBOX_SERVICE));
    }

    #[test]
    fn test_maubot_layer_working_dir_root() {
        let layer = maubot_layer("/config.yaml");
        assert_eq!(
            layer.services[MAUBOT_SERVICE].working_dir.as_deref(),
            Some("/")
        );
    }

    #[test]
    fn test_layer_to_yaml() {
        let yaml = maubot_layer("/data/config.yaml").to_yaml().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        let maubot = &value["services"]["maubot"];
        assert_eq!(maubot["override"].as_str(), Some("replace"));
        assert_eq!(maubot["startup"].as_str(), Some("enabled"));
        assert_eq!(maubot["working-dir"].as_str(), Some("/data"));
        assert!(maubot.get("after").is_none());

        let nginx = &value["services"]["nginx"];
        assert_eq!(nginx["after"][0].as_str(), Some("maubot"));
        assert!(nginx.get("working-dir").is_none());

        assert_eq!(value["summary"].as_str(), Some("maubot layer"));
    }
}
