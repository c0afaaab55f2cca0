//! Prometheus scrape integration.
//!
//! Maubot exposes no metrics of its own. The blackbox exporter running in the
//! workload probes the Maubot API, and Prometheus scrapes the exporter.

use serde::Serialize;

use crate::{
    juju::{HookToolError, HookTools, JujuContext, RelationData},
    relations::publish_app_data,
};

pub const RELATION_NAME: &str = "metrics-endpoint";

const JOB_NAME: &str = "blackbox_maubot";
const PROBE_PATH: &str = "/probe";
const PROBE_MODULE: &str = "http_2xx";
const PROBE_TARGET: &str = "http://127.0.0.1:29316/_matrix/maubot/";
const BLACKBOX_PORT: u16 = 9115;

#[derive(Debug, Serialize)]
pub struct ScrapeJob {
    pub job_name: String,
    pub metrics_path: String,
    pub params: ProbeParams,
    pub static_configs: Vec<StaticConfig>,
    pub relabel_configs: Vec<RelabelConfig>,
}

#[derive(Debug, Serialize)]
pub struct ProbeParams {
    pub module: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct RelabelConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_labels: Vec<String>,
    pub target_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

impl RelabelConfig {
    fn copy(source: &str, target: &str) -> Self {
        RelabelConfig {
            source_labels: vec![source.to_owned()],
            target_label: target.to_owned(),
            replacement: None,
        }
    }
}

/// Scrape job probing Maubot through the blackbox exporter of this unit.
pub fn probe_scrape_job(context: &JujuContext) -> ScrapeJob {
    let exporter = format!(
        "{}.{}-endpoints.{}.svc.cluster.local:{}",
        context.unit_name.replace('/', "-"),
        context.app_name(),
        context.model_name,
        BLACKBOX_PORT
    );

    ScrapeJob {
        job_name: JOB_NAME.to_owned(),
        metrics_path: PROBE_PATH.to_owned(),
        params: ProbeParams {
            module: vec![PROBE_MODULE.to_owned()],
        },
        static_configs: vec![StaticConfig {
            targets: vec![PROBE_TARGET.to_owned()],
        }],
        relabel_configs: vec![
            RelabelConfig::copy("__address__", "__param_target"),
            RelabelConfig::copy("__param_target", "instance"),
            RelabelConfig::copy("__param_target", "probe_target"),
            RelabelConfig {
                target_label: "__address__".to_owned(),
                replacement: Some(exporter),
                ..Default::default()
            },
        ],
    }
}

/// Publishes the probe scrape job on every metrics-endpoint relation.
pub async fn publish_scrape_jobs<J: HookTools>(
    juju: &J,
    context: &JujuContext,
) -> Result<(), HookToolError> {
    let jobs = vec![probe_scrape_job(context)];
    let scrape_jobs = serde_json::to_string(&jobs).map_err(|source| HookToolError::Output {
        tool: "relation-set".to_owned(),
        source,
    })?;

    let data = RelationData::from([("scrape_jobs".to_owned(), scrape_jobs)]);
    publish_app_data(juju, RELATION_NAME, &data).await
}
