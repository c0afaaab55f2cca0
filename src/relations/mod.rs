//! Relation data handling.
//!
//! Credential resolvers read what the remote applications published and turn
//! it into Maubot configuration fragments. They are recomputed on every
//! reconcile, nothing is cached.
//!
//! - [`postgresql`]: database connection URL, required
//! - [`matrix_auth`]: homeserver credentials, with a default fallback
//! - [`metrics_endpoint`]: blackbox probe scrape job published to Prometheus

pub mod matrix_auth;
pub mod metrics_endpoint;
pub mod postgresql;

use log::debug;
use thiserror::Error;

use crate::juju::{HookToolError, HookTools, RelationData};

/// Errors raised while resolving relation data.
#[derive(Debug, Error)]
pub enum RelationError {
    /// A required relation is absent or incomplete.
    #[error("missing {relation} relation data: {reason}")]
    MissingData {
        relation: &'static str,
        reason: String,
    },
    /// The relation data could not be read.
    #[error(transparent)]
    HookTool(#[from] HookToolError),
}

impl RelationError {
    pub(crate) fn missing(relation: &'static str, reason: &str) -> Self {
        RelationError::MissingData {
            relation,
            reason: reason.to_owned(),
        }
    }
}

/// Reads the application databag of the remote side of an endpoint.
///
/// Only the first relation of the endpoint is considered. `broken` is the id
/// of a relation being removed: the agent still lists it during its
/// `relation-broken` hook, it is skipped. Returns `None` when no relation is
/// established or when the remote application is gone.
pub(crate) async fn remote_app_data<J: HookTools>(
    juju: &J,
    endpoint: &str,
    broken: Option<&str>,
) -> Result<Option<RelationData>, HookToolError> {
    let Some(relation_id) = juju
        .relation_ids(endpoint)
        .await?
        .into_iter()
        .find(|id| Some(id.as_str()) != broken)
    else {
        debug!("no {} relation", endpoint);
        return Ok(None);
    };

    let Some(app) = juju.relation_app(&relation_id).await? else {
        debug!("no remote application on {}", relation_id);
        return Ok(None);
    };

    Ok(Some(juju.relation_get_app(&relation_id, &app).await?))
}

/// Writes the same data to this application's databag on every relation of
/// an endpoint. Only the leader is allowed to do so.
pub(crate) async fn publish_app_data<J: HookTools>(
    juju: &J,
    endpoint: &str,
    data: &RelationData,
) -> Result<(), HookToolError> {
    for relation_id in juju.relation_ids(endpoint).await? {
        debug!("publish {:?} on {}", data.keys(), relation_id);
        juju.relation_set_app(&relation_id, data).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::juju::MockHookTools;

    #[tokio::test]
    async fn test_remote_app_data() {
        let mut juju = MockHookTools::new();
        juju.expect_relation_ids()
            .with(eq("postgresql"))
            .returning(|_| Ok(vec!["postgresql:3".to_owned()]));
        juju.expect_relation_app()
            .with(eq("postgresql:3"))
            .returning(|_| Ok(Some("postgresql-k8s".to_owned())));
        juju.expect_relation_get_app()
            .with(eq("postgresql:3"), eq("postgresql-k8s"))
            .returning(|_, _| {
                Ok(RelationData::from([(
                    "database".to_owned(),
                    "maubot".to_owned(),
                )]))
            });

        let data = remote_app_data(&juju, "postgresql", None).await.unwrap().unwrap();
        assert_eq!(data["database"], "maubot");
    }

    #[tokio::test]
    async fn test_remote_app_data_no_relation() {
        let mut juju = MockHookTools::new();
        juju.expect_relation_ids().returning(|_| Ok(vec![]));
        juju.expect_relation_app().never();

        assert!(remote_app_data(&juju, "postgresql", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_app_data_app_gone() {
        let mut juju = MockHookTools::new();
        juju.expect_relation_ids()
            .returning(|_| Ok(vec!["postgresql:3".to_owned()]));
        juju.expect_relation_app().returning(|_| Ok(None));
        juju.expect_relation_get_app().never();

        assert!(remote_app_data(&juju, "postgresql", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_app_data_on_every_relation() {
        let mut juju = MockHookTools::new();
        juju.expect_relation_ids()
            .returning(|_| Ok(vec!["metrics-endpoint:1".to_owned(), "metrics-endpoint:5".to_owned()]));
        juju.expect_relation_set_app()
            .withf(|_, data| data.contains_key("scrape_jobs"))
            .times(2)
            .returning(|_, _| Ok(()));

        let data = RelationData::from([("scrape_jobs".to_owned(), "[]".to_owned())]);
        publish_app_data(&juju, "metrics-endpoint", &data)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remote_app_data_skips_broken_relation() {
        let mut juju = MockHookTools::new();
        juju.expect_relation_ids()
            .returning(|_| Ok(vec!["postgresql:3".to_owned()]));
        juju.expect_relation_app().never();

        let data = remote_app_data(&juju, "postgresql", Some("postgresql:3"))
            .await
            .unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_remote_app_data_falls_back_to_other_relation() {
        let mut juju = MockHookTools::new();
        juju.expect_relation_ids()
            .returning(|_| Ok(vec!["postgresql:3".to_owned(), "postgresql:8".to_owned()]));
        juju.expect_relation_app()
            .with(eq("postgresql:8"))
            .returning(|_| Ok(Some("postgresql-k8s".to_owned())));
        juju.expect_relation_get_app()
            .with(eq("postgresql:8"), eq("postgresql-k8s"))
            .returning(|_, _| Ok(RelationData::new()));

        let data = remote_app_data(&juju, "postgresql", Some("postgresql:3"))
            .await
            .unwrap();
        assert_eq!(data, Some(RelationData::new()));
    }
}
