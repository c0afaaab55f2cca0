//! `delete-admin` action.

use crate::{
    actions::{ActionError, ActionOutcome, ActionResults, apply, ensure_not_root, ensure_ready, load},
    workload::{Workload, config_file::ConfigFile},
};

pub const NAME: &str = "delete-admin";
pub const RESULT_KEYS: [&str; 1] = [NAME];

/// Removes the Maubot admin `name`.
///
/// The `delete-admin` result field is `"true"` once the admin is removed from
/// the configuration and `"false"` otherwise.
pub async fn run<W: Workload>(workload: &W, config_path: &str, name: &str) -> ActionOutcome {
    let mut outcome = ActionOutcome::new(NAME, &RESULT_KEYS, delete_admin(workload, config_path, name).await);
    if let Some(deleted) = outcome.results.get_mut(NAME).filter(|value| value.is_empty()) {
        *deleted = "false".to_owned();
    }
    outcome
}

async fn delete_admin<W: Workload>(
    workload: &W,
    config_path: &str,
    name: &str,
) -> Result<ActionResults, ActionError> {
    ensure_not_root(name, "root can not be deleted")?;
    ensure_ready(workload).await?;

    let file = ConfigFile::new(workload, config_path);
    let mut config = load(&file).await?;
    if !config.remove_admin(name) {
        return Err(ActionError::Precondition(format!("{} not found", name)));
    }
    apply(
        workload,
        &file,
        &config,
        ActionResults::from([(NAME.to_owned(), "true".to_owned())]),
    )
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        actions::{
            create_admin,
            tests::{
                CONFIG_PATH, read_only_workload, ready_workload, restart_failing_workload,
                unreachable_workload,
            },
        },
        workload::{MockWorkload, config_file::WorkloadConfig},
    };

    const CONFIG: &str = "admins:\n  root: ''\n  alice: pwd\n";

    #[tokio::test]
    async fn test_delete_admin() {
        let pushed = Arc::new(Mutex::new(vec![]));
        let restarts = Arc::new(Mutex::new(0));
        let workload = ready_workload(CONFIG, &pushed, &restarts);

        let outcome = run(&workload, CONFIG_PATH, "alice").await;

        assert!(outcome.is_success());
        assert_eq!(outcome.result("delete-admin"), "true");
        assert_eq!(outcome.result("error"), "");

        let config = WorkloadConfig::parse(&pushed.lock().unwrap()[0]).unwrap();
        assert!(!config.has_admin("alice"));
        assert!(config.has_admin("root"));
        assert_eq!(*restarts.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let pushed = Arc::new(Mutex::new(vec![]));
        let restarts = Arc::new(Mutex::new(0));
        let workload = ready_workload("admins:\n  root: ''\n", &pushed, &restarts);

        assert!(create_admin::run(&workload, CONFIG_PATH, "x").await.is_success());
        assert!(run(&workload, CONFIG_PATH, "x").await.is_success());

        let last = pushed.lock().unwrap().last().cloned().unwrap();
        assert!(!WorkloadConfig::parse(&last).unwrap().has_admin("x"));

        let again = run(&workload, CONFIG_PATH, "x").await;
        assert_eq!(again.failure.as_deref(), Some("x not found"));
    }

    #[tokio::test]
    async fn test_delete_root_is_rejected() {
        let mut workload = MockWorkload::new();
        workload.expect_can_connect().never();
        workload.expect_push().never();

        let outcome = run(&workload, CONFIG_PATH, "root").await;
        assert_eq!(outcome.failure.as_deref(), Some("root can not be deleted"));
        assert_eq!(outcome.result("delete-admin"), "false");
    }

    #[tokio::test]
    async fn test_delete_admin_not_ready() {
        let outcome = run(&unreachable_workload(), CONFIG_PATH, "alice").await;
        assert_eq!(outcome.failure.as_deref(), Some("maubot is not ready"));
    }

    #[tokio::test]
    async fn test_delete_unknown_admin() {
        let pushed = Arc::new(Mutex::new(vec![]));
        let restarts = Arc::new(Mutex::new(0));
        let workload = ready_workload(CONFIG, &pushed, &restarts);

        let outcome = run(&workload, CONFIG_PATH, "bob").await;
        assert_eq!(outcome.failure.as_deref(), Some("bob not found"));
        assert!(pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_admin_push_failure() {
        let workload = read_only_workload(CONFIG);

        let outcome = run(&workload, CONFIG_PATH, "alice").await;
        assert_eq!(outcome.result("delete-admin"), "false");
        assert_eq!(
            outcome.result("error"),
            "failed to push configuration, check the logs"
        );
        assert_eq!(
            outcome.failure.as_deref(),
            Some("failed to push configuration, check the logs")
        );
    }

    #[tokio::test]
    async fn test_delete_admin_restart_failure() {
        let pushed = Arc::new(Mutex::new(vec![]));
        let workload = restart_failing_workload(CONFIG, &pushed);

        let outcome = run(&workload, CONFIG_PATH, "alice").await;

        // The admin is gone from the configuration even though Maubot did not restart
        assert_eq!(outcome.result("delete-admin"), "true");
        assert_eq!(
            outcome.failure.as_deref(),
            Some("failed to restart maubot, check the logs")
        );
        let config = WorkloadConfig::parse(&pushed.lock().unwrap()[0]).unwrap();
        assert!(!config.has_admin("alice"));
    }
}
