//! `create-admin` action.

use crate::{
    actions::{ActionError, ActionOutcome, ActionResults, apply, ensure_not_root, ensure_ready, load},
    utils::generate_password,
    workload::{Workload, config_file::ConfigFile},
};

pub const NAME: &str = "create-admin";
pub const RESULT_KEYS: [&str; 1] = ["password"];

/// Creates the Maubot admin `name` with a generated password.
pub async fn run<W: Workload>(workload: &W, config_path: &str, name: &str) -> ActionOutcome {
    ActionOutcome::new(NAME, &RESULT_KEYS, create_admin(workload, config_path, name).await)
}

async fn create_admin<W: Workload>(
    workload: &W,
    config_path: &str,
    name: &str,
) -> Result<ActionResults, ActionError> {
    ensure_not_root(name, "root is reserved, please choose a different name")?;
    ensure_ready(workload).await?;

    let file = ConfigFile::new(workload, config_path);
    let mut config = load(&file).await?;
    if config.has_admin(name) {
        return Err(ActionError::Precondition(format!("{} already exists", name)));
    }

    let password = generate_password();
    config.set_admin(name, &password);
    apply(
        workload,
        &file,
        &config,
        ActionResults::from([("password".to_owned(), password)]),
    )
    .await
}
