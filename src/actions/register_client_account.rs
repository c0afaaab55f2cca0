//! `register-client-account` action.
//!
//! Registers a Matrix account on the homeserver of the matrix-auth
//! integration, through the Maubot API, so it can be used as a bot client.

use crate::{
    actions::{ActionError, ActionOutcome, ActionResults, ensure_ready, load},
    maubot::MaubotApi,
    relations::matrix_auth::HOMESERVER_NAME,
    utils::generate_password,
    workload::{Workload, config_file::ConfigFile},
};

pub const NAME: &str = "register-client-account";
pub const RESULT_KEYS: [&str; 4] = ["user-id", "password", "access-token", "device-id"];

/// Parameters of the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub admin_name: String,
    pub admin_password: String,
    pub account_name: String,
}

pub async fn run<W: Workload, A: MaubotApi>(
    workload: &W,
    maubot: &A,
    config_path: &str,
    request: &RegisterRequest,
) -> ActionOutcome {
    let result = register(workload, maubot, config_path, request)
        .await
        .map_err(|e| match e {
            ActionError::Precondition(message) => ActionError::Maubot(message),
            e => e,
        });
    ActionOutcome::new(NAME, &RESULT_KEYS, result)
}

async fn register<W: Workload, A: MaubotApi>(
    workload: &W,
    maubot: &A,
    config_path: &str,
    request: &RegisterRequest,
) -> Result<ActionResults, ActionError> {
    ensure_ready(workload).await?;

    let config = load(&ConfigFile::new(workload, config_path)).await?;
    if !config.has_homeserver(HOMESERVER_NAME) {
        return Err(ActionError::Precondition(
            "matrix-auth integration is required".to_owned(),
        ));
    }
    if !config.has_admin(&request.admin_name) {
        return Err(ActionError::Precondition(format!(
            "{} not found in admin users",
            request.admin_name
        )));
    }

    let token = maubot
        .login(&request.admin_name, &request.admin_password)
        .await?;
    let password = generate_password();
    let account = maubot
        .register_account(&token, &request.account_name, &password, HOMESERVER_NAME)
        .await?;

    Ok(ActionResults::from([
        ("user-id".to_owned(), account.user_id),
        ("password".to_owned(), password),
        ("access-token".to_owned(), account.access_token),
        ("device-id".to_owned(), account.device_id),
    ]))
}
