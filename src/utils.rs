//! Small helpers shared by the actions and the charm.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Number of random bytes drawn before encoding a generated password.
const PASSWORD_ENTROPY_BYTES: usize = 10;

/// Generates a random URL-safe password.
///
/// Draws [`PASSWORD_ENTROPY_BYTES`] random bytes and encodes them with the
/// URL-safe base64 alphabet without padding, so the result can be passed on a
/// command line or in a JSON payload without escaping.
///
/// # Examples
///
/// ```
/// # use maubot_operator::utils::generate_password;
/// let password = generate_password();
/// assert_eq!(password.len(), 14);
/// ```
pub fn generate_password() -> String {
    let bytes: [u8; PASSWORD_ENTROPY_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Returns the application name of a Juju unit name (`maubot/0` -> `maubot`).
pub fn app_name(unit_name: &str) -> &str {
    unit_name.split('/').next().unwrap_or(unit_name)
}
