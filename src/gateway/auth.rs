use crate::config::ApiAuthConfig;
use subtle::ConstantTimeEq;

/// Challenge sent with 401 responses.
pub const WWW_AUTHENTICATE_CHALLENGE: &str = "Basic realm=\"passhook\"";

/// Authorize a request against the configured Basic credentials.
///
/// With no credentials configured the endpoints are open. Otherwise both
/// username and password must match exactly.
pub fn authorize(expected: Option<&ApiAuthConfig>, provided: Option<(&str, &str)>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    match provided {
        Some((user, pass)) => safe_equal(&expected.user, user) && safe_equal(&expected.pass, pass),
        None => false,
    }
}

/// Timing-safe string comparison.
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
