pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";
pub const USER_ID: &str = "user_id";

/// Where login and logout land when no usable return url was given.
pub const DEFAULT_RETURN_URL: &str = "/me";

/// Keeps `url` only when it is a path on this site.
///
/// `//host` and `/\host` are treated as other origins by browsers, so a
/// single leading slash followed by anything else is required.
pub fn local_return_url(url: &str) -> Option<&str> {
    let rest = url.strip_prefix('/')?;
    if rest.starts_with(['/', '\\']) || url.contains('\\') || url.chars().any(char::is_control) {
        return None;
    }
    Some(url)
}
