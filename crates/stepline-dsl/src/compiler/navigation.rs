use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref HIERARCHICAL_SCHEME_REGEX: Regex = Regex::new(
        r"^[A-Za-z][A-Za-z0-9+.\-]*://"
    ).unwrap();
}

const OPAQUE_SCHEMES: &[&str] = &["about:", "data:", "javascript:", "mailto:"];

/// True when the target carries its own scheme and needs no base.
pub fn has_scheme(target: &str) -> bool {
    let target = target.trim();
    HIERARCHICAL_SCHEME_REGEX.is_match(target)
        || OPAQUE_SCHEMES
            .iter()
            .any(|scheme| target.to_ascii_lowercase().starts_with(scheme))
}

/// Resolves a navigation target against the base URL.
///
/// Absolute targets pass through unchanged. Relative targets are joined
/// with RFC 3986 reference resolution; without a base they are kept as is.
pub fn resolve(base: Option<&str>, target: &str) -> Result<String, url::ParseError> {
    if has_scheme(target) {
        return Ok(target.to_string());
    }
    match base {
        Some(base) => Ok(Url::parse(base)?.join(target)?.to_string()),
        None => Ok(target.to_string()),
    }
}
