use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    // A `{{name}}` reference anywhere in a string
    static ref TEMPLATE_REF_REGEX: Regex = Regex::new(
        r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}"
    ).unwrap();

    // A string that is exactly one `{{name}}` reference
    static ref WHOLE_REF_REGEX: Regex = Regex::new(
        r"^\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}$"
    ).unwrap();

    static ref IDENTIFIER_REGEX: Regex = Regex::new(
        r"^[A-Za-z_][A-Za-z0-9_]*$"
    ).unwrap();
}

/// Names referenced by `{{name}}` in the text, in order of appearance.
pub fn references(text: &str) -> Vec<&str> {
    TEMPLATE_REF_REGEX
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

pub fn contains_reference(text: &str) -> bool {
    TEMPLATE_REF_REGEX.is_match(text)
}

/// If the whole text is a single reference, returns the variable name.
pub fn whole_reference(text: &str) -> Option<&str> {
    WHOLE_REF_REGEX
        .captures(text.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// True when braces are left over after removing every valid reference,
/// e.g. `{{ user-name }}` or `{{user}`.
pub fn has_malformed_template(text: &str) -> bool {
    let stripped = TEMPLATE_REF_REGEX.replace_all(text, "");
    stripped.contains("{{") || stripped.contains("}}")
}

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_REGEX.is_match(name)
}

/// Replaces every reference using `resolve`. Returns the first name that
/// could not be resolved as the error.
pub fn substitute<F>(text: &str, mut resolve: F) -> Result<String, String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut missing: Option<String> = None;
    let replaced = TEMPLATE_REF_REGEX.replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        match resolve(name) {
            Some(value) => value,
            None => {
                if missing.is_none() {
                    missing = Some(name.to_string());
                }
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(name),
        None => Ok(replaced.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_references_in_order() {
        assert_eq!(
            references("{{first}} and {{ second }} then {{first}}"),
            vec!["first", "second", "first"]
        );
        assert!(references("no refs here").is_empty());
    }

    #[test]
    fn whole_reference_requires_single_token() {
        assert_eq!(whole_reference(" {{count}} "), Some("count"));
        assert_eq!(whole_reference("{{count}}s"), None);
    }

    #[test]
    fn detects_malformed_templates() {
        assert!(has_malformed_template("{{user-name}}"));
        assert!(has_malformed_template("{{user}"));
        assert!(!has_malformed_template("hello {{user}}"));
        assert!(!has_malformed_template("plain"));
    }

    #[test]
    fn substitutes_all_references() {
        let result = substitute("{{a}}-{{b}}", |name| Some(name.to_uppercase()));
        assert_eq!(result, Ok("A-B".to_string()));
    }

    #[test]
    fn substitute_reports_missing_name() {
        let result = substitute("{{a}}-{{b}}", |name| (name == "a").then(|| "x".to_string()));
        assert_eq!(result, Err("b".to_string()));
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("user_1"));
        assert!(!is_identifier("1user"));
        assert!(!is_identifier("user-name"));
    }
}
