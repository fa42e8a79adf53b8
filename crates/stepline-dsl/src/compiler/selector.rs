use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // Characters that normally appear in CSS selectors
    static ref CSS_SELECTOR_REGEX: Regex = Regex::new(
        r#"^[#\.\[\]a-zA-Z0-9\-_:\s\*>+~="'\(\),]+$"#
    ).unwrap();
}

/// How the remote platform should interpret a target string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    /// CSS selector (`#id`, `.class`, `[attr]`, `css=...`)
    Css,
    /// XPath expression (`//div`, `(//a)[2]`, `xpath=...`)
    Xpath,
    /// Visible text or label; the platform guesses the element
    Guess,
    /// Navigation target
    Url,
}

impl SelectorKind {
    /// Infers the kind of an element selector from its explicit marker.
    /// Selectors without a marker are best-guess.
    pub fn infer(selector: &str) -> Self {
        let s = selector.trim_start();
        if s.starts_with("css=") || s.starts_with('#') || s.starts_with('.') || s.starts_with('[') {
            SelectorKind::Css
        } else if s.starts_with("xpath=") || s.starts_with("//") || s.starts_with("(//") {
            SelectorKind::Xpath
        } else {
            SelectorKind::Guess
        }
    }
}

/// True for CSS selectors with characters or quoting that rarely belong in one.
pub fn is_unusual_css(selector: &str) -> bool {
    let body = selector.strip_prefix("css=").unwrap_or(selector);
    let unbalanced = body.matches('"').count() % 2 == 1 || body.matches('\'').count() % 2 == 1;
    unbalanced || !CSS_SELECTOR_REGEX.is_match(body)
}
