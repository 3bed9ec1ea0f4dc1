//! String template rendering utilities.
//!
//! One substitution syntax: `{{name}}` (inner whitespace tolerated). Unknown
//! names pass through verbatim so literal double braces survive rendering.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("token regex"))
}

/// Renders a template against a resolved map in a single pass.
///
/// A name mapped to `None` substitutes as the empty string; a name absent from
/// the map leaves the token untouched. Substituted values are never re-scanned
/// for further tokens.
pub fn render(template: &str, variables: &HashMap<String, Option<String>>) -> String {
    token_re()
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone().unwrap_or_default(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Whether a template references the given placeholder name.
pub fn references(template: &str, name: &str) -> bool {
    token_re()
        .captures_iter(template)
        .any(|caps| &caps[1] == name)
}
