//! Placeholder substitution for step text.
//!
//! Placeholders are `[NAME]` where `NAME` is uppercase ASCII letters, digits and
//! underscores. Resolution is a pure function of the text and the variable map.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::types::{VariableMap, display_value};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Z0-9_]+)\]").expect("placeholder regex is valid"));

/// Replace every placeholder whose name is a key in `variables`.
///
/// Unknown placeholders pass through unchanged; missing inputs are reported by
/// the state machine before prompt text is ever resolved.
pub fn resolve(text: &str, variables: &VariableMap) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| match variables.get(&caps[1]) {
            Some(value) => display_value(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholders(text: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        if let Some(name) = caps.get(1).map(|m| m.as_str())
            && !names.contains(&name)
        {
            names.push(name);
        }
    }
    names
}
