//! `{{name}}` placeholder expansion.
//!
//! Placeholders take two forms, with optional whitespace inside the braces:
//!
//! - `{{ name }}` expands to the binding for `name`
//! - `{{ name || default }}` falls back to `default` when `name` is unbound
//!   or bound to the empty string
//!
//! Expansion is a single left-to-right pass. Substituted values are never
//! scanned again, so a value containing `{{...}}` is emitted verbatim.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SubstitutionError;

/// Variable name to value.
pub type Bindings = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*(?:\|\|\s*(.*?)\s*)?\}\}")
        .expect("placeholder pattern is valid")
});

/// What to do with a placeholder that has no binding and no default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Fail with [`SubstitutionError::UnboundVariable`]
    #[default]
    Strict,
    /// Keep the placeholder text unchanged (previews and dry runs)
    Relaxed,
}

/// Expand every placeholder in `text` against `bindings`.
///
/// # Errors
///
/// In [`Strictness::Strict`] mode, the first unbound placeholder without a
/// default yields [`SubstitutionError::UnboundVariable`] with its 1-based line.
///
/// # Example
///
/// ```
/// use ddx_core::substitute::{Bindings, Strictness, substitute};
///
/// let mut bindings = Bindings::new();
/// bindings.insert("name".into(), "app".into());
///
/// let out = substitute("{{name}} on {{ port || 8080 }}", &bindings, Strictness::Strict).unwrap();
/// assert_eq!(out, "app on 8080");
/// ```
pub fn substitute(
    text: &str,
    bindings: &Bindings,
    strictness: Strictness,
) -> Result<String, SubstitutionError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut line = 1;

    for caps in PLACEHOLDER.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let before = &text[last..whole.start()];
        line += before.matches('\n').count();
        out.push_str(before);

        let identifier = &caps[1];
        let bound = bindings.get(identifier).filter(|v| !v.is_empty());
        match (bound, caps.get(2)) {
            (Some(value), _) => out.push_str(value),
            (None, Some(default)) => out.push_str(default.as_str()),
            (None, None) => match strictness {
                Strictness::Strict => {
                    return Err(SubstitutionError::UnboundVariable {
                        identifier: identifier.to_string(),
                        line,
                    });
                }
                Strictness::Relaxed => out.push_str(whole.as_str()),
            },
        }

        line += whole.as_str().matches('\n').count();
        last = whole.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Identifiers referenced by `text`, in order of first use.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let identifier = &caps[1];
        if !seen.iter().any(|s: &String| s == identifier) {
            seen.push(identifier.to_string());
        }
    }
    seen
}

/// Whether `text` contains at least one placeholder.
pub fn has_placeholders(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn bindings(pairs: &[(&str, &str)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[rstest]
    #[case("{{name}}", "app")]
    #[case("{{ name }}", "app")]
    #[case("{{missing || fallback}}", "fallback")]
    #[case("{{ empty || used }}", "used")]
    #[case("{{ name || ignored }}", "app")]
    #[case("{{ missing || two words }}", "two words")]
    #[case("{{ dotted.key }}", "nested")]
    #[case("{ {name} }", "{ {name} }")]
    fn expands(#[case] input: &str, #[case] expected: &str) {
        let b = bindings(&[("name", "app"), ("empty", ""), ("dotted.key", "nested")]);
        assert_eq!(substitute(input, &b, Strictness::Strict).unwrap(), expected);
    }

    #[test]
    fn strict_reports_line_of_unbound_identifier() {
        let err = substitute("one\ntwo {{a}}\nthree {{ b }}", &bindings(&[("a", "x")]), Strictness::Strict)
            .unwrap_err();
        assert_eq!(
            err,
            SubstitutionError::UnboundVariable {
                identifier: "b".into(),
                line: 3
            }
        );
    }

    #[test]
    fn relaxed_keeps_placeholder() {
        let out = substitute("Hi {{ who }} from {{name}}", &bindings(&[("name", "app")]), Strictness::Relaxed)
            .unwrap();
        assert_eq!(out, "Hi {{ who }} from app");
    }

    #[test]
    fn values_are_not_rescanned() {
        let b = bindings(&[("a", "{{b}}"), ("b", "boom")]);
        assert_eq!(substitute("{{a}}", &b, Strictness::Strict).unwrap(), "{{b}}");
    }

    #[test]
    fn placeholders_in_first_use_order() {
        assert_eq!(
            placeholders("{{b}} {{ a || x }} {{b}} {{c}}"),
            vec!["b", "a", "c"]
        );
        assert!(!has_placeholders("plain text"));
    }

    proptest::proptest! {
        #[test]
        fn text_without_placeholders_is_unchanged(text in "[^{}]*") {
            let out = substitute(&text, &Bindings::new(), Strictness::Strict).unwrap();
            proptest::prop_assert_eq!(out, text);
        }

        #[test]
        fn bound_placeholder_yields_its_value(
            name in "[a-z][a-z0-9_]{0,10}",
            value in "[a-zA-Z0-9 {}]{1,20}",
        ) {
            let b = bindings(&[(name.as_str(), value.as_str())]);
            let out = substitute(&format!("<{{{{ {name} }}}}>"), &b, Strictness::Strict).unwrap();
            proptest::prop_assert_eq!(out, format!("<{value}>"));
        }
    }
}
