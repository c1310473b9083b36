//! Named placeholder substitution for `{column}` syntax
//!
//! Template fields on steps (navigation URLs, input values, condition
//! expressions, DOM-check selectors) reference row columns by name:
//!
//! - `https://example.com/candidates/{candidateId}`
//! - `document.title.includes('{expectedTitle}')`
//!
//! A placeholder is `{name}` where `name` starts with a letter or `_` and
//! continues with letters, digits, `_`, `-`, `.` or single inner spaces.
//! Any other brace usage (JS blocks, object literals) is left untouched.
//!
//! Resolution is soft: if any referenced column is missing, the original
//! template is returned unchanged and a warning is logged.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use super::context::RowContext;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.\-]*(?: [A-Za-z0-9_.\-]+)*)\}").unwrap()
});

/// Errors that can occur during strict template resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Missing template variable(s): {}", .0.join(", "))]
    MissingKeys(Vec<String>),
}

/// Names of all placeholders referenced by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER_REGEX
        .captures_iter(template)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect()
}

/// Substitute every placeholder, failing if any referenced key is absent
pub fn try_resolve(template: &str, ctx: &RowContext) -> Result<String, TemplateError> {
    let mut missing: Vec<String> = Vec::new();

    for name in placeholders(template) {
        if !ctx.contains_key(name) && !missing.iter().any(|m| m == name) {
            missing.push(name.to_string());
        }
    }

    if !missing.is_empty() {
        return Err(TemplateError::MissingKeys(missing));
    }

    let resolved = PLACEHOLDER_REGEX.replace_all(template, |cap: &regex::Captures<'_>| {
        // Presence was checked above
        ctx.get(&cap[1]).unwrap_or_default().to_string()
    });

    Ok(resolved.into_owned())
}

/// Substitute placeholders, degrading to the raw template on a missing key
pub fn resolve(template: &str, ctx: &RowContext) -> String {
    match try_resolve(template, ctx) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(template = %template, "{}; using the unsubstituted template", e);
            template.to_string()
        }
    }
}

/// Resolve against an optional context; `None` leaves the template as is
pub fn resolve_opt(template: &str, ctx: Option<&RowContext>) -> String {
    match ctx {
        Some(ctx) => resolve(template, ctx),
        None => template.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> RowContext {
        RowContext::from_pairs([
            ("candidateId", "1234"),
            ("BASE_URL", "https://example.com"),
            ("first name", "Ada"),
        ])
    }

    #[test]
    fn test_resolve_single() {
        let ctx = test_context();
        assert_eq!(
            resolve("{BASE_URL}/candidates/{candidateId}", &ctx),
            "https://example.com/candidates/1234"
        );
    }

    #[test]
    fn test_resolve_repeated_and_spaced_names() {
        let ctx = test_context();
        assert_eq!(
            resolve("{first name} / {first name} #{candidateId}", &ctx),
            "Ada / Ada #1234"
        );
    }

    #[test]
    fn test_missing_key_returns_raw_template() {
        let ctx = test_context();
        let template = "{BASE_URL}/jobs/{jobId}";
        assert_eq!(resolve(template, &ctx), template);
    }

    #[test]
    fn test_try_resolve_reports_missing_keys_once() {
        let ctx = test_context();
        let err = try_resolve("{a}{b}{a}", &ctx).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingKeys(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let ctx = test_context();
        for s in [
            "",
            "plain text",
            "(() => { const el = document.querySelector('h1'); return el !== null; })()",
            "{ not a placeholder }",
            "{}",
        ] {
            assert!(placeholders(s).is_empty(), "{:?}", s);
            assert_eq!(resolve(s, &ctx), s);
        }
        assert_eq!(resolve("no vars", &RowContext::new()), "no vars");
    }

    #[test]
    fn test_doubled_braces_are_not_an_escape() {
        // The inner `{name}` is still a placeholder; the outer braces stay
        assert_eq!(placeholders("{{candidateId}}x"), vec!["candidateId"]);
        assert_eq!(resolve("{{candidateId}}x", &test_context()), "{1234}x");

        // Unknown name: the whole template is kept as written
        assert_eq!(resolve("{{double}}x", &test_context()), "{{double}}x");
    }

    #[test]
    fn test_js_blocks_are_not_placeholders() {
        assert!(placeholders("(() => { return 1; })()").is_empty());
        assert!(placeholders("if (x) {y()}").is_empty());
        assert_eq!(placeholders("a {b} c"), vec!["b"]);
    }

    #[test]
    fn test_resolve_opt_without_context() {
        assert_eq!(resolve_opt("{candidateId}", None), "{candidateId}");
        let ctx = test_context();
        assert_eq!(resolve_opt("{candidateId}", Some(&ctx)), "1234");
    }
}
