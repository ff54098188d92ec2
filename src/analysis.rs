//! Static analysis of expression source text.
//!
//! Failure reports attribute a failed rule to the record properties its
//! expression reads, so the property set is extracted from the source once,
//! whenever an expression is bound to a rule.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Side-channel keys that let an expression force or suppress property
/// attribution. Referencing any of them opts a rule into read-back of the
/// side channel after a failure.
pub const FORCED_ENTITIES: &str = "forcedEntities";
pub const FORCED_PROPERTIES: &str = "forcedProperties";
pub const IGNORED_PROPERTIES: &str = "ignoredProperties";

/// Remaining side-channel keys recognised in an expression's result map.
pub const VALID: &str = "valid";
pub const FAILING: &str = "failing";
pub const MESSAGE: &str = "message";
pub const EXTRA_MESSAGES: &str = "extraMessages";
pub const INFO_MESSAGES: &str = "infoMessages";

const KEYWORDS: &[&str] = &["true", "false", "null", "in"];

// Raw literals (`r"..."`, `br'...'`) have no escapes; bytes literals
// (`b"..."`) escape like plain strings.
static STRING_LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?s)\b(?:[bB]?[rR]|[rR][bB])(?:"""(?:.*?)"""|'''(?:.*?)'''|"[^"]*"|'[^']*')"#,
        r#"|(?:\b[bB])?(?:"""(?:.*?)"""|'''(?:.*?)'''|"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#,
    ))
    .unwrap()
});

static COMPREHENSION_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.\s*(?:all|exists|exists_one|map|filter)\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*,")
        .unwrap()
});

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*").unwrap()
});

static SIDE_CHANNEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:forcedEntities|forcedProperties|ignoredProperties)\b").unwrap()
});

/// What an expression's source text references.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpressionAnalysis {
    /// Raw property references, possibly dotted (`amount`, `order.currency`).
    pub properties: BTreeSet<String>,
    /// Whether the source mentions a forcing or ignoring side-channel key.
    pub uses_side_channel: bool,
}

/// Analyzes an expression source. A blank source references nothing.
pub fn analyze(source: &str) -> ExpressionAnalysis {
    ExpressionAnalysis {
        properties: referenced_properties(source),
        uses_side_channel: SIDE_CHANNEL_RE.is_match(source),
    }
}

/// Extracts the property references of an expression.
///
/// Skipped: string literals, keywords, function names, the member or method
/// part of a chain (`name.startsWith(...)` reports `name`), comprehension
/// variables and side-channel keys.
pub fn referenced_properties(source: &str) -> BTreeSet<String> {
    let stripped = STRING_LITERAL_RE.replace_all(source, "\"\"");

    let bound: BTreeSet<&str> = COMPREHENSION_VAR_RE
        .captures_iter(&stripped)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();

    let bytes = stripped.as_bytes();
    let mut properties = BTreeSet::new();

    for m in REFERENCE_RE.find_iter(&stripped) {
        if m.start() > 0 {
            let prev = bytes[m.start() - 1];
            if prev == b'.' || prev.is_ascii_alphanumeric() || prev == b'_' {
                continue;
            }
        }

        let called = stripped[m.end()..].trim_start().starts_with('(');
        let mut chain: Vec<&str> = m.as_str().split('.').collect();
        if called {
            chain.pop();
        }
        let Some(head) = chain.first() else {
            continue;
        };
        if KEYWORDS.contains(head) || bound.contains(head) || is_side_channel_key(head) {
            continue;
        }
        properties.insert(chain.join("."));
    }

    properties
}

fn is_side_channel_key(name: &str) -> bool {
    matches!(
        name,
        FORCED_ENTITIES
            | FORCED_PROPERTIES
            | IGNORED_PROPERTIES
            | FAILING
            | EXTRA_MESSAGES
            | INFO_MESSAGES
    )
}
