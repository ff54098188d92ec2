use crate::error::{ParseError, ParseErrorKind};
use crate::types::ValidatorDef;
use serde_json::Value;

const TOP_LEVEL_FIELDS: &[&str] = &[
    "id",
    "version",
    "name",
    "description",
    "options",
    "categories",
    "levels",
    "conditions",
    "rules",
];

const SECTION_FIELDS: &[(&str, &[&str])] = &[
    ("categories", &["id", "name", "description"]),
    ("levels", &["path", "contexts"]),
    ("conditions", &["id", "path", "expression", "description"]),
    (
        "rules",
        &[
            "id",
            "path",
            "expression",
            "message",
            "severity",
            "category",
            "conditions",
            "condition_logic",
            "depends_on",
            "ignored",
            "description",
        ],
    ),
];

const OPTION_FIELDS: &[&str] = &[
    "forced_cache_capacity",
    "compile_workers",
    "generic_error_message",
    "default_message",
];

/// Parse a YAML string into an unverified [`ValidatorDef`].
///
/// Performs YAML deserialization and type mapping only. Does NOT verify
/// references or apply defaults.
pub fn parse(input: &str) -> Result<ValidatorDef, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError {
            kind: ParseErrorKind::Syntax,
            message: "empty input".to_string(),
            path: None,
        });
    }

    check_multi_document(input)?;

    let value: Value = serde_saphyr::from_str(input).map_err(|e| {
        let msg = e.to_string();
        ParseError {
            kind: classify_saphyr_error(&msg),
            message: msg,
            path: None,
        }
    })?;

    let Some(root) = value.as_object() else {
        return Err(ParseError {
            kind: ParseErrorKind::TypeMismatch,
            message: "document root must be a YAML mapping".to_string(),
            path: None,
        });
    };

    check_fields(root, TOP_LEVEL_FIELDS, "")?;
    if let Some(Value::Object(options)) = root.get("options") {
        check_fields(options, OPTION_FIELDS, "options")?;
    }
    for (section, fields) in SECTION_FIELDS {
        if let Some(Value::Array(entries)) = root.get(*section) {
            for (i, entry) in entries.iter().enumerate() {
                if let Value::Object(obj) = entry {
                    check_fields(obj, fields, &format!("{}[{}]", section, i))?;
                }
            }
        }
    }

    serde_json::from_value(value).map_err(|e| {
        let msg = e.to_string();
        ParseError {
            kind: classify_json_error(&msg),
            message: msg,
            path: None,
        }
    })
}

fn check_fields(
    obj: &serde_json::Map<String, Value>,
    allowed: &[&str],
    at: &str,
) -> Result<(), ParseError> {
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => {
            let path = if at.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", at, key)
            };
            Err(ParseError {
                kind: ParseErrorKind::UnknownField,
                message: format!("unknown field: {}", path),
                path: Some(path),
            })
        }
        None => Ok(()),
    }
}

/// Only matches `---` at column 0 to avoid false positives inside block
/// scalars.
fn check_multi_document(input: &str) -> Result<(), ParseError> {
    let markers = input
        .lines()
        .filter(|line| line.starts_with("---") && line[3..].trim().is_empty())
        .count();
    if markers > 1 {
        return Err(ParseError {
            kind: ParseErrorKind::Syntax,
            message: "multi-document YAML is not supported".to_string(),
            path: None,
        });
    }
    Ok(())
}

fn classify_saphyr_error(msg: &str) -> ParseErrorKind {
    let lower = msg.to_lowercase();
    if lower.contains("type") || lower.contains("invalid") || lower.contains("expected") {
        ParseErrorKind::TypeMismatch
    } else {
        ParseErrorKind::Syntax
    }
}

fn classify_json_error(msg: &str) -> ParseErrorKind {
    let lower = msg.to_lowercase();
    if lower.contains("unknown field") {
        ParseErrorKind::UnknownField
    } else if lower.contains("unknown variant")
        || lower.contains("missing field")
        || lower.contains("invalid type")
    {
        ParseErrorKind::TypeMismatch
    } else {
        ParseErrorKind::Syntax
    }
}
