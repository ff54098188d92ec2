//! Message templating.

use crate::primitives::{resolve_simple_path, value_to_string};
use crate::record::RecordNode;
use serde_json::Value;

/// Fills property placeholders in failure messages.
pub trait MessageTemplater: Send + Sync {
    fn fill_template(&self, template: &str, node: &dyn RecordNode) -> String;

    fn fill_templates(&self, templates: &[String], node: &dyn RecordNode) -> Vec<String> {
        templates
            .iter()
            .map(|t| self.fill_template(t, node))
            .collect()
    }
}

/// Substitutes `{{path}}` with the value at `path` in the node's scope.
///
/// `{{sku}}` reads a field of the current node, `{{order.currency}}` walks
/// from a level binding. Unresolvable references render empty; `\{{` is a
/// literal `{{`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PropertyTemplater;

impl MessageTemplater for PropertyTemplater {
    fn fill_template(&self, template: &str, node: &dyn RecordNode) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        let scope = Value::Object(node.scope());
        interpolate(template, &scope)
    }
}

fn interpolate(template: &str, scope: &Value) -> String {
    const PLACEHOLDER: &str = "\x00ESCAPED_OPEN_BRACE\x00";
    let working = template.replace("\\{{", PLACEHOLDER);

    let mut result = String::new();
    let mut remaining = working.as_str();

    while let Some(start) = remaining.find("{{") {
        result.push_str(&remaining[..start]);

        let after_open = &remaining[start + 2..];
        if let Some(end) = after_open.find("}}") {
            let expr = after_open[..end].trim();
            if let Some(v) = resolve_simple_path(expr, scope) {
                result.push_str(&value_to_string(v));
            }
            remaining = &after_open[end + 2..];
        } else {
            // unclosed: pass through
            result.push_str("{{");
            remaining = after_open;
        }
    }
    result.push_str(remaining);

    result.replace(PLACEHOLDER, "{{")
}
