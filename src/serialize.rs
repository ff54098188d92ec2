//! [`ValidatorDef`] → YAML serialization.

use crate::error::SerializeError;
use crate::types::ValidatorDef;

/// Serialize a definition to a YAML string.
///
/// The definition should typically be normalized before serialization.
/// Fields are emitted in declaration order; unset optional fields are
/// omitted.
pub fn serialize(def: &ValidatorDef) -> Result<String, SerializeError> {
    let value = serde_json::to_value(def).map_err(|e| SerializeError {
        message: format!("failed to convert definition to JSON value: {}", e),
    })?;

    serde_saphyr::to_string(&value).map_err(|e| SerializeError {
        message: format!("failed to serialize to YAML: {}", e),
    })
}
