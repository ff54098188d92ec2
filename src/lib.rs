//! A hierarchical rule engine for validating nested records.
//!
//! Rules are named boolean expressions bound to structural levels of a record
//! (`order`, `order.lines`, `order.lines.items`). A compiled validator becomes
//! a tree of processors that walks the record, evaluates the conditions and
//! rules of each level, and returns a structured failure for every rule that
//! did not hold, with the offending property paths attached.
//!
//! ```text
//! parse(yaml) → ValidatorDef → verify(def) → VerifyResult
//!                            → normalize(def) → build_processor_tree(def) → ProcessorTree
//!                            → serialize(def) → yaml
//! validate(record, tree, ctx) → Vec<RecordFailure>
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! # #[cfg(feature = "cel-eval")] {
//! use std::sync::Arc;
//! use rulecheck::{CelEngine, JsonRecord, RunContext};
//!
//! let yaml = r#"
//! id: orders
//! rules:
//!   - id: positive-amount
//!     path: order
//!     expression: amount > 0
//!     message: "Order {{id}} must have a positive amount"
//!   - id: line-quantity
//!     path: order.lines
//!     expression: qty >= 1
//! "#;
//!
//! let loaded = rulecheck::load(yaml, Arc::new(CelEngine)).expect("valid definition");
//! let mut record = JsonRecord::new(
//!     "order",
//!     serde_json::json!({"id": "A-1", "amount": 0, "lines": [{"qty": 2}, {"qty": 0}]}),
//! );
//! let failures = rulecheck::validate(&mut record, &loaded.tree, &mut RunContext::new()).unwrap();
//!
//! assert_eq!(failures.len(), 2);
//! assert_eq!(failures[0].message, "Order A-1 must have a positive amount");
//! assert_eq!(failures[1].path, "order.lines[1]");
//! # }
//! ```
//!
//! # Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `cel-eval` | yes     | CEL expressions via the [`cel`] crate. Enables [`CelEngine`]. |

pub mod analysis;
pub mod cache;
pub mod compiled;
pub mod context;
pub mod enums;
pub mod error;
pub mod expression;
pub mod failure;
pub mod native;
pub mod normalize;
pub mod parse;
pub mod primitives;
pub mod processor;
pub mod record;
pub mod serialize;
pub mod template;
pub mod types;
pub mod validator;
pub mod verify;

pub use context::{ForcedRule, RunContext, RunStats};
pub use enums::*;
pub use error::*;
#[cfg(feature = "cel-eval")]
pub use expression::CelEngine;
pub use expression::{CompiledUnit, ExpressionEngine, Scope};
pub use failure::RecordFailure;
pub use native::{NativeRegistry, NativeRule};
pub use record::{ForcedEntity, JsonRecord, RecordNode};
pub use template::{MessageTemplater, PropertyTemplater};
pub use types::*;
pub use validator::{ProcessorTree, Validator};

// Re-export entry-point functions at the crate root for convenience.
pub use normalize::normalize;
pub use parse::parse;
pub use serialize::serialize;
pub use validator::{build_processor_tree, validate};
pub use verify::verify;

use std::sync::Arc;

/// Result of the [`load`] convenience entry point.
pub struct LoadResult {
    /// The normalized definition the tree was built from.
    pub definition: ValidatorDef,
    /// The processor tree, ready for [`validate`].
    pub tree: ProcessorTree,
    /// Non-fatal warnings produced during verification.
    pub warnings: Vec<Diagnostic>,
}

/// Convenience entry point composing parse → verify → normalize → build.
///
/// # Errors
///
/// Returns [`LoadError::Verify`] with every verification error when the
/// definition is structurally invalid, otherwise the first parse or
/// construction error.
pub fn load(input: &str, engine: Arc<dyn ExpressionEngine>) -> Result<LoadResult, LoadError> {
    let def = parse::parse(input)?;

    let verified = verify::verify(&def);
    if !verified.is_valid() {
        return Err(LoadError::Verify(verified.errors));
    }

    let definition = normalize::normalize(def);
    let tree = validator::build_processor_tree(&definition, engine, None)?;

    Ok(LoadResult {
        definition,
        tree,
        warnings: verified.warnings,
    })
}
