//! Analyzer errors.
//!
//! Only contract violations surface as errors. Missing properties,
//! unresolvable expressions and exceeded depth guards degrade to
//! unknown types or truncated output instead.

use rill_common::Span;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypeError {
    /// A property or index assignment whose base expression resolved to
    /// nothing at all.
    #[error("assignment at {span} has no resolvable origin")]
    NullAssignmentOrigin { span: Span },

    /// The native catalogue lacks a base type every storage must carry.
    #[error("native catalogue is missing the `{type_id}` base type")]
    MissingNativeType { type_id: &'static str },

    /// A merge named a document that was never analyzed.
    #[error("document `{name}` is not registered with this manager")]
    UnknownDocument { name: String },
}
