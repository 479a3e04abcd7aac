//! Shared primitives for the Rill analyzer.
//!
//! Rill source positions are tracked as (line, character) pairs rather than
//! byte offsets: the analyzer consumes an already-parsed AST and reports
//! provenance back to editor tooling, which speaks line/character natively.

pub mod span;

pub use span::{Position, Span};
