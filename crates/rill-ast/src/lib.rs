//! Pre-parsed script AST as the analyzer consumes it.
//!
//! Parsing itself lives upstream. This crate holds the arena of nodes a
//! parser hands over for one document (`Chunk`), plus the navigation
//! helpers the analyzer needs: per-line item lookup, enclosing-block
//! tracking and assignment target classification.

pub mod ast;
pub mod builder;
pub mod walker;

pub use ast::{Ast, BinaryOp, Chunk, MapField, Node, NodeId, NodeKind, UnaryOp};
pub use builder::AstBuilder;
pub use walker::AssignTarget;
