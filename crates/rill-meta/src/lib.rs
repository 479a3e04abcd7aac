//! Serializable type metadata and the native signature catalogue.
//!
//! [`TypeMeta`] is the exchange format between the analyzer and its
//! consumers: compact, structural and printable as `map<string,number>`
//! style labels. [`Container`] carries the signatures of native members
//! grouped per base type, the way a runtime description file lays them
//! out.

pub mod describe;
pub mod meta;
pub mod signature;

pub use meta::{BaseType, TypeMeta, NIL_TYPE_ID, UNKNOWN_TYPE_ID};
pub use signature::{Container, FnArg, FunctionSignature, Signature, SignatureDef};
