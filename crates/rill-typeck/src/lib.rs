//! Flow sensitive type inference for Rill scripts.
//!
//! The [`TypeManager`] owns everything: the type graph, the scope
//! arena, one storage layer per analyzed document and the native
//! catalogue. Feed it pre-parsed chunks via [`TypeManager::analyze`],
//! then query resolved namespaces, completions and meta descriptions:
//!
//! ```
//! use rill_ast::AstBuilder;
//! use rill_typeck::TypeManager;
//!
//! let mut b = AstBuilder::new();
//! let value = b.string("127.0.0.1");
//! let target = b.ident("host");
//! b.assign(target, value);
//!
//! let mut manager = TypeManager::default();
//! let doc = manager.analyze("main", b.build()).unwrap();
//! let host = manager.resolve_path(doc, "host").unwrap();
//! assert_eq!(manager.describe(host), "string");
//! ```

mod aggregator;
pub mod builtins;
pub mod document;
pub mod error;
pub mod graph;
pub mod infer;
pub mod merge;
pub mod scope;
pub mod source_map;
pub mod storage;
pub mod ty;

use rill_meta::Container;

use crate::document::DocumentData;
use crate::graph::TypeGraph;
use crate::scope::ScopeData;
use crate::storage::StorageData;

pub use crate::document::{DocRef, ResolvedNamespace};
pub use crate::error::TypeError;
pub use crate::infer::InferMode;
pub use crate::merge::{MergeItem, NamespaceMapping};
pub use crate::scope::{ScopeRef, SymbolInfo};
pub use crate::source_map::TypeSource;
pub use crate::ty::{CompletionItemKind, EntityInfo, PropertyKey, TypeKind, TypeRef};

/// Owner of all analysis state for one session.
#[derive(Debug)]
pub struct TypeManager {
    pub(crate) graph: TypeGraph,
    pub(crate) scopes: Vec<ScopeData>,
    pub(crate) documents: Vec<DocumentData>,
    pub(crate) global: StorageData,
    pub(crate) container: Container,
}

impl TypeManager {
    /// Builds a manager over a native catalogue. Fails when the
    /// catalogue misses a base type.
    pub fn new(container: Container) -> Result<Self, TypeError> {
        let mut manager = TypeManager {
            graph: TypeGraph::default(),
            scopes: Vec::new(),
            documents: Vec::new(),
            global: StorageData::new("global"),
            container,
        };
        manager.seed_global()?;
        Ok(manager)
    }
}

impl Default for TypeManager {
    fn default() -> Self {
        match TypeManager::new(builtins::default_container()) {
            Ok(manager) => manager,
            Err(_) => unreachable!("default catalogue covers every base type"),
        }
    }
}
