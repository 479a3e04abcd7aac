//! Per document analysis state.
//!
//! A document owns its chunk, a storage layer, and one scope record per
//! block. Records move `Initialized -> Pending -> Resolved`; `Pending`
//! cuts re-entrant aggregation when a function body resolves a call
//! into itself.

use std::sync::Arc;

use rill_ast::{Chunk, NodeId};
use rill_meta::describe::parse_virtual_type;
use rustc_hash::FxHashMap;

use crate::aggregator::DefinitionAggregator;
use crate::error::TypeError;
use crate::graph::TypeContext;
use crate::infer::{InferMode, InferSession};
use crate::scope::{ScopeRef, SymbolInfo};
use crate::source_map::TypeSource;
use crate::storage::StorageData;
use crate::ty::{CompletionItemKind, TypeData, TypeRef};
use crate::TypeManager;

/// Index of a document in the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DocRef(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeState {
    Initialized,
    Pending,
    Resolved,
}

#[derive(Debug)]
pub struct ScopeRecord {
    pub block: NodeId,
    pub scope: ScopeRef,
    pub state: ScopeState,
}

#[derive(Debug)]
pub struct DocumentData {
    pub name: String,
    pub chunk: Arc<Chunk>,
    pub globals: ScopeRef,
    pub storage: StorageData,
    pub records: Vec<ScopeRecord>,
    pub block_scopes: FxHashMap<NodeId, usize>,
    /// Function type to the record of its body, for lazy resolution on
    /// invocation.
    pub fn_scopes: FxHashMap<TypeRef, usize>,
}

/// What a namespace resolution yields.
#[derive(Clone, Debug)]
pub struct ResolvedNamespace {
    pub ty: TypeRef,
    /// Dotted access path as written, e.g. `config.ports`.
    pub path: String,
    /// Literal rendering when the expression was a plain literal.
    pub label: Option<String>,
    pub kind: CompletionItemKind,
    pub sources: Vec<TypeSource>,
}

impl TypeManager {
    /// Registers and fully analyzes one document.
    pub fn analyze(&mut self, name: &str, chunk: Chunk) -> Result<DocRef, TypeError> {
        let doc = self.aggregate_scopes(name, chunk);
        self.aggregate_definitions(doc)?;
        Ok(doc)
    }

    /// First analysis phase: registers the document and builds its scope
    /// records without aggregating any definitions.
    pub fn aggregate_scopes(&mut self, name: &str, chunk: Chunk) -> DocRef {
        self.register_document(name, Arc::new(chunk))
    }

    /// Second analysis phase: aggregates every pending scope record of a
    /// registered document. Records that already resolved are skipped,
    /// so repeated calls settle into a no-op.
    pub fn aggregate_definitions(&mut self, doc: DocRef) -> Result<(), TypeError> {
        self.aggregate_document(doc)
    }

    pub(crate) fn register_document(&mut self, name: &str, chunk: Arc<Chunk>) -> DocRef {
        let doc = DocRef(self.documents.len() as u32);
        self.documents.push(DocumentData {
            name: name.to_string(),
            chunk: chunk.clone(),
            globals: ScopeRef(0),
            storage: StorageData::new(name),
            records: Vec::new(),
            block_scopes: FxHashMap::default(),
            fn_scopes: FxHashMap::default(),
        });
        self.seed_document(doc);
        let root = self.new_scope(doc, None, None);
        {
            let data = &mut self.documents[doc.0 as usize];
            data.globals = root;
            data.records.push(ScopeRecord {
                block: chunk.root,
                scope: root,
                state: ScopeState::Initialized,
            });
            data.block_scopes.insert(chunk.root, 0);
        }
        for block in chunk.scopes.clone() {
            let outer = chunk
                .node(block)
                .scope
                .and_then(|parent| self.documents[doc.0 as usize].block_scopes.get(&parent).copied())
                .map(|idx| self.documents[doc.0 as usize].records[idx].scope)
                .unwrap_or(root);
            let scope = self.new_scope(doc, Some(outer), Some(root));
            let data = &mut self.documents[doc.0 as usize];
            let idx = data.records.len();
            data.records.push(ScopeRecord {
                block,
                scope,
                state: ScopeState::Initialized,
            });
            data.block_scopes.insert(block, idx);
        }
        doc
    }

    pub(crate) fn aggregate_document(&mut self, doc: DocRef) -> Result<(), TypeError> {
        self.register_virtual_types(doc);
        let count = self.documents[doc.0 as usize].records.len();
        for index in 0..count {
            self.aggregate_record(doc, index)?;
        }
        Ok(())
    }

    pub(crate) fn aggregate_record(&mut self, doc: DocRef, index: usize) -> Result<(), TypeError> {
        {
            let record = &mut self.documents[doc.0 as usize].records[index];
            if record.state != ScopeState::Initialized {
                return Ok(());
            }
            record.state = ScopeState::Pending;
        }
        let (block, scope) = {
            let record = &self.documents[doc.0 as usize].records[index];
            (record.block, record.scope)
        };
        self.bind_parameters(doc, index)?;
        DefinitionAggregator::new(self, doc, scope, block).aggregate()?;
        self.assume_return_type(doc, scope, block);
        self.documents[doc.0 as usize].records[index].state = ScopeState::Resolved;
        Ok(())
    }

    /// Binds declared parameters into a function body scope from the
    /// signature inferred for the function literal.
    fn bind_parameters(&mut self, doc: DocRef, index: usize) -> Result<(), TypeError> {
        let scope = self.documents[doc.0 as usize].records[index].scope;
        let Some(function) = self.scope(scope).associated_function else {
            return Ok(());
        };
        let signature = match &self.graph.node(function).data {
            TypeData::Function(shape) => shape.signature.clone(),
            _ => return Ok(()),
        };
        let ctx = TypeContext::in_doc(doc);
        for argument in &signature.arguments {
            let ty = self.type_from_metas(&ctx, &argument.types);
            self.scope_set(scope, &argument.label, ty);
        }
        Ok(())
    }

    /// When the signature still declares the unknown placeholder return,
    /// derive it from the body's return statements.
    fn assume_return_type(&mut self, doc: DocRef, scope: ScopeRef, block: NodeId) {
        let Some(function) = self.scope(scope).associated_function else {
            return;
        };
        let returns_unknown = match &self.graph.node(function).data {
            TypeData::Function(shape) => {
                shape.signature.returns_unknown() && shape.return_type.is_none()
            }
            _ => false,
        };
        if !returns_unknown {
            return;
        }
        let chunk = self.documents[doc.0 as usize].chunk.clone();
        let returns = chunk.returns_of(block).to_vec();
        let ctx = TypeContext::in_doc(doc);
        let mut variants = Vec::new();
        for ret in returns {
            let argument = match &chunk.node(ret).kind {
                rill_ast::NodeKind::Return { argument } => *argument,
                _ => None,
            };
            let ty = match argument {
                Some(argument) => {
                    let mut session =
                        InferSession::new(self, doc, scope, InferMode::Full, chunk.clone());
                    session.infer(argument)
                }
                None => None,
            };
            variants.push(ty.unwrap_or_else(|| self.nil_type(&ctx)));
        }
        let resolved = match variants.len() {
            0 => self.nil_type(&ctx),
            1 => variants[0],
            _ => self.union_type(&ctx, variants),
        };
        let metas = self.to_meta(resolved);
        if let TypeData::Function(shape) = &mut self.graph.node_mut(function).data {
            shape.return_type = Some(resolved);
            shape.signature.returns = metas;
        }
    }

    /// Declares types described by root level `@vtype` comment blocks.
    fn register_virtual_types(&mut self, doc: DocRef) {
        let chunk = self.documents[doc.0 as usize].chunk.clone();
        let mut blocks: Vec<String> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut last_line: Option<u32> = None;
        let mut comments: Vec<NodeId> = chunk
            .comments
            .iter()
            .copied()
            .filter(|c| chunk.node(*c).scope == Some(chunk.root))
            .collect();
        comments.sort_by_key(|c| chunk.node(*c).span.start);
        for comment in comments {
            let node = chunk.node(comment);
            let text = match &node.kind {
                rill_ast::NodeKind::Comment(text) => text.as_str(),
                _ => continue,
            };
            let line = node.span.start.line;
            if let Some(last) = last_line {
                if line > last + 1 && !current.is_empty() {
                    blocks.push(current.join("\n"));
                    current.clear();
                }
            }
            current.push(text);
            last_line = Some(line);
        }
        if !current.is_empty() {
            blocks.push(current.join("\n"));
        }
        let ctx = TypeContext::in_doc(doc);
        for block in blocks {
            let Some(desc) = parse_virtual_type(&block) else {
                continue;
            };
            let inherit = desc.extends.as_deref().unwrap_or("map");
            let fresh = self.class_type(&ctx, &desc.ty, Some(inherit));
            let class = self.register_interface(Some(doc), &desc.ty, fresh);
            let key = self.key_type(&ctx, &desc.ty, true);
            self.register_key_type(Some(doc), &desc.ty, key);
            for member in &desc.members {
                self.insert_definition(class, &member.name, &member.def);
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn document_by_name(&self, name: &str) -> Option<DocRef> {
        self.documents
            .iter()
            .enumerate()
            .rev()
            .find(|(_, d)| d.name == name)
            .map(|(i, _)| DocRef(i as u32))
    }

    pub fn document_name(&self, doc: DocRef) -> &str {
        &self.documents[doc.0 as usize].name
    }

    pub(crate) fn scope_of_node(&self, doc: DocRef, node: NodeId) -> ScopeRef {
        let data = &self.documents[doc.0 as usize];
        data.chunk
            .node(node)
            .scope
            .and_then(|block| data.block_scopes.get(&block).copied())
            .map(|idx| data.records[idx].scope)
            .unwrap_or(data.globals)
    }

    /// Resolves what an expression node denotes, with path, provenance
    /// and a completion kind. `no_invoke` keeps function references
    /// uncalled the way a `@` prefix would.
    pub fn resolve_namespace(
        &mut self,
        doc: DocRef,
        node: NodeId,
        no_invoke: bool,
    ) -> Option<ResolvedNamespace> {
        let chunk = self.documents[doc.0 as usize].chunk.clone();
        let scope = self.scope_of_node(doc, node);
        let mut session = InferSession::new(self, doc, scope, InferMode::Full, chunk);
        if no_invoke {
            session.suppress_next_invoke();
        }
        let ty = session.infer(node)?;
        let (path, label, kind) = session.resolution();
        let sources = self.graph.node(ty).source_map.all();
        Some(ResolvedNamespace {
            ty,
            path,
            label,
            kind,
            sources,
        })
    }

    /// Resolves a dotted path such as `config.ports` against the global
    /// scope of a document.
    pub fn resolve_path(&mut self, doc: DocRef, path: &str) -> Option<TypeRef> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let globals = self.documents[doc.0 as usize].globals;
        let mut current = self.scope_resolve(globals, first)?.ty;
        for segment in segments {
            current = self
                .get_property(current, &crate::ty::PropertyKey::name(segment))?
                .ty;
        }
        Some(current)
    }

    /// All recorded definitions whose target path contains `query`.
    pub fn resolve_all_assignments(&self, doc: DocRef, query: &str) -> Vec<SymbolInfo> {
        let mut matches = Vec::new();
        for record in &self.documents[doc.0 as usize].records {
            for symbol in &self.scope(record.scope).symbols {
                if symbol.path.contains(query) {
                    matches.push(symbol.clone());
                }
            }
        }
        matches
    }

    /// Definitions visible from the scope of `node` that share its
    /// identifier name.
    pub fn resolve_available_assignments(&self, doc: DocRef, node: NodeId) -> Vec<SymbolInfo> {
        let data = &self.documents[doc.0 as usize];
        let Some(name) = data.chunk.identifier_name(node).map(str::to_string) else {
            return Vec::new();
        };
        let mut matches: Vec<SymbolInfo> = Vec::new();
        let mut current = Some(self.scope_of_node(doc, node));
        while let Some(scope) = current {
            for symbol in &self.scope(scope).symbols {
                if symbol.path == name && !matches.iter().any(|m| m.span == symbol.span) {
                    matches.push(symbol.clone());
                }
            }
            current = self.scope(scope).outer;
        }
        matches
    }

    /// Completion names available at `node`.
    pub fn complete_at(&mut self, doc: DocRef, node: NodeId) -> Vec<String> {
        let scope = self.scope_of_node(doc, node);
        self.scope_all_names(scope)
    }

    /// Lazily aggregates the body of an invoked function, when it lives
    /// in this document.
    pub(crate) fn resolve_function_scope(
        &mut self,
        doc: DocRef,
        function: TypeRef,
    ) -> Result<(), TypeError> {
        let Some(index) = self.documents[doc.0 as usize]
            .fn_scopes
            .get(&function)
            .copied()
        else {
            return Ok(());
        };
        self.aggregate_record(doc, index)
    }
}
