//! Statement aggregation.
//!
//! Walks the definitions of one block and turns assignments, generic
//! for loops and imports into scope bindings. Bindings are monotonic:
//! conflicting evidence widens into unions through the property merge
//! policy instead of overwriting.

use std::sync::Arc;

use rill_ast::{AssignTarget, Chunk, NodeId, NodeKind};
use rill_meta::describe::{parse_assign_description, parse_map_description, MapDescription};
use rill_meta::BaseType;

use crate::document::DocRef;
use crate::error::TypeError;
use crate::graph::TypeContext;
use crate::infer::{InferMode, InferSession};
use crate::scope::{ScopeRef, SymbolInfo};
use crate::ty::{CompletionItemKind, EntityInfo, PropertyKey, TypeData, TypeKind, TypeRef};
use crate::TypeManager;

pub(crate) struct DefinitionAggregator<'a> {
    mgr: &'a mut TypeManager,
    doc: DocRef,
    scope: ScopeRef,
    block: NodeId,
    chunk: Arc<Chunk>,
}

impl<'a> DefinitionAggregator<'a> {
    pub fn new(mgr: &'a mut TypeManager, doc: DocRef, scope: ScopeRef, block: NodeId) -> Self {
        let chunk = mgr.documents[doc.0 as usize].chunk.clone();
        DefinitionAggregator {
            mgr,
            doc,
            scope,
            block,
            chunk,
        }
    }

    pub fn aggregate(mut self) -> Result<(), TypeError> {
        for stmt in self.chunk.definitions_of(self.block).to_vec() {
            match self.chunk.node(stmt).kind.clone() {
                NodeKind::Assignment { target, init } => {
                    self.handle_assignment(stmt, target, init)?;
                }
                NodeKind::ForGeneric { variable, iterator } => {
                    self.handle_for_generic(stmt, variable, iterator)?;
                }
                NodeKind::Import { name, .. } => self.handle_import(stmt, name),
                _ => {}
            }
        }
        Ok(())
    }

    fn ctx_at(&self, node: NodeId) -> TypeContext {
        TypeContext::at(
            self.doc,
            self.chunk.ast.kind_label(node),
            self.chunk.node(node).span,
        )
    }

    fn push_symbol(&mut self, name: String, path: String, kind: CompletionItemKind, stmt: NodeId) {
        let span = self.chunk.node(stmt).span;
        let source = self.mgr.document_name(self.doc).to_string();
        self.mgr.scope_mut(self.scope).symbols.push(SymbolInfo {
            name,
            path,
            kind,
            source,
            span,
        });
    }

    /// Completion kind of an assigned value: functions and constructors
    /// surface as such, everything else as the target's own kind.
    fn symbol_kind(&self, ty: TypeRef, target: CompletionItemKind) -> CompletionItemKind {
        match self.mgr.kind_of(ty) {
            TypeKind::Function => CompletionItemKind::Function,
            TypeKind::Map => CompletionItemKind::MapConstructor,
            TypeKind::List => CompletionItemKind::ListConstructor,
            _ => target,
        }
    }

    fn infer_full(&mut self, node: NodeId) -> Result<Option<TypeRef>, TypeError> {
        let mut session = InferSession::new(
            self.mgr,
            self.doc,
            self.scope,
            InferMode::Full,
            self.chunk.clone(),
        );
        let ty = session.infer(node);
        match session.take_error() {
            Some(err) => Err(err),
            None => Ok(ty),
        }
    }

    /// Light inference of a base expression, returning the type and the
    /// path it resolved along.
    fn infer_origin(&mut self, node: NodeId) -> (Option<TypeRef>, String) {
        let mut session = InferSession::new(
            self.mgr,
            self.doc,
            self.scope,
            InferMode::Light,
            self.chunk.clone(),
        );
        let ty = session.infer(node);
        let (path, _, _) = session.resolution();
        (ty, path)
    }

    // ── Assignments ─────────────────────────────────────────────────────

    fn handle_assignment(
        &mut self,
        stmt: NodeId,
        target: NodeId,
        init: NodeId,
    ) -> Result<(), TypeError> {
        let comment = self
            .chunk
            .comment_block_above(self.chunk.node(stmt).span.start.line);
        let override_metas = comment.as_deref().and_then(parse_assign_description);

        let ctx = self.ctx_at(init);
        let ty = match override_metas {
            Some(metas) => self.mgr.type_from_metas(&ctx, &metas),
            None => {
                let inferred = self.infer_full(init)?;
                match inferred {
                    Some(inferred) if self.mgr.kind_of(inferred) == TypeKind::Function => {
                        // Function nodes stay shared: their scope record
                        // and later return assumption live on this node.
                        inferred
                    }
                    Some(inferred) => self.mgr.copy_type(inferred, &ctx, false, false),
                    None => self.mgr.unknown_type(&ctx),
                }
            }
        };

        if let Some(desc) = comment.as_deref().and_then(parse_map_description) {
            if matches!(self.chunk.node(init).kind, NodeKind::MapConstructor { .. }) {
                self.declare_interface_from_map(&desc, ty);
            }
        }

        match self.chunk.assignment_target(target) {
            AssignTarget::Variable { name } => {
                let kind = self.symbol_kind(ty, CompletionItemKind::Variable);
                self.push_symbol(name.clone(), name.clone(), kind, stmt);
                self.mgr.scope_set(self.scope, &name, ty);
            }
            AssignTarget::Property { base, name } => {
                let origin = self.resolve_origin(stmt, base)?;
                if let TypeData::Function(shape) = &mut self.mgr.graph.node_mut(ty).data {
                    if shape.context.is_none() {
                        shape.context = Some(origin.ty);
                    }
                }
                let path = if origin.path.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", origin.path, name)
                };
                let kind = self.symbol_kind(ty, CompletionItemKind::Property);
                self.push_symbol(name.clone(), path, kind, stmt);
                self.mgr.set_property(
                    origin.ty,
                    PropertyKey::name(name.as_str()),
                    EntityInfo::new(name.as_str(), ty),
                );
            }
            AssignTarget::Index { base, index } => {
                let origin = self.resolve_origin(stmt, base)?;
                let (index_ty, _) = self.infer_origin(index);
                let Some(index_ty) = index_ty else {
                    return Ok(());
                };
                let path = format!("{}[]", origin.path);
                let kind = self.symbol_kind(ty, CompletionItemKind::Property);
                self.push_symbol(path.clone(), path, kind, stmt);
                for key_id in self.key_ids(index_ty) {
                    let key = PropertyKey::Key(key_id);
                    self.mgr
                        .set_property(origin.ty, key.clone(), EntityInfo::new(key.to_string(), ty));
                }
            }
            AssignTarget::Unsupported => {}
        }
        Ok(())
    }

    fn key_ids(&self, ty: TypeRef) -> Vec<String> {
        match &self.mgr.graph.node(ty).data {
            TypeData::Union { variants } => {
                let mut ids: Vec<String> = Vec::new();
                for variant in variants {
                    let id = self.mgr.key_id_of(*variant);
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ids
            }
            _ => vec![self.mgr.key_id_of(ty)],
        }
    }

    /// Base of a property or index target. A base that cannot carry
    /// properties is widened into a union with a fresh map first, so
    /// `s = "x"` followed by `s.port = 80` converges instead of failing.
    fn resolve_origin(&mut self, stmt: NodeId, base: NodeId) -> Result<ResolvedOrigin, TypeError> {
        let (origin, path) = self.infer_origin(base);
        let Some(origin) = origin else {
            return Err(TypeError::NullAssignmentOrigin {
                span: self.chunk.node(stmt).span,
            });
        };
        if self.mgr.supports_properties(origin) {
            return Ok(ResolvedOrigin { ty: origin, path });
        }
        let widened = self.widen_binding(base, origin);
        Ok(ResolvedOrigin { ty: widened, path })
    }

    fn widen_binding(&mut self, node: NodeId, current: TypeRef) -> TypeRef {
        let ctx = self.ctx_at(node);
        let fresh = self.mgr.map_type(&ctx);
        let widened = self.mgr.widen(Some(self.doc), current, fresh);
        match self.chunk.assignment_target(node) {
            AssignTarget::Variable { name } => {
                let locals = self.mgr.scope(self.scope).locals;
                if let TypeData::Map(shape) = self.mgr.graph.node(locals).data.clone() {
                    shape
                        .properties
                        .borrow_mut()
                        .insert(PropertyKey::name(name.as_str()), EntityInfo::new(name, widened));
                }
            }
            AssignTarget::Property { base, name } => {
                let (origin, _) = self.infer_origin(base);
                if let Some(origin) = origin {
                    self.mgr.set_property(
                        origin,
                        PropertyKey::name(name.as_str()),
                        EntityInfo::new(name, widened),
                    );
                }
            }
            AssignTarget::Index { base, index } => {
                let (origin, _) = self.infer_origin(base);
                let (index_ty, _) = self.infer_origin(index);
                if let (Some(origin), Some(index_ty)) = (origin, index_ty) {
                    for key_id in self.key_ids(index_ty) {
                        let key = PropertyKey::Key(key_id);
                        self.mgr.set_property(
                            origin,
                            key.clone(),
                            EntityInfo::new(key.to_string(), widened),
                        );
                    }
                }
            }
            AssignTarget::Unsupported => {}
        }
        widened
    }

    /// `@type` comment blocks above a map literal register the literal
    /// as a named interface.
    fn declare_interface_from_map(&mut self, desc: &MapDescription, map: TypeRef) {
        let ctx = TypeContext::in_doc(self.doc);
        for property in &desc.properties {
            let ty = self.mgr.type_from_metas(&ctx, &property.types);
            let segments: Vec<&str> = property.path.split('.').collect();
            let name = segments.last().copied().unwrap_or(property.path.as_str());
            self.mgr
                .set_property_in_path(map, &segments, EntityInfo::new(name, ty));
        }
        let inherit = desc.extends.as_deref().unwrap_or(BaseType::Map.id());
        let class = self.mgr.class_type(&ctx, &desc.ty, Some(inherit));
        if let TypeData::Class(shape) = &mut self.mgr.graph.node_mut(class).data {
            shape.associated_map = Some(map);
        }
        self.mgr.register_interface(Some(self.doc), &desc.ty, class);
        let key = self.mgr.key_type(&ctx, &desc.ty, true);
        self.mgr.register_key_type(Some(self.doc), &desc.ty, key);
    }

    // ── Loops and imports ───────────────────────────────────────────────

    fn handle_for_generic(
        &mut self,
        stmt: NodeId,
        variable: NodeId,
        iterator: NodeId,
    ) -> Result<(), TypeError> {
        let Some(name) = self.chunk.identifier_name(variable).map(str::to_string) else {
            return Ok(());
        };
        let iterated = self.infer_full(iterator)?;
        let ctx = self.ctx_at(stmt);
        let item = match iterated {
            Some(iterated) => self.iterator_item_type(iterated, &ctx),
            None => self.mgr.unknown_type(&ctx),
        };
        self.push_symbol(name.clone(), name.clone(), CompletionItemKind::Variable, stmt);
        self.mgr.scope_set(self.scope, &name, item);
        let idx = self.mgr.base_type(&ctx, BaseType::Number.id());
        self.mgr.scope_set(self.scope, &format!("__{name}_idx"), idx);
        Ok(())
    }

    /// Item type produced by iterating a value: list elements, string
    /// characters, or `{key, value}` pairs for maps.
    fn iterator_item_type(&mut self, iterated: TypeRef, ctx: &TypeContext) -> TypeRef {
        match self.mgr.graph.node(iterated).data.clone() {
            TypeData::List(shape) => self.mgr.copy_type(shape.element_type, ctx, true, true),
            TypeData::Map(shape) => {
                let pair = self.mgr.map_type(ctx);
                let key = self.mgr.copy_type(shape.key_type, ctx, true, true);
                let value = self.mgr.copy_type(shape.value_type, ctx, true, true);
                self.mgr
                    .set_property(pair, PropertyKey::name("key"), EntityInfo::new("key", key));
                self.mgr.set_property(
                    pair,
                    PropertyKey::name("value"),
                    EntityInfo::new("value", value),
                );
                pair
            }
            TypeData::Union { variants } => {
                let items: Vec<TypeRef> = variants
                    .into_iter()
                    .map(|v| self.iterator_item_type(v, ctx))
                    .collect();
                self.mgr.union_type(ctx, items)
            }
            TypeData::Base if self.mgr.id_of(iterated) == BaseType::String.id() => {
                self.mgr.base_type(ctx, BaseType::String.id())
            }
            TypeData::Base if self.mgr.id_of(iterated) == rill_meta::NIL_TYPE_ID => {
                self.mgr.nil_type(ctx)
            }
            _ => self.mgr.unknown_type(ctx),
        }
    }

    /// Imports bind as unknown; resolving the other document's exports
    /// happens at merge time, not here.
    fn handle_import(&mut self, stmt: NodeId, name: NodeId) {
        let Some(name) = self.chunk.identifier_name(name).map(str::to_string) else {
            return;
        };
        let ctx = self.ctx_at(stmt);
        let unknown = self.mgr.unknown_type(&ctx);
        self.push_symbol(name.clone(), name.clone(), CompletionItemKind::Variable, stmt);
        self.mgr.scope_set(self.scope, &name, unknown);
    }
}

struct ResolvedOrigin {
    ty: TypeRef,
    path: String,
}
