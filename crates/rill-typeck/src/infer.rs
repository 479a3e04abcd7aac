//! Expression inference.
//!
//! One engine serves two modes. `Light` answers structural questions
//! cheaply, reasoning over key ids only. `Full` resolves values: it
//! merges map literals, folds list elements, derives function
//! signatures and follows returns. Both modes vivify missing members
//! as unknown types so later evidence has a place to land.

use std::sync::Arc;

use rill_ast::{BinaryOp, Chunk, NodeId, NodeKind, UnaryOp};
use rill_meta::{BaseType, FnArg, FunctionSignature};

use crate::document::DocRef;
use crate::error::TypeError;
use crate::graph::TypeContext;
use crate::scope::ScopeRef;
use crate::ty::{
    CompletionItemKind, EntityInfo, MapShape, PropertyKey, TypeData, TypeKind, TypeRef,
    ISA_PROPERTY,
};
use crate::TypeManager;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InferMode {
    Light,
    Full,
}

pub(crate) struct InferSession<'a> {
    mgr: &'a mut TypeManager,
    doc: DocRef,
    scope: ScopeRef,
    mode: InferMode,
    chunk: Arc<Chunk>,
    /// One-shot latch set by the `@` operator: the next resolution
    /// point hands out the binding without invoking it.
    skip_next_invoke: bool,
    path: String,
    label: Option<String>,
    kind: CompletionItemKind,
    error: Option<TypeError>,
}

impl<'a> InferSession<'a> {
    pub fn new(
        mgr: &'a mut TypeManager,
        doc: DocRef,
        scope: ScopeRef,
        mode: InferMode,
        chunk: Arc<Chunk>,
    ) -> Self {
        InferSession {
            mgr,
            doc,
            scope,
            mode,
            chunk,
            skip_next_invoke: false,
            path: String::new(),
            label: None,
            kind: CompletionItemKind::Expression,
            error: None,
        }
    }

    pub fn suppress_next_invoke(&mut self) {
        self.skip_next_invoke = true;
    }

    /// Path, literal label and completion kind accumulated while the
    /// last expression resolved.
    pub fn resolution(self) -> (String, Option<String>, CompletionItemKind) {
        (self.path, self.label, self.kind)
    }

    pub fn take_error(&mut self) -> Option<TypeError> {
        self.error.take()
    }

    fn ctx(&self, node: NodeId) -> TypeContext {
        TypeContext::at(
            self.doc,
            self.chunk.ast.kind_label(node),
            self.chunk.node(node).span,
        )
    }

    fn push_path(&mut self, segment: &str) {
        if self.path.is_empty() {
            self.path.push_str(segment);
        } else {
            self.path.push('.');
            self.path.push_str(segment);
        }
    }

    /// Infers a subexpression without letting it disturb the resolution
    /// path of the enclosing expression.
    fn infer_detached(&mut self, node: NodeId) -> Option<TypeRef> {
        let path = std::mem::take(&mut self.path);
        let label = self.label.take();
        let result = self.infer(node);
        self.path = path;
        self.label = label;
        result
    }

    pub fn infer(&mut self, node: NodeId) -> Option<TypeRef> {
        let kind = self.chunk.node(node).kind.clone();
        match kind {
            NodeKind::Identifier(name) => self.infer_identifier(node, &name),
            NodeKind::StringLiteral(value) => {
                self.label = Some(format!("\"{value}\""));
                self.kind = CompletionItemKind::Literal;
                Some(self.mgr.base_type(&self.ctx(node), BaseType::String.id()))
            }
            NodeKind::NumberLiteral(value) => {
                self.label = Some(format_number(value));
                self.kind = CompletionItemKind::Literal;
                Some(self.mgr.base_type(&self.ctx(node), BaseType::Number.id()))
            }
            NodeKind::BooleanLiteral(value) => {
                self.label = Some(if value { "true" } else { "false" }.to_string());
                self.kind = CompletionItemKind::Literal;
                Some(self.mgr.base_type(&self.ctx(node), BaseType::Number.id()))
            }
            NodeKind::NilLiteral => {
                self.label = Some("null".to_string());
                self.kind = CompletionItemKind::Literal;
                Some(self.mgr.nil_type(&self.ctx(node)))
            }
            NodeKind::InvalidCode | NodeKind::Comment(_) => None,
            NodeKind::Paren { expression } => self.infer(expression),
            NodeKind::Unary { op, argument } => self.infer_unary(node, op, argument),
            NodeKind::Binary { op, left, right } => self.infer_binary(node, op, left, right),
            NodeKind::Logical { left, right } => {
                self.infer_detached(left);
                self.infer_detached(right);
                self.kind = CompletionItemKind::Expression;
                Some(self.mgr.base_type(&self.ctx(node), BaseType::Number.id()))
            }
            NodeKind::Isa { left, right } => {
                self.infer_detached(left);
                self.infer_detached(right);
                self.kind = CompletionItemKind::Expression;
                Some(self.mgr.base_type(&self.ctx(node), BaseType::Number.id()))
            }
            NodeKind::ComparisonGroup { operands } => {
                for operand in operands {
                    self.infer_detached(operand);
                }
                self.kind = CompletionItemKind::Expression;
                Some(self.mgr.base_type(&self.ctx(node), BaseType::Number.id()))
            }
            NodeKind::Member { base, identifier } => self.infer_member(node, base, identifier),
            NodeKind::Index { base, index } => self.infer_index(node, base, index),
            NodeKind::Slice { base, .. } => self.infer(base),
            NodeKind::Call { base, arguments } => self.infer_call(node, base, arguments),
            NodeKind::MapConstructor { fields } => self.infer_map(node, &fields),
            NodeKind::ListConstructor { fields } => self.infer_list(node, &fields),
            NodeKind::Function { parameters, .. } => self.infer_function(node, &parameters),
            NodeKind::Chunk { .. }
            | NodeKind::Assignment { .. }
            | NodeKind::ForGeneric { .. }
            | NodeKind::Import { .. }
            | NodeKind::Return { .. } => None,
        }
    }

    // ── Identifiers ─────────────────────────────────────────────────────

    fn infer_identifier(&mut self, node: NodeId, name: &str) -> Option<TypeRef> {
        self.push_path(name);
        if is_constant_identifier(name) && !self.mgr.scope_has_own(self.scope, name) {
            self.kind = CompletionItemKind::Constant;
            return self.infer_constant(node, name);
        }
        match self.mgr.scope_resolve(self.scope, name) {
            Some(found) => {
                let resolved_kind = self.mgr.kind_of(found.ty);
                self.kind = match resolved_kind {
                    TypeKind::Function => CompletionItemKind::Function,
                    _ => CompletionItemKind::Variable,
                };
                if self.skip_next_invoke {
                    self.skip_next_invoke = false;
                    Some(found.ty)
                } else {
                    Some(self.resolve_value(found.ty, node))
                }
            }
            None => {
                // No evidence yet. Install a fresh unknown so later
                // sightings converge on the same node.
                let unknown = self.mgr.unknown_type(&self.ctx(node));
                self.mgr.scope_set(self.scope, name, unknown);
                self.kind = CompletionItemKind::Variable;
                Some(unknown)
            }
        }
    }

    fn infer_constant(&mut self, node: NodeId, name: &str) -> Option<TypeRef> {
        let ctx = self.ctx(node);
        match name {
            "globals" => Some(self.mgr.scope(self.mgr.scope(self.scope).globals).locals),
            "locals" => Some(self.mgr.scope(self.scope).locals),
            "outer" => {
                let data = self.mgr.scope(self.scope);
                let outer = data.outer.unwrap_or(data.globals);
                Some(self.mgr.scope(outer).locals)
            }
            "self" => {
                let context = self.function_context();
                context.or_else(|| Some(self.mgr.nil_type(&ctx)))
            }
            "super" => {
                let parent = self.function_context().and_then(|context| {
                    self.mgr
                        .get_property(context, &PropertyKey::name(ISA_PROPERTY))
                        .map(|info| info.ty)
                });
                parent.or_else(|| Some(self.mgr.nil_type(&ctx)))
            }
            _ => None,
        }
    }

    fn function_context(&mut self) -> Option<TypeRef> {
        let function = self.mgr.scope(self.scope).associated_function?;
        match &self.mgr.graph.node(function).data {
            TypeData::Function(shape) => shape.context,
            _ => None,
        }
    }

    /// Implicit invocation at a resolution point: script functions run
    /// when referenced without `@`.
    fn resolve_value(&mut self, ty: TypeRef, node: NodeId) -> TypeRef {
        if self.mgr.kind_of(ty) != TypeKind::Function {
            return ty;
        }
        let fdoc = self.mgr.graph.node(ty).doc.unwrap_or(self.doc);
        if let Err(err) = self.mgr.resolve_function_scope(fdoc, ty) {
            self.error = Some(err);
        }
        self.mgr.invoke(ty, &self.ctx(node))
    }

    // ── Access chains ───────────────────────────────────────────────────

    fn infer_member(&mut self, node: NodeId, base: NodeId, identifier: NodeId) -> Option<TypeRef> {
        let latch = std::mem::replace(&mut self.skip_next_invoke, false);
        let base_ty = self.infer(base)?;
        self.skip_next_invoke = latch;
        let name = self.chunk.identifier_name(identifier)?.to_string();
        self.push_path(&name);
        self.label = None;
        match self.mgr.get_property(base_ty, &PropertyKey::name(&name)) {
            Some(found) => {
                self.kind = match self.mgr.kind_of(found.ty) {
                    TypeKind::Function => CompletionItemKind::Function,
                    _ => CompletionItemKind::Property,
                };
                if self.skip_next_invoke {
                    self.skip_next_invoke = false;
                    Some(found.ty)
                } else {
                    Some(self.resolve_value(found.ty, node))
                }
            }
            None => {
                let unknown = self.mgr.unknown_type(&self.ctx(node));
                self.mgr.set_property(
                    base_ty,
                    PropertyKey::name(&name),
                    EntityInfo::new(&name, unknown),
                );
                self.kind = CompletionItemKind::Property;
                Some(unknown)
            }
        }
    }

    fn infer_index(&mut self, node: NodeId, base: NodeId, index: NodeId) -> Option<TypeRef> {
        let latch = std::mem::replace(&mut self.skip_next_invoke, false);
        let base_ty = self.infer(base)?;
        self.skip_next_invoke = latch;
        self.label = None;
        if let NodeKind::StringLiteral(name) = &self.chunk.node(index).kind {
            let name = name.clone();
            self.push_path(&name);
            return match self.mgr.get_property(base_ty, &PropertyKey::name(&name)) {
                Some(found) => {
                    self.kind = CompletionItemKind::Property;
                    Some(found.ty)
                }
                None => {
                    let unknown = self.mgr.unknown_type(&self.ctx(node));
                    self.mgr.set_property(
                        base_ty,
                        PropertyKey::name(&name),
                        EntityInfo::new(&name, unknown),
                    );
                    self.kind = CompletionItemKind::Property;
                    Some(unknown)
                }
            };
        }
        self.push_path("[]");
        let index_ty = self.infer_detached(index)?;
        self.kind = CompletionItemKind::Property;
        let key_ids = self.key_ids_of(index_ty);
        let mut hits = Vec::new();
        for key_id in &key_ids {
            if let Some(found) = self
                .mgr
                .get_property(base_ty, &PropertyKey::Key(key_id.clone()))
            {
                hits.push(found.ty);
            }
        }
        match hits.len() {
            0 => {
                let unknown = self.mgr.unknown_type(&self.ctx(node));
                if let Some(key_id) = key_ids.first() {
                    let key = PropertyKey::Key(key_id.clone());
                    self.mgr
                        .set_property(base_ty, key.clone(), EntityInfo::new(key.to_string(), unknown));
                }
                Some(unknown)
            }
            1 => Some(hits[0]),
            _ => Some(self.mgr.union_type(&self.ctx(node), hits)),
        }
    }

    fn key_ids_of(&self, ty: TypeRef) -> Vec<String> {
        match &self.mgr.graph.node(ty).data {
            TypeData::Union { variants } => {
                let mut ids: Vec<String> = variants
                    .iter()
                    .map(|v| self.mgr.key_id_of(*v))
                    .collect();
                ids.dedup();
                ids
            }
            _ => vec![self.mgr.key_id_of(ty)],
        }
    }

    fn infer_call(&mut self, node: NodeId, base: NodeId, arguments: Vec<NodeId>) -> Option<TypeRef> {
        for argument in arguments {
            self.infer_detached(argument);
        }
        // The latch stays armed for the base: `@f()` resolves `f`
        // uncalled, then the call itself invokes it exactly once.
        let was_latched = self.skip_next_invoke;
        if !was_latched {
            self.suppress_next_invoke();
        }
        let base_ty = self.infer(base)?;
        self.kind = CompletionItemKind::Function;
        self.label = None;
        Some(self.resolve_value(base_ty, node))
    }

    // ── Operators ───────────────────────────────────────────────────────

    fn infer_unary(&mut self, node: NodeId, op: UnaryOp, argument: NodeId) -> Option<TypeRef> {
        match op {
            UnaryOp::Not => {
                self.infer_detached(argument);
                self.kind = CompletionItemKind::Expression;
                Some(self.mgr.base_type(&self.ctx(node), BaseType::Number.id()))
            }
            UnaryOp::Minus => {
                let inner = self.infer(argument);
                self.kind = CompletionItemKind::Expression;
                inner.or_else(|| Some(self.mgr.base_type(&self.ctx(node), BaseType::Number.id())))
            }
            UnaryOp::Reference => {
                self.suppress_next_invoke();
                self.infer(argument)
            }
            UnaryOp::New => {
                let parent = self.infer(argument)?;
                self.kind = CompletionItemKind::Constant;
                match self.mgr.kind_of(parent) {
                    TypeKind::Map | TypeKind::Class | TypeKind::Unknown => {
                        let instance = self.mgr.map_type(&self.ctx(node));
                        self.mgr.set_property(
                            instance,
                            PropertyKey::name(ISA_PROPERTY),
                            EntityInfo::new(ISA_PROPERTY, parent),
                        );
                        Some(instance)
                    }
                    _ => Some(parent),
                }
            }
        }
    }

    fn infer_binary(
        &mut self,
        node: NodeId,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    ) -> Option<TypeRef> {
        self.kind = CompletionItemKind::Expression;
        if op.is_comparison() {
            self.infer_detached(left);
            self.infer_detached(right);
            return Some(self.mgr.base_type(&self.ctx(node), BaseType::Number.id()));
        }
        let lhs = self.infer_detached(left);
        let rhs = self.infer_detached(right);
        let ctx = self.ctx(node);
        let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
            return Some(self.mgr.base_type(&ctx, BaseType::Number.id()));
        };
        match self.mode {
            InferMode::Light => Some(self.light_binary(&ctx, lhs, rhs)),
            InferMode::Full => Some(match op {
                BinaryOp::Add => self.full_add(&ctx, lhs, rhs),
                BinaryOp::Mul => self.full_multiply(&ctx, lhs, rhs),
                _ => self.mgr.base_type(&ctx, BaseType::Number.id()),
            }),
        }
    }

    /// Key id algebra: cheap approximation used by the light engine.
    fn light_binary(&mut self, ctx: &TypeContext, lhs: TypeRef, rhs: TypeRef) -> TypeRef {
        let a = self.mgr.key_id_of(lhs);
        let b = self.mgr.key_id_of(rhs);
        if a == b {
            return match a.as_str() {
                "map" => self.mgr.map_type(ctx),
                "list" => {
                    let element = self.mgr.unknown_type(ctx);
                    self.mgr.list_type(ctx, element)
                }
                _ => self.mgr.base_type(ctx, &a),
            };
        }
        let string = BaseType::String.id();
        if a == string || b == string {
            return self.mgr.base_type(ctx, string);
        }
        if a == "any" {
            return self.mgr.base_type(ctx, &b);
        }
        if b == "any" {
            return self.mgr.base_type(ctx, &a);
        }
        let left = self.mgr.base_type(ctx, &a);
        let right = self.mgr.base_type(ctx, &b);
        self.mgr.union_type(ctx, vec![left, right])
    }

    /// `+` concatenates structures: maps merge shallowly, lists fold
    /// their elements, strings win over numbers.
    fn full_add(&mut self, ctx: &TypeContext, lhs: TypeRef, rhs: TypeRef) -> TypeRef {
        let lk = self.mgr.kind_of(lhs);
        let rk = self.mgr.kind_of(rhs);
        if lk == TypeKind::Map && rk == TypeKind::Map {
            let merged = self.mgr.map_type(ctx);
            for source in [lhs, rhs] {
                if let TypeData::Map(MapShape { properties, .. }) =
                    self.mgr.graph.node(source).data.clone()
                {
                    let snapshot: Vec<_> = properties
                        .borrow()
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    for (key, info) in snapshot {
                        self.mgr.set_property(merged, key, info);
                    }
                }
            }
            return merged;
        }
        if lk == TypeKind::List && rk == TypeKind::List {
            let (le, re) = match (
                &self.mgr.graph.node(lhs).data,
                &self.mgr.graph.node(rhs).data,
            ) {
                (TypeData::List(a), TypeData::List(b)) => (a.element_type, b.element_type),
                _ => return self.mgr.base_type(ctx, BaseType::Number.id()),
            };
            let element = self.mgr.widen(ctx.doc, le, re);
            return self.mgr.list_type(ctx, element);
        }
        let string = BaseType::String.id();
        if self.mgr.id_of(lhs) == string || self.mgr.id_of(rhs) == string {
            return self.mgr.base_type(ctx, string);
        }
        self.mgr.base_type(ctx, BaseType::Number.id())
    }

    /// `*` repeats: a list or string times a number keeps its type.
    fn full_multiply(&mut self, ctx: &TypeContext, lhs: TypeRef, rhs: TypeRef) -> TypeRef {
        let number = BaseType::Number.id();
        if self.mgr.kind_of(lhs) == TypeKind::List && self.mgr.id_of(rhs) == number {
            return self.mgr.copy_type(lhs, ctx, true, true);
        }
        if self.mgr.id_of(lhs) == BaseType::String.id() && self.mgr.id_of(rhs) == number {
            return self.mgr.base_type(ctx, BaseType::String.id());
        }
        self.mgr.base_type(ctx, number)
    }

    // ── Constructors ────────────────────────────────────────────────────

    fn infer_map(&mut self, node: NodeId, fields: &[rill_ast::MapField]) -> Option<TypeRef> {
        self.kind = CompletionItemKind::MapConstructor;
        let ctx = self.ctx(node);
        let map = self.mgr.map_type(&ctx);
        if self.mode == InferMode::Light {
            return Some(map);
        }
        for field in fields {
            let value = match self.infer_detached(field.value) {
                Some(value) => value,
                None => self.mgr.unknown_type(&ctx),
            };
            match self.chunk.node(field.key).kind.clone() {
                NodeKind::StringLiteral(name) => {
                    self.mgr
                        .set_property(map, PropertyKey::name(&name), EntityInfo::new(&name, value));
                }
                _ => {
                    let key_ty = match self.infer_detached(field.key) {
                        Some(key_ty) => key_ty,
                        None => continue,
                    };
                    let key = PropertyKey::Key(self.mgr.key_id_of(key_ty));
                    self.mgr
                        .set_property(map, key.clone(), EntityInfo::new(key.to_string(), value));
                }
            }
        }
        Some(map)
    }

    fn infer_list(&mut self, node: NodeId, fields: &[NodeId]) -> Option<TypeRef> {
        self.kind = CompletionItemKind::ListConstructor;
        let ctx = self.ctx(node);
        if self.mode == InferMode::Light {
            let element = self.mgr.unknown_type(&ctx);
            return Some(self.mgr.list_type(&ctx, element));
        }
        let mut element: Option<TypeRef> = None;
        for field in fields {
            let Some(value) = self.infer_detached(*field) else {
                continue;
            };
            element = Some(match element {
                Some(current) => self.mgr.widen(Some(self.doc), current, value),
                None => value,
            });
        }
        let element = element.unwrap_or_else(|| self.mgr.unknown_type(&ctx));
        Some(self.mgr.list_type(&ctx, element))
    }

    fn infer_function(&mut self, node: NodeId, parameters: &[NodeId]) -> Option<TypeRef> {
        self.kind = CompletionItemKind::Function;
        let ctx = self.ctx(node);
        if self.mode == InferMode::Light {
            return Some(self.mgr.base_type(&ctx, BaseType::Function.id()));
        }
        let mut arguments = Vec::new();
        for parameter in parameters {
            match self.chunk.node(*parameter).kind.clone() {
                NodeKind::Identifier(name) => {
                    arguments.push(FnArg::required(name, vec![rill_meta::TypeMeta::base("any")]));
                }
                NodeKind::Assignment { target, init } => {
                    let Some(name) = self.chunk.identifier_name(target).map(str::to_string) else {
                        continue;
                    };
                    let metas = match self.infer_detached(init) {
                        Some(default) => self.mgr.to_meta(default),
                        None => vec![rill_meta::TypeMeta::base("any")],
                    };
                    arguments.push(FnArg::optional(name, metas));
                }
                _ => {}
            }
        }
        let id = self
            .mgr
            .mint_id(Some(self.doc), TypeKind::Function, None);
        let mut signature = FunctionSignature::custom(id, arguments);
        let line = self.chunk.node(node).span.start.line;
        if let Some(comment) = self.chunk.comment_block_above(line) {
            rill_meta::describe::enrich_function_signature(&mut signature, &comment);
        }
        let function = self.mgr.function_type(&ctx, signature);
        let index = self.mgr.documents[self.doc.0 as usize]
            .block_scopes
            .get(&node)
            .copied();
        if let Some(index) = index {
            let data = &mut self.mgr.documents[self.doc.0 as usize];
            let scope = data.records[index].scope;
            data.fn_scopes.insert(function, index);
            self.mgr.scope_mut(scope).associated_function = Some(function);
        }
        Some(function)
    }
}

fn is_constant_identifier(name: &str) -> bool {
    matches!(name, "self" | "super" | "globals" | "outer" | "locals")
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
