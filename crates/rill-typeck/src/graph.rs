//! Type graph arena and the operations over it.
//!
//! All structural behavior of types lives here: property lookup and
//! merge-on-write, copies, invocation, meta export. Operations take the
//! whole [`TypeManager`] because even lookups may allocate nodes, for
//! example when a union has to be minted for a fanned out result.

use rill_common::Span;
use rill_meta::{BaseType, TypeMeta, NIL_TYPE_ID, UNKNOWN_TYPE_ID};
use rustc_hash::FxHashMap;

use crate::document::DocRef;
use crate::source_map::SourceMap;
use crate::ty::{
    new_props, ClassShape, EntityInfo, FunctionShape, ListShape, MapShape, PropertyKey, TypeData,
    TypeKind, TypeNode, TypeRef, UnknownShape, ISA_PROPERTY, MAX_ALL_PROPERTIES_DEPTH, MAX_DEPTH,
    MAX_TO_META_DEPTH, TO_META_FANOUT,
};
use crate::TypeManager;

/// Node arena. Nodes are never freed during a session; merge results
/// allocate fresh nodes instead of mutating their inputs in place.
#[derive(Debug, Default)]
pub struct TypeGraph {
    nodes: Vec<TypeNode>,
}

impl TypeGraph {
    pub fn alloc(&mut self, node: TypeNode) -> TypeRef {
        let id = TypeRef(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, t: TypeRef) -> &TypeNode {
        &self.nodes[t.0 as usize]
    }

    pub fn node_mut(&mut self, t: TypeRef) -> &mut TypeNode {
        &mut self.nodes[t.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Where a freshly allocated or copied node belongs.
#[derive(Clone, Debug, Default)]
pub struct TypeContext {
    pub doc: Option<DocRef>,
    pub span: Option<Span>,
    /// Node kind label for minted ids, e.g. `MapConstructor`.
    pub label: Option<String>,
}

impl TypeContext {
    pub fn in_doc(doc: DocRef) -> Self {
        TypeContext {
            doc: Some(doc),
            ..TypeContext::default()
        }
    }

    pub fn at(doc: DocRef, label: &str, span: Span) -> Self {
        TypeContext {
            doc: Some(doc),
            span: Some(span),
            label: Some(label.to_string()),
        }
    }

    fn origin(&self) -> Option<(&str, Span)> {
        match (&self.label, self.span) {
            (Some(label), Some(span)) => Some((label.as_str(), span)),
            _ => None,
        }
    }
}

// ── Allocation ──────────────────────────────────────────────────────────

impl TypeManager {
    fn fresh(&mut self, ctx: &TypeContext, id: String, data: TypeData) -> TypeRef {
        let mut source_map = SourceMap::default();
        if let (Some(doc), Some(span)) = (ctx.doc, ctx.span) {
            source_map.add(&self.documents[doc.0 as usize].name.clone(), span);
        }
        self.graph.alloc(TypeNode {
            id,
            inherit_from: None,
            doc: ctx.doc,
            span: ctx.span,
            source_map,
            data,
        })
    }

    /// Nominal base type such as `string` or `null`. Members resolve
    /// through the interface registered under the same id.
    pub fn base_type(&mut self, ctx: &TypeContext, id: &str) -> TypeRef {
        self.fresh(ctx, id.to_string(), TypeData::Base)
    }

    pub fn unknown_type(&mut self, ctx: &TypeContext) -> TypeRef {
        let id = self.mint_id(ctx.doc, TypeKind::Unknown, ctx.origin_owned());
        self.fresh(ctx, id, TypeData::Unknown(UnknownShape::empty()))
    }

    pub fn map_type(&mut self, ctx: &TypeContext) -> TypeRef {
        let key = self.unknown_type(ctx);
        let value = self.unknown_type(ctx);
        let id = self.mint_id(ctx.doc, TypeKind::Map, ctx.origin_owned());
        self.fresh(
            ctx,
            id,
            TypeData::Map(MapShape {
                properties: new_props(),
                key_type: key,
                value_type: value,
                is_scope: false,
            }),
        )
    }

    pub fn list_type(&mut self, ctx: &TypeContext, element: TypeRef) -> TypeRef {
        let id = self.mint_id(ctx.doc, TypeKind::List, ctx.origin_owned());
        self.fresh(
            ctx,
            id,
            TypeData::List(ListShape {
                element_type: element,
            }),
        )
    }

    pub fn function_type(
        &mut self,
        ctx: &TypeContext,
        signature: rill_meta::FunctionSignature,
    ) -> TypeRef {
        self.fresh(
            ctx,
            BaseType::Function.id().to_string(),
            TypeData::Function(FunctionShape {
                signature,
                context: None,
                return_type: None,
                persistent: false,
            }),
        )
    }

    pub fn class_type(
        &mut self,
        ctx: &TypeContext,
        id: &str,
        inherit_from: Option<&str>,
    ) -> TypeRef {
        let t = self.fresh(
            ctx,
            id.to_string(),
            TypeData::Class(ClassShape {
                properties: new_props(),
                associated_map: None,
            }),
        );
        self.graph.node_mut(t).inherit_from = inherit_from.map(str::to_string);
        t
    }

    pub fn key_type(&mut self, ctx: &TypeContext, id: &str, user_defined: bool) -> TypeRef {
        self.fresh(ctx, id.to_string(), TypeData::Key { user_defined })
    }

    /// Union over `variants`, flattened and deduplicated. A single
    /// survivor is returned as itself.
    pub fn union_type(&mut self, ctx: &TypeContext, variants: Vec<TypeRef>) -> TypeRef {
        let mut unique: Vec<TypeRef> = Vec::new();
        for variant in variants {
            self.collect_variant(variant, &mut unique);
        }
        match unique.len() {
            1 => unique[0],
            _ => {
                let id = self.mint_id(ctx.doc, TypeKind::Union, ctx.origin_owned());
                self.fresh(ctx, id, TypeData::Union { variants: unique })
            }
        }
    }

    fn collect_variant(&self, variant: TypeRef, into: &mut Vec<TypeRef>) {
        if let TypeData::Union { variants } = &self.graph.node(variant).data {
            for nested in variants.clone() {
                self.collect_variant(nested, into);
            }
            return;
        }
        if !into.iter().any(|existing| self.equals(*existing, variant)) {
            into.push(variant);
        }
    }
}

impl TypeContext {
    fn origin_owned(&self) -> Option<(&str, Span)> {
        self.origin()
    }
}

// ── Identity ────────────────────────────────────────────────────────────

impl TypeManager {
    pub fn kind_of(&self, t: TypeRef) -> TypeKind {
        self.graph.node(t).kind()
    }

    pub fn id_of(&self, t: TypeRef) -> &str {
        &self.graph.node(t).id
    }

    /// Kind an unknown type behaves as, given the evidence it gathered.
    pub(crate) fn assumed_kind(&self, shape: &UnknownShape) -> TypeKind {
        if shape.signature.is_some() {
            return TypeKind::Function;
        }
        if let (Some(key), Some(_)) = (shape.key_type, shape.value_type) {
            if self.key_id_of(key) == BaseType::Number.id() {
                return TypeKind::List;
            }
            return TypeKind::Map;
        }
        if !shape.properties.borrow().is_empty() {
            return TypeKind::Map;
        }
        TypeKind::Base
    }

    /// Nominal id a type contributes when used as a map key.
    pub(crate) fn key_id_of(&self, t: TypeRef) -> String {
        let node = self.graph.node(t);
        match &node.data {
            TypeData::Base | TypeData::Key { .. } | TypeData::Class(_) => node.id.clone(),
            TypeData::Map(_) => BaseType::Map.id().to_string(),
            TypeData::List(_) => BaseType::List.id().to_string(),
            TypeData::Function(_) => BaseType::Function.id().to_string(),
            TypeData::Union { .. } => "any".to_string(),
            TypeData::Unknown(shape) => match self.assumed_kind(shape) {
                TypeKind::Map => BaseType::Map.id().to_string(),
                TypeKind::List => BaseType::List.id().to_string(),
                TypeKind::Function => BaseType::Function.id().to_string(),
                _ => "any".to_string(),
            },
        }
    }

    /// Structural equality in the loose sense the merge policy uses.
    pub(crate) fn equals(&self, a: TypeRef, b: TypeRef) -> bool {
        if a == b {
            return true;
        }
        let na = self.graph.node(a);
        let nb = self.graph.node(b);
        match (&na.data, &nb.data) {
            (TypeData::Base, TypeData::Base) | (TypeData::Key { .. }, TypeData::Key { .. }) => {
                na.id == nb.id
            }
            (TypeData::Class(_), TypeData::Class(_)) => na.id == nb.id && na.doc == nb.doc,
            (TypeData::Map(_), TypeData::Map(_)) | (TypeData::Unknown(_), TypeData::Unknown(_)) => {
                na.id == nb.id
            }
            (TypeData::List(la), TypeData::List(lb)) => {
                na.id == nb.id && self.equals(la.element_type, lb.element_type)
            }
            (TypeData::Function(fa), TypeData::Function(fb)) => fa.signature.id == fb.signature.id,
            (TypeData::Union { variants: va }, TypeData::Union { variants: vb }) => {
                va.len() == vb.len()
                    && va.iter().all(|x| vb.iter().any(|y| self.equals(*x, *y)))
            }
            _ => false,
        }
    }

    /// Canonical key type node for `id`, registering one on first use.
    pub(crate) fn key_type_for(&mut self, doc: Option<DocRef>, id: &str) -> TypeRef {
        if let Some(found) = self.lookup_key_type(doc, id) {
            return found;
        }
        let layer = if BaseType::from_id(id).is_some() {
            None
        } else {
            doc
        };
        let ctx = TypeContext {
            doc: layer,
            ..TypeContext::default()
        };
        let t = self.key_type(&ctx, id, false);
        self.register_key_type(layer, id, t);
        t
    }
}

// ── Property access ─────────────────────────────────────────────────────

impl TypeManager {
    pub fn get_property(&mut self, t: TypeRef, key: &PropertyKey) -> Option<EntityInfo> {
        self.get_property_depth(t, key, 0)
    }

    pub(crate) fn get_property_depth(
        &mut self,
        t: TypeRef,
        key: &PropertyKey,
        depth: u32,
    ) -> Option<EntityInfo> {
        if depth >= MAX_DEPTH {
            return None;
        }
        let node = self.graph.node(t);
        let doc = node.doc;
        let id = node.id.clone();
        match node.data.clone() {
            TypeData::Base | TypeData::Key { .. } => {
                let interface = self.lookup_interface(doc, &id, None)?;
                self.get_property_depth(interface, key, depth + 1)
            }
            TypeData::Map(shape) => {
                if let Some(found) = shape.properties.borrow().get(key) {
                    return Some(found.clone());
                }
                if let PropertyKey::Key(key_id) = key {
                    if self.aggregate_contains(shape.key_type, key_id) {
                        return Some(EntityInfo::new(key.to_string(), shape.value_type));
                    }
                    return None;
                }
                let isa = shape
                    .properties
                    .borrow()
                    .get(&PropertyKey::name(ISA_PROPERTY))
                    .cloned();
                if let Some(isa) = isa {
                    if let Some(found) = self.get_property_depth(isa.ty, key, depth + 1) {
                        return Some(found);
                    }
                }
                let interface = self.lookup_interface(doc, BaseType::Map.id(), None)?;
                self.get_property_depth(interface, key, depth + 1)
            }
            TypeData::List(shape) => match key {
                PropertyKey::Key(key_id) if key_id == BaseType::Number.id() => {
                    Some(EntityInfo::new(key.to_string(), shape.element_type))
                }
                PropertyKey::Key(_) => None,
                PropertyKey::Name(_) => {
                    let interface = self.lookup_interface(doc, BaseType::List.id(), None)?;
                    self.get_property_depth(interface, key, depth + 1)
                }
            },
            TypeData::Class(shape) => {
                if let Some(found) = shape.properties.borrow().get(key) {
                    return Some(found.clone());
                }
                if let Some(map) = shape.associated_map {
                    let from_map = {
                        let map_node = self.graph.node(map);
                        match &map_node.data {
                            TypeData::Map(map_shape) => {
                                map_shape.properties.borrow().get(key).cloned()
                            }
                            _ => None,
                        }
                    };
                    if let Some(found) = from_map {
                        return Some(found);
                    }
                }
                let inherit = self.graph.node(t).inherit_from.clone()?;
                let parent = self.lookup_interface(doc, &inherit, Some(t))?;
                self.get_property_depth(parent, key, depth + 1)
            }
            TypeData::Function(_) => {
                let interface = self.lookup_interface(doc, BaseType::Function.id(), None)?;
                self.get_property_depth(interface, key, depth + 1)
            }
            TypeData::Union { variants } => {
                let mut found = Vec::new();
                for variant in variants {
                    if let Some(info) = self.get_property_depth(variant, key, depth + 1) {
                        found.push(info.ty);
                    }
                }
                match found.len() {
                    0 => None,
                    1 => Some(EntityInfo::new(key.to_string(), found[0])),
                    _ => {
                        let ctx = TypeContext {
                            doc,
                            ..TypeContext::default()
                        };
                        let union = self.union_type(&ctx, found);
                        Some(EntityInfo::new(key.to_string(), union))
                    }
                }
            }
            TypeData::Unknown(shape) => {
                if let Some(found) = shape.properties.borrow().get(key) {
                    return Some(found.clone());
                }
                if let PropertyKey::Key(key_id) = key {
                    if let (Some(ks), Some(vs)) = (shape.key_type, shape.value_type) {
                        if self.aggregate_contains(ks, key_id) {
                            return Some(EntityInfo::new(key.to_string(), vs));
                        }
                    }
                    return None;
                }
                let isa = shape
                    .properties
                    .borrow()
                    .get(&PropertyKey::name(ISA_PROPERTY))
                    .cloned();
                if let Some(isa) = isa {
                    if let Some(found) = self.get_property_depth(isa.ty, key, depth + 1) {
                        return Some(found);
                    }
                }
                let assumed = match self.assumed_kind(&shape) {
                    TypeKind::Map => BaseType::Map.id(),
                    TypeKind::List => BaseType::List.id(),
                    TypeKind::Function => BaseType::Function.id(),
                    _ => "any",
                };
                let interface = self.lookup_interface(doc, assumed, None)?;
                self.get_property_depth(interface, key, depth + 1)
            }
        }
    }

    /// Whether an aggregate (possibly a union of key types) covers a key
    /// id.
    fn aggregate_contains(&self, aggregate: TypeRef, key_id: &str) -> bool {
        match &self.graph.node(aggregate).data {
            TypeData::Union { variants } => variants
                .iter()
                .any(|v| self.aggregate_contains(*v, key_id)),
            TypeData::Unknown(_) => false,
            _ => self.key_id_of(aggregate) == key_id,
        }
    }

    pub fn has_property(&mut self, t: TypeRef, key: &PropertyKey) -> bool {
        self.get_property(t, key).is_some()
    }

    /// Writes are monotonic: conflicting evidence widens the slot into a
    /// union, it never replaces observed facts.
    pub fn set_property(&mut self, t: TypeRef, key: PropertyKey, info: EntityInfo) {
        let node = self.graph.node(t);
        let doc = node.doc;
        let id = node.id.clone();
        match node.data.clone() {
            TypeData::Map(shape) => {
                self.write_slot(doc, &shape.properties, key.clone(), info.clone());
                self.widen_map_aggregates(t, doc, &key, info.ty);
            }
            TypeData::Unknown(shape) => {
                self.write_slot(doc, &shape.properties, key.clone(), info.clone());
                self.widen_unknown_aggregates(t, doc, &key, info.ty);
            }
            TypeData::Class(shape) => {
                if key.as_name().is_none() {
                    return;
                }
                self.write_slot(doc, &shape.properties, key.clone(), info.clone());
                if doc.is_some() && id != BaseType::General.id() && id != "any" {
                    self.sink_into_any(doc, key, info);
                }
            }
            TypeData::List(shape) => {
                if matches!(&key, PropertyKey::Key(k) if k == BaseType::Number.id()) {
                    let widened = self.widen(doc, shape.element_type, info.ty);
                    if let TypeData::List(list) = &mut self.graph.node_mut(t).data {
                        list.element_type = widened;
                    }
                }
            }
            TypeData::Union { variants } => {
                for variant in variants {
                    self.set_property(variant, key.clone(), info.clone());
                }
            }
            TypeData::Base | TypeData::Key { .. } | TypeData::Function(_) => {}
        }
    }

    fn write_slot(
        &mut self,
        doc: Option<DocRef>,
        props: &crate::ty::SharedProps,
        key: PropertyKey,
        info: EntityInfo,
    ) {
        let existing = props.borrow().get(&key).cloned();
        let Some(existing) = existing else {
            props.borrow_mut().insert(key, info);
            return;
        };
        let existing_kind = self.kind_of(existing.ty);
        let incoming_kind = self.kind_of(info.ty);
        if existing_kind == TypeKind::Unknown && incoming_kind != TypeKind::Unknown {
            // A placeholder slot absorbs into the first real evidence.
            let mut seen = FxHashMap::default();
            self.merge_into(existing.ty, info.ty, &mut seen);
            props.borrow_mut().insert(key, info);
            return;
        }
        if incoming_kind == TypeKind::Unknown {
            let mut seen = FxHashMap::default();
            self.merge_into(info.ty, existing.ty, &mut seen);
            return;
        }
        if self.equals(existing.ty, info.ty) {
            let sources = self.graph.node(info.ty).source_map.clone();
            self.graph
                .node_mut(existing.ty)
                .source_map
                .extend(&sources);
            return;
        }
        let widened = self.widen(doc, existing.ty, info.ty);
        props
            .borrow_mut()
            .insert(key, EntityInfo::new(existing.name, widened));
    }

    /// Union-or-keep widening for aggregates and conflicting slots.
    pub(crate) fn widen(
        &mut self,
        doc: Option<DocRef>,
        current: TypeRef,
        incoming: TypeRef,
    ) -> TypeRef {
        if self.equals(current, incoming) {
            return current;
        }
        if let TypeData::Unknown(shape) = &self.graph.node(current).data {
            if self.assumed_kind(shape) == TypeKind::Base {
                return incoming;
            }
        }
        if let TypeData::Unknown(shape) = &self.graph.node(incoming).data {
            if self.assumed_kind(shape) == TypeKind::Base {
                return current;
            }
        }
        let ctx = TypeContext {
            doc,
            ..TypeContext::default()
        };
        self.union_type(&ctx, vec![current, incoming])
    }

    fn widen_map_aggregates(
        &mut self,
        t: TypeRef,
        doc: Option<DocRef>,
        key: &PropertyKey,
        value: TypeRef,
    ) {
        let key_node = match key {
            PropertyKey::Name(_) => self.key_type_for(doc, BaseType::String.id()),
            PropertyKey::Key(id) => {
                let id = id.clone();
                self.key_type_for(doc, &id)
            }
        };
        if let TypeData::Map(shape) = self.graph.node(t).data.clone() {
            let widened_key = self.widen(doc, shape.key_type, key_node);
            let widened_value = self.widen(doc, shape.value_type, value);
            if let TypeData::Map(shape) = &mut self.graph.node_mut(t).data {
                shape.key_type = widened_key;
                shape.value_type = widened_value;
            }
        }
    }

    fn widen_unknown_aggregates(
        &mut self,
        t: TypeRef,
        doc: Option<DocRef>,
        key: &PropertyKey,
        value: TypeRef,
    ) {
        let key_node = match key {
            PropertyKey::Name(_) => self.key_type_for(doc, BaseType::String.id()),
            PropertyKey::Key(id) => {
                let id = id.clone();
                self.key_type_for(doc, &id)
            }
        };
        if let TypeData::Unknown(shape) = self.graph.node(t).data.clone() {
            let widened_key = match shape.key_type {
                Some(current) => self.widen(doc, current, key_node),
                None => key_node,
            };
            let widened_value = match shape.value_type {
                Some(current) => self.widen(doc, current, value),
                None => value,
            };
            if let TypeData::Unknown(shape) = &mut self.graph.node_mut(t).data {
                shape.key_type = Some(widened_key);
                shape.value_type = Some(widened_value);
            }
        }
    }

    /// Every member declared on a document class also lands on the
    /// document's `any` sink, so completions on untyped values see it.
    fn sink_into_any(&mut self, doc: Option<DocRef>, key: PropertyKey, info: EntityInfo) {
        let Some(any) = self.lookup_interface(doc, "any", None) else {
            return;
        };
        if self.graph.node(any).doc != doc {
            return;
        }
        if let TypeData::Class(shape) = self.graph.node(any).data.clone() {
            let occupied = shape.properties.borrow().contains_key(&key);
            if !occupied {
                shape.properties.borrow_mut().insert(key, info);
            }
        }
    }

    // ── Dotted paths ────────────────────────────────────────────────────

    pub fn get_property_in_path(&mut self, t: TypeRef, path: &[&str]) -> Option<EntityInfo> {
        let (first, rest) = path.split_first()?;
        let mut current = self.get_property(t, &PropertyKey::name(*first))?;
        for segment in rest {
            current = self.get_property(current.ty, &PropertyKey::name(*segment))?;
        }
        Some(current)
    }

    /// Writes through a dotted path, vivifying intermediate maps.
    pub fn set_property_in_path(&mut self, t: TypeRef, path: &[&str], info: EntityInfo) {
        let Some((last, walk)) = path.split_last() else {
            return;
        };
        let doc = self.graph.node(t).doc;
        let mut current = t;
        for segment in walk {
            let key = PropertyKey::name(*segment);
            current = match self.get_property(current, &key) {
                Some(found) => found.ty,
                None => {
                    let ctx = TypeContext {
                        doc,
                        ..TypeContext::default()
                    };
                    let fresh = self.map_type(&ctx);
                    self.set_property(current, key, EntityInfo::new(*segment, fresh));
                    fresh
                }
            };
        }
        self.set_property(current, PropertyKey::name(*last), info);
    }
}

// ── Copies ──────────────────────────────────────────────────────────────

impl TypeManager {
    /// Shallow copy. The copy keeps the nominal id so equality with the
    /// original survives. With `unbind` the property table is detached,
    /// otherwise both nodes keep writing into the same table.
    pub(crate) fn copy_type(
        &mut self,
        t: TypeRef,
        ctx: &TypeContext,
        keep_source: bool,
        unbind: bool,
    ) -> TypeRef {
        let node = self.graph.node(t).clone();
        let data = match node.data {
            TypeData::Base => TypeData::Base,
            TypeData::Key { user_defined } => TypeData::Key { user_defined },
            TypeData::Map(shape) => {
                let key_type = self.copy_type(shape.key_type, ctx, keep_source, true);
                let value_type = self.copy_type(shape.value_type, ctx, keep_source, true);
                TypeData::Map(MapShape {
                    properties: if unbind {
                        std::rc::Rc::new(std::cell::RefCell::new(shape.properties.borrow().clone()))
                    } else {
                        shape.properties
                    },
                    key_type,
                    value_type,
                    is_scope: false,
                })
            }
            TypeData::List(shape) => {
                let element_type = self.copy_type(shape.element_type, ctx, keep_source, true);
                TypeData::List(ListShape { element_type })
            }
            TypeData::Class(shape) => TypeData::Class(ClassShape {
                properties: if unbind {
                    std::rc::Rc::new(std::cell::RefCell::new(shape.properties.borrow().clone()))
                } else {
                    shape.properties
                },
                associated_map: shape.associated_map,
            }),
            TypeData::Function(shape) => TypeData::Function(shape),
            TypeData::Union { variants } => {
                let variants = variants
                    .into_iter()
                    .map(|v| self.copy_type(v, ctx, keep_source, unbind))
                    .collect();
                TypeData::Union { variants }
            }
            TypeData::Unknown(shape) => TypeData::Unknown(UnknownShape {
                key_type: shape.key_type,
                value_type: shape.value_type,
                properties: if unbind {
                    std::rc::Rc::new(std::cell::RefCell::new(shape.properties.borrow().clone()))
                } else {
                    shape.properties
                },
                signature: shape.signature,
            }),
        };
        let mut source_map = if keep_source {
            node.source_map
        } else {
            SourceMap::default()
        };
        if let (Some(doc), Some(span)) = (ctx.doc, ctx.span) {
            source_map.add(&self.documents[doc.0 as usize].name.clone(), span);
        }
        self.graph.alloc(TypeNode {
            id: node.id,
            inherit_from: node.inherit_from,
            doc: ctx.doc.or(node.doc),
            span: ctx.span.or(node.span),
            source_map,
            data,
        })
    }

    /// Structural copy that detaches every reachable table. `seen` makes
    /// cyclic `__isa` chains terminate.
    pub(crate) fn deep_copy(
        &mut self,
        t: TypeRef,
        ctx: &TypeContext,
        seen: &mut FxHashMap<TypeRef, TypeRef>,
    ) -> TypeRef {
        if let Some(done) = seen.get(&t) {
            return *done;
        }
        let node = self.graph.node(t).clone();
        // Allocate the clone first so self references resolve to it.
        let clone = self.graph.alloc(TypeNode {
            id: node.id.clone(),
            inherit_from: node.inherit_from.clone(),
            doc: ctx.doc.or(node.doc),
            span: ctx.span.or(node.span),
            source_map: node.source_map.clone(),
            data: TypeData::Unknown(UnknownShape::empty()),
        });
        seen.insert(t, clone);
        let data = match node.data {
            TypeData::Base => TypeData::Base,
            TypeData::Key { user_defined } => TypeData::Key { user_defined },
            TypeData::Map(shape) => {
                let key_type = self.deep_copy(shape.key_type, ctx, seen);
                let value_type = self.deep_copy(shape.value_type, ctx, seen);
                let snapshot: Vec<_> = shape
                    .properties
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let table = new_props();
                for (key, info) in snapshot {
                    let ty = self.deep_copy(info.ty, ctx, seen);
                    table
                        .borrow_mut()
                        .insert(key, EntityInfo::new(info.name, ty));
                }
                TypeData::Map(MapShape {
                    properties: table,
                    key_type,
                    value_type,
                    is_scope: shape.is_scope,
                })
            }
            TypeData::List(shape) => TypeData::List(ListShape {
                element_type: self.deep_copy(shape.element_type, ctx, seen),
            }),
            TypeData::Class(shape) => {
                let snapshot: Vec<_> = shape
                    .properties
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let table = new_props();
                for (key, info) in snapshot {
                    let ty = self.deep_copy(info.ty, ctx, seen);
                    table
                        .borrow_mut()
                        .insert(key, EntityInfo::new(info.name, ty));
                }
                let associated_map = shape.associated_map.map(|m| self.deep_copy(m, ctx, seen));
                TypeData::Class(ClassShape {
                    properties: table,
                    associated_map,
                })
            }
            TypeData::Function(shape) => {
                let context = shape.context.map(|c| self.deep_copy(c, ctx, seen));
                let return_type = shape.return_type.map(|r| self.deep_copy(r, ctx, seen));
                TypeData::Function(FunctionShape {
                    signature: shape.signature,
                    context,
                    return_type,
                    persistent: shape.persistent,
                })
            }
            TypeData::Union { variants } => {
                let variants = variants
                    .into_iter()
                    .map(|v| self.deep_copy(v, ctx, seen))
                    .collect();
                TypeData::Union { variants }
            }
            TypeData::Unknown(shape) => {
                let key_type = shape.key_type.map(|k| self.deep_copy(k, ctx, seen));
                let value_type = shape.value_type.map(|v| self.deep_copy(v, ctx, seen));
                let snapshot: Vec<_> = shape
                    .properties
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let table = new_props();
                for (key, info) in snapshot {
                    let ty = self.deep_copy(info.ty, ctx, seen);
                    table
                        .borrow_mut()
                        .insert(key, EntityInfo::new(info.name, ty));
                }
                TypeData::Unknown(UnknownShape {
                    key_type,
                    value_type,
                    properties: table,
                    signature: shape.signature,
                })
            }
        };
        self.graph.node_mut(clone).data = data;
        clone
    }
}

// ── Invocation ──────────────────────────────────────────────────────────

impl TypeManager {
    /// Resolves what an expression yields when its value is called.
    /// Non-callables yield themselves.
    pub(crate) fn invoke(&mut self, t: TypeRef, ctx: &TypeContext) -> TypeRef {
        match self.graph.node(t).data.clone() {
            TypeData::Function(shape) => {
                let ret = match shape.return_type {
                    Some(ret) => ret,
                    None => {
                        let metas = shape.signature.returns.clone();
                        let ret = self.type_from_metas(ctx, &metas);
                        if let TypeData::Function(f) = &mut self.graph.node_mut(t).data {
                            f.return_type = Some(ret);
                        }
                        ret
                    }
                };
                if shape.persistent {
                    ret
                } else {
                    let mut seen = FxHashMap::default();
                    self.deep_copy(ret, ctx, &mut seen)
                }
            }
            TypeData::Union { variants } => {
                let resolved = variants.into_iter().map(|v| self.invoke(v, ctx)).collect();
                self.union_type(ctx, resolved)
            }
            _ => t,
        }
    }

    pub(crate) fn type_from_metas(&mut self, ctx: &TypeContext, metas: &[TypeMeta]) -> TypeRef {
        let variants: Vec<_> = metas.iter().map(|m| self.type_from_meta(ctx, m)).collect();
        match variants.len() {
            0 => self.unknown_type(ctx),
            1 => variants[0],
            _ => self.union_type(ctx, variants),
        }
    }

    pub(crate) fn type_from_meta(&mut self, ctx: &TypeContext, meta: &TypeMeta) -> TypeRef {
        if meta.ty == BaseType::List.id() {
            let element = match &meta.value_type {
                Some(value) => self.type_from_meta(ctx, value),
                None => self.unknown_type(ctx),
            };
            return self.list_type(ctx, element);
        }
        if meta.ty == BaseType::Map.id() && (meta.key_type.is_some() || meta.value_type.is_some()) {
            let t = self.map_type(ctx);
            let key = match &meta.key_type {
                Some(key) => self.type_from_meta(ctx, key),
                None => self.base_type(ctx, "any"),
            };
            let value = match &meta.value_type {
                Some(value) => self.type_from_meta(ctx, value),
                None => self.unknown_type(ctx),
            };
            if let TypeData::Map(shape) = &mut self.graph.node_mut(t).data {
                shape.key_type = key;
                shape.value_type = value;
            }
            return t;
        }
        if meta.ty == UNKNOWN_TYPE_ID || meta.ty == "any" {
            return self.unknown_type(ctx);
        }
        self.base_type(ctx, &meta.ty)
    }
}

// ── Meta export ─────────────────────────────────────────────────────────

impl TypeManager {
    /// Compact structural description, bounded in depth and union
    /// fan-out so cyclic graphs export finite output.
    pub fn to_meta(&self, t: TypeRef) -> Vec<TypeMeta> {
        self.to_meta_depth(t, 0)
    }

    fn to_meta_depth(&self, t: TypeRef, depth: u32) -> Vec<TypeMeta> {
        let node = self.graph.node(t);
        if depth >= MAX_TO_META_DEPTH {
            return vec![TypeMeta::base("any")];
        }
        match &node.data {
            TypeData::Base | TypeData::Key { .. } | TypeData::Class(_) => {
                vec![TypeMeta::base(node.id.clone())]
            }
            TypeData::Map(shape) => {
                if shape.is_scope {
                    return vec![TypeMeta::base(BaseType::Map.id())];
                }
                let keys = self.aggregate_fanned(shape.key_type, depth + 1);
                let values = self.aggregate_fanned(shape.value_type, depth + 1);
                if keys.len() + values.len() > TO_META_FANOUT {
                    return vec![TypeMeta::map(TypeMeta::base("any"), TypeMeta::base("any"))];
                }
                let mut metas = Vec::new();
                for key in &keys {
                    for value in &values {
                        metas.push(TypeMeta::map(key.clone(), value.clone()));
                    }
                }
                metas
            }
            TypeData::List(shape) => self
                .fanned_metas(shape.element_type, depth + 1)
                .into_iter()
                .map(TypeMeta::list)
                .collect(),
            TypeData::Function(_) => vec![TypeMeta::base(BaseType::Function.id())],
            TypeData::Union { variants } => {
                let mut metas: Vec<TypeMeta> = Vec::new();
                for variant in variants.iter().take(TO_META_FANOUT) {
                    for meta in self.to_meta_depth(*variant, depth + 1) {
                        if !metas.contains(&meta) {
                            metas.push(meta);
                        }
                    }
                }
                if metas.is_empty() {
                    metas.push(TypeMeta::unknown());
                }
                metas
            }
            TypeData::Unknown(shape) => match self.assumed_kind(shape) {
                TypeKind::Map => {
                    let key = shape
                        .key_type
                        .map(|k| self.first_meta(k, depth + 1))
                        .unwrap_or_else(|| TypeMeta::base("any"));
                    let value = shape
                        .value_type
                        .map(|v| self.first_meta(v, depth + 1))
                        .unwrap_or_else(TypeMeta::unknown);
                    vec![TypeMeta::map(key, value)]
                }
                TypeKind::List => {
                    let value = shape
                        .value_type
                        .map(|v| self.first_meta(v, depth + 1))
                        .unwrap_or_else(TypeMeta::unknown);
                    vec![TypeMeta::list(value)]
                }
                TypeKind::Function => vec![TypeMeta::base(BaseType::Function.id())],
                _ => vec![TypeMeta::unknown()],
            },
        }
    }

    fn first_meta(&self, t: TypeRef, depth: u32) -> TypeMeta {
        self.to_meta_depth(t, depth)
            .into_iter()
            .next()
            .unwrap_or_else(|| TypeMeta::base("any"))
    }

    /// One meta per distinct variant kind: unions flat-map and
    /// deduplicate instead of collapsing to their first variant.
    fn fanned_metas(&self, t: TypeRef, depth: u32) -> Vec<TypeMeta> {
        let mut metas: Vec<TypeMeta> = Vec::new();
        match &self.graph.node(t).data {
            TypeData::Union { variants } => {
                let mut kinds: Vec<String> = Vec::new();
                for variant in variants.iter().take(TO_META_FANOUT) {
                    let kind = self.key_id_of(*variant);
                    if kinds.contains(&kind) {
                        continue;
                    }
                    kinds.push(kind);
                    for meta in self.to_meta_depth(*variant, depth) {
                        if !metas.contains(&meta) {
                            metas.push(meta);
                        }
                    }
                }
            }
            _ => metas.extend(self.to_meta_depth(t, depth)),
        }
        if metas.is_empty() {
            metas.push(TypeMeta::base("any"));
        }
        metas
    }

    /// Like [`fanned_metas`](Self::fanned_metas), but evidence free
    /// slots read as `any` rather than `unknown`.
    fn aggregate_fanned(&self, t: TypeRef, depth: u32) -> Vec<TypeMeta> {
        let mut metas: Vec<TypeMeta> = Vec::new();
        for meta in self.fanned_metas(t, depth) {
            let meta = if meta.is_unknown() {
                TypeMeta::base("any")
            } else {
                meta
            };
            if !metas.contains(&meta) {
                metas.push(meta);
            }
        }
        metas
    }

    /// `string|map<string,number>` style label, for diagnostics and
    /// hover rendering.
    pub fn describe(&self, t: TypeRef) -> String {
        let metas = self.to_meta(t);
        let labels: Vec<String> = metas.iter().map(TypeMeta::to_string).collect();
        labels.join("|")
    }

    /// Completion surface of a type: every reachable member name.
    pub fn all_property_names(&self, t: TypeRef) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_property_names(t, 0, &mut names);
        names.sort();
        names.dedup();
        names
    }

    fn collect_property_names(&self, t: TypeRef, depth: u32, into: &mut Vec<String>) {
        if depth >= MAX_ALL_PROPERTIES_DEPTH {
            return;
        }
        let node = self.graph.node(t);
        match &node.data {
            TypeData::Map(shape) => {
                for key in shape.properties.borrow().keys() {
                    if let Some(name) = key.as_name() {
                        if name != ISA_PROPERTY {
                            into.push(name.to_string());
                        }
                    }
                }
                let isa = shape
                    .properties
                    .borrow()
                    .get(&PropertyKey::name(ISA_PROPERTY))
                    .map(|info| info.ty);
                if let Some(isa) = isa {
                    self.collect_property_names(isa, depth + 1, into);
                }
                if let Some(interface) = self.lookup_interface(node.doc, BaseType::Map.id(), None) {
                    self.collect_property_names(interface, depth + 1, into);
                }
            }
            TypeData::Class(shape) => {
                for key in shape.properties.borrow().keys() {
                    if let Some(name) = key.as_name() {
                        into.push(name.to_string());
                    }
                }
                if let Some(inherit) = &node.inherit_from {
                    if let Some(parent) = self.lookup_interface(node.doc, inherit, Some(t)) {
                        self.collect_property_names(parent, depth + 1, into);
                    }
                }
            }
            TypeData::Base | TypeData::Key { .. } => {
                if let Some(interface) = self.lookup_interface(node.doc, &node.id, None) {
                    self.collect_property_names(interface, depth + 1, into);
                }
            }
            TypeData::List(_) => {
                if let Some(interface) = self.lookup_interface(node.doc, BaseType::List.id(), None)
                {
                    self.collect_property_names(interface, depth + 1, into);
                }
            }
            TypeData::Function(_) => {
                if let Some(interface) =
                    self.lookup_interface(node.doc, BaseType::Function.id(), None)
                {
                    self.collect_property_names(interface, depth + 1, into);
                }
            }
            TypeData::Union { variants } => {
                for variant in variants {
                    self.collect_property_names(*variant, depth + 1, into);
                }
            }
            TypeData::Unknown(shape) => {
                for key in shape.properties.borrow().keys() {
                    if let Some(name) = key.as_name() {
                        if name != ISA_PROPERTY {
                            into.push(name.to_string());
                        }
                    }
                }
            }
        }
    }

    /// Whether property writes can land on this type directly, or the
    /// binding first needs widening into a map.
    pub(crate) fn supports_properties(&self, t: TypeRef) -> bool {
        match &self.graph.node(t).data {
            TypeData::Map(_) | TypeData::Class(_) | TypeData::Unknown(_) | TypeData::List(_) => {
                true
            }
            TypeData::Union { variants } => variants.iter().any(|v| self.supports_properties(*v)),
            TypeData::Base | TypeData::Key { .. } | TypeData::Function(_) => false,
        }
    }

    /// Nil base type, used for bodiless returns and nil literals.
    pub(crate) fn nil_type(&mut self, ctx: &TypeContext) -> TypeRef {
        self.base_type(ctx, NIL_TYPE_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TypeContext {
        TypeContext::default()
    }

    #[test]
    fn unions_flatten_and_deduplicate() {
        let mut mgr = TypeManager::default();
        let c = ctx();
        let number = mgr.base_type(&c, "number");
        let string = mgr.base_type(&c, "string");
        let inner = mgr.union_type(&c, vec![number, string]);
        let again = mgr.base_type(&c, "number");
        let union = mgr.union_type(&c, vec![inner, again]);
        assert_eq!(mgr.describe(union), "number|string");
    }

    #[test]
    fn single_variant_unions_collapse() {
        let mut mgr = TypeManager::default();
        let c = ctx();
        let a = mgr.base_type(&c, "number");
        let b = mgr.base_type(&c, "number");
        let union = mgr.union_type(&c, vec![a, b]);
        assert_eq!(union, a);
    }

    #[test]
    fn widen_absorbs_evidence_free_unknowns() {
        let mut mgr = TypeManager::default();
        let c = ctx();
        let unknown = mgr.unknown_type(&c);
        let number = mgr.base_type(&c, "number");
        assert_eq!(mgr.widen(None, unknown, number), number);
        assert_eq!(mgr.widen(None, number, unknown), number);
    }

    #[test]
    fn property_slots_widen_instead_of_overwriting() {
        let mut mgr = TypeManager::default();
        let c = ctx();
        let map = mgr.map_type(&c);
        let number = mgr.base_type(&c, "number");
        let string = mgr.base_type(&c, "string");
        mgr.set_property(map, PropertyKey::name("v"), EntityInfo::new("v", number));
        mgr.set_property(map, PropertyKey::name("v"), EntityInfo::new("v", string));
        let slot = mgr.get_property(map, &PropertyKey::name("v")).unwrap();
        assert_eq!(mgr.describe(slot.ty), "number|string");
        // Aggregates fan out: one meta per key and value kind pair.
        assert_eq!(mgr.describe(map), "map<string,number>|map<string,string>");
    }

    #[test]
    fn list_meta_fans_out_per_element_kind() {
        let mut mgr = TypeManager::default();
        let c = ctx();
        let number = mgr.base_type(&c, "number");
        let string = mgr.base_type(&c, "string");
        let element = mgr.union_type(&c, vec![number, string]);
        let list = mgr.list_type(&c, element);
        let metas = mgr.to_meta(list);
        assert_eq!(metas.len(), 2);
        assert_eq!(mgr.describe(list), "list<number>|list<string>");
    }

    #[test]
    fn wide_map_aggregates_fall_back_to_any() {
        let mut mgr = TypeManager::default();
        let c = ctx();
        let kinds = ["number", "string", "null"];
        let keys: Vec<TypeRef> = kinds.iter().map(|id| mgr.base_type(&c, id)).collect();
        let key = mgr.union_type(&c, keys);
        let values: Vec<TypeRef> = kinds.iter().map(|id| mgr.base_type(&c, id)).collect();
        let value = mgr.union_type(&c, values);
        let map = mgr.map_type(&c);
        if let TypeData::Map(shape) = &mut mgr.graph.node_mut(map).data {
            shape.key_type = key;
            shape.value_type = value;
        }
        assert_eq!(mgr.describe(map), "map<any,any>");
    }

    #[test]
    fn plain_copies_alias_their_property_table() {
        let mut mgr = TypeManager::default();
        let c = ctx();
        let map = mgr.map_type(&c);
        let copy = mgr.copy_type(map, &c, false, false);
        let number = mgr.base_type(&c, "number");
        mgr.set_property(copy, PropertyKey::name("n"), EntityInfo::new("n", number));
        assert!(mgr.get_property(map, &PropertyKey::name("n")).is_some());

        let detached = mgr.copy_type(map, &c, false, true);
        let string = mgr.base_type(&c, "string");
        mgr.set_property(detached, PropertyKey::name("s"), EntityInfo::new("s", string));
        assert!(mgr.get_property(map, &PropertyKey::name("s")).is_none());
    }

    #[test]
    fn meta_export_is_depth_bounded() {
        let mut mgr = TypeManager::default();
        let c = ctx();
        let number = mgr.base_type(&c, "number");
        let mut nested = mgr.list_type(&c, number);
        for _ in 0..8 {
            nested = mgr.list_type(&c, nested);
        }
        let metas = mgr.to_meta(nested);
        assert_eq!(metas.len(), 1);
        assert!(metas[0].to_string().len() < 64);
    }
}
