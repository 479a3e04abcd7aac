//! Lexical scopes.
//!
//! A scope's local table is itself a map type node, flagged so it never
//! leaks into meta export. Resolution walks locals, the outer chain and
//! the document globals before falling back to the `general` interface
//! of the document.

use rill_common::Span;
use rill_meta::BaseType;
use serde::Serialize;

use crate::document::DocRef;
use crate::graph::TypeContext;
use crate::ty::{CompletionItemKind, EntityInfo, PropertyKey, TypeData, TypeRef};
use crate::TypeManager;

/// Index of a scope in the manager's scope arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeRef(pub u32);

/// One named definition recorded while aggregating a scope.
#[derive(Clone, Debug, Serialize)]
pub struct SymbolInfo {
    /// Leaf name of the binding.
    pub name: String,
    /// Dotted path of the write target, `config.port` style.
    pub path: String,
    pub kind: CompletionItemKind,
    /// Name of the document the definition was recorded in.
    pub source: String,
    pub span: Span,
}

#[derive(Debug)]
pub struct ScopeData {
    pub doc: DocRef,
    pub outer: Option<ScopeRef>,
    pub globals: ScopeRef,
    /// Map node with `is_scope` set, holding the local bindings.
    pub locals: TypeRef,
    /// Function whose body this scope is, when it is not the root.
    pub associated_function: Option<TypeRef>,
    pub symbols: Vec<SymbolInfo>,
}

impl TypeManager {
    pub(crate) fn new_scope(
        &mut self,
        doc: DocRef,
        outer: Option<ScopeRef>,
        globals: Option<ScopeRef>,
    ) -> ScopeRef {
        let ctx = TypeContext::in_doc(doc);
        let locals = self.map_type(&ctx);
        if let TypeData::Map(shape) = &mut self.graph.node_mut(locals).data {
            shape.is_scope = true;
        }
        let scope = ScopeRef(self.scopes.len() as u32);
        self.scopes.push(ScopeData {
            doc,
            outer,
            globals: globals.unwrap_or(scope),
            locals,
            associated_function: None,
            symbols: Vec::new(),
        });
        scope
    }

    pub(crate) fn scope(&self, scope: ScopeRef) -> &ScopeData {
        &self.scopes[scope.0 as usize]
    }

    pub(crate) fn scope_mut(&mut self, scope: ScopeRef) -> &mut ScopeData {
        &mut self.scopes[scope.0 as usize]
    }

    /// Own binding of a scope map, without interface fallthrough.
    pub(crate) fn map_own(&self, map: TypeRef, name: &str) -> Option<EntityInfo> {
        match &self.graph.node(map).data {
            TypeData::Map(shape) => shape.properties.borrow().get(&PropertyKey::name(name)).cloned(),
            _ => None,
        }
    }

    pub(crate) fn scope_set(&mut self, scope: ScopeRef, name: &str, ty: TypeRef) {
        let locals = self.scope(scope).locals;
        self.set_property(locals, PropertyKey::name(name), EntityInfo::new(name, ty));
    }

    pub(crate) fn scope_has_own(&self, scope: ScopeRef, name: &str) -> bool {
        self.map_own(self.scope(scope).locals, name).is_some()
    }

    /// Binding resolution through locals, outer chain and globals. No
    /// native fallback.
    pub(crate) fn scope_resolve_binding(
        &self,
        scope: ScopeRef,
        name: &str,
    ) -> Option<EntityInfo> {
        let data = self.scope(scope);
        if let Some(found) = self.map_own(data.locals, name) {
            return Some(found);
        }
        if let Some(outer) = data.outer {
            if let Some(found) = self.scope_resolve_binding(outer, name) {
                return Some(found);
            }
        }
        if data.globals != scope {
            let globals = self.scope(data.globals);
            if let Some(found) = self.map_own(globals.locals, name) {
                return Some(found);
            }
        }
        None
    }

    /// Full identifier resolution, ending at the document's `general`
    /// interface for native members.
    pub(crate) fn scope_resolve(&mut self, scope: ScopeRef, name: &str) -> Option<EntityInfo> {
        if let Some(found) = self.scope_resolve_binding(scope, name) {
            return Some(found);
        }
        let doc = self.scope(scope).doc;
        let general = self.lookup_interface(Some(doc), BaseType::General.id(), None)?;
        self.get_property(general, &PropertyKey::name(name))
    }

    /// Every identifier completable inside `scope`.
    pub(crate) fn scope_all_names(&self, scope: ScopeRef) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut current = Some(scope);
        while let Some(s) = current {
            let data = self.scope(s);
            if let TypeData::Map(shape) = &self.graph.node(data.locals).data {
                for key in shape.properties.borrow().keys() {
                    if let Some(name) = key.as_name() {
                        names.push(name.to_string());
                    }
                }
            }
            current = data.outer;
        }
        let globals = self.scope(scope).globals;
        if globals != scope {
            let locals = self.scope(globals).locals;
            if let TypeData::Map(shape) = &self.graph.node(locals).data {
                for key in shape.properties.borrow().keys() {
                    if let Some(name) = key.as_name() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        let doc = self.scope(scope).doc;
        if let Some(general) = self.lookup_interface(Some(doc), BaseType::General.id(), None) {
            names.extend(self.all_property_names(general));
        }
        for constant in ["self", "super", "globals", "outer", "locals"] {
            names.push(constant.to_string());
        }
        names.sort();
        names.dedup();
        names
    }
}
