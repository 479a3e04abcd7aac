//! Layered type storage.
//!
//! One global storage carries the native catalogue, every analyzed
//! document gets its own layer on top. Lookups walk the document layer
//! first and fall through to global, so a document can shadow a native
//! interface without other documents noticing.

use rill_common::Span;
use rustc_hash::FxHashMap;

use crate::document::DocRef;
use crate::ty::{TypeKind, TypeRef};
use crate::TypeManager;

/// One storage layer: interface registry, key type registry and the
/// scratch memory consumers can pin types into.
#[derive(Clone, Debug)]
pub struct StorageData {
    /// Layer label used in minted ids, the document name or `global`.
    pub label: String,
    pub type_interfaces: FxHashMap<String, TypeRef>,
    pub key_types: FxHashMap<String, TypeRef>,
    pub memory: FxHashMap<String, TypeRef>,
    counter: u64,
}

impl StorageData {
    pub fn new(label: impl Into<String>) -> Self {
        StorageData {
            label: label.into(),
            type_interfaces: FxHashMap::default(),
            key_types: FxHashMap::default(),
            memory: FxHashMap::default(),
            counter: 0,
        }
    }

    /// Mints a storage unique type id, qualified by the originating node
    /// when one exists.
    pub fn mint_id(&mut self, kind: TypeKind, origin: Option<(&str, Span)>) -> String {
        self.counter += 1;
        let tag = kind_tag(kind);
        match origin {
            Some((label, span)) => {
                format!("{tag}-{}-{}-<{label}:{span}>", self.label, self.counter)
            }
            None => format!("{tag}-{}-{}-<virtual>", self.label, self.counter),
        }
    }
}

fn kind_tag(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Base => "base",
        TypeKind::Key => "key",
        TypeKind::Map => "map",
        TypeKind::List => "list",
        TypeKind::Class => "class",
        TypeKind::Function => "function",
        TypeKind::Union => "union",
        TypeKind::Unknown => "unknown",
    }
}

impl TypeManager {
    pub(crate) fn storage(&self, doc: Option<DocRef>) -> &StorageData {
        match doc {
            Some(d) => &self.documents[d.0 as usize].storage,
            None => &self.global,
        }
    }

    pub(crate) fn storage_mut(&mut self, doc: Option<DocRef>) -> &mut StorageData {
        match doc {
            Some(d) => &mut self.documents[d.0 as usize].storage,
            None => &mut self.global,
        }
    }

    pub(crate) fn mint_id(
        &mut self,
        doc: Option<DocRef>,
        kind: TypeKind,
        origin: Option<(&str, Span)>,
    ) -> String {
        self.storage_mut(doc).mint_id(kind, origin)
    }

    /// Looks up a registered interface, document layer first. `exclude`
    /// lets a proxy resolve past itself to its global counterpart.
    pub(crate) fn lookup_interface(
        &self,
        doc: Option<DocRef>,
        id: &str,
        exclude: Option<TypeRef>,
    ) -> Option<TypeRef> {
        if let Some(d) = doc {
            if let Some(found) = self.documents[d.0 as usize].storage.type_interfaces.get(id) {
                if Some(*found) != exclude {
                    return Some(*found);
                }
            }
        }
        self.global
            .type_interfaces
            .get(id)
            .copied()
            .filter(|found| Some(*found) != exclude)
    }

    /// Canonical key type node for an id, document layer first.
    pub(crate) fn lookup_key_type(&self, doc: Option<DocRef>, id: &str) -> Option<TypeRef> {
        if let Some(d) = doc {
            if let Some(found) = self.documents[d.0 as usize].storage.key_types.get(id) {
                return Some(*found);
            }
        }
        self.global.key_types.get(id).copied()
    }

    /// Registers a nominal type. A colliding id augments the existing
    /// interface instead of replacing it, so later declarations add
    /// members to earlier ones. Returns the canonical node for the id.
    pub(crate) fn register_interface(
        &mut self,
        doc: Option<DocRef>,
        id: &str,
        ty: TypeRef,
    ) -> TypeRef {
        if let Some(existing) = self.storage(doc).type_interfaces.get(id).copied() {
            if existing != ty {
                let mut seen = FxHashMap::default();
                self.merge_into(ty, existing, &mut seen);
            }
            return existing;
        }
        self.storage_mut(doc)
            .type_interfaces
            .insert(id.to_string(), ty);
        ty
    }

    pub(crate) fn register_key_type(&mut self, doc: Option<DocRef>, id: &str, ty: TypeRef) {
        self.storage_mut(doc).key_types.insert(id.to_string(), ty);
    }

    /// Pins a type under a consumer chosen key in the scratch memory of
    /// a storage layer.
    pub fn set_memory(&mut self, document: Option<&str>, key: &str, ty: TypeRef) {
        let doc = document.and_then(|name| self.document_by_name(name));
        self.storage_mut(doc).memory.insert(key.to_string(), ty);
    }

    pub fn get_memory(&self, document: Option<&str>, key: &str) -> Option<TypeRef> {
        let doc = document.and_then(|name| self.document_by_name(name));
        if let Some(found) = self.storage(doc).memory.get(key) {
            return Some(*found);
        }
        if doc.is_some() {
            return self.global.memory.get(key).copied();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{EntityInfo, PropertyKey};
    use rill_ast::AstBuilder;
    use std::sync::Arc;

    #[test]
    fn minted_ids_are_layer_qualified_and_unique() {
        let mut storage = StorageData::new("main");
        let first = storage.mint_id(TypeKind::Map, None);
        let second = storage.mint_id(
            TypeKind::Map,
            Some(("MapConstructor", Span::on_line(3, 0, 2))),
        );
        assert_eq!(first, "map-main-1-<virtual>");
        assert_eq!(second, "map-main-2-<MapConstructor:3:0-3:2>");
        assert_ne!(storage.mint_id(TypeKind::Map, None), first);
    }

    #[test]
    fn colliding_interfaces_augment_the_existing_one() {
        let mut mgr = TypeManager::default();
        let doc = mgr.register_document("main", Arc::new(AstBuilder::new().build()));
        let ctx = crate::graph::TypeContext::in_doc(doc);
        let custom = mgr.class_type(&ctx, "string", None);
        let number = mgr.base_type(&ctx, "number");
        mgr.set_property(
            custom,
            PropertyKey::name("extra"),
            EntityInfo::new("extra", number),
        );
        let canonical = mgr.register_interface(Some(doc), "string", custom);

        // The seeded proxy stays canonical and absorbs the new members.
        assert_ne!(canonical, custom);
        assert_eq!(
            mgr.lookup_interface(Some(doc), "string", None),
            Some(canonical)
        );
        assert!(mgr
            .get_property(canonical, &PropertyKey::name("extra"))
            .is_some());

        // `exclude` still resolves past the document layer.
        let past = mgr.lookup_interface(Some(doc), "string", Some(canonical));
        assert!(past.is_some());
        assert_ne!(past, Some(canonical));
    }

    #[test]
    fn memory_falls_through_to_the_global_layer() {
        let mut mgr = TypeManager::default();
        let doc = mgr.register_document("main", Arc::new(AstBuilder::new().build()));
        let ctx = crate::graph::TypeContext::in_doc(doc);
        let number = mgr.base_type(&ctx, "number");
        let string = mgr.base_type(&ctx, "string");
        mgr.set_memory(None, "shared", number);
        mgr.set_memory(Some("main"), "shared", string);
        assert_eq!(mgr.get_memory(Some("main"), "shared"), Some(string));
        assert_eq!(mgr.get_memory(None, "shared"), Some(number));
        let _ = doc;
    }
}
