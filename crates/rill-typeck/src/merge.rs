//! Type and document merging.
//!
//! `merge_into` feeds the evidence one node gathered into another, the
//! mechanism behind unknown placeholders being absorbed by the first
//! real sighting of a value. Document merging rebuilds a document on
//! top of deep copied globals and interfaces of its dependencies,
//! optionally filtered through namespace mappings.

use rill_meta::BaseType;
use rustc_hash::FxHashMap;

use crate::document::DocRef;
use crate::error::TypeError;
use crate::graph::TypeContext;
use crate::ty::{EntityInfo, PropertyKey, TypeData, TypeRef};
use crate::TypeManager;

/// Selective re-export: bind `export_from` of the dependency under
/// `namespace` in the merged document.
#[derive(Clone, Debug)]
pub struct NamespaceMapping {
    pub export_from: String,
    pub namespace: String,
}

/// One dependency of a merge. Without mappings every global binding of
/// the dependency is imported wholesale.
#[derive(Clone, Debug)]
pub struct MergeItem {
    pub document: String,
    pub namespaces: Option<Vec<NamespaceMapping>>,
}

impl MergeItem {
    pub fn all(document: impl Into<String>) -> Self {
        MergeItem {
            document: document.into(),
            namespaces: None,
        }
    }

    pub fn select(document: impl Into<String>, namespaces: Vec<NamespaceMapping>) -> Self {
        MergeItem {
            document: document.into(),
            namespaces: Some(namespaces),
        }
    }
}

impl TypeManager {
    /// Feeds the evidence of `source` into `target`. Monotonic: nothing
    /// already known about `target` is lost. `seen` terminates cycles.
    pub(crate) fn merge_into(
        &mut self,
        source: TypeRef,
        target: TypeRef,
        seen: &mut FxHashMap<TypeRef, TypeRef>,
    ) {
        if source == target || seen.get(&source) == Some(&target) {
            return;
        }
        seen.insert(source, target);
        let sources = self.graph.node(source).source_map.clone();
        self.graph.node_mut(target).source_map.extend(&sources);
        let doc = self.graph.node(target).doc;
        match self.graph.node(source).data.clone() {
            TypeData::Unknown(shape) => {
                let snapshot: Vec<_> = shape
                    .properties
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, info) in snapshot {
                    self.set_property(target, key, info);
                }
                if let (Some(key), Some(value)) = (shape.key_type, shape.value_type) {
                    let key = PropertyKey::Key(self.key_id_of(key));
                    self.set_property(target, key.clone(), EntityInfo::new(key.to_string(), value));
                }
                if let Some(signature) = shape.signature {
                    if let TypeData::Unknown(t) = &mut self.graph.node_mut(target).data {
                        if t.signature.is_none() {
                            t.signature = Some(signature);
                        }
                    }
                }
            }
            TypeData::Map(shape) => {
                let snapshot: Vec<_> = shape
                    .properties
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, info) in snapshot {
                    self.set_property(target, key, info);
                }
                if let TypeData::Map(t) = self.graph.node(target).data.clone() {
                    let key = self.widen(doc, t.key_type, shape.key_type);
                    let value = self.widen(doc, t.value_type, shape.value_type);
                    if let TypeData::Map(t) = &mut self.graph.node_mut(target).data {
                        t.key_type = key;
                        t.value_type = value;
                    }
                }
            }
            TypeData::Class(shape) => {
                let snapshot: Vec<_> = shape
                    .properties
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, info) in snapshot {
                    self.set_property(target, key, info);
                }
                if let Some(source_map) = shape.associated_map {
                    let target_map = match &self.graph.node(target).data {
                        TypeData::Class(t) => Some(t.associated_map),
                        _ => None,
                    };
                    match target_map {
                        Some(Some(target_map)) => self.merge_into(source_map, target_map, seen),
                        Some(None) => {
                            if let TypeData::Class(t) = &mut self.graph.node_mut(target).data {
                                t.associated_map = Some(source_map);
                            }
                        }
                        None => {}
                    }
                }
            }
            TypeData::List(shape) => {
                if let TypeData::List(t) = self.graph.node(target).data.clone() {
                    let element = self.widen(doc, t.element_type, shape.element_type);
                    if let TypeData::List(t) = &mut self.graph.node_mut(target).data {
                        t.element_type = element;
                    }
                }
            }
            TypeData::Union { variants } => {
                for variant in variants {
                    self.merge_into(variant, target, seen);
                }
            }
            TypeData::Base | TypeData::Key { .. } | TypeData::Function(_) => {}
        }
    }

    /// Rebuilds `base` with the globals and interfaces of its
    /// dependencies imported, then re-analyzes it. Returns the merged
    /// document; the original stays untouched.
    pub fn merge_documents(
        &mut self,
        base: DocRef,
        externals: &[MergeItem],
    ) -> Result<DocRef, TypeError> {
        let name = self.documents[base.0 as usize].name.clone();
        let chunk = self.documents[base.0 as usize].chunk.clone();
        let merged = self.register_document(&name, chunk);
        for item in externals {
            let external =
                self.document_by_name(&item.document)
                    .filter(|d| *d != merged)
                    .ok_or_else(|| TypeError::UnknownDocument {
                        name: item.document.clone(),
                    })?;
            self.import_storage(external, merged);
            match &item.namespaces {
                None => self.import_all_globals(external, merged),
                Some(mappings) => self.import_namespaces(external, merged, mappings),
            }
        }
        self.aggregate_document(merged)?;
        Ok(merged)
    }

    /// User declared interfaces and key types of the dependency, deep
    /// copied into the merged document's layer.
    fn import_storage(&mut self, external: DocRef, merged: DocRef) {
        let ctx = TypeContext::in_doc(merged);
        let interfaces: Vec<(String, TypeRef)> = self.documents[external.0 as usize]
            .storage
            .type_interfaces
            .iter()
            .filter(|(id, _)| BaseType::from_id(id).is_none())
            .map(|(id, t)| (id.clone(), *t))
            .collect();
        for (id, ty) in interfaces {
            let mut seen = FxHashMap::default();
            let copied = self.deep_copy(ty, &ctx, &mut seen);
            self.register_interface(Some(merged), &id, copied);
        }
        let key_types: Vec<(String, TypeRef)> = self.documents[external.0 as usize]
            .storage
            .key_types
            .iter()
            .filter(|(id, _)| BaseType::from_id(id).is_none())
            .map(|(id, t)| (id.clone(), *t))
            .collect();
        for (id, ty) in key_types {
            let mut seen = FxHashMap::default();
            let copied = self.deep_copy(ty, &ctx, &mut seen);
            self.register_key_type(Some(merged), &id, copied);
        }
        let memory: Vec<(String, TypeRef)> = self.documents[external.0 as usize]
            .storage
            .memory
            .iter()
            .map(|(k, t)| (k.clone(), *t))
            .collect();
        for (key, ty) in memory {
            let mut seen = FxHashMap::default();
            let copied = self.deep_copy(ty, &ctx, &mut seen);
            self.storage_mut(Some(merged)).memory.insert(key, copied);
        }
    }

    fn import_all_globals(&mut self, external: DocRef, merged: DocRef) {
        let ctx = TypeContext::in_doc(merged);
        let external_globals = self.documents[external.0 as usize].globals;
        let merged_globals = self.documents[merged.0 as usize].globals;
        let locals = self.scope(external_globals).locals;
        let snapshot: Vec<(PropertyKey, EntityInfo)> = match &self.graph.node(locals).data {
            TypeData::Map(shape) => shape
                .properties
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        };
        let target = self.scope(merged_globals).locals;
        for (key, info) in snapshot {
            let mut seen = FxHashMap::default();
            let copied = self.deep_copy(info.ty, &ctx, &mut seen);
            self.set_property(target, key, EntityInfo::new(info.name, copied));
        }
    }

    fn import_namespaces(
        &mut self,
        external: DocRef,
        merged: DocRef,
        mappings: &[NamespaceMapping],
    ) {
        let ctx = TypeContext::in_doc(merged);
        for mapping in mappings {
            let Some(exported) = self.resolve_path(external, &mapping.export_from) else {
                continue;
            };
            let mut seen = FxHashMap::default();
            let copied = self.deep_copy(exported, &ctx, &mut seen);
            let target = {
                let globals = self.documents[merged.0 as usize].globals;
                self.scope(globals).locals
            };
            let segments: Vec<&str> = mapping.namespace.split('.').collect();
            let name = segments.last().copied().unwrap_or(mapping.namespace.as_str());
            self.set_property_in_path(target, &segments, EntityInfo::new(name, copied));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_evidence_feeds_the_target() {
        let mut mgr = TypeManager::default();
        let c = TypeContext::default();
        let unknown = mgr.unknown_type(&c);
        let number = mgr.base_type(&c, "number");
        mgr.set_property(unknown, PropertyKey::name("n"), EntityInfo::new("n", number));
        let map = mgr.map_type(&c);

        let mut seen = FxHashMap::default();
        mgr.merge_into(unknown, map, &mut seen);
        let hit = mgr.get_property(map, &PropertyKey::name("n"));
        assert_eq!(hit.map(|info| mgr.describe(info.ty)).as_deref(), Some("number"));
    }

    #[test]
    fn list_elements_widen_instead_of_overwriting() {
        let mut mgr = TypeManager::default();
        let c = TypeContext::default();
        let number = mgr.base_type(&c, "number");
        let string = mgr.base_type(&c, "string");
        let numbers = mgr.list_type(&c, number);
        let strings = mgr.list_type(&c, string);

        let mut seen = FxHashMap::default();
        mgr.merge_into(strings, numbers, &mut seen);
        let element = mgr
            .get_property(numbers, &PropertyKey::Key("number".to_string()))
            .map(|info| mgr.describe(info.ty));
        assert_eq!(element.as_deref(), Some("number|string"));
    }

    #[test]
    fn cyclic_merges_terminate() {
        let mut mgr = TypeManager::default();
        let c = TypeContext::default();
        let a = mgr.map_type(&c);
        let b = mgr.map_type(&c);
        mgr.set_property(a, PropertyKey::name("peer"), EntityInfo::new("peer", b));
        mgr.set_property(b, PropertyKey::name("peer"), EntityInfo::new("peer", a));

        let mut seen = FxHashMap::default();
        mgr.merge_into(a, b, &mut seen);
        assert!(mgr.get_property(b, &PropertyKey::name("peer")).is_some());
    }
}
