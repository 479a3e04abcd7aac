//! Native catalogue and storage seeding.
//!
//! The global storage carries one interface class per base type, built
//! from a [`Container`] of signatures. Every analyzed document gets
//! thin proxy classes on top so script code can extend `string` or
//! `map` without leaking into other documents, plus persistent casting
//! intrinsics (`funcRef`, `map`, `list`, `number`, `string`) whose
//! return types point at the document's own proxies.

use rill_meta::{
    BaseType, Container, FnArg, FunctionSignature, Signature, SignatureDef, TypeMeta, NIL_TYPE_ID,
};

use crate::document::DocRef;
use crate::error::TypeError;
use crate::graph::TypeContext;
use crate::ty::{EntityInfo, PropertyKey, TypeData, TypeRef};
use crate::TypeManager;

/// Intrinsics whose return type is pinned per document.
const PERSISTENT_INTRINSICS: [(&str, BaseType); 5] = [
    ("funcRef", BaseType::Function),
    ("map", BaseType::Map),
    ("list", BaseType::List),
    ("number", BaseType::Number),
    ("string", BaseType::String),
];

fn fun(
    owner: &str,
    name: &str,
    args: Vec<FnArg>,
    returns: Vec<TypeMeta>,
) -> (String, SignatureDef) {
    let signature = FunctionSignature::native(format!("{owner}.{name}"), args, returns);
    (name.to_string(), SignatureDef::Function(signature))
}

fn arg(label: &str, ty: &str) -> FnArg {
    FnArg::required(label, vec![TypeMeta::parse(ty)])
}

fn opt(label: &str, ty: &str) -> FnArg {
    FnArg::optional(label, vec![TypeMeta::parse(ty)])
}

fn ret(ty: &str) -> Vec<TypeMeta> {
    vec![TypeMeta::parse(ty)]
}

fn ret2(a: &str, b: &str) -> Vec<TypeMeta> {
    vec![TypeMeta::parse(a), TypeMeta::parse(b)]
}

/// Catalogue of the runtime members the analyzer assumes.
pub fn default_container() -> Container {
    let mut container = Container::default();

    let general = [
        fun("general", "print", vec![opt("value", "any")], ret(NIL_TYPE_ID)),
        fun(
            "general",
            "hasIndex",
            vec![arg("value", "any"), arg("index", "any")],
            ret2("number", NIL_TYPE_ID),
        ),
        fun("general", "len", vec![arg("value", "any")], ret("number")),
        fun(
            "general",
            "range",
            vec![arg("from", "number"), opt("to", "number"), opt("step", "number")],
            ret("list<number>"),
        ),
        fun("general", "funcRef", vec![], ret("function")),
        fun("general", "map", vec![], ret("map<any,any>")),
        fun("general", "list", vec![], ret("list<any>")),
        fun("general", "number", vec![], ret("number")),
        fun("general", "string", vec![], ret("string")),
    ];
    let mut signature = Signature::default();
    for (name, def) in general {
        signature.definitions.insert(name, def);
    }
    container.insert(BaseType::General.id(), signature);

    let string = [
        fun("string", "len", vec![], ret("number")),
        fun("string", "hasIndex", vec![arg("index", "number")], ret2("number", NIL_TYPE_ID)),
        fun("string", "indexOf", vec![arg("value", "string")], ret2("number", NIL_TYPE_ID)),
        fun("string", "split", vec![arg("delimiter", "string")], ret("list<string>")),
        fun(
            "string",
            "replace",
            vec![arg("needle", "string"), arg("replacement", "string")],
            ret("string"),
        ),
        fun("string", "upper", vec![], ret("string")),
        fun("string", "lower", vec![], ret("string")),
        fun("string", "values", vec![], ret("list<string>")),
    ];
    let mut signature = Signature::default();
    for (name, def) in string {
        signature.definitions.insert(name, def);
    }
    container.insert(BaseType::String.id(), signature);

    let list = [
        fun("list", "len", vec![], ret("number")),
        fun("list", "hasIndex", vec![arg("index", "number")], ret2("number", NIL_TYPE_ID)),
        fun("list", "indexOf", vec![arg("value", "any")], ret2("number", NIL_TYPE_ID)),
        fun("list", "push", vec![arg("value", "any")], ret("list<any>")),
        fun("list", "pop", vec![], ret("any")),
        fun("list", "pull", vec![], ret("any")),
        fun("list", "join", vec![opt("delimiter", "string")], ret("string")),
        fun("list", "sum", vec![], ret("number")),
    ];
    let mut signature = Signature::default();
    for (name, def) in list {
        signature.definitions.insert(name, def);
    }
    container.insert(BaseType::List.id(), signature);

    let map = [
        fun("map", "hasIndex", vec![arg("index", "any")], ret2("number", NIL_TYPE_ID)),
        fun("map", "indexes", vec![], ret("list<any>")),
        fun("map", "values", vec![], ret("list<any>")),
        fun("map", "remove", vec![arg("index", "any")], ret("number")),
        fun("map", "len", vec![], ret("number")),
    ];
    let mut signature = Signature::default();
    for (name, def) in map {
        signature.definitions.insert(name, def);
    }
    container.insert(BaseType::Map.id(), signature);

    let number = [fun("number", "sign", vec![], ret("number"))];
    let mut signature = Signature::default();
    for (name, def) in number {
        signature.definitions.insert(name, def);
    }
    container.insert(BaseType::Number.id(), signature);

    container.insert(BaseType::Function.id(), Signature::default());
    container.insert(BaseType::Any.id(), Signature::default());

    container
}

impl TypeManager {
    /// Materializes the catalogue into the global storage. Fails when a
    /// base type has no signature at all.
    pub(crate) fn seed_global(&mut self) -> Result<(), TypeError> {
        for base in BaseType::ALL {
            if self.container.signature(base.id()).is_none() {
                return Err(TypeError::MissingNativeType { type_id: base.id() });
            }
        }
        let ctx = TypeContext::default();
        for base in BaseType::ALL {
            let inherit = match base {
                BaseType::General | BaseType::Any => None,
                _ => Some(BaseType::General.id()),
            };
            let class = self.class_type(&ctx, base.id(), inherit);
            self.register_interface(None, base.id(), class);
            self.key_type_for(None, base.id());
        }
        self.key_type_for(None, NIL_TYPE_ID);
        for base in BaseType::ALL {
            let class = match self.lookup_interface(None, base.id(), None) {
                Some(class) => class,
                None => continue,
            };
            let signature = match self.container.signature(base.id()) {
                Some(signature) => signature.clone(),
                None => continue,
            };
            for (name, def) in &signature.definitions {
                self.insert_definition(class, name, def);
            }
        }
        self.seed_any_sink();
        Ok(())
    }

    /// The global `any` class mirrors every native member so untyped
    /// values still complete.
    fn seed_any_sink(&mut self) {
        let Some(any) = self.lookup_interface(None, BaseType::Any.id(), None) else {
            return;
        };
        for base in BaseType::ALL {
            if base == BaseType::Any {
                continue;
            }
            let Some(class) = self.lookup_interface(None, base.id(), None) else {
                continue;
            };
            let snapshot: Vec<_> = match &self.graph.node(class).data {
                TypeData::Class(shape) => shape
                    .properties
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                _ => continue,
            };
            if let TypeData::Class(shape) = self.graph.node(any).data.clone() {
                for (key, info) in snapshot {
                    shape.properties.borrow_mut().entry(key).or_insert(info);
                }
            }
        }
    }

    /// Turns one catalogue definition into a member of `class`.
    pub(crate) fn insert_definition(&mut self, class: TypeRef, name: &str, def: &SignatureDef) {
        let doc = self.graph.node(class).doc;
        let ctx = TypeContext {
            doc,
            ..TypeContext::default()
        };
        let ty = match def {
            SignatureDef::Function(signature) => self.function_type(&ctx, signature.clone()),
            SignatureDef::Value { ty, .. } => self.type_from_meta(&ctx, ty),
        };
        if let TypeData::Class(shape) = self.graph.node(class).data.clone() {
            shape
                .properties
                .borrow_mut()
                .insert(PropertyKey::name(name), EntityInfo::new(name, ty));
        }
    }

    /// Installs the proxy layer of a freshly registered document.
    pub(crate) fn seed_document(&mut self, doc: DocRef) {
        let ctx = TypeContext::in_doc(doc);
        for base in BaseType::ALL {
            let proxy = self.class_type(&ctx, base.id(), Some(base.id()));
            self.register_interface(Some(doc), base.id(), proxy);
        }
        self.pin_persistent_intrinsics(doc);
    }

    /// Casting intrinsics return the document's own proxy class and do
    /// so without copying, so members added to e.g. `string` later are
    /// visible through `"".string` style round trips.
    fn pin_persistent_intrinsics(&mut self, doc: DocRef) {
        let Some(general) = self.lookup_interface(Some(doc), BaseType::General.id(), None) else {
            return;
        };
        if self.graph.node(general).doc != Some(doc) {
            return;
        }
        let ctx = TypeContext::in_doc(doc);
        for (name, base) in PERSISTENT_INTRINSICS {
            let Some(target) = self.lookup_interface(Some(doc), base.id(), None) else {
                continue;
            };
            let signature = match self
                .container
                .signature(BaseType::General.id())
                .and_then(|s| s.definitions.get(name))
            {
                Some(SignatureDef::Function(signature)) => signature.clone(),
                _ => continue,
            };
            let intrinsic = self.function_type(&ctx, signature);
            if let TypeData::Function(shape) = &mut self.graph.node_mut(intrinsic).data {
                shape.return_type = Some(target);
                shape.persistent = true;
            }
            if let TypeData::Class(shape) = self.graph.node(general).data.clone() {
                shape
                    .properties
                    .borrow_mut()
                    .insert(PropertyKey::name(name), EntityInfo::new(name, intrinsic));
            }
        }
    }
}
