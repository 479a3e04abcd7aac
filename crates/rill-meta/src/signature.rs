//! Native member signatures.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::meta::TypeMeta;

/// One declared argument of a native or documented function.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FnArg {
    pub label: String,
    pub types: Vec<TypeMeta>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl FnArg {
    pub fn required(label: impl Into<String>, types: Vec<TypeMeta>) -> Self {
        FnArg {
            label: label.into(),
            types,
            optional: false,
        }
    }

    pub fn optional(label: impl Into<String>, types: Vec<TypeMeta>) -> Self {
        FnArg {
            label: label.into(),
            types,
            optional: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionSignature {
    /// Unique id, compared for signature equality.
    pub id: String,
    /// `"native"` for catalogue members, `"custom"` for script functions.
    pub origin: String,
    pub arguments: Vec<FnArg>,
    pub returns: Vec<TypeMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub example: Vec<String>,
}

impl FunctionSignature {
    pub fn native(id: impl Into<String>, arguments: Vec<FnArg>, returns: Vec<TypeMeta>) -> Self {
        FunctionSignature {
            id: id.into(),
            origin: "native".to_string(),
            arguments,
            returns,
            description: None,
            example: Vec::new(),
        }
    }

    pub fn custom(id: impl Into<String>, arguments: Vec<FnArg>) -> Self {
        FunctionSignature {
            id: id.into(),
            origin: "custom".to_string(),
            arguments,
            returns: vec![TypeMeta::unknown()],
            description: None,
            example: Vec::new(),
        }
    }

    /// The declared returns are still the placeholder every custom
    /// function starts with.
    pub fn returns_unknown(&self) -> bool {
        matches!(self.returns.as_slice(), [meta] if meta.is_unknown())
    }
}

/// One named member of a [`Signature`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SignatureDef {
    Function(FunctionSignature),
    Value {
        #[serde(rename = "type")]
        ty: TypeMeta,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl SignatureDef {
    pub fn value(ty: TypeMeta) -> Self {
        SignatureDef::Value {
            ty,
            description: None,
        }
    }
}

/// Members declared for one type id.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Signature {
    pub definitions: FxHashMap<String, SignatureDef>,
}

impl Signature {
    pub fn with(mut self, name: impl Into<String>, def: SignatureDef) -> Self {
        self.definitions.insert(name.into(), def);
        self
    }
}

/// Signature catalogue grouped by type id. Base type ids carry the
/// native runtime members, the rest are user declared interfaces.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Container {
    pub types: FxHashMap<String, Signature>,
}

impl Container {
    pub fn signature(&self, type_id: &str) -> Option<&Signature> {
        self.types.get(type_id)
    }

    pub fn insert(&mut self, type_id: impl Into<String>, signature: Signature) {
        self.types.insert(type_id.into(), signature);
    }
}
