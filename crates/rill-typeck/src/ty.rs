//! Type graph node model.
//!
//! Every type the analyzer knows lives as a node in one arena owned by
//! the [`TypeManager`](crate::TypeManager). Nodes address each other by
//! [`TypeRef`]. Property tables are shared behind `Rc<RefCell<..>>`
//! because script maps have reference semantics: a plain copy of a map
//! binding must keep writing into the same property table, only a deep
//! copy detaches it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rill_common::Span;
use rill_meta::FunctionSignature;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::document::DocRef;
use crate::source_map::SourceMap;

/// Inheritance root property of class instances.
pub const ISA_PROPERTY: &str = "__isa";

/// Recursion guard for property lookups through `__isa` chains.
pub const MAX_DEPTH: u32 = 30;
/// Recursion guard for completion item collection.
pub const MAX_ALL_PROPERTIES_DEPTH: u32 = 10;
/// Recursion guard for meta export.
pub const MAX_TO_META_DEPTH: u32 = 3;
/// Union fan-out cap during meta export.
pub const TO_META_FANOUT: usize = 5;

/// Index of a node in the type graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeRef(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Base,
    Key,
    Map,
    List,
    Class,
    Function,
    Union,
    Unknown,
}

/// How a property slot is addressed: by name, or by the canonical id of
/// a key type for computed indexes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Name(String),
    Key(String),
}

impl PropertyKey {
    pub fn name(name: impl Into<String>) -> Self {
        PropertyKey::Name(name.into())
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PropertyKey::Name(name) => Some(name),
            PropertyKey::Key(_) => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Name(name) => f.write_str(name),
            PropertyKey::Key(id) => write!(f, "[{id}]"),
        }
    }
}

/// Named slot in a property table.
#[derive(Clone, Debug)]
pub struct EntityInfo {
    pub name: String,
    pub ty: TypeRef,
}

impl EntityInfo {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        EntityInfo {
            name: name.into(),
            ty,
        }
    }
}

/// Shared property table. Cloning the handle aliases, cloning the
/// contents detaches.
pub type SharedProps = Rc<RefCell<FxHashMap<PropertyKey, EntityInfo>>>;

pub fn new_props() -> SharedProps {
    Rc::new(RefCell::new(FxHashMap::default()))
}

#[derive(Clone, Debug)]
pub struct MapShape {
    pub properties: SharedProps,
    /// Aggregate union of every key ever written.
    pub key_type: TypeRef,
    /// Aggregate union of every value ever written.
    pub value_type: TypeRef,
    /// Scope local tables are maps too, but never leak into meta export.
    pub is_scope: bool,
}

#[derive(Clone, Debug)]
pub struct ListShape {
    pub element_type: TypeRef,
}

#[derive(Clone, Debug)]
pub struct ClassShape {
    pub properties: SharedProps,
    /// Map literal the interface was declared on, when it came from a
    /// `@type` comment block.
    pub associated_map: Option<TypeRef>,
}

#[derive(Clone, Debug)]
pub struct FunctionShape {
    pub signature: FunctionSignature,
    /// Receiver bound when the function was assigned into a map.
    pub context: Option<TypeRef>,
    /// Memoized return type.
    pub return_type: Option<TypeRef>,
    /// Persistent functions hand out their return type without copying.
    pub persistent: bool,
}

/// Evidence accumulated about a value nothing is known about yet.
#[derive(Clone, Debug)]
pub struct UnknownShape {
    pub key_type: Option<TypeRef>,
    pub value_type: Option<TypeRef>,
    pub properties: SharedProps,
    pub signature: Option<FunctionSignature>,
}

impl UnknownShape {
    pub fn empty() -> Self {
        UnknownShape {
            key_type: None,
            value_type: None,
            properties: new_props(),
            signature: None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum TypeData {
    Base,
    Key {
        /// Declared through a comment block rather than the catalogue.
        user_defined: bool,
    },
    Map(MapShape),
    List(ListShape),
    Class(ClassShape),
    Function(FunctionShape),
    Union {
        variants: Vec<TypeRef>,
    },
    Unknown(UnknownShape),
}

#[derive(Clone, Debug)]
pub struct TypeNode {
    /// Nominal id, `"string"`, `"null"`, a class name or a minted id.
    pub id: String,
    pub inherit_from: Option<String>,
    /// Owning document; `None` for the global storage layer.
    pub doc: Option<DocRef>,
    pub span: Option<Span>,
    pub source_map: SourceMap,
    pub data: TypeData,
}

impl TypeNode {
    pub fn kind(&self) -> TypeKind {
        match &self.data {
            TypeData::Base => TypeKind::Base,
            TypeData::Key { .. } => TypeKind::Key,
            TypeData::Map(_) => TypeKind::Map,
            TypeData::List(_) => TypeKind::List,
            TypeData::Class(_) => TypeKind::Class,
            TypeData::Function(_) => TypeKind::Function,
            TypeData::Union { .. } => TypeKind::Union,
            TypeData::Unknown(_) => TypeKind::Unknown,
        }
    }
}

/// What a completion consumer should render a resolved entity as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CompletionItemKind {
    Variable,
    Property,
    Function,
    Literal,
    Constant,
    Expression,
    MapConstructor,
    ListConstructor,
    InternalFunction,
    InternalProperty,
}
