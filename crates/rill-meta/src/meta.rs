//! Structural type descriptions.

use std::fmt;

use serde::Serialize;

/// Nominal id of the nil type.
pub const NIL_TYPE_ID: &str = "null";
/// Nominal id assumed for values the analyzer has no evidence about.
pub const UNKNOWN_TYPE_ID: &str = "unknown";

/// Base types every document storage carries a native class for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseType {
    Any,
    General,
    Map,
    List,
    Number,
    String,
    Function,
}

impl BaseType {
    pub const ALL: [BaseType; 7] = [
        BaseType::Any,
        BaseType::General,
        BaseType::Map,
        BaseType::List,
        BaseType::Number,
        BaseType::String,
        BaseType::Function,
    ];

    pub fn id(self) -> &'static str {
        match self {
            BaseType::Any => "any",
            BaseType::General => "general",
            BaseType::Map => "map",
            BaseType::List => "list",
            BaseType::Number => "number",
            BaseType::String => "string",
            BaseType::Function => "function",
        }
    }

    pub fn from_id(id: &str) -> Option<BaseType> {
        Self::ALL.into_iter().find(|b| b.id() == id)
    }
}

/// Compact structural description of a type, detached from any graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TypeMeta {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<Box<TypeMeta>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<Box<TypeMeta>>,
}

impl TypeMeta {
    pub fn base(ty: impl Into<String>) -> Self {
        TypeMeta {
            ty: ty.into(),
            key_type: None,
            value_type: None,
        }
    }

    pub fn list(value: TypeMeta) -> Self {
        TypeMeta {
            ty: BaseType::List.id().to_string(),
            key_type: None,
            value_type: Some(Box::new(value)),
        }
    }

    pub fn map(key: TypeMeta, value: TypeMeta) -> Self {
        TypeMeta {
            ty: BaseType::Map.id().to_string(),
            key_type: Some(Box::new(key)),
            value_type: Some(Box::new(value)),
        }
    }

    pub fn unknown() -> Self {
        TypeMeta::base(UNKNOWN_TYPE_ID)
    }

    pub fn is_unknown(&self) -> bool {
        self.ty == UNKNOWN_TYPE_ID
    }

    /// Parses labels such as `string`, `list<number>` or
    /// `map<string,list<number>>`. Malformed input degrades to a plain
    /// base label.
    pub fn parse(raw: &str) -> TypeMeta {
        let raw = raw.trim();
        let Some(open) = raw.find('<') else {
            return TypeMeta::base(raw);
        };
        if !raw.ends_with('>') {
            return TypeMeta::base(raw);
        }
        let head = raw[..open].trim();
        let inner = &raw[open + 1..raw.len() - 1];
        match head {
            "list" => TypeMeta::list(TypeMeta::parse(inner)),
            "map" => match split_top_level(inner) {
                Some((key, value)) => TypeMeta::map(TypeMeta::parse(key), TypeMeta::parse(value)),
                None => TypeMeta::map(TypeMeta::base("any"), TypeMeta::parse(inner)),
            },
            _ => TypeMeta::base(head),
        }
    }
}

/// Splits `string,list<number>` at the comma outside any angle brackets.
fn split_top_level(inner: &str) -> Option<(&str, &str)> {
    let mut depth = 0u32;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((&inner[..i], &inner[i + 1..])),
            _ => {}
        }
    }
    None
}

impl fmt::Display for TypeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.key_type, &self.value_type) {
            (Some(key), Some(value)) => write!(f, "{}<{},{}>", self.ty, key, value),
            (None, Some(value)) => write!(f, "{}<{}>", self.ty, value),
            _ => f.write_str(&self.ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_nested_labels() {
        for label in ["string", "list<number>", "map<string,list<number>>"] {
            assert_eq!(TypeMeta::parse(label).to_string(), label);
        }
    }

    #[test]
    fn parse_tolerates_malformed_labels() {
        assert_eq!(TypeMeta::parse("list<number"), TypeMeta::base("list<number"));
        assert_eq!(TypeMeta::parse(" custom "), TypeMeta::base("custom"));
    }

    #[test]
    fn map_without_comma_assumes_any_key() {
        assert_eq!(
            TypeMeta::parse("map<number>"),
            TypeMeta::map(TypeMeta::base("any"), TypeMeta::base("number"))
        );
    }

    #[test]
    fn serializes_without_empty_slots() {
        let meta = TypeMeta::map(TypeMeta::base("string"), TypeMeta::list(TypeMeta::base("number")));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "map",
                "key_type": { "type": "string" },
                "value_type": { "type": "list", "value_type": { "type": "number" } },
            })
        );
        assert_eq!(
            serde_json::to_value(TypeMeta::base("null")).unwrap(),
            serde_json::json!({ "type": "null" })
        );
    }
}
