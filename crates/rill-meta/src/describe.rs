//! Doc comment tag parsing.
//!
//! Comments can steer the analyzer with a small tag language:
//!
//! * `@define {string|number}` overrides the inferred type of the
//!   assignment directly below the comment block.
//! * `@type Name` plus `@property {t} path.to.field` turns a map literal
//!   into a named interface.
//! * `@vtype Name` declares a type out of thin air, with `@property` and
//!   `@method` members.
//! * `@description`, `@param`, `@return` and `@example` enrich the
//!   signature of the function defined below the block.

use crate::meta::TypeMeta;
use crate::signature::{FnArg, FunctionSignature, SignatureDef};

#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescription {
    /// Dotted path relative to the described type.
    pub path: String,
    pub types: Vec<TypeMeta>,
}

/// Interface extracted from a `@type` comment block above a map literal.
#[derive(Clone, Debug, PartialEq)]
pub struct MapDescription {
    pub ty: String,
    pub extends: Option<String>,
    pub properties: Vec<PropertyDescription>,
}

/// Member of a virtual type declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualMember {
    pub name: String,
    pub def: SignatureDef,
}

/// Type declared by a `@vtype` comment block, without any backing value.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualTypeDescription {
    pub ty: String,
    pub extends: Option<String>,
    pub members: Vec<VirtualMember>,
}

/// Iterates `@tag rest` lines of a comment block.
fn tags(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines().filter_map(|line| {
        let line = line.trim().trim_start_matches('/').trim_start();
        let rest = line.strip_prefix('@')?;
        match rest.split_once(char::is_whitespace) {
            Some((tag, payload)) => Some((tag, payload.trim())),
            None => Some((rest, "")),
        }
    })
}

/// Parses `{string|list<number>}` at the front of `payload`, returning
/// the types and the remainder.
fn braced_types(payload: &str) -> Option<(Vec<TypeMeta>, &str)> {
    let rest = payload.strip_prefix('{')?;
    let close = rest.find('}')?;
    let types = rest[..close]
        .split('|')
        .map(|t| TypeMeta::parse(t))
        .collect::<Vec<_>>();
    if types.is_empty() {
        return None;
    }
    Some((types, rest[close + 1..].trim_start()))
}

fn types_of(payload: &str) -> Vec<TypeMeta> {
    payload
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split('|')
        .map(|t| TypeMeta::parse(t))
        .collect()
}

/// `@define` override for an assignment.
pub fn parse_assign_description(text: &str) -> Option<Vec<TypeMeta>> {
    for (tag, payload) in tags(text) {
        if tag == "define" {
            if let Some((types, _)) = braced_types(payload) {
                return Some(types);
            }
        }
    }
    None
}

/// `@type` interface attached to a map literal.
pub fn parse_map_description(text: &str) -> Option<MapDescription> {
    let mut ty = None;
    let mut extends = None;
    let mut properties = Vec::new();
    for (tag, payload) in tags(text) {
        match tag {
            "type" if !payload.is_empty() => ty = Some(payload.to_string()),
            "extends" if !payload.is_empty() => extends = Some(payload.to_string()),
            "property" => {
                if let Some((types, rest)) = braced_types(payload) {
                    if let Some(path) = rest.split_whitespace().next() {
                        properties.push(PropertyDescription {
                            path: path.to_string(),
                            types,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    Some(MapDescription {
        ty: ty?,
        extends,
        properties,
    })
}

/// `@vtype` standalone type declaration.
pub fn parse_virtual_type(text: &str) -> Option<VirtualTypeDescription> {
    let mut ty: Option<String> = None;
    let mut extends = None;
    let mut members = Vec::new();
    for (tag, payload) in tags(text) {
        match tag {
            "vtype" if !payload.is_empty() => ty = Some(payload.to_string()),
            "extends" if !payload.is_empty() => extends = Some(payload.to_string()),
            "property" => {
                if let Some((types, rest)) = braced_types(payload) {
                    if let Some(name) = rest.split_whitespace().next() {
                        let meta = types.into_iter().next().unwrap_or_else(TypeMeta::unknown);
                        members.push(VirtualMember {
                            name: name.to_string(),
                            def: SignatureDef::value(meta),
                        });
                    }
                }
            }
            "method" => {
                if let Some(member) = parse_method(ty.as_deref().unwrap_or(""), payload) {
                    members.push(member);
                }
            }
            _ => {}
        }
    }
    Some(VirtualTypeDescription {
        ty: ty?,
        extends,
        members,
    })
}

/// `name(label: type, other?: a|b): ret` method declarations.
fn parse_method(owner: &str, payload: &str) -> Option<VirtualMember> {
    let open = payload.find('(')?;
    let close = payload.find(')')?;
    let name = payload[..open].trim();
    if name.is_empty() || close < open {
        return None;
    }
    let mut arguments = Vec::new();
    let raw_args = &payload[open + 1..close];
    for raw in raw_args.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (label, types) = match raw.split_once(':') {
            Some((label, types)) => (label.trim(), types_of(types)),
            None => (raw, vec![TypeMeta::base("any")]),
        };
        match label.strip_suffix('?') {
            Some(label) => arguments.push(FnArg::optional(label, types)),
            None => arguments.push(FnArg::required(label, types)),
        }
    }
    let returns = match payload[close + 1..].trim_start().strip_prefix(':') {
        Some(rest) => {
            let rest = rest.trim();
            let head = rest.split_whitespace().next().unwrap_or(rest);
            types_of(head)
        }
        None => vec![TypeMeta::base("null")],
    };
    let mut signature = FunctionSignature::native(format!("{owner}.{name}"), arguments, returns);
    signature.origin = "virtual".to_string();
    Some(VirtualMember {
        name: name.to_string(),
        def: SignatureDef::Function(signature),
    })
}

/// Applies `@description`, `@param`, `@return` and `@example` tags to a
/// freshly inferred custom function signature.
pub fn enrich_function_signature(signature: &mut FunctionSignature, text: &str) {
    let mut returns = Vec::new();
    for (tag, payload) in tags(text) {
        match tag {
            "description" => {
                let merged = match signature.description.take() {
                    Some(existing) => format!("{existing}\n{payload}"),
                    None => payload.to_string(),
                };
                signature.description = Some(merged);
            }
            "param" => {
                if let Some((types, rest)) = braced_types(payload) {
                    if let Some(label) = rest.split_whitespace().next() {
                        if let Some(arg) =
                            signature.arguments.iter_mut().find(|a| a.label == label)
                        {
                            arg.types = types;
                        }
                    }
                }
            }
            "return" => {
                if let Some((types, _)) = braced_types(payload) {
                    returns.extend(types);
                }
            }
            "example" => signature.example.push(payload.to_string()),
            _ => {}
        }
    }
    if !returns.is_empty() {
        signature.returns = returns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_tag_overrides_with_a_union() {
        let types = parse_assign_description("// @define {string|number}").unwrap();
        assert_eq!(
            types,
            vec![TypeMeta::base("string"), TypeMeta::base("number")]
        );
        assert_eq!(parse_assign_description("// plain comment"), None);
    }

    #[test]
    fn map_description_collects_dotted_paths() {
        let text = "@type Vec2\n@extends map\n@property {number} pos.x\n@property {number} pos.y";
        let desc = parse_map_description(text).unwrap();
        assert_eq!(desc.ty, "Vec2");
        assert_eq!(desc.extends.as_deref(), Some("map"));
        assert_eq!(desc.properties.len(), 2);
        assert_eq!(desc.properties[0].path, "pos.x");
    }

    #[test]
    fn virtual_type_parses_methods() {
        let text = "@vtype Service\n@property {string} host\n@method fetch(path: string, retries?: number): map<string,any>|null";
        let desc = parse_virtual_type(text).unwrap();
        assert_eq!(desc.ty, "Service");
        assert_eq!(desc.members.len(), 2);
        let SignatureDef::Function(sig) = &desc.members[1].def else {
            panic!("expected a method");
        };
        assert_eq!(sig.arguments.len(), 2);
        assert!(sig.arguments[1].optional);
        assert_eq!(sig.returns.len(), 2);
    }

    #[test]
    fn enrichment_rewrites_params_and_returns() {
        let mut sig = FunctionSignature::custom(
            "custom-test",
            vec![FnArg::required("x", vec![TypeMeta::base("any")])],
        );
        enrich_function_signature(
            &mut sig,
            "@description adds one\n@param {number} x\n@return {number}",
        );
        assert_eq!(sig.description.as_deref(), Some("adds one"));
        assert_eq!(sig.arguments[0].types, vec![TypeMeta::base("number")]);
        assert_eq!(sig.returns, vec![TypeMeta::base("number")]);
        assert!(!sig.returns_unknown());
    }
}
