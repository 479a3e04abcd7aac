use rill_ast::{AstBuilder, BinaryOp};
use rill_typeck::{DocRef, TypeManager};

fn describe_path(manager: &mut TypeManager, doc: DocRef, path: &str) -> String {
    let ty = manager
        .resolve_path(doc, path)
        .unwrap_or_else(|| panic!("path `{path}` did not resolve"));
    manager.describe(ty)
}

#[test]
fn literal_assignments_bind_base_types() {
    let mut b = AstBuilder::new();
    let value = b.string("127.0.0.1");
    let target = b.ident("host");
    b.assign(target, value);
    let value = b.number(8080.0);
    let target = b.ident("port");
    b.assign(target, value);
    let value = b.boolean(true);
    let target = b.ident("tls");
    b.assign(target, value);
    let value = b.nil();
    let target = b.ident("session");
    b.assign(target, value);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    assert_eq!(describe_path(&mut manager, doc, "host"), "string");
    assert_eq!(describe_path(&mut manager, doc, "port"), "number");
    assert_eq!(describe_path(&mut manager, doc, "tls"), "number");
    assert_eq!(describe_path(&mut manager, doc, "session"), "null");
}

#[test]
fn reassignment_widens_into_a_union_once() {
    let mut b = AstBuilder::new();
    for _ in 0..2 {
        let value = b.number(1.0);
        let target = b.ident("x");
        b.assign(target, value);
        let value = b.string("s");
        let target = b.ident("x");
        b.assign(target, value);
    }

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    // Four assignments, two distinct types: the union stays flat and
    // deduplicated in first sighting order.
    assert_eq!(describe_path(&mut manager, doc, "x"), "number|string");
}

#[test]
fn map_literal_fields_and_aggregates_resolve() {
    let mut b = AstBuilder::new();
    let key = b.string("port");
    let value = b.number(8080.0);
    let map = b.map(vec![(key, value)]);
    let target = b.ident("config");
    b.assign(target, map);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    assert_eq!(describe_path(&mut manager, doc, "config"), "map<string,number>");
    assert_eq!(describe_path(&mut manager, doc, "config.port"), "number");
}

#[test]
fn empty_map_reads_as_any_until_evidence_lands() {
    let mut b = AstBuilder::new();
    let map = b.map(vec![]);
    let target = b.ident("bag");
    b.assign(target, map);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "bag"), "map<any,any>");
}

#[test]
fn property_write_on_scalar_converges_to_union_with_map() {
    let mut b = AstBuilder::new();
    let value = b.string("123");
    let target = b.ident("test");
    b.assign(target, value);
    let base = b.ident("test");
    let target = b.member(base, "foo");
    let value = b.number(123.0);
    b.assign(target, value);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    assert_eq!(
        describe_path(&mut manager, doc, "test"),
        "string|map<string,number>"
    );
}

#[test]
fn list_literals_fold_their_element_type() {
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let two = b.number(2.0);
    let list = b.list(vec![one, two]);
    let target = b.ident("nums");
    b.assign(target, list);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "nums"), "list<number>");
}

#[test]
fn member_access_on_missing_property_vivifies_unknown() {
    let mut b = AstBuilder::new();
    let map = b.map(vec![]);
    let target = b.ident("obj");
    b.assign(target, map);
    let base = b.ident("obj");
    let member = b.member(base, "ghost");
    let target = b.ident("got");
    b.assign(target, member);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    assert_eq!(describe_path(&mut manager, doc, "got"), "unknown");
    // The placeholder landed on the map itself, so later sightings
    // converge on one node.
    assert_eq!(describe_path(&mut manager, doc, "obj.ghost"), "unknown");
}

#[test]
fn computed_index_goes_through_key_types() {
    let mut b = AstBuilder::new();
    let map = b.map(vec![]);
    let target = b.ident("scores");
    b.assign(target, map);
    let base = b.ident("scores");
    let key = b.number(3.0);
    let target = b.index(base, key);
    let value = b.string("bronze");
    b.assign(target, value);
    let base = b.ident("scores");
    let key = b.number(7.0);
    let index = b.index(base, key);
    let target = b.ident("medal");
    b.assign(target, index);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "medal"), "string");
}

#[test]
fn comparison_and_logical_operators_yield_number() {
    let mut b = AstBuilder::new();
    let l = b.number(1.0);
    let r = b.string("a");
    let cmp = b.binary(BinaryOp::Less, l, r);
    let target = b.ident("ordered");
    b.assign(target, cmp);
    let l = b.boolean(true);
    let r = b.boolean(false);
    let and = b.logical(l, r);
    let target = b.ident("both");
    b.assign(target, and);
    let l = b.ident("ordered");
    let r = b.ident("both");
    let isa = b.isa(l, r);
    let target = b.ident("related");
    b.assign(target, isa);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "ordered"), "number");
    assert_eq!(describe_path(&mut manager, doc, "both"), "number");
    assert_eq!(describe_path(&mut manager, doc, "related"), "number");
}

#[test]
fn addition_prefers_strings_and_merges_maps() {
    let mut b = AstBuilder::new();
    let l = b.string("a");
    let r = b.number(1.0);
    let concat = b.binary(BinaryOp::Add, l, r);
    let target = b.ident("label");
    b.assign(target, concat);

    let k = b.string("x");
    let v = b.number(1.0);
    let left_map = b.map(vec![(k, v)]);
    let k = b.string("y");
    let v = b.string("s");
    let right_map = b.map(vec![(k, v)]);
    let merged = b.binary(BinaryOp::Add, left_map, right_map);
    let target = b.ident("merged");
    b.assign(target, merged);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "label"), "string");
    assert_eq!(describe_path(&mut manager, doc, "merged.x"), "number");
    assert_eq!(describe_path(&mut manager, doc, "merged.y"), "string");
}

#[test]
fn function_returns_are_assumed_from_the_body() {
    let mut b = AstBuilder::new();
    let target = b.ident("f");
    let f = b.begin_function();
    let one = b.number(1.0);
    b.ret(Some(one));
    b.end_function();
    b.assign(target, f);
    let call_base = b.ident("f");
    let result = b.ident("y");
    b.assign(result, call_base);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    // Referencing a function without `@` invokes it, while the binding
    // itself stays a function.
    assert_eq!(describe_path(&mut manager, doc, "y"), "number");
    assert_eq!(describe_path(&mut manager, doc, "f"), "function");
}

#[test]
fn reference_operator_hands_out_the_function_itself() {
    let mut b = AstBuilder::new();
    let target = b.ident("f");
    let f = b.begin_function();
    let one = b.number(1.0);
    b.ret(Some(one));
    b.end_function();
    b.assign(target, f);
    let base = b.ident("f");
    let reference = b.reference(base);
    let target = b.ident("g");
    b.assign(target, reference);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "g"), "function");
}

#[test]
fn native_has_index_resolves_uncalled_and_called() {
    let mut b = AstBuilder::new();
    let base = b.ident("hasIndex");
    let reference = b.reference(base);
    let target = b.ident("handle");
    b.assign(target, reference);
    let base = b.ident("hasIndex");
    let value = b.string("x");
    let index = b.number(1.0);
    let call = b.call(base, vec![value, index]);
    let target = b.ident("answer");
    b.assign(target, call);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    assert_eq!(describe_path(&mut manager, doc, "handle"), "function");
    assert_eq!(describe_path(&mut manager, doc, "answer"), "number|null");
}

#[test]
fn new_instances_resolve_through_isa() {
    let mut b = AstBuilder::new();
    let key = b.string("kind");
    let value = b.string("base");
    let map = b.map(vec![(key, value)]);
    let target = b.ident("Base");
    b.assign(target, map);
    let parent = b.ident("Base");
    let instance = b.new_instance(parent);
    let target = b.ident("child");
    b.assign(target, instance);
    let base = b.ident("child");
    let member = b.member(base, "kind");
    let target = b.ident("k");
    b.assign(target, member);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "k"), "string");
}

#[test]
fn cyclic_isa_chains_terminate() {
    let mut b = AstBuilder::new();
    let map = b.map(vec![]);
    let target = b.ident("a");
    b.assign(target, map);
    let map = b.map(vec![]);
    let target = b.ident("b");
    b.assign(target, map);
    let base = b.ident("a");
    let target = b.member(base, "__isa");
    let value = b.ident("b");
    b.assign(target, value);
    let base = b.ident("b");
    let target = b.member(base, "__isa");
    let value = b.ident("a");
    b.assign(target, value);
    let base = b.ident("a");
    let member = b.member(base, "missing");
    let target = b.ident("q");
    b.assign(target, member);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    // The lookup walks the cycle up to its depth bound, then degrades
    // to a vivified unknown instead of hanging.
    assert_eq!(describe_path(&mut manager, doc, "q"), "unknown");
}

#[test]
fn list_metas_export_one_shape_per_element_kind() {
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let name = b.string("a");
    let list = b.list(vec![one, name]);
    let target = b.ident("mixed");
    b.assign(target, list);
    let two = b.number(2.0);
    let list = b.list(vec![two]);
    let target = b.ident("plain");
    b.assign(target, list);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    let mixed = manager.resolve_path(doc, "mixed").unwrap();
    assert_eq!(manager.to_meta(mixed).len(), 2);
    assert_eq!(manager.describe(mixed), "list<number>|list<string>");

    let plain = manager.resolve_path(doc, "plain").unwrap();
    assert_eq!(manager.to_meta(plain).len(), 1);
    assert_eq!(manager.describe(plain), "list<number>");
}
