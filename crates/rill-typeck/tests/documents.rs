use rill_ast::AstBuilder;
use rill_typeck::{CompletionItemKind, DocRef, TypeError, TypeManager};

fn describe_path(manager: &mut TypeManager, doc: DocRef, path: &str) -> String {
    let ty = manager
        .resolve_path(doc, path)
        .unwrap_or_else(|| panic!("path `{path}` did not resolve"));
    manager.describe(ty)
}

#[test]
fn define_tag_overrides_the_inferred_type() {
    let mut b = AstBuilder::new();
    b.comment("// @define {string|number}");
    let value = b.number(1.0);
    let target = b.ident("flexible");
    b.assign(target, value);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "flexible"), "string|number");
}

#[test]
fn param_and_return_tags_enrich_the_signature() {
    let mut b = AstBuilder::new();
    b.comment("// @param {number} x");
    b.comment("// @return {string}");
    let target = b.ident("render");
    let f = b.begin_function();
    b.param("x");
    let x = b.ident("x");
    b.ret(Some(x));
    b.end_function();
    b.assign(target, f);
    let base = b.ident("render");
    let argument = b.number(2.0);
    let call = b.call(base, vec![argument]);
    let result = b.ident("label");
    b.assign(result, call);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "label"), "string");
}

#[test]
fn default_parameter_feeds_the_return_assumption() {
    let mut b = AstBuilder::new();
    let target = b.ident("scale");
    let f = b.begin_function();
    let five = b.number(5.0);
    b.param_default("factor", five);
    let factor = b.ident("factor");
    b.ret(Some(factor));
    b.end_function();
    b.assign(target, f);
    let value = b.ident("scale");
    let result = b.ident("scaled");
    b.assign(result, value);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "scaled"), "number");
}

#[test]
fn type_block_turns_a_map_literal_into_fields() {
    let mut b = AstBuilder::new();
    b.comment("// @type Point");
    b.comment("// @property {number} x");
    b.comment("// @property {number} y");
    let map = b.map(vec![]);
    let target = b.ident("origin");
    b.assign(target, map);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "origin.x"), "number");
    assert_eq!(describe_path(&mut manager, doc, "origin.y"), "number");
}

#[test]
fn vtype_block_declares_a_type_without_a_value() {
    let mut b = AstBuilder::new();
    b.comment("// @vtype Service");
    b.comment("// @property {string} host");
    b.comment("// @method fetch(path: string): number");
    b.newline();
    b.comment("// @define {Service}");
    let value = b.number(0.0);
    let target = b.ident("svc");
    b.assign(target, value);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "svc.host"), "string");
    assert_eq!(describe_path(&mut manager, doc, "svc.fetch"), "function");
}

#[test]
fn method_bodies_see_their_owner_through_self() {
    let mut b = AstBuilder::new();
    let map = b.map(vec![]);
    let target = b.ident("obj");
    b.assign(target, map);
    let base = b.ident("obj");
    let target = b.member(base, "init");
    let f = b.begin_function();
    let sbase = b.ident("self");
    let starget = b.member(sbase, "tag");
    let value = b.string("ready");
    b.assign(starget, value);
    b.end_function();
    b.assign(target, f);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "obj.tag"), "string");
}

#[test]
fn function_locals_stay_out_of_the_globals() {
    let mut b = AstBuilder::new();
    let value = b.string("outer");
    let target = b.ident("x");
    b.assign(target, value);
    let target = b.ident("f");
    let f = b.begin_function();
    let value = b.number(1.0);
    let inner = b.ident("x");
    b.assign(inner, value);
    let value = b.number(2.0);
    let local = b.ident("hidden");
    b.assign(local, value);
    b.end_function();
    b.assign(target, f);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "x"), "string");
    assert!(manager.resolve_path(doc, "hidden").is_none());
}

#[test]
fn for_generic_over_a_list_binds_the_element() {
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let two = b.number(2.0);
    let list = b.list(vec![one, two]);
    let target = b.ident("nums");
    b.assign(target, list);
    let iterator = b.ident("nums");
    b.for_generic("n", iterator);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "n"), "number");
    assert_eq!(describe_path(&mut manager, doc, "__n_idx"), "number");
}

#[test]
fn for_generic_over_a_map_binds_key_value_pairs() {
    let mut b = AstBuilder::new();
    let key = b.string("a");
    let value = b.number(1.0);
    let map = b.map(vec![(key, value)]);
    let target = b.ident("table");
    b.assign(target, map);
    let iterator = b.ident("table");
    b.for_generic("entry", iterator);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "entry.key"), "string");
    assert_eq!(describe_path(&mut manager, doc, "entry.value"), "number");
}

#[test]
fn imports_bind_as_unknown_until_merged() {
    let mut b = AstBuilder::new();
    b.import("net", "./net.src");

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "net"), "unknown");
}

#[test]
fn completions_carry_bindings_natives_and_constants() {
    let mut b = AstBuilder::new();
    let value = b.number(8080.0);
    let target = b.ident("port");
    b.assign(target, value);
    let cursor = b.ident("port");
    let result = b.ident("copy");
    b.assign(result, cursor);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    let names = manager.complete_at(doc, cursor);
    for expected in ["port", "print", "hasIndex", "range", "self", "globals"] {
        assert!(names.contains(&expected.to_string()), "missing `{expected}`");
    }
}

#[test]
fn namespace_resolution_reports_path_and_provenance() {
    let mut b = AstBuilder::new();
    let key = b.string("port");
    let value = b.number(8080.0);
    let map = b.map(vec![(key, value)]);
    let target = b.ident("config");
    b.assign(target, map);
    let base = b.ident("config");
    let member = b.member(base, "port");
    let result = b.ident("port");
    b.assign(result, member);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    let resolved = manager
        .resolve_namespace(doc, member, false)
        .expect("member should resolve");
    assert_eq!(resolved.path, "config.port");
    assert_eq!(manager.describe(resolved.ty), "number");
    assert!(!resolved.sources.is_empty());
    assert!(resolved.sources.iter().all(|s| s.document == "main"));
}

#[test]
fn assignment_queries_list_matching_definitions() {
    let mut b = AstBuilder::new();
    let value = b.number(1.0);
    let target = b.ident("counter");
    b.assign(target, value);
    let value = b.number(2.0);
    let target = b.ident("counter");
    b.assign(target, value);
    let usage = b.ident("counter");
    let result = b.ident("copy");
    b.assign(result, usage);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    let all = manager.resolve_all_assignments(doc, "count");
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|s| s.name == "counter"));
    let json = serde_json::to_value(&all).unwrap();
    assert_eq!(json[0]["name"], "counter");
    assert_eq!(json[0]["span"]["start"]["line"], 1);

    let available = manager.resolve_available_assignments(doc, usage);
    assert_eq!(available.len(), 2);
}

#[test]
fn assignment_without_an_origin_is_an_error() {
    let mut b = AstBuilder::new();
    let base = b.invalid();
    let target = b.member(base, "field");
    let value = b.number(1.0);
    b.assign(target, value);

    let mut manager = TypeManager::default();
    let err = manager.analyze("main", b.build()).unwrap_err();
    assert!(matches!(err, TypeError::NullAssignmentOrigin { .. }));
}

#[test]
fn string_members_resolve_through_the_native_interface() {
    let mut b = AstBuilder::new();
    let value = b.string("a,b");
    let target = b.ident("csv");
    b.assign(target, value);
    let base = b.ident("csv");
    let split = b.member(base, "split");
    let delimiter = b.string(",");
    let call = b.call(split, vec![delimiter]);
    let result = b.ident("parts");
    b.assign(result, call);
    let base = b.ident("parts");
    let join = b.member(base, "join");
    let call = b.call(join, vec![]);
    let result = b.ident("joined");
    b.assign(result, call);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "parts"), "list<string>");
    assert_eq!(describe_path(&mut manager, doc, "joined"), "string");
}

#[test]
fn function_bodies_see_bindings_defined_later_in_the_file() {
    let mut b = AstBuilder::new();
    let target = b.ident("report");
    let f = b.begin_function();
    let port = b.ident("port");
    b.ret(Some(port));
    b.end_function();
    b.assign(target, f);
    let value = b.number(8080.0);
    let target = b.ident("port");
    b.assign(target, value);
    let base = b.ident("report");
    let call = b.call(base, vec![]);
    let result = b.ident("seen");
    b.assign(result, call);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "seen"), "number");
}

#[test]
fn repeated_type_blocks_augment_the_interface() {
    let mut b = AstBuilder::new();
    b.comment("// @type Point");
    b.comment("// @property {number} x");
    let map = b.map(vec![]);
    let target = b.ident("first");
    b.assign(target, map);
    b.newline();
    b.comment("// @type Point");
    b.comment("// @property {number} y");
    let map = b.map(vec![]);
    let target = b.ident("second");
    b.assign(target, map);
    b.newline();
    b.comment("// @define {Point}");
    let value = b.number(0.0);
    let target = b.ident("p");
    b.assign(target, value);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "p.x"), "number");
    assert_eq!(describe_path(&mut manager, doc, "p.y"), "number");
}

#[test]
fn analysis_can_be_staged_in_two_phases() {
    let mut b = AstBuilder::new();
    let value = b.number(1.0);
    let target = b.ident("count");
    b.assign(target, value);

    let mut manager = TypeManager::default();
    let doc = manager.aggregate_scopes("main", b.build());
    assert!(manager.resolve_path(doc, "count").is_none());

    manager.aggregate_definitions(doc).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "count"), "number");

    // Resolved records are skipped on a second pass.
    manager.aggregate_definitions(doc).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "count"), "number");
}

#[test]
fn symbols_record_path_kind_and_provenance() {
    let mut b = AstBuilder::new();
    let map = b.map(vec![]);
    let target = b.ident("config");
    b.assign(target, map);
    let base = b.ident("config");
    let target = b.member(base, "port");
    let value = b.number(80.0);
    b.assign(target, value);
    let f = b.begin_function();
    b.end_function();
    let target = b.ident("run");
    b.assign(target, f);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();

    let port = manager.resolve_all_assignments(doc, "config.port");
    assert_eq!(port.len(), 1);
    assert_eq!(port[0].name, "port");
    assert_eq!(port[0].path, "config.port");
    assert_eq!(port[0].kind, CompletionItemKind::Property);
    assert_eq!(port[0].source, "main");

    let run = manager.resolve_all_assignments(doc, "run");
    assert_eq!(run.len(), 1);
    assert_eq!(run[0].kind, CompletionItemKind::Function);

    let bindings = manager.resolve_all_assignments(doc, "config");
    assert!(bindings
        .iter()
        .any(|s| s.path == "config" && s.kind == CompletionItemKind::MapConstructor));
}

#[test]
fn for_generic_over_a_string_yields_characters() {
    let mut b = AstBuilder::new();
    let value = b.string("abc");
    let target = b.ident("word");
    b.assign(target, value);
    let iterator = b.ident("word");
    b.for_generic("ch", iterator);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "ch"), "string");
}

#[test]
fn for_generic_over_a_union_iterates_each_variant() {
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let list = b.list(vec![one]);
    let target = b.ident("items");
    b.assign(target, list);
    let value = b.string("xy");
    let target = b.ident("items");
    b.assign(target, value);
    let iterator = b.ident("items");
    b.for_generic("item", iterator);

    let mut manager = TypeManager::default();
    let doc = manager.analyze("main", b.build()).unwrap();
    assert_eq!(describe_path(&mut manager, doc, "item"), "number|string");
}
