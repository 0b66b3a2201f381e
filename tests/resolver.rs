use indoc::indoc;

use opal::frontend::ast::{BuiltinType, Node, NodeId, Pool, Type};
use opal::frontend::diagnostic::{E_UNRESOLVED_CALL, E_VOID_EXPRESSION};
use opal::frontend::lexer::Lexer;
use opal::frontend::parser::Parser;
use opal::sema::{BuildParams, Resolver};

fn params() -> BuildParams {
    BuildParams {
        max_rounds: 8,
        ..Default::default()
    }
}

fn parse(src: &str) -> (Pool, NodeId) {
    let mut pool = Pool::new();
    let file = pool.add_file("test.opal", src);
    let tokens = Lexer::new(src, file).lex_all();
    let mut parser = Parser::new(tokens, &mut pool, file);
    let module = parser.parse_module("test");
    assert!(
        parser.diags.is_empty(),
        "unexpected parse diagnostics: {:?}",
        parser.diags.items
    );
    (pool, module)
}

fn resolve_ok(src: &str) -> (Pool, NodeId) {
    let (mut pool, module) = parse(src);
    let mut resolver = Resolver::new(params());
    let outcome = resolver.run(&mut pool, module);
    assert!(
        outcome.is_ok(),
        "resolution failed: {:?}",
        resolver.diags.items
    );
    (pool, module)
}

fn resolve_err(src: &str) -> (Pool, Resolver) {
    let (mut pool, module) = parse(src);
    let mut resolver = Resolver::new(params());
    let outcome = resolver.run(&mut pool, module);
    assert!(outcome.is_err(), "expected resolution to fail");
    assert!(!resolver.diags.is_empty());
    (pool, resolver)
}

fn calls_named(pool: &Pool, root: NodeId, name: &str) -> Vec<NodeId> {
    pool.collect_subtree(root)
        .into_iter()
        .filter(|&id| matches!(pool.get(id), Node::FunctionCall(c) if c.name == name))
        .collect()
}

fn vars_with_prefix(pool: &Pool, root: NodeId, prefix: &str) -> Vec<NodeId> {
    pool.collect_subtree(root)
        .into_iter()
        .filter(
            |&id| matches!(pool.get(id), Node::VariableDecl(v) if v.name.starts_with(prefix)),
        )
        .collect()
}

fn local_named(pool: &Pool, root: NodeId, name: &str) -> NodeId {
    pool.collect_subtree(root)
        .into_iter()
        .find(|&id| matches!(pool.get(id), Node::VariableDecl(v) if v.name == name))
        .unwrap_or_else(|| panic!("no variable named {}", name))
}

fn class_named(pool: &Pool, root: NodeId, name: &str) -> NodeId {
    pool.module(root)
        .body
        .iter()
        .copied()
        .find(|&id| matches!(pool.get(id), Node::TypeDecl(t) if t.name == name))
        .unwrap_or_else(|| panic!("no class named {}", name))
}

fn int() -> Type {
    Type::Builtin(BuiltinType::Int)
}

#[test]
fn overload_resolution_picks_by_argument_type() {
    let (pool, root) = resolve_ok(indoc! {"
        f: func (x: Int) -> Int { return 0 }
        f: func (x: String) -> Int { return 1 }
        main: func {
            a := f(42)
            b := f(\"hi\")
        }
    "});
    let calls = calls_named(&pool, root, "f");
    assert_eq!(calls.len(), 2);
    let int_overload = pool.module(root).body[0];
    let string_overload = pool.module(root).body[1];
    let by_int = pool.call(calls[0]);
    let by_string = pool.call(calls[1]);
    assert_eq!(by_int.ref_, Some(int_overload));
    assert_eq!(by_string.ref_, Some(string_overload));
    assert!(by_int.ref_score >= 512);
    assert!(by_string.ref_score >= 512);
}

#[test]
fn optional_argument_is_appended_from_default() {
    let (pool, root) = resolve_ok(indoc! {"
        g: func (x: Int, y := 7)
        main: func {
            g(3)
        }
    "});
    let call = pool.call(calls_named(&pool, root, "g")[0]);
    assert_eq!(call.args.len(), 2);
    assert!(matches!(pool.get(call.args[0]), Node::IntLiteral { value: 3, .. }));
    assert!(matches!(pool.get(call.args[1]), Node::IntLiteral { value: 7, .. }));
}

#[test]
fn varargs_call_is_boxed_into_hoisted_structs() {
    let (pool, root) = resolve_ok(indoc! {"
        h: func (args: ...)
        main: func {
            h(1, \"a\", 2.0)
        }
    "});
    let pack = vars_with_prefix(&pool, root, "__va_args_");
    assert_eq!(pack.len(), 1);
    match &pool.var(pack[0]).ty {
        Some(Type::AnonStruct { types }) => {
            assert_eq!(types.len(), 6);
            assert_eq!(types[0], Type::Builtin(BuiltinType::Class));
            assert_eq!(types[1], int());
            assert_eq!(types[2], Type::Builtin(BuiltinType::Class));
            assert_eq!(types[3], Type::Builtin(BuiltinType::String));
            assert_eq!(types[5], Type::Builtin(BuiltinType::Float));
        }
        other => panic!("expected anonymous struct type, got {:?}", other),
    }

    let boxed: Vec<NodeId> = vars_with_prefix(&pool, root, "__va_")
        .into_iter()
        .filter(|&id| !pool.var(id).name.starts_with("__va_args_"))
        .collect();
    assert_eq!(boxed.len(), 1);
    let lit = pool.var(boxed[0]).expr.expect("vararg struct literal");
    match pool.get(lit) {
        Node::StructLiteral(s) => {
            assert_eq!(s.ty, Type::Builtin(BuiltinType::VarArgs));
            assert_eq!(s.values.len(), 3);
            assert!(matches!(pool.get(s.values[0]), Node::AddressOf(_)));
            assert!(matches!(pool.get(s.values[1]), Node::NullLiteral { .. }));
            assert!(matches!(pool.get(s.values[2]), Node::IntLiteral { value: 3, .. }));
        }
        other => panic!("expected struct literal, got {}", other.kind_name()),
    }

    let call = pool.call(calls_named(&pool, root, "h")[0]);
    assert_eq!(call.args.len(), 1);
    match pool.get(call.args[0]) {
        Node::VariableAccess(a) => assert_eq!(a.ref_, Some(boxed[0])),
        other => panic!("expected access to the vararg box, got {}", other.kind_name()),
    }
}

#[test]
fn generic_return_is_inferred_from_receiver() {
    let (pool, root) = resolve_ok(indoc! {"
        List: class <T> {
            get: func (i: Int) -> T { return null }
        }
        main: func {
            xs: List<Int>
            x := xs.get(0)
        }
    "});
    let call = pool.call(calls_named(&pool, root, "get")[0]);
    assert_eq!(call.return_type, Some(int()));
    assert!(call.type_args.is_empty());
    assert_eq!(pool.var(local_named(&pool, root, "x")).ty, Some(int()));
}

#[test]
fn implicit_conversion_applies_to_extern_targets() {
    let (pool, root) = resolve_ok(indoc! {"
        Url: class {
            as: func -> String { return \"u\" }
        }
        print: extern func (s: String)
        main: func {
            u: Url
            print(u)
        }
    "});
    let call = pool.call(calls_named(&pool, root, "print")[0]);
    assert_eq!(call.args.len(), 1);
    match pool.get(call.args[0]) {
        Node::Cast(c) => {
            assert_eq!(c.target, Type::Builtin(BuiltinType::String));
            assert!(c.conv.is_some());
        }
        other => panic!("expected conversion cast, got {}", other.kind_name()),
    }
    assert!(call.args_before_conversion.is_some());
}

#[test]
fn implicit_conversion_is_only_hinted_for_non_extern_targets() {
    let (_pool, resolver) = resolve_err(indoc! {"
        Url: class {
            as: func -> String { return \"u\" }
        }
        log: func (s: String) { }
        main: func {
            u: Url
            log(u)
        }
    "});
    let diag = &resolver.diags.items[0];
    assert_eq!(diag.code, Some(E_UNRESOLVED_CALL));
    let precisions = diag.precisions.join("\n");
    assert!(
        precisions.contains("implicit as"),
        "missing hint in: {}",
        precisions
    );
    assert!(precisions.contains("nearest match"));
}

#[test]
fn super_call_binds_this_and_forwards_arguments() {
    let (pool, root) = resolve_ok(indoc! {"
        A: class {
            init: func (x: Int) { }
        }
        B: class extends A {
            init: func (x: Int) {
                super()
            }
        }
    "});
    let a = class_named(&pool, root, "A");
    let b = class_named(&pool, root, "B");
    let a_init = pool.type_decl(a).functions[0];
    let b_init = pool.type_decl(b).functions[0];

    let call = pool.call(calls_named(&pool, root, "super")[0]);
    assert_eq!(call.ref_, Some(a_init));
    assert!(call.ref_score > 0);

    let receiver = call.expr.expect("super call receiver");
    match pool.get(receiver) {
        Node::VariableAccess(acc) => {
            assert_eq!(acc.ref_, pool.type_decl(a).this_decl);
        }
        other => panic!("expected this access, got {}", other.kind_name()),
    }
    assert_eq!(call.args.len(), 1);
    match pool.get(call.args[0]) {
        Node::VariableAccess(acc) => {
            assert_eq!(acc.ref_, Some(pool.func(b_init).args[0]));
        }
        other => panic!("expected forwarded argument, got {}", other.kind_name()),
    }
}

#[test]
fn inline_function_is_spliced_before_the_call() {
    let (pool, root) = resolve_ok(indoc! {"
        square: inline func (x: Int) -> Int { return x * x }
        main: func {
            y := square(5)
        }
    "});
    assert!(calls_named(&pool, root, "square").is_empty());
    let contexts: Vec<NodeId> = pool
        .collect_subtree(root)
        .into_iter()
        .filter(|&id| matches!(pool.get(id), Node::InlineContext(_)))
        .collect();
    assert_eq!(contexts.len(), 1);
    let y = pool.var(local_named(&pool, root, "y"));
    assert_eq!(y.ty, Some(int()));
    match pool.get(y.expr.expect("y initializer")) {
        Node::VariableAccess(a) => {
            let target = a.ref_.expect("return slot");
            assert!(pool.var(target).name.starts_with("__ret_"));
        }
        other => panic!("expected return-slot access, got {}", other.kind_name()),
    }
}

#[test]
fn interface_arguments_get_explicit_casts() {
    let (pool, root) = resolve_ok(indoc! {"
        Show: interface {
            show: func -> String
        }
        Point: class implements Show {
            show: func -> String { return \"p\" }
        }
        render: func (s: Show) { }
        main: func {
            p: Point
            render(p)
        }
    "});
    let call = pool.call(calls_named(&pool, root, "render")[0]);
    match pool.get(call.args[0]) {
        Node::Cast(c) => match &c.target {
            Type::Base { name, .. } => assert_eq!(name, "Show"),
            other => panic!("expected interface target, got {:?}", other),
        },
        other => panic!("expected interface cast, got {}", other.kind_name()),
    }
}

#[test]
fn namespace_and_static_calls_resolve() {
    let (pool, root) = resolve_ok(indoc! {"
        net: namespace {
            connect: func -> Int { return 1 }
        }
        Counter: class {
            make: static func -> Int { return 0 }
        }
        main: func {
            c := net.connect()
            n := Counter.make()
        }
    "});
    assert!(pool.call(calls_named(&pool, root, "connect")[0]).ref_score > 0);
    let make = pool.call(calls_named(&pool, root, "make")[0]);
    assert!(make.ref_score > 0);
    let counter = class_named(&pool, root, "Counter");
    let meta = pool.type_decl(counter).meta.expect("meta");
    assert_eq!(make.ref_, Some(pool.type_decl(meta).functions[0]));
    assert_eq!(pool.var(local_named(&pool, root, "c")).ty, Some(int()));
    assert_eq!(pool.var(local_named(&pool, root, "n")).ty, Some(int()));
}

#[test]
fn suffixed_overloads_disambiguate() {
    let (pool, root) = resolve_ok(indoc! {"
        greet~loud: func (s: String) -> String { return s }
        greet: func (s: String) -> String { return s }
        main: func {
            a := greet~loud(\"hi\")
            b := greet(\"hi\")
        }
    "});
    let loud = pool.module(root).body[0];
    let plain = pool.module(root).body[1];
    let calls = calls_named(&pool, root, "greet");
    assert_eq!(pool.call(calls[0]).ref_, Some(loud));
    assert_eq!(pool.call(calls[1]).ref_, Some(plain));
}

#[test]
fn unknown_call_gets_a_nearest_name_hint() {
    let (_pool, resolver) = resolve_err(indoc! {"
        greet: func (s: String) { }
        main: func {
            gret(\"hi\")
        }
    "});
    let diag = &resolver.diags.items[0];
    assert_eq!(diag.code, Some(E_UNRESOLVED_CALL));
    assert!(
        diag.precisions.join("\n").contains("greet"),
        "expected a suggestion, got: {:?}",
        diag.precisions
    );
}

#[test]
fn void_call_in_value_position_is_rejected() {
    let (_pool, resolver) = resolve_err(indoc! {"
        ping: func { }
        main: func {
            x := ping()
        }
    "});
    assert_eq!(resolver.diags.items[0].code, Some(E_VOID_EXPRESSION));
}

#[test]
fn generic_argument_is_boxed_and_type_args_recorded() {
    let (pool, root) = resolve_ok(indoc! {"
        identity: func <T> (value: T) -> T { return value }
        main: func {
            n := identity(42)
        }
    "});
    let call = pool.call(calls_named(&pool, root, "identity")[0]);
    assert_eq!(call.type_args, vec![int()]);
    match pool.get(call.args[0]) {
        Node::AddressOf(a) => {
            assert!(a.for_generics);
            match pool.get(a.inner) {
                Node::VariableAccess(acc) => {
                    let hoisted = acc.ref_.expect("hoisted literal");
                    assert!(pool.var(hoisted).name.starts_with("__gen_"));
                }
                other => panic!("expected hoisted access, got {}", other.kind_name()),
            }
        }
        other => panic!("expected generic boxing, got {}", other.kind_name()),
    }
    assert_eq!(call.return_type, Some(int()));
    assert_eq!(pool.var(local_named(&pool, root, "n")).ty, Some(int()));
}

#[test]
fn closure_return_type_feeds_generic_inference() {
    let (pool, root) = resolve_ok(indoc! {"
        apply: func <T> (fn: Func() -> T) -> T { return null }
        main: func {
            r := apply(func { return 7 })
        }
    "});
    let call = pool.call(calls_named(&pool, root, "apply")[0]);
    assert_eq!(call.return_type, Some(int()));
    assert_eq!(pool.var(local_named(&pool, root, "r")).ty, Some(int()));
}

#[test]
fn multi_return_call_in_value_position_is_unwrapped() {
    let (pool, root) = resolve_ok(indoc! {"
        pair: func -> (Int, String) { return null }
        consume: func (x: Int) { }
        main: func {
            consume(pair())
        }
    "});
    let consume = pool.call(calls_named(&pool, root, "consume")[0]);
    match pool.get(consume.args[0]) {
        Node::CommaSequence(seq) => {
            assert_eq!(seq.items.len(), 2);
            assert!(matches!(pool.get(seq.items[0]), Node::FunctionCall(_)));
            assert!(matches!(pool.get(seq.items[1]), Node::VariableAccess(_)));
        }
        other => panic!("expected unwrapped sequence, got {}", other.kind_name()),
    }
    let pair = pool.call(calls_named(&pool, root, "pair")[0]);
    assert_eq!(pair.return_args.len(), 1);
    assert!(pair.return_args[0].is_some());
}

#[test]
fn second_resolution_pass_is_idempotent() {
    let (mut pool, root) = parse(indoc! {"
        g: func (x: Int, y := 7)
        h: func (args: ...)
        main: func {
            g(3)
            h(1, 2)
        }
    "});
    let mut first = Resolver::new(params());
    assert!(first.run(&mut pool, root).is_ok());
    let nodes_after_first = pool.len();

    let mut second = Resolver::new(params());
    assert!(second.run(&mut pool, root).is_ok());
    assert_eq!(second.round, 1, "resolved AST must settle in one pass");
    assert_eq!(pool.len(), nodes_after_first, "no mutation on a settled AST");
}

#[test]
fn every_final_call_carries_ref_score_and_type() {
    let (pool, root) = resolve_ok(indoc! {"
        Url: class {
            as: func -> String { return \"u\" }
        }
        print: extern func (s: String)
        g: func (x: Int, y := 7) -> Int { return x }
        main: func {
            u: Url
            print(u)
            a := g(1)
        }
    "});
    for id in pool.collect_subtree(root) {
        if let Node::FunctionCall(c) = pool.get(id) {
            assert!(c.ref_.is_some(), "call `{}` lost its ref", c.name);
            assert!(c.ref_score > 0, "call `{}` lost its score", c.name);
            assert!(
                c.return_type.is_some(),
                "call `{}` lost its return type",
                c.name
            );
        }
    }
}
