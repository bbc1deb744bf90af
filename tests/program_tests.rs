// Integration tests for the code half of the language

use lexa::interpreter::config::EngineConfig;
use lexa::interpreter::engine::Engine;
use lexa::interpreter::errors::RuntimeError;
use lexa::memory::value::Value;
use pretty_assertions::assert_eq;

fn engine(source: &str) -> Engine {
    Engine::from_source(source, EngineConfig::default()).expect("Parsing failed")
}

/// Run a program and render the value of its last expression statement
fn run(source: &str) -> String {
    let mut engine = engine(source);
    let result = engine.run().expect("Execution failed");
    engine.format_value(&result)
}

fn run_err(source: &str, config: EngineConfig) -> RuntimeError {
    let mut engine = Engine::from_source(source, config).expect("Parsing failed");
    engine.run().expect_err("Execution should fail")
}

#[test]
fn test_simple_arithmetic() {
    assert_eq!(run("let x = 5; let y = 10; x + y * 2;"), "25");
    assert_eq!(run("7 / 2;"), "3");
    assert_eq!(run("7 % 3;"), "1");
    assert_eq!(run("7.0 / 2;"), "3.5");
    assert_eq!(run(r#""ab" + "cd";"#), "abcd");
}

#[test]
fn test_function_call() {
    let source = r#"
        fn add(a, b) {
            return a + b;
        }
        add(3, 4) * 2;
    "#;
    assert_eq!(run(source), "14");
}

#[test]
fn test_recursion() {
    let source = r#"
        fn fib(n) {
            if (n < 2) {
                return n;
            }
            return fib(n - 1) + fib(n - 2);
        }
        fib(15);
    "#;
    assert_eq!(run(source), "610");
}

#[test]
fn test_function_without_return_yields_nil() {
    assert_eq!(run("fn noop() { let x = 1; } noop();"), "nil");
}

#[test]
fn test_loops_break_and_continue() {
    let source = r#"
        let total = 0;
        for x in 10 {
            if (x == 7) {
                break;
            }
            if (x % 2 == 0) {
                continue;
            }
            total = total + x;
        }
        let n = 0;
        while (true) {
            n = n + 1;
            if (n >= 4) {
                break;
            }
        }
        [total, n];
    "#;
    assert_eq!(run(source), "[9, 4]");
}

#[test]
fn test_return_from_inside_loop() {
    let source = r#"
        fn find(items, wanted) {
            let i = 0;
            for item in items {
                if (item == wanted) {
                    return i;
                }
                i = i + 1;
            }
            return -1;
        }
        [find([4, 5, 6], 6), find([4, 5, 6], 9)];
    "#;
    assert_eq!(run(source), "[2, -1]");
}

#[test]
fn test_closures_share_their_scope() {
    let source = r#"
        fn counter() {
            let n = 0;
            return fn() {
                n = n + 1;
                return n;
            };
        }
        let c = counter();
        c();
        c();
        c();
    "#;
    assert_eq!(run(source), "3");
}

#[test]
fn test_print_writes_output() {
    let mut engine = engine(r#"print("a", 1); print([1, "x"], {k: true});"#);
    engine.run().expect("Execution failed");
    assert_eq!(engine.output(), vec!["a 1".to_string(), r#"[1, "x"] {k: true}"#.to_string()]);
}

#[test]
fn test_collections() {
    let source = r#"
        let m = map();
        m["b"] = 2;
        m["a"] = 1;
        insert(m, "c", 3);
        remove(m, "b");
        let s = set(1, 2, 2, 3);
        let o = {x: 1};
        o.y = 2;
        [keys(m), len(s), contains(s, 2), contains(m, "b"), keys(o), o.x + o.y];
    "#;
    assert_eq!(run(source), r#"[["a", "c"], 3, true, false, ["x", "y"], 3]"#);
}

#[test]
fn test_type_and_conversions() {
    let source = r#"[type(1), type(1.5), type("s"), type([]), int("42"), str(12), float(2)];"#;
    assert_eq!(run(source), r#"["int", "float", "string", "list", 42, "12", 2.0]"#);
}

#[test]
fn test_copy_shares_until_written() {
    let source = r#"
        let a = [[1]];
        let b = copy(a);
        push(b[0], 2);
        push(b, 3);
        [len(a), len(a[0]), len(b), equals(a[0], b[0])];
    "#;
    assert_eq!(run(source), "[1, 2, 2, true]");
}

#[test]
fn test_freeze_is_shallow() {
    let source = r#"
        let f = freeze([[1]]);
        push(f[0], 5);
        let g = copy(f);
        push(g, 7);
        [is_frozen(f), is_frozen(f[0]), is_frozen(g), is_frozen(3), len(f), len(f[0]), len(g)];
    "#;
    assert_eq!(run(source), "[true, false, false, false, 1, 2, 2]");
}

#[test]
fn test_frozen_value_rejects_writes() {
    let err = run_err("let f = freeze([1]); push(f, 2);", EngineConfig::default());
    assert!(matches!(err, RuntimeError::FrozenModification { .. }), "{:?}", err);

    let err = run_err("let o = freeze({a: 1}); o.a = 2;", EngineConfig::default());
    assert!(matches!(err, RuntimeError::FrozenModification { .. }), "{:?}", err);
}

#[test]
fn test_undefined_variable() {
    let err = run_err("let x = y + 1;", EngineConfig::default());
    assert!(matches!(err, RuntimeError::UndefinedVariable { ref name, .. } if name == "y"), "{:?}", err);

    let err = run_err("z = 1;", EngineConfig::default());
    assert!(matches!(err, RuntimeError::UndefinedVariable { .. }), "{:?}", err);
}

#[test]
fn test_control_flow_outside_its_construct() {
    let err = run_err("return 1;", EngineConfig::default());
    assert!(matches!(err, RuntimeError::InvalidControlFlow { statement: "return", .. }), "{:?}", err);

    let err = run_err("fn f() { break; } f();", EngineConfig::default());
    assert!(matches!(err, RuntimeError::InvalidControlFlow { statement: "break", .. }), "{:?}", err);
}

#[test]
fn test_division_by_zero() {
    let err = run_err("1 / 0;", EngineConfig::default());
    assert!(matches!(err, RuntimeError::DivisionError { .. }), "{:?}", err);
}

#[test]
fn test_frame_limit() {
    let config = EngineConfig {
        max_frames: 64,
        ..EngineConfig::default()
    };
    let err = run_err("fn f(n) { return f(n + 1); } f(0);", config);
    assert!(matches!(err, RuntimeError::FrameLimitExceeded { .. }), "{:?}", err);
}

#[test]
fn test_step_limit() {
    let config = EngineConfig {
        max_steps: Some(500),
        ..EngineConfig::default()
    };
    let err = run_err("while (true) {}", config);
    assert!(matches!(err, RuntimeError::StepLimitExceeded { .. }), "{:?}", err);
}

#[test]
fn test_engine_recovers_after_fault() {
    let mut engine = engine("let x = 1; fn bump() { x = x + 1; missing(); } fn get() { return x; }");
    engine.run().expect("Execution failed");
    assert!(engine.call("bump", vec![]).is_err());
    assert_eq!(engine.frame_depth(), 0);
    // writes made before the fault are kept
    assert_eq!(engine.call("get", vec![]).unwrap(), Value::Int(2));
}

#[test]
fn test_parse_errors() {
    for source in ["let = 1;", "fn f( { }", r#"rule R = ("a";"#, "let x = 1"] {
        assert!(
            Engine::from_source(source, EngineConfig::default()).is_err(),
            "{:?} should not parse",
            source
        );
    }
}

#[test]
fn test_call_from_host() {
    let mut engine = engine(r#"fn double(x) { return x * 2; } rule R = "a"+;"#);
    assert_eq!(engine.call("double", vec![Value::Int(21)]).unwrap(), Value::Int(42));

    let node = engine
        .call("match", vec![Value::str("R"), Value::str("aab")])
        .unwrap();
    assert_eq!(engine.format_value(&node), r#"R("aa")"#);
    let miss = engine
        .call("match", vec![Value::str("R"), Value::str("b")])
        .unwrap();
    assert_eq!(miss, Value::Nil);
}

#[test]
fn test_match_inside_program() {
    let source = r#"
        rule Digit = [0-9];
        rule Number = Digit+;
        let n = match(Number, "123x");
        let miss = match(Number, "x");
        [n.text, len(n), n.to, miss];
    "#;
    assert_eq!(run(source), r#"["123", 3, 3, nil]"#);
}

#[test]
fn test_gc_reclaims_dropped_trees() {
    let mut engine = engine(
        r#"
        rule Word = [a-z]+;
        rule Words = (Word " "?)+;
        let t = match(Words, "ab cd ef");
        fn drop() { t = nil; }
    "#,
    );
    engine.run().expect("Execution failed");
    let alive = engine.heap().stats().live_handles;

    engine.call("drop", vec![]).expect("Call failed");
    engine.call("gc", vec![]).expect("Call failed");
    let after = engine.heap().stats().live_handles;
    // the root and its three children
    assert!(after + 4 <= alive, "{} live before, {} after", alive, after);
}

#[test]
fn test_repeated_matches_stay_bounded() {
    let config = EngineConfig {
        gc_threshold: 64,
        ..EngineConfig::default()
    };
    let mut engine = Engine::from_source(
        r#"
        rule A = "a" ("b" | "c")*;
        let i = 0;
        while (i < 200) {
            match(A, "abcbc");
            i = i + 1;
        }
    "#,
        config,
    )
    .expect("Parsing failed");
    engine.run().expect("Execution failed");
    // dead nodes and states are recycled while the loop runs
    let peak = engine.heap().stats();
    assert!(peak.cells < 500 && peak.handles < 500, "{:?}", peak);

    engine.collect_garbage();
    let stats = engine.heap().stats();
    assert!(stats.live_handles < 100, "{:?}", stats);
    assert!(stats.cells < 200 && stats.handles < 200, "{:?}", stats);
}

#[test]
fn test_long_loop_reuses_heap_cells() {
    let mut engine = engine(
        r#"
        let i = 0;
        while (i < 2000) {
            let t = [i];
            i = i + 1;
        }
    "#,
    );
    engine.run().expect("Execution failed");
    let stats = engine.heap().stats();
    assert!(stats.cells < 100, "{:?}", stats);
    assert!(stats.handles < 100, "{:?}", stats);
}
