// Integration tests for pattern matching

use lexa::interpreter::config::EngineConfig;
use lexa::interpreter::engine::{Engine, MatchOutcome};
use lexa::memory::value::Value;
use pretty_assertions::assert_eq;

fn engine(source: &str) -> Engine {
    Engine::from_source(source, EngineConfig::default()).expect("Parsing failed")
}

/// Match and render the root node, `None` when the rule does not match
fn matched(engine: &mut Engine, rule: &str, text: &str) -> Option<String> {
    let outcome = engine.match_text(rule, text).expect("Match faulted");
    outcome.node().map(|node| engine.format_value(&Value::Handle(node)))
}

#[test]
fn test_literal_advances_cursor() {
    let mut engine = engine(r#"rule R = "test";"#);
    let outcome = engine.match_text("R", "test").expect("Match faulted");
    let node = outcome.node().expect("Expected a match");

    let heap = engine.heap();
    let obj = heap.get(node).unwrap();
    let node = obj.as_node().unwrap();
    assert_eq!(node.from, 0);
    assert_eq!(node.to, 4);
    assert_eq!(node.text(), "test");
}

#[test]
fn test_match_is_a_prefix_match() {
    let mut engine = engine(r#"rule R = "ab"; rule Whole = "ab" $;"#);
    assert_eq!(matched(&mut engine, "R", "abc"), Some(r#"R("ab")"#.to_string()));
    assert_eq!(matched(&mut engine, "Whole", "abc"), None);
    assert_eq!(matched(&mut engine, "Whole", "ab"), Some(r#"Whole("ab")"#.to_string()));
}

#[test]
fn test_insensitive_literal() {
    let mut engine = engine(r#"rule Loose = "test"/i; rule Strict = "test";"#);
    assert_eq!(matched(&mut engine, "Loose", "TEST"), Some(r#"Loose("TEST")"#.to_string()));
    assert_eq!(matched(&mut engine, "Strict", "TEST"), None);
}

#[test]
fn test_insensitive_group_applies_to_members() {
    let mut engine = engine(r#"rule R = ("ab" [c-d])/i;"#);
    assert_eq!(matched(&mut engine, "R", "ABD"), Some(r#"R("ABD")"#.to_string()));
}

#[test]
fn test_exact_quantifier() {
    let mut engine = engine(r#"rule R = "a"{5};"#);
    assert_eq!(matched(&mut engine, "R", "aaaaaa"), Some(r#"R("aaaaa")"#.to_string()));
    assert_eq!(matched(&mut engine, "R", "aaaa"), None);
}

#[test]
fn test_bounded_quantifiers() {
    let mut engine = engine(r#"rule Most = "a"{1,2}; rule Least = "a"{1,3}?; rule Open = "a"{2,};"#);
    assert_eq!(matched(&mut engine, "Most", "aaaa"), Some(r#"Most("aa")"#.to_string()));
    assert_eq!(matched(&mut engine, "Least", "aaa"), Some(r#"Least("a")"#.to_string()));
    assert_eq!(matched(&mut engine, "Open", "aaaa"), Some(r#"Open("aaaa")"#.to_string()));
    assert_eq!(matched(&mut engine, "Open", "a"), None);
}

#[test]
fn test_invalid_quantifier_bounds() {
    let err = Engine::from_source(r#"rule R = "a"{3,1};"#, EngineConfig::default()).unwrap_err();
    assert!(err.message.contains("Invalid quantifier bounds"), "{}", err.message);
}

#[test]
fn test_quantified_group_in_any_order() {
    let mut engine = engine(r#"rule R = << "a"{1}, "b"?, "c"{1,2} >>;"#);
    let outcome = engine.match_text("R", "cacb").expect("Match faulted");
    let node = outcome.node().expect("Expected a match");
    assert_eq!(engine.heap().get(node).unwrap().as_node().unwrap().to, 4);

    assert_eq!(matched(&mut engine, "R", "ac"), Some(r#"R("ac")"#.to_string()));
    // "a" is required
    assert_eq!(matched(&mut engine, "R", "ccb"), None);
}

#[test]
fn test_quantified_group_total_bound() {
    let mut engine = engine(r#"rule R = << "a"*, "b"* >>{2,3};"#);
    assert_eq!(matched(&mut engine, "R", "babab"), Some(r#"R("bab")"#.to_string()));
    assert_eq!(matched(&mut engine, "R", "a"), None);
}

#[test]
fn test_ordered_choice_prefers_first_alternative() {
    let mut engine = engine(r#"rule R = x:("a" | "ab");"#);
    assert_eq!(matched(&mut engine, "R", "ab"), Some(r#"R("a")[x("a")]"#.to_string()));
}

#[test]
fn test_failure_after_group_retries_next_alternative() {
    let mut engine = engine(r#"rule R = ("a" | "ab") "c";"#);
    assert_eq!(matched(&mut engine, "R", "abc"), Some(r#"R("abc")"#.to_string()));
}

#[test]
fn test_non_backtracking_group_keeps_first_choice() {
    let mut engine = engine(r#"rule R = ({prop !backtrack} "a" | "ab") "c";"#);
    assert_eq!(matched(&mut engine, "R", "abc"), None);
    assert_eq!(matched(&mut engine, "R", "ac"), Some(r#"R("ac")"#.to_string()));
}

#[test]
fn test_greedy_quantifier_gives_back() {
    let mut engine = engine(r#"rule R = a:"a"* "a";"#);
    assert_eq!(matched(&mut engine, "R", "aaa"), Some(r#"R("aaa")[a("aa")]"#.to_string()));
}

#[test]
fn test_long_greedy_run_gives_back_one_unit_at_a_time() {
    let mut engine = engine(r#"rule R = "a"* "b";"#);
    let text = "a".repeat(5000);
    assert_eq!(engine.match_text("R", &text).unwrap(), MatchOutcome::NoMatch);
    assert_eq!(engine.heap().stats().generations, 1);

    let text = format!("{}b", text);
    assert!(engine.match_text("R", &text).unwrap().is_match());
    assert_eq!(engine.choice_count(), 0);
}

#[test]
fn test_lazy_quantifier_takes_least() {
    let mut engine = engine(r#"rule Short = a:"a"*? "a"; rule Grow = a:"a"*? "b";"#);
    assert_eq!(matched(&mut engine, "Short", "aaa"), Some(r#"Short("a")[a("")]"#.to_string()));
    assert_eq!(matched(&mut engine, "Grow", "aab"), Some(r#"Grow("aab")[a("aa")]"#.to_string()));
}

#[test]
fn test_atomic_quantifier_refuses_to_give_back() {
    let mut engine = engine(r#"rule Atomic = "a"*+ "a"; rule Greedy = "a"* "a";"#);
    assert_eq!(matched(&mut engine, "Atomic", "aaa"), None);
    assert!(engine.match_text("Greedy", "aaa").unwrap().is_match());
}

#[test]
fn test_negation_consumes_nothing() {
    let mut engine = engine(r#"rule R = !"b" .;"#);
    assert_eq!(matched(&mut engine, "R", "a"), Some(r#"R("a")"#.to_string()));
    assert_eq!(matched(&mut engine, "R", "b"), None);
}

#[test]
fn test_negation_leaves_no_trace() {
    let mut engine = engine(
        r#"
        let hits = 0;
        rule Guarded = !(x:"a" %{ hits = hits + 1; } "z") "a";
        rule Blocked = !("a" %{ hits = hits + 1; }) .;
    "#,
    );
    assert_eq!(matched(&mut engine, "Guarded", "ab"), Some(r#"Guarded("a")"#.to_string()));
    assert_eq!(matched(&mut engine, "Blocked", "a"), None);
    assert_eq!(engine.global("hits"), Some(Value::Int(0)));
}

#[test]
fn test_executor_effects_roll_back_with_alternative() {
    let mut engine = engine(
        r#"
        let count = 0;
        let seen = [];
        rule R = %{ count = count + 1; push(seen, "x"); } "x" | %{ push(seen, "y"); } "y";
    "#,
    );
    assert_eq!(matched(&mut engine, "R", "y"), Some(r#"R("y")"#.to_string()));
    assert_eq!(engine.global("count"), Some(Value::Int(0)));

    let seen = engine.global("seen").unwrap();
    assert_eq!(engine.format_value(&seen), r#"["y"]"#);
}

#[test]
fn test_executor_guard() {
    let mut engine = engine(
        r#"
        let ran = false;
        let armed = false;
        rule R = %(armed) { ran = true; } "a";
    "#,
    );
    assert!(engine.match_text("R", "a").unwrap().is_match());
    assert_eq!(engine.global("ran"), Some(Value::Bool(false)));
}

#[test]
fn test_failed_match_restores_heap() {
    let mut engine = engine(
        r#"
        let i = 0;
        rule R = %{ while (i < 10) { [i]; i = i + 1; } } "x" | "y";
    "#,
    );
    engine.run().expect("Execution failed");
    assert!(engine.match_text("R", "y").unwrap().is_match());
    assert_eq!(engine.global("i"), Some(Value::Int(0)));
    let before = engine.heap().stats();

    assert_eq!(engine.match_text("R", "z").unwrap(), MatchOutcome::NoMatch);

    let after = engine.heap().stats();
    assert_eq!(after.generations, before.generations);
    assert_eq!(after.cells, before.cells);
    assert_eq!(after.handles, before.handles);
    assert_eq!(after.live_cells, before.live_cells);
    assert_eq!(after.live_handles, before.live_handles);
    assert_eq!(engine.choice_count(), 0);

    for _ in 0..100 {
        assert!(!engine.match_text("R", "z").unwrap().is_match());
    }
    assert_eq!(engine.heap().stats().cells, before.cells);
    assert_eq!(engine.heap().stats().handles, before.handles);
}

#[test]
fn test_reverse_text_looks_behind_the_cursor() {
    let mut engine = engine(r#"rule R = "abc" x:"bc"/r "bc"; rule Start = "b"/r;"#);
    assert_eq!(matched(&mut engine, "R", "abc"), Some(r#"R("abc")[x("bc")]"#.to_string()));
    // nothing lies behind the start of the input
    assert_eq!(matched(&mut engine, "Start", "b"), None);
}

#[test]
fn test_reverse_class_and_any() {
    let mut engine = engine(r#"rule C = "xy" c:[a-z]/r "y"; rule D = "ab" d:./r "b";"#);
    assert_eq!(matched(&mut engine, "C", "xy"), Some(r#"C("xy")[c("y")]"#.to_string()));
    assert_eq!(matched(&mut engine, "D", "ab"), Some(r#"D("ab")[d("b")]"#.to_string()));
}

#[test]
fn test_reverse_is_inherited_through_groups() {
    let mut engine = engine(
        r#"
        rule G = "abc" x:("bc")/r "bc";
        rule Seq = "ab" y:("b" "a")/r "ab";
        rule Back = "ab" ("ab" $)/r;
        rule Mixed = "ab" ("b" ({prop !reverse} "b"))/r;
    "#,
    );
    assert_eq!(matched(&mut engine, "G", "abc"), Some(r#"G("abc")[x("bc")]"#.to_string()));
    assert_eq!(matched(&mut engine, "Seq", "ab"), Some(r#"Seq("ab")[y("ab")]"#.to_string()));
    // `$` in reverse is the start of the input
    assert_eq!(matched(&mut engine, "Back", "ab"), Some(r#"Back("")"#.to_string()));
    assert_eq!(matched(&mut engine, "Mixed", "ab"), Some(r#"Mixed("ab")"#.to_string()));
}

#[test]
fn test_reverse_bytes() {
    let mut engine = engine(r#"rule P = 0x4142 (0x42)/r 0x42;"#);
    assert!(engine.match_bytes("P", &[0x41, 0x42]).unwrap().is_match());
    assert!(!engine.match_bytes("P", &[0x41, 0x43]).unwrap().is_match());
}

#[test]
fn test_rule_references_nest_nodes() {
    let mut engine = engine(
        r#"
        rule Word = [a-z]+;
        fragment Space = " "+;
        rule Words = Word (Space Word)*;
    "#,
    );
    assert_eq!(
        matched(&mut engine, "Words", "ab  cd"),
        Some(r#"Words("ab  cd")[Word("ab"), Word("cd")]"#.to_string())
    );
}

#[test]
fn test_recursive_rule() {
    let mut engine = engine(r#"rule Parens = "(" Parens? ")";"#);
    assert_eq!(
        matched(&mut engine, "Parens", "(())"),
        Some(r#"Parens("(())")[Parens("()")]"#.to_string())
    );
    assert_eq!(matched(&mut engine, "Parens", "(()"), None);
}

#[test]
fn test_group_properties() {
    let mut engine = engine(
        r#"
        rule Number = ({prop name = "digits", kind = "int", signed = false} [0-9]+);
        let n = match(Number, "42");
        [n.children[0].kind, n.children[0].signed, n.children[0].text];
    "#,
    );
    let result = engine.run().expect("Execution failed");
    assert_eq!(engine.format_value(&result), r#"["int", false, "42"]"#);
}

#[test]
fn test_group_node_records_header_flags() {
    let mut engine = engine(
        r#"
        rule R = "ab" ({prop name = "tail", !backtrack} "b")/r;
        let n = match(R, "ab");
        let t = n.children[0];
        [t.capture, t.consume, t.backtrack, t.insensitive, t.reverse, t.text];
    "#,
    );
    let result = engine.run().expect("Execution failed");
    assert_eq!(engine.format_value(&result), r#"[true, true, false, false, true, "b"]"#);
}

#[test]
fn test_non_consuming_group_keeps_text() {
    let mut engine = engine(r#"rule R = ({prop name = "peek", !consume} "ab") "a";"#);
    assert_eq!(
        matched(&mut engine, "R", "ab"),
        Some(r#"R("a")[peek("ab")]"#.to_string())
    );
}

#[test]
fn test_addition_creates_zero_width_node() {
    let mut engine = engine(
        r#"
        rule R = "a" ^marker(fn(n) { n.note = "added"; }) "b";
        let r = match(R, "ab");
        let m = r.children[0];
        [m.name, m.from, m.to, m.note];
    "#,
    );
    let result = engine.run().expect("Execution failed");
    assert_eq!(engine.format_value(&result), r#"["marker", 1, 1, "added"]"#);
}

#[test]
fn test_filters_match_children() {
    let mut engine = engine(
        r#"
        rule Word = [a-z]+;
        rule Words = (Word " "?)+;
        rule Pair = @Word @Word $;
        rule Long = @Word(fn(n) { return len(n.text) > 2; });
        rule Anything = @* @*;

        let tree = match(Words, "ab cde");
        [match_tree(Pair, tree) != nil, match_tree(Long, tree), match_tree(Anything, tree) != nil];
    "#,
    );
    let result = engine.run().expect("Execution failed");
    assert_eq!(engine.format_value(&result), "[true, nil, true]");
}

#[test]
fn test_hex_bytes() {
    let mut engine = engine(
        r#"
        rule Png = 0x8950 "NG";
        [match_bytes(Png, [0x89, 0x50, 78, 71]) != nil, match_bytes(Png, [0x89, 0x51, 78, 71])];
    "#,
    );
    let result = engine.run().expect("Execution failed");
    assert_eq!(engine.format_value(&result), "[true, nil]");
}

#[test]
fn test_unknown_rule_is_an_error() {
    let mut engine = engine(r#"rule R = "a";"#);
    assert!(engine.match_text("Missing", "a").is_err());
}
