//! Language-level tests for the reference interpreter

use hostlink_script::{Evaluator, InterpreterOptions, ScriptError, ScriptValue};

fn eval(source: &str) -> ScriptValue {
    let mut evaluator = Evaluator::new();
    let result = evaluator.eval_str(source);
    assert!(result.is_ok(), "Failed to evaluate: {:?}", result.err());
    result.unwrap()
}

fn eval_number(source: &str) -> f64 {
    eval(source)
        .as_number()
        .unwrap_or_else(|| panic!("Expected number from {:?}", source))
}

#[test]
fn test_arithmetic_and_bindings() {
    assert_eq!(eval_number("let a = 2; let b = 3; a * b + 1"), 7.0);
    assert_eq!(eval_number("10 % 4"), 2.0);
}

#[test]
fn test_mutable_binding_and_while() {
    assert_eq!(
        eval_number("mut i = 0; mut total = 0; while (i < 5) { total = total + i; i = i + 1 }; total"),
        10.0
    );
}

#[test]
fn test_immutable_assignment_fails() {
    let mut evaluator = Evaluator::new();
    let err = evaluator.eval_str("let x = 1; x = 2").unwrap_err();
    assert!(matches!(err, ScriptError::ImmutableBinding(name) if name == "x"));
}

#[test]
fn test_closures_capture_scope() {
    let source = r#"
        let make_counter = () => {
            mut count = 0;
            () => { count = count + 1; count }
        };
        let next = make_counter();
        next(); next(); next()
    "#;
    assert_eq!(eval_number(source), 3.0);
}

#[test]
fn test_recursion_and_early_return() {
    let source = r#"
        let fact = (n) => {
            if (n <= 1) { return 1 }
            n * fact(n - 1)
        };
        fact(5)
    "#;
    assert_eq!(eval_number(source), 120.0);
}

#[test]
fn test_return_inside_while() {
    let source = r#"
        let find = (items, wanted) => {
            mut i = 0;
            while (i < len(items)) {
                if (items[i] == wanted) { return i }
                i = i + 1
            };
            -1
        };
        find([4, 5, 6], 6)
    "#;
    assert_eq!(eval_number(source), 2.0);
}

#[test]
fn test_call_depth_is_bounded() {
    let mut evaluator = Evaluator::with_options(InterpreterOptions {
        max_call_depth: 16,
        ..InterpreterOptions::default()
    });
    let err = evaluator
        .eval_str("let loop_forever = (n) => loop_forever(n + 1); loop_forever(0)")
        .unwrap_err();
    assert!(matches!(err, ScriptError::CallDepthExceeded(16)));

    // The evaluator stays usable afterwards
    assert_eq!(evaluator.eval_str("1 + 1").unwrap().as_number(), Some(2.0));
}

#[test]
fn test_missing_arguments_are_null() {
    assert!(matches!(eval("let f = (a, b) => b; f(1)"), ScriptValue::Null));
}

#[test]
fn test_records_and_arrays_share_storage() {
    let source = r#"
        let state = { items: [] };
        let alias = state;
        push(alias.items, "a");
        state.items[1] = "b";
        alias.count = len(state.items);
        state.count
    "#;
    assert_eq!(eval_number(source), 2.0);
}

#[test]
fn test_index_write_out_of_bounds() {
    let mut evaluator = Evaluator::new();
    let err = evaluator.eval_str("let a = [1]; a[3] = 2").unwrap_err();
    assert!(err.to_string().contains("out of bounds"));
}

#[test]
fn test_short_circuit_returns_operand() {
    assert_eq!(eval(r#"null || "fallback""#).as_str(), Some("fallback"));
    assert!(matches!(eval("false && undefined_name"), ScriptValue::Boolean(false)));
}

#[test]
fn test_string_building() {
    assert_eq!(eval(r#""count: " + str(3)"#).as_str(), Some("count: 3"));
    assert_eq!(eval(r#"keys({ b: 1, a: 2 })[0]"#).as_str(), Some("a"));
}

#[test]
fn test_try_catch_thrown_value() {
    let source = r#"
        let risky = () => { throw { code: 42 } };
        try { risky() } catch (e) { e.code }
    "#;
    assert_eq!(eval_number(source), 42.0);
}

#[test]
fn test_try_catch_runtime_error_message() {
    let result = eval("try { missing_name } catch (e) { e }");
    assert_eq!(result.as_str(), Some("Undefined variable 'missing_name'"));
}

#[test]
fn test_uncaught_throw() {
    let mut evaluator = Evaluator::new();
    let err = evaluator.eval_str(r#"throw "boom""#).unwrap_err();
    assert_eq!(err.to_string(), "Uncaught exception: boom");
}

#[test]
fn test_syntax_error_is_reported() {
    let mut evaluator = Evaluator::new();
    let err = evaluator.eval_str("let = 1").unwrap_err();
    assert!(matches!(err, ScriptError::Syntax(_)));
}

#[test]
fn test_builtin_arity_checked() {
    let mut evaluator = Evaluator::new();
    let err = evaluator.eval_str("len()").unwrap_err();
    assert_eq!(err.to_string(), "Runtime error: len() expects 1 argument, got 0");
}
