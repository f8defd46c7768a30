use super::*;
use crate::dispatcher::DispatchState;
use crate::error::BridgeError;
use crate::foreign::ForeignObject;
use hostlink_types::{CallBatch, CallRecord};

fn started(registry: Arc<ModuleRegistry>, source: &str) -> BatchDispatcher {
    started_with(registry, source, InterpreterOptions::default())
}

fn started_with(
    registry: Arc<ModuleRegistry>,
    source: &str,
    options: InterpreterOptions,
) -> BatchDispatcher {
    let dispatcher = new_dispatcher(registry, options);
    dispatcher.start(source.as_bytes(), "test.js").unwrap();
    dispatcher
}

fn record(module: usize, method: usize, args: Vec<Value>) -> CallRecord {
    CallRecord::new(module, method, args)
}

#[test]
fn test_logger_receives_exact_argument() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let dispatcher = started(registry.clone(), "let ready = true");

    let config = registry.build_script_config();
    assert_eq!(config.modules()[0].name, "Logger");
    assert_eq!(config.modules()[0].methods, vec!["log"]);

    let batch = CallBatch::from(vec![record(0, 0, vec![Value::from("hello")])]);
    let report = dispatcher.flush_native_batch(batch).unwrap();

    assert!(report.is_success());
    assert_eq!(journal.entries(), vec!["log:hello", "Logger:complete"]);
}

#[test]
fn test_failing_record_does_not_stop_siblings() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    registry.register(counter_class(&journal)).unwrap();
    let dispatcher = started(registry, "let ready = true");

    let batch = CallBatch::from(vec![
        record(0, 0, vec![Value::from("a")]),
        record(1, 0, vec![]),
        record(1, 1, vec![]),
        record(1, 0, vec![]),
        record(0, 0, vec![Value::from("b")]),
    ]);
    let report = dispatcher.flush_native_batch(batch).unwrap();

    assert_eq!(report.len(), 5);
    for position in [0, 1, 3, 4] {
        assert!(report.outcomes[position].is_ok(), "record {} failed", position);
    }
    match &report.outcomes[2] {
        Err(BridgeError::RecordExecution {
            index,
            module,
            method,
            reason,
        }) => {
            assert_eq!(*index, 2);
            assert_eq!(module, "Counter");
            assert_eq!(method, "fail");
            assert_eq!(reason, "counter overflow");
        }
        other => panic!("Expected RecordExecution, got {:?}", other),
    }

    assert_eq!(
        journal.entries(),
        vec!["log:a", "ok", "ok", "log:b", "Logger:complete", "Counter:complete"]
    );
}

#[test]
fn test_panicking_method_is_a_record_error() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(counter_class(&journal)).unwrap();
    let dispatcher = started(registry, "let ready = true");

    let batch = CallBatch::from(vec![record(0, 2, vec![]), record(0, 0, vec![])]);
    let report = dispatcher.flush_native_batch(batch).unwrap();

    let err = report.outcomes[0].as_ref().unwrap_err();
    assert!(err.to_string().contains("counter exploded"));
    assert!(report.outcomes[1].is_ok());
    assert_eq!(journal.count("Counter:complete"), 1);
}

#[test]
fn test_unresolvable_records() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let dispatcher = started(registry, "let ready = true");

    let batch = CallBatch::from(vec![
        record(7, 0, vec![]),
        record(0, 3, vec![]),
        record(0, 0, vec![]),
    ]);
    let report = dispatcher.flush_native_batch(batch).unwrap();
    let errors: Vec<_> = report.errors().map(ToString::to_string).collect();

    assert_eq!(errors.len(), 3);
    assert!(errors[0].starts_with("record 0 (#7.#0)"));
    assert!(errors[1].starts_with("record 1 (Logger.#3)"));
    assert!(errors[2].contains("expected 1 arguments, got 0"));
    // Nothing ran, so no instance exists to notify
    assert!(journal.entries().is_empty());
}

#[test]
fn test_script_calls_reach_modules_on_start() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();

    let dispatcher = new_dispatcher(registry, InterpreterOptions::default());
    let report = dispatcher
        .start(
            br#"NativeModules.Logger.log("boot"); NativeModules.Logger.log("ready")"#,
            "boot.js",
        )
        .unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(
        journal.entries(),
        vec!["log:boot", "log:ready", "Logger:complete"]
    );
}

#[test]
fn test_malformed_script_blocks_flushes() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let dispatcher = new_dispatcher(registry, InterpreterOptions::default());

    match dispatcher.start(b"let ready = true;\nlet = 1", "broken.js") {
        Err(BridgeError::ScriptLoad(diagnostic)) => {
            assert!(!diagnostic.message.is_empty());
            let location = diagnostic.location.unwrap();
            assert_eq!(location.origin, "broken.js");
            assert_eq!(location.line, 2);
        }
        other => panic!("Expected ScriptLoad, got {:?}", other),
    }

    let batch = CallBatch::from(vec![record(0, 0, vec![Value::from("lost")])]);
    assert!(matches!(
        dispatcher.flush_native_batch(batch.clone()),
        Err(BridgeError::BatchDelivery(_))
    ));
    assert!(journal.entries().is_empty());

    dispatcher.adapter().load_source(b"let fixed = true", "fixed.js").unwrap();
    assert!(dispatcher.flush_native_batch(batch).unwrap().is_success());
    assert_eq!(journal.count("log:lost"), 1);
}

#[test]
fn test_invalid_utf8_source() {
    let dispatcher = new_dispatcher(new_registry(), InterpreterOptions::default());
    let err = dispatcher.start(b"let a = \"\xc3\x28\"", "bytes.js").unwrap_err();
    assert!(matches!(err, BridgeError::ScriptLoad(d) if d.message.contains("UTF-8")));
}

#[test]
fn test_partial_flush_notifies_before_completion() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();

    let options = InterpreterOptions {
        flush_threshold: 2,
        ..InterpreterOptions::default()
    };
    let dispatcher = new_dispatcher(registry, options);
    let report = dispatcher
        .start(
            br#"
            NativeModules.Logger.log("a");
            NativeModules.Logger.log("b");
            NativeModules.Logger.log("c");
            "#,
            "partial.js",
        )
        .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.partial_flushes, 1);
    assert_eq!(
        journal.entries(),
        vec!["log:a", "log:b", "Logger:partial", "log:c", "Logger:complete"]
    );
}

#[test]
fn test_single_step_flush_only_completes() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let dispatcher = started(registry, r#"NativeModules.Logger.log("once")"#);

    dispatcher
        .flush_native_batch(CallBatch::from(vec![record(0, 0, vec![Value::from("twice")])]))
        .unwrap();
    assert_eq!(journal.count("Logger:partial"), 0);
    assert_eq!(journal.count("Logger:complete"), 2);
}

#[test]
fn test_sync_method_returns_to_script() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    registry.register(storage_class()).unwrap();

    started(
        registry,
        r#"
        let theme = NativeModules.Storage.getItem("theme");
        NativeModules.Logger.log("theme " + theme)
        "#,
    );
    assert_eq!(journal.count("log:theme dark"), 1);
}

#[test]
fn test_async_method_cannot_be_called_synchronously() {
    let registry = new_registry();
    registry.register(storage_class()).unwrap();
    let dispatcher = started(registry, "let ready = true");

    let result = dispatcher
        .adapter()
        .run_blocking(|runtime| {
            runtime.engine().evaluate(
                r#"nativeCallSyncHook(0, 0, ["theme", "light"])"#,
                "direct.js",
            )
        })
        .unwrap();
    let err = result.unwrap_err();
    assert!(err.message.contains("not a synchronous method"));
}

#[test]
fn test_callback_reaches_script() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    registry.register(storage_class()).unwrap();

    let dispatcher = started(
        registry,
        r#"NativeModules.Storage.fetch("theme", (value) => NativeModules.Logger.log("got " + value))"#,
    );
    dispatcher.wait_for_idle().unwrap();

    assert_eq!(journal.count("log:got dark"), 1);
    // Logger had no instance yet when the start flush completed
    assert_eq!(journal.count("Logger:complete"), 1);
}

#[test]
fn test_call_function_runs_a_cycle() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let dispatcher = started(
        registry,
        r#"
        registerCallableModule("Events", {
            ping: (n) => { NativeModules.Logger.log("ping " + str(n)); n + 1 }
        })
        "#,
    );

    assert_eq!(dispatcher.state(), DispatchState::Idle);
    dispatcher.enqueue_script_call("Events", "ping", vec![Value::Number(1.0)]);
    assert_eq!(dispatcher.state(), DispatchState::Collecting);

    let cycle = dispatcher
        .call_function("Events", "ping", vec![Value::Number(5.0)])
        .unwrap();
    assert_eq!(dispatcher.state(), DispatchState::Idle);

    assert_eq!(cycle.script.len(), 2);
    assert_eq!(cycle.script[0].as_ref().unwrap(), &Value::Number(2.0));
    assert_eq!(cycle.script[1].as_ref().unwrap(), &Value::Number(6.0));
    assert_eq!(cycle.native.len(), 2);
    assert_eq!(
        journal.entries(),
        vec!["log:ping 1", "log:ping 5", "Logger:complete"]
    );
}

#[test]
fn test_script_call_errors_are_per_call() {
    let registry = new_registry();
    let dispatcher = started(
        registry,
        r#"registerCallableModule("Events", { fail: () => { throw "nope" } })"#,
    );

    dispatcher.enqueue_script_call("Missing", "ping", vec![]);
    dispatcher.enqueue_script_call("Events", "fail", vec![]);
    let cycle = dispatcher.flush_script_calls().unwrap();

    assert!(matches!(&cycle.script[0], Err(BridgeError::ScriptInvocation(_))));
    match &cycle.script[1] {
        Err(BridgeError::ScriptInvocation(diagnostic)) => {
            assert!(diagnostic.message.contains("nope"))
        }
        other => panic!("Expected ScriptInvocation, got {:?}", other),
    }
    assert!(cycle.native.is_empty());
}

#[test]
fn test_foreign_module_is_called_through_instance() {
    struct Haptics;

    impl ForeignObject for Haptics {
        fn method_names(&self) -> Vec<String> {
            vec!["pulse".to_string()]
        }

        fn call(&self, method: &str, args: &[Value]) -> Result<Value, ModuleError> {
            Ok(Value::from(format!("{}({})", method, args.len())))
        }
    }

    let registry = new_registry();
    registry
        .register(ModuleClass::foreign("Haptics", || Ok(Box::new(Haptics))))
        .unwrap();
    let dispatcher = started(registry, "NativeModules.Haptics.pulse(1, 2)");

    let report = dispatcher
        .flush_native_batch(CallBatch::from(vec![record(0, 0, vec![Value::Null])]))
        .unwrap();
    assert_eq!(report.outcomes[0].as_ref().unwrap(), &Value::from("pulse(1)"));
}

#[test]
fn test_modules_registered_through_dispatcher_are_observed() {
    let registry = new_registry();
    let journal = Journal::default();
    let dispatcher = new_dispatcher(registry, InterpreterOptions::default());
    dispatcher.register_module(counter_class(&journal)).unwrap();
    dispatcher.start(b"NativeModules.Counter.ok()", "late.js").unwrap();

    assert_eq!(journal.entries(), vec!["ok", "Counter:complete"]);
}

#[test]
fn test_invoke_does_not_flush() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let dispatcher = started(
        registry,
        r#"registerCallableModule("Relay", { forward: (m) => NativeModules.Logger.log(m) })"#,
    );

    let result = futures::executor::block_on(dispatcher.adapter().invoke_async(
        "Relay",
        "forward",
        vec![Value::from("queued")],
    ));
    assert!(result.is_ok());
    assert!(journal.entries().is_empty());
    assert_eq!(dispatcher.adapter().queued_native_calls(), 1);
    assert_eq!(dispatcher.state(), DispatchState::Collecting);

    let report = dispatcher.flush_queued_native().unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(dispatcher.state(), DispatchState::Idle);
    assert_eq!(journal.entries(), vec!["log:queued", "Logger:complete"]);
}

#[test]
fn test_invoke_before_load_fails() {
    let dispatcher = new_dispatcher(new_registry(), InterpreterOptions::default());
    let result = futures::executor::block_on(dispatcher.adapter().invoke_async(
        "Events",
        "ping",
        vec![],
    ));
    assert!(matches!(result, Err(BridgeError::ScriptNotLoaded)));
}

#[test]
fn test_shutdown_invalidates_and_stops() {
    struct Session {
        journal: Journal,
    }
    impl NativeModule for Session {
        fn invalidate(&self) {
            self.journal.push("invalidated");
        }
    }

    let registry = new_registry();
    let journal = Journal::default();
    let factory_journal = journal.clone();
    registry
        .register(
            ModuleClass::builder(move || {
                Ok(Session {
                    journal: factory_journal.clone(),
                })
            })
            .method("touch", Arity::Exact(0), |_: &Session, _| Ok(Value::Null))
            .build()
            .unwrap(),
        )
        .unwrap();
    let dispatcher = started(registry, "NativeModules.Session.touch()");
    dispatcher.shutdown();

    assert_eq!(journal.entries(), vec!["invalidated"]);
    assert!(!dispatcher.adapter().is_loaded());
    assert!(matches!(
        dispatcher.flush_queued_native(),
        Err(BridgeError::BatchDelivery(_))
    ));
}

// ============================================================================
// Cycle boundaries
// ============================================================================

fn flush_every_call() -> InterpreterOptions {
    InterpreterOptions {
        flush_threshold: 1,
        ..InterpreterOptions::default()
    }
}

#[test]
fn test_failed_load_keeps_partial_outcomes_out_of_next_batch() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let dispatcher = new_dispatcher(registry, flush_every_call());

    let err = dispatcher
        .start(br#"NativeModules.Logger.log("stale"); throw "boom""#, "broken.js")
        .unwrap_err();
    assert!(matches!(err, BridgeError::ScriptLoad(_)));
    assert_eq!(journal.entries(), vec!["log:stale", "Logger:partial"]);

    let report = dispatcher.start(b"let fixed = true", "fixed.js").unwrap();
    assert!(report.is_empty());
    assert_eq!(report.partial_flushes, 0);

    let report = dispatcher
        .flush_native_batch(CallBatch::from(vec![record(0, 0, vec![Value::from("fresh")])]))
        .unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.partial_flushes, 0);
    assert_eq!(
        journal.entries(),
        vec!["log:stale", "Logger:partial", "log:fresh", "Logger:complete"]
    );
}

#[test]
fn test_invoke_partial_flush_stays_out_of_later_batches() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let dispatcher = started_with(
        registry,
        r#"registerCallableModule("App", { go: () => NativeModules.Logger.log("x") })"#,
        flush_every_call(),
    );

    futures::executor::block_on(dispatcher.adapter().invoke_async("App", "go", vec![])).unwrap();
    assert_eq!(journal.entries(), vec!["log:x", "Logger:partial"]);

    let report = dispatcher.flush_native_batch(CallBatch::new()).unwrap();
    assert!(report.is_empty());
    assert_eq!(report.partial_flushes, 0);
    // An empty batch completes nothing
    assert_eq!(journal.entries(), vec!["log:x", "Logger:partial"]);
}

#[test]
fn test_record_positions_span_partial_flushes() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    registry.register(counter_class(&journal)).unwrap();

    let options = InterpreterOptions {
        flush_threshold: 2,
        ..InterpreterOptions::default()
    };
    let dispatcher = new_dispatcher(registry, options);
    let report = dispatcher
        .start(
            br#"
            NativeModules.Logger.log("a");
            NativeModules.Counter.fail();
            NativeModules.Logger.log("b");
            NativeModules.Counter.fail();
            NativeModules.Counter.fail();
            "#,
            "positions.js",
        )
        .unwrap();

    assert_eq!(report.len(), 5);
    assert_eq!(report.partial_flushes, 2);
    let failed: Vec<usize> = report
        .outcomes
        .iter()
        .enumerate()
        .filter_map(|(position, outcome)| match outcome {
            Err(BridgeError::RecordExecution { index, .. }) => {
                assert_eq!(*index, position);
                Some(position)
            }
            Err(other) => panic!("Expected RecordExecution, got {:?}", other),
            Ok(_) => None,
        })
        .collect();
    assert_eq!(failed, vec![1, 3, 4]);
}

#[test]
fn test_deep_recursion_reports_call_depth() {
    let recursive = "let f = (n) => { if (n == 0) { return 0 } else { return 1 + f(n - 1) } };";

    let dispatcher = new_dispatcher(new_registry(), InterpreterOptions::default());
    dispatcher
        .start(format!("{} let r = f(200)", recursive).as_bytes(), "deep.js")
        .unwrap();

    let dispatcher = new_dispatcher(new_registry(), InterpreterOptions::default());
    match dispatcher.start(format!("{} let r = f(400)", recursive).as_bytes(), "deeper.js") {
        Err(BridgeError::ScriptLoad(diagnostic)) => {
            assert!(diagnostic.message.contains("call depth of 256"));
        }
        other => panic!("Expected ScriptLoad, got {:?}", other),
    }
}
