use super::*;
use crate::error::BridgeError;
use crate::module::QueuePolicy;
use hostlink_types::Constants;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

struct ThemeModule {
    exported: Arc<AtomicUsize>,
}

impl NativeModule for ThemeModule {
    fn constants_to_export(&self) -> Result<Constants, ModuleError> {
        self.exported.fetch_add(1, Ordering::SeqCst);
        let mut constants = Constants::new();
        constants.insert("accent".to_string(), Value::from("#3366ff"));
        Ok(constants)
    }
}

fn theme_class(created: Arc<AtomicUsize>, exported: Arc<AtomicUsize>) -> ModuleClass {
    ModuleClass::builder(move || {
        created.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(ThemeModule {
            exported: exported.clone(),
        })
    })
    .method("refresh", Arity::Exact(0), |_: &ThemeModule, _| Ok(Value::Null))
    .exports_constants()
    .build()
    .unwrap()
}

struct PlainModule;
impl NativeModule for PlainModule {}

fn plain_class(name: &str) -> ModuleClass {
    ModuleClass::builder(|| Ok(PlainModule))
        .name(name)
        .method("noop", Arity::AtLeast(0), |_: &PlainModule, _| Ok(Value::Null))
        .build()
        .unwrap()
}

#[test]
fn test_resolve_by_name_and_index_agree() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    registry.register(counter_class(&journal)).unwrap();
    registry.register(storage_class()).unwrap();

    for (index, name) in ["Logger", "Counter", "Storage"].iter().enumerate() {
        let by_name = registry.resolve(name).unwrap();
        let by_index = registry.resolve_index(index).unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_index));
        assert_eq!(by_name.index(), index);
    }

    assert!(matches!(
        registry.resolve("Missing"),
        Err(BridgeError::UnknownModule(name)) if name == "Missing"
    ));
    assert!(matches!(
        registry.resolve_index(3),
        Err(BridgeError::UnknownModule(_))
    ));
}

#[test]
fn test_gather_constants_runs_once() {
    let registry = new_registry();
    let created = Arc::new(AtomicUsize::new(0));
    let exported = Arc::new(AtomicUsize::new(0));
    registry
        .register(theme_class(created.clone(), exported.clone()))
        .unwrap();

    let descriptor = registry.resolve("Theme").unwrap();
    let first = descriptor.gather_constants().unwrap();
    let second = descriptor.gather_constants().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.unwrap()["accent"], Value::from("#3366ff"));
    assert_eq!(exported.load(Ordering::SeqCst), 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_gather_constants_exports_once() {
    let registry = new_registry();
    let created = Arc::new(AtomicUsize::new(0));
    let exported = Arc::new(AtomicUsize::new(0));
    registry
        .register(theme_class(created.clone(), exported.clone()))
        .unwrap();
    let descriptor = registry.resolve("Theme").unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let descriptor = descriptor.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                descriptor.gather_constants().unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(exported.load(Ordering::SeqCst), 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_instance_is_created_once() {
    let registry = new_registry();
    let created = Arc::new(AtomicUsize::new(0));
    registry
        .register(theme_class(created.clone(), Arc::new(AtomicUsize::new(0))))
        .unwrap();
    let descriptor = registry.resolve("Theme").unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let descriptor = descriptor.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                descriptor.instance().unwrap()
            })
        })
        .collect();
    let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[test]
fn test_duplicate_name_leaves_registry_unchanged() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let generation = registry.generation();
    let config = registry.build_script_config();
    let original = registry.resolve("Logger").unwrap();

    let result = registry.register(plain_class("Logger"));
    assert!(matches!(result, Err(BridgeError::DuplicateModuleName(name)) if name == "Logger"));

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.generation(), generation);
    assert!(Arc::ptr_eq(&registry.resolve("Logger").unwrap(), &original));
    assert!(Arc::ptr_eq(&registry.build_script_config(), &config));
}

#[test]
fn test_config_without_constants_does_not_instantiate() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    let descriptor = registry.resolve("Logger").unwrap();

    let config = descriptor.config().unwrap();
    assert_eq!(config.methods, vec!["log"]);
    assert_eq!(config.constants, None);
    assert!(!descriptor.has_instance());

    registry.build_script_config();
    assert!(!descriptor.has_instance());
}

#[test]
fn test_script_config_table() {
    let registry = new_registry();
    let journal = Journal::default();
    registry.register(logger_class(&journal)).unwrap();
    registry.register(storage_class()).unwrap();

    let config = registry.build_script_config();
    let logger = &config.modules()[0];
    assert_eq!(logger.index, 0);
    assert_eq!(logger.name, "Logger");
    assert_eq!(logger.methods, vec!["log"]);

    let storage = config.module("Storage").unwrap();
    assert_eq!(storage.index, 1);
    assert_eq!(storage.methods, vec!["setItem", "getItem", "fetch"]);
    assert_eq!(storage.sync_methods, vec![1]);

    assert_eq!(
        config.to_json(),
        serde_json::json!([
            {"moduleIndex": 0, "moduleName": "Logger", "constants": null,
             "methods": ["log"], "syncMethods": []},
            {"moduleIndex": 1, "moduleName": "Storage", "constants": null,
             "methods": ["setItem", "getItem", "fetch"], "syncMethods": [1]}
        ])
    );
}

#[test]
fn test_config_is_rebuilt_per_generation() {
    let registry = new_registry();
    registry.register(plain_class("First")).unwrap();
    let before = registry.build_script_config();
    assert!(Arc::ptr_eq(&before, &registry.build_script_config()));

    registry.register(plain_class("Second")).unwrap();
    let after = registry.build_script_config();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.modules()[0], before.modules()[0]);
    assert_eq!(after.modules()[1].index, 1);
}

#[test]
fn test_broken_module_keeps_its_index() {
    let registry = new_registry();
    let broken = ModuleClass::builder(|| Ok(PlainModule))
        .name("Broken")
        .method("same", Arity::Exact(0), |_: &PlainModule, _| Ok(Value::Null))
        .method("same", Arity::Exact(1), |_: &PlainModule, _| Ok(Value::Null))
        .build()
        .unwrap();
    registry.register(broken).unwrap();
    registry.register(plain_class("Healthy")).unwrap();

    let descriptor = registry.resolve("Broken").unwrap();
    assert!(matches!(
        descriptor.methods(),
        Err(BridgeError::ModuleIntrospection { .. })
    ));

    let config = registry.build_script_config();
    assert_eq!(config.modules()[0].name, "Broken");
    assert!(config.modules()[0].methods.is_empty());
    assert_eq!(config.modules()[1].name, "Healthy");
    assert_eq!(config.modules()[1].index, 1);
}

#[test]
fn test_factory_failure_is_memoized() {
    let registry = new_registry();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let class = ModuleClass::builder(move || -> Result<PlainModule, ModuleError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(ModuleError::failed("no device"))
    })
    .name("Camera")
    .build()
    .unwrap();
    registry.register(class).unwrap();

    let descriptor = registry.resolve("Camera").unwrap();
    for _ in 0..2 {
        match descriptor.instance() {
            Err(BridgeError::ModuleInitialization { module, reason }) => {
                assert_eq!(module, "Camera");
                assert_eq!(reason, "no device");
            }
            other => panic!("Expected ModuleInitialization, got {:?}", other.map(|_| ())),
        }
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(!descriptor.has_instance());
}

#[test]
fn test_factory_panic_is_contained() {
    let registry = new_registry();
    let class = ModuleClass::builder(|| -> Result<PlainModule, ModuleError> { panic!("bad driver") })
        .name("Sensor")
        .build()
        .unwrap();
    registry.register(class).unwrap();

    let err = registry.resolve("Sensor").unwrap().instance().err().unwrap();
    assert!(err.to_string().contains("bad driver"));
}

#[test]
fn test_main_queue_setup_runs_on_main_queue() {
    let registry = new_registry();
    let thread_name = Arc::new(Mutex::new(None));
    let recorded = thread_name.clone();
    let class = ModuleClass::builder(move || {
        *recorded.lock() = thread::current().name().map(str::to_string);
        Ok(ThemeModule {
            exported: Arc::new(AtomicUsize::new(0)),
        })
    })
    .name("Window")
    .requires_main_queue_setup()
    .exports_constants()
    .build()
    .unwrap();
    registry.register(class).unwrap();

    let descriptor = registry.resolve("Window").unwrap();
    let constants = descriptor.gather_constants().unwrap().unwrap();
    assert_eq!(constants["accent"], Value::from("#3366ff"));
    assert_eq!(thread_name.lock().as_deref(), Some("hostlink.MainQueue"));
}

#[test]
fn test_main_queue_setup_without_main_queue() {
    let registry = new_registry_without_main();
    let class = ModuleClass::builder(|| Ok(PlainModule))
        .name("Window")
        .requires_main_queue_setup()
        .build()
        .unwrap();
    registry.register(class).unwrap();

    let descriptor = registry.resolve("Window").unwrap();
    assert!(matches!(
        descriptor.instance(),
        Err(BridgeError::InvalidExecutionContext(_))
    ));
    // The method table is declared, so it stays reachable
    assert!(descriptor.config().is_ok());
}

#[test]
fn test_method_queue_policies() {
    let registry = new_registry();
    registry.register(plain_class("Shared")).unwrap();
    let dedicated = ModuleClass::builder(|| Ok(PlainModule))
        .name("Clock")
        .queue(QueuePolicy::Dedicated)
        .build()
        .unwrap();
    registry.register(dedicated).unwrap();

    let shared = registry.resolve("Shared").unwrap();
    assert!(!shared.has_instance());
    assert_eq!(shared.method_queue().unwrap().name(), "hostlink.ModuleQueue");
    assert!(shared.has_instance());

    let clock = registry.resolve("Clock").unwrap();
    let queue = clock.method_queue().unwrap();
    assert_eq!(queue.name(), "hostlink.ClockQueue");
    assert_eq!(
        queue
            .call_sync(|| thread::current().name().map(str::to_string))
            .unwrap()
            .as_deref(),
        Some("hostlink.ClockQueue")
    );
}

#[test]
fn test_invalidate_tears_down_instances() {
    struct Session {
        journal: Journal,
    }
    impl NativeModule for Session {
        fn invalidate(&self) {
            self.journal.push(format!(
                "invalidate on {}",
                thread::current().name().unwrap_or("?")
            ));
        }
    }

    let registry = new_registry();
    let journal = Journal::default();
    let factory_journal = journal.clone();
    let class = ModuleClass::builder(move || {
        Ok(Session {
            journal: factory_journal.clone(),
        })
    })
    .queue(QueuePolicy::Dedicated)
    .build()
    .unwrap();
    registry.register(class).unwrap();
    registry.register(plain_class("Idle")).unwrap();

    let session = registry.resolve("Session").unwrap();
    let queue = session.method_queue().unwrap();
    registry.invalidate();

    assert_eq!(journal.entries(), vec!["invalidate on hostlink.SessionQueue"]);
    assert!(queue.is_finished());
    assert!(!registry.resolve("Idle").unwrap().has_instance());
}
