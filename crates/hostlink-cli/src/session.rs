//! Bridge setup shared by the subcommands

use crate::config::CliConfig;
use crate::modules::{self, Output};
use anyhow::{bail, Context, Result};
use hostlink_bridge::{BatchDispatcher, ModuleRegistry, ScriptAdapter};
use hostlink_types::Value;
use std::sync::Arc;

/// Registry with the demo modules registered.
pub fn registry(config: &CliConfig, output: Output) -> Result<Arc<ModuleRegistry>> {
    let registry = ModuleRegistry::from_config(&config.bridge).context("Failed to start module queues")?;
    registry.register(modules::logger(output)?)?;
    registry.register(modules::device_info()?)?;
    registry.register(modules::storage()?)?;
    Ok(Arc::new(registry))
}

pub fn dispatcher(config: &CliConfig, output: Output) -> Result<BatchDispatcher> {
    let registry = registry(config, output)?;
    let adapter = ScriptAdapter::from_config(
        &config.bridge,
        hostlink_script::engine_factory(config.script.clone()),
    )
    .context("Failed to start script queue")?;
    Ok(BatchDispatcher::new(registry, adapter)?)
}

/// Split `Module.method`.
pub fn parse_target(target: &str) -> Result<(String, String)> {
    match target.split_once('.') {
        Some((module, method)) if !module.is_empty() && !method.is_empty() => {
            Ok((module.to_string(), method.to_string()))
        }
        _ => bail!("Expected MODULE.METHOD, got '{}'", target),
    }
}

/// Arguments given as a JSON array.
pub fn parse_args(json: &str) -> Result<Vec<Value>> {
    let parsed: serde_json::Value =
        serde_json::from_str(json).with_context(|| format!("Invalid arguments '{}'", json))?;
    match Value::from_json(parsed) {
        Value::Array(items) => Ok(items),
        other => bail!("Arguments must be a JSON array, got {}", other.type_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostlink_types::sync::Mutex;

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("App.main").unwrap(),
            ("App".to_string(), "main".to_string())
        );
        assert!(parse_target("App").is_err());
        assert!(parse_target(".main").is_err());
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            parse_args(r#"["a", 2]"#).unwrap(),
            vec![Value::from("a"), Value::Number(2.0)]
        );
        assert!(parse_args(r#"{"a": 1}"#).is_err());
        assert!(parse_args("[").is_err());
    }

    #[test]
    fn test_script_uses_demo_modules() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let dispatcher =
            dispatcher(&CliConfig::default(), Output::Capture(captured.clone())).unwrap();

        let source = r#"
            NativeModules.Storage.setItem("greeting", "hi");
            NativeModules.Logger.log("running on", NativeModules.DeviceInfo.os);
            registerCallableModule("App", {
                show: () => NativeModules.Logger.log("greeting is", NativeModules.Storage.getItem("greeting"))
            });
        "#;
        let report = dispatcher.start(source.as_bytes(), "demo.js").unwrap();
        assert!(report.is_success());

        let cycle = dispatcher.call_function("App", "show", vec![]).unwrap();
        assert!(cycle.native.is_success());
        dispatcher.shutdown();

        assert_eq!(
            *captured.lock(),
            vec![
                format!("running on {}", std::env::consts::OS),
                "greeting is hi".to_string(),
            ]
        );
    }

    #[test]
    fn test_storage_callback_reaches_script() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let dispatcher =
            dispatcher(&CliConfig::default(), Output::Capture(captured.clone())).unwrap();

        let source = r#"
            NativeModules.Storage.setItem("a", 1);
            NativeModules.Storage.multiGet(["a", "b"], (values) => NativeModules.Logger.log(values));
        "#;
        dispatcher.start(source.as_bytes(), "multi.js").unwrap();
        dispatcher.wait_for_idle().unwrap();
        dispatcher.shutdown();

        assert_eq!(*captured.lock(), vec!["[1, null]".to_string()]);
    }
}
