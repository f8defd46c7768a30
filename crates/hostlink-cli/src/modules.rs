//! Demo modules the `hostlink` binary exposes to scripts

use hostlink_bridge::{Arity, ModuleClass, ModuleError, NativeModule, QueuePolicy};
use hostlink_types::sync::{Arc, Mutex};
use hostlink_types::{Constants, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Instant;

/// Where the logger writes its lines.
#[derive(Clone)]
pub enum Output {
    Stdout,
    Capture(Arc<Mutex<Vec<String>>>),
}

impl Output {
    fn write_lines(&self, lines: Vec<String>) {
        match self {
            Output::Stdout => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                for line in lines {
                    let _ = writeln!(out, "{}", line);
                }
                let _ = out.flush();
            }
            Output::Capture(captured) => captured.lock().extend(lines),
        }
    }
}

/// Buffers lines during a batch and writes them when the batch completes.
struct LoggerModule {
    output: Output,
    buffered: Mutex<Vec<String>>,
}

impl NativeModule for LoggerModule {
    fn batch_did_complete(&self) {
        let lines = std::mem::take(&mut *self.buffered.lock());
        if !lines.is_empty() {
            self.output.write_lines(lines);
        }
    }

    fn invalidate(&self) {
        self.batch_did_complete();
    }
}

pub fn logger(output: Output) -> Result<ModuleClass, hostlink_bridge::BridgeError> {
    ModuleClass::builder(move || {
        Ok(LoggerModule {
            output: output.clone(),
            buffered: Mutex::new(Vec::new()),
        })
    })
    .method("log", Arity::AtLeast(1), |logger: &LoggerModule, call| {
        let line = call
            .args()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        logger.buffered.lock().push(line);
        Ok(Value::Null)
    })
    .batch_did_complete()
    .build()
}

/// Host facts, read on the main queue.
struct DeviceInfoModule {
    started: Instant,
}

impl NativeModule for DeviceInfoModule {
    fn constants_to_export(&self) -> Result<Constants, ModuleError> {
        let mut constants = Constants::new();
        constants.insert("os".to_string(), Value::from(std::env::consts::OS));
        constants.insert("arch".to_string(), Value::from(std::env::consts::ARCH));
        constants.insert(
            "version".to_string(),
            Value::from(env!("CARGO_PKG_VERSION")),
        );
        Ok(constants)
    }
}

pub fn device_info() -> Result<ModuleClass, hostlink_bridge::BridgeError> {
    ModuleClass::builder(|| {
        Ok(DeviceInfoModule {
            started: Instant::now(),
        })
    })
    .sync_method("uptimeMillis", Arity::Exact(0), |device: &DeviceInfoModule, _| {
        Ok(Value::from(device.started.elapsed().as_millis() as f64))
    })
    .requires_main_queue_setup()
    .exports_constants()
    .build()
}

/// In-memory key/value store on a queue of its own.
struct StorageModule {
    items: Mutex<BTreeMap<String, Value>>,
}

impl NativeModule for StorageModule {}

pub fn storage() -> Result<ModuleClass, hostlink_bridge::BridgeError> {
    ModuleClass::builder(|| {
        Ok(StorageModule {
            items: Mutex::new(BTreeMap::new()),
        })
    })
    .method("setItem", Arity::Exact(2), |storage: &StorageModule, call| {
        let key: String = call.arg(0)?;
        storage.items.lock().insert(key, call.arg(1)?);
        Ok(Value::Null)
    })
    .method("removeItem", Arity::Exact(1), |storage: &StorageModule, call| {
        let key: String = call.arg(0)?;
        Ok(Value::from(storage.items.lock().remove(&key).is_some()))
    })
    .sync_method("getItem", Arity::Exact(1), |storage: &StorageModule, call| {
        let key: String = call.arg(0)?;
        Ok(storage.items.lock().get(&key).cloned().unwrap_or_default())
    })
    .method("multiGet", Arity::Exact(2), |storage: &StorageModule, call| {
        let keys: Vec<String> = call.arg(0)?;
        let values = {
            let items = storage.items.lock();
            keys.iter()
                .map(|key| items.get(key).cloned().unwrap_or_default())
                .collect::<Vec<_>>()
        };
        call.callback(1)?
            .invoke(vec![Value::from(values)])
            .map_err(|e| ModuleError::failed(e.to_string()))?;
        Ok(Value::Null)
    })
    .queue(QueuePolicy::Dedicated)
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_classes_build() {
        assert_eq!(logger(Output::Stdout).unwrap().name(), "Logger");
        assert_eq!(device_info().unwrap().name(), "DeviceInfo");
        assert_eq!(storage().unwrap().name(), "Storage");
    }
}
