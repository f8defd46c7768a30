//! Module Registry
//!
//! Append-only table of module descriptors. Registration order is the
//! stable index the wire protocol refers to.

use crate::config::BridgeConfig;
use crate::descriptor::{ModuleConfig, ModuleDescriptor};
use crate::error::{panic_message, BridgeError};
use crate::module::ModuleClass;
use crate::queue::RegistryQueues;
use hostlink_types::sync::{Arc, Mutex, RwLock};
use hostlink_types::Value;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

/// Ordered module table handed to the script side as `__bridgeConfig`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScriptConfig {
    modules: Vec<ModuleConfig>,
}

impl ScriptConfig {
    pub fn modules(&self) -> &[ModuleConfig] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.modules.iter().map(ModuleConfig::to_value).collect())
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.to_value().to_json()
    }
}

struct RegistryInner {
    /// Name to index mapping
    name_to_index: HashMap<String, usize>,
    /// Index to descriptor mapping
    modules: Vec<Arc<ModuleDescriptor>>,
    /// Bumped on every registration
    generation: u64,
}

pub struct ModuleRegistry {
    inner: RwLock<RegistryInner>,
    config_cache: Mutex<Option<(u64, Arc<ScriptConfig>)>>,
    queues: RegistryQueues,
}

impl ModuleRegistry {
    pub fn new(queues: RegistryQueues) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                name_to_index: HashMap::new(),
                modules: Vec::new(),
                generation: 0,
            }),
            config_cache: Mutex::new(None),
            queues,
        }
    }

    /// Registry with the queues `config` describes.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, BridgeError> {
        Ok(Self::new(RegistryQueues::from_config(config)?))
    }

    /// Add a module and return its index. A duplicate name leaves the
    /// registry untouched.
    pub fn register(&self, class: ModuleClass) -> Result<usize, BridgeError> {
        let mut inner = self.inner.write();
        if inner.name_to_index.contains_key(class.name()) {
            return Err(BridgeError::DuplicateModuleName(class.name().to_string()));
        }

        let index = inner.modules.len();
        let name = class.name().to_string();
        let descriptor = ModuleDescriptor::new(index, class, self.queues.clone());
        inner.name_to_index.insert(name.clone(), index);
        inner.modules.push(Arc::new(descriptor));
        inner.generation += 1;

        log::debug!("Registered module '{}' at index {}", name, index);
        Ok(index)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<ModuleDescriptor>, BridgeError> {
        let inner = self.inner.read();
        inner
            .name_to_index
            .get(name)
            .map(|&index| inner.modules[index].clone())
            .ok_or_else(|| BridgeError::UnknownModule(name.to_string()))
    }

    pub fn resolve_index(&self, index: usize) -> Result<Arc<ModuleDescriptor>, BridgeError> {
        self.inner
            .read()
            .modules
            .get(index)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownModule(format!("#{}", index)))
    }

    /// Snapshot of all descriptors in registration order
    pub fn descriptors(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.inner.read().modules.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub fn queues(&self) -> &RegistryQueues {
        &self.queues
    }

    /// Build the script config, once per registry generation.
    ///
    /// Constants are gathered for modules that export them. A module whose
    /// surface cannot be determined is logged and emitted as a placeholder
    /// that keeps its index.
    pub fn build_script_config(&self) -> Arc<ScriptConfig> {
        let (generation, modules) = {
            let inner = self.inner.read();
            (inner.generation, inner.modules.clone())
        };

        let mut cache = self.config_cache.lock();
        if let Some((cached_generation, config)) = &*cache {
            if *cached_generation == generation {
                return config.clone();
            }
        }

        let config = Arc::new(ScriptConfig {
            modules: modules.iter().map(|d| module_config(d)).collect(),
        });
        log::debug!(
            "Built script config for {} modules (generation {})",
            modules.len(),
            generation
        );
        *cache = Some((generation, config.clone()));
        config
    }

    /// Tear down every instantiated module in registration order.
    pub fn invalidate(&self) {
        for descriptor in self.descriptors() {
            match panic::catch_unwind(AssertUnwindSafe(|| descriptor.invalidate())) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::warn!("Invalidating module '{}' failed: {}", descriptor.name(), err)
                }
                Err(payload) => log::error!(
                    "Invalidating module '{}' panicked: {}",
                    descriptor.name(),
                    panic_message(&*payload)
                ),
            }
        }
    }
}

fn module_config(descriptor: &ModuleDescriptor) -> ModuleConfig {
    let entry = descriptor
        .gather_constants()
        .and_then(|_| descriptor.config());
    match entry {
        Ok(config) => config,
        Err(err) => {
            log::error!(
                "Module '{}' exposed as an empty entry: {}",
                descriptor.name(),
                err
            );
            ModuleConfig::placeholder(descriptor.index(), descriptor.name())
        }
    }
}
