use serde::{Deserialize, Serialize};

/// Queue layout of a bridge instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Thread name of the script context
    pub script_queue_name: String,
    /// Thread name of the background queue shared by default-policy modules
    pub shared_queue_name: String,
    /// Thread name of the privileged queue, when one is spawned
    pub main_queue_name: String,
    /// Spawn a privileged queue for modules that require main-queue setup.
    /// Without one such modules fail with `InvalidExecutionContext`.
    pub spawn_main_queue: bool,
    /// Stack size of the script queue thread in bytes. Script calls recurse
    /// on the Rust stack, so this bounds how deep `max_call_depth` can go.
    pub script_stack_size: usize,
}

/// Default stack of the script queue, 32 MiB
pub const DEFAULT_SCRIPT_STACK_SIZE: usize = 32 * 1024 * 1024;

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            script_queue_name: "hostlink.ScriptQueue".to_string(),
            shared_queue_name: "hostlink.ModuleQueue".to_string(),
            main_queue_name: "hostlink.MainQueue".to_string(),
            spawn_main_queue: true,
            script_stack_size: DEFAULT_SCRIPT_STACK_SIZE,
        }
    }
}
