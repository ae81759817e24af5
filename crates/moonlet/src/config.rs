//! Engine configuration.

use moonlet_vm::loader::DEFAULT_PATH;
use moonlet_vm::VmConfig;

/// Limits and search paths for a [`State`](crate::State).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Lua frames per coroutine before "stack overflow".
    pub max_call_depth: usize,
    /// Nested interpreter loops (natives calling back into Lua).
    pub max_native_depth: usize,
    /// Allocations between automatic collections.
    pub gc_threshold: usize,
    /// `;`-separated `require` templates, `?` standing for the module name.
    pub module_path: String,
}

impl Default for Config {
    fn default() -> Self {
        let vm = VmConfig::default();
        Config {
            max_call_depth: vm.max_call_depth,
            max_native_depth: vm.max_native_depth,
            gc_threshold: vm.gc_threshold,
            module_path: DEFAULT_PATH.to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `MOONLET_PATH` (or `LUA_PATH`) and
    /// `MOONLET_MAX_DEPTH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        if let Some(path) = lookup("MOONLET_PATH").or_else(|| lookup("LUA_PATH")) {
            // ";;" splices in the default path.
            config.module_path = path.replacen(";;", &format!(";{DEFAULT_PATH};"), 1);
        }
        if let Some(depth) = lookup("MOONLET_MAX_DEPTH") {
            match depth.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_call_depth = n,
                _ => tracing::warn!(value = %depth, "ignoring invalid MOONLET_MAX_DEPTH"),
            }
        }
        config
    }

    pub fn vm_config(&self) -> VmConfig {
        VmConfig {
            max_call_depth: self.max_call_depth,
            max_native_depth: self.max_native_depth,
            gc_threshold: self.gc_threshold,
        }
    }
}
