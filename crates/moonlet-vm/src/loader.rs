//! `require`, the `package` table and pluggable module loaders.
//!
//! `require` is an async native: finding the loader happens synchronously,
//! fetching the source is a future the host awaits, and compiling and
//! running the module happen in the completion.

use crate::base_lib::vm_of;
use crate::vm::Vm;
use futures::future::{self, FutureExt, LocalBoxFuture};
use moonlet_core::error::LuaError;
use moonlet_core::native::{register_fn, register_native, AsyncCompletion, NativeContext, NativeFunction, NativeFuture};
use moonlet_core::string::StringId;
use moonlet_core::value::LuaValue;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

/// Search path used when none is configured.
pub const DEFAULT_PATH: &str = "./?.lua;./?/init.lua";

/// Source text of a module, and where it came from (used as chunk name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub name: String,
    pub source: Vec<u8>,
}

/// A place modules can come from.
pub trait ModuleLoader {
    /// Whether this loader can provide `name`. Must not block.
    fn exists(&self, name: &str) -> bool;
    /// Fetch the module's source.
    fn load(&self, name: &str) -> LocalBoxFuture<'_, Result<ModuleSource, LuaError>>;
    /// Lines appended to the "module not found" message, each starting
    /// with `"\n\t"`.
    fn searched(&self, name: &str) -> String;
}

/// Loads `name` from the first file matching a `;`-separated list of
/// templates, with `?` replaced by the module name (dots become `/`).
#[derive(Debug, Clone)]
pub struct FileModuleLoader {
    templates: Vec<String>,
}

impl FileModuleLoader {
    pub fn new(path: &str) -> Self {
        FileModuleLoader {
            templates: path
                .split(';')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn path(&self) -> String {
        self.templates.join(";")
    }

    fn candidates(&self, name: &str) -> impl Iterator<Item = String> + '_ {
        let file = name.replace('.', "/");
        self.templates.iter().map(move |t| t.replace('?', &file))
    }

    /// First existing file for `name`.
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.candidates(name).find(|p| Path::new(p).is_file())
    }
}

impl Default for FileModuleLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PATH)
    }
}

impl ModuleLoader for FileModuleLoader {
    fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    fn load(&self, name: &str) -> LocalBoxFuture<'_, Result<ModuleSource, LuaError>> {
        let result = match self.resolve(name) {
            Some(path) => std::fs::read(&path)
                .map(|source| ModuleSource { name: path.clone(), source })
                .map_err(|e| LuaError::runtime(format!("cannot read '{path}': {e}"))),
            None => Err(LuaError::ModuleNotFound {
                name: name.to_string(),
                searched: self.searched(name),
            }),
        };
        future::ready(result).boxed_local()
    }

    fn searched(&self, name: &str) -> String {
        self.candidates(name).map(|p| format!("\n\tno file '{p}'")).collect()
    }
}

/// Modules held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryModuleLoader {
    modules: HashMap<String, String>,
}

impl MemoryModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: &str, source: &str) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: &str, source: &str) {
        self.modules.insert(name.to_string(), source.to_string());
    }
}

impl ModuleLoader for MemoryModuleLoader {
    fn exists(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    fn load(&self, name: &str) -> LocalBoxFuture<'_, Result<ModuleSource, LuaError>> {
        let result = self
            .modules
            .get(name)
            .map(|source| ModuleSource {
                name: name.to_string(),
                source: source.clone().into_bytes(),
            })
            .ok_or_else(|| LuaError::ModuleNotFound {
                name: name.to_string(),
                searched: self.searched(name),
            });
        future::ready(result).boxed_local()
    }

    fn searched(&self, name: &str) -> String {
        format!("\n\tno module '{name}' in memory")
    }
}

/// Install `require` and the `package` table.
pub fn open_package(vm: &mut Vm) {
    let g = vm.globals;
    let package = vm.heap.alloc_table(0, 8);
    let loaded = vm.loaded;
    let preload = vm.heap.alloc_table(0, 4);
    let preload_key = vm.intern("_PRELOAD");
    let registry = vm.registry;
    vm.heap.table_mut(registry).set_str(preload_key, LuaValue::Table(preload));

    let set = |vm: &mut Vm, key: &str, value: LuaValue| {
        let key = vm.intern(key);
        vm.heap.table_mut(package).set_str(key, value);
    };
    set(vm, "loaded", LuaValue::Table(loaded));
    set(vm, "preload", LuaValue::Table(preload));
    let path = vm.intern(DEFAULT_PATH);
    set(vm, "path", LuaValue::String(path));
    let config = vm.intern("/\n;\n?\n!\n-\n");
    set(vm, "config", LuaValue::String(config));
    register_fn(vm, package, "searchpath", searchpath);

    register_native(vm, g, NativeFunction::new_async("require", require));
    vm.set_global("package", LuaValue::Table(package));

    // The standard globals are modules too.
    for name in ["_G", "coroutine", "debug", "math", "string", "table", "os", "io", "package"] {
        let v = vm.get_global(name);
        if !v.is_nil() {
            let key = vm.intern(name);
            vm.heap.table_mut(loaded).set_str(key, v);
        }
    }
}

/// Immediately ready result for `require`.
fn ready(values: Vec<LuaValue>) -> NativeFuture {
    let completion: AsyncCompletion = Box::new(move |ctx: &mut NativeContext<'_>| Ok(ctx.ret(&values)));
    future::ready(Ok(completion)).boxed_local()
}

fn require(ctx: &mut NativeContext<'_>) -> Result<NativeFuture, LuaError> {
    let name_id = ctx.check_string(0)?;
    let name = String::from_utf8_lossy(ctx.bytes_of(name_id)).into_owned();
    let vm = vm_of(ctx)?;

    let cached = vm.heap.table(vm.loaded).get_str(name_id);
    if cached.is_truthy() {
        return Ok(ready(vec![cached]));
    }

    let preload_key = vm.intern("_PRELOAD");
    if let LuaValue::Table(preload) = vm.heap.table(vm.registry).get_str(preload_key) {
        let opener = vm.heap.table(preload).get_str(name_id);
        if !opener.is_nil() {
            tracing::debug!(module = %name, "require from package.preload");
            let origin = LuaValue::String(vm.intern(":preload:"));
            let value = vm.call(opener, &[LuaValue::String(name_id), origin])?;
            let value = store_loaded(vm, name_id, value.first().copied().unwrap_or(LuaValue::Nil));
            return Ok(ready(vec![value, origin]));
        }
    }

    let Some(loader) = vm.loaders.iter().find(|l| l.exists(&name)).cloned() else {
        let mut searched = format!("\n\tno field package.preload['{name}']");
        for l in &vm.loaders {
            searched.push_str(&l.searched(&name));
        }
        tracing::debug!(module = %name, "module not found");
        return Err(LuaError::ModuleNotFound { name, searched });
    };
    Ok(fetch(loader, name))
}

fn fetch(loader: Rc<dyn ModuleLoader>, name: String) -> NativeFuture {
    async move {
        tracing::debug!(module = %name, "fetching module source");
        let source = loader.load(&name).await?;
        let completion: AsyncCompletion = Box::new(move |ctx: &mut NativeContext<'_>| run_module(ctx, &name, source));
        Ok(completion)
    }
    .boxed_local()
}

fn run_module(ctx: &mut NativeContext<'_>, name: &str, source: ModuleSource) -> Result<usize, LuaError> {
    let vm = vm_of(ctx)?;
    let chunk_name = format!("@{}", source.name);
    let chunk = vm.compile(&source.source, &chunk_name).map_err(|e| {
        LuaError::runtime(format!(
            "error loading module '{name}' from '{}':\n\t{e}",
            source.name
        ))
    })?;
    tracing::debug!(module = %name, origin = %source.name, "running module");
    let f = vm.load(chunk);
    let name_id = vm.intern(name);
    let origin = LuaValue::String(vm.intern(&source.name));
    let results = vm.call(f, &[LuaValue::String(name_id), origin])?;
    let value = store_loaded(vm, name_id, results.first().copied().unwrap_or(LuaValue::Nil));
    Ok(ctx.ret(&[value, origin]))
}

/// Record a module's value in `package.loaded`; a module returning nothing
/// is stored as `true` unless it set its own entry.
fn store_loaded(vm: &mut Vm, name: StringId, value: LuaValue) -> LuaValue {
    let loaded = vm.loaded;
    if !value.is_nil() {
        vm.heap.table_mut(loaded).set_str(name, value);
    } else if vm.heap.table(loaded).get_str(name).is_nil() {
        vm.heap.table_mut(loaded).set_str(name, LuaValue::Boolean(true));
    }
    vm.heap.table(loaded).get_str(name)
}

/// `package.searchpath(name, path [, sep [, rep]])`.
fn searchpath(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let name = String::from_utf8_lossy(&ctx.check_bytes(0)?).into_owned();
    let path = String::from_utf8_lossy(&ctx.check_bytes(1)?).into_owned();
    let sep = match ctx.opt_string(2)? {
        Some(s) => String::from_utf8_lossy(ctx.bytes_of(s)).into_owned(),
        None => ".".to_string(),
    };
    let rep = match ctx.opt_string(3)? {
        Some(s) => String::from_utf8_lossy(ctx.bytes_of(s)).into_owned(),
        None => "/".to_string(),
    };
    let file = if sep.is_empty() { name } else { name.replace(&sep, &rep) };
    let mut tried = String::new();
    for template in path.split(';') {
        let candidate = template.replace('?', &file);
        if Path::new(&candidate).is_file() {
            ctx.push_str(&candidate);
            return Ok(1);
        }
        tried.push_str(&format!("\n\tno file '{candidate}'"));
    }
    ctx.push(LuaValue::Nil);
    ctx.push_str(&tried);
    Ok(2)
}
