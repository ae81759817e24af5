//! The host-facing interpreter handle.

use crate::config::Config;
use crate::error::{Error, Result};
use moonlet_core::error::LuaError;
use moonlet_core::native::{native_value, CancellationToken, NativeContext, NativeFunction, NativeFuture};
use moonlet_core::value::LuaValue;
use moonlet_vm::{FileModuleLoader, ModuleLoader, Vm};
use std::any::Any;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

/// Library groups that can be opened individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Library {
    Base,
    Coroutine,
    Math,
    String,
    Table,
    Os,
    Io,
    Package,
}

impl Library {
    /// Every library, in opening order. `Package` comes last so
    /// `package.loaded` sees the others.
    pub const ALL: [Library; 8] = [
        Library::Base,
        Library::Coroutine,
        Library::Math,
        Library::String,
        Library::Table,
        Library::Os,
        Library::Io,
        Library::Package,
    ];

    pub fn from_name(name: &str) -> Option<Library> {
        Library::ALL.into_iter().find(|lib| lib.name() == name)
    }

    /// Name of the global the library installs (`_G` for the base library).
    pub fn name(self) -> &'static str {
        match self {
            Library::Base => "_G",
            Library::Coroutine => "coroutine",
            Library::Math => "math",
            Library::String => "string",
            Library::Table => "table",
            Library::Os => "os",
            Library::Io => "io",
            Library::Package => "package",
        }
    }
}

/// A Lua interpreter with its libraries, globals and module loaders.
///
/// ```no_run
/// use moonlet::State;
///
/// let mut state = State::new();
/// state.open_libs();
/// let out = state.do_string_blocking("return 1 + 2", "=example").unwrap();
/// assert_eq!(state.to_string_lossy(out[0]), "3");
/// ```
pub struct State {
    vm: Vm,
    config: Config,
}

impl State {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        tracing::debug!(?config, "creating state");
        State {
            vm: Vm::new(config.vm_config()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying VM, for APIs this handle does not wrap.
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    // ---- Libraries ----

    pub fn open_libs(&mut self) {
        for lib in Library::ALL {
            self.open_lib(lib);
        }
    }

    pub fn open_lib(&mut self, lib: Library) {
        let vm = &mut self.vm;
        match lib {
            Library::Base => moonlet_vm::open_base(vm),
            Library::Coroutine => moonlet_vm::open_coroutine(vm),
            Library::Math => moonlet_stdlib::open_math(vm),
            Library::String => moonlet_stdlib::open_string(vm),
            Library::Table => moonlet_stdlib::open_table(vm),
            Library::Os => moonlet_stdlib::open_os(vm),
            Library::Io => moonlet_stdlib::open_io(vm),
            Library::Package => {
                moonlet_vm::open_package(vm);
                let path = self.config.module_path.clone();
                if let LuaValue::Table(package) = vm.get_global("package") {
                    let key = vm.intern("path");
                    let value = LuaValue::String(vm.intern(&path));
                    vm.heap.table_mut(package).set_str(key, value);
                }
                vm.add_module_loader(Rc::new(FileModuleLoader::new(&path)));
            }
        }
        // Libraries opened after `package` still count as loaded modules.
        let value = self.vm.get_global(lib.name());
        if !value.is_nil() {
            let key = self.vm.intern(lib.name());
            let loaded = self.vm.loaded_table();
            self.vm.heap.table_mut(loaded).set_str(key, value);
        }
        tracing::debug!(library = lib.name(), "library opened");
    }

    pub fn add_module_loader(&mut self, loader: impl ModuleLoader + 'static) {
        self.vm.add_module_loader(Rc::new(loader));
    }

    /// Redirect `print` and `io.write`.
    pub fn set_stdout(&mut self, out: Box<dyn Write>) {
        self.vm.set_stdout(out);
    }

    // ---- Values ----

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        self.vm.set_global(name, value);
    }

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.vm.get_global(name)
    }

    pub fn create_table(&mut self) -> LuaValue {
        LuaValue::Table(self.vm.heap.alloc_table(0, 0))
    }

    pub fn create_string(&mut self, s: &str) -> LuaValue {
        LuaValue::String(self.vm.intern(s))
    }

    pub fn create_function<F>(&mut self, name: &str, f: F) -> LuaValue
    where
        F: Fn(&mut NativeContext<'_>) -> Result<usize, LuaError> + 'static,
    {
        native_value(&mut self.vm, NativeFunction::new(name, f))
    }

    /// A native whose result arrives through a future. Under [`run`](Self::run)
    /// the future is awaited by the host's executor.
    pub fn create_async_function<F>(&mut self, name: &str, f: F) -> LuaValue
    where
        F: Fn(&mut NativeContext<'_>) -> Result<NativeFuture, LuaError> + 'static,
    {
        native_value(&mut self.vm, NativeFunction::new_async(name, f))
    }

    pub fn create_userdata(&mut self, data: Box<dyn Any>) -> LuaValue {
        LuaValue::UserData(self.vm.heap.alloc_userdata(data))
    }

    /// Render a value as `tostring` would without calling metamethods.
    pub fn to_string_lossy(&self, value: LuaValue) -> String {
        value.display(&self.vm.strings).to_string()
    }

    // ---- Compiling and running ----

    /// Compile a chunk into a callable function. Names starting with `=`
    /// are used verbatim, `@` marks a file name.
    pub fn compile(&mut self, source: impl AsRef<[u8]>, chunk_name: &str) -> Result<LuaValue> {
        let chunk = self.vm.compile(source.as_ref(), chunk_name)?;
        tracing::debug!(chunk = chunk_name, "compiled");
        Ok(self.vm.load(chunk))
    }

    pub fn compile_file(&mut self, path: impl AsRef<Path>) -> Result<LuaValue> {
        let path = path.as_ref();
        let source = std::fs::read(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.compile(strip_shebang(&source), &format!("@{}", path.display()))
    }

    /// Call `func`, awaiting async natives on the caller's executor. Cancelling
    /// `cancel` stops the call at the next loop iteration, call or await.
    pub async fn run(
        &mut self,
        func: LuaValue,
        args: &[LuaValue],
        cancel: &CancellationToken,
    ) -> Result<Vec<LuaValue>> {
        self.vm.set_cancel_token(cancel.clone());
        let result = self.vm.call_async(func, args).await;
        result.map_err(|e| {
            let err = Error::from_lua(&self.vm, e);
            tracing::debug!(error = %err, "run failed");
            err
        })
    }

    pub async fn do_string(
        &mut self,
        source: &str,
        chunk_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<LuaValue>> {
        let f = self.compile(source, chunk_name)?;
        self.run(f, &[], cancel).await
    }

    pub fn run_blocking(&mut self, func: LuaValue, args: &[LuaValue]) -> Result<Vec<LuaValue>> {
        futures::executor::block_on(self.run(func, args, &CancellationToken::new()))
    }

    pub fn do_string_blocking(&mut self, source: &str, chunk_name: &str) -> Result<Vec<LuaValue>> {
        futures::executor::block_on(self.do_string(source, chunk_name, &CancellationToken::new()))
    }

    /// Run a full collection cycle; returns the number of objects freed.
    pub fn collect_garbage(&mut self) -> usize {
        let freed = self.vm.collect_garbage();
        tracing::debug!(freed, "collected garbage");
        freed
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop a leading `#!` line, keeping the newline so line numbers hold.
pub fn strip_shebang(source: &[u8]) -> &[u8] {
    if source.starts_with(b"#") {
        match source.iter().position(|&b| b == b'\n') {
            Some(pos) => &source[pos..],
            None => b"",
        }
    } else {
        source
    }
}
