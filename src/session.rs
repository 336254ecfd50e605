//! The process-wide interpreter session.
//!
//! [`Session::initialize`] boots the interpreter once and caches the built-in
//! type objects that [`crate::convert`] classifies against. The session lives
//! until the process exits; there is no teardown.

use std::ffi::CString;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use pyo3::ffi;

use crate::config::Config;
use crate::convert;
use crate::error::{BridgeError, Result};
use crate::exception;
use crate::handle::{with_gil, Handle, Owned};
use crate::proxy::Proxy;
use crate::value::Value;

static SESSION: OnceCell<Session> = OnceCell::new();

#[derive(Debug)]
pub struct Session {
    builtins: Proxy,
    types: BuiltinTypes,
}

/// Canonical built-ins used as type-identity oracles.
#[derive(Debug)]
pub(crate) struct BuiltinTypes {
    /// The `None` singleton itself, not its type.
    pub(crate) none: Proxy,
    pub(crate) bool_type: Proxy,
    pub(crate) int_type: Proxy,
    pub(crate) float_type: Proxy,
    pub(crate) str_type: Proxy,
    pub(crate) list_type: Proxy,
    pub(crate) dict_type: Proxy,
}

impl Session {
    /// Boot the interpreter with [`Config::from_env`], or return the running
    /// session.
    pub fn initialize() -> Result<&'static Session> {
        Self::initialize_with(Config::from_env())
    }

    /// Boot the interpreter with `config`. Only the first successful call's
    /// config takes effect.
    pub fn initialize_with(config: Config) -> Result<&'static Session> {
        SESSION.get_or_try_init(|| Session::bootstrap(&config))
    }

    pub fn get() -> Result<&'static Session> {
        SESSION.get().ok_or(BridgeError::NotInitialized)
    }

    fn bootstrap(config: &Config) -> Result<Session> {
        log::debug!("bootstrapping embedded interpreter: {config:?}");

        #[cfg(target_os = "linux")]
        {
            if config.promote_libpython {
                promote_libpython();
            }
        }

        // No signal handlers: the host owns them.
        pyo3::prepare_freethreaded_python();

        with_gil(|| {
            let builtins = Proxy::from(import_module("builtins")?);
            let lookup = |name: &str| {
                builtins
                    .get_attribute(name)
                    .ok_or_else(|| BridgeError::Bootstrap(format!("builtins.{name} is missing")))
            };
            let types = BuiltinTypes {
                none: lookup("None")?,
                bool_type: lookup("bool")?,
                int_type: lookup("int")?,
                float_type: lookup("float")?,
                str_type: lookup("str")?,
                list_type: lookup("list")?,
                dict_type: lookup("dict")?,
            };
            extend_sys_path(&config.sys_path)?;

            log::info!("embedded interpreter ready");
            Ok(Session { builtins, types })
        })
    }

    /// The `builtins` module.
    pub fn builtins(&self) -> &Proxy {
        &self.builtins
    }

    /// The interpreter's `None`.
    pub fn none(&self) -> Handle {
        self.types.none.handle()
    }

    pub(crate) fn types(&self) -> &BuiltinTypes {
        &self.types
    }

    /// Execute `code` in `__main__`.
    ///
    /// The interpreter prints and discards its own exception here, so a
    /// failure is reported as [`BridgeError::Script`] with no traceback.
    pub fn run(&self, code: &str) -> Result<()> {
        let source = CString::new(code)?;
        log::debug!("running {} bytes of source", code.len());
        let status = with_gil(|| unsafe { ffi::PyRun_SimpleString(source.as_ptr()) });
        if status != 0 {
            return Err(BridgeError::Script);
        }
        Ok(())
    }

    /// Evaluate an expression against `__main__`'s globals.
    #[allow(deprecated)]
    pub fn eval(&self, expr: &str) -> Result<Proxy> {
        let source = CString::new(expr)?;
        with_gil(|| {
            // Borrowed module and globals.
            let main = unsafe { ffi::PyImport_AddModule(c"__main__".as_ptr()) };
            if main.is_null() {
                return Err(exception::take_or(|| {
                    BridgeError::ModuleNotFound("__main__".to_string())
                }));
            }
            let globals = unsafe { ffi::PyModule_GetDict(main) };
            let result = unsafe {
                Owned::from_new(ffi::PyRun_String(
                    source.as_ptr(),
                    ffi::Py_eval_input,
                    globals,
                    globals,
                ))
            };
            exception::check()?;
            result.map(Proxy::from).ok_or_else(exception::unknown)
        })
    }

    pub fn import_object(&self, name: &str) -> Result<Owned> {
        import_module(name)
    }

    pub fn import(&self, name: &str) -> Result<Proxy> {
        self.import_object(name).map(Proxy::from)
    }

    pub fn convert(&self, value: &Value) -> Result<Owned> {
        convert::to_foreign(value)
    }

    pub fn value_of(&self, handle: Handle) -> Result<Value> {
        convert::to_host(self, handle)
    }
}

fn import_module(name: &str) -> Result<Owned> {
    let c_name = CString::new(name)?;
    log::debug!("importing {name}");
    with_gil(|| {
        unsafe { Owned::from_new(ffi::PyImport_ImportModule(c_name.as_ptr())) }
            .ok_or_else(|| exception::take_or(|| BridgeError::ModuleNotFound(name.to_string())))
    })
}

fn extend_sys_path(paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let sys = Proxy::from(import_module("sys")?);
    let path = sys
        .get_attribute("path")
        .ok_or_else(|| BridgeError::Bootstrap("sys.path is missing".to_string()))?;
    // Inserting at 0 in reverse keeps the configured order.
    for entry in paths.iter().rev() {
        let entry = entry.to_string_lossy().into_owned();
        path.call_method("insert", &[Value::Int(0), Value::Str(entry)], &[])?;
    }
    Ok(())
}

/// Make libpython's symbols globally visible so C extensions loaded later
/// (NumPy and friends) can resolve them.
#[cfg(target_os = "linux")]
fn promote_libpython() {
    use libc::{dlopen, RTLD_GLOBAL, RTLD_NOLOAD, RTLD_NOW};
    use std::ffi::CStr;

    const CANDIDATES: &[&CStr] = &[
        c"libpython3.so",
        c"libpython3.13.so",
        c"libpython3.12.so",
        c"libpython3.11.so",
        c"libpython3.10.so",
        c"libpython3.9.so",
    ];
    for name in CANDIDATES {
        // RTLD_NOLOAD: only touch a library that is already mapped.
        let loaded = unsafe { dlopen(name.as_ptr(), RTLD_NOW | RTLD_NOLOAD) };
        if !loaded.is_null() {
            unsafe { dlopen(name.as_ptr(), RTLD_NOW | RTLD_GLOBAL) };
            log::debug!("promoted {} to RTLD_GLOBAL", name.to_string_lossy());
            return;
        }
    }
}
