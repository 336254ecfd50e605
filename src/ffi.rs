//! C ABI exports for hosts that drive the bridge through integer ids.
//!
//! Every `pyb_*` function follows this contract:
//!
//! 1. Clears the last error
//! 2. Performs the operation through [`Session`] and [`Proxy`]
//! 3. On error: stores the message via `set_last_error`, returns a sentinel
//! 4. On success: returns the result
//!
//! **Sentinel values:**
//! - Id functions (`-> isize`):     `0` means error (or "absent" for `pyb_getattr`)
//! - Status functions (`-> i32`):   `-1` means error, `0` means success
//! - String functions (`-> cstr`):  `""` means error (check `pyb_last_error`)
//!
//! **Memory:**
//! - Returned `cstr` pointers use a TLS buffer — valid until the next
//!   string-returning `pyb_*` call. Copy before calling again.
//! - Ids are registry entries holding one interpreter reference each.
//!   They MUST be freed with `pyb_drop` when no longer needed.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use crate::error::{clear_last_error, set_last_error, BridgeError, Result};
use crate::proxy::Proxy;
use crate::registry;
use crate::session::Session;
use crate::value::Value;

// ==================== Internal Helpers ====================

thread_local! {
    /// Reusable buffer for returned C strings.
    static RETURN_BUF: RefCell<CString> = RefCell::new(CString::default());
}

/// Store a string in the TLS buffer and return a pointer to it.
fn set_return_str(s: String) -> *const c_char {
    RETURN_BUF.with(|cell| {
        let cstr = CString::new(s).unwrap_or_else(|err| {
            // Keep everything up to the first NUL rather than nothing.
            let nul = err.nul_position();
            let mut bytes = err.into_vec();
            bytes.truncate(nul);
            CString::new(bytes).unwrap_or_default()
        });
        *cell.borrow_mut() = cstr;
        cell.borrow().as_ptr()
    })
}

fn ret_id(f: impl FnOnce() -> Result<isize>) -> isize {
    clear_last_error();
    match f() {
        Ok(id) => id,
        Err(e) => {
            set_last_error(e.to_string());
            0
        }
    }
}

fn ret_status(f: impl FnOnce() -> Result<()>) -> i32 {
    clear_last_error();
    match f() {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(e.to_string());
            -1
        }
    }
}

fn ret_str(f: impl FnOnce() -> Result<String>) -> *const c_char {
    clear_last_error();
    match f() {
        Ok(s) => set_return_str(s),
        Err(e) => {
            set_last_error(e.to_string());
            set_return_str(String::new())
        }
    }
}

/// Read a C string argument.
///
/// # Safety
/// Pointer must be null or valid and null-terminated.
unsafe fn arg_str<'a>(ptr: *const c_char) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidArgument("null string pointer".into()));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|e| BridgeError::InvalidArgument(format!("invalid UTF-8: {e}")))
}

/// Resolve an id array into proxy values.
///
/// # Safety
/// `ids` must point to `len` readable ids, or `len` must be 0.
unsafe fn arg_values(ids: *const isize, len: usize) -> Result<Vec<Value>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    if ids.is_null() {
        return Err(BridgeError::InvalidArgument("null argument array".into()));
    }
    unsafe { std::slice::from_raw_parts(ids, len) }
        .iter()
        .map(|&id| registry::get(id).map(Value::Object))
        .collect()
}

// ==================== Lifecycle ====================

/// Boot the interpreter (configured from the environment) and the id registry.
///
/// Returns `0` on success, `-1` on error.
#[no_mangle]
pub extern "C" fn pyb_init() -> i32 {
    ret_status(|| {
        Session::initialize()?;
        registry::init_registry();
        Ok(())
    })
}

/// Release every registered id. The interpreter keeps running.
#[no_mangle]
pub extern "C" fn pyb_finalize() {
    clear_last_error();
    registry::destroy_registry();
}

// ==================== Evaluation ====================

/// Execute statements in `__main__`.
///
/// # Safety
/// `code` must be a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pyb_exec(code: *const c_char) -> i32 {
    ret_status(|| {
        let code = unsafe { arg_str(code) }?;
        Session::get()?.run(code)
    })
}

/// Evaluate an expression and return an id for the result.
///
/// # Safety
/// `code` must be a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pyb_eval(code: *const c_char) -> isize {
    ret_id(|| {
        let code = unsafe { arg_str(code) }?;
        registry::insert(Session::get()?.eval(code)?)
    })
}

/// Import a module by dotted name.
///
/// # Safety
/// `name` must be a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pyb_import(name: *const c_char) -> isize {
    ret_id(|| {
        let name = unsafe { arg_str(name) }?;
        registry::insert(Session::get()?.import(name)?)
    })
}

// ==================== Attributes ====================

/// Look up an attribute. A missing attribute returns `0` with no error set.
///
/// # Safety
/// `name` must be a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pyb_getattr(obj: isize, name: *const c_char) -> isize {
    ret_id(|| {
        let name = unsafe { arg_str(name) }?;
        match registry::get(obj)?.get_attribute(name) {
            Some(attr) => registry::insert(attr),
            None => Ok(0),
        }
    })
}

/// # Safety
/// `name` must be a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pyb_setattr(obj: isize, name: *const c_char, value: isize) -> i32 {
    ret_status(|| {
        let name = unsafe { arg_str(name) }?;
        let value = registry::get(value)?;
        registry::get(obj)?.set_attribute(name, &Value::Object(value))
    })
}

// ==================== Calls ====================

/// `callable(*args)` where `args` is an array of `nargs` ids.
///
/// # Safety
/// `args` must point to `nargs` ids (or be null when `nargs == 0`).
#[no_mangle]
pub unsafe extern "C" fn pyb_call(callable: isize, args: *const isize, nargs: usize) -> isize {
    ret_id(|| {
        let args = unsafe { arg_values(args, nargs) }?;
        registry::insert(registry::get(callable)?.call(&args)?)
    })
}

/// `obj.method(*args)`.
///
/// # Safety
/// `method` must be a valid null-terminated string; `args` as for `pyb_call`.
#[no_mangle]
pub unsafe extern "C" fn pyb_invoke(
    obj: isize,
    method: *const c_char,
    args: *const isize,
    nargs: usize,
) -> isize {
    ret_id(|| {
        let method = unsafe { arg_str(method) }?;
        let args = unsafe { arg_values(args, nargs) }?;
        registry::insert(registry::get(obj)?.call_method(method, &args, &[])?)
    })
}

// ==================== Conversion ====================

/// `str(obj)`. Returns via TLS buffer.
#[no_mangle]
pub extern "C" fn pyb_to_str(obj: isize) -> *const c_char {
    ret_str(|| registry::get(obj)?.str())
}

/// `repr(obj)`. Returns via TLS buffer.
#[no_mangle]
pub extern "C" fn pyb_to_repr(obj: isize) -> *const c_char {
    ret_str(|| registry::get(obj)?.repr())
}

/// Best-guess value of `obj`, rendered as JSON. Returns via TLS buffer.
#[no_mangle]
pub extern "C" fn pyb_to_json(obj: isize) -> *const c_char {
    ret_str(|| {
        let json = registry::get(obj)?.value_of()?.to_json()?;
        Ok(json.to_string())
    })
}

/// Build an interpreter object from JSON. Objects become `dict`s.
///
/// # Safety
/// `json` must be a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pyb_from_json(json: *const c_char) -> isize {
    ret_id(|| {
        let text = unsafe { arg_str(json) }?;
        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| BridgeError::InvalidArgument(format!("JSON: {e}")))?;
        let owned = Session::get()?.convert(&Value::from(parsed))?;
        registry::insert(Proxy::from(owned))
    })
}

/// `1` if `obj` is `None`, `0` if not, `-1` on error.
#[no_mangle]
pub extern "C" fn pyb_is_absent(obj: isize) -> i32 {
    clear_last_error();
    match registry::get(obj) {
        Ok(proxy) => i32::from(proxy.is_absent()),
        Err(e) => {
            set_last_error(e.to_string());
            -1
        }
    }
}

// ==================== Memory Management ====================

/// Release an id. Using it afterwards is an error.
#[no_mangle]
pub extern "C" fn pyb_drop(id: isize) {
    clear_last_error();
    match registry::remove(id) {
        // Dropping the proxy releases its interpreter reference.
        Ok(proxy) => drop(proxy),
        Err(e) => set_last_error(e.to_string()),
    }
}

/// Number of live ids, or `-1` on error.
#[no_mangle]
pub extern "C" fn pyb_handle_count() -> i64 {
    clear_last_error();
    match registry::len() {
        Ok(n) => n as i64,
        Err(e) => {
            set_last_error(e.to_string());
            -1
        }
    }
}
