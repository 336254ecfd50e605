//! Borrowed and owned references to interpreter objects.
//!
//! A [`Handle`] is only an address: copying it never touches the foreign
//! reference count and it must not outlive the reference it was read from.
//! An [`Owned`] is a reference this crate is responsible for: it is released
//! exactly once when dropped. Every C-API call that returns a new reference
//! is wrapped in an `Owned` on the spot; borrowed results stay `Handle`s and
//! go through [`Handle::own`] if they need to be kept.
//!
//! All C-API calls run with the interpreter lock held.

use std::ffi::{CStr, CString};
use std::fmt;
use std::mem;
use std::ops::Deref;
use std::ptr;

use pyo3::ffi;
use pyo3::Python;

use crate::convert;
use crate::error::{BridgeError, Result};
use crate::exception;
use crate::session::Session;
use crate::value::Value;

/// Run `f` with the interpreter lock held. Reentrant.
pub(crate) fn with_gil<R>(f: impl FnOnce() -> R) -> R {
    Python::with_gil(|_py| f())
}

/// Opaque address of one interpreter object. Zero is the foreign NULL.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    address: usize,
}

impl Handle {
    pub const NULL: Handle = Handle { address: 0 };

    pub(crate) fn from_ptr(ptr: *mut ffi::PyObject) -> Self {
        Handle {
            address: ptr as usize,
        }
    }

    pub(crate) fn as_ptr(self) -> *mut ffi::PyObject {
        self.address as *mut ffi::PyObject
    }

    pub fn address(self) -> usize {
        self.address
    }

    pub fn is_null(self) -> bool {
        self.address == 0
    }

    /// True for the foreign NULL and for the interpreter's `None`: both mean
    /// "nothing" to Rust code.
    pub fn is_absent(self) -> bool {
        self.is_null() || Session::get().is_ok_and(|s| s.none() == self)
    }

    /// Take a new reference to this object.
    ///
    /// Each call produces one more reference; each returned [`Owned`] releases
    /// its own on drop.
    pub fn own(self) -> Owned {
        if !self.is_null() {
            with_gil(|| unsafe { ffi::Py_IncRef(self.as_ptr()) });
        }
        Owned(self)
    }

    /// Current foreign reference count (diagnostics only).
    pub fn ref_count(self) -> isize {
        if self.is_null() {
            return 0;
        }
        with_gil(|| unsafe { ffi::Py_REFCNT(self.as_ptr()) })
    }

    /// The object's type object, borrowed.
    pub(crate) fn type_of(self) -> Handle {
        if self.is_null() {
            return Handle::NULL;
        }
        Handle::from_ptr(unsafe { ffi::Py_TYPE(self.as_ptr()) }.cast())
    }

    /// Name of the object's type, as the interpreter spells it.
    pub fn type_name(self) -> String {
        if self.is_null() {
            return "NULL".to_string();
        }
        with_gil(|| {
            let name = unsafe { (*ffi::Py_TYPE(self.as_ptr())).tp_name };
            if name.is_null() {
                return "object".to_string();
            }
            unsafe { CStr::from_ptr(name) }
                .to_string_lossy()
                .into_owned()
        })
    }

    /// Look up an attribute by name.
    ///
    /// A miss is not an error: the lookup's error state is cleared and `None`
    /// is returned.
    pub fn get_attribute(self, name: &str) -> Option<Owned> {
        if self.is_null() {
            return None;
        }
        let Ok(c_name) = CString::new(name) else {
            log::trace!("attribute name {name:?} contains NUL, treating as missing");
            return None;
        };
        with_gil(|| {
            let attr = unsafe {
                Owned::from_new(ffi::PyObject_GetAttrString(
                    self.as_ptr(),
                    c_name.as_ptr(),
                ))
            };
            if attr.is_none() {
                // Absence is signalled through the generic error flag.
                exception::clear();
                log::trace!("no attribute {name:?} on {}", self.type_name());
            }
            attr
        })
    }

    pub fn set_attribute(self, name: &str, value: &Value) -> Result<()> {
        self.require()?;
        let c_name = CString::new(name)?;
        with_gil(|| {
            let value = convert::to_foreign(value)?;
            let status = unsafe {
                ffi::PyObject_SetAttrString(self.as_ptr(), c_name.as_ptr(), value.as_ptr())
            };
            exception::check()?;
            if status != 0 {
                return Err(exception::unknown());
            }
            Ok(())
        })
    }

    /// Call this object with positional and keyword arguments.
    ///
    /// The argument tuple and keyword dict are released before the error
    /// state is inspected, whether or not the call raised.
    pub fn call(self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Owned> {
        self.require()?;
        with_gil(|| {
            let tuple = build_args(args)?;
            let dict = build_kwargs(kwargs)?;
            let kwargs_ptr = dict.as_ref().map_or(ptr::null_mut(), |d| d.as_ptr());
            let result = unsafe {
                Owned::from_new(ffi::PyObject_Call(self.as_ptr(), tuple.as_ptr(), kwargs_ptr))
            };
            drop(dict);
            drop(tuple);
            exception::check()?;
            result.ok_or_else(exception::unknown)
        })
    }

    /// `str(obj)`.
    pub fn str(self) -> Result<String> {
        self.render(ffi::PyObject_Str)
    }

    /// `repr(obj)`.
    pub fn repr(self) -> Result<String> {
        self.render(ffi::PyObject_Repr)
    }

    fn render(
        self,
        op: unsafe extern "C" fn(*mut ffi::PyObject) -> *mut ffi::PyObject,
    ) -> Result<String> {
        self.require()?;
        with_gil(|| {
            let text = unsafe { Owned::from_result(op(self.as_ptr())) }?;
            convert::text(text.handle()).ok_or_else(|| exception::take_or(exception::unknown))
        })
    }

    /// Best-guess Rust value for this object. See [`convert::to_host`].
    pub fn value_of(self) -> Result<Value> {
        convert::to_host(Session::get()?, self)
    }

    fn require(self) -> Result<()> {
        if self.is_null() {
            return Err(BridgeError::NullHandle);
        }
        Ok(())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.address)
    }
}

fn build_args(args: &[Value]) -> Result<Owned> {
    let tuple = unsafe { Owned::from_result(ffi::PyTuple_New(args.len() as ffi::Py_ssize_t)) }?;
    for (index, arg) in args.iter().enumerate() {
        let item = convert::to_foreign(arg)?;
        // PyTuple_SetItem steals the reference.
        let status = unsafe {
            ffi::PyTuple_SetItem(tuple.as_ptr(), index as ffi::Py_ssize_t, item.into_raw())
        };
        if status != 0 {
            return Err(exception::take_or(exception::unknown));
        }
    }
    Ok(tuple)
}

fn build_kwargs(kwargs: &[(&str, Value)]) -> Result<Option<Owned>> {
    if kwargs.is_empty() {
        return Ok(None);
    }
    let dict = unsafe { Owned::from_result(ffi::PyDict_New()) }?;
    for (name, value) in kwargs {
        let key = CString::new(*name)?;
        let value = convert::to_foreign(value)?;
        // PyDict_SetItemString borrows; `value` is released at the end of the loop body.
        let status = unsafe {
            ffi::PyDict_SetItemString(dict.as_ptr(), key.as_ptr(), value.as_ptr())
        };
        if status != 0 {
            return Err(exception::take_or(exception::unknown));
        }
    }
    Ok(Some(dict))
}

/// A reference this crate owns. Released on drop.
#[derive(PartialEq, Eq, Hash)]
pub struct Owned(Handle);

impl Owned {
    /// Wrap a new reference returned by the C API; `None` for NULL.
    ///
    /// # Safety
    /// `ptr` must be NULL or a new (caller-owned) reference.
    pub(crate) unsafe fn from_new(ptr: *mut ffi::PyObject) -> Option<Owned> {
        (!ptr.is_null()).then(|| Owned(Handle::from_ptr(ptr)))
    }

    /// Like [`Owned::from_new`], but a NULL result is turned into the pending
    /// interpreter error.
    ///
    /// # Safety
    /// Same as [`Owned::from_new`].
    pub(crate) unsafe fn from_result(ptr: *mut ffi::PyObject) -> Result<Owned> {
        unsafe { Owned::from_new(ptr) }.ok_or_else(|| exception::take_or(exception::unknown))
    }

    pub fn handle(&self) -> Handle {
        self.0
    }

    /// Give the reference away without releasing it, for C-API calls that
    /// steal their argument.
    pub(crate) fn into_raw(self) -> *mut ffi::PyObject {
        let ptr = self.0.as_ptr();
        mem::forget(self);
        ptr
    }
}

impl Deref for Owned {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        &self.0
    }
}

impl Clone for Owned {
    fn clone(&self) -> Self {
        self.0.own()
    }
}

impl Drop for Owned {
    fn drop(&mut self) {
        if !self.0.is_null() {
            with_gil(|| unsafe { ffi::Py_DecRef(self.0.as_ptr()) });
        }
    }
}

impl fmt::Debug for Owned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owned({:#x})", self.0.address)
    }
}
