//! Translation of the interpreter's error flag into [`BridgeError`].
//!
//! The interpreter tracks one pending exception per thread. This module never
//! mirrors that state: it probes the flag after every call-class operation
//! and consumes it in the same step.

use std::ptr;

use pyo3::ffi;

use crate::convert;
use crate::error::BridgeError;
use crate::handle::{with_gil, Handle, Owned};

const UNKNOWN_ERROR: &str = "Unknown error";

/// Whether an interpreter exception is pending.
#[cfg(test)]
pub(crate) fn pending() -> bool {
    with_gil(|| !unsafe { ffi::PyErr_Occurred() }.is_null())
}

/// Probe-and-raise: turn a pending exception into an error, or do nothing.
pub(crate) fn check() -> Result<(), BridgeError> {
    match fetch() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Clear-only variant used by attribute lookup. Whatever is pending is dropped.
pub(crate) fn clear() {
    with_gil(|| unsafe {
        if !ffi::PyErr_Occurred().is_null() {
            ffi::PyErr_Clear();
        }
    });
}

/// The pending exception if there is one, otherwise `fallback()`.
pub(crate) fn take_or(fallback: impl FnOnce() -> BridgeError) -> BridgeError {
    fetch().unwrap_or_else(fallback)
}

pub(crate) fn unknown() -> BridgeError {
    BridgeError::Foreign {
        message: UNKNOWN_ERROR.to_string(),
        traceback: None,
    }
}

#[allow(deprecated)]
fn fetch() -> Option<BridgeError> {
    with_gil(|| {
        if unsafe { ffi::PyErr_Occurred() }.is_null() {
            return None;
        }

        let mut ptype = ptr::null_mut();
        let mut pvalue = ptr::null_mut();
        let mut ptraceback = ptr::null_mut();
        // Fetching clears the flag; the three references are now ours.
        let (ty, value, traceback) = unsafe {
            ffi::PyErr_Fetch(&mut ptype, &mut pvalue, &mut ptraceback);
            ffi::PyErr_NormalizeException(&mut ptype, &mut pvalue, &mut ptraceback);
            (
                Owned::from_new(ptype),
                Owned::from_new(pvalue),
                Owned::from_new(ptraceback),
            )
        };

        let message = compose_message(
            value.as_ref().and_then(|v| str_of(v.handle())),
            ty.as_ref().and_then(|t| str_of(t.handle())),
        );
        let traceback = traceback.as_ref().and_then(|tb| format_traceback(tb.handle()));
        log::trace!("fetched interpreter error: {message}");

        Some(BridgeError::Foreign { message, traceback })
    })
}

fn compose_message(value: Option<String>, ty: Option<String>) -> String {
    value
        .filter(|s| !s.is_empty())
        .or_else(|| ty.filter(|s| !s.is_empty()))
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

/// `str(obj)` for use while composing an error. Failures are swallowed so a
/// broken `__str__` cannot replace the error being reported.
fn str_of(handle: Handle) -> Option<String> {
    let text = unsafe { Owned::from_new(ffi::PyObject_Str(handle.as_ptr())) };
    let rendered = text.and_then(|t| convert::text(t.handle()));
    if rendered.is_none() {
        unsafe { ffi::PyErr_Clear() };
    }
    rendered
}

/// `"".join(traceback.format_tb(tb))`, or `None` if any step fails.
///
/// Uses raw calls rather than [`Handle::call`] so a failure here cannot
/// re-enter error translation.
fn format_traceback(tb: Handle) -> Option<String> {
    let lines = unsafe {
        Owned::from_new(ffi::PyImport_ImportModule(c"traceback".as_ptr()))
            .and_then(|module| {
                Owned::from_new(ffi::PyObject_GetAttrString(
                    module.as_ptr(),
                    c"format_tb".as_ptr(),
                ))
            })
            .and_then(|format_tb| {
                let args = Owned::from_new(ffi::PyTuple_New(1))?;
                ffi::PyTuple_SetItem(args.as_ptr(), 0, tb.own().into_raw());
                Owned::from_new(ffi::PyObject_Call(
                    format_tb.as_ptr(),
                    args.as_ptr(),
                    ptr::null_mut(),
                ))
            })
    };
    let Some(lines) = lines else {
        unsafe { ffi::PyErr_Clear() };
        return None;
    };

    let count = unsafe { ffi::PyList_Size(lines.as_ptr()) };
    if count < 0 {
        unsafe { ffi::PyErr_Clear() };
        return None;
    }
    let mut rendered = String::new();
    for index in 0..count {
        // Borrowed from `lines`.
        let line = Handle::from_ptr(unsafe { ffi::PyList_GetItem(lines.as_ptr(), index) });
        if let Some(text) = convert::text(line) {
            rendered.push_str(&text);
        }
    }
    clear();
    Some(rendered)
}
