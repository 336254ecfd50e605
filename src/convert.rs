//! Value conversion protocol between [`Value`] and interpreter objects.
//!
//! Rust → interpreter ([`to_foreign`]) is total over [`Value`] except for
//! host functions. Interpreter → Rust ([`to_host`]) classifies an object by
//! comparing its type object against the built-in types cached by the
//! [`Session`]; anything unrecognised comes back as an opaque [`Proxy`].

use std::os::raw::{c_int, c_long};
use std::ptr;

use pyo3::ffi;

use crate::error::{BridgeError, Result};
use crate::exception;
use crate::handle::{with_gil, Handle, Owned};
use crate::proxy::Proxy;
use crate::session::Session;
use crate::value::Value;

/// Build a new interpreter object for `value`. The caller owns the result.
pub fn to_foreign(value: &Value) -> Result<Owned> {
    with_gil(|| match value {
        Value::Null => Ok(Handle::from_ptr(unsafe { ffi::Py_None() }).own()),
        Value::Bool(b) => unsafe { Owned::from_result(ffi::PyBool_FromLong(c_long::from(*b))) },
        Value::Int(i) => unsafe { Owned::from_result(ffi::PyLong_FromLongLong(*i)) },
        Value::Float(f) => unsafe { Owned::from_result(ffi::PyFloat_FromDouble(*f)) },
        Value::Str(s) => decode_utf8(s),
        Value::List(items) => list(items),
        Value::Map(pairs) => {
            let dict = unsafe { Owned::from_result(ffi::PyDict_New()) }?;
            for (key, value) in pairs {
                dict_insert(&dict, to_foreign(key)?, to_foreign(value)?)?;
            }
            Ok(dict)
        }
        Value::Record(fields) => {
            let dict = unsafe { Owned::from_result(ffi::PyDict_New()) }?;
            for (key, value) in fields {
                dict_insert(&dict, decode_utf8(key)?, to_foreign(value)?)?;
            }
            Ok(dict)
        }
        Value::Object(proxy) => Ok(proxy.handle().own()),
        Value::Function(_) => Err(BridgeError::UnsupportedConversion(
            "host functions cannot be passed to the interpreter".into(),
        )),
    })
}

/// Decode with an explicit byte length, so interior NULs survive.
fn decode_utf8(s: &str) -> Result<Owned> {
    unsafe {
        Owned::from_result(ffi::PyUnicode_DecodeUTF8(
            s.as_ptr().cast(),
            s.len() as ffi::Py_ssize_t,
            ptr::null(),
        ))
    }
}

fn list(items: &[Value]) -> Result<Owned> {
    let list = unsafe { Owned::from_result(ffi::PyList_New(items.len() as ffi::Py_ssize_t)) }?;
    for (index, item) in items.iter().enumerate() {
        let item = to_foreign(item)?;
        // PyList_SetItem steals the reference, also on failure.
        let status = unsafe {
            ffi::PyList_SetItem(list.as_ptr(), index as ffi::Py_ssize_t, item.into_raw())
        };
        if status != 0 {
            return Err(exception::take_or(exception::unknown));
        }
    }
    Ok(list)
}

fn dict_insert(dict: &Owned, key: Owned, value: Owned) -> Result<()> {
    // PyDict_SetItem only borrows: both are released when they go out of scope.
    let status = unsafe { ffi::PyDict_SetItem(dict.as_ptr(), key.as_ptr(), value.as_ptr()) };
    if status != 0 {
        return Err(exception::take_or(exception::unknown));
    }
    Ok(())
}

/// Built-in types recognised by [`to_host`], in classification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    None,
    Bool,
    Int,
    Float,
    Str,
    List,
    Dict,
}

/// Identify `handle` by exact type identity. Subclasses are not recognised.
pub fn classify(session: &Session, handle: Handle) -> Option<Kind> {
    if handle.is_null() {
        return None;
    }
    if handle == session.none() {
        return Some(Kind::None);
    }
    let ty = handle.type_of();
    let types = session.types();
    [
        (Kind::Bool, &types.bool_type),
        (Kind::Int, &types.int_type),
        (Kind::Float, &types.float_type),
        (Kind::Str, &types.str_type),
        (Kind::List, &types.list_type),
        (Kind::Dict, &types.dict_type),
    ]
    .into_iter()
    .find(|(_, cached)| cached.handle() == ty)
    .map(|(kind, _)| kind)
}

/// Containers nested deeper than this stay in the interpreter.
const MAX_DEPTH: usize = 512;

/// Best-guess Rust value for `handle`.
///
/// The foreign NULL reads as [`Value::Null`]. Objects of a type outside the
/// seven recognised built-ins come back as [`Value::Object`], and so does a
/// list or dict that contains itself (or nests too deeply) at the
/// point where it would be entered again.
pub fn to_host(session: &Session, handle: Handle) -> Result<Value> {
    with_gil(|| host_value(session, handle, &mut Vec::new()))
}

/// `path` holds the containers currently being read, outermost first.
fn host_value(session: &Session, handle: Handle, path: &mut Vec<Handle>) -> Result<Value> {
    if handle.is_null() {
        return Ok(Value::Null);
    }
    match classify(session, handle) {
        Some(kind @ (Kind::List | Kind::Dict)) => {
            if path.len() >= MAX_DEPTH || path.contains(&handle) {
                log::trace!("leaving nested {} as an object", handle.type_name());
                return Ok(Value::Object(Proxy::from(handle.own())));
            }
            path.push(handle);
            let value = if kind == Kind::List {
                list_value(session, handle, path)
            } else {
                dict_value(session, handle, path)
            };
            path.pop();
            value
        }
        kind => scalar_value(handle, kind),
    }
}

fn scalar_value(handle: Handle, kind: Option<Kind>) -> Result<Value> {
    match kind {
        Some(Kind::None) => Ok(Value::Null),
        Some(Kind::Bool) => {
            let raw = unsafe { ffi::PyLong_AsLong(handle.as_ptr()) };
            exception::check()?;
            Ok(Value::Bool(long_is_true(raw)))
        }
        Some(Kind::Int) => int_value(handle),
        Some(Kind::Float) => {
            let f = unsafe { ffi::PyFloat_AsDouble(handle.as_ptr()) };
            exception::check()?;
            Ok(Value::Float(f))
        }
        Some(Kind::Str) => Ok(match text(handle) {
            Some(s) => Value::Str(s),
            None => {
                exception::clear();
                Value::Null
            }
        }),
        Some(Kind::List | Kind::Dict) | None => Ok(Value::Object(Proxy::from(handle.own()))),
    }
}

fn list_value(session: &Session, list: Handle, path: &mut Vec<Handle>) -> Result<Value> {
    let len = unsafe { ffi::PyList_Size(list.as_ptr()) };
    exception::check()?;
    let mut items = Vec::with_capacity(len.max(0) as usize);
    for index in 0..len {
        let item = Handle::from_ptr(unsafe { ffi::PyList_GetItem(list.as_ptr(), index) }).own();
        items.push(host_value(session, item.handle(), path)?);
    }
    Ok(Value::List(items))
}

/// Reads a snapshot of the dict's items, so no key is ever looked up again
/// and no interpreter code runs between reads.
fn dict_value(session: &Session, dict: Handle, path: &mut Vec<Handle>) -> Result<Value> {
    let items = unsafe { Owned::from_result(ffi::PyDict_Items(dict.as_ptr())) }?;
    let len = unsafe { ffi::PyList_Size(items.as_ptr()) };
    exception::check()?;
    let mut pairs = Vec::with_capacity(len.max(0) as usize);
    for index in 0..len {
        // Each (key, value) tuple is kept alive by `items`.
        let pair = Handle::from_ptr(unsafe { ffi::PyList_GetItem(items.as_ptr(), index) });
        let key = Handle::from_ptr(unsafe { ffi::PyTuple_GetItem(pair.as_ptr(), 0) });
        let value = Handle::from_ptr(unsafe { ffi::PyTuple_GetItem(pair.as_ptr(), 1) });
        if key.is_null() || value.is_null() {
            return Err(exception::take_or(exception::unknown));
        }
        pairs.push((
            host_value(session, key, path)?,
            host_value(session, value, path)?,
        ));
    }
    Ok(Value::Map(pairs))
}

/// Only the canonical `True` encoding reads as `true`.
fn long_is_true(raw: c_long) -> bool {
    raw == 1
}

/// Integers beyond `i64` degrade to the nearest `f64`.
fn int_value(handle: Handle) -> Result<Value> {
    let mut overflow: c_int = 0;
    let i = unsafe { ffi::PyLong_AsLongLongAndOverflow(handle.as_ptr(), &mut overflow) };
    if overflow == 0 {
        exception::check()?;
        return Ok(Value::Int(i));
    }
    let f = unsafe { ffi::PyLong_AsDouble(handle.as_ptr()) };
    exception::check()?;
    Ok(Value::Float(f))
}

/// Contents of a `str` object, or `None` if it has no UTF-8 buffer. Leaves
/// any error state for the caller to deal with.
pub(crate) fn text(handle: Handle) -> Option<String> {
    if handle.is_null() {
        return None;
    }
    let mut size: ffi::Py_ssize_t = 0;
    let data = unsafe { ffi::PyUnicode_AsUTF8AndSize(handle.as_ptr(), &mut size) };
    if data.is_null() {
        return None;
    }
    let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), size as usize) };
    Some(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_canonical_true_is_true() {
        assert!(long_is_true(1));
        assert!(!long_is_true(0));
        assert!(!long_is_true(2));
        assert!(!long_is_true(-1));
    }

    #[test]
    fn classification_uses_exact_types() {
        let session = Session::initialize().unwrap();
        let kind = |v: Value| classify(session, to_foreign(&v).unwrap().handle());

        assert_eq!(kind(Value::Null), Some(Kind::None));
        assert_eq!(kind(Value::Bool(false)), Some(Kind::Bool));
        assert_eq!(kind(Value::Int(7)), Some(Kind::Int));
        assert_eq!(kind(Value::Float(0.5)), Some(Kind::Float));
        assert_eq!(kind(Value::from("s")), Some(Kind::Str));
        assert_eq!(kind(Value::List(vec![])), Some(Kind::List));
        assert_eq!(kind(Value::Map(vec![])), Some(Kind::Dict));
        assert_eq!(classify(session, Handle::NULL), None);

        let tuple = session.eval("(1, 2)").unwrap();
        assert_eq!(classify(session, tuple.handle()), None);
    }

    #[test]
    fn unrecognised_types_stay_objects() {
        let session = Session::initialize().unwrap();
        let value = session.eval("{1, 2}").unwrap().value_of().unwrap();
        let Value::Object(proxy) = value else {
            panic!("a set should come back as an object");
        };
        assert_eq!(proxy.handle().type_name(), "set");
    }

    #[test]
    fn host_functions_are_rejected() {
        let f: crate::value::HostFunction = std::rc::Rc::new(|_| Value::Null);
        let err = to_foreign(&Value::List(vec![Value::Int(1), Value::Function(f)])).unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedConversion(_)));
    }
}
