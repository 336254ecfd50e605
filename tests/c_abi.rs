mod common;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use pybridge::error::{pyb_last_error, pyb_last_error_clear};
use pybridge::ffi::*;

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

fn read(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_owned()
}

fn last_error() -> Option<String> {
    let ptr = pyb_last_error();
    (!ptr.is_null()).then(|| read(ptr))
}

// One test drives the whole lifecycle: the registry is process-global.
#[test]
fn c_abi_lifecycle() {
    common::session();
    assert_eq!(pyb_init(), 0);

    unsafe {
        assert_eq!(
            pyb_exec(c("def c_abi_add(a, b):\n    return a + b\n").as_ptr()),
            0
        );

        let add = pyb_eval(c("c_abi_add").as_ptr());
        assert_ne!(add, 0, "{:?}", last_error());
        let a = pyb_from_json(c("20").as_ptr());
        let b = pyb_from_json(c("22").as_ptr());
        let args = [a, b];
        let sum = pyb_call(add, args.as_ptr(), args.len());
        assert_ne!(sum, 0, "{:?}", last_error());
        assert_eq!(read(pyb_to_json(sum)), "42");
        assert_eq!(read(pyb_to_str(sum)), "42");

        // Dict from JSON, read back through a method call.
        let dict = pyb_from_json(c(r#"{"x": [1, "a", true]}"#).as_ptr());
        let key = pyb_from_json(c(r#""x""#).as_ptr());
        let item = pyb_invoke(dict, c("get").as_ptr(), &key, 1);
        assert_eq!(read(pyb_to_json(item)), r#"[1,"a",true]"#);
        assert_eq!(read(pyb_to_repr(key)), "'x'");

        // Missing attribute: 0 with no error.
        assert_eq!(pyb_getattr(dict, c("nope").as_ptr()), 0);
        assert_eq!(last_error(), None);

        let math = pyb_import(c("math").as_ptr());
        let pi = pyb_getattr(math, c("pi").as_ptr());
        assert!(read(pyb_to_str(pi)).starts_with("3.14159"));

        let ns = pyb_eval(c("__import__('types').SimpleNamespace()").as_ptr());
        assert_eq!(pyb_setattr(ns, c("value").as_ptr(), sum), 0);
        let value = pyb_getattr(ns, c("value").as_ptr());
        assert_eq!(read(pyb_to_json(value)), "42");

        let none = pyb_from_json(c("null").as_ptr());
        assert_eq!(pyb_is_absent(none), 1);
        assert_eq!(pyb_is_absent(sum), 0);

        // Errors.
        assert_eq!(pyb_import(c("no_such_c_abi_module").as_ptr()), 0);
        assert!(last_error().unwrap().contains("no_such_c_abi_module"));
        pyb_last_error_clear();

        assert_eq!(pyb_call(add, ptr::null(), 0), 0);
        assert!(last_error().is_some());

        assert_eq!(read(pyb_to_json(math)), "");
        assert!(last_error().unwrap().contains("module"));

        assert_eq!(pyb_exec(c("raise SystemError('x')").as_ptr()), -1);
        assert_eq!(last_error().as_deref(), Some("Script execution failed"));

        assert_eq!(pyb_from_json(c("{not json").as_ptr()), 0);
        assert!(last_error().unwrap().starts_with("Invalid argument"));

        // Lifetime.
        let live = pyb_handle_count();
        assert!(live >= 12, "{live}");
        pyb_drop(none);
        assert_eq!(pyb_handle_count(), live - 1);
        pyb_drop(none);
        assert!(last_error().unwrap().contains("Invalid handle"));
        assert_eq!(read(pyb_to_str(none)), "");

        pyb_finalize();
        assert_eq!(pyb_handle_count(), -1);
        assert_eq!(pyb_init(), 0);
        assert_eq!(pyb_handle_count(), 0);
    }
}
