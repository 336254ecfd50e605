//! Error types and the thread-local last-error slot used by the C ABI.
//!
//! Rust callers get a [`BridgeError`] through [`Result`]. C callers get a
//! sentinel return value and read the message with `pyb_last_error()`.
//!
//! **Ownership rules:**
//! - `pyb_last_error()` returns a pointer owned by TLS — do NOT free it.

use std::cell::RefCell;
use std::ffi::{CString, NulError};
use std::os::raw::c_char;

use thiserror::Error;

/// Everything that can go wrong while talking to the embedded interpreter.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A call-class operation left the interpreter's error flag set.
    #[error("{}", render_foreign(.message, .traceback.as_deref()))]
    Foreign {
        message: String,
        traceback: Option<String>,
    },

    /// The host value has no interpreter counterpart.
    #[error("Unsupported conversion: {0}")]
    UnsupportedConversion(String),

    #[error("Object has no attribute '{0}'")]
    MissingAttribute(String),

    /// Import returned nothing and no interpreter error was pending.
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// Direct source execution failed. The interpreter already printed and
    /// discarded its own exception, so there is nothing more to attach.
    #[error("Script execution failed")]
    Script,

    #[error("Interpreter not initialized. Call Session::initialize() first.")]
    NotInitialized,

    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Operation on a null handle")]
    NullHandle,

    #[error("Invalid handle: {0}")]
    InvalidHandle(isize),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("String contains an interior NUL byte")]
    InteriorNul(#[from] NulError),
}

impl BridgeError {
    /// The primary message, without any traceback text.
    pub fn message(&self) -> String {
        match self {
            BridgeError::Foreign { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn traceback(&self) -> Option<&str> {
        match self {
            BridgeError::Foreign { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }
}

fn render_foreign(message: &str, traceback: Option<&str>) -> String {
    match traceback {
        Some(tb) if !tb.is_empty() => format!("{message}\n{}", tb.trim_end()),
        _ => message.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

// ==================== C ABI last-error slot ====================

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message in thread-local storage.
pub fn set_last_error(msg: impl Into<String>) {
    // Interior NULs would truncate the message on the C side anyway.
    let msg = msg.into().replace('\0', "\\0");
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = CString::new(msg).ok();
    });
}

pub fn clear_last_error() {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

/// Get a pointer to the last error message, or null if none.
///
/// The returned pointer is valid until the next `pyb_*` call.
/// Do NOT free this pointer.
#[no_mangle]
pub extern "C" fn pyb_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| {
        cell.borrow()
            .as_ref()
            .map_or(std::ptr::null(), |s| s.as_ptr())
    })
}

#[no_mangle]
pub extern "C" fn pyb_last_error_clear() {
    clear_last_error();
}
