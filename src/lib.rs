//! pybridge: Rust ↔ embedded Python object bridge.
//!
//! Rust code drives a single embedded CPython interpreter and works with its
//! objects as if they were local values:
//!
//! - [`Handle`] / [`Owned`]: borrowed vs. owned references, with the foreign
//!   reference count released exactly once
//! - [`Value`] and [`convert`]: conversion between Rust values and
//!   interpreter objects, classified by built-in type identity
//! - [`Proxy`]: attribute access and calls on interpreter objects
//! - [`BridgeError`]: interpreter exceptions surfaced with message and traceback
//! - [`Session`]: process-wide bootstrap, import and script execution
//!
//! The same operations are exported over a C ABI (`pyb_*`, see [`ffi`]) for
//! hosts that hold objects by integer id.
//!
//! ```no_run
//! use pybridge::{Session, Value};
//!
//! let session = Session::initialize()?;
//! let math = session.import("math")?;
//! let root = math.call_method("sqrt", &[Value::Int(16)], &[])?;
//! assert_eq!(root.value_of()?, Value::Float(4.0));
//! # Ok::<(), pybridge::BridgeError>(())
//! ```

pub mod config;
pub mod convert;
pub mod error;
mod exception;
pub mod ffi;
pub mod handle;
pub mod proxy;
pub mod registry;
pub mod session;
pub mod value;

pub use config::Config;
pub use error::{BridgeError, Result};
pub use handle::{Handle, Owned};
pub use proxy::{Intrinsic, Key, Marker, Member, Proxy};
pub use session::Session;
pub use value::{HostFunction, Value};
