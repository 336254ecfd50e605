//! Host-facing wrapper over one owned interpreter object.
//!
//! A [`Proxy`] is an explicit capability-dispatch object: attribute reads go
//! through [`Proxy::get_attribute`] / [`Proxy::member`], calls through
//! [`Proxy::call`], and both hand back fresh proxies so chains never expose a
//! raw reference. Any syntax sugar belongs in the caller (see the C ABI in
//! [`crate::ffi`]).

use std::fmt;

use crate::error::{BridgeError, Result};
use crate::handle::{Handle, Owned};
use crate::value::Value;

#[derive(Clone, PartialEq, Eq)]
pub struct Proxy {
    handle: Owned,
}

/// Introspection markers. They are not names, so an interpreter attribute
/// can never shadow them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Handle,
    TypeName,
}

/// What a member lookup is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    Name(&'a str),
    Marker(Marker),
}

/// Operations every proxy carries natively. They answer only to names the
/// interpreter object does not define itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Call,
    ToString,
    ValueOf,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Intrinsic> {
        match name {
            "call" => Some(Intrinsic::Call),
            "to_string" => Some(Intrinsic::ToString),
            "value_of" => Some(Intrinsic::ValueOf),
            _ => None,
        }
    }
}

/// Result of [`Proxy::member`].
#[derive(Debug)]
pub enum Member {
    Attribute(Proxy),
    Intrinsic(Intrinsic),
    Handle(Handle),
    TypeName(String),
}

impl Proxy {
    pub fn handle(&self) -> Handle {
        self.handle.handle()
    }

    pub fn into_owned(self) -> Owned {
        self.handle
    }

    /// True if this proxies the interpreter's `None`.
    pub fn is_absent(&self) -> bool {
        self.handle().is_absent()
    }

    /// Interpreter attribute lookup. Never fails: a miss is `None` and leaves
    /// no error pending.
    pub fn get_attribute(&self, name: &str) -> Option<Proxy> {
        self.handle.get_attribute(name).map(Proxy::from)
    }

    /// Resolve `key` the way host member syntax would.
    ///
    /// Interpreter attributes win over [`Intrinsic`] names; markers are
    /// answered by the proxy and never looked up in the interpreter.
    pub fn member(&self, key: Key<'_>) -> Option<Member> {
        match key {
            Key::Marker(Marker::Handle) => Some(Member::Handle(self.handle())),
            Key::Marker(Marker::TypeName) => Some(Member::TypeName(self.handle().type_name())),
            Key::Name(name) => self
                .get_attribute(name)
                .map(Member::Attribute)
                .or_else(|| Intrinsic::from_name(name).map(Member::Intrinsic)),
        }
    }

    /// Run one of the proxy's native operations.
    pub fn invoke(&self, intrinsic: Intrinsic, args: &[Value]) -> Result<Value> {
        match intrinsic {
            Intrinsic::Call => self.call(args).map(Value::Object),
            Intrinsic::ToString => self.str().map(Value::Str),
            Intrinsic::ValueOf => self.value_of(),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Proxy> {
        self.call_with(args, &[])
    }

    pub fn call_with(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Proxy> {
        self.handle.call(args, kwargs).map(Proxy::from)
    }

    /// `obj.name(*args, **kwargs)`.
    pub fn call_method(
        &self,
        name: &str,
        args: &[Value],
        kwargs: &[(&str, Value)],
    ) -> Result<Proxy> {
        let method = self
            .get_attribute(name)
            .ok_or_else(|| BridgeError::MissingAttribute(name.to_string()))?;
        method.call_with(args, kwargs)
    }

    pub fn set_attribute(&self, name: &str, value: &Value) -> Result<()> {
        self.handle.set_attribute(name, value)
    }

    pub fn str(&self) -> Result<String> {
        self.handle.str()
    }

    pub fn repr(&self) -> Result<String> {
        self.handle.repr()
    }

    pub fn value_of(&self) -> Result<Value> {
        self.handle.value_of()
    }
}

impl From<Owned> for Proxy {
    fn from(handle: Owned) -> Self {
        Proxy { handle }
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.str() {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "<unprintable {} object>", self.handle().type_name()),
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("handle", &self.handle())
            .field("type", &self.handle().type_name())
            .finish()
    }
}
