//! Id registry for the C ABI: maps integer ids to [`Proxy`] values.
//!
//! Ids are monotonically increasing `isize` values starting from 1.
//! Id 0 is reserved as the null/error sentinel.
//!
//! Proxies leave the registry before they are dropped, so releasing the
//! interpreter reference never happens under the registry lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{BridgeError, Result};
use crate::proxy::Proxy;

static REGISTRY: Mutex<Option<ProxyRegistry>> = Mutex::new(None);

struct ProxyRegistry {
    objects: HashMap<isize, Proxy>,
    next_id: isize,
}

impl ProxyRegistry {
    fn new() -> Self {
        Self {
            objects: HashMap::new(),
            next_id: 1,
        }
    }
}

fn lock() -> MutexGuard<'static, Option<ProxyRegistry>> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create the registry if it does not exist yet.
pub fn init_registry() {
    lock().get_or_insert_with(ProxyRegistry::new);
}

/// Drop the registry and every proxy in it.
pub fn destroy_registry() {
    let registry = lock().take();
    if let Some(registry) = registry {
        log::debug!("releasing {} registered objects", registry.objects.len());
        drop(registry);
    }
}

pub fn insert(proxy: Proxy) -> Result<isize> {
    let mut guard = lock();
    let reg = guard.as_mut().ok_or(BridgeError::NotInitialized)?;
    let id = reg.next_id;
    reg.next_id = reg
        .next_id
        .checked_add(1)
        .ok_or_else(|| BridgeError::InvalidArgument("id counter overflow".into()))?;
    reg.objects.insert(id, proxy);
    Ok(id)
}

/// A new reference to the proxy behind `id`; the id stays valid.
pub fn get(id: isize) -> Result<Proxy> {
    let guard = lock();
    let reg = guard.as_ref().ok_or(BridgeError::NotInitialized)?;
    reg.objects
        .get(&id)
        .cloned()
        .ok_or(BridgeError::InvalidHandle(id))
}

/// Remove `id` and hand back its proxy for the caller to drop.
pub fn remove(id: isize) -> Result<Proxy> {
    let mut guard = lock();
    let reg = guard.as_mut().ok_or(BridgeError::NotInitialized)?;
    reg.objects.remove(&id).ok_or(BridgeError::InvalidHandle(id))
}

/// Number of live ids (for diagnostics).
pub fn len() -> Result<usize> {
    let guard = lock();
    let reg = guard.as_ref().ok_or(BridgeError::NotInitialized)?;
    Ok(reg.objects.len())
}
