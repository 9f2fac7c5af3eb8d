// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Process-wide registry mapping opaque integer ids to live hosts.
//!
//! Contract imports receive only an integer context; they recover the host
//! by looking the id up here, exactly as a C-ABI engine would hand back a
//! user-data slot. Ids are monotonic for the lifetime of the process; a
//! removed id is never reused.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::host::VmHost;

/// A registered host. The pointee is owned by the driver for the duration
/// of the registration; lookups must only happen from import callbacks
/// running inside that window.
struct HostPtr(*mut VmHost);

// The registry is shared between the controlling thread and the executor
// thread; the pointer itself is only dereferenced on the executor thread.
unsafe impl Send for HostPtr {}

lazy_static! {
    static ref HOST_CONTEXTS: Mutex<HashMap<i32, HostPtr>> = Mutex::new(HashMap::new());
}

static NEXT_CONTEXT_ID: AtomicI32 = AtomicI32::new(1);

/// Registers a host and returns a fresh context id.
pub fn add_host_context(host: &mut VmHost) -> i32 {
    let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::SeqCst);
    HOST_CONTEXTS
        .lock()
        .expect("host context registry poisoned")
        .insert(id, HostPtr(host as *mut VmHost));
    id
}

/// Releases a single registration.
pub fn remove_host_context(id: i32) {
    HOST_CONTEXTS
        .lock()
        .expect("host context registry poisoned")
        .remove(&id);
}

/// Wipes the registry. Invoked on every top-level exit.
pub fn remove_all_host_contexts() {
    HOST_CONTEXTS
        .lock()
        .expect("host context registry poisoned")
        .clear();
}

/// Recovers the host registered under `id`.
///
/// Returns a raw pointer because the import fires while the driver still
/// holds the host; the caller reborrows for the duration of one hook call.
/// An unknown id is fatal to the import: callers abort rather than hand the
/// contract a recoverable error.
pub fn host_for_context(id: i32) -> Option<*mut VmHost> {
    HOST_CONTEXTS
        .lock()
        .expect("host context registry poisoned")
        .get(&id)
        .map(|ptr| ptr.0)
}

pub fn active_context_count() -> usize {
    HOST_CONTEXTS
        .lock()
        .expect("host context registry poisoned")
        .len()
}
