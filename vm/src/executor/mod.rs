// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The engine boundary. The host never compiles or runs WASM itself; it
//! consumes an [`Executor`] that instantiates contract code and an
//! [`Instance`] that exposes calls, linear memory, and the breakpoint
//! register. Imports reach back into the host through the context id set
//! with [`Instance::set_context_id`].

mod vm_hooks;

pub use vm_hooks::VMHooks;

use crate::errors::{Result, VmError};

/// Runtime-level signalling register. Host code sets a breakpoint to make
/// the executor abort the current WASM frame with a specific reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointValue {
    None,
    ExecutionFailed,
    AsyncCall,
    SignalError,
    OutOfGas,
}

/// Instantiates contract code. Implemented by the embedder over a real
/// WASM engine; the `testing` feature ships a mock.
pub trait Executor {
    fn new_instance(&self, code: &[u8], gas_limit: u64) -> anyhow::Result<Box<dyn Instance>>;
}

/// One live contract instance.
pub trait Instance {
    /// Validates the compiled module beyond what instantiation checks.
    fn verify_code(&self) -> anyhow::Result<()>;

    /// Attaches the host-context id under which imports will find the host.
    fn set_context_id(&mut self, id: i32);

    fn has_function(&self, name: &str) -> bool;

    /// Runs a named export to completion. An error means the frame was
    /// unwound; the breakpoint register says why, if the host aborted it.
    fn call(&mut self, name: &str) -> anyhow::Result<()>;

    /// Reads `length` bytes of linear memory starting at `offset`.
    fn mem_load(&self, offset: i32, length: i32) -> Result<Vec<u8>>;

    /// Writes `data` into linear memory starting at `offset`.
    fn mem_store(&mut self, offset: i32, data: &[u8]) -> Result<()>;

    fn breakpoint_value(&self) -> BreakpointValue;

    fn set_breakpoint_value(&mut self, value: BreakpointValue);

    /// Releases engine resources. Idempotent.
    fn clean(&mut self);
}

/// Bounds-checks a (offset, length) pair against a memory size, the shared
/// guard for every `mem_load`/`mem_store` implementation.
pub fn check_mem_bounds(mem_len: usize, offset: i32, length: i32) -> Result<()> {
    if offset < 0 || length < 0 {
        return Err(VmError::BadBounds { offset, length });
    }
    let end = offset as u64 + length as u64;
    if end > mem_len as u64 {
        return Err(VmError::BadBounds { offset, length });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_bounds() {
        assert!(check_mem_bounds(16, 0, 16).is_ok());
        assert!(check_mem_bounds(16, 8, 8).is_ok());
        assert!(check_mem_bounds(16, 8, 9).is_err());
        assert!(check_mem_bounds(16, -1, 4).is_err());
        assert!(check_mem_bounds(16, 4, -1).is_err());
    }
}
