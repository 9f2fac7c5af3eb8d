// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The Kestrel VM host: drives sandboxed WASM smart-contract execution,
//! enforces a deterministic gas budget, mediates access to
//! blockchain-provided services, and implements cross-contract invocation.
//!
//! The WASM engine itself is consumed behind the [`executor`] traits; this
//! crate owns everything on the host side of that boundary: the execution
//! driver, the gas meter, the managed-types table and its contract-facing
//! hook surface, the output builder, and the async-call data model.

pub mod async_call;
pub mod errors;
pub mod executor;
pub mod externs;
pub mod gas;
pub mod host;
pub mod host_context;
pub mod hooks;
pub mod managed_types;
pub mod output;
pub mod runtime;
pub mod storage;

#[cfg(feature = "testing")]
pub mod testing;

pub use errors::{Result, VmError};
pub use host::VmHost;

/// Name of the constructor export, reserved for deploys and upgrades.
pub const INIT_FUNCTION_NAME: &str = "init";
/// Ethereum-compatibility alias for the constructor export.
pub const INIT_FUNCTION_NAME_ETH: &str = "_init";

/// Width of one argument word in Ethereum-compatible call data.
pub const ETH_ARGUMENT_LEN: usize = 32;
