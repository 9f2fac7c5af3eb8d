// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Data types shared between the Kestrel VM host and its embedders: call
//! inputs, the execution artifact ([`VMOutput`]), and the return-code
//! taxonomy. This crate carries no host logic.

mod input;
mod output;

pub use input::{CallType, CodeDeployInput, ContractCallInput, ContractCreateInput, VMInput};
pub use output::{
    LogEntry, OutputAccount, OutputTransfer, ReturnCode, StorageUpdate, VMOutput,
};

/// A raw account address. Addresses are opaque to the host; only the
/// blockchain hook interprets them.
pub type Address = Vec<u8>;
