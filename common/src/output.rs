// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
use std::collections::BTreeMap;

use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};

use crate::Address;

/// Terminal classification of an invocation. The numeric discriminants are
/// part of the embedder-facing ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    Ok = 0,
    FunctionNotFound = 1,
    FunctionWrongSignature = 2,
    ContractInvalid = 3,
    UserError = 4,
    OutOfGas = 5,
    ExecutionFailed = 6,
    UpgradeFailed = 7,
}

impl Default for ReturnCode {
    fn default() -> Self {
        ReturnCode::Ok
    }
}

impl ReturnCode {
    pub fn is_success(&self) -> bool {
        *self == ReturnCode::Ok
    }
}

/// A single key/value write staged against an account. Writes are staged in
/// the output artifact; committing them is the embedder's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUpdate {
    pub offset: Vec<u8>,
    pub data: Vec<u8>,
}

/// A value transfer recorded against the receiving account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTransfer {
    pub value: BigUint,
    pub gas_limit: u64,
    pub data: Vec<u8>,
    pub sender_address: Address,
}

/// Accumulated per-account effects of an invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputAccount {
    pub address: Address,
    pub nonce: u64,
    /// Net balance change; negative when the account only paid out.
    pub balance_delta: BigInt,
    pub storage_updates: BTreeMap<Vec<u8>, StorageUpdate>,
    pub code: Option<Vec<u8>>,
    pub code_metadata: Vec<u8>,
    pub data: Vec<u8>,
    pub output_transfers: Vec<OutputTransfer>,
}

impl OutputAccount {
    pub fn new(address: Address) -> Self {
        OutputAccount {
            address,
            ..Default::default()
        }
    }
}

/// An event emitted by a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub identifier: Vec<u8>,
    pub address: Address,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
}

/// The artifact of one top-level invocation. Two executions on equal inputs
/// and equal external state must produce identical artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VMOutput {
    pub return_data: Vec<Vec<u8>>,
    pub return_code: ReturnCode,
    pub return_message: String,
    pub gas_remaining: u64,
    pub output_accounts: BTreeMap<Address, OutputAccount>,
    pub logs: Vec<LogEntry>,
}
