// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::Address;

/// How an invocation entered the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    DirectCall,
    AsynchronousCall,
    AsynchronousCallBack,
}

impl Default for CallType {
    fn default() -> Self {
        CallType::DirectCall
    }
}

/// The common part of every invocation: who calls, with what value, what
/// arguments, and under which gas budget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VMInput {
    pub caller_addr: Address,
    pub arguments: Vec<Vec<u8>>,
    pub call_value: BigUint,
    pub call_type: CallType,
    pub gas_price: u64,
    /// The full gas supply for this invocation.
    pub gas_provided: u64,
    /// Gas reserved for an eventual async callback; not spendable by the
    /// contract itself unless unlocked.
    pub gas_locked: u64,
    pub current_tx_hash: Vec<u8>,
}

/// Input for invoking a function on a deployed contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractCallInput {
    pub vm_input: VMInput,
    pub recipient_addr: Address,
    pub function: String,
}

/// Input for deploying a new contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractCreateInput {
    pub vm_input: VMInput,
    pub contract_code: Vec<u8>,
    pub contract_code_metadata: Vec<u8>,
}

/// The resolved parameters of a code deployment, direct or indirect.
#[derive(Debug, Clone, Default)]
pub struct CodeDeployInput {
    pub contract_code: Vec<u8>,
    pub contract_code_metadata: Vec<u8>,
    pub contract_address: Address,
}
