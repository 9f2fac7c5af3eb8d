// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Accumulates the effects of an execution (return data, account deltas,
//! transfers, logs, return code) and renders the final artifact.

use std::collections::BTreeMap;

use num_bigint::{BigInt, BigUint};

use kestrel_common::{
    Address, CodeDeployInput, LogEntry, OutputAccount, OutputTransfer, ReturnCode, StorageUpdate,
    VMOutput,
};

use crate::errors::Result;

#[derive(Debug, Clone, Default)]
struct OutputState {
    return_data: Vec<Vec<u8>>,
    return_code: ReturnCode,
    return_message: String,
    accounts: BTreeMap<Address, OutputAccount>,
    logs: Vec<LogEntry>,
}

#[derive(Default)]
pub struct OutputContext {
    state: OutputState,
    state_stack: Vec<OutputState>,
}

impl OutputContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_state(&mut self) {
        self.state = OutputState::default();
    }

    pub fn push_state(&mut self) {
        self.state_stack.push(self.state.clone());
        self.state = OutputState::default();
    }

    pub fn pop_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.state = state;
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }

    fn account_mut(&mut self, address: &Address) -> &mut OutputAccount {
        self.state
            .accounts
            .entry(address.clone())
            .or_insert_with(|| OutputAccount::new(address.clone()))
    }

    /// Credits the transaction value to the receiving account.
    pub fn add_tx_value_to_account(&mut self, address: &Address, value: &BigUint) {
        let account = self.account_mut(address);
        account.balance_delta += BigInt::from(value.clone());
    }

    /// Records a value transfer between two accounts.
    pub fn transfer(
        &mut self,
        destination: &Address,
        sender: &Address,
        nonce: u64,
        value: &BigUint,
        data: &[u8],
    ) -> Result<()> {
        let value_signed = BigInt::from(value.clone());

        let sender_account = self.account_mut(sender);
        sender_account.balance_delta -= value_signed.clone();

        let dest_account = self.account_mut(destination);
        dest_account.balance_delta += value_signed;
        dest_account.nonce = nonce;
        dest_account.data = data.to_vec();
        dest_account.output_transfers.push(OutputTransfer {
            value: value.clone(),
            gas_limit: 0,
            data: data.to_vec(),
            sender_address: sender.clone(),
        });
        Ok(())
    }

    /// Stages a storage write against `address`.
    pub fn record_storage_update(&mut self, address: &Address, update: StorageUpdate) {
        let account = self.account_mut(address);
        account.storage_updates.insert(update.offset.clone(), update);
    }

    /// A pending storage write for `(address, key)`, if one is staged.
    pub fn pending_storage_update(
        &self,
        address: &Address,
        key: &[u8],
    ) -> Option<&StorageUpdate> {
        self.state
            .accounts
            .get(address)
            .and_then(|account| account.storage_updates.get(key))
    }

    /// Records freshly deployed code against its contract account.
    pub fn deploy_code(&mut self, input: &CodeDeployInput) {
        let account = self.account_mut(&input.contract_address);
        account.code = Some(input.contract_code.clone());
        account.code_metadata = input.contract_code_metadata.clone();
    }

    /// Appends to the invocation's return data.
    pub fn finish(&mut self, data: Vec<u8>) {
        self.state.return_data.push(data);
    }

    pub fn write_log(&mut self, address: &Address, topics: Vec<Vec<u8>>, data: Vec<u8>) {
        self.state.logs.push(LogEntry {
            identifier: Vec::new(),
            address: address.clone(),
            topics,
            data,
        });
    }

    pub fn set_return_code(&mut self, code: ReturnCode) {
        self.state.return_code = code;
    }

    pub fn return_code(&self) -> ReturnCode {
        self.state.return_code
    }

    pub fn set_return_message(&mut self, message: impl Into<String>) {
        self.state.return_message = message.into();
    }

    pub fn return_message(&self) -> &str {
        &self.state.return_message
    }

    /// Renders the artifact of a completed execution.
    pub fn get_vm_output(&self, gas_remaining: u64) -> VMOutput {
        VMOutput {
            return_data: self.state.return_data.clone(),
            return_code: self.state.return_code,
            return_message: self.state.return_message.clone(),
            gas_remaining,
            output_accounts: self.state.accounts.clone(),
            logs: self.state.logs.clone(),
        }
    }

    /// The canonical error artifact: nothing but the classification and
    /// message survive, and the whole gas supply counts as consumed.
    pub fn create_vm_output_in_case_of_error(
        &self,
        return_code: ReturnCode,
        message: impl Into<String>,
    ) -> VMOutput {
        VMOutput {
            return_code,
            return_message: message.into(),
            gas_remaining: 0,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_accumulates_in_order() {
        let mut output = OutputContext::new();
        output.finish(b"one".to_vec());
        output.finish(b"two".to_vec());
        let artifact = output.get_vm_output(7);
        assert_eq!(artifact.return_data, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(artifact.gas_remaining, 7);
    }

    #[test]
    fn logs_accumulate_in_order() {
        let mut output = OutputContext::new();
        let emitter: Address = vec![5; 4];
        output.write_log(&emitter, vec![b"topic".to_vec()], b"first".to_vec());
        output.write_log(&emitter, Vec::new(), b"second".to_vec());
        let artifact = output.get_vm_output(0);
        assert_eq!(artifact.logs.len(), 2);
        assert_eq!(artifact.logs[0].data, b"first");
        assert_eq!(artifact.logs[1].data, b"second");
        assert_eq!(artifact.logs[0].address, emitter);
    }

    #[test]
    fn transfer_balances_the_deltas() {
        let mut output = OutputContext::new();
        let src: Address = vec![1; 4];
        let dst: Address = vec![2; 4];
        output
            .transfer(&dst, &src, 3, &BigUint::from(100u32), b"hello")
            .unwrap();

        let artifact = output.get_vm_output(0);
        let sender = &artifact.output_accounts[&src];
        let dest = &artifact.output_accounts[&dst];
        assert_eq!(sender.balance_delta, BigInt::from(-100));
        assert_eq!(dest.balance_delta, BigInt::from(100));
        assert_eq!(dest.nonce, 3);
        assert_eq!(dest.output_transfers.len(), 1);
        assert_eq!(dest.output_transfers[0].value, BigUint::from(100u32));
    }

    #[test]
    fn error_artifact_is_canonical() {
        let mut output = OutputContext::new();
        output.finish(b"data that must not survive".to_vec());
        output.add_tx_value_to_account(&vec![9; 4], &BigUint::from(5u32));

        let artifact =
            output.create_vm_output_in_case_of_error(ReturnCode::ContractInvalid, "bad code");
        assert_eq!(artifact.return_code, ReturnCode::ContractInvalid);
        assert_eq!(artifact.return_message, "bad code");
        assert_eq!(artifact.gas_remaining, 0);
        assert!(artifact.return_data.is_empty());
        assert!(artifact.output_accounts.is_empty());
    }

    #[test]
    fn state_stack_round_trip() {
        let mut output = OutputContext::new();
        output.set_return_message("outer");
        output.push_state();
        output.set_return_code(ReturnCode::UserError);
        output.set_return_message("inner");
        output.pop_state();
        assert_eq!(output.return_code(), ReturnCode::Ok);
        assert_eq!(output.return_message(), "outer");
    }
}
