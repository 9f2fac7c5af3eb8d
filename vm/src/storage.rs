// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Key/value access scoped to the executing contract. Writes are staged in
//! the output frame; reads serve pending writes first (the cache) and fall
//! back to committed chain state through the blockchain hook.

use kestrel_common::{Address, StorageUpdate};

use crate::errors::{Result, VmError};
use crate::externs::BlockchainHook;
use crate::gas::MeteringContext;
use crate::output::OutputContext;

#[derive(Default)]
pub struct StorageContext {
    address: Address,
    address_stack: Vec<Address>,
}

impl StorageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_state(&mut self) {
        self.address.clear();
    }

    pub fn push_state(&mut self) {
        self.address_stack.push(self.address.clone());
    }

    pub fn pop_state(&mut self) {
        if let Some(address) = self.address_stack.pop() {
            self.address = address;
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.address_stack.clear();
    }

    /// Scopes subsequent storage operations to `address`.
    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Stages a write against the scoped account and returns the number of
    /// bytes written. Charged per byte, bounded.
    pub fn set_storage(
        &mut self,
        metering: &mut MeteringContext,
        output: &mut OutputContext,
        read_only: bool,
        key: &[u8],
        value: &[u8],
    ) -> Result<u64> {
        if read_only {
            return Err(VmError::CannotWriteOnReadOnly);
        }

        let cost = metering.schedule().store_cost(value.len());
        metering.use_gas_bounded(cost)?;

        let update = StorageUpdate {
            offset: key.to_vec(),
            data: value.to_vec(),
        };
        output.record_storage_update(&self.address, update);
        Ok(value.len() as u64)
    }

    /// Reads a key in the scoped account. The boolean reports whether the
    /// value came from the pending-write cache.
    pub fn get_storage(
        &self,
        output: &OutputContext,
        blockchain: &dyn BlockchainHook,
        key: &[u8],
    ) -> (Vec<u8>, bool) {
        self.get_storage_from_address(output, blockchain, &self.address, key)
    }

    /// Reads a key in an arbitrary account, pending writes included.
    pub fn get_storage_from_address(
        &self,
        output: &OutputContext,
        blockchain: &dyn BlockchainHook,
        address: &Address,
        key: &[u8],
    ) -> (Vec<u8>, bool) {
        if let Some(update) = output.pending_storage_update(address, key) {
            return (update.data.clone(), true);
        }
        (blockchain.get_storage_data(address, key), false)
    }

    /// Charges a storage read, discounted when the cache served it.
    pub fn use_gas_for_storage_load(
        &self,
        metering: &mut MeteringContext,
        api_name: &str,
        load_cost: u64,
        used_cache: bool,
    ) {
        let cost = if used_cache {
            metering.schedule().base_operation_cost.cached_storage_load
        } else {
            load_cost
        };
        metering.use_gas_and_add_traced_gas(api_name, cost);
    }
}
