// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use lazy_static::lazy_static;

lazy_static! {
    pub static ref DEFAULT_GAS_SCHEDULE: GasSchedule = GasSchedule::default();
}

/// The complete gas price table of one host. A schedule is a plain value:
/// the embedder constructs it once (usually from a protocol release) and
/// hands it to the host at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasSchedule {
    pub base_operation_cost: BaseOperationCost,
    pub managed_buffer_api_cost: ManagedBufferApiCost,
}

/// Per-byte and bulk costs shared by many operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseOperationCost {
    /// Copying bytes between host and sandbox, hashing-like work included.
    pub data_copy_per_byte: u64,
    /// Appending bytes to the persistent output artifact.
    pub persist_per_byte: u64,
    /// Writing one byte of contract storage.
    pub store_per_byte: u64,
    /// Compiling one byte of contract code at deployment.
    pub compile_per_byte: u64,
    /// Preparing one byte of already-deployed code for execution.
    pub aot_prepare_per_byte: u64,
    /// Flat cost of a storage read served from the pending-write cache.
    pub cached_storage_load: u64,
}

/// Base cost of each managed-buffer hook, charged on entry before any
/// per-byte component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBufferApiCost {
    pub mbuffer_new: u64,
    pub mbuffer_new_from_bytes: u64,
    pub mbuffer_get_length: u64,
    pub mbuffer_get_bytes: u64,
    pub mbuffer_get_byte_slice: u64,
    pub mbuffer_copy_byte_slice: u64,
    pub mbuffer_set_bytes: u64,
    pub mbuffer_append: u64,
    pub mbuffer_append_bytes: u64,
    pub mbuffer_to_big_int_unsigned: u64,
    pub mbuffer_to_big_int_signed: u64,
    pub mbuffer_from_big_int_unsigned: u64,
    pub mbuffer_from_big_int_signed: u64,
    pub mbuffer_to_big_float: u64,
    pub mbuffer_from_big_float: u64,
    pub mbuffer_storage_store: u64,
    pub mbuffer_storage_load: u64,
    pub mbuffer_get_argument: u64,
    pub mbuffer_finish: u64,
    pub mbuffer_set_random: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        GasSchedule {
            base_operation_cost: BaseOperationCost {
                data_copy_per_byte: 50,
                persist_per_byte: 1_000,
                store_per_byte: 10_000,
                compile_per_byte: 300,
                aot_prepare_per_byte: 100,
                cached_storage_load: 5_000,
            },
            managed_buffer_api_cost: ManagedBufferApiCost {
                mbuffer_new: 2_000,
                mbuffer_new_from_bytes: 2_000,
                mbuffer_get_length: 2_000,
                mbuffer_get_bytes: 4_000,
                mbuffer_get_byte_slice: 4_000,
                mbuffer_copy_byte_slice: 4_000,
                mbuffer_set_bytes: 4_000,
                mbuffer_append: 4_000,
                mbuffer_append_bytes: 4_000,
                mbuffer_to_big_int_unsigned: 4_000,
                mbuffer_to_big_int_signed: 5_000,
                mbuffer_from_big_int_unsigned: 4_000,
                mbuffer_from_big_int_signed: 5_000,
                mbuffer_to_big_float: 8_000,
                mbuffer_from_big_float: 8_000,
                mbuffer_storage_store: 75_000,
                mbuffer_storage_load: 50_000,
                mbuffer_get_argument: 1_000,
                mbuffer_finish: 10_000,
                mbuffer_set_random: 6_000,
            },
        }
    }
}

impl GasSchedule {
    /// Copy cost for a byte run; saturates instead of wrapping.
    pub fn data_copy_cost(&self, len: usize) -> u64 {
        self.base_operation_cost
            .data_copy_per_byte
            .saturating_mul(len as u64)
    }

    /// Output-persistence cost for a byte run.
    pub fn persist_cost(&self, len: usize) -> u64 {
        self.base_operation_cost
            .persist_per_byte
            .saturating_mul(len as u64)
    }

    /// Storage-write cost for a byte run.
    pub fn store_cost(&self, len: usize) -> u64 {
        self.base_operation_cost
            .store_per_byte
            .saturating_mul(len as u64)
    }
}
