// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Per-execution table of managed types: byte buffers, big integers and
//! big floats, addressed by opaque `i32` handles. Contracts never see the
//! backing memory; everything crosses the sandbox boundary as a handle.

mod bigfloat;

pub use bigfloat::{BigFloat, BIG_FLOAT_PRECISION};

use std::collections::HashMap;

use num_bigint::BigInt;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::errors::{Result, VmError};
use crate::gas::MeteringContext;

/// Identifies one managed-type entry within the current execution.
pub type Handle = i32;

#[derive(Default)]
struct ManagedTypesState {
    buffers: HashMap<Handle, Vec<u8>>,
    big_ints: HashMap<Handle, BigInt>,
    big_floats: HashMap<Handle, BigFloat>,
    next_handle: Handle,
}

#[derive(Default)]
pub struct ManagedTypesContext {
    state: ManagedTypesState,
    state_stack: Vec<ManagedTypesState>,
    random_source: Option<ChaCha20Rng>,
}

impl ManagedTypesContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_state(&mut self) {
        self.state = ManagedTypesState::default();
        self.random_source = None;
    }

    pub fn push_state(&mut self) {
        let snapshot = std::mem::take(&mut self.state);
        self.state_stack.push(snapshot);
        self.state = ManagedTypesState::default();
    }

    pub fn pop_state(&mut self) {
        if let Some(snapshot) = self.state_stack.pop() {
            self.state = snapshot;
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }

    fn next_handle(&mut self) -> Handle {
        self.state.next_handle += 1;
        self.state.next_handle
    }

    // Buffers.

    pub fn new_managed_buffer(&mut self) -> Handle {
        let handle = self.next_handle();
        self.state.buffers.insert(handle, Vec::new());
        handle
    }

    pub fn new_managed_buffer_from_bytes(&mut self, bytes: Vec<u8>) -> Handle {
        let handle = self.next_handle();
        self.state.buffers.insert(handle, bytes);
        handle
    }

    /// Length of the buffer under `handle`, or `-1` when absent.
    pub fn get_length(&self, handle: Handle) -> i32 {
        match self.state.buffers.get(&handle) {
            Some(bytes) => bytes.len() as i32,
            None => -1,
        }
    }

    pub fn get_bytes(&self, handle: Handle) -> Result<Vec<u8>> {
        self.state
            .buffers
            .get(&handle)
            .cloned()
            .ok_or(VmError::NoManagedBufferUnderThisHandle)
    }

    /// Overwrites the buffer under `handle`, creating it when absent.
    pub fn set_bytes(&mut self, handle: Handle, bytes: Vec<u8>) {
        self.state.buffers.insert(handle, bytes);
    }

    /// Appends to an existing buffer; `false` when the handle is absent.
    pub fn append_bytes(&mut self, handle: Handle, bytes: &[u8]) -> bool {
        match self.state.buffers.get_mut(&handle) {
            Some(buffer) => {
                buffer.extend_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    // Big integers.

    pub fn big_int_or_create(&mut self, handle: Handle) -> &mut BigInt {
        self.state.big_ints.entry(handle).or_default()
    }

    pub fn get_big_int(&self, handle: Handle) -> Result<BigInt> {
        self.state
            .big_ints
            .get(&handle)
            .cloned()
            .ok_or(VmError::NoBigIntUnderThisHandle)
    }

    // Big floats.

    pub fn big_float_or_create(&mut self, handle: Handle) -> &mut BigFloat {
        self.state.big_floats.entry(handle).or_default()
    }

    pub fn get_big_float(&self, handle: Handle) -> Result<BigFloat> {
        self.state
            .big_floats
            .get(&handle)
            .cloned()
            .ok_or(VmError::NoBigFloatUnderThisHandle)
    }

    /// Precision check on the wire encoding, without admitting the value.
    pub fn encoded_big_float_is_not_valid(&self, bytes: &[u8]) -> bool {
        BigFloat::decode(bytes).is_err()
    }

    // Randomness.

    /// The deterministic per-execution PRNG, seeded on first use from the
    /// entropy the caller derives from block and transaction state.
    pub fn rand_reader(&mut self, seed: [u8; 32]) -> &mut ChaCha20Rng {
        self.random_source
            .get_or_insert_with(|| ChaCha20Rng::from_seed(seed))
    }

    pub fn fill_random(&mut self, seed: [u8; 32], buffer: &mut [u8]) {
        self.rand_reader(seed).fill_bytes(buffer);
    }

    /// Per-byte charge covering both the copy and the hashing-like work a
    /// byte run implies.
    pub fn consume_gas_for_bytes(&self, metering: &mut MeteringContext, bytes: &[u8]) {
        let cost = metering.schedule().data_copy_cost(bytes.len());
        metering.use_and_trace_gas(cost);
    }
}

/// Folds arbitrary-length entropy into a fixed PRNG seed.
pub fn derive_random_seed(block_seed: &[u8], tx_hash: &[u8]) -> [u8; 32] {
    let mut seed = [0u8; 32];
    for (i, byte) in block_seed.iter().chain(tx_hash.iter()).enumerate() {
        seed[i % 32] ^= byte.rotate_left((i / 32) as u32);
    }
    seed
}
