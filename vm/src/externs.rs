// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Blockchain-provided services consumed by the host. Implementations live
//! in the embedding node; the `testing` feature ships in-memory mocks.

use kestrel_common::Address;

/// Account book and code registry access.
pub trait BlockchainHook {
    /// Derives the address of a contract about to be created by `creator`.
    fn new_address(&self, creator: &Address) -> anyhow::Result<Address>;

    /// Fetches the code deployed at `address`.
    fn get_code(&self, address: &Address) -> anyhow::Result<Vec<u8>>;

    fn increase_nonce(&mut self, address: &Address);

    /// Reads committed storage. Missing keys read as empty.
    fn get_storage_data(&self, address: &Address, key: &[u8]) -> Vec<u8>;

    /// Entropy for the per-execution PRNG.
    fn current_random_seed(&self) -> Vec<u8>;
}

/// Cryptographic primitives.
pub trait CryptoHook {
    fn keccak256(&self, data: &[u8]) -> anyhow::Result<[u8; 32]>;
}
