// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! In-memory engine, blockchain and crypto mocks for driving the host in
//! tests. Contract "code" is a byte key into a table of Rust closures;
//! closures play the role of WASM exports and reach the host the same way
//! real imports do, through the host-context registry.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::anyhow;

use kestrel_common::Address;

use crate::errors::Result;
use crate::executor::{check_mem_bounds, BreakpointValue, Executor, Instance};
use crate::externs::{BlockchainHook, CryptoHook};
use crate::gas::GasSchedule;
use crate::host::VmHost;
use crate::host_context;

pub const MOCK_MEMORY_SIZE: usize = 64 * 1024;

/// One mock export: runs with the host recovered from the registry.
pub type ContractFn = Rc<dyn Fn(&mut VmHost)>;

#[derive(Clone, Default)]
pub struct MockContract {
    functions: HashMap<String, ContractFn>,
}

impl MockContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&mut VmHost) + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Rc::new(body));
        self
    }
}

/// Counts instances cleaned by the runtime, for balance assertions.
#[derive(Clone, Default)]
pub struct CleanCounter(Rc<Cell<usize>>);

impl CleanCounter {
    pub fn get(&self) -> usize {
        self.0.get()
    }
}

pub struct MockExecutor {
    contracts: HashMap<Vec<u8>, MockContract>,
    pub fail_instantiation: bool,
    pub fail_verification: bool,
    clean_counter: CleanCounter,
}

impl MockExecutor {
    pub fn new() -> Self {
        MockExecutor {
            contracts: HashMap::new(),
            fail_instantiation: false,
            fail_verification: false,
            clean_counter: CleanCounter::default(),
        }
    }

    pub fn with_contract(mut self, code: impl Into<Vec<u8>>, contract: MockContract) -> Self {
        self.contracts.insert(code.into(), contract);
        self
    }

    pub fn clean_counter(&self) -> CleanCounter {
        self.clean_counter.clone()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for MockExecutor {
    fn new_instance(&self, code: &[u8], _gas_limit: u64) -> anyhow::Result<Box<dyn Instance>> {
        if self.fail_instantiation {
            return Err(anyhow!("mock engine: instantiation rejected"));
        }
        let contract = self
            .contracts
            .get(code)
            .cloned()
            .ok_or_else(|| anyhow!("mock engine: unknown module"))?;
        Ok(Box::new(MockInstance {
            contract,
            fail_verification: self.fail_verification,
            context_id: Cell::new(0),
            breakpoint: Cell::new(BreakpointValue::None),
            memory: RefCell::new(vec![0u8; MOCK_MEMORY_SIZE]),
            cleaned: Cell::new(false),
            clean_counter: self.clean_counter.clone(),
        }))
    }
}

pub struct MockInstance {
    contract: MockContract,
    fail_verification: bool,
    context_id: Cell<i32>,
    breakpoint: Cell<BreakpointValue>,
    memory: RefCell<Vec<u8>>,
    cleaned: Cell<bool>,
    clean_counter: CleanCounter,
}

impl Instance for MockInstance {
    fn verify_code(&self) -> anyhow::Result<()> {
        if self.fail_verification {
            return Err(anyhow!("mock engine: verification rejected"));
        }
        Ok(())
    }

    fn set_context_id(&mut self, id: i32) {
        self.context_id.set(id);
    }

    fn has_function(&self, name: &str) -> bool {
        self.contract.functions.contains_key(name)
    }

    fn call(&mut self, name: &str) -> anyhow::Result<()> {
        let function = self
            .contract
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("mock engine: export {} not found", name))?;

        let host_ptr = host_context::host_for_context(self.context_id.get())
            .expect("import fired with an unregistered context id");
        // SAFETY: the driver registered the host for exactly this window
        // and runs the instance on this thread; this reborrow models the
        // engine handing its user-data slot back to an import.
        let host = unsafe { &mut *host_ptr };
        function(host);

        if self.breakpoint.get() != BreakpointValue::None {
            return Err(anyhow!("mock engine: execution interrupted"));
        }
        Ok(())
    }

    fn mem_load(&self, offset: i32, length: i32) -> Result<Vec<u8>> {
        let memory = self.memory.borrow();
        check_mem_bounds(memory.len(), offset, length)?;
        let start = offset as usize;
        Ok(memory[start..start + length as usize].to_vec())
    }

    fn mem_store(&mut self, offset: i32, data: &[u8]) -> Result<()> {
        let mut memory = self.memory.borrow_mut();
        check_mem_bounds(memory.len(), offset, data.len() as i32)?;
        let start = offset as usize;
        memory[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn breakpoint_value(&self) -> BreakpointValue {
        self.breakpoint.get()
    }

    fn set_breakpoint_value(&mut self, value: BreakpointValue) {
        self.breakpoint.set(value);
    }

    fn clean(&mut self) {
        if !self.cleaned.replace(true) {
            self.clean_counter.0.set(self.clean_counter.0.get() + 1);
        }
    }
}

/// Account book backed by hash maps.
#[derive(Default)]
pub struct MockBlockchain {
    pub accounts: HashMap<Address, MockAccount>,
    pub next_created_address: Address,
    pub random_seed: Vec<u8>,
}

#[derive(Default, Clone)]
pub struct MockAccount {
    pub nonce: u64,
    pub code: Vec<u8>,
    pub storage: HashMap<Vec<u8>, Vec<u8>>,
}

impl MockBlockchain {
    pub fn new() -> Self {
        MockBlockchain {
            accounts: HashMap::new(),
            next_created_address: vec![0x42; 32],
            random_seed: vec![7; 48],
        }
    }

    pub fn with_code(mut self, address: impl Into<Address>, code: impl Into<Vec<u8>>) -> Self {
        self.accounts.entry(address.into()).or_default().code = code.into();
        self
    }
}

impl BlockchainHook for MockBlockchain {
    fn new_address(&self, _creator: &Address) -> anyhow::Result<Address> {
        Ok(self.next_created_address.clone())
    }

    fn get_code(&self, address: &Address) -> anyhow::Result<Vec<u8>> {
        let account = self
            .accounts
            .get(address)
            .ok_or_else(|| anyhow!("account not found"))?;
        if account.code.is_empty() {
            return Err(anyhow!("account has no code"));
        }
        Ok(account.code.clone())
    }

    fn increase_nonce(&mut self, address: &Address) {
        self.accounts.entry(address.clone()).or_default().nonce += 1;
    }

    fn get_storage_data(&self, address: &Address, key: &[u8]) -> Vec<u8> {
        self.accounts
            .get(address)
            .and_then(|account| account.storage.get(key))
            .cloned()
            .unwrap_or_default()
    }

    fn current_random_seed(&self) -> Vec<u8> {
        self.random_seed.clone()
    }
}

/// Deterministic keccak stand-in: tests assert call-data structure, not
/// cryptography.
pub struct MockCrypto;

impl CryptoHook for MockCrypto {
    fn keccak256(&self, data: &[u8]) -> anyhow::Result<[u8; 32]> {
        let mut hash = [0u8; 32];
        for (i, byte) in data.iter().enumerate() {
            hash[i % 32] = hash[i % 32].wrapping_mul(31).wrapping_add(*byte);
        }
        Ok(hash)
    }
}

/// A host wired to the mocks.
pub fn mock_host(executor: MockExecutor, blockchain: MockBlockchain) -> VmHost {
    VmHost::new(
        Box::new(executor),
        Box::new(blockchain),
        Box::new(MockCrypto),
        GasSchedule::default(),
    )
}
