// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The host: one value owning every execution context, the consumed
//! blockchain services, and the driver entry points (see [`execution`]).

mod execution;

use kestrel_common::ReturnCode;

use crate::errors::{Result, VmError};
use crate::executor::{BreakpointValue, Executor};
use crate::externs::{BlockchainHook, CryptoHook};
use crate::gas::{GasSchedule, MeteringContext};
use crate::managed_types::{derive_random_seed, ManagedTypesContext};
use crate::output::OutputContext;
use crate::runtime::RuntimeContext;
use crate::storage::StorageContext;

pub struct VmHost {
    pub(crate) blockchain: Box<dyn BlockchainHook>,
    pub(crate) crypto: Box<dyn CryptoHook>,
    pub(crate) runtime: RuntimeContext,
    pub(crate) metering: MeteringContext,
    pub(crate) output: OutputContext,
    pub(crate) storage: StorageContext,
    pub(crate) managed_types: ManagedTypesContext,
    pub(crate) eth_input: Option<Vec<u8>>,
}

impl VmHost {
    pub fn new(
        executor: Box<dyn Executor>,
        blockchain: Box<dyn BlockchainHook>,
        crypto: Box<dyn CryptoHook>,
        schedule: GasSchedule,
    ) -> Self {
        VmHost {
            blockchain,
            crypto,
            runtime: RuntimeContext::new(executor),
            metering: MeteringContext::new(schedule),
            output: OutputContext::new(),
            storage: StorageContext::new(),
            managed_types: ManagedTypesContext::new(),
            eth_input: None,
        }
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut RuntimeContext {
        &mut self.runtime
    }

    pub fn metering(&self) -> &MeteringContext {
        &self.metering
    }

    pub fn metering_mut(&mut self) -> &mut MeteringContext {
        &mut self.metering
    }

    pub fn output(&self) -> &OutputContext {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputContext {
        &mut self.output
    }

    pub fn storage(&self) -> &StorageContext {
        &self.storage
    }

    pub fn managed_types(&self) -> &ManagedTypesContext {
        &self.managed_types
    }

    pub fn managed_types_mut(&mut self) -> &mut ManagedTypesContext {
        &mut self.managed_types
    }

    // Frame discipline. One frame spans runtime input, metering, output,
    // storage scope and the managed-types table; nested calls push all of
    // them and every early-exit path pops what it pushed.

    pub fn init_state(&mut self) {
        self.runtime.init_state();
        self.metering.init_state();
        self.output.init_state();
        self.storage.init_state();
        self.managed_types.init_state();
        self.eth_input = None;
    }

    pub fn push_state(&mut self) {
        self.runtime.push_state();
        self.metering.push_state();
        self.output.push_state();
        self.storage.push_state();
        self.managed_types.push_state();
    }

    pub fn pop_state(&mut self) {
        self.runtime.pop_state();
        self.metering.pop_state();
        self.output.pop_state();
        self.storage.pop_state();
        self.managed_types.pop_state();
    }

    pub fn clear_state_stack(&mut self) {
        self.runtime.clear_state_stack();
        self.metering.clear_state_stack();
        self.output.clear_state_stack();
        self.storage.clear_state_stack();
        self.managed_types.clear_state_stack();
    }

    // Fault funnel. Hooks classify failures here; fatal categories arm the
    // breakpoint register so the executor unwinds back to the driver.

    /// Unwraps a hook-level result, recording the error when present.
    /// Returns `None` exactly when the hook must bail out with its
    /// documented failure status code.
    pub(crate) fn with_fault<T>(&mut self, result: Result<T>, should_fail: bool) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.record_fault(err, should_fail);
                None
            }
        }
    }

    pub(crate) fn record_fault(&mut self, err: VmError, should_fail: bool) {
        log::trace!("hook fault: {} (fatal: {})", err, should_fail);
        if should_fail {
            self.fail_execution(&err);
        }
    }

    /// Arms the abort machinery for `err`: classifies it into a return
    /// code, stores the message, and sets the matching breakpoint.
    pub(crate) fn fail_execution(&mut self, err: &VmError) {
        match err {
            VmError::SignalError => {
                self.output.set_return_code(ReturnCode::UserError);
                self.runtime
                    .set_runtime_breakpoint_value(BreakpointValue::SignalError);
            }
            VmError::NotEnoughGas => {
                self.output.set_return_code(ReturnCode::OutOfGas);
                self.output.set_return_message(err.to_string());
                self.runtime
                    .set_runtime_breakpoint_value(BreakpointValue::OutOfGas);
            }
            _ => {
                self.output.set_return_code(ReturnCode::ExecutionFailed);
                self.output.set_return_message(err.to_string());
                self.runtime
                    .set_runtime_breakpoint_value(BreakpointValue::ExecutionFailed);
            }
        }
    }

    /// Maps an armed breakpoint back to the error the driver propagates.
    pub(crate) fn handle_breakpoint(&mut self, value: BreakpointValue) -> Result<()> {
        match value {
            BreakpointValue::None => Ok(()),
            // The async call is already enqueued; the step itself ended
            // cleanly and the gas reservation stays claimed.
            BreakpointValue::AsyncCall => Ok(()),
            BreakpointValue::SignalError => Err(VmError::SignalError),
            BreakpointValue::OutOfGas => Err(VmError::NotEnoughGas),
            BreakpointValue::ExecutionFailed => Err(VmError::ExecutionFailed),
        }
    }

    /// Seed for the per-execution PRNG, derived from chain entropy and the
    /// transaction hash.
    pub(crate) fn random_seed(&self) -> [u8; 32] {
        let block_seed = self.blockchain.current_random_seed();
        derive_random_seed(&block_seed, &self.runtime.vm_input().current_tx_hash)
    }
}
