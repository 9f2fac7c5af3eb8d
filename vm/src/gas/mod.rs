// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Gas accounting. One meter frame per call frame, kept on an explicit
//! stack; nested calls debit the caller frame in full up front and restore
//! the unused remainder only on clean exit, so abnormal exits never leak
//! gas.

mod schedule;

pub use schedule::{BaseOperationCost, GasSchedule, ManagedBufferApiCost, DEFAULT_GAS_SCHEDULE};

use std::collections::HashMap;

use kestrel_common::{CodeDeployInput, VMInput};

use crate::errors::{Result, VmError};

#[derive(Debug, Clone, Default)]
struct MeterFrame {
    gas_provided: u64,
    gas_used: u64,
    gas_locked: u64,
}

pub struct MeteringContext {
    schedule: GasSchedule,
    frame: MeterFrame,
    state_stack: Vec<MeterFrame>,
    gas_traces: HashMap<String, u64>,
    gas_tracing_enabled: bool,
    current_trace: Option<String>,
}

impl MeteringContext {
    pub fn new(schedule: GasSchedule) -> Self {
        MeteringContext {
            schedule,
            frame: MeterFrame::default(),
            state_stack: Vec::new(),
            gas_traces: HashMap::new(),
            gas_tracing_enabled: false,
            current_trace: None,
        }
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    pub fn init_state(&mut self) {
        self.frame = MeterFrame::default();
        self.current_trace = None;
    }

    /// Opens the meter window of a new call frame.
    pub fn init_state_from_input(&mut self, input: &VMInput) {
        self.frame = MeterFrame {
            gas_provided: input.gas_provided,
            gas_used: 0,
            gas_locked: input.gas_locked,
        };
        self.current_trace = None;
    }

    pub fn push_state(&mut self) {
        self.state_stack.push(self.frame.clone());
    }

    pub fn pop_state(&mut self) {
        if let Some(frame) = self.state_stack.pop() {
            self.frame = frame;
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }

    /// Unconditionally debits the current frame.
    pub fn use_gas(&mut self, gas: u64) {
        self.frame.gas_used = self.frame.gas_used.saturating_add(gas);
    }

    /// Debits only if the remaining budget covers the charge.
    pub fn use_gas_bounded(&mut self, gas: u64) -> Result<()> {
        if self.gas_left() < gas {
            log::trace!("out of gas: requested {}, left {}", gas, self.gas_left());
            return Err(VmError::NotEnoughGas);
        }
        self.use_gas(gas);
        Ok(())
    }

    pub fn gas_left(&self) -> u64 {
        self.frame.gas_provided.saturating_sub(self.frame.gas_used)
    }

    /// Reinstates gas after a successful sub-execution.
    pub fn restore_gas(&mut self, gas: u64) {
        self.frame.gas_used = self.frame.gas_used.saturating_sub(gas);
    }

    /// Debits the frame below the top of the stack, i.e. the caller of
    /// the frame currently executing. Falls back to the current frame
    /// when no caller frame exists.
    pub fn use_gas_from_caller(&mut self, gas: u64) {
        match self.state_stack.last_mut() {
            Some(caller) => caller.gas_used = caller.gas_used.saturating_add(gas),
            None => self.use_gas(gas),
        }
    }

    /// Credits unused gas back to the caller frame after a clean nested
    /// exit.
    pub fn restore_gas_to_caller(&mut self, gas: u64) {
        match self.state_stack.last_mut() {
            Some(caller) => caller.gas_used = caller.gas_used.saturating_sub(gas),
            None => self.restore_gas(gas),
        }
    }

    /// Returns gas reserved for an async callback to the spendable budget.
    /// A no-op once an async call has actually claimed the reservation.
    pub fn unlock_gas_if_async_step(&mut self) {
        let locked = std::mem::take(&mut self.frame.gas_locked);
        self.frame.gas_provided = self.frame.gas_provided.saturating_add(locked);
    }

    pub fn gas_locked(&self) -> u64 {
        self.frame.gas_locked
    }

    // Tracing. The traced variants attribute charges to a named counter for
    // diagnostics; they deduct whether or not tracing is enabled.

    pub fn set_gas_tracing(&mut self, enabled: bool) {
        self.gas_tracing_enabled = enabled;
    }

    pub fn start_gas_tracing(&mut self, api_name: &str) {
        self.current_trace = Some(api_name.to_string());
    }

    pub fn use_and_trace_gas(&mut self, gas: u64) {
        self.use_gas(gas);
        if self.gas_tracing_enabled {
            if let Some(name) = self.current_trace.clone() {
                *self.gas_traces.entry(name).or_insert(0) += gas;
            }
        }
    }

    pub fn use_gas_and_add_traced_gas(&mut self, api_name: &str, gas: u64) {
        self.use_gas(gas);
        if self.gas_tracing_enabled {
            *self.gas_traces.entry(api_name.to_string()).or_insert(0) += gas;
        }
    }

    pub fn gas_trace(&self, api_name: &str) -> u64 {
        self.gas_traces.get(api_name).copied().unwrap_or(0)
    }

    // Initial deductions charged before any contract code runs.

    pub fn deduct_initial_gas_for_execution(&mut self, code: &[u8]) -> Result<()> {
        let cost = self
            .schedule
            .base_operation_cost
            .aot_prepare_per_byte
            .saturating_mul(code.len() as u64);
        self.use_gas_bounded(cost)
    }

    pub fn deduct_initial_gas_for_direct_deployment(
        &mut self,
        input: &CodeDeployInput,
    ) -> Result<()> {
        self.deduct_initial_gas_for_deployment(&input.contract_code)
    }

    pub fn deduct_initial_gas_for_indirect_deployment(
        &mut self,
        input: &CodeDeployInput,
    ) -> Result<()> {
        self.deduct_initial_gas_for_deployment(&input.contract_code)
    }

    fn deduct_initial_gas_for_deployment(&mut self, code: &[u8]) -> Result<()> {
        let cost = self
            .schedule
            .base_operation_cost
            .compile_per_byte
            .saturating_mul(code.len() as u64);
        self.use_gas_bounded(cost)
    }
}
