// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The current call frame: who calls whom, with which arguments, through
//! which live instance. Stackable for nested invocations; the instance
//! stack is managed separately from the input state because instances
//! outlive the input swap during indirect deployments.

use kestrel_common::{Address, ContractCallInput, VMInput};

use crate::errors::{Result, VmError};
use crate::executor::{BreakpointValue, Executor, Instance};
use crate::{INIT_FUNCTION_NAME, INIT_FUNCTION_NAME_ETH};

/// Which hook-error categories abort execution outright. The default is
/// fail-fast across the board; embedders relax categories only for
/// compatibility replays.
#[derive(Debug, Clone, Copy)]
pub struct ErrorPolicy {
    pub managed_buffer_fails_execution: bool,
    pub big_int_fails_execution: bool,
    pub big_float_fails_execution: bool,
    pub api_fails_execution: bool,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy {
            managed_buffer_fails_execution: true,
            big_int_fails_execution: true,
            big_float_fails_execution: true,
            api_fails_execution: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RuntimeState {
    vm_input: VMInput,
    sc_address: Address,
    call_function: String,
    read_only: bool,
}

pub struct RuntimeContext {
    executor: Box<dyn Executor>,
    state: RuntimeState,
    state_stack: Vec<RuntimeState>,
    instance: Option<Box<dyn Instance>>,
    instance_stack: Vec<Option<Box<dyn Instance>>>,
    error_policy: ErrorPolicy,
}

impl RuntimeContext {
    pub fn new(executor: Box<dyn Executor>) -> Self {
        RuntimeContext {
            executor,
            state: RuntimeState::default(),
            state_stack: Vec::new(),
            instance: None,
            instance_stack: Vec::new(),
            error_policy: ErrorPolicy::default(),
        }
    }

    pub fn init_state(&mut self) {
        self.state = RuntimeState::default();
    }

    pub fn init_state_from_call_input(&mut self, input: &ContractCallInput) {
        self.state = RuntimeState {
            vm_input: input.vm_input.clone(),
            sc_address: input.recipient_addr.clone(),
            call_function: input.function.clone(),
            read_only: false,
        };
    }

    pub fn push_state(&mut self) {
        self.state_stack.push(self.state.clone());
    }

    pub fn pop_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.state = state;
        }
    }

    pub fn clear_state_stack(&mut self) {
        self.state_stack.clear();
    }

    pub fn set_vm_input(&mut self, input: VMInput) {
        self.state.vm_input = input;
    }

    pub fn vm_input(&self) -> &VMInput {
        &self.state.vm_input
    }

    pub fn set_sc_address(&mut self, address: Address) {
        self.state.sc_address = address;
    }

    pub fn sc_address(&self) -> &Address {
        &self.state.sc_address
    }

    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.state.vm_input.arguments
    }

    pub fn function(&self) -> &str {
        &self.state.call_function
    }

    pub fn read_only(&self) -> bool {
        self.state.read_only
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.state.read_only = read_only;
    }

    /// Parses an upgrade invocation's arguments: `[new_code, metadata]`.
    pub fn code_upgrade_from_args(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let args = self.arguments();
        if args.len() < 2 {
            return Err(VmError::InvalidUpgradeArguments);
        }
        Ok((args[0].clone(), args[1].clone()))
    }

    /// The export named by the call input, if the instance has it.
    pub fn function_to_call(&self) -> Result<String> {
        let instance = self.instance.as_ref().ok_or(VmError::NoInstanceAvailable)?;
        if instance.has_function(&self.state.call_function) {
            Ok(self.state.call_function.clone())
        } else {
            Err(VmError::FunctionNotFound)
        }
    }

    /// The constructor export, if the contract defines one.
    pub fn init_function(&self) -> Option<&'static str> {
        let instance = self.instance.as_ref()?;
        if instance.has_function(INIT_FUNCTION_NAME) {
            Some(INIT_FUNCTION_NAME)
        } else if instance.has_function(INIT_FUNCTION_NAME_ETH) {
            Some(INIT_FUNCTION_NAME_ETH)
        } else {
            None
        }
    }

    // Instance lifecycle.

    pub fn create_instance(&mut self, code: &[u8], gas_limit: u64) -> Result<()> {
        let instance = self.executor.new_instance(code, gas_limit)?;
        self.instance = Some(instance);
        Ok(())
    }

    pub fn verify_contract_code(&self) -> Result<()> {
        let instance = self.instance.as_ref().ok_or(VmError::NoInstanceAvailable)?;
        instance.verify_code()?;
        Ok(())
    }

    pub fn set_instance_context_id(&mut self, id: i32) {
        if let Some(instance) = self.instance.as_mut() {
            instance.set_context_id(id);
        }
    }

    pub fn call_function(&mut self, name: &str) -> Result<()> {
        let instance = self.instance.as_mut().ok_or(VmError::NoInstanceAvailable)?;
        instance.call(name)?;
        Ok(())
    }

    pub fn clean_instance(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            instance.clean();
        }
    }

    /// Parks the current instance while a nested instance runs.
    pub fn push_instance(&mut self) {
        self.instance_stack.push(self.instance.take());
    }

    /// Cleans the nested instance and restores the parked one.
    pub fn pop_instance(&mut self) {
        self.clean_instance();
        self.instance = self.instance_stack.pop().flatten();
    }

    pub fn instance_stack_depth(&self) -> usize {
        self.instance_stack.len()
    }

    pub fn has_instance(&self) -> bool {
        self.instance.is_some()
    }

    // Sandbox memory, through the engine's linear memory.

    pub fn mem_load(&self, offset: i32, length: i32) -> Result<Vec<u8>> {
        let instance = self.instance.as_ref().ok_or(VmError::NoInstanceAvailable)?;
        instance.mem_load(offset, length)
    }

    pub fn mem_store(&mut self, offset: i32, data: &[u8]) -> Result<()> {
        let instance = self.instance.as_mut().ok_or(VmError::NoInstanceAvailable)?;
        instance.mem_store(offset, data)
    }

    // Breakpoints.

    pub fn get_runtime_breakpoint_value(&self) -> BreakpointValue {
        self.instance
            .as_ref()
            .map(|instance| instance.breakpoint_value())
            .unwrap_or(BreakpointValue::None)
    }

    pub fn set_runtime_breakpoint_value(&mut self, value: BreakpointValue) {
        if let Some(instance) = self.instance.as_mut() {
            instance.set_breakpoint_value(value);
        }
    }

    // Failure policy per hook-error category.

    pub fn managed_buffer_api_error_should_fail_execution(&self) -> bool {
        self.error_policy.managed_buffer_fails_execution
    }

    pub fn big_int_api_error_should_fail_execution(&self) -> bool {
        self.error_policy.big_int_fails_execution
    }

    pub fn big_float_api_error_should_fail_execution(&self) -> bool {
        self.error_policy.big_float_fails_execution
    }

    pub fn api_error_should_fail_execution(&self) -> bool {
        self.error_policy.api_fails_execution
    }

    pub fn set_error_policy(&mut self, policy: ErrorPolicy) {
        self.error_policy = policy;
    }
}
