// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The execution driver: deploy, upgrade and call entry points, the nested
//! invocation paths, and contract creation from within a contract.
//!
//! Gas discipline: every nested entry debits the caller's frame with the
//! full child supply before anything else and restores the unused portion
//! only on clean exit. Every path that pushes an instance or registers a
//! host context pops and removes it before returning.

use kestrel_common::{
    CodeDeployInput, ContractCallInput, ContractCreateInput, ReturnCode, VMOutput,
};

use crate::errors::{Result, VmError};
use crate::executor::BreakpointValue;
use crate::host::VmHost;
use crate::host_context;
use crate::{ETH_ARGUMENT_LEN, INIT_FUNCTION_NAME, INIT_FUNCTION_NAME_ETH};

impl VmHost {
    /// Deploys a new contract from a top-level transaction.
    pub fn run_sc_create(&mut self, input: &ContractCreateInput) -> VMOutput {
        self.clear_state_stack();
        self.init_state();
        let result = self.do_run_sc_create(input);
        self.on_exit_direct_create_or_call(result)
    }

    fn do_run_sc_create(&mut self, input: &ContractCreateInput) -> Result<VMOutput> {
        log::trace!(
            "run_sc_create: len(code) {}, gas {}",
            input.contract_code.len(),
            input.vm_input.gas_provided
        );

        let address = match self.blockchain.new_address(&input.vm_input.caller_addr) {
            Ok(address) => address,
            Err(err) => {
                self.output.set_return_code(ReturnCode::ExecutionFailed);
                return Err(err.into());
            }
        };

        self.runtime.set_vm_input(input.vm_input.clone());
        self.runtime.set_sc_address(address.clone());
        self.metering.init_state_from_input(&input.vm_input);

        self.output
            .add_tx_value_to_account(&address, &input.vm_input.call_value);
        self.storage.set_address(address.clone());

        let code_deploy_input = CodeDeployInput {
            contract_code: input.contract_code.clone(),
            contract_code_metadata: input.contract_code_metadata.clone(),
            contract_address: address,
        };

        self.perform_code_deploy(&code_deploy_input)
    }

    /// Replaces a deployed contract's code from a top-level transaction.
    /// The new code and its metadata arrive as the first two call
    /// arguments.
    pub fn run_sc_upgrade(&mut self, input: &ContractCallInput) -> VMOutput {
        self.clear_state_stack();
        self.init_state();
        let result = self.do_run_sc_upgrade(input);
        self.on_exit_direct_create_or_call(result)
    }

    fn do_run_sc_upgrade(&mut self, input: &ContractCallInput) -> Result<VMOutput> {
        log::trace!("run_sc_upgrade");

        self.runtime.init_state_from_call_input(input);
        self.metering.init_state_from_input(&input.vm_input);
        self.output
            .add_tx_value_to_account(&input.recipient_addr, &input.vm_input.call_value);
        self.storage.set_address(self.runtime.sc_address().clone());

        let (code, code_metadata) = match self.runtime.code_upgrade_from_args() {
            Ok(parsed) => parsed,
            Err(err) => {
                self.output.set_return_code(ReturnCode::UpgradeFailed);
                return Err(err);
            }
        };

        let code_deploy_input = CodeDeployInput {
            contract_code: code,
            contract_code_metadata: code_metadata,
            contract_address: input.recipient_addr.clone(),
        };

        self.perform_code_deploy(&code_deploy_input)
    }

    fn perform_code_deploy(&mut self, input: &CodeDeployInput) -> Result<VMOutput> {
        log::trace!(
            "perform_code_deploy: address {:?}, len(code) {}",
            input.contract_address,
            input.contract_code.len()
        );

        if let Err(err) = self.metering.deduct_initial_gas_for_direct_deployment(input) {
            self.output.set_return_code(ReturnCode::OutOfGas);
            return Err(err);
        }

        let gas_for_deployment = self.metering.gas_left();
        if let Err(err) = self
            .runtime
            .create_instance(&input.contract_code, gas_for_deployment)
        {
            self.output.set_return_code(ReturnCode::ContractInvalid);
            return Err(err);
        }

        if let Err(err) = self.runtime.verify_contract_code() {
            self.output.set_return_code(ReturnCode::ContractInvalid);
            return Err(err);
        }

        let id_context = host_context::add_host_context(self);
        self.runtime.set_instance_context_id(id_context);

        if let Err(err) = self.call_init_function() {
            self.output
                .set_return_code(ReturnCode::FunctionWrongSignature);
            return Err(err);
        }

        self.output.deploy_code(input);
        Ok(self.vm_output())
    }

    /// Invokes a function of a deployed contract from a top-level
    /// transaction.
    pub fn run_sc_call(&mut self, input: &ContractCallInput) -> VMOutput {
        self.clear_state_stack();
        self.init_state();
        let result = self.do_run_sc_call(input);
        self.on_exit_direct_create_or_call(result)
    }

    fn do_run_sc_call(&mut self, input: &ContractCallInput) -> Result<VMOutput> {
        log::trace!("run_sc_call: function {}", input.function);

        self.runtime.init_state_from_call_input(input);
        self.metering.init_state_from_input(&input.vm_input);
        self.output
            .add_tx_value_to_account(&input.recipient_addr, &input.vm_input.call_value);
        self.storage.set_address(self.runtime.sc_address().clone());

        let contract = match self.blockchain.get_code(self.runtime.sc_address()) {
            Ok(code) => code,
            Err(err) => {
                self.output.set_return_code(ReturnCode::ContractInvalid);
                return Err(err.into());
            }
        };

        if let Err(err) = self.metering.deduct_initial_gas_for_execution(&contract) {
            self.output.set_return_code(ReturnCode::OutOfGas);
            return Err(err);
        }

        let gas_for_execution = self.metering.gas_left();
        if let Err(err) = self.runtime.create_instance(&contract, gas_for_execution) {
            self.output.set_return_code(ReturnCode::ContractInvalid);
            return Err(err);
        }

        let id_context = host_context::add_host_context(self);
        self.runtime.set_instance_context_id(id_context);

        self.call_sc_method()?;

        self.metering.unlock_gas_if_async_step();

        Ok(self.vm_output())
    }

    /// Terminal hook of every top-level entry: cleans the instance, wipes
    /// the host-context registry, and overrides the artifact on error.
    fn on_exit_direct_create_or_call(&mut self, result: Result<VMOutput>) -> VMOutput {
        self.runtime.clean_instance();
        host_context::remove_all_host_contexts();

        match result {
            Ok(vm_output) => vm_output,
            Err(err) => {
                let message = match err {
                    VmError::SignalError => self.output.return_message().to_string(),
                    other => other.to_string(),
                };
                self.output
                    .create_vm_output_in_case_of_error(self.output.return_code(), message)
            }
        }
    }

    /// Nested call in a fresh state frame. The callee's artifact is
    /// captured before the frame pops; the pop runs on every path.
    pub fn execute_on_dest_context(&mut self, input: &ContractCallInput) -> Result<VMOutput> {
        log::trace!("execute_on_dest_context: function {}", input.function);

        self.push_state();
        self.init_state();

        self.runtime.init_state_from_call_input(input);
        self.metering.init_state_from_input(&input.vm_input);
        self.storage.set_address(self.runtime.sc_address().clone());

        let result = self.execute(input);
        let output = result.map(|()| self.vm_output());

        self.pop_state();
        output
    }

    /// Nested call sharing the caller's output and storage frames; only
    /// the runtime input, the meter window and the handle table are
    /// stacked.
    pub fn execute_on_same_context(&mut self, input: &ContractCallInput) -> Result<()> {
        log::trace!("execute_on_same_context: function {}", input.function);

        self.runtime.push_state();
        self.metering.push_state();
        self.managed_types.push_state();

        self.runtime.init_state_from_call_input(input);
        self.metering.init_state_from_input(&input.vm_input);
        self.managed_types.init_state();

        let result = self.execute(input);

        self.runtime.pop_state();
        self.metering.pop_state();
        self.managed_types.pop_state();

        result
    }

    fn is_init_function_being_called(&self) -> bool {
        let function = self.runtime.function();
        function == INIT_FUNCTION_NAME || function == INIT_FUNCTION_NAME_ETH
    }

    /// Creates a child contract on behalf of the executing contract and
    /// returns its address. The caller pays the whole child gas supply up
    /// front; the unused remainder comes back on success only.
    pub fn create_new_contract(&mut self, input: &ContractCreateInput) -> Result<Vec<u8>> {
        log::trace!(
            "create_new_contract: len(code) {}",
            input.contract_code.len()
        );

        self.metering.use_gas(input.vm_input.gas_provided);

        if self.runtime.read_only() {
            return Err(VmError::InvalidCallOnReadOnlyMode);
        }

        self.runtime.push_state();
        self.metering.push_state();

        self.runtime.set_vm_input(input.vm_input.clone());
        self.metering.init_state_from_input(&input.vm_input);

        let caller = input.vm_input.caller_addr.clone();
        let address = match self.blockchain.new_address(&caller) {
            Ok(address) => address,
            Err(err) => {
                self.pop_runtime_and_metering();
                return Err(err.into());
            }
        };

        if let Err(err) =
            self.output
                .transfer(&address, &caller, 0, &input.vm_input.call_value, &[])
        {
            self.pop_runtime_and_metering();
            return Err(err);
        }

        self.blockchain.increase_nonce(&caller);
        self.runtime.set_sc_address(address.clone());

        let code_deploy_input = CodeDeployInput {
            contract_code: input.contract_code.clone(),
            contract_code_metadata: input.contract_code_metadata.clone(),
            contract_address: address.clone(),
        };

        if let Err(err) = self
            .metering
            .deduct_initial_gas_for_indirect_deployment(&code_deploy_input)
        {
            self.pop_runtime_and_metering();
            return Err(err);
        }

        let id_context = host_context::add_host_context(self);
        self.runtime.push_instance();

        let gas_for_deployment = self.metering.gas_left();
        if let Err(err) = self
            .runtime
            .create_instance(&input.contract_code, gas_for_deployment)
        {
            self.unwind_nested_deploy(id_context);
            return Err(err);
        }

        if let Err(err) = self.runtime.verify_contract_code() {
            self.unwind_nested_deploy(id_context);
            return Err(err);
        }

        self.runtime.set_instance_context_id(id_context);

        if let Err(err) = self.call_init_function() {
            self.unwind_nested_deploy(id_context);
            return Err(err);
        }

        self.output.deploy_code(&code_deploy_input);

        let gas_to_restore_to_caller = self.metering.gas_left();

        self.unwind_nested_deploy(id_context);
        self.metering.restore_gas(gas_to_restore_to_caller);

        Ok(address)
    }

    fn pop_runtime_and_metering(&mut self) {
        self.runtime.pop_state();
        self.metering.pop_state();
    }

    fn unwind_nested_deploy(&mut self, id_context: i32) {
        self.runtime.pop_instance();
        self.pop_runtime_and_metering();
        host_context::remove_host_context(id_context);
    }

    /// The shared nested invocation path. Runs inside an already-pushed
    /// frame; the instance pushed here is popped and the registered
    /// context removed on every exit.
    fn execute(&mut self, input: &ContractCallInput) -> Result<()> {
        self.metering.use_gas_from_caller(input.vm_input.gas_provided);

        if self.is_init_function_being_called() {
            return Err(VmError::InitFuncCalledInRun);
        }

        let contract = self.blockchain.get_code(self.runtime.sc_address())?;

        self.metering.deduct_initial_gas_for_execution(&contract)?;

        let id_context = host_context::add_host_context(self);
        self.runtime.push_instance();

        let gas_for_execution = self.metering.gas_left();
        if let Err(err) = self.runtime.create_instance(&contract, gas_for_execution) {
            self.runtime.pop_instance();
            host_context::remove_host_context(id_context);
            return Err(err);
        }

        self.runtime.set_instance_context_id(id_context);

        if let Err(err) = self.call_sc_method_indirect() {
            self.runtime.pop_instance();
            host_context::remove_host_context(id_context);
            return Err(err);
        }

        if self.output.return_code() != ReturnCode::Ok {
            self.runtime.pop_instance();
            host_context::remove_host_context(id_context);
            return Err(VmError::ReturnCodeNotOk);
        }

        self.metering.unlock_gas_if_async_step();

        let gas_to_restore_to_caller = self.metering.gas_left();

        self.runtime.pop_instance();
        self.metering.restore_gas_to_caller(gas_to_restore_to_caller);
        host_context::remove_host_context(id_context);

        Ok(())
    }

    fn call_sc_method_indirect(&mut self) -> Result<()> {
        let function = self.runtime.function_to_call()?;
        self.runtime
            .call_function(&function)
            .map_err(|_| VmError::FunctionRunError)?;
        Ok(())
    }

    fn call_init_function(&mut self) -> Result<()> {
        if let Some(init) = self.runtime.init_function() {
            self.runtime.call_function(init)?;
        }
        Ok(())
    }

    fn call_sc_method(&mut self) -> Result<()> {
        if self.is_init_function_being_called() {
            self.output.set_return_code(ReturnCode::UserError);
            return Err(VmError::InitFuncCalledInRun);
        }

        let function = match self.runtime.function_to_call() {
            Ok(function) => function,
            Err(err) => {
                self.output.set_return_code(ReturnCode::FunctionNotFound);
                return Err(err);
            }
        };

        let mut call_result = self.runtime.call_function(&function);
        if call_result.is_err() {
            let breakpoint = self.runtime.get_runtime_breakpoint_value();
            if breakpoint != BreakpointValue::None {
                call_result = self.handle_breakpoint(breakpoint);
            }
        }

        if let Err(err) = call_result {
            match err {
                VmError::SignalError => self.output.set_return_code(ReturnCode::UserError),
                VmError::NotEnoughGas => self.output.set_return_code(ReturnCode::OutOfGas),
                _ => self.output.set_return_code(ReturnCode::ExecutionFailed),
            }
            return Err(err);
        }

        Ok(())
    }

    /// The artifact of the current frame as it stands.
    pub fn vm_output(&self) -> VMOutput {
        self.output.get_vm_output(self.metering.gas_left())
    }

    /// Ethereum-compatible call data: a 4-byte selector (truncated
    /// keccak-256 of the function name) followed by each argument
    /// left-padded with zeros to 32 bytes. Built once per frame.
    pub fn ethereum_call_data(&mut self) -> Vec<u8> {
        if self.eth_input.is_none() {
            self.eth_input = Some(self.create_eth_call_input());
        }
        self.eth_input.clone().unwrap_or_default()
    }

    fn create_eth_call_input(&self) -> Vec<u8> {
        let mut call_data = Vec::new();

        let function = self.runtime.function();
        if !function.is_empty() {
            match self.crypto.keccak256(function.as_bytes()) {
                Ok(hash) => call_data.extend_from_slice(&hash[0..4]),
                Err(_) => return Vec::new(),
            }
        }

        for arg in self.runtime.arguments() {
            let mut padded = vec![0u8; ETH_ARGUMENT_LEN];
            let arg = if arg.len() > ETH_ARGUMENT_LEN {
                &arg[arg.len() - ETH_ARGUMENT_LEN..]
            } else {
                &arg[..]
            };
            padded[ETH_ARGUMENT_LEN - arg.len()..].copy_from_slice(arg);
            call_data.extend_from_slice(&padded);
        }

        call_data
    }
}
