// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! End-to-end driver scenarios over the mock engine. The host-context
//! registry is process-wide, so every test serializes on one mutex.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Mutex;

use pretty_assertions::assert_eq;

use kestrel_common::{Address, ContractCallInput, ContractCreateInput, ReturnCode, VMInput};
use kestrel_vm::executor::VMHooks;
use kestrel_vm::gas::GasSchedule;
use kestrel_vm::runtime::ErrorPolicy;
use kestrel_vm::testing::{mock_host, MockBlockchain, MockContract, MockExecutor};
use kestrel_vm::{host_context, VmError};

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> std::sync::MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn addr(byte: u8) -> Address {
    vec![byte; 32]
}

fn call_input(recipient: Address, function: &str, gas: u64) -> ContractCallInput {
    ContractCallInput {
        vm_input: VMInput {
            caller_addr: addr(0x01),
            gas_provided: gas,
            ..Default::default()
        },
        recipient_addr: recipient,
        function: function.to_string(),
    }
}

#[test]
fn deploy_records_code_and_restores_gas() {
    let _guard = serial();

    let code = vec![0xCA; 256];
    let init_ran = Rc::new(Cell::new(false));
    let init_flag = init_ran.clone();
    let executor = MockExecutor::new().with_contract(
        code.clone(),
        MockContract::new().with_function("init", move |_host| init_flag.set(true)),
    );
    let cleaned = executor.clean_counter();
    let mut host = mock_host(executor, MockBlockchain::new());

    let input = ContractCreateInput {
        vm_input: VMInput {
            caller_addr: addr(0x01),
            gas_provided: 1_000_000,
            ..Default::default()
        },
        contract_code: code.clone(),
        contract_code_metadata: vec![1, 0],
    };
    let output = host.run_sc_create(&input);

    assert_eq!(output.return_code, ReturnCode::Ok);
    assert!(init_ran.get());
    assert!(output.gas_remaining > 0);
    let deployed = &output.output_accounts[&addr(0x42)];
    assert_eq!(deployed.code.as_deref(), Some(&code[..]));
    assert_eq!(deployed.code_metadata, vec![1, 0]);

    assert_eq!(host_context::active_context_count(), 0);
    assert_eq!(cleaned.get(), 1);
}

#[test]
fn deploy_with_rejected_code_is_contract_invalid() {
    let _guard = serial();

    let mut executor = MockExecutor::new();
    executor.fail_instantiation = true;
    let mut host = mock_host(executor, MockBlockchain::new());

    let input = ContractCreateInput {
        vm_input: VMInput {
            caller_addr: addr(0x01),
            gas_provided: 1_000_000,
            ..Default::default()
        },
        contract_code: vec![0xBB; 64],
        contract_code_metadata: Vec::new(),
    };
    let output = host.run_sc_create(&input);

    assert_eq!(output.return_code, ReturnCode::ContractInvalid);
    assert_eq!(output.return_message, "mock engine: instantiation rejected");
    assert!(output.output_accounts.is_empty());
    assert_eq!(output.gas_remaining, 0);
    assert_eq!(host_context::active_context_count(), 0);
}

#[test]
fn deploy_with_failed_verification_is_contract_invalid() {
    let _guard = serial();

    let code = b"code-v".to_vec();
    let mut executor = MockExecutor::new().with_contract(code.clone(), MockContract::new());
    executor.fail_verification = true;
    let mut host = mock_host(executor, MockBlockchain::new());

    let input = ContractCreateInput {
        vm_input: VMInput {
            gas_provided: 1_000_000,
            ..Default::default()
        },
        contract_code: code,
        contract_code_metadata: Vec::new(),
    };
    let output = host.run_sc_create(&input);

    assert_eq!(output.return_code, ReturnCode::ContractInvalid);
    assert_eq!(output.return_message, "mock engine: verification rejected");
}

#[test]
fn calling_init_by_name_is_rejected_without_running_wasm() {
    let _guard = serial();

    for reserved in ["init", "_init"] {
        let code = b"code-i".to_vec();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let executor = MockExecutor::new().with_contract(
            code.clone(),
            MockContract::new().with_function(reserved, move |_host| flag.set(true)),
        );
        let blockchain = MockBlockchain::new().with_code(addr(0x33), code);
        let mut host = mock_host(executor, blockchain);

        let output = host.run_sc_call(&call_input(addr(0x33), reserved, 500_000));

        assert_eq!(output.return_code, ReturnCode::UserError);
        assert_eq!(output.return_message, "it is not allowed to call init in run");
        assert!(!ran.get());
    }
    assert_eq!(host_context::active_context_count(), 0);
}

#[test]
fn missing_function_maps_to_function_not_found() {
    let _guard = serial();

    let code = b"code-f".to_vec();
    let executor = MockExecutor::new().with_contract(code.clone(), MockContract::new());
    let blockchain = MockBlockchain::new().with_code(addr(0x33), code);
    let mut host = mock_host(executor, blockchain);

    let output = host.run_sc_call(&call_input(addr(0x33), "no_such_export", 500_000));
    assert_eq!(output.return_code, ReturnCode::FunctionNotFound);
}

#[test]
fn upgrade_without_code_arguments_fails() {
    let _guard = serial();

    let mut host = mock_host(MockExecutor::new(), MockBlockchain::new());
    let mut input = call_input(addr(0x33), "upgradeContract", 500_000);
    input.vm_input.arguments = vec![b"only-code".to_vec()];

    let output = host.run_sc_upgrade(&input);
    assert_eq!(output.return_code, ReturnCode::UpgradeFailed);
    assert_eq!(output.return_message, "invalid upgrade arguments");
}

#[test]
fn upgrade_deploys_code_from_arguments() {
    let _guard = serial();

    let new_code = b"code-upgraded".to_vec();
    let executor = MockExecutor::new().with_contract(new_code.clone(), MockContract::new());
    let mut host = mock_host(executor, MockBlockchain::new());

    let mut input = call_input(addr(0x33), "upgradeContract", 500_000);
    input.vm_input.arguments = vec![new_code.clone(), vec![1, 0]];

    let output = host.run_sc_upgrade(&input);
    assert_eq!(output.return_code, ReturnCode::Ok);
    assert_eq!(
        output.output_accounts[&addr(0x33)].code.as_deref(),
        Some(&new_code[..])
    );
}

#[test]
fn nested_call_restores_unused_gas() {
    let _guard = serial();

    const TOP_GAS: u64 = 1_000_000;
    const NESTED_GAS: u64 = 200_000;
    const NESTED_SPEND: u64 = 50_000;
    let code_a = b"code-a".to_vec();
    let code_b = b"code-b".to_vec();

    let inner = MockContract::new().with_function("inner", |host| {
        host.metering_mut().use_gas(NESTED_SPEND);
    });
    let code_b_for_outer = code_b.clone();
    let outer = MockContract::new().with_function("outer", move |host| {
        let mut input = call_input(addr(0xBB), "inner", NESTED_GAS);
        input.vm_input.caller_addr = addr(0xAA);
        let nested_output = host.execute_on_dest_context(&input).unwrap();
        assert_eq!(nested_output.return_code, ReturnCode::Ok);

        let schedule = GasSchedule::default();
        let nested_prep =
            schedule.base_operation_cost.aot_prepare_per_byte * code_b_for_outer.len() as u64;
        assert_eq!(
            nested_output.gas_remaining,
            NESTED_GAS - nested_prep - NESTED_SPEND
        );
    });

    let executor = MockExecutor::new()
        .with_contract(code_a.clone(), outer)
        .with_contract(code_b.clone(), inner);
    let cleaned = executor.clean_counter();
    let blockchain = MockBlockchain::new()
        .with_code(addr(0xAA), code_a.clone())
        .with_code(addr(0xBB), code_b.clone());
    let mut host = mock_host(executor, blockchain);

    let output = host.run_sc_call(&call_input(addr(0xAA), "outer", TOP_GAS));
    assert_eq!(output.return_code, ReturnCode::Ok);

    let schedule = GasSchedule::default();
    let top_prep = schedule.base_operation_cost.aot_prepare_per_byte * code_a.len() as u64;
    let nested_prep = schedule.base_operation_cost.aot_prepare_per_byte * code_b.len() as u64;
    let nested_unused = NESTED_GAS - nested_prep - NESTED_SPEND;
    assert_eq!(
        output.gas_remaining,
        TOP_GAS - top_prep - NESTED_GAS + nested_unused
    );

    // Both instances popped and cleaned, registry drained.
    assert_eq!(cleaned.get(), 2);
    assert_eq!(host_context::active_context_count(), 0);
}

#[test]
fn failed_nested_call_unwinds_and_caller_continues() {
    let _guard = serial();

    let code_a = b"code-a".to_vec();
    let outer = MockContract::new().with_function("outer", |host| {
        // 0xCC has code on chain, but the engine refuses to instantiate it.
        let result = host.execute_on_dest_context(&call_input(addr(0xCC), "inner", 100_000));
        assert!(result.is_err());

        // The nested frame unwound completely: the caller's instance is
        // current again and only the top-level context stays registered.
        assert!(host.runtime().has_instance());
        assert_eq!(host.runtime().instance_stack_depth(), 0);
        assert_eq!(host_context::active_context_count(), 1);

        host.runtime_mut().mem_store(0, b"ok").unwrap();
        let handle = host.mbuffer_new_from_bytes(0, 2);
        host.mbuffer_finish(handle);
    });
    let executor = MockExecutor::new().with_contract(code_a.clone(), outer);
    let blockchain = MockBlockchain::new()
        .with_code(addr(0xAA), code_a)
        .with_code(addr(0xCC), b"ghost".to_vec());
    let mut host = mock_host(executor, blockchain);

    let output = host.run_sc_call(&call_input(addr(0xAA), "outer", 1_000_000));
    assert_eq!(output.return_code, ReturnCode::Ok);
    assert_eq!(output.return_data, vec![b"ok".to_vec()]);
    assert_eq!(host_context::active_context_count(), 0);
}

#[test]
fn out_of_range_slice_is_recoverable() {
    let _guard = serial();

    let code = b"code-s".to_vec();
    let contract = MockContract::new().with_function("trySlice", |host| {
        host.runtime_mut().mem_store(0, b"hello").unwrap();
        let handle = host.mbuffer_new_from_bytes(0, 5);
        assert!(handle > 0);

        // Slice past the end: reports failure, writes nothing, and the
        // contract keeps running.
        let status = host.mbuffer_get_byte_slice(handle, 3, 10, 100);
        assert_eq!(status, 1);
        assert_eq!(host.runtime().mem_load(100, 3).unwrap(), vec![0, 0, 0]);

        let status = host.mbuffer_get_byte_slice(handle, 1, 3, 100);
        assert_eq!(status, 0);
        assert_eq!(host.runtime().mem_load(100, 3).unwrap(), b"ell".to_vec());

        let result = host.mbuffer_new();
        host.mbuffer_append_bytes(result, 100, 3);
        host.mbuffer_finish(result);
    });
    let executor = MockExecutor::new().with_contract(code.clone(), contract);
    let blockchain = MockBlockchain::new().with_code(addr(0x33), code);
    let mut host = mock_host(executor, blockchain);

    let output = host.run_sc_call(&call_input(addr(0x33), "trySlice", 5_000_000));
    assert_eq!(output.return_code, ReturnCode::Ok);
    assert_eq!(output.return_data, vec![b"ell".to_vec()]);
}

#[test]
fn finish_gas_exhaustion_aborts_with_out_of_gas() {
    let _guard = serial();

    let code = b"code-g".to_vec();
    let contract = MockContract::new().with_function("spend", |host| {
        host.runtime_mut().mem_store(0, b"12345").unwrap();
        let handle = host.mbuffer_new_from_bytes(0, 5);
        let status = host.mbuffer_finish(handle);
        // The per-byte persist charge overflows the budget; the hook
        // reports failure and arms the abort.
        assert_eq!(status, 1);
    });
    let executor = MockExecutor::new().with_contract(code.clone(), contract);
    let blockchain = MockBlockchain::new().with_code(addr(0x33), code);
    let mut host = mock_host(executor, blockchain);

    // Enough for the base charges, not for persisting five bytes.
    let output = host.run_sc_call(&call_input(addr(0x33), "spend", 17_000));
    assert_eq!(output.return_code, ReturnCode::OutOfGas);
    assert_eq!(output.gas_remaining, 0);
    assert!(output.return_data.is_empty());
}

#[test]
fn signal_error_surfaces_the_contract_message() {
    let _guard = serial();

    let code = b"code-e".to_vec();
    let contract = MockContract::new().with_function("revert", |host| {
        host.runtime_mut().mem_store(0, b"user said no").unwrap();
        host.signal_error(0, 12);
    });
    let executor = MockExecutor::new().with_contract(code.clone(), contract);
    let blockchain = MockBlockchain::new().with_code(addr(0x33), code);
    let mut host = mock_host(executor, blockchain);

    let output = host.run_sc_call(&call_input(addr(0x33), "revert", 500_000));
    assert_eq!(output.return_code, ReturnCode::UserError);
    assert_eq!(output.return_message, "user said no");
}

#[test]
fn storage_round_trip_through_hooks() {
    let _guard = serial();

    let code = b"code-st".to_vec();
    let contract = MockContract::new().with_function("store", |host| {
        host.runtime_mut().mem_store(0, b"key").unwrap();
        host.runtime_mut().mem_store(10, b"stored-value").unwrap();
        let key = host.mbuffer_new_from_bytes(0, 3);
        let value = host.mbuffer_new_from_bytes(10, 12);
        assert_eq!(host.mbuffer_storage_store(key, value), 0);

        let loaded = host.mbuffer_new();
        assert_eq!(host.mbuffer_storage_load(key, loaded), 0);
        assert_eq!(host.mbuffer_eq(value, loaded), 1);
        host.mbuffer_finish(loaded);
    });
    let executor = MockExecutor::new().with_contract(code.clone(), contract);
    let blockchain = MockBlockchain::new().with_code(addr(0x33), code);
    let mut host = mock_host(executor, blockchain);

    let output = host.run_sc_call(&call_input(addr(0x33), "store", 50_000_000));
    assert_eq!(output.return_code, ReturnCode::Ok);
    assert_eq!(output.return_data, vec![b"stored-value".to_vec()]);

    let account = &output.output_accounts[&addr(0x33)];
    let update = &account.storage_updates[&b"key".to_vec()];
    assert_eq!(update.data, b"stored-value");
}

#[test]
fn argument_fetch_and_big_int_round_trip() {
    let _guard = serial();

    let code = b"code-bi".to_vec();
    let contract = MockContract::new().with_function("roundtrip", |host| {
        // arg 0: canonical unsigned, arg 1: canonical two's-complement.
        let unsigned = host.mbuffer_new();
        assert_eq!(host.mbuffer_get_argument(0, unsigned), 0);
        let signed = host.mbuffer_new();
        assert_eq!(host.mbuffer_get_argument(1, signed), 0);

        let bigint = host.mbuffer_new();
        assert_eq!(host.mbuffer_to_big_int_unsigned(unsigned, bigint), 0);
        let back = host.mbuffer_new();
        assert_eq!(host.mbuffer_from_big_int_unsigned(back, bigint), 0);
        assert_eq!(host.mbuffer_eq(unsigned, back), 1);

        assert_eq!(host.mbuffer_to_big_int_signed(signed, bigint), 0);
        assert_eq!(host.mbuffer_from_big_int_signed(back, bigint), 0);
        assert_eq!(host.mbuffer_eq(signed, back), 1);
    });
    let executor = MockExecutor::new().with_contract(code.clone(), contract);
    let blockchain = MockBlockchain::new().with_code(addr(0x33), code);
    let mut host = mock_host(executor, blockchain);

    let mut input = call_input(addr(0x33), "roundtrip", 50_000_000);
    input.vm_input.arguments = vec![vec![0x01, 0x02, 0x03], vec![0x85]];
    let output = host.run_sc_call(&input);
    assert_eq!(output.return_code, ReturnCode::Ok);
}

#[test]
fn get_bytes_is_idempotent_in_data_and_gas() {
    let _guard = serial();

    let code = b"code-id".to_vec();
    let contract = MockContract::new().with_function("readTwice", |host| {
        host.runtime_mut().mem_store(0, b"payload").unwrap();
        let handle = host.mbuffer_new_from_bytes(0, 7);

        let before_first = host.metering().gas_left();
        assert_eq!(host.mbuffer_get_bytes(handle, 50), 0);
        let first_cost = before_first - host.metering().gas_left();
        let first = host.runtime().mem_load(50, 7).unwrap();

        let before_second = host.metering().gas_left();
        assert_eq!(host.mbuffer_get_bytes(handle, 80), 0);
        let second_cost = before_second - host.metering().gas_left();
        let second = host.runtime().mem_load(80, 7).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_cost, second_cost);
    });
    let executor = MockExecutor::new().with_contract(code.clone(), contract);
    let blockchain = MockBlockchain::new().with_code(addr(0x33), code);
    let mut host = mock_host(executor, blockchain);

    let output = host.run_sc_call(&call_input(addr(0x33), "readTwice", 50_000_000));
    assert_eq!(output.return_code, ReturnCode::Ok);
}

#[test]
fn random_fill_is_deterministic_across_hosts() {
    let _guard = serial();

    let code = b"code-r".to_vec();
    let run = |captured: Rc<Cell<[u8; 8]>>| {
        let contract = MockContract::new().with_function("draw", move |host| {
            let handle = host.mbuffer_new();
            assert_eq!(host.mbuffer_set_random(handle, 8), 0);
            let bytes = host.managed_types().get_bytes(handle).unwrap();
            let mut fixed = [0u8; 8];
            fixed.copy_from_slice(&bytes);
            captured.set(fixed);
        });
        let executor = MockExecutor::new().with_contract(code.clone(), contract);
        let blockchain = MockBlockchain::new().with_code(addr(0x33), code.clone());
        let mut host = mock_host(executor, blockchain);
        let mut input = call_input(addr(0x33), "draw", 50_000_000);
        input.vm_input.current_tx_hash = vec![0xAB; 32];
        host.run_sc_call(&input)
    };

    let first = Rc::new(Cell::new([0u8; 8]));
    let second = Rc::new(Cell::new([0u8; 8]));
    let out_a = run(first.clone());
    let out_b = run(second.clone());

    assert_eq!(out_a.return_code, ReturnCode::Ok);
    assert_eq!(out_b.return_code, ReturnCode::Ok);
    assert_eq!(first.get(), second.get());
    assert_ne!(first.get(), [0u8; 8]);
}

#[test]
fn short_random_length_is_recoverable_under_relaxed_policy() {
    let _guard = serial();

    let code = b"code-rl".to_vec();
    let contract = MockContract::new().with_function("draw", |host| {
        host.runtime_mut().set_error_policy(ErrorPolicy {
            managed_buffer_fails_execution: false,
            ..Default::default()
        });
        let handle = host.mbuffer_new();
        assert_eq!(host.mbuffer_set_random(handle, 0), -1);
        assert_eq!(host.mbuffer_set_random(handle, 4), 0);
    });
    let executor = MockExecutor::new().with_contract(code.clone(), contract);
    let blockchain = MockBlockchain::new().with_code(addr(0x33), code);
    let mut host = mock_host(executor, blockchain);

    let output = host.run_sc_call(&call_input(addr(0x33), "draw", 50_000_000));
    assert_eq!(output.return_code, ReturnCode::Ok);
}

#[test]
fn create_new_contract_is_rejected_in_read_only_mode() {
    let _guard = serial();

    let mut host = mock_host(MockExecutor::new(), MockBlockchain::new());
    host.runtime_mut().set_read_only(true);

    let input = ContractCreateInput {
        vm_input: VMInput {
            caller_addr: addr(0x01),
            gas_provided: 100_000,
            ..Default::default()
        },
        contract_code: b"child".to_vec(),
        contract_code_metadata: Vec::new(),
    };
    let result = host.create_new_contract(&input);
    assert!(matches!(result, Err(VmError::InvalidCallOnReadOnlyMode)));
    assert!(!host.runtime().has_instance());
    assert_eq!(host.runtime().instance_stack_depth(), 0);
}

#[test]
fn contract_creates_child_contract() {
    let _guard = serial();

    let parent_code = b"code-p".to_vec();
    let child_code = b"code-c".to_vec();

    let child = MockContract::new().with_function("init", |_host| {});
    let child_code_for_parent = child_code.clone();
    let parent = MockContract::new().with_function("spawn", move |host| {
        let input = ContractCreateInput {
            vm_input: VMInput {
                caller_addr: addr(0xAA),
                gas_provided: 300_000,
                ..Default::default()
            },
            contract_code: child_code_for_parent.clone(),
            contract_code_metadata: vec![0, 1],
        };
        let address = host.create_new_contract(&input).unwrap();
        assert_eq!(address, addr(0x42));
    });

    let executor = MockExecutor::new()
        .with_contract(parent_code.clone(), parent)
        .with_contract(child_code.clone(), child);
    let blockchain = MockBlockchain::new().with_code(addr(0xAA), parent_code);
    let mut host = mock_host(executor, blockchain);

    let output = host.run_sc_call(&call_input(addr(0xAA), "spawn", 1_000_000));
    assert_eq!(output.return_code, ReturnCode::Ok);
    assert_eq!(
        output.output_accounts[&addr(0x42)].code.as_deref(),
        Some(&b"code-c"[..])
    );
    assert_eq!(host_context::active_context_count(), 0);
}

#[test]
fn ethereum_call_data_layout() {
    let _guard = serial();

    let mut host = mock_host(MockExecutor::new(), MockBlockchain::new());
    let mut input = call_input(addr(0x33), "transfer", 0);
    input.vm_input.arguments = vec![vec![0x0A], vec![0xDE, 0xAD]];
    host.runtime_mut().init_state_from_call_input(&input);

    let call_data = host.ethereum_call_data();
    assert_eq!(call_data.len(), 4 + 32 * 2);

    let mut expected = [0u8; 32];
    for (i, byte) in b"transfer".iter().enumerate() {
        expected[i % 32] = expected[i % 32].wrapping_mul(31).wrapping_add(*byte);
    }
    assert_eq!(&call_data[0..4], &expected[0..4]);

    // Arguments are left-padded to 32 bytes.
    assert_eq!(call_data[4..35], [0u8; 31]);
    assert_eq!(call_data[35], 0x0A);
    assert_eq!(call_data[36..66], [0u8; 30]);
    assert_eq!(&call_data[66..68], &[0xDE, 0xAD]);

    // Built once, cached for the frame.
    assert_eq!(host.ethereum_call_data(), call_data);
}
