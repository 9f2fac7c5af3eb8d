// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! The managed-buffer import surface. Status codes are ABI: getters whose
//! natural result is a length return −1 on error, command-style entries
//! return 1 on recoverable failure and 0 on success, and out-of-range
//! slicing is a non-fatal query failure the contract may branch on.

use num_bigint::{BigInt, Sign};

use super::api_names::*;
use crate::errors::VmError;
use crate::executor::VMHooks;
use crate::host::VmHost;
use crate::managed_types::BigFloat;

/// Bounds check shared by the slice operations. Arithmetic runs in i64 so
/// hostile offsets cannot wrap.
fn slice_in_bounds(start: i32, length: i32, buffer_len: usize) -> bool {
    start >= 0 && length >= 0 && (start as i64 + length as i64) <= buffer_len as i64
}

impl VMHooks for VmHost {
    fn mbuffer_new(&mut self) -> i32 {
        let gas = self.metering.schedule().managed_buffer_api_cost.mbuffer_new;
        self.metering.use_gas_and_add_traced_gas(MBUFFER_NEW, gas);

        self.managed_types.new_managed_buffer()
    }

    fn mbuffer_new_from_bytes(&mut self, data_offset: i32, data_length: i32) -> i32 {
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_new_from_bytes;
        self.metering
            .use_gas_and_add_traced_gas(MBUFFER_NEW_FROM_BYTES, gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let loaded = self.runtime.mem_load(data_offset, data_length);
        let data = match self.with_fault(loaded, fail_policy) {
            Some(data) => data,
            None => return -1,
        };

        self.managed_types.new_managed_buffer_from_bytes(data)
    }

    fn mbuffer_get_length(&mut self, handle: i32) -> i32 {
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_get_length;
        self.metering
            .use_gas_and_add_traced_gas(MBUFFER_GET_LENGTH, gas);

        let length = self.managed_types.get_length(handle);
        if length == -1 {
            let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
            self.record_fault(VmError::NoManagedBufferUnderThisHandle, fail_policy);
            return -1;
        }

        length
    }

    fn mbuffer_get_bytes(&mut self, handle: i32, result_offset: i32) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_GET_BYTES);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_get_bytes;
        self.metering.use_and_trace_gas(gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let bytes = match self.with_fault(self.managed_types.get_bytes(handle), fail_policy) {
            Some(bytes) => bytes,
            None => return 1,
        };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &bytes);

        let stored = self.runtime.mem_store(result_offset, &bytes);
        if self.with_fault(stored, fail_policy).is_none() {
            return 1;
        }

        0
    }

    fn mbuffer_get_byte_slice(
        &mut self,
        source_handle: i32,
        starting_position: i32,
        slice_length: i32,
        result_offset: i32,
    ) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_GET_BYTE_SLICE);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_get_byte_slice;
        self.metering.use_and_trace_gas(gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let source =
            match self.with_fault(self.managed_types.get_bytes(source_handle), fail_policy) {
                Some(bytes) => bytes,
                None => return 1,
            };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &source);

        if !slice_in_bounds(starting_position, slice_length, source.len()) {
            // Out-of-range slices do not fail execution.
            return 1;
        }

        let start = starting_position as usize;
        let slice = &source[start..start + slice_length as usize];
        let stored = self.runtime.mem_store(result_offset, slice);
        if self.with_fault(stored, fail_policy).is_none() {
            return 1;
        }

        0
    }

    fn mbuffer_copy_byte_slice(
        &mut self,
        source_handle: i32,
        starting_position: i32,
        slice_length: i32,
        destination_handle: i32,
    ) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_COPY_BYTE_SLICE);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_copy_byte_slice;
        self.metering.use_and_trace_gas(gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let source =
            match self.with_fault(self.managed_types.get_bytes(source_handle), fail_policy) {
                Some(bytes) => bytes,
                None => return 1,
            };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &source);

        if !slice_in_bounds(starting_position, slice_length, source.len()) {
            // Out-of-range slices do not fail execution.
            return 1;
        }

        let start = starting_position as usize;
        let slice = source[start..start + slice_length as usize].to_vec();
        let copy_cost = self.metering.schedule().data_copy_cost(slice.len());
        self.managed_types.set_bytes(destination_handle, slice);
        self.metering.use_and_trace_gas(copy_cost);

        0
    }

    fn mbuffer_eq(&mut self, handle1: i32, handle2: i32) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_EQ);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_copy_byte_slice;
        self.metering.use_and_trace_gas(gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let bytes1 = match self.with_fault(self.managed_types.get_bytes(handle1), fail_policy) {
            Some(bytes) => bytes,
            None => return -1,
        };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &bytes1);

        let bytes2 = match self.with_fault(self.managed_types.get_bytes(handle2), fail_policy) {
            Some(bytes) => bytes,
            None => return -1,
        };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &bytes2);

        (bytes1 == bytes2) as i32
    }

    fn mbuffer_set_bytes(&mut self, handle: i32, data_offset: i32, data_length: i32) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_SET_BYTES);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_set_bytes;
        self.metering.use_and_trace_gas(gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let loaded = self.runtime.mem_load(data_offset, data_length);
        let data = match self.with_fault(loaded, fail_policy) {
            Some(data) => data,
            None => return 1,
        };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &data);
        self.managed_types.set_bytes(handle, data);

        0
    }

    fn mbuffer_set_byte_slice(
        &mut self,
        handle: i32,
        starting_position: i32,
        data_length: i32,
        data_offset: i32,
    ) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_SET_BYTE_SLICE);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_set_bytes;
        self.metering.use_and_trace_gas(gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let loaded = self.runtime.mem_load(data_offset, data_length);
        let data = match self.with_fault(loaded, fail_policy) {
            Some(data) => data,
            None => return 1,
        };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &data);

        let mut buffer = match self.with_fault(self.managed_types.get_bytes(handle), fail_policy)
        {
            Some(bytes) => bytes,
            None => return 1,
        };

        if !slice_in_bounds(starting_position, data_length, buffer.len()) {
            // Out-of-range slices do not fail execution.
            return 1;
        }

        let start = starting_position as usize;
        buffer[start..start + data.len()].copy_from_slice(&data);
        self.managed_types.set_bytes(handle, buffer);

        0
    }

    fn mbuffer_append(&mut self, accumulator_handle: i32, data_handle: i32) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_APPEND);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_append;
        self.metering.use_and_trace_gas(gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let data = match self.with_fault(self.managed_types.get_bytes(data_handle), fail_policy) {
            Some(bytes) => bytes,
            None => return 1,
        };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &data);

        if !self.managed_types.append_bytes(accumulator_handle, &data) {
            self.record_fault(VmError::NoManagedBufferUnderThisHandle, fail_policy);
            return 1;
        }

        0
    }

    fn mbuffer_append_bytes(
        &mut self,
        accumulator_handle: i32,
        data_offset: i32,
        data_length: i32,
    ) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_APPEND_BYTES);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_append_bytes;
        self.metering.use_and_trace_gas(gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let loaded = self.runtime.mem_load(data_offset, data_length);
        let data = match self.with_fault(loaded, fail_policy) {
            Some(data) => data,
            None => return 1,
        };

        if !self.managed_types.append_bytes(accumulator_handle, &data) {
            self.record_fault(VmError::NoManagedBufferUnderThisHandle, fail_policy);
            return 1;
        }

        let copy_cost = self.metering.schedule().data_copy_cost(data.len());
        self.metering.use_and_trace_gas(copy_cost);

        0
    }

    fn mbuffer_to_big_int_unsigned(&mut self, buffer_handle: i32, bigint_handle: i32) -> i32 {
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_to_big_int_unsigned;
        self.metering
            .use_gas_and_add_traced_gas(MBUFFER_TO_BIG_INT_UNSIGNED, gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let bytes = match self.with_fault(self.managed_types.get_bytes(buffer_handle), fail_policy)
        {
            Some(bytes) => bytes,
            None => return 1,
        };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &bytes);

        *self.managed_types.big_int_or_create(bigint_handle) =
            BigInt::from_bytes_be(Sign::Plus, &bytes);

        0
    }

    fn mbuffer_to_big_int_signed(&mut self, buffer_handle: i32, bigint_handle: i32) -> i32 {
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_to_big_int_signed;
        self.metering
            .use_gas_and_add_traced_gas(MBUFFER_TO_BIG_INT_SIGNED, gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let bytes = match self.with_fault(self.managed_types.get_bytes(buffer_handle), fail_policy)
        {
            Some(bytes) => bytes,
            None => return 1,
        };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &bytes);

        *self.managed_types.big_int_or_create(bigint_handle) =
            BigInt::from_signed_bytes_be(&bytes);

        0
    }

    fn mbuffer_from_big_int_unsigned(&mut self, buffer_handle: i32, bigint_handle: i32) -> i32 {
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_from_big_int_unsigned;
        self.metering
            .use_gas_and_add_traced_gas(MBUFFER_FROM_BIG_INT_UNSIGNED, gas);

        let fail_policy = self.runtime.big_int_api_error_should_fail_execution();
        let value = match self.with_fault(self.managed_types.get_big_int(bigint_handle), fail_policy)
        {
            Some(value) => value,
            None => return 1,
        };

        let (_, bytes) = value.to_bytes_be();
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &bytes);
        self.managed_types.set_bytes(buffer_handle, bytes);

        0
    }

    fn mbuffer_from_big_int_signed(&mut self, buffer_handle: i32, bigint_handle: i32) -> i32 {
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_from_big_int_signed;
        self.metering
            .use_gas_and_add_traced_gas(MBUFFER_FROM_BIG_INT_SIGNED, gas);

        let fail_policy = self.runtime.big_int_api_error_should_fail_execution();
        let value = match self.with_fault(self.managed_types.get_big_int(bigint_handle), fail_policy)
        {
            Some(value) => value,
            None => return 1,
        };

        let bytes = value.to_signed_bytes_be();
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &bytes);
        self.managed_types.set_bytes(buffer_handle, bytes);

        0
    }

    fn mbuffer_to_big_float(&mut self, buffer_handle: i32, bigfloat_handle: i32) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_TO_BIG_FLOAT);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_to_big_float;
        self.metering.use_and_trace_gas(gas);

        let mb_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let bytes = match self.with_fault(self.managed_types.get_bytes(buffer_handle), mb_policy) {
            Some(bytes) => bytes,
            None => return 1,
        };
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &bytes);

        let bf_policy = self.runtime.big_float_api_error_should_fail_execution();
        let value = match BigFloat::decode(&bytes) {
            Ok(value) => value,
            Err(err) => {
                self.record_fault(err, bf_policy);
                return 1;
            }
        };

        if value.is_infinite() {
            self.record_fault(VmError::InfinityFloatOperation, bf_policy);
            return 1;
        }

        *self.managed_types.big_float_or_create(bigfloat_handle) = value;

        0
    }

    fn mbuffer_from_big_float(&mut self, buffer_handle: i32, bigfloat_handle: i32) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_FROM_BIG_FLOAT);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_from_big_float;
        self.metering.use_and_trace_gas(gas);

        let bf_policy = self.runtime.big_float_api_error_should_fail_execution();
        let value =
            match self.with_fault(self.managed_types.get_big_float(bigfloat_handle), bf_policy) {
                Some(value) => value,
                None => return 1,
            };

        let encoded = value.encode();
        self.managed_types
            .consume_gas_for_bytes(&mut self.metering, &encoded);
        self.managed_types.set_bytes(buffer_handle, encoded);

        0
    }

    fn mbuffer_storage_store(&mut self, key_handle: i32, source_handle: i32) -> i32 {
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_storage_store;
        self.metering
            .use_gas_and_add_traced_gas(MBUFFER_STORAGE_STORE, gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let key = match self.with_fault(self.managed_types.get_bytes(key_handle), fail_policy) {
            Some(key) => key,
            None => return 1,
        };
        let source = match self.with_fault(self.managed_types.get_bytes(source_handle), fail_policy)
        {
            Some(source) => source,
            None => return 1,
        };

        let read_only = self.runtime.read_only();
        let stored = self.storage.set_storage(
            &mut self.metering,
            &mut self.output,
            read_only,
            &key,
            &source,
        );
        if self.with_fault(stored, fail_policy).is_none() {
            return 1;
        }

        0
    }

    fn mbuffer_storage_load(&mut self, key_handle: i32, destination_handle: i32) -> i32 {
        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let key = match self.with_fault(self.managed_types.get_bytes(key_handle), fail_policy) {
            Some(key) => key,
            None => return 1,
        };

        let (storage_bytes, used_cache) =
            self.storage
                .get_storage(&self.output, self.blockchain.as_ref(), &key);
        let load_cost = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_storage_load;
        self.storage.use_gas_for_storage_load(
            &mut self.metering,
            MBUFFER_STORAGE_LOAD,
            load_cost,
            used_cache,
        );

        self.managed_types.set_bytes(destination_handle, storage_bytes);

        0
    }

    fn mbuffer_storage_load_from_address(
        &mut self,
        address_handle: i32,
        key_handle: i32,
        destination_handle: i32,
    ) {
        let mb_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let key = match self.with_fault(self.managed_types.get_bytes(key_handle), mb_policy) {
            Some(key) => key,
            None => return,
        };

        let address = match self.managed_types.get_bytes(address_handle) {
            Ok(address) => address,
            Err(_) => {
                let api_policy = self.runtime.api_error_should_fail_execution();
                self.record_fault(VmError::ArgOutOfRange, api_policy);
                return;
            }
        };

        let (storage_bytes, used_cache) = self.storage.get_storage_from_address(
            &self.output,
            self.blockchain.as_ref(),
            &address,
            &key,
        );
        let load_cost = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_storage_load;
        self.storage.use_gas_for_storage_load(
            &mut self.metering,
            MBUFFER_STORAGE_LOAD,
            load_cost,
            used_cache,
        );

        self.managed_types.set_bytes(destination_handle, storage_bytes);
    }

    fn mbuffer_get_argument(&mut self, arg_index: i32, destination_handle: i32) -> i32 {
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_get_argument;
        self.metering
            .use_gas_and_add_traced_gas(MBUFFER_GET_ARGUMENT, gas);

        let arguments = self.runtime.arguments();
        if arg_index < 0 || arg_index as usize >= arguments.len() {
            let api_policy = self.runtime.api_error_should_fail_execution();
            self.record_fault(VmError::ArgOutOfRange, api_policy);
            return 1;
        }

        let argument = arguments[arg_index as usize].clone();
        self.managed_types.set_bytes(destination_handle, argument);

        0
    }

    fn mbuffer_finish(&mut self, source_handle: i32) -> i32 {
        self.metering.start_gas_tracing(MBUFFER_FINISH);
        let gas = self
            .metering
            .schedule()
            .managed_buffer_api_cost
            .mbuffer_finish;
        self.metering.use_and_trace_gas(gas);

        let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
        let bytes = match self.with_fault(self.managed_types.get_bytes(source_handle), fail_policy)
        {
            Some(bytes) => bytes,
            None => return 1,
        };

        let persist_cost = self.metering.schedule().persist_cost(bytes.len());
        let charged = self.metering.use_gas_bounded(persist_cost);
        if self.with_fault(charged, fail_policy).is_none() {
            return 1;
        }

        self.output.finish(bytes);

        0
    }

    fn mbuffer_set_random(&mut self, destination_handle: i32, length: i32) -> i32 {
        if length < 1 {
            let fail_policy = self.runtime.managed_buffer_api_error_should_fail_execution();
            self.record_fault(VmError::LengthOfBufferNotCorrect, fail_policy);
            return -1;
        }

        let schedule = self.metering.schedule();
        let gas = schedule
            .managed_buffer_api_cost
            .mbuffer_set_random
            .saturating_add(schedule.data_copy_cost(length as usize));
        self.metering
            .use_gas_and_add_traced_gas(MBUFFER_SET_RANDOM, gas);

        let seed = self.random_seed();
        let mut buffer = vec![0u8; length as usize];
        self.managed_types.fill_random(seed, &mut buffer);
        self.managed_types.set_bytes(destination_handle, buffer);

        0
    }

    fn signal_error(&mut self, message_offset: i32, message_length: i32) {
        let api_policy = self.runtime.api_error_should_fail_execution();
        let loaded = self.runtime.mem_load(message_offset, message_length);
        let message = match self.with_fault(loaded, api_policy) {
            Some(message) => message,
            None => return,
        };

        self.output
            .set_return_message(String::from_utf8_lossy(&message).into_owned());
        self.fail_execution(&VmError::SignalError);
    }
}
