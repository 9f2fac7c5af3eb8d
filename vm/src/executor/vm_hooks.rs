// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT

/// The import surface the executor exposes to contract code.
///
/// Every entry takes and returns 32-bit integers: handles, lengths and
/// memory offsets all cross the boundary as `i32`. The status-code
/// convention is bit-exact ABI: getters whose natural result is a length
/// return `-1` on any error; command-style operations return `1` on
/// recoverable failure and `0` on success; out-of-range slicing is a query
/// failure (`1`) that does not abort the contract.
pub trait VMHooks {
    fn mbuffer_new(&mut self) -> i32;
    fn mbuffer_new_from_bytes(&mut self, data_offset: i32, data_length: i32) -> i32;
    fn mbuffer_get_length(&mut self, handle: i32) -> i32;
    fn mbuffer_get_bytes(&mut self, handle: i32, result_offset: i32) -> i32;
    fn mbuffer_get_byte_slice(
        &mut self,
        source_handle: i32,
        starting_position: i32,
        slice_length: i32,
        result_offset: i32,
    ) -> i32;
    fn mbuffer_copy_byte_slice(
        &mut self,
        source_handle: i32,
        starting_position: i32,
        slice_length: i32,
        destination_handle: i32,
    ) -> i32;
    fn mbuffer_eq(&mut self, handle1: i32, handle2: i32) -> i32;
    fn mbuffer_set_bytes(&mut self, handle: i32, data_offset: i32, data_length: i32) -> i32;
    fn mbuffer_set_byte_slice(
        &mut self,
        handle: i32,
        starting_position: i32,
        data_length: i32,
        data_offset: i32,
    ) -> i32;
    fn mbuffer_append(&mut self, accumulator_handle: i32, data_handle: i32) -> i32;
    fn mbuffer_append_bytes(
        &mut self,
        accumulator_handle: i32,
        data_offset: i32,
        data_length: i32,
    ) -> i32;
    fn mbuffer_to_big_int_unsigned(&mut self, buffer_handle: i32, bigint_handle: i32) -> i32;
    fn mbuffer_to_big_int_signed(&mut self, buffer_handle: i32, bigint_handle: i32) -> i32;
    fn mbuffer_from_big_int_unsigned(&mut self, buffer_handle: i32, bigint_handle: i32) -> i32;
    fn mbuffer_from_big_int_signed(&mut self, buffer_handle: i32, bigint_handle: i32) -> i32;
    fn mbuffer_to_big_float(&mut self, buffer_handle: i32, bigfloat_handle: i32) -> i32;
    fn mbuffer_from_big_float(&mut self, buffer_handle: i32, bigfloat_handle: i32) -> i32;
    fn mbuffer_storage_store(&mut self, key_handle: i32, source_handle: i32) -> i32;
    fn mbuffer_storage_load(&mut self, key_handle: i32, destination_handle: i32) -> i32;
    fn mbuffer_storage_load_from_address(
        &mut self,
        address_handle: i32,
        key_handle: i32,
        destination_handle: i32,
    );
    fn mbuffer_get_argument(&mut self, arg_index: i32, destination_handle: i32) -> i32;
    fn mbuffer_finish(&mut self, source_handle: i32) -> i32;
    fn mbuffer_set_random(&mut self, destination_handle: i32, length: i32) -> i32;

    /// Explicit user-level revert with a message taken from WASM memory.
    fn signal_error(&mut self, message_offset: i32, message_length: i32);
}
