// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Host implementations of the contract-facing import surface.

mod managed_buffer;

/// Import names as contract code sees them; also the keys under which gas
/// tracing attributes charges.
pub mod api_names {
    pub const MBUFFER_NEW: &str = "mBufferNew";
    pub const MBUFFER_NEW_FROM_BYTES: &str = "mBufferNewFromBytes";
    pub const MBUFFER_GET_LENGTH: &str = "mBufferGetLength";
    pub const MBUFFER_GET_BYTES: &str = "mBufferGetBytes";
    pub const MBUFFER_GET_BYTE_SLICE: &str = "mBufferGetByteSlice";
    pub const MBUFFER_COPY_BYTE_SLICE: &str = "mBufferCopyByteSlice";
    pub const MBUFFER_EQ: &str = "mBufferEq";
    pub const MBUFFER_SET_BYTES: &str = "mBufferSetBytes";
    pub const MBUFFER_SET_BYTE_SLICE: &str = "mBufferSetByteSlice";
    pub const MBUFFER_APPEND: &str = "mBufferAppend";
    pub const MBUFFER_APPEND_BYTES: &str = "mBufferAppendBytes";
    pub const MBUFFER_TO_BIG_INT_UNSIGNED: &str = "mBufferToBigIntUnsigned";
    pub const MBUFFER_TO_BIG_INT_SIGNED: &str = "mBufferToBigIntSigned";
    pub const MBUFFER_FROM_BIG_INT_UNSIGNED: &str = "mBufferFromBigIntUnsigned";
    pub const MBUFFER_FROM_BIG_INT_SIGNED: &str = "mBufferFromBigIntSigned";
    pub const MBUFFER_TO_BIG_FLOAT: &str = "mBufferToBigFloat";
    pub const MBUFFER_FROM_BIG_FLOAT: &str = "mBufferFromBigFloat";
    pub const MBUFFER_STORAGE_STORE: &str = "mBufferStorageStore";
    pub const MBUFFER_STORAGE_LOAD: &str = "mBufferStorageLoad";
    pub const MBUFFER_GET_ARGUMENT: &str = "mBufferGetArgument";
    pub const MBUFFER_FINISH: &str = "mBufferFinish";
    pub const MBUFFER_SET_RANDOM: &str = "mBufferSetRandom";
}
