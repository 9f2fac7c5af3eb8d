// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT

/// Host execution result.
pub type Result<T> = std::result::Result<T, VmError>;

/// Every failure the host can classify. The driver owns the total mapping
/// from these values to [`kestrel_common::ReturnCode`]; faults raised from
/// hooks carry exactly one of these so the mapping stays side-effect-free.
#[derive(thiserror::Error, Debug)]
pub enum VmError {
    /// Explicit user-level revert; the output's own return message is the
    /// authoritative text for this one.
    #[error("signal error")]
    SignalError,

    #[error("not enough gas")]
    NotEnoughGas,

    #[error("execution failed")]
    ExecutionFailed,

    #[error("error running function")]
    FunctionRunError,

    #[error("function not found")]
    FunctionNotFound,

    #[error("it is not allowed to call init in run")]
    InitFuncCalledInRun,

    #[error("return code is not ok")]
    ReturnCodeNotOk,

    #[error("invalid contract code")]
    ContractInvalid,

    #[error("invalid upgrade arguments")]
    InvalidUpgradeArguments,

    #[error("operation not permitted in read only mode")]
    InvalidCallOnReadOnlyMode,

    #[error("cannot write to storage under read only mode")]
    CannotWriteOnReadOnly,

    #[error("no managed buffer under the given handle")]
    NoManagedBufferUnderThisHandle,

    #[error("no big int under the given handle")]
    NoBigIntUnderThisHandle,

    #[error("no big float under the given handle")]
    NoBigFloatUnderThisHandle,

    #[error("argument index out of range")]
    ArgOutOfRange,

    #[error("infinity operations are not allowed on big floats")]
    InfinityFloatOperation,

    #[error("unknown precision for encoded big float")]
    BigFloatWrongPrecision,

    #[error("length of buffer is not correct")]
    LengthOfBufferNotCorrect,

    #[error("no contract instance available")]
    NoInstanceAvailable,

    #[error("bad bounds: offset {offset} length {length}")]
    BadBounds { offset: i32, length: i32 },

    /// Failures surfaced by the consumed interfaces (engine, blockchain,
    /// crypto). The original text flows into the output artifact unchanged.
    #[error(transparent)]
    Hook(#[from] anyhow::Error),
}
