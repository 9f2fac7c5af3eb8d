// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use num_bigint::BigUint;
use num_traits::Zero;

use crate::errors::{Result, VmError};

/// Fixed mantissa precision of every float in the managed-types table.
/// Encodings carrying any other precision are rejected.
pub const BIG_FLOAT_PRECISION: u32 = 53;

const ENCODING_VERSION: u8 = 1;
const HEADER_LEN: usize = 10;

const FLAG_NEGATIVE: u8 = 0b0000_0001;
const FLAG_INFINITE: u8 = 0b0000_0010;

/// An arbitrary-exponent binary float with a fixed precision policy.
///
/// The value is `(-1)^negative * mantissa * 2^exponent`, or an infinity
/// when the flag is set. Infinities can be represented (so encodings can be
/// inspected) but the hook layer refuses to admit them into the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BigFloat {
    negative: bool,
    infinite: bool,
    exponent: i32,
    mantissa: BigUint,
}

impl BigFloat {
    pub fn new(negative: bool, exponent: i32, mantissa: BigUint) -> Self {
        BigFloat {
            negative,
            infinite: false,
            exponent,
            mantissa,
        }
    }

    pub fn infinity(negative: bool) -> Self {
        BigFloat {
            negative,
            infinite: true,
            exponent: 0,
            mantissa: BigUint::zero(),
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Wire layout: version (1), flags (1), precision (4, BE), exponent
    /// (4, BE two's complement), mantissa big-endian bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mantissa = self.mantissa.to_bytes_be();
        let mut out = Vec::with_capacity(HEADER_LEN + mantissa.len());
        out.push(ENCODING_VERSION);
        let mut flags = 0u8;
        if self.negative {
            flags |= FLAG_NEGATIVE;
        }
        if self.infinite {
            flags |= FLAG_INFINITE;
        }
        out.push(flags);
        out.extend_from_slice(&BIG_FLOAT_PRECISION.to_be_bytes());
        out.extend_from_slice(&self.exponent.to_be_bytes());
        out.extend_from_slice(&mantissa);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<BigFloat> {
        if bytes.len() < HEADER_LEN || bytes[0] != ENCODING_VERSION {
            return Err(VmError::BigFloatWrongPrecision);
        }
        let precision = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        if precision != BIG_FLOAT_PRECISION {
            return Err(VmError::BigFloatWrongPrecision);
        }
        let flags = bytes[1];
        let exponent = i32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        Ok(BigFloat {
            negative: flags & FLAG_NEGATIVE != 0,
            infinite: flags & FLAG_INFINITE != 0,
            exponent,
            mantissa: BigUint::from_bytes_be(&bytes[HEADER_LEN..]),
        })
    }
}
