// Copyright 2021-2023 Kestrel Labs
// SPDX-License-Identifier: Apache-2.0, MIT
//! Deferred cross-contract calls. Calls are grouped under an identifier
//! and share one callback; the host only enqueues them, and execution
//! happens in a later block, resumed through the group callback.
//! Persisting groups across frames is the embedder's job, through the
//! storage interface.

use kestrel_common::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncCallStatus {
    Pending,
    Resolved,
    Rejected,
    Completed,
}

/// One deferred invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncCall {
    pub status: AsyncCallStatus,
    pub destination: Address,
    pub data: Vec<u8>,
    pub value: Vec<u8>,
    pub gas_limit: u64,
    pub gas_locked: u64,
    pub success_callback: String,
    pub error_callback: String,
}

impl AsyncCall {
    pub fn new(destination: Address, data: Vec<u8>) -> Self {
        AsyncCall {
            status: AsyncCallStatus::Pending,
            destination,
            data,
            value: Vec::new(),
            gas_limit: 0,
            gas_locked: 0,
            success_callback: String::new(),
            error_callback: String::new(),
        }
    }
}

/// A named collection of async calls resolved by a single callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncCallGroup {
    pub identifier: String,
    /// Empty means "no callback".
    pub callback: String,
    /// Gas reserved for the callback; equals the sum of the gas locked by
    /// the constituent calls once the group is sealed.
    pub gas_locked: u64,
    pub callback_data: Vec<u8>,
    pub async_calls: Vec<AsyncCall>,
}

impl AsyncCallGroup {
    pub fn new(identifier: impl Into<String>) -> Self {
        AsyncCallGroup {
            identifier: identifier.into(),
            callback: String::new(),
            gas_locked: 0,
            callback_data: Vec::new(),
            async_calls: Vec::new(),
        }
    }

    pub fn add_async_call(&mut self, call: AsyncCall) {
        self.async_calls.push(call);
    }

    /// Index of the call addressed to `destination`, if any.
    pub fn find_by_destination(&self, destination: &[u8]) -> Option<usize> {
        self.async_calls
            .iter()
            .position(|call| call.destination == destination)
    }

    /// Removes the call at `index` by swapping with the last entry; order
    /// is not preserved. Out-of-range indices leave the group unchanged.
    pub fn delete_async_call(&mut self, index: usize) -> Option<AsyncCall> {
        if index >= self.async_calls.len() {
            return None;
        }
        Some(self.async_calls.swap_remove(index))
    }

    /// Retains only the calls still pending, preserving their order.
    pub fn delete_completed_async_calls(&mut self) {
        self.async_calls
            .retain(|call| call.status == AsyncCallStatus::Pending);
    }

    pub fn has_pending_calls(&self) -> bool {
        !self.async_calls.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.async_calls.is_empty()
    }

    pub fn has_callback(&self) -> bool {
        !self.callback.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_to(dest: &[u8]) -> AsyncCall {
        AsyncCall::new(dest.to_vec(), b"payload".to_vec())
    }

    #[test]
    fn group_lifecycle() {
        let mut group = AsyncCallGroup::new("X");
        assert!(group.is_complete());
        assert!(!group.has_pending_calls());
        assert!(!group.has_callback());

        group.add_async_call(call_to(b"A"));
        let mut b = call_to(b"B");
        b.status = AsyncCallStatus::Completed;
        group.add_async_call(b);
        group.add_async_call(call_to(b"C"));

        group.delete_completed_async_calls();
        assert_eq!(group.async_calls.len(), 2);
        assert_eq!(group.async_calls[0].destination, b"A");
        assert_eq!(group.async_calls[1].destination, b"C");

        assert_eq!(group.find_by_destination(b"C"), Some(1));
        assert_eq!(group.find_by_destination(b"missing"), None);

        let removed = group.delete_async_call(1).unwrap();
        assert_eq!(removed.destination, b"C");
        assert!(group.has_pending_calls());

        let removed = group.delete_async_call(0).unwrap();
        assert_eq!(removed.destination, b"A");
        assert!(group.is_complete());
    }

    #[test]
    fn delete_out_of_range_is_a_no_op() {
        let mut group = AsyncCallGroup::new("g");
        group.add_async_call(call_to(b"A"));
        assert!(group.delete_async_call(1).is_none());
        assert_eq!(group.async_calls.len(), 1);

        let mut empty = AsyncCallGroup::new("empty");
        assert!(empty.delete_async_call(0).is_none());
    }

    #[test]
    fn delete_swaps_with_last() {
        let mut group = AsyncCallGroup::new("g");
        for dest in [b"A", b"B", b"C"] {
            group.add_async_call(call_to(dest));
        }
        let removed = group.delete_async_call(0).unwrap();
        assert_eq!(removed.destination, b"A");
        assert_eq!(group.async_calls[0].destination, b"C");
        assert_eq!(group.async_calls.len(), 2);
    }

    #[test]
    fn clone_is_deep_and_keeps_callback_data() {
        let mut group = AsyncCallGroup::new("X");
        group.callback = "on_done".to_string();
        group.callback_data = b"resume with this".to_vec();
        group.gas_locked = 500;
        group.add_async_call(call_to(b"A"));

        let mut cloned = group.clone();
        assert_eq!(cloned, group);
        assert!(cloned.has_callback());
        // The bytes must be owned independently.
        assert_eq!(cloned.callback_data, group.callback_data);
        cloned.callback_data.extend_from_slice(b" and more");
        cloned.async_calls[0].status = AsyncCallStatus::Rejected;
        assert_eq!(group.callback_data, b"resume with this");
        assert_eq!(group.async_calls[0].status, AsyncCallStatus::Pending);
    }
}
