// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Storage for `R_MIPS_HI16` relocations waiting on their `R_MIPS_LO16`.

use alloc::vec::Vec;
use tinyvec::{Array, ArrayVec};

/// Slots in a [`BoundedStore`] unless another array type is chosen.
pub const DEFAULT_HI16_SLOTS: usize = 4;

/// An `R_MIPS_HI16` site and the symbol value it was recorded with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingHi16 {
    /// Offset of the instruction word inside the target section.
    pub offset: u32,
    pub symbol: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Bounded(usize),
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    Full,
    OutOfMemory,
}

pub trait PendingHi16Store {
    fn push(&mut self, entry: PendingHi16) -> Result<(), PushError>;
    /// Remove every entry, most recently pushed first.
    fn drain_in_order(&mut self, f: &mut dyn FnMut(PendingHi16));
    fn capacity(&self) -> Capacity;
    fn len(&self) -> usize;
    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed number of slots, no allocation.
#[derive(Debug, Clone, Default)]
pub struct BoundedStore<A: Array<Item = PendingHi16> = [PendingHi16; DEFAULT_HI16_SLOTS]>(ArrayVec<A>);

impl<A: Array<Item = PendingHi16>> BoundedStore<A> {
    pub fn new() -> Self {
        Self(ArrayVec::new())
    }
}

impl<A: Array<Item = PendingHi16>> PendingHi16Store for BoundedStore<A> {
    fn push(&mut self, entry: PendingHi16) -> Result<(), PushError> {
        match self.0.try_push(entry) {
            None => Ok(()),
            Some(_) => Err(PushError::Full),
        }
    }

    fn drain_in_order(&mut self, f: &mut dyn FnMut(PendingHi16)) {
        while let Some(entry) = self.0.pop() {
            f(entry);
        }
    }

    fn capacity(&self) -> Capacity {
        Capacity::Bounded(A::CAPACITY)
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// Heap backed; grows until allocation fails.
#[derive(Debug, Clone, Default)]
pub struct UnboundedStore(Vec<PendingHi16>);

impl UnboundedStore {
    pub const fn new() -> Self {
        Self(Vec::new())
    }
}

impl PendingHi16Store for UnboundedStore {
    fn push(&mut self, entry: PendingHi16) -> Result<(), PushError> {
        self.0.try_reserve(1).map_err(|_| PushError::OutOfMemory)?;
        self.0.push(entry);

        Ok(())
    }

    fn drain_in_order(&mut self, f: &mut dyn FnMut(PendingHi16)) {
        while let Some(entry) = self.0.pop() {
            f(entry);
        }
    }

    fn capacity(&self) -> Capacity {
        Capacity::Unbounded
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}
