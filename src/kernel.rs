// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Services the architecture core borrows from the kernel proper.

use crate::frame::CpuRegs;

/// A user virtual address.
pub type UserAddr = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Signal {
    IllegalInstruction = 4,
}

impl Signal {
    pub fn number(self) -> u32 {
        self as u32
    }
}

/// Exception bookkeeping the dispatcher hands pending conditions to.
pub trait Kernel {
    /// Record `signal` as pending for the current thread.
    fn exception_mark(&mut self, signal: Signal);
    /// Deliver pending conditions; may redirect the current thread.
    fn exception_deliver(&mut self);
    /// Raise the interrupt priority level to the maximum.
    fn splhigh(&mut self);
}

/// A copy between kernel and user memory faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFault {
    pub address: UserAddr,
}

impl core::fmt::Display for MemoryFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "faulted accessing user memory at {:#x}", self.address)
    }
}

/// Checked copies of a register frame to and from user memory.
pub trait UserAccess {
    fn copy_out(&mut self, regs: &CpuRegs, dst: UserAddr) -> Result<(), MemoryFault>;
    fn copy_in(&mut self, src: UserAddr, regs: &mut CpuRegs) -> Result<(), MemoryFault>;
}

/// Binding to the C kernel's services on the real target.
#[cfg(target_arch = "mips")]
pub struct ExternKernel;

#[cfg(target_arch = "mips")]
mod ffi {
    use core::ffi::{c_int, c_void};

    extern "C" {
        pub fn exception_mark(signal: c_int);
        pub fn exception_deliver();
        pub fn splhigh() -> c_int;
        pub fn copyin(uaddr: *const c_void, kaddr: *mut c_void, len: usize) -> c_int;
        pub fn copyout(kaddr: *const c_void, uaddr: *mut c_void, len: usize) -> c_int;
    }
}

#[cfg(target_arch = "mips")]
impl Kernel for ExternKernel {
    fn exception_mark(&mut self, signal: Signal) {
        unsafe { ffi::exception_mark(signal.number() as core::ffi::c_int) };
    }

    fn exception_deliver(&mut self) {
        unsafe { ffi::exception_deliver() };
    }

    fn splhigh(&mut self) {
        unsafe { ffi::splhigh() };
    }
}

#[cfg(target_arch = "mips")]
impl UserAccess for ExternKernel {
    fn copy_out(&mut self, regs: &CpuRegs, dst: UserAddr) -> Result<(), MemoryFault> {
        let size = core::mem::size_of::<CpuRegs>();
        match unsafe { ffi::copyout((regs as *const CpuRegs).cast(), dst as *mut _, size) } {
            0 => Ok(()),
            _ => Err(MemoryFault { address: dst }),
        }
    }

    fn copy_in(&mut self, src: UserAddr, regs: &mut CpuRegs) -> Result<(), MemoryFault> {
        let size = core::mem::size_of::<CpuRegs>();
        match unsafe { ffi::copyin(src as *const _, (regs as *mut CpuRegs).cast(), size) } {
            0 => Ok(()),
            _ => Err(MemoryFault { address: src }),
        }
    }
}
