// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Saved register layouts shared between Rust and the exception entry code.
//!
//! The assembly in [`crate::arch`] addresses both structures through the
//! `CTX_*` and `KREG_*` offsets below, so the field order here is ABI. Every
//! offset is checked against `offset_of!` at compile time.

use crate::cp0::status;
use static_assertions::{assert_eq_size, const_assert_eq};

/// A native general purpose register.
pub type Register = usize;

pub const REGISTER_SIZE: usize = core::mem::size_of::<Register>();

/// Number of words in a [`CpuRegs`] frame.
pub const CPU_REG_COUNT: usize = 33;

/// Stack space the entry code reserves for a frame: the registers plus three
/// words of argument spill area.
pub const CTXREGS: usize = REGISTER_SIZE * (CPU_REG_COUNT + 3);

#[cfg(feature = "mmu")]
pub const KERN_REG_COUNT: usize = 13;
#[cfg(not(feature = "mmu"))]
pub const KERN_REG_COUNT: usize = 14;

pub const KREGS: usize = REGISTER_SIZE * KERN_REG_COUNT;

macro_rules! offsets {
    ($($name:ident = $index:expr),+ $(,)?) => {
        $(pub const $name: usize = $index * REGISTER_SIZE;)+
    };
}

offsets! {
    CTX_EPC = 0,
    CTX_STATUS = 1,
    CTX_LO = 2,
    CTX_HI = 3,
    CTX_AT = 4,
    CTX_V0 = 5,
    CTX_V1 = 6,
    CTX_A0 = 7,
    CTX_A1 = 8,
    CTX_A2 = 9,
    CTX_A3 = 10,
    CTX_T0 = 11,
    CTX_T1 = 12,
    CTX_T2 = 13,
    CTX_T3 = 14,
    CTX_T4 = 15,
    CTX_T5 = 16,
    CTX_T6 = 17,
    CTX_T7 = 18,
    CTX_S0 = 19,
    CTX_S1 = 20,
    CTX_S2 = 21,
    CTX_S3 = 22,
    CTX_S4 = 23,
    CTX_S5 = 24,
    CTX_S6 = 25,
    CTX_S7 = 26,
    CTX_T8 = 27,
    CTX_T9 = 28,
    CTX_GP = 29,
    CTX_SP = 30,
    CTX_S8 = 31,
    CTX_RA = 32,
}

offsets! {
    KREG_S0 = 0,
    KREG_S1 = 1,
    KREG_S2 = 2,
    KREG_S3 = 3,
    KREG_S4 = 4,
    KREG_S5 = 5,
    KREG_S6 = 6,
    KREG_S7 = 7,
    KREG_S8 = 8,
    KREG_GP = 9,
    KREG_SP = 10,
    KREG_RA = 11,
    KREG_KSTACK = 12,
}

#[cfg(not(feature = "mmu"))]
offsets! { KREG_STATUS = 13 }

/// Register frame saved by the exception entry code at the top of a thread's
/// kernel stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct CpuRegs {
    pub epc: Register,
    pub status: Register,
    pub lo: Register,
    pub hi: Register,
    pub at: Register,
    pub v0: Register,
    pub v1: Register,
    pub a0: Register,
    pub a1: Register,
    pub a2: Register,
    pub a3: Register,
    pub t0: Register,
    pub t1: Register,
    pub t2: Register,
    pub t3: Register,
    pub t4: Register,
    pub t5: Register,
    pub t6: Register,
    pub t7: Register,
    pub s0: Register,
    pub s1: Register,
    pub s2: Register,
    pub s3: Register,
    pub s4: Register,
    pub s5: Register,
    pub s6: Register,
    pub s7: Register,
    pub t8: Register,
    pub t9: Register,
    pub gp: Register,
    pub sp: Register,
    pub s8: Register,
    pub ra: Register,
}

impl CpuRegs {
    /// Register names in frame order.
    pub const NAMES: [&'static str; CPU_REG_COUNT] = [
        "epc", "status", "lo", "hi", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5",
        "t6", "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "gp", "sp", "s8", "ra",
    ];

    pub fn registers(&self) -> &[Register; CPU_REG_COUNT] {
        // SAFETY: `repr(C)` struct of `CPU_REG_COUNT` registers with no padding
        unsafe { &*(self as *const Self).cast() }
    }

    pub fn registers_mut(&mut self) -> &mut [Register; CPU_REG_COUNT] {
        // SAFETY: see `registers`
        unsafe { &mut *(self as *mut Self).cast() }
    }

    /// Whether the frame was taken while the CPU was in kernel mode.
    pub fn is_kernel_mode(&self) -> bool {
        self.status & status::KSU_MASK == status::KSU_KERNEL
    }
}

/// Callee-saved kernel registers exchanged by `cpu_switch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct KernRegs {
    pub s0: Register,
    pub s1: Register,
    pub s2: Register,
    pub s3: Register,
    pub s4: Register,
    pub s5: Register,
    pub s6: Register,
    pub s7: Register,
    pub s8: Register,
    pub gp: Register,
    pub sp: Register,
    pub ra: Register,
    /// Top of the thread's kernel stack.
    pub kstack: Register,
    #[cfg(not(feature = "mmu"))]
    pub status: Register,
}

assert_eq_size!(CpuRegs, [Register; CPU_REG_COUNT]);
assert_eq_size!(KernRegs, [Register; KERN_REG_COUNT]);

macro_rules! assert_offsets {
    ($ty:ty { $($field:ident => $offset:ident),+ $(,)? }) => {
        $(const_assert_eq!(core::mem::offset_of!($ty, $field), $offset);)+
    };
}

assert_offsets!(CpuRegs {
    epc => CTX_EPC,
    status => CTX_STATUS,
    lo => CTX_LO,
    hi => CTX_HI,
    at => CTX_AT,
    v0 => CTX_V0,
    v1 => CTX_V1,
    a0 => CTX_A0,
    a1 => CTX_A1,
    a2 => CTX_A2,
    a3 => CTX_A3,
    t0 => CTX_T0,
    t1 => CTX_T1,
    t2 => CTX_T2,
    t3 => CTX_T3,
    t4 => CTX_T4,
    t5 => CTX_T5,
    t6 => CTX_T6,
    t7 => CTX_T7,
    s0 => CTX_S0,
    s1 => CTX_S1,
    s2 => CTX_S2,
    s3 => CTX_S3,
    s4 => CTX_S4,
    s5 => CTX_S5,
    s6 => CTX_S6,
    s7 => CTX_S7,
    t8 => CTX_T8,
    t9 => CTX_T9,
    gp => CTX_GP,
    sp => CTX_SP,
    s8 => CTX_S8,
    ra => CTX_RA,
});

assert_offsets!(KernRegs {
    s0 => KREG_S0,
    s1 => KREG_S1,
    s2 => KREG_S2,
    s3 => KREG_S3,
    s4 => KREG_S4,
    s5 => KREG_S5,
    s6 => KREG_S6,
    s7 => KREG_S7,
    s8 => KREG_S8,
    gp => KREG_GP,
    sp => KREG_SP,
    ra => KREG_RA,
    kstack => KREG_KSTACK,
});

#[cfg(not(feature = "mmu"))]
assert_offsets!(KernRegs { status => KREG_STATUS });

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn frame_offsets_match_entry_code() {
        assert_eq!(offset_of!(CpuRegs, epc), 0);
        assert_eq!(offset_of!(CpuRegs, a0), 7 * REGISTER_SIZE);
        assert_eq!(offset_of!(CpuRegs, sp), 30 * REGISTER_SIZE);
        assert_eq!(offset_of!(CpuRegs, ra), 32 * REGISTER_SIZE);
        assert_eq!(size_of::<CpuRegs>(), CPU_REG_COUNT * REGISTER_SIZE);
        assert_eq!(CTXREGS, size_of::<CpuRegs>() + 3 * REGISTER_SIZE);
    }

    #[test]
    fn kernel_register_layout() {
        assert_eq!(offset_of!(KernRegs, sp), KREG_SP);
        assert_eq!(offset_of!(KernRegs, kstack), 12 * REGISTER_SIZE);
        assert_eq!(size_of::<KernRegs>(), KREGS);

        #[cfg(not(feature = "mmu"))]
        assert_eq!(KREGS, 14 * REGISTER_SIZE);
        #[cfg(feature = "mmu")]
        assert_eq!(KREGS, 13 * REGISTER_SIZE);
    }

    #[test]
    fn flat_view_follows_field_order() {
        let mut regs = CpuRegs::default();
        for (i, reg) in regs.registers_mut().iter_mut().enumerate() {
            *reg = i;
        }

        assert_eq!(regs.epc, 0);
        assert_eq!(regs.status, 1);
        assert_eq!(regs.a3, 10);
        assert_eq!(regs.t8, 27);
        assert_eq!(regs.ra, 32);
        assert_eq!(regs.registers()[CTX_SP / REGISTER_SIZE], regs.sp);
        assert_eq!(CpuRegs::NAMES[CTX_GP / REGISTER_SIZE], "gp");
    }

    #[test]
    fn mode_from_status() {
        let mut regs = CpuRegs { status: status::INT_MASK | status::IE, ..Default::default() };
        assert!(regs.is_kernel_mode());

        regs.status |= status::KSU_USER;
        assert!(!regs.is_kernel_mode());
    }
}
