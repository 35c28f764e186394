// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Coprocessor 0 registers.

pub mod status {
    use crate::frame::Register;

    /// Interrupt mask, IM0..IM7
    pub const INT_MASK: Register = 0xff00;
    /// Interrupt enable
    pub const IE: Register = 1 << 0;
    /// Exception level
    pub const EXL: Register = 1 << 1;
    /// Error level
    pub const ERL: Register = 1 << 2;
    pub const KSU_MASK: Register = 0x18;
    pub const KSU_USER: Register = 0x10;
    pub const KSU_KERNEL: Register = 0x00;

    #[cfg(target_arch = "mips")]
    #[inline(always)]
    pub fn read() -> Register {
        let val: Register;
        unsafe { core::arch::asm!("mfc0 {}, $12", out(reg) val) };
        val
    }

    /// # Safety
    /// Changing the operating mode or interrupt state under the kernel's feet
    /// is on the caller.
    #[cfg(target_arch = "mips")]
    #[inline(always)]
    pub unsafe fn write(val: Register) {
        core::arch::asm!("mtc0 {}, $12", "nop", in(reg) val);
    }

    #[cfg(target_arch = "mips")]
    pub fn enable_interrupts() {
        unsafe { write(read() | IE) };
    }

    /// Returns the previous status word so it can be handed back to
    /// [`write`].
    #[cfg(target_arch = "mips")]
    pub fn disable_interrupts() -> Register {
        let old = read();
        unsafe { write(old & !IE) };
        old
    }
}

pub mod cause {
    use crate::frame::Register;

    pub const EXC_CODE_MASK: Register = 0x7c;
    pub const EXC_CODE_SHIFT: u32 = 2;

    pub const EXC_INT: Register = 0;
    pub const EXC_MOD: Register = 1;
    pub const EXC_TLBL: Register = 2;
    pub const EXC_TLBS: Register = 3;
    pub const EXC_ADEL: Register = 4;
    pub const EXC_ADES: Register = 5;
    pub const EXC_IBE: Register = 6;
    pub const EXC_DBE: Register = 7;
    pub const EXC_SYS: Register = 8;
    pub const EXC_BP: Register = 9;
    pub const EXC_RI: Register = 10;
    pub const EXC_CPU: Register = 11;
    pub const EXC_OV: Register = 12;
    pub const EXC_TRAP: Register = 13;
    pub const EXC_FPE: Register = 15;
    pub const EXC_C2E: Register = 18;
    pub const EXC_MDMX: Register = 22;
    pub const EXC_WATCH: Register = 23;
    pub const EXC_MCHECK: Register = 24;
    pub const EXC_THREAD: Register = 25;
    pub const EXC_DSP: Register = 26;
    pub const EXC_CACHE_ERR: Register = 30;

    pub fn exc_code(cause: Register) -> Register {
        (cause & EXC_CODE_MASK) >> EXC_CODE_SHIFT
    }

    #[cfg(target_arch = "mips")]
    #[inline(always)]
    pub fn read() -> Register {
        let val: Register;
        unsafe { core::arch::asm!("mfc0 {}, $13", out(reg) val) };
        val
    }
}

pub mod badvaddr {
    #[cfg(target_arch = "mips")]
    #[inline(always)]
    pub fn read() -> crate::frame::Register {
        let val: crate::frame::Register;
        unsafe { core::arch::asm!("mfc0 {}, $8", out(reg) val) };
        val
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_code_extraction() {
        assert_eq!(cause::exc_code(cause::EXC_RI << 2), cause::EXC_RI);
        assert_eq!(cause::exc_code((cause::EXC_TLBS << 2) | 0x8000_ff00), cause::EXC_TLBS);
        assert_eq!(cause::exc_code(0xffff_ff83), 0);
    }
}
