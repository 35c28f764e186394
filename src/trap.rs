// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use crate::{
    cp0::cause,
    frame::{CpuRegs, Register},
    kernel::{Kernel, Signal},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(usize)]
pub enum ExceptionCode {
    Interrupt = cause::EXC_INT,
    TlbModified = cause::EXC_MOD,
    TlbLoad = cause::EXC_TLBL,
    TlbStore = cause::EXC_TLBS,
    AddressErrorLoad = cause::EXC_ADEL,
    AddressErrorStore = cause::EXC_ADES,
    InstructionBusError = cause::EXC_IBE,
    DataBusError = cause::EXC_DBE,
    Syscall = cause::EXC_SYS,
    Breakpoint = cause::EXC_BP,
    ReservedInstruction = cause::EXC_RI,
    CoprocessorUnusable = cause::EXC_CPU,
    Overflow = cause::EXC_OV,
    Trap = cause::EXC_TRAP,
    FloatingPoint = cause::EXC_FPE,
    Coprocessor2 = cause::EXC_C2E,
    Mdmx = cause::EXC_MDMX,
    Watch = cause::EXC_WATCH,
    MachineCheck = cause::EXC_MCHECK,
    Thread = cause::EXC_THREAD,
    Dsp = cause::EXC_DSP,
    CacheError = cause::EXC_CACHE_ERR,

    Reserved = usize::MAX,
}

impl ExceptionCode {
    pub fn from_cause(cause: Register) -> Self {
        use ExceptionCode::*;

        match cause::exc_code(cause) {
            0 => Interrupt,
            1 => TlbModified,
            2 => TlbLoad,
            3 => TlbStore,
            4 => AddressErrorLoad,
            5 => AddressErrorStore,
            6 => InstructionBusError,
            7 => DataBusError,
            8 => Syscall,
            9 => Breakpoint,
            10 => ReservedInstruction,
            11 => CoprocessorUnusable,
            12 => Overflow,
            13 => Trap,
            15 => FloatingPoint,
            18 => Coprocessor2,
            22 => Mdmx,
            23 => Watch,
            24 => MachineCheck,
            25 => Thread,
            26 => Dsp,
            30 => CacheError,

            _ => Reserved,
        }
    }
}

/// Classify a synchronous exception and hand the resulting condition to the
/// kernel. Interrupts and system calls are routed elsewhere by the entry code
/// and never reach this point.
pub fn dispatch(regs: &mut CpuRegs, cause: Register, badvaddr: Register, kernel: &mut impl Kernel) {
    let code = ExceptionCode::from_cause(cause);
    log::debug!("exception: {:?}, epc: {:#x}, badvaddr: {:#x}", code, regs.epc, badvaddr);

    assert!(code != ExceptionCode::Interrupt, "[KERNEL BUG] interrupt routed to the trap handler");
    assert!(code != ExceptionCode::Syscall, "[KERNEL BUG] system call routed to the trap handler");

    match code {
        ExceptionCode::TlbLoad | ExceptionCode::TlbStore => {
            #[cfg(debug_assertions)]
            dump(regs, cause, badvaddr);

            // No page fault recovery exists, whichever mode faulted
            panic!(
                "TLB exception in kernel: {:?} @ {:#x}, epc: {:#x}, user mode: {}",
                code,
                badvaddr,
                regs.epc,
                !regs.is_kernel_mode()
            );
        }
        ExceptionCode::ReservedInstruction => {
            #[cfg(debug_assertions)]
            dump(regs, cause, badvaddr);

            kernel.exception_mark(Signal::IllegalInstruction);
        }
        code => {
            #[cfg(debug_assertions)]
            dump(regs, cause, badvaddr);

            panic!("Unhandled exception type: {:?}, epc: {:#x}, badvaddr: {:#x}", code, regs.epc, badvaddr);
        }
    }

    kernel.exception_deliver();
    kernel.splhigh();
}

#[cfg(target_arch = "mips")]
#[no_mangle]
pub extern "C" fn trap_handler(regs: &mut CpuRegs) {
    let cause = cause::read();
    let badvaddr = crate::cp0::badvaddr::read();

    dispatch(regs, cause, badvaddr, &mut crate::kernel::ExternKernel);
}

/// Log a frame together with the exception that produced it.
#[cfg(debug_assertions)]
pub fn dump(regs: &CpuRegs, cause: Register, badvaddr: Register) {
    dump_frame(regs);
    log::error!("epc {:08x}  bad {:08x}  status {:08x}  cause {:08x}", regs.epc, badvaddr, regs.status, cause);
}

#[cfg(debug_assertions)]
pub fn dump_frame(regs: &CpuRegs) {
    use core::fmt::Write;

    log::error!("Trap frame {:#p}", regs);

    // Everything from `at` onward, six to a line
    let named = CpuRegs::NAMES.iter().zip(regs.registers()).skip(4);
    let mut line = tinyvec::ArrayVec::<[u8; 96]>::new();
    for (i, (name, value)) in named.enumerate() {
        let _ = write!(LineBuf(&mut line), " {} {:08x}", name, value);
        if i % 6 == 5 {
            log::error!("{}", LineBuf(&mut line).as_str());
            line.clear();
        }
    }

    if !line.is_empty() {
        log::error!("{}", LineBuf(&mut line).as_str());
    }
}

#[cfg(debug_assertions)]
struct LineBuf<'a>(&'a mut tinyvec::ArrayVec<[u8; 96]>);

#[cfg(debug_assertions)]
impl LineBuf<'_> {
    fn as_str(&self) -> &str {
        core::str::from_utf8(self.0.as_slice()).unwrap_or("<invalid>")
    }
}

#[cfg(debug_assertions)]
impl core::fmt::Write for LineBuf<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        match self.0.capacity() - self.0.len() >= s.len() {
            true => {
                self.0.extend_from_slice(s.as_bytes());
                Ok(())
            }
            false => Err(core::fmt::Error),
        }
    }
}
