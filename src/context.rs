// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Per-thread execution state.
//!
//! A thread's user registers always live in the frame at the top of its
//! kernel stack, written there by the exception entry code. The scheduler
//! swaps the kernel registers with [`context_switch`]; the user frame comes
//! back automatically on the way out to user mode.

use crate::{
    arch,
    cp0::status,
    frame::{CpuRegs, KernRegs, Register, REGISTER_SIZE},
    kernel::{MemoryFault, UserAccess, UserAddr},
};
use core::{mem::size_of, num::NonZeroUsize, ptr::NonNull};

/// Entry point of a kernel thread, called with the value of
/// [`ContextField::KernelArg`].
pub type KernelEntry = extern "C" fn(Register);

pub const CTX_UENTRY: u32 = 0;
pub const CTX_UARG: u32 = 1;
pub const CTX_USTACK: u32 = 2;
pub const CTX_KENTRY: u32 = 3;
pub const CTX_KARG: u32 = 4;
pub const CTX_KSTACK: u32 = 5;

/// One-past-the-end address of a thread's kernel stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStackTop(NonNull<u8>);

impl KernelStackTop {
    /// # Safety
    /// `top` must be the end of a register-aligned kernel stack of at least
    /// `size_of::<CpuRegs>()` bytes that stays exclusively owned by the
    /// context it is given to.
    pub unsafe fn new(top: *mut u8) -> Self {
        debug_assert_eq!(top as usize % REGISTER_SIZE, 0, "misaligned kernel stack");
        Self(NonNull::new_unchecked(top))
    }

    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }
}

/// A single piece of a context that can be assigned.
#[derive(Debug, Clone, Copy)]
pub enum ContextField {
    KernelStack(KernelStackTop),
    KernelEntry(KernelEntry),
    KernelArg(Register),
    UserStack(Register),
    UserEntry(Register),
    UserArg(Register),
}

#[repr(C)]
#[derive(Debug)]
pub struct Context {
    pub kregs: KernRegs,
    uregs: Option<NonNull<CpuRegs>>,
    saved_regs: Option<NonZeroUsize>,
}

// The user frame is only ever reached through the owning context
unsafe impl Send for Context {}

impl Context {
    pub const fn new() -> Self {
        Self {
            kregs: KernRegs {
                s0: 0,
                s1: 0,
                s2: 0,
                s3: 0,
                s4: 0,
                s5: 0,
                s6: 0,
                s7: 0,
                s8: 0,
                gp: 0,
                sp: 0,
                ra: 0,
                kstack: 0,
                #[cfg(not(feature = "mmu"))]
                status: 0,
            },
            uregs: None,
            saved_regs: None,
        }
    }

    /// The user frame, once a kernel stack has been assigned.
    pub fn uregs(&self) -> Option<&CpuRegs> {
        // SAFETY: `KernelStackTop::new` guarantees the frame is valid and ours
        self.uregs.map(|u| unsafe { &*u.as_ptr() })
    }

    pub fn uregs_mut(&mut self) -> Option<&mut CpuRegs> {
        // SAFETY: see `uregs`
        self.uregs.map(|u| unsafe { &mut *u.as_ptr() })
    }

    /// User address of the frame copied out by [`Context::save`].
    pub fn saved_regs(&self) -> Option<UserAddr> {
        self.saved_regs.map(NonZeroUsize::get)
    }

    fn frame(&mut self) -> &mut CpuRegs {
        match self.uregs_mut() {
            Some(regs) => regs,
            None => panic!("[KERNEL BUG] user register access before a kernel stack was assigned"),
        }
    }

    /// Assign one field. Setting the user entry point also resets the user
    /// status word.
    pub fn set(&mut self, field: ContextField) {
        match field {
            ContextField::KernelStack(top) => {
                let uregs = top.as_ptr().wrapping_sub(size_of::<CpuRegs>()).cast::<CpuRegs>();
                // SAFETY: `KernelStackTop::new`'s contract covers the frame
                let uregs = unsafe { NonNull::new_unchecked(uregs) };

                self.uregs = Some(uregs);
                self.kregs.sp = uregs.as_ptr() as Register;
                self.kregs.kstack = top.as_ptr() as Register;

                let u = self.frame();
                u.a0 = 0;
                u.a1 = 0x1111_1111;
                u.a2 = 0x2222_2222;
                u.a3 = 0x3333_3333;
                u.status = status::INT_MASK | status::IE;
            }
            ContextField::KernelEntry(entry) => {
                self.kregs.ra = arch::kernel_thread_entry as usize;
                self.kregs.s0 = entry as usize;
            }
            ContextField::KernelArg(arg) => self.kregs.s1 = arg,
            ContextField::UserStack(sp) => self.frame().sp = sp,
            ContextField::UserEntry(pc) => {
                let u = self.frame();
                u.epc = pc;
                u.status = status::INT_MASK | status::IE | status::EXL;
            }
            ContextField::UserArg(arg) => self.frame().a0 = arg,
        }
    }

    /// Copy the user frame onto the user stack so a user-mode exception
    /// handler can see it, and move the user stack pointer below the copy.
    pub fn save(&mut self, user: &mut impl UserAccess) -> Result<(), MemoryFault> {
        let cur = *self.frame();
        let sav = cur.sp.wrapping_sub(size_of::<CpuRegs>());

        user.copy_out(&cur, sav)?;

        self.saved_regs = NonZeroUsize::new(sav);
        self.frame().sp = sav.wrapping_sub(REGISTER_SIZE);
        log::trace!("saved user frame to {:#x}", sav);

        Ok(())
    }

    /// Bring back the frame stored by [`Context::save`]. The restored status
    /// word is replaced with a known safe value.
    pub fn restore(&mut self, user: &mut impl UserAccess) -> Result<(), MemoryFault> {
        let sav = match self.saved_regs {
            Some(sav) => sav.get(),
            None => panic!("[KERNEL BUG] context restore without a saved frame"),
        };

        let mut restored = CpuRegs::default();
        user.copy_in(sav, &mut restored)?;

        let cur = self.frame();
        *cur = restored;
        cur.status = status::INT_MASK;
        log::trace!("restored user frame from {:#x}", sav);

        Ok(())
    }

    /// Dump the user frame in debug builds.
    pub fn dump(&self) {
        #[cfg(debug_assertions)]
        if let Some(regs) = self.uregs() {
            crate::trap::dump_frame(regs);
        }
    }
}

#[cfg(all(not(target_arch = "mips"), any(test, feature = "hosted")))]
impl Drop for Context {
    fn drop(&mut self) {
        arch::retire(&self.kregs);
    }
}

/// Assign a context field by its raw selector.
///
/// # Safety
/// For [`CTX_KSTACK`], `value` must satisfy [`KernelStackTop::new`]. For
/// [`CTX_KENTRY`], `value` must be the address of a [`KernelEntry`].
pub unsafe fn context_set(ctx: &mut Context, selector: u32, value: Register) {
    let field = match selector {
        CTX_UENTRY => ContextField::UserEntry(value),
        CTX_UARG => ContextField::UserArg(value),
        CTX_USTACK => ContextField::UserStack(value),
        CTX_KENTRY => ContextField::KernelEntry(core::mem::transmute::<Register, KernelEntry>(value)),
        CTX_KARG => ContextField::KernelArg(value),
        CTX_KSTACK => ContextField::KernelStack(KernelStackTop::new(value as *mut u8)),
        _ => panic!("context_set, unimplemented context type {}", selector),
    };

    ctx.set(field);
}

/// Hand the CPU from `prev` to `next`. Returns once another flow switches
/// back into `prev`.
///
/// # Safety
/// Interrupts must be disabled, and both contexts must stay in place while
/// they can be switched to. `next` must either have run before or carry a
/// kernel entry point and stack.
#[cfg(any(target_arch = "mips", test, feature = "hosted"))]
pub unsafe fn context_switch(prev: &mut Context, next: &Context) {
    arch::cpu_switch(&mut prev.kregs, &next.kregs);
}

#[cfg(target_arch = "mips")]
mod ffi {
    use super::Context;
    use crate::{frame::Register, kernel::ExternKernel};

    #[no_mangle]
    pub unsafe extern "C" fn context_set(ctx: *mut Context, selector: i32, value: Register) {
        super::context_set(&mut *ctx, selector as u32, value);
    }

    #[no_mangle]
    pub unsafe extern "C" fn context_switch(prev: *mut Context, next: *mut Context) {
        super::context_switch(&mut *prev, &*next);
    }

    #[no_mangle]
    pub unsafe extern "C" fn context_save(ctx: *mut Context) {
        if let Err(e) = (*ctx).save(&mut ExternKernel) {
            log::error!("context save: {}", e);
        }
    }

    #[no_mangle]
    pub unsafe extern "C" fn context_restore(ctx: *mut Context) {
        if let Err(e) = (*ctx).restore(&mut ExternKernel) {
            log::error!("context restore: {}", e);
        }
    }

    #[no_mangle]
    pub unsafe extern "C" fn context_dump(ctx: *mut Context) {
        (*ctx).dump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::MemoryFault;
    use alloc::{boxed::Box, vec, vec::Vec};

    const STACK_WORDS: usize = 256;

    struct KernelStack(Box<[Register; STACK_WORDS]>);

    impl KernelStack {
        fn new() -> Self {
            Self(Box::new([0; STACK_WORDS]))
        }

        fn top(&mut self) -> KernelStackTop {
            let end = self.0.as_mut_ptr_range().end;
            unsafe { KernelStackTop::new(end.cast()) }
        }
    }

    /// User memory backed by a buffer mapped at `base`.
    struct UserMemory {
        base: UserAddr,
        bytes: Vec<u8>,
    }

    impl UserMemory {
        fn new(base: UserAddr, len: usize) -> Self {
            Self { base, bytes: vec![0; len] }
        }

        fn range(&self, addr: UserAddr) -> Result<core::ops::Range<usize>, MemoryFault> {
            let start = addr.checked_sub(self.base).ok_or(MemoryFault { address: addr })?;
            let end = start + size_of::<CpuRegs>();
            match end <= self.bytes.len() {
                true => Ok(start..end),
                false => Err(MemoryFault { address: addr }),
            }
        }
    }

    impl UserAccess for UserMemory {
        fn copy_out(&mut self, regs: &CpuRegs, dst: UserAddr) -> Result<(), MemoryFault> {
            let range = self.range(dst)?;
            for (chunk, reg) in self.bytes[range].chunks_exact_mut(REGISTER_SIZE).zip(regs.registers()) {
                chunk.copy_from_slice(&reg.to_ne_bytes());
            }
            Ok(())
        }

        fn copy_in(&mut self, src: UserAddr, regs: &mut CpuRegs) -> Result<(), MemoryFault> {
            let range = self.range(src)?;
            for (chunk, reg) in self.bytes[range].chunks_exact(REGISTER_SIZE).zip(regs.registers_mut()) {
                *reg = Register::from_ne_bytes(chunk.try_into().unwrap());
            }
            Ok(())
        }
    }

    extern "C" fn nop_entry(_: Register) {}

    #[test]
    fn kernel_stack_places_frame_at_top() {
        let mut stack = KernelStack::new();
        let top = stack.top();
        let mut ctx = Context::new();

        ctx.set(ContextField::KernelStack(top));

        let expected = top.as_ptr() as usize - size_of::<CpuRegs>();
        assert_eq!(ctx.kregs.kstack, top.as_ptr() as usize);
        assert_eq!(ctx.kregs.sp, expected);
        assert_eq!(ctx.uregs().unwrap() as *const CpuRegs as usize, expected);

        let u = ctx.uregs().unwrap();
        assert_eq!((u.a0, u.a1, u.a2, u.a3), (0, 0x1111_1111, 0x2222_2222, 0x3333_3333));
        assert_eq!(u.status, status::INT_MASK | status::IE);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn dump_logs_the_user_frame() {
        crate::io::tests::install_capture();

        // Nothing to show before a kernel stack exists
        Context::new().dump();

        let mut stack = KernelStack::new();
        let mut ctx = Context::new();
        ctx.set(ContextField::KernelStack(stack.top()));
        ctx.uregs_mut().unwrap().s5 = 0x5a5a_0d0d;
        let frame = ctx.uregs().unwrap() as *const CpuRegs;

        ctx.dump();

        let out = crate::io::tests::captured();
        assert!(out.contains(&alloc::format!("Trap frame {:#p}", frame)));
        assert!(out.contains(" s5 5a5a0d0d"));
    }

    #[test]
    fn kernel_entry_and_argument() {
        let mut ctx = Context::new();
        ctx.set(ContextField::KernelEntry(nop_entry));
        ctx.set(ContextField::KernelArg(0xdead_beef));

        assert_eq!(ctx.kregs.ra, arch::kernel_thread_entry as usize);
        assert_eq!(ctx.kregs.s0, nop_entry as usize);
        assert_eq!(ctx.kregs.s1, 0xdead_beef);
    }

    #[test]
    fn user_fields() {
        let mut stack = KernelStack::new();
        let mut ctx = Context::new();
        ctx.set(ContextField::KernelStack(stack.top()));
        ctx.set(ContextField::UserStack(0x7fff_f000));
        ctx.set(ContextField::UserArg(42));
        ctx.set(ContextField::UserEntry(0x0040_0000));

        let u = ctx.uregs().unwrap();
        assert_eq!(u.sp, 0x7fff_f000);
        assert_eq!(u.a0, 42);
        assert_eq!(u.epc, 0x0040_0000);
        assert_eq!(u.status, status::INT_MASK | status::IE | status::EXL);
        // The other seeded argument registers survive
        assert_eq!(u.a1, 0x1111_1111);
    }

    #[test]
    fn raw_selectors_map_to_fields() {
        let mut stack = KernelStack::new();
        let top = stack.top().as_ptr() as Register;
        let mut ctx = Context::new();

        unsafe {
            context_set(&mut ctx, CTX_KSTACK, top);
            context_set(&mut ctx, CTX_KENTRY, nop_entry as usize);
            context_set(&mut ctx, CTX_KARG, 7);
            context_set(&mut ctx, CTX_USTACK, 0x1000);
            context_set(&mut ctx, CTX_UENTRY, 0x2000);
            context_set(&mut ctx, CTX_UARG, 9);
        }

        assert_eq!(ctx.kregs.kstack, top);
        assert_eq!(ctx.kregs.s0, nop_entry as usize);
        assert_eq!(ctx.kregs.s1, 7);
        let u = ctx.uregs().unwrap();
        assert_eq!((u.sp, u.epc, u.a0), (0x1000, 0x2000, 9));
    }

    #[test]
    #[should_panic(expected = "unimplemented context type")]
    fn unknown_selector_is_fatal() {
        let mut ctx = Context::new();
        unsafe { context_set(&mut ctx, 6, 0) };
    }

    #[test]
    #[should_panic(expected = "before a kernel stack was assigned")]
    fn user_field_without_kernel_stack_is_fatal() {
        let mut ctx = Context::new();
        ctx.set(ContextField::UserStack(0x1000));
    }

    #[test]
    fn save_then_restore() {
        let mut stack = KernelStack::new();
        let mut user = UserMemory::new(0x1000, 0x1000);
        let mut ctx = Context::new();
        ctx.set(ContextField::KernelStack(stack.top()));
        ctx.set(ContextField::UserEntry(0x0040_1234));
        ctx.set(ContextField::UserStack(0x2000));
        ctx.uregs_mut().unwrap().t0 = 0xabcd;

        ctx.save(&mut user).unwrap();

        let sav = 0x2000 - size_of::<CpuRegs>();
        assert_eq!(ctx.saved_regs(), Some(sav));
        assert_eq!(ctx.uregs().unwrap().sp, sav - REGISTER_SIZE);

        // The handler runs and scribbles over the live frame
        let u = ctx.uregs_mut().unwrap();
        u.epc = 0x0050_0000;
        u.t0 = 0;

        ctx.restore(&mut user).unwrap();

        let u = ctx.uregs().unwrap();
        assert_eq!(u.epc, 0x0040_1234);
        assert_eq!(u.t0, 0xabcd);
        assert_eq!(u.sp, 0x2000);
        assert_eq!(u.status, status::INT_MASK);
    }

    #[test]
    fn copy_out_fault_leaves_context_untouched() {
        let mut stack = KernelStack::new();
        let mut user = UserMemory::new(0x8000, 0x100);
        let mut ctx = Context::new();
        ctx.set(ContextField::KernelStack(stack.top()));
        ctx.set(ContextField::UserStack(0x2000));

        let err = ctx.save(&mut user).unwrap_err();

        assert_eq!(err.address, 0x2000 - size_of::<CpuRegs>());
        assert_eq!(ctx.saved_regs(), None);
        assert_eq!(ctx.uregs().unwrap().sp, 0x2000);
    }

    #[test]
    fn copy_in_fault_leaves_frame_untouched() {
        let mut stack = KernelStack::new();
        let mut user = UserMemory::new(0x1000, 0x1000);
        let mut ctx = Context::new();
        ctx.set(ContextField::KernelStack(stack.top()));
        ctx.set(ContextField::UserStack(0x2000));
        ctx.save(&mut user).unwrap();

        user.bytes.truncate(0x10);
        let before = *ctx.uregs().unwrap();

        assert!(ctx.restore(&mut user).is_err());
        assert_eq!(*ctx.uregs().unwrap(), before);
    }

    #[test]
    #[should_panic(expected = "without a saved frame")]
    fn restore_requires_save() {
        let mut stack = KernelStack::new();
        let mut user = UserMemory::new(0x1000, 0x1000);
        let mut ctx = Context::new();
        ctx.set(ContextField::KernelStack(stack.top()));

        let _ = ctx.restore(&mut user);
    }

    mod switching {
        use super::*;
        use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
        use std::sync::Mutex;

        static MAIN: AtomicPtr<Context> = AtomicPtr::new(core::ptr::null_mut());
        static WORKER: AtomicPtr<Context> = AtomicPtr::new(core::ptr::null_mut());
        static TRACE: Mutex<Vec<(&'static str, usize)>> = Mutex::new(Vec::new());
        static ROUNDS: AtomicUsize = AtomicUsize::new(0);

        extern "C" fn worker(arg: Register) {
            for round in 0..3 {
                TRACE.lock().unwrap().push(("worker", arg + round));
                ROUNDS.fetch_add(1, Ordering::SeqCst);
                unsafe { context_switch(&mut *WORKER.load(Ordering::SeqCst), &*MAIN.load(Ordering::SeqCst)) };
            }
        }

        #[test]
        fn ping_pong_between_threads() {
            let mut stack = KernelStack::new();
            let mut main = Box::new(Context::new());
            let mut worker_ctx = Box::new(Context::new());
            worker_ctx.set(ContextField::KernelStack(stack.top()));
            worker_ctx.set(ContextField::KernelEntry(worker));
            worker_ctx.set(ContextField::KernelArg(100));

            MAIN.store(&mut *main, Ordering::SeqCst);
            WORKER.store(&mut *worker_ctx, Ordering::SeqCst);

            for round in 0..3 {
                unsafe { context_switch(&mut *MAIN.load(Ordering::SeqCst), &*WORKER.load(Ordering::SeqCst)) };
                assert_eq!(ROUNDS.load(Ordering::SeqCst), round + 1);
                TRACE.lock().unwrap().push(("main", round));
            }

            let trace = TRACE.lock().unwrap();
            assert_eq!(
                *trace,
                [("worker", 100), ("main", 0), ("worker", 101), ("main", 1), ("worker", 102), ("main", 2)]
            );

            // The worker stays parked in its last switch; leak it rather than
            // reuse its slot
            core::mem::forget(worker_ctx);
        }
    }
}
