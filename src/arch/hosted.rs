// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel register switching emulated with host threads.
//!
//! Every `KernRegs` taking part in a switch owns a baton. `cpu_switch`
//! hands the baton of `next` over and parks the calling thread on the baton
//! of `prev`, so exactly one flow of control runs at any time. A context that
//! has never run and whose `ra` is [`kernel_thread_entry`] gets a host thread
//! which calls `s0` with `s1`, the same way the trampoline does on hardware.

/// Address marker for a context that starts in a kernel thread. Never called
/// on the host.
pub extern "C" fn kernel_thread_entry() {
    unreachable!("kernel_thread_entry is only a return address on hosted builds")
}

#[cfg(any(test, feature = "hosted"))]
pub use switch::{cpu_switch, retire};

#[cfg(any(test, feature = "hosted"))]
mod switch {
    use super::kernel_thread_entry;
    use crate::{context::KernelEntry, frame::KernRegs};
    use alloc::{collections::BTreeMap, sync::Arc};
    use core::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Condvar, Mutex};

    #[derive(Default)]
    struct Baton {
        turn: Mutex<bool>,
        wake: Condvar,
        started: AtomicBool,
    }

    impl Baton {
        fn pass(&self) {
            let mut turn = self.turn.lock().unwrap_or_else(|e| e.into_inner());
            *turn = true;
            self.wake.notify_one();
        }

        fn wait_turn(&self) {
            let mut turn = self.turn.lock().unwrap_or_else(|e| e.into_inner());
            while !*turn {
                turn = self.wake.wait(turn).unwrap_or_else(|e| e.into_inner());
            }
            *turn = false;
        }
    }

    lazy_static::lazy_static! {
        static ref BATONS: spin::Mutex<BTreeMap<usize, Arc<Baton>>> = spin::Mutex::new(BTreeMap::new());
    }

    fn baton_for(kregs: *const KernRegs) -> Arc<Baton> {
        BATONS.lock().entry(kregs as usize).or_default().clone()
    }

    /// Forget the baton of a context that is going away, so a later context
    /// at the same address starts fresh.
    pub fn retire(kregs: *const KernRegs) {
        BATONS.lock().remove(&(kregs as usize));
    }

    /// # Safety
    /// `prev` and `next` must point to live register sets that stay in place
    /// until the flow parked in `prev` is resumed. A fresh `next` must carry
    /// a [`KernelEntry`] in `s0`.
    pub unsafe extern "C" fn cpu_switch(prev: *mut KernRegs, next: *const KernRegs) {
        let prev_baton = baton_for(prev);
        prev_baton.started.store(true, Ordering::SeqCst);

        let next_baton = baton_for(next);
        let fresh = !next_baton.started.swap(true, Ordering::SeqCst);

        if fresh {
            let next = &*next;
            if next.ra != kernel_thread_entry as usize {
                panic!("[KERNEL BUG] switching into a context that has no kernel entry");
            }

            let entry: KernelEntry = core::mem::transmute(next.s0);
            let arg = next.s1;
            let baton = next_baton.clone();

            log::trace!("starting kernel thread at {:#x} with argument {:#x}", next.s0, arg);
            std::thread::spawn(move || {
                baton.wait_turn();
                entry(arg);
            });
        }

        next_baton.pass();
        prev_baton.wait_turn();
    }
}
