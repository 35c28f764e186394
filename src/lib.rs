// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture core for MIPS32 boards: saved register frames, thread
//! context handling, exception dispatch and the ELF `HI16`/`LO16` relocation
//! fixups shared by the boot loader and the user-space linker.

#![allow(clippy::identity_op, clippy::new_without_default)]
#![cfg_attr(target_arch = "mips", feature(asm_experimental_arch))]
#![cfg_attr(not(any(test, feature = "hosted")), no_std)]

#[cfg(not(any(target_pointer_width = "32", test, feature = "hosted")))]
compile_error!("mipshal targets 32-bit MIPS, cannot compile for other pointer widths outside of a hosted build");

extern crate alloc;

pub mod arch;
pub mod context;
pub mod cp0;
pub mod frame;
pub mod io;
pub mod kernel;
pub mod reloc;
pub mod trap;
pub mod vector;

#[cfg(any(target_arch = "mips", test, feature = "hosted"))]
pub use context::context_switch;
pub use context::{context_set, Context, ContextField, KernelStackTop};
pub use frame::{CpuRegs, KernRegs, Register};
pub use reloc::{BootRelocator, RelocError, Resolver, UserRelocator};
