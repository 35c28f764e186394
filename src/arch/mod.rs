// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(target_arch = "mips")]
pub mod mips;
#[cfg(target_arch = "mips")]
pub use mips::{cpu_switch, kernel_thread_entry};

#[cfg(not(target_arch = "mips"))]
pub mod hosted;
#[cfg(not(target_arch = "mips"))]
pub use hosted::kernel_thread_entry;
#[cfg(all(not(target_arch = "mips"), any(test, feature = "hosted")))]
pub use hosted::{cpu_switch, retire};
