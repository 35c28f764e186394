// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Exception vector page. With `Status.BEV` clear the CPU fetches from fixed
//! offsets of the vector base, and each slot only has room for a short jump
//! to the real entry point.

/// TLB refill, taken with `EXL` clear.
pub const VECTOR_TLB_REFILL: usize = 0x000;
/// Everything else, interrupts included unless `Cause.IV` is set.
pub const VECTOR_GENERAL: usize = 0x180;

/// Words in one jump stub.
pub const STUB_WORDS: usize = 4;

const KSEG0: usize = 0x8000_0000;

/// `lui $k0, %hi(target)` / `ori $k0, $k0, %lo(target)` / `jr $k0` / `nop`
pub fn jump_stub(target: u32) -> [u32; STUB_WORDS] {
    const K0: u32 = 26;

    let lui = (0x0f << 26) | (K0 << 16) | (target >> 16);
    let ori = (0x0d << 26) | (K0 << 21) | (K0 << 16) | (target & 0xffff);
    let jr = (K0 << 21) | 0x08;

    [lui, ori, jr, 0]
}

/// Write a stub jumping to `target` into both vector slots of the page at
/// `base`.
///
/// # Safety
/// `base` must point to at least `VECTOR_GENERAL + STUB_WORDS * 4` writable,
/// word aligned bytes. The caller is responsible for making the instruction
/// cache coherent afterwards.
pub unsafe fn install(base: *mut u32, target: u32) {
    let stub = jump_stub(target);

    for slot in [VECTOR_TLB_REFILL, VECTOR_GENERAL] {
        let dst = base.add(slot / 4);
        for (i, word) in stub.iter().enumerate() {
            dst.add(i).write_volatile(*word);
        }
    }

    log::debug!("exception vectors at {:#p} -> {:#x}", base, target);
}

/// Point the exception vectors in the page at physical address `paddr` to
/// `exception_entry`. The page is reached through KSEG0.
///
/// # Safety
/// `paddr` must be the reserved, unmapped vector page.
#[cfg(target_arch = "mips")]
#[no_mangle]
pub unsafe extern "C" fn vector_copy(paddr: usize) {
    install(vector_base(paddr) as *mut u32, crate::arch::mips::exception_entry as usize as u32);
}

/// Kernel virtual address of the vector page for a physical `paddr`.
pub fn vector_base(paddr: usize) -> usize {
    paddr | KSEG0
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn stub_encoding() {
        assert_eq!(jump_stub(0x8000_1234), [0x3c1a_8000, 0x375a_1234, 0x0340_0008, 0]);
    }

    #[test]
    fn install_fills_both_slots_only() {
        let mut page = vec![0xffff_ffffu32; 0x200 / 4];
        unsafe { install(page.as_mut_ptr(), 0x8000_0400) };

        let stub = jump_stub(0x8000_0400);
        assert_eq!(page[..STUB_WORDS], stub);
        assert_eq!(page[VECTOR_GENERAL / 4..][..STUB_WORDS], stub);
        assert!(page[STUB_WORDS..VECTOR_GENERAL / 4].iter().all(|w| *w == 0xffff_ffff));
        assert!(page[VECTOR_GENERAL / 4 + STUB_WORDS..].iter().all(|w| *w == 0xffff_ffff));
    }

    #[test]
    fn vector_page_is_reached_through_kseg0() {
        assert_eq!(vector_base(0x0000_0000), 0x8000_0000);
        assert_eq!(vector_base(0x0000_1000), 0x8000_1000);
    }
}
