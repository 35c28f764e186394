// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use super::{BoundedStore, Endian, PendingHi16Store, Rel, Rela, RelocError, Resolver, TargetSection};

/// Relocator for the boot loader. There is nothing to fall back to while the
/// kernel image is being placed, so every failure is fatal.
#[derive(Debug, Default)]
pub struct BootRelocator {
    resolver: Resolver<BoundedStore>,
}

fn fail(error: RelocError) -> ! {
    panic!("relocation fail: {}", error)
}

impl BootRelocator {
    pub fn new() -> Self {
        Self { resolver: Resolver::new(BoundedStore::new()) }
    }

    pub fn relocate_rel(&mut self, rel: &Rel, sym_val: u32, section: &mut TargetSection<'_>) {
        log::debug!("rel = {:x?}, target section = {:#x}", rel, section.address());

        if let Err(e) = self.resolver.relocate_rel(rel, sym_val, section) {
            fail(e);
        }
    }

    pub fn relocate_rela(&mut self, rela: &Rela, sym_val: u32, section: &mut TargetSection<'_>) -> ! {
        match self.resolver.relocate_rela(rela, sym_val, section) {
            Err(e) => fail(e),
            Ok(()) => unreachable!("RELA records are never applied"),
        }
    }

    /// Returns the number of records applied.
    pub fn relocate_table(
        &mut self,
        table: &[u8],
        endian: Endian,
        section: &mut TargetSection<'_>,
        symbol_value: impl FnMut(u32) -> u32,
    ) -> usize {
        match self.resolver.relocate_table(table, endian, section, symbol_value) {
            Ok(applied) => applied,
            Err(e) => fail(e),
        }
    }

    /// Start a new object file.
    pub fn reset(&mut self) {
        self.resolver.reset();
    }

    pub fn pending(&self) -> usize {
        self.resolver.pending().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reloc::{
        tests::{image, words, ADDIU, BASE, LUI},
        RelocationType,
    };

    #[test]
    fn applies_pairs() {
        let mut code = image(&[LUI, ADDIU]);
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        let mut relocator = BootRelocator::new();

        relocator.relocate_rel(&Rel::new(0, RelocationType::Hi16, 1), 0x8012_3456, &mut section);
        assert_eq!(relocator.pending(), 1);
        relocator.relocate_rel(&Rel::new(4, RelocationType::Lo16, 1), 0x8012_3456, &mut section);

        assert_eq!(relocator.pending(), 0);
        assert_eq!(words(&code), [LUI | 0x8012, ADDIU | 0x3456]);
    }

    #[test]
    #[should_panic(expected = "Too many consecutive R_MIPS_HI16 relocs")]
    fn fifth_hi16_is_fatal() {
        let mut code = image(&[LUI; 5]);
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        let mut relocator = BootRelocator::new();

        for i in 0..5 {
            relocator.relocate_rel(&Rel::new(i * 4, RelocationType::Hi16, 1), 0x1000, &mut section);
        }
    }

    #[test]
    #[should_panic(expected = "Unsupported relocation type=3")]
    fn unsupported_type_is_fatal() {
        let mut code = image(&[0]);
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        BootRelocator::new().relocate_rel(&Rel::new(0, RelocationType::Other(3), 1), 0, &mut section);
    }

    #[test]
    #[should_panic(expected = "R_MIPS_26: Relocation overflow")]
    fn jump_overflow_is_fatal() {
        let mut code = image(&[0x0c00_0000]);
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        BootRelocator::new().relocate_rel(&Rel::new(0, RelocationType::Jump26, 1), 0x1000_0000, &mut section);
    }

    #[test]
    #[should_panic(expected = "invalid relocation type")]
    fn rela_is_fatal() {
        let mut code = image(&[0]);
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        let rela = Rela { r_offset: 0, r_info: 2, r_addend: 0 };
        BootRelocator::new().relocate_rela(&rela, 0, &mut section);
    }

    #[test]
    fn table_and_reset() {
        let mut code = image(&[LUI, 0x10]);
        let table: alloc::vec::Vec<u8> = [Rel::new(0, RelocationType::Hi16, 1), Rel::new(4, RelocationType::Word32, 1)]
            .iter()
            .flat_map(|r| image(&[r.r_offset, r.r_info]))
            .collect();
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        let mut relocator = BootRelocator::new();

        assert_eq!(relocator.relocate_table(&table, Endian::Little, &mut section, |_| 0x20), 2);
        assert_eq!(relocator.pending(), 1);

        relocator.reset();
        assert_eq!(relocator.pending(), 0);
        assert_eq!(words(&code), [LUI, 0x30]);
    }
}
