// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

use super::{Endian, PendingHi16Store, Rel, Rela, RelocError, Resolver, TargetSection, UnboundedStore};

/// Relocator for the user-space program loader. Failures are logged and
/// handed back so the loader can refuse the image and carry on.
#[derive(Debug, Default)]
pub struct UserRelocator {
    resolver: Resolver<UnboundedStore>,
}

impl UserRelocator {
    pub const fn new() -> Self {
        Self { resolver: Resolver { pending: UnboundedStore::new() } }
    }

    /// Map a result onto the loader's `0`/`-1` convention.
    pub fn status(result: Result<(), RelocError>) -> i32 {
        match result {
            Ok(()) => 0,
            Err(_) => -1,
        }
    }

    pub fn relocate_rel(&mut self, rel: &Rel, sym_val: u32, section: &mut TargetSection<'_>) -> Result<(), RelocError> {
        self.resolver.relocate_rel(rel, sym_val, section).map_err(report)
    }

    pub fn relocate_rela(&mut self, rela: &Rela, sym_val: u32, section: &mut TargetSection<'_>) -> Result<(), RelocError> {
        self.resolver.relocate_rela(rela, sym_val, section).map_err(report)
    }

    pub fn relocate_table(
        &mut self,
        table: &[u8],
        endian: Endian,
        section: &mut TargetSection<'_>,
        symbol_value: impl FnMut(u32) -> u32,
    ) -> Result<usize, RelocError> {
        self.resolver.relocate_table(table, endian, section, symbol_value).map_err(report)
    }

    /// Drop any `HI16` relocations left over from a failed or finished load.
    pub fn reset(&mut self) -> usize {
        self.resolver.reset()
    }

    pub fn pending(&self) -> usize {
        self.resolver.pending().len()
    }
}

fn report(error: RelocError) -> RelocError {
    match error {
        RelocError::OutOfMemory => log::error!("{}", error),
        _ => log::error!("relocation failed: {}", error),
    }

    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reloc::{
        tests::{image, words, ADDIU, BASE, LUI},
        RelocationType,
    };

    #[test]
    fn errors_are_returned() {
        let mut code = image(&[0x0c00_0000]);
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        let mut relocator = UserRelocator::new();

        let result = relocator.relocate_rel(&Rel::new(0, RelocationType::Jump26, 1), 0x8000_0002, &mut section);
        assert_eq!(result, Err(RelocError::Unaligned26 { symbol: 0x8000_0002 }));
        assert_eq!(UserRelocator::status(result), -1);

        let result = relocator.relocate_rel(&Rel::new(0, RelocationType::Other(9), 1), 0, &mut section);
        assert_eq!(result, Err(RelocError::Unsupported(9)));

        let rela = Rela { r_offset: 0, r_info: 2, r_addend: 0 };
        assert_eq!(relocator.relocate_rela(&rela, 0, &mut section), Err(RelocError::RelaUnsupported));
        assert_eq!(words(&code), [0x0c00_0000]);
    }

    #[test]
    fn success_maps_to_zero() {
        let mut code = image(&[LUI, LUI, LUI, LUI, LUI, LUI, ADDIU]);
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        let mut relocator = UserRelocator::new();

        for i in 0..6 {
            let result = relocator.relocate_rel(&Rel::new(i * 4, RelocationType::Hi16, 1), 0x0002_0000, &mut section);
            assert_eq!(UserRelocator::status(result), 0);
        }
        assert_eq!(relocator.pending(), 6);

        let result = relocator.relocate_rel(&Rel::new(24, RelocationType::Lo16, 1), 0x0002_0000, &mut section);
        assert_eq!(UserRelocator::status(result), 0);
        assert_eq!(relocator.pending(), 0);
        assert_eq!(words(&code), [LUI | 2, LUI | 2, LUI | 2, LUI | 2, LUI | 2, LUI | 2, ADDIU]);
    }

    #[test]
    fn reset_after_failed_load() {
        let mut code = image(&[LUI, 0]);
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        let mut relocator = UserRelocator::new();

        relocator.relocate_rel(&Rel::new(0, RelocationType::Hi16, 1), 0x10, &mut section).unwrap();
        assert!(relocator.relocate_rel(&Rel::new(4, RelocationType::Other(1), 1), 0, &mut section).is_err());

        assert_eq!(relocator.reset(), 1);
        assert_eq!(relocator.pending(), 0);
    }

    #[test]
    fn table_errors_are_returned() {
        let mut code = image(&[0]);
        let mut section = TargetSection::new(BASE, &mut code, Endian::Little);
        let table = image(&[8, 2 | (1 << 8)]);

        let result = UserRelocator::new().relocate_table(&table, Endian::Little, &mut section, |_| 1);
        assert_eq!(result, Err(RelocError::OutOfBounds { offset: 8 }));
    }
}
