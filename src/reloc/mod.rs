// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! MIPS ELF relocation fixups.
//!
//! Only the arithmetic lives here: the caller resolves symbols and hands in
//! their values together with the section being patched. An `R_MIPS_HI16`
//! cannot be finished on its own because its carry depends on the low half
//! of the address, so it is parked in a [`PendingHi16Store`] until the next
//! `R_MIPS_LO16` arrives. Several `HI16`s may share one `LO16`.

pub mod boot;
pub mod elf;
pub mod store;
pub mod user;

pub use boot::BootRelocator;
pub use elf::{Endian, Rel, Rela, RelocationInfo, RelocationType};
pub use store::{BoundedStore, Capacity, PendingHi16, PendingHi16Store, PushError, UnboundedStore};
pub use user::UserRelocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocError {
    /// `R_MIPS_26` target is not word aligned.
    Unaligned26 { symbol: u32 },
    /// `R_MIPS_26` target is outside the 256 MiB region of the jump.
    Overflow26 { site: u32, symbol: u32 },
    TooManyHi16 { capacity: usize },
    OutOfMemory,
    Unsupported(u8),
    RelaUnsupported,
    OutOfBounds { offset: u32 },
    TruncatedTable { len: usize },
}

impl core::fmt::Display for RelocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RelocError::Unaligned26 { symbol } => {
                write!(f, "R_MIPS_26: Unaligned symbol relocation (symbol value {:#010x})", symbol)
            }
            RelocError::Overflow26 { site, symbol } => {
                write!(f, "R_MIPS_26: Relocation overflow ({:#010x} from {:#010x})", symbol, site)
            }
            RelocError::TooManyHi16 { capacity } => {
                write!(f, "Too many consecutive R_MIPS_HI16 relocs (limit {})", capacity)
            }
            RelocError::OutOfMemory => write!(f, "OOM: Relocation failed!"),
            RelocError::Unsupported(ty) => write!(f, "Unsupported relocation type={}", ty),
            RelocError::RelaUnsupported => write!(f, "invalid relocation type: RELA records are not supported"),
            RelocError::OutOfBounds { offset } => {
                write!(f, "relocation offset {:#x} is outside of the target section", offset)
            }
            RelocError::TruncatedTable { len } => {
                write!(f, "relocation table of {} bytes is not a whole number of entries", len)
            }
        }
    }
}

/// The loaded section a relocation patches.
#[derive(Debug)]
pub struct TargetSection<'a> {
    address: u32,
    bytes: &'a mut [u8],
    endian: Endian,
}

impl<'a> TargetSection<'a> {
    /// `address` is where `bytes` will live once the image runs.
    pub fn new(address: u32, bytes: &'a mut [u8], endian: Endian) -> Self {
        Self { address, bytes, endian }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn bytes(&self) -> &[u8] {
        &*self.bytes
    }

    /// Run-time address of a relocation site.
    pub fn site(&self, offset: u32) -> u32 {
        self.address.wrapping_add(offset)
    }

    pub fn read(&self, offset: u32) -> Result<u32, RelocError> {
        let start = offset as usize;
        match self.bytes.get(start..start.wrapping_add(4)) {
            Some(&[a, b, c, d]) => Ok(self.endian.read_u32([a, b, c, d])),
            _ => Err(RelocError::OutOfBounds { offset }),
        }
    }

    pub fn write(&mut self, offset: u32, value: u32) -> Result<(), RelocError> {
        let start = offset as usize;
        let bytes = self.endian.write_u32(value);
        match self.bytes.get_mut(start..start.wrapping_add(4)) {
            Some(word) => {
                word.copy_from_slice(&bytes);
                Ok(())
            }
            None => Err(RelocError::OutOfBounds { offset }),
        }
    }
}

fn sign_extend16(value: u32) -> i32 {
    value as u16 as i16 as i32
}

/// Applies relocations one at a time, pairing `HI16`s with the next `LO16`.
#[derive(Debug, Default)]
pub struct Resolver<S: PendingHi16Store> {
    pending: S,
}

impl<S: PendingHi16Store> Resolver<S> {
    pub fn new(store: S) -> Self {
        Self { pending: store }
    }

    pub fn pending(&self) -> &S {
        &self.pending
    }

    pub fn relocate_rel(&mut self, rel: &Rel, sym_val: u32, section: &mut TargetSection<'_>) -> Result<(), RelocError> {
        let offset = rel.r_offset;

        match rel.r_type() {
            RelocationType::None => {}
            RelocationType::Word32 => {
                let word = section.read(offset)?;
                section.write(offset, word.wrapping_add(sym_val))?;
            }
            RelocationType::Jump26 => {
                let word = section.read(offset)?;
                let site = section.site(offset);

                if sym_val % 4 != 0 {
                    return Err(RelocError::Unaligned26 { symbol: sym_val });
                }

                // Jumps stay in the 256 MiB region of the patch site
                if sym_val & 0xf000_0000 != site & 0xf000_0000 {
                    return Err(RelocError::Overflow26 { site, symbol: sym_val });
                }

                let patched = (word & !0x03ff_ffff) | (word.wrapping_add(sym_val >> 2) & 0x03ff_ffff);
                section.write(offset, patched)?;
                log::trace!("R_MIPS_26: sym_val = {:#x}, {:#x} -> {:#010x}", sym_val, site, patched);
            }
            RelocationType::Hi16 => {
                section.read(offset)?;

                let entry = PendingHi16 { offset, symbol: sym_val };
                self.pending.push(entry).map_err(|e| match (e, self.pending.capacity()) {
                    (PushError::Full, Capacity::Bounded(capacity)) => RelocError::TooManyHi16 { capacity },
                    (PushError::Full, Capacity::Unbounded) | (PushError::OutOfMemory, _) => RelocError::OutOfMemory,
                })?;
            }
            RelocationType::Lo16 => {
                let word = section.read(offset)?;
                let lo = sign_extend16(word);

                let mut result = Ok(());
                self.pending.drain_in_order(&mut |hi| {
                    if hi.symbol != sym_val {
                        log::debug!(
                            "R_MIPS_HI16 at {:#x} paired with a R_MIPS_LO16 for another symbol ({:#x} != {:#x})",
                            hi.offset,
                            hi.symbol,
                            sym_val
                        );
                    }

                    let patch = section.read(hi.offset).and_then(|hi_word| {
                        // The LO16's symbol value completes the pair
                        let ahl = (hi_word << 16).wrapping_add(lo as u32).wrapping_add(sym_val);
                        let patched = (hi_word & !0xffff) | ((ahl.wrapping_add(0x8000) >> 16) & 0xffff);
                        log::trace!("R_MIPS_HI16: sym_val = {:#x}, {:#x} -> {:#010x}", sym_val, hi.offset, patched);
                        section.write(hi.offset, patched)
                    });

                    if result.is_ok() {
                        result = patch;
                    }
                });
                result?;

                let patched = (word & !0xffff) | ((lo as u32).wrapping_add(sym_val) & 0xffff);
                section.write(offset, patched)?;
                log::trace!("R_MIPS_LO16: sym_val = {:#x}, {:#x} -> {:#010x}", sym_val, offset, patched);
            }
            RelocationType::Other(ty) => return Err(RelocError::Unsupported(ty)),
        }

        Ok(())
    }

    /// `RELA` records are not used by MIPS32 and are always refused.
    pub fn relocate_rela(&mut self, rela: &Rela, sym_val: u32, _: &mut TargetSection<'_>) -> Result<(), RelocError> {
        log::debug!("refusing RELA record at {:#x} (type {:?}, sym_val {:#x})", rela.r_offset, rela.r_type(), sym_val);
        Err(RelocError::RelaUnsupported)
    }

    /// Walk a packed `Elf32_Rel` table in file order, stopping at the first
    /// failure. Returns how many records were applied.
    pub fn relocate_table(
        &mut self,
        table: &[u8],
        endian: Endian,
        section: &mut TargetSection<'_>,
        mut symbol_value: impl FnMut(u32) -> u32,
    ) -> Result<usize, RelocError> {
        if table.len() % Rel::SIZE != 0 {
            return Err(RelocError::TruncatedTable { len: table.len() });
        }

        let mut applied = 0;
        for record in table.chunks_exact(Rel::SIZE) {
            let rel = Rel::parse(record, endian).ok_or(RelocError::TruncatedTable { len: table.len() })?;
            self.relocate_rel(&rel, symbol_value(rel.symbol()), section)?;
            applied += 1;
        }

        Ok(applied)
    }

    /// Drop `HI16` relocations that never met a `LO16`, returning how many
    /// there were.
    pub fn reset(&mut self) -> usize {
        let dangling = self.pending.len();
        if dangling != 0 {
            log::error!("{} R_MIPS_HI16 relocation(s) left without a matching R_MIPS_LO16", dangling);
        }

        self.pending.clear();
        dangling
    }
}
