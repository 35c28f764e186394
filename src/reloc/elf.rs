// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2021 The vanadinite developers
//
// This Source Code Form is subject to the terms of the Mozilla Public License,
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at https://mozilla.org/MPL/2.0/.

//! ELF32 relocation records as they appear in `SHT_REL`/`SHT_RELA` sections.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = Endian::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: Self = Endian::Big;

    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }
    }

    pub fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

fn word(bytes: &[u8], index: usize, endian: Endian) -> Option<u32> {
    let start = index * 4;
    let raw = bytes.get(start..start + 4)?;
    Some(endian.read_u32([raw[0], raw[1], raw[2], raw[3]]))
}

/// `r_info` accessors shared by both record kinds.
pub trait RelocationInfo {
    fn info(&self) -> u32;

    fn r_type(&self) -> RelocationType {
        RelocationType::from(self.info() as u8)
    }

    fn symbol(&self) -> u32 {
        self.info() >> 8
    }
}

/// `Elf32_Rel`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Rel {
    pub r_offset: u32,
    pub r_info: u32,
}

impl Rel {
    pub const SIZE: usize = 8;

    pub fn new(r_offset: u32, r_type: RelocationType, symbol: u32) -> Self {
        Self { r_offset, r_info: (symbol << 8) | u32::from(u8::from(r_type)) }
    }

    pub fn parse(bytes: &[u8], endian: Endian) -> Option<Self> {
        Some(Self { r_offset: word(bytes, 0, endian)?, r_info: word(bytes, 1, endian)? })
    }
}

impl RelocationInfo for Rel {
    fn info(&self) -> u32 {
        self.r_info
    }
}

/// `Elf32_Rela`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Rela {
    pub r_offset: u32,
    pub r_info: u32,
    pub r_addend: i32,
}

impl Rela {
    pub const SIZE: usize = 12;

    pub fn parse(bytes: &[u8], endian: Endian) -> Option<Self> {
        Some(Self {
            r_offset: word(bytes, 0, endian)?,
            r_info: word(bytes, 1, endian)?,
            r_addend: word(bytes, 2, endian)? as i32,
        })
    }
}

impl RelocationInfo for Rela {
    fn info(&self) -> u32 {
        self.r_info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationType {
    /// `R_MIPS_NONE`
    None,
    /// `R_MIPS_32`
    Word32,
    /// `R_MIPS_26`
    Jump26,
    /// `R_MIPS_HI16`
    Hi16,
    /// `R_MIPS_LO16`
    Lo16,
    Other(u8),
}

impl From<u8> for RelocationType {
    fn from(n: u8) -> Self {
        match n {
            0 => RelocationType::None,
            2 => RelocationType::Word32,
            4 => RelocationType::Jump26,
            5 => RelocationType::Hi16,
            6 => RelocationType::Lo16,
            n => RelocationType::Other(n),
        }
    }
}

impl From<RelocationType> for u8 {
    fn from(ty: RelocationType) -> Self {
        match ty {
            RelocationType::None => 0,
            RelocationType::Word32 => 2,
            RelocationType::Jump26 => 4,
            RelocationType::Hi16 => 5,
            RelocationType::Lo16 => 6,
            RelocationType::Other(n) => n,
        }
    }
}
