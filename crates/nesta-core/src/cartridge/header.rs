//! iNES header parsing.

use bitflags::bitflags;

use crate::error::Error;

/// Length of the iNES container header.
pub const NES_HEADER_LEN: usize = 16;

/// PRG ROM bank unit (16 KiB).
pub const PRG_BANK_SIZE: usize = 16 * 1024;
/// CHR bank unit (8 KiB).
pub const CHR_BANK_SIZE: usize = 8 * 1024;
/// Trainer block size when flags6 bit 2 is set.
pub const TRAINER_SIZE: usize = 512;

bitflags! {
    /// iNES flags 6: mirroring, battery, trainer, and the low mapper nibble.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags6: u8 {
        const VERTICAL_MIRRORING = 0b0000_0001;
        const BATTERY            = 0b0000_0010;
        const TRAINER            = 0b0000_0100;
        const FOUR_SCREEN        = 0b0000_1000;
        const MAPPER_LOW         = 0b1111_0000;
    }
}

bitflags! {
    /// iNES flags 7: console type bits and the high mapper nibble.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags7: u8 {
        const VS_UNISYSTEM  = 0b0000_0001;
        const PLAYCHOICE_10 = 0b0000_0010;
        const NES2_ID       = 0b0000_1100;
        const MAPPER_HIGH   = 0b1111_0000;
    }
}

/// Nametable layout selected by the cartridge wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    /// Tables stacked vertically; `$2400` mirrors `$2000`.
    Horizontal,
    /// Tables side by side; `$2800` mirrors `$2000`.
    Vertical,
    /// Cartridge provides all four tables (mirrored as vertical here).
    FourScreen,
}

/// Parsed iNES header fields relevant to NROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub prg_rom_size: usize,
    pub chr_rom_size: usize,
    pub mapper: u8,
    pub mirroring: Mirroring,
    pub battery: bool,
    pub trainer_present: bool,
}

impl Header {
    /// Parses the 16-byte header, rejecting bad magic and non-NROM mappers.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < NES_HEADER_LEN {
            return Err(Error::HeaderTooShort {
                actual: bytes.len(),
            });
        }
        if &bytes[..4] != b"NES\x1A" {
            return Err(Error::BadMagic);
        }

        let flags6 = Flags6::from_bits_retain(bytes[6]);
        let flags7 = Flags7::from_bits_retain(bytes[7]);
        let mapper = (flags7.bits() & Flags7::MAPPER_HIGH.bits()) | (flags6.bits() >> 4);
        if mapper != 0 {
            return Err(Error::UnsupportedMapper(mapper));
        }

        let prg_banks = bytes[4] as usize;
        if prg_banks == 0 {
            return Err(Error::EmptyPrg);
        }

        let mirroring = if flags6.contains(Flags6::FOUR_SCREEN) {
            Mirroring::FourScreen
        } else if flags6.contains(Flags6::VERTICAL_MIRRORING) {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        Ok(Self {
            prg_rom_size: prg_banks * PRG_BANK_SIZE,
            chr_rom_size: bytes[5] as usize * CHR_BANK_SIZE,
            mapper,
            mirroring,
            battery: flags6.contains(Flags6::BATTERY),
            trainer_present: flags6.contains(Flags6::TRAINER),
        })
    }
}
