//! NROM cartridge: iNES loading and CPU/PPU address-space access.

use std::{fs, path::Path};

use tracing::debug;

use crate::{
    cartridge::header::{Header, Mirroring, NES_HEADER_LEN, TRAINER_SIZE},
    error::Error,
    memory::cpu as cpu_mem,
};

pub mod header;

/// 8 KiB of CHR RAM allocated when the header advertises no CHR ROM.
const CHR_RAM_SIZE: usize = 8 * 1024;

/// A loaded NROM cartridge.
///
/// PRG ROM is immutable after load; PRG RAM and CHR (when RAM-backed) are
/// mutated through the CPU/PPU write paths.
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: Header,
    prg_rom: Vec<u8>,
    prg_ram: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
}

impl Cartridge {
    /// Parses a cartridge from an in-memory iNES image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let header = Header::parse(bytes)?;

        let mut cursor = NES_HEADER_LEN;
        if header.trainer_present {
            // Trainer data is not used by NROM; skip over it.
            take_section(bytes, &mut cursor, TRAINER_SIZE, "trainer")?;
        }

        let prg_rom = take_section(bytes, &mut cursor, header.prg_rom_size, "PRG ROM")?.to_vec();
        let (chr, chr_is_ram) = if header.chr_rom_size == 0 {
            (vec![0; CHR_RAM_SIZE], true)
        } else {
            (
                take_section(bytes, &mut cursor, header.chr_rom_size, "CHR ROM")?.to_vec(),
                false,
            )
        };

        debug!(
            prg_rom = prg_rom.len(),
            chr = chr.len(),
            chr_is_ram,
            mirroring = ?header.mirroring,
            "cartridge loaded"
        );

        Ok(Self {
            header,
            prg_rom,
            prg_ram: vec![0; cpu_mem::PRG_RAM_SIZE],
            chr,
            chr_is_ram,
        })
    }

    /// Loads and parses a cartridge from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Nametable layout hardwired by the cartridge.
    pub fn mirroring(&self) -> Mirroring {
        self.header.mirroring
    }

    /// Parsed header fields.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// CPU-side read (`$6000-$FFFF`).
    ///
    /// 16 KiB PRG ROMs mirror across the whole `$8000-$FFFF` window.
    pub fn cpu_read(&self, addr: u16) -> u8 {
        match addr {
            cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END => {
                self.prg_ram[(addr - cpu_mem::PRG_RAM_START) as usize]
            }
            cpu_mem::PRG_ROM_START.. => {
                let offset = (addr - cpu_mem::PRG_ROM_START) as usize % self.prg_rom.len();
                self.prg_rom[offset]
            }
            _ => 0,
        }
    }

    /// CPU-side write. ROM writes are ignored.
    pub fn cpu_write(&mut self, addr: u16, data: u8) {
        if let cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END = addr {
            self.prg_ram[(addr - cpu_mem::PRG_RAM_START) as usize] = data;
        }
    }

    /// PPU-side pattern read (`$0000-$1FFF`).
    pub fn chr_read(&self, addr: u16) -> u8 {
        self.chr[addr as usize % self.chr.len()]
    }

    /// PPU-side pattern write; only effective for CHR-RAM carts.
    pub fn chr_write(&mut self, addr: u16, data: u8) {
        if self.chr_is_ram {
            let len = self.chr.len();
            self.chr[addr as usize % len] = data;
        }
    }
}

fn take_section<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    section: &'static str,
) -> Result<&'a [u8], Error> {
    let end = cursor.checked_add(len).ok_or(Error::ShortRead {
        section,
        expected: len,
        actual: bytes.len().saturating_sub(*cursor),
    })?;
    let slice = bytes.get(*cursor..end).ok_or(Error::ShortRead {
        section,
        expected: len,
        actual: bytes.len().saturating_sub(*cursor),
    })?;
    *cursor = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(prg_banks: u8, chr_banks: u8, flags6: u8) -> Vec<u8> {
        let mut rom = vec![
            b'N', b'E', b'S', 0x1A, prg_banks, chr_banks, flags6, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        rom.extend((0..prg_banks as usize * 16 * 1024).map(|i| (i % 256) as u8));
        rom.extend(vec![0x55; chr_banks as usize * 8 * 1024]);
        rom
    }

    #[test]
    fn parses_and_mirrors_16k_prg() {
        let cart = Cartridge::from_bytes(&image(1, 1, 0)).unwrap();
        assert_eq!(cart.cpu_read(0x8000), 0);
        assert_eq!(cart.cpu_read(0x8003), 3);
        // The upper bank mirrors the lower one.
        assert_eq!(cart.cpu_read(0xC000), cart.cpu_read(0x8000));
        assert_eq!(cart.cpu_read(0xFFFC), (0x3FFC % 256) as u8);
    }

    #[test]
    fn maps_32k_prg_linearly() {
        let cart = Cartridge::from_bytes(&image(2, 1, 0)).unwrap();
        assert_eq!(cart.cpu_read(0xC000), (0x4000 % 256) as u8);
    }

    #[test]
    fn prg_ram_round_trips() {
        let mut cart = Cartridge::from_bytes(&image(1, 1, 0)).unwrap();
        cart.cpu_write(0x6000, 0xAB);
        cart.cpu_write(0x7FFF, 0xCD);
        assert_eq!(cart.cpu_read(0x6000), 0xAB);
        assert_eq!(cart.cpu_read(0x7FFF), 0xCD);
    }

    #[test]
    fn rom_writes_are_ignored() {
        let mut cart = Cartridge::from_bytes(&image(1, 1, 0)).unwrap();
        cart.cpu_write(0x8000, 0xFF);
        assert_eq!(cart.cpu_read(0x8000), 0);
    }

    #[test]
    fn chr_ram_is_writable_when_no_chr_rom() {
        let mut cart = Cartridge::from_bytes(&image(1, 0, 0)).unwrap();
        cart.chr_write(0x0010, 0x77);
        assert_eq!(cart.chr_read(0x0010), 0x77);
    }

    #[test]
    fn chr_rom_is_read_only() {
        let mut cart = Cartridge::from_bytes(&image(1, 1, 0)).unwrap();
        cart.chr_write(0x0010, 0x77);
        assert_eq!(cart.chr_read(0x0010), 0x55);
    }

    #[test]
    fn trainer_is_skipped() {
        let mut rom = vec![
            b'N', b'E', b'S', 0x1A, 1, 0, 0b0000_0100, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        rom.extend(vec![0xFE; 512]);
        rom.extend((0..16 * 1024).map(|i| (i % 256) as u8));
        let cart = Cartridge::from_bytes(&rom).unwrap();
        assert_eq!(cart.cpu_read(0x8000), 0);
        assert_eq!(cart.cpu_read(0x8001), 1);
    }

    #[test]
    fn reports_missing_prg_data() {
        let mut rom = image(1, 0, 0);
        rom.truncate(NES_HEADER_LEN + 100);
        assert!(matches!(
            Cartridge::from_bytes(&rom),
            Err(Error::ShortRead {
                section: "PRG ROM",
                ..
            })
        ));
    }
}
