use std::fmt;

use crate::cartridge::header::NES_HEADER_LEN;

/// Errors raised while loading a cartridge image.
///
/// The ROM loader is the only fallible constructor in the core; every other
/// component accepts an already-loaded cartridge and cannot fail.
#[derive(Debug)]
pub enum Error {
    /// The ROM file could not be opened or read from disk.
    FileOpen(std::io::Error),
    /// Fewer bytes than the 16-byte iNES header were provided.
    HeaderTooShort { actual: usize },
    /// The "NES\x1A" magic bytes are missing.
    BadMagic,
    /// The header selects a mapper other than 0 (NROM).
    UnsupportedMapper(u8),
    /// The header advertises zero PRG ROM banks.
    EmptyPrg,
    /// A section (trainer/PRG/CHR) is shorter than the header advertises.
    ShortRead {
        section: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileOpen(err) => write!(f, "failed to read ROM file: {err}"),
            Self::HeaderTooShort { actual } => {
                write!(f, "header expected {NES_HEADER_LEN} bytes, got {actual}")
            }
            Self::BadMagic => write!(f, "missing NES magic bytes"),
            Self::UnsupportedMapper(mapper) => {
                write!(f, "unsupported mapper {mapper} (only NROM/mapper 0)")
            }
            Self::EmptyPrg => write!(f, "header advertises no PRG ROM"),
            Self::ShortRead {
                section,
                expected,
                actual,
            } => write!(
                f,
                "{section} section expected {expected} bytes, got {actual}"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FileOpen(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::FileOpen(value)
    }
}
