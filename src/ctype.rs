use std::fmt;
use std::io;
use std::str::FromStr;

use crate::error::{CabError, Result};
use crate::mszip::MsZipCompressor;

const CTYPE_NONE: u16 = 0;
const CTYPE_MSZIP: u16 = 1;
const CTYPE_LZX: u16 = 3;

const MSZIP_LEVEL_MIN: u32 = 1;
const MSZIP_LEVEL_MAX: u32 = 9;
const MSZIP_LEVEL_DEFAULT: u32 = 6;
const LZX_WINDOW_MIN: u16 = 15;
const LZX_WINDOW_MAX: u16 = 21;
const LZX_WINDOW_DEFAULT: u16 = 15;

/// A scheme for compressing data within the cabinet.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum CompressionType {
    /// No compression.
    None,
    /// MSZIP compression at the given DEFLATE level (1 to 9).  MSZIP is
    /// described further in
    /// [MS-MCI](https://msdn.microsoft.com/en-us/library/cc483131.aspx).
    MsZip(u32),
    /// LZX compression with a sliding dictionary of the given power of
    /// two (15 to 21, i.e. 32 KiB to 2 MiB).  The LZX compression scheme
    /// is described further in
    /// [MS-PATCH](https://msdn.microsoft.com/en-us/library/cc483133.aspx).
    Lzx(u16),
}

impl CompressionType {
    /// Encodes the compression scheme as the 16-bit tag stored in a
    /// folder entry.  MSZIP levels are an encoder-side knob, so they all
    /// normalize to the single MSZIP flag value.
    pub(crate) fn to_bitfield(self) -> u16 {
        match self {
            CompressionType::None => CTYPE_NONE,
            CompressionType::MsZip(_) => CTYPE_MSZIP,
            CompressionType::Lzx(window) => {
                CTYPE_LZX
                    | (window.clamp(LZX_WINDOW_MIN, LZX_WINDOW_MAX) << 8)
            }
        }
    }

    pub(crate) fn validate(self) -> Result<()> {
        match self {
            CompressionType::None => Ok(()),
            CompressionType::MsZip(level) => {
                if !(MSZIP_LEVEL_MIN..=MSZIP_LEVEL_MAX).contains(&level) {
                    config_err!(
                        "MSZIP level must be 1 through 9 (got {})",
                        level
                    );
                }
                Ok(())
            }
            CompressionType::Lzx(window) => {
                if !(LZX_WINDOW_MIN..=LZX_WINDOW_MAX).contains(&window) {
                    config_err!(
                        "LZX window must be 15 through 21 (got {})",
                        window
                    );
                }
                Ok(())
            }
        }
    }

    /// The largest on-wire payload a conformant decoder will accept for
    /// one block of this scheme.
    pub(crate) fn max_block_size(self) -> usize {
        match self {
            CompressionType::None => crate::consts::MAX_UNCOMPRESSED_BLOCK_SIZE,
            CompressionType::MsZip(_) => crate::consts::MAX_MSZIP_BLOCK_SIZE,
            CompressionType::Lzx(_) => crate::consts::MAX_LZX_BLOCK_SIZE,
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CompressionType::None => write!(f, "none"),
            CompressionType::MsZip(level) => write!(f, "mszip:{}", level),
            CompressionType::Lzx(window) => write!(f, "lzx:{}", window),
        }
    }
}

impl FromStr for CompressionType {
    type Err = CabError;

    /// Parses the selector grammar `none | store | mszip[:1..9] |
    /// lzx[:15..21]`.
    fn from_str(s: &str) -> Result<CompressionType> {
        let lower = s.to_ascii_lowercase();
        let (method, level) = match lower.split_once(':') {
            Some((method, level)) => (method, Some(level)),
            None => (lower.as_str(), None),
        };
        let level = match level {
            Some(text) => match text.parse::<u32>() {
                Ok(value) => Some(value),
                Err(_) => {
                    config_err!("bad compression level in {:?}", s)
                }
            },
            None => None,
        };
        let ctype = match method {
            "none" | "store" => CompressionType::None,
            "mszip" => {
                CompressionType::MsZip(level.unwrap_or(MSZIP_LEVEL_DEFAULT))
            }
            "lzx" => CompressionType::Lzx(
                level.unwrap_or(u32::from(LZX_WINDOW_DEFAULT)) as u16,
            ),
            _ => config_err!("unknown compression method {:?}", s),
        };
        ctype.validate()?;
        Ok(ctype)
    }
}

// ========================================================================= //

/// A pluggable per-folder block compressor.
///
/// The pipeline feeds each folder's uncompressed stream to one compressor
/// in 32 KiB blocks; implementations must preserve whatever history the
/// on-wire format allows between `compress` calls of the same folder.
pub trait BlockCompressor {
    /// Converts up to 32768 uncompressed bytes into the on-wire payload
    /// for one data block.  Returning an empty buffer for an empty input
    /// is legal.
    fn compress(&mut self, block: &[u8]) -> io::Result<Vec<u8>>;

    /// Marks the current folder's stream as terminated and resets any
    /// internal state for the next folder.  The returned bytes are
    /// appended to the folder's last data block.  `flush` is only called
    /// directly after the folder's final `compress`; when no data was
    /// compressed since the previous flush it must return an empty
    /// buffer.
    fn flush(&mut self) -> io::Result<Vec<u8>>;
}

/// The compressor driving the current folder's stream.
pub(crate) enum FolderCompressor {
    Store,
    MsZip(MsZipCompressor),
    External(Box<dyn BlockCompressor>),
}

impl FolderCompressor {
    pub(crate) fn compress(&mut self, block: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            FolderCompressor::Store => Ok(block.to_vec()),
            FolderCompressor::MsZip(compressor) => {
                compressor.compress_block(block)
            }
            FolderCompressor::External(compressor) => {
                compressor.compress(block)
            }
        }
    }

    pub(crate) fn flush(&mut self) -> io::Result<Vec<u8>> {
        match self {
            FolderCompressor::Store => Ok(Vec::new()),
            FolderCompressor::MsZip(compressor) => {
                compressor.reset();
                Ok(Vec::new())
            }
            FolderCompressor::External(compressor) => compressor.flush(),
        }
    }
}
