use std::io;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::{Compression, FlushCompress};

use crate::consts::{MAX_MSZIP_BLOCK_SIZE, MAX_UNCOMPRESSED_BLOCK_SIZE};

const MSZIP_SIGNATURE: u16 = 0x4b43; // "CK" stored little-endian
const MSZIP_BLOCK_TERMINATOR: u16 = 0x0003;

/// An MSZIP block compressor: a raw DEFLATE stream framed per block by
/// the `CK` signature.
///
/// Each block is compressed with a sync flush, which byte-aligns the
/// output while keeping the dictionary warm for the next block, and is
/// then closed with an empty final sub-block so a decoder that finishes
/// every block sees a terminated stream (the effect of finishing a clone
/// of the compressor, without the clone).
pub struct MsZipCompressor {
    level: Compression,
    compressor: flate2::Compress,
}

impl MsZipCompressor {
    pub fn new(level: u32) -> MsZipCompressor {
        let level = Compression::new(level);
        MsZipCompressor {
            level,
            compressor: flate2::Compress::new(level, false),
        }
    }

    pub fn compress_block(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        debug_assert!(data.len() <= MAX_UNCOMPRESSED_BLOCK_SIZE);
        let mut out = Vec::<u8>::with_capacity(0xffff);
        out.write_u16::<LittleEndian>(MSZIP_SIGNATURE)?;
        match self.compressor.compress_vec(data, &mut out, FlushCompress::Sync)
        {
            Ok(_) => {}
            Err(error) => invalid_data!("MSZIP compression failed: {}", error),
        }
        out.write_u16::<LittleEndian>(MSZIP_BLOCK_TERMINATOR)?;
        if out.len() > MAX_MSZIP_BLOCK_SIZE {
            // Incompressible input; a stored DEFLATE block is 7 bytes of
            // framing plus the raw data (exactly 32775 bytes for a full
            // block), which every decoder accepts.
            log::debug!(
                "MSZIP block grew to {} bytes; storing it instead",
                out.len()
            );
            out = Vec::with_capacity(data.len() + 7);
            out.write_u16::<LittleEndian>(MSZIP_SIGNATURE)?;
            out.push(0x01);
            out.write_u16::<LittleEndian>(data.len() as u16)?;
            out.write_u16::<LittleEndian>(!(data.len() as u16))?;
            out.extend_from_slice(data);
            debug_assert_eq!(out.len(), data.len() + 7);
        }
        Ok(out)
    }

    /// Discards the compression history at the end of a folder.
    pub fn reset(&mut self) {
        self.compressor = flate2::Compress::new(self.level, false);
    }
}
