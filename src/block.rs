use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::checksum::checksum;
use crate::consts::DATA_BLOCK_HEADER_SIZE;

/// One on-wire CFDATA record: a checksummed payload covering up to
/// 32 KiB of a folder's uncompressed stream.
///
/// A record whose `uncompressed_size` is zero is the head of a block
/// split across volumes; the continuation record in the next volume
/// carries the true uncompressed length.
#[derive(Clone, Debug)]
pub(crate) struct DataBlock {
    pub(crate) uncompressed_size: u16,
    pub(crate) data: Vec<u8>,
}

impl DataBlock {
    pub(crate) fn new(data: Vec<u8>, uncompressed_size: u16) -> DataBlock {
        DataBlock { uncompressed_size, data }
    }

    /// The record's on-disk footprint, header included.
    pub(crate) fn total_size(&self) -> u64 {
        DATA_BLOCK_HEADER_SIZE + self.data.len() as u64
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Splits the record at `head_len` payload bytes: the head keeps its
    /// place in the current volume with a zero uncompressed length, the
    /// tail opens the next volume carrying the real length.
    pub(crate) fn split(self, head_len: usize) -> (DataBlock, DataBlock) {
        debug_assert!(head_len <= self.data.len());
        let tail = self.data[head_len..].to_vec();
        let mut head = self.data;
        head.truncate(head_len);
        (DataBlock::new(head, 0), DataBlock::new(tail, self.uncompressed_size))
    }

    /// Writes the record; a zero-length payload is elided entirely.
    /// Returns the number of bytes written.
    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<u64> {
        if self.is_empty() {
            return Ok(0);
        }
        let compressed_size = self.data.len() as u16;
        let mut lengths = [0u8; 4];
        lengths[..2].copy_from_slice(&compressed_size.to_le_bytes());
        lengths[2..].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        let value = checksum(&lengths, checksum(&self.data, 0));
        writer.write_u32::<LittleEndian>(value)?;
        writer.write_u16::<LittleEndian>(compressed_size)?;
        writer.write_u16::<LittleEndian>(self.uncompressed_size)?;
        writer.write_all(&self.data)?;
        Ok(self.total_size())
    }

    /// Reads one record back, payload included.  Fewer than eight
    /// available header bytes mean the stream holds no further records.
    #[cfg(test)]
    pub(crate) fn read_from<R: std::io::Read>(
        reader: &mut R,
    ) -> io::Result<Option<(u32, DataBlock)>> {
        use byteorder::ReadBytesExt;

        let mut header = [0u8; 8];
        let mut filled = 0;
        while filled < header.len() {
            let count = reader.read(&mut header[filled..])?;
            if count == 0 {
                return Ok(None);
            }
            filled += count;
        }
        let mut header = &header[..];
        let value = header.read_u32::<LittleEndian>()?;
        let compressed_size = header.read_u16::<LittleEndian>()?;
        let uncompressed_size = header.read_u16::<LittleEndian>()?;
        let mut data = vec![0u8; compressed_size as usize];
        reader.read_exact(&mut data)?;
        Ok(Some((value, DataBlock { uncompressed_size, data })))
    }
}

#[cfg(test)]
mod tests {
    use super::DataBlock;
    use crate::checksum::checksum;

    #[test]
    fn record_encoding_matches_known_bytes() {
        let block = DataBlock::new(b"Hello, world!\n".to_vec(), 14);
        let mut out = Vec::new();
        let written = block.write_to(&mut out).unwrap();
        assert_eq!(written, 22);
        assert_eq!(
            out.as_slice(),
            b"\x4c\x1a\x2e\x7f\x0e\0\x0e\0Hello, world!\n"
        );
    }

    #[test]
    fn empty_record_is_elided() {
        let block = DataBlock::new(Vec::new(), 0);
        let mut out = Vec::new();
        assert_eq!(block.write_to(&mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn round_trip_verifies_checksum() {
        let block = DataBlock::new(b"See you later!\n".to_vec(), 15);
        let mut out = Vec::new();
        block.write_to(&mut out).unwrap();
        let (value, parsed) =
            DataBlock::read_from(&mut out.as_slice()).unwrap().unwrap();
        assert_eq!(parsed.uncompressed_size, 15);
        assert_eq!(parsed.data, block.data);
        let mut lengths = [0u8; 4];
        lengths[..2].copy_from_slice(&15u16.to_le_bytes());
        lengths[2..].copy_from_slice(&15u16.to_le_bytes());
        assert_eq!(value, checksum(&lengths, checksum(&parsed.data, 0)));
    }

    #[test]
    fn truncated_stream_is_end_of_records() {
        let mut short: &[u8] = b"\x01\x02\x03";
        assert!(DataBlock::read_from(&mut short).unwrap().is_none());
        let mut empty: &[u8] = b"";
        assert!(DataBlock::read_from(&mut empty).unwrap().is_none());
    }

    #[test]
    fn split_preserves_payload_and_marks_head() {
        let block = DataBlock::new((0u8..100).collect(), 100);
        let (head, tail) = block.split(42);
        assert_eq!(head.uncompressed_size, 0);
        assert_eq!(head.data.len(), 42);
        assert_eq!(tail.uncompressed_size, 100);
        let mut joined = head.data.clone();
        joined.extend_from_slice(&tail.data);
        assert_eq!(joined, (0u8..100).collect::<Vec<u8>>());
    }
}
