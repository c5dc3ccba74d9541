use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::consts;
use crate::ctype::CompressionType;
use crate::file::FileEntry;

/// One folder row of the volume being written, together with the file
/// entries assigned to it in this volume.
///
/// A folder that spans volumes produces one such row per volume;
/// `num_blocks` counts only the data blocks written into this volume.
pub(crate) struct FolderEntry {
    pub(crate) compression_type: CompressionType,
    /// Offset of the folder's first data block, relative to the start of
    /// the volume's scratch sink; rebased past the header on finalize.
    pub(crate) first_block_offset: u64,
    pub(crate) num_blocks: u16,
    pub(crate) files: Vec<FileEntry>,
}

impl FolderEntry {
    pub(crate) fn new(
        compression_type: CompressionType,
        first_block_offset: u64,
    ) -> FolderEntry {
        FolderEntry {
            compression_type,
            first_block_offset,
            num_blocks: 0,
            files: Vec::new(),
        }
    }

    pub(crate) fn entry_size(&self) -> u64 {
        consts::FOLDER_ENTRY_SIZE
    }

    pub(crate) fn files_size(&self) -> u64 {
        self.files.iter().map(FileEntry::entry_size).sum()
    }

    /// Writes the folder row with its first-block offset rebased to the
    /// absolute position `data_base` of the volume's data area.
    pub(crate) fn write_to<W: Write>(
        &self,
        writer: &mut W,
        data_base: u64,
    ) -> io::Result<()> {
        let offset = self.first_block_offset + data_base;
        writer.write_u32::<LittleEndian>(offset as u32)?;
        writer.write_u16::<LittleEndian>(self.num_blocks)?;
        writer
            .write_u16::<LittleEndian>(self.compression_type.to_bitfield())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::FolderEntry;
    use crate::ctype::CompressionType;

    #[test]
    fn folder_row_normalizes_mszip_levels() {
        let mut folder = FolderEntry::new(CompressionType::MsZip(9), 100);
        folder.num_blocks = 3;
        let mut out = Vec::new();
        folder.write_to(&mut out, 67).unwrap();
        assert_eq!(out.as_slice(), b"\xa7\0\0\0\x03\0\x01\0");
    }

    #[test]
    fn store_folder_row() {
        let folder = FolderEntry::new(CompressionType::None, 0);
        let mut out = Vec::new();
        folder.write_to(&mut out, 67).unwrap();
        assert_eq!(out.as_slice(), b"\x43\0\0\0\0\0\0\0");
    }
}
