use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::consts;

/// One file entry of the volume being written: the item's metadata plus
/// its position within its folder's uncompressed stream.
#[derive(Clone, Debug)]
pub(crate) struct FileEntry {
    pub(crate) name: String,
    pub(crate) uncompressed_size: u32,
    pub(crate) folder_offset: u32,
    pub(crate) folder_index: u16,
    pub(crate) date: u16,
    pub(crate) time: u16,
    pub(crate) attributes: u16,
}

impl FileEntry {
    /// The entry's on-disk footprint: the fixed fields plus the
    /// NUL-terminated name.
    pub(crate) fn entry_size(&self) -> u64 {
        consts::FILE_ENTRY_FIXED_SIZE + self.name.len() as u64 + 1
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u32::<LittleEndian>(self.folder_offset)?;
        writer.write_u16::<LittleEndian>(self.folder_index)?;
        writer.write_u16::<LittleEndian>(self.date)?;
        writer.write_u16::<LittleEndian>(self.time)?;
        writer.write_u16::<LittleEndian>(self.attributes)?;
        writer.write_all(self.name.as_bytes())?;
        writer.write_u8(0)?;
        Ok(())
    }

    /// True when any byte of this file lies within or beyond the block
    /// starting at `block_start` of the folder's uncompressed stream.
    pub(crate) fn reaches(&self, block_start: u64) -> bool {
        u64::from(self.folder_offset) + u64::from(self.uncompressed_size)
            >= block_start
    }

    /// Marks this entry, in the volume being closed, as continuing into
    /// the next volume.
    pub(crate) fn mark_continued_to_next(&mut self) {
        self.folder_index = match self.folder_index {
            consts::CONTINUED_FROM_PREV | consts::CONTINUED_PREV_AND_NEXT => {
                consts::CONTINUED_PREV_AND_NEXT
            }
            _ => consts::CONTINUED_TO_NEXT,
        };
    }

    /// The twin entry carried into the next volume's leading folder.
    pub(crate) fn carried(&self) -> FileEntry {
        let mut entry = self.clone();
        entry.folder_index = consts::CONTINUED_FROM_PREV;
        entry
    }
}
