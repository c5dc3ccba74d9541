use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use tempfile::SpooledTempFile;

use crate::block::DataBlock;
use crate::consts;
use crate::ctype::CompressionType;
use crate::error::Result;
use crate::folder::FolderEntry;

/// Scratch data up to this size stays in memory; larger volumes spill to
/// a temporary file.
const SCRATCH_SPOOL_LIMIT: usize = 8 << 20;

/// Substitutes the `#` glyph of an archive-name or disk-label pattern
/// with a 1-based volume index.
pub(crate) fn substitute_index(pattern: &str, index: u32) -> String {
    pattern.replace('#', &index.to_string())
}

// ========================================================================= //

/// The variable part of one volume's CFHEADER: set linkage, reserve
/// area, and the names of the neighboring volumes.
pub(crate) struct VolumeHeader {
    pub(crate) set_id: u16,
    pub(crate) cabinet_index: u16,
    pub(crate) reserve_size: u16,
    /// `(cabinet name, disk label)` of the previous volume; the label
    /// may be empty, in which case only its NUL is stored.
    pub(crate) prev: Option<(String, String)>,
    /// Same for the next volume; cleared when the set ends here.
    pub(crate) next: Option<(String, String)>,
}

impl VolumeHeader {
    fn flags(&self) -> u16 {
        let mut flags = 0;
        if self.prev.is_some() {
            flags |= consts::FLAG_PREV_CABINET;
        }
        if self.next.is_some() {
            flags |= consts::FLAG_NEXT_CABINET;
        }
        if self.reserve_size > 0 {
            flags |= consts::FLAG_RESERVE_PRESENT;
        }
        flags
    }

    pub(crate) fn clear_next(&mut self) {
        self.next = None;
    }

    /// The header's on-disk footprint, before the folder table.
    pub(crate) fn byte_size(&self) -> u64 {
        let mut size = consts::HEADER_FIXED_SIZE;
        if self.reserve_size > 0 {
            size += 4 + u64::from(self.reserve_size);
        }
        for names in [&self.prev, &self.next].into_iter().flatten() {
            size += names.0.len() as u64 + 1 + names.1.len() as u64 + 1;
        }
        size
    }

    fn write_to<W: Write>(
        &self,
        writer: &mut W,
        cb_cabinet: u32,
        coff_files: u32,
        num_folders: u16,
        num_files: u16,
    ) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(consts::FILE_SIGNATURE)?;
        writer.write_u32::<LittleEndian>(0)?; // reserved1
        writer.write_u32::<LittleEndian>(cb_cabinet)?;
        writer.write_u32::<LittleEndian>(0)?; // reserved2
        writer.write_u32::<LittleEndian>(coff_files)?;
        writer.write_u32::<LittleEndian>(0)?; // reserved3
        writer.write_u8(consts::VERSION_MINOR)?;
        writer.write_u8(consts::VERSION_MAJOR)?;
        writer.write_u16::<LittleEndian>(num_folders)?;
        writer.write_u16::<LittleEndian>(num_files)?;
        writer.write_u16::<LittleEndian>(self.flags())?;
        writer.write_u16::<LittleEndian>(self.set_id)?;
        writer.write_u16::<LittleEndian>(self.cabinet_index)?;
        if self.reserve_size > 0 {
            writer.write_u16::<LittleEndian>(self.reserve_size)?;
            writer.write_u8(0)?; // per-folder reserve size
            writer.write_u8(0)?; // per-datablock reserve size
            writer.write_all(&vec![0; self.reserve_size as usize])?;
        }
        for names in [&self.prev, &self.next].into_iter().flatten() {
            writer.write_all(names.0.as_bytes())?;
            writer.write_u8(0)?;
            writer.write_all(names.1.as_bytes())?;
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

// ========================================================================= //

/// Accumulates one volume: its header-to-be, the folder and file tables,
/// and a scratch sink holding the data blocks already emitted.
///
/// The volume's real header cannot be written until the tables stop
/// growing, so blocks go to the scratch sink first and are streamed into
/// the output file on `finalize`.
pub(crate) struct VolumeWriter {
    header: VolumeHeader,
    folders: Vec<FolderEntry>,
    scratch: SpooledTempFile,
    scratch_len: u64,
}

impl VolumeWriter {
    pub(crate) fn new(header: VolumeHeader) -> VolumeWriter {
        VolumeWriter {
            header,
            folders: Vec::new(),
            scratch: SpooledTempFile::new(SCRATCH_SPOOL_LIMIT),
            scratch_len: 0,
        }
    }

    pub(crate) fn folders(&self) -> &[FolderEntry] {
        &self.folders
    }

    pub(crate) fn last_folder_mut(&mut self) -> Option<&mut FolderEntry> {
        self.folders.last_mut()
    }

    pub(crate) fn num_files(&self) -> usize {
        self.folders.iter().map(|folder| folder.files.len()).sum()
    }

    /// Opens a new folder row whose first data block will be the next
    /// block appended.
    pub(crate) fn start_folder(
        &mut self,
        ctype: CompressionType,
    ) -> Result<()> {
        if self.folders.len() >= consts::MAX_NUM_FOLDERS {
            invalid_data!(
                "Volume has too many folders (max is {})",
                consts::MAX_NUM_FOLDERS
            );
        }
        self.folders.push(FolderEntry::new(ctype, self.scratch_len));
        Ok(())
    }

    /// Appends a data block to the scratch sink, counting it against the
    /// current folder.  Zero-length blocks are elided and not counted.
    pub(crate) fn append_block(&mut self, block: &DataBlock) -> Result<()> {
        let written = block.write_to(&mut self.scratch)?;
        if written > 0 {
            self.scratch_len += written;
            let folder = self.folders.last_mut().expect("open folder");
            folder.num_blocks += 1;
        }
        Ok(())
    }

    fn tables_size(&self) -> u64 {
        self.folders
            .iter()
            .map(|folder| folder.entry_size() + folder.files_size())
            .sum()
    }

    /// The volume's size as it stands: projected header and tables plus
    /// the scratch bytes already emitted.
    pub(crate) fn projected_size(&self) -> u64 {
        self.header.byte_size() + self.tables_size() + self.scratch_len
    }

    /// Writes the finished volume to `path`: header and tables first
    /// (with the file-table offset back-patched once it is known), then
    /// the scratch data blocks verbatim.  Returns the on-disk size.
    pub(crate) fn finalize(mut self, path: &Path, is_last: bool) -> Result<u64> {
        if is_last {
            self.header.clear_next();
        }
        let data_base = self.header.byte_size() + self.tables_size();
        let total = data_base + self.scratch_len;
        if total > consts::MAX_TOTAL_CAB_SIZE {
            invalid_data!(
                "Volume is too large ({} bytes; max is {} bytes)",
                total,
                consts::MAX_TOTAL_CAB_SIZE
            );
        }
        let num_folders = self.folders.len() as u16;
        let num_files = self.num_files() as u16;
        log::debug!(
            "writing volume {} to {:?}: {} bytes, {} folders, {} files",
            self.header.cabinet_index,
            path,
            total,
            num_folders,
            num_files
        );

        let mut writer = BufWriter::new(File::create(path)?);
        self.header.write_to(&mut writer, total as u32, 0, num_folders, num_files)?;
        for folder in &self.folders {
            folder.write_to(&mut writer, data_base)?;
        }
        let first_file_offset = writer.stream_position()?;
        for folder in &self.folders {
            for file in &folder.files {
                file.write_to(&mut writer)?;
            }
        }
        let table_end = writer.stream_position()?;
        debug_assert_eq!(table_end, data_base);
        writer.seek(SeekFrom::Start(0))?;
        self.header.write_to(
            &mut writer,
            total as u32,
            first_file_offset as u32,
            num_folders,
            num_files,
        )?;
        writer.seek(SeekFrom::Start(table_end))?;
        self.scratch.seek(SeekFrom::Start(0))?;
        io::copy(&mut self.scratch, &mut writer)?;
        writer.flush()?;
        Ok(total)
    }
}
