use std::collections::VecDeque;
use std::io::Read;
use std::mem;
use std::path::{Path, PathBuf};

use crate::block::DataBlock;
use crate::consts;
use crate::ctype::{BlockCompressor, CompressionType, FolderCompressor};
use crate::datetime::mtime_to_bits;
use crate::error::Result;
use crate::file::FileEntry;
use crate::mszip::MsZipCompressor;
use crate::source::FileSource;
use crate::volume::{substitute_index, VolumeHeader, VolumeWriter};

/// Builds a fresh LZX block compressor for a folder with the given
/// window exponent.
pub(crate) type LzxFactory = Box<dyn FnMut(u16) -> Box<dyn BlockCompressor>>;

/// Running totals over the lifetime of one archive set.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveStats {
    /// Uncompressed bytes consumed from source files.
    pub bytes_read: u64,
    /// Bytes written to finished volumes, headers included.
    pub bytes_written: u64,
    /// Files whose contents entered the archive.
    pub files_added: u64,
    /// Volumes written to disk.
    pub volumes: u32,
}

impl ArchiveStats {
    /// On-disk bytes per input byte; zero while nothing has been read.
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_read == 0 {
            0.0
        } else {
            self.bytes_written as f64 / self.bytes_read as f64
        }
    }
}

struct QueuedFile {
    name: String,
    path: PathBuf,
    attributes: u16,
}

/// A folder as a compression unit.  One logical folder may produce
/// folder rows in several consecutive volumes; the compressor and the
/// stream counters live here so history survives a volume split.
struct LogicalFolder {
    ctype: CompressionType,
    compressor: FolderCompressor,
    /// Uncompressed bytes assigned to the folder stream by opened files.
    assigned: u64,
    /// Uncompressed bytes already emitted as data blocks.
    emitted: u64,
    /// Set once the folder's last block (with the compressor's trailer)
    /// has been emitted.
    terminated: bool,
}

/// The streaming core: pulls bytes from source files into a 32 KiB
/// window, compresses full windows into data blocks, and rotates volumes
/// when the size budget runs out, splitting the block in flight.
pub(crate) struct Pipeline {
    source: Box<dyn FileSource>,
    lzx_factory: Option<LzxFactory>,
    /// Output path pattern; a `#` becomes the 1-based volume index.
    path_pattern: String,
    /// File-name component of the pattern, used for prev/next linkage.
    name_pattern: String,
    label_pattern: Option<String>,
    limit: u64,
    reserve_size: u16,
    set_id: u16,
    /// 1-based index of the volume currently being filled.
    volume_index: u32,
    volume: VolumeWriter,
    folder: Option<LogicalFolder>,
    queue: VecDeque<QueuedFile>,
    reader: Option<Box<dyn Read>>,
    buf: Vec<u8>,
    /// Close the current folder before the next file is opened; set
    /// after a volume split so the continuation folder does not keep
    /// accumulating unrelated files.
    pending_flush: bool,
    stats: ArchiveStats,
}

impl Pipeline {
    pub(crate) fn new(
        source: Box<dyn FileSource>,
        lzx_factory: Option<LzxFactory>,
        path_pattern: String,
        label_pattern: Option<String>,
        limit: u64,
        reserve_size: u16,
        set_id: u16,
    ) -> Pipeline {
        let name_pattern = Path::new(&path_pattern)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_pattern.clone());
        let mut pipeline = Pipeline {
            source,
            lzx_factory,
            path_pattern,
            name_pattern,
            label_pattern,
            limit,
            reserve_size,
            set_id,
            volume_index: 1,
            volume: VolumeWriter::new(VolumeHeader {
                set_id,
                cabinet_index: 0,
                reserve_size,
                prev: None,
                next: None,
            }),
            folder: None,
            queue: VecDeque::new(),
            reader: None,
            buf: Vec::with_capacity(consts::MAX_UNCOMPRESSED_BLOCK_SIZE),
            pending_flush: false,
            stats: ArchiveStats::default(),
        };
        pipeline.volume = VolumeWriter::new(pipeline.make_header());
        pipeline
    }

    pub(crate) fn stats(&self) -> ArchiveStats {
        self.stats
    }

    fn volume_path(&self) -> PathBuf {
        PathBuf::from(substitute_index(&self.path_pattern, self.volume_index))
    }

    fn make_header(&self) -> VolumeHeader {
        let index = self.volume_index;
        let label = |index: u32| {
            self.label_pattern
                .as_ref()
                .map(|pattern| substitute_index(pattern, index))
                .unwrap_or_default()
        };
        let prev = (index > 1).then(|| {
            (substitute_index(&self.name_pattern, index - 1), label(index - 1))
        });
        let next = Some((
            substitute_index(&self.name_pattern, index + 1),
            label(index + 1),
        ));
        VolumeHeader {
            set_id: self.set_id,
            cabinet_index: (index - 1) as u16,
            reserve_size: self.reserve_size,
            prev,
            next,
        }
    }

    fn make_compressor(
        &mut self,
        ctype: CompressionType,
    ) -> Result<FolderCompressor> {
        match ctype {
            CompressionType::None => Ok(FolderCompressor::Store),
            CompressionType::MsZip(level) => {
                Ok(FolderCompressor::MsZip(MsZipCompressor::new(level)))
            }
            CompressionType::Lzx(window) => match self.lzx_factory.as_mut() {
                Some(factory) => {
                    Ok(FolderCompressor::External(factory(window)))
                }
                None => config_err!(
                    "LZX folders need an external block compressor; \
                     none was registered"
                ),
            },
        }
    }

    /// Opens a new folder; a previously open folder is flushed first.
    pub(crate) fn add_folder(&mut self, ctype: CompressionType) -> Result<()> {
        ctype.validate()?;
        let compressor = self.make_compressor(ctype)?;
        if self.folder.is_some() {
            self.pump(true)?;
        }
        self.pending_flush = false;
        self.volume.start_folder(ctype)?;
        self.folder = Some(LogicalFolder {
            ctype,
            compressor,
            assigned: 0,
            emitted: 0,
            terminated: false,
        });
        Ok(())
    }

    /// Queues one file for the current folder and advances the stream.
    pub(crate) fn add_file(
        &mut self,
        name: String,
        path: PathBuf,
        attributes: u16,
    ) -> Result<()> {
        if self.folder.is_none() {
            state_err!("add a folder before adding files");
        }
        self.queue.push_back(QueuedFile { name, path, attributes });
        self.pump(false)
    }

    /// Terminates the stream and writes the final volume.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if self.volume.folders().is_empty() {
            state_err!("cannot flush an archive with no folders");
        }
        self.pump(true)?;
        let path = self.volume_path();
        let placeholder = VolumeWriter::new(self.make_header());
        let volume = mem::replace(&mut self.volume, placeholder);
        let written = volume.finalize(&path, true)?;
        self.stats.volumes += 1;
        self.stats.bytes_written += written;
        Ok(())
    }

    /// Drives the read loop: emit a block for every full window, then,
    /// when the folder is ending, emit the trailing partial block.
    fn pump(&mut self, end_folder: bool) -> Result<()> {
        while self.fill_buffer()? {
            self.emit_block(false)?;
        }
        if end_folder || self.pending_flush {
            let open =
                self.folder.as_ref().is_some_and(|folder| !folder.terminated);
            if open {
                self.emit_block(true)?;
            }
        }
        Ok(())
    }

    /// Reads source bytes until the window is full; returns false once
    /// no more bytes can be buffered (no pending files, or the folder is
    /// closing after a split, or the volume has no room left).
    fn fill_buffer(&mut self) -> Result<bool> {
        loop {
            if self.reader.is_none() && !self.open_next()? {
                return Ok(false);
            }
            let want =
                (consts::MAX_UNCOMPRESSED_BLOCK_SIZE - self.buf.len()) as u64;
            let reader = self.reader.as_mut().expect("open reader");
            let count = reader.by_ref().take(want).read_to_end(&mut self.buf)?;
            self.stats.bytes_read += count as u64;
            if self.buf.len() == consts::MAX_UNCOMPRESSED_BLOCK_SIZE {
                return Ok(true);
            }
            // End of the current file.
            self.reader = None;
            if self.volume_is_full() || self.pending_flush {
                return Ok(false);
            }
        }
    }

    /// Dequeues and opens the next source file, finalizing its entry in
    /// the current folder.  Unreadable or oversized items are skipped.
    fn open_next(&mut self) -> Result<bool> {
        loop {
            let queued = match self.queue.pop_front() {
                Some(queued) => queued,
                None => return Ok(false),
            };
            if self.pending_flush {
                // The folder that was split is complete; subsequent
                // files open a sibling folder with the same scheme.
                self.pending_flush = false;
                self.start_sibling_folder()?;
            }
            let opened = match self.source.open(&queued.path) {
                Ok(opened) => opened,
                Err(error) => {
                    log::warn!("skipping {:?}: {}", queued.path, error);
                    continue;
                }
            };
            if opened.metadata.size > consts::MAX_FILE_SIZE {
                log::warn!(
                    "skipping {:?}: {} bytes exceeds the {} byte limit",
                    queued.path,
                    opened.metadata.size,
                    consts::MAX_FILE_SIZE
                );
                continue;
            }
            if self.volume.num_files() >= consts::MAX_NUM_FILES {
                invalid_data!(
                    "Volume has too many files (max is {})",
                    consts::MAX_NUM_FILES
                );
            }
            let folder = self.folder.as_mut().expect("open folder");
            if folder.assigned + opened.metadata.size > u64::from(u32::MAX) {
                invalid_data!(
                    "Folder is overfull \
                     (file offset of {} bytes, max is {} bytes)",
                    folder.assigned + opened.metadata.size,
                    u32::MAX
                );
            }
            let metadata = &opened.metadata;
            let (date, time) = mtime_to_bits(metadata.mtime);
            let mut attributes = queued.attributes;
            if metadata.read_only {
                attributes |= consts::ATTR_READ_ONLY;
            }
            if metadata.hidden {
                attributes |= consts::ATTR_HIDDEN;
            }
            if metadata.system {
                attributes |= consts::ATTR_SYSTEM;
            }
            if metadata.archive {
                attributes |= consts::ATTR_ARCH;
            }
            if metadata.executable {
                attributes |= consts::ATTR_EXEC;
            }
            log::debug!(
                "adding {} ({} bytes) at folder offset {}",
                queued.name,
                metadata.size,
                folder.assigned
            );
            let entry = FileEntry {
                name: queued.name,
                uncompressed_size: metadata.size as u32,
                folder_offset: folder.assigned as u32,
                folder_index: (self.volume.folders().len() - 1) as u16,
                date,
                time,
                attributes,
            };
            folder.assigned += metadata.size;
            self.volume
                .last_folder_mut()
                .expect("open folder row")
                .files
                .push(entry);
            self.reader = Some(opened.reader);
            self.stats.files_added += 1;
            return Ok(true);
        }
    }

    fn start_sibling_folder(&mut self) -> Result<()> {
        let folder = self.folder.take().expect("open folder");
        self.volume.start_folder(folder.ctype)?;
        self.folder = Some(LogicalFolder {
            ctype: folder.ctype,
            compressor: folder.compressor,
            assigned: 0,
            emitted: 0,
            terminated: false,
        });
        Ok(())
    }

    fn volume_is_full(&self) -> bool {
        self.volume.projected_size() >= self.limit
    }

    /// Turns the buffered window into one data block and places it in
    /// the current volume, splitting across a volume boundary when the
    /// budget runs out.  With `last` set, the block carries the
    /// compressor's trailer and ends the folder's stream.
    fn emit_block(&mut self, last: bool) -> Result<()> {
        let folder = self.folder.as_mut().expect("open folder");
        debug_assert!(!folder.terminated);
        let uncompressed_len = self.buf.len();
        let mut payload = if uncompressed_len > 0 {
            folder.compressor.compress(&self.buf)?
        } else {
            Vec::new()
        };
        if last {
            let trailer = folder.compressor.flush()?;
            if uncompressed_len > 0 {
                payload.extend_from_slice(&trailer);
            } else if !trailer.is_empty() {
                log::debug!(
                    "discarding {} trailer bytes of an empty folder tail",
                    trailer.len()
                );
            }
            folder.terminated = true;
        }
        self.buf.clear();
        let block_start = folder.emitted;
        folder.emitted += uncompressed_len as u64;
        if payload.is_empty() {
            return Ok(());
        }
        if payload.len() > folder.ctype.max_block_size() {
            invalid_data!(
                "Compressed block of {} bytes exceeds the {} byte limit \
                 for {}",
                payload.len(),
                folder.ctype.max_block_size(),
                folder.ctype
            );
        }
        let block = DataBlock::new(payload, uncompressed_len as u16);
        if self.volume.projected_size() + block.total_size() < self.limit {
            self.volume.append_block(&block)
        } else {
            self.split_volume(block, block_start)
        }
    }

    /// Closes the current volume mid-block: as much of the payload as
    /// the budget allows stays behind as a head record with a zero
    /// uncompressed length, the rest opens the next volume, and every
    /// file reaching into the block is marked as continuing.
    fn split_volume(
        &mut self,
        block: DataBlock,
        block_start: u64,
    ) -> Result<()> {
        let budget = self.limit.saturating_sub(
            self.volume.projected_size() + consts::DATA_BLOCK_HEADER_SIZE,
        );
        let head_len = (budget as usize).min(block.data.len());
        let (head, tail) = block.split(head_len);
        log::debug!(
            "volume {} is full; splitting block at {} of {} payload bytes",
            self.volume_index,
            head_len,
            head_len + tail.data.len()
        );
        self.volume.append_block(&head)?;

        let mut carried = Vec::new();
        if let Some(row) = self.volume.last_folder_mut() {
            for file in row.files.iter_mut() {
                if file.reaches(block_start) {
                    file.mark_continued_to_next();
                    carried.push(file.carried());
                }
            }
        }

        let path = self.volume_path();
        self.volume_index += 1;
        let next_volume = VolumeWriter::new(self.make_header());
        let volume = mem::replace(&mut self.volume, next_volume);
        let written = volume.finalize(&path, false)?;
        self.stats.volumes += 1;
        self.stats.bytes_written += written;

        // The new volume leads with the continuation of the split
        // folder: the carried file entries and the residual payload.
        let ctype = self.folder.as_ref().expect("open folder").ctype;
        self.volume.start_folder(ctype)?;
        self.volume.last_folder_mut().expect("folder row").files = carried;
        self.volume.append_block(&tail)?;
        self.pending_flush = true;
        Ok(())
    }
}
