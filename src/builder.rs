use std::collections::BTreeMap;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use rand::Rng;

use crate::consts;
use crate::ctype::{BlockCompressor, CompressionType};
use crate::error::Result;
use crate::pipeline::{ArchiveStats, LzxFactory, Pipeline};
use crate::source::{DiskSource, FileSource};
use crate::string::{self, NameStrip};
use crate::volume::substitute_index;

/// A structure for configuring a new cabinet set.
///
/// The archive name may contain a `#` glyph, which is replaced with the
/// 1-based volume index in each volume's file name and in the prev/next
/// linkage stored in the headers.
pub struct CabSetBuilder {
    pattern: String,
    limit: u64,
    reserve_size: usize,
    label: Option<String>,
    set_id: Option<u16>,
    compression: CompressionType,
    source: Option<Box<dyn FileSource>>,
    lzx_factory: Option<LzxFactory>,
}

impl CabSetBuilder {
    /// Starts configuring a set written to `pattern`.
    pub fn new<S: Into<String>>(pattern: S) -> CabSetBuilder {
        CabSetBuilder {
            pattern: pattern.into(),
            limit: 1 << 32,
            reserve_size: 0,
            label: None,
            set_id: None,
            compression: CompressionType::MsZip(6),
            source: None,
            lzx_factory: None,
        }
    }

    /// Caps each volume at `limit` bytes on disk; the default cap is
    /// effectively infinite.  Limits below 50,000 bytes are rejected by
    /// `create`.
    pub fn volume_limit(mut self, limit: u64) -> CabSetBuilder {
        self.limit = limit;
        self
    }

    /// Reserves an application-defined area of the given size in every
    /// volume header.  The area must be no more than 60,000 bytes long.
    pub fn reserve_size(mut self, size: usize) -> CabSetBuilder {
        self.reserve_size = size;
        self
    }

    /// Sets a human-readable disk-label pattern for the set; a `#` in
    /// the pattern is replaced with the volume index.
    pub fn disk_label<S: Into<String>>(mut self, label: S) -> CabSetBuilder {
        self.label = Some(label.into());
        self
    }

    /// Pins the cabinet set id instead of drawing a random one; useful
    /// for reproducible output.
    pub fn set_id(mut self, set_id: u16) -> CabSetBuilder {
        self.set_id = Some(set_id);
        self
    }

    /// Sets the compression scheme used by `CabSetWriter::new_folder`.
    /// The default is MSZIP at level 6.
    pub fn compression(mut self, ctype: CompressionType) -> CabSetBuilder {
        self.compression = ctype;
        self
    }

    /// Replaces the filesystem with a custom file source.
    pub fn source(mut self, source: Box<dyn FileSource>) -> CabSetBuilder {
        self.source = Some(source);
        self
    }

    /// Registers the factory that supplies a block compressor for LZX
    /// folders.  Without one, opening an LZX folder fails.
    pub fn lzx_compressor<F>(mut self, factory: F) -> CabSetBuilder
    where
        F: FnMut(u16) -> Box<dyn BlockCompressor> + 'static,
    {
        self.lzx_factory = Some(Box::new(factory));
        self
    }

    /// The smallest volume limit this configuration can honor: the
    /// largest possible header (reserve area and neighbor names
    /// included) and folder row, plus one maximal data block.
    fn min_feasible_limit(&self) -> u64 {
        let name = Path::new(&self.pattern)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.pattern.clone());
        let label = self.label.clone().unwrap_or_default();
        let widest =
            |pattern: &str| substitute_index(pattern, u32::MAX).len() as u64 + 1;
        let names = 2 * (widest(&name) + widest(&label));
        consts::HEADER_FIXED_SIZE
            + 4
            + self.reserve_size as u64
            + names
            + consts::FOLDER_ENTRY_SIZE
            + consts::DATA_BLOCK_HEADER_SIZE
            + consts::MAX_LZX_BLOCK_SIZE as u64
    }

    /// Validates the configuration and opens the set's first volume.
    pub fn create(self) -> Result<CabSetWriter> {
        if self.limit < consts::MIN_VOLUME_LIMIT {
            config_err!(
                "volume limit must be at least {} bytes (got {})",
                consts::MIN_VOLUME_LIMIT,
                self.limit
            );
        }
        let min_feasible = self.min_feasible_limit();
        if self.limit < min_feasible {
            config_err!(
                "volume limit of {} bytes cannot hold a header with {} \
                 reserved bytes plus one data block (need {})",
                self.limit,
                self.reserve_size,
                min_feasible
            );
        }
        if self.reserve_size > consts::MAX_HEADER_RESERVE_SIZE {
            config_err!(
                "header reserve area is too large ({} bytes; max is {})",
                self.reserve_size,
                consts::MAX_HEADER_RESERVE_SIZE
            );
        }
        self.compression.validate()?;
        let set_id = self
            .set_id
            .unwrap_or_else(|| rand::thread_rng().gen_range(1..=u16::MAX));
        let source =
            self.source.unwrap_or_else(|| Box::new(DiskSource));
        let pipeline = Pipeline::new(
            source,
            self.lzx_factory,
            self.pattern,
            self.label,
            self.limit,
            self.reserve_size as u16,
            set_id,
        );
        Ok(CabSetWriter {
            pipeline,
            default_compression: self.compression,
            names: BTreeMap::new(),
            finished: false,
        })
    }
}

// ========================================================================= //

/// A structure for writing files into a new cabinet set.
///
/// Files are grouped into folders (compression units) in the order the
/// `add_folder`/`add_file` calls arrive; bytes may be written to disk
/// synchronously from any call once a volume's size budget fills up.
pub struct CabSetWriter {
    pipeline: Pipeline,
    default_compression: CompressionType,
    /// Normalized (lowercased) item names already added, with add
    /// counts; queried by `contains`.
    names: BTreeMap<String, u32>,
    finished: bool,
}

impl CabSetWriter {
    /// Opens a new folder compressed with the given scheme.  A
    /// previously open folder is flushed first.
    pub fn add_folder(&mut self, ctype: CompressionType) -> Result<()> {
        self.pipeline.add_folder(ctype)
    }

    /// Opens a new folder with the set's default compression scheme.
    pub fn new_folder(&mut self) -> Result<()> {
        self.add_folder(self.default_compression)
    }

    /// Queues the file at `path` for the current folder, stored under
    /// `name` (normalized per the cabinet naming rules).  Items whose
    /// encoded name exceeds 255 bytes are skipped with a warning, as are
    /// items whose source turns out to be unreadable.
    pub fn add_file<P: AsRef<Path>>(
        &mut self,
        name: &str,
        path: P,
    ) -> Result<()> {
        let name = string::archive_name(name, &NameStrip::None);
        if !string::name_fits_entry(&name) {
            log::warn!(
                "skipping {:?}: encoded name is longer than {} bytes",
                name,
                consts::MAX_STRING_SIZE
            );
            return Ok(());
        }
        let mut attributes = 0;
        if !string::name_is_dos_encodable(&name) {
            attributes |= consts::ATTR_NAME_IS_UTF;
        }
        let key = name.to_ascii_lowercase();
        if self.names.contains_key(&key) {
            log::warn!("{:?} is already archived; adding it again", name);
        }
        self.pipeline.add_file(
            name,
            path.as_ref().to_path_buf(),
            attributes,
        )?;
        *self.names.entry(key).or_insert(0) += 1;
        Ok(())
    }

    /// Returns true when an item matching `pattern` (case-insensitive,
    /// `*`/`?` wildcards allowed) has been added to the set.
    pub fn contains(&self, pattern: &str) -> bool {
        let normalized = string::archive_name(pattern, &NameStrip::None)
            .to_ascii_lowercase();
        if self.names.contains_key(&normalized) {
            return true;
        }
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        match Pattern::new(&normalized.replace('\\', "/")) {
            Ok(pattern) => self.names.keys().any(|name| {
                pattern.matches_with(&name.replace('\\', "/"), options)
            }),
            Err(_) => false,
        }
    }

    /// Running totals for the set so far.
    pub fn stats(&self) -> ArchiveStats {
        self.pipeline.stats()
    }

    /// Flushes the last folder, writes the final volume, and returns the
    /// set's totals.
    pub fn finish(mut self) -> Result<ArchiveStats> {
        self.finish_internal()?;
        Ok(self.pipeline.stats())
    }

    fn finish_internal(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.pipeline.finish()
    }
}

impl Drop for CabSetWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.finish_internal();
        }
    }
}

// ========================================================================= //
