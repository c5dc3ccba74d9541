use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::time::SystemTime;

/// Metadata a source reports for one file about to be archived.
#[derive(Clone, Debug, Default)]
pub struct SourceMetadata {
    /// Total payload size in bytes.
    pub size: u64,
    /// Last modification time, if the source knows one.
    pub mtime: Option<SystemTime>,
    /// DOS "read-only" attribute.
    pub read_only: bool,
    /// DOS "hidden" attribute.
    pub hidden: bool,
    /// DOS "system" attribute.
    pub system: bool,
    /// DOS "archive" (modified since last backup) attribute.
    pub archive: bool,
    /// "Execute after extraction" attribute.
    pub executable: bool,
}

/// An opened source file: its metadata plus a byte stream over its
/// contents.
pub struct SourceFile {
    /// The file's metadata, sampled at open time.
    pub metadata: SourceMetadata,
    /// The payload stream.
    pub reader: Box<dyn Read>,
}

/// Where the pipeline gets its input bytes from.
///
/// The pipeline opens at most one source file at a time, immediately
/// before that file's bytes enter the current folder's stream.  An open
/// failure makes the pipeline log a warning and skip the item.
pub trait FileSource {
    /// Opens the file at `path`, yielding its metadata and byte stream.
    fn open(&mut self, path: &Path) -> io::Result<SourceFile>;
}

/// The default source: the local filesystem.
pub struct DiskSource;

impl FileSource for DiskSource {
    fn open(&mut self, path: &Path) -> io::Result<SourceFile> {
        let file = fs::File::open(path)?;
        let metadata = file.metadata()?;
        let (hidden, system, archive) = dos_attribute_bits(&metadata);
        let source = SourceMetadata {
            size: metadata.len(),
            mtime: metadata.modified().ok(),
            read_only: metadata.permissions().readonly(),
            hidden,
            system,
            archive,
            executable: is_executable(&metadata),
        };
        Ok(SourceFile { metadata: source, reader: Box::new(file) })
    }
}

#[cfg(windows)]
fn dos_attribute_bits(metadata: &fs::Metadata) -> (bool, bool, bool) {
    use std::os::windows::fs::MetadataExt;
    let attrs = metadata.file_attributes();
    ((attrs & 0x2) != 0, (attrs & 0x4) != 0, (attrs & 0x20) != 0)
}

#[cfg(not(windows))]
fn dos_attribute_bits(_metadata: &fs::Metadata) -> (bool, bool, bool) {
    (false, false, true)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

// Windows file attributes have no execute bit.
#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
