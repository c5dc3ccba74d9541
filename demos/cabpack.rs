//! A small cabarc-style front end for the library: packs files (and,
//! optionally, directory trees) into a cabinet set.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use cabpack::{archive_name, CabSetBuilder, CompressionType, NameStrip};

#[derive(Parser)]
#[command(name = "cabpack", about = "Creates Windows cabinet sets")]
struct Args {
    /// Compression selector: none | mszip[:1..9] | lzx:15..21
    #[arg(short = 'm', long = "method", default_value = "mszip")]
    method: String,

    /// Per-volume size cap in bytes; use # in the cabinet name to get
    /// numbered volumes
    #[arg(short = 'd', long = "limit")]
    limit: Option<u64>,

    /// Bytes to reserve in each volume header (max 60000)
    #[arg(short = 's', long = "reserve", default_value_t = 0)]
    reserve: usize,

    /// Disk label pattern; # becomes the volume index
    #[arg(short = 'l', long = "label")]
    label: Option<String>,

    /// Strip this prefix from item names; * keeps only the basename
    #[arg(short = 'P', long = "strip")]
    strip: Option<String>,

    /// Descend into directories recursively
    #[arg(short = 'r', long = "recursive")]
    recursive: bool,

    /// Output cabinet name (pattern)
    cabinet: String,

    /// Files or directories to add; a lone + starts a new folder
    files: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let ctype: CompressionType = args.method.parse()?;
    let strip = match args.strip.as_deref() {
        None => NameStrip::None,
        Some("*") => NameStrip::Basename,
        Some(prefix) => NameStrip::Prefix(prefix.to_string()),
    };

    let mut builder =
        CabSetBuilder::new(args.cabinet.as_str()).compression(ctype);
    if let Some(limit) = args.limit {
        builder = builder.volume_limit(limit);
    }
    if let Some(label) = &args.label {
        builder = builder.disk_label(label.clone());
    }
    builder = builder.reserve_size(args.reserve);
    let mut writer = builder.create()?;
    writer.new_folder()?;

    for arg in &args.files {
        if arg == "+" {
            writer.new_folder()?;
            continue;
        }
        let path = PathBuf::from(arg);
        if path.is_dir() {
            if args.recursive {
                for entry in walkdir::WalkDir::new(&path) {
                    let entry = entry?;
                    if entry.file_type().is_file() {
                        let name = archive_name(
                            &entry.path().to_string_lossy(),
                            &strip,
                        );
                        writer.add_file(&name, entry.path())?;
                    }
                }
            } else {
                for entry in std::fs::read_dir(&path)? {
                    let child = entry?.path();
                    if child.is_file() {
                        let name =
                            archive_name(&child.to_string_lossy(), &strip);
                        writer.add_file(&name, &child)?;
                    }
                }
            }
        } else {
            writer.add_file(&archive_name(arg, &strip), &path)?;
        }
    }

    let stats = writer.finish().context("flushing the cabinet set")?;
    println!(
        "{} bytes read from {} file(s); \
         {} bytes written in {} volume(s), ratio {:.3}:1",
        stats.bytes_read,
        stats.files_added,
        stats.bytes_written,
        stats.volumes,
        stats.compression_ratio(),
    );
    Ok(())
}
