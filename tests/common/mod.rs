//! Support code for the integration tests: a minimal parser for the
//! cabinet structures this crate writes, plus an MSZIP inflater so
//! round trips can be checked without an external extractor.
//!
//! Parsing asserts the structural invariants as it goes: the stored
//! cabinet size matches the file, every folder's record count matches
//! the records on disk, and every record checksum verifies.

#![allow(dead_code)]

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::{Decompress, FlushDecompress};

pub struct Volume {
    pub cb_cabinet: u32,
    pub coff_files: u32,
    pub flags: u16,
    pub set_id: u16,
    pub index: u16,
    pub reserve: Vec<u8>,
    pub prev: Option<(String, String)>,
    pub next: Option<(String, String)>,
    pub folders: Vec<Folder>,
    pub files: Vec<FileRow>,
}

pub struct Folder {
    pub first_block_offset: u32,
    pub num_blocks: u16,
    pub compression: u16,
    pub records: Vec<Record>,
}

pub struct FileRow {
    pub name: String,
    pub size: u32,
    pub folder_offset: u32,
    pub folder_index: u16,
    pub date: u16,
    pub time: u16,
    pub attributes: u16,
}

pub struct Record {
    pub checksum: u32,
    pub uncompressed_size: u16,
    pub data: Vec<u8>,
}

fn cab_checksum(buf: &[u8], seed: u32) -> u32 {
    let mut acc = u64::from(seed);
    let mut chunks = buf.chunks_exact(8);
    for chunk in &mut chunks {
        acc ^= u64::from_le_bytes(chunk.try_into().unwrap());
    }
    let mut rem = chunks.remainder();
    if rem.len() >= 4 {
        acc ^= u64::from(u32::from_le_bytes(rem[..4].try_into().unwrap()));
        rem = &rem[4..];
    }
    let mut shift = rem.len() as u32;
    for &byte in rem {
        shift -= 1;
        acc ^= u64::from(byte) << (shift * 8);
    }
    ((acc & 0xffff_ffff) ^ (acc >> 32)) as u32
}

fn read_cstr(reader: &mut &[u8]) -> String {
    let mut bytes = Vec::new();
    loop {
        let byte = reader.read_u8().unwrap();
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes).unwrap()
}

pub fn parse_volume(bytes: &[u8]) -> Volume {
    let mut r = bytes;
    assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 0x4643534d, "MSCF");
    let _reserved1 = r.read_u32::<LittleEndian>().unwrap();
    let cb_cabinet = r.read_u32::<LittleEndian>().unwrap();
    let _reserved2 = r.read_u32::<LittleEndian>().unwrap();
    let coff_files = r.read_u32::<LittleEndian>().unwrap();
    let _reserved3 = r.read_u32::<LittleEndian>().unwrap();
    assert_eq!(r.read_u8().unwrap(), 3, "version minor");
    assert_eq!(r.read_u8().unwrap(), 1, "version major");
    let num_folders = r.read_u16::<LittleEndian>().unwrap();
    let num_files = r.read_u16::<LittleEndian>().unwrap();
    let flags = r.read_u16::<LittleEndian>().unwrap();
    let set_id = r.read_u16::<LittleEndian>().unwrap();
    let index = r.read_u16::<LittleEndian>().unwrap();
    let mut reserve = Vec::new();
    if flags & 0x4 != 0 {
        let reserve_size = r.read_u16::<LittleEndian>().unwrap();
        let _folder_reserve = r.read_u8().unwrap();
        let _block_reserve = r.read_u8().unwrap();
        reserve = vec![0; reserve_size as usize];
        r.read_exact(&mut reserve).unwrap();
    }
    let prev = if flags & 0x1 != 0 {
        Some((read_cstr(&mut r), read_cstr(&mut r)))
    } else {
        None
    };
    let next = if flags & 0x2 != 0 {
        Some((read_cstr(&mut r), read_cstr(&mut r)))
    } else {
        None
    };

    let mut folders = Vec::new();
    for _ in 0..num_folders {
        folders.push(Folder {
            first_block_offset: r.read_u32::<LittleEndian>().unwrap(),
            num_blocks: r.read_u16::<LittleEndian>().unwrap(),
            compression: r.read_u16::<LittleEndian>().unwrap(),
            records: Vec::new(),
        });
    }

    let mut r = &bytes[coff_files as usize..];
    let mut files = Vec::new();
    for _ in 0..num_files {
        let size = r.read_u32::<LittleEndian>().unwrap();
        let folder_offset = r.read_u32::<LittleEndian>().unwrap();
        let folder_index = r.read_u16::<LittleEndian>().unwrap();
        let date = r.read_u16::<LittleEndian>().unwrap();
        let time = r.read_u16::<LittleEndian>().unwrap();
        let attributes = r.read_u16::<LittleEndian>().unwrap();
        let name = read_cstr(&mut r);
        files.push(FileRow {
            name,
            size,
            folder_offset,
            folder_index,
            date,
            time,
            attributes,
        });
    }

    assert_eq!(bytes.len(), cb_cabinet as usize, "cbCabinet");
    let ends: Vec<usize> = folders
        .iter()
        .skip(1)
        .map(|folder| folder.first_block_offset as usize)
        .chain(std::iter::once(cb_cabinet as usize))
        .collect();
    for (folder, end) in folders.iter_mut().zip(ends) {
        let mut r = &bytes[folder.first_block_offset as usize..end];
        while !r.is_empty() {
            let checksum = r.read_u32::<LittleEndian>().unwrap();
            let compressed_size = r.read_u16::<LittleEndian>().unwrap();
            let uncompressed_size = r.read_u16::<LittleEndian>().unwrap();
            let mut data = vec![0; compressed_size as usize];
            r.read_exact(&mut data).unwrap();
            let mut lengths = [0u8; 4];
            lengths[..2].copy_from_slice(&compressed_size.to_le_bytes());
            lengths[2..].copy_from_slice(&uncompressed_size.to_le_bytes());
            assert_eq!(
                checksum,
                cab_checksum(&lengths, cab_checksum(&data, 0)),
                "record checksum"
            );
            folder.records.push(Record {
                checksum,
                uncompressed_size,
                data,
            });
        }
        assert_eq!(
            folder.records.len(),
            folder.num_blocks as usize,
            "record count"
        );
    }

    Volume {
        cb_cabinet,
        coff_files,
        flags,
        set_id,
        index,
        reserve,
        prev,
        next,
        folders,
        files,
    }
}

// ========================================================================= //

/// An MSZIP inflater that carries the 32 KiB dictionary from block to
/// block, the way a conformant extractor does.
pub struct MsZipInflater {
    decompressor: Decompress,
    dictionary: Vec<u8>,
}

impl MsZipInflater {
    pub fn new() -> MsZipInflater {
        MsZipInflater {
            decompressor: Decompress::new(false),
            dictionary: Vec::new(),
        }
    }

    pub fn inflate_block(
        &mut self,
        data: &[u8],
        uncompressed_size: usize,
    ) -> Vec<u8> {
        assert_eq!(&data[..2], b"CK", "MSZIP signature");
        let data = &data[2..];
        self.decompressor.reset(false);
        if !self.dictionary.is_empty() {
            // Prime the dictionary with a fake stored sub-block.
            let length = self.dictionary.len() as u16;
            let mut chunk: Vec<u8> = vec![0];
            chunk.extend_from_slice(&length.to_le_bytes());
            chunk.extend_from_slice(&(!length).to_le_bytes());
            chunk.extend_from_slice(&self.dictionary);
            let mut out = Vec::with_capacity(self.dictionary.len());
            self.decompressor
                .decompress_vec(&chunk, &mut out, FlushDecompress::Sync)
                .unwrap();
        }
        let mut out = Vec::with_capacity(uncompressed_size);
        self.decompressor
            .decompress_vec(data, &mut out, FlushDecompress::Finish)
            .unwrap();
        assert_eq!(out.len(), uncompressed_size, "uncompressed size");
        if out.len() >= 0x8000 {
            self.dictionary = out[out.len() - 0x8000..].to_vec();
        } else {
            let total = self.dictionary.len() + out.len();
            if total > 0x8000 {
                self.dictionary.drain(..total - 0x8000);
            }
            self.dictionary.extend_from_slice(&out);
        }
        out
    }
}

/// Rebuilds a folder's uncompressed stream from its records, possibly
/// gathered across several volumes.  A record with a zero uncompressed
/// length is the head of a split block and is joined with the record
/// that follows it.
pub fn reassemble_folder(records: &[&Record], compression: u16) -> Vec<u8> {
    let mut inflater = MsZipInflater::new();
    let mut out = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    for record in records {
        if record.uncompressed_size == 0 {
            pending.extend_from_slice(&record.data);
            continue;
        }
        let mut payload = std::mem::take(&mut pending);
        payload.extend_from_slice(&record.data);
        let uncompressed_size = record.uncompressed_size as usize;
        match compression & 0xf {
            0 => {
                assert_eq!(payload.len(), uncompressed_size);
                out.extend_from_slice(&payload);
            }
            1 => out.extend_from_slice(
                &inflater.inflate_block(&payload, uncompressed_size),
            ),
            other => panic!("unsupported compression tag {}", other),
        }
    }
    assert!(pending.is_empty(), "split head without a continuation");
    out
}

/// The record streams of one logical folder that starts in
/// `volumes[first]` and continues through the leading folder of each
/// following volume.
pub fn folder_records<'a>(
    volumes: &'a [Volume],
    first_volume: usize,
    folder: usize,
) -> Vec<&'a Record> {
    let mut records: Vec<&Record> =
        volumes[first_volume].folders[folder].records.iter().collect();
    let mut volume = first_volume;
    while records.last().map_or(false, |record| {
        record.uncompressed_size == 0
    }) {
        volume += 1;
        records.extend(volumes[volume].folders[0].records.iter());
    }
    records
}
