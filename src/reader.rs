//! Binary parser for the GMA container format
//!
//! Parsing builds the file index (path, size, CRC, ordinal, offset) and the
//! decoded metadata without materializing any file content; content is
//! fetched on demand by ordinal. All integers are little-endian, all strings
//! NUL-terminated with no length prefix.

use crate::error::{GmadError, Result};
use crate::metadata;
use crate::{FORMAT_VERSION, MAGIC};
use chrono::{DateTime, Local};
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

/// One file's entry in the archive index.
///
/// `offset` is relative to the start of the content block, not the start of
/// the archive: the cumulative sum of the sizes of all preceding entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub path: String,
    pub size: u64,
    pub crc: u32,
    /// 1-based position in index order.
    pub ordinal: u32,
    pub offset: u64,
}

/// Anything archive-resident entries can fetch their bytes from.
///
/// Implemented by [`Reader`]; the trait seam keeps the in-memory model
/// independent of the concrete stream type.
pub trait ArchiveSource {
    /// Index entry for an ordinal, if present.
    fn entry(&self, ordinal: u32) -> Option<IndexEntry>;

    /// Full content bytes of the file at an ordinal.
    fn read_file(&mut self, ordinal: u32) -> Result<Vec<u8>>;
}

/// Parser over a seekable byte stream holding a compiled archive.
pub struct Reader<S> {
    stream: S,
    format_version: u8,
    name: String,
    description: String,
    addon_type: String,
    tags: Vec<String>,
    timestamp: DateTime<Local>,
    index: Vec<IndexEntry>,
    /// Absolute stream position where the content block starts.
    content_block: u64,
}

fn map_read_err(err: std::io::Error) -> GmadError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        GmadError::TruncatedStream(err)
    } else {
        GmadError::Io(err)
    }
}

fn read_exact<S: Read>(stream: &mut S, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf).map_err(map_read_err)
}

fn read_u8<S: Read>(stream: &mut S) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(stream, &mut buf)?;
    Ok(buf[0])
}

fn read_u32<S: Read>(stream: &mut S) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(stream, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<S: Read>(stream: &mut S) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact(stream, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_i64<S: Read>(stream: &mut S) -> Result<i64> {
    let mut buf = [0u8; 8];
    read_exact(stream, &mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_u64<S: Read>(stream: &mut S) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact(stream, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read bytes up to (and consuming) a NUL terminator.
fn read_cstring<S: Read>(stream: &mut S) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let byte = read_u8(stream)?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }

    String::from_utf8(bytes)
        .map_err(|err| GmadError::MalformedIndex(format!("invalid UTF-8 in string: {err}")))
}

impl<S: Read + Seek> Reader<S> {
    /// Parse the given stream into a new reader.
    pub fn new(stream: S) -> Result<Self> {
        let mut reader = Reader {
            stream,
            format_version: 0,
            name: String::new(),
            description: String::new(),
            addon_type: String::new(),
            tags: Vec::new(),
            timestamp: DateTime::UNIX_EPOCH.with_timezone(&Local),
            index: Vec::new(),
            content_block: 0,
        };
        reader.parse()?;
        Ok(reader)
    }

    fn parse(&mut self) -> Result<()> {
        let len = self.stream.seek(SeekFrom::End(0))?;
        if len == 0 {
            return Err(GmadError::EmptyStream);
        }
        self.stream.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        read_exact(&mut self.stream, &mut magic)?;
        if magic != MAGIC {
            return Err(GmadError::BadMagic);
        }

        self.format_version = read_u8(&mut self.stream)?;
        if self.format_version > FORMAT_VERSION {
            return Err(GmadError::UnsupportedVersion(self.format_version));
        }

        // Creator id, unused by every known writer
        read_u64(&mut self.stream)?;

        let unix_secs = read_i64(&mut self.stream)?;
        self.timestamp = DateTime::from_timestamp(unix_secs, 0)
            .unwrap_or(DateTime::UNIX_EPOCH)
            .with_timezone(&Local);

        // Legacy required-content list: consumed for stream position only
        if self.format_version > 1 {
            loop {
                let content = read_cstring(&mut self.stream)?;
                if content.is_empty() {
                    break;
                }
            }
        }

        self.name = read_cstring(&mut self.stream)?;
        let raw_description = read_cstring(&mut self.stream)?;
        // Author: the format always carries a constant placeholder
        read_cstring(&mut self.stream)?;
        // Addon version, unused
        read_i32(&mut self.stream)?;

        let mut ordinal = 1u32;
        let mut offset = 0u64;
        loop {
            if read_u32(&mut self.stream)? == 0 {
                break;
            }

            let path = read_cstring(&mut self.stream)?;
            let size = read_i64(&mut self.stream)?;
            let crc = read_u32(&mut self.stream)?;

            if size < 0 {
                return Err(GmadError::MalformedIndex(format!(
                    "{path}: negative size {size}"
                )));
            }

            self.index.push(IndexEntry {
                path,
                size: size as u64,
                crc,
                ordinal,
                offset,
            });

            offset += size as u64;
            ordinal += 1;
        }

        self.content_block = self.stream.stream_position()?;

        let (description, addon_type, tags) = metadata::decode_description(&raw_description);
        self.description = description;
        self.addon_type = addon_type;
        self.tags = tags;

        debug!(
            "parsed archive '{}': {} files, format version {}",
            self.name,
            self.index.len(),
            self.format_version
        );

        Ok(())
    }

    /// Re-run the parse against the same stream from position 0, replacing
    /// the index. Used after a save to rebind entries.
    pub fn reparse(&mut self) -> Result<()> {
        self.index.clear();
        self.tags.clear();
        self.parse()
    }

    pub fn format_version(&self) -> u8 {
        self.format_version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn addon_type(&self) -> &str {
        &self.addon_type
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    /// Index entry for the given 1-based ordinal.
    pub fn entry(&self, ordinal: u32) -> Option<&IndexEntry> {
        self.index.iter().find(|entry| entry.ordinal == ordinal)
    }

    /// Read the full content bytes of the file at the given ordinal.
    pub fn read_file(&mut self, ordinal: u32) -> Result<Vec<u8>> {
        let (offset, size) = match self.entry(ordinal) {
            Some(entry) => (entry.offset, entry.size),
            None => return Err(GmadError::NotFound(format!("file ordinal {ordinal}"))),
        };

        self.stream
            .seek(SeekFrom::Start(self.content_block + offset))?;

        let mut buf = vec![0u8; size as usize];
        read_exact(&mut self.stream, &mut buf)?;
        Ok(buf)
    }
}

impl<S: Read + Seek> ArchiveSource for Reader<S> {
    fn entry(&self, ordinal: u32) -> Option<IndexEntry> {
        Reader::entry(self, ordinal).cloned()
    }

    fn read_file(&mut self, ordinal: u32) -> Result<Vec<u8>> {
        Reader::read_file(self, ordinal)
    }
}
