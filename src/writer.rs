//! Binary serializer for the GMA container format
//!
//! Emits the canonical byte layout: header, metadata strings, file index,
//! concatenated raw content and the trailing whole-archive CRC-32. The
//! trailing checksum is produced by hashing every byte as it is written, so
//! nothing is re-read.

use crate::addon::Addon;
use crate::checksum::HashingWriter;
use crate::error::Result;
use crate::metadata;
use crate::{FORMAT_VERSION, MAGIC};
use chrono::Utc;
use std::io::{Seek, SeekFrom, Write};
use tracing::debug;

/// The format has no working author field; every writer emits this.
const AUTHOR_PLACEHOLDER: &str = "Author Name";

/// Addon version field, unused by the format.
const ADDON_VERSION: i32 = 1;

fn write_cstring<W: Write>(out: &mut W, value: &str) -> Result<()> {
    out.write_all(value.as_bytes())?;
    out.write_all(&[0])?;
    Ok(())
}

/// Serialize an addon into the given stream, from position 0.
///
/// Fails before writing any file content if the addon's type or tags do not
/// validate. Callers are expected to hand in a fresh (or truncatable)
/// stream; a caller that wants deterministic on-disk ordinals must sort the
/// addon first.
pub fn create<W: Write + Seek>(addon: &Addon, stream: &mut W) -> Result<()> {
    // Validate metadata up front so a bad type/tag never leaves a torn file.
    let description_json =
        metadata::encode_description(&addon.description, &addon.addon_type, &addon.tags)?;

    stream.seek(SeekFrom::Start(0))?;
    let mut out = HashingWriter::new(&mut *stream);

    out.write_all(&MAGIC)?;
    out.write_all(&[FORMAT_VERSION])?;
    out.write_all(&0u64.to_le_bytes())?; // creator id, unused
    out.write_all(&Utc::now().timestamp().to_le_bytes())?;
    out.write_all(&[0])?; // empty required-content list

    write_cstring(&mut out, &addon.title)?;
    write_cstring(&mut out, &description_json)?;
    write_cstring(&mut out, AUTHOR_PLACEHOLDER)?;
    out.write_all(&ADDON_VERSION.to_le_bytes())?;

    for (position, file) in addon.files().iter().enumerate() {
        let ordinal = (position + 1) as u32;
        let path = file.path().trim_start_matches('/').to_lowercase();

        out.write_all(&ordinal.to_le_bytes())?;
        write_cstring(&mut out, &path)?;
        out.write_all(&(file.size()? as i64).to_le_bytes())?;
        out.write_all(&file.crc()?.to_le_bytes())?;
    }
    out.write_all(&0u32.to_le_bytes())?; // index terminator

    // Raw content, back to back; boundaries come from the index sizes only
    for file in addon.files() {
        out.write_all(&file.content()?)?;
    }

    let crc = out.crc();
    let stream = out.into_inner();
    // Widened to 8 bytes on disk
    stream.write_all(&u64::from(crc).to_le_bytes())?;
    stream.flush()?;

    debug!(
        "wrote archive '{}' with {} files, trailing crc {:08x}",
        addon.title,
        addon.files().len(),
        crc
    );

    Ok(())
}
