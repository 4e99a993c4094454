//! CRC-32 checksums over byte buffers
//!
//! Every per-file CRC in the index and the trailing whole-archive CRC use the
//! bit-reflected CRC-32/ISO-HDLC variant (polynomial 0xEDB88320), the same
//! checksum PKZIP and gzip emit. Consumers compare these values against
//! format-conformant reference tools, so the variant is not negotiable.

use std::io::Write;

/// Compute the CRC-32/ISO-HDLC checksum of a byte buffer.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Writer adapter that feeds every written byte into a running CRC-32.
///
/// The archive writer wraps its output stream in this so the trailing
/// checksum can be produced without re-reading what was written.
pub struct HashingWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// CRC-32 of everything written so far.
    pub fn crc(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Unwrap back into the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
