//! # gmad-rs - GMA Addon Archive Codec
//!
//! `gmad-rs` reads, creates and mutates GMA addon archives: a flat,
//! sequential container of lowercase slash-separated paths, a JSON-carried
//! metadata block and a trailing whole-file CRC-32.
//!
//! - **Full round-trip**: parse any version-3 archive, rewrite it crash-safely
//! - **Path policy**: a wildcard whitelist gates what can live in an addon,
//!   with an explicit per-addon override
//! - **Realize-on-touch**: archive-resident entries stream from the open
//!   handle until first edit, then spill to temp-file backing
//! - **Export/pull**: hand a member out to the local filesystem and pull its
//!   edits back in
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gmad_rs::{Session, Result};
//!
//! # fn main() -> Result<()> {
//! // Create a new archive - the .gma extension is appended when missing
//! let mut session = Session::new("my-addon")?;
//!
//! session.set_title("My Addon")?;
//! session.set_addon_type("model")?;
//! session.add_file("models/props/crate.mdl", b"...".to_vec())?;
//!
//! // Crash-safe: serialized to a sibling temp file first
//! session.save()?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading an existing archive
//!
//! ```rust,no_run
//! use gmad_rs::{Session, Result};
//!
//! # fn main() -> Result<()> {
//! let session = Session::load("existing.gma", true, false)?;
//! for entry in session.list_files()? {
//!     println!("{} ({} bytes, crc {:08x})", entry.path, entry.size, entry.crc);
//! }
//! # Ok(())
//! # }
//! ```

pub mod addon;
pub mod checksum;
pub mod error;
pub mod io;
pub mod metadata;
pub mod reader;
pub mod session;
pub mod whitelist;
pub mod writer;

pub use crate::addon::{sweep_stale_backing, Addon, ContentFile};
pub use crate::error::{GmadError, Result};
pub use crate::io::SharedFile;
pub use crate::metadata::AddonJson;
pub use crate::reader::{ArchiveSource, IndexEntry, Reader};
pub use crate::session::{FileListing, FileWatch, Session};
pub use crate::whitelist::PolicyMode;

/// Leading magic bytes of every archive.
pub const MAGIC: [u8; 4] = *b"GMAD";

/// The only format version this crate writes, and the newest it reads.
pub const FORMAT_VERSION: u8 = 3;

/// Extension appended to archive paths created without one.
pub const DEFAULT_EXTENSION: &str = "gma";
