//! Persistence orchestrator for one on-disk archive
//!
//! A [`Session`] owns the live file handle for its whole lifetime: an
//! exclusive advisory lock for read-write sessions, a shared lock for
//! read-only ones. Mutations flow through the owned [`Addon`] and flip the
//! dirty flag; [`Session::save`] serializes into a sibling temporary file
//! first, so an in-progress write can never corrupt the bytes that
//! archive-resident entries are still being read from.

use crate::addon::Addon;
use crate::error::{GmadError, Result};
use crate::io::SharedFile;
use crate::reader::{ArchiveSource, Reader};
use crate::whitelist::{self, PolicyMode};
use crate::{writer, DEFAULT_EXTENSION};
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Tracking record for a file exported to the local filesystem.
///
/// Change detection is a pull-style modification-time poll; there is no
/// event loop in the core.
pub struct FileWatch {
    file_path: PathBuf,
    content_path: String,
    baseline: SystemTime,
    modified: bool,
}

impl FileWatch {
    /// Path of the exported copy on the local filesystem.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Path of the linked entry inside the addon.
    pub fn content_path(&self) -> &str {
        &self.content_path
    }

    /// Whether the exported copy has outstanding edits.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Poll the filesystem; latches `modified` when the mtime moved past
    /// the baseline.
    fn poll(&mut self) -> bool {
        if let Ok(meta) = std::fs::metadata(&self.file_path) {
            if let Ok(mtime) = meta.modified() {
                if mtime > self.baseline {
                    self.modified = true;
                }
            }
        }
        self.modified
    }
}

/// Path + size + CRC of one archive member, for listing collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListing {
    pub path: String,
    pub size: u64,
    pub crc: u32,
}

/// An open on-disk archive plus its in-memory state.
pub struct Session {
    addon: Addon,
    stream: SharedFile,
    path: PathBuf,
    can_write: bool,
    modified: bool,
    reader: Option<Rc<RefCell<Reader<SharedFile>>>>,
    watches: Vec<FileWatch>,
}

impl Session {
    /// Open an existing archive.
    ///
    /// A read-write session takes an exclusive lock on the file, a
    /// read-only one a shared lock. On any open/parse/construction failure
    /// the handle is released before the error propagates.
    pub fn load<P: AsRef<Path>>(path: P, read_only: bool, lenient: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(GmadError::NotFound(path.display().to_string()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)?;
        let stream = SharedFile::new(file);
        // Dropping the handle on any early return below releases the lock.
        if read_only {
            stream.lock_shared()?;
        } else {
            stream.lock_exclusive()?;
        }

        let reader = Rc::new(RefCell::new(Reader::new(stream.clone())?));
        let addon = Addon::from_reader(&reader, lenient)?;

        info!(
            "opened archive {} ({}, {} files)",
            path.display(),
            if read_only { "read-only" } else { "read-write" },
            addon.files().len()
        );

        Ok(Session {
            addon,
            stream,
            path,
            can_write: !read_only,
            modified: false,
            reader: Some(reader),
            watches: Vec::new(),
        })
    }

    /// Create a new, empty archive on disk.
    ///
    /// Appends the `.gma` extension when missing and refuses to clobber an
    /// existing file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut path = path.as_ref().to_path_buf();
        if path.extension().map_or(true, |ext| ext != DEFAULT_EXTENSION) {
            path.set_extension(DEFAULT_EXTENSION);
        }

        if path.exists() {
            return Err(GmadError::AlreadyExists(path));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        let stream = SharedFile::new(file);
        stream.lock_exclusive()?;

        info!("created archive {}", path.display());

        Ok(Session {
            addon: Addon::new(),
            stream,
            path,
            can_write: true,
            modified: false,
            reader: None,
            watches: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn can_write(&self) -> bool {
        self.can_write
    }

    /// Whether in-memory state differs from the on-disk archive. Cleared
    /// only by a successful [`save`](Self::save).
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn addon(&self) -> &Addon {
        &self.addon
    }

    /// Thread the caller's whitelist-override decision into every policy
    /// check of this session.
    pub fn set_policy_mode(&mut self, mode: PolicyMode) {
        self.addon.set_policy_mode(mode);
    }

    fn require_writable(&self) -> Result<()> {
        if self.can_write {
            Ok(())
        } else {
            Err(GmadError::ReadOnly)
        }
    }

    /// Add a file with explicit in-archive path and content.
    pub fn add_file(&mut self, path: &str, content: Vec<u8>) -> Result<()> {
        self.require_writable()?;
        self.addon.add_file(path, content)?;
        self.modified = true;
        Ok(())
    }

    /// Add a file from the local filesystem, deriving its in-archive path
    /// from the whitelist's first matching substring.
    pub fn add_file_from_disk<P: AsRef<Path>>(&mut self, filename: P) -> Result<()> {
        self.require_writable()?;

        let filename = filename.as_ref();
        if !filename.exists() {
            return Err(GmadError::NotFound(filename.display().to_string()));
        }

        // Gate on the derived path before reading any bytes.
        let path = whitelist::best_match_substring(&filename.display().to_string())
            .unwrap_or_default();
        self.addon.check_restrictions(&path)?;

        let content = std::fs::read(filename)?;
        self.add_file(&path, content)
    }

    /// Remove a file from the addon.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        self.require_writable()?;
        self.addon.remove_file(path)?;
        self.modified = true;
        Ok(())
    }

    /// Set the addon title.
    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.require_writable()?;
        self.addon.title = title.to_string();
        self.modified = true;
        Ok(())
    }

    /// Set the addon description.
    pub fn set_description(&mut self, description: &str) -> Result<()> {
        self.require_writable()?;
        self.addon.description = description.to_string();
        self.modified = true;
        Ok(())
    }

    /// Set the addon type. Validated when the archive is written.
    pub fn set_addon_type(&mut self, addon_type: &str) -> Result<()> {
        self.require_writable()?;
        self.addon.addon_type = addon_type.to_string();
        self.modified = true;
        Ok(())
    }

    /// Set the addon tags. Validated when the archive is written.
    pub fn set_tags(&mut self, tags: Vec<String>) -> Result<()> {
        self.require_writable()?;
        self.addon.tags = tags;
        self.modified = true;
        Ok(())
    }

    /// Enumerate members with path, size and CRC.
    pub fn list_files(&self) -> Result<Vec<FileListing>> {
        self.addon
            .files()
            .iter()
            .map(|file| {
                Ok(FileListing {
                    path: file.path().to_string(),
                    size: file.size()?,
                    crc: file.crc()?,
                })
            })
            .collect()
    }

    /// Enumerate every member's path and full content bytes, for search
    /// collaborators that filter by path or content patterns.
    pub fn read_all(&self) -> Result<Vec<(String, Vec<u8>)>> {
        self.addon
            .files()
            .iter()
            .map(|file| Ok((file.path().to_string(), file.content()?)))
            .collect()
    }

    /// Destination for an extract: explicit path, or current directory plus
    /// base name when omitted or lacking a directory component.
    fn resolve_destination(internal_path: &str, to: Option<&Path>) -> PathBuf {
        let fallback_name = |name: &str| {
            let base = name.rsplit('/').next().unwrap_or(name);
            PathBuf::from(base)
        };

        match to {
            None => fallback_name(internal_path),
            Some(to) => {
                if to.parent().map_or(true, |dir| dir.as_os_str().is_empty()) {
                    to.file_name().map(PathBuf::from).unwrap_or_else(|| fallback_name(internal_path))
                } else {
                    to.to_path_buf()
                }
            }
        }
    }

    /// Extract a member's bytes to a newly created file on disk.
    ///
    /// Returns the destination actually written.
    pub fn extract_file(&self, internal_path: &str, to: Option<&Path>) -> Result<PathBuf> {
        let destination = Self::resolve_destination(internal_path, to);

        let file = self.addon.get_file(internal_path)?;

        if destination.exists() {
            return Err(GmadError::AlreadyExists(destination));
        }

        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&destination)?;
        out.write_all(&file.content()?)?;
        out.flush()?;

        debug!("extracted {} to {}", internal_path, destination.display());
        Ok(destination)
    }

    /// Extract a member and register it as externally tracked, so later
    /// edits to the copy can be pulled back in.
    pub fn export_file(&mut self, internal_path: &str, to: Option<&Path>) -> Result<()> {
        if self
            .watches
            .iter()
            .any(|watch| watch.content_path == internal_path)
        {
            return Err(GmadError::AlreadyExported(internal_path.to_string()));
        }

        let destination = self.extract_file(internal_path, to)?;
        let baseline = std::fs::metadata(&destination)?.modified()?;

        self.watches.push(FileWatch {
            file_path: destination,
            content_path: internal_path.to_string(),
            baseline,
            modified: false,
        });

        Ok(())
    }

    /// Delete an export from disk and stop tracking it.
    pub fn drop_export(&mut self, internal_path: &str) -> Result<()> {
        let position = self
            .watches
            .iter()
            .position(|watch| watch.content_path == internal_path)
            .ok_or_else(|| GmadError::NotFound(internal_path.to_string()))?;

        let watch = self.watches.remove(position);
        std::fs::remove_file(&watch.file_path)?;
        Ok(())
    }

    /// Pull an exported copy's edits back into the addon entry.
    ///
    /// A watch whose entry no longer exists in the addon is dropped and
    /// reported as not found. An unmodified export is a no-op.
    pub fn pull(&mut self, internal_path: &str) -> Result<()> {
        self.require_writable()?;

        let position = self
            .watches
            .iter()
            .position(|watch| watch.content_path == internal_path)
            .ok_or_else(|| GmadError::NotFound(internal_path.to_string()))?;

        if !self.watches[position].poll() {
            return Ok(());
        }

        if self.addon.get_file(internal_path).is_err() {
            self.watches.remove(position);
            return Err(GmadError::NotFound(internal_path.to_string()));
        }

        let content = std::fs::read(&self.watches[position].file_path)?;
        self.addon.get_file_mut(internal_path)?.set_content(&content)?;

        let watch = &mut self.watches[position];
        watch.modified = false;
        if let Ok(mtime) = std::fs::metadata(&watch.file_path).and_then(|m| m.modified()) {
            watch.baseline = mtime;
        }

        self.modified = true;
        Ok(())
    }

    /// The registered export watches.
    pub fn watched_files(&self) -> &[FileWatch] {
        &self.watches
    }

    /// Whether a local path belongs to an export whose linked entry still
    /// exists in the addon.
    pub fn is_export_linked<P: AsRef<Path>>(&self, local_path: P) -> bool {
        self.watches
            .iter()
            .find(|watch| watch.file_path == local_path.as_ref())
            .map_or(false, |watch| self.addon.get_file(&watch.content_path).is_ok())
    }

    /// Whether any exported copy has outstanding edits to pull.
    pub fn has_pending_edits(&mut self) -> bool {
        self.watches.iter_mut().any(|watch| watch.poll())
    }

    /// Persist the in-memory state to disk, crash-safely.
    ///
    /// Serializes into a sibling temporary file first; only on full success
    /// are the bytes copied over the live stream (the live handle stays
    /// open, so this is truncate-then-copy rather than a rename). The
    /// archive is then re-parsed and every entry rebound to the new
    /// on-disk layout. A failure during serialization leaves the live file
    /// and the dirty flag untouched.
    pub fn save(&mut self) -> Result<()> {
        self.require_writable()?;

        // Sorting once up front keeps on-disk ordinals deterministic and
        // matches what rebind will see after the re-parse.
        self.addon.sort();

        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push("_create");
        let temp_path = PathBuf::from(temp_path);

        let result = (|| -> Result<File> {
            let mut temp = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            writer::create(&self.addon, &mut temp)?;
            Ok(temp)
        })();

        let mut temp = match result {
            Ok(temp) => temp,
            Err(err) => {
                // Live file and dirty flag untouched.
                if let Err(cleanup) = std::fs::remove_file(&temp_path) {
                    warn!("could not remove {}: {}", temp_path.display(), cleanup);
                }
                return Err(err);
            }
        };

        // Copy the finished archive over the live stream.
        temp.seek(SeekFrom::Start(0))?;
        self.stream.seek(SeekFrom::Start(0))?;
        self.stream.set_len(0)?;
        std::io::copy(&mut temp, &mut self.stream)?;
        self.stream.flush()?;
        self.stream.sync_all()?;
        drop(temp);

        if let Err(err) = std::fs::remove_file(&temp_path) {
            warn!("could not remove {}: {}", temp_path.display(), err);
        }

        self.modified = false;

        // Re-parse the live stream and rebind every entry to it.
        let reader = match &self.reader {
            Some(reader) => {
                reader.borrow_mut().reparse()?;
                reader.clone()
            }
            None => {
                let reader = Rc::new(RefCell::new(Reader::new(self.stream.clone())?));
                self.reader = Some(reader.clone());
                reader
            }
        };

        let index = reader.borrow().index().to_vec();
        let source: Rc<RefCell<dyn ArchiveSource>> = reader;
        self.addon.rebind_all(&source, &index)?;

        debug!("saved archive {}", self.path.display());
        Ok(())
    }

    /// Release the live file handle and every associated resource.
    ///
    /// Terminal: the session is consumed. Changes are NOT saved.
    pub fn close(mut self) -> Result<()> {
        self.watches.clear();
        self.stream.unlock()?;
        debug!("closed archive {}", self.path.display());
        Ok(())
    }
}
