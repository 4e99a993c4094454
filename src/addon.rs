//! In-memory addon model
//!
//! An [`Addon`] is the mutable collection of content entries plus metadata.
//! Every insertion passes the whitelist gate; paths are normalized to
//! lower-case and unique within one addon.
//!
//! Each [`ContentFile`] is backed either by the archive it was parsed from
//! (bytes fetched on demand through an [`ArchiveSource`]) or by a standalone
//! temp file holding not-yet-saved content. Saving rebinds standalone
//! entries to the freshly written archive without destroying them.

use crate::error::{GmadError, Result};
use crate::reader::{ArchiveSource, IndexEntry, Reader};
use crate::whitelist::{self, PolicyMode};
use crate::{checksum, FORMAT_VERSION};
use chrono::{DateTime, Local};
use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tracing::warn;

/// Temp-file naming convention for standalone content backing.
const BACKING_PREFIX: &str = "gmad-";
const BACKING_SUFFIX: &str = ".tmp";

/// Owned temp file holding one unsaved entry's bytes.
///
/// The file is deleted when the backing is dropped (entry removed or rebound
/// to archive-resident storage). Stray files from crashed processes are
/// handled by [`sweep_stale_backing`], never treated as fatal.
struct StandaloneBacking {
    file: tempfile::NamedTempFile,
}

impl StandaloneBacking {
    fn create(content: &[u8]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(BACKING_PREFIX)
            .suffix(BACKING_SUFFIX)
            .tempfile()?;
        file.write_all(content)?;
        file.flush()?;
        Ok(StandaloneBacking { file })
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.as_file().metadata()?.len())
    }

    fn read(&self) -> Result<Vec<u8>> {
        let mut handle = self.file.as_file();
        handle.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        handle.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn overwrite(&mut self, content: &[u8]) -> Result<()> {
        let handle = self.file.as_file_mut();
        handle.seek(SeekFrom::Start(0))?;
        handle.write_all(content)?;
        handle.set_len(content.len() as u64)?;
        handle.flush()?;
        Ok(())
    }
}

/// Backing files untouched for this long are considered abandoned.
const BACKING_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Best-effort removal of stale standalone-backing temp files left behind by
/// earlier processes. Explicit call, intended for collaborator startup; a
/// file that cannot be removed is only worth a warning.
pub fn sweep_stale_backing() {
    sweep_dir(&std::env::temp_dir(), BACKING_STALE_AFTER);
}

fn sweep_dir(dir: &Path, max_age: Duration) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("could not sweep {}: {}", dir.display(), err);
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(BACKING_PREFIX) || !name.ends_with(BACKING_SUFFIX) {
            continue;
        }

        // A live session keeps its backing recent; age decides staleness, so
        // another process's working files are left alone.
        let age = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|mtime| mtime.elapsed().ok());
        if age.map_or(false, |age| age >= max_age) {
            if let Err(err) = std::fs::remove_file(entry.path()) {
                warn!("could not remove stale backing {}: {}", name, err);
            }
        }
    }
}

/// Where a content entry's bytes live.
enum ContentSource {
    /// Bytes live in the archive; fetched through the reader by ordinal.
    ArchiveResident {
        source: Rc<RefCell<dyn ArchiveSource>>,
        ordinal: u32,
    },
    /// Bytes live in an owned temp file, not yet written to any archive.
    Standalone(StandaloneBacking),
}

/// One file entry in an addon.
pub struct ContentFile {
    path: String,
    source: ContentSource,
}

impl ContentFile {
    /// Entry backed by an already-parsed archive.
    pub fn from_source(source: Rc<RefCell<dyn ArchiveSource>>, entry: &IndexEntry) -> Self {
        ContentFile {
            path: entry.path.clone(),
            source: ContentSource::ArchiveResident {
                source,
                ordinal: entry.ordinal,
            },
        }
    }

    /// Entry backed by a fresh standalone buffer.
    pub fn new(path: &str, content: &[u8]) -> Result<Self> {
        Ok(ContentFile {
            path: path.to_string(),
            source: ContentSource::Standalone(StandaloneBacking::create(content)?),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_archive_resident(&self) -> bool {
        matches!(self.source, ContentSource::ArchiveResident { .. })
    }

    fn resident_entry(&self) -> Result<Option<IndexEntry>> {
        match &self.source {
            ContentSource::ArchiveResident { source, ordinal } => {
                Ok(source.borrow().entry(*ordinal))
            }
            ContentSource::Standalone(_) => Ok(None),
        }
    }

    /// Size of the content in bytes.
    pub fn size(&self) -> Result<u64> {
        match &self.source {
            ContentSource::ArchiveResident { .. } => self
                .resident_entry()?
                .map(|entry| entry.size)
                .ok_or_else(|| GmadError::NotFound(self.path.clone())),
            ContentSource::Standalone(backing) => backing.len(),
        }
    }

    /// CRC-32 of the content.
    pub fn crc(&self) -> Result<u32> {
        match &self.source {
            ContentSource::ArchiveResident { .. } => self
                .resident_entry()?
                .map(|entry| entry.crc)
                .ok_or_else(|| GmadError::NotFound(self.path.clone())),
            ContentSource::Standalone(backing) => Ok(checksum::crc32(&backing.read()?)),
        }
    }

    /// Full content bytes.
    pub fn content(&self) -> Result<Vec<u8>> {
        match &self.source {
            ContentSource::ArchiveResident { source, ordinal } => {
                source.borrow_mut().read_file(*ordinal)
            }
            ContentSource::Standalone(backing) => backing.read(),
        }
    }

    /// Replace the content bytes.
    ///
    /// An archive-resident entry converts to standalone backing, since the
    /// archive itself only changes on save.
    pub fn set_content(&mut self, content: &[u8]) -> Result<()> {
        match &mut self.source {
            ContentSource::ArchiveResident { .. } => {
                self.source = ContentSource::Standalone(StandaloneBacking::create(content)?);
                Ok(())
            }
            ContentSource::Standalone(backing) => backing.overwrite(content),
        }
    }

    /// Switch this entry to archive-resident storage after a save.
    ///
    /// Replaces the payload in place: the entry keeps its position in the
    /// owning list, a standalone temp file is released on the spot.
    pub fn rebind(&mut self, source: Rc<RefCell<dyn ArchiveSource>>, ordinal: u32) {
        self.source = ContentSource::ArchiveResident { source, ordinal };
    }
}

/// The mutable in-memory addon: metadata plus ordered content entries.
pub struct Addon {
    pub title: String,
    pub description: String,
    pub addon_type: String,
    pub tags: Vec<String>,
    /// Glob patterns from the addon's own metadata excluding files from
    /// being added.
    pub ignores: Vec<String>,
    files: Vec<ContentFile>,
    format_version: u8,
    timestamp: DateTime<Local>,
    policy_mode: PolicyMode,
}

impl Addon {
    /// Empty addon stamped with the current time and the writer's format
    /// version.
    pub fn new() -> Self {
        Addon {
            title: String::new(),
            description: String::new(),
            addon_type: String::new(),
            tags: Vec::new(),
            ignores: Vec::new(),
            files: Vec::new(),
            format_version: FORMAT_VERSION,
            timestamp: Local::now(),
            policy_mode: PolicyMode::Enforced,
        }
    }

    /// Addon populated from project metadata (`addon.json`).
    pub fn from_metadata(json: &crate::metadata::AddonJson) -> Self {
        let mut addon = Addon::new();
        addon.title = json.title.clone();
        addon.description = json.description.clone();
        addon.addon_type = json.addon_type.clone();
        addon.tags = json.tags.clone();
        addon.ignores = json.ignore.clone();
        addon
    }

    /// Build an addon from a parsed archive, each entry lazily backed by the
    /// reader.
    ///
    /// Unless `lenient`, every indexed path runs through the whitelist gate;
    /// the first failure aborts construction with that path's error. Lenient
    /// mode exists for read-only inspection of non-conforming archives.
    pub fn from_reader<S: Read + Seek + 'static>(
        reader: &Rc<RefCell<Reader<S>>>,
        lenient: bool,
    ) -> Result<Self> {
        let mut addon = Addon::new();

        {
            let parsed = reader.borrow();
            addon.title = parsed.name().to_string();
            addon.description = parsed.description().to_string();
            addon.addon_type = parsed.addon_type().to_string();
            addon.tags = parsed.tags().to_vec();
            addon.format_version = parsed.format_version();
            addon.timestamp = parsed.timestamp();
        }

        let index: Vec<IndexEntry> = reader.borrow().index().to_vec();
        for entry in &index {
            if !lenient {
                addon.check_restrictions(&entry.path)?;
            }

            let source: Rc<RefCell<dyn ArchiveSource>> = reader.clone();
            addon.files.push(ContentFile::from_source(source, entry));
        }

        Ok(addon)
    }

    pub fn format_version(&self) -> u8 {
        self.format_version
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn files(&self) -> &[ContentFile] {
        &self.files
    }

    pub fn policy_mode(&self) -> PolicyMode {
        self.policy_mode
    }

    /// Set whether the whitelist gate applies to this addon's insertions.
    pub fn set_policy_mode(&mut self, mode: PolicyMode) {
        self.policy_mode = mode;
    }

    /// Composite insertion gate: duplicate check, then the whitelist gate.
    ///
    /// The duplicate check compares exactly (paths are pre-normalized to
    /// lower-case) and is never bypassed by [`PolicyMode::Overridden`].
    pub fn check_restrictions(&self, path: &str) -> Result<()> {
        if self.files.iter().any(|file| file.path() == path) {
            return Err(GmadError::DuplicatePath(path.to_string()));
        }

        whitelist::check(path, &self.ignores, self.policy_mode)
    }

    /// Add a file with the given in-archive path and content.
    ///
    /// The path is normalized to lower-case first; a warning surfaces when
    /// that changes it.
    pub fn add_file(&mut self, path: &str, content: Vec<u8>) -> Result<()> {
        let normalized = path.to_lowercase();
        if normalized != path {
            warn!("{path}: filename contains capital letters, storing as {normalized}");
        }

        self.check_restrictions(&normalized)?;

        let file = ContentFile::new(&normalized, &content)?;
        self.files.push(file);
        Ok(())
    }

    /// Remove the entry at the given path.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        match self.files.iter().position(|file| file.path() == path) {
            Some(position) => {
                self.files.remove(position);
                Ok(())
            }
            None => Err(GmadError::NotFound(path.to_string())),
        }
    }

    /// Entry for the given path.
    pub fn get_file(&self, path: &str) -> Result<&ContentFile> {
        self.files
            .iter()
            .find(|file| file.path() == path)
            .ok_or_else(|| GmadError::NotFound(path.to_string()))
    }

    /// Mutable entry for the given path.
    pub fn get_file_mut(&mut self, path: &str) -> Result<&mut ContentFile> {
        self.files
            .iter_mut()
            .find(|file| file.path() == path)
            .ok_or_else(|| GmadError::NotFound(path.to_string()))
    }

    /// Sort entries by path, ascending byte-wise.
    ///
    /// Must run immediately before every save so on-disk ordinals are
    /// deterministic regardless of insertion history. Stable, so repeated
    /// sorts are no-ops.
    pub fn sort(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Rebind every entry to the given freshly parsed source, matched by
    /// path.
    ///
    /// Every entry must find its index entry; a mismatch would silently
    /// orphan an entry's backing, so it fails loudly instead.
    pub fn rebind_all(
        &mut self,
        source: &Rc<RefCell<dyn ArchiveSource>>,
        index: &[IndexEntry],
    ) -> Result<()> {
        if index.len() != self.files.len() {
            return Err(GmadError::RebindMismatch(format!(
                "index has {} entries, addon has {}",
                index.len(),
                self.files.len()
            )));
        }

        for entry in index {
            let file = self
                .files
                .iter_mut()
                .find(|file| file.path() == entry.path)
                .ok_or_else(|| GmadError::RebindMismatch(entry.path.clone()))?;

            file.rebind(source.clone(), entry.ordinal);
        }

        Ok(())
    }
}

impl Default for Addon {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get_file() {
        let mut addon = Addon::new();
        addon.add_file("lua/init.lua", b"return".to_vec()).unwrap();

        let file = addon.get_file("lua/init.lua").unwrap();
        assert_eq!(file.content().unwrap(), b"return");
        assert_eq!(file.size().unwrap(), 6);
        assert_eq!(file.crc().unwrap(), checksum::crc32(b"return"));
        assert!(!file.is_archive_resident());
    }

    #[test]
    fn test_add_file_normalizes_case() {
        let mut addon = Addon::new();
        addon.add_file("LUA/Init.LUA", b"x".to_vec()).unwrap();

        assert!(addon.get_file("lua/init.lua").is_ok());
        assert!(addon.get_file("LUA/Init.LUA").is_err());
    }

    #[test]
    fn test_duplicate_path_rejected_and_list_unchanged() {
        let mut addon = Addon::new();
        addon.add_file("lua/init.lua", b"a".to_vec()).unwrap();

        let result = addon.add_file("lua/init.lua", b"b".to_vec());
        assert!(matches!(result, Err(GmadError::DuplicatePath(_))));
        assert_eq!(addon.files().len(), 1);
        assert_eq!(addon.get_file("lua/init.lua").unwrap().content().unwrap(), b"a");
    }

    #[test]
    fn test_policy_gate() {
        let addon = Addon::new();
        assert!(matches!(
            addon.check_restrictions("../etc/passwd"),
            Err(GmadError::PathTraversal(_))
        ));
        assert!(matches!(
            addon.check_restrictions("addon.json"),
            Err(GmadError::ReservedName(_))
        ));
        assert!(addon.check_restrictions("lua/init.lua").is_ok());
        assert!(matches!(
            addon.check_restrictions("random/file.exe"),
            Err(GmadError::NotWhitelisted(_))
        ));
    }

    #[test]
    fn test_override_mode_skips_whitelist_not_duplicates() {
        let mut addon = Addon::new();
        addon.set_policy_mode(PolicyMode::Overridden);

        addon.add_file("random/file.exe", b"MZ".to_vec()).unwrap();
        let result = addon.add_file("random/file.exe", b"MZ".to_vec());
        assert!(matches!(result, Err(GmadError::DuplicatePath(_))));
    }

    #[test]
    fn test_ignore_patterns_apply() {
        let mut addon = Addon::new();
        addon.ignores = vec!["lua/secret/*".to_string()];

        let result = addon.add_file("lua/secret/api.lua", b"x".to_vec());
        assert!(matches!(result, Err(GmadError::Ignored(_))));
    }

    #[test]
    fn test_remove_file() {
        let mut addon = Addon::new();
        addon.add_file("lua/a.lua", b"a".to_vec()).unwrap();

        addon.remove_file("lua/a.lua").unwrap();
        assert!(addon.files().is_empty());
        assert!(matches!(
            addon.remove_file("lua/a.lua"),
            Err(GmadError::NotFound(_))
        ));
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut addon = Addon::new();
        addon.add_file("lua/c.lua", b"c".to_vec()).unwrap();
        addon.add_file("lua/a.lua", b"a".to_vec()).unwrap();
        addon.add_file("lua/b.lua", b"b".to_vec()).unwrap();

        addon.sort();
        let once: Vec<String> = addon.files().iter().map(|f| f.path().to_string()).collect();
        addon.sort();
        let twice: Vec<String> = addon.files().iter().map(|f| f.path().to_string()).collect();

        assert_eq!(once, vec!["lua/a.lua", "lua/b.lua", "lua/c.lua"]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_set_content_converts_to_standalone() {
        let mut addon = Addon::new();
        addon.add_file("lua/x.lua", b"old".to_vec()).unwrap();

        let file = addon.get_file_mut("lua/x.lua").unwrap();
        file.set_content(b"new content").unwrap();

        assert_eq!(file.content().unwrap(), b"new content");
        assert_eq!(file.size().unwrap(), 11);
    }

    #[test]
    fn test_sweep_only_removes_aged_backing() {
        let dir = tempfile::TempDir::new().unwrap();
        let fresh = dir.path().join("gmad-live.tmp");
        let unrelated = dir.path().join("unrelated.tmp");
        std::fs::write(&fresh, b"x").unwrap();
        std::fs::write(&unrelated, b"x").unwrap();

        // A just-written backing is younger than any real threshold.
        sweep_dir(dir.path(), Duration::from_secs(60 * 60));
        assert!(fresh.exists());
        assert!(unrelated.exists());

        // A zero threshold makes every backing stale; other files stay.
        sweep_dir(dir.path(), Duration::ZERO);
        assert!(!fresh.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_from_metadata() {
        let json = crate::metadata::AddonJson::from_str(
            r#"{"title":"T","description":"D","type":"tool","tags":["fun"],"ignore":["*.psd"]}"#,
        )
        .unwrap();

        let addon = Addon::from_metadata(&json);
        assert_eq!(addon.title, "T");
        assert_eq!(addon.ignores, vec!["*.psd"]);
        assert_eq!(addon.format_version(), FORMAT_VERSION);
    }
}
