//! Shared handle to the live archive file
//!
//! One `File` backs a whole session: the parser, every archive-resident
//! entry and the save path all read and write through the same OS handle so
//! the advisory lock taken at open time covers every access. The model is
//! single-threaded; interior mutability only serves to share the seek
//! position between the owners.

use crate::error::Result;
use fs2::FileExt;
use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;

/// Cloneable handle to the one live archive file.
#[derive(Clone)]
pub struct SharedFile {
    inner: Rc<RefCell<File>>,
}

impl SharedFile {
    pub fn new(file: File) -> Self {
        SharedFile {
            inner: Rc::new(RefCell::new(file)),
        }
    }

    /// Take an exclusive advisory lock for the handle's lifetime.
    pub fn lock_exclusive(&self) -> Result<()> {
        self.inner.borrow().lock_exclusive()?;
        Ok(())
    }

    /// Take a shared advisory lock for the handle's lifetime.
    pub fn lock_shared(&self) -> Result<()> {
        self.inner.borrow().lock_shared()?;
        Ok(())
    }

    /// Release the advisory lock. Dropping the last clone releases it too.
    pub fn unlock(&self) -> Result<()> {
        fs2::FileExt::unlock(&*self.inner.borrow())?;
        Ok(())
    }

    /// Current length of the underlying file in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.inner.borrow().metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate (or extend) the underlying file.
    pub fn set_len(&self, len: u64) -> Result<()> {
        self.inner.borrow().set_len(len)?;
        Ok(())
    }

    /// Flush file contents to stable storage.
    pub fn sync_all(&self) -> Result<()> {
        self.inner.borrow().sync_all()?;
        Ok(())
    }
}

impl Read for SharedFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.borrow_mut().read(buf)
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.borrow_mut().flush()
    }
}

impl Seek for SharedFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.borrow_mut().seek(pos)
    }
}
