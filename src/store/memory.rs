//! Page-granular backing memory for the store host
//!
//! Storage only ever grows, one 64 KiB page at a time. Reads and writes must
//! stay inside the allocated pages; growing is the caller's job.

use crate::store::error::{StoreError, StoreResult};
use crate::store::types::PAGE_SIZE;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub trait PageMemory: Send {
    /// Allocated pages
    fn page_count(&self) -> u64;

    /// Add `pages` zeroed pages. Returns the previous page count.
    fn grow(&mut self, pages: u64) -> StoreResult<u64>;

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> StoreResult<()>;

    fn write(&mut self, offset: u64, data: &[u8]) -> StoreResult<()>;

    /// Flush to durable storage, if any
    fn flush(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn size(&self) -> u64 {
        self.page_count() * PAGE_SIZE
    }

    fn check_range(&self, offset: u64, length: u64) -> StoreResult<()> {
        let size = self.size();
        match offset.checked_add(length) {
            Some(end) if end <= size => Ok(()),
            _ => Err(StoreError::OutOfBounds {
                offset,
                length,
                size,
            }),
        }
    }
}

impl<T: PageMemory + ?Sized> PageMemory for Box<T> {
    fn page_count(&self) -> u64 {
        (**self).page_count()
    }

    fn grow(&mut self, pages: u64) -> StoreResult<u64> {
        (**self).grow(pages)
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> StoreResult<()> {
        (**self).read(offset, buf)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> StoreResult<()> {
        (**self).write(offset, data)
    }

    fn flush(&mut self) -> StoreResult<()> {
        (**self).flush()
    }
}

fn check_capacity(current: u64, additional: u64, max_pages: Option<u64>) -> StoreResult<u64> {
    let requested = current.saturating_add(additional);
    match max_pages {
        Some(limit) if requested > limit => {
            Err(StoreError::CapacityExceeded { requested, limit })
        }
        _ => Ok(requested),
    }
}

/// Heap-backed pages
#[derive(Debug, Default)]
pub struct InMemoryPages {
    bytes: Vec<u8>,
    max_pages: Option<u64>,
}

impl InMemoryPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pages(max_pages: u64) -> Self {
        Self {
            bytes: Vec::new(),
            max_pages: Some(max_pages),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PageMemory for InMemoryPages {
    fn page_count(&self) -> u64 {
        self.bytes.len() as u64 / PAGE_SIZE
    }

    fn grow(&mut self, pages: u64) -> StoreResult<u64> {
        let previous = self.page_count();
        let total = check_capacity(previous, pages, self.max_pages)?;
        self.bytes.resize((total * PAGE_SIZE) as usize, 0);
        Ok(previous)
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> StoreResult<()> {
        self.check_range(offset, buf.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> StoreResult<()> {
        self.check_range(offset, data.len() as u64)?;
        let start = offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// File-backed pages. The file is always a whole number of pages long.
#[derive(Debug)]
pub struct FilePages {
    path: PathBuf,
    file: File,
    pages: u64,
    max_pages: Option<u64>,
}

impl FilePages {
    /// Open or create the backing file, padding a partial last page with zeros
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with(path, true)
    }

    /// Like [`FilePages::open`], but a missing file is an error and nothing is created
    pub fn open_existing(path: &Path) -> StoreResult<Self> {
        Self::open_with(path, false)
    }

    fn open_with(path: &Path, create: bool) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        let pages = crate::store::types::pages_for(len);
        if pages * PAGE_SIZE != len {
            tracing::debug!(
                "Padding {} from {} to {} bytes",
                path.display(),
                len,
                pages * PAGE_SIZE
            );
            file.set_len(pages * PAGE_SIZE)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            pages,
            max_pages: None,
        })
    }

    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageMemory for FilePages {
    fn page_count(&self) -> u64 {
        self.pages
    }

    fn grow(&mut self, pages: u64) -> StoreResult<u64> {
        let previous = self.pages;
        let total = check_capacity(previous, pages, self.max_pages)?;
        self.file.set_len(total * PAGE_SIZE)?;
        self.pages = total;
        Ok(previous)
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> StoreResult<()> {
        self.check_range(offset, buf.len() as u64)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> StoreResult<()> {
        self.check_range(offset, data.len() as u64)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> StoreResult<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
