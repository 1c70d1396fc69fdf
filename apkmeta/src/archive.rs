use crate::error::{Error, Result};
use memmap::Mmap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

/// Upper bound for the buffer reserved up front from a declared entry size.
const PREALLOC_LIMIT: u64 = 16 * 1024 * 1024;

/// A read-only memory mapping of an archive file.
pub struct Mapped(Mmap);

impl AsRef<[u8]> for Mapped {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
}

/// An APK (zip) container. Entries are decompressed one at a time, on demand.
pub struct Archive<R: Read + Seek = Cursor<Mapped>> {
    zip: ZipArchive<R>,
    size: u64,
}

impl Archive {
    /// Map the file at `path` and read its central directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Archive> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // the mapping is read-only and owned by the returned archive
        let mmap = unsafe { Mmap::map(&file)? };
        debug!("mapped {} ({} bytes)", path.display(), mmap.len());
        Archive::new(Cursor::new(Mapped(mmap)))
    }
}

impl<R: Read + Seek> Archive<R> {
    pub fn new(mut reader: R) -> Result<Archive<R>> {
        let size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let zip = ZipArchive::new(reader)?;
        Ok(Archive { zip, size })
    }

    /// Total size of the archive in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    pub fn contains(&mut self, name: &str) -> bool {
        self.zip.by_name(name).is_ok()
    }

    /// Decompress a single entry.
    ///
    /// The entry must decompress to exactly the size its directory record
    /// declares; anything else is reported as `InvalidData`.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self.zip.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => Error::not_found(format!("archive entry {}", name)),
            e => Error::from(e),
        })?;
        let declared = entry.size();
        let mut buf = Vec::with_capacity(declared.min(PREALLOC_LIMIT) as usize);
        // one byte past the declared size is enough to detect an overrun
        entry
            .take(declared.saturating_add(1))
            .read_to_end(&mut buf)?;
        if buf.len() as u64 != declared {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "archive entry {} holds {} bytes, directory declares {}",
                    name,
                    buf.len(),
                    declared
                ),
            )));
        }
        Ok(buf)
    }

    /// Every entry, in central directory order.
    pub fn entries(&mut self) -> Result<Vec<EntryInfo>> {
        let mut entries = Vec::with_capacity(self.zip.len());
        for i in 0..self.zip.len() {
            let entry = self.zip.by_index(i)?;
            entries.push(EntryInfo {
                name: entry.name().to_owned(),
                size: entry.size(),
                compressed_size: entry.compressed_size(),
            });
        }
        Ok(entries)
    }
}
