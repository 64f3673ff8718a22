// Archive reader: memory-mapped zip containers behind the `Layer` read contract.
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use tracing::warn;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::core::error::{Error, ErrorKind};
use crate::core::layout::MANIFEST_PATH;
use crate::core::manifest::{Attributes, Manifest};

/// Read contract of one member of a resolution chain.
///
/// Implementations must be safe to query from many threads at once.
pub trait Layer: Send + Sync {
    fn origin(&self) -> &Path;

    fn has_entry(&self, path: &str) -> bool;

    /// Streams an entry into `out`; `Ok(None)` when the entry does not exist.
    fn copy_entry(&self, path: &str, out: &mut dyn Write) -> Result<Option<u64>, Error>;

    fn read_entry(&self, path: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut buf = Vec::new();
        Ok(self.copy_entry(path, &mut buf)?.map(|_| buf))
    }

    /// Parsed manifest; `None` when missing or malformed.
    fn manifest(&self) -> Option<&Manifest>;

    fn global_metadata(&self) -> Option<&Attributes> {
        self.manifest().map(Manifest::main_attributes)
    }

    fn scoped_metadata(&self, prefix: &str) -> Option<&Attributes> {
        self.manifest().and_then(|manifest| manifest.section(prefix))
    }
}

#[derive(Clone)]
enum ArchiveBytes {
    Mapped(Arc<Mmap>),
    Owned(Arc<[u8]>),
}

impl AsRef<[u8]> for ArchiveBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            ArchiveBytes::Mapped(mmap) => &mmap[..],
            ArchiveBytes::Owned(bytes) => &bytes[..],
        }
    }
}

pub struct Archive {
    origin: PathBuf,
    zip: ZipArchive<Cursor<ArchiveBytes>>,
    manifest: Option<Manifest>,
}

impl Archive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let origin = path.as_ref().to_path_buf();
        let file = File::open(&origin).map_err(|err| Error::from_io(err).with_path(&origin))?;
        // The mapping is read-only and the file is never written through this handle;
        // extraction replaces cache files by rename so live mappings keep their inode.
        let mmap = unsafe {
            Mmap::map(&file).map_err(|err| Error::from_io(err).with_path(&origin))?
        };
        Self::from_backing(origin, ArchiveBytes::Mapped(Arc::new(mmap)))
    }

    /// Opens an in-memory archive; `origin` is only used for locations and diagnostics.
    pub fn from_bytes(origin: impl Into<PathBuf>, bytes: impl Into<Arc<[u8]>>) -> Result<Self, Error> {
        Self::from_backing(origin.into(), ArchiveBytes::Owned(bytes.into()))
    }

    fn from_backing(origin: PathBuf, bytes: ArchiveBytes) -> Result<Self, Error> {
        let zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|err| zip_error(err).with_path(&origin))?;
        let manifest = load_manifest(&zip, &origin);
        Ok(Self {
            origin,
            zip,
            manifest,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.zip.len()
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.zip.file_names()
    }
}

impl Layer for Archive {
    fn origin(&self) -> &Path {
        &self.origin
    }

    fn has_entry(&self, path: &str) -> bool {
        self.zip.index_for_name(path).is_some()
    }

    fn copy_entry(&self, path: &str, out: &mut dyn Write) -> Result<Option<u64>, Error> {
        copy_from(self.zip.clone(), path, out)
            .map_err(|err| err.with_path(&self.origin).with_name(path))
    }

    fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("origin", &self.origin)
            .field("entries", &self.zip.len())
            .field("manifest", &self.manifest.is_some())
            .finish()
    }
}

// Each read works on its own clone of the index so concurrent readers never share a cursor.
fn copy_from(
    mut zip: ZipArchive<Cursor<ArchiveBytes>>,
    path: &str,
    out: &mut dyn Write,
) -> Result<Option<u64>, Error> {
    let mut file = match zip.by_name(path) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(zip_error(err)),
    };
    let copied = io::copy(&mut file, out).map_err(Error::from_io)?;
    Ok(Some(copied))
}

fn load_manifest(zip: &ZipArchive<Cursor<ArchiveBytes>>, origin: &Path) -> Option<Manifest> {
    let name = if zip.index_for_name(MANIFEST_PATH).is_some() {
        MANIFEST_PATH.to_string()
    } else {
        zip.file_names()
            .find(|name| name.eq_ignore_ascii_case(MANIFEST_PATH))?
            .to_string()
    };

    let mut bytes = Vec::new();
    match copy_from(zip.clone(), &name, &mut bytes) {
        Ok(Some(_)) => {}
        Ok(None) => return None,
        Err(err) => {
            warn!(archive = %origin.display(), error = %err, "manifest unreadable; treating as absent");
            return None;
        }
    }

    match Manifest::parse(&bytes) {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            warn!(archive = %origin.display(), error = %err, "manifest malformed; treating as absent");
            None
        }
    }
}

fn zip_error(err: ZipError) -> Error {
    match err {
        ZipError::Io(io_err) => Error::from_io(io_err),
        ZipError::FileNotFound => Error::new(ErrorKind::NotFound).with_message("entry not found"),
        other => Error::new(ErrorKind::Corrupt)
            .with_message("invalid zip container")
            .with_source(other),
    }
}
