//! Byte-stream proxies for positioned reads.
//!
//! The codec never touches files directly; it pulls bytes through an
//! [`IoProxy`], which may wrap a file on disk ([`IoFile`]) or a buffer
//! already in memory ([`IoMemReader`]). Proxies are shared between the
//! reader and its codec, so every method takes `&self`.
//!
//! # Usage
//!
//! ```rust
//! use exrin_io::stream::{IoMemReader, IoProxy, read_exact_at};
//!
//! let io = IoMemReader::new("mem.exr", vec![0x76, 0x2f, 0x31, 0x01, 2, 0, 0, 0]);
//! let mut version = [0u8; 4];
//! read_exact_at(&io, &mut version, 4).unwrap();
//! assert_eq!(version, [2, 0, 0, 0]);
//! ```

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Magic number at the start of every OpenEXR file.
pub const EXR_MAGIC: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

/// Positioned-read byte stream.
pub trait IoProxy: Send + Sync {
    /// Name used in diagnostics.
    fn filename(&self) -> &str;

    /// Total stream size in bytes.
    fn size(&self) -> u64;

    /// Moves the cursor used by [`IoProxy::tell`].
    fn seek(&self, offset: u64) -> io::Result<()>;

    /// Current cursor position.
    fn tell(&self) -> u64;

    /// Reads up to `buf.len()` bytes at `offset` without moving the cursor.
    ///
    /// Returns the number of bytes read, 0 at end of stream.
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

/// Fills `buf` from `offset`, failing on a short read.
///
/// The error message names the stream so it can be shown as-is.
pub fn read_exact_at(io: &dyn IoProxy, buf: &mut [u8], offset: u64) -> io::Result<()> {
    let describe = |e: &dyn std::fmt::Display, kind: io::ErrorKind| {
        io::Error::new(
            kind,
            format!("Could not read from file: \"{}\" ({})", io.filename(), e),
        )
    };

    let mut done = 0usize;
    while done < buf.len() {
        match io.pread(&mut buf[done..], offset + done as u64) {
            Ok(0) => {
                return Err(describe(
                    &format!("unexpected end of file at offset {}", offset + done as u64),
                    io::ErrorKind::UnexpectedEof,
                ));
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(describe(&e, e.kind())),
        }
    }
    Ok(())
}

/// Returns `true` if the stream starts with [`EXR_MAGIC`].
pub fn has_exr_magic(io: &dyn IoProxy) -> bool {
    let mut magic = [0u8; 4];
    read_exact_at(io, &mut magic, 0).is_ok() && magic == EXR_MAGIC
}

/// File-backed proxy.
pub struct IoFile {
    name: String,
    file: Mutex<File>,
    size: u64,
    pos: AtomicU64,
}

impl IoFile {
    /// Opens `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            name: path.display().to_string(),
            file: Mutex::new(file),
            size,
            pos: AtomicU64::new(0),
        })
    }
}

impl IoProxy for IoFile {
    fn filename(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn seek(&self, offset: u64) -> io::Result<()> {
        self.pos.store(offset, Ordering::Relaxed);
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos.load(Ordering::Relaxed)
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("file lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

/// In-memory proxy.
pub struct IoMemReader {
    name: String,
    data: Arc<[u8]>,
    pos: AtomicU64,
}

impl IoMemReader {
    /// Wraps `data` under a diagnostic `name`.
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            pos: AtomicU64::new(0),
        }
    }
}

impl IoProxy for IoMemReader {
    fn filename(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn seek(&self, offset: u64) -> io::Result<()> {
        self.pos.store(offset, Ordering::Relaxed);
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos.load(Ordering::Relaxed)
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}
