//! Conditional gzip compression of a single file
//!
//! A file is streamed through a gzip encoder at maximum compression into a
//! buffer that may never grow beyond the original file size. As soon as the
//! compressed stream would exceed that budget the encoder is abandoned and
//! the file is reported as not worth compressing.
//!
//! When the compressed form is strictly smaller, it is written next to the
//! source as `<path>.gz~`, given the source's permissions and the target
//! modification time, and renamed to `<path>.gz`. Readers of `<path>.gz`
//! therefore only ever see a complete artifact.

use crate::error::{IoOp, PrecompressError, Result};
use filetime::FileTime;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, trace};

/// Suffix appended to a source file name to form its artifact
pub const ARTIFACT_SUFFIX: &str = ".gz";

/// Suffix of the temporary file renamed into place as the artifact
pub const TEMP_SUFFIX: &str = ".gz~";

/// Size of the read buffer used to feed the encoder
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Upper bound on the output space reserved before compressing
const MAX_RESERVE: usize = 1024 * 1024;

/// Raised by [`CappedWriter`] when the compressed stream outgrows its budget.
/// Never escapes this module.
#[derive(Error, Debug)]
#[error("size threshold exceeded")]
struct BudgetExceeded;

/// Writer that appends into a buffer until a byte budget is used up
struct CappedWriter<'a> {
    buf: &'a mut Vec<u8>,
    remaining: usize,
}

impl Write for CappedWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.len() > self.remaining {
            return Err(io::Error::other(BudgetExceeded));
        }
        self.buf.extend_from_slice(data);
        self.remaining -= data.len();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn is_budget_exceeded(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.is::<BudgetExceeded>())
}

/// Reusable per-worker buffers
///
/// The output buffer holds the compressed stream, the copy buffer feeds the
/// encoder. Both are reset before every use, nothing carries over between
/// files.
#[derive(Debug)]
pub struct CompressBuffers {
    out: Vec<u8>,
    copy: Vec<u8>,
}

impl CompressBuffers {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            copy: vec![0; COPY_BUFFER_SIZE],
        }
    }
}

impl Default for CompressBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a compression attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressOutcome {
    /// An artifact was written
    Compressed { original: u64, compressed: u64 },

    /// Compression would not shrink the file; nothing was written
    NotSmaller { original: u64 },
}

impl CompressOutcome {
    /// Returns true if an artifact was created or replaced
    pub fn is_changed(&self) -> bool {
        matches!(self, CompressOutcome::Compressed { .. })
    }
}

/// Path of the artifact for `path` (`<path>.gz`)
pub fn artifact_path(path: &Path) -> PathBuf {
    with_suffix(path, ARTIFACT_SUFFIX)
}

/// Path of the temporary artifact for `path` (`<path>.gz~`)
pub fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, TEMP_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

/// Compress `path` with freshly allocated buffers
///
/// Returns `Ok(true)` if `<path>.gz` was written.
pub fn compress_if_smaller(path: &Path, mtime: SystemTime) -> Result<bool> {
    let mut bufs = CompressBuffers::new();
    let outcome = try_compress(path, FileTime::from_system_time(mtime), &mut bufs)?;
    Ok(outcome.is_changed())
}

/// Normalize the modification time of `path` and write `<path>.gz` if the
/// compressed form is strictly smaller than the source.
///
/// The source's mtime is set to `mtime` before it is read, whether or not an
/// artifact ends up being written.
///
/// # Errors
///
/// Any stat, open, read, write, rename or timestamp failure is returned as
/// [`PrecompressError::Io`]. Running over budget is not an error.
pub fn try_compress(
    path: &Path,
    mtime: FileTime,
    bufs: &mut CompressBuffers,
) -> Result<CompressOutcome> {
    let meta = fs::metadata(path).map_err(|e| PrecompressError::io(IoOp::Stat, path, e))?;

    if FileTime::from_last_modification_time(&meta) != mtime {
        filetime::set_file_times(path, mtime, mtime)
            .map_err(|e| PrecompressError::io(IoOp::SetTimes, path, e))?;
    }

    let mut file = File::open(path).map_err(|e| PrecompressError::io(IoOp::Open, path, e))?;

    let CompressBuffers { out, copy } = bufs;
    if copy.is_empty() {
        copy.resize(COPY_BUFFER_SIZE, 0);
    }

    let budget = usize::try_from(meta.len()).unwrap_or(usize::MAX);
    out.clear();
    out.reserve(budget.min(MAX_RESERVE));

    let mut encoder = GzEncoder::new(
        CappedWriter {
            buf: &mut *out,
            remaining: budget,
        },
        Compression::best(),
    );

    let mut read = 0u64;
    loop {
        let n = match file.read(copy) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PrecompressError::io(IoOp::Read, path, e)),
        };
        read += n as u64;
        if let Err(e) = encoder.write_all(&copy[..n]) {
            return over_budget(path, meta.len(), e);
        }
    }
    if let Err(e) = encoder.finish() {
        return over_budget(path, meta.len(), e);
    }

    let compressed = out.len() as u64;
    if compressed >= read {
        trace!(path = %path.display(), original = read, compressed, "Not smaller");
        return Ok(CompressOutcome::NotSmaller { original: read });
    }

    write_artifact(path, out, &meta, mtime)?;

    debug!(
        path = %path.display(),
        original = read,
        compressed,
        "Artifact written"
    );

    Ok(CompressOutcome::Compressed {
        original: read,
        compressed,
    })
}

/// Turn a budget overrun into a "not smaller" outcome, anything else into an
/// error
fn over_budget(path: &Path, original: u64, err: io::Error) -> Result<CompressOutcome> {
    if is_budget_exceeded(&err) {
        trace!(path = %path.display(), original, "Compression budget exceeded");
        Ok(CompressOutcome::NotSmaller { original })
    } else {
        Err(PrecompressError::io(IoOp::Compress, path, err))
    }
}

fn write_artifact(path: &Path, data: &[u8], meta: &fs::Metadata, mtime: FileTime) -> Result<()> {
    let tmp = temp_path(path);

    // Left over from an interrupted run; a read-only copy would block the write
    match fs::remove_file(&tmp) {
        Ok(()) => debug!(path = %tmp.display(), "Removed stale temporary artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(PrecompressError::io(IoOp::Remove, &tmp, e)),
    }

    fs::write(&tmp, data).map_err(|e| PrecompressError::io(IoOp::Write, &tmp, e))?;
    fs::set_permissions(&tmp, artifact_permissions(meta))
        .map_err(|e| PrecompressError::io(IoOp::SetPermissions, &tmp, e))?;
    filetime::set_file_times(&tmp, mtime, mtime)
        .map_err(|e| PrecompressError::io(IoOp::SetTimes, &tmp, e))?;

    let artifact = artifact_path(path);
    fs::rename(&tmp, &artifact).map_err(|e| PrecompressError::io(IoOp::Rename, &artifact, e))?;

    Ok(())
}

/// Permission bits of the source, without setuid, setgid or sticky
#[cfg(unix)]
fn artifact_permissions(meta: &fs::Metadata) -> fs::Permissions {
    use std::os::unix::fs::PermissionsExt;

    fs::Permissions::from_mode(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn artifact_permissions(meta: &fs::Metadata) -> fs::Permissions {
    meta.permissions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::tempdir;

    fn target() -> FileTime {
        FileTime::from_unix_time(1_600_000_000, 0)
    }

    fn mtime_of(path: &Path) -> FileTime {
        FileTime::from_last_modification_time(&fs::metadata(path).unwrap())
    }

    /// Deterministic noise that deflate cannot shrink
    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn test_capped_writer_budget() {
        let mut buf = Vec::new();
        let mut w = CappedWriter {
            buf: &mut buf,
            remaining: 4,
        };

        assert_eq!(w.write(b"abcd").unwrap(), 4);
        let err = w.write(b"e").unwrap_err();
        assert!(is_budget_exceeded(&err));
        assert_eq!(buf, b"abcd");
    }

    #[test]
    fn test_other_errors_not_budget() {
        let err = io::Error::other("disk on fire");
        assert!(!is_budget_exceeded(&err));
        assert!(!is_budget_exceeded(&io::Error::from(io::ErrorKind::NotFound)));
    }

    #[test]
    fn test_compressible_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.js");
        let content = "function hello() { return 'hello world'; }\n".repeat(250);
        fs::write(&path, &content).unwrap();

        let mut bufs = CompressBuffers::new();
        let outcome = try_compress(&path, target(), &mut bufs).unwrap();

        assert!(matches!(
            outcome,
            CompressOutcome::Compressed { original, .. } if original == content.len() as u64
        ));

        let artifact = artifact_path(&path);
        let packed = fs::read(&artifact).unwrap();
        assert!((packed.len() as u64) < content.len() as u64);

        let mut unpacked = String::new();
        GzDecoder::new(packed.as_slice())
            .read_to_string(&mut unpacked)
            .unwrap();
        assert_eq!(unpacked, content);

        assert_eq!(mtime_of(&path), target());
        assert_eq!(mtime_of(&artifact), target());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_incompressible_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bin");
        fs::write(&path, noise(500)).unwrap();

        let outcome = try_compress(&path, target(), &mut CompressBuffers::new()).unwrap();

        assert_eq!(outcome, CompressOutcome::NotSmaller { original: 500 });
        assert!(!artifact_path(&path).exists());
        assert!(!temp_path(&path).exists());
        // mtime is normalized even when nothing is written
        assert_eq!(mtime_of(&path), target());
    }

    #[test]
    fn test_empty_and_tiny_files() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        let tiny = dir.path().join("tiny.txt");
        fs::write(&empty, b"").unwrap();
        fs::write(&tiny, b"a").unwrap();

        let mut bufs = CompressBuffers::new();
        assert!(!try_compress(&empty, target(), &mut bufs).unwrap().is_changed());
        assert!(!try_compress(&tiny, target(), &mut bufs).unwrap().is_changed());
        assert!(!artifact_path(&empty).exists());
        assert!(!artifact_path(&tiny).exists());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.css");

        let err = try_compress(&path, target(), &mut CompressBuffers::new()).unwrap_err();
        assert!(matches!(err, PrecompressError::Io { op: IoOp::Stat, .. }));
    }

    #[test]
    fn test_buffers_reused_across_files() {
        let dir = tempdir().unwrap();
        let big = dir.path().join("big.html");
        let small = dir.path().join("small.html");
        fs::write(&big, "<p>lorem ipsum</p>\n".repeat(2000)).unwrap();
        fs::write(&small, "<div></div>".repeat(40)).unwrap();

        let mut bufs = CompressBuffers::new();
        try_compress(&big, target(), &mut bufs).unwrap();
        try_compress(&small, target(), &mut bufs).unwrap();

        let mut unpacked = String::new();
        GzDecoder::new(File::open(artifact_path(&small)).unwrap())
            .read_to_string(&mut unpacked)
            .unwrap();
        assert_eq!(unpacked, "<div></div>".repeat(40));
    }

    #[test]
    fn test_empty_copy_buffer_is_resized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{\"key\": \"value\"}\n".repeat(100)).unwrap();

        let mut bufs = CompressBuffers {
            out: Vec::new(),
            copy: Vec::new(),
        };
        assert!(try_compress(&path, target(), &mut bufs).unwrap().is_changed());
    }

    #[test]
    fn test_existing_artifact_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("style.css");
        fs::write(&path, "body { margin: 0; }\n".repeat(100)).unwrap();
        fs::write(artifact_path(&path), b"stale").unwrap();
        fs::write(temp_path(&path), b"leftover").unwrap();

        assert!(compress_if_smaller(&path, SystemTime::UNIX_EPOCH).unwrap());

        let packed = fs::read(artifact_path(&path)).unwrap();
        assert_ne!(packed, b"stale");
        assert!(!temp_path(&path).exists());
        assert_eq!(mtime_of(&path), FileTime::from_unix_time(0, 0));
    }

    #[cfg(unix)]
    #[test]
    fn test_artifact_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("index.html");
        fs::write(&path, "<html></html>\n".repeat(100)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        assert!(try_compress(&path, target(), &mut CompressBuffers::new())
            .unwrap()
            .is_changed());

        let mode = fs::metadata(artifact_path(&path)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn test_artifact_drops_special_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("tool.sh");
        fs::write(&path, "echo hello\n".repeat(200)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o4755)).unwrap();

        assert!(try_compress(&path, target(), &mut CompressBuffers::new())
            .unwrap()
            .is_changed());

        let mode = fs::metadata(artifact_path(&path)).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o755);
    }

    #[test]
    fn test_large_budget_reserves_bounded_space() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "abcdefgh".repeat(512 * 1024)).unwrap();

        let mut bufs = CompressBuffers::new();
        assert!(try_compress(&path, target(), &mut bufs).unwrap().is_changed());
        // 4 MiB source, reservation stays well below it
        assert!(bufs.out.capacity() < 4 * 1024 * 1024);
    }
}
