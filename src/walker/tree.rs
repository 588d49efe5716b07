//! Directory tree enumeration
//!
//! The walker lists each directory, sorts the listing by name and decides
//! per entry:
//! - directories are descended into unless their relative path is ignored,
//!   in which case the whole subtree is skipped
//! - files ending in `.gz` (or the `.gz~` temporary suffix) are artifacts
//!   and never queued
//! - other regular files are queued unless a sibling `<name>.gz` exists
//! - symlinks, sockets, devices and the like are left alone
//!
//! Because the listing is sorted, the sibling lookup scans forward from the
//! current entry and stops at the first name greater than `<name>.gz`.
//!
//! Directories are walked depth first with an explicit stack of open
//! listings, so a deep tree cannot exhaust the thread's stack.

use crate::compress::{ARTIFACT_SUFFIX, TEMP_SUFFIX};
use crate::error::{IoOp, PrecompressError, Result};
use crate::ignore::IgnorePattern;
use crate::walker::queue::{WorkItem, WorkQueueSender};
use filetime::FileTime;
use std::cmp::Ordering;
use std::ffi::{OsStr, OsString};
use std::fs::{self, FileType};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// When an existing `<name>.gz` sibling means the file can be skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipPolicy {
    /// Skip whenever the sibling exists, however old it is
    #[default]
    Exists,

    /// Skip only if both the source and the sibling already carry the
    /// target modification time; anything else is recompressed
    Fresh,
}

/// Counters collected during a walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Directories listed
    pub dirs: u64,

    /// Files handed to the work queue
    pub queued: u64,

    /// Directories skipped by the ignore pattern
    pub ignored_dirs: u64,

    /// Artifacts and temporary artifacts seen
    pub artifacts: u64,

    /// Files skipped because a sibling artifact exists
    pub already_compressed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Other,
}

impl From<FileType> for EntryKind {
    fn from(ft: FileType) -> Self {
        if ft.is_dir() {
            EntryKind::Dir
        } else if ft.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

#[derive(Debug)]
struct Entry {
    name: OsString,
    kind: EntryKind,
}

/// An open directory listing with a cursor
struct Frame {
    dir: PathBuf,
    entries: Vec<Entry>,
    next: usize,
}

/// Walks a tree and feeds eligible files into the work queue
pub struct TreeWalker<'a> {
    root: &'a Path,
    ignore: &'a IgnorePattern,
    policy: SkipPolicy,
    mtime: FileTime,
    stats: WalkStats,
}

impl<'a> TreeWalker<'a> {
    pub fn new(root: &'a Path, ignore: &'a IgnorePattern, mtime: FileTime) -> Self {
        Self {
            root,
            ignore,
            policy: SkipPolicy::default(),
            mtime,
            stats: WalkStats::default(),
        }
    }

    /// Set the skip policy for files with an existing artifact
    pub fn policy(mut self, policy: SkipPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    /// Walk the whole tree
    pub fn walk(&mut self, queue: &WorkQueueSender) -> Result<()> {
        self.walk_from(Path::new(""), queue)
    }

    /// Walk the subtree at `prefix`, relative to the root
    ///
    /// The first listing failure ends the walk; nothing further is queued.
    pub fn walk_from(&mut self, prefix: &Path, queue: &WorkQueueSender) -> Result<()> {
        let mut stack = vec![self.open(prefix.to_path_buf())?];

        while let Some(frame) = stack.last_mut() {
            let Some(entry) = frame.entries.get(frame.next) else {
                stack.pop();
                continue;
            };
            let index = frame.next;
            frame.next += 1;

            let relative = frame.dir.join(&entry.name);

            match entry.kind {
                EntryKind::Dir => {
                    if self.ignore.is_match(&relative) {
                        trace!(path = %relative.display(), "Ignored directory");
                        self.stats.ignored_dirs += 1;
                        continue;
                    }
                    let child = self.open(relative)?;
                    stack.push(child);
                }
                EntryKind::File => {
                    if is_artifact(&entry.name) {
                        self.stats.artifacts += 1;
                        continue;
                    }
                    let later = &frame.entries[index + 1..];
                    if has_artifact(later, &entry.name) && self.skip_existing(&relative) {
                        self.stats.already_compressed += 1;
                        continue;
                    }
                    queue.send(WorkItem::new(relative))?;
                    self.stats.queued += 1;
                }
                EntryKind::Other => {}
            }
        }

        debug!(
            dirs = self.stats.dirs,
            queued = self.stats.queued,
            already_compressed = self.stats.already_compressed,
            "Walk finished"
        );

        Ok(())
    }

    fn open(&mut self, dir: PathBuf) -> Result<Frame> {
        let entries = list_sorted(&self.root.join(&dir))?;
        self.stats.dirs += 1;
        Ok(Frame {
            dir,
            entries,
            next: 0,
        })
    }

    /// Decide whether a file with an artifact sibling is left alone
    fn skip_existing(&self, relative: &Path) -> bool {
        match self.policy {
            SkipPolicy::Exists => true,
            SkipPolicy::Fresh => {
                let source = self.root.join(relative);
                let fresh = has_mtime(&source, self.mtime)
                    && has_mtime(&crate::compress::artifact_path(&source), self.mtime);
                if !fresh {
                    debug!(path = %relative.display(), "Artifact is stale");
                }
                fresh
            }
        }
    }
}

fn has_mtime(path: &Path, mtime: FileTime) -> bool {
    fs::metadata(path)
        .map(|meta| FileTime::from_last_modification_time(&meta) == mtime)
        .unwrap_or(false)
}

/// List a directory sorted by name
fn list_sorted(dir: &Path) -> Result<Vec<Entry>> {
    let list_err = |e| PrecompressError::io(IoOp::List, dir, e);

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        let kind = entry.file_type().map_err(list_err)?.into();
        entries.push(Entry {
            name: entry.file_name(),
            kind,
        });
    }
    entries.sort_unstable_by(|a, b| a.name.cmp(&b.name));

    Ok(entries)
}

fn is_artifact(name: &OsStr) -> bool {
    let bytes = name.as_encoded_bytes();
    bytes.ends_with(ARTIFACT_SUFFIX.as_bytes()) || bytes.ends_with(TEMP_SUFFIX.as_bytes())
}

/// Look for `<name>.gz` among the entries following `name` in a sorted listing
fn has_artifact(later: &[Entry], name: &OsStr) -> bool {
    let mut needle = name.to_os_string();
    needle.push(ARTIFACT_SUFFIX);

    for entry in later {
        match entry.name.as_os_str().cmp(needle.as_os_str()) {
            Ordering::Equal => return true,
            Ordering::Greater => return false,
            Ordering::Less => {}
        }
    }
    false
}
