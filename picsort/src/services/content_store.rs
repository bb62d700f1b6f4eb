//! Content-addressed store
//!
//! Every distinct file content lives exactly once at `hashed/raw/<sha512>`.
//! Everything else in the destination tree is a relative symlink into that
//! directory, so the whole tree can be moved as a unit.

use crate::models::{ContentRecord, IngestMode};
use chrono::{DateTime, Utc};
use picsort_common::{Error, Result};
use sha2::{Digest, Sha512};
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Directories created when a store is opened
pub const STORE_LAYOUT: &[&str] = &[
    "hashed/raw",
    "hashed/with_extension",
    "by_date",
    "by_location/_unknown_",
];

/// Result of [`ContentStore::link`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    /// Already resolved to the canonical file
    Unchanged,
    /// Pointed elsewhere (or dangled) and was swapped atomically
    Replaced,
}

fn io_context(e: std::io::Error, what: &str, path: &Path) -> Error {
    Error::Io(std::io::Error::new(
        e.kind(),
        format!("{} {}: {}", what, path.display(), e),
    ))
}

/// Content-addressed destination tree
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (creating if needed) the store rooted at `root`
    pub fn open(root: &Path) -> Result<Self> {
        for sub in STORE_LAYOUT {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| io_context(e, "Failed to create", &dir))?;
        }
        let root = fs::canonicalize(root).map_err(|e| io_context(e, "Failed to resolve", root))?;
        tracing::debug!(root = %root.display(), "Opened content store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/hashed/raw/<hash>`
    pub fn canonical_path(&self, hash: &str) -> PathBuf {
        self.root.join("hashed").join("raw").join(hash)
    }

    /// True if `path` lives under the store root
    pub fn contains(&self, path: &Path) -> bool {
        match fs::canonicalize(path) {
            Ok(resolved) => resolved.starts_with(&self.root),
            Err(_) => path.starts_with(&self.root),
        }
    }

    /// SHA-512 of the file contents, lower-case hex
    pub fn hash_file(path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|e| io_context(e, "Failed to open", path))?;

        let mut hasher = Sha512::new();
        let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
        loop {
            let bytes_read = file
                .read(&mut buffer)
                .map_err(|e| io_context(e, "Failed to read", path))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Hash `source` and place it in the canonical store
    ///
    /// Existing content is never rewritten. New content is copied to a
    /// temporary name next to its final location and renamed into place, so
    /// concurrent ingests of identical bytes never expose a partial file.
    pub fn ingest(&self, source: &Path, mode: IngestMode) -> Result<ContentRecord> {
        let source_meta =
            fs::metadata(source).map_err(|e| io_context(e, "Failed to stat", source))?;
        let source_modified = source_meta.modified().ok().map(DateTime::<Utc>::from);

        let hash = Self::hash_file(source)?;
        let canonical = self.canonical_path(&hash);

        if canonical.exists() {
            tracing::debug!(hash = %hash, path = %source.display(), "Content already stored");
        } else {
            self.copy_into_place(source, &canonical, &hash, source_meta.modified().ok())?;
            tracing::debug!(hash = %hash, path = %source.display(), "Stored new content");
        }

        let extension = source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let with_extension = self
            .root
            .join("hashed")
            .join("with_extension")
            .join(format!("{}{}", hash, extension));
        self.link(&hash, &with_extension)?;

        if mode == IngestMode::Move && !self.contains(source) {
            fs::remove_file(source).map_err(|e| io_context(e, "Failed to remove", source))?;
            tracing::debug!(path = %source.display(), "Removed moved source");
            // Only succeeds once the directory is empty
            if let Some(dir) = source.parent() {
                if fs::remove_dir(dir).is_ok() {
                    tracing::debug!(path = %dir.display(), "Removed emptied source directory");
                }
            }
        }

        Ok(ContentRecord {
            hash,
            canonical_path: canonical,
            extension,
            source_path: source.to_path_buf(),
            ingest_mode: mode,
            source_modified,
        })
    }

    fn copy_into_place(
        &self,
        source: &Path,
        canonical: &Path,
        hash: &str,
        modified: Option<std::time::SystemTime>,
    ) -> Result<()> {
        let partial = canonical.with_file_name(format!(".{}.{}.partial", hash, Uuid::new_v4()));

        let result = (|| -> Result<()> {
            fs::copy(source, &partial).map_err(|e| io_context(e, "Failed to copy", source))?;
            if let Some(modified) = modified {
                File::options()
                    .write(true)
                    .open(&partial)
                    .and_then(|f| f.set_modified(modified))
                    .map_err(|e| io_context(e, "Failed to set mtime on", &partial))?;
            }
            fs::rename(&partial, canonical)
                .map_err(|e| io_context(e, "Failed to rename into", canonical))
        })();

        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }
        result
    }

    /// True if `path` resolves to the canonical file for `hash`
    ///
    /// Dangling links and missing paths resolve to nothing.
    pub fn points_to(&self, hash: &str, path: &Path) -> Result<bool> {
        let target = self.canonical_path(hash);
        let target_meta =
            fs::metadata(&target).map_err(|e| io_context(e, "Failed to stat", &target))?;
        Ok(match fs::metadata(path) {
            Ok(meta) => meta.dev() == target_meta.dev() && meta.ino() == target_meta.ino(),
            Err(_) => false,
        })
    }

    /// Make `path` a symlink to the canonical file for `hash`
    pub fn link(&self, hash: &str, path: &Path) -> Result<LinkOutcome> {
        let target = self.canonical_path(hash);
        if !target.exists() {
            return Err(Error::NotFound(format!("No stored content for {}", hash)));
        }

        let parent = path
            .parent()
            .ok_or_else(|| Error::InvalidInput(format!("Link path has no parent: {}", path.display())))?;
        fs::create_dir_all(parent).map_err(|e| io_context(e, "Failed to create", parent))?;

        let existed = fs::symlink_metadata(path).is_ok();
        if existed && self.points_to(hash, path)? {
            return Ok(LinkOutcome::Unchanged);
        }

        let link_target = self.link_target(parent, hash);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = parent.join(format!(".{}.{}.link", file_name, Uuid::new_v4()));

        std::os::unix::fs::symlink(&link_target, &staging)
            .map_err(|e| io_context(e, "Failed to create link", &staging))?;
        if let Err(e) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(io_context(e, "Failed to place link", path));
        }

        if existed {
            tracing::debug!(hash = %hash, path = %path.display(), "Replaced link");
            Ok(LinkOutcome::Replaced)
        } else {
            Ok(LinkOutcome::Created)
        }
    }

    /// Relative target when `link_dir` is inside the store, absolute otherwise
    fn link_target(&self, link_dir: &Path, hash: &str) -> PathBuf {
        let Ok(relative_dir) = link_dir.strip_prefix(&self.root) else {
            return self.canonical_path(hash);
        };
        let depth = relative_dir
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count();

        let mut target = PathBuf::new();
        for _ in 0..depth {
            target.push("..");
        }
        target.join("hashed").join("raw").join(hash)
    }
}
