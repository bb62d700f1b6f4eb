//! Source file scanner
//!
//! Recursive discovery of source files filtered by extension. Symlinked
//! directories are not followed; symlinked files are kept when they resolve
//! to a regular file.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Source scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// No extensions to match against
    #[error("No extensions configured")]
    NoExtensions,
}

/// Scan result with statistics
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Sorted, deduplicated file list
    pub files: Vec<PathBuf>,
    /// Count of files by lower-cased extension (no dot)
    pub by_extension: BTreeMap<String, usize>,
}

/// Source file scanner
pub struct FileScanner {
    ignore_patterns: Vec<String>,
}

impl FileScanner {
    /// Create new file scanner with default ignore patterns
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
        }
    }

    /// Normalize extensions to lower case without a leading dot
    pub fn normalize_extensions(extensions: &[String]) -> HashSet<String> {
        extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Walk every source path and collect matching files
    ///
    /// Anything under `exclude` (the store root) is skipped so a run never
    /// re-ingests its own output.
    pub fn scan(
        &self,
        paths: &[PathBuf],
        extensions: &[String],
        exclude: Option<&Path>,
    ) -> Result<ScanResult, ScanError> {
        let wanted = Self::normalize_extensions(extensions);
        if wanted.is_empty() {
            return Err(ScanError::NoExtensions);
        }

        let exclude = exclude.map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()));
        let mut files = BTreeSet::new();

        for root in paths {
            if !root.exists() {
                return Err(ScanError::PathNotFound(root.clone()));
            }

            let walker = WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| self.should_process_entry(e, exclude.as_deref()));

            for entry in walker {
                match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        let is_file = entry.file_type().is_file()
                            || (entry.file_type().is_symlink() && path.is_file());
                        if is_file && Self::has_extension(path, &wanted) {
                            files.insert(path.to_path_buf());
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Error accessing entry: {}", e);
                    }
                }
            }
        }

        let files: Vec<PathBuf> = files.into_iter().collect();
        let mut by_extension = BTreeMap::new();
        for file in &files {
            if let Some(ext) = file.extension() {
                *by_extension
                    .entry(ext.to_string_lossy().to_lowercase())
                    .or_insert(0) += 1;
            }
        }

        tracing::debug!(files = files.len(), "Source scan complete");
        Ok(ScanResult {
            files,
            by_extension,
        })
    }

    fn has_extension(path: &Path, wanted: &HashSet<String>) -> bool {
        path.extension()
            .map(|ext| wanted.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    /// Check if entry should be processed
    fn should_process_entry(&self, entry: &DirEntry, exclude: Option<&Path>) -> bool {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        if self.ignore_patterns.iter().any(|p| file_name.contains(p.as_str())) {
            return false;
        }

        if let Some(exclude) = exclude {
            if entry.file_type().is_dir() {
                if let Ok(canonical) = path.canonicalize() {
                    if canonical.starts_with(exclude) {
                        tracing::debug!(path = %path.display(), "Skipping store directory");
                        return false;
                    }
                }
            }
        }

        true
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}
