//! Vault discovery: which files are indexed, and their content hashes.

use crate::config::VaultConfig;
use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// A file found by a scan. Content is not retained; the hash is of the bytes read
/// during the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Vault-relative path with forward slashes.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub hash: String,
    /// Milliseconds since the epoch.
    pub mtime: i64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct VaultScanner {
    root: PathBuf,
    exclude_folders: Vec<String>,
    extensions: Vec<String>,
    max_file_bytes: u64,
}

impl VaultScanner {
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            root: config.root.clone(),
            exclude_folders: config.exclude_folders.clone(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` (absolute, or relative to the vault root) would be indexed,
    /// judging by its location and extension only.
    pub fn is_indexable(&self, path: &Path) -> bool {
        !self.is_excluded(path) && self.has_indexed_extension(path)
    }

    /// Whether any folder on the way to `path` is excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.components().any(|c| match c {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                self.exclude_folders.iter().any(|ex| *ex == name)
            }
            _ => false,
        })
    }

    fn has_indexed_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }

    /// Vault-relative, forward-slash form of an absolute path under the root.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Walks the vault. Files come back newest first, then by path.
    ///
    /// Unreadable entries are logged and skipped. Blocking; run it off the async runtime.
    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        if !self.root.is_dir() {
            anyhow::bail!("Vault root {} is not a directory", self.root.display());
        }

        let excluded = self.exclude_folders.clone();
        let walker = WalkBuilder::new(&self.root)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                !(is_dir && excluded.iter().any(|ex| entry.file_name().to_string_lossy() == *ex))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable vault entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            if !self.has_indexed_extension(path) {
                continue;
            }
            match self.scan_file(path) {
                Ok(Some(file)) => files.push(file),
                Ok(None) => {}
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        files.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| a.rel_path.cmp(&b.rel_path)));
        debug!("Scanned {} indexable files under {}", files.len(), self.root.display());
        Ok(files)
    }

    fn scan_file(&self, path: &Path) -> Result<Option<ScannedFile>> {
        let metadata = std::fs::metadata(path)?;
        if metadata.len() > self.max_file_bytes {
            debug!("Skipping {} ({} bytes exceeds limit)", path.display(), metadata.len());
            return Ok(None);
        }
        let Some(rel_path) = self.relative_path(path) else {
            return Ok(None);
        };

        let bytes = std::fs::read(path)?;
        let mtime = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(Some(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
            hash: blake3::hash(&bytes).to_hex().to_string(),
            mtime,
            size: metadata.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scanner_for(root: &Path) -> VaultScanner {
        VaultScanner::new(&VaultConfig {
            root: root.to_path_buf(),
            ..VaultConfig::default()
        })
    }

    #[test]
    fn test_scan_filters_and_relativizes() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        std::fs::create_dir_all(root.join("Projects/alpha"))?;
        std::fs::create_dir_all(root.join(".obsidian"))?;
        std::fs::create_dir_all(root.join(".mnemo"))?;
        std::fs::write(root.join("sky.md"), "the sky is blue")?;
        std::fs::write(root.join("Projects/alpha/plan.MD"), "plan")?;
        std::fs::write(root.join("image.png"), [0u8, 1, 2])?;
        std::fs::write(root.join(".obsidian/workspace.md"), "ui")?;
        std::fs::write(root.join(".mnemo/notes.md"), "index")?;

        let files = scanner_for(root).scan()?;
        let mut paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["Projects/alpha/plan.MD", "sky.md"]);

        let sky = files.iter().find(|f| f.rel_path == "sky.md").expect("sky.md scanned");
        assert_eq!(sky.hash, blake3::hash(b"the sky is blue").to_hex().to_string());
        assert_eq!(sky.size, 15);
        Ok(())
    }

    #[test]
    fn test_scan_skips_oversized_files() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("big.md"), "x".repeat(64))?;
        std::fs::write(dir.path().join("small.md"), "x")?;

        let scanner = VaultScanner::new(&VaultConfig {
            root: dir.path().to_path_buf(),
            max_file_bytes: 10,
            ..VaultConfig::default()
        });
        let files = scanner.scan()?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "small.md");
        Ok(())
    }

    #[test]
    fn test_is_indexable() {
        let scanner = scanner_for(Path::new("/vault"));
        assert!(scanner.is_indexable(Path::new("/vault/Areas/note.md")));
        assert!(!scanner.is_indexable(Path::new("/vault/.obsidian/note.md")));
        assert!(!scanner.is_indexable(Path::new("/vault/note.txt")));
        assert!(scanner.is_excluded(Path::new("/vault/.git/HEAD")));
        assert!(!scanner.is_excluded(Path::new("/vault/Areas")));
        assert_eq!(
            scanner.relative_path(Path::new("/vault/Areas/note.md")),
            Some("Areas/note.md".to_string())
        );
        assert_eq!(scanner.relative_path(Path::new("/elsewhere/x.md")), None);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        assert!(scanner_for(Path::new("/definitely/not/here")).scan().is_err());
    }
}
