//! Shared fixtures for the end-to-end tests.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use dupesweep::actions::Recycler;
use dupesweep::duplicates::FinderConfig;
use dupesweep::scanner::PolicyConfig;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// A sandbox with a root to sweep and destinations beside it.
pub struct Sandbox {
    _dir: TempDir,
    pub root: PathBuf,
    pub dups: PathBuf,
    pub unsupported: PathBuf,
    pub holding: PathBuf,
    pub artifacts: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let root = base.join("root");
        fs::create_dir_all(&root).unwrap();
        Self {
            root,
            dups: base.join("dups"),
            unsupported: base.join("unsupported"),
            holding: base.join("holding"),
            artifacts: base.join("artifacts"),
            _dir: dir,
        }
    }

    /// Write `content` to `rel` under the root, creating parents.
    pub fn file(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Policy with the sandbox destinations.
    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig::new(&self.dups, &self.unsupported)
    }

    /// Finder config that recycles into the holding dir and skips packaging.
    pub fn config(&self) -> FinderConfig {
        self.config_with(self.policy())
    }

    pub fn config_with(&self, policy: PolicyConfig) -> FinderConfig {
        FinderConfig::new(policy)
            .with_recycler(Recycler::Directory(self.holding.clone()))
            .with_package_duplicates(false)
            .with_manifest_path(Some(self.artifacts.join("manifest.tsv")))
            .with_error_log_path(Some(self.artifacts.join("errors.log")))
    }

    pub fn error_log(&self) -> String {
        fs::read_to_string(self.artifacts.join("errors.log")).unwrap_or_default()
    }
}

/// Build a zip at `path` from `(name, content)` pairs.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

/// Zip bytes built in memory, for nesting.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Relative paths of every file under `dir`, sorted.
pub fn files_under(dir: &Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}
