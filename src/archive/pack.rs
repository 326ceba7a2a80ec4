//! Zip packaging of a directory tree.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Error type for packaging.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Reading a source file or writing the archive failed.
    #[error("I/O error packaging {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The zip writer rejected an entry.
    #[error("zip error packaging {path}: {source}")]
    Zip {
        /// Path involved
        path: PathBuf,
        /// Writer error
        #[source]
        source: zip::result::ZipError,
    },

    /// Traversal of the source directory failed.
    #[error("cannot walk {0}: {1}")]
    Walk(PathBuf, String),
}

/// One file stored in a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEntry {
    /// File that was read
    pub source: PathBuf,
    /// Entry name inside the zip
    pub name: String,
}

/// A finished package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArchive {
    /// Archive location
    pub path: PathBuf,
    /// Regular files stored
    pub files: Vec<PackedEntry>,
    /// Uncompressed bytes stored
    pub bytes: u64,
}

/// Write every regular file under `src_dir` into a new zip at `output`.
///
/// Entry names are relative to `src_dir` with `/` separators. The source
/// files are left untouched.
///
/// # Errors
///
/// Returns [`PackError`] on any read, walk or write failure; a partial
/// archive is removed.
pub fn package_directory(src_dir: &Path, output: &Path) -> Result<PackedArchive, PackError> {
    let result = write_package(src_dir, output);
    if result.is_err() {
        let _ = std::fs::remove_file(output);
    }
    result
}

fn write_package(src_dir: &Path, output: &Path) -> Result<PackedArchive, PackError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PackError::Io { path, source }
    };
    let zip_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PackError::Zip { path, source }
    };

    let file = File::create(output).map_err(io_err(output))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut files = Vec::new();
    let mut bytes: u64 = 0;

    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PackError::Walk(src_dir.to_path_buf(), e.to_string()))?;
        if !entry.file_type().is_file() || entry.path() == output {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(src_dir).unwrap_or(path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name.as_str(), options).map_err(zip_err(path))?;
        let mut source = File::open(path).map_err(io_err(path))?;
        let copied = io::copy(&mut source, &mut zip).map_err(io_err(path))?;
        bytes = bytes.saturating_add(copied);
        files.push(PackedEntry {
            source: path.to_path_buf(),
            name,
        });
    }

    let mut inner = zip.finish().map_err(zip_err(output))?;
    inner.flush().map_err(io_err(output))?;

    log::debug!(
        "Packaged {} file(s), {} bytes into {}",
        files.len(),
        bytes,
        output.display()
    );

    Ok(PackedArchive {
        path: output.to_path_buf(),
        files,
        bytes,
    })
}
