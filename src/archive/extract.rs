//! Format-specific decoders and the stateful [`Expander`].
//!
//! The expander owns the run's decompressed-size budget. Each call to
//! [`Expander::expand`] checks the depth cap and the budget, decodes into the
//! task's destination directory, measures what was written, and finally
//! recycles the original archive. Any failure rolls the destination back so
//! a half-expanded archive never reaches the walker.
//!
//! Every chunk is charged against the budget before it is written, so an
//! archive that inflates past the limit stops within one [`COPY_CHUNK`] of
//! it. RAR entries are charged by their declared size up front.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tar::Archive as TarArchive;
use zip::result::ZipError;
use zip::ZipArchive;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::actions::Recycler;

use super::{ArchiveFormat, ArchiveTask, ExpansionLimits, ExtractError};

/// Largest write made between two budget charges.
pub const COPY_CHUNK: usize = 64 * 1024;

/// Output allowance for one expansion.
#[derive(Debug)]
struct OutputBudget {
    remaining: Option<u64>,
    used: u64,
}

impl OutputBudget {
    fn new(remaining: Option<u64>) -> Self {
        Self { remaining, used: 0 }
    }

    /// Reserve `bytes` of output, failing once the allowance is gone.
    fn charge_decompressed_out(
        &mut self,
        bytes: u64,
        task: &ArchiveTask,
    ) -> Result<(), ExtractError> {
        let needed = self.used.saturating_add(bytes);
        if let Some(remaining) = self.remaining {
            if needed > remaining {
                return Err(ExtractError::BudgetExceeded {
                    path: task.archive.clone(),
                    needed,
                    remaining,
                });
            }
        }
        self.used = needed;
        Ok(())
    }
}

/// Result of a successful expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionOutcome {
    /// Directory holding the extracted entries.
    pub dest_dir: PathBuf,
    /// Bytes written to `dest_dir`.
    pub bytes_written: u64,
    /// Where the archive went, if the recycler reports a location.
    pub recycled_to: Option<PathBuf>,
    /// Set when the archive could not be recycled and was left in place.
    pub recycle_error: Option<String>,
}

/// Expands archives while enforcing [`ExpansionLimits`].
#[derive(Debug)]
pub struct Expander {
    limits: ExpansionLimits,
    consumed: u64,
    recycler: Recycler,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl Expander {
    /// Create an expander with an empty budget ledger.
    #[must_use]
    pub fn new(limits: ExpansionLimits, recycler: Recycler) -> Self {
        Self {
            limits,
            consumed: 0,
            recycler,
            cancel_flag: None,
        }
    }

    /// Stop between entries when the flag is raised.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    /// Bytes written by all expansions so far.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Configured limits.
    #[must_use]
    pub fn limits(&self) -> ExpansionLimits {
        self.limits
    }

    fn remaining(&self) -> Option<u64> {
        self.limits
            .max_total_bytes
            .map(|max| max.saturating_sub(self.consumed))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Expand `task.archive` into `task.dest_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] when the depth cap or budget would be
    /// exceeded, when the decoder fails, or when cancellation is observed.
    /// In every error case `dest_dir` is removed again and the archive is
    /// left where it was.
    pub fn expand(&mut self, task: &ArchiveTask) -> Result<ExpansionOutcome, ExtractError> {
        if let Some(limit) = self.limits.max_depth {
            if task.depth > limit {
                return Err(ExtractError::DepthExceeded {
                    path: task.archive.clone(),
                    depth: task.depth,
                    limit,
                });
            }
        }

        let remaining = self.remaining();
        if let (Some(remaining), ArchiveFormat::Zip) = (remaining, task.format) {
            let declared = declared_zip_size(&task.archive)?;
            if declared > remaining {
                return Err(ExtractError::BudgetExceeded {
                    path: task.archive.clone(),
                    needed: declared,
                    remaining,
                });
            }
        }

        fs::create_dir_all(&task.dest_dir).map_err(|source| ExtractError::Io {
            path: task.dest_dir.clone(),
            source,
        })?;

        log::debug!(
            "Expanding {} ({}) into {}",
            task.archive.display(),
            task.format,
            task.dest_dir.display()
        );

        let mut budget = OutputBudget::new(remaining);
        if let Err(e) = self.decode(task, &mut budget) {
            rollback(&task.dest_dir);
            return Err(e);
        }

        let bytes_written = directory_size(&task.dest_dir);
        if let Some(remaining) = remaining {
            if bytes_written > remaining {
                rollback(&task.dest_dir);
                return Err(ExtractError::BudgetExceeded {
                    path: task.archive.clone(),
                    needed: bytes_written,
                    remaining,
                });
            }
        }
        self.consumed = self.consumed.saturating_add(bytes_written);

        let (recycled_to, recycle_error) = match self.recycler.recycle(&task.archive) {
            Ok(location) => (location, None),
            Err(e) => {
                log::warn!("Expanded but could not recycle {}: {}", task.archive.display(), e);
                (None, Some(e.to_string()))
            }
        };

        Ok(ExpansionOutcome {
            dest_dir: task.dest_dir.clone(),
            bytes_written,
            recycled_to,
            recycle_error,
        })
    }

    fn decode(&self, task: &ArchiveTask, budget: &mut OutputBudget) -> Result<(), ExtractError> {
        match task.format {
            ArchiveFormat::Zip => self.extract_zip(task, budget),
            ArchiveFormat::Tar => {
                let file = open(&task.archive)?;
                self.extract_tar(TarArchive::new(file), task, budget)
            }
            ArchiveFormat::TarGz => {
                let file = open(&task.archive)?;
                self.extract_tar(TarArchive::new(GzDecoder::new(file)), task, budget)
            }
            ArchiveFormat::TarZst => {
                let file = open(&task.archive)?;
                let decoder = ZstdDecoder::new(file).map_err(|e| corrupt(task, e))?;
                self.extract_tar(TarArchive::new(decoder), task, budget)
            }
            ArchiveFormat::SevenZ => self.extract_7z(task, budget),
            ArchiveFormat::Rar => self.extract_rar(task, budget),
        }
    }

    fn extract_zip(
        &self,
        task: &ArchiveTask,
        budget: &mut OutputBudget,
    ) -> Result<(), ExtractError> {
        let file = open(&task.archive)?;
        let mut archive = ZipArchive::new(file).map_err(|e| map_zip_error(task, e))?;

        for idx in 0..archive.len() {
            if self.is_cancelled() {
                return Err(ExtractError::Cancelled(task.archive.clone()));
            }
            let mut entry = archive.by_index(idx).map_err(|e| map_zip_error(task, e))?;
            let Some(relative) = entry.enclosed_name() else {
                log::warn!(
                    "Skipping unsafe entry '{}' in {}",
                    entry.name(),
                    task.archive.display()
                );
                continue;
            };
            let out_path = task.dest_dir.join(relative);

            if entry.is_dir() {
                create_dir(&out_path)?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                create_dir(parent)?;
            }
            let mut out = create_file(&out_path)?;
            copy_charged(&mut entry, &mut out, &out_path, budget, task)?;
        }
        Ok(())
    }

    fn extract_tar<R: Read>(
        &self,
        mut archive: TarArchive<R>,
        task: &ArchiveTask,
        budget: &mut OutputBudget,
    ) -> Result<(), ExtractError> {
        let entries = archive.entries().map_err(|e| corrupt(task, e))?;
        for entry in entries {
            if self.is_cancelled() {
                return Err(ExtractError::Cancelled(task.archive.clone()));
            }
            let mut entry = entry.map_err(|e| corrupt(task, e))?;
            let raw = entry.path().map_err(|e| corrupt(task, e))?.into_owned();
            let Some(out_path) = sanitize_entry_path(&task.dest_dir, &raw) else {
                log::warn!(
                    "Skipping unsafe entry '{}' in {}",
                    raw.display(),
                    task.archive.display()
                );
                continue;
            };

            let kind = entry.header().entry_type();
            if kind.is_dir() {
                create_dir(&out_path)?;
            } else if kind.is_file() || kind.is_contiguous() {
                if let Some(parent) = out_path.parent() {
                    create_dir(parent)?;
                }
                let mut out = create_file(&out_path)?;
                copy_charged(&mut entry, &mut out, &out_path, budget, task)?;
            } else {
                // links and special files are not content
                log::debug!("Skipping {:?} entry '{}'", kind, raw.display());
            }
        }
        Ok(())
    }

    fn extract_7z(
        &self,
        task: &ArchiveTask,
        budget: &mut OutputBudget,
    ) -> Result<(), ExtractError> {
        let file = open(&task.archive)?;
        let mut write_error: Option<ExtractError> = None;
        let mut cancelled = false;
        let dest_root = task.dest_dir.clone();

        let result = sevenz_rust2::decompress_with_extract_fn(
            file,
            &task.dest_dir,
            |entry, reader, _default_path| {
                if self.is_cancelled() {
                    cancelled = true;
                    return Ok(false);
                }
                let Some(out_path) = sanitize_entry_path(&dest_root, Path::new(&entry.name))
                else {
                    log::warn!("Skipping unsafe entry '{}' in 7z archive", entry.name);
                    return Ok(true);
                };
                let written = if entry.is_directory {
                    create_dir(&out_path)
                } else {
                    out_path
                        .parent()
                        .map_or(Ok(()), create_dir)
                        .and_then(|()| create_file(&out_path))
                        .and_then(|mut out| {
                            copy_charged(reader, &mut out, &out_path, budget, task).map(|_| ())
                        })
                };
                match written {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        write_error = Some(e);
                        Ok(false)
                    }
                }
            },
        );

        if cancelled {
            return Err(ExtractError::Cancelled(task.archive.clone()));
        }
        if let Some(e) = write_error {
            return Err(e);
        }
        result.map_err(|e| match e {
            sevenz_rust2::Error::PasswordRequired | sevenz_rust2::Error::MaybeBadPassword(_) => {
                ExtractError::Encrypted(task.archive.clone())
            }
            other => ExtractError::Corrupt {
                path: task.archive.clone(),
                format: task.format,
                reason: other.to_string(),
            },
        })
    }

    fn extract_rar(
        &self,
        task: &ArchiveTask,
        budget: &mut OutputBudget,
    ) -> Result<(), ExtractError> {
        let map_rar = |e: unrar::error::UnrarError| match e.code {
            unrar::error::Code::MissingPassword => ExtractError::Encrypted(task.archive.clone()),
            _ => ExtractError::Corrupt {
                path: task.archive.clone(),
                format: task.format,
                reason: e.to_string(),
            },
        };

        let mut archive = unrar::Archive::new(&task.archive)
            .open_for_processing()
            .map_err(map_rar)?;

        while let Some(header) = archive.read_header().map_err(map_rar)? {
            if self.is_cancelled() {
                return Err(ExtractError::Cancelled(task.archive.clone()));
            }
            let entry = header.entry();
            let safe = sanitize_entry_path(&task.dest_dir, &entry.filename).is_some();
            archive = if entry.is_file() && safe {
                // unrar writes the entry itself, so charge what the header declares
                budget.charge_decompressed_out(entry.unpacked_size, task)?;
                header.extract_with_base(&task.dest_dir).map_err(map_rar)?
            } else {
                if !safe {
                    log::warn!(
                        "Skipping unsafe entry '{}' in {}",
                        entry.filename.display(),
                        task.archive.display()
                    );
                }
                header.skip().map_err(map_rar)?
            };
        }
        Ok(())
    }
}

/// Copy `reader` into `writer` one chunk at a time, charging each chunk
/// before it is written.
fn copy_charged<R: Read + ?Sized, W: Write>(
    reader: &mut R,
    writer: &mut W,
    out_path: &Path,
    budget: &mut OutputBudget,
    task: &ArchiveTask,
) -> Result<u64, ExtractError> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut copied: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(corrupt(task, e)),
        };
        budget.charge_decompressed_out(n as u64, task)?;
        writer.write_all(&buf[..n]).map_err(|source| ExtractError::Io {
            path: out_path.to_path_buf(),
            source,
        })?;
        copied += n as u64;
    }
}

/// Sum of the uncompressed sizes a zip archive declares.
fn declared_zip_size(path: &Path) -> Result<u64, ExtractError> {
    let file = open(path)?;
    let corrupt_zip = |e: ZipError| ExtractError::Corrupt {
        path: path.to_path_buf(),
        format: ArchiveFormat::Zip,
        reason: e.to_string(),
    };
    let mut archive = ZipArchive::new(file).map_err(corrupt_zip)?;
    let mut total: u64 = 0;
    for idx in 0..archive.len() {
        let entry = archive.by_index_raw(idx).map_err(corrupt_zip)?;
        total = total.saturating_add(entry.size());
    }
    Ok(total)
}

fn map_zip_error(task: &ArchiveTask, error: ZipError) -> ExtractError {
    match error {
        ZipError::UnsupportedArchive(detail) if detail == ZipError::PASSWORD_REQUIRED => {
            ExtractError::Encrypted(task.archive.clone())
        }
        ZipError::InvalidPassword => ExtractError::Encrypted(task.archive.clone()),
        ZipError::Io(source) => ExtractError::Corrupt {
            path: task.archive.clone(),
            format: task.format,
            reason: source.to_string(),
        },
        other => ExtractError::Corrupt {
            path: task.archive.clone(),
            format: task.format,
            reason: other.to_string(),
        },
    }
}

fn corrupt(task: &ArchiveTask, error: impl std::fmt::Display) -> ExtractError {
    ExtractError::Corrupt {
        path: task.archive.clone(),
        format: task.format,
        reason: error.to_string(),
    }
}

fn open(path: &Path) -> Result<File, ExtractError> {
    File::open(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(path: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn create_file(path: &Path) -> Result<File, ExtractError> {
    File::create(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Join an archive entry path onto `dest_root`, refusing anything that
/// climbs out of it.
fn sanitize_entry_path(dest_root: &Path, raw: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for comp in raw.components() {
        match comp {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        return None;
    }
    Some(dest_root.join(clean))
}

/// Total size of regular files under `dir`.
pub(crate) fn directory_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn rollback(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        log::warn!("Failed to roll back {}: {}", dir.display(), e);
    }
}
