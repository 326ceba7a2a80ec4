//! Per-run routing policy.
//!
//! A [`PolicyConfig`] is built once by the caller, checked with
//! [`PolicyConfig::prepare`] before the walk starts, and never mutated by the
//! engine afterwards. Every malformed setting surfaces here as a
//! [`PolicyError`] so the run does not begin.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::gitignore::GitignoreBuilder;

use crate::actions::RoutingMode;
use crate::archive::ExpansionLimits;
use crate::duplicates::{DuplicateCriterion, ResolutionMode};

use super::HashAlgorithm;

/// Extensions accepted by the `--media` preset.
pub const MEDIA_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff"];

/// Configuration problems detected before a run starts.
#[derive(thiserror::Error, Debug)]
pub enum PolicyError {
    /// An allow-list entry could not be interpreted as a suffix.
    #[error("Invalid extension '{0}': expected a suffix such as .jpg")]
    InvalidExtension(String),

    /// The allow-list parsed to nothing.
    #[error("Extension list is empty{}", .0.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    EmptyExtensionList(Option<PathBuf>),

    /// The extension list file could not be read.
    #[error("Cannot read extension list {path}: {source}")]
    ExtensionFile {
        /// File that failed to load
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The root path does not exist.
    #[error("Root path not found: {0}")]
    RootNotFound(PathBuf),

    /// The root path is a file.
    #[error("Root path is not a directory: {0}")]
    RootNotADirectory(PathBuf),

    /// Two destinations resolve to the same directory.
    #[error("Duplicate and unsupported destinations must differ: {0}")]
    SameDestination(PathBuf),

    /// A destination would swallow the whole tree.
    #[error("Destination {destination} contains the root {root}")]
    DestinationContainsRoot {
        /// Offending destination
        destination: PathBuf,
        /// Root being scanned
        root: PathBuf,
    },

    /// A destination directory could not be created.
    #[error("Cannot create destination {path}: {source}")]
    CreateDestination {
        /// Directory that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A gitignore-style pattern failed to parse.
    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidIgnorePattern {
        /// The pattern as given
        pattern: String,
        /// Parser message
        message: String,
    },

    /// A configuration file was named explicitly but is missing.
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Layered configuration failed to deserialize.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Case-insensitive suffix allow-list.
///
/// Entries are stored lowercase with a leading dot, in the order given and
/// without repeats. A file matches when its lowercased name ends with any
/// entry, so multi-part suffixes such as `.tar.gz` work too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    suffixes: Vec<String>,
}

impl ExtensionFilter {
    /// Build a filter from individual entries.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidExtension`] for entries that are only a
    /// dot or contain a path separator, and [`PolicyError::EmptyExtensionList`]
    /// if nothing remains.
    pub fn new<I, S>(entries: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut suffixes: Vec<String> = Vec::new();
        for raw in entries {
            let trimmed = raw.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            let normalized = normalize_suffix(trimmed)?;
            if !suffixes.contains(&normalized) {
                suffixes.push(normalized);
            }
        }
        if suffixes.is_empty() {
            return Err(PolicyError::EmptyExtensionList(None));
        }
        Ok(Self { suffixes })
    }

    /// Parse a comma or whitespace separated list, e.g. `.jpg,.png raw`.
    ///
    /// # Errors
    ///
    /// See [`ExtensionFilter::new`].
    pub fn parse_list(list: &str) -> Result<Self, PolicyError> {
        Self::new(list.split(|c: char| c == ',' || c.is_whitespace()))
    }

    /// Load a list file: entries separated by newlines or commas, `#` starts
    /// a comment.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ExtensionFile`] if the file is unreadable and
    /// the errors of [`ExtensionFilter::new`] otherwise.
    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path).map_err(|source| PolicyError::ExtensionFile {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<&str> = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
            .collect();
        Self::new(entries).map_err(|e| match e {
            PolicyError::EmptyExtensionList(_) => {
                PolicyError::EmptyExtensionList(Some(path.to_path_buf()))
            }
            other => other,
        })
    }

    /// Common image formats.
    #[must_use]
    pub fn media() -> Self {
        Self {
            suffixes: MEDIA_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Whether the file name at `path` carries an allowed suffix.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_ascii_lowercase();
        self.suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }

    /// Normalized entries in insertion order.
    #[must_use]
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

fn normalize_suffix(raw: &str) -> Result<String, PolicyError> {
    let lower = raw.to_ascii_lowercase();
    let with_dot = if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    };
    if with_dot.len() < 2 || with_dot.contains(['/', '\\']) || with_dot.ends_with('.') {
        return Err(PolicyError::InvalidExtension(raw.to_string()));
    }
    Ok(with_dot)
}

/// Immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Allow-list; `None` means every extension is tracked.
    pub extensions: Option<ExtensionFilter>,
    /// Files smaller than this are never promoted to duplicates.
    pub min_size: u64,
    /// Holding area for discarded duplicates.
    pub duplicates_dir: PathBuf,
    /// Destination for out-of-policy files and quarantined archives.
    pub unsupported_dir: PathBuf,
    /// Whether out-of-policy files are moved or copied.
    pub unsupported_routing: RoutingMode,
    /// Automatic or interactive group resolution.
    pub resolution: ResolutionMode,
    /// What counts as a duplicate besides equal content.
    pub criterion: DuplicateCriterion,
    /// Digest used for fingerprints.
    pub hash_algorithm: HashAlgorithm,
    /// Depth and size caps for archive expansion.
    pub limits: ExpansionLimits,
    /// Expand containers at all.
    pub expand_archives: bool,
    /// Skip dot-files and dot-directories.
    pub skip_hidden: bool,
    /// Gitignore-style patterns excluded from the walk.
    pub ignore_patterns: Vec<String>,
}

impl PolicyConfig {
    /// Policy with defaults: no allow-list, zero threshold, automatic resolution.
    #[must_use]
    pub fn new(duplicates_dir: impl Into<PathBuf>, unsupported_dir: impl Into<PathBuf>) -> Self {
        Self {
            extensions: None,
            min_size: 0,
            duplicates_dir: duplicates_dir.into(),
            unsupported_dir: unsupported_dir.into(),
            unsupported_routing: RoutingMode::default(),
            resolution: ResolutionMode::default(),
            criterion: DuplicateCriterion::default(),
            hash_algorithm: HashAlgorithm::default(),
            limits: ExpansionLimits::default(),
            expand_archives: true,
            skip_hidden: false,
            ignore_patterns: Vec::new(),
        }
    }

    /// Set the extension allow-list.
    #[must_use]
    pub fn with_extensions(mut self, filter: Option<ExtensionFilter>) -> Self {
        self.extensions = filter;
        self
    }

    /// Set the minimum size for duplicate promotion.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the resolution mode.
    #[must_use]
    pub fn with_resolution(mut self, mode: ResolutionMode) -> Self {
        self.resolution = mode;
        self
    }

    /// Set the duplicate criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: DuplicateCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set how out-of-policy files are routed.
    #[must_use]
    pub fn with_unsupported_routing(mut self, mode: RoutingMode) -> Self {
        self.unsupported_routing = mode;
        self
    }

    /// Set the digest algorithm.
    #[must_use]
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Set the expansion limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ExpansionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Enable or disable archive expansion.
    #[must_use]
    pub fn with_expand_archives(mut self, expand: bool) -> Self {
        self.expand_archives = expand;
        self
    }

    /// Skip hidden entries.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Add gitignore-style patterns.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Whether `path` is tracked under the allow-list.
    #[must_use]
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.extensions.as_ref().is_none_or(|f| f.matches(path))
    }

    /// Check the policy against `root` and create the destinations.
    ///
    /// On success both destination paths are absolute and canonical so the
    /// walker can exclude them by prefix. Returns the canonical root.
    ///
    /// # Errors
    ///
    /// Any [`PolicyError`]; nothing on disk is touched before validation
    /// of the root and patterns passes.
    pub fn prepare(&mut self, root: &Path) -> Result<PathBuf, PolicyError> {
        let meta = fs::metadata(root).map_err(|_| PolicyError::RootNotFound(root.to_path_buf()))?;
        if !meta.is_dir() {
            return Err(PolicyError::RootNotADirectory(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|_| PolicyError::RootNotFound(root.to_path_buf()))?;

        self.validate_ignore_patterns(&root)?;

        let duplicates = absolutize(&self.duplicates_dir);
        let unsupported = absolutize(&self.unsupported_dir);
        if duplicates == unsupported {
            return Err(PolicyError::SameDestination(duplicates));
        }
        for dest in [&duplicates, &unsupported] {
            if root.starts_with(dest) {
                return Err(PolicyError::DestinationContainsRoot {
                    destination: dest.clone(),
                    root: root.clone(),
                });
            }
        }

        self.duplicates_dir = create_destination(&duplicates)?;
        self.unsupported_dir = create_destination(&unsupported)?;
        log::debug!(
            "Policy prepared: duplicates={}, unsupported={}",
            self.duplicates_dir.display(),
            self.unsupported_dir.display()
        );
        Ok(root)
    }

    fn validate_ignore_patterns(&self, root: &Path) -> Result<(), PolicyError> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in &self.ignore_patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| PolicyError::InvalidIgnorePattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        canonical
    } else if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn create_destination(path: &Path) -> Result<PathBuf, PolicyError> {
    fs::create_dir_all(path).map_err(|source| PolicyError::CreateDestination {
        path: path.to_path_buf(),
        source,
    })?;
    path.canonicalize()
        .map_err(|source| PolicyError::CreateDestination {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let filter = ExtensionFilter::parse_list(".jpg").unwrap();
        assert!(filter.matches(Path::new("/a/PHOTO.JPG")));
        assert!(filter.matches(Path::new("/a/photo.jpg")));
        assert!(!filter.matches(Path::new("/a/photo.jpeg")));
    }

    #[test]
    fn test_parse_list_normalizes_entries() {
        let filter = ExtensionFilter::parse_list("JPG, .png  ,gif,.png").unwrap();
        assert_eq!(filter.suffixes(), &[".jpg", ".png", ".gif"]);
    }

    #[test]
    fn test_multi_part_suffix() {
        let filter = ExtensionFilter::parse_list(".tar.gz").unwrap();
        assert!(filter.matches(Path::new("backup.TAR.GZ")));
        assert!(!filter.matches(Path::new("backup.gz")));
    }

    #[test]
    fn test_invalid_entries_rejected() {
        assert!(matches!(
            ExtensionFilter::parse_list("."),
            Err(PolicyError::InvalidExtension(_))
        ));
        assert!(matches!(
            ExtensionFilter::parse_list(".a/b"),
            Err(PolicyError::InvalidExtension(_))
        ));
        assert!(matches!(
            ExtensionFilter::parse_list(" , "),
            Err(PolicyError::EmptyExtensionList(None))
        ));
    }

    #[test]
    fn test_from_file_with_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exts.txt");
        fs::write(&path, "# images\n.jpg\n.PNG # screenshots\n\n.gif,.bmp\n").unwrap();

        let filter = ExtensionFilter::from_file(&path).unwrap();
        assert_eq!(filter.suffixes(), &[".jpg", ".png", ".gif", ".bmp"]);
    }

    #[test]
    fn test_from_file_missing_and_empty() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ExtensionFilter::from_file(&dir.path().join("none.txt")),
            Err(PolicyError::ExtensionFile { .. })
        ));

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "# nothing\n").unwrap();
        assert!(matches!(
            ExtensionFilter::from_file(&empty),
            Err(PolicyError::EmptyExtensionList(Some(_)))
        ));
    }

    #[test]
    fn test_media_preset() {
        let filter = ExtensionFilter::media();
        assert!(filter.matches(Path::new("x.TIFF")));
        assert!(!filter.matches(Path::new("x.txt")));
    }

    #[test]
    fn test_absent_filter_tracks_everything() {
        let policy = PolicyConfig::new("d", "u");
        assert!(policy.is_tracked(Path::new("anything.xyz")));
        assert!(policy.is_tracked(Path::new("no_extension")));
    }

    #[test]
    fn test_prepare_creates_destinations() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();

        let mut policy = PolicyConfig::new(dir.path().join("dupes"), dir.path().join("unsup"));
        let canonical_root = policy.prepare(&root).unwrap();

        assert!(policy.duplicates_dir.is_dir());
        assert!(policy.unsupported_dir.is_dir());
        assert!(policy.duplicates_dir.is_absolute());
        assert_eq!(canonical_root, root.canonicalize().unwrap());
    }

    #[test]
    fn test_prepare_rejects_bad_roots() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let mut policy = PolicyConfig::new(dir.path().join("d"), dir.path().join("u"));
        assert!(matches!(
            policy.prepare(&dir.path().join("missing")),
            Err(PolicyError::RootNotFound(_))
        ));
        assert!(matches!(
            policy.prepare(&file),
            Err(PolicyError::RootNotADirectory(_))
        ));
    }

    #[test]
    fn test_prepare_rejects_shared_destination() {
        let dir = TempDir::new().unwrap();
        let same = dir.path().join("out");
        let mut policy = PolicyConfig::new(&same, &same);
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();

        assert!(matches!(
            policy.prepare(&root),
            Err(PolicyError::SameDestination(_))
        ));
        assert!(!same.exists());
    }

    #[test]
    fn test_prepare_rejects_reversed_class_range() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        let dupes = dir.path().join("dupes");

        // an unclosed "[" is tolerated by gitignore rules, a reversed range is not
        let mut policy = PolicyConfig::new(&dupes, dir.path().join("unsup"))
            .with_ignore_patterns(vec!["*.tmp".to_string(), "[z-a].log".to_string()]);
        match policy.prepare(&root) {
            Err(PolicyError::InvalidIgnorePattern { pattern, .. }) => {
                assert_eq!(pattern, "[z-a].log");
            }
            other => panic!("expected InvalidIgnorePattern, got {other:?}"),
        }
        assert!(!dupes.exists());

        let mut policy = PolicyConfig::new(&dupes, dir.path().join("unsup"))
            .with_ignore_patterns(vec!["[".to_string()]);
        assert!(policy.prepare(&root).is_ok());
    }

    #[test]
    fn test_prepare_rejects_destination_above_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        let mut policy = PolicyConfig::new(dir.path(), dir.path().join("u"));

        assert!(matches!(
            policy.prepare(&root),
            Err(PolicyError::DestinationContainsRoot { .. })
        ));
    }
}
