//! Layered application configuration.
//!
//! Settings are merged with figment in increasing priority:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML file: `--config <path>` or `config.toml` in the platform config dir
//! 3. `DUPESWEEP_*` environment variables (`__` separates nested keys)
//! 4. Command-line flags
//!
//! The merged [`Config`] is turned into a [`PolicyConfig`] and a
//! [`FinderConfig`]; every problem along the way is a [`PolicyError`] and
//! stops the run before anything on disk is touched.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::actions::{Recycler, RoutingMode};
use crate::archive::{ExpansionLimits, DEFAULT_MAX_DEPTH, DEFAULT_MAX_TOTAL_BYTES};
use crate::duplicates::{DuplicateCriterion, FinderConfig, ResolutionMode};
use crate::scanner::{ExtensionFilter, HashAlgorithm, PolicyConfig, PolicyError};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DUPESWEEP_";

/// Effective settings for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Holding area for discarded duplicates.
    pub duplicates_dir: Option<PathBuf>,
    /// Destination for out-of-policy files and quarantined archives.
    pub unsupported_dir: Option<PathBuf>,
    /// Allow-list of suffixes; absent means every file is tracked.
    pub extensions: Option<Vec<String>>,
    /// File holding the allow-list, one suffix per line.
    pub extensions_file: Option<PathBuf>,
    /// Minimum size in bytes for duplicate promotion.
    pub min_size: u64,
    /// Automatic or interactive resolution.
    pub resolution: ResolutionMode,
    /// Duplicate criterion.
    pub criterion: DuplicateCriterion,
    /// Move or copy unsupported files.
    pub unsupported_routing: RoutingMode,
    /// Fingerprint digest.
    pub hash_algorithm: HashAlgorithm,
    /// Expand archives inline.
    pub expand_archives: bool,
    /// Maximum archive nesting; `0` disables the cap.
    pub max_depth: usize,
    /// Maximum bytes written by expansion; `0` disables the cap.
    pub max_expanded_bytes: u64,
    /// Skip dot-files and dot-directories.
    pub skip_hidden: bool,
    /// Gitignore-style patterns excluded from the walk.
    pub ignore_patterns: Vec<String>,
    /// Manifest file; defaults to the platform data dir.
    pub manifest_path: Option<PathBuf>,
    /// Error log file; defaults to the platform data dir.
    pub error_log_path: Option<PathBuf>,
    /// Checksummed JSON report.
    pub report_path: Option<PathBuf>,
    /// Restore directory used instead of the system trash.
    pub holding_dir: Option<PathBuf>,
    /// Package and recycle the duplicates directory at the end.
    pub package_duplicates: bool,
    /// Show every non-fatal error to the user.
    pub surface_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            duplicates_dir: None,
            unsupported_dir: None,
            extensions: None,
            extensions_file: None,
            min_size: 0,
            resolution: ResolutionMode::default(),
            criterion: DuplicateCriterion::default(),
            unsupported_routing: RoutingMode::default(),
            hash_algorithm: HashAlgorithm::default(),
            expand_archives: true,
            max_depth: DEFAULT_MAX_DEPTH,
            max_expanded_bytes: DEFAULT_MAX_TOTAL_BYTES,
            skip_hidden: false,
            ignore_patterns: Vec::new(),
            manifest_path: None,
            error_log_path: None,
            report_path: None,
            holding_dir: None,
            package_duplicates: true,
            surface_errors: false,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "dupesweep", "dupesweep")
}

/// `config.toml` in the platform config directory.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Platform data directory for manifests and error logs.
#[must_use]
pub fn default_data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

impl Config {
    /// Defaults, file and environment layers.
    ///
    /// An explicit `config_file` must exist; the platform default is
    /// optional.
    ///
    /// # Errors
    ///
    /// [`PolicyError::ConfigNotFound`] for a missing explicit file.
    pub fn figment(config_file: Option<&Path>) -> Result<Figment, PolicyError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(PolicyError::ConfigNotFound(path.to_path_buf()));
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = default_config_path() {
                    figment = figment.merge(Toml::file(path));
                }
            }
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract a config from any figment.
    ///
    /// # Errors
    ///
    /// [`PolicyError::Config`] when a layer has the wrong shape.
    pub fn extract(figment: &Figment) -> Result<Self, PolicyError> {
        figment
            .extract()
            .map_err(|e| PolicyError::Config(e.to_string()))
    }

    /// Load defaults, file and environment.
    ///
    /// # Errors
    ///
    /// See [`Config::figment`] and [`Config::extract`].
    pub fn load(config_file: Option<&Path>) -> Result<Self, PolicyError> {
        Self::extract(&Self::figment(config_file)?)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Expansion caps with `0` meaning unlimited.
    #[must_use]
    pub fn limits(&self) -> ExpansionLimits {
        ExpansionLimits {
            max_depth: (self.max_depth > 0).then_some(self.max_depth),
            max_total_bytes: (self.max_expanded_bytes > 0).then_some(self.max_expanded_bytes),
        }
    }

    /// The allow-list, from `extensions` or `extensions_file`.
    ///
    /// # Errors
    ///
    /// Both sources set, or either fails to parse.
    pub fn extension_filter(&self) -> Result<Option<ExtensionFilter>, PolicyError> {
        match (&self.extensions, &self.extensions_file) {
            (Some(_), Some(_)) => Err(PolicyError::Config(
                "set either extensions or extensions_file, not both".to_string(),
            )),
            (Some(list), None) => ExtensionFilter::new(list).map(Some),
            (None, Some(path)) => ExtensionFilter::from_file(path).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Build the run policy.
    ///
    /// # Errors
    ///
    /// Missing destinations or a bad allow-list.
    pub fn policy(&self) -> Result<PolicyConfig, PolicyError> {
        let duplicates = self
            .duplicates_dir
            .clone()
            .ok_or_else(|| PolicyError::Config("duplicates_dir is not set".to_string()))?;
        let unsupported = self
            .unsupported_dir
            .clone()
            .ok_or_else(|| PolicyError::Config("unsupported_dir is not set".to_string()))?;

        Ok(PolicyConfig::new(duplicates, unsupported)
            .with_extensions(self.extension_filter()?)
            .with_min_size(self.min_size)
            .with_resolution(self.resolution)
            .with_criterion(self.criterion)
            .with_unsupported_routing(self.unsupported_routing)
            .with_hash_algorithm(self.hash_algorithm)
            .with_limits(self.limits())
            .with_expand_archives(self.expand_archives)
            .with_skip_hidden(self.skip_hidden)
            .with_ignore_patterns(self.ignore_patterns.clone()))
    }

    /// Trash or holding directory.
    #[must_use]
    pub fn recycler(&self) -> Recycler {
        match &self.holding_dir {
            Some(dir) => Recycler::Directory(dir.clone()),
            None => Recycler::SystemTrash,
        }
    }

    /// Manifest location, falling back to the platform data dir.
    #[must_use]
    pub fn manifest_location(&self) -> Option<PathBuf> {
        self.manifest_path
            .clone()
            .or_else(|| default_data_dir().map(|d| d.join("manifest.tsv")))
    }

    /// Error log location, falling back to the platform data dir.
    #[must_use]
    pub fn error_log_location(&self) -> Option<PathBuf> {
        self.error_log_path
            .clone()
            .or_else(|| default_data_dir().map(|d| d.join("errors.log")))
    }

    /// Build the full finder configuration.
    ///
    /// # Errors
    ///
    /// See [`Config::policy`].
    pub fn finder_config(&self) -> Result<FinderConfig, PolicyError> {
        Ok(FinderConfig::new(self.policy()?)
            .with_recycler(self.recycler())
            .with_manifest_path(self.manifest_location())
            .with_error_log_path(self.error_log_location())
            .with_report_path(self.report_path.clone())
            .with_package_duplicates(self.package_duplicates)
            .with_surface_errors(self.surface_errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_extract() {
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let config = Config::extract(&figment).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.expand_archives);
        assert_eq!(config.limits(), ExpansionLimits::default());
    }

    #[test]
    fn test_toml_layer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
duplicates_dir = "/srv/dups"
unsupported_dir = "/srv/other"
extensions = [".JPG", "png"]
min_size = 1024
resolution = "interactive"
criterion = "content-size-and-name"
hash_algorithm = "sha256"
max_depth = 0
"#,
        )
        .unwrap();

        let figment =
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&path));
        let config = Config::extract(&figment).unwrap();

        assert_eq!(config.min_size, 1024);
        assert_eq!(config.resolution, ResolutionMode::Interactive);
        assert_eq!(config.criterion, DuplicateCriterion::ContentSizeAndName);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.limits().max_depth, None);

        let policy = config.policy().unwrap();
        let filter = policy.extensions.unwrap();
        assert_eq!(filter.suffixes(), &[".jpg".to_string(), ".png".to_string()]);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "min_size = \"lots\"").unwrap();

        let figment =
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&path));
        assert!(matches!(Config::extract(&figment), Err(PolicyError::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::figment(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, PolicyError::ConfigNotFound(_)));
    }

    #[test]
    fn test_policy_requires_destinations() {
        let err = Config::default().policy().unwrap_err();
        assert!(err.to_string().contains("duplicates_dir"));
    }

    #[test]
    fn test_both_extension_sources_rejected() {
        let config = Config {
            extensions: Some(vec![".jpg".into()]),
            extensions_file: Some(PathBuf::from("/x")),
            ..Config::default()
        };
        assert!(config.extension_filter().is_err());
    }

    #[test]
    fn test_recycler_choice() {
        assert_eq!(Config::default().recycler(), Recycler::SystemTrash);
        let config = Config {
            holding_dir: Some(PathBuf::from("/restore")),
            ..Config::default()
        };
        assert_eq!(config.recycler(), Recycler::Directory(PathBuf::from("/restore")));
    }

    #[test]
    fn test_toml_output_round_trips() {
        let config = Config {
            duplicates_dir: Some(PathBuf::from("/d")),
            ..Config::default()
        };
        let text = config.to_toml().unwrap();
        assert!(text.contains("duplicates_dir = \"/d\""));

        let figment = Figment::from(Toml::string(&text));
        assert_eq!(Config::extract(&figment).unwrap(), config);
    }
}
