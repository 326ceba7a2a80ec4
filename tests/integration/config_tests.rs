use clap::Parser;
use dupesweep::cli::{Cli, Commands};
use dupesweep::config::Config;
use dupesweep::duplicates::{DuplicateCriterion, DuplicateFinder, ResolutionMode};
use dupesweep::events::EventSender;
use dupesweep::scanner::HashAlgorithm;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use tempfile::tempdir;

use super::common::{files_under, Sandbox};

fn run_args(argv: &[&str]) -> dupesweep::cli::RunArgs {
    match Cli::try_parse_from(argv).unwrap().command {
        Commands::Run(args) => args,
        other => panic!("expected run, got {other:?}"),
    }
}

#[test]
fn test_cli_flags_override_file_values() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
duplicates_dir = "/from/file/dups"
unsupported_dir = "/from/file/other"
min_size = 4096
hash_algorithm = "sha256"
criterion = "content-size-and-name"
"#,
    )
    .unwrap();

    let args = run_args(&[
        "dupesweep",
        "run",
        "/inbox",
        "--duplicates",
        "/from/cli/dups",
        "--min-size",
        "1KiB",
        "--interactive",
    ]);
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .merge(Serialized::defaults(args.overrides()));
    let config = Config::extract(&figment).unwrap();

    assert_eq!(
        config.duplicates_dir.as_deref(),
        Some(std::path::Path::new("/from/cli/dups"))
    );
    assert_eq!(
        config.unsupported_dir.as_deref(),
        Some(std::path::Path::new("/from/file/other"))
    );
    assert_eq!(config.min_size, 1024);
    assert_eq!(config.resolution, ResolutionMode::Interactive);
    assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
    assert_eq!(config.criterion, DuplicateCriterion::ContentSizeAndName);
}

#[test]
fn test_environment_layer() {
    std::env::set_var("DUPESWEEP_CFGTEST_MIN_SIZE", "77");
    std::env::set_var("DUPESWEEP_CFGTEST_SKIP_HIDDEN", "true");

    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("DUPESWEEP_CFGTEST_").split("__"));
    let config = Config::extract(&figment).unwrap();

    assert_eq!(config.min_size, 77);
    assert!(config.skip_hidden);

    std::env::remove_var("DUPESWEEP_CFGTEST_MIN_SIZE");
    std::env::remove_var("DUPESWEEP_CFGTEST_SKIP_HIDDEN");
}

#[test]
fn test_media_flag_becomes_allow_list() {
    let args = run_args(&["dupesweep", "run", "/inbox", "--media"]);
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Serialized::defaults(args.overrides()));
    let config = Config::extract(&figment).unwrap();

    let filter = config.extension_filter().unwrap().unwrap();
    assert!(filter.matches(std::path::Path::new("IMG_0001.JPEG")));
    assert!(!filter.matches(std::path::Path::new("clip.mov")));
}

#[test]
fn test_config_drives_a_run() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");

    let config = Config {
        duplicates_dir: Some(sb.dups.clone()),
        unsupported_dir: Some(sb.unsupported.clone()),
        holding_dir: Some(sb.holding.clone()),
        manifest_path: Some(sb.artifacts.join("manifest.tsv")),
        error_log_path: Some(sb.artifacts.join("errors.log")),
        package_duplicates: true,
        ..Config::default()
    };

    let summary = DuplicateFinder::new(config.finder_config().unwrap())
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.files_moved, 1);
    let finalize = summary.finalize.expect("packaging enabled");
    assert_eq!(finalize.files_packaged, 1);
    assert!(finalize.is_clean());
    assert!(files_under(&sb.dups).is_empty());

    let held = files_under(&sb.holding);
    assert_eq!(held.len(), 1);
    assert!(held[0].starts_with("dups-") && held[0].ends_with(".zip"));
}
