use std::fs;

use dupesweep::duplicates::DuplicateFinder;
use dupesweep::events::EventSender;
use dupesweep::session::RunManifest;

use super::common::{files_under, write_zip, zip_bytes, Sandbox};

#[test]
fn test_plain_duplicate_is_moved() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");

    let summary = DuplicateFinder::new(sb.config())
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.groups, 1);
    assert_eq!(summary.files_moved, 1);
    assert_eq!(files_under(&sb.root), vec!["a.txt"]);
    assert_eq!(files_under(&sb.dups), vec!["b.txt"]);
    assert!(!summary.has_errors());
}

#[test]
fn test_zip_member_duplicates_top_level_file() {
    let sb = Sandbox::new();
    write_zip(&sb.root.join("archive.zip"), &[("c.txt", b"Y")]);
    sb.file("c_copy.txt", b"Y");

    let summary = DuplicateFinder::new(sb.config())
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.archives_expanded, 1);
    assert_eq!(summary.groups, 1);
    // the expansion dir sorts before c_copy.txt, so the extracted copy wins
    assert!(sb.root.join("archive/c.txt").exists());
    assert!(!sb.root.join("archive.zip").exists());
    assert!(!sb.root.join("c_copy.txt").exists());
    assert_eq!(files_under(&sb.dups), vec!["c_copy.txt"]);
    assert_eq!(files_under(&sb.holding), vec!["archive.zip"]);
}

#[test]
fn test_corrupt_rar_is_quarantined_and_walk_continues() {
    let sb = Sandbox::new();
    sb.file("bad.rar", b"Rar!\x1a\x07\x00 truncated");
    sb.file("x1.txt", b"same");
    sb.file("x2.txt", b"same");

    let summary = DuplicateFinder::new(sb.config())
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.archives_quarantined, 1);
    assert_eq!(summary.unsupported, 1);
    assert_eq!(files_under(&sb.unsupported), vec!["bad.rar"]);
    assert_eq!(summary.files_moved, 1);
    assert!(summary.has_errors());
    assert!(sb.error_log().contains("\textract\t"));
}

#[test]
fn test_nested_archive_duplicate_is_detected() {
    let sb = Sandbox::new();
    let inner = zip_bytes(&[("deep.txt", b"nested content")]);
    write_zip(&sb.root.join("outer.zip"), &[("inner.zip", &inner)]);
    sb.file("z_top.txt", b"nested content");

    let summary = DuplicateFinder::new(sb.config())
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.archives_expanded, 2);
    assert_eq!(summary.groups, 1);
    assert!(sb.root.join("outer/inner/deep.txt").exists());
    assert_eq!(files_under(&sb.dups), vec!["z_top.txt"]);
}

#[test]
fn test_second_run_finds_nothing_and_matches_manifest() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");
    sb.file("sub/c.txt", b"Y");

    let first_manifest = sb.artifacts.join("first.tsv");
    let first = DuplicateFinder::new(sb.config().with_manifest_path(Some(first_manifest.clone())))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();
    assert_eq!(first.groups, 1);

    let second_manifest = sb.artifacts.join("second.tsv");
    let second =
        DuplicateFinder::new(sb.config().with_manifest_path(Some(second_manifest.clone())))
            .run(&sb.root, &EventSender::disconnected())
            .unwrap();
    assert_eq!(second.groups, 0);
    assert_eq!(second.files_moved, 0);

    let first = RunManifest::read_from(&first_manifest).unwrap();
    let second = RunManifest::read_from(&second_manifest).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first.as_set(), second.as_set());
}

#[test]
fn test_destinations_inside_root_are_not_swept() {
    let sb = Sandbox::new();
    let dups = sb.root.join("_dups");
    let unsupported = sb.root.join("_unsupported");
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");
    fs::create_dir_all(&dups).unwrap();
    fs::write(dups.join("old.txt"), b"X").unwrap();

    let policy = dupesweep::scanner::PolicyConfig::new(&dups, &unsupported);
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.files_moved, 1);
    assert_eq!(files_under(&dups), vec!["b.txt", "old.txt"]);
}
