use std::fs;

use dupesweep::actions::RoutingMode;
use dupesweep::duplicates::{DuplicateFinder, FinderError};
use dupesweep::events::EventSender;
use dupesweep::scanner::{ExtensionFilter, PolicyConfig, PolicyError};

use super::common::{files_under, Sandbox};

#[test]
fn test_extension_match_ignores_case() {
    let sb = Sandbox::new();
    sb.file("PHOTO.JPG", b"img");
    sb.file("copy.jpg", b"img");
    sb.file("notes.txt", b"img");

    let policy = sb
        .policy()
        .with_extensions(Some(ExtensionFilter::new([".jpg"]).unwrap()));
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.tracked, 2);
    assert_eq!(summary.unsupported, 1);
    assert_eq!(files_under(&sb.root), vec!["PHOTO.JPG"]);
    assert_eq!(files_under(&sb.dups), vec!["copy.jpg"]);
    assert_eq!(files_under(&sb.unsupported), vec!["notes.txt"]);
}

#[test]
fn test_copy_routing_leaves_originals() {
    let sb = Sandbox::new();
    sb.file("doc.pdf", b"pdf");

    let policy = sb
        .policy()
        .with_extensions(Some(ExtensionFilter::media()))
        .with_unsupported_routing(RoutingMode::Copy);
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.unsupported, 1);
    assert!(sb.root.join("doc.pdf").exists());
    assert_eq!(files_under(&sb.unsupported), vec!["doc.pdf"]);
}

#[test]
fn test_unsupported_name_collisions_are_suffixed() {
    let sb = Sandbox::new();
    sb.file("one/readme.txt", b"first");
    sb.file("two/readme.txt", b"second");

    let policy = sb
        .policy()
        .with_extensions(Some(ExtensionFilter::media()));
    DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    let routed = files_under(&sb.unsupported);
    assert_eq!(routed.len(), 2);
    assert!(routed.contains(&"readme.txt".to_string()));
    assert_eq!(
        fs::read(sb.unsupported.join("readme.txt")).unwrap(),
        b"first"
    );
}

#[test]
fn test_small_files_are_never_grouped() {
    let sb = Sandbox::new();
    sb.file("a.bin", b"tiny");
    sb.file("b.bin", b"tiny");
    sb.file("c.bin", &[1u8; 64]);
    sb.file("d.bin", &[1u8; 64]);

    let policy = sb.policy().with_min_size(10);
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.groups, 1);
    assert_eq!(files_under(&sb.dups), vec!["d.bin"]);
    assert!(sb.root.join("b.bin").exists());
}

#[test]
fn test_ignored_and_hidden_entries_are_left_alone() {
    let sb = Sandbox::new();
    sb.file("keep.txt", b"X");
    sb.file(".hidden.txt", b"X");
    sb.file("cache/tmp.txt", b"X");

    let policy = sb
        .policy()
        .with_skip_hidden(true)
        .with_ignore_patterns(vec!["cache/".to_string()]);
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.groups, 0);
    assert_eq!(
        files_under(&sb.root),
        vec![".hidden.txt", "cache/tmp.txt", "keep.txt"]
    );
}

#[test]
fn test_bad_policies_fail_before_touching_disk() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");

    let missing = sb.root.join("nope");
    let err = DuplicateFinder::new(sb.config())
        .run(&missing, &EventSender::disconnected())
        .unwrap_err();
    assert!(matches!(err, FinderError::Policy(PolicyError::RootNotFound(_))));

    let around_root = sb.root.parent().unwrap().to_path_buf();
    let policy = PolicyConfig::new(&around_root, &sb.unsupported);
    let err = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap_err();
    assert!(matches!(
        err,
        FinderError::Policy(PolicyError::DestinationContainsRoot { .. })
    ));

    let policy = sb
        .policy()
        .with_ignore_patterns(vec!["[z-a]".to_string()]);
    let err = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap_err();
    assert!(matches!(
        err,
        FinderError::Policy(PolicyError::InvalidIgnorePattern { .. })
    ));

    assert!(!sb.dups.exists());
    assert!(!sb.unsupported.exists());
    assert!(!sb.artifacts.exists());
}

#[test]
fn test_extension_list_file() {
    let sb = Sandbox::new();
    let list = sb.root.parent().unwrap().join("exts.txt");
    fs::write(&list, "# photos\n.PNG\n\ngif\n").unwrap();

    let filter = ExtensionFilter::from_file(&list).unwrap();
    assert_eq!(filter.suffixes(), &[".png".to_string(), ".gif".to_string()]);
    assert!(filter.matches(std::path::Path::new("/x/anim.GIF")));

    fs::write(&list, "# nothing here\n").unwrap();
    assert!(matches!(
        ExtensionFilter::from_file(&list),
        Err(PolicyError::EmptyExtensionList(_))
    ));
}
