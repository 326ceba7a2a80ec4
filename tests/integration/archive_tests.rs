use std::fs::File;

use dupesweep::archive::ExpansionLimits;
use dupesweep::duplicates::DuplicateFinder;
use dupesweep::events::EventSender;
use dupesweep::scanner::ExtensionFilter;

use super::common::{files_under, write_zip, zip_bytes, Sandbox};

fn write_tar_gz(path: &std::path::Path, entries: &[(&str, &[u8])]) {
    let encoder = flate2::write::GzEncoder::new(File::create(path).unwrap(), Default::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

#[test]
fn test_tar_gz_is_expanded_next_to_itself() {
    let sb = Sandbox::new();
    write_tar_gz(
        &sb.root.join("bundle.tar.gz"),
        &[("photos/one.jpg", b"jpeg bytes"), ("notes.txt", b"hello")],
    );

    let summary = DuplicateFinder::new(sb.config())
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.archives_expanded, 1);
    assert_eq!(
        files_under(&sb.root),
        vec!["bundle/notes.txt", "bundle/photos/one.jpg"]
    );
    assert_eq!(files_under(&sb.holding), vec!["bundle.tar.gz"]);
}

#[test]
fn test_taken_expansion_name_gets_suffix() {
    let sb = Sandbox::new();
    sb.file("archive/existing.txt", b"already here");
    write_zip(&sb.root.join("archive.zip"), &[("inside.txt", b"zipped")]);

    DuplicateFinder::new(sb.config())
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert!(sb.root.join("archive/existing.txt").exists());
    assert!(sb.root.join("archive_1/inside.txt").exists());
}

#[test]
fn test_depth_limit_quarantines_inner_archive() {
    let sb = Sandbox::new();
    let inner = zip_bytes(&[("deep.txt", b"deep")]);
    write_zip(&sb.root.join("outer.zip"), &[("inner.zip", &inner)]);

    let policy = sb.policy().with_limits(ExpansionLimits {
        max_depth: Some(1),
        max_total_bytes: None,
    });
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.archives_expanded, 1);
    assert_eq!(summary.archives_quarantined, 1);
    assert_eq!(files_under(&sb.unsupported), vec!["inner.zip"]);
    assert!(!sb.root.join("outer/inner").exists());
    assert!(sb.error_log().contains("nesting depth 2 exceeds limit 1"));
}

#[test]
fn test_byte_budget_fails_closed() {
    let sb = Sandbox::new();
    write_zip(&sb.root.join("big.zip"), &[("blob.bin", &[7u8; 4096])]);

    let policy = sb.policy().with_limits(ExpansionLimits {
        max_depth: None,
        max_total_bytes: Some(1024),
    });
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.archives_expanded, 0);
    assert_eq!(summary.archives_quarantined, 1);
    assert!(!sb.root.join("big").exists());
    assert_eq!(files_under(&sb.unsupported), vec!["big.zip"]);
}

#[test]
fn test_office_document_is_not_a_container() {
    let sb = Sandbox::new();
    write_zip(
        &sb.root.join("report.docx"),
        &[("[Content_Types].xml", b"<Types/>"), ("word/document.xml", b"<w/>")],
    );

    let summary = DuplicateFinder::new(sb.config())
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.archives_expanded, 0);
    assert_eq!(summary.tracked, 1);
    assert_eq!(files_under(&sb.root), vec!["report.docx"]);
}

#[test]
fn test_archives_are_plain_files_without_expansion() {
    let sb = Sandbox::new();
    write_zip(&sb.root.join("a.zip"), &[("x.txt", b"x")]);
    std::fs::copy(sb.root.join("a.zip"), sb.root.join("b.zip")).unwrap();

    let policy = sb.policy().with_expand_archives(false);
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.archives_expanded, 0);
    assert_eq!(summary.groups, 1);
    assert_eq!(files_under(&sb.dups), vec!["b.zip"]);
}

#[test]
fn test_archive_expanded_even_when_not_in_allow_list() {
    let sb = Sandbox::new();
    write_zip(
        &sb.root.join("holiday.zip"),
        &[("beach.JPG", b"sand"), ("readme.txt", b"text")],
    );

    let policy = sb
        .policy()
        .with_extensions(Some(ExtensionFilter::media()));
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.archives_expanded, 1);
    assert_eq!(summary.tracked, 1);
    assert_eq!(summary.unsupported, 1);
    assert_eq!(files_under(&sb.root), vec!["holiday/beach.JPG"]);
    assert_eq!(files_under(&sb.unsupported), vec!["readme.txt"]);
}
