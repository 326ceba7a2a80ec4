use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use dupesweep::duplicates::{
    Decision, DuplicateCriterion, DuplicateFinder, ResolutionMode, RunHandle, RunSummary,
    MAX_PROMPT_ATTEMPTS,
};
use dupesweep::events::EngineEvent;
use dupesweep::session::{RunManifest, RunReport};

use super::common::{files_under, Sandbox};

/// Answer every request from `script`, cancelling once it runs out.
/// Returns the summary and the attempt numbers seen.
fn scripted(handle: RunHandle, script: Vec<Decision>) -> (RunSummary, Vec<usize>) {
    let mut script: VecDeque<Decision> = script.into();
    let mut attempts = Vec::new();
    for event in handle.events.iter() {
        if let EngineEvent::DuplicateGroupFound(request) = event {
            attempts.push(request.attempt);
            let decision = script.pop_front().unwrap_or(Decision::Cancel);
            request.respond(decision);
        }
    }
    (handle.join().unwrap(), attempts)
}

fn interactive(sb: &Sandbox) -> RunHandle {
    let policy = sb.policy().with_resolution(ResolutionMode::Interactive);
    DuplicateFinder::new(sb.config_with(policy))
        .spawn(sb.root.clone())
        .unwrap()
}

#[test]
fn test_cancel_leaves_group_in_place() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");
    sb.file("c.txt", b"X");

    let (summary, attempts) = scripted(interactive(&sb), vec![Decision::Cancel]);

    assert_eq!(attempts, vec![1]);
    assert_eq!(summary.groups, 1);
    assert_eq!(summary.groups_cancelled, 1);
    assert_eq!(summary.files_moved, 0);
    assert_eq!(files_under(&sb.root), vec!["a.txt", "b.txt", "c.txt"]);
    assert!(files_under(&sb.dups).is_empty());
    assert!(sb.error_log().contains("\tcancelled\t"));
}

#[test]
fn test_invalid_selection_is_asked_again() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");

    let (summary, attempts) = scripted(
        interactive(&sb),
        vec![Decision::Keep(vec![]), Decision::Keep(vec![9]), Decision::Keep(vec![0])],
    );

    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(summary.files_moved, 1);
    assert_eq!(files_under(&sb.root), vec!["a.txt"]);
}

#[test]
fn test_endless_invalid_answers_cancel_the_group() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");

    let script = vec![Decision::Keep(vec![5]); MAX_PROMPT_ATTEMPTS + 1];
    let (summary, attempts) = scripted(interactive(&sb), script);

    assert_eq!(attempts.len(), MAX_PROMPT_ATTEMPTS);
    assert_eq!(summary.groups_cancelled, 1);
    assert_eq!(files_under(&sb.root), vec!["a.txt", "b.txt"]);
}

#[test]
fn test_keeping_a_later_copy_updates_manifest() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");
    sb.file("c.txt", b"X");

    let (summary, _) = scripted(interactive(&sb), vec![Decision::Keep(vec![2])]);

    assert_eq!(summary.files_moved, 2);
    assert_eq!(files_under(&sb.root), vec!["c.txt"]);
    assert_eq!(files_under(&sb.dups), vec!["a.txt", "b.txt"]);

    let manifest = RunManifest::read_from(&sb.artifacts.join("manifest.tsv")).unwrap();
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.entries()[0].path, sb.root.join("c.txt"));
}

#[test]
fn test_dropped_front_end_cancels_every_group() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");
    sb.file("c.txt", b"Y");
    sb.file("d.txt", b"Y");

    let handle = interactive(&sb);
    for event in handle.events.iter() {
        // let the request fall on the floor
        if let EngineEvent::DuplicateGroupFound(request) = event {
            drop(request);
        }
    }
    let summary = handle.join().unwrap();

    assert_eq!(summary.groups, 2);
    assert_eq!(summary.groups_cancelled, 2);
    assert_eq!(files_under(&sb.root).len(), 4);
}

#[test]
fn test_name_criterion_moves_only_same_named_copies() {
    let sb = Sandbox::new();
    sb.file("a/photo.jpg", b"P");
    sb.file("b/photo.jpg", b"P");
    sb.file("c/renamed.jpg", b"P");

    let policy = sb
        .policy()
        .with_criterion(DuplicateCriterion::ContentSizeAndName);
    let summary = DuplicateFinder::new(sb.config_with(policy))
        .run(&sb.root, &dupesweep::events::EventSender::disconnected())
        .unwrap();

    assert_eq!(summary.groups, 1);
    assert_eq!(summary.files_moved, 1);
    assert_eq!(files_under(&sb.root), vec!["a/photo.jpg", "c/renamed.jpg"]);
}

#[test]
fn test_report_records_resolutions() {
    let sb = Sandbox::new();
    sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");
    let report_path = sb.artifacts.join("report.json");

    let summary = DuplicateFinder::new(sb.config().with_report_path(Some(report_path.clone())))
        .run(&sb.root, &dupesweep::events::EventSender::disconnected())
        .unwrap();
    assert_eq!(summary.report_path.as_deref(), Some(report_path.as_path()));

    let report = RunReport::load(&report_path).unwrap();
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].resolution.kept, vec![sb.root.join("a.txt")]);
    assert_eq!(report.groups[0].resolution.discarded, vec![sb.root.join("b.txt")]);
    assert_eq!(report.summary.files_moved, 1);
}

#[test]
fn test_keep_none_with_packaging_points_into_zip() {
    let sb = Sandbox::new();
    let original = sb.file("a.txt", b"X");
    sb.file("b.txt", b"X");
    sb.file("c.txt", b"Y");

    let policy = sb.policy().with_resolution(ResolutionMode::Interactive);
    let handle = DuplicateFinder::new(sb.config_with(policy).with_package_duplicates(true))
        .spawn(sb.root.clone())
        .unwrap();
    let (summary, _) = scripted(handle, vec![Decision::KeepNone]);

    assert_eq!(summary.files_moved, 2);
    let finalize = summary.finalize.expect("packaging enabled");
    assert_eq!(finalize.files_packaged, 2);
    assert!(finalize.recycled);
    assert!(files_under(&sb.dups).is_empty());

    let zip_path = finalize.recycled_to.clone().unwrap();
    assert!(zip_path.starts_with(&sb.holding));
    assert!(zip_path.exists());

    let manifest = RunManifest::read_from(&sb.artifacts.join("manifest.tsv")).unwrap();
    assert_eq!(manifest.len(), 2);
    let survivor = manifest
        .entries()
        .iter()
        .map(|e| e.path.clone())
        .find(|p| p != &sb.root.join("c.txt"))
        .unwrap();
    assert_ne!(survivor, original);
    assert_eq!(survivor, PathBuf::from(format!("{}!/a.txt", zip_path.display())));

    let mut archive = zip::ZipArchive::new(fs::File::open(&zip_path).unwrap()).unwrap();
    assert!(archive.by_name("a.txt").is_ok());
}
