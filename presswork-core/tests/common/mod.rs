//! Shared fixtures for the engine's integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use presswork_config::Config;
use presswork_core::Store;
use presswork_model::Issue;

/// A config rooted in a temp directory with all the standard trees
/// created. Tool paths point at nonexistent binaries unless a test
/// installs fakes.
pub fn test_config(root: &Path) -> Config {
    let workflow_path = root.join("workflow");
    let page_review_path = root.join("page-review");
    let master_backup_path = root.join("master-backup");
    let batch_output_path = root.join("batches");
    for dir in [
        &workflow_path,
        &page_review_path,
        &master_backup_path,
        &batch_output_path,
    ] {
        fs::create_dir_all(dir).unwrap();
    }

    Config {
        db_path: root.join("presswork.db"),
        ghostscript: root.join("bin/gs"),
        pdf_separate: root.join("bin/pdfseparate"),
        derivative_builder: root.join("bin/make-derivatives"),
        pdf_batch_marc_org_code: "oru".to_string(),
        workflow_path,
        page_review_path,
        master_backup_path,
        batch_output_path,
        minimum_issue_pages: 2,
    }
}

pub fn arc_config(root: &Path) -> Arc<Config> {
    Arc::new(test_config(root))
}

/// Saves a fresh issue with a derived human name.
pub async fn seed_issue(store: &Store, location: &str) -> Issue {
    let mut issue = Issue::new("oru", "sn12345678", "2024-01-15", 1);
    issue.location = location.to_string();
    let mut saved = store.save_issue(&issue).await.unwrap();
    saved.human_name();
    store.save_issue(&saved).await.unwrap()
}

/// Writes a tiny executable shell script, for standing in as an external
/// binary.
#[cfg(unix)]
pub fn install_fake_tool(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// A directory seeded with the given files, each holding junk PDF bytes.
pub fn seed_dir(dir: &Path, files: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    for name in files {
        fs::write(dir.join(name), b"%PDF-1.6 fake content").unwrap();
    }
}

pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Asserts no `.wip-` entry exists anywhere under the given roots.
pub fn assert_no_wip(roots: &[&PathBuf]) {
    for root in roots {
        for entry in walk(root) {
            assert!(
                !entry.contains(".wip-"),
                "leftover WIP entry {entry:?} under {root:?}"
            );
        }
    }
}

fn walk(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    if !root.exists() {
        return out;
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            out.push(entry.path().to_string_lossy().into_owned());
            if entry.file_type().unwrap().is_dir() {
                stack.push(entry.path());
            }
        }
    }
    out
}
