//! The `strata` binary, end to end.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use strata::{load_chunks, Chunk};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn strata(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_strata"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn write_pages(dir: &Path) -> PathBuf {
    let path = dir.join("xj.txt");
    let pages = [
        "0 Lubrication and Maintenance\n\nSERVICE PROCEDURES\n\nJUMP STARTING PROCEDURE\n\n\
         (1) Connect the positive cable.\n(2) Connect the negative cable.\n\n\
         Refer to Group 8A for battery testing.",
        "8A Battery\n\nBATTERY TESTING\n\n(1) Test the open circuit voltage.",
    ];
    std::fs::write(&path, pages.join("\u{c}")).unwrap();
    path
}

#[test]
fn process_writes_chunks_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let pages = write_pages(dir.path());
    let out = dir.path().join("out");
    let profile = fixture("xj_1999_profile.yaml");

    let output = strata(&[
        "process",
        "--profile",
        profile.to_str().unwrap(),
        "--pages",
        pages.to_str().unwrap(),
        "--output-dir",
        out.to_str().unwrap(),
        "--manifest",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let chunks = load_chunks(out.join("xj-1999_chunks.jsonl")).unwrap();
    let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "xj-1999::0::SERVICE PROCEDURES::JUMP STARTING PROCEDURE",
            "xj-1999::8A::BATTERY TESTING",
        ]
    );
    assert!(out.join("xj-1999_manifest.json").exists());
}

#[test]
fn pages_may_be_a_json_array() {
    let dir = tempfile::tempdir().unwrap();
    let pages = dir.path().join("pages.json");
    std::fs::write(&pages, r#"["7 Cooling System", "(1) Drain the radiator."]"#).unwrap();
    let out = dir.path().join("out");

    let output = strata(&[
        "-q",
        "process",
        "--profile",
        fixture("xj_1999_profile.yaml").to_str().unwrap(),
        "--pages",
        pages.to_str().unwrap(),
        "--output-dir",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let chunks = load_chunks(out.join("xj-1999_chunks.jsonl")).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "7 Cooling System\n\n(1) Drain the radiator.");
}

#[test]
fn invalid_profile_fails_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let pages = write_pages(dir.path());
    let out = dir.path().join("out");

    let output = strata(&[
        "process",
        "--profile",
        fixture("invalid_profile.yaml").to_str().unwrap(),
        "--pages",
        pages.to_str().unwrap(),
        "--output-dir",
        out.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid profile"));
    assert!(!out.exists());
}

#[test]
fn inspect_reports_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let pages = write_pages(dir.path());

    let output = strata(&[
        "inspect",
        "--profile",
        fixture("xj_1999_profile.yaml").to_str().unwrap(),
        "--pages",
        pages.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("boundary statistics"));
}

#[test]
fn validate_chunks_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let profile = fixture("xj_1999_profile.yaml");

    let mut good = Chunk::new("xj-1999::0::SP", "xj-1999", vec!["word"; 150].join(" "));
    for (key, value) in [
        ("document_id", "xj-1999"),
        ("level1_id", "0"),
        ("content_type", "procedure"),
    ] {
        good.metadata.insert(key.into(), value.into());
    }
    let good_path = dir.path().join("good.jsonl");
    strata::save_chunks(&[good.clone()], &good_path).unwrap();

    let output = strata(&[
        "validate-chunks",
        "--profile",
        profile.to_str().unwrap(),
        "--chunks",
        good_path.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["passed"], serde_json::json!(true));
    assert_eq!(report["checks_run"].as_array().unwrap().len(), 7);

    let mut bad = good;
    bad.metadata.remove("level1_id");
    let bad_path = dir.path().join("bad.jsonl");
    strata::save_chunks(&[bad], &bad_path).unwrap();

    let output = strata(&[
        "validate-chunks",
        "--profile",
        profile.to_str().unwrap(),
        "--chunks",
        bad_path.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
}
