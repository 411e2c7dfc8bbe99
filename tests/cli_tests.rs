//! Integration tests for the yamlex CLI
//!
//! These tests run the actual binary and verify output.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the binary to test
fn yamlex_cmd() -> Command {
    Command::cargo_bin("yamlex").unwrap()
}

fn document(text: &str) -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("main.yml");
    fs::write(&file, text).unwrap();
    (temp_dir, file)
}

#[test]
fn test_help_flag() {
    yamlex_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_render_help() {
    yamlex_cmd()
        .args(["render", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--define"))
        .stdout(predicate::str::contains("--lenient"))
        .stdout(predicate::str::contains("--format"));
}

// ============================================================================
// render
// ============================================================================

#[test]
fn test_render_resolves_forward_references() {
    let (_dir, file) = document("a: $b\nvariables:\n  b: X\n");

    yamlex_cmd()
        .arg("render")
        .arg(&file)
        .assert()
        .success()
        .stdout("a: X\nvariables:\n  b: X\n");
}

#[test]
fn test_render_with_define() {
    let (_dir, file) = document("greeting: hello $who\n");

    yamlex_cmd()
        .arg("render")
        .arg(&file)
        .args(["-D", "who=world"])
        .assert()
        .success()
        .stdout("greeting: hello world\n");
}

#[test]
fn test_render_json() {
    let (_dir, file) = document("a: 1\nb: [x, true]\n");

    yamlex_cmd()
        .arg("render")
        .arg(&file)
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"a\": 1"))
        .stdout(predicate::str::contains("\"x\""));
}

#[test]
fn test_render_no_expand() {
    let (_dir, file) = document("a: $b\n");

    yamlex_cmd()
        .arg("render")
        .arg(&file)
        .arg("--no-expand")
        .assert()
        .success()
        .stdout("a: $b\n");
}

#[test]
fn test_render_lenient_keeps_template() {
    let (_dir, file) = document("a: $never_defined_anywhere\n");

    yamlex_cmd()
        .arg("render")
        .arg(&file)
        .arg("--lenient")
        .assert()
        .success()
        .stdout("a: $never_defined_anywhere\n");
}

#[test]
fn test_render_strict_failure() {
    let (_dir, file) = document("a: $never_defined_anywhere\n");

    yamlex_cmd()
        .arg("render")
        .arg(&file)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("YAMLEX-010"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_render_missing_file() {
    yamlex_cmd()
        .args(["render", "/nonexistent/yamlex/main.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("YAMLEX-001"));
}

#[test]
fn test_bad_define_is_rejected() {
    let (_dir, file) = document("a: 1\n");

    yamlex_cmd()
        .arg("render")
        .arg(&file)
        .args(["-D", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NAME=VALUE"));
}

// ============================================================================
// get / check
// ============================================================================

#[test]
fn test_get_scalar_prints_bare_value() {
    let (_dir, file) = document("disk:\n  parts:\n  - size: $s\nvariables:\n  s: 512M\n");

    yamlex_cmd()
        .arg("get")
        .arg(&file)
        .arg("disk.parts.0.size")
        .assert()
        .success()
        .stdout("512M\n");
}

#[test]
fn test_get_subtree_prints_yaml() {
    let (_dir, file) = document("disk:\n  a: 1\n  b: two\n");

    yamlex_cmd()
        .arg("get")
        .arg(&file)
        .arg("disk")
        .assert()
        .success()
        .stdout("a: 1\nb: two\n");
}

#[test]
fn test_get_missing_key() {
    let (_dir, file) = document("a: 1\n");

    yamlex_cmd()
        .arg("get")
        .arg(&file)
        .arg("b.c")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("key 'b.c' not found"));
}

#[test]
fn test_check_valid_document() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("sub.yml"), "x: 1\n").unwrap();
    let file = temp_dir.path().join("main.yml");
    fs::write(&file, "sub: !include sub.yml\n").unwrap();

    yamlex_cmd()
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("resolves"));
}

#[test]
fn test_check_missing_include() {
    let (_dir, file) = document("sub: !include nowhere.yml\n");

    yamlex_cmd()
        .arg("check")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("YAMLEX-020"))
        .stderr(predicate::str::contains("Fix:"));
}
