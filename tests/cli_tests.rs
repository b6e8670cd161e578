//! CLI surface tests: exit codes and output switches, driving the real
//! binary against temporary source files.

use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;

fn source_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write source");
    file
}

fn nico() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nico"))
}

#[test]
fn clean_file_exits_zero() {
    let file = source_file("let x: i32 = 1 + 2\n");
    let output = nico().arg(file.path()).output().expect("run nico");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn frontend_errors_exit_65() {
    let file = source_file("let y = 1\ny = 2\n");
    let output = nico().arg(file.path()).output().expect("run nico");
    assert_eq!(output.status.code(), Some(65));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("E5010"), "diagnostic code missing: {}", stderr);
}

#[test]
fn more_than_one_path_exits_64() {
    let a = source_file("pass\n");
    let b = source_file("pass\n");
    let output = nico()
        .arg(a.path())
        .arg(b.path())
        .output()
        .expect("run nico");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn missing_file_exits_65() {
    let output = nico().arg("does-not-exist.nico").output().expect("run nico");
    assert_eq!(output.status.code(), Some(65));
}

#[test]
fn emit_mir_prints_the_module() {
    let file = source_file("let x: i32 = 1 + 2\n");
    let output = nico()
        .arg(file.path())
        .arg("--emit")
        .arg("mir")
        .output()
        .expect("run nico");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("func script"), "missing script function: {}", stdout);
    assert!(stdout.contains("alloca"), "missing alloca: {}", stdout);
}

#[test]
fn emit_ast_prints_parenthesized_source() {
    let file = source_file("let x = 1 + 2 * 3\n");
    let output = nico()
        .arg(file.path())
        .arg("--emit")
        .arg("ast")
        .output()
        .expect("run nico");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("let x = (1 + (2 * 3))"), "unexpected ast dump: {}", stdout);
}

#[test]
fn json_diagnostics_are_machine_readable() {
    let file = source_file("let y = 1\ny = 2\n");
    let output = nico()
        .arg(file.path())
        .arg("--json")
        .output()
        .expect("run nico");
    assert_eq!(output.status.code(), Some(65));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"AssignToImmutable\""), "bad json: {}", stdout);
    assert!(stdout.contains("\"severity\": \"error\""), "bad json: {}", stdout);
}
