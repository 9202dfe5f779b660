/// Integration tests for the EmberKV CLI.
/// Each test pipes a command script into a freshly spawned REPL bound to a
/// temp data file and asserts on the captured stdout.
use std::path::Path;
use tempfile::tempdir;

/// Helper to run CLI commands and capture output
fn run_cli(data_path: &Path, commands: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new("cargo")
        .args(["run", "-p", "cli", "--"])
        .env("EMBER_DATA_PATH", data_path.to_str().unwrap())
        .env("EMBER_SYNC", "false")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        stdin
            .write_all(commands.as_bytes())
            .expect("failed to write to stdin");
        stdin.write_all(b"EXIT\n").expect("failed to write EXIT");
    }

    let output = child.wait_with_output().expect("failed to read output");
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn insert_and_get() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.kv");

    let output = run_cli(&data, "INSERT greeting hello world\nGET greeting\n");
    assert!(output.contains("OK"));
    assert!(output.contains("hello world"));
}

#[test]
fn get_missing_key_prints_nil() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.kv");

    let output = run_cli(&data, "GET nothing\n");
    assert!(output.contains("(nil)"));
}

#[test]
fn delete_then_get() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.kv");

    let output = run_cli(&data, "INSERT k v\nDEL k\nGET k\n");
    assert!(output.contains("(nil)"));
}

#[test]
fn upsert_overwrites() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.kv");

    let output = run_cli(&data, "UPSERT k old\nUPSERT k new\nGET k\n");
    assert!(output.contains("new"));
    assert!(!output.contains("\nold\n"));
}

#[test]
fn duplicate_insert_reports_error() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.kv");

    let output = run_cli(&data, "INSERT k v\nINSERT k w\n");
    assert!(output.contains("ERR"));
    assert!(output.contains("already present"));
}

#[test]
fn keys_lists_in_order() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.kv");

    let output = run_cli(&data, "INSERT b 2\nINSERT a 1\nKEYS\n");
    let a_pos = output.find("a @").expect("a listed");
    let b_pos = output.find("b @").expect("b listed");
    assert!(a_pos < b_pos, "keys must list in key order");
    assert!(output.contains("(2 entries)"));
}

#[test]
fn data_survives_restart() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.kv");

    let first = run_cli(&data, "INSERT persisted yes\n");
    assert!(first.contains("OK"));

    let second = run_cli(&data, "GET persisted\n");
    assert!(second.contains("yes"));
}

#[test]
fn truncate_empties_the_store() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data.kv");

    let output = run_cli(&data, "INSERT k v\nTRUNCATE\nGET k\n");
    assert!(output.contains("(nil)"));
}
