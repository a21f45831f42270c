//! The REPL runs commands and exits cleanly without a model runtime.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn repl_commands_and_exit_with_saved_profile() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("userdata.json"),
        r#"{"name":"Anu","semester":"S6","branch":"CSE","interests":"","firstTime":false}"#,
    )
    .unwrap();

    Command::new(assert_cmd::cargo::cargo_bin!("kuttai"))
        .env("KUTTAI_DATA_DIR", dir.path())
        // Nothing listens here; the REPL must still start.
        .env("KUTTAI_OLLAMA_BASE_URL", "http://127.0.0.1:9")
        .env_remove("KUTTAI_ENV_FILE")
        .write_stdin("/profile\n/sites\n/bogus\n/fetch\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Name: Anu"))
        .stdout(predicate::str::contains("https://ktunotes.in"))
        .stdout(predicate::str::contains("Unknown command: /bogus"))
        .stdout(predicate::str::contains("Usage: /fetch <URL>"))
        .stdout(predicate::str::contains("Goodbye"));

    let saved = std::fs::read_to_string(dir.path().join("userdata.json")).unwrap();
    assert!(saved.contains("\"firstTime\": false"));
}

#[test]
fn first_run_collects_profile_from_stdin() {
    let dir = tempfile::tempdir().expect("tempdir");

    Command::new(assert_cmd::cargo::cargo_bin!("kuttai"))
        .arg("chat")
        .env("KUTTAI_DATA_DIR", dir.path())
        .env("KUTTAI_OLLAMA_BASE_URL", "http://127.0.0.1:9")
        .env_remove("KUTTAI_ENV_FILE")
        .write_stdin("Anu\nS6\nCSE\ncompilers\nexit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile setup complete"));

    let saved: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("userdata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["name"], "Anu");
    assert_eq!(saved["interests"], "compilers");
    assert_eq!(saved["firstTime"], false);
}
