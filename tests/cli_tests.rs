//! Binary-level tests against a directory-backed remote.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    local: std::path::PathBuf,
    remotes: std::path::PathBuf,
}

impl Fixture {
    /// `<tmp>/Thesis` locally and `<tmp>/remotes/Thesis` as the remote project.
    fn new() -> Self {
        let tmp = TempDir::new().expect("create tempdir");
        let local = tmp.path().join("Thesis");
        let remotes = tmp.path().join("remotes");
        fs::create_dir_all(&local).unwrap();
        fs::create_dir_all(remotes.join("Thesis")).unwrap();
        Self {
            _tmp: tmp,
            local,
            remotes,
        }
    }

    fn remote_file(&self, path: &str) -> std::path::PathBuf {
        self.remotes.join("Thesis").join(path)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("olsync").expect("binary builds");
        cmd.arg(&self.local)
            .arg("--remote")
            .arg(&self.remotes)
            .arg("--non-interactive")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_sync_uploads_and_downloads() {
    let fx = Fixture::new();
    write(&fx.local.join("main.tex"), "local");
    write(&fx.remote_file("refs.bib"), "remote");

    fx.cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("1 uploaded, 1 downloaded"));

    assert_eq!(fs::read_to_string(fx.remote_file("main.tex")).unwrap(), "local");
    assert_eq!(fs::read_to_string(fx.local.join("refs.bib")).unwrap(), "remote");
    assert!(fx.local.join(".olhash").exists());
    assert!(!fx.remote_file(".olhash").exists(), "store is never uploaded");
}

#[test]
fn test_dry_run_lists_actions_without_changes() {
    let fx = Fixture::new();
    write(&fx.local.join("main.tex"), "local");
    write(&fx.remote_file("refs.bib"), "remote");

    fx.cmd()
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("UPLOAD     main.tex"))
        .stdout(predicate::str::contains("DOWNLOAD   refs.bib"))
        .stdout(predicate::str::contains("no changes were made"));

    assert!(!fx.remote_file("main.tex").exists());
    assert!(!fx.local.join("refs.bib").exists());
    assert!(!fx.local.join(".olhash").exists());
}

#[test]
fn test_conflict_is_deferred_when_non_interactive() {
    let fx = Fixture::new();
    write(&fx.local.join("a.tex"), "base");
    fx.cmd().assert().success();

    write(&fx.local.join("a.tex"), "mine");
    write(&fx.remote_file("a.tex"), "theirs");

    fx.cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("Deferred conflicts (1):"));
    assert_eq!(fs::read_to_string(fx.local.join("a.tex")).unwrap(), "mine");
    assert_eq!(fs::read_to_string(fx.remote_file("a.tex")).unwrap(), "theirs");
}

#[test]
fn test_push_overwrites_remote_conflict() {
    let fx = Fixture::new();
    write(&fx.local.join("a.tex"), "base");
    fx.cmd().assert().success();

    write(&fx.local.join("a.tex"), "mine");
    write(&fx.remote_file("a.tex"), "theirs");

    fx.cmd().arg("--push").assert().success();
    assert_eq!(fs::read_to_string(fx.remote_file("a.tex")).unwrap(), "mine");
}

#[test]
fn test_exclude_and_ignore_file_are_honoured() {
    let fx = Fixture::new();
    write(&fx.local.join(".olignore"), "# latex junk\n*.aux\n");
    write(&fx.local.join("main.tex"), "m");
    write(&fx.local.join("main.aux"), "aux");
    write(&fx.local.join("main.log"), "log");

    fx.cmd().args(["-x", "*.log"]).assert().success();

    assert!(fx.remote_file("main.tex").exists());
    assert!(!fx.remote_file("main.aux").exists());
    assert!(!fx.remote_file("main.log").exists());
    assert!(!fx.remote_file(".olignore").exists());
}

#[test]
fn test_name_flag_selects_and_remembers_project() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.remotes.join("Paper")).unwrap();
    write(&fx.local.join("main.tex"), "m");

    fx.cmd().args(["--name", "Paper"]).assert().success();

    assert!(fx.remotes.join("Paper/main.tex").exists());
    let settings = fs::read_to_string(fx.local.join(".olsync.toml")).unwrap();
    assert!(settings.contains("project = \"Paper\""));
    assert!(!fx.remotes.join("Paper/.olsync.toml").exists());
}

#[test]
fn test_corrupt_store_fails_with_advice() {
    let fx = Fixture::new();
    write(&fx.local.join(".olhash"), "garbage");

    fx.cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Inspect or delete"));
}

#[test]
fn test_missing_remote_project_fails() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["--name", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_missing_remote_configuration_fails() {
    let fx = Fixture::new();

    Command::cargo_bin("olsync")
        .unwrap()
        .arg(&fx.local)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No remote configured"));
}

#[test]
fn test_push_and_pull_conflict() {
    let fx = Fixture::new();
    fx.cmd().args(["--push", "--pull"]).assert().failure();
}
