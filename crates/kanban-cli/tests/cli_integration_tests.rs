//! CLI integration tests for kanban
//!
//! Tests the kanban CLI commands end-to-end using assert_cmd. Every test runs
//! against its own config and data directory with the local backend.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a command isolated in `temp_dir`
#[allow(deprecated)]
fn kanban_cmd(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kanban").unwrap();
    cmd.current_dir(temp_dir.path());
    cmd.env("KANBAN_CONFIG_DIR", temp_dir.path().join("config"));
    cmd.env("KANBAN_DATA_DIR", temp_dir.path().join("data"));
    cmd.env_remove("KANBAN_CLOUD_TOKEN");
    cmd.env("RUST_LOG", "kanban=warn");
    cmd
}

/// Add a project and return its id
fn add_project(temp_dir: &TempDir, args: &[&str]) -> String {
    let output = kanban_cmd(temp_dir)
        .args(["--format", "json", "add"])
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "add failed: {:?}", output);
    let project: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    project["id"].as_str().unwrap().to_string()
}

fn list_json(temp_dir: &TempDir, extra: &[&str]) -> Vec<serde_json::Value> {
    let output = kanban_cmd(temp_dir)
        .args(["--format", "json", "list"])
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_add_and_list() {
    let temp_dir = TempDir::new().unwrap();

    kanban_cmd(&temp_dir)
        .args(["add", "Website redesign", "--priority", "high", "--tag", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Project added: Website redesign"));

    kanban_cmd(&temp_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Website redesign [High] #web"))
        .stdout(predicate::str::contains("Wishlist"));

    assert!(temp_dir.path().join("data").join("kanban-projects.json").exists());
}

#[test]
fn test_empty_board_list() {
    let temp_dir = TempDir::new().unwrap();

    kanban_cmd(&temp_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No projects found"));
}

#[test]
fn test_move_changes_stage() {
    let temp_dir = TempDir::new().unwrap();
    let id = add_project(&temp_dir, &["Onboarding flow"]);

    kanban_cmd(&temp_dir)
        .args(["move", &id, "finished"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved 'Onboarding flow' to Finished"));

    assert!(list_json(&temp_dir, &["--stage", "wishlist"]).is_empty());
    let finished = list_json(&temp_dir, &["--stage", "Finished"]);
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0]["stage"], "Finished");

    kanban_cmd(&temp_dir)
        .args(["move", &id, "finished"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already in Finished"));
}

#[test]
fn test_next_and_prev_by_id_prefix() {
    let temp_dir = TempDir::new().unwrap();
    let id = add_project(&temp_dir, &["Pipeline"]);
    let prefix = &id[..id.len() - 2];

    kanban_cmd(&temp_dir)
        .args(["next", prefix])
        .assert()
        .success()
        .stdout(predicate::str::contains("to In Progress"));

    kanban_cmd(&temp_dir)
        .args(["prev", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("to Wishlist"));

    kanban_cmd(&temp_dir)
        .args(["prev", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("already at the first stage"));
}

#[test]
fn test_unknown_project_fails() {
    let temp_dir = TempDir::new().unwrap();

    kanban_cmd(&temp_dir)
        .args(["show", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_unknown_stage_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let id = add_project(&temp_dir, &["Stage check"]);

    kanban_cmd(&temp_dir)
        .args(["move", &id, "someday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown stage"));
}

#[test]
fn test_update_and_notes() {
    let temp_dir = TempDir::new().unwrap();
    let id = add_project(&temp_dir, &["Draft", "--description", "first pass"]);

    kanban_cmd(&temp_dir)
        .args(["update", &id, "--title", "Final", "--description", "", "--priority", "low"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated 'Final'"));

    kanban_cmd(&temp_dir)
        .args(["notes", &id, "Waiting on review"])
        .assert()
        .success();

    let output = kanban_cmd(&temp_dir)
        .args(["--format", "json", "show", &id])
        .output()
        .unwrap();
    let project: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(project["title"], "Final");
    assert_eq!(project["priority"], "Low");
    assert_eq!(project["notes"], "Waiting on review");
    assert!(project.get("description").is_none());
}

#[test]
fn test_update_without_fields_fails() {
    let temp_dir = TempDir::new().unwrap();
    let id = add_project(&temp_dir, &["Nothing"]);

    kanban_cmd(&temp_dir)
        .args(["update", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to update"));
}

#[test]
fn test_archive_and_delete() {
    let temp_dir = TempDir::new().unwrap();
    let archived = add_project(&temp_dir, &["Old idea"]);
    let deleted = add_project(&temp_dir, &["Mistake"]);

    kanban_cmd(&temp_dir).args(["archive", &archived]).assert().success();
    kanban_cmd(&temp_dir)
        .args(["delete", &deleted])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 'Mistake'"));

    let all = list_json(&temp_dir, &[]);
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["stage"], "Archived");

    kanban_cmd(&temp_dir).args(["delete", &deleted]).assert().failure();
}

#[test]
fn test_board_shows_every_column() {
    let temp_dir = TempDir::new().unwrap();
    add_project(&temp_dir, &["Research", "--stage", "in progress"]);

    kanban_cmd(&temp_dir)
        .arg("board")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wishlist (0)"))
        .stdout(predicate::str::contains("In Progress (1)"))
        .stdout(predicate::str::contains("Finished (0)"))
        .stdout(predicate::str::contains("Archived (0)"))
        .stdout(predicate::str::contains("Research"));
}

#[test]
fn test_clear_requires_force() {
    let temp_dir = TempDir::new().unwrap();
    add_project(&temp_dir, &["One"]);
    add_project(&temp_dir, &["Two"]);

    kanban_cmd(&temp_dir)
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("Use --force"));
    assert_eq!(list_json(&temp_dir, &[]).len(), 2);

    kanban_cmd(&temp_dir)
        .args(["clear", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 projects"));
    assert!(list_json(&temp_dir, &[]).is_empty());
}

#[test]
fn test_export_then_import_into_fresh_board() {
    let source = TempDir::new().unwrap();
    let id = add_project(&source, &["Portable", "--tag", "travel"]);
    let export_path = source.path().join("export.json");

    kanban_cmd(&source)
        .args(["export", export_path.to_str().unwrap()])
        .assert()
        .success();

    let target = TempDir::new().unwrap();
    kanban_cmd(&target)
        .args(["import", export_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 1 projects (0 already present)"));

    kanban_cmd(&target)
        .args(["import", export_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 0 projects (1 already present)"));

    let imported = list_json(&target, &[]);
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0]["id"], id.as_str());
}

#[test]
fn test_import_accepts_legacy_document() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("legacy.json");
    std::fs::write(
        &path,
        r#"{"projects": [{"id": "1700000000000-abc123", "title": "Legacy", "stage": "Done"}]}"#,
    )
    .unwrap();

    kanban_cmd(&temp_dir)
        .args(["import", path.to_str().unwrap()])
        .assert()
        .success();

    let projects = list_json(&temp_dir, &[]);
    assert_eq!(projects[0]["stage"], "Finished");
}

#[test]
fn test_sync_without_remote() {
    let temp_dir = TempDir::new().unwrap();

    kanban_cmd(&temp_dir)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("no remote backend configured"));

    kanban_cmd(&temp_dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backend: local"))
        .stdout(predicate::str::contains("Sync: local only"));
}

#[test]
fn test_config_set_get_and_path() {
    let temp_dir = TempDir::new().unwrap();

    kanban_cmd(&temp_dir)
        .args(["config", "set", "cloud.debounce_ms", "500"])
        .assert()
        .success();

    kanban_cmd(&temp_dir)
        .args(["config", "get", "cloud.debounce_ms"])
        .assert()
        .success()
        .stdout(predicate::str::diff("500\n"));

    kanban_cmd(&temp_dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_remote_backend_requires_settings() {
    let temp_dir = TempDir::new().unwrap();

    kanban_cmd(&temp_dir)
        .args(["config", "set", "storage.backend", "remote_file"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("remote_file.owner and remote_file.repo must be set"));

    kanban_cmd(&temp_dir)
        .args(["config", "set", "cloud.token", "secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be stored"));

    kanban_cmd(&temp_dir)
        .args(["config", "get", "storage.backend"])
        .assert()
        .success()
        .stdout(predicate::str::diff("local\n"));
}

#[test]
fn test_console_runs_scripted_session() {
    let temp_dir = TempDir::new().unwrap();

    kanban_cmd(&temp_dir)
        .arg("console")
        .write_stdin("add \"Console project\"\nlist\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Project added: Console project"));

    assert_eq!(list_json(&temp_dir, &[]).len(), 1);
}

#[test]
fn test_console_keeps_running_after_parse_errors() {
    let temp_dir = TempDir::new().unwrap();

    kanban_cmd(&temp_dir)
        .arg("console")
        .write_stdin("frobnicate\nhelp\nadd \"After errors\"\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Project added: After errors"));

    assert_eq!(list_json(&temp_dir, &[]).len(), 1);
}
