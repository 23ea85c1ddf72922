//! Integration tests for the `tl` CLI.
//!
//! Each test writes a config into a temp directory, runs `tl` as a
//! subprocess against it, and checks stdout and the backing files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Write a config for the given backend and return its path
fn write_config(dir: &Path, backend: &str) -> PathBuf {
    let path = dir.join("config.toml");
    let body = match backend {
        "delim" => "[backend]\nkind = \"delim\"\npath = \"todo.txt\"\n",
        _ => "[backend]\nkind = \"sqlite\"\npath = \"todo.db\"\n",
    };
    fs::write(&path, format!("[list]\nname = \"todo\"\n\n{}", body)).unwrap();
    path
}

/// Nearest directory above `path` that exists; `init` runs before the
/// config's own directory is created
fn existing_ancestor(path: &Path) -> &Path {
    path.ancestors()
        .skip(1)
        .find(|dir| dir.is_dir())
        .unwrap()
}

/// Run `tl --config <config> args...`, returning (stdout, stderr, success)
fn run_tl(config: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_tl"))
        .arg("--config")
        .arg(config)
        .args(args)
        .current_dir(existing_ancestor(config))
        .env_remove("TASKLIST_LOG")
        .output()
        .expect("failed to run tl");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run `tl` expecting success, return stdout
fn run_tl_ok(config: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_tl(config, args);
    if !success {
        panic!(
            "tl {:?} failed:\nstdout: {}\nstderr: {}",
            args, stdout, stderr
        );
    }
    stdout
}

/// A fresh list with a parent and child in Work and one task in Home
fn seeded(tmp: &TempDir, backend: &str) -> PathBuf {
    let config = write_config(tmp.path(), backend);
    run_tl_ok(&config, &["init"]);
    assert_eq!(run_tl_ok(&config, &["add", "Write report", "-C", "Work"]), "1\n");
    assert_eq!(run_tl_ok(&config, &["add", "Gather numbers", "-p", "1"]), "2\n");
    assert_eq!(run_tl_ok(&config, &["add", "Fix sink", "-C", "Home"]), "3\n");
    config
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config_and_creates_database() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("nested/config.toml");

    let out = run_tl_ok(&config, &["init"]);
    assert!(out.contains("wrote"));
    assert!(out.contains("initialized sqlite:"));
    assert!(config.exists());
    assert!(tmp.path().join("nested/todo.db").exists());

    // Second init keeps the config and is a no-op for the table
    let out = run_tl_ok(&config, &["init"]);
    assert!(!out.contains("wrote"));
    assert!(out.contains("initialized"));
}

#[test]
fn commands_fail_before_init() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "sqlite");
    let (_, stderr, success) = run_tl(&config, &["list"]);
    assert!(!success);
    assert!(stderr.starts_with("error:"));
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

#[test]
fn list_shows_open_tasks_by_category() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    let out = run_tl_ok(&config, &["list"]);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Work (2/2)",
            "   1  Write report",
            "     2  Gather numbers",
            "",
            "Home (1/1)",
            "   3  Fix sink",
        ]
    );
}

#[test]
fn list_json_nests_subtasks() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    let out = run_tl_ok(&config, &["list", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    let categories = parsed.as_array().unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0]["name"], "Work");
    assert_eq!(categories[0]["tasks"][0]["id"], "1");
    assert_eq!(categories[0]["tasks"][0]["subtasks"][0]["name"], "Gather numbers");
}

#[test]
fn show_prints_every_field() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    let out = run_tl_ok(&config, &["show", "2"]);
    assert!(out.contains("id: 2"));
    assert!(out.contains("parent_id: 1"));
    assert!(out.contains("category: Work"));
    assert!(out.contains("status: Open"));

    let (_, stderr, success) = run_tl(&config, &["show", "42"]);
    assert!(!success);
    assert!(stderr.contains("task not found: 42"));
}

#[test]
fn export_writes_a_reimportable_table() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    let out = run_tl_ok(&config, &["export"]);
    let mut lines = out.lines();
    assert_eq!(lines.next(), Some("id|parent_id|category|name|status"));
    assert_eq!(out.lines().count(), 4);
    assert!(out.contains("2|1|Work|Gather numbers|Open"));
}

#[test]
fn recovery_is_empty_after_clean_saves() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    assert_eq!(run_tl_ok(&config, &["recovery"]), "recovery log is empty\n");
    assert_eq!(run_tl_ok(&config, &["recovery", "--json"]).trim(), "[]");
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

#[test]
fn done_hides_the_subtree_and_category() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    assert_eq!(run_tl_ok(&config, &["done", "1"]), "completed 2 task(s)\n");

    let out = run_tl_ok(&config, &["list"]);
    assert!(!out.contains("Work"));
    assert!(out.contains("Fix sink"));

    let all = run_tl_ok(&config, &["list", "--all"]);
    assert!(all.contains("Work (0/2)"));
    assert!(all.contains("   1 [x] Write report"));
    assert!(all.contains("     2 [x] Gather numbers"));
}

#[test]
fn rm_deletes_the_subtree_from_storage() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    assert_eq!(run_tl_ok(&config, &["rm", "1"]), "deleted 2 task(s)\n");
    let out = run_tl_ok(&config, &["export"]);
    assert_eq!(out.lines().count(), 2);
    assert!(out.contains("3|"));
}

#[test]
fn mv_reparents_and_takes_the_parent_category() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    assert_eq!(run_tl_ok(&config, &["mv", "3", "--parent", "2"]), "moved 3\n");

    let shown = run_tl_ok(&config, &["show", "3", "--json"]);
    let record: serde_json::Value = serde_json::from_str(&shown).unwrap();
    assert_eq!(record["parent_id"], "2");
    assert_eq!(record["category"], "Work");

    let out = run_tl_ok(&config, &["list"]);
    assert!(out.contains("       3  Fix sink"));
    assert!(!out.contains("Home"));
}

#[test]
fn mv_to_category_makes_a_top_level_task() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    run_tl_ok(&config, &["mv", "2", "-C", "Home"]);
    let out = run_tl_ok(&config, &["list"]);
    assert!(out.contains("Home (2/2)"));
    assert!(out.contains("   2  Gather numbers"));
}

#[test]
fn mv_refuses_a_cycle() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    let (_, stderr, success) = run_tl(&config, &["mv", "1", "--parent", "2"]);
    assert!(!success);
    assert!(stderr.contains("its own subtask"), "stderr: {}", stderr);
    // Nothing changed
    let shown = run_tl_ok(&config, &["show", "1"]);
    assert!(shown.contains("parent_id: \n") || shown.contains("parent_id:\n"));
}

#[test]
fn add_needs_a_category_for_top_level_tasks() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    let (_, stderr, success) = run_tl(&config, &["add", "Loose end"]);
    assert!(!success);
    assert!(stderr.contains("category is required"));
}

#[test]
fn add_with_extra_field_grows_the_table() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "sqlite");
    let id = run_tl_ok(
        &config,
        &["add", "Paint fence", "-C", "Home", "--set", "effort=L"],
    );
    assert_eq!(id, "4\n");
    let shown = run_tl_ok(&config, &["show", "4"]);
    assert!(shown.contains("effort: L"));
    // Older rows read the new column as empty
    assert!(run_tl_ok(&config, &["show", "3"]).contains("effort: \n"));
}

#[test]
fn import_reports_orphans() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "sqlite");
    run_tl_ok(&config, &["init"]);
    let file = tmp.path().join("in.txt");
    fs::write(
        &file,
        "id|parent_id|category|name|status\n\
         2|1|Work|Child|Open\n\
         1||Work|Parent|Open\n\
         3|99|Work|Orphan|Open\n",
    )
    .unwrap();

    let out = run_tl_ok(&config, &["import", file.to_str().unwrap(), "--json"]);
    let report: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["imported"], 2);
    assert_eq!(report["skipped"][0]["id"], "3");

    let listed = run_tl_ok(&config, &["list"]);
    assert!(listed.contains("   1  Parent"));
    assert!(listed.contains("     2  Child"));
}

// ---------------------------------------------------------------------------
// Delimited backend
// ---------------------------------------------------------------------------

#[test]
fn delim_backend_stores_a_readable_table() {
    let tmp = TempDir::new().unwrap();
    let config = seeded(&tmp, "delim");
    let text = fs::read_to_string(tmp.path().join("todo.txt")).unwrap();
    assert_eq!(
        text,
        "id|parent_id|category|name|status\n\
         1||Work|Write report|Open\n\
         2|1|Work|Gather numbers|Open\n\
         3||Home|Fix sink|Open\n"
    );

    run_tl_ok(&config, &["done", "2"]);
    run_tl_ok(&config, &["rm", "3"]);
    let text = fs::read_to_string(tmp.path().join("todo.txt")).unwrap();
    assert!(text.contains("2|1|Work|Gather numbers|Complete"));
    assert!(!text.contains("Fix sink"));
    assert!(!tmp.path().join("todo.txt.lock").exists());
}
