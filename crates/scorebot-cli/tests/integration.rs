#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn scorebot(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("scorebot").unwrap();
    cmd.current_dir(dir.path())
        .env("SCOREBOT_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    scorebot(dir).arg("init").assert().success();
}

fn write(dir: &TempDir, rel: &str, content: &str) {
    std::fs::write(dir.path().join(rel), content).unwrap();
}

const DB_INVENTORY: &str = r#"
teams:
  - name: team1
    services:
      - name: db
        host: 10.1.1.5
        port: 5432
        check: POSTGRESQLCheck
        properties:
          database: testdb
          command: 'SELECT 1'
        accounts: [pwnbus]
"#;

const DB_CREDENTIALS: &str = r#"
teams:
  team1:
    db:
      pwnbus: pwnbuspass
"#;

// Every entry fails to build, so a round finishes without running a probe.
const MISCONFIGURED_INVENTORY: &str = r#"
teams:
  - name: team1
    services:
      - name: mail
        host: 10.1.1.6
        port: 25
        check: SMTPCheck
      - name: db
        host: 10.1.1.5
        port: 5432
        check: POSTGRESQLCheck
        properties:
          database: testdb
          command: 'SELECT 1'
"#;

// ---------------------------------------------------------------------------
// scorebot init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_scorebot_dir() {
    let dir = TempDir::new().unwrap();
    scorebot(&dir).arg("init").assert().success();

    assert!(dir.path().join(".scorebot").is_dir());
    assert!(dir.path().join(".scorebot/config.yaml").exists());
    assert!(dir.path().join(".scorebot/inventory.yaml").exists());
    assert!(dir.path().join(".scorebot/credentials.yaml").exists());

    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.lines().any(|l| l == ".scorebot/credentials.yaml"));
}

#[test]
fn init_is_idempotent_and_keeps_edits() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, ".scorebot/inventory.yaml", DB_INVENTORY);

    scorebot(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));

    let inventory = std::fs::read_to_string(dir.path().join(".scorebot/inventory.yaml")).unwrap();
    assert_eq!(inventory, DB_INVENTORY);

    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert_eq!(gitignore.matches(".scorebot/credentials.yaml").count(), 1);
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    scorebot(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// scorebot config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_accepts_defaults() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    scorebot(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_fails_on_zero_concurrency() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, ".scorebot/config.yaml", "max_concurrent_probes: 0\n");

    scorebot(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] max_concurrent_probes"));
}

#[test]
fn config_validate_lists_errors_before_warnings() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(
        &dir,
        ".scorebot/config.yaml",
        "round_interval_seconds: 10\nmax_concurrent_probes: 0\n",
    );

    let out = scorebot(&dir)
        .args(["config", "validate"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let error_at = stdout.find("[error]").unwrap();
    let warning_at = stdout.find("[warning]").unwrap();
    assert!(error_at < warning_at, "{stdout}");
    assert!(String::from_utf8_lossy(&out.stderr).contains("config has 1 error(s)"));
}

#[test]
fn config_validate_warns_when_rounds_outlive_the_interval() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(
        &dir,
        ".scorebot/config.yaml",
        "round_interval_seconds: 10\ndefault_timeout_seconds: 30\n",
    );

    let out = scorebot(&dir)
        .args(["--json", "config", "validate"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let warnings = value["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["level"], "warning");
    assert_eq!(value["valid"], true);
}

#[test]
fn config_show_fills_defaults() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, ".scorebot/config.yaml", "");

    let out = scorebot(&dir)
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["round_interval_seconds"], 60);
    assert_eq!(value["max_concurrent_probes"], 16);
}

// ---------------------------------------------------------------------------
// scorebot checks
// ---------------------------------------------------------------------------

#[test]
fn checks_list_shows_builtin_types() {
    let dir = TempDir::new().unwrap();
    scorebot(&dir)
        .args(["checks", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("POSTGRESQLCheck"))
        .stdout(predicate::str::contains("MYSQLCheck"))
        .stdout(predicate::str::contains("SSHCheck"))
        .stdout(predicate::str::contains("ICMPCheck"));
}

#[test]
fn checks_list_json_marks_account_checks() {
    let dir = TempDir::new().unwrap();
    let out = scorebot(&dir)
        .args(["--json", "checks", "list"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let rows: Vec<serde_json::Value> = serde_json::from_slice(&out.stdout).unwrap();
    let pg = rows
        .iter()
        .find(|r| r["name"] == "POSTGRESQLCheck")
        .expect("postgres row");
    assert_eq!(pg["account"], true);
    assert_eq!(pg["required"], serde_json::json!(["database", "command"]));
}

#[test]
fn checks_render_never_shows_secrets() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, ".scorebot/inventory.yaml", DB_INVENTORY);
    write(&dir, ".scorebot/credentials.yaml", DB_CREDENTIALS);

    let out = scorebot(&dir).args(["checks", "render"]).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stdout.contains("psql"), "{stdout}");
    assert!(stdout.contains("pwnbus"), "{stdout}");
    assert!(!stdout.contains("pwnbuspass"), "secret leaked to stdout");
    assert!(!stderr.contains("pwnbuspass"), "secret leaked to stderr");
}

#[test]
fn checks_render_reports_misconfigured_entries() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, ".scorebot/inventory.yaml", MISCONFIGURED_INVENTORY);

    let out = scorebot(&dir)
        .args(["--json", "checks", "render"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let rows: Vec<serde_json::Value> = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["command"].is_null()));
    assert!(rows[0]["error"]
        .as_str()
        .unwrap()
        .contains("unknown check type"));
}

#[test]
fn checks_render_rejects_broken_inventory() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, ".scorebot/inventory.yaml", "teams: [");

    scorebot(&dir)
        .args(["checks", "render"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load inventory"));
}

// ---------------------------------------------------------------------------
// scorebot round / results
// ---------------------------------------------------------------------------

#[test]
fn round_records_misconfigured_entries() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, ".scorebot/inventory.yaml", MISCONFIGURED_INVENTORY);

    let out = scorebot(&dir)
        .args(["--json", "round"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["round"]["state"], "closed");
    assert_eq!(value["round"]["counts"]["misconfigured"], 2);
    let records = value["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r["outcome"]["status"] == "misconfigured"));
}

#[test]
fn results_show_latest_round() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, ".scorebot/inventory.yaml", MISCONFIGURED_INVENTORY);

    scorebot(&dir).arg("round").assert().success();
    scorebot(&dir).arg("round").assert().success();

    let out = scorebot(&dir)
        .args(["--json", "results", "rounds"])
        .output()
        .unwrap();
    let rounds: Vec<serde_json::Value> = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(rounds.len(), 2);
    let newest = rounds[0]["id"].as_u64().unwrap();
    assert!(newest > rounds[1]["id"].as_u64().unwrap());

    scorebot(&dir)
        .args(["results", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("round {newest}")))
        .stdout(predicate::str::contains("misconfigured"));
}

#[test]
fn results_before_any_round() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    scorebot(&dir)
        .args(["results", "rounds"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No rounds recorded yet"));
}

#[test]
fn results_show_unknown_round_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write(&dir, ".scorebot/inventory.yaml", MISCONFIGURED_INVENTORY);
    scorebot(&dir).arg("round").assert().success();

    scorebot(&dir)
        .args(["results", "show", "--round", "999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("round 999 not found"));
}
