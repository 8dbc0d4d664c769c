#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn ruleflow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ruleflow").unwrap();
    cmd.current_dir(dir.path())
        .env("RULEFLOW_ROOT", dir.path())
        .env("RULEFLOW_ACTOR", "alice")
        .env_remove("RULEFLOW_ORG");
    cmd
}

fn init_workspace(dir: &TempDir) {
    ruleflow(dir).args(["init", "--org", "acme"]).assert().success();
}

fn json_of(cmd: &mut Command) -> Value {
    let out = cmd.arg("--json").assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

fn write_rule(dir: &TempDir, name: &str, yaml: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, yaml).unwrap();
    path.to_string_lossy().into_owned()
}

fn create_rule(dir: &TempDir, yaml: &str) -> String {
    let file = write_rule(dir, "rule.yaml", yaml);
    let rule = json_of(ruleflow(dir).args(["rule", "create", "--file", &file]));
    rule["id"].as_str().unwrap().to_string()
}

const RESTOCK: &str = r#"
name: Restock widgets
trigger:
  type: manual
conditions:
  - field: quantity
    operator: lt
    value: 5
actions:
  - action_type: adjust-stock
    action_data:
      item_id: widget
      delta: 10
  - action_type: notify
    action_data:
      target: role:purchasing
      title: Widgets restocked
"#;

fn set_widget(dir: &TempDir, on_hand: &str) {
    ruleflow(dir)
        .args(["item", "set", "widget", "--unit-cost", "2.50", "--on-hand", on_hand])
        .assert()
        .success();
}

fn widget_on_hand(dir: &TempDir) -> i64 {
    let items = json_of(ruleflow(dir).args(["item", "list"]));
    items
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["id"] == "widget")
        .unwrap()["on_hand"]
        .as_i64()
        .unwrap()
}

// ---------------------------------------------------------------------------
// ruleflow init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_workspace() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);

    assert!(dir.path().join(".ruleflow").is_dir());
    assert!(dir.path().join(".ruleflow/config.yaml").exists());
    assert!(dir.path().join(".ruleflow/ruleflow.db").exists());

    let config = std::fs::read_to_string(dir.path().join(".ruleflow/config.yaml")).unwrap();
    assert!(config.contains("default_org: acme"));
    assert!(config.contains("alice"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    ruleflow(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists"));
}

#[test]
fn commands_fail_before_init() {
    let dir = TempDir::new().unwrap();
    ruleflow(&dir)
        .args(["rule", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error:"));
}

// ---------------------------------------------------------------------------
// ruleflow rule
// ---------------------------------------------------------------------------

#[test]
fn rule_create_list_and_get() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);

    let rules = json_of(ruleflow(&dir).args(["rule", "list"]));
    assert_eq!(rules.as_array().unwrap().len(), 1);
    assert_eq!(rules[0]["name"], "Restock widgets");

    let rule = json_of(ruleflow(&dir).args(["rule", "get", &id]));
    assert_eq!(rule["actions"].as_array().unwrap().len(), 2);
    assert_eq!(rule["is_active"], true);

    ruleflow(&dir)
        .args(["rule", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restock widgets"));
}

#[test]
fn rule_create_rejects_unknown_operator() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let file = write_rule(
        &dir,
        "bad.yaml",
        "name: Bad\ntrigger:\n  type: manual\nconditions:\n  - field: x\n    operator: approx\n    value: 1\n",
    );
    ruleflow(&dir)
        .args(["rule", "create", "--file", &file])
        .assert()
        .failure();
}

#[test]
fn rule_create_rejects_bad_cron() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let file = write_rule(
        &dir,
        "bad.yaml",
        "name: Bad\ntrigger:\n  type: schedule\n  cron: \"61 * * * *\"\n",
    );
    ruleflow(&dir)
        .args(["rule", "create", "--file", &file])
        .assert()
        .code(2);
}

#[test]
fn rule_get_unknown_is_not_found() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    ruleflow(&dir)
        .args(["rule", "get", "00000000-0000-0000-0000-000000000000"])
        .assert()
        .code(3);
}

#[test]
fn rule_create_by_stranger_is_forbidden() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let file = write_rule(&dir, "rule.yaml", RESTOCK);
    ruleflow(&dir)
        .env("RULEFLOW_ACTOR", "mallory")
        .args(["rule", "create", "--file", &file])
        .assert()
        .code(4);
}

#[test]
fn granted_runner_may_run_but_not_manage() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);
    set_widget(&dir, "2");

    ruleflow(&dir)
        .args(["config", "grant", "bob", "--role", "runner"])
        .assert()
        .success();

    ruleflow(&dir)
        .env("RULEFLOW_ACTOR", "bob")
        .args(["run", &id, "--payload", r#"{"quantity": 2}"#])
        .assert()
        .success();
    ruleflow(&dir)
        .env("RULEFLOW_ACTOR", "bob")
        .args(["rule", "delete", &id])
        .assert()
        .code(4);
}

#[test]
fn rule_delete_removes_rule() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);

    ruleflow(&dir).args(["rule", "delete", &id]).assert().success();
    ruleflow(&dir).args(["rule", "get", &id]).assert().code(3);
}

// ---------------------------------------------------------------------------
// ruleflow run
// ---------------------------------------------------------------------------

#[test]
fn run_applies_actions_in_order() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);
    set_widget(&dir, "2");

    let exec = json_of(ruleflow(&dir).args(["run", &id, "--payload", r#"{"quantity": 2}"#]));
    assert_eq!(exec["status"], "success");
    assert_eq!(exec["trigger"], "manual");
    assert_eq!(exec["triggered_by"], "alice");
    let results = exec["result"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["action_type"], "adjust-stock");
    assert_eq!(results[1]["action_type"], "notify");
    assert_eq!(results[1]["delivery"], "queued");

    assert_eq!(widget_on_hand(&dir), 12);
    let queued = json_of(ruleflow(&dir).args(["notification", "list"]));
    assert_eq!(queued.as_array().unwrap().len(), 1);
}

#[test]
fn run_with_unmet_conditions_does_nothing() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);
    set_widget(&dir, "20");

    let exec = json_of(ruleflow(&dir).args(["run", &id, "--payload", r#"{"quantity": 20}"#]));
    assert_eq!(exec["status"], "success");
    assert!(exec["result"].as_array().unwrap().is_empty());
    assert_eq!(widget_on_hand(&dir), 20);
}

#[test]
fn run_dry_run_leaves_stock_alone() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);
    set_widget(&dir, "2");

    let exec = json_of(ruleflow(&dir).args([
        "run",
        &id,
        "--payload",
        r#"{"quantity": 2}"#,
        "--dry-run",
    ]));
    assert_eq!(exec["status"], "success");
    assert_eq!(exec["dry_run"], true);
    assert_eq!(exec["result"][0]["delivery"], "simulated");
    assert_eq!(widget_on_hand(&dir), 2);
}

#[test]
fn run_failing_action_fails_execution() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);

    // No widget in the catalog: the stock adjustment fails first.
    let exec = json_of(ruleflow(&dir).args(["run", &id, "--payload", r#"{"quantity": 1}"#]));
    assert_eq!(exec["status"], "failed");
    assert_eq!(exec["result"].as_array().unwrap().len(), 1);
    assert_eq!(exec["result"][0]["success"], false);

    let queued = json_of(ruleflow(&dir).args(["notification", "list"]));
    assert!(queued.as_array().unwrap().is_empty());
}

#[test]
fn run_inactive_rule_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let yaml = format!("{RESTOCK}is_active: false\n");
    let id = create_rule(&dir, &yaml);

    ruleflow(&dir)
        .args(["run", &id])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("inactive"));
}

#[test]
fn run_rejects_invalid_payload() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);
    ruleflow(&dir)
        .args(["run", &id, "--payload", "not json"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// ruleflow execution
// ---------------------------------------------------------------------------

#[test]
fn execution_history_is_listed_and_filtered() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);
    set_widget(&dir, "2");

    ruleflow(&dir)
        .args(["run", &id, "--payload", r#"{"quantity": 2}"#])
        .assert()
        .success();
    ruleflow(&dir)
        .args(["run", &id, "--payload", r#"{"quantity": 9}"#])
        .assert()
        .success();

    let page = json_of(ruleflow(&dir).args(["execution", "list", "--rule", &id]));
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let page = json_of(ruleflow(&dir).args(["execution", "list", "--status", "failed"]));
    assert_eq!(page["total"], 0);

    let page = json_of(ruleflow(&dir).args(["execution", "list", "--limit", "1"]));
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let exec_id = page["items"][0]["id"].as_str().unwrap().to_string();
    let exec = json_of(ruleflow(&dir).args(["execution", "get", &exec_id]));
    assert_eq!(exec["rule_id"], id.as_str());

    let rule = json_of(ruleflow(&dir).args(["rule", "get", &id]));
    assert!(rule["last_run_at"].is_string());
}

#[test]
fn execution_stale_is_empty_after_clean_runs() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let stale = json_of(ruleflow(&dir).args(["execution", "stale", "--older-than", "0"]));
    assert!(stale.as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// ruleflow approval
// ---------------------------------------------------------------------------

#[test]
fn approval_holds_then_runs_on_approve() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let yaml = format!("{RESTOCK}approval_required: true\n");
    let id = create_rule(&dir, &yaml);
    set_widget(&dir, "2");

    let held = json_of(ruleflow(&dir).args(["run", &id, "--payload", r#"{"quantity": 2}"#]));
    assert_eq!(held["status"], "running");
    assert_eq!(held["approval"]["state"], "pending");
    assert_eq!(widget_on_hand(&dir), 2);

    let exec_id = held["id"].as_str().unwrap().to_string();
    let done = json_of(ruleflow(&dir).args(["approval", "approve", &exec_id]));
    assert_eq!(done["status"], "success");
    assert_eq!(done["approval"]["state"], "approved");
    assert_eq!(widget_on_hand(&dir), 12);

    // A decided execution cannot be decided again.
    ruleflow(&dir)
        .args(["approval", "approve", &exec_id])
        .assert()
        .code(5);
}

#[test]
fn approval_reject_fails_without_running() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let yaml = format!("{RESTOCK}approval_required: true\n");
    let id = create_rule(&dir, &yaml);
    set_widget(&dir, "2");

    let held = json_of(ruleflow(&dir).args(["run", &id, "--payload", r#"{"quantity": 2}"#]));
    let exec_id = held["id"].as_str().unwrap().to_string();

    let done = json_of(ruleflow(&dir).args([
        "approval",
        "reject",
        &exec_id,
        "--reason",
        "not this week",
    ]));
    assert_eq!(done["status"], "failed");
    assert_eq!(done["approval"]["state"], "rejected");
    assert_eq!(widget_on_hand(&dir), 2);
}

// ---------------------------------------------------------------------------
// ruleflow event / tick
// ---------------------------------------------------------------------------

#[test]
fn event_runs_matching_rules_only() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    create_rule(
        &dir,
        r#"
name: Low stock alert
trigger:
  type: event
  event: stock.changed
actions:
  - action_type: notify
    action_data:
      target: role:warehouse
      message: Stock changed
"#,
    );

    let report = json_of(ruleflow(&dir).args(["event", "order.created"]));
    assert!(report["runs"].as_array().unwrap().is_empty());

    let report = json_of(ruleflow(&dir).args([
        "event",
        "stock.changed",
        "--payload",
        r#"{"item_id": "widget"}"#,
    ]));
    let runs = report["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["status"], "success");

    let page = json_of(ruleflow(&dir).args(["execution", "list"]));
    assert_eq!(page["items"][0]["triggered_by"], "system:event:stock.changed");
}

#[test]
fn tick_runs_due_schedules() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    create_rule(
        &dir,
        r#"
name: Morning report
trigger:
  type: schedule
  cron: "0 9 * * *"
actions:
  - action_type: notify
    action_data:
      target: role:ops
      title: Good morning
"#,
    );

    let report = json_of(ruleflow(&dir).args(["tick", "--at", "2026-03-02T08:59:00Z"]));
    assert!(report["runs"].as_array().unwrap().is_empty());

    let report = json_of(ruleflow(&dir).args(["tick", "--at", "2026-03-02T09:00:00Z"]));
    assert_eq!(report["runs"].as_array().unwrap().len(), 1);

    let page = json_of(ruleflow(&dir).args(["execution", "list"]));
    assert_eq!(page["items"][0]["trigger"], "schedule");
}

// ---------------------------------------------------------------------------
// ruleflow purchase / audit / config
// ---------------------------------------------------------------------------

#[test]
fn purchase_request_creates_draft() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(
        &dir,
        r#"
name: Reorder widgets
trigger:
  type: manual
actions:
  - action_type: create-purchase-request
    action_data:
      item_id: widget
      quantity: 4
      supplier_id: sup-1
      location_id: main
"#,
    );
    set_widget(&dir, "0");

    ruleflow(&dir).args(["run", &id]).assert().success();

    let drafts = json_of(ruleflow(&dir).args(["purchase", "list"]));
    let drafts = drafts.as_array().unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0]["quantity"], 4);
    assert_eq!(drafts[0]["total"], 10.0);
    assert_eq!(drafts[0]["status"], "draft");
}

#[test]
fn audit_records_rule_lifecycle() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    let id = create_rule(&dir, RESTOCK);
    ruleflow(&dir).args(["rule", "delete", &id]).assert().success();

    let entries = json_of(ruleflow(&dir).args(["audit", "list"]));
    let actions: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["rule_created", "rule_deleted"]);
    assert_eq!(entries[0]["actor"], "alice");
}

#[test]
fn config_validate_passes_on_fresh_workspace() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    ruleflow(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_fails_on_bad_org() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    std::fs::write(
        dir.path().join(".ruleflow/config.yaml"),
        "version: 1\ndefault_org: \"not valid!\"\n",
    )
    .unwrap();
    ruleflow(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}
