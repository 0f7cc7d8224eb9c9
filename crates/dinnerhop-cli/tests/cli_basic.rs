//! Basic CLI E2E tests.
//!
//! Each test runs the `dinnerhop` binary against its own temporary data
//! directory, so tests never touch `~/.config/dinnerhop`.

use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_dinnerhop"))
        .env("DINNERHOP_DATA_DIR", data_dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn run_json(data_dir: &Path, args: &[&str]) -> Value {
    let (code, stdout, stderr) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("{args:?} printed invalid JSON ({e}): {stdout}"))
}

/// Creates event 1 with `couples` registered couples.
fn setup_event(data_dir: &Path, couples: usize) {
    let (code, stdout, stderr) = run_cli(
        data_dir,
        &[
            "event",
            "create",
            "Spring Hop",
            "--starter",
            "2030-05-17T18:00:00Z",
            "--main",
            "2030-05-17T19:30:00Z",
            "--dessert",
            "2030-05-17T21:00:00Z",
        ],
    );
    assert_eq!(code, 0, "event create failed: {stderr}");
    assert!(stdout.contains("Event created: 1"), "{stdout}");

    for i in 1..=couples {
        let name = format!("Couple {i}");
        let address = format!("Lindenstrasse {i}, 10969 Berlin");
        let (code, stdout, stderr) = run_cli(
            data_dir,
            &["couple", "add", "--event", "1", &name, "--address", &address, "--fact", "Plays the tuba"],
        );
        assert_eq!(code, 0, "couple add failed: {stderr}");
        assert!(stdout.contains(&format!("Couple registered: {i}")), "{stdout}");
    }
}

#[test]
fn test_event_list_json() {
    let dir = TempDir::new().unwrap();
    setup_event(dir.path(), 0);

    let events = run_json(dir.path(), &["event", "list", "--json"]);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["name"], "Spring Hop");
    assert!(events[0]["active_plan_id"].is_null());
}

#[test]
fn test_event_create_rejects_bad_time() {
    let dir = TempDir::new().unwrap();
    let (code, _, stderr) = run_cli(
        dir.path(),
        &["event", "create", "X", "--starter", "tonight", "--main", "later", "--dessert", "late"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("invalid time"), "{stderr}");
}

#[test]
fn test_match_needs_three_couples() {
    let dir = TempDir::new().unwrap();
    setup_event(dir.path(), 2);

    let (code, _, stderr) = run_cli(dir.path(), &["match", "run", "--event", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "{stderr}");
}

#[test]
fn test_match_run_and_envelopes() {
    let dir = TempDir::new().unwrap();
    setup_event(dir.path(), 3);

    let report = run_json(dir.path(), &["match", "run", "--event", "1"]);
    assert_eq!(report["plan"]["version"], 1);
    assert_eq!(report["envelopes"], 9);

    let envelopes = run_json(dir.path(), &["envelope", "list", "--event", "1", "--json"]);
    let envelopes = envelopes.as_array().unwrap();
    assert_eq!(envelopes.len(), 9);
    let self_hosted = envelopes
        .iter()
        .filter(|e| e["host_couple_id"] == e["couple_id"])
        .count();
    assert_eq!(self_hosted, 3);
    assert!(envelopes.iter().all(|e| e["current_state"] == "sealed"));

    // Before the teasing stage nothing but the course is visible.
    let token = envelopes[0]["access_token"].as_str().unwrap();
    let view = run_json(dir.path(), &["envelope", "show", token, "--at", "2030-05-01T12:00:00Z"]);
    assert_eq!(view["state"], "sealed");
    assert!(view.get("address").is_none());

    let view = run_json(dir.path(), &["envelope", "show", token, "--at", "2030-05-17T23:00:00Z"]);
    assert_eq!(view["state"], "open");
    assert!(view["address"].as_str().unwrap().starts_with("Lindenstrasse"));
}

#[test]
fn test_match_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    setup_event(dir.path(), 3);

    let draft = run_json(dir.path(), &["match", "run", "--event", "1", "--dry-run"]);
    assert_eq!(draft["pairings"].as_array().unwrap().len(), 6);

    let events = run_json(dir.path(), &["event", "list", "--json"]);
    assert!(events[0]["active_plan_id"].is_null());
}

#[test]
fn test_cascade_guest_dropout_and_audit() {
    let dir = TempDir::new().unwrap();
    setup_event(dir.path(), 3);
    run_json(dir.path(), &["match", "run", "--event", "1"]);

    let outcome = run_json(dir.path(), &["cascade", "guest-dropout", "--event", "1", "--revision", "0", "3"]);
    assert_eq!(outcome["action"], "guest_dropout");
    assert_eq!(outcome["couple_cancelled"], true);
    assert_eq!(outcome["envelopes_cancelled"], 2);
    assert_eq!(outcome["revision"], 1);

    // A second client still holding revision 0 is refused.
    let (code, _, stderr) = run_cli(dir.path(), &["cascade", "host-dropout", "--event", "1", "--revision", "0", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "{stderr}");

    let entries = run_json(dir.path(), &["audit", "list", "--event", "1", "--json"]);
    let actions: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, ["run_matching", "guest_dropout"]);
}

#[test]
fn test_cascade_apply_json_mutation() {
    let dir = TempDir::new().unwrap();
    setup_event(dir.path(), 3);
    run_json(dir.path(), &["match", "run", "--event", "1"]);

    let outcome = run_json(
        dir.path(),
        &["cascade", "apply", "--event", "1", r#"{"type":"host_dropout","couple_id":1}"#],
    );
    assert_eq!(outcome["action"], "host_dropout");
    let unplaced = outcome["unplaced"].as_array().unwrap();
    assert_eq!(unplaced.len(), 2);

    let listed = run_json(dir.path(), &["cascade", "unplaced", "--event", "1"]);
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[test]
fn test_config_get_set() {
    let dir = TempDir::new().unwrap();

    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "matching.min_couples"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "3");

    let (code, stdout, _) = run_cli(dir.path(), &["config", "set", "timing.offsets.street", "75"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "timing.offsets.street"]);
    assert_eq!(stdout.trim(), "75");

    let (code, _, stderr) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"), "{stderr}");
    assert!(stderr.contains("sections: matching, timing, distance, clues"), "{stderr}");

    let (code, _, stderr) = run_cli(dir.path(), &["config", "set", "timing.no_such_stage", "5"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key: timing.no_such_stage"), "{stderr}");
}

#[test]
fn test_config_sections() {
    let dir = TempDir::new().unwrap();

    let distance = run_json(dir.path(), &["config", "list", "--section", "distance"]);
    assert!(distance.get("cycling_speed_kmh").is_some());
    assert!(distance.get("min_couples").is_none());

    run_cli(dir.path(), &["config", "set", "timing.offsets.street", "75"]);
    run_cli(dir.path(), &["config", "set", "clues.clues_per_course", "3"]);

    let (code, stdout, _) = run_cli(dir.path(), &["config", "reset", "--section", "timing"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "timing reset to defaults");

    let (_, street, _) = run_cli(dir.path(), &["config", "get", "timing.offsets.street"]);
    assert_ne!(street.trim(), "75");
    let (_, clues, _) = run_cli(dir.path(), &["config", "get", "clues.clues_per_course"]);
    assert_eq!(clues.trim(), "3");

    let (code, _, stderr) = run_cli(dir.path(), &["config", "list", "--section", "envelopes"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("matching"), "{stderr}");
}
