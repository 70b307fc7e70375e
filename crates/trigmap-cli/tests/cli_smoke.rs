use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const NOW: &str = "1700000000";

// Template 100 carries triggers 50 and 51, inherited by web01 as 60 and 61.
// db01 has one High problem.
const SNAPSHOT: &str = r#"# trigmap smoke snapshot
{"kind":"host_group","groupid":1,"name":"Web servers"}
{"kind":"host_group","groupid":2,"name":"Databases"}
{"kind":"host","hostid":100,"host":"Template App","status":"template"}
{"kind":"host","hostid":10,"host":"web01","groups":[1],"templates":[100]}
{"kind":"host","hostid":20,"host":"db01","groups":[2]}
{"kind":"item","itemid":500,"hostid":100,"key":"app.ping"}
{"kind":"item","itemid":501,"hostid":100,"key":"app.port"}
{"kind":"item","itemid":600,"hostid":10,"key":"app.ping"}
{"kind":"item","itemid":601,"hostid":10,"key":"app.port"}
{"kind":"item","itemid":210,"hostid":20,"key":"mysql.ping","lastvalue":"0"}
{"kind":"trigger","triggerid":50,"description":"App down","expression":"{50}=0","priority":3,"functions":[{"functionid":50,"itemid":500,"function":"last"}]}
{"kind":"trigger","triggerid":51,"description":"App port closed","expression":"{51}=0","priority":2,"functions":[{"functionid":51,"itemid":501,"function":"last"}]}
{"kind":"trigger","triggerid":60,"description":"App down","expression":"{60}=0","priority":3,"templateid":50,"functions":[{"functionid":60,"itemid":600,"function":"last"}]}
{"kind":"trigger","triggerid":61,"description":"App port closed","expression":"{61}=0","priority":2,"templateid":51,"functions":[{"functionid":61,"itemid":601,"function":"last"}]}
{"kind":"trigger","triggerid":21,"description":"MySQL down on {HOST.HOST}","expression":"{21}=0","priority":4,"value":"problem","lastchange":1699990000,"functions":[{"functionid":21,"itemid":210,"function":"last"}]}
{"kind":"user","userid":7,"alias":"operator","type":"user","rights":[{"groupid":1,"permission":"read"}]}
{"kind":"map","sysmapid":1,"name":"Databases","width":400,"height":300,"selements":[{"selementid":1,"element":{"type":"host","id":20},"iconid_off":1,"iconid_on":2}]}
"#;

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "trigmap-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_trigmap(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_trigmap"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("trigmap command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed: status={:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

fn assert_failure(output: &Output) {
    if output.status.success() {
        panic!(
            "command unexpectedly succeeded\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).expect("stdout should be valid json")
}

fn write_snapshot(root: &Path, extra: &str) -> PathBuf {
    let path = root.join("trigmap.jsonl");
    fs::write(&path, format!("{SNAPSHOT}{extra}")).expect("snapshot should be written");
    path
}

fn triggerids(payload: &Value) -> Vec<u64> {
    payload["triggers"]
        .as_array()
        .expect("triggers should be an array")
        .iter()
        .map(|t| t["triggerid"].as_u64().expect("triggerid should be a number"))
        .collect()
}

fn edges(payload: &Value) -> Vec<(u64, u64)> {
    let mut edges: Vec<(u64, u64)> = payload["inserted"]
        .as_array()
        .expect("inserted should be an array")
        .iter()
        .map(|e| {
            (
                e["triggeridDown"].as_u64().expect("down id"),
                e["triggeridUp"].as_u64().expect("up id"),
            )
        })
        .collect();
    edges.sort();
    edges
}

#[test]
fn triggers_json_filters_problems() {
    let tmp = TempDirGuard::new("triggers-json");
    let store = write_snapshot(tmp.path(), "");
    let store = store.to_str().expect("utf-8 path");

    let output = run_trigmap(&["triggers", "--only-true", "--store", store, "--now", NOW, "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["action"], "triggers.get");
    assert_eq!(triggerids(&payload), vec![21]);
    assert!(
        payload["storeRef"]
            .as_str()
            .expect("storeRef should be a string")
            .starts_with("sha256:")
    );

    let output = run_trigmap(&[
        "triggers",
        "--hostid",
        "20",
        "--expand-description",
        "--store",
        store,
        "--now",
        NOW,
        "--json",
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["triggers"][0]["description"], "MySQL down on db01");
}

#[test]
fn triggers_human_and_count_output() {
    let tmp = TempDirGuard::new("triggers-human");
    let store = write_snapshot(tmp.path(), "");
    let store = store.to_str().expect("utf-8 path");

    let output = run_trigmap(&["triggers", "--hostid", "20", "--store", store, "--now", NOW]);
    assert_success(&output);
    let text = stdout_text(&output);
    assert!(text.contains("trigmap triggers (1 found)"));
    assert!(text.contains("High"));
    assert!(text.contains("PROBLEM"));

    let output = run_trigmap(&["triggers", "--hostid", "10", "--count", "--store", store]);
    assert_success(&output);
    assert_eq!(stdout_text(&output).trim(), "2");
}

#[test]
fn dep_add_propagates_to_inherited_triggers() {
    let tmp = TempDirGuard::new("dep-add");
    let store = write_snapshot(tmp.path(), "");
    let store = store.to_str().expect("utf-8 path");

    let output = run_trigmap(&["dep", "add", "50", "51", "--store", store, "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["action"], "dep.add");
    assert_eq!(edges(&payload), vec![(50, 51), (60, 61)]);

    let output = run_trigmap(&[
        "triggers",
        "--triggerid",
        "60",
        "--select-dependencies",
        "--store",
        store,
        "--json",
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["triggers"][0]["dependencies"][0]["triggerid"], 61);
}

#[test]
fn dep_add_rejects_self_dependency_and_leaves_store_untouched() {
    let tmp = TempDirGuard::new("dep-self");
    let store_path = write_snapshot(tmp.path(), "");
    let store = store_path.to_str().expect("utf-8 path");
    let before = fs::read(&store_path).expect("snapshot should be readable");

    let output = run_trigmap(&["dep", "add", "21", "21", "--store", store]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("Cannot create dependency on trigger itself."));

    let after = fs::read(&store_path).expect("snapshot should be readable");
    assert_eq!(before, after);
    assert!(!tmp.path().join("trigmap.jsonl.lock").exists());
}

#[test]
fn dep_add_requires_write_access() {
    let tmp = TempDirGuard::new("dep-user");
    let store = write_snapshot(tmp.path(), "");
    let store = store.to_str().expect("utf-8 path");

    let output = run_trigmap(&["dep", "add", "60", "61", "--user", "7", "--store", store]);
    assert_failure(&output);
    assert!(
        stderr_text(&output).contains("No permissions to referred object or it does not exist!")
    );

    let output = run_trigmap(&["dep", "add", "60", "61", "--user", "99", "--store", store]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("unknown user 99"));
}

#[test]
fn dep_sync_then_delete() {
    let tmp = TempDirGuard::new("dep-sync");
    let store = write_snapshot(
        tmp.path(),
        "{\"kind\":\"dependency\",\"triggerid_down\":50,\"triggerid_up\":51}\n",
    );
    let store = store.to_str().expect("utf-8 path");

    let output = run_trigmap(&["dep", "sync", "--template", "100", "--store", store, "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["action"], "dep.sync");
    assert_eq!(edges(&payload), vec![(60, 61)]);
    assert_eq!(payload["deleted"], 0);

    let output = run_trigmap(&["dep", "delete", "50", "--store", store, "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["action"], "dep.delete");
    assert_eq!(payload["triggerids"], serde_json::json!([50]));
    assert_eq!(payload["deleted"], 2);

    let text = fs::read_to_string(tmp.path().join("trigmap.jsonl")).expect("snapshot");
    assert!(!text.contains("\"kind\":\"dependency\""));
}

#[test]
fn map_state_json_and_severity_override() {
    let tmp = TempDirGuard::new("map-state");
    let store = write_snapshot(tmp.path(), "");
    let store = store.to_str().expect("utf-8 path");

    let output = run_trigmap(&["map-state", "1", "--store", store, "--now", NOW, "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["action"], "map.state");
    let element = &payload["map"]["elements"]["1"];
    assert_eq!(element["iconType"], "on");
    assert_eq!(element["iconid"], 2);
    assert_eq!(element["problem"], 1);

    let output = run_trigmap(&[
        "map-state",
        "1",
        "--severity-min",
        "5",
        "--store",
        store,
        "--now",
        NOW,
        "--json",
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["map"]["elements"]["1"]["iconType"], "off");
}

#[test]
fn map_state_unknown_map_fails() {
    let tmp = TempDirGuard::new("map-missing");
    let store = write_snapshot(tmp.path(), "");
    let store = store.to_str().expect("utf-8 path");

    let output = run_trigmap(&["map-state", "99", "--store", store]);
    assert_failure(&output);
    assert!(
        stderr_text(&output).contains("No permissions to referred object or it does not exist!")
    );
}

#[test]
fn invalid_config_is_fatal() {
    let tmp = TempDirGuard::new("bad-config");
    let store = write_snapshot(tmp.path(), "");
    let store = store.to_str().expect("utf-8 path");
    let config = tmp.path().join("trigmap.toml");
    fs::write(&config, "blink_period_secs = -1\n").expect("config should be written");

    let output = run_trigmap(&[
        "map-state",
        "1",
        "--store",
        store,
        "--config",
        config.to_str().expect("utf-8 path"),
    ]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("failed to load config"));
}

#[test]
fn missing_store_fails() {
    let tmp = TempDirGuard::new("missing-store");
    let store = tmp.path().join("absent.jsonl");
    let output = run_trigmap(&["triggers", "--store", store.to_str().expect("utf-8 path")]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("store snapshot not found"));
}
