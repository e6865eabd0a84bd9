// CLI integration tests for the minimal create/insert/fetch/update/delete flows.
use std::process::Command;

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_gridfile");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

#[test]
fn create_insert_fetch_update_delete_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table_dir = temp.path().join("tables");

    let create = cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "table",
            "create",
            "people",
            "--columns",
            "name,street",
        ])
        .output()
        .expect("create");
    assert!(create.status.success());
    let create_json = parse_json(std::str::from_utf8(&create.stdout).expect("utf8"));
    let created = create_json
        .get("created")
        .and_then(|value| value.as_array())
        .expect("created array")
        .first()
        .expect("first");
    assert_eq!(created.get("name").unwrap().as_str().unwrap(), "people");
    assert!(
        created
            .get("path")
            .unwrap()
            .as_str()
            .unwrap()
            .ends_with("people.csv")
    );
    assert_eq!(created.get("row_count").unwrap().as_u64().unwrap(), 0);

    for (name, street) in [("otto", "Landstr"), ("maier", "Hauptstr"), ("otto", "Hauptstr")] {
        let insert = cmd()
            .args([
                "--dir",
                table_dir.to_str().unwrap(),
                "insert",
                "people",
                &format!("name={name}"),
                &format!("street={street}"),
            ])
            .output()
            .expect("insert");
        assert!(insert.status.success());
    }

    let fetch = cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "fetch",
            "people",
            "name=otto",
        ])
        .output()
        .expect("fetch");
    assert!(fetch.status.success());
    let fetch_json = parse_json(std::str::from_utf8(&fetch.stdout).expect("utf8"));
    assert_eq!(fetch_json.get("count").unwrap().as_u64().unwrap(), 2);
    let rows = fetch_json.get("rows").unwrap().as_array().unwrap();
    assert_eq!(rows[0]["street"], "Landstr");
    assert_eq!(rows[1]["street"], "Hauptstr");

    let update = cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "update",
            "people",
            "--set",
            "street=Waldstr",
            "--where",
            "name=maier",
        ])
        .output()
        .expect("update");
    assert!(update.status.success());
    let update_json = parse_json(std::str::from_utf8(&update.stdout).expect("utf8"));
    assert_eq!(update_json.get("matched").unwrap().as_u64().unwrap(), 1);

    let delete = cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "delete",
            "people",
            "--where",
            "name=otto",
        ])
        .output()
        .expect("delete");
    assert!(delete.status.success());
    let delete_json = parse_json(std::str::from_utf8(&delete.stdout).expect("utf8"));
    assert_eq!(delete_json.get("deleted").unwrap().as_u64().unwrap(), 2);

    let remaining = cmd()
        .args(["--dir", table_dir.to_str().unwrap(), "fetch", "people"])
        .output()
        .expect("fetch");
    let remaining_json = parse_json(std::str::from_utf8(&remaining.stdout).expect("utf8"));
    let rows = remaining_json.get("rows").unwrap().as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "maier");
    assert_eq!(rows[0]["street"], "Waldstr");
}

#[test]
fn not_found_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table_dir = temp.path().join("tables");

    let fetch = cmd()
        .args(["--dir", table_dir.to_str().unwrap(), "fetch", "ghost"])
        .output()
        .expect("fetch");
    assert_eq!(fetch.status.code().unwrap(), 3);
}

#[test]
fn usage_exit_code_for_bare_filter_words() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table_dir = temp.path().join("tables");

    cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "table",
            "create",
            "people",
            "--columns",
            "name,street",
        ])
        .output()
        .expect("create");

    let fetch = cmd()
        .args(["--dir", table_dir.to_str().unwrap(), "fetch", "people", "otto"])
        .output()
        .expect("fetch");
    assert_eq!(fetch.status.code().unwrap(), 2);
}

#[test]
fn delete_without_filters_requires_all_flag() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table_dir = temp.path().join("tables");

    cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "table",
            "create",
            "people",
            "--columns",
            "name,street",
        ])
        .output()
        .expect("create");
    cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "insert",
            "people",
            "name=otto",
            "street=Landstr",
        ])
        .output()
        .expect("insert");

    let refused = cmd()
        .args(["--dir", table_dir.to_str().unwrap(), "delete", "people"])
        .output()
        .expect("delete");
    assert_eq!(refused.status.code().unwrap(), 2);

    let wiped = cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "delete",
            "people",
            "--all",
        ])
        .output()
        .expect("delete");
    assert!(wiped.status.success());
    let wiped_json = parse_json(std::str::from_utf8(&wiped.stdout).expect("utf8"));
    assert_eq!(wiped_json.get("deleted").unwrap().as_u64().unwrap(), 1);
}

#[test]
fn insert_missing_field_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table_dir = temp.path().join("tables");

    cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "table",
            "create",
            "people",
            "--columns",
            "name,street",
        ])
        .output()
        .expect("create");

    let insert = cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "insert",
            "people",
            "name=otto",
        ])
        .output()
        .expect("insert");
    assert_eq!(insert.status.code().unwrap(), 5);
}

#[test]
fn backup_and_restore_round_trip() {
    let temp = tempfile::tempdir().expect("tempdir");
    let table_dir = temp.path().join("tables");

    cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "table",
            "create",
            "people",
            "--columns",
            "name,street",
        ])
        .output()
        .expect("create");
    cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "insert",
            "people",
            "name=otto",
            "street=Landstr",
        ])
        .output()
        .expect("insert");

    let backup = cmd()
        .args(["--dir", table_dir.to_str().unwrap(), "backup", "people"])
        .output()
        .expect("backup");
    assert!(backup.status.success());
    let backup_json = parse_json(std::str::from_utf8(&backup.stdout).expect("utf8"));
    assert!(
        backup_json["backup"]["path"]
            .as_str()
            .unwrap()
            .ends_with("people.backup")
    );

    cmd()
        .args([
            "--dir",
            table_dir.to_str().unwrap(),
            "delete",
            "people",
            "--all",
        ])
        .output()
        .expect("delete");

    let restore = cmd()
        .args(["--dir", table_dir.to_str().unwrap(), "restore", "people"])
        .output()
        .expect("restore");
    assert!(restore.status.success());

    let fetch = cmd()
        .args(["--dir", table_dir.to_str().unwrap(), "fetch", "people"])
        .output()
        .expect("fetch");
    let fetch_json = parse_json(std::str::from_utf8(&fetch.stdout).expect("utf8"));
    assert_eq!(fetch_json.get("count").unwrap().as_u64().unwrap(), 1);
}

#[test]
fn version_emits_json() {
    let version = cmd().arg("version").output().expect("version");
    assert!(version.status.success());
    let version_json = parse_json(std::str::from_utf8(&version.stdout).expect("utf8"));
    assert_eq!(version_json.get("name").unwrap().as_str().unwrap(), "gridfile");
    assert!(version_json.get("version").unwrap().as_str().is_some());
}
