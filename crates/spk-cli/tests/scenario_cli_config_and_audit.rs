use predicates::prelude::*;
use spk_audit::AuditWriter;

#[allow(deprecated)]
fn spk() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("spk").expect("spk binary")
}

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let site = dir.path().join("site.yaml");
    std::fs::write(&base, "reservation:\n  duration_secs: 30\nseed:\n  node_ids: [A1]\n").unwrap();
    std::fs::write(&site, "reservation:\n  duration_secs: 45\n").unwrap();

    spk()
        .arg("config-hash")
        .arg(&base)
        .arg(&site)
        .assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains("\"duration_secs\":45"))
        .stdout(predicate::str::contains("\"node_ids\":[\"A1\"]"));
}

#[test]
fn config_hash_refuses_inline_database_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.yaml");
    std::fs::write(&bad, "database:\n  url: postgres://user:hunter2@db/spk\n").unwrap();

    spk()
        .arg("config-hash")
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("hunter2").not());
}

#[test]
fn audit_verify_accepts_intact_chain_and_rejects_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    let mut w = AuditWriter::new(&path, true).unwrap();
    for v in 0..3u64 {
        w.append(
            "A1",
            "SPACE",
            "SENSOR_UPDATE",
            serde_json::json!({"node_id": "A1", "version": v, "final_status": "OCCUPIED"}),
        )
        .unwrap();
    }

    spk()
        .args(["audit", "verify"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("audit_valid=true lines=3"));

    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, content.replacen("OCCUPIED", "FREE", 1)).unwrap();

    spk()
        .args(["audit", "verify"])
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("audit_valid=false line=1"));
}

#[test]
fn audit_verify_uses_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("spaces.jsonl");
    let mut w = AuditWriter::new(&log, true).unwrap();
    w.append("B1", "SPACE", "CREATE", serde_json::json!({"node_id": "B1"}))
        .unwrap();

    let cfg = dir.path().join("cli.yaml");
    std::fs::write(
        &cfg,
        format!("audit:\n  path: {}\n  hash_chain: true\n", log.display()),
    )
    .unwrap();

    spk()
        .arg("--config")
        .arg(&cfg)
        .args(["audit", "verify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lines=1"));
}

#[test]
fn sessions_export_rejects_unknown_range() {
    let dir = tempfile::tempdir().unwrap();
    spk()
        .args(["sessions", "export", "--range", "month", "--out"])
        .arg(dir.path().join("out.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown range"));
}
