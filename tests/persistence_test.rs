#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

const CONFIG: &str = "tests/fixtures/config.toml";

fn run(script: &tempfile::NamedTempFile, db_path: &std::path::Path) -> String {
    let output = Command::new(cargo_bin!("escrow-ledger"))
        .env_remove("ESCROW_LEDGER_DB_PATH")
        .arg(script.path())
        .arg("--config")
        .arg(CONFIG)
        .arg("--db-path")
        .arg(db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn alice_line(stdout: &str) -> String {
    stdout
        .lines()
        .find(|line| line.starts_with("alice,"))
        .expect("alice has a wallet")
        .to_string()
}

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger_db");

    // 1. First run: approve a top-up
    let mut first = tempfile::NamedTempFile::new().unwrap();
    writeln!(first, "op,actor,target,amount,reference,detail").unwrap();
    writeln!(first, "topup,alice,,100.00,R1").unwrap();
    writeln!(first, "approve,root,1").unwrap();
    let line1 = alice_line(&run(&first, &db_path));
    assert!(line1.ends_with(",100.00"));

    // 2. Second run: the next request gets id 2 and the wallet keeps its port
    let mut second = tempfile::NamedTempFile::new().unwrap();
    writeln!(second, "op,actor,target,amount,reference,detail").unwrap();
    writeln!(second, "topup,alice,,50.00,R2").unwrap();
    writeln!(second, "approve,root,2").unwrap();
    let line2 = alice_line(&run(&second, &db_path));

    let port1 = line1.split(',').nth(1).unwrap();
    let port2 = line2.split(',').nth(1).unwrap();
    assert_eq!(port1, port2);
    assert!(line2.ends_with(",150.00"));
}

#[test]
fn test_rocksdb_survives_a_failed_purchase() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger_db");

    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "op,actor,target,amount,reference,detail").unwrap();
    writeln!(script, "topup,alice,,50.00").unwrap();
    writeln!(script, "approve,root,1").unwrap();
    writeln!(script, "buy,alice,2").unwrap();
    run(&script, &db_path);

    let mut empty = tempfile::NamedTempFile::new().unwrap();
    writeln!(empty, "op,actor,target,amount,reference,detail").unwrap();
    let stdout = run(&empty, &db_path);
    assert!(alice_line(&stdout).ends_with(",50.00"));
    assert!(stdout.lines().any(|l| l.starts_with("bob,") && l.ends_with(",0.00")));
}
