#![cfg(feature = "storage-rocksdb")]

mod common;

use assert_cmd::cargo_bin;
use common::commands_csv;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: open and start an order
    let csv1 = commands_csv(&[
        "create,o1,e-1,employee,c-1,nintendo-switch,repair,,,,45.00,No display",
        "start,o1,e-1,employee,,,,,,,,",
    ])
    .unwrap();

    let mut cmd1 = Command::new(cargo_bin!("repair-orders"));
    cmd1.arg(csv1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    let row = stdout1
        .lines()
        .find(|line| line.contains("nintendo-switch"))
        .expect("order missing from first report");
    assert!(row.ends_with(",in_progress,normal,false,false,,,2"));
    let order_id = row.split(',').next().unwrap().to_string();

    // 2. Second run: continue the same order by its id
    let csv2 = commands_csv(&[
        format!("request_approval,{order_id},e-1,employee,,,,,,,,").as_str(),
        format!("approve,{order_id},c-1,client,,,,,,,,").as_str(),
    ])
    .unwrap();

    let mut cmd2 = Command::new(cargo_bin!("repair-orders"));
    cmd2.arg(csv2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    assert!(stdout2.contains(&format!(
        "{order_id},c-1,nintendo-switch,repair,approved,normal,true,false,ch-000001,45,4"
    )));
}
