mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::commands_csv;
use predicates::prelude::*;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let csv = commands_csv(&["create,o1,e-1,employee,c-1,router,installation,,,,,Setup"]).unwrap();

    let mut cmd = Command::new(cargo_bin!("repair-orders"));
    cmd.arg(csv.path()).arg("--db-path").arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."))
        .stdout(predicate::str::contains(",c-1,router,installation,pending"));
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_db_path_from_environment_also_falls_back() {
    let csv = commands_csv(&["create,o1,e-1,employee,c-1,router,,,,,,Setup"]).unwrap();

    let mut cmd = Command::new(cargo_bin!("repair-orders"));
    cmd.arg(csv.path()).env("REPAIR_ORDERS_DB_PATH", "some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back to In-Memory storage"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let csv = commands_csv(&["create,o1,e-1,employee,c-1,router,,,,,,Setup"]).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("repair-orders"));
    cmd.arg(csv.path()).arg("--db-path").arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}
