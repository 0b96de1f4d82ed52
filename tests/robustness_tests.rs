use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_malformed_csv_handling() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("robustness_test.csv");
    let mut wtr = csv::Writer::from_path(&output_path).unwrap();
    wtr.write_record([
        "command", "order", "actor", "role", "client", "equipment", "service", "priority",
        "part", "quantity", "amount", "comment",
    ])
    .unwrap();

    // Valid order
    wtr.write_record(["create", "o1", "e-1", "employee", "c-1", "tv", "", "", "", "", "", "No sound"])
        .unwrap();
    // Unknown command
    wtr.write_record(["explode", "o1", "e-1", "employee", "", "", "", "", "", "", "", ""])
        .unwrap();
    // Text in quantity field
    wtr.write_record(["part", "o1", "e-1", "employee", "", "", "", "", "speaker", "two", "", ""])
        .unwrap();
    // Negative amount
    wtr.write_record(["create", "o2", "e-1", "employee", "c-2", "radio", "", "", "", "", "-5", ""])
        .unwrap();
    // Unknown alias
    wtr.write_record(["start", "o9", "e-1", "employee", "", "", "", "", "", "", "", ""])
        .unwrap();
    // Valid transition again
    wtr.write_record(["start", "o1", "e-1", "employee", "", "", "", "", "", "", "", ""])
        .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("repair-orders"));
    cmd.arg(&output_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading command on line 3"))
        .stderr(predicate::str::contains("Error reading command on line 4"))
        .stderr(predicate::str::contains("Error reading command on line 5"))
        .stderr(predicate::str::contains("Unknown order alias 'o9'"))
        .stdout(predicate::str::contains(",c-1,tv,repair,in_progress,normal,false,false,,,2"))
        .stdout(predicate::str::contains("radio").not());
}

#[test]
fn test_missing_input_file_fails() {
    let mut cmd = Command::new(cargo_bin!("repair-orders"));
    cmd.arg("does/not/exist.csv");

    cmd.assert().failure();
}
