//! Integration tests driving the compiled `schedule` binary (§13 test
//! tooling: `tempfile` for CLI tests that read/write real files).

use std::io::Write;
use std::process::Command;

fn schedule_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_schedule"))
}

fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

const THREE_TASK_CHAIN: &str = r#"{
  "tasks": [
    {"id": "t1", "name": "Dig footings", "parentId": null, "sortKey": "A", "duration": 3,
     "start": null, "end": null, "dependencies": [], "constraintType": "ASAP",
     "constraintDate": null, "schedulingMode": "auto", "actualStart": null,
     "actualFinish": null, "progress": 0, "baselineStart": null, "baselineFinish": null,
     "baselineDuration": null, "tradePartnerIds": [], "collapsed": false},
    {"id": "t2", "name": "Pour slab", "parentId": null, "sortKey": "B", "duration": 2,
     "start": null, "end": null,
     "dependencies": [{"predId": "t1", "type": "FS", "lag": 0}],
     "constraintType": "ASAP", "constraintDate": null, "schedulingMode": "auto",
     "actualStart": null, "actualFinish": null, "progress": 0, "baselineStart": null,
     "baselineFinish": null, "baselineDuration": null, "tradePartnerIds": [], "collapsed": false},
    {"id": "t3", "name": "Frame walls", "parentId": null, "sortKey": "C", "duration": 1,
     "start": null, "end": null,
     "dependencies": [{"predId": "t2", "type": "FS", "lag": 0}],
     "constraintType": "ASAP", "constraintDate": null, "schedulingMode": "auto",
     "actualStart": null, "actualFinish": null, "progress": 0, "baselineStart": null,
     "baselineFinish": null, "baselineDuration": null, "tradePartnerIds": [], "collapsed": false}
  ],
  "calendar": {
    "workingDays": ["Mon", "Tue", "Wed", "Thu", "Fri"],
    "exceptions": {}
  }
}"#;

#[test]
fn compute_seed_scenario_one_matches_expected_dates() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(&dir, "chain.json", THREE_TASK_CHAIN);

    let output = schedule_bin()
        .args([
            "compute",
            input.to_str().unwrap(),
            "--format",
            "json",
            "--as-of",
            "2024-01-01",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8(output.stdout).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let tasks = parsed["tasks"].as_array().unwrap();
    let t3 = tasks.iter().find(|t| t["id"] == "t3").unwrap();
    assert_eq!(t3["start"], "2024-01-08");
    assert_eq!(t3["end"], "2024-01-08");
    assert_eq!(t3["derived"]["isCritical"], true);
}

#[test]
fn compute_writes_to_output_file_when_given() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(&dir, "chain.json", THREE_TASK_CHAIN);
    let out_path = dir.path().join("result.json");

    let status = schedule_bin()
        .args([
            "compute",
            input.to_str().unwrap(),
            "--format",
            "json",
            "--output",
            out_path.to_str().unwrap(),
            "--as-of",
            "2024-01-01",
        ])
        .status()
        .unwrap();

    assert!(status.success());
    assert!(out_path.exists());
    let contents = std::fs::read_to_string(&out_path).unwrap();
    assert!(contents.contains("\"t1\""));
}

#[test]
fn compute_text_format_lists_every_task() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(&dir, "chain.json", THREE_TASK_CHAIN);

    let output = schedule_bin()
        .args(["compute", input.to_str().unwrap(), "--as-of", "2024-01-01"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("t1"));
    assert!(stdout.contains("t2"));
    assert!(stdout.contains("t3"));
}

#[test]
fn cycle_fails_with_distinct_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let cyclic = r#"{
      "tasks": [
        {"id": "a", "name": "A", "parentId": null, "sortKey": "A", "duration": 1,
         "start": null, "end": null,
         "dependencies": [{"predId": "b", "type": "FS", "lag": 0}],
         "constraintType": "ASAP", "constraintDate": null, "schedulingMode": "auto",
         "actualStart": null, "actualFinish": null, "progress": 0, "baselineStart": null,
         "baselineFinish": null, "baselineDuration": null, "tradePartnerIds": [], "collapsed": false},
        {"id": "b", "name": "B", "parentId": null, "sortKey": "B", "duration": 1,
         "start": null, "end": null,
         "dependencies": [{"predId": "a", "type": "FS", "lag": 0}],
         "constraintType": "ASAP", "constraintDate": null, "schedulingMode": "auto",
         "actualStart": null, "actualFinish": null, "progress": 0, "baselineStart": null,
         "baselineFinish": null, "baselineDuration": null, "tradePartnerIds": [], "collapsed": false}
      ],
      "calendar": {"workingDays": ["Mon", "Tue", "Wed", "Thu", "Fri"], "exceptions": {}}
    }"#;
    let input = write_fixture(&dir, "cycle.json", cyclic);

    let output = schedule_bin()
        .args(["compute", input.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("CycleError"));
}
