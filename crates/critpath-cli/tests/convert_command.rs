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

const SINGLE_TASK: &str = r#"{
  "tasks": [
    {"id": "t1", "name": "Solo", "parentId": null, "sortKey": "A", "duration": 3,
     "start": null, "end": null, "dependencies": [], "constraintType": "ASAP",
     "constraintDate": null, "schedulingMode": "auto", "actualStart": null,
     "actualFinish": null, "progress": 0, "baselineStart": null, "baselineFinish": null,
     "baselineDuration": null, "tradePartnerIds": [], "collapsed": false}
  ],
  "calendar": {"workingDays": ["Mon", "Tue", "Wed", "Thu", "Fri"], "exceptions": {}}
}"#;

#[test]
fn convert_json_to_mspdi_produces_xml() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(&dir, "project.json", SINGLE_TASK);
    let out_path = dir.path().join("project.xml");

    let status = schedule_bin()
        .args([
            "convert",
            input.to_str().unwrap(),
            "--to",
            "mspdi",
            "-o",
            out_path.to_str().unwrap(),
        ])
        .status()
        .unwrap();

    assert!(status.success());
    let contents = std::fs::read_to_string(&out_path).unwrap();
    assert!(contents.contains("<Project"));
    assert!(contents.contains("Solo"));
}

#[test]
fn convert_round_trip_through_mspdi_preserves_task_name() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_fixture(&dir, "project.json", SINGLE_TASK);
    let xml_path = dir.path().join("project.xml");
    let json_path = dir.path().join("roundtrip.json");

    let to_xml = schedule_bin()
        .args([
            "convert",
            input.to_str().unwrap(),
            "--to",
            "mspdi",
            "-o",
            xml_path.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert!(to_xml.success());

    let to_json = schedule_bin()
        .args([
            "convert",
            xml_path.to_str().unwrap(),
            "--to",
            "json",
            "-o",
            json_path.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert!(to_json.success());

    let contents = std::fs::read_to_string(&json_path).unwrap();
    assert!(contents.contains("Solo"));
}
