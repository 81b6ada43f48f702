use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_timetabled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn timetabled");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn with_scope(school_id: &str, role: &str, extra: serde_json::Value) -> serde_json::Value {
    let mut p = json!({ "schoolId": school_id, "role": role });
    if let (Some(dst), Some(src)) = (p.as_object_mut(), extra.as_object()) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    p
}

#[allow(dead_code)]
struct Seed {
    school_id: String,
    year_id: String,
    teacher_a: String,
    teacher_b: String,
    unit_east: String,
    unit_west: String,
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Seed {
    let school = request_ok(
        stdin,
        reader,
        "seed-1",
        "schools.create",
        json!({ "name": "Clash High", "role": "admin" }),
    );
    let school_id = school["schoolId"].as_str().expect("schoolId").to_string();
    let s = |extra| with_scope(&school_id, "admin", extra);
    let year = request_ok(stdin, reader, "seed-2", "years.create", s(json!({ "name": "2026" })));
    let year_id = year["academicYearId"].as_str().expect("yearId").to_string();
    let a = request_ok(stdin, reader, "seed-3", "teachers.create", s(json!({ "displayName": "A" })));
    let b = request_ok(stdin, reader, "seed-4", "teachers.create", s(json!({ "displayName": "B" })));
    let east = request_ok(
        stdin,
        reader,
        "seed-5",
        "units.create",
        s(json!({ "academicYearId": year_id, "className": "Form 2", "streamName": "East" })),
    );
    let west = request_ok(
        stdin,
        reader,
        "seed-6",
        "units.create",
        s(json!({ "academicYearId": year_id, "className": "Form 2", "streamName": "West" })),
    );
    Seed {
        year_id,
        teacher_a: a["teacherId"].as_str().expect("teacherId").to_string(),
        teacher_b: b["teacherId"].as_str().expect("teacherId").to_string(),
        unit_east: east["classStreamUnitId"].as_str().expect("unitId").to_string(),
        unit_west: west["classStreamUnitId"].as_str().expect("unitId").to_string(),
        school_id,
    }
}

#[test]
fn setup_timetable_defaults_update_and_validation() {
    let workspace = temp_dir("timetabled-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let defaults = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    let tt = &defaults["timetable"];
    assert_eq!(
        tt["weekdays"],
        json!(["monday", "tuesday", "wednesday", "thursday", "friday"])
    );
    assert_eq!(tt["periods"].as_array().map(|a| a.len()), Some(8));
    assert_eq!(tt["rejectUnknownSlots"], json!(false));
    assert_eq!(tt["reportSameTeacherClassClashes"], json!(true));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({
            "section": "timetable",
            "patch": { "weekdays": ["fri", "monday", "Mon"], "periods": ["zeta", "alpha"] }
        }),
    );
    assert_eq!(updated["timetable"]["weekdays"], json!(["monday", "friday"]));
    assert_eq!(updated["timetable"]["periods"], json!(["zeta", "alpha"]));

    let reread = request_ok(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    assert_eq!(reread["timetable"]["periods"], json!(["zeta", "alpha"]));
    assert_eq!(reread["timetable"]["rejectUnknownSlots"], json!(false));

    let cases = [
        json!({ "section": "timetable", "patch": { "weekdays": [] } }),
        json!({ "section": "timetable", "patch": { "weekdays": ["someday"] } }),
        json!({ "section": "timetable", "patch": { "periods": ["a", "a"] } }),
        json!({ "section": "timetable", "patch": { "periods": ["has space"] } }),
        json!({ "section": "timetable", "patch": { "rejectUnknownSlots": "yes" } }),
        json!({ "section": "timetable", "patch": { "colour": "blue" } }),
        json!({ "section": "printer", "patch": {} }),
        json!({ "section": "timetable", "patch": [] }),
    ];
    for (i, params) in cases.iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "setup.update",
            params.clone(),
        );
        assert_eq!(error_code(&resp), "bad_params", "case {}: {}", i, params);
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn timetable_settings_drive_grid_checks_ordering_and_clash_policy() {
    let workspace = temp_dir("timetabled-setup-applied");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed(&mut stdin, &mut reader);
    let s = |extra| with_scope(&seed.school_id, "scheduler", extra);

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({
            "section": "timetable",
            "patch": {
                "weekdays": ["monday", "tuesday"],
                "periods": ["zeta", "alpha"],
                "rejectUnknownSlots": true,
                "reportSameTeacherClassClashes": false
            }
        }),
    );

    let off_grid = request(
        &mut stdin,
        &mut reader,
        "3",
        "assignments.create",
        s(json!({
            "teacherId": seed.teacher_a,
            "classStreamUnitId": seed.unit_east,
            "schedule": { "monday": { "period_1": "Maths" } }
        })),
    );
    assert_eq!(error_code(&off_grid), "unknown_slot");
    assert_eq!(off_grid["error"]["details"]["period"], json!("period_1"));

    let off_day = request(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.create",
        s(json!({
            "teacherId": seed.teacher_a,
            "classStreamUnitId": seed.unit_east,
            "schedule": { "friday": { "zeta": "Maths" } }
        })),
    );
    assert_eq!(error_code(&off_day), "unknown_slot");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.create",
        s(json!({
            "teacherId": seed.teacher_a,
            "classStreamUnitId": seed.unit_east,
            "schedule": { "monday": { "alpha": "Maths", "zeta": "Maths" } }
        })),
    );
    assert_eq!(created["assignment"]["slotCount"], json!(2));

    // Periods come back in configured order, not lexical order.
    let week = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "timetable.teacherWeek",
        s(json!({
            "teacherId": seed.teacher_a,
            "academicYearId": seed.year_id,
            "weekStart": "2026-10-19"
        })),
    );
    let periods: Vec<&str> = week["days"][0]["periods"]
        .as_array()
        .expect("periods")
        .iter()
        .filter_map(|p| p["period"].as_str())
        .collect();
    assert_eq!(periods, vec!["zeta", "alpha"]);

    let free = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "timetable.freeSlots",
        s(json!({ "teacherId": seed.teacher_a, "academicYearId": seed.year_id })),
    );
    assert_eq!(free["gridSize"], json!(4));
    assert_eq!(
        free["freeSlots"],
        json!([
            { "day": "tuesday", "period": "zeta" },
            { "day": "tuesday", "period": "alpha" }
        ])
    );

    // Same teacher and unit: with the policy off only the teacher clash is listed.
    let clash = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "timetable.validateClash",
        s(json!({
            "teacherId": seed.teacher_a,
            "classStreamUnitId": seed.unit_east,
            "schedule": { "monday": { "zeta": "Maths" } }
        })),
    );
    assert_eq!(clash["teacherClashes"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(clash["classClashes"], json!([]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
