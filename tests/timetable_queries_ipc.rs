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

fn create(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    seed: &Seed,
    teacher: &str,
    unit: &str,
    schedule: serde_json::Value,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "assignments.create",
        with_scope(
            &seed.school_id,
            "scheduler",
            json!({ "teacherId": teacher, "classStreamUnitId": unit, "schedule": schedule }),
        ),
    );
    created["assignmentId"].as_str().expect("assignmentId").to_string()
}

#[test]
fn availability_week_and_workload_reflect_saved_assignments() {
    let workspace = temp_dir("timetabled-queries");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed(&mut stdin, &mut reader);
    let v = |extra| with_scope(&seed.school_id, "viewer", extra);

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.teacherAvailable",
        v(json!({
            "teacherId": seed.teacher_a,
            "academicYearId": seed.year_id,
            "day": "monday",
            "period": "period_1"
        })),
    );
    assert_eq!(before["available"], json!(true));

    create(
        &mut stdin,
        &mut reader,
        "3",
        &seed,
        &seed.teacher_a,
        &seed.unit_east,
        json!({
            "monday": { "period_1": "Maths", "period_2": "Maths" },
            "wednesday": { "period_1": "Maths" }
        }),
    );
    create(
        &mut stdin,
        &mut reader,
        "4",
        &seed,
        &seed.teacher_a,
        &seed.unit_west,
        json!({ "tuesday": { "period_3": { "subject": "Physics", "room": "Lab" } } }),
    );

    let taken = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.teacherAvailable",
        v(json!({
            "teacherId": seed.teacher_a,
            "academicYearId": seed.year_id,
            "day": "monday",
            "period": "period_1"
        })),
    );
    assert_eq!(taken["available"], json!(false));
    let sibling = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "timetable.teacherAvailable",
        v(json!({
            "teacherId": seed.teacher_a,
            "academicYearId": seed.year_id,
            "day": "monday",
            "period": "period_3"
        })),
    );
    assert_eq!(sibling["available"], json!(true));
    let class_taken = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "timetable.classAvailable",
        v(json!({ "classStreamUnitId": seed.unit_west, "day": "tue", "period": "period_3" })),
    );
    assert_eq!(class_taken["available"], json!(false));

    let week = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "timetable.teacherWeek",
        v(json!({
            "teacherId": seed.teacher_a,
            "academicYearId": seed.year_id,
            "weekStart": "2026-10-19"
        })),
    );
    assert_eq!(week["weekStart"], json!("2026-10-19"));
    assert_eq!(week["slotCount"], json!(4));
    assert_eq!(week["overlaps"], json!([]));
    let days = week["days"].as_array().expect("days");
    let names: Vec<&str> = days.iter().filter_map(|d| d["day"].as_str()).collect();
    assert_eq!(names, vec!["monday", "tuesday", "wednesday", "thursday", "friday"]);
    assert_eq!(days[0]["date"], json!("2026-10-19"));
    assert_eq!(days[2]["date"], json!("2026-10-21"));
    // Free days still carry their date.
    assert_eq!(days[3]["date"], json!("2026-10-22"));
    assert_eq!(days[3]["periods"], json!([]));
    assert_eq!(days[4]["date"], json!("2026-10-23"));
    assert_eq!(days[1]["periods"][0]["period"], json!("period_3"));
    assert_eq!(days[1]["periods"][0]["room"], json!("Lab"));
    assert_eq!(days[1]["periods"][0]["classStreamUnitId"], json!(seed.unit_west));
    assert_eq!(week["schedule"]["monday"]["period_2"]["subject"], json!("Maths"));

    let class_week = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "timetable.classWeek",
        v(json!({ "classStreamUnitId": seed.unit_east })),
    );
    assert_eq!(class_week["slotCount"], json!(3));
    assert!(class_week.get("weekStart").is_none());
    assert_eq!(class_week["days"].as_array().map(|d| d.len()), Some(5));
    assert!(class_week["days"][0].get("date").is_none());

    let workload = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "timetable.workload",
        v(json!({ "teacherId": seed.teacher_a, "academicYearId": seed.year_id })),
    );
    assert_eq!(workload["totalPeriods"], json!(4));
    assert_eq!(workload["classesCount"], json!(2));
    assert_eq!(workload["daysActive"], json!(["monday", "tuesday", "wednesday"]));

    let idle = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "timetable.workload",
        v(json!({ "teacherId": seed.teacher_b, "academicYearId": seed.year_id })),
    );
    assert_eq!(idle["totalPeriods"], json!(0));
    assert_eq!(idle["daysActive"], json!([]));

    let free = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "timetable.freeSlots",
        v(json!({ "teacherId": seed.teacher_a, "academicYearId": seed.year_id })),
    );
    let free_slots = free["freeSlots"].as_array().expect("freeSlots");
    assert_eq!(free["gridSize"], json!(40));
    assert_eq!(free_slots.len(), 36);
    assert_eq!(free_slots[0], json!({ "day": "monday", "period": "period_3" }));

    let missing_week = request(
        &mut stdin,
        &mut reader,
        "13",
        "timetable.teacherWeek",
        v(json!({ "teacherId": seed.teacher_a, "academicYearId": seed.year_id })),
    );
    assert_eq!(error_code(&missing_week), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn validate_clash_and_integrity_are_read_only() {
    let workspace = temp_dir("timetabled-validate");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed(&mut stdin, &mut reader);
    let v = |extra| with_scope(&seed.school_id, "teacher", extra);

    let id = create(
        &mut stdin,
        &mut reader,
        "2",
        &seed,
        &seed.teacher_a,
        &seed.unit_east,
        json!({ "friday": { "period_4": "Art" } }),
    );

    let proposed = json!({ "friday": { "period_4": "Art", "period_5": "Art" } });
    let clash = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.validateClash",
        v(json!({
            "teacherId": seed.teacher_a,
            "classStreamUnitId": seed.unit_east,
            "schedule": proposed
        })),
    );
    assert_eq!(clash["clear"], json!(false));
    assert_eq!(clash["teacherClashes"][0]["conflictingPeriods"], json!(["period_4"]));
    assert_eq!(clash["classClashes"][0]["withAssignmentId"], json!(id));

    let excluded = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.validateClash",
        v(json!({
            "teacherId": seed.teacher_a,
            "classStreamUnitId": seed.unit_east,
            "schedule": proposed,
            "excludeAssignmentId": id
        })),
    );
    assert_eq!(excluded["clear"], json!(true));

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.validateClash",
        v(json!({
            "teacherId": seed.teacher_a,
            "classStreamUnitId": seed.unit_east,
            "schedule": {}
        })),
    );
    assert_eq!(empty["clear"], json!(true));

    let unknown_unit = request(
        &mut stdin,
        &mut reader,
        "6",
        "timetable.validateClash",
        v(json!({
            "teacherId": seed.teacher_a,
            "classStreamUnitId": "nope",
            "schedule": proposed
        })),
    );
    assert_eq!(error_code(&unknown_unit), "not_found");

    let integrity = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "timetable.integrity",
        v(json!({
            "schedule": [
                { "day": "monday", "period": "period_1", "subject": "Maths" },
                { "day": "monday", "period": "period_1", "subject": "Physics" }
            ]
        })),
    );
    assert_eq!(integrity["valid"], json!(false));
    assert_eq!(integrity["duplicates"][0]["positions"], json!([0, 1]));
    assert_eq!(integrity["schedule"]["monday"]["period_1"]["subject"], json!("Physics"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn another_school_cannot_see_or_use_foreign_rows() {
    let workspace = temp_dir("timetabled-tenants");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = seed(&mut stdin, &mut reader);
    create(
        &mut stdin,
        &mut reader,
        "2",
        &seed,
        &seed.teacher_a,
        &seed.unit_east,
        json!({ "monday": { "period_1": "Maths" } }),
    );

    let other = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schools.create",
        json!({ "name": "Other School", "role": "admin" }),
    );
    let other_id = other["schoolId"].as_str().expect("schoolId").to_string();
    let o = |extra| with_scope(&other_id, "admin", extra);

    let class_week = request(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.classWeek",
        o(json!({ "classStreamUnitId": seed.unit_east })),
    );
    assert_eq!(error_code(&class_week), "not_found");

    let week = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.teacherWeek",
        o(json!({
            "teacherId": seed.teacher_a,
            "academicYearId": seed.year_id,
            "weekStart": "2026-10-19"
        })),
    );
    assert_eq!(week["slotCount"], json!(0));

    let teachers = request_ok(&mut stdin, &mut reader, "6", "teachers.list", o(json!({})));
    assert_eq!(teachers["teachers"], json!([]));

    let hijack = request(
        &mut stdin,
        &mut reader,
        "7",
        "assignments.create",
        o(json!({
            "teacherId": seed.teacher_a,
            "classStreamUnitId": seed.unit_east,
            "schedule": { "tuesday": { "period_1": "Maths" } }
        })),
    );
    assert_eq!(error_code(&hijack), "not_found");

    let schools_as_scheduler = request(
        &mut stdin,
        &mut reader,
        "8",
        "schools.list",
        json!({ "role": "scheduler" }),
    );
    assert_eq!(error_code(&schools_as_scheduler), "forbidden");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
