use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{authorize, get_optional_str, get_required_str, get_schedule, with_db, ParsedSchedule};
use crate::ipc::types::{AppState, Request};
use crate::settings::TimetableSettings;
use crate::timetable::{
    self, validate_schedule_integrity, AcademicYearId, AssignmentId, AssignmentStore,
    Capability, ClassStreamUnitId, SqliteStore, TeacherAssignment, TeacherId, TimetableError,
};
use rusqlite::Connection;
use serde_json::json;

/// Shared checks for anything about to be saved: no duplicate keys in the
/// list form, and every slot inside the grid when the workspace asks for it.
fn prepare_schedule(
    parsed: &ParsedSchedule,
    settings: &TimetableSettings,
) -> Result<(), HandlerErr> {
    if let Some(entries) = &parsed.entries {
        let dups = validate_schedule_integrity(entries);
        if !dups.is_empty() {
            return Err(TimetableError::DuplicateSlots(dups).into());
        }
    }
    if settings.reject_unknown_slots {
        settings.grid.check(&parsed.schedule)?;
    }
    Ok(())
}

fn assignment_json(a: &TeacherAssignment) -> serde_json::Value {
    json!({
        "id": a.id,
        "teacherId": a.teacher_id,
        "classStreamUnitId": a.class_stream_unit_id,
        "academicYearId": a.academic_year_id,
        "schedule": a.schedule,
        "slotCount": a.schedule.slot_count(),
        "createdAt": a.created_at,
        "updatedAt": a.updated_at
    })
}

fn assignments_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ManageTimetable)?;
    let teacher = TeacherId(get_required_str(params, "teacherId")?);
    let unit = ClassStreamUnitId(get_required_str(params, "classStreamUnitId")?);
    let parsed = get_schedule(params, "schedule")?;
    let settings = TimetableSettings::load(conn)?;
    prepare_schedule(&parsed, &settings)?;

    let created = timetable::create_assignment(
        conn,
        &scope,
        &teacher,
        &unit,
        &parsed.schedule,
        settings.policy,
    )?;
    Ok(json!({ "assignmentId": created.id, "assignment": assignment_json(&created) }))
}

fn assignments_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ManageTimetable)?;
    let id = AssignmentId(get_required_str(params, "assignmentId")?);
    let parsed = get_schedule(params, "schedule")?;
    let settings = TimetableSettings::load(conn)?;
    prepare_schedule(&parsed, &settings)?;

    let updated =
        timetable::update_assignment_schedule(conn, &scope, &id, &parsed.schedule, settings.policy)?;
    Ok(json!({ "assignment": assignment_json(&updated) }))
}

fn assignments_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ManageTimetable)?;
    let id = AssignmentId(get_required_str(params, "assignmentId")?);
    timetable::delete_assignment(conn, &scope, &id)?;
    Ok(json!({ "ok": true }))
}

fn assignments_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let id = AssignmentId(get_required_str(params, "assignmentId")?);
    let a = timetable::get_assignment(conn, &scope, &id)?
        .ok_or_else(|| TimetableError::not_found("assignment", &id))?;
    Ok(json!({ "assignment": assignment_json(&a) }))
}

/// Lists by teacher (needs `academicYearId`), by unit, or the whole year.
fn assignments_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let store = SqliteStore::new(conn);
    let school = scope.school_id();
    let teacher = get_optional_str(params, "teacherId")?.map(TeacherId);
    let unit = get_optional_str(params, "classStreamUnitId")?.map(ClassStreamUnitId);
    let year = get_optional_str(params, "academicYearId")?.map(AcademicYearId);

    let rows = match (teacher, unit, year) {
        (Some(t), None, Some(y)) => store.assignments_for_teacher(school, &t, &y)?,
        (None, Some(u), _) => store.assignments_for_unit(school, &u)?,
        (None, None, Some(y)) => store.assignments_for_year(school, &y)?,
        (Some(_), _, None) => {
            return Err(HandlerErr::bad_params("teacherId requires academicYearId"))
        }
        (Some(_), Some(_), _) => {
            return Err(HandlerErr::bad_params(
                "pass either teacherId or classStreamUnitId, not both",
            ))
        }
        (None, None, None) => {
            return Err(HandlerErr::bad_params(
                "one of teacherId, classStreamUnitId or academicYearId is required",
            ))
        }
    };
    let out: Vec<serde_json::Value> = rows.iter().map(assignment_json).collect();
    Ok(json!({ "assignments": out }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "assignments.create" => assignments_create,
            "assignments.update" => assignments_update,
            "assignments.delete" => assignments_delete,
            "assignments.get" => assignments_get,
            "assignments.list" => assignments_list,
            _ => return None,
        };
    Some(with_db(state, req, f))
}
