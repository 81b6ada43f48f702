use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    authorize, get_day, get_optional_date, get_optional_str, get_period, get_required_str,
    get_schedule, with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::settings::TimetableSettings;
use crate::timetable::{
    validate_schedule_integrity, AcademicYearId, AssignmentId, Capability, ClassStreamUnitId,
    ComposedSchedule, SlotGrid, SqliteStore, TeacherId, TimetableEngine, Weekday,
};
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeSet;

fn required_teacher(params: &serde_json::Value) -> Result<TeacherId, HandlerErr> {
    Ok(TeacherId(get_required_str(params, "teacherId")?))
}

fn required_year(params: &serde_json::Value) -> Result<AcademicYearId, HandlerErr> {
    Ok(AcademicYearId(get_required_str(params, "academicYearId")?))
}

fn required_unit(params: &serde_json::Value) -> Result<ClassStreamUnitId, HandlerErr> {
    Ok(ClassStreamUnitId(get_required_str(params, "classStreamUnitId")?))
}

/// Renders a merged schedule as an ordered list of days: every grid weekday
/// (free ones with no periods) plus any off-grid day that holds lessons.
/// Periods follow grid order; each day carries its date when a week start
/// is known.
fn composed_json(composed: &ComposedSchedule, grid: &SlotGrid) -> serde_json::Value {
    let week: BTreeSet<Weekday> = grid
        .weekdays
        .iter()
        .copied()
        .chain(composed.days.keys().copied())
        .collect();
    let mut days = Vec::with_capacity(week.len());
    for day in week {
        let mut periods = Vec::new();
        if let Some(slots) = composed.days.get(&day) {
            let mut order: Vec<_> = slots.keys().cloned().collect();
            grid.sort_periods(&mut order);
            for p in &order {
                let Some(lesson) = slots.get(p) else { continue };
                let mut row = json!(lesson);
                row["period"] = json!(p);
                periods.push(row);
            }
        }
        let mut entry = json!({ "day": day, "periods": periods });
        if let Some(start) = composed.week_start {
            entry["date"] = json!(day.date_in_week(start).format("%Y-%m-%d").to_string());
        }
        days.push(entry);
    }

    let mut out = json!({
        "schedule": composed.to_weekly_schedule(),
        "days": days,
        "slotCount": composed.slot_count(),
        "overlaps": composed.overlaps,
    });
    if let Some(start) = composed.week_start {
        out["weekStart"] = json!(start.format("%Y-%m-%d").to_string());
    }
    out
}

fn validate_clash(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let teacher = required_teacher(params)?;
    let unit = required_unit(params)?;
    let proposed = get_schedule(params, "schedule")?;
    let exclude = get_optional_str(params, "excludeAssignmentId")?.map(AssignmentId);
    let settings = TimetableSettings::load(conn)?;

    let store = SqliteStore::new(conn);
    let report = TimetableEngine::new(&store)
        .with_policy(settings.policy)
        .validate_assignment_clash(&scope, &teacher, &unit, &proposed.schedule, exclude.as_ref())?;
    Ok(json!({
        "clear": report.is_clear(),
        "teacherClashes": report.teacher_clashes,
        "classClashes": report.class_clashes
    }))
}

fn teacher_available(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let teacher = required_teacher(params)?;
    let year = required_year(params)?;
    let day = get_day(params, "day")?;
    let period = get_period(params, "period")?;

    let store = SqliteStore::new(conn);
    let available =
        TimetableEngine::new(&store).is_teacher_available(&scope, &teacher, day, &period, &year)?;
    Ok(json!({ "available": available }))
}

fn class_available(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let unit = required_unit(params)?;
    let day = get_day(params, "day")?;
    let period = get_period(params, "period")?;

    let store = SqliteStore::new(conn);
    let available = TimetableEngine::new(&store).is_class_available(&scope, &unit, day, &period)?;
    Ok(json!({ "available": available }))
}

fn teacher_week(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let teacher = required_teacher(params)?;
    let year = required_year(params)?;
    let week_start = get_optional_date(params, "weekStart")?
        .ok_or_else(|| HandlerErr::bad_params("missing weekStart"))?;
    let settings = TimetableSettings::load(conn)?;

    let store = SqliteStore::new(conn);
    let composed =
        TimetableEngine::new(&store).teacher_weekly_schedule(&scope, &teacher, week_start, &year)?;
    Ok(composed_json(&composed, &settings.grid))
}

fn class_week(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let unit = required_unit(params)?;
    let settings = TimetableSettings::load(conn)?;

    let store = SqliteStore::new(conn);
    let composed = TimetableEngine::new(&store).class_weekly_schedule(&scope, &unit)?;
    Ok(composed_json(&composed, &settings.grid))
}

fn integrity(_conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    authorize(params, Capability::ViewTimetable)?;
    let parsed = get_schedule(params, "schedule")?;
    // The nested map cannot carry duplicates; only the list form is checked.
    let duplicates = parsed
        .entries
        .as_deref()
        .map(validate_schedule_integrity)
        .unwrap_or_default();
    Ok(json!({
        "valid": duplicates.is_empty(),
        "duplicates": duplicates,
        "schedule": parsed.schedule
    }))
}

fn workload(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let teacher = required_teacher(params)?;
    let year = required_year(params)?;

    let store = SqliteStore::new(conn);
    let stats = TimetableEngine::new(&store).teacher_workload_stats(&scope, &teacher, &year)?;
    serde_json::to_value(stats).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn free_slots(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let teacher = required_teacher(params)?;
    let year = required_year(params)?;
    let settings = TimetableSettings::load(conn)?;

    let store = SqliteStore::new(conn);
    let free = TimetableEngine::new(&store).teacher_free_slots(&scope, &teacher, &year, &settings.grid)?;
    Ok(json!({ "freeSlots": free, "gridSize": settings.grid.weekdays.len() * settings.grid.periods.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "timetable.validateClash" => validate_clash,
            "timetable.teacherAvailable" => teacher_available,
            "timetable.classAvailable" => class_available,
            "timetable.teacherWeek" => teacher_week,
            "timetable.classWeek" => class_week,
            "timetable.integrity" => integrity,
            "timetable.workload" => workload,
            "timetable.freeSlots" => free_slots,
            _ => return None,
        };
    Some(with_db(state, req, f))
}
