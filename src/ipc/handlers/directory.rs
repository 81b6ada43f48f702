use crate::directory;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{authorize, get_optional_date, get_optional_str, get_required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::timetable::{AcademicYearId, Capability, Role};
use rusqlite::Connection;
use serde_json::json;

// Schools sit above any tenant, so only a platform admin may touch them.
fn require_platform_admin(params: &serde_json::Value) -> Result<(), HandlerErr> {
    let role = get_required_str(params, "role")?;
    if Role::parse(&role) != Some(Role::Admin) {
        return Err(HandlerErr::new("forbidden", "schools are managed by admins only"));
    }
    Ok(())
}

fn schools_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_platform_admin(params)?;
    let name = get_required_str(params, "name")?;
    let school = directory::create_school(conn, &name)?;
    Ok(json!({ "schoolId": school.id, "name": school.name }))
}

fn schools_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_platform_admin(params)?;
    Ok(json!({ "schools": directory::list_schools(conn)? }))
}

fn years_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ManageTimetable)?;
    let name = get_required_str(params, "name")?;
    let year = directory::create_academic_year(
        conn,
        &scope,
        &name,
        get_optional_date(params, "startsOn")?,
        get_optional_date(params, "endsOn")?,
    )?;
    Ok(json!({ "academicYearId": year.id, "year": year }))
}

fn years_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    Ok(json!({ "academicYears": directory::list_academic_years(conn, &scope)? }))
}

fn teachers_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ManageTimetable)?;
    let name = get_required_str(params, "displayName")?;
    let teacher = directory::create_teacher(conn, &scope, &name)?;
    Ok(json!({ "teacherId": teacher.id, "teacher": teacher }))
}

fn teachers_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    Ok(json!({ "teachers": directory::list_teachers(conn, &scope)? }))
}

fn units_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ManageTimetable)?;
    let year = AcademicYearId(get_required_str(params, "academicYearId")?);
    let class_name = get_required_str(params, "className")?;
    let stream_name = get_optional_str(params, "streamName")?.unwrap_or_default();
    let unit = directory::create_unit(conn, &scope, &year, &class_name, &stream_name)?;
    Ok(json!({ "classStreamUnitId": unit.id, "label": unit.label(), "unit": unit }))
}

fn units_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = authorize(params, Capability::ViewTimetable)?;
    let year = get_optional_str(params, "academicYearId")?.map(AcademicYearId);
    let units = directory::list_units(conn, &scope, year.as_ref())?;
    let rows: Vec<serde_json::Value> = units
        .iter()
        .map(|u| {
            json!({
                "id": u.id,
                "academicYearId": u.academic_year_id,
                "className": u.class_name,
                "streamName": u.stream_name,
                "label": u.label()
            })
        })
        .collect();
    Ok(json!({ "units": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "schools.create" => schools_create,
            "schools.list" => schools_list,
            "years.create" => years_create,
            "years.list" => years_list,
            "teachers.create" => teachers_create,
            "teachers.list" => teachers_list,
            "units.create" => units_create,
            "units.list" => units_list,
            _ => return None,
        };
    Some(with_db(state, req, f))
}
