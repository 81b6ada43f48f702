//! School directory rows the timetable refers to: schools, academic years,
//! teachers and class-stream units. Enough CRUD for the sidecar to stand on
//! its own; the host application normally owns these.

use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::timetable::{
    AcademicYearId, ClassStreamUnit, ClassStreamUnitId, DbStep, SchoolId, TeacherId, TenantScope,
    TimetableError, TimetableResult, WriteStep,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: SchoolId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: AcademicYearId,
    pub school_id: SchoolId,
    pub name: String,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    pub school_id: SchoolId,
    pub display_name: String,
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn required_name(raw: &str, what: &str) -> TimetableResult<String> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(TimetableError::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(t.to_string())
}

pub fn create_school(conn: &Connection, name: &str) -> TimetableResult<School> {
    let name = required_name(name, "name")?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schools(id, name, created_at) VALUES(?, ?, ?)",
        (&id, &name, now_rfc3339()),
    )
    .step(DbStep::Insert)?;
    Ok(School {
        id: id.into(),
        name,
    })
}

pub fn list_schools(conn: &Connection) -> TimetableResult<Vec<School>> {
    let mut stmt = conn.prepare("SELECT id, name FROM schools ORDER BY name, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(School {
                id: SchoolId(r.get(0)?),
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn school_exists(conn: &Connection, school: &SchoolId) -> TimetableResult<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM schools WHERE id = ?", [school.as_str()], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

fn require_school(conn: &Connection, scope: &TenantScope) -> TimetableResult<()> {
    if !school_exists(conn, scope.school_id())? {
        return Err(TimetableError::not_found("school", scope.school_id()));
    }
    Ok(())
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

pub fn create_academic_year(
    conn: &Connection,
    scope: &TenantScope,
    name: &str,
    starts_on: Option<NaiveDate>,
    ends_on: Option<NaiveDate>,
) -> TimetableResult<AcademicYear> {
    require_school(conn, scope)?;
    let name = required_name(name, "name")?;
    if let (Some(s), Some(e)) = (starts_on, ends_on) {
        if e < s {
            return Err(TimetableError::InvalidInput(
                "endsOn must not be before startsOn".to_string(),
            ));
        }
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO academic_years(id, school_id, name, starts_on, ends_on) VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            scope.school_id().as_str(),
            &name,
            starts_on.map(|d| d.format("%Y-%m-%d").to_string()),
            ends_on.map(|d| d.format("%Y-%m-%d").to_string()),
        ),
    )
    .step(DbStep::Insert)?;
    Ok(AcademicYear {
        id: id.into(),
        school_id: scope.school_id().clone(),
        name,
        starts_on,
        ends_on,
    })
}

pub fn list_academic_years(conn: &Connection, scope: &TenantScope) -> TimetableResult<Vec<AcademicYear>> {
    let mut stmt = conn.prepare(
        "SELECT id, school_id, name, starts_on, ends_on
         FROM academic_years
         WHERE school_id = ?
         ORDER BY starts_on, name",
    )?;
    let rows = stmt
        .query_map([scope.school_id().as_str()], |r| {
            Ok(AcademicYear {
                id: AcademicYearId(r.get(0)?),
                school_id: SchoolId(r.get(1)?),
                name: r.get(2)?,
                starts_on: parse_date(r.get(3)?),
                ends_on: parse_date(r.get(4)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn academic_year_exists(
    conn: &Connection,
    scope: &TenantScope,
    year: &AcademicYearId,
) -> TimetableResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM academic_years WHERE id = ? AND school_id = ?",
            (year.as_str(), scope.school_id().as_str()),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

pub fn create_teacher(conn: &Connection, scope: &TenantScope, display_name: &str) -> TimetableResult<Teacher> {
    require_school(conn, scope)?;
    let display_name = required_name(display_name, "displayName")?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, school_id, display_name, created_at) VALUES(?, ?, ?, ?)",
        (&id, scope.school_id().as_str(), &display_name, now_rfc3339()),
    )
    .step(DbStep::Insert)?;
    Ok(Teacher {
        id: id.into(),
        school_id: scope.school_id().clone(),
        display_name,
    })
}

pub fn list_teachers(conn: &Connection, scope: &TenantScope) -> TimetableResult<Vec<Teacher>> {
    let mut stmt = conn.prepare(
        "SELECT id, school_id, display_name
         FROM teachers
         WHERE school_id = ?
         ORDER BY display_name, id",
    )?;
    let rows = stmt
        .query_map([scope.school_id().as_str()], |r| {
            Ok(Teacher {
                id: TeacherId(r.get(0)?),
                school_id: SchoolId(r.get(1)?),
                display_name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn teacher_exists(conn: &Connection, scope: &TenantScope, teacher: &TeacherId) -> TimetableResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM teachers WHERE id = ? AND school_id = ?",
            (teacher.as_str(), scope.school_id().as_str()),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

pub fn create_unit(
    conn: &Connection,
    scope: &TenantScope,
    year: &AcademicYearId,
    class_name: &str,
    stream_name: &str,
) -> TimetableResult<ClassStreamUnit> {
    if !academic_year_exists(conn, scope, year)? {
        return Err(TimetableError::not_found("academic year", year));
    }
    let class_name = required_name(class_name, "className")?;
    let stream_name = stream_name.trim().to_string();
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO class_stream_units(id, school_id, academic_year_id, class_name, stream_name)
         VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            scope.school_id().as_str(),
            year.as_str(),
            &class_name,
            &stream_name,
        ),
    )
    .step(DbStep::Insert)?;
    Ok(ClassStreamUnit {
        id: ClassStreamUnitId(id),
        school_id: scope.school_id().clone(),
        academic_year_id: year.clone(),
        class_name,
        stream_name,
    })
}

pub fn list_units(
    conn: &Connection,
    scope: &TenantScope,
    year: Option<&AcademicYearId>,
) -> TimetableResult<Vec<ClassStreamUnit>> {
    let mut stmt = conn.prepare(
        "SELECT id, school_id, academic_year_id, class_name, stream_name
         FROM class_stream_units
         WHERE school_id = ?1 AND (?2 IS NULL OR academic_year_id = ?2)
         ORDER BY class_name, stream_name",
    )?;
    let rows = stmt
        .query_map(
            (scope.school_id().as_str(), year.map(|y| y.as_str())),
            |r| {
                Ok(ClassStreamUnit {
                    id: ClassStreamUnitId(r.get(0)?),
                    school_id: SchoolId(r.get(1)?),
                    academic_year_id: AcademicYearId(r.get(2)?),
                    class_name: r.get(3)?,
                    stream_name: r.get(4)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
