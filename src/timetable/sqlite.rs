//! SQLite-backed assignment store and the save path.
//!
//! Create and update re-run the clash check inside the write transaction.
//! The unique constraints on `assignment_slots` stay the final guard: a
//! violation that slips past the check surfaces as `SlotTaken`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, ToSql};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::access::TenantScope;
use super::engine::{ClashPolicy, TimetableEngine};
use super::error::{DbStep, TimetableError, TimetableResult, WriteStep};
use super::model::{
    AcademicYearId, AssignmentId, ClassStreamUnit, ClassStreamUnitId, Lesson, PeriodSlot,
    SchoolId, TeacherAssignment, TeacherId, Weekday, WeeklySchedule,
};
use super::store::AssignmentStore;
use crate::directory::{now_rfc3339, teacher_exists};

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

struct HeaderRow {
    id: String,
    teacher_id: String,
    class_stream_unit_id: String,
    school_id: String,
    academic_year_id: String,
    created_at: String,
    updated_at: String,
}

struct SlotRow {
    assignment_id: String,
    day: String,
    period: String,
    subject: String,
    room: Option<String>,
    notes: Option<String>,
}

fn parse_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {:?}", raw))?
        .with_timezone(&Utc))
}

/// Loads assignments matching `filter` (a predicate over alias `a`) with
/// their slots, ordered by `(created_at, id)`.
fn load_assignments(
    conn: &Connection,
    filter: &str,
    args: &[&dyn ToSql],
) -> anyhow::Result<Vec<TeacherAssignment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT a.id, a.teacher_id, a.class_stream_unit_id, a.school_id, a.academic_year_id,
                a.created_at, a.updated_at
         FROM teacher_assignments a
         WHERE {}
         ORDER BY a.created_at, a.id",
        filter
    ))?;
    let headers = stmt
        .query_map(args, |r| {
            Ok(HeaderRow {
                id: r.get(0)?,
                teacher_id: r.get(1)?,
                class_stream_unit_id: r.get(2)?,
                school_id: r.get(3)?,
                academic_year_id: r.get(4)?,
                created_at: r.get(5)?,
                updated_at: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT s.assignment_id, s.day, s.period, s.subject, s.room, s.notes
         FROM assignment_slots s
         JOIN teacher_assignments a ON a.id = s.assignment_id
         WHERE {}",
        filter
    ))?;
    let slot_rows = stmt
        .query_map(args, |r| {
            Ok(SlotRow {
                assignment_id: r.get(0)?,
                day: r.get(1)?,
                period: r.get(2)?,
                subject: r.get(3)?,
                room: r.get(4)?,
                notes: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut schedules: HashMap<String, WeeklySchedule> = HashMap::new();
    for s in slot_rows {
        let day = Weekday::parse(&s.day)?;
        let period = PeriodSlot::parse(&s.period)?;
        schedules.entry(s.assignment_id).or_default().insert(
            day,
            period,
            Lesson {
                subject: s.subject,
                room: s.room,
                notes: s.notes,
            },
        );
    }

    headers
        .into_iter()
        .map(|h| -> anyhow::Result<TeacherAssignment> {
            Ok(TeacherAssignment {
                schedule: schedules.remove(&h.id).unwrap_or_default(),
                created_at: parse_ts(&h.created_at)?,
                updated_at: parse_ts(&h.updated_at)?,
                id: AssignmentId(h.id),
                teacher_id: TeacherId(h.teacher_id),
                class_stream_unit_id: ClassStreamUnitId(h.class_stream_unit_id),
                school_id: SchoolId(h.school_id),
                academic_year_id: AcademicYearId(h.academic_year_id),
            })
        })
        .collect()
}

impl AssignmentStore for SqliteStore<'_> {
    fn class_stream_unit(
        &self,
        school: &SchoolId,
        unit: &ClassStreamUnitId,
    ) -> anyhow::Result<Option<ClassStreamUnit>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, school_id, academic_year_id, class_name, stream_name
                 FROM class_stream_units
                 WHERE id = ? AND school_id = ?",
                (unit.as_str(), school.as_str()),
                |r| {
                    Ok(ClassStreamUnit {
                        id: ClassStreamUnitId(r.get(0)?),
                        school_id: SchoolId(r.get(1)?),
                        academic_year_id: AcademicYearId(r.get(2)?),
                        class_name: r.get(3)?,
                        stream_name: r.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    fn assignments_for_year(
        &self,
        school: &SchoolId,
        year: &AcademicYearId,
    ) -> anyhow::Result<Vec<TeacherAssignment>> {
        load_assignments(
            self.conn,
            "a.school_id = ?1 AND a.academic_year_id = ?2",
            &[&school.as_str(), &year.as_str()],
        )
    }

    fn assignments_for_teacher(
        &self,
        school: &SchoolId,
        teacher: &TeacherId,
        year: &AcademicYearId,
    ) -> anyhow::Result<Vec<TeacherAssignment>> {
        load_assignments(
            self.conn,
            "a.school_id = ?1 AND a.teacher_id = ?2 AND a.academic_year_id = ?3",
            &[&school.as_str(), &teacher.as_str(), &year.as_str()],
        )
    }

    fn assignments_for_unit(
        &self,
        school: &SchoolId,
        unit: &ClassStreamUnitId,
    ) -> anyhow::Result<Vec<TeacherAssignment>> {
        load_assignments(
            self.conn,
            "a.school_id = ?1 AND a.class_stream_unit_id = ?2",
            &[&school.as_str(), &unit.as_str()],
        )
    }
}

pub fn get_assignment(
    conn: &Connection,
    scope: &TenantScope,
    id: &AssignmentId,
) -> TimetableResult<Option<TeacherAssignment>> {
    let mut rows = load_assignments(
        conn,
        "a.school_id = ?1 AND a.id = ?2",
        &[&scope.school_id().as_str(), &id.as_str()],
    )?;
    Ok(rows.pop())
}

fn validate_lessons(schedule: &WeeklySchedule) -> TimetableResult<()> {
    for (_, _, lesson) in schedule.iter() {
        lesson.validate()?;
    }
    Ok(())
}

fn map_slot_insert_err(e: rusqlite::Error) -> TimetableError {
    if let rusqlite::Error::SqliteFailure(ref f, ref msg) = e {
        if f.code == ErrorCode::ConstraintViolation {
            let detail = msg.clone().unwrap_or_else(|| "unique constraint".to_string());
            warn!(%detail, "slot insert hit a unique constraint");
            return TimetableError::SlotTaken(detail);
        }
    }
    TimetableError::Write {
        step: DbStep::Insert,
        source: e,
    }
}

fn insert_slots(
    conn: &Connection,
    assignment: &AssignmentId,
    teacher: &TeacherId,
    unit: &ClassStreamUnit,
    schedule: &WeeklySchedule,
) -> TimetableResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO assignment_slots(
            assignment_id, teacher_id, class_stream_unit_id, academic_year_id,
            day, period, subject, room, notes)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .step(DbStep::Insert)?;
    for (day, period, lesson) in schedule.iter() {
        stmt.execute((
            assignment.as_str(),
            teacher.as_str(),
            unit.id.as_str(),
            unit.academic_year_id.as_str(),
            day.as_str(),
            period.as_str(),
            lesson.subject.trim(),
            lesson.room.as_deref(),
            lesson.notes.as_deref(),
        ))
        .map_err(map_slot_insert_err)?;
    }
    Ok(())
}

/// Checks and stores a new assignment. Rejects with `Clash` when the
/// proposed schedule collides with anything already saved.
pub fn create_assignment(
    conn: &Connection,
    scope: &TenantScope,
    teacher: &TeacherId,
    unit: &ClassStreamUnitId,
    schedule: &WeeklySchedule,
    policy: ClashPolicy,
) -> TimetableResult<TeacherAssignment> {
    validate_lessons(schedule)?;
    let tx = conn.unchecked_transaction().step(DbStep::Begin)?;

    if !teacher_exists(&tx, scope, teacher)? {
        return Err(TimetableError::not_found("teacher", teacher));
    }
    let store = SqliteStore::new(&tx);
    let unit_row = store
        .class_stream_unit(scope.school_id(), unit)?
        .ok_or_else(|| TimetableError::not_found("class stream unit", unit))?;

    let report = TimetableEngine::new(&store)
        .with_policy(policy)
        .validate_assignment_clash(scope, teacher, unit, schedule, None)?;
    if !report.is_clear() {
        return Err(TimetableError::Clash(report));
    }

    let id = AssignmentId(Uuid::new_v4().to_string());
    let now = now_rfc3339();
    tx.execute(
        "INSERT INTO teacher_assignments(
            id, school_id, teacher_id, class_stream_unit_id, academic_year_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            id.as_str(),
            scope.school_id().as_str(),
            teacher.as_str(),
            unit.as_str(),
            unit_row.academic_year_id.as_str(),
            &now,
            &now,
        ),
    )
    .step(DbStep::Insert)?;
    insert_slots(&tx, &id, teacher, &unit_row, schedule)?;
    tx.commit().step(DbStep::Commit)?;

    info!(
        assignment = %id,
        teacher = %teacher,
        unit = %unit,
        slots = schedule.slot_count(),
        "assignment created"
    );
    get_assignment(conn, scope, &id)?.ok_or_else(|| TimetableError::not_found("assignment", &id))
}

/// Replaces the schedule of an existing assignment, comparing against every
/// other assignment but itself.
pub fn update_assignment_schedule(
    conn: &Connection,
    scope: &TenantScope,
    id: &AssignmentId,
    schedule: &WeeklySchedule,
    policy: ClashPolicy,
) -> TimetableResult<TeacherAssignment> {
    validate_lessons(schedule)?;
    let tx = conn.unchecked_transaction().step(DbStep::Begin)?;

    let current = get_assignment(&tx, scope, id)?
        .ok_or_else(|| TimetableError::not_found("assignment", id))?;
    let store = SqliteStore::new(&tx);
    let unit_row = store
        .class_stream_unit(scope.school_id(), &current.class_stream_unit_id)?
        .ok_or_else(|| TimetableError::not_found("class stream unit", &current.class_stream_unit_id))?;

    let report = TimetableEngine::new(&store)
        .with_policy(policy)
        .validate_assignment_clash(
            scope,
            &current.teacher_id,
            &current.class_stream_unit_id,
            schedule,
            Some(id),
        )?;
    if !report.is_clear() {
        return Err(TimetableError::Clash(report));
    }

    tx.execute(
        "DELETE FROM assignment_slots WHERE assignment_id = ?",
        [id.as_str()],
    )
    .step(DbStep::Delete)?;
    insert_slots(&tx, id, &current.teacher_id, &unit_row, schedule)?;
    tx.execute(
        "UPDATE teacher_assignments SET updated_at = ? WHERE id = ?",
        (now_rfc3339(), id.as_str()),
    )
    .step(DbStep::Update)?;
    tx.commit().step(DbStep::Commit)?;

    info!(assignment = %id, slots = schedule.slot_count(), "assignment updated");
    get_assignment(conn, scope, id)?.ok_or_else(|| TimetableError::not_found("assignment", id))
}

pub fn delete_assignment(conn: &Connection, scope: &TenantScope, id: &AssignmentId) -> TimetableResult<()> {
    let tx = conn.unchecked_transaction().step(DbStep::Begin)?;
    let owned = tx
        .query_row(
            "SELECT 1 FROM teacher_assignments WHERE id = ? AND school_id = ?",
            (id.as_str(), scope.school_id().as_str()),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !owned {
        return Err(TimetableError::not_found("assignment", id));
    }
    // No ON DELETE CASCADE; slots go first.
    tx.execute(
        "DELETE FROM assignment_slots WHERE assignment_id = ?",
        [id.as_str()],
    )
    .step(DbStep::Delete)?;
    tx.execute("DELETE FROM teacher_assignments WHERE id = ?", [id.as_str()])
        .step(DbStep::Delete)?;
    tx.commit().step(DbStep::Commit)?;
    info!(assignment = %id, "assignment deleted");
    Ok(())
}
