//! Timetable conflict engine.
//!
//! Read-and-compare over the assignments a store hands back. Nothing here
//! writes; the SQLite write path calls [`TimetableEngine::validate_assignment_clash`]
//! inside its own transaction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::access::TenantScope;
use super::error::{TimetableError, TimetableResult};
use super::model::{
    AcademicYearId, AssignmentId, ClassStreamUnitId, Lesson, PeriodSlot, ScheduleEntry,
    TeacherAssignment, TeacherId, Weekday, WeeklySchedule,
};
use super::store::AssignmentStore;

/// Colliding periods on one day against one existing assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clash {
    pub day: Weekday,
    pub conflicting_periods: Vec<PeriodSlot>,
    pub with_assignment_id: AssignmentId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClashReport {
    pub teacher_clashes: Vec<Clash>,
    pub class_clashes: Vec<Clash>,
}

impl ClashReport {
    pub fn is_clear(&self) -> bool {
        self.teacher_clashes.is_empty() && self.class_clashes.is_empty()
    }
}

/// A `(day, period)` key listed more than once in the pre-folded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSlot {
    pub day: Weekday,
    pub period: PeriodSlot,
    /// Zero-based list positions, ascending.
    pub positions: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStats {
    pub total_periods: usize,
    pub classes_count: usize,
    pub days_active: BTreeSet<Weekday>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledLesson {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub assignment_id: AssignmentId,
    pub teacher_id: TeacherId,
    pub class_stream_unit_id: ClassStreamUnitId,
}

/// A contested slot: `kept` owns it in the merged view, `dropped` lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotOverlap {
    pub day: Weekday,
    pub period: PeriodSlot,
    pub kept: AssignmentId,
    pub dropped: AssignmentId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedSchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_start: Option<NaiveDate>,
    pub days: BTreeMap<Weekday, BTreeMap<PeriodSlot, ScheduledLesson>>,
    pub overlaps: Vec<SlotOverlap>,
}

impl ComposedSchedule {
    pub fn slot_count(&self) -> usize {
        self.days.values().map(|p| p.len()).sum()
    }

    pub fn contains(&self, day: Weekday, period: &PeriodSlot) -> bool {
        self.days.get(&day).is_some_and(|p| p.contains_key(period))
    }

    /// Drops provenance and keeps only the lessons.
    pub fn to_weekly_schedule(&self) -> WeeklySchedule {
        let mut out = WeeklySchedule::new();
        for (day, periods) in &self.days {
            for (period, sl) in periods {
                out.insert(*day, period.clone(), sl.lesson.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSlot {
    pub day: Weekday,
    pub period: PeriodSlot,
}

/// Site-configured weekdays and period order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrid {
    pub weekdays: Vec<Weekday>,
    /// Empty means "any period id is accepted and order is lexical".
    pub periods: Vec<PeriodSlot>,
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self {
            weekdays: Weekday::SCHOOL_WEEK.to_vec(),
            periods: Vec::new(),
        }
    }
}

impl SlotGrid {
    pub fn contains(&self, day: Weekday, period: &PeriodSlot) -> bool {
        self.weekdays.contains(&day) && (self.periods.is_empty() || self.periods.contains(period))
    }

    /// Configured periods first in configured order, then the rest lexically.
    pub fn sort_periods(&self, periods: &mut [PeriodSlot]) {
        let rank: HashMap<&PeriodSlot, usize> =
            self.periods.iter().enumerate().map(|(i, p)| (p, i)).collect();
        periods.sort_by(|a, b| {
            let ra = rank.get(a).copied().unwrap_or(usize::MAX);
            let rb = rank.get(b).copied().unwrap_or(usize::MAX);
            ra.cmp(&rb).then_with(|| a.cmp(b))
        });
    }

    /// First slot of `schedule` that falls outside the grid.
    pub fn check(&self, schedule: &WeeklySchedule) -> TimetableResult<()> {
        for (day, period, _) in schedule.iter() {
            if !self.contains(day, period) {
                return Err(TimetableError::UnknownSlot {
                    day: day.as_str().to_string(),
                    period: period.as_str().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClashPolicy {
    /// When false, a class clash whose existing assignment belongs to the
    /// proposing teacher is left to the teacher-clash list alone.
    pub report_same_teacher_class_clashes: bool,
}

impl Default for ClashPolicy {
    fn default() -> Self {
        Self {
            report_same_teacher_class_clashes: true,
        }
    }
}

/// Reports every `(day, period)` key that appears more than once in the list
/// form, in weekday then period order.
pub fn validate_schedule_integrity(entries: &[ScheduleEntry]) -> Vec<DuplicateSlot> {
    let mut seen: BTreeMap<(Weekday, &PeriodSlot), Vec<usize>> = BTreeMap::new();
    for (i, e) in entries.iter().enumerate() {
        seen.entry((e.day, &e.period)).or_default().push(i);
    }
    seen.into_iter()
        .filter(|(_, positions)| positions.len() > 1)
        .map(|((day, period), positions)| DuplicateSlot {
            day,
            period: period.clone(),
            positions,
        })
        .collect()
}

fn clashes_against(proposed: &WeeklySchedule, existing: &TeacherAssignment) -> Vec<Clash> {
    proposed
        .intersect(&existing.schedule)
        .into_iter()
        .map(|(day, conflicting_periods)| Clash {
            day,
            conflicting_periods,
            with_assignment_id: existing.id.clone(),
        })
        .collect()
}

fn compose(mut assignments: Vec<TeacherAssignment>, week_start: Option<NaiveDate>) -> ComposedSchedule {
    assignments.sort_by(|a, b| a.precedence_key().cmp(&b.precedence_key()));

    let mut out = ComposedSchedule {
        week_start,
        ..Default::default()
    };
    for a in &assignments {
        for (day, period, lesson) in a.schedule.iter() {
            let slot = out.days.entry(day).or_default();
            if let Some(holder) = slot.get(period) {
                out.overlaps.push(SlotOverlap {
                    day,
                    period: period.clone(),
                    kept: holder.assignment_id.clone(),
                    dropped: a.id.clone(),
                });
                continue;
            }
            slot.insert(
                period.clone(),
                ScheduledLesson {
                    lesson: lesson.clone(),
                    assignment_id: a.id.clone(),
                    teacher_id: a.teacher_id.clone(),
                    class_stream_unit_id: a.class_stream_unit_id.clone(),
                },
            );
        }
    }
    out
}

pub struct TimetableEngine<'s, S: AssignmentStore + ?Sized> {
    store: &'s S,
    policy: ClashPolicy,
}

impl<'s, S: AssignmentStore + ?Sized> TimetableEngine<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            policy: ClashPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ClashPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compares `proposed` against every assignment in the unit's academic
    /// year, skipping `exclude` (the record under edit).
    pub fn validate_assignment_clash(
        &self,
        scope: &TenantScope,
        teacher: &TeacherId,
        unit: &ClassStreamUnitId,
        proposed: &WeeklySchedule,
        exclude: Option<&AssignmentId>,
    ) -> TimetableResult<ClashReport> {
        if proposed.is_empty() {
            return Ok(ClashReport::default());
        }
        let school = scope.school_id();
        let unit_row = self
            .store
            .class_stream_unit(school, unit)?
            .ok_or_else(|| TimetableError::not_found("class stream unit", unit))?;
        let existing = self
            .store
            .assignments_for_year(school, &unit_row.academic_year_id)?;

        let mut report = ClashReport::default();
        for a in existing.iter().filter(|a| Some(&a.id) != exclude) {
            let same_teacher = &a.teacher_id == teacher;
            if same_teacher {
                report.teacher_clashes.extend(clashes_against(proposed, a));
            }
            if &a.class_stream_unit_id == unit
                && (!same_teacher || self.policy.report_same_teacher_class_clashes)
            {
                report.class_clashes.extend(clashes_against(proposed, a));
            }
        }

        debug!(
            school = %school,
            teacher = %teacher,
            unit = %unit,
            compared = existing.len(),
            teacher_clashes = report.teacher_clashes.len(),
            class_clashes = report.class_clashes.len(),
            "validated assignment clash"
        );
        Ok(report)
    }

    pub fn is_teacher_available(
        &self,
        scope: &TenantScope,
        teacher: &TeacherId,
        day: Weekday,
        period: &PeriodSlot,
        year: &AcademicYearId,
    ) -> TimetableResult<bool> {
        let rows = self
            .store
            .assignments_for_teacher(scope.school_id(), teacher, year)?;
        Ok(!rows.iter().any(|a| a.schedule.contains(day, period)))
    }

    pub fn is_class_available(
        &self,
        scope: &TenantScope,
        unit: &ClassStreamUnitId,
        day: Weekday,
        period: &PeriodSlot,
    ) -> TimetableResult<bool> {
        let rows = self.store.assignments_for_unit(scope.school_id(), unit)?;
        Ok(!rows.iter().any(|a| a.schedule.contains(day, period)))
    }

    /// Merged recurring template for one teacher. `week_start` is carried
    /// through to the result only; lessons are not date-scoped.
    pub fn teacher_weekly_schedule(
        &self,
        scope: &TenantScope,
        teacher: &TeacherId,
        week_start: NaiveDate,
        year: &AcademicYearId,
    ) -> TimetableResult<ComposedSchedule> {
        let rows = self
            .store
            .assignments_for_teacher(scope.school_id(), teacher, year)?;
        let composed = compose(rows, Some(week_start));
        if !composed.overlaps.is_empty() {
            debug!(
                teacher = %teacher,
                overlaps = composed.overlaps.len(),
                "teacher schedule has overlapping assignments"
            );
        }
        Ok(composed)
    }

    pub fn class_weekly_schedule(
        &self,
        scope: &TenantScope,
        unit: &ClassStreamUnitId,
    ) -> TimetableResult<ComposedSchedule> {
        let school = scope.school_id();
        if self.store.class_stream_unit(school, unit)?.is_none() {
            return Err(TimetableError::not_found("class stream unit", unit));
        }
        let rows = self.store.assignments_for_unit(school, unit)?;
        Ok(compose(rows, None))
    }

    pub fn teacher_workload_stats(
        &self,
        scope: &TenantScope,
        teacher: &TeacherId,
        year: &AcademicYearId,
    ) -> TimetableResult<WorkloadStats> {
        let rows = self
            .store
            .assignments_for_teacher(scope.school_id(), teacher, year)?;
        let mut stats = WorkloadStats::default();
        let mut units: HashSet<&ClassStreamUnitId> = HashSet::new();
        for a in &rows {
            stats.total_periods += a.schedule.slot_count();
            units.insert(&a.class_stream_unit_id);
            stats.days_active.extend(a.schedule.days_active());
        }
        stats.classes_count = units.len();
        Ok(stats)
    }

    /// Grid slots the teacher does not occupy. A grid with no configured
    /// periods has nothing to enumerate.
    pub fn teacher_free_slots(
        &self,
        scope: &TenantScope,
        teacher: &TeacherId,
        year: &AcademicYearId,
        grid: &SlotGrid,
    ) -> TimetableResult<Vec<FreeSlot>> {
        let rows = self
            .store
            .assignments_for_teacher(scope.school_id(), teacher, year)?;
        let mut out = Vec::new();
        for day in &grid.weekdays {
            for period in &grid.periods {
                if !rows.iter().any(|a| a.schedule.contains(*day, period)) {
                    out.push(FreeSlot {
                        day: *day,
                        period: period.clone(),
                    });
                }
            }
        }
        Ok(out)
    }
}
