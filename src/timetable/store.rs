//! Persistence collaborator seam.
//!
//! The engine only reads. Implementations must filter every query by the
//! school id they are given and return assignments ordered by
//! `(created_at, id)`.

use super::model::{
    AcademicYearId, ClassStreamUnit, ClassStreamUnitId, SchoolId, TeacherAssignment, TeacherId,
};

pub trait AssignmentStore {
    fn class_stream_unit(
        &self,
        school: &SchoolId,
        unit: &ClassStreamUnitId,
    ) -> anyhow::Result<Option<ClassStreamUnit>>;

    fn assignments_for_year(
        &self,
        school: &SchoolId,
        year: &AcademicYearId,
    ) -> anyhow::Result<Vec<TeacherAssignment>>;

    fn assignments_for_teacher(
        &self,
        school: &SchoolId,
        teacher: &TeacherId,
        year: &AcademicYearId,
    ) -> anyhow::Result<Vec<TeacherAssignment>>;

    fn assignments_for_unit(
        &self,
        school: &SchoolId,
        unit: &ClassStreamUnitId,
    ) -> anyhow::Result<Vec<TeacherAssignment>>;
}

/// Vector-backed store. Unlike the SQLite store it accepts overlapping rows,
/// which makes it handy for exercising merge precedence.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    units: Vec<ClassStreamUnit>,
    assignments: Vec<TeacherAssignment>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&mut self, unit: ClassStreamUnit) {
        self.units
            .retain(|u| !(u.school_id == unit.school_id && u.id == unit.id));
        self.units.push(unit);
    }

    /// Inserts or replaces by id.
    pub fn put_assignment(&mut self, assignment: TeacherAssignment) {
        self.assignments.retain(|a| a.id != assignment.id);
        self.assignments.push(assignment);
    }

    fn select<F>(&self, school: &SchoolId, pred: F) -> Vec<TeacherAssignment>
    where
        F: Fn(&TeacherAssignment) -> bool,
    {
        let mut out: Vec<TeacherAssignment> = self
            .assignments
            .iter()
            .filter(|a| &a.school_id == school && pred(a))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.precedence_key().cmp(&b.precedence_key()));
        out
    }
}

impl AssignmentStore for InMemoryStore {
    fn class_stream_unit(
        &self,
        school: &SchoolId,
        unit: &ClassStreamUnitId,
    ) -> anyhow::Result<Option<ClassStreamUnit>> {
        Ok(self
            .units
            .iter()
            .find(|u| &u.school_id == school && &u.id == unit)
            .cloned())
    }

    fn assignments_for_year(
        &self,
        school: &SchoolId,
        year: &AcademicYearId,
    ) -> anyhow::Result<Vec<TeacherAssignment>> {
        Ok(self.select(school, |a| &a.academic_year_id == year))
    }

    fn assignments_for_teacher(
        &self,
        school: &SchoolId,
        teacher: &TeacherId,
        year: &AcademicYearId,
    ) -> anyhow::Result<Vec<TeacherAssignment>> {
        Ok(self.select(school, |a| {
            &a.teacher_id == teacher && &a.academic_year_id == year
        }))
    }

    fn assignments_for_unit(
        &self,
        school: &SchoolId,
        unit: &ClassStreamUnitId,
    ) -> anyhow::Result<Vec<TeacherAssignment>> {
        Ok(self.select(school, |a| &a.class_stream_unit_id == unit))
    }
}
