//! Timetable conflict detection and schedule integrity.

mod access;
mod engine;
mod error;
mod model;
mod sqlite;
mod store;

pub use access::{AccessContext, Capability, Role, TenantScope};
pub use engine::{
    validate_schedule_integrity, Clash, ClashPolicy, ClashReport, ComposedSchedule,
    DuplicateSlot, FreeSlot, ScheduledLesson, SlotGrid, SlotOverlap, TimetableEngine,
    WorkloadStats,
};
pub use error::{DbStep, TimetableError, TimetableResult};
pub(crate) use error::WriteStep;
pub use model::{
    AcademicYearId, AssignmentId, ClassStreamUnit, ClassStreamUnitId, Lesson, PeriodSlot,
    ScheduleEntry, SchoolId, TeacherAssignment, TeacherId, Weekday, WeeklySchedule,
};
pub use sqlite::{
    create_assignment, delete_assignment, get_assignment, update_assignment_schedule,
    SqliteStore,
};
pub use store::{AssignmentStore, InMemoryStore};
