use std::fmt;

use thiserror::Error;

use super::access::Capability;
use super::engine::{ClashReport, DuplicateSlot};

pub type TimetableResult<T> = Result<T, TimetableError>;

#[derive(Debug, Error)]
pub enum TimetableError {
    #[error("role {role} lacks capability {capability}")]
    Forbidden {
        role: String,
        capability: Capability,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid weekday: {0:?}")]
    InvalidWeekday(String),

    #[error("invalid period slot: {0:?}")]
    InvalidPeriod(String),

    #[error("invalid lesson: {0}")]
    InvalidLesson(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("period slot not in configured grid: {day} {period}")]
    UnknownSlot { day: String, period: String },

    #[error("schedule lists {} slot(s) more than once", .0.len())]
    DuplicateSlots(Vec<DuplicateSlot>),

    #[error(
        "schedule clashes with existing assignments ({} teacher, {} class)",
        .0.teacher_clashes.len(),
        .0.class_clashes.len()
    )]
    Clash(ClashReport),

    #[error("slot already taken: {0}")]
    SlotTaken(String),

    #[error("{step} failed: {source}")]
    Write {
        step: DbStep,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Which write-side statement failed; each has its own wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbStep {
    Begin,
    Insert,
    Update,
    Delete,
    Commit,
}

impl DbStep {
    pub fn code(self) -> &'static str {
        match self {
            Self::Begin => "db_tx_failed",
            Self::Insert => "db_insert_failed",
            Self::Update => "db_update_failed",
            Self::Delete => "db_delete_failed",
            Self::Commit => "db_commit_failed",
        }
    }
}

impl fmt::Display for DbStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Begin => "begin transaction",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Commit => "commit",
        })
    }
}

/// Tags a rusqlite result with the write step it belongs to.
pub(crate) trait WriteStep<T> {
    fn step(self, step: DbStep) -> TimetableResult<T>;
}

impl<T> WriteStep<T> for Result<T, rusqlite::Error> {
    fn step(self, step: DbStep) -> TimetableResult<T> {
        self.map_err(|source| TimetableError::Write { step, source })
    }
}

impl TimetableError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code used on the IPC wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::InvalidWeekday(_)
            | Self::InvalidPeriod(_)
            | Self::InvalidLesson(_)
            | Self::InvalidInput(_) => "bad_params",
            Self::UnknownSlot { .. } => "unknown_slot",
            Self::DuplicateSlots(_) => "duplicate_slots",
            Self::Clash(_) | Self::SlotTaken(_) => "schedule_clash",
            Self::Write { step, .. } => step.code(),
            Self::Store(_) => "db_query_failed",
        }
    }
}

impl From<rusqlite::Error> for TimetableError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.into())
    }
}
