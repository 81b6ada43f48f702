//! Strongly typed timetable records.
//!
//! A schedule is a recurring weekly template: weekday -> period slot -> lesson.
//! Both levels are ordered maps so iteration (and therefore every report built
//! from it) is deterministic.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::TimetableError;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(v: impl Into<String>) -> Self {
                Self(v.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(v: &str) -> Self {
                Self(v.to_string())
            }
        }

        impl From<String> for $name {
            fn from(v: String) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(
    /// Tenant boundary.
    SchoolId
);
id_type!(AcademicYearId);
id_type!(TeacherId);
id_type!(
    /// One class x one stream x one academic year.
    ClassStreamUnitId
);
id_type!(AssignmentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const SCHOOL_WEEK: [Weekday; 5] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    pub fn parse(s: &str) -> Result<Self, TimetableError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" | "mon" => Ok(Self::Monday),
            "tuesday" | "tue" => Ok(Self::Tuesday),
            "wednesday" | "wed" => Ok(Self::Wednesday),
            "thursday" | "thu" => Ok(Self::Thursday),
            "friday" | "fri" => Ok(Self::Friday),
            "saturday" | "sat" => Ok(Self::Saturday),
            "sunday" | "sun" => Ok(Self::Sunday),
            _ => Err(TimetableError::InvalidWeekday(s.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }

    /// Days after monday.
    pub fn offset(self) -> i64 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }

    /// Calendar date of this weekday in the week beginning at `week_start`.
    pub fn date_in_week(self, week_start: NaiveDate) -> NaiveDate {
        week_start + Duration::days(self.offset())
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const MAX_PERIOD_LEN: usize = 32;

/// Opaque period identifier such as `period_1`. Ordering is lexical; a
/// configured order is applied by [`super::engine::SlotGrid`] when one exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodSlot(String);

impl PeriodSlot {
    pub fn parse(raw: &str) -> Result<Self, TimetableError> {
        let t = raw.trim();
        if t.is_empty()
            || t.chars().count() > MAX_PERIOD_LEN
            || t.chars().any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(TimetableError::InvalidPeriod(raw.to_string()));
        }
        Ok(Self(t.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PeriodSlot {
    type Error = TimetableError;

    fn try_from(v: String) -> Result<Self, Self::Error> {
        Self::parse(&v)
    }
}

impl From<PeriodSlot> for String {
    fn from(v: PeriodSlot) -> Self {
        v.0
    }
}

impl fmt::Display for PeriodSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Lesson {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            room: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), TimetableError> {
        if self.subject.trim().is_empty() {
            return Err(TimetableError::InvalidLesson(
                "subject must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One `(day, period, lesson)` triple of the pre-folded list form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub day: Weekday,
    pub period: PeriodSlot,
    #[serde(flatten)]
    pub lesson: Lesson,
}

impl ScheduleEntry {
    pub fn new(day: Weekday, period: PeriodSlot, lesson: Lesson) -> Self {
        Self { day, period, lesson }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySchedule {
    days: BTreeMap<Weekday, BTreeMap<PeriodSlot, Lesson>>,
}

impl WeeklySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the list form into a schedule. Later entries overwrite earlier
    /// ones for the same slot.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ScheduleEntry>,
    {
        let mut out = Self::new();
        for e in entries {
            out.insert(e.day, e.period, e.lesson);
        }
        out
    }

    pub fn insert(&mut self, day: Weekday, period: PeriodSlot, lesson: Lesson) -> Option<Lesson> {
        self.days.entry(day).or_default().insert(period, lesson)
    }

    pub fn lesson(&self, day: Weekday, period: &PeriodSlot) -> Option<&Lesson> {
        self.days.get(&day).and_then(|p| p.get(period))
    }

    pub fn contains(&self, day: Weekday, period: &PeriodSlot) -> bool {
        self.lesson(day, period).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.days.values().all(|p| p.is_empty())
    }

    pub fn slot_count(&self) -> usize {
        self.days.values().map(|p| p.len()).sum()
    }

    pub fn days_active(&self) -> BTreeSet<Weekday> {
        self.days
            .iter()
            .filter(|(_, p)| !p.is_empty())
            .map(|(d, _)| *d)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &PeriodSlot, &Lesson)> {
        self.days
            .iter()
            .flat_map(|(d, periods)| periods.iter().map(move |(p, l)| (*d, p, l)))
    }

    pub fn to_entries(&self) -> Vec<ScheduleEntry> {
        self.iter()
            .map(|(d, p, l)| ScheduleEntry::new(d, p.clone(), l.clone()))
            .collect()
    }

    /// Periods claimed by both schedules, grouped by day.
    pub fn intersect(&self, other: &WeeklySchedule) -> BTreeMap<Weekday, Vec<PeriodSlot>> {
        let mut out = BTreeMap::new();
        for (day, periods) in &self.days {
            let Some(theirs) = other.days.get(day) else {
                continue;
            };
            let shared: Vec<PeriodSlot> = periods
                .keys()
                .filter(|p| theirs.contains_key(*p))
                .cloned()
                .collect();
            if !shared.is_empty() {
                out.insert(*day, shared);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStreamUnit {
    pub id: ClassStreamUnitId,
    pub school_id: SchoolId,
    pub academic_year_id: AcademicYearId,
    pub class_name: String,
    pub stream_name: String,
}

impl ClassStreamUnit {
    pub fn label(&self) -> String {
        if self.stream_name.is_empty() {
            self.class_name.clone()
        } else {
            format!("{} {}", self.class_name, self.stream_name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAssignment {
    pub id: AssignmentId,
    pub teacher_id: TeacherId,
    pub class_stream_unit_id: ClassStreamUnitId,
    pub school_id: SchoolId,
    pub academic_year_id: AcademicYearId,
    pub schedule: WeeklySchedule,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeacherAssignment {
    /// Precedence key for contested slots: earliest created, then lowest id.
    pub fn precedence_key(&self) -> (DateTime<Utc>, &AssignmentId) {
        (self.created_at, &self.id)
    }
}
