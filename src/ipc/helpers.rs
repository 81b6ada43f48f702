use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::timetable::{
    AccessContext, Capability, Lesson, PeriodSlot, Role, ScheduleEntry, TenantScope, Weekday,
    WeeklySchedule,
};

/// Runs `f` against the open workspace and wraps its outcome as a response.
pub fn with_db<F>(state: &AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok((!t.is_empty()).then(|| t.to_string()))
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

pub fn get_optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    let Some(s) = get_optional_str(params, key)? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn get_day(params: &Value, key: &str) -> Result<Weekday, HandlerErr> {
    let raw = get_required_str(params, key)?;
    Ok(Weekday::parse(&raw)?)
}

pub fn get_period(params: &Value, key: &str) -> Result<PeriodSlot, HandlerErr> {
    let raw = get_required_str(params, key)?;
    Ok(PeriodSlot::parse(&raw)?)
}

pub fn access_context(params: &Value) -> Result<AccessContext, HandlerErr> {
    let school_id = get_required_str(params, "schoolId")?;
    let role_raw = get_required_str(params, "role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", role_raw)))?;
    Ok(AccessContext::new(school_id, role))
}

pub fn authorize(params: &Value, capability: Capability) -> Result<TenantScope, HandlerErr> {
    Ok(access_context(params)?.authorize(capability)?)
}

fn parse_lesson(v: &Value, at: &str) -> Result<Lesson, HandlerErr> {
    // A bare string is shorthand for `{ "subject": ... }`.
    if let Some(s) = v.as_str() {
        return Ok(Lesson::new(s.trim()));
    }
    let Some(obj) = v.as_object() else {
        return Err(HandlerErr::bad_params(format!(
            "{} must be a lesson object or subject string",
            at
        )));
    };
    let subject = obj
        .get("subject")
        .and_then(|s| s.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("{}.subject is required", at)))?;
    let opt = |k: &str| -> Result<Option<String>, HandlerErr> {
        match obj.get(k) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(_) => Err(HandlerErr::bad_params(format!("{}.{} must be string", at, k))),
        }
    };
    Ok(Lesson {
        subject,
        room: opt("room")?,
        notes: opt("notes")?,
    })
}

fn parse_entry_list(arr: &[Value]) -> Result<Vec<ScheduleEntry>, HandlerErr> {
    let mut out = Vec::with_capacity(arr.len());
    for (i, item) in arr.iter().enumerate() {
        let at = format!("schedule[{}]", i);
        if !item.is_object() {
            return Err(HandlerErr::bad_params(format!("{} must be an object", at)));
        }
        let day = Weekday::parse(
            item.get("day")
                .and_then(|d| d.as_str())
                .ok_or_else(|| HandlerErr::bad_params(format!("{}.day is required", at)))?,
        )?;
        let period = PeriodSlot::parse(
            item.get("period")
                .and_then(|p| p.as_str())
                .ok_or_else(|| HandlerErr::bad_params(format!("{}.period is required", at)))?,
        )?;
        out.push(ScheduleEntry::new(day, period, parse_lesson(item, &at)?));
    }
    Ok(out)
}

fn parse_nested(obj: &Map<String, Value>) -> Result<WeeklySchedule, HandlerErr> {
    let mut out = WeeklySchedule::new();
    for (day_raw, periods) in obj {
        let day = Weekday::parse(day_raw)?;
        let Some(periods) = periods.as_object() else {
            return Err(HandlerErr::bad_params(format!(
                "schedule.{} must be an object of periods",
                day_raw
            )));
        };
        for (period_raw, lesson) in periods {
            let period = PeriodSlot::parse(period_raw)?;
            let lesson = parse_lesson(lesson, &format!("schedule.{}.{}", day_raw, period_raw))?;
            out.insert(day, period, lesson);
        }
    }
    Ok(out)
}

pub struct ParsedSchedule {
    pub schedule: WeeklySchedule,
    /// Present when the caller sent the list form.
    pub entries: Option<Vec<ScheduleEntry>>,
}

/// Accepts either the nested map (`day -> period -> lesson`) or the list of
/// `{day, period, subject, ...}` entries.
pub fn get_schedule(params: &Value, key: &str) -> Result<ParsedSchedule, HandlerErr> {
    match params.get(key) {
        Some(Value::Array(arr)) => {
            let entries = parse_entry_list(arr)?;
            Ok(ParsedSchedule {
                schedule: WeeklySchedule::from_entries(entries.iter().cloned()),
                entries: Some(entries),
            })
        }
        Some(Value::Object(obj)) => Ok(ParsedSchedule {
            schedule: parse_nested(obj)?,
            entries: None,
        }),
        None | Some(Value::Null) => Err(HandlerErr::bad_params(format!("missing {}", key))),
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be an object or an array",
            key
        ))),
    }
}
