//! Workspace settings for the timetable: defaults merged under whatever the
//! `settings` table holds, validated field by field on update.

use rusqlite::Connection;
use serde_json::{json, Map, Value};

use crate::db;
use crate::timetable::{ClashPolicy, PeriodSlot, SlotGrid, Weekday};

pub const TIMETABLE_KEY: &str = "setup.timetable";

const MAX_PERIODS: usize = 24;

pub fn default_timetable() -> Value {
    json!({
        "weekdays": ["monday", "tuesday", "wednesday", "thursday", "friday"],
        "periods": [
            "period_1", "period_2", "period_3", "period_4",
            "period_5", "period_6", "period_7", "period_8"
        ],
        "rejectUnknownSlots": false,
        "reportSameTeacherClassClashes": true
    })
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_weekdays(v: &Value, key: &str) -> Result<Vec<Weekday>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array", key))?;
    let mut out: Vec<Weekday> = Vec::new();
    for item in arr {
        let s = item
            .as_str()
            .ok_or_else(|| format!("{} entries must be strings", key))?;
        let d = Weekday::parse(s).map_err(|e| e.to_string())?;
        if !out.contains(&d) {
            out.push(d);
        }
    }
    if out.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    out.sort();
    Ok(out)
}

fn parse_periods(v: &Value, key: &str) -> Result<Vec<PeriodSlot>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array", key))?;
    if arr.len() > MAX_PERIODS {
        return Err(format!("{} must have at most {} entries", key, MAX_PERIODS));
    }
    let mut out: Vec<PeriodSlot> = Vec::new();
    for item in arr {
        let s = item
            .as_str()
            .ok_or_else(|| format!("{} entries must be strings", key))?;
        let p = PeriodSlot::parse(s).map_err(|e| e.to_string())?;
        if out.contains(&p) {
            return Err(format!("{} lists {} twice", key, p));
        }
        out.push(p);
    }
    Ok(out)
}

pub fn merge_timetable_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "weekdays" => {
                let days = parse_weekdays(v, k)?;
                obj.insert(
                    k.clone(),
                    Value::from(days.iter().map(|d| d.as_str()).collect::<Vec<_>>()),
                );
            }
            "periods" => {
                let periods = parse_periods(v, k)?;
                obj.insert(
                    k.clone(),
                    Value::from(periods.iter().map(|p| p.as_str()).collect::<Vec<_>>()),
                );
            }
            "rejectUnknownSlots" | "reportSameTeacherClassClashes" => {
                obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
            }
            _ => return Err(format!("unknown timetable field: {}", k)),
        }
    }
    Ok(())
}

pub fn load_timetable(conn: &Connection) -> anyhow::Result<Value> {
    let mut current = default_timetable();
    if let Some(saved) = db::settings_get_json(conn, TIMETABLE_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort: a malformed saved value must not lock the workspace.
            if let Err(e) = merge_timetable_patch(&mut current, saved_obj) {
                tracing::warn!(error = %e, "ignoring malformed saved timetable settings");
                current = default_timetable();
            }
        }
    }
    Ok(current)
}

pub fn update_timetable(conn: &Connection, patch: &Map<String, Value>) -> anyhow::Result<Result<Value, String>> {
    let mut current = load_timetable(conn)?;
    if let Err(msg) = merge_timetable_patch(&mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, TIMETABLE_KEY, &current)?;
    Ok(Ok(current))
}

/// Typed view of the timetable section.
#[derive(Debug, Clone)]
pub struct TimetableSettings {
    pub grid: SlotGrid,
    pub reject_unknown_slots: bool,
    pub policy: ClashPolicy,
}

impl TimetableSettings {
    pub fn from_value(v: &Value) -> Self {
        let weekdays = v
            .get("weekdays")
            .and_then(|d| parse_weekdays(d, "weekdays").ok())
            .unwrap_or_else(|| Weekday::SCHOOL_WEEK.to_vec());
        let periods = v
            .get("periods")
            .and_then(|p| parse_periods(p, "periods").ok())
            .unwrap_or_default();
        Self {
            grid: SlotGrid { weekdays, periods },
            reject_unknown_slots: v
                .get("rejectUnknownSlots")
                .and_then(|b| b.as_bool())
                .unwrap_or(false),
            policy: ClashPolicy {
                report_same_teacher_class_clashes: v
                    .get("reportSameTeacherClassClashes")
                    .and_then(|b| b.as_bool())
                    .unwrap_or(true),
            },
        }
    }

    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        Ok(Self::from_value(&load_timetable(conn)?))
    }
}
