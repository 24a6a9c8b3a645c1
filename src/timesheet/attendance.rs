//! Attendance accounting: turns raw clock events into worked time.
//!
//! One shift per work date. The first clock-in of a date and the first
//! clock-out after it form the shift; anything after that is ignored.
//! A date with no clock-in but a leave marker is an off day.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::collections::BTreeMap;

/// Kind of a clock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    In,
    Out,
    Off,
}

impl ClockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClockKind::In => "in",
            ClockKind::Out => "out",
            ClockKind::Off => "off",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(ClockKind::In),
            "out" => Some(ClockKind::Out),
            "off" => Some(ClockKind::Off),
            _ => None,
        }
    }
}

impl ToSql for ClockKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ClockKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        ClockKind::from_str(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

/// A single append-only clock log row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockEvent {
    pub id: i64,
    pub user_id: i64,
    pub work_date: NaiveDate,
    pub kind: ClockKind,
    pub at: DateTime<Utc>,
}

/// An overtime session started and stopped with `/ot`.
#[derive(Debug, Clone, PartialEq)]
pub struct OtSession {
    pub id: i64,
    pub user_id: i64,
    pub work_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl OtSession {
    /// Duration of a finished session; open sessions count as zero.
    pub fn duration(&self) -> TimeDelta {
        self.ended_at
            .map(|end| end - self.started_at)
            .unwrap_or_else(TimeDelta::zero)
    }
}

/// Outcome of one work date.
#[derive(Debug, Clone, PartialEq)]
pub enum DayStatus {
    Worked {
        clock_in: DateTime<Utc>,
        clock_out: DateTime<Utc>,
        duration: TimeDelta,
    },
    /// Clocked in but never out; excluded from paid hours.
    Incomplete { clock_in: DateTime<Utc> },
    Off,
    Absent,
}

impl DayStatus {
    #[cfg(test)]
    pub fn worked(&self) -> Option<TimeDelta> {
        match self {
            DayStatus::Worked { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DayStatus::Worked { .. } => "Worked",
            DayStatus::Incomplete { .. } => "Incomplete",
            DayStatus::Off => "Off day",
            DayStatus::Absent => "Absent",
        }
    }
}

/// Status of one driver's work date, derived from that date's events.
pub fn day_status(events: &[ClockEvent]) -> DayStatus {
    let mut sorted: Vec<&ClockEvent> = events.iter().collect();
    sorted.sort_by_key(|e| (e.at, e.id));

    let Some(clock_in) = sorted.iter().find(|e| e.kind == ClockKind::In) else {
        return if sorted.iter().any(|e| e.kind == ClockKind::Off) {
            DayStatus::Off
        } else {
            DayStatus::Absent
        };
    };

    match sorted
        .iter()
        .find(|e| e.kind == ClockKind::Out && e.at >= clock_in.at)
    {
        Some(clock_out) => DayStatus::Worked {
            clock_in: clock_in.at,
            clock_out: clock_out.at,
            duration: clock_out.at - clock_in.at,
        },
        None => DayStatus::Incomplete { clock_in: clock_in.at },
    }
}

/// A work date with its derived status.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub status: DayStatus,
}

/// Group one driver's events by work date, oldest first.
pub fn group_days(events: &[ClockEvent]) -> Vec<DayRecord> {
    let mut by_date: BTreeMap<NaiveDate, Vec<ClockEvent>> = BTreeMap::new();
    for event in events {
        by_date.entry(event.work_date).or_default().push(event.clone());
    }
    by_date
        .into_iter()
        .map(|(date, day_events)| DayRecord {
            date,
            status: day_status(&day_events),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSummary {
    pub work_days: u32,
    pub off_days: u32,
    pub incomplete_days: u32,
    pub worked: TimeDelta,
}

impl Default for AttendanceSummary {
    fn default() -> Self {
        Self {
            work_days: 0,
            off_days: 0,
            incomplete_days: 0,
            worked: TimeDelta::zero(),
        }
    }
}

pub fn summarize(days: &[DayRecord]) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();
    for day in days {
        match &day.status {
            DayStatus::Worked { duration, .. } => {
                summary.work_days += 1;
                summary.worked += *duration;
            }
            DayStatus::Incomplete { .. } => summary.incomplete_days += 1,
            DayStatus::Off => summary.off_days += 1,
            DayStatus::Absent => {}
        }
    }
    summary
}

/// Drivers with no attendance on a date. Off days and open shifts count as present.
pub fn missing_attendance(
    driver_ids: impl IntoIterator<Item = i64>,
    events_on_date: &[ClockEvent],
) -> Vec<i64> {
    driver_ids
        .into_iter()
        .filter(|id| {
            let own: Vec<ClockEvent> = events_on_date
                .iter()
                .filter(|e| e.user_id == *id)
                .cloned()
                .collect();
            day_status(&own) == DayStatus::Absent
        })
        .collect()
}

pub fn total_ot(sessions: &[OtSession]) -> TimeDelta {
    sessions
        .iter()
        .fold(TimeDelta::zero(), |acc, s| acc + s.duration())
}

/// "8h 5m" style rendering.
pub fn format_duration(d: TimeDelta) -> String {
    let minutes = d.num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// Decimal hours with two places, e.g. "8.08".
pub fn format_hours(d: TimeDelta) -> String {
    format!("{:.2}", d.num_seconds().max(0) as f64 / 3600.0)
}
