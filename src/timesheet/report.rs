//! Attendance and claims reports over a date range.

use crate::timesheet::attendance::{self, AttendanceSummary, DayRecord, DayStatus};
use crate::timesheet::database::{Claim, ClaimStatus, Database, DbResult, Driver, Topup};
use crate::timesheet::money::Money;
use crate::timesheet::pdf::PdfDocument;
use chrono::{DateTime, Datelike, Months, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Telegram rejects messages longer than 4096 characters.
pub const MESSAGE_LIMIT: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    All,
    Driver(i64),
}

/// Inclusive range of work dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let from = NaiveDate::from_ymd_opt(year, month, 1)?;
        let to = from.checked_add_months(Months::new(1))?.pred_opt()?;
        Some(Self { from, to })
    }

    /// First of the month up to and including `today`.
    pub fn month_to_date(today: NaiveDate) -> Self {
        Self {
            from: today.with_day(1).unwrap_or(today),
            to: today,
        }
    }

    pub fn label(&self) -> String {
        if self.from == self.to {
            self.from.to_string()
        } else {
            format!("{} to {}", self.from, self.to)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportArgsError {
    #[error("'{0}' is not a month (YYYY-MM) or a date (YYYY-MM-DD)")]
    BadDate(String),
    #[error("start date {0} is after end date {1}")]
    Reversed(NaiveDate, NaiveDate),
    #[error("too many arguments")]
    TooMany,
}

/// Parse `YYYY-MM` into a whole-month range.
pub fn parse_month(s: &str) -> Option<DateRange> {
    let (year, month) = s.trim().split_once('-')?;
    if year.len() != 4 || month.is_empty() || month.len() > 2 {
        return None;
    }
    DateRange::month(year.parse().ok()?, month.parse().ok()?)
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parse `[all|driver_id] [YYYY-MM | YYYY-MM-DD [YYYY-MM-DD]]`.
pub fn parse_report_args(
    args: &[&str],
    today: NaiveDate,
) -> Result<(ReportScope, DateRange), ReportArgsError> {
    let mut rest = args;
    let mut scope = ReportScope::All;
    if let Some(first) = rest.first() {
        if first.eq_ignore_ascii_case("all") {
            rest = &rest[1..];
        } else if let Ok(id) = first.parse::<i64>() {
            scope = ReportScope::Driver(id);
            rest = &rest[1..];
        }
    }

    let range = match rest {
        [] => DateRange::month_to_date(today),
        [one] => match parse_date(one) {
            Some(day) => DateRange { from: day, to: day },
            None => parse_month(one).ok_or_else(|| ReportArgsError::BadDate(one.to_string()))?,
        },
        [from, to] => {
            let from_date = parse_date(from).ok_or_else(|| ReportArgsError::BadDate(from.to_string()))?;
            let to_date = parse_date(to).ok_or_else(|| ReportArgsError::BadDate(to.to_string()))?;
            if from_date > to_date {
                return Err(ReportArgsError::Reversed(from_date, to_date));
            }
            DateRange { from: from_date, to: to_date }
        }
        _ => return Err(ReportArgsError::TooMany),
    };
    Ok((scope, range))
}

/// One driver's records in a range.
#[derive(Debug, Clone)]
pub struct DriverReport {
    pub driver: Driver,
    pub days: Vec<DayRecord>,
    pub summary: AttendanceSummary,
    pub ot: TimeDelta,
    pub claims: Vec<Claim>,
    pub topups: Vec<Topup>,
}

impl DriverReport {
    pub fn has_records(&self) -> bool {
        !self.days.is_empty() || !self.claims.is_empty() || !self.topups.is_empty() || self.ot > TimeDelta::zero()
    }

    /// Approved claims, including those already paid out.
    pub fn approved_claims(&self) -> Money {
        self.claims
            .iter()
            .filter(|c| matches!(c.status, ClaimStatus::Approved | ClaimStatus::Paid))
            .map(|c| c.amount)
            .sum()
    }

    pub fn pending_claims(&self) -> Money {
        self.claims
            .iter()
            .filter(|c| c.status == ClaimStatus::Pending)
            .map(|c| c.amount)
            .sum()
    }

    pub fn topup_total(&self) -> Money {
        self.topups.iter().map(|t| t.amount).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub scope: ReportScope,
    pub range: DateRange,
    pub drivers: Vec<DriverReport>,
}

impl Report {
    /// Gather records for every driver in scope. Unknown driver ids yield no rows.
    pub fn collect(db: &Database, scope: ReportScope, range: DateRange) -> DbResult<Self> {
        let drivers = match scope {
            ReportScope::All => db.drivers()?,
            ReportScope::Driver(id) => db.driver(id)?.into_iter().collect(),
        };

        let mut reports = Vec::with_capacity(drivers.len());
        for driver in drivers {
            let uid = Some(driver.user_id);
            let events = db.events_between(uid, range.from, range.to)?;
            let days = attendance::group_days(&events);
            let sessions = db.ot_between(uid, range.from, range.to)?;
            reports.push(DriverReport {
                summary: attendance::summarize(&days),
                days,
                ot: attendance::total_ot(&sessions),
                claims: db.claims_between(uid, range.from, range.to)?,
                topups: db.topups_between(uid, range.from, range.to)?,
                driver,
            });
        }
        Ok(Self { scope, range, drivers: reports })
    }

    pub fn is_empty(&self) -> bool {
        !self.drivers.iter().any(DriverReport::has_records)
    }

    pub fn with_records(&self) -> impl Iterator<Item = &DriverReport> {
        self.drivers.iter().filter(|d| d.has_records())
    }

    pub fn file_name(&self) -> String {
        let scope = match self.scope {
            ReportScope::All => "all".to_string(),
            ReportScope::Driver(id) => id.to_string(),
        };
        format!("report_{}_{}_{}.pdf", scope, self.range.from, self.range.to)
    }

    pub fn render_pdf(&self, tz: Tz, currency: &str, generated_at: DateTime<Utc>) -> Vec<u8> {
        let mut doc = PdfDocument::new(&format!("Driver report {}", self.range.label()));
        doc.line(&format!(
            "Generated {}",
            generated_at.with_timezone(&tz).format("%Y-%m-%d %H:%M")
        ));
        doc.spacer();

        for report in self.with_records() {
            let s = &report.summary;
            doc.heading(&format!("{} ({})", report.driver.display_name(), report.driver.user_id));
            doc.line(&format!(
                "Work days: {}   Off days: {}   Incomplete: {}",
                s.work_days, s.off_days, s.incomplete_days
            ));
            doc.line(&format!(
                "Hours: {}   OT: {}",
                attendance::format_duration(s.worked),
                attendance::format_duration(report.ot)
            ));
            doc.line(&format!(
                "Approved claims: {currency} {}   Pending claims: {currency} {}   Top-ups: {currency} {}",
                report.approved_claims(),
                report.pending_claims(),
                report.topup_total()
            ));
            doc.spacer();

            if !report.days.is_empty() {
                let rows: Vec<Vec<String>> = report.days.iter().map(|d| day_row(d, tz)).collect();
                doc.table(&["Date", "Status", "In", "Out", "Hours"], &rows);
            }
            if !report.claims.is_empty() {
                let rows: Vec<Vec<String>> = report
                    .claims
                    .iter()
                    .map(|c| {
                        vec![
                            c.id.to_string(),
                            c.claim_date.to_string(),
                            c.kind.clone(),
                            c.amount.to_string(),
                            c.status.as_str().to_string(),
                            c.description.clone().unwrap_or_default(),
                        ]
                    })
                    .collect();
                doc.table(&["#", "Date", "Type", "Amount", "Status", "Description"], &rows);
            }
            if !report.topups.is_empty() {
                let rows: Vec<Vec<String>> = report
                    .topups
                    .iter()
                    .map(|t| {
                        vec![t.topup_date.to_string(), t.amount.to_string(), t.note.clone().unwrap_or_default()]
                    })
                    .collect();
                doc.table(&["Top-up date", "Amount", "Note"], &rows);
            }
        }
        doc.finish()
    }

    /// Plain-text monthly summary, one block per driver with records.
    pub fn summary_text(&self, currency: &str) -> String {
        let title = if self.range.from.day() == 1
            && self.range.to.succ_opt().is_some_and(|d| d.day() == 1)
        {
            self.range.from.format("%B %Y").to_string()
        } else {
            self.range.label()
        };

        let mut text = format!("📊 Monthly Report for {title}\n\n");
        for report in self.with_records() {
            let s = &report.summary;
            text.push_str(&format!("👤 {}:\n", report.driver.display_name()));
            text.push_str(&format!("   • Work Days: {}\n", s.work_days));
            text.push_str(&format!("   • Total Hours: {}\n", attendance::format_duration(s.worked)));
            text.push_str(&format!("   • Off Days: {}\n", s.off_days));
            text.push_str(&format!("   • OT: {}\n", attendance::format_duration(report.ot)));
            text.push_str(&format!("   • Claims Approved: {currency} {}\n\n", report.approved_claims()));
        }
        text
    }
}

fn day_row(day: &DayRecord, tz: Tz) -> Vec<String> {
    let time = |t: &DateTime<Utc>| t.with_timezone(&tz).format("%H:%M").to_string();
    let (clock_in, clock_out, hours) = match &day.status {
        DayStatus::Worked { clock_in, clock_out, duration } => {
            (time(clock_in), time(clock_out), attendance::format_hours(*duration))
        }
        DayStatus::Incomplete { clock_in } => (time(clock_in), "-".to_string(), "-".to_string()),
        DayStatus::Off | DayStatus::Absent => ("-".to_string(), "-".to_string(), "-".to_string()),
    };
    vec![day.date.to_string(), day.status.label().to_string(), clock_in, clock_out, hours]
}

/// Split text into chunks of at most `max` characters, preferring line breaks.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timesheet::attendance::ClockKind;
    use crate::timesheet::database::{NewClaim, NewDriver};
    use chrono::TimeZone;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    #[test]
    fn test_month_range() {
        let range = DateRange::month(2026, 2).unwrap();
        assert_eq!(range.from, day(2, 1));
        assert_eq!(range.to, day(2, 28));
        let dec = DateRange::month(2026, 12).unwrap();
        assert_eq!(dec.to, day(12, 31));
        assert!(DateRange::month(2026, 13).is_none());
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2026-10"), DateRange::month(2026, 10));
        assert_eq!(parse_month("2026-1"), DateRange::month(2026, 1));
        assert!(parse_month("26-10").is_none());
        assert!(parse_month("october").is_none());
    }

    #[test]
    fn test_parse_report_args() {
        let today = day(10, 16);
        assert_eq!(
            parse_report_args(&[], today).unwrap(),
            (ReportScope::All, DateRange { from: day(10, 1), to: today })
        );
        assert_eq!(
            parse_report_args(&["42", "2026-09"], today).unwrap(),
            (ReportScope::Driver(42), DateRange::month(2026, 9).unwrap())
        );
        assert_eq!(
            parse_report_args(&["ALL", "2026-10-02", "2026-10-05"], today).unwrap(),
            (ReportScope::All, DateRange { from: day(10, 2), to: day(10, 5) })
        );
        assert_eq!(
            parse_report_args(&["2026-10-03"], today).unwrap().1,
            DateRange { from: day(10, 3), to: day(10, 3) }
        );
        assert_eq!(
            parse_report_args(&["2026-10-05", "2026-10-02"], today),
            Err(ReportArgsError::Reversed(day(10, 5), day(10, 2)))
        );
        assert!(matches!(parse_report_args(&["bob"], today), Err(ReportArgsError::BadDate(_))));
        assert_eq!(
            parse_report_args(&["1", "2026-10-01", "2026-10-02", "x"], today),
            Err(ReportArgsError::TooMany)
        );
    }

    #[test]
    fn test_collect_and_render() {
        let db = Database::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 2, 1, 0, 0).unwrap();
        db.upsert_driver(&NewDriver { user_id: 5, chat_id: 5, username: None, first_name: "Ali".into() }, now)
            .unwrap();
        db.upsert_driver(&NewDriver { user_id: 6, chat_id: 6, username: None, first_name: "Bo".into() }, now)
            .unwrap();
        db.add_clock_event(5, day(10, 2), ClockKind::In, now).unwrap();
        db.add_clock_event(5, day(10, 2), ClockKind::Out, now + TimeDelta::hours(8)).unwrap();
        db.insert_claim(&NewClaim {
            user_id: 5,
            kind: "petrol".into(),
            amount: Money::from_cents(4000),
            description: Some("Shell".into()),
            receipt_file_id: None,
            claim_date: day(10, 2),
            created_at: now,
        })
        .unwrap();

        let range = DateRange::month(2026, 10).unwrap();
        let report = Report::collect(&db, ReportScope::All, range).unwrap();
        assert!(!report.is_empty());
        assert_eq!(report.with_records().count(), 1);
        assert_eq!(report.drivers[0].summary.work_days, 1);
        assert_eq!(report.drivers[0].pending_claims(), Money::from_cents(4000));

        let pdf = report.render_pdf(chrono_tz::Asia::Kuala_Lumpur, "RM", now);
        assert!(pdf.starts_with(b"%PDF-"));
        assert_eq!(report.file_name(), "report_all_2026-10-01_2026-10-31.pdf");

        let text = report.summary_text("RM");
        assert!(text.starts_with("📊 Monthly Report for October 2026"));
        assert!(text.contains("Ali"));
        assert!(!text.contains("Bo:"));

        let other = Report::collect(&db, ReportScope::Driver(6), range).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_split_message() {
        let text = "line one\n".repeat(1000);
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MESSAGE_LIMIT));
        assert_eq!(chunks.concat(), text);

        let long = "x".repeat(9000);
        let chunks = split_message(&long, MESSAGE_LIMIT);
        assert_eq!(chunks.len(), 3);
        assert_eq!(split_message("short", MESSAGE_LIMIT), vec!["short".to_string()]);
    }
}
