//! Balance ledger: salary accrual and settlements.
//!
//! The stored driver balance is what the company owes on top of salary.
//! Top-ups and approved claims credit it; a settlement pays accrued salary
//! plus the balance and deducts the balance it included.

use crate::timesheet::attendance::{self, AttendanceSummary, DayRecord, DayStatus};
use crate::timesheet::database::{
    ClaimFilter, ClaimStatus, Database, DbResult, Driver, NewPayment, SalaryPayment,
};
use crate::timesheet::money::Money;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// Salary for `work_days` worked days at a monthly rate.
pub fn accrued_salary(monthly_salary: Money, work_days: u32, workdays_per_month: u32) -> Money {
    monthly_salary.prorate(work_days, workdays_per_month)
}

/// First unpaid work date: the day after the last settled period, else the
/// driver's first record, else today.
pub fn unpaid_period_start(
    last_payment: Option<&SalaryPayment>,
    first_event: Option<NaiveDate>,
    today: NaiveDate,
) -> NaiveDate {
    match last_payment {
        Some(payment) => payment.period_end.succ_opt().unwrap_or(payment.period_end),
        None => first_event.map(|d| d.min(today)).unwrap_or(today),
    }
}

/// Last work date a settlement may close: the day before the oldest shift or
/// OT session that can still be finished. A shift open since before yesterday
/// can no longer be clocked out and is settled as incomplete.
pub fn settleable_until(days: &[DayRecord], open_ot: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    let yesterday = today.pred_opt().unwrap_or(today);
    let open_shift = days
        .iter()
        .find(|d| d.date >= yesterday && matches!(d.status, DayStatus::Incomplete { .. }))
        .map(|d| d.date);
    match open_shift.into_iter().chain(open_ot).min() {
        Some(open) => open.pred_opt().unwrap_or(open).min(today),
        None => today,
    }
}

/// What a driver would be paid if settled now.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub driver: Driver,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Work date of a shift or OT session still running, left for the next payment.
    pub open_from: Option<NaiveDate>,
    pub attendance: AttendanceSummary,
    pub ot: TimeDelta,
    pub salary: Money,
    pub balance: Money,
    /// Approved, not yet paid claims (already part of `balance`).
    pub approved_claims: Money,
    pub approved_claim_ids: Vec<i64>,
    pub pending_claims: usize,
    pub last_payment: Option<SalaryPayment>,
}

impl Settlement {
    pub fn total(&self) -> Money {
        self.salary + self.balance
    }

    pub fn is_empty_period(&self) -> bool {
        self.period_start > self.period_end
    }

    /// The payment row for this settlement. An empty period is recorded as the
    /// day before `period_start` so the next period starts where this one did.
    pub fn to_payment(&self, paid_by: i64, paid_at: DateTime<Utc>) -> NewPayment {
        let (period_start, period_end) = if self.is_empty_period() {
            let day = self.period_start.pred_opt().unwrap_or(self.period_start);
            (day, day)
        } else {
            (self.period_start, self.period_end)
        };
        NewPayment {
            user_id: self.driver.user_id,
            period_start,
            period_end,
            work_days: self.attendance.work_days,
            off_days: self.attendance.off_days,
            work_minutes: self.attendance.worked.num_minutes(),
            ot_minutes: self.ot.num_minutes(),
            salary_amount: self.salary,
            balance_amount: self.balance,
            previous_payment: self.last_payment.as_ref().map(|p| p.id),
            claim_ids: self.approved_claim_ids.clone(),
            paid_by,
            paid_at,
        }
    }

    /// Multi-line breakdown for chat replies.
    pub fn describe(&self, currency: &str) -> String {
        let mut lines = vec![format!(
            "👤 {} ({})",
            self.driver.display_name(),
            self.driver.user_id
        )];
        if self.is_empty_period() {
            lines.push("📅 Period: nothing unpaid since the last payment".to_string());
        } else {
            lines.push(format!("📅 Period: {} → {}", self.period_start, self.period_end));
        }
        if let Some(open) = self.open_from {
            lines.push(format!("🕑 Still on shift since {open}; that day goes in the next payment"));
        }
        lines.push(format!("🗓 Work days: {}", self.attendance.work_days));
        lines.push(format!("🏖 Off days: {}", self.attendance.off_days));
        if self.attendance.incomplete_days > 0 {
            lines.push(format!(
                "⚠️ Incomplete days (not paid): {}",
                self.attendance.incomplete_days
            ));
        }
        lines.push(format!("⏱ Hours: {}", attendance::format_duration(self.attendance.worked)));
        lines.push(format!("⏰ OT: {}", attendance::format_duration(self.ot)));
        lines.push(format!(
            "💼 Salary: {currency} {} ({} / month)",
            self.salary, self.driver.monthly_salary
        ));
        lines.push(format!(
            "💳 Balance: {currency} {} (approved claims {currency} {})",
            self.balance, self.approved_claims
        ));
        if self.pending_claims > 0 {
            lines.push(format!("⏳ Pending claims not included: {}", self.pending_claims));
        }
        if let Some(last) = &self.last_payment {
            lines.push(format!(
                "🧾 Last payment: {currency} {} up to {}",
                last.total_amount, last.period_end
            ));
        }
        lines.push(format!("💵 Total: {currency} {}", self.total()));
        lines.join("\n")
    }
}

/// Compute the unpaid settlement for a driver as of `today`.
pub fn settlement(
    db: &Database,
    driver: &Driver,
    today: NaiveDate,
    workdays_per_month: u32,
) -> DbResult<Settlement> {
    let last_payment = db.last_payment(driver.user_id)?;
    let first_event = db.first_event_date(driver.user_id)?;
    let period_start = unpaid_period_start(last_payment.as_ref(), first_event, today);

    let mut days = if period_start <= today {
        attendance::group_days(&db.events_between(Some(driver.user_id), period_start, today)?)
    } else {
        Vec::new()
    };
    let open_ot = db.open_ot(driver.user_id)?.map(|s| s.work_date);
    let period_end = settleable_until(&days, open_ot, today);
    let open_from = (period_end < today).then(|| period_end.succ_opt().unwrap_or(period_end));
    days.retain(|d| d.date <= period_end);

    let ot = if period_start <= period_end {
        attendance::total_ot(&db.ot_between(Some(driver.user_id), period_start, period_end)?)
    } else {
        TimeDelta::zero()
    };
    let summary = attendance::summarize(&days);

    let approved = db.claims(&ClaimFilter {
        user_id: Some(driver.user_id),
        status: Some(ClaimStatus::Approved),
        limit: None,
    })?;
    let pending_claims = db
        .claims(&ClaimFilter {
            user_id: Some(driver.user_id),
            status: Some(ClaimStatus::Pending),
            limit: None,
        })?
        .len();

    Ok(Settlement {
        driver: driver.clone(),
        period_start,
        period_end,
        open_from,
        salary: accrued_salary(driver.monthly_salary, summary.work_days, workdays_per_month),
        attendance: summary,
        ot,
        balance: driver.balance,
        approved_claims: approved.iter().map(|c| c.amount).sum(),
        approved_claim_ids: approved.iter().map(|c| c.id).collect(),
        pending_claims,
        last_payment,
    })
}
