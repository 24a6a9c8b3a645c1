//! Persistent SQLite database for drivers, clock logs, claims and payments.

use crate::timesheet::attendance::{ClockEvent, ClockKind, OtSession};
use crate::timesheet::money::Money;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub type DbResult<T> = rusqlite::Result<T>;

/// A tracked employee.
#[derive(Debug, Clone, PartialEq)]
pub struct Driver {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub monthly_salary: Money,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn display_name(&self) -> String {
        if !self.first_name.trim().is_empty() {
            self.first_name.clone()
        } else if let Some(username) = &self.username {
            format!("@{username}")
        } else {
            format!("User {}", self.user_id)
        }
    }
}

/// Identity of a Telegram user registering as a driver.
#[derive(Debug, Clone)]
pub struct NewDriver {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Pending,
    Approved,
    Denied,
    Paid,
}

impl ClaimStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Denied => "denied",
            ClaimStatus::Paid => "paid",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ClaimStatus::Pending),
            "approved" => Some(ClaimStatus::Approved),
            "denied" => Some(ClaimStatus::Denied),
            "paid" => Some(ClaimStatus::Paid),
            _ => None,
        }
    }
}

impl ToSql for ClaimStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ClaimStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        ClaimStatus::from_str(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

/// An expense reimbursement request.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub amount: Money,
    pub description: Option<String>,
    pub receipt_file_id: Option<String>,
    pub status: ClaimStatus,
    pub claim_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewClaim {
    pub user_id: i64,
    pub kind: String,
    pub amount: Money,
    pub description: Option<String>,
    pub receipt_file_id: Option<String>,
    pub claim_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Which claims to list.
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub user_id: Option<i64>,
    pub status: Option<ClaimStatus>,
    pub limit: Option<usize>,
}

/// Result of an approve/deny attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Reviewed { claim: Claim, new_balance: Money },
    AlreadyReviewed(Claim),
    NotFound,
}

/// A manual balance credit.
#[derive(Debug, Clone, PartialEq)]
pub struct Topup {
    pub id: i64,
    pub user_id: i64,
    pub amount: Money,
    pub note: Option<String>,
    pub admin_id: i64,
    pub topup_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A settled salary payment.
#[derive(Debug, Clone, PartialEq)]
pub struct SalaryPayment {
    pub id: i64,
    pub user_id: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub work_days: u32,
    pub off_days: u32,
    pub work_minutes: i64,
    pub ot_minutes: i64,
    pub salary_amount: Money,
    pub balance_amount: Money,
    pub total_amount: Money,
    pub paid_by: i64,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub work_days: u32,
    pub off_days: u32,
    pub work_minutes: i64,
    pub ot_minutes: i64,
    pub salary_amount: Money,
    pub balance_amount: Money,
    /// Latest payment id the settlement was computed after.
    pub previous_payment: Option<i64>,
    /// Approved claims included in `balance_amount`.
    pub claim_ids: Vec<i64>,
    pub paid_by: i64,
    pub paid_at: DateTime<Utc>,
}

/// Result of recording a payment.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Recorded(SalaryPayment),
    /// Another payment or a balance change landed after the settlement was
    /// computed. Nothing was written.
    Stale,
}

const DRIVER_COLUMNS: &str =
    "user_id, chat_id, username, first_name, monthly_salary, balance, created_at";
const CLOCK_COLUMNS: &str = "id, user_id, work_date, kind, at";
const OT_COLUMNS: &str = "id, user_id, work_date, started_at, ended_at";
const CLAIM_COLUMNS: &str = "id, user_id, kind, amount, description, receipt_file_id, status, \
     claim_date, created_at, reviewed_at, reviewed_by, paid_at";
const TOPUP_COLUMNS: &str = "id, user_id, amount, note, admin_id, topup_date, created_at";
const PAYMENT_COLUMNS: &str = "id, user_id, period_start, period_end, work_days, off_days, \
     work_minutes, ot_minutes, salary_amount, balance_amount, total_amount, paid_by, paid_at";

/// Strip an optional `sqlite:` / `sqlite://` scheme. `None` means in-memory.
pub fn database_path(url: &str) -> Option<&str> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
        .trim();
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

/// Persistent SQLite database for the bot.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn in_memory() -> DbResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Open the database named by a connection string.
    pub fn open(url: &str) -> DbResult<Self> {
        match database_path(url) {
            Some(path) => {
                let db = Self::with_connection(Connection::open(Path::new(path))?)?;
                let (drivers, logs) = db.counts()?;
                info!("Loaded database from {} ({} drivers, {} clock logs)", path, drivers, logs);
                Ok(db)
            }
            None => Self::in_memory(),
        }
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> DbResult<()> {
        let conn = self.lock();

        conn.execute_batch(r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS drivers (
                user_id INTEGER PRIMARY KEY,
                chat_id INTEGER NOT NULL,
                username TEXT,
                first_name TEXT NOT NULL,
                monthly_salary INTEGER NOT NULL DEFAULT 0,
                balance INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS clock_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES drivers(user_id),
                work_date TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('in', 'out', 'off')),
                at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ot_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES drivers(user_id),
                work_date TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT
            );

            CREATE TABLE IF NOT EXISTS claims (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES drivers(user_id),
                kind TEXT NOT NULL,
                amount INTEGER NOT NULL CHECK (amount > 0),
                description TEXT,
                receipt_file_id TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                claim_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                reviewed_at TEXT,
                reviewed_by INTEGER,
                paid_at TEXT
            );

            CREATE TABLE IF NOT EXISTS topups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES drivers(user_id),
                amount INTEGER NOT NULL,
                note TEXT,
                admin_id INTEGER NOT NULL,
                topup_date TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS salary_payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES drivers(user_id),
                period_start TEXT NOT NULL,
                period_end TEXT NOT NULL,
                work_days INTEGER NOT NULL DEFAULT 0,
                off_days INTEGER NOT NULL DEFAULT 0,
                work_minutes INTEGER NOT NULL DEFAULT 0,
                ot_minutes INTEGER NOT NULL DEFAULT 0,
                salary_amount INTEGER NOT NULL,
                balance_amount INTEGER NOT NULL DEFAULT 0,
                total_amount INTEGER NOT NULL,
                paid_by INTEGER NOT NULL,
                paid_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_clock_logs_user_date ON clock_logs(user_id, work_date);
            CREATE INDEX IF NOT EXISTS idx_clock_logs_date ON clock_logs(work_date);
            CREATE INDEX IF NOT EXISTS idx_ot_logs_user_date ON ot_logs(user_id, work_date);
            CREATE INDEX IF NOT EXISTS idx_claims_user_date ON claims(user_id, claim_date);
            CREATE INDEX IF NOT EXISTS idx_claims_status ON claims(status);
            CREATE INDEX IF NOT EXISTS idx_topups_user_date ON topups(user_id, topup_date);
            CREATE INDEX IF NOT EXISTS idx_payments_user ON salary_payments(user_id, period_end);
        "#)
    }

    /// (driver count, clock log count)
    pub fn counts(&self) -> DbResult<(usize, usize)> {
        let conn = self.lock();
        let drivers: i64 = conn.query_row("SELECT COUNT(*) FROM drivers", [], |row| row.get(0))?;
        let logs: i64 = conn.query_row("SELECT COUNT(*) FROM clock_logs", [], |row| row.get(0))?;
        Ok((drivers as usize, logs as usize))
    }

    // ==================== DRIVER METHODS ====================

    /// Insert or refresh a driver. Returns the row and whether it was created.
    pub fn upsert_driver(&self, new: &NewDriver, now: DateTime<Utc>) -> DbResult<(Driver, bool)> {
        let conn = self.lock();

        let existed: bool = conn
            .query_row("SELECT 1 FROM drivers WHERE user_id = ?1", params![new.user_id], |_| Ok(()))
            .optional()?
            .is_some();

        conn.execute(
            "INSERT INTO drivers (user_id, chat_id, username, first_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                chat_id = excluded.chat_id,
                username = COALESCE(excluded.username, username),
                first_name = excluded.first_name",
            params![new.user_id, new.chat_id, new.username, new.first_name, now],
        )?;

        let driver = conn.query_row(
            &format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE user_id = ?1"),
            params![new.user_id],
            driver_from_row,
        )?;

        if !existed {
            info!("👤 Registered driver {} ({})", driver.display_name(), driver.user_id);
        }
        Ok((driver, !existed))
    }

    pub fn driver(&self, user_id: i64) -> DbResult<Option<Driver>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE user_id = ?1"),
            params![user_id],
            driver_from_row,
        )
        .optional()
    }

    pub fn drivers(&self) -> DbResult<Vec<Driver>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers ORDER BY first_name COLLATE NOCASE, user_id"
        ))?;
        let rows = stmt.query_map([], driver_from_row)?;
        rows.collect()
    }

    /// Set the monthly salary. Returns false if the driver does not exist.
    pub fn set_salary(&self, user_id: i64, salary: Money) -> DbResult<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE drivers SET monthly_salary = ?1 WHERE user_id = ?2",
            params![salary, user_id],
        )?;
        Ok(changed > 0)
    }

    // ==================== CLOCK METHODS ====================

    pub fn add_clock_event(
        &self,
        user_id: i64,
        work_date: NaiveDate,
        kind: ClockKind,
        at: DateTime<Utc>,
    ) -> DbResult<ClockEvent> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO clock_logs (user_id, work_date, kind, at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, work_date, kind, at],
        )?;
        debug!("Clock event {:?} for {} on {}", kind, user_id, work_date);
        Ok(ClockEvent { id: conn.last_insert_rowid(), user_id, work_date, kind, at })
    }

    /// One driver's events for a work date, oldest first.
    pub fn events_on(&self, user_id: i64, work_date: NaiveDate) -> DbResult<Vec<ClockEvent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLOCK_COLUMNS} FROM clock_logs
             WHERE user_id = ?1 AND work_date = ?2 ORDER BY at, id"
        ))?;
        let rows = stmt.query_map(params![user_id, work_date], clock_from_row)?;
        rows.collect()
    }

    /// Every driver's events for a work date.
    pub fn events_on_date(&self, work_date: NaiveDate) -> DbResult<Vec<ClockEvent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLOCK_COLUMNS} FROM clock_logs WHERE work_date = ?1 ORDER BY user_id, at, id"
        ))?;
        let rows = stmt.query_map(params![work_date], clock_from_row)?;
        rows.collect()
    }

    /// Events with work dates in `[from, to]`, optionally for one driver.
    pub fn events_between(
        &self,
        user_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<Vec<ClockEvent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLOCK_COLUMNS} FROM clock_logs
             WHERE work_date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR user_id = ?3)
             ORDER BY user_id, work_date, at, id"
        ))?;
        let rows = stmt.query_map(params![from, to, user_id], clock_from_row)?;
        rows.collect()
    }

    /// The driver's most recent clock-in.
    pub fn latest_clock_in(&self, user_id: i64) -> DbResult<Option<ClockEvent>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {CLOCK_COLUMNS} FROM clock_logs
                 WHERE user_id = ?1 AND kind = 'in' ORDER BY at DESC, id DESC LIMIT 1"
            ),
            params![user_id],
            clock_from_row,
        )
        .optional()
    }

    pub fn first_event_date(&self, user_id: i64) -> DbResult<Option<NaiveDate>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT MIN(work_date) FROM clock_logs WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
    }

    // ==================== OVERTIME METHODS ====================

    pub fn open_ot(&self, user_id: i64) -> DbResult<Option<OtSession>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {OT_COLUMNS} FROM ot_logs
                 WHERE user_id = ?1 AND ended_at IS NULL ORDER BY started_at DESC LIMIT 1"
            ),
            params![user_id],
            ot_from_row,
        )
        .optional()
    }

    pub fn start_ot(&self, user_id: i64, work_date: NaiveDate, at: DateTime<Utc>) -> DbResult<OtSession> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO ot_logs (user_id, work_date, started_at) VALUES (?1, ?2, ?3)",
            params![user_id, work_date, at],
        )?;
        Ok(OtSession {
            id: conn.last_insert_rowid(),
            user_id,
            work_date,
            started_at: at,
            ended_at: None,
        })
    }

    pub fn finish_ot(&self, id: i64, at: DateTime<Utc>) -> DbResult<()> {
        let conn = self.lock();
        conn.execute("UPDATE ot_logs SET ended_at = ?1 WHERE id = ?2", params![at, id])?;
        Ok(())
    }

    pub fn ot_between(
        &self,
        user_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<Vec<OtSession>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {OT_COLUMNS} FROM ot_logs
             WHERE work_date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR user_id = ?3)
             ORDER BY user_id, started_at"
        ))?;
        let rows = stmt.query_map(params![from, to, user_id], ot_from_row)?;
        rows.collect()
    }

    // ==================== CLAIM METHODS ====================

    pub fn insert_claim(&self, new: &NewClaim) -> DbResult<Claim> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO claims (user_id, kind, amount, description, receipt_file_id, status, claim_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7)",
            params![
                new.user_id,
                new.kind,
                new.amount,
                new.description,
                new.receipt_file_id,
                new.claim_date,
                new.created_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!("💸 Claim #{} from {}: {} {}", id, new.user_id, new.kind, new.amount);
        conn.query_row(
            &format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = ?1"),
            params![id],
            claim_from_row,
        )
    }

    #[cfg(test)]
    pub fn claim(&self, id: i64) -> DbResult<Option<Claim>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = ?1"),
            params![id],
            claim_from_row,
        )
        .optional()
    }

    /// Claims matching a filter, newest first.
    pub fn claims(&self, filter: &ClaimFilter) -> DbResult<Vec<Claim>> {
        let conn = self.lock();
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims
             WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![filter.user_id, filter.status, limit], claim_from_row)?;
        rows.collect()
    }

    /// Claims dated in `[from, to]`, oldest first.
    pub fn claims_between(
        &self,
        user_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<Vec<Claim>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims
             WHERE claim_date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR user_id = ?3)
             ORDER BY user_id, claim_date, id"
        ))?;
        let rows = stmt.query_map(params![from, to, user_id], claim_from_row)?;
        rows.collect()
    }

    /// Approve or deny a pending claim. Approval credits the driver's balance.
    pub fn review_claim(
        &self,
        id: i64,
        decision: ClaimStatus,
        admin_id: i64,
        now: DateTime<Utc>,
    ) -> DbResult<ReviewOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let claim = tx
            .query_row(
                &format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = ?1"),
                params![id],
                claim_from_row,
            )
            .optional()?;
        let Some(claim) = claim else {
            return Ok(ReviewOutcome::NotFound);
        };
        if claim.status != ClaimStatus::Pending {
            return Ok(ReviewOutcome::AlreadyReviewed(claim));
        }

        tx.execute(
            "UPDATE claims SET status = ?1, reviewed_at = ?2, reviewed_by = ?3 WHERE id = ?4",
            params![decision, now, admin_id, id],
        )?;
        if decision == ClaimStatus::Approved {
            tx.execute(
                "UPDATE drivers SET balance = balance + ?1 WHERE user_id = ?2",
                params![claim.amount, claim.user_id],
            )?;
        }
        let new_balance: Money = tx.query_row(
            "SELECT balance FROM drivers WHERE user_id = ?1",
            params![claim.user_id],
            |row| row.get(0),
        )?;
        let reviewed = tx.query_row(
            &format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = ?1"),
            params![id],
            claim_from_row,
        )?;
        tx.commit()?;

        info!("🧾 Claim #{} {} by {}", id, decision.as_str(), admin_id);
        Ok(ReviewOutcome::Reviewed { claim: reviewed, new_balance })
    }

    // ==================== LEDGER METHODS ====================

    /// Credit a driver's balance. Returns `None` if the driver does not exist.
    pub fn record_topup(
        &self,
        user_id: i64,
        amount: Money,
        note: Option<&str>,
        admin_id: i64,
        topup_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> DbResult<Option<(Topup, Money)>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE drivers SET balance = balance + ?1 WHERE user_id = ?2",
            params![amount, user_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        tx.execute(
            "INSERT INTO topups (user_id, amount, note, admin_id, topup_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, amount, note, admin_id, topup_date, now],
        )?;
        let topup = Topup {
            id: tx.last_insert_rowid(),
            user_id,
            amount,
            note: note.map(str::to_string),
            admin_id,
            topup_date,
            created_at: now,
        };
        let new_balance: Money = tx.query_row(
            "SELECT balance FROM drivers WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        info!("💰 Top-up {} for {} by {}", amount, user_id, admin_id);
        Ok(Some((topup, new_balance)))
    }

    pub fn topups_between(
        &self,
        user_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<Vec<Topup>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOPUP_COLUMNS} FROM topups
             WHERE topup_date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR user_id = ?3)
             ORDER BY user_id, created_at, id"
        ))?;
        let rows = stmt.query_map(params![from, to, user_id], topup_from_row)?;
        rows.collect()
    }

    pub fn last_payment(&self, user_id: i64) -> DbResult<Option<SalaryPayment>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT {PAYMENT_COLUMNS} FROM salary_payments
                 WHERE user_id = ?1 ORDER BY period_end DESC, id DESC LIMIT 1"
            ),
            params![user_id],
            payment_from_row,
        )
        .optional()
    }

    /// Store a settlement: deduct the included balance and mark its claims paid.
    /// The last payment and the balance are re-read inside the transaction.
    pub fn record_payment(&self, new: &NewPayment) -> DbResult<PaymentOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let previous: Option<i64> = tx
            .query_row(
                "SELECT id FROM salary_payments WHERE user_id = ?1
                 ORDER BY period_end DESC, id DESC LIMIT 1",
                params![new.user_id],
                |row| row.get(0),
            )
            .optional()?;
        let balance: Option<Money> = tx
            .query_row(
                "SELECT balance FROM drivers WHERE user_id = ?1",
                params![new.user_id],
                |row| row.get(0),
            )
            .optional()?;
        if previous != new.previous_payment || balance != Some(new.balance_amount) {
            warn!(
                "Stale settlement for {}: last payment {:?} (expected {:?}), balance {:?} (expected {})",
                new.user_id, previous, new.previous_payment, balance, new.balance_amount
            );
            return Ok(PaymentOutcome::Stale);
        }

        let total = new.salary_amount + new.balance_amount;
        tx.execute(
            "INSERT INTO salary_payments (user_id, period_start, period_end, work_days, off_days,
                work_minutes, ot_minutes, salary_amount, balance_amount, total_amount, paid_by, paid_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                new.user_id,
                new.period_start,
                new.period_end,
                new.work_days,
                new.off_days,
                new.work_minutes,
                new.ot_minutes,
                new.salary_amount,
                new.balance_amount,
                total,
                new.paid_by,
                new.paid_at
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE drivers SET balance = balance - ?1 WHERE user_id = ?2",
            params![new.balance_amount, new.user_id],
        )?;
        let mut claims_paid = 0;
        for claim_id in &new.claim_ids {
            claims_paid += tx.execute(
                "UPDATE claims SET status = 'paid', paid_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND status = 'approved'",
                params![new.paid_at, claim_id, new.user_id],
            )?;
        }
        let payment = tx.query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM salary_payments WHERE id = ?1"),
            params![id],
            payment_from_row,
        )?;
        tx.commit()?;

        info!(
            "🟢 Paid {} to {} ({} claims settled) by {}",
            total, new.user_id, claims_paid, new.paid_by
        );
        Ok(PaymentOutcome::Recorded(payment))
    }
}

fn driver_from_row(row: &Row<'_>) -> rusqlite::Result<Driver> {
    Ok(Driver {
        user_id: row.get(0)?,
        chat_id: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        monthly_salary: row.get(4)?,
        balance: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn clock_from_row(row: &Row<'_>) -> rusqlite::Result<ClockEvent> {
    Ok(ClockEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        work_date: row.get(2)?,
        kind: row.get(3)?,
        at: row.get(4)?,
    })
}

fn ot_from_row(row: &Row<'_>) -> rusqlite::Result<OtSession> {
    Ok(OtSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        work_date: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
    })
}

fn claim_from_row(row: &Row<'_>) -> rusqlite::Result<Claim> {
    Ok(Claim {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        amount: row.get(3)?,
        description: row.get(4)?,
        receipt_file_id: row.get(5)?,
        status: row.get(6)?,
        claim_date: row.get(7)?,
        created_at: row.get(8)?,
        reviewed_at: row.get(9)?,
        reviewed_by: row.get(10)?,
        paid_at: row.get(11)?,
    })
}

fn topup_from_row(row: &Row<'_>) -> rusqlite::Result<Topup> {
    Ok(Topup {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        note: row.get(3)?,
        admin_id: row.get(4)?,
        topup_date: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<SalaryPayment> {
    Ok(SalaryPayment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        period_start: row.get(2)?,
        period_end: row.get(3)?,
        work_days: row.get(4)?,
        off_days: row.get(5)?,
        work_minutes: row.get(6)?,
        ot_minutes: row.get(7)?,
        salary_amount: row.get(8)?,
        balance_amount: row.get(9)?,
        total_amount: row.get(10)?,
        paid_by: row.get(11)?,
        paid_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 1, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn new_driver(user_id: i64, name: &str) -> NewDriver {
        NewDriver {
            user_id,
            chat_id: user_id,
            username: Some(name.to_lowercase()),
            first_name: name.to_string(),
        }
    }

    fn new_claim(user_id: i64, cents: i64) -> NewClaim {
        NewClaim {
            user_id,
            kind: "petrol".to_string(),
            amount: Money::from_cents(cents),
            description: None,
            receipt_file_id: Some("AgAD-receipt".to_string()),
            claim_date: today(),
            created_at: now(),
        }
    }

    #[test]
    fn test_database_path() {
        assert_eq!(database_path("sqlite://data/bot.db"), Some("data/bot.db"));
        assert_eq!(database_path("sqlite:bot.db"), Some("bot.db"));
        assert_eq!(database_path("bot.db"), Some("bot.db"));
        assert_eq!(database_path(":memory:"), None);
        assert_eq!(database_path("sqlite://:memory:"), None);
    }

    #[test]
    fn test_upsert_driver_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let (driver, created) = db.upsert_driver(&new_driver(100, "Ali"), now()).unwrap();
        assert!(created);
        assert_eq!(driver.balance, Money::ZERO);

        let mut renamed = new_driver(100, "Ali B");
        renamed.username = None;
        let (driver, created) = db.upsert_driver(&renamed, now()).unwrap();
        assert!(!created);
        assert_eq!(driver.first_name, "Ali B");
        assert_eq!(driver.username.as_deref(), Some("ali"));
        assert_eq!(db.drivers().unwrap().len(), 1);
    }

    #[test]
    fn test_clock_events_round_trip() {
        let db = Database::in_memory().unwrap();
        db.upsert_driver(&new_driver(100, "Ali"), now()).unwrap();
        db.add_clock_event(100, today(), ClockKind::In, now()).unwrap();
        db.add_clock_event(100, today(), ClockKind::Out, now() + chrono::TimeDelta::hours(8)).unwrap();

        let events = db.events_on(100, today()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ClockKind::In);
        assert_eq!(events[1].at - events[0].at, chrono::TimeDelta::hours(8));
        assert_eq!(db.latest_clock_in(100).unwrap().map(|e| e.id), Some(events[0].id));
        assert_eq!(db.first_event_date(100).unwrap(), Some(today()));
        assert_eq!(db.first_event_date(999).unwrap(), None);
    }

    #[test]
    fn test_clock_event_requires_driver() {
        let db = Database::in_memory().unwrap();
        assert!(db.add_clock_event(42, today(), ClockKind::In, now()).is_err());
    }

    #[test]
    fn test_topup_credits_balance() {
        let db = Database::in_memory().unwrap();
        db.upsert_driver(&new_driver(100, "Ali"), now()).unwrap();

        let (topup, balance) = db
            .record_topup(100, Money::from_cents(5000), Some("fuel float"), 1, today(), now())
            .unwrap()
            .unwrap();
        assert_eq!(topup.amount, Money::from_cents(5000));
        assert_eq!(balance, Money::from_cents(5000));
        assert_eq!(db.topups_between(Some(100), today(), today()).unwrap().len(), 1);

        assert!(db.record_topup(999, Money::from_cents(1), None, 1, today(), now()).unwrap().is_none());
    }

    #[test]
    fn test_review_claim_once() {
        let db = Database::in_memory().unwrap();
        db.upsert_driver(&new_driver(100, "Ali"), now()).unwrap();
        let claim = db.insert_claim(&new_claim(100, 4550)).unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);

        match db.review_claim(claim.id, ClaimStatus::Approved, 1, now()).unwrap() {
            ReviewOutcome::Reviewed { claim, new_balance } => {
                assert_eq!(claim.status, ClaimStatus::Approved);
                assert_eq!(claim.reviewed_by, Some(1));
                assert_eq!(new_balance, Money::from_cents(4550));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert!(matches!(
            db.review_claim(claim.id, ClaimStatus::Denied, 1, now()).unwrap(),
            ReviewOutcome::AlreadyReviewed(_)
        ));
        assert_eq!(db.review_claim(999, ClaimStatus::Denied, 1, now()).unwrap(), ReviewOutcome::NotFound);
    }

    #[test]
    fn test_denied_claim_leaves_balance() {
        let db = Database::in_memory().unwrap();
        db.upsert_driver(&new_driver(100, "Ali"), now()).unwrap();
        let claim = db.insert_claim(&new_claim(100, 1200)).unwrap();
        db.review_claim(claim.id, ClaimStatus::Denied, 1, now()).unwrap();
        assert_eq!(db.driver(100).unwrap().unwrap().balance, Money::ZERO);
    }

    #[test]
    fn test_claim_filter() {
        let db = Database::in_memory().unwrap();
        db.upsert_driver(&new_driver(100, "Ali"), now()).unwrap();
        db.upsert_driver(&new_driver(200, "Bob"), now()).unwrap();
        let first = db.insert_claim(&new_claim(100, 100)).unwrap();
        db.insert_claim(&new_claim(200, 200)).unwrap();
        db.review_claim(first.id, ClaimStatus::Approved, 1, now()).unwrap();

        let pending = db
            .claims(&ClaimFilter { status: Some(ClaimStatus::Pending), ..Default::default() })
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].user_id, 200);

        let ali = db.claims(&ClaimFilter { user_id: Some(100), ..Default::default() }).unwrap();
        assert_eq!(ali.len(), 1);
        assert_eq!(db.claims(&ClaimFilter { limit: Some(1), ..Default::default() }).unwrap().len(), 1);
    }

    fn new_payment(balance_cents: i64, claim_ids: Vec<i64>, previous_payment: Option<i64>) -> NewPayment {
        NewPayment {
            user_id: 100,
            period_start: today(),
            period_end: today(),
            work_days: 1,
            off_days: 0,
            work_minutes: 480,
            ot_minutes: 0,
            salary_amount: Money::from_cents(13_462),
            balance_amount: Money::from_cents(balance_cents),
            previous_payment,
            claim_ids,
            paid_by: 1,
            paid_at: now(),
        }
    }

    #[test]
    fn test_record_payment_settles_balance_and_claims() {
        let db = Database::in_memory().unwrap();
        db.upsert_driver(&new_driver(100, "Ali"), now()).unwrap();
        let claim = db.insert_claim(&new_claim(100, 2000)).unwrap();
        db.review_claim(claim.id, ClaimStatus::Approved, 1, now()).unwrap();
        db.record_topup(100, Money::from_cents(1000), None, 1, today(), now()).unwrap();

        let PaymentOutcome::Recorded(payment) =
            db.record_payment(&new_payment(3000, vec![claim.id], None)).unwrap()
        else {
            panic!("payment should be recorded");
        };

        assert_eq!(payment.total_amount, Money::from_cents(16_462));
        assert_eq!(db.driver(100).unwrap().unwrap().balance, Money::ZERO);
        assert_eq!(db.claim(claim.id).unwrap().unwrap().status, ClaimStatus::Paid);
        assert_eq!(db.last_payment(100).unwrap().map(|p| p.id), Some(payment.id));
    }

    #[test]
    fn test_stale_payment_writes_nothing() {
        let db = Database::in_memory().unwrap();
        db.upsert_driver(&new_driver(100, "Ali"), now()).unwrap();
        let first = db.insert_claim(&new_claim(100, 2000)).unwrap();
        db.review_claim(first.id, ClaimStatus::Approved, 1, now()).unwrap();

        // A claim approved after the settlement was computed
        let late = db.insert_claim(&new_claim(100, 500)).unwrap();
        db.review_claim(late.id, ClaimStatus::Approved, 1, now()).unwrap();
        assert_eq!(
            db.record_payment(&new_payment(2000, vec![first.id], None)).unwrap(),
            PaymentOutcome::Stale
        );
        assert!(db.last_payment(100).unwrap().is_none());
        assert_eq!(db.claim(first.id).unwrap().unwrap().status, ClaimStatus::Approved);
        assert_eq!(db.driver(100).unwrap().unwrap().balance, Money::from_cents(2500));

        // Two settlements computed from the same state: only the first lands
        let settled = new_payment(2500, vec![first.id, late.id], None);
        assert!(matches!(db.record_payment(&settled).unwrap(), PaymentOutcome::Recorded(_)));
        assert_eq!(db.record_payment(&settled).unwrap(), PaymentOutcome::Stale);
        assert_eq!(db.driver(100).unwrap().unwrap().balance, Money::ZERO);
        assert_eq!(db.claim(late.id).unwrap().unwrap().status, ClaimStatus::Paid);
    }

    #[test]
    fn test_ot_sessions() {
        let db = Database::in_memory().unwrap();
        db.upsert_driver(&new_driver(100, "Ali"), now()).unwrap();
        let session = db.start_ot(100, today(), now()).unwrap();
        assert_eq!(db.open_ot(100).unwrap().map(|s| s.id), Some(session.id));

        db.finish_ot(session.id, now() + chrono::TimeDelta::minutes(45)).unwrap();
        assert!(db.open_ot(100).unwrap().is_none());
        let sessions = db.ot_between(Some(100), today(), today()).unwrap();
        assert_eq!(sessions[0].duration(), chrono::TimeDelta::minutes(45));
    }
}
