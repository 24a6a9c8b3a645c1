//! Timesheet engine: authorizes and executes chat commands against the database.

use crate::error::{BotError, BotResult};
use crate::timesheet::attendance::{self, ClockKind, DayStatus};
use crate::timesheet::commands::{Command, next_word, parse_id, split_args};
use crate::timesheet::database::{
    Claim, ClaimFilter, ClaimStatus, Database, Driver, NewClaim, NewDriver, PaymentOutcome,
    ReviewOutcome,
};
use crate::timesheet::ledger;
use crate::timesheet::money::Money;
use crate::timesheet::report::{self, DateRange, Report, ReportScope, MESSAGE_LIMIT};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use teloxide::utils::command::{BotCommands, ParseError};
use tracing::{error, info, warn};

/// Receipts re-sent per `/viewclaims` reply.
const MAX_RECEIPTS: usize = 10;
const MAX_LISTED_CLAIMS: usize = 30;

#[derive(Debug, Clone)]
pub struct TimesheetConfig {
    pub admin_ids: HashSet<i64>,
    pub timezone: Tz,
    pub currency: String,
    pub workdays_per_month: u32,
}

/// The Telegram user a command came from.
#[derive(Debug, Clone)]
pub struct Sender {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    fn as_new_driver(&self) -> NewDriver {
        NewDriver {
            user_id: self.user_id,
            chat_id: self.chat_id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
        }
    }
}

/// Something to send back after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Text to the chat the command came from.
    Text(String),
    Document {
        file_name: String,
        bytes: Vec<u8>,
        caption: String,
    },
    /// A stored receipt (photo or document file id).
    Receipt { file_id: String, caption: String },
    /// Text to another chat, e.g. the driver affected by an admin action.
    Notify { chat_id: i64, text: String },
}

pub struct TimesheetEngine {
    config: TimesheetConfig,
    db: Database,
}

impl TimesheetEngine {
    pub fn new(config: TimesheetConfig, db: Database) -> Self {
        Self { config, db }
    }

    #[cfg(test)]
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.config.admin_ids.contains(&user_id)
    }

    /// Execute a command. Failures become a single text reply.
    pub fn handle(
        &self,
        sender: &Sender,
        command: Command,
        receipt: Option<String>,
        now: DateTime<Utc>,
    ) -> Vec<Reply> {
        let name = command.name();
        match self.execute(sender, command, receipt, now) {
            Ok(replies) => replies,
            Err(e) => {
                if e.is_internal() {
                    error!("/{} from {} failed: {}", name, sender.user_id, e);
                } else if matches!(e, BotError::Unauthorized(_)) {
                    warn!("⛔ Rejected /{} from non-admin {}", name, sender.user_id);
                } else {
                    info!("/{} from {} rejected: {}", name, sender.user_id, e);
                }
                vec![Reply::Text(e.user_message())]
            }
        }
    }

    /// Reply for text that looked like a command but did not parse.
    pub fn handle_parse_error(&self, sender: &Sender, err: &ParseError) -> Vec<Reply> {
        info!("Unparseable command from {}: {}", sender.user_id, err);
        let text = match err {
            ParseError::UnknownCommand(name) => {
                format!("❓ Unknown command: {name}\nSend /help to see what I can do.")
            }
            other => format!("❌ Could not read that command ({other}).\nSend /help for usage."),
        };
        vec![Reply::Text(text)]
    }

    fn execute(
        &self,
        sender: &Sender,
        command: Command,
        receipt: Option<String>,
        now: DateTime<Utc>,
    ) -> BotResult<Vec<Reply>> {
        if command.is_admin_only() && !self.is_admin(sender.user_id) {
            return Err(BotError::Unauthorized(command.name()));
        }

        let usage = command.usage();
        let today = self.today(now);
        match command {
            Command::Start(_) => self.start(sender, now),
            Command::Help => Ok(text(Command::descriptions().to_string())),
            Command::ClockIn => self.clock_in(sender, today, now),
            Command::ClockOut => self.clock_out(sender, today, now),
            Command::OffDay => self.off_day(sender, today, now),
            Command::Ot => self.overtime(sender, today, now),
            Command::Claim(args) => self.claim(sender, &args, receipt, today, now, usage),
            Command::MyClaims => self.my_claims(sender, now),
            Command::Balance(args) => self.balance(&args, usage),
            Command::Check(args) => self.check(&args, today),
            Command::Pdf(args) => self.pdf(&args, today, now),
            Command::TopUp(args) => self.top_up(sender, &args, today, now, usage),
            Command::ViewClaims(args) => self.view_claims(&args),
            Command::Approve(args) => self.review(sender, &args, ClaimStatus::Approved, now, usage),
            Command::Deny(args) => self.review(sender, &args, ClaimStatus::Denied, now, usage),
            Command::Salary(args) => self.salary(&args, usage),
            Command::Paid(args) => self.paid(sender, &args, today, now, usage),
            Command::Drivers => self.list_drivers(),
            Command::Report(args) => self.monthly_report(&args, today),
        }
    }

    // ==================== HELPERS ====================

    fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.config.timezone).date_naive()
    }

    fn local_time(&self, t: DateTime<Utc>) -> String {
        t.with_timezone(&self.config.timezone).format("%H:%M").to_string()
    }

    fn local_datetime(&self, t: DateTime<Utc>) -> String {
        t.with_timezone(&self.config.timezone)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }

    fn money(&self, amount: Money) -> String {
        format!("{} {}", self.config.currency, amount)
    }

    fn register(&self, sender: &Sender, now: DateTime<Utc>) -> BotResult<Driver> {
        Ok(self.db.upsert_driver(&sender.as_new_driver(), now)?.0)
    }

    fn require_driver(&self, user_id: i64) -> BotResult<Driver> {
        self.db.driver(user_id)?.ok_or(BotError::DriverNotFound(user_id))
    }

    fn claim_line(&self, claim: &Claim, owner: Option<&Driver>) -> String {
        let mut line = format!(
            "#{} · {} · {} {}",
            claim.id,
            claim.claim_date,
            claim.kind,
            self.money(claim.amount)
        );
        if let Some(driver) = owner {
            line.push_str(&format!(" · {} ({})", driver.display_name(), driver.user_id));
        }
        line.push_str(&format!(" · {}", claim.status.as_str()));
        if claim.receipt_file_id.is_some() {
            line.push_str(" 📎");
        }
        if let Some(description) = &claim.description {
            line.push_str(&format!("\n    {description}"));
        }
        line
    }

    // ==================== DRIVER COMMANDS ====================

    fn start(&self, sender: &Sender, now: DateTime<Utc>) -> BotResult<Vec<Reply>> {
        let is_admin = self.is_admin(sender.user_id);
        if !is_admin {
            self.register(sender, now)?;
        }

        let mut msg = format!(
            "👋 Hello {}!\nWelcome to the driver clock-in bot.\n\n\
             Available Commands:\n\
             🕑 /clockin\n🏁 /clockout\n📅 /offday\n⏰ /ot\n💸 /claim <type> <amount> [description]\n🧾 /myclaims",
            sender.first_name
        );
        if is_admin {
            msg.push_str(
                "\n\n🔐 Admin Commands:\n\
                 📊 /check\n🧾 /pdf\n📷 /viewclaims\n✅ /approve\n🚫 /deny\n💳 /balance\n\
                 💰 /topup\n💼 /salary\n🟢 /paid\n👥 /drivers\n📈 /report",
            );
        }
        Ok(text(msg))
    }

    fn clock_in(&self, sender: &Sender, today: NaiveDate, now: DateTime<Utc>) -> BotResult<Vec<Reply>> {
        self.register(sender, now)?;
        let events = self.db.events_on(sender.user_id, today)?;
        match attendance::day_status(&events) {
            DayStatus::Worked { clock_in, .. } | DayStatus::Incomplete { clock_in } => {
                return Err(BotError::Rejected(format!(
                    "You have already clocked in today at {}.",
                    self.local_time(clock_in)
                )));
            }
            DayStatus::Off => {
                return Err(BotError::Rejected(
                    "Today is marked as an off day. Cannot clock in.".to_string(),
                ));
            }
            DayStatus::Absent => {}
        }

        self.db.add_clock_event(sender.user_id, today, ClockKind::In, now)?;
        info!("🕑 {} clocked in", sender.user_id);
        Ok(text(format!("✅ Clocked in at {}.", self.local_datetime(now))))
    }

    fn clock_out(&self, sender: &Sender, today: NaiveDate, now: DateTime<Utc>) -> BotResult<Vec<Reply>> {
        self.register(sender, now)?;
        let not_clocked_in = || BotError::Rejected("You haven't clocked in today.".to_string());

        let latest = self.db.latest_clock_in(sender.user_id)?.ok_or_else(not_clocked_in)?;
        let yesterday = today.pred_opt().unwrap_or(today);
        if latest.work_date != today && latest.work_date != yesterday {
            return Err(not_clocked_in());
        }

        let events = self.db.events_on(sender.user_id, latest.work_date)?;
        let clock_in = match attendance::day_status(&events) {
            DayStatus::Incomplete { clock_in } => clock_in,
            DayStatus::Worked { clock_out, .. } if latest.work_date == today => {
                return Err(BotError::Rejected(format!(
                    "You have already clocked out today at {}.",
                    self.local_time(clock_out)
                )));
            }
            _ => return Err(not_clocked_in()),
        };
        if now < clock_in {
            return Err(BotError::Rejected("Clock-out time is before your clock-in.".to_string()));
        }

        self.db.add_clock_event(sender.user_id, latest.work_date, ClockKind::Out, now)?;
        let worked = now - clock_in;
        info!("🏁 {} clocked out after {}", sender.user_id, attendance::format_duration(worked));
        Ok(text(format!(
            "🏁 Clocked out at {}. Worked {}.",
            self.local_datetime(now),
            attendance::format_duration(worked)
        )))
    }

    fn off_day(&self, sender: &Sender, today: NaiveDate, now: DateTime<Utc>) -> BotResult<Vec<Reply>> {
        self.register(sender, now)?;
        let events = self.db.events_on(sender.user_id, today)?;
        if events.iter().any(|e| e.kind != ClockKind::Off) {
            return Err(BotError::Rejected(
                "Cannot mark as off day - already have clock records for today.".to_string(),
            ));
        }
        if !events.is_empty() {
            return Ok(text("🏖 Today is already marked as off day."));
        }

        self.db.add_clock_event(sender.user_id, today, ClockKind::Off, now)?;
        info!("🏖 {} marked {} as off day", sender.user_id, today);
        Ok(text("🏖 Today has been marked as off day."))
    }

    fn overtime(&self, sender: &Sender, today: NaiveDate, now: DateTime<Utc>) -> BotResult<Vec<Reply>> {
        self.register(sender, now)?;
        match self.db.open_ot(sender.user_id)? {
            None => {
                self.db.start_ot(sender.user_id, today, now)?;
                info!("🕒 {} started OT", sender.user_id);
                Ok(text("🕒 OT Started!\nUse /ot again to end your OT session."))
            }
            Some(session) => {
                if now < session.started_at {
                    return Err(BotError::Rejected("OT end time is before its start.".to_string()));
                }
                self.db.finish_ot(session.id, now)?;
                let duration = now - session.started_at;
                info!("✅ {} finished OT ({})", sender.user_id, attendance::format_duration(duration));
                Ok(text(format!(
                    "✅ OT Completed!\nDuration: {}\nStart: {}\nEnd: {}",
                    attendance::format_duration(duration),
                    self.local_datetime(session.started_at),
                    self.local_datetime(now)
                )))
            }
        }
    }

    fn claim(
        &self,
        sender: &Sender,
        args: &str,
        receipt: Option<String>,
        today: NaiveDate,
        now: DateTime<Utc>,
        usage: &'static str,
    ) -> BotResult<Vec<Reply>> {
        let (kind, rest) = next_word(args);
        let (amount, rest) = next_word(rest);
        if kind.is_empty() || amount.is_empty() {
            return Err(BotError::Usage(usage));
        }
        let amount = Money::parse_positive(amount)?;
        let description = Some(rest.trim()).filter(|s| !s.is_empty()).map(str::to_string);

        let driver = self.register(sender, now)?;
        let claim = self.db.insert_claim(&NewClaim {
            user_id: sender.user_id,
            kind: kind.to_lowercase(),
            amount,
            description,
            receipt_file_id: receipt,
            claim_date: today,
            created_at: now,
        })?;

        let mut msg = format!(
            "✅ Claim #{} submitted: {} {}\nStatus: pending approval",
            claim.id,
            claim.kind,
            self.money(claim.amount)
        );
        if claim.receipt_file_id.is_some() {
            msg.push_str("\n📎 Receipt attached");
        }

        let mut replies = text(msg);
        let mut admins: Vec<i64> = self.config.admin_ids.iter().copied().collect();
        admins.sort_unstable();
        for admin in admins {
            replies.push(Reply::Notify {
                chat_id: admin,
                text: format!(
                    "💸 New claim #{} from {} ({}): {} {}\n/approve {} or /deny {}",
                    claim.id,
                    driver.display_name(),
                    driver.user_id,
                    claim.kind,
                    self.money(claim.amount),
                    claim.id,
                    claim.id
                ),
            });
        }
        Ok(replies)
    }

    fn my_claims(&self, sender: &Sender, now: DateTime<Utc>) -> BotResult<Vec<Reply>> {
        self.register(sender, now)?;
        let claims = self.db.claims(&ClaimFilter {
            user_id: Some(sender.user_id),
            status: None,
            limit: Some(10),
        })?;
        if claims.is_empty() {
            return Ok(text("You have no claims yet."));
        }
        let lines: Vec<String> = claims.iter().map(|c| self.claim_line(c, None)).collect();
        Ok(long_text(&format!("🧾 Your recent claims:\n\n{}", lines.join("\n"))))
    }

    // ==================== ADMIN COMMANDS ====================

    fn balance(&self, args: &str, usage: &'static str) -> BotResult<Vec<Reply>> {
        let args = split_args(args);
        match args.as_slice() {
            [] => {
                let drivers = self.db.drivers()?;
                if drivers.is_empty() {
                    return Ok(text("No drivers registered yet."));
                }
                let lines: Vec<String> = drivers
                    .iter()
                    .map(|d| format!("• {} ({}): {}", d.display_name(), d.user_id, self.money(d.balance)))
                    .collect();
                Ok(long_text(&format!("💳 Balances:\n{}", lines.join("\n"))))
            }
            [id] => {
                let id = parse_id(id).ok_or(BotError::Usage(usage))?;
                let driver = self.require_driver(id)?;
                let pending = self.db.claims(&ClaimFilter {
                    user_id: Some(id),
                    status: Some(ClaimStatus::Pending),
                    limit: None,
                })?;
                let mut msg = format!(
                    "💳 Balance for {} ({}): {}",
                    driver.display_name(),
                    driver.user_id,
                    self.money(driver.balance)
                );
                if !pending.is_empty() {
                    let total: Money = pending.iter().map(|c| c.amount).sum();
                    msg.push_str(&format!(
                        "\n⏳ {} pending claim(s): {}",
                        pending.len(),
                        self.money(total)
                    ));
                }
                Ok(text(msg))
            }
            _ => Err(BotError::Usage(usage)),
        }
    }

    fn check(&self, args: &str, today: NaiveDate) -> BotResult<Vec<Reply>> {
        let date = match args.trim() {
            "" => today,
            s => report::parse_date(s)
                .ok_or_else(|| BotError::InvalidArgument(format!("'{s}' is not a date (YYYY-MM-DD)")))?,
        };

        let drivers = self.db.drivers()?;
        if drivers.is_empty() {
            return Ok(text("No drivers registered yet."));
        }
        let events = self.db.events_on_date(date)?;

        let mut lines = vec![format!("📊 Attendance for {date}\n")];
        for driver in &drivers {
            let own: Vec<_> = events.iter().filter(|e| e.user_id == driver.user_id).cloned().collect();
            let name = driver.display_name();
            match attendance::day_status(&own) {
                DayStatus::Worked { clock_in, clock_out, duration } => lines.push(format!(
                    "✅ {}: {} → {} ({})",
                    name,
                    self.local_time(clock_in),
                    self.local_time(clock_out),
                    attendance::format_duration(duration)
                )),
                DayStatus::Incomplete { clock_in } => lines.push(format!(
                    "🕑 {}: in {} (no clock-out)",
                    name,
                    self.local_time(clock_in)
                )),
                DayStatus::Off => lines.push(format!("🏖 {name}: off day")),
                DayStatus::Absent => {}
            }
        }

        // Only drivers registered by that date are expected; admins never are
        let expected = drivers
            .iter()
            .filter(|d| !self.is_admin(d.user_id))
            .filter(|d| d.created_at.with_timezone(&self.config.timezone).date_naive() <= date)
            .map(|d| d.user_id);
        let missing = attendance::missing_attendance(expected, &events);
        if missing.is_empty() {
            lines.push("\n👍 Everyone is accounted for.".to_string());
        } else {
            let by_id: HashMap<i64, &Driver> = drivers.iter().map(|d| (d.user_id, d)).collect();
            lines.push(format!("\n❌ Missing ({}):", missing.len()));
            for id in missing {
                let name = by_id.get(&id).map(|d| d.display_name()).unwrap_or_default();
                lines.push(format!("• {name} ({id})"));
            }
        }
        Ok(long_text(&lines.join("\n")))
    }

    fn pdf(&self, args: &str, today: NaiveDate, now: DateTime<Utc>) -> BotResult<Vec<Reply>> {
        let (scope, range) = report::parse_report_args(&split_args(args), today)?;
        if let ReportScope::Driver(id) = scope {
            self.require_driver(id)?;
        }

        let report = Report::collect(&self.db, scope, range)?;
        if report.is_empty() {
            return Ok(text(format!("📭 No records found for {}.", range.label())));
        }

        let bytes = report.render_pdf(self.config.timezone, &self.config.currency, now);
        info!("🧾 Generated report {} ({} bytes)", report.file_name(), bytes.len());
        Ok(vec![Reply::Document {
            file_name: report.file_name(),
            bytes,
            caption: format!("🧾 Report {}", range.label()),
        }])
    }

    fn top_up(
        &self,
        sender: &Sender,
        args: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
        usage: &'static str,
    ) -> BotResult<Vec<Reply>> {
        let (id, rest) = next_word(args);
        let (amount, note) = next_word(rest);
        let id = parse_id(id).ok_or(BotError::Usage(usage))?;
        if amount.is_empty() {
            return Err(BotError::Usage(usage));
        }
        let amount = Money::parse_positive(amount)?;
        let note = Some(note.trim()).filter(|s| !s.is_empty());

        let (_, new_balance) = self
            .db
            .record_topup(id, amount, note, sender.user_id, today, now)?
            .ok_or(BotError::DriverNotFound(id))?;
        let driver = self.require_driver(id)?;

        Ok(vec![
            Reply::Text(format!(
                "💰 Topped up {} for {} ({})\nPrevious balance: {}\nNew balance: {}",
                self.money(amount),
                driver.display_name(),
                driver.user_id,
                self.money(new_balance - amount),
                self.money(new_balance)
            )),
            Reply::Notify {
                chat_id: driver.chat_id,
                text: format!(
                    "💰 Your balance was topped up by {}.\nNew balance: {}",
                    self.money(amount),
                    self.money(new_balance)
                ),
            },
        ])
    }

    fn view_claims(&self, args: &str) -> BotResult<Vec<Reply>> {
        let arg = args.trim().to_lowercase();
        let (filter, label) = match arg.as_str() {
            "" | "pending" => (
                ClaimFilter { status: Some(ClaimStatus::Pending), ..Default::default() },
                "pending".to_string(),
            ),
            "all" => (ClaimFilter::default(), "recent".to_string()),
            other => {
                let id = parse_id(other).ok_or_else(|| {
                    BotError::InvalidArgument(format!("'{other}' is not 'pending', 'all' or a driver id"))
                })?;
                let driver = self.require_driver(id)?;
                (
                    ClaimFilter { user_id: Some(id), ..Default::default() },
                    format!("{}'s", driver.display_name()),
                )
            }
        };

        let claims = self.db.claims(&ClaimFilter { limit: Some(MAX_LISTED_CLAIMS), ..filter })?;
        if claims.is_empty() {
            return Ok(text(format!("📭 No {label} claims.")));
        }

        let drivers: HashMap<i64, Driver> =
            self.db.drivers()?.into_iter().map(|d| (d.user_id, d)).collect();
        let lines: Vec<String> = claims
            .iter()
            .map(|c| self.claim_line(c, drivers.get(&c.user_id)))
            .collect();

        let mut replies: Vec<Reply> = report::split_message(
            &format!("📷 {} {} claim(s):\n\n{}", claims.len(), label, lines.join("\n")),
            MESSAGE_LIMIT,
        )
        .into_iter()
        .map(Reply::Text)
        .collect();

        for claim in claims.iter().filter(|c| c.receipt_file_id.is_some()).take(MAX_RECEIPTS) {
            if let Some(file_id) = &claim.receipt_file_id {
                let owner = drivers.get(&claim.user_id).map(|d| d.display_name()).unwrap_or_default();
                replies.push(Reply::Receipt {
                    file_id: file_id.clone(),
                    caption: format!(
                        "Claim #{}: {} {} ({}, {})",
                        claim.id,
                        claim.kind,
                        self.money(claim.amount),
                        owner,
                        claim.status.as_str()
                    ),
                });
            }
        }
        Ok(replies)
    }

    fn review(
        &self,
        sender: &Sender,
        args: &str,
        decision: ClaimStatus,
        now: DateTime<Utc>,
        usage: &'static str,
    ) -> BotResult<Vec<Reply>> {
        let (id, reason) = next_word(args);
        let id = parse_id(id).ok_or(BotError::Usage(usage))?;
        let reason = Some(reason.trim()).filter(|s| !s.is_empty());

        let (claim, new_balance) = match self.db.review_claim(id, decision, sender.user_id, now)? {
            ReviewOutcome::NotFound => return Err(BotError::ClaimNotFound(id)),
            ReviewOutcome::AlreadyReviewed(claim) => {
                return Err(BotError::Rejected(format!(
                    "Claim #{} is already {}.",
                    claim.id,
                    claim.status.as_str()
                )));
            }
            ReviewOutcome::Reviewed { claim, new_balance } => (claim, new_balance),
        };
        let driver = self.require_driver(claim.user_id)?;
        let what = format!("#{} ({} {})", claim.id, claim.kind, self.money(claim.amount));

        let (admin_text, driver_text) = if decision == ClaimStatus::Approved {
            (
                format!(
                    "✅ Claim {} approved for {}.\nNew balance: {}",
                    what,
                    driver.display_name(),
                    self.money(new_balance)
                ),
                format!("✅ Your claim {what} was approved. It will be paid with your next salary."),
            )
        } else {
            let mut driver_text = format!("❌ Your claim {what} was denied.");
            if let Some(reason) = reason {
                driver_text.push_str(&format!("\nReason: {reason}"));
            }
            (format!("🚫 Claim {} denied for {}.", what, driver.display_name()), driver_text)
        };

        Ok(vec![
            Reply::Text(admin_text),
            Reply::Notify { chat_id: driver.chat_id, text: driver_text },
        ])
    }

    fn salary(&self, args: &str, usage: &'static str) -> BotResult<Vec<Reply>> {
        match split_args(args).as_slice() {
            [] => {
                let drivers = self.db.drivers()?;
                if drivers.is_empty() {
                    return Ok(text("No drivers registered yet."));
                }
                let lines: Vec<String> = drivers
                    .iter()
                    .map(|d| {
                        format!(
                            "• {} ({}): {} / month",
                            d.display_name(),
                            d.user_id,
                            self.money(d.monthly_salary)
                        )
                    })
                    .collect();
                Ok(long_text(&format!(
                    "💼 Monthly salaries ({} work days per month):\n{}",
                    self.config.workdays_per_month,
                    lines.join("\n")
                )))
            }
            [id, amount] => {
                let id = parse_id(id).ok_or(BotError::Usage(usage))?;
                let amount: Money = amount.parse()?;
                if !self.db.set_salary(id, amount)? {
                    return Err(BotError::DriverNotFound(id));
                }
                let driver = self.require_driver(id)?;
                info!("💼 Salary for {} set to {}", id, amount);
                Ok(text(format!(
                    "💼 Monthly salary for {} ({}) set to {}.",
                    driver.display_name(),
                    driver.user_id,
                    self.money(amount)
                )))
            }
            _ => Err(BotError::Usage(usage)),
        }
    }

    fn paid(
        &self,
        sender: &Sender,
        args: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
        usage: &'static str,
    ) -> BotResult<Vec<Reply>> {
        let (id, confirm) = match split_args(args).as_slice() {
            [id] => (*id, false),
            [id, flag] if flag.eq_ignore_ascii_case("confirm") => (*id, true),
            _ => return Err(BotError::Usage(usage)),
        };
        let id = parse_id(id).ok_or(BotError::Usage(usage))?;
        let driver = self.require_driver(id)?;
        let settlement = ledger::settlement(&self.db, &driver, today, self.config.workdays_per_month)?;
        let currency = &self.config.currency;

        if !confirm {
            return Ok(text(format!(
                "🧮 Payment preview\n\n{}\n\nSend /paid {} confirm to record this payment.",
                settlement.describe(currency),
                id
            )));
        }

        if settlement.total() == Money::ZERO && settlement.attendance.work_days == 0 {
            return Err(BotError::Rejected(format!(
                "Nothing to pay for {} since the last payment.",
                driver.display_name()
            )));
        }

        let payment = match self.db.record_payment(&settlement.to_payment(sender.user_id, now))? {
            PaymentOutcome::Recorded(payment) => payment,
            PaymentOutcome::Stale => {
                return Err(BotError::Rejected(format!(
                    "Payments or balance for {} changed while settling. Send /paid {} to review again.",
                    driver.display_name(),
                    id
                )));
            }
        };
        Ok(vec![
            Reply::Text(format!(
                "🟢 Payment recorded for {} ({})\n\n{}",
                driver.display_name(),
                driver.user_id,
                settlement.describe(currency)
            )),
            Reply::Notify {
                chat_id: driver.chat_id,
                text: format!(
                    "🟢 You have been paid {} for {} to {}.\nSalary: {}\nClaims and top-ups: {}",
                    self.money(payment.total_amount),
                    payment.period_start,
                    payment.period_end,
                    self.money(payment.salary_amount),
                    self.money(payment.balance_amount)
                ),
            },
        ])
    }

    fn list_drivers(&self) -> BotResult<Vec<Reply>> {
        let drivers = self.db.drivers()?;
        if drivers.is_empty() {
            return Ok(text("No drivers registered yet."));
        }
        let lines: Vec<String> = drivers
            .iter()
            .map(|d| {
                let username = d.username.as_deref().map(|u| format!(" @{u}")).unwrap_or_default();
                format!(
                    "• {}{} ({})\n    salary {} / month, balance {}",
                    d.display_name(),
                    username,
                    d.user_id,
                    self.money(d.monthly_salary),
                    self.money(d.balance)
                )
            })
            .collect();
        Ok(long_text(&format!("👥 Drivers ({}):\n{}", drivers.len(), lines.join("\n"))))
    }

    fn monthly_report(&self, args: &str, today: NaiveDate) -> BotResult<Vec<Reply>> {
        let range = match args.trim() {
            "" => DateRange::month(today.year(), today.month()),
            s => Some(report::parse_month(s).ok_or_else(|| {
                BotError::InvalidArgument(format!("'{s}' is not a month (YYYY-MM)"))
            })?),
        }
        .ok_or_else(|| BotError::InvalidArgument("invalid month".to_string()))?;

        let report = Report::collect(&self.db, ReportScope::All, range)?;
        if report.is_empty() {
            return Ok(text(format!(
                "No work records found for {}.",
                range.from.format("%B %Y")
            )));
        }
        Ok(long_text(&report.summary_text(&self.config.currency)))
    }
}

fn text(s: impl Into<String>) -> Vec<Reply> {
    vec![Reply::Text(s.into())]
}

/// Text split into messages that fit Telegram's limit.
fn long_text(s: &str) -> Vec<Reply> {
    report::split_message(s, MESSAGE_LIMIT)
        .into_iter()
        .map(Reply::Text)
        .collect()
}
