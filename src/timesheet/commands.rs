//! Chat command grammar.

use teloxide::utils::command::{BotCommands, ParseError};

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    /// Deep links arrive as `/start <payload>`; the payload is ignored.
    #[command(description = "register and show the menu")]
    Start(String),
    #[command(description = "show this help")]
    Help,
    #[command(description = "🕑 clock in for today")]
    ClockIn,
    #[command(description = "🏁 clock out")]
    ClockOut,
    #[command(description = "📅 mark today as an off day")]
    OffDay,
    #[command(description = "⏰ start or stop overtime")]
    Ot,
    #[command(description = "💸 submit a claim: /claim <type> <amount> [description] (attach a receipt photo)")]
    Claim(String),
    #[command(description = "list your recent claims")]
    MyClaims,
    #[command(description = "🔐 balance: /balance [driver_id]")]
    Balance(String),
    #[command(description = "🔐 attendance for a day: /check [YYYY-MM-DD]")]
    Check(String),
    #[command(description = "🔐 PDF report: /pdf [all|driver_id] [YYYY-MM | YYYY-MM-DD YYYY-MM-DD]")]
    Pdf(String),
    #[command(description = "🔐 credit a balance: /topup <driver_id> <amount> [note]")]
    TopUp(String),
    #[command(description = "🔐 list claims: /viewclaims [pending|all|driver_id]")]
    ViewClaims(String),
    #[command(description = "🔐 approve a claim: /approve <claim_id>")]
    Approve(String),
    #[command(description = "🔐 deny a claim: /deny <claim_id> [reason]")]
    Deny(String),
    #[command(description = "🔐 salaries: /salary [<driver_id> <monthly_amount>]")]
    Salary(String),
    #[command(description = "🔐 settle a driver: /paid <driver_id> [confirm]")]
    Paid(String),
    #[command(description = "🔐 list registered drivers")]
    Drivers,
    #[command(description = "🔐 monthly summary: /report [YYYY-MM]")]
    Report(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start(_) => "start",
            Command::Help => "help",
            Command::ClockIn => "clockin",
            Command::ClockOut => "clockout",
            Command::OffDay => "offday",
            Command::Ot => "ot",
            Command::Claim(_) => "claim",
            Command::MyClaims => "myclaims",
            Command::Balance(_) => "balance",
            Command::Check(_) => "check",
            Command::Pdf(_) => "pdf",
            Command::TopUp(_) => "topup",
            Command::ViewClaims(_) => "viewclaims",
            Command::Approve(_) => "approve",
            Command::Deny(_) => "deny",
            Command::Salary(_) => "salary",
            Command::Paid(_) => "paid",
            Command::Drivers => "drivers",
            Command::Report(_) => "report",
        }
    }

    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Command::Balance(_)
                | Command::Check(_)
                | Command::Pdf(_)
                | Command::TopUp(_)
                | Command::ViewClaims(_)
                | Command::Approve(_)
                | Command::Deny(_)
                | Command::Salary(_)
                | Command::Paid(_)
                | Command::Drivers
                | Command::Report(_)
        )
    }

    pub fn usage(&self) -> &'static str {
        match self {
            Command::Claim(_) => "/claim <type> <amount> [description]",
            Command::Balance(_) => "/balance [driver_id]",
            Command::Check(_) => "/check [YYYY-MM-DD]",
            Command::Pdf(_) => "/pdf [all|driver_id] [YYYY-MM | YYYY-MM-DD YYYY-MM-DD]",
            Command::TopUp(_) => "/topup <driver_id> <amount> [note]",
            Command::ViewClaims(_) => "/viewclaims [pending|all|driver_id]",
            Command::Approve(_) => "/approve <claim_id>",
            Command::Deny(_) => "/deny <claim_id> [reason]",
            Command::Salary(_) => "/salary [<driver_id> <monthly_amount>]",
            Command::Paid(_) => "/paid <driver_id> [confirm]",
            Command::Report(_) => "/report [YYYY-MM]",
            _ => "",
        }
    }
}

/// Parse a message text as a command.
///
/// The command word is case-insensitive. Returns `None` for plain text and
/// for commands addressed to another bot (`/cmd@otherbot`).
pub fn parse_command(text: &str, bot_username: &str) -> Option<Result<Command, ParseError>> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let (word, rest) = match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim()),
        None => (text, ""),
    };
    let name = match word.split_once('@') {
        Some((name, mention)) => {
            if !mention.eq_ignore_ascii_case(bot_username) {
                return None;
            }
            name
        }
        None => word,
    };

    let normalized = if rest.is_empty() {
        name.to_lowercase()
    } else {
        format!("{} {}", name.to_lowercase(), rest)
    };
    Some(Command::parse(&normalized, bot_username))
}

pub fn split_args(args: &str) -> Vec<&str> {
    args.split_whitespace().collect()
}

/// Split off the first word; the remainder is left-trimmed.
pub fn next_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Parse a numeric id argument (driver or claim).
pub fn parse_id(arg: &str) -> Option<i64> {
    arg.trim().trim_start_matches('#').parse::<i64>().ok().filter(|id| *id > 0)
}
