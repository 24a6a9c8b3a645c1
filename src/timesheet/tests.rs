//! Command scenarios driven through the engine against an in-memory database.
//!
//! Run with: cargo test timesheet

use super::*;
use crate::timesheet::attendance::ClockKind;
use crate::timesheet::database::{ClaimFilter, ClaimStatus, PaymentOutcome};
use crate::timesheet::engine::Reply;
use crate::timesheet::money::Money;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Kuala_Lumpur;

const ADMIN: i64 = 1;
const ALI: i64 = 100;
const BADRUL: i64 = 200;
const CHONG: i64 = 300;

fn engine() -> TimesheetEngine {
    let config = TimesheetConfig {
        admin_ids: [ADMIN].into_iter().collect(),
        timezone: Kuala_Lumpur,
        currency: "RM".to_string(),
        workdays_per_month: 26,
    };
    TimesheetEngine::new(config, Database::in_memory().unwrap())
}

fn sender(user_id: i64, name: &str) -> Sender {
    Sender {
        user_id,
        chat_id: user_id,
        username: Some(name.to_lowercase()),
        first_name: name.to_string(),
    }
}

fn admin() -> Sender {
    sender(ADMIN, "Boss")
}

/// Local Kuala Lumpur wall-clock time in October 2026.
fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Kuala_Lumpur
        .with_ymd_and_hms(2026, 10, day, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
}

fn run(engine: &TimesheetEngine, from: &Sender, text: &str, now: DateTime<Utc>) -> Vec<Reply> {
    run_with_receipt(engine, from, text, None, now)
}

fn run_with_receipt(
    engine: &TimesheetEngine,
    from: &Sender,
    text: &str,
    receipt: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<Reply> {
    let command = parse_command(text, "clock_bot")
        .expect("text is a command")
        .expect("command parses");
    engine.handle(from, command, receipt.map(str::to_string), now)
}

/// Concatenated text replies to the sender's chat.
fn texts(replies: &[Reply]) -> String {
    replies
        .iter()
        .filter_map(|r| match r {
            Reply::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn notifications(replies: &[Reply]) -> Vec<(i64, String)> {
    replies
        .iter()
        .filter_map(|r| match r {
            Reply::Notify { chat_id, text } => Some((*chat_id, text.clone())),
            _ => None,
        })
        .collect()
}

// =============================================================================
// CLOCK IN / CLOCK OUT
// =============================================================================

mod clocking {
    use super::*;

    #[test]
    fn test_clock_out_reports_literal_difference() {
        let engine = engine();
        let ali = sender(ALI, "Ali");

        let reply = texts(&run(&engine, &ali, "/clockin", at(16, 9, 3)));
        assert!(reply.contains("Clocked in at 2026-10-16 09:03"), "{reply}");

        let reply = texts(&run(&engine, &ali, "/clockout", at(16, 17, 41)));
        assert!(reply.contains("Worked 8h 38m"), "{reply}");

        let events = engine.db().events_on(ALI, date(16)).unwrap();
        let status = attendance::day_status(&events);
        assert_eq!(status.worked(), Some(at(16, 17, 41) - at(16, 9, 3)));
        assert!(status.worked().unwrap() > chrono::TimeDelta::zero());
    }

    #[test]
    fn test_command_registers_driver() {
        let engine = engine();
        assert!(engine.db().driver(ALI).unwrap().is_none());
        run(&engine, &sender(ALI, "Ali"), "/clockin", at(16, 9, 0));
        let driver = engine.db().driver(ALI).unwrap().unwrap();
        assert_eq!(driver.first_name, "Ali");
        assert_eq!(driver.balance, Money::ZERO);
    }

    #[test]
    fn test_second_clock_in_is_rejected() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(16, 9, 0));
        let reply = texts(&run(&engine, &ali, "/CLOCKIN", at(16, 10, 0)));
        assert!(reply.contains("already clocked in today at 09:00"), "{reply}");
        assert_eq!(engine.db().events_on(ALI, date(16)).unwrap().len(), 1);
    }

    #[test]
    fn test_clock_out_without_clock_in() {
        let engine = engine();
        let reply = texts(&run(&engine, &sender(ALI, "Ali"), "/clockout", at(16, 18, 0)));
        assert!(reply.contains("haven't clocked in today"), "{reply}");
    }

    #[test]
    fn test_double_clock_out_is_rejected() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(16, 9, 0));
        run(&engine, &ali, "/clockout", at(16, 17, 0));
        let reply = texts(&run(&engine, &ali, "/clockout", at(16, 18, 0)));
        assert!(reply.contains("already clocked out today at 17:00"), "{reply}");
    }

    #[test]
    fn test_overnight_shift_keeps_clock_in_date() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(16, 22, 0));
        let reply = texts(&run(&engine, &ali, "/clockout", at(17, 6, 30)));
        assert!(reply.contains("Worked 8h 30m"), "{reply}");

        let events = engine.db().events_on(ALI, date(16)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(engine.db().events_on(ALI, date(17)).unwrap().is_empty());
    }

    #[test]
    fn test_stale_open_shift_is_not_closed() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(10, 9, 0));
        let reply = texts(&run(&engine, &ali, "/clockout", at(16, 17, 0)));
        assert!(reply.contains("haven't clocked in today"), "{reply}");
    }

    #[test]
    fn test_off_day_conflicts_with_clock_records() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(16, 9, 0));
        let reply = texts(&run(&engine, &ali, "/offday", at(16, 10, 0)));
        assert!(reply.contains("Cannot mark as off day"), "{reply}");

        let badrul = sender(BADRUL, "Badrul");
        let reply = texts(&run(&engine, &badrul, "/offday", at(16, 8, 0)));
        assert_eq!(reply, "🏖 Today has been marked as off day.");
        let reply = texts(&run(&engine, &badrul, "/clockin", at(16, 9, 0)));
        assert!(reply.contains("off day"), "{reply}");
        let reply = texts(&run(&engine, &badrul, "/offday", at(16, 9, 5)));
        assert!(reply.contains("already marked"), "{reply}");
        assert_eq!(engine.db().events_on(BADRUL, date(16)).unwrap().len(), 1);
    }

    #[test]
    fn test_overtime_toggles() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        let reply = texts(&run(&engine, &ali, "/OT", at(16, 18, 0)));
        assert!(reply.contains("OT Started"), "{reply}");
        let reply = texts(&run(&engine, &ali, "/ot", at(16, 20, 15)));
        assert!(reply.contains("OT Completed"), "{reply}");
        assert!(reply.contains("Duration: 2h 15m"), "{reply}");

        let sessions = engine.db().ot_between(Some(ALI), date(16), date(16)).unwrap();
        assert_eq!(attendance::total_ot(&sessions), chrono::TimeDelta::minutes(135));
        assert!(engine.db().open_ot(ALI).unwrap().is_none());
    }
}

// =============================================================================
// MISSING ATTENDANCE
// =============================================================================

mod missing_attendance {
    use super::*;

    #[test]
    fn test_off_day_is_not_missing() {
        let engine = engine();
        run(&engine, &sender(ALI, "Ali"), "/clockin", at(16, 9, 0));
        run(&engine, &sender(BADRUL, "Badrul"), "/offday", at(16, 8, 0));
        run(&engine, &sender(CHONG, "Chong"), "/start", at(15, 8, 0));

        let reply = texts(&run(&engine, &admin(), "/check", at(16, 12, 0)));
        assert!(reply.contains("Attendance for 2026-10-16"), "{reply}");
        assert!(reply.contains("🕑 Ali: in 09:00"), "{reply}");
        assert!(reply.contains("🏖 Badrul: off day"), "{reply}");
        assert!(reply.contains("Missing (1)"), "{reply}");
        assert!(reply.contains("Chong (300)"), "{reply}");
        assert!(!reply.contains("Badrul (200)"), "{reply}");

        let events = engine.db().events_on_date(date(16)).unwrap();
        assert_eq!(attendance::missing_attendance([ALI, BADRUL, CHONG], &events), vec![CHONG]);
    }

    #[test]
    fn test_check_other_date() {
        let engine = engine();
        run(&engine, &sender(ALI, "Ali"), "/clockin", at(15, 9, 0));
        run(&engine, &sender(ALI, "Ali"), "/clockout", at(15, 18, 0));

        let reply = texts(&run(&engine, &admin(), "/check 2026-10-15", at(16, 12, 0)));
        assert!(reply.contains("✅ Ali: 09:00 → 18:00 (9h 0m)"), "{reply}");
        assert!(reply.contains("Everyone is accounted for"), "{reply}");

        let reply = texts(&run(&engine, &admin(), "/check yesterday", at(16, 12, 0)));
        assert!(reply.contains("not a date"), "{reply}");
    }

    #[test]
    fn test_check_skips_later_drivers_and_admins() {
        let engine = engine();
        run(&engine, &sender(ALI, "Ali"), "/start", at(10, 8, 0));
        run(&engine, &sender(BADRUL, "Badrul"), "/start", at(16, 8, 0));
        // Admins who clock in get a driver row too
        run(&engine, &admin(), "/clockin", at(12, 9, 0));

        let reply = texts(&run(&engine, &admin(), "/check 2026-10-14", at(16, 12, 0)));
        assert!(reply.contains("Missing (1)"), "{reply}");
        assert!(reply.contains("Ali (100)"), "{reply}");
        assert!(!reply.contains("Badrul (200)"), "{reply}");
        assert!(!reply.contains("Boss (1)"), "{reply}");
    }
}

// =============================================================================
// CLAIMS
// =============================================================================

mod claims {
    use super::*;

    #[test]
    fn test_claim_creates_one_pending_record() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        let replies = run(&engine, &ali, "/claim Petrol 45.50 Shell Bangsar", at(16, 12, 0));
        assert!(texts(&replies).contains("Claim #1 submitted: petrol RM 45.50"));
        assert_eq!(notifications(&replies), vec![(
            ADMIN,
            "💸 New claim #1 from Ali (100): petrol RM 45.50\n/approve 1 or /deny 1".to_string()
        )]);

        let pending = engine
            .db()
            .claims(&ClaimFilter { status: Some(ClaimStatus::Pending), ..Default::default() })
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount, Money::from_cents(4550));
        assert_eq!(pending[0].description.as_deref(), Some("Shell Bangsar"));

        let listing = texts(&run(&engine, &admin(), "/viewclaims", at(16, 13, 0)));
        assert!(listing.contains("1 pending claim(s)"), "{listing}");
        assert!(listing.contains("#1 · 2026-10-16 · petrol RM 45.50 · Ali (100) · pending"), "{listing}");
    }

    #[test]
    fn test_invalid_claims_store_nothing() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        for text in ["/claim", "/claim petrol", "/claim petrol abc", "/claim petrol 0", "/claim petrol 1.234"] {
            let reply = texts(&run(&engine, &ali, text, at(16, 12, 0)));
            assert!(reply.starts_with("❌"), "{text}: {reply}");
        }
        assert!(engine.db().claims(&ClaimFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_receipt_is_stored_and_resent() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        let replies = run_with_receipt(&engine, &ali, "/claim toll 7.20", Some("AgADreceipt"), at(16, 12, 0));
        assert!(texts(&replies).contains("Receipt attached"));

        let replies = run(&engine, &admin(), "/viewclaims all", at(16, 13, 0));
        let receipts: Vec<&Reply> = replies.iter().filter(|r| matches!(r, Reply::Receipt { .. })).collect();
        assert_eq!(receipts.len(), 1);
        assert!(matches!(receipts[0], Reply::Receipt { file_id, .. } if file_id == "AgADreceipt"));
    }

    #[test]
    fn test_approve_credits_balance_once() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/claim petrol 45.50", at(16, 12, 0));

        let replies = run(&engine, &admin(), "/approve 1", at(16, 14, 0));
        assert!(texts(&replies).contains("New balance: RM 45.50"));
        let notes = notifications(&replies);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, ALI);
        assert!(notes[0].1.contains("was approved"));

        let reply = texts(&run(&engine, &admin(), "/approve 1", at(16, 14, 5)));
        assert!(reply.contains("already approved"), "{reply}");
        assert_eq!(engine.db().driver(ALI).unwrap().unwrap().balance, Money::from_cents(4550));
    }

    #[test]
    fn test_deny_leaves_balance() {
        let engine = engine();
        run(&engine, &sender(ALI, "Ali"), "/claim parking 12", at(16, 12, 0));

        let replies = run(&engine, &admin(), "/deny 1 no receipt", at(16, 14, 0));
        let notes = notifications(&replies);
        assert!(notes[0].1.contains("was denied.\nReason: no receipt"), "{:?}", notes);
        assert_eq!(engine.db().driver(ALI).unwrap().unwrap().balance, Money::ZERO);
        assert_eq!(engine.db().claim(1).unwrap().unwrap().status, ClaimStatus::Denied);

        let reply = texts(&run(&engine, &admin(), "/approve 1", at(16, 14, 5)));
        assert!(reply.contains("already denied"), "{reply}");
    }

    #[test]
    fn test_review_unknown_claim() {
        let engine = engine();
        let reply = texts(&run(&engine, &admin(), "/approve 42", at(16, 14, 0)));
        assert_eq!(reply, "❌ Claim #42 not found.");
        let reply = texts(&run(&engine, &admin(), "/approve", at(16, 14, 0)));
        assert_eq!(reply, "❌ Usage: /approve <claim_id>");
    }

    #[test]
    fn test_my_claims_lists_own_only() {
        let engine = engine();
        run(&engine, &sender(ALI, "Ali"), "/claim petrol 10", at(16, 12, 0));
        run(&engine, &sender(BADRUL, "Badrul"), "/claim toll 5", at(16, 12, 5));

        let reply = texts(&run(&engine, &sender(ALI, "Ali"), "/myclaims", at(16, 13, 0)));
        assert!(reply.contains("petrol RM 10.00"), "{reply}");
        assert!(!reply.contains("toll"), "{reply}");
    }
}

// =============================================================================
// AUTHORIZATION
// =============================================================================

mod authorization {
    use super::*;

    const ADMIN_COMMANDS: [&str; 12] = [
        "/balance",
        "/check",
        "/pdf all",
        "/topup 100 50",
        "/viewclaims",
        "/approve 1",
        "/deny 1",
        "/salary 100 3000",
        "/paid 100 confirm",
        "/drivers",
        "/report",
        "/Topup 100 50",
    ];

    #[test]
    fn test_non_admin_is_rejected_without_state_change() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/claim petrol 20", at(16, 12, 0));
        let before = engine.db().driver(ALI).unwrap().unwrap();

        let stranger = sender(999, "Stranger");
        for text in ADMIN_COMMANDS {
            let reply = texts(&run(&engine, &stranger, text, at(16, 13, 0)));
            assert!(reply.contains("only available for administrators"), "{text}: {reply}");
        }

        assert!(engine.db().driver(999).unwrap().is_none());
        assert_eq!(engine.db().driver(ALI).unwrap().unwrap(), before);
        assert_eq!(engine.db().claim(1).unwrap().unwrap().status, ClaimStatus::Pending);
        assert!(engine.db().topups_between(None, date(1), date(31)).unwrap().is_empty());
        assert!(engine.db().last_payment(ALI).unwrap().is_none());
    }

    #[test]
    fn test_driver_cannot_top_up_self() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/start", at(16, 8, 0));
        let reply = texts(&run(&engine, &ali, "/topup 100 1000", at(16, 9, 0)));
        assert!(reply.starts_with("⛔"), "{reply}");
        assert_eq!(engine.db().driver(ALI).unwrap().unwrap().balance, Money::ZERO);
    }

    #[test]
    fn test_start_shows_admin_menu_only_to_admins() {
        let engine = engine();
        let reply = texts(&run(&engine, &sender(ALI, "Ali"), "/start", at(16, 8, 0)));
        assert!(reply.contains("Hello Ali"));
        assert!(!reply.contains("Admin Commands"));

        let reply = texts(&run(&engine, &admin(), "/start", at(16, 8, 0)));
        assert!(reply.contains("Admin Commands"));
        assert!(engine.db().driver(ADMIN).unwrap().is_none());
    }
}

// =============================================================================
// BALANCE LEDGER
// =============================================================================

mod ledger {
    use super::*;

    #[test]
    fn test_top_up_adds_exactly() {
        let engine = engine();
        run(&engine, &sender(ALI, "Ali"), "/start", at(16, 8, 0));
        run(&engine, &admin(), "/topup 100 10", at(16, 9, 0));

        let prior = engine.db().driver(ALI).unwrap().unwrap().balance;
        assert_eq!(prior, Money::from_cents(1000));

        let replies = run(&engine, &admin(), "/topup 100 25.50 fuel advance", at(16, 9, 5));
        let reply = texts(&replies);
        assert!(reply.contains("Previous balance: RM 10.00"), "{reply}");
        assert!(reply.contains("New balance: RM 35.50"), "{reply}");
        assert_eq!(notifications(&replies)[0].0, ALI);

        let reply = texts(&run(&engine, &admin(), "/balance 100", at(16, 9, 10)));
        assert_eq!(reply, format!("💳 Balance for Ali (100): RM {}", prior + Money::from_cents(2550)));

        let topups = engine.db().topups_between(Some(ALI), date(16), date(16)).unwrap();
        assert_eq!(topups.len(), 2);
        assert_eq!(topups[1].note.as_deref(), Some("fuel advance"));
    }

    #[test]
    fn test_top_up_unknown_driver() {
        let engine = engine();
        let reply = texts(&run(&engine, &admin(), "/topup 555 10", at(16, 9, 0)));
        assert!(reply.contains("Driver 555 not found"), "{reply}");
        let reply = texts(&run(&engine, &admin(), "/topup 555 -10", at(16, 9, 0)));
        assert!(reply.starts_with("❌"), "{reply}");
    }

    #[test]
    fn test_salary_and_settlement() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        for day in [14, 15] {
            run(&engine, &ali, "/clockin", at(day, 9, 0));
            run(&engine, &ali, "/clockout", at(day, 17, 0));
        }
        run(&engine, &ali, "/claim petrol 30", at(15, 12, 0));
        run(&engine, &admin(), "/approve 1", at(15, 13, 0));
        run(&engine, &admin(), "/topup 100 20", at(15, 14, 0));

        let reply = texts(&run(&engine, &admin(), "/salary 100 2600", at(16, 9, 0)));
        assert!(reply.contains("set to RM 2600.00"), "{reply}");
        let reply = texts(&run(&engine, &admin(), "/salary", at(16, 9, 0)));
        assert!(reply.contains("Ali (100): RM 2600.00 / month"), "{reply}");

        let preview = texts(&run(&engine, &admin(), "/paid 100", at(16, 18, 0)));
        assert!(preview.contains("Work days: 2"), "{preview}");
        assert!(preview.contains("Salary: RM 200.00"), "{preview}");
        assert!(preview.contains("Total: RM 250.00"), "{preview}");
        assert!(preview.contains("/paid 100 confirm"), "{preview}");
        assert!(engine.db().last_payment(ALI).unwrap().is_none());

        let replies = run(&engine, &admin(), "/paid 100 confirm", at(16, 18, 5));
        assert!(texts(&replies).contains("Payment recorded"));
        assert!(notifications(&replies)[0].1.contains("paid RM 250.00"));

        let payment = engine.db().last_payment(ALI).unwrap().unwrap();
        assert_eq!(payment.total_amount, Money::from_cents(25_000));
        assert_eq!(payment.period_start, date(14));
        assert_eq!(payment.period_end, date(16));
        assert_eq!(engine.db().driver(ALI).unwrap().unwrap().balance, Money::ZERO);
        assert_eq!(engine.db().claim(1).unwrap().unwrap().status, ClaimStatus::Paid);

        let reply = texts(&run(&engine, &admin(), "/paid 100 confirm", at(16, 18, 10)));
        assert!(reply.contains("Nothing to pay"), "{reply}");
    }

    #[test]
    fn test_payment_during_open_shift_keeps_that_day() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(14, 9, 0));
        run(&engine, &ali, "/clockout", at(14, 17, 0));
        run(&engine, &admin(), "/salary 100 2600", at(15, 9, 0));
        run(&engine, &ali, "/clockin", at(16, 9, 0));

        let reply = texts(&run(&engine, &admin(), "/paid 100 confirm", at(16, 12, 0)));
        assert!(reply.contains("Payment recorded"), "{reply}");
        assert!(reply.contains("Still on shift since 2026-10-16"), "{reply}");
        let first = engine.db().last_payment(ALI).unwrap().unwrap();
        assert_eq!(first.period_end, date(15));
        assert_eq!(first.salary_amount, Money::from_cents(10_000));

        run(&engine, &ali, "/clockout", at(16, 17, 0));
        let preview = texts(&run(&engine, &admin(), "/paid 100", at(20, 9, 0)));
        assert!(preview.contains("Period: 2026-10-16 → 2026-10-20"), "{preview}");
        assert!(preview.contains("Work days: 1"), "{preview}");
        assert!(preview.contains("Salary: RM 100.00"), "{preview}");
    }

    #[test]
    fn test_payment_during_overnight_shift_keeps_that_day() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(15, 22, 0));
        run(&engine, &admin(), "/salary 100 2600", at(15, 22, 30));

        let reply = texts(&run(&engine, &admin(), "/paid 100 confirm", at(16, 2, 0)));
        assert!(reply.contains("Nothing to pay"), "{reply}");

        run(&engine, &ali, "/clockout", at(16, 6, 0));
        let preview = texts(&run(&engine, &admin(), "/paid 100", at(17, 9, 0)));
        assert!(preview.contains("Period: 2026-10-15 → 2026-10-17"), "{preview}");
        assert!(preview.contains("Work days: 1"), "{preview}");
    }

    #[test]
    fn test_settlement_overtaken_by_another_payment() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(14, 9, 0));
        run(&engine, &ali, "/clockout", at(14, 17, 0));
        run(&engine, &admin(), "/salary 100 2600", at(15, 9, 0));

        let driver = engine.db().driver(ALI).unwrap().unwrap();
        let earlier = crate::timesheet::ledger::settlement(engine.db(), &driver, date(16), 26).unwrap();

        let reply = texts(&run(&engine, &admin(), "/paid 100 confirm", at(16, 18, 0)));
        assert!(reply.contains("Payment recorded"), "{reply}");
        assert_eq!(
            engine.db().record_payment(&earlier.to_payment(ADMIN, at(16, 18, 1))).unwrap(),
            PaymentOutcome::Stale
        );
        let last = engine.db().last_payment(ALI).unwrap().unwrap();
        assert_eq!(last.total_amount, Money::from_cents(10_000));
        assert_eq!(last.paid_at, at(16, 18, 0));
    }
}

// =============================================================================
// REPORTS
// =============================================================================

mod reports {
    use super::*;

    #[test]
    fn test_pdf_for_empty_range() {
        let engine = engine();
        run(&engine, &sender(ALI, "Ali"), "/clockin", at(16, 9, 0));

        let replies = run(&engine, &admin(), "/pdf all 2026-09", at(16, 12, 0));
        assert_eq!(replies, vec![Reply::Text("📭 No records found for 2026-09-01 to 2026-09-30.".to_string())]);
    }

    #[test]
    fn test_pdf_document() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(16, 9, 0));
        run(&engine, &ali, "/clockout", at(16, 17, 30));

        let replies = run(&engine, &admin(), "/PDF 100", at(16, 18, 0));
        assert_eq!(replies.len(), 1);
        match &replies[0] {
            Reply::Document { file_name, bytes, caption } => {
                assert_eq!(file_name, "report_100_2026-10-01_2026-10-16.pdf");
                assert!(bytes.starts_with(b"%PDF-"));
                assert!(caption.contains("2026-10-01 to 2026-10-16"));
            }
            other => panic!("expected a document, got {other:?}"),
        }
    }

    #[test]
    fn test_pdf_argument_errors() {
        let engine = engine();
        let reply = texts(&run(&engine, &admin(), "/pdf 555", at(16, 12, 0)));
        assert!(reply.contains("Driver 555 not found"), "{reply}");
        let reply = texts(&run(&engine, &admin(), "/pdf all 2026-10-09 2026-10-01", at(16, 12, 0)));
        assert!(reply.contains("after end date"), "{reply}");
    }

    #[test]
    fn test_monthly_report_text() {
        let engine = engine();
        let ali = sender(ALI, "Ali");
        run(&engine, &ali, "/clockin", at(2, 9, 0));
        run(&engine, &ali, "/clockout", at(2, 17, 0));
        run(&engine, &sender(BADRUL, "Badrul"), "/start", at(2, 9, 0));

        let reply = texts(&run(&engine, &admin(), "/report 2026-10", at(16, 12, 0)));
        assert!(reply.starts_with("📊 Monthly Report for October 2026"), "{reply}");
        assert!(reply.contains("👤 Ali:\n   • Work Days: 1\n   • Total Hours: 8h 0m"), "{reply}");
        assert!(!reply.contains("Badrul"), "{reply}");

        let reply = texts(&run(&engine, &admin(), "/report 2026-08", at(16, 12, 0)));
        assert_eq!(reply, "No work records found for August 2026.");
    }

    #[test]
    fn test_drivers_listing() {
        let engine = engine();
        assert_eq!(texts(&run(&engine, &admin(), "/drivers", at(16, 12, 0))), "No drivers registered yet.");
        run(&engine, &sender(ALI, "Ali"), "/start", at(16, 8, 0));
        let reply = texts(&run(&engine, &admin(), "/drivers", at(16, 12, 0)));
        assert!(reply.contains("Ali @ali (100)"), "{reply}");
    }

    #[test]
    fn test_long_listings_are_split() {
        let engine = engine();
        for id in 1000..1250 {
            run(&engine, &sender(id, &format!("Driver{id}")), "/start", at(15, 8, 0));
        }
        for command in ["/drivers", "/balance", "/check", "/salary"] {
            let replies = run(&engine, &admin(), command, at(16, 12, 0));
            assert!(replies.len() > 1, "{command}");
            assert!(
                replies
                    .iter()
                    .all(|r| matches!(r, Reply::Text(t) if t.chars().count() <= 4000)),
                "{command}"
            );
        }
    }
}

// =============================================================================
// PARSING
// =============================================================================

mod parsing {
    use super::*;

    #[test]
    fn test_unknown_command_reply() {
        let engine = engine();
        let err = parse_command("/dance", "clock_bot").unwrap().unwrap_err();
        let replies = engine.handle_parse_error(&sender(ALI, "Ali"), &err);
        assert!(texts(&replies).contains("Send /help"));
    }

    #[test]
    fn test_help_lists_commands() {
        let engine = engine();
        let reply = texts(&run(&engine, &sender(ALI, "Ali"), "/help", at(16, 8, 0)));
        assert!(reply.contains("/clockin"), "{reply}");
        assert!(reply.contains("/viewclaims"), "{reply}");
    }

    #[test]
    fn test_clock_kinds_are_stored() {
        let engine = engine();
        run(&engine, &sender(ALI, "Ali"), "/offday", at(16, 8, 0));
        let events = engine.db().events_on(ALI, date(16)).unwrap();
        assert_eq!(events[0].kind, ClockKind::Off);
    }
}
