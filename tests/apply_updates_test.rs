//! Write path: validation, target scoping, the weekend lock, and the
//! audit trail.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use escala_core::{
    cell_key, Actor, AssignmentLedger, Officer, ScheduleConfig, ScheduleDb, ScheduleError,
    Signatures, UpdateRequest,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A UTC instant from São Paulo wall-clock components.
fn sp(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    FixedOffset::east_opt(-3 * 3600)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, 0, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn ledger() -> AssignmentLedger {
    let config = ScheduleConfig {
        cutover: date(2026, 2, 2),
        roster: vec![
            Officer {
                canonical_name: "Eduardo Mosna Xavier".into(),
                rank: "Maj PM".into(),
                display_name: "Eduardo Mosna Xavier".into(),
            },
            Officer {
                canonical_name: "Alberto Franzini Neto".into(),
                rank: "Cap PM".into(),
                display_name: "Alberto Franzini Neto".into(),
            },
        ],
        ..Default::default()
    };
    AssignmentLedger::new(ScheduleDb::open_in_memory().unwrap(), config).unwrap()
}

fn officer() -> Actor {
    Actor {
        canonical_name: "Eduardo Mosna Xavier".into(),
        is_admin: false,
    }
}

fn admin() -> Actor {
    Actor {
        canonical_name: "Alberto Franzini Neto".into(),
        is_admin: true,
    }
}

fn update(target: &str, date: NaiveDate, code: &str, description: Option<&str>) -> UpdateRequest {
    UpdateRequest {
        canonical_name: target.into(),
        date,
        code: code.into(),
        description: description.map(String::from),
    }
}

// Tuesday inside the week 2026-02-23..2026-03-01
const TUE: (i32, u32, u32) = (2026, 2, 24);

fn tuesday() -> DateTime<Utc> {
    sp(TUE.0, TUE.1, TUE.2, 9)
}

#[test]
fn test_write_and_read_back() {
    let ledger = ledger();
    let outcome = ledger
        .apply_updates(
            &officer(),
            &[update("Eduardo Mosna Xavier", date(2026, 2, 24), "EXP", None)],
            tuesday(),
            false,
        )
        .unwrap();
    assert_eq!(outcome.applied_count, 1);

    let view = ledger.week_view(tuesday()).unwrap();
    let key = cell_key("Eduardo Mosna Xavier", date(2026, 2, 24));
    assert_eq!(view.assignments.get(&key).map(String::as_str), Some("EXP"));
}

#[test]
fn test_non_admin_is_redirected_to_own_row() {
    let ledger = ledger();
    // a non-admin naming another officer writes to their own row instead
    ledger
        .apply_updates(
            &officer(),
            &[update("Alberto Franzini Neto", date(2026, 2, 24), "SR", None)],
            tuesday(),
            false,
        )
        .unwrap();

    let view = ledger.week_view(tuesday()).unwrap();
    assert_eq!(
        view.assignments
            .get(&cell_key("Eduardo Mosna Xavier", date(2026, 2, 24)))
            .map(String::as_str),
        Some("SR")
    );
    assert!(view
        .assignments
        .get(&cell_key("Alberto Franzini Neto", date(2026, 2, 24)))
        .is_none());

    let logs = ledger.change_logs(&admin(), 10).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].actor, "Eduardo Mosna Xavier");
    assert_eq!(logs[0].target, "Eduardo Mosna Xavier");
}

#[test]
fn test_admin_writes_another_officers_row() {
    let ledger = ledger();
    ledger
        .apply_updates(
            &admin(),
            &[update("Eduardo Mosna Xavier", date(2026, 2, 24), "MA", None)],
            tuesday(),
            false,
        )
        .unwrap();

    let view = ledger.week_view(tuesday()).unwrap();
    assert_eq!(
        view.assignments
            .get(&cell_key("Eduardo Mosna Xavier", date(2026, 2, 24)))
            .map(String::as_str),
        Some("MA")
    );

    let logs = ledger.change_logs(&admin(), 10).unwrap();
    assert_eq!(logs[0].actor, "Alberto Franzini Neto");
    assert_eq!(logs[0].target, "Eduardo Mosna Xavier");
}

#[test]
fn test_date_outside_period_rejects_whole_batch() {
    let ledger = ledger();
    let err = ledger
        .apply_updates(
            &officer(),
            &[
                update("Eduardo Mosna Xavier", date(2026, 2, 24), "EXP", None),
                // next week
                update("Eduardo Mosna Xavier", date(2026, 3, 2), "EXP", None),
            ],
            tuesday(),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Validation(_)));

    // all-or-nothing: the valid first item was not applied either
    let view = ledger.week_view(tuesday()).unwrap();
    assert!(view.assignments.is_empty());
}

#[test]
fn test_unknown_officer_rejected() {
    let ledger = ledger();
    let err = ledger
        .apply_updates(
            &officer(),
            &[update("Fulano de Tal", date(2026, 2, 24), "EXP", None)],
            tuesday(),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Validation(_)));
}

#[test]
fn test_unknown_code_rejected() {
    let ledger = ledger();
    let err = ledger
        .apply_updates(
            &officer(),
            &[update("Eduardo Mosna Xavier", date(2026, 2, 24), "XYZ", None)],
            tuesday(),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Validation(_)));
}

#[test]
fn test_outros_requires_description() {
    let ledger = ledger();
    let err = ledger
        .apply_updates(
            &officer(),
            &[update("Eduardo Mosna Xavier", date(2026, 2, 24), "OUTROS", None)],
            tuesday(),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Validation(_)));

    // whitespace-only is still missing
    let err = ledger
        .apply_updates(
            &officer(),
            &[update(
                "Eduardo Mosna Xavier",
                date(2026, 2, 24),
                "OUTROS",
                Some("   "),
            )],
            tuesday(),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Validation(_)));

    ledger
        .apply_updates(
            &officer(),
            &[update(
                "Eduardo Mosna Xavier",
                date(2026, 2, 24),
                "OUTROS",
                Some("curso externo"),
            )],
            tuesday(),
            false,
        )
        .unwrap();

    let view = ledger.week_view(tuesday()).unwrap();
    let key = cell_key("Eduardo Mosna Xavier", date(2026, 2, 24));
    assert_eq!(view.notes.get(&key).map(String::as_str), Some("curso externo"));
}

#[test]
fn test_plain_code_clears_stored_description() {
    let ledger = ledger();
    let key = cell_key("Eduardo Mosna Xavier", date(2026, 2, 24));

    ledger
        .apply_updates(
            &officer(),
            &[update(
                "Eduardo Mosna Xavier",
                date(2026, 2, 24),
                "OUTROS",
                Some("curso externo"),
            )],
            tuesday(),
            false,
        )
        .unwrap();

    // EXP does not carry a description; the old one must not survive
    ledger
        .apply_updates(
            &officer(),
            &[update("Eduardo Mosna Xavier", date(2026, 2, 24), "EXP", None)],
            tuesday(),
            false,
        )
        .unwrap();

    let view = ledger.week_view(tuesday()).unwrap();
    assert_eq!(view.assignments.get(&key).map(String::as_str), Some("EXP"));
    assert!(view.notes.get(&key).is_none());
}

#[test]
fn test_clearing_code_clears_cell_and_description() {
    let ledger = ledger();
    let key = cell_key("Eduardo Mosna Xavier", date(2026, 2, 24));

    ledger
        .apply_updates(
            &officer(),
            &[update(
                "Eduardo Mosna Xavier",
                date(2026, 2, 24),
                "OUTROS",
                Some("curso externo"),
            )],
            tuesday(),
            false,
        )
        .unwrap();

    let outcome = ledger
        .apply_updates(
            &officer(),
            &[update("Eduardo Mosna Xavier", date(2026, 2, 24), "", None)],
            tuesday(),
            false,
        )
        .unwrap();
    assert_eq!(outcome.applied_count, 1);

    let view = ledger.week_view(tuesday()).unwrap();
    assert!(view.assignments.get(&key).is_none());
    assert!(view.notes.get(&key).is_none());

    // both fields were logged on the clear
    let logs = ledger.change_logs(&admin(), 10).unwrap();
    let clear_logs: Vec<_> = logs.iter().filter(|l| l.after.is_none()).collect();
    assert_eq!(clear_logs.len(), 2);
}

#[test]
fn test_idempotent_rewrite_produces_no_second_log() {
    let ledger = ledger();
    let updates = [update(
        "Eduardo Mosna Xavier",
        date(2026, 2, 24),
        "OUTROS",
        Some("curso externo"),
    )];

    let first = ledger
        .apply_updates(&officer(), &updates, tuesday(), false)
        .unwrap();
    let second = ledger
        .apply_updates(&officer(), &updates, sp(2026, 2, 24, 10), false)
        .unwrap();

    assert_eq!(first.applied_count, 1);
    assert_eq!(second.applied_count, 0);

    let logs = ledger.change_logs(&admin(), 10).unwrap();
    // one code entry and one description entry, from the first write only
    assert_eq!(logs.len(), 2);
}

#[test]
fn test_code_and_description_logged_independently() {
    let ledger = ledger();
    ledger
        .apply_updates(
            &officer(),
            &[update(
                "Eduardo Mosna Xavier",
                date(2026, 2, 24),
                "OUTROS",
                Some("curso"),
            )],
            tuesday(),
            false,
        )
        .unwrap();
    ledger
        .apply_updates(
            &officer(),
            &[update(
                "Eduardo Mosna Xavier",
                date(2026, 2, 24),
                "FO*",
                Some("folga compensada"),
            )],
            sp(2026, 2, 24, 10),
            false,
        )
        .unwrap();

    let logs = ledger.change_logs(&admin(), 10).unwrap();
    assert_eq!(logs.len(), 4);

    let latest_code = logs.iter().find(|l| l.field == "code").unwrap();
    assert_eq!(latest_code.before.as_deref(), Some("OUTROS"));
    assert_eq!(latest_code.after.as_deref(), Some("FO*"));

    let latest_desc = logs.iter().find(|l| l.field == "description").unwrap();
    assert_eq!(latest_desc.before.as_deref(), Some("curso"));
    assert_eq!(latest_desc.after.as_deref(), Some("folga compensada"));
}

#[test]
fn test_saturday_write_rejected_with_lock_error() {
    let ledger = ledger();
    let saturday = sp(2026, 2, 28, 10);

    // even the actor's own row is locked on the weekend
    let err = ledger
        .apply_updates(
            &officer(),
            &[update("Eduardo Mosna Xavier", date(2026, 2, 24), "EXP", None)],
            saturday,
            false,
        )
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Locked));

    // an admin without the explicit override assertion is also locked out
    let err = ledger
        .apply_updates(
            &admin(),
            &[update("Eduardo Mosna Xavier", date(2026, 2, 24), "EXP", None)],
            saturday,
            false,
        )
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Locked));
}

#[test]
fn test_admin_override_writes_through_the_lock() {
    let ledger = ledger();
    let saturday = sp(2026, 2, 28, 10);

    let outcome = ledger
        .apply_updates(
            &admin(),
            &[update("Eduardo Mosna Xavier", date(2026, 2, 24), "VE", None)],
            saturday,
            true,
        )
        .unwrap();
    assert_eq!(outcome.applied_count, 1);

    let logs = ledger.change_logs(&admin(), 10).unwrap();
    assert_eq!(logs[0].actor, "Alberto Franzini Neto");
    assert_eq!(logs[0].target, "Eduardo Mosna Xavier");

    let view = ledger.week_view(saturday).unwrap();
    assert!(view.locked);
}

#[test]
fn test_change_logs_are_admin_only() {
    let ledger = ledger();
    let err = ledger.change_logs(&officer(), 10).unwrap_err();
    assert!(matches!(err, ScheduleError::Forbidden));
}

#[test]
fn test_signatures_admin_only_and_persisted() {
    let ledger = ledger();
    let signatures = Signatures {
        left_name: "Alberto Franzini Neto".into(),
        left_role: "Cap PM".into(),
        right_name: "Eduardo Mosna Xavier".into(),
        right_role: "Maj PM".into(),
    };

    let err = ledger
        .set_signatures(&officer(), signatures.clone(), tuesday())
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Forbidden));

    ledger
        .set_signatures(&admin(), signatures.clone(), tuesday())
        .unwrap();

    let view = ledger.week_view(tuesday()).unwrap();
    assert_eq!(view.meta.signatures, Some(signatures));
}
