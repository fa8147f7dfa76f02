use std::path::Path;

use tempfile::tempdir;
use thesis_ledger::core::config::Config;
use thesis_ledger::core::error::{CapacityKind, LedgerError};
use thesis_ledger::core::store::Store;
use thesis_ledger::plugins::defenses::{
    self, CommitteeInput, CommitteeMember, CommitteeRole, DefenseUpdate, NewDefense,
};
use thesis_ledger::plugins::users::{self, NewUser};

fn store_in(dir: &Path) -> Store {
    Store::with_config(
        dir,
        Config {
            password_iterations: 1_000,
            ..Config::default()
        },
    )
    .unwrap()
}

fn teacher(store: &Store, name: &str, jury: i64) -> u64 {
    users::create_user(
        store,
        NewUser {
            jury_capacity: Some(jury),
            ..NewUser::teacher(name, "pw")
        },
    )
    .unwrap()
}

fn student(store: &Store, name: &str, advisor: Option<u64>) -> u64 {
    users::create_user(
        store,
        NewUser {
            advisor_id: advisor,
            ..NewUser::student(name, "pw")
        },
    )
    .unwrap()
}

fn new_defense(student_id: u64, date: &str, members: Vec<CommitteeInput>) -> NewDefense<'_> {
    NewDefense {
        student_id,
        date,
        committee_members: members,
        final_score: None,
        notes: None,
        recorded_by: None,
    }
}

#[test]
fn scenario_b_record_once_per_student() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t1 = teacher(&store, "T1", 10);
    let s1 = student(&store, "S1", Some(t1));

    let rec = defenses::record(
        &store,
        NewDefense {
            final_score: Some(18.5),
            recorded_by: Some(t1),
            ..new_defense(
                s1,
                "2025-09-10",
                vec![CommitteeInput::ById(t1), CommitteeInput::from("Dr. External")],
            )
        },
    )
    .unwrap();
    assert_eq!(rec.id, 1);
    assert_eq!(rec.date, "2025-09-10");
    assert_eq!(rec.final_score, Some(18.5));
    assert_eq!(
        rec.committee_members,
        vec![
            CommitteeMember {
                id: Some(t1),
                name: "T1".to_string(),
                role: CommitteeRole::Teacher
            },
            CommitteeMember {
                id: None,
                name: "Dr. External".to_string(),
                role: CommitteeRole::External
            },
        ]
    );

    let err = defenses::record(
        &store,
        new_defense(s1, "2025-10-01", vec![CommitteeInput::ById(t1)]),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)));
    assert_eq!(defenses::list_by_student(&store, s1).unwrap().len(), 1);
}

#[test]
fn scenario_c_jury_capacity_zero_rejects_seat() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t2 = teacher(&store, "T2", 0);
    let s1 = student(&store, "S1", None);

    let err = defenses::record(
        &store,
        new_defense(s1, "2025-09-10", vec![CommitteeInput::ById(t2)]),
    )
    .unwrap_err();
    match err {
        LedgerError::CapacityExceeded {
            kind,
            teacher_id,
            used,
            requested,
            capacity,
        } => {
            assert_eq!(kind, CapacityKind::Jury);
            assert_eq!((teacher_id, used, requested, capacity), (t2, 0, 1, 0));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(defenses::list(&store).unwrap().is_empty());
}

#[test]
fn jury_capacity_counts_across_defenses() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t = teacher(&store, "T", 2);
    let s: Vec<u64> = (0..3).map(|i| student(&store, &format!("S{}", i), None)).collect();

    for sid in &s[..2] {
        defenses::record(&store, new_defense(*sid, "2025-09-10", vec![CommitteeInput::ById(t)]))
            .unwrap();
    }
    assert_eq!(defenses::count_jury_assignments(&store, t).unwrap(), 2);

    let err = defenses::record(&store, new_defense(s[2], "2025-09-10", vec![CommitteeInput::ById(t)]))
        .unwrap_err();
    assert!(matches!(err, LedgerError::CapacityExceeded { used: 2, requested: 1, .. }));
}

#[test]
fn record_validates_every_field() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t = teacher(&store, "T", 10);
    let s = student(&store, "S", None);
    let seat = || vec![CommitteeInput::ById(t)];

    let missing = defenses::record(&store, new_defense(99, "2025-09-10", seat())).unwrap_err();
    assert!(matches!(missing, LedgerError::NotFound(_)));

    let not_student = defenses::record(&store, new_defense(t, "2025-09-10", seat())).unwrap_err();
    assert!(matches!(not_student, LedgerError::ValidationError(_)));

    let bad_date = defenses::record(&store, new_defense(s, "10/09/2025", seat())).unwrap_err();
    assert!(matches!(bad_date, LedgerError::ValidationError(_)));

    let externals_only = defenses::record(
        &store,
        new_defense(s, "2025-09-10", vec![CommitteeInput::from("Dr. External")]),
    )
    .unwrap_err();
    assert!(matches!(externals_only, LedgerError::ValidationError(_)));

    for score in [20.01, -1.0, f64::INFINITY] {
        let err = defenses::record(
            &store,
            NewDefense {
                final_score: Some(score),
                ..new_defense(s, "2025-09-10", seat())
            },
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::ValidationError(_)), "{score}");
    }

    let unknown_recorder = defenses::record(
        &store,
        NewDefense {
            recorded_by: Some(404),
            ..new_defense(s, "2025-09-10", seat())
        },
    )
    .unwrap_err();
    assert!(matches!(unknown_recorder, LedgerError::NotFound(_)));

    assert!(defenses::list(&store).unwrap().is_empty());
}

#[test]
fn datetime_input_keeps_only_the_date() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t = teacher(&store, "T", 10);
    let s = student(&store, "S", None);
    let rec = defenses::record(
        &store,
        new_defense(s, "2025-09-10T14:30:00Z", vec![CommitteeInput::ById(t)]),
    )
    .unwrap();
    assert_eq!(rec.date, "2025-09-10");
}

#[test]
fn update_changes_only_supplied_fields() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t1 = teacher(&store, "T1", 10);
    let t2 = teacher(&store, "T2", 10);
    let s = student(&store, "S", Some(t1));
    let rec = defenses::record(
        &store,
        NewDefense {
            final_score: Some(15.0),
            notes: Some("initial".to_string()),
            ..new_defense(s, "2025-09-10", vec![CommitteeInput::ById(t1)])
        },
    )
    .unwrap();

    let amended = defenses::update(
        &store,
        rec.id,
        DefenseUpdate {
            final_score: Some(17.25),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(amended.final_score, Some(17.25));
    assert_eq!(amended.notes.as_deref(), Some("initial"));
    assert_eq!(amended.committee_members, rec.committee_members);

    let amended = defenses::update(
        &store,
        rec.id,
        DefenseUpdate {
            committee_members: Some(vec![CommitteeInput::ById(t2), CommitteeInput::from("Guest")]),
            notes: Some("jury replaced".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(amended.final_score, Some(17.25));
    assert_eq!(amended.notes.as_deref(), Some("jury replaced"));
    assert_eq!(amended.committee_members[0].id, Some(t2));
    assert_eq!(defenses::count_jury_assignments(&store, t1).unwrap(), 0);
    assert_eq!(defenses::count_jury_assignments(&store, t2).unwrap(), 1);

    let fetched = defenses::get_defense(&store, rec.id).unwrap().unwrap();
    assert_eq!(fetched, amended);
}

#[test]
fn update_validates_before_applying() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t = teacher(&store, "T", 1);
    let s = student(&store, "S", None);
    let rec = defenses::record(
        &store,
        NewDefense {
            final_score: Some(12.0),
            ..new_defense(s, "2025-09-10", vec![CommitteeInput::ById(t)])
        },
    )
    .unwrap();

    let err = defenses::update(&store, 99, DefenseUpdate::default()).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    let err = defenses::update(
        &store,
        rec.id,
        DefenseUpdate {
            final_score: Some(25.0),
            notes: Some("should not stick".to_string()),
            committee_members: Some(vec![CommitteeInput::from("Only External"), CommitteeInput::ById(t)]),
        },
    );
    // The current seat stays in the baseline, so re-seating T at capacity 1 overflows.
    assert!(matches!(err, Err(LedgerError::CapacityExceeded { .. })));

    let err = defenses::update(
        &store,
        rec.id,
        DefenseUpdate {
            final_score: Some(25.0),
            notes: Some("should not stick".to_string()),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));

    let unchanged = defenses::get_defense(&store, rec.id).unwrap().unwrap();
    assert_eq!(unchanged, rec);
}

#[test]
fn list_orders_by_date_descending() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t = teacher(&store, "T", 10);
    let dates = ["2025-01-15", "2025-09-10", "2024-12-31"];
    for (i, date) in dates.iter().enumerate() {
        let s = student(&store, &format!("S{}", i), None);
        defenses::record(&store, new_defense(s, date, vec![CommitteeInput::ById(t)])).unwrap();
    }

    let listed: Vec<String> = defenses::list(&store)
        .unwrap()
        .into_iter()
        .map(|d| d.date)
        .collect();
    assert_eq!(listed, vec!["2025-09-10", "2025-01-15", "2024-12-31"]);
    assert!(defenses::get_defense(&store, 404).unwrap().is_none());
}
