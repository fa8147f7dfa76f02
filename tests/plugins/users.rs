use std::fs;
use std::path::Path;

use tempfile::tempdir;
use thesis_ledger::core::broker;
use thesis_ledger::core::config::Config;
use thesis_ledger::core::error::{CapacityKind, LedgerError};
use thesis_ledger::core::store::Store;
use thesis_ledger::plugins::defenses::{self, CommitteeInput, NewDefense};
use thesis_ledger::plugins::users::{self, Identifier, NewUser, Role};

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

fn teacher(store: &Store, name: &str, advisee: Option<i64>, jury: Option<i64>) -> u64 {
    users::create_user(
        store,
        NewUser {
            advisee_capacity: advisee,
            jury_capacity: jury,
            ..NewUser::teacher(name, "teach")
        },
    )
    .unwrap()
}

fn student(store: &Store, name: &str, advisor: Option<u64>, defense_date: Option<&str>) -> u64 {
    users::create_user(
        store,
        NewUser {
            advisor_id: advisor,
            defense_date,
            ..NewUser::student(name, "learn")
        },
    )
    .unwrap()
}

#[test]
fn scenario_a_advisee_capacity_is_enforced_at_creation() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t1 = teacher(&store, "T1", Some(1), None);

    let s1 = student(&store, "S1", Some(t1), None);
    assert_eq!(users::get_by_id(&store, s1).unwrap().unwrap().advisor_id, Some(t1));

    let err = users::create_user(
        &store,
        NewUser {
            advisor_id: Some(t1),
            ..NewUser::student("S2", "pw")
        },
    )
    .unwrap_err();
    match err {
        LedgerError::CapacityExceeded {
            kind,
            teacher_id,
            used,
            capacity,
            ..
        } => {
            assert_eq!(kind, CapacityKind::Advisee);
            assert_eq!((teacher_id, used, capacity), (t1, 1, 1));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(users::get_by_name(&store, "S2").unwrap().is_none());
}

#[test]
fn teacher_defaults_are_filled_from_config() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t = teacher(&store, "Dr. Rasooli", None, None);
    let u = users::get_by_id(&store, t).unwrap().unwrap();
    assert_eq!(u.advisee_capacity, Some(5));
    assert_eq!(u.jury_capacity, Some(10));
    assert!(u.is_active);
    assert_eq!(u.password_iterations, 1_000);
    assert!(u.password_salt.len() >= 32);
    assert!(u.created_at.ends_with('Z'));
}

#[test]
fn create_rejects_bad_input_before_touching_the_document() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());

    let cases = [
        NewUser::teacher("  ", "pw"),
        NewUser::teacher("Dr. X", ""),
        NewUser {
            role: "admin",
            ..NewUser::teacher("Dr. X", "pw")
        },
        NewUser {
            defense_date: Some("10/09/2025"),
            ..NewUser::student("S", "pw")
        },
        NewUser {
            advisee_capacity: Some(-1),
            ..NewUser::teacher("Dr. X", "pw")
        },
        NewUser {
            jury_capacity: Some(3),
            ..NewUser::student("S", "pw")
        },
        NewUser {
            advisor_id: Some(1),
            ..NewUser::teacher("Dr. X", "pw")
        },
    ];
    for new in cases {
        let err = users::create_user(&store, new).unwrap_err();
        assert!(matches!(err, LedgerError::ValidationError(_)), "{err:?}");
    }
    assert!(!store.document_path().exists());
}

#[test]
fn advisor_must_exist_and_be_a_teacher() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let s = student(&store, "S1", None, None);

    let missing = users::create_user(
        &store,
        NewUser {
            advisor_id: Some(42),
            ..NewUser::student("S2", "pw")
        },
    )
    .unwrap_err();
    assert!(matches!(missing, LedgerError::NotFound(_)));

    let not_teacher = users::create_user(
        &store,
        NewUser {
            advisor_id: Some(s),
            ..NewUser::student("S3", "pw")
        },
    )
    .unwrap_err();
    assert!(matches!(not_teacher, LedgerError::ValidationError(_)));
}

#[test]
fn authenticate_by_id_or_name_and_stamp_last_login() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t = teacher(&store, "Dr. Rasooli", None, None);

    let by_name = users::authenticate(&store, &Identifier::from("Dr. Rasooli"), "teach")
        .unwrap()
        .unwrap();
    assert_eq!(by_name.id, t);
    assert!(by_name.last_login.is_some());

    let by_id = users::authenticate(&store, &Identifier::Id(t), "teach").unwrap();
    assert!(by_id.is_some());

    assert!(users::authenticate(&store, &Identifier::Id(t), "wrong").unwrap().is_none());
    assert!(users::authenticate(&store, &Identifier::from("nobody"), "teach").unwrap().is_none());

    assert!(users::set_active(&store, t, false).unwrap());
    assert!(users::authenticate(&store, &Identifier::Id(t), "teach").unwrap().is_none());
    assert!(!users::set_active(&store, 99, true).unwrap());
}

#[test]
fn change_password_requires_the_old_one() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let s = student(&store, "S1", None, None);

    let err = users::change_password(&store, s, "nope", "new").unwrap_err();
    assert!(matches!(err, LedgerError::AuthError(_)));
    let err = users::change_password(&store, 77, "learn", "new").unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    let err = users::change_password(&store, s, "learn", "").unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));

    users::change_password(&store, s, "learn", "better").unwrap();
    assert!(users::authenticate(&store, &Identifier::Id(s), "learn").unwrap().is_none());
    assert!(users::authenticate(&store, &Identifier::Id(s), "better").unwrap().is_some());
}

#[test]
fn change_advisor_appends_history() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t1 = teacher(&store, "T1", Some(2), None);
    let t2 = teacher(&store, "T2", Some(2), None);
    let s = student(&store, "S1", Some(t1), Some("2099-06-01"));

    users::change_advisor(&store, s, t2, Some(t1)).unwrap();
    users::change_advisor(&store, s, t2, Some(t1)).unwrap();

    let u = users::get_by_id(&store, s).unwrap().unwrap();
    assert_eq!(u.advisor_id, Some(t2));
    assert_eq!(u.advisor_history.len(), 1);
    let entry = &u.advisor_history[0];
    assert_eq!((entry.old_advisor, entry.new_advisor, entry.changed_by), (Some(t1), t2, Some(t1)));
    assert_eq!(users::count_advisees(&store, t1).unwrap(), 0);
    assert_eq!(users::list_students_of(&store, t2).unwrap().len(), 1);
}

#[test]
fn scenario_d_advisor_is_frozen_after_defense_date() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t1 = teacher(&store, "T1", None, None);
    let t2 = teacher(&store, "T2", None, None);
    let s1 = student(&store, "S1", Some(t1), Some("2020-01-01"));

    let err = users::change_advisor(&store, s1, t2, None).unwrap_err();
    assert!(matches!(err, LedgerError::TemporalError(_)));
    assert_eq!(users::get_by_id(&store, s1).unwrap().unwrap().advisor_id, Some(t1));
}

#[test]
fn change_advisor_checks_target_capacity_and_existence() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t1 = teacher(&store, "T1", Some(1), None);
    let full = teacher(&store, "Full", Some(1), None);
    let s1 = student(&store, "S1", Some(t1), None);
    student(&store, "S2", Some(full), None);

    let err = users::change_advisor(&store, s1, full, None).unwrap_err();
    assert!(matches!(err, LedgerError::CapacityExceeded { .. }));
    let err = users::change_advisor(&store, s1, 99, None).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    let err = users::change_advisor(&store, 99, t1, None).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn capacity_updates_cannot_drop_below_usage() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t = teacher(&store, "T1", Some(3), Some(3));
    let s1 = student(&store, "S1", Some(t), None);
    student(&store, "S2", Some(t), None);
    defenses::record(
        &store,
        NewDefense {
            student_id: s1,
            date: "2025-09-10",
            committee_members: vec![CommitteeInput::ById(t)],
            final_score: None,
            notes: None,
            recorded_by: None,
        },
    )
    .unwrap();

    assert!(!users::set_teacher_capacity(&store, s1, Some(1), None).unwrap());
    assert!(matches!(
        users::set_teacher_capacity(&store, t, Some(-2), None),
        Err(LedgerError::ValidationError(_))
    ));
    assert!(matches!(
        users::set_teacher_capacity(&store, t, Some(1), None),
        Err(LedgerError::CapacityExceeded { kind: CapacityKind::Advisee, .. })
    ));
    assert!(matches!(
        users::set_teacher_capacity(&store, t, None, Some(0)),
        Err(LedgerError::CapacityExceeded { kind: CapacityKind::Jury, .. })
    ));

    assert!(users::set_teacher_capacity(&store, t, Some(2), None).unwrap());
    let u = users::get_by_id(&store, t).unwrap().unwrap();
    assert_eq!((u.advisee_capacity, u.jury_capacity), (Some(2), Some(3)));
    assert_eq!(users::remaining_advisee_slots(&store, t).unwrap(), 0);
    assert!(matches!(
        users::remaining_advisee_slots(&store, s1),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn list_users_keeps_insertion_order() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    teacher(&store, "T1", None, None);
    student(&store, "S1", None, None);
    let roles: Vec<Role> = users::list_users(&store)
        .unwrap()
        .into_iter()
        .map(|u| u.role)
        .collect();
    assert_eq!(roles, vec![Role::Teacher, Role::Student]);
}

#[test]
fn updates_to_missing_targets_write_nothing() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let t = teacher(&store, "T", Some(2), None);
    let s = users::create_user(
        &store,
        NewUser {
            advisor_id: Some(t),
            ..NewUser::student("S", "pw")
        },
    )
    .unwrap();
    let before = fs::read(store.document_path()).unwrap();
    let logged = broker::read_audit_log(&store).unwrap().len();

    assert!(!users::set_active(&store, 99, false).unwrap());
    assert!(!users::set_teacher_capacity(&store, 99, Some(3), None).unwrap());
    assert!(!users::set_teacher_capacity(&store, s, Some(3), None).unwrap());
    users::change_advisor(&store, s, t, None).unwrap();

    assert_eq!(fs::read(store.document_path()).unwrap(), before);
    let events = broker::read_audit_log(&store).unwrap();
    let tail: Vec<(&str, &str)> = events[logged..]
        .iter()
        .map(|e| (e.op.as_str(), e.status.as_str()))
        .collect();
    assert_eq!(
        tail,
        vec![
            ("users.deactivate", "noop"),
            ("users.set_capacity", "noop"),
            ("users.set_capacity", "noop"),
            ("users.change_advisor", "noop"),
        ]
    );
    assert!(users::get_by_id(&store, s).unwrap().unwrap().advisor_history.is_empty());
}
