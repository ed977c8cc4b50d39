use rusqlite::Connection;
use tribune_core::db::open_db_in_memory;
use tribune_core::repo::content_repo::{ContentStore, SqliteContentStore};
use tribune_core::repo::tally_repo::{SqliteTallyStore, TallyStore};
use tribune_core::repo::user_repo::{SqliteUserDirectory, UserDirectory};
use tribune_core::{Article, RepoError, Side, Tally, TargetRef, Transition, User, UserId};
use uuid::Uuid;

fn seed(conn: &Connection, voters: usize) -> (TargetRef, Vec<UserId>) {
    let users = SqliteUserDirectory::try_new(conn).unwrap();
    let content = SqliteContentStore::try_new(conn).unwrap();
    let article = content
        .create_article(&Article::new("t", "s", "c", "byline", "politics"))
        .unwrap();
    let ids = (0..voters)
        .map(|index| users.create_user(&User::new(format!("voter-{index}"))).unwrap())
        .collect();
    (TargetRef::article(article), ids)
}

fn up(previous: Option<Side>, next: Option<Side>) -> Transition {
    Transition::new(previous, next)
}

#[test]
fn first_votes_add_to_chosen_sides() {
    let conn = open_db_in_memory().unwrap();
    let (target, voters) = seed(&conn, 3);
    let store = SqliteTallyStore::try_new(&conn).unwrap();

    store
        .apply_transition(&target, voters[0], up(None, Some(Side::Positive)))
        .unwrap();
    store
        .apply_transition(&target, voters[1], up(None, Some(Side::Positive)))
        .unwrap();
    let tally = store
        .apply_transition(&target, voters[2], up(None, Some(Side::Negative)))
        .unwrap();

    assert_eq!(tally, Tally::new(2, 1));
    assert_eq!(store.tally(&target).unwrap(), Tally::new(2, 1));

    let mut expected = vec![voters[0], voters[1]];
    expected.sort();
    assert_eq!(store.voters(&target, Side::Positive).unwrap(), expected);
    assert_eq!(store.voters(&target, Side::Negative).unwrap(), vec![voters[2]]);
}

#[test]
fn switch_moves_voter_between_sets() {
    let conn = open_db_in_memory().unwrap();
    let (target, voters) = seed(&conn, 1);
    let store = SqliteTallyStore::try_new(&conn).unwrap();

    store
        .apply_transition(&target, voters[0], up(None, Some(Side::Positive)))
        .unwrap();
    let tally = store
        .apply_transition(
            &target,
            voters[0],
            up(Some(Side::Positive), Some(Side::Negative)),
        )
        .unwrap();

    assert_eq!(tally, Tally::new(0, 1));
    assert!(store.voters(&target, Side::Positive).unwrap().is_empty());
    assert_eq!(store.voters(&target, Side::Negative).unwrap(), voters);
    assert!(store.audit(&target).unwrap().is_consistent());
}

#[test]
fn repeat_transition_is_noop() {
    let conn = open_db_in_memory().unwrap();
    let (target, voters) = seed(&conn, 1);
    let store = SqliteTallyStore::try_new(&conn).unwrap();

    store
        .apply_transition(&target, voters[0], up(None, Some(Side::Negative)))
        .unwrap();
    let tally = store
        .apply_transition(
            &target,
            voters[0],
            up(Some(Side::Negative), Some(Side::Negative)),
        )
        .unwrap();
    assert_eq!(tally, Tally::new(0, 1));
}

#[test]
fn retraction_restores_previous_tally() {
    let conn = open_db_in_memory().unwrap();
    let (target, voters) = seed(&conn, 1);
    let store = SqliteTallyStore::try_new(&conn).unwrap();

    store
        .apply_transition(&target, voters[0], up(None, Some(Side::Positive)))
        .unwrap();
    let tally = store
        .apply_transition(&target, voters[0], up(Some(Side::Positive), None))
        .unwrap();
    assert_eq!(tally, Tally::default());
    assert!(store.audit(&target).unwrap().is_consistent());
}

#[test]
fn stale_previous_side_is_reported_as_drift_and_rolled_back() {
    let conn = open_db_in_memory().unwrap();
    let (target, voters) = seed(&conn, 1);
    let store = SqliteTallyStore::try_new(&conn).unwrap();

    let err = store
        .apply_transition(
            &target,
            voters[0],
            up(Some(Side::Positive), Some(Side::Negative)),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::TallyDrift {
            side: Side::Positive,
            ..
        }
    ));
    assert_eq!(store.tally(&target).unwrap(), Tally::default());
}

#[test]
fn double_join_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let (target, voters) = seed(&conn, 1);
    let store = SqliteTallyStore::try_new(&conn).unwrap();

    store
        .apply_transition(&target, voters[0], up(None, Some(Side::Positive)))
        .unwrap();
    let err = store
        .apply_transition(&target, voters[0], up(None, Some(Side::Negative)))
        .unwrap_err();
    assert!(matches!(err, RepoError::TallyDrift { .. }));
    assert_eq!(store.tally(&target).unwrap(), Tally::new(1, 0));
}

#[test]
fn audit_detects_tampered_counters() {
    let conn = open_db_in_memory().unwrap();
    let (target, voters) = seed(&conn, 2);
    let store = SqliteTallyStore::try_new(&conn).unwrap();
    for voter in &voters {
        store
            .apply_transition(&target, *voter, up(None, Some(Side::Positive)))
            .unwrap();
    }

    conn.execute("UPDATE articles SET votes_for = 7;", [])
        .unwrap();
    let audit = store.audit(&target).unwrap();
    assert!(!audit.is_consistent());
    assert_eq!(audit.cached, Tally::new(7, 0));
    assert_eq!(audit.counted, Tally::new(2, 0));
}

#[test]
fn missing_target_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let (_, voters) = seed(&conn, 1);
    let store = SqliteTallyStore::try_new(&conn).unwrap();
    let missing = TargetRef::opinion(Uuid::new_v4());

    assert!(matches!(
        store.tally(&missing).unwrap_err(),
        RepoError::TargetNotFound(_)
    ));
    assert!(matches!(
        store
            .apply_transition(&missing, voters[0], up(None, Some(Side::Positive)))
            .unwrap_err(),
        RepoError::TargetNotFound(_)
    ));
}
