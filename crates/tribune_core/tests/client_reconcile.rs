use rusqlite::Connection;
use tribune_core::db::open_db_in_memory;
use tribune_core::repo::content_repo::{ContentStore, SqliteContentStore};
use tribune_core::repo::user_repo::{SqliteUserDirectory, UserDirectory};
use tribune_core::{
    Article, Choice, LocalTransport, Opinion, ReconcileError, Tally, TargetRef, User, UserId,
    VoteAction, VoteCoordinator, VoteError, VoteKey, VoteMirror, VoteOutcome, VoteRequest,
    VoteTransport,
};

struct World {
    alice: UserId,
    bob: UserId,
    article: TargetRef,
    opinion: TargetRef,
}

fn world(conn: &Connection) -> World {
    let users = SqliteUserDirectory::try_new(conn).unwrap();
    let content = SqliteContentStore::try_new(conn).unwrap();
    let alice = users.create_user(&User::new("alice")).unwrap();
    let bob = users.create_user(&User::new("bob").with_aura(10)).unwrap();
    let article = content
        .create_article(&Article::new("t", "s", "c", "byline", "sport"))
        .unwrap();
    let opinion = content
        .create_opinion(&Opinion::new(article, bob, "take"))
        .unwrap();
    World {
        alice,
        bob,
        article: TargetRef::article(article),
        opinion: TargetRef::opinion(opinion),
    }
}

/// Transport that always fails with a fixed error and records calls.
struct FailingTransport {
    calls: Vec<VoteAction>,
    error: fn(TargetRef) -> VoteError,
}

impl VoteTransport for FailingTransport {
    fn send(&mut self, request: &VoteRequest) -> Result<VoteOutcome, VoteError> {
        self.calls.push(VoteAction::Cast(*request));
        Err((self.error)(request.target()))
    }

    fn retract(&mut self, target: TargetRef) -> Result<VoteOutcome, VoteError> {
        self.calls.push(VoteAction::Retract(target));
        Err((self.error)(target))
    }
}

#[test]
fn successful_vote_overwrites_mirror_with_server_tally() {
    let mut conn = open_db_in_memory().unwrap();
    let w = world(&conn);
    let coordinator = VoteCoordinator::default();
    let mut mirror = VoteMirror::new();
    mirror.seed_tally(w.article, Tally::default());

    let mut transport = LocalTransport::new(&coordinator, &mut conn, Some(w.alice));
    let tally = mirror.vote(&mut transport, w.article, Choice::For).unwrap();

    assert_eq!(tally, Tally::new(1, 0));
    assert_eq!(mirror.tally(&w.article), Some(Tally::new(1, 0)));
    assert_eq!(mirror.my_vote(&w.article), Some(Choice::For));
    assert!(!mirror.is_pending(&w.article));
}

#[test]
fn server_truth_wins_over_optimistic_guess() {
    let mut conn = open_db_in_memory().unwrap();
    let w = world(&conn);
    let coordinator = VoteCoordinator::default();
    let mut mirror = VoteMirror::new();
    mirror.seed_tally(w.opinion, Tally::default());

    let pending = mirror.begin(w.opinion, Choice::Like).unwrap();
    assert_eq!(pending.optimistic_tally(), Tally::new(1, 0));

    // Another user votes while alice's request is outstanding.
    coordinator
        .cast_vote(
            &mut conn,
            Some(w.bob),
            &VoteRequest::new(w.opinion, Choice::Like),
        )
        .unwrap();

    let result = coordinator.cast_vote(&mut conn, Some(w.alice), pending.request().unwrap());
    let tally = mirror.complete(pending, result).unwrap();
    assert_eq!(tally, Tally::new(2, 0));
    assert_eq!(mirror.tally(&w.opinion), Some(Tally::new(2, 0)));
}

#[test]
fn failed_vote_restores_pre_click_state() {
    let w = world(&open_db_in_memory().unwrap());
    let mut mirror = VoteMirror::new();
    mirror.seed_tally(w.article, Tally::new(10, 4));
    mirror.hydrate_votes([(w.article, Choice::Against)]);

    let mut transport = FailingTransport {
        calls: Vec::new(),
        error: |target| VoteError::Conflict(VoteKey::new(UserId::nil(), target)),
    };
    let err = mirror
        .vote(&mut transport, w.article, Choice::For)
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Rejected(VoteError::Conflict(_))));
    assert_eq!(transport.calls.len(), 1);
    assert_eq!(mirror.tally(&w.article), Some(Tally::new(10, 4)));
    assert_eq!(mirror.my_vote(&w.article), Some(Choice::Against));
    assert!(!mirror.is_pending(&w.article));
}

#[test]
fn rejected_anonymous_vote_rolls_back_against_real_coordinator() {
    let mut conn = open_db_in_memory().unwrap();
    let w = world(&conn);
    let coordinator = VoteCoordinator::default();
    let mut mirror = VoteMirror::new();
    mirror.seed_tally(w.opinion, Tally::new(3, 1));

    let mut transport = LocalTransport::new(&coordinator, &mut conn, None);
    let err = mirror
        .vote(&mut transport, w.opinion, Choice::Dislike)
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Rejected(VoteError::Unauthorized)));
    assert_eq!(mirror.tally(&w.opinion), Some(Tally::new(3, 1)));
    assert_eq!(mirror.my_vote(&w.opinion), None);
}

#[test]
fn second_click_while_pending_is_debounced() {
    let w = world(&open_db_in_memory().unwrap());
    let mut mirror = VoteMirror::new();
    mirror.seed_tally(w.article, Tally::new(2, 2));

    let pending = mirror.begin(w.article, Choice::For).unwrap();
    let err = mirror.begin(w.article, Choice::Against).unwrap_err();
    assert!(matches!(err, ReconcileError::RequestInFlight(target) if target == w.article));
    assert_eq!(mirror.tally(&w.article), Some(Tally::new(3, 2)));

    // Other targets are not blocked.
    let other = mirror.begin(w.opinion, Choice::Like).unwrap();
    assert!(mirror.is_pending(&w.opinion));

    mirror
        .complete(pending, Err(VoteError::Unauthorized))
        .unwrap_err();
    mirror
        .complete(other, Err(VoteError::Unauthorized))
        .unwrap_err();
    assert_eq!(mirror.tally(&w.article), Some(Tally::new(2, 2)));
    assert_eq!(mirror.tally(&w.opinion), None);
    assert!(mirror.begin(w.article, Choice::Against).is_ok());
}

#[test]
fn hydrated_mirror_applies_switch_from_server_choice() {
    let mut conn = open_db_in_memory().unwrap();
    let w = world(&conn);
    let coordinator = VoteCoordinator::default();
    coordinator
        .cast_vote(
            &mut conn,
            Some(w.alice),
            &VoteRequest::new(w.opinion, Choice::Like),
        )
        .unwrap();

    let mut mirror = VoteMirror::new();
    let votes = coordinator.votes_for_user(&conn, Some(w.alice)).unwrap();
    let snapshot = coordinator.snapshot(&conn, w.opinion).unwrap();
    mirror.hydrate(votes, [(w.opinion, snapshot.tally())]);
    assert_eq!(mirror.my_vote(&w.opinion), Some(Choice::Like));

    let pending = mirror.begin(w.opinion, Choice::Dislike).unwrap();
    assert_eq!(pending.optimistic_tally(), Tally::new(0, 1));

    let result = coordinator.cast_vote(&mut conn, Some(w.alice), pending.request().unwrap());
    let author_aura = result.as_ref().ok().and_then(VoteOutcome::author_aura);
    let tally = mirror.complete(pending, result).unwrap();
    assert_eq!(tally, Tally::new(0, 1));
    assert_eq!(author_aura, Some(9));
}

#[test]
fn retraction_through_mirror_matches_server() {
    let mut conn = open_db_in_memory().unwrap();
    let w = world(&conn);
    let coordinator = VoteCoordinator::default();
    let mut mirror = VoteMirror::new();
    mirror.seed_tally(w.opinion, Tally::default());

    let mut transport = LocalTransport::new(&coordinator, &mut conn, Some(w.alice));
    mirror.vote(&mut transport, w.opinion, Choice::Like).unwrap();
    assert_eq!(mirror.author_aura(&w.opinion), Some(11));

    let tally = mirror.retract(&mut transport, w.opinion).unwrap();
    assert_eq!(tally, Tally::default());
    assert_eq!(mirror.my_vote(&w.opinion), None);
    assert_eq!(mirror.author_aura(&w.opinion), Some(10));
    assert!(!mirror.is_pending(&w.opinion));

    let server = coordinator.snapshot(&conn, w.opinion).unwrap();
    assert_eq!(mirror.tally(&w.opinion), Some(server.tally()));
    assert_eq!(server.author_aura(), Some(10));
}

#[test]
fn failed_retraction_restores_choice_and_tally() {
    let w = world(&open_db_in_memory().unwrap());
    let mut mirror = VoteMirror::new();
    mirror.seed_tally(w.article, Tally::new(5, 1));
    mirror.hydrate_votes([(w.article, Choice::For)]);

    let pending = mirror.begin_retract(w.article).unwrap();
    assert_eq!(pending.optimistic_tally(), Tally::new(4, 1));
    assert_eq!(mirror.my_vote(&w.article), None);
    let mut transport = FailingTransport {
        calls: Vec::new(),
        error: |target| VoteError::Conflict(VoteKey::new(UserId::nil(), target)),
    };
    let result = pending.action().dispatch(&mut transport);
    let err = mirror.complete(pending, result).unwrap_err();

    assert!(matches!(err, ReconcileError::Rejected(VoteError::Conflict(_))));
    assert_eq!(transport.calls, vec![VoteAction::Retract(w.article)]);
    assert_eq!(mirror.tally(&w.article), Some(Tally::new(5, 1)));
    assert_eq!(mirror.my_vote(&w.article), Some(Choice::For));
}

#[test]
fn server_refresh_during_pending_vote_survives_rollback() {
    let w = world(&open_db_in_memory().unwrap());
    let mut mirror = VoteMirror::new();
    mirror.seed_tally(w.article, Tally::new(1, 0));

    let pending = mirror.begin(w.article, Choice::For).unwrap();
    mirror.seed_tally(w.article, Tally::new(7, 3));
    mirror
        .complete(pending, Err(VoteError::Unauthorized))
        .unwrap_err();

    assert_eq!(mirror.tally(&w.article), Some(Tally::new(7, 3)));
}
