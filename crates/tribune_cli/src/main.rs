//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `tribune_core` linkage without the FFI host.
//! - Run a short in-memory vote scenario with deterministic output.

use tribune_core::repo::content_repo::{ContentStore, SqliteContentStore};
use tribune_core::repo::user_repo::{SqliteUserDirectory, UserDirectory};
use tribune_core::{
    open_db_in_memory, Article, Choice, LocalTransport, Opinion, TargetRef, User, VoteCoordinator,
    VoteMirror, VoteRequest,
};

fn main() {
    println!("tribune_core ping={}", tribune_core::ping());
    println!("tribune_core version={}", tribune_core::core_version());

    if let Err(err) = run_scenario() {
        eprintln!("scenario status=error error={err}");
        std::process::exit(1);
    }
}

fn run_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = open_db_in_memory()?;

    let (author, voter, article, opinion) = {
        let users = SqliteUserDirectory::try_new(&conn)?;
        let content = SqliteContentStore::try_new(&conn)?;
        let author = users.create_user(&User::new("author").with_aura(5))?;
        let voter = users.create_user(&User::new("voter"))?;
        let article = content.create_article(&Article::new(
            "Headline", "Summary", "Body", "Desk", "world",
        ))?;
        let opinion = content.create_opinion(&Opinion::new(article, author, "Agreed."))?;
        (
            author,
            voter,
            TargetRef::article(article),
            TargetRef::opinion(opinion),
        )
    };

    let coordinator = VoteCoordinator::default();

    let outcome =
        coordinator.cast_vote(&mut conn, Some(voter), &VoteRequest::new(article, Choice::For))?;
    println!("article vote=for tally={}", tally_label(outcome.tally()));

    let mut mirror = VoteMirror::new();
    {
        let mut transport = LocalTransport::new(&coordinator, &mut conn, Some(voter));
        mirror.vote(&mut transport, opinion, Choice::Like)?;
        mirror.vote(&mut transport, opinion, Choice::Dislike)?;
    }
    let snapshot = coordinator.snapshot(&conn, opinion)?;
    println!(
        "opinion votes=like,dislike tally={} author_aura={}",
        tally_label(snapshot.tally()),
        snapshot.author_aura().unwrap_or_default()
    );

    let own =
        coordinator.cast_vote(&mut conn, Some(author), &VoteRequest::new(opinion, Choice::Like))?;
    println!(
        "opinion self_vote=like tally={} author_aura={}",
        tally_label(own.tally()),
        own.author_aura().unwrap_or_default()
    );

    Ok(())
}

fn tally_label(tally: tribune_core::Tally) -> String {
    format!("{}/{}", tally.positive, tally.negative)
}
