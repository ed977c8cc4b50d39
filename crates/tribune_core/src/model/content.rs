//! Users, articles and opinions as seen by the vote engine.
//!
//! # Invariants
//! - Counter fields are caches of voter-set sizes; only the vote
//!   coordinator changes them after creation.
//! - `Opinion::author_aura` is a read-time projection of `User::aura`.

use crate::model::vote::{Tally, TargetId, TargetRef, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registered user with a derived reputation score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uuid: UserId,
    pub display_name: String,
    /// Signed, unbounded. Changed only by reputation propagation.
    pub aura: i64,
}

impl User {
    /// Creates a user with a generated id and aura 0.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            display_name: display_name.into(),
            aura: 0,
        }
    }

    /// Sets the starting aura, for imports from an existing directory.
    pub fn with_aura(mut self, aura: i64) -> Self {
        self.aura = aura;
        self
    }
}

/// Published article voted `for`/`against`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub uuid: TargetId,
    pub title: String,
    pub summary: String,
    pub content: String,
    /// Byline, free text owned by the content store.
    pub author: String,
    pub category: String,
    pub image_url: Option<String>,
    /// Unix epoch milliseconds.
    pub publish_date: i64,
    pub votes_for: u64,
    pub votes_against: u64,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            summary: summary.into(),
            content: content.into(),
            author: author.into(),
            category: category.into(),
            image_url: None,
            publish_date: 0,
            votes_for: 0,
            votes_against: 0,
        }
    }

    pub fn target(&self) -> TargetRef {
        TargetRef::article(self.uuid)
    }

    pub fn tally(&self) -> Tally {
        Tally::new(self.votes_for, self.votes_against)
    }
}

/// User opinion attached to an article, voted `like`/`dislike`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opinion {
    pub uuid: TargetId,
    pub article_uuid: TargetId,
    pub author_uuid: UserId,
    /// Author display name at read time.
    pub author_name: String,
    /// Author aura at read time.
    pub author_aura: i64,
    pub content: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub likes: u64,
    pub dislikes: u64,
}

impl Opinion {
    /// Creates an unsaved opinion draft. Projection fields are filled on read.
    pub fn new(article_uuid: TargetId, author_uuid: UserId, content: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            article_uuid,
            author_uuid,
            author_name: String::new(),
            author_aura: 0,
            content: content.into(),
            created_at: 0,
            likes: 0,
            dislikes: 0,
        }
    }

    pub fn target(&self) -> TargetRef {
        TargetRef::opinion(self.uuid)
    }

    pub fn tally(&self) -> Tally {
        Tally::new(self.likes, self.dislikes)
    }
}
