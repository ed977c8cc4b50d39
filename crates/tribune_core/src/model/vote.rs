//! Vote vocabulary and the transition table shared by server and client.
//!
//! # Responsibility
//! - Define target kinds, choices and the `(user, target)` composite key.
//! - Define the tally shape and the legal transitions between choices.
//!
//! # Invariants
//! - A choice belongs to exactly one target kind.
//! - A transition moves at most one unit out of one side and at most one
//!   unit into the other side; repeating a choice is a no-op.
//! - Tally arithmetic never goes below zero.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier for users.
pub type UserId = Uuid;

/// Stable identifier for any votable target.
pub type TargetId = Uuid;

/// Kind of votable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Published article, voted `for`/`against`.
    Article,
    /// User opinion attached to an article, voted `like`/`dislike`.
    Opinion,
}

impl TargetKind {
    /// Stable string id used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Opinion => "opinion",
        }
    }

    /// Choice that lands on the given side of this kind's tally.
    pub fn choice_for(self, side: Side) -> Choice {
        match (self, side) {
            (Self::Article, Side::Positive) => Choice::For,
            (Self::Article, Side::Negative) => Choice::Against,
            (Self::Opinion, Side::Positive) => Choice::Like,
            (Self::Opinion, Side::Negative) => Choice::Dislike,
        }
    }
}

impl Display for TargetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = VoteParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "article" => Ok(Self::Article),
            "opinion" => Ok(Self::Opinion),
            other => Err(VoteParseError::UnknownTargetKind(other.to_string())),
        }
    }
}

/// One user's directional vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    For,
    Against,
    Like,
    Dislike,
}

impl Choice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::For => "for",
            Self::Against => "against",
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }

    /// Target kind this choice is legal for.
    pub fn kind(self) -> TargetKind {
        match self {
            Self::For | Self::Against => TargetKind::Article,
            Self::Like | Self::Dislike => TargetKind::Opinion,
        }
    }

    /// Tally side this choice counts towards.
    pub fn side(self) -> Side {
        match self {
            Self::For | Self::Like => Side::Positive,
            Self::Against | Self::Dislike => Side::Negative,
        }
    }
}

impl Display for Choice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Choice {
    type Err = VoteParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "for" => Ok(Self::For),
            "against" => Ok(Self::Against),
            "like" => Ok(Self::Like),
            "dislike" => Ok(Self::Dislike),
            other => Err(VoteParseError::UnknownChoice(other.to_string())),
        }
    }
}

/// Kind-agnostic tally side.
///
/// `Positive` is `for`/`like`, `Negative` is `against`/`dislike`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Positive,
    Negative,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

/// Parse errors for wire/storage strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteParseError {
    UnknownTargetKind(String),
    UnknownChoice(String),
}

impl Display for VoteParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTargetKind(value) => {
                write!(f, "unknown target kind `{value}`; expected article|opinion")
            }
            Self::UnknownChoice(value) => {
                write!(f, "unknown choice `{value}`; expected for|against|like|dislike")
            }
        }
    }
}

impl Error for VoteParseError {}

/// Reference to one votable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: TargetId,
}

impl TargetRef {
    pub fn article(id: TargetId) -> Self {
        Self {
            kind: TargetKind::Article,
            id,
        }
    }

    pub fn opinion(id: TargetId) -> Self {
        Self {
            kind: TargetKind::Opinion,
            id,
        }
    }
}

impl Display for TargetRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Composite `(user, target)` key. At most one vote record exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VoteKey {
    pub user_id: UserId,
    pub target: TargetRef,
}

impl VoteKey {
    pub fn new(user_id: UserId, target: TargetRef) -> Self {
        Self { user_id, target }
    }
}

impl Display for VoteKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user_id, self.target)
    }
}

/// Pair of counters for one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tally {
    /// `votesFor` or `likes`.
    pub positive: u64,
    /// `votesAgainst` or `dislikes`.
    pub negative: u64,
}

impl Tally {
    pub fn new(positive: u64, negative: u64) -> Self {
        Self { positive, negative }
    }

    pub fn total(&self) -> u64 {
        self.positive + self.negative
    }

    /// Returns the tally after applying `transition`.
    ///
    /// Saturates at zero so a stale local mirror cannot underflow.
    pub fn apply(&self, transition: Transition) -> Self {
        let delta = transition.delta();
        Self {
            positive: shift(self.positive, delta.positive),
            negative: shift(self.negative, delta.negative),
        }
    }
}

fn shift(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta.unsigned_abs())
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

/// Signed counter change implied by a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TallyDelta {
    pub positive: i64,
    pub negative: i64,
}

/// Movement of one user's vote on one target.
///
/// | previous | next | effect |
/// |---|---|---|
/// | none | A | A += 1 |
/// | A | A | none |
/// | A | B | A -= 1, B += 1 |
/// | A | none | A -= 1 (explicit retraction only) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    pub previous: Option<Side>,
    pub next: Option<Side>,
}

impl Transition {
    pub fn new(previous: Option<Side>, next: Option<Side>) -> Self {
        Self { previous, next }
    }

    /// Builds a transition from stored/requested choices.
    pub fn between(previous: Option<Choice>, next: Option<Choice>) -> Self {
        Self::new(previous.map(Choice::side), next.map(Choice::side))
    }

    pub fn is_noop(&self) -> bool {
        self.previous == self.next
    }

    pub fn delta(&self) -> TallyDelta {
        let mut delta = TallyDelta::default();
        if self.is_noop() {
            return delta;
        }
        match self.previous {
            Some(Side::Positive) => delta.positive -= 1,
            Some(Side::Negative) => delta.negative -= 1,
            None => {}
        }
        match self.next {
            Some(Side::Positive) => delta.positive += 1,
            Some(Side::Negative) => delta.negative += 1,
            None => {}
        }
        delta
    }

    /// Short label used in log events, e.g. `none->positive`.
    pub fn label(&self) -> String {
        format!(
            "{}->{}",
            self.previous.map_or("none", Side::as_str),
            self.next.map_or("none", Side::as_str)
        )
    }
}
