//! Content store binding for articles and opinions.
//!
//! # Responsibility
//! - Create and read articles/opinions so votes have targets.
//! - Answer existence and authorship questions for the coordinator.
//!
//! # Invariants
//! - New rows always start with zero counters; only tally transitions
//!   change them afterwards.
//! - `Opinion::author_aura` is joined from `users.aura` on every read.
//! - Opinion lists are ordered `likes DESC, created_at ASC, uuid ASC`.

use crate::model::content::{Article, Opinion};
use crate::model::vote::{TargetId, TargetKind, TargetRef, UserId};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::sql::{ensure_schema_ready, parse_user_id, parse_uuid, read_count};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ARTICLE_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    summary,
    content,
    author,
    category,
    image_url,
    publish_date,
    votes_for,
    votes_against
FROM articles";

const OPINION_SELECT_SQL: &str = "SELECT
    o.uuid AS uuid,
    o.article_uuid AS article_uuid,
    o.author_uuid AS author_uuid,
    u.display_name AS author_name,
    u.aura AS author_aura,
    o.content AS content,
    o.created_at AS created_at,
    o.likes AS likes,
    o.dislikes AS dislikes
FROM opinions o
INNER JOIN users u ON u.uuid = o.author_uuid";

/// Repository interface for vote targets.
pub trait ContentStore {
    /// Persists a new article with zero counters.
    fn create_article(&self, article: &Article) -> RepoResult<TargetId>;
    /// Persists a new opinion with zero counters.
    fn create_opinion(&self, opinion: &Opinion) -> RepoResult<TargetId>;
    fn get_article(&self, id: TargetId) -> RepoResult<Option<Article>>;
    fn get_opinion(&self, id: TargetId) -> RepoResult<Option<Opinion>>;
    /// Lists opinions on one article, most liked first.
    fn list_opinions_for_article(&self, article_id: TargetId) -> RepoResult<Vec<Opinion>>;
    /// Lists every opinion written by one user.
    fn list_opinions_by_author(&self, author_id: UserId) -> RepoResult<Vec<Opinion>>;
    fn target_exists(&self, target: &TargetRef) -> RepoResult<bool>;
    /// Returns the author of an opinion, or `None` when it does not exist.
    fn opinion_author(&self, opinion_id: TargetId) -> RepoResult<Option<UserId>>;
}

/// SQLite-backed content store.
pub struct SqliteContentStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContentStore<'conn> {
    /// Creates a store from a migrated connection or open transaction.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ContentStore for SqliteContentStore<'_> {
    fn create_article(&self, article: &Article) -> RepoResult<TargetId> {
        self.conn.execute(
            "INSERT INTO articles (
                uuid,
                title,
                summary,
                content,
                author,
                category,
                image_url,
                publish_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                CASE WHEN ?8 > 0 THEN ?8 ELSE (strftime('%s', 'now') * 1000) END);",
            params![
                article.uuid.to_string(),
                article.title.as_str(),
                article.summary.as_str(),
                article.content.as_str(),
                article.author.as_str(),
                article.category.as_str(),
                article.image_url.as_deref(),
                article.publish_date,
            ],
        )?;
        Ok(article.uuid)
    }

    fn create_opinion(&self, opinion: &Opinion) -> RepoResult<TargetId> {
        let article = TargetRef::article(opinion.article_uuid);
        if !self.target_exists(&article)? {
            return Err(RepoError::TargetNotFound(article));
        }
        if !user_exists(self.conn, opinion.author_uuid)? {
            return Err(RepoError::UserNotFound(opinion.author_uuid));
        }

        self.conn.execute(
            "INSERT INTO opinions (
                uuid,
                article_uuid,
                author_uuid,
                content
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                opinion.uuid.to_string(),
                opinion.article_uuid.to_string(),
                opinion.author_uuid.to_string(),
                opinion.content.as_str(),
            ],
        )?;
        Ok(opinion.uuid)
    }

    fn get_article(&self, id: TargetId) -> RepoResult<Option<Article>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ARTICLE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_article_row(row)?));
        }
        Ok(None)
    }

    fn get_opinion(&self, id: TargetId) -> RepoResult<Option<Opinion>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{OPINION_SELECT_SQL} WHERE o.uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_opinion_row(row)?));
        }
        Ok(None)
    }

    fn list_opinions_for_article(&self, article_id: TargetId) -> RepoResult<Vec<Opinion>> {
        self.list_opinions("o.article_uuid = ?1", article_id.to_string())
    }

    fn list_opinions_by_author(&self, author_id: UserId) -> RepoResult<Vec<Opinion>> {
        self.list_opinions("o.author_uuid = ?1", author_id.to_string())
    }

    fn target_exists(&self, target: &TargetRef) -> RepoResult<bool> {
        let sql = match target.kind {
            TargetKind::Article => "SELECT EXISTS(SELECT 1 FROM articles WHERE uuid = ?1);",
            TargetKind::Opinion => "SELECT EXISTS(SELECT 1 FROM opinions WHERE uuid = ?1);",
        };
        let exists: i64 = self
            .conn
            .query_row(sql, [target.id.to_string()], |row| row.get(0))?;
        Ok(exists == 1)
    }

    fn opinion_author(&self, opinion_id: TargetId) -> RepoResult<Option<UserId>> {
        let author: Option<String> = self
            .conn
            .query_row(
                "SELECT author_uuid FROM opinions WHERE uuid = ?1;",
                [opinion_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        author
            .map(|value| parse_user_id(&value, "opinions.author_uuid"))
            .transpose()
    }
}

impl SqliteContentStore<'_> {
    fn list_opinions(&self, filter: &str, value: String) -> RepoResult<Vec<Opinion>> {
        let mut stmt = self.conn.prepare(&format!(
            "{OPINION_SELECT_SQL}
             WHERE {filter}
             ORDER BY o.likes DESC, o.created_at ASC, o.uuid ASC;"
        ))?;
        let mut rows = stmt.query([value])?;
        let mut opinions = Vec::new();
        while let Some(row) = rows.next()? {
            opinions.push(parse_opinion_row(row)?);
        }
        Ok(opinions)
    }
}

fn user_exists(conn: &Connection, user_id: UserId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE uuid = ?1);",
        [user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_article_row(row: &Row<'_>) -> RepoResult<Article> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Article {
        uuid: parse_uuid(&uuid_text, "articles.uuid")?,
        title: row.get("title")?,
        summary: row.get("summary")?,
        content: row.get("content")?,
        author: row.get("author")?,
        category: row.get("category")?,
        image_url: row.get("image_url")?,
        publish_date: row.get("publish_date")?,
        votes_for: read_count(row.get("votes_for")?, "articles.votes_for")?,
        votes_against: read_count(row.get("votes_against")?, "articles.votes_against")?,
    })
}

fn parse_opinion_row(row: &Row<'_>) -> RepoResult<Opinion> {
    let uuid_text: String = row.get("uuid")?;
    let article_text: String = row.get("article_uuid")?;
    let author_text: String = row.get("author_uuid")?;
    Ok(Opinion {
        uuid: parse_uuid(&uuid_text, "opinions.uuid")?,
        article_uuid: parse_uuid(&article_text, "opinions.article_uuid")?,
        author_uuid: parse_user_id(&author_text, "opinions.author_uuid")?,
        author_name: row.get("author_name")?,
        author_aura: row.get("author_aura")?,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
        likes: read_count(row.get("likes")?, "opinions.likes")?,
        dislikes: read_count(row.get("dislikes")?, "opinions.dislikes")?,
    })
}
