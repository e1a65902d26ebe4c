//! SQLite-backed persistence for comment rows and their like marks.

use std::{
    collections::HashSet,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{
    params, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    Connection, OptionalExtension,
};
use serde::{Deserialize, Serialize};

/// Moderation state of a comment row.
///
/// Stored as the platform's historical numeric codes so the table stays
/// readable by the other services that share the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentStatus {
    /// Removed by its author; the row is kept but hidden from every read path.
    SoftDeleted,
    /// Visible.
    Normal,
    /// Awaiting moderation; hidden from listings but still addressable.
    Pending,
}

impl CommentStatus {
    /// Numeric code used in the `status` column (0/1/2).
    pub fn code(self) -> i64 {
        match self {
            CommentStatus::SoftDeleted => 0,
            CommentStatus::Normal => 1,
            CommentStatus::Pending => 2,
        }
    }

    /// Inverse of [`CommentStatus::code`]; `None` for unknown codes.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CommentStatus::SoftDeleted),
            1 => Some(CommentStatus::Normal),
            2 => Some(CommentStatus::Pending),
            _ => None,
        }
    }
}

impl FromSql for CommentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        CommentStatus::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

impl ToSql for CommentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.code().into())
    }
}

/// Input for [`CommentStore::insert_comment`].
///
/// `parent_id`/`root_id` are stored verbatim; the service layer is the one
/// that computes a consistent root pointer before writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    /// Article the comment is attached to.
    pub article_id: i64,
    /// Authoring user.
    pub author_id: i64,
    /// Parent comment for replies; `None` for top-level comments.
    pub parent_id: Option<i64>,
    /// Top-level ancestor for replies; `None` for top-level comments.
    pub root_id: Option<i64>,
    /// Comment body.
    pub content: String,
    /// Initial moderation state.
    pub status: CommentStatus,
}

/// One row of the `comments` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    /// Row id, monotonically assigned.
    pub id: i64,
    /// Article the comment is attached to.
    pub article_id: i64,
    /// Authoring user.
    pub author_id: i64,
    /// Parent comment id; `None` means top-level.
    pub parent_id: Option<i64>,
    /// Stored top-level ancestor id. Legacy rows may hold `None` or a stale
    /// id, so read paths must not trust it without repair.
    pub root_id: Option<i64>,
    /// Comment body.
    pub content: String,
    /// Denormalized like counter, never negative.
    pub like_count: i64,
    /// Moderation state.
    pub status: CommentStatus,
    /// Creation time, unix millis.
    pub created_at: i64,
    /// Last mutation time, unix millis.
    pub updated_at: i64,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS comments (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id  INTEGER NOT NULL,
    author_id   INTEGER NOT NULL,
    parent_id   INTEGER,
    root_id     INTEGER,
    content     TEXT    NOT NULL,
    like_count  INTEGER NOT NULL DEFAULT 0,
    status      INTEGER NOT NULL DEFAULT 1,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_comments_article ON comments (article_id, status);
CREATE INDEX IF NOT EXISTS idx_comments_root   ON comments (root_id);
CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments (parent_id);

CREATE TABLE IF NOT EXISTS comment_likes (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    comment_id INTEGER NOT NULL,
    author_id  INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (comment_id, author_id)
);
";

const COMMENT_COLUMNS: &str =
    "id, article_id, author_id, parent_id, root_id, content, like_count, status, created_at, \
     updated_at";

/// Persistence layer over the `comments` and `comment_likes` tables.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct CommentStore {
    conn: Arc<Mutex<Connection>>,
    like_lookups: Arc<AtomicU64>,
}

impl CommentStore {
    /// Opens (and if needed creates) the comment database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open comment db at {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory comment db")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create comment schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            like_lookups: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Inserts a comment row and returns it as stored.
    pub fn insert_comment(&self, input: NewComment) -> Result<CommentRecord> {
        let now = now_ms();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO comments
                 (article_id, author_id, parent_id, root_id, content, like_count, status,
                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)",
            params![
                input.article_id,
                input.author_id,
                input.parent_id,
                input.root_id,
                input.content,
                input.status,
                now,
                now
            ],
        )
        .context("failed to insert comment")?;

        Ok(CommentRecord {
            id: conn.last_insert_rowid(),
            article_id: input.article_id,
            author_id: input.author_id,
            parent_id: input.parent_id,
            root_id: input.root_id,
            content: input.content,
            like_count: 0,
            status: input.status,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetches one comment regardless of status; callers decide what a
    /// soft-deleted row means for them.
    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?"),
            params![id],
            map_comment_row,
        )
        .optional()
        .context("failed to fetch comment")
    }

    /// One page of normal top-level comments for an article, newest first.
    ///
    /// Ordering is `(created_at, id)` descending; the id tie-break makes the
    /// page order total even when timestamps collide.
    pub fn list_top_level(
        &self,
        article_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<CommentRecord>> {
        let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COMMENT_COLUMNS} FROM comments
                 WHERE article_id = ? AND parent_id IS NULL AND status = ?
                 ORDER BY created_at DESC, id DESC
                 LIMIT ? OFFSET ?"
            ))
            .context("prepare top-level page query")?;
        let rows = stmt
            .query_map(
                params![article_id, CommentStatus::Normal, i64::from(page_size), offset],
                map_comment_row,
            )
            .context("execute top-level page query")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect top-level page")?;
        Ok(rows)
    }

    /// All normal replies that *might* belong under the given top-level ids.
    ///
    /// Matches on `root_id` OR `parent_id`: legacy rows may carry a missing
    /// or stale root pointer, and the parent match is what lets the read
    /// path repair them. Ordered `(created_at, id)` ascending.
    pub fn list_reply_candidates(&self, top_ids: &[i64]) -> Result<Vec<CommentRecord>> {
        if top_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; top_ids.len()].join(",");
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments
             WHERE parent_id IS NOT NULL
               AND status = ?
               AND (root_id IN ({placeholders}) OR parent_id IN ({placeholders}))
             ORDER BY created_at ASC, id ASC"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).context("prepare reply candidates query")?;
        let bound = std::iter::once(CommentStatus::Normal.code())
            .chain(top_ids.iter().copied())
            .chain(top_ids.iter().copied());
        let rows = stmt
            .query_map(params_from_iter(bound), map_comment_row)
            .context("execute reply candidates query")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect reply candidates")?;
        Ok(rows)
    }

    /// Marks a comment soft-deleted. The row is never removed.
    pub fn soft_delete(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE comments SET status = ?, updated_at = ? WHERE id = ?",
            params![CommentStatus::SoftDeleted, now_ms(), id],
        )
        .context("failed to soft-delete comment")?;
        Ok(())
    }

    /// Records a like and bumps the counter in one transaction.
    ///
    /// Returns `false` when the `(comment_id, author_id)` pair already
    /// exists; the unique constraint (not a pre-read) settles concurrent
    /// likes, so only the winning insert touches the counter.
    pub fn insert_like(&self, comment_id: i64, author_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("begin like transaction")?;

        match tx.execute(
            "INSERT INTO comment_likes (comment_id, author_id, created_at) VALUES (?, ?, ?)",
            params![comment_id, author_id, now_ms()],
        ) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                tracing::debug!(comment_id, author_id, "like already recorded, insert lost");
                return Ok(false);
            }
            Err(err) => return Err(err).context("failed to insert comment like"),
        }

        tx.execute(
            "UPDATE comments SET like_count = like_count + 1, updated_at = ? WHERE id = ?",
            params![now_ms(), comment_id],
        )
        .context("failed to bump like count")?;
        tx.commit().context("commit like transaction")?;
        Ok(true)
    }

    /// Removes a like and decrements the counter (floored at zero) in one
    /// transaction. Returns `false` when no like row existed.
    pub fn delete_like(&self, comment_id: i64, author_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("begin unlike transaction")?;

        let removed = tx
            .execute(
                "DELETE FROM comment_likes WHERE comment_id = ? AND author_id = ?",
                params![comment_id, author_id],
            )
            .context("failed to delete comment like")?;
        if removed == 0 {
            return Ok(false);
        }

        tx.execute(
            "UPDATE comments SET like_count = MAX(like_count - 1, 0), updated_at = ?
             WHERE id = ?",
            params![now_ms(), comment_id],
        )
        .context("failed to drop like count")?;
        tx.commit().context("commit unlike transaction")?;
        Ok(true)
    }

    /// Which of `comment_ids` the user has liked, as one batched query.
    pub fn liked_comment_ids(&self, author_id: i64, comment_ids: &[i64]) -> Result<HashSet<i64>> {
        if comment_ids.is_empty() {
            return Ok(HashSet::new());
        }
        self.like_lookups.fetch_add(1, Ordering::Relaxed);

        let placeholders = vec!["?"; comment_ids.len()].join(",");
        let sql = format!(
            "SELECT comment_id FROM comment_likes
             WHERE author_id = ? AND comment_id IN ({placeholders})"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).context("prepare liked-set query")?;
        let bound = std::iter::once(author_id).chain(comment_ids.iter().copied());
        let ids = stmt
            .query_map(params_from_iter(bound), |row| row.get::<_, i64>(0))
            .context("execute liked-set query")?
            .collect::<rusqlite::Result<HashSet<_>>>()
            .context("collect liked set")?;
        Ok(ids)
    }

    /// Whether the user has liked one specific comment.
    pub fn is_liked(&self, comment_id: i64, author_id: i64) -> Result<bool> {
        self.like_lookups.fetch_add(1, Ordering::Relaxed);
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM comment_likes WHERE comment_id = ? AND author_id = ?",
                params![comment_id, author_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to check like")?;
        Ok(found.is_some())
    }

    /// Number of normal comments (both levels) for an article.
    pub fn count_for_article(&self, article_id: i64) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM comments WHERE article_id = ? AND status = ?",
                params![article_id, CommentStatus::Normal],
                |row| row.get(0),
            )
            .context("failed to count comments")?;
        Ok(count.max(0) as u64)
    }

    /// How many batched like lookups this store has served. Lets callers
    /// (and tests) confirm that anonymous reads never hit the like table.
    pub fn like_lookup_count(&self) -> u64 {
        self.like_lookups.load(Ordering::Relaxed)
    }
}

fn map_comment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentRecord {
        id: row.get("id")?,
        article_id: row.get("article_id")?,
        author_id: row.get("author_id")?,
        parent_id: row.get("parent_id")?,
        root_id: row.get("root_id")?,
        content: row.get("content")?,
        like_count: row.get("like_count")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
