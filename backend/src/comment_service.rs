//! Comment operations: create/delete, the list/detail read pipeline, likes
//! and the per-article counter.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use contenthub_shared::comment_store::{
    CommentRecord, CommentStatus, CommentStore, NewComment,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ServiceError, ServiceResult},
    thread::assemble_threads,
    user_directory::{UserDirectory, UserProfile},
};

/// Upper bound on comment body length, in characters.
pub const MAX_CONTENT_CHARS: usize = 1000;
/// Page number used when the caller passes none.
pub const DEFAULT_PAGE: u32 = 1;
/// Page size used when the caller passes none.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Body of `POST /api/comment/create`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub article_id: i64,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub root_id: Option<i64>,
}

/// One rendered comment, with the viewer's like state and the author's
/// profile merged in. Top-level entries carry their replies in `children`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: i64,
    pub article_id: i64,
    pub author_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_id: Option<i64>,
    pub content: String,
    pub like_count: i64,
    pub is_liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub children: Vec<CommentView>,
}

/// Orchestrates the store, the thread assembly and the author directory.
#[derive(Clone)]
pub struct CommentService {
    store: CommentStore,
    users: UserDirectory,
}

impl CommentService {
    pub fn new(store: CommentStore, users: UserDirectory) -> Self {
        Self { store, users }
    }

    /// Creates a top-level comment or a reply; returns the new comment id.
    ///
    /// For replies the stored root pointer is always derived from the parent
    /// (the parent's own root when the parent is a reply, the parent's id
    /// when it is top-level), mirroring the read-time repair rule so new
    /// rows are born consistent even though legacy rows are not.
    pub fn create(&self, author_id: i64, request: CreateCommentRequest) -> ServiceResult<i64> {
        let content = request.content.trim().to_string();
        if content.is_empty() {
            return Err(ServiceError::Validation(
                "comment content cannot be empty".to_string(),
            ));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(ServiceError::Validation(format!(
                "comment content cannot exceed {MAX_CONTENT_CHARS} characters"
            )));
        }
        if request.parent_id.is_none() && request.root_id.is_some() {
            return Err(ServiceError::Validation(
                "rootId is only valid together with parentId".to_string(),
            ));
        }

        let root_id = match request.parent_id {
            Some(parent_id) => {
                let parent = self
                    .store
                    .get_comment(parent_id)?
                    .filter(|parent| parent.status != CommentStatus::SoftDeleted)
                    .ok_or_else(|| {
                        ServiceError::NotFound("parent comment not found".to_string())
                    })?;
                Some(parent.root_id.unwrap_or(parent.id))
            }
            None => None,
        };

        let created = self.store.insert_comment(NewComment {
            article_id: request.article_id,
            author_id,
            parent_id: request.parent_id,
            root_id,
            content,
            status: CommentStatus::Normal,
        })?;

        tracing::info!(
            comment_id = created.id,
            article_id = created.article_id,
            author_id,
            "comment created"
        );
        Ok(created.id)
    }

    /// Soft-deletes a comment; only its author may do so.
    pub fn delete(&self, comment_id: i64, author_id: i64) -> ServiceResult<()> {
        let comment = self.get_visible(comment_id)?;
        if comment.author_id != author_id {
            return Err(ServiceError::Permission(
                "only the author can delete a comment".to_string(),
            ));
        }

        self.store.soft_delete(comment_id)?;
        tracing::info!(comment_id, author_id, "comment deleted");
        Ok(())
    }

    /// One page of an article's threads: top-level comments newest first,
    /// each carrying its replies oldest first.
    ///
    /// The liked-set lookup and the author enrichment are independent and
    /// run concurrently; enrichment failure degrades to profile-less views
    /// and never fails the request.
    pub async fn list(
        &self,
        article_id: i64,
        page: u32,
        page_size: u32,
        viewer: Option<i64>,
    ) -> ServiceResult<Vec<CommentView>> {
        let page = page.max(DEFAULT_PAGE);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let top = self.store.list_top_level(article_id, page, page_size)?;
        if top.is_empty() {
            return Ok(Vec::new());
        }
        let top_ids: Vec<i64> = top.iter().map(|row| row.id).collect();

        let candidates = self.store.list_reply_candidates(&top_ids)?;
        let assembly = assemble_threads(&top_ids, candidates);
        if assembly.orphan_count > 0 {
            tracing::debug!(
                article_id,
                orphans = assembly.orphan_count,
                "dropped orphaned replies from listing"
            );
        }

        let replies = &assembly.replies_by_root;
        let all_ids: Vec<i64> = top_ids
            .iter()
            .copied()
            .chain(replies.values().flatten().map(|row| row.id))
            .collect();
        let author_ids: Vec<i64> = top
            .iter()
            .map(|row| row.author_id)
            .chain(replies.values().flatten().map(|row| row.author_id))
            .collect();

        let (liked, profiles) = tokio::join!(
            self.liked_ids(viewer, all_ids),
            self.users.profiles_by_ids(&author_ids),
        );
        let liked = liked?;

        let mut replies_by_root = assembly.replies_by_root;
        let views = top
            .into_iter()
            .map(|row| {
                let children = replies_by_root
                    .remove(&row.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|child| to_view(child, &liked, &profiles, Vec::new()))
                    .collect();
                to_view(row, &liked, &profiles, children)
            })
            .collect();
        Ok(views)
    }

    /// A single comment with like state and author profile.
    pub async fn detail(&self, comment_id: i64, viewer: Option<i64>) -> ServiceResult<CommentView> {
        let comment = self.get_visible(comment_id)?;

        let author_ids = [comment.author_id];
        let (liked, profiles) = tokio::join!(
            self.liked_ids(viewer, vec![comment.id]),
            self.users.profiles_by_ids(&author_ids),
        );
        let liked = liked?;

        Ok(to_view(comment, &liked, &profiles, Vec::new()))
    }

    /// Records a like. The unique `(comment, user)` pair settles races: the
    /// losing insert surfaces as a conflict and never touches the counter.
    pub fn like(&self, comment_id: i64, author_id: i64) -> ServiceResult<()> {
        self.get_visible(comment_id)?;

        let inserted = self.store.insert_like(comment_id, author_id)?;
        if !inserted {
            return Err(ServiceError::Conflict(
                "comment already liked".to_string(),
            ));
        }
        tracing::info!(comment_id, author_id, "comment liked");
        Ok(())
    }

    /// Removes a like; conflicts when none exists.
    pub fn unlike(&self, comment_id: i64, author_id: i64) -> ServiceResult<()> {
        let removed = self.store.delete_like(comment_id, author_id)?;
        if !removed {
            return Err(ServiceError::Conflict("comment not liked".to_string()));
        }
        tracing::info!(comment_id, author_id, "comment unliked");
        Ok(())
    }

    /// Whether the user has liked the comment.
    pub fn is_liked(&self, comment_id: i64, author_id: i64) -> ServiceResult<bool> {
        Ok(self.store.is_liked(comment_id, author_id)?)
    }

    /// Number of visible comments (both levels) under an article.
    pub fn count(&self, article_id: i64) -> ServiceResult<u64> {
        Ok(self.store.count_for_article(article_id)?)
    }

    fn get_visible(&self, comment_id: i64) -> ServiceResult<CommentRecord> {
        self.store
            .get_comment(comment_id)?
            .filter(|comment| comment.status != CommentStatus::SoftDeleted)
            .ok_or_else(|| ServiceError::NotFound("comment not found".to_string()))
    }

    /// Liked-comment set for the viewer. Anonymous viewers short-circuit to
    /// an empty set without touching the store; the real lookup runs on the
    /// blocking pool so it can overlap the enrichment call.
    async fn liked_ids(
        &self,
        viewer: Option<i64>,
        comment_ids: Vec<i64>,
    ) -> ServiceResult<HashSet<i64>> {
        let Some(user_id) = viewer else {
            return Ok(HashSet::new());
        };

        let store = self.store.clone();
        let liked =
            tokio::task::spawn_blocking(move || store.liked_comment_ids(user_id, &comment_ids))
                .await
                .context("liked-set lookup task aborted")??;
        Ok(liked)
    }
}

fn to_view(
    comment: CommentRecord,
    liked: &HashSet<i64>,
    profiles: &HashMap<i64, UserProfile>,
    children: Vec<CommentView>,
) -> CommentView {
    let profile = profiles.get(&comment.author_id);
    CommentView {
        id: comment.id,
        article_id: comment.article_id,
        author_id: comment.author_id,
        parent_id: comment.parent_id,
        root_id: comment.root_id,
        content: comment.content,
        like_count: comment.like_count,
        is_liked: liked.contains(&comment.id),
        username: profile.and_then(|p| p.username.clone()),
        nickname: profile.and_then(|p| p.nickname.clone()),
        avatar_url: profile.and_then(|p| p.avatar_url.clone()),
        created_at: comment.created_at,
        updated_at: comment.updated_at,
        children,
    }
}
