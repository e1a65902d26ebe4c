use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{CurrentUser, Viewer},
    comment_service::{CommentView, CreateCommentRequest, DEFAULT_PAGE, DEFAULT_PAGE_SIZE},
    error::ServiceResult,
    state::AppState,
};

/// Platform response envelope: every endpoint answers `{code, message, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Self::with_message("ok", Some(data))
    }

    fn with_message(message: &str, data: Option<T>) -> Json<Self> {
        Json(Self {
            code: 200,
            message: message.to_string(),
            data,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "articleId")]
    pub article_id: i64,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    #[serde(rename = "articleId")]
    pub article_id: i64,
}

pub async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<CreateCommentRequest>,
) -> ServiceResult<Json<ApiResponse<i64>>> {
    let id = state.comments.create(user_id, request)?;
    Ok(ApiResponse::with_message("comment created", Some(id)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(comment_id): Path<i64>,
) -> ServiceResult<Json<ApiResponse<()>>> {
    state.comments.delete(comment_id, user_id)?;
    Ok(ApiResponse::with_message("comment deleted", None))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Query(query): Query<ListQuery>,
) -> ServiceResult<Json<ApiResponse<Vec<CommentView>>>> {
    let views = state
        .comments
        .list(
            query.article_id,
            query.page.unwrap_or(DEFAULT_PAGE),
            query.size.unwrap_or(DEFAULT_PAGE_SIZE),
            viewer,
        )
        .await?;
    Ok(ApiResponse::ok(views))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(comment_id): Path<i64>,
) -> ServiceResult<Json<ApiResponse<CommentView>>> {
    let view = state.comments.detail(comment_id, viewer).await?;
    Ok(ApiResponse::ok(view))
}

pub async fn like_comment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(comment_id): Path<i64>,
) -> ServiceResult<Json<ApiResponse<()>>> {
    state.comments.like(comment_id, user_id)?;
    Ok(ApiResponse::with_message("comment liked", None))
}

pub async fn unlike_comment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(comment_id): Path<i64>,
) -> ServiceResult<Json<ApiResponse<()>>> {
    state.comments.unlike(comment_id, user_id)?;
    Ok(ApiResponse::with_message("comment unliked", None))
}

pub async fn check_liked(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(comment_id): Path<i64>,
) -> ServiceResult<Json<ApiResponse<bool>>> {
    let liked = state.comments.is_liked(comment_id, user_id)?;
    Ok(ApiResponse::ok(liked))
}

pub async fn count_comments(
    State(state): State<AppState>,
    Query(query): Query<CountQuery>,
) -> ServiceResult<Json<ApiResponse<u64>>> {
    let count = state.comments.count(query.article_id)?;
    Ok(ApiResponse::ok(count))
}
