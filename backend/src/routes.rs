use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::{handlers, request_context, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Define routes
    Router::new()
        .route("/api/comment/create", post(handlers::create_comment))
        .route("/api/comment/list", get(handlers::list_comments))
        .route("/api/comment/count", get(handlers::count_comments))
        .route(
            "/api/comment/:comment_id",
            get(handlers::get_comment).delete(handlers::delete_comment),
        )
        .route(
            "/api/comment/:comment_id/like",
            post(handlers::like_comment).delete(handlers::unlike_comment),
        )
        .route(
            "/api/comment/:comment_id/like/check",
            get(handlers::check_liked),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(
                    request_context::request_context_middleware,
                ))
                .layer(cors),
        )
}
