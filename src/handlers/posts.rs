use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::models::post::{CreatePostRequest, Post};
use crate::repositories::post;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// Public listing. Authentication is optional here; when a valid token is
/// supplied the response notes who is asking.
pub async fn list(
    State(state): State<AppState>,
    context: Option<Extension<AuthContext>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let posts = post::list_posts(&state.pool, limit).await?;

    Ok(Json(serde_json::json!({
        "posts": posts,
        "viewer": context.map(|Extension(ctx)| ctx.user_id),
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let now = Utc::now();
    let new_post = Post {
        id: Uuid::new_v4(),
        author_id: context.user_id,
        title: request.title,
        body: request.body,
        created_at: now,
        updated_at: now,
    };
    post::insert_post(&state.pool, &new_post).await?;

    Ok((StatusCode::CREATED, Json(new_post)))
}
