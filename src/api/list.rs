use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::info;
use validator::Validate;

use super::auth::AuthUser;
use super::error::AppResult;
use super::pagination::{PageParams, Paged};
use super::types::*;
use crate::db::{ListRepo, MovieList};
use crate::server::AppState;

pub async fn create_list(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ListRequest>,
) -> AppResult<(StatusCode, Json<MovieList>)> {
    req.validate()?;

    let now = Utc::now();
    let list = MovieList {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        description: req.description,
        creator: user.user_id,
        movies: unique(req.movies),
        is_public: req.is_public,
        followers: Vec::new(),
        created: now,
        updated: now,
    };

    state.db.insert_list(&list).await?;
    info!(list = %list.id, creator = %list.creator, "List created");

    Ok((StatusCode::CREATED, Json(list)))
}

/// Public lists only.
pub async fn list_lists(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paged<MovieList>>> {
    let lists = state.db.list_public_lists(page.skip(), page.limit()).await?;
    let total = state.db.count_public_lists().await?;
    Ok(Json(Paged::new(lists, &page, total)))
}

pub async fn get_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ListDetail>> {
    let list = state.db.get_list(&id).await?;
    Ok(Json(list_detail(state.db.as_ref(), list).await?))
}

/// Following twice is the same as following once.
pub async fn follow_list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<MovieList>> {
    let list = state.db.follow_list(&id, &user.user_id).await?;
    Ok(Json(list))
}

pub async fn unfollow_list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<MovieList>> {
    let list = state.db.unfollow_list(&id, &user.user_id).await?;
    Ok(Json(list))
}
