use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::auth::AuthUser;
use super::error::AppResult;
use crate::catalog;
use crate::db::Movie;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

pub async fn similar_movies(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> AppResult<Json<Vec<Movie>>> {
    let limit = params
        .limit
        .unwrap_or(state.config.recommendations.similar_limit);
    let movies = catalog::find_similar_movies(state.db.as_ref(), &movie_id, limit).await?;
    Ok(Json(movies))
}

pub async fn personalized(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<Movie>>> {
    let movies = catalog::personalized_recommendations(
        state.db.as_ref(),
        &user.user_id,
        state.config.recommendations.list_limit,
    )
    .await?;
    Ok(Json(movies))
}

pub async fn trending(State(state): State<AppState>) -> AppResult<Json<Vec<Movie>>> {
    let movies =
        catalog::trending_movies(state.db.as_ref(), state.config.recommendations.list_limit)
            .await?;
    Ok(Json(movies))
}

pub async fn top_rated(State(state): State<AppState>) -> AppResult<Json<Vec<Movie>>> {
    let movies =
        catalog::top_rated_movies(state.db.as_ref(), state.config.recommendations.list_limit)
            .await?;
    Ok(Json(movies))
}
