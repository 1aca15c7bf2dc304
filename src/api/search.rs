use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;

use super::error::AppResult;
use super::pagination::{PageParams, Paged};
use crate::catalog::{self, build_search_filter, SearchParams};
use crate::db::{Movie, MovieQuery, MovieRepo};
use crate::server::AppState;

pub async fn search_movies(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paged<Movie>>> {
    let spec = build_search_filter(&params)?;

    let total = state.db.count_movies(&spec.filter).await?;
    let query = MovieQuery::new(spec.filter)
        .sorted_by(spec.sort)
        .window(page.skip(), page.limit());
    let movies = state.db.find_movies(&query).await?;

    Ok(Json(Paged::new(movies, &page, total)))
}

pub async fn top_by_genre(
    State(state): State<AppState>,
    Path(genre): Path<String>,
) -> AppResult<Json<Vec<Movie>>> {
    let movies = catalog::top_rated_by_genre(
        state.db.as_ref(),
        &genre,
        state.config.recommendations.list_limit,
    )
    .await?;
    Ok(Json(movies))
}

pub async fn top_of_month(State(state): State<AppState>) -> AppResult<Json<Vec<Movie>>> {
    let today = Utc::now().date_naive();
    let movies = catalog::top_of_month(
        state.db.as_ref(),
        today,
        state.config.recommendations.list_limit,
    )
    .await?;
    Ok(Json(movies))
}
