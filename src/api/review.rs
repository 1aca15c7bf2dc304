use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use validator::Validate;

use super::auth::AuthUser;
use super::error::AppResult;
use super::pagination::{PageParams, Paged};
use super::types::*;
use crate::db::{MovieRepo, Review, ReviewOrder, ReviewRepo};
use crate::server::AppState;

const HIGHLIGHT_COUNT: usize = 3;

/// Create the caller's review of a movie, or replace the one they already wrote.
pub async fn upsert_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(movie_id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    req.validate()?;

    let now = Utc::now();
    let review = Review {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.user_id,
        movie_id,
        rating: req.rating,
        content: req.content,
        likes: 0,
        created: now,
        updated: now,
    };

    let (stored, _) = state
        .ratings
        .submit_review(state.db.as_ref(), &review)
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Newest first.
pub async fn movie_reviews(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paged<ReviewView>>> {
    state.db.get_movie(&movie_id).await?;

    let reviews = state
        .db
        .list_movie_reviews(&movie_id, ReviewOrder::Newest, page.skip(), page.limit())
        .await?;
    let total = state.db.count_movie_reviews(&movie_id).await?;
    let items = review_views(state.db.as_ref(), reviews, false).await?;

    Ok(Json(Paged::new(items, &page, total)))
}

pub async fn review_highlights(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
) -> AppResult<Json<ReviewHighlights>> {
    state.db.get_movie(&movie_id).await?;

    let top_rated = state
        .db
        .list_movie_reviews(&movie_id, ReviewOrder::HighestRated, 0, HIGHLIGHT_COUNT)
        .await?;
    let most_liked = state
        .db
        .list_movie_reviews(&movie_id, ReviewOrder::MostLiked, 0, HIGHLIGHT_COUNT)
        .await?;

    Ok(Json(ReviewHighlights {
        top_rated: review_views(state.db.as_ref(), top_rated, false).await?,
        most_liked: review_views(state.db.as_ref(), most_liked, false).await?,
    }))
}

/// Toggle the caller's like on a review.
pub async fn like_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(review_id): Path<String>,
) -> AppResult<Json<Review>> {
    let review = state
        .db
        .toggle_review_like(&review_id, &user.user_id)
        .await?;
    Ok(Json(review))
}
